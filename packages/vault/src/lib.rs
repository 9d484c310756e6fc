//! Encrypted resource storage, single-use publication proofs and the
//! purchase ledger.

pub mod content;
pub mod crypto;
pub mod database;
pub mod entity;
pub mod proof;
pub mod purchase;

pub use content::{ContentError, ContentStore, NewContent, ResourceDefaults, StoredContent};
pub use crypto::{ContentCipher, ContentHash, CryptoError};
pub use proof::{
    ConsumeOutcome, ProofError, ProofIssuer, ProofRejection, ProofVerifier, Publication,
    VerifiedProof,
};
pub use purchase::{NewPurchase, PurchaseLedger, SettlementRecord};
