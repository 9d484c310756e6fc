//! Single-use proof tokens that gate the draft -> published transition.
//!
//! Only the salt and a salted hash are persisted. The cleartext token is
//! derived from the process-wide proof secret, so an idempotent ingestion
//! replay can hand the owner the same token again while a copy of the
//! database alone cannot.

use chrono::Utc;
use common::ResourceStatus;
use hmac::{Hmac, Mac};
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set};
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::crypto::CryptoError;
use crate::entity::resource;

type HmacSha256 = Hmac<Sha256>;

const SALT_LEN: usize = 16;

/// A freshly issued proof. `token` goes to the owner, the rest is stored.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedProof {
    pub token: String,
    pub hash: String,
    pub salt: String,
}

impl std::fmt::Debug for IssuedProof {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedProof")
            .field("hash", &self.hash)
            .field("salt", &self.salt)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct ProofIssuer {
    secret: Vec<u8>,
}

impl ProofIssuer {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, CryptoError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(CryptoError::InvalidKey("proof secret is empty".into()));
        }
        Ok(Self {
            secret: secret.to_vec(),
        })
    }

    pub fn issue(&self, resource_id: Uuid) -> Result<IssuedProof, CryptoError> {
        let salt = hex::encode(rand::random::<[u8; SALT_LEN]>());
        let token = self.reissue(resource_id, &salt)?;
        let hash = hash_token(&token, &salt)?;
        Ok(IssuedProof { token, hash, salt })
    }

    /// Re-derive the token of an already issued proof.
    pub fn reissue(&self, resource_id: Uuid, salt: &str) -> Result<String, CryptoError> {
        let mut mac = keyed(&self.secret)?;
        mac.update(resource_id.as_bytes());
        mac.update(salt.as_bytes());
        let digest = mac.finalize().into_bytes();
        Ok(format_token(&digest[..8]))
    }
}

impl std::fmt::Debug for ProofIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ProofIssuer(..)")
    }
}

fn keyed(key: &[u8]) -> Result<HmacSha256, CryptoError> {
    HmacSha256::new_from_slice(key).map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

/// `xxxx-xxxx-xxxx-xxxx` over 8 bytes of hex.
fn format_token(bytes: &[u8]) -> String {
    let hex = hex::encode(bytes);
    hex.as_bytes()
        .chunks(4)
        .map(|c| String::from_utf8_lossy(c).into_owned())
        .collect::<Vec<_>>()
        .join("-")
}

/// HMAC-SHA256 of the token keyed by the salt, hex encoded.
pub fn hash_token(token: &str, salt: &str) -> Result<String, CryptoError> {
    let mut mac = keyed(salt.as_bytes())?;
    mac.update(token.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a presented token against the stored hash.
pub fn matches(token: &str, salt: &str, stored_hash: &str) -> bool {
    let Ok(expected) = hex::decode(stored_hash) else {
        return false;
    };
    let Ok(mut mac) = keyed(salt.as_bytes()) else {
        return false;
    };
    mac.update(token.trim().to_ascii_lowercase().as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Why a presented proof was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProofRejection {
    #[error("Resource not found")]
    NotFound,
    #[error("Proof already used")]
    AlreadyUsed,
    #[error("Resource is not a draft")]
    WrongStatus,
    #[error("Invalid proof token")]
    InvalidToken,
}

impl ProofRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::AlreadyUsed => "already_used",
            Self::WrongStatus => "wrong_status",
            Self::InvalidToken => "invalid_token",
        }
    }
}

#[derive(Debug, Error)]
pub enum ProofError {
    #[error(transparent)]
    Rejected(#[from] ProofRejection),

    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

/// A draft whose proof checked out. Only [`ProofVerifier::verify`] makes one.
#[derive(Debug, Clone)]
pub struct VerifiedProof {
    resource: resource::Model,
}

impl VerifiedProof {
    pub fn resource(&self) -> &resource::Model {
        &self.resource
    }
}

/// Where and how a resource got published.
#[derive(Debug, Clone, Default)]
pub struct Publication {
    pub post_id: String,
    pub post_url: Option<String>,
    /// Replaces the creation-time price when set and positive.
    pub price_override_minor_units: Option<i64>,
}

#[derive(Debug, Clone)]
pub enum ConsumeOutcome {
    Published(resource::Model),
    /// Another writer consumed or changed the proof first.
    Lost,
}

pub struct ProofVerifier<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> ProofVerifier<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Read-only check of `token` against the resource's stored proof.
    pub async fn verify(&self, resource_id: Uuid, token: &str) -> Result<VerifiedProof, ProofError> {
        let resource = resource::Entity::find_by_id(resource_id)
            .one(self.conn)
            .await?
            .ok_or(ProofRejection::NotFound)?;

        if resource.proof_used_at.is_some() {
            return Err(ProofRejection::AlreadyUsed.into());
        }
        if resource.status != ResourceStatus::Draft {
            return Err(ProofRejection::WrongStatus.into());
        }
        if !matches(token, &resource.proof_salt, &resource.proof_hash) {
            return Err(ProofRejection::InvalidToken.into());
        }

        Ok(VerifiedProof { resource })
    }

    /// Mark the proof used and publish, in one conditional update.
    pub async fn consume(
        &self,
        verified: &VerifiedProof,
        publication: &Publication,
    ) -> Result<ConsumeOutcome, DbErr> {
        let id = verified.resource.id;
        let now = Utc::now();

        let mut update = resource::ActiveModel {
            status: Set(ResourceStatus::Published),
            proof_used_at: Set(Some(now)),
            published_at: Set(Some(now)),
            social_post_id: Set(Some(publication.post_id.clone())),
            social_post_url: Set(publication.post_url.clone()),
            updated_at: Set(now),
            ..Default::default()
        };
        if let Some(price) = publication.price_override_minor_units.filter(|p| *p > 0) {
            update.price_minor_units = Set(price);
        }

        let result = resource::Entity::update_many()
            .set(update)
            .filter(resource::Column::Id.eq(id))
            .filter(resource::Column::ProofUsedAt.is_null())
            .filter(resource::Column::Status.eq(ResourceStatus::Draft))
            .exec(self.conn)
            .await?;

        if result.rows_affected == 0 {
            debug!(resource_id = %id, "Proof consumption lost the race");
            return Ok(ConsumeOutcome::Lost);
        }

        let published = resource::Entity::find_by_id(id)
            .one(self.conn)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("resource {id} vanished after publish")))?;

        info!(resource_id = %id, post_id = %publication.post_id, "Resource published");
        Ok(ConsumeOutcome::Published(published))
    }

    /// Verify then consume. A lost race is re-checked so the caller gets
    /// the reason the proof no longer holds.
    pub async fn publish(
        &self,
        resource_id: Uuid,
        token: &str,
        publication: &Publication,
    ) -> Result<resource::Model, ProofError> {
        let verified = self.verify(resource_id, token).await?;

        match self.consume(&verified, publication).await? {
            ConsumeOutcome::Published(model) => Ok(model),
            ConsumeOutcome::Lost => match self.verify(resource_id, token).await {
                Err(e) => Err(e),
                Ok(_) => Err(ProofRejection::AlreadyUsed.into()),
            },
        }
    }
}
