//! x402 payment protocol types and the facilitator seam.
//!
//! Clients pay by sending an `X-PAYMENT` header holding a base64 encoded JSON
//! payment payload. The server never inspects the payload itself; it hands it
//! to a facilitator together with the requirements it advertised, first to
//! verify and later to settle.

pub mod http;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::HttpFacilitator;

pub const X402_VERSION: u8 = 1;
pub const PAYMENT_HEADER: &str = "X-PAYMENT";
pub const PAYMENT_RESPONSE_HEADER: &str = "X-PAYMENT-RESPONSE";

/// What a client has to pay to access one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    #[schema(example = "exact")]
    pub scheme: String,
    #[schema(example = "solana-devnet")]
    pub network: String,
    /// Amount in the asset's atomic units, as a decimal string.
    #[schema(example = "200000")]
    pub max_amount_required: String,
    #[schema(example = "https://pay.example.com/api/v1/resources/0190f1c2-7d7e-7c9a-b1f5-3a9c1d2e4f60")]
    pub resource: String,
    #[schema(example = "Content by @alice")]
    pub description: String,
    #[schema(example = "text/plain")]
    pub mime_type: String,
    pub pay_to: String,
    #[schema(example = 60)]
    pub max_timeout_seconds: u64,
    pub asset: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// Decoded `X-PAYMENT` header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: u8,
    pub scheme: String,
    pub network: String,
    /// Scheme specific proof of payment, forwarded untouched.
    pub payload: serde_json::Value,
}

impl PaymentPayload {
    pub fn from_header(value: &str) -> Result<Self, PaymentError> {
        let bytes = STANDARD
            .decode(value.trim())
            .map_err(|e| PaymentError::MalformedHeader(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| PaymentError::MalformedHeader(e.to_string()))
    }

    pub fn to_header(&self) -> Result<String, PaymentError> {
        Ok(STANDARD.encode(serde_json::to_vec(self)?))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

/// Settlement receipt. Echoed back to the client in `X-PAYMENT-RESPONSE`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

impl SettleResponse {
    pub fn to_header(&self) -> Result<String, PaymentError> {
        Ok(STANDARD.encode(serde_json::to_vec(self)?))
    }
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Malformed payment header: {0}")]
    MalformedHeader(String),

    #[error("Facilitator request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Facilitator returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Verifies and settles payments on behalf of the server.
#[async_trait]
pub trait PaymentFacilitator: Send + Sync {
    async fn verify(
        &self,
        payment: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse, PaymentError>;

    async fn settle(
        &self,
        payment: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleResponse, PaymentError>;
}
