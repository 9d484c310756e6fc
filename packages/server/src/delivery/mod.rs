//! Payment-gated release of resource bodies.
//!
//! A fetch walks a fixed sequence: load the published resource, advertise
//! requirements, verify the attached payment, record a pending purchase,
//! decrypt and check integrity, settle, then release. The purchase row is
//! written before settlement so every verified payment leaves a trace even
//! if the process dies before the facilitator answers.

pub mod watermark;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use common::price::minor_units_to_atomic;
use sea_orm::DbErr;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;
use vault::entity::resource;
use vault::{ContentError, NewPurchase, PurchaseLedger, SettlementRecord};

use crate::config::AppConfig;
use crate::payment::{PaymentError, PaymentPayload, PaymentRequirements, SettleResponse};
use crate::state::AppState;
use watermark::Watermarker;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Resource not found")]
    NotFound,

    #[error("Payment verification failed: {0}")]
    PaymentInvalid(String),

    /// Decryption or hash check failed. Never retried.
    #[error("Content integrity check failed")]
    ContentCorrupted,

    #[error("Payment settlement failed: {0}")]
    SettlementFailed(String),

    #[error("Facilitator unavailable: {0}")]
    Facilitator(#[source] PaymentError),

    #[error("Cannot price resource: {0}")]
    Pricing(String),

    #[error("Storage error: {0}")]
    Storage(#[from] DbErr),
}

impl From<ContentError> for DeliveryError {
    fn from(err: ContentError) -> Self {
        match err {
            ContentError::Database(e) => DeliveryError::Storage(e),
            _ => DeliveryError::ContentCorrupted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyEncoding {
    Utf8,
    Base64,
}

impl BodyEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Utf8 => "utf8",
            Self::Base64 => "base64",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeliveredContent {
    pub body: String,
    pub encoding: BodyEncoding,
    pub resource_id: Uuid,
    pub owner_id: String,
    pub owner_handle: String,
    pub content_type: String,
    pub purchase_id: Uuid,
    pub purchased_at: DateTime<Utc>,
    pub receipt: SettleResponse,
}

#[derive(Debug, Clone)]
pub enum Delivery {
    /// No payment attached. Not an error; the client retries with one.
    PaymentRequired(PaymentRequirements),
    Content(Box<DeliveredContent>),
}

/// Requirements a client must satisfy to buy `resource`.
pub fn requirements_for(
    resource: &resource::Model,
    config: &AppConfig,
) -> Result<PaymentRequirements, DeliveryError> {
    let amount = minor_units_to_atomic(resource.price_minor_units, config.payment.asset_decimals)
        .ok_or_else(|| {
            DeliveryError::Pricing(format!(
                "{} minor units at {} decimals",
                resource.price_minor_units, config.payment.asset_decimals
            ))
        })?;

    Ok(PaymentRequirements {
        scheme: "exact".into(),
        network: config.payment.network.clone(),
        max_amount_required: amount.to_string(),
        resource: config.resource_url(&resource.id),
        description: format!("Content by @{}", resource.owner_handle),
        mime_type: resource.content_type.clone(),
        pay_to: config.payment.pay_to.clone(),
        max_timeout_seconds: config.payment.max_timeout_seconds,
        asset: config.payment.asset.clone(),
        extra: Some(serde_json::json!({
            "currency": resource.currency,
            "priceMinorUnits": resource.price_minor_units,
        })),
    })
}

/// Text bodies go out as UTF-8, everything else as base64.
fn render_body(content_type: &str, plaintext: Vec<u8>) -> (String, BodyEncoding) {
    if content_type.starts_with("text/") {
        match String::from_utf8(plaintext) {
            Ok(text) => return (text, BodyEncoding::Utf8),
            Err(e) => return (STANDARD.encode(e.into_bytes()), BodyEncoding::Base64),
        }
    }
    (STANDARD.encode(plaintext), BodyEncoding::Base64)
}

pub struct DeliveryService<'a> {
    state: &'a AppState,
    watermarker: Option<Watermarker>,
}

impl<'a> DeliveryService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        let delivery = &state.config.delivery;
        let watermarker = if delivery.watermark_enabled {
            Watermarker::new(&delivery.watermark_secret)
        } else {
            None
        };
        Self { state, watermarker }
    }

    pub async fn deliver(
        &self,
        resource_id: Uuid,
        payment_header: Option<&str>,
    ) -> Result<Delivery, DeliveryError> {
        let state = self.state;

        let resource = state
            .store
            .find(&state.db, resource_id)
            .await?
            .filter(|r| r.status.is_published())
            .ok_or(DeliveryError::NotFound)?;

        let requirements = requirements_for(&resource, &state.config)?;

        let Some(header) = payment_header else {
            return Ok(Delivery::PaymentRequired(requirements));
        };

        let payment = PaymentPayload::from_header(header).map_err(|e| {
            warn!(%resource_id, failure_class = "payment_verification", error = %e, "Rejected payment header");
            DeliveryError::PaymentInvalid(e.to_string())
        })?;

        let verdict = state
            .facilitator
            .verify(&payment, &requirements)
            .await
            .map_err(|e| {
                error!(%resource_id, failure_class = "payment_verification", error = %e, "Facilitator verify failed");
                DeliveryError::Facilitator(e)
            })?;

        if !verdict.is_valid {
            let reason = verdict
                .invalid_reason
                .unwrap_or_else(|| "payment rejected".to_string());
            warn!(%resource_id, failure_class = "payment_verification", %reason, "Payment invalid");
            return Err(DeliveryError::PaymentInvalid(reason));
        }

        let purchase = PurchaseLedger::new(&state.db)
            .record_pending(NewPurchase {
                resource_id,
                amount_minor_units: resource.price_minor_units,
                currency: resource.currency.clone(),
                chain: resource.chain.clone(),
                network: state.config.payment.network.clone(),
            })
            .await
            .map_err(|e| match e {
                DbErr::RecordNotFound(_) => DeliveryError::NotFound,
                other => DeliveryError::Storage(other),
            })?;

        let plaintext = state.store.open(&resource).map_err(|e| {
            error!(%resource_id, purchase_id = %purchase.id, failure_class = "integrity", "Stored content failed integrity check");
            DeliveryError::from(e)
        })?;

        let receipt = match state.facilitator.settle(&payment, &requirements).await {
            Ok(receipt) if receipt.success => receipt,
            Ok(receipt) => {
                let reason = receipt
                    .error_reason
                    .unwrap_or_else(|| "settlement rejected".to_string());
                error!(%resource_id, purchase_id = %purchase.id, failure_class = "settlement", %reason, "Settlement rejected");
                return Err(DeliveryError::SettlementFailed(reason));
            }
            Err(e) => {
                error!(%resource_id, purchase_id = %purchase.id, failure_class = "settlement", error = %e, "Settlement failed");
                return Err(DeliveryError::SettlementFailed(e.to_string()));
            }
        };

        let settled = PurchaseLedger::new(&state.db)
            .mark_settled(
                purchase.id,
                SettlementRecord {
                    reference: receipt.transaction.clone(),
                    payer: receipt.payer.clone().or(verdict.payer),
                },
            )
            .await?;
        if !settled {
            warn!(purchase_id = %purchase.id, "Purchase was no longer pending when settling");
        }

        let (mut body, encoding) = render_body(&resource.content_type, plaintext);
        if let (Some(wm), BodyEncoding::Utf8) = (&self.watermarker, encoding) {
            let mark = wm.mark_id(resource_id, purchase.id, Utc::now().timestamp_millis());
            body = watermark::embed(&body, &mark);
        }

        info!(
            %resource_id,
            purchase_id = %purchase.id,
            transaction = receipt.transaction.as_deref().unwrap_or(""),
            "Content delivered"
        );

        Ok(Delivery::Content(Box::new(DeliveredContent {
            body,
            encoding,
            resource_id,
            owner_id: resource.owner_id,
            owner_handle: resource.owner_handle,
            content_type: resource.content_type,
            purchase_id: purchase.id,
            purchased_at: purchase.created_at,
            receipt,
        })))
    }
}
