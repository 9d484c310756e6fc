use chrono::{DateTime, Utc};
use common::ResourceStatus;
use common::price::format_minor_units;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vault::entity::resource;

use crate::delivery::DeliveredContent;
use crate::payment::{PaymentRequirements, X402_VERSION};

/// Body of `POST /resources` and `POST /resources/submissions`.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateResourceRequest {
    /// Plain text body to lock.
    #[schema(example = "Alpha: the launch is on Friday.")]
    pub content: String,
    /// Platform-side message id. Generated when absent.
    #[schema(example = "1790112233445566778")]
    pub source_message_id: Option<String>,
    /// Defaults to `api`.
    #[schema(example = "twitter")]
    pub source_platform: Option<String>,
    #[schema(example = "text/plain")]
    pub content_type: Option<String>,
    /// Price in USD cents. Defaults to the configured price.
    #[schema(example = 20)]
    pub price_minor_units: Option<i64>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct CreateResourceResponse {
    pub resource_id: Uuid,
    /// Single-use token that publishes the resource.
    #[schema(example = "3f2a-9b41-07cc-e5d8")]
    pub proof_token: String,
    /// `true` when this source message had already been ingested.
    pub duplicate: bool,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct SubmitResourceResponse {
    #[schema(example = "0190f1c2-7d7e-7c9a-b1f5-3a9c1d2e4f60")]
    pub job_id: String,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct PriceView {
    /// Decimal dollar amount with two places.
    #[schema(example = "0.20")]
    pub usd: String,
    #[schema(example = 20)]
    pub minor_units: i64,
    #[schema(example = "USDC")]
    pub currency: String,
}

/// Public, read-only view of a resource.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ResourcePreviewResponse {
    pub id: Uuid,
    pub owner_id: String,
    #[schema(example = "alice")]
    pub owner_handle: String,
    #[schema(example = "text/plain")]
    pub content_type: String,
    pub price: PriceView,
    #[schema(example = "solana")]
    pub chain: String,
    #[schema(example = "solana-devnet")]
    pub network: String,
    pub status: ResourceStatus,
    pub social_post_id: Option<String>,
    pub social_post_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl ResourcePreviewResponse {
    pub fn new(m: resource::Model, network: &str) -> Self {
        Self {
            id: m.id,
            owner_id: m.owner_id,
            owner_handle: m.owner_handle,
            content_type: m.content_type,
            price: PriceView {
                usd: format_minor_units(m.price_minor_units),
                minor_units: m.price_minor_units,
                currency: m.currency,
            },
            chain: m.chain,
            network: network.to_string(),
            status: m.status,
            social_post_id: m.social_post_id,
            social_post_url: m.social_post_url,
            published_at: m.published_at,
        }
    }
}

/// 402 body: what to pay and how.
#[derive(Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequiredResponse {
    #[schema(example = 1)]
    pub x402_version: u8,
    #[schema(example = "X-PAYMENT header is required")]
    pub error: String,
    pub accepts: Vec<PaymentRequirements>,
}

impl PaymentRequiredResponse {
    pub fn new(requirements: PaymentRequirements) -> Self {
        Self {
            x402_version: X402_VERSION,
            error: "X-PAYMENT header is required".into(),
            accepts: vec![requirements],
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ContentMetadata {
    pub resource_id: Uuid,
    pub owner_id: String,
    pub owner_handle: String,
    pub content_type: String,
    pub purchase_id: Uuid,
    pub purchased_at: DateTime<Utc>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ContentResponse {
    /// The body, as UTF-8 text or base64 depending on `encoding`.
    pub content: String,
    #[schema(example = "utf8")]
    pub encoding: String,
    pub metadata: ContentMetadata,
}

impl From<DeliveredContent> for ContentResponse {
    fn from(d: DeliveredContent) -> Self {
        Self {
            content: d.body,
            encoding: d.encoding.as_str().to_string(),
            metadata: ContentMetadata {
                resource_id: d.resource_id,
                owner_id: d.owner_id,
                owner_handle: d.owner_handle,
                content_type: d.content_type,
                purchase_id: d.purchase_id,
                purchased_at: d.purchased_at,
            },
        }
    }
}
