use common::ResourceStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// An encrypted, priced unit of content.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "resource")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(indexed)]
    pub owner_id: String,
    pub owner_handle: String,

    /// AES-256-GCM output without the tag.
    #[serde(skip)]
    pub ciphertext: Vec<u8>,
    #[serde(skip)]
    pub iv: Vec<u8>,
    #[serde(skip)]
    pub auth_tag: Vec<u8>,
    /// Hex SHA-256 of the plaintext.
    pub content_hash: String,
    pub content_type: String,

    /// Hex HMAC-SHA256 of the proof token, keyed by `proof_salt`.
    #[serde(skip)]
    pub proof_hash: String,
    #[serde(skip)]
    pub proof_salt: String,
    pub proof_issued_at: DateTimeUtc,
    /// Set exactly once, together with the move to `Published`.
    pub proof_used_at: Option<DateTimeUtc>,

    #[sea_orm(indexed)]
    pub status: ResourceStatus,

    /// USD cents.
    pub price_minor_units: i64,
    pub currency: String,
    pub chain: String,

    pub social_post_id: Option<String>,
    pub social_post_url: Option<String>,
    pub published_at: Option<DateTimeUtc>,

    /// Ingestion idempotency key, together with `source_message_id`.
    #[sea_orm(unique_key = "source_message")]
    pub source_platform: String,
    #[sea_orm(unique_key = "source_message")]
    pub source_message_id: String,

    pub purchase_count: i64,
    pub revenue_minor_units: i64,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
