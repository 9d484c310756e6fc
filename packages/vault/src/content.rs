use chrono::Utc;
use common::ResourceStatus;
use common::config::VaultConfig;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set, SqlErr,
};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::crypto::{ContentCipher, ContentHash, CryptoError};
use crate::entity::resource;
use crate::proof::ProofIssuer;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Ciphertext does not decrypt, or decrypts to something whose hash
    /// differs from the one recorded at ingestion.
    #[error("Content integrity check failed")]
    Corrupted,

    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

/// Input to [`ContentStore::store`].
#[derive(Debug, Clone)]
pub struct NewContent {
    pub owner_id: String,
    pub owner_handle: String,
    pub content: Vec<u8>,
    pub source_platform: String,
    pub source_message_id: String,
    pub content_type: Option<String>,
    pub price_minor_units: Option<i64>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct StoredContent {
    pub resource_id: Uuid,
    pub proof_token: String,
    /// `false` when the source message had already been ingested.
    pub is_new: bool,
}

impl std::fmt::Debug for StoredContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredContent")
            .field("resource_id", &self.resource_id)
            .field("is_new", &self.is_new)
            .finish_non_exhaustive()
    }
}

/// Values applied when ingestion leaves them out.
#[derive(Debug, Clone)]
pub struct ResourceDefaults {
    pub price_minor_units: i64,
    pub currency: String,
    pub chain: String,
    pub content_type: String,
}

impl From<&VaultConfig> for ResourceDefaults {
    fn from(config: &VaultConfig) -> Self {
        Self {
            price_minor_units: config.default_price_minor_units,
            currency: config.default_currency.clone(),
            chain: config.default_chain.clone(),
            content_type: config.default_content_type.clone(),
        }
    }
}

/// Encrypts, hashes and persists resource bodies.
#[derive(Debug, Clone)]
pub struct ContentStore {
    cipher: ContentCipher,
    issuer: ProofIssuer,
    defaults: ResourceDefaults,
}

impl ContentStore {
    pub fn new(cipher: ContentCipher, issuer: ProofIssuer, defaults: ResourceDefaults) -> Self {
        Self {
            cipher,
            issuer,
            defaults,
        }
    }

    /// Fails when the encryption key or proof secret is unusable.
    pub fn from_config(config: &VaultConfig) -> Result<Self, CryptoError> {
        Ok(Self::new(
            ContentCipher::from_hex(&config.encryption_key)?,
            ProofIssuer::new(&config.proof_secret)?,
            ResourceDefaults::from(config),
        ))
    }

    pub fn defaults(&self) -> &ResourceDefaults {
        &self.defaults
    }

    /// Store new content, or return the existing resource for a source
    /// message that was already ingested.
    pub async fn store<C: ConnectionTrait>(
        &self,
        conn: &C,
        input: NewContent,
    ) -> Result<StoredContent, ContentError> {
        validate(&input)?;

        if let Some(existing) =
            find_by_source(conn, &input.source_platform, &input.source_message_id).await?
        {
            debug!(
                resource_id = %existing.id,
                source_platform = %input.source_platform,
                source_message_id = %input.source_message_id,
                "Duplicate ingestion"
            );
            return self.replay(&existing);
        }

        let id = Uuid::now_v7();
        let sealed = self.cipher.seal(&input.content)?;
        let content_hash = ContentHash::compute(&input.content);
        let proof = self.issuer.issue(id)?;
        let now = Utc::now();

        let model = resource::ActiveModel {
            id: Set(id),
            owner_id: Set(input.owner_id),
            owner_handle: Set(input.owner_handle),
            ciphertext: Set(sealed.ciphertext),
            iv: Set(sealed.iv.to_vec()),
            auth_tag: Set(sealed.auth_tag.to_vec()),
            content_hash: Set(content_hash.to_hex()),
            content_type: Set(input
                .content_type
                .unwrap_or_else(|| self.defaults.content_type.clone())),
            proof_hash: Set(proof.hash),
            proof_salt: Set(proof.salt),
            proof_issued_at: Set(now),
            proof_used_at: Set(None),
            status: Set(ResourceStatus::Draft),
            price_minor_units: Set(input
                .price_minor_units
                .unwrap_or(self.defaults.price_minor_units)),
            currency: Set(self.defaults.currency.clone()),
            chain: Set(self.defaults.chain.clone()),
            social_post_id: Set(None),
            social_post_url: Set(None),
            published_at: Set(None),
            source_platform: Set(input.source_platform.clone()),
            source_message_id: Set(input.source_message_id.clone()),
            purchase_count: Set(0),
            revenue_minor_units: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };

        match model.insert(conn).await {
            Ok(inserted) => {
                info!(resource_id = %inserted.id, "Resource stored");
                Ok(StoredContent {
                    resource_id: inserted.id,
                    proof_token: proof.token,
                    is_new: true,
                })
            }
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                warn!(
                    source_platform = %input.source_platform,
                    source_message_id = %input.source_message_id,
                    "Concurrent ingestion of the same source message"
                );
                let existing =
                    find_by_source(conn, &input.source_platform, &input.source_message_id)
                        .await?
                        .ok_or_else(|| {
                            DbErr::Custom(
                                "UniqueConstraintViolation but existing row not found".to_string(),
                            )
                        })?;
                self.replay(&existing)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn replay(&self, existing: &resource::Model) -> Result<StoredContent, ContentError> {
        Ok(StoredContent {
            resource_id: existing.id,
            proof_token: self.issuer.reissue(existing.id, &existing.proof_salt)?,
            is_new: false,
        })
    }

    /// Decrypt a resource body and check it against the recorded hash.
    pub fn open(&self, resource: &resource::Model) -> Result<Vec<u8>, ContentError> {
        let plaintext = self
            .cipher
            .open(&resource.ciphertext, &resource.iv, &resource.auth_tag)
            .map_err(|_| ContentError::Corrupted)?;

        if !ContentHash::compute(&plaintext).matches_hex(&resource.content_hash) {
            return Err(ContentError::Corrupted);
        }

        Ok(plaintext)
    }

    pub async fn find<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: Uuid,
    ) -> Result<Option<resource::Model>, ContentError> {
        Ok(resource::Entity::find_by_id(id).one(conn).await?)
    }
}

fn validate(input: &NewContent) -> Result<(), ContentError> {
    if input.content.is_empty() {
        return Err(ContentError::Validation("content must not be empty".into()));
    }
    if input.owner_id.trim().is_empty() {
        return Err(ContentError::Validation("owner_id must not be empty".into()));
    }
    if input.source_platform.trim().is_empty() || input.source_message_id.trim().is_empty() {
        return Err(ContentError::Validation(
            "source_platform and source_message_id must not be empty".into(),
        ));
    }
    if input.price_minor_units.is_some_and(|p| p <= 0) {
        return Err(ContentError::Validation("price must be positive".into()));
    }
    Ok(())
}

async fn find_by_source<C: ConnectionTrait>(
    conn: &C,
    platform: &str,
    message_id: &str,
) -> Result<Option<resource::Model>, DbErr> {
    resource::Entity::find()
        .filter(resource::Column::SourcePlatform.eq(platform))
        .filter(resource::Column::SourceMessageId.eq(message_id))
        .one(conn)
        .await
}
