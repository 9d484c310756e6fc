use std::fmt::Debug;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::dlq::DlqMessageType;

/// A unit of work carried on a queue.
pub trait Job: Serialize + DeserializeOwned + Debug + Send + Sync + Clone + 'static {
    /// DLQ category used when this job exhausts its retries.
    fn kind() -> DlqMessageType
    where
        Self: Sized;

    fn job_id(&self) -> &str;

    /// Resource the job concerns, if it is known up front.
    fn resource_id(&self) -> Option<Uuid> {
        None
    }
}

pub fn new_job_id() -> String {
    Uuid::now_v7().to_string()
}

/// "Content submitted" event: raw content plus the creator's identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IngestionJob {
    pub job_id: String,
    pub owner_id: String,
    pub handle: String,
    pub content: String,
    /// Platform the content arrived from (e.g. "twitter", "api").
    pub source_platform: String,
    /// Platform-side message id; together with the platform this is the
    /// idempotency key of the resulting resource.
    pub source_message_id: String,
    pub content_type: Option<String>,
    pub price_minor_units: Option<i64>,
    pub received_at: DateTime<Utc>,
}

impl Job for IngestionJob {
    fn kind() -> DlqMessageType {
        DlqMessageType::Ingestion
    }

    fn job_id(&self) -> &str {
        &self.job_id
    }
}

/// "Mention detected" event. Only actionable mentions (id and proof
/// present) are ever enqueued.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VerificationJob {
    pub job_id: String,
    pub post_id: String,
    pub author_id: String,
    pub handle: String,
    pub raw_text: String,
    /// Resource id exactly as written in the post; it may not parse.
    pub resource_id: String,
    pub proof: String,
    /// Decimal price string from the `lock:` tag.
    pub price: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Job for VerificationJob {
    fn kind() -> DlqMessageType {
        DlqMessageType::Verification
    }

    fn job_id(&self) -> &str {
        &self.job_id
    }

    fn resource_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.resource_id).ok()
    }
}

/// Where an outbound reply is delivered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplyTarget {
    /// Public reply under a post.
    Post { post_id: String },
    /// Private message to a user.
    DirectMessage { user_id: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplyJob {
    pub job_id: String,
    pub target: ReplyTarget,
    pub text: String,
    pub resource_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl ReplyJob {
    pub fn new(target: ReplyTarget, text: impl Into<String>, resource_id: Option<Uuid>) -> Self {
        Self {
            job_id: new_job_id(),
            target,
            text: text.into(),
            resource_id,
            created_at: Utc::now(),
        }
    }
}

impl Job for ReplyJob {
    fn kind() -> DlqMessageType {
        DlqMessageType::Reply
    }

    fn job_id(&self) -> &str {
        &self.job_id
    }

    fn resource_id(&self) -> Option<Uuid> {
        self.resource_id
    }
}
