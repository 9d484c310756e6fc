use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::dlq::DlqStats;
use crate::entity::dead_letter_message;

use super::shared::Pagination;

/// Query parameters for listing DLQ messages.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListDlqParams {
    /// Filter by message type (ingestion, verification, reply, purchase).
    #[param(example = "verification")]
    pub message_type: Option<String>,
    /// Filter by resolved status.
    #[param(example = false)]
    pub resolved: Option<bool>,
    /// Page number (1-indexed).
    #[param(example = 1)]
    pub page: Option<u64>,
    /// Items per page (1-100, default 20).
    #[param(example = 20)]
    pub per_page: Option<u64>,
}

/// DLQ message summary for list views.
#[derive(Serialize, utoipa::ToSchema)]
pub struct DlqMessageResponse {
    #[schema(example = 1)]
    pub id: i32,
    #[schema(example = "0190f1c2-7d7e-7c9a-b1f5-3a9c1d2e4f60")]
    pub message_id: String,
    #[schema(example = "verification")]
    pub message_type: String,
    /// Resource the message concerns (null when it could not be determined).
    pub resource_id: Option<Uuid>,
    #[schema(example = "MAX_RETRIES_EXCEEDED")]
    pub error_code: String,
    #[schema(example = "Database connection timeout")]
    pub error_message: String,
    #[schema(example = 3)]
    pub retry_count: i32,
    pub first_failed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[schema(example = false)]
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Operator who resolved this message (null for automatic resolution).
    pub resolved_by: Option<String>,
}

impl From<dead_letter_message::Model> for DlqMessageResponse {
    fn from(m: dead_letter_message::Model) -> Self {
        Self {
            id: m.id,
            message_id: m.message_id,
            message_type: m.message_type,
            resource_id: m.resource_id,
            error_code: m.error_code,
            error_message: m.error_message,
            retry_count: m.retry_count,
            first_failed_at: m.first_failed_at,
            created_at: m.created_at,
            resolved: m.resolved,
            resolved_at: m.resolved_at,
            resolved_by: m.resolved_by,
        }
    }
}

/// Full DLQ message details.
#[derive(Serialize, utoipa::ToSchema)]
pub struct DlqMessageDetailResponse {
    #[serde(flatten)]
    pub summary: DlqMessageResponse,
    /// Full message payload for replay.
    pub payload: serde_json::Value,
    /// Retry history: array of {attempt, error, timestamp}.
    pub retry_history: serde_json::Value,
}

impl From<dead_letter_message::Model> for DlqMessageDetailResponse {
    fn from(mut m: dead_letter_message::Model) -> Self {
        let payload = std::mem::take(&mut m.payload);
        let retry_history = std::mem::take(&mut m.retry_history);
        Self {
            summary: m.into(),
            payload,
            retry_history,
        }
    }
}

/// Paginated list of DLQ messages.
#[derive(Serialize, utoipa::ToSchema)]
pub struct DlqListResponse {
    pub data: Vec<DlqMessageResponse>,
    pub pagination: Pagination,
}

/// Unresolved message counts by message type.
#[derive(Serialize, utoipa::ToSchema)]
pub struct MessageTypeCounts {
    #[schema(example = 1)]
    pub ingestion: u64,
    #[schema(example = 2)]
    pub verification: u64,
    #[schema(example = 0)]
    pub reply: u64,
    #[schema(example = 1)]
    pub purchase: u64,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct DlqStatsResponse {
    /// Total unresolved (active) messages.
    #[schema(example = 4)]
    pub total_unresolved: u64,
    #[schema(example = 42)]
    pub total_resolved: u64,
    pub unresolved_by_message_type: MessageTypeCounts,
    pub unresolved_by_error_code: HashMap<String, u64>,
}

impl From<DlqStats> for DlqStatsResponse {
    fn from(s: DlqStats) -> Self {
        let count = |t: &str| s.unresolved_by_message_type.get(t).copied().unwrap_or(0);
        Self {
            total_unresolved: s.total_unresolved,
            total_resolved: s.total_resolved,
            unresolved_by_message_type: MessageTypeCounts {
                ingestion: count("ingestion"),
                verification: count("verification"),
                reply: count("reply"),
                purchase: count("purchase"),
            },
            unresolved_by_error_code: s.unresolved_by_error_code,
        }
    }
}

/// Response for retry action.
#[derive(Serialize, utoipa::ToSchema)]
pub struct DlqRetryResponse {
    #[schema(example = "Message requeued on verification")]
    pub message: String,
    /// Queue the payload was published to.
    #[schema(example = "verification")]
    pub queue: String,
}
