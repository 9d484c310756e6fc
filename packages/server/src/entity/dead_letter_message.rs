use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A job or purchase that needs an operator.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "dead_letter_message")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Job id of the failed message, or `stuck-purchase-{id}`.
    #[sea_orm(unique)]
    pub message_id: String,

    /// ingestion, verification, reply or purchase.
    #[sea_orm(indexed)]
    pub message_type: String,

    #[sea_orm(indexed)]
    pub resource_id: Option<Uuid>,

    #[sea_orm(column_type = "JsonBinary")]
    pub payload: serde_json::Value,

    #[sea_orm(column_type = "Text")]
    pub error_message: String,

    /// MAX_RETRIES_EXCEEDED, DESERIALIZATION_ERROR or STUCK_PURCHASE.
    #[sea_orm(indexed)]
    pub error_code: String,

    pub retry_count: i32,

    /// [{attempt, error, timestamp}]
    #[sea_orm(column_type = "JsonBinary")]
    pub retry_history: serde_json::Value,

    pub first_failed_at: DateTimeUtc,

    pub created_at: DateTimeUtc,

    #[sea_orm(default_value = false, indexed)]
    pub resolved: bool,

    pub resolved_at: Option<DateTimeUtc>,

    /// Owner id of the operator, null when resolved automatically.
    pub resolved_by: Option<String>,
}

impl ActiveModelBehavior for ActiveModel {}
