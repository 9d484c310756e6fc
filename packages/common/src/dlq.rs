use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::retry::RetryAttempt;

/// Error codes for dead-lettered messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DlqErrorCode {
    /// All retry attempts exhausted.
    MaxRetriesExceeded,
    /// Failed to deserialize message payload.
    DeserializationError,
    /// Purchase stayed pending past the settlement window.
    StuckPurchase,
}

impl DlqErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MaxRetriesExceeded => "MAX_RETRIES_EXCEEDED",
            Self::DeserializationError => "DESERIALIZATION_ERROR",
            Self::StuckPurchase => "STUCK_PURCHASE",
        }
    }
}

impl std::fmt::Display for DlqErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What kind of work ended up in the dead letter queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DlqMessageType {
    Ingestion,
    Verification,
    Reply,
    /// A purchase that was verified but never settled.
    Purchase,
}

impl DlqMessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingestion => "ingestion",
            Self::Verification => "verification",
            Self::Reply => "reply",
            Self::Purchase => "purchase",
        }
    }

    /// Whether an operator can push the payload back onto its queue.
    pub fn is_requeueable(&self) -> bool {
        !matches!(self, Self::Purchase)
    }
}

impl std::fmt::Display for DlqMessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DlqMessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ingestion" => Ok(Self::Ingestion),
            "verification" => Ok(Self::Verification),
            "reply" => Ok(Self::Reply),
            "purchase" => Ok(Self::Purchase),
            _ => Err(format!(
                "Invalid message_type '{}'. Must be one of: ingestion, verification, reply, purchase",
                s
            )),
        }
    }
}

/// Envelope for transporting failed jobs to the DLQ.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEnvelope {
    /// Original job id.
    pub message_id: String,
    pub message_type: DlqMessageType,
    /// Resource the job was about, when known.
    pub resource_id: Option<Uuid>,
    /// Full serialized job, for replay.
    pub payload: serde_json::Value,
    pub error_code: DlqErrorCode,
    pub error_message: String,
    pub retry_history: Vec<RetryAttempt>,
}
