use thiserror::Error;

use crate::social::SocialError;

/// Failures while bringing the worker up.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("MQ error: {0}")]
    Mq(String),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Vault error: {0}")]
    Vault(#[from] vault::CryptoError),

    #[error("Social platform error: {0}")]
    Social(#[from] SocialError),
}

impl From<mq::error::MqError> for WorkerError {
    fn from(e: mq::error::MqError) -> Self {
        WorkerError::Mq(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WorkerError>;
