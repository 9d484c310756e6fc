use std::sync::Arc;

use mq::JobSink;
use sea_orm::DatabaseConnection;
use vault::ContentStore;

use crate::config::AppConfig;
use crate::payment::PaymentFacilitator;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: AppConfig,
    pub store: ContentStore,
    pub facilitator: Arc<dyn PaymentFacilitator>,
    /// Absent when the message queue is disabled.
    pub jobs: Option<Arc<dyn JobSink>>,
}
