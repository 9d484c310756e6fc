use std::sync::Arc;

use mq::{Mq, MqConfig, init_mq};
use sea_orm::DatabaseConnection;
use tracing::{info, warn};
use vault::ContentStore;
use vault::database::init_db;

use crate::config::WorkerAppConfig;
use crate::dedup::{DedupStore, DedupTracker, MemoryDedupStore, RedisDedupStore};
use crate::error::Result;
use crate::social::{SocialClient, XClient};

/// Connections shared by the queue consumers and the poller.
pub struct Services {
    pub db: DatabaseConnection,
    pub store: ContentStore,
    pub social: Arc<dyn SocialClient>,
    pub mq: Arc<Mq>,
    pub dedup: DedupTracker,
}

impl Services {
    pub async fn connect(config: &WorkerAppConfig) -> Result<Self> {
        let db = init_db(&config.database.url).await?;
        let store = ContentStore::from_config(&config.vault)?;
        let social: Arc<dyn SocialClient> = Arc::new(XClient::from_config(&config.social)?);

        let mq = Arc::new(
            init_mq(MqConfig {
                url: config.mq.url.clone(),
                pool_size: config.mq.pool_size,
            })
            .await?,
        );
        info!(dlq_queue_name = %config.mq.dlq_queue_name, "MQ connected");

        let dedup_url = config
            .dedup
            .redis_url
            .as_deref()
            .unwrap_or(&config.mq.url);
        let dedup_store: Arc<dyn DedupStore> = match RedisDedupStore::connect(
            dedup_url,
            config.dedup.key_prefix.clone(),
            config.dedup.ttl(),
        )
        .await
        {
            Ok(store) => Arc::new(store),
            Err(e) => {
                warn!(error = %e, "Dedup store unreachable, falling back to in-memory tracking");
                Arc::new(MemoryDedupStore::new(config.dedup.ttl()))
            }
        };

        Ok(Self {
            db,
            store,
            social,
            mq,
            dedup: DedupTracker::new(dedup_store),
        })
    }
}
