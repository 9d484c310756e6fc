use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use mq::{JobSink, MqConfig, init_mq};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vault::ContentStore;

use server::config::AppConfig;
use server::consumers::consume_dead_letters;
use server::database::init_db;
use server::dlq::run_stuck_purchase_detector;
use server::payment::http::HttpFacilitator;
use server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    let db = init_db(&config.database.url)
        .await
        .context("Failed to initialize database")?;
    info!("Database schema synced");

    let store = ContentStore::from_config(&config.vault).context("Invalid vault configuration")?;
    let facilitator = HttpFacilitator::from_config(&config.payment)
        .context("Failed to build facilitator client")?;
    info!(
        facilitator = %config.payment.facilitator_url,
        network = %config.payment.network,
        "Payment facilitator configured"
    );

    let jobs: Option<Arc<dyn JobSink>> = if config.mq.enabled {
        let mq = init_mq(MqConfig {
            url: config.mq.url.clone(),
            pool_size: config.mq.pool_size,
        })
        .await
        .context("Failed to connect to message queue")?;
        let mq = Arc::new(mq);
        info!("Connected to message queue");

        tokio::spawn(consume_dead_letters(
            db.clone(),
            mq.clone(),
            config.mq.dlq_queue_name.clone(),
        ));

        Some(mq as Arc<dyn JobSink>)
    } else {
        warn!("Message queue disabled; submissions and DLQ retry are unavailable");
        None
    };

    tokio::spawn(run_stuck_purchase_detector(db.clone(), config.dlq.clone()));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let state = AppState {
        db,
        config,
        store,
        facilitator: Arc::new(facilitator),
        jobs,
    };

    let app = server::build_router(state);

    info!("Server running at http://{}", addr);
    info!("Swagger UI at http://{}/swagger-ui", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
