use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use common::retry::spawn_cleanup_task;
use mq::JobSink;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use worker::config::WorkerAppConfig;
use worker::handlers::{IngestionHandler, ReplyHandler, VerificationHandler};
use worker::poller::MentionPoller;
use worker::runner::{JobHandler, QueueRunner};
use worker::services::Services;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = WorkerAppConfig::load().context("Failed to load config")?;
    info!(worker_id = %config.worker.id, "Worker starting");

    if !config.mq.enabled {
        bail!("The worker needs the message queue; set mq.enabled = true");
    }

    let services = Services::connect(&config)
        .await
        .context("Failed to initialize worker services")?;
    let sink: Arc<dyn JobSink> = services.mq.clone();
    let dlq_queue = config.mq.dlq_queue_name.clone();

    let ingestion = Arc::new(QueueRunner::new(
        IngestionHandler::new(
            services.db.clone(),
            services.store,
            sink.clone(),
            config.mq.reply.name.clone(),
            config.social.bot_username.clone(),
        ),
        config.mq.ingestion.clone(),
        sink.clone(),
        dlq_queue.clone(),
    ));
    let verification = Arc::new(QueueRunner::new(
        VerificationHandler::new(
            services.db.clone(),
            sink.clone(),
            config.mq.reply.name.clone(),
            config.worker.clone(),
        ),
        config.mq.verification.clone(),
        sink.clone(),
        dlq_queue.clone(),
    ));
    let reply = Arc::new(QueueRunner::new(
        ReplyHandler::new(services.social.clone()),
        config.mq.reply.clone(),
        sink.clone(),
        dlq_queue,
    ));

    let cleanup_interval = Duration::from_secs(config.dlq.retry_cleanup_interval_secs);
    let max_age = Duration::from_secs(config.dlq.retry_max_age_secs);
    sweep_retries(&ingestion, cleanup_interval, max_age);
    sweep_retries(&verification, cleanup_interval, max_age);
    sweep_retries(&reply, cleanup_interval, max_age);

    if config.poller.enabled {
        let poller = MentionPoller::new(
            services.social,
            services.dedup,
            sink,
            config.mq.verification.name.clone(),
            config.social.bot_user_id.clone(),
        );
        tokio::spawn(poller.run(Duration::from_secs(config.poller.interval_secs)));
        info!(interval_secs = config.poller.interval_secs, "Mention poller started");
    } else {
        info!("Mention poller disabled");
    }

    let mq = services.mq;
    let (ingestion, verification, reply) = futures::future::join3(
        ingestion.run(mq.clone()),
        verification.run(mq.clone()),
        reply.run(mq),
    )
    .await;

    for (queue, result) in [
        ("ingestion", ingestion),
        ("verification", verification),
        ("reply", reply),
    ] {
        if let Err(e) = result {
            error!(queue, error = %e, "Queue consumer stopped unexpectedly");
        }
    }

    Ok(())
}

fn sweep_retries<H: JobHandler>(
    runner: &Arc<QueueRunner<H>>,
    interval: Duration,
    max_age: Duration,
) {
    spawn_cleanup_task(
        runner.policy().name.clone(),
        runner.tracker(),
        interval,
        max_age,
    );
}
