use std::sync::Arc;

use async_trait::async_trait;
use common::{IngestionJob, ReplyJob, ReplyTarget};
use mq::{JobSink, JobSinkExt};
use sea_orm::DatabaseConnection;
use tracing::{info, instrument};
use vault::{ContentError, ContentStore, NewContent};

use crate::runner::{JobContext, JobError, JobHandler, JobOutcome};
use crate::templates;

/// Stores submitted content and tells its owner the proof to publish it.
pub struct IngestionHandler {
    db: DatabaseConnection,
    store: ContentStore,
    replies: Arc<dyn JobSink>,
    reply_queue: String,
    bot_username: String,
}

impl IngestionHandler {
    pub fn new(
        db: DatabaseConnection,
        store: ContentStore,
        replies: Arc<dyn JobSink>,
        reply_queue: impl Into<String>,
        bot_username: impl Into<String>,
    ) -> Self {
        Self {
            db,
            store,
            replies,
            reply_queue: reply_queue.into(),
            bot_username: bot_username.into(),
        }
    }
}

#[async_trait]
impl JobHandler for IngestionHandler {
    type Job = IngestionJob;

    #[instrument(skip_all, fields(job_id = %job.job_id, source = %job.source_platform))]
    async fn handle(&self, job: &IngestionJob, ctx: JobContext) -> Result<JobOutcome, JobError> {
        let input = NewContent {
            owner_id: job.owner_id.clone(),
            owner_handle: job.handle.clone(),
            content: job.content.clone().into_bytes(),
            source_platform: job.source_platform.clone(),
            source_message_id: job.source_message_id.clone(),
            content_type: job.content_type.clone(),
            price_minor_units: job.price_minor_units,
        };

        let stored = match self.store.store(&self.db, input).await {
            Ok(stored) => stored,
            Err(ContentError::Validation(reason)) => return Ok(JobOutcome::Unsuccessful(reason)),
            Err(e) => return Err(JobError::transient(e.to_string())),
        };

        // A retried job may have stored the resource before failing to
        // enqueue the receipt, so only a first attempt trusts is_new.
        if !stored.is_new && ctx.attempt == 1 {
            info!(resource_id = %stored.resource_id, "Source message already ingested");
            return Ok(JobOutcome::Completed);
        }

        let receipt = ReplyJob::new(
            ReplyTarget::DirectMessage {
                user_id: job.owner_id.clone(),
            },
            templates::ingestion_receipt(
                &self.bot_username,
                &stored.resource_id.to_string(),
                &stored.proof_token,
            ),
            Some(stored.resource_id),
        );
        self.replies.submit(&self.reply_queue, &receipt).await?;

        info!(resource_id = %stored.resource_id, is_new = stored.is_new, "Content ingested");
        Ok(JobOutcome::Completed)
    }
}
