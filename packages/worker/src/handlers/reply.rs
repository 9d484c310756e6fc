use std::sync::Arc;

use async_trait::async_trait;
use common::{ReplyJob, ReplyTarget};
use tracing::{debug, instrument};

use crate::runner::{JobContext, JobError, JobHandler, JobOutcome};
use crate::social::{SocialClient, SocialError};

/// Delivers queued replies through the social platform.
pub struct ReplyHandler {
    client: Arc<dyn SocialClient>,
}

impl ReplyHandler {
    pub fn new(client: Arc<dyn SocialClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl JobHandler for ReplyHandler {
    type Job = ReplyJob;

    #[instrument(skip_all, fields(job_id = %job.job_id, resource_id = ?job.resource_id))]
    async fn handle(&self, job: &ReplyJob, _ctx: JobContext) -> Result<JobOutcome, JobError> {
        let sent = match &job.target {
            ReplyTarget::Post { post_id } => self
                .client
                .reply_to_post(post_id, &job.text)
                .await
                .map(|reply_id| debug!(post_id = %post_id, reply_id = %reply_id, "Reply posted")),
            ReplyTarget::DirectMessage { user_id } => self
                .client
                .send_direct_message(user_id, &job.text)
                .await
                .map(|()| debug!(user_id = %user_id, "Direct message sent")),
        };

        match sent {
            Ok(()) => Ok(JobOutcome::Completed),
            Err(SocialError::Permanent { status, message }) => {
                Ok(JobOutcome::Unsuccessful(format!("{status}: {message}")))
            }
            Err(SocialError::RateLimited {
                retry_after: Some(after),
            }) => Err(JobError::retry_after("rate limited by platform", after)),
            Err(e @ SocialError::RateLimited { retry_after: None }) => {
                Err(JobError::transient(e.to_string()))
            }
            Err(e @ SocialError::Transient(_)) => Err(JobError::transient(e.to_string())),
        }
    }
}
