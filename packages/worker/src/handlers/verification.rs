use std::sync::Arc;

use async_trait::async_trait;
use common::price::{format_minor_units, parse_price_minor_units};
use common::{ReplyJob, ReplyTarget, VerificationJob};
use mq::{JobSink, JobSinkExt};
use sea_orm::{DatabaseConnection, EntityTrait};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use vault::entity::resource;
use vault::{ConsumeOutcome, ProofError, ProofRejection, ProofVerifier, Publication};

use crate::config::WorkerConfig;
use crate::runner::{JobContext, JobError, JobHandler, JobOutcome};
use crate::templates;

/// Publishes a resource when a mention carries its valid proof, and
/// answers the mention either way.
pub struct VerificationHandler {
    db: DatabaseConnection,
    replies: Arc<dyn JobSink>,
    reply_queue: String,
    worker: WorkerConfig,
}

impl VerificationHandler {
    pub fn new(
        db: DatabaseConnection,
        replies: Arc<dyn JobSink>,
        reply_queue: impl Into<String>,
        worker: WorkerConfig,
    ) -> Self {
        Self {
            db,
            replies,
            reply_queue: reply_queue.into(),
            worker,
        }
    }

    async fn announce(
        &self,
        job: &VerificationJob,
        published: &resource::Model,
    ) -> Result<JobOutcome, JobError> {
        let text = templates::publication_notice(
            &self.worker.payment_link(&published.id),
            &format_minor_units(published.price_minor_units),
            &published.currency,
        );
        self.reply(job, text, Some(published.id)).await?;
        Ok(JobOutcome::Completed)
    }

    async fn reject(
        &self,
        job: &VerificationJob,
        resource_id: Option<Uuid>,
        rejection: ProofRejection,
    ) -> Result<JobOutcome, JobError> {
        if let (ProofRejection::AlreadyUsed, Some(id)) = (rejection, resource_id) {
            // Redelivery of a job whose publish already went through.
            if let Some(published) = self.published_by(id, &job.post_id).await? {
                return self.announce(job, &published).await;
            }
        }

        info!(
            resource_id = ?resource_id,
            reason = rejection.as_str(),
            "Proof rejected"
        );
        self.reply(job, templates::rejection_notice(rejection).to_string(), resource_id)
            .await?;
        Ok(JobOutcome::Completed)
    }

    async fn published_by(
        &self,
        id: Uuid,
        post_id: &str,
    ) -> Result<Option<resource::Model>, JobError> {
        let found = resource::Entity::find_by_id(id).one(&self.db).await?;
        Ok(found.filter(|r| r.social_post_id.as_deref() == Some(post_id)))
    }

    async fn reply(
        &self,
        job: &VerificationJob,
        text: String,
        resource_id: Option<Uuid>,
    ) -> Result<(), JobError> {
        let reply = ReplyJob::new(
            ReplyTarget::Post {
                post_id: job.post_id.clone(),
            },
            text,
            resource_id,
        );
        self.replies.submit(&self.reply_queue, &reply).await?;
        Ok(())
    }
}

#[async_trait]
impl JobHandler for VerificationHandler {
    type Job = VerificationJob;

    #[instrument(skip_all, fields(job_id = %job.job_id, post_id = %job.post_id))]
    async fn handle(&self, job: &VerificationJob, _ctx: JobContext) -> Result<JobOutcome, JobError> {
        let Ok(resource_id) = Uuid::parse_str(&job.resource_id) else {
            return self.reject(job, None, ProofRejection::NotFound).await;
        };

        let verifier = ProofVerifier::new(&self.db);
        let verified = match verifier.verify(resource_id, &job.proof).await {
            Ok(verified) => verified,
            Err(ProofError::Rejected(rejection)) => {
                return self.reject(job, Some(resource_id), rejection).await;
            }
            Err(ProofError::Database(e)) => return Err(e.into()),
        };

        let price_override = job.price.as_deref().and_then(parse_price_minor_units);
        if job.price.is_some() && price_override.is_none() {
            warn!(%resource_id, "Ignoring unusable price override");
        }

        let publication = Publication {
            post_id: job.post_id.clone(),
            post_url: Some(format!(
                "https://x.com/{}/status/{}",
                job.handle, job.post_id
            )),
            price_override_minor_units: price_override,
        };

        match verifier.consume(&verified, &publication).await? {
            ConsumeOutcome::Published(published) => {
                info!(
                    %resource_id,
                    price_minor_units = published.price_minor_units,
                    "Resource published from mention"
                );
                self.announce(job, &published).await
            }
            ConsumeOutcome::Lost => match verifier.verify(resource_id, &job.proof).await {
                Err(ProofError::Rejected(rejection)) => {
                    self.reject(job, Some(resource_id), rejection).await
                }
                Err(ProofError::Database(e)) => Err(e.into()),
                Ok(_) => {
                    self.reject(job, Some(resource_id), ProofRejection::AlreadyUsed)
                        .await
                }
            },
        }
    }
}
