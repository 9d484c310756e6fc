//! Queue consumption shared by every worker.
//!
//! A [`QueueRunner`] decodes a payload into its handler's job type, waits
//! for the queue's rate limiter, runs the handler under the stall timeout,
//! and retries failures with exponential backoff. A job whose retry budget
//! runs out is published to the dead-letter queue as a [`DlqEnvelope`].

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::config::QueuePolicy;
use common::dlq::{DlqEnvelope, DlqErrorCode};
use common::jobs::new_job_id;
use common::retry::{RetryCleanupGuard, RetryDecision, RetryTracker, backoff_for};
use common::Job;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use mq::{BroccoliError, BrokerMessage, JobSink, Mq};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// How a handler finished a job it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    /// Done for good without having done its work; never retried.
    Unsuccessful(String),
}

/// A failure worth retrying.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct JobError {
    pub message: String,
    /// Minimum wait before the next attempt, e.g. a rate-limit reset.
    pub retry_after: Option<Duration>,
}

impl JobError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn retry_after(message: impl Into<String>, after: Duration) -> Self {
        Self {
            message: message.into(),
            retry_after: Some(after),
        }
    }
}

impl From<sea_orm::DbErr> for JobError {
    fn from(e: sea_orm::DbErr) -> Self {
        Self::transient(format!("database error: {e}"))
    }
}

impl From<mq::error::MqError> for JobError {
    fn from(e: mq::error::MqError) -> Self {
        Self::transient(format!("enqueue failed: {e}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobContext {
    /// 1-based attempt number of this run.
    pub attempt: u8,
}

#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    type Job: Job;

    async fn handle(&self, job: &Self::Job, ctx: JobContext) -> Result<JobOutcome, JobError>;
}

/// Final state of one consumed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Completed,
    Unsuccessful(String),
    DeadLettered(DlqErrorCode),
}

pub struct QueueRunner<H: JobHandler> {
    handler: H,
    policy: QueuePolicy,
    limiter: Option<DirectLimiter>,
    tracker: Arc<Mutex<RetryTracker>>,
    dlq: Arc<dyn JobSink>,
    dlq_queue: String,
}

impl<H: JobHandler> QueueRunner<H> {
    pub fn new(
        handler: H,
        policy: QueuePolicy,
        dlq: Arc<dyn JobSink>,
        dlq_queue: impl Into<String>,
    ) -> Self {
        Self {
            handler,
            limiter: limiter_for(&policy),
            tracker: Arc::new(Mutex::new(RetryTracker::for_policy(&policy))),
            policy,
            dlq,
            dlq_queue: dlq_queue.into(),
        }
    }

    pub fn policy(&self) -> &QueuePolicy {
        &self.policy
    }

    /// Retry state shared with the periodic sweeper.
    pub fn tracker(&self) -> Arc<Mutex<RetryTracker>> {
        Arc::clone(&self.tracker)
    }

    /// Consume the policy's queue until the broker connection ends.
    pub async fn run(self: Arc<Self>, mq: Arc<Mq>) -> Result<(), BroccoliError> {
        info!(
            queue = %self.policy.name,
            concurrency = self.policy.concurrency,
            max_attempts = self.policy.max_attempts,
            "Queue consumer started"
        );

        let runner = Arc::clone(&self);
        mq.process_messages(
            &self.policy.name,
            Some(self.policy.concurrency),
            None,
            move |message: BrokerMessage<serde_json::Value>| {
                let runner = Arc::clone(&runner);
                async move { runner.process_payload(message.payload).await.map(|_| ()) }
            },
        )
        .await
    }

    /// Decode and process one raw message.
    pub async fn process_payload(
        &self,
        payload: serde_json::Value,
    ) -> Result<Disposition, BroccoliError> {
        match serde_json::from_value::<H::Job>(payload.clone()) {
            Ok(job) => self.process(job).await,
            Err(e) => {
                error!(queue = %self.policy.name, error = %e, "Failed to decode job");

                let message_id = payload
                    .get("job_id")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(new_job_id);
                let resource_id = payload
                    .get("resource_id")
                    .and_then(|v| v.as_str())
                    .and_then(|s| Uuid::parse_str(s).ok());

                let envelope = DlqEnvelope {
                    message_id,
                    message_type: <H::Job as Job>::kind(),
                    resource_id,
                    payload,
                    error_code: DlqErrorCode::DeserializationError,
                    error_message: format!("Failed to decode {} job: {e}", <H::Job as Job>::kind()),
                    retry_history: vec![],
                };
                self.dead_letter(&envelope).await?;
                Ok(Disposition::DeadLettered(DlqErrorCode::DeserializationError))
            }
        }
    }

    /// Run `job` until it completes, gives up, or exhausts its retries.
    pub async fn process(&self, job: H::Job) -> Result<Disposition, BroccoliError> {
        let job_id = job.job_id().to_string();
        let queue = self.policy.name.as_str();
        let stall = Duration::from_secs(self.policy.stall_timeout_secs);
        let mut cleanup_guard = RetryCleanupGuard::new(&self.tracker, &job_id);
        let mut attempt: u8 = 1;

        loop {
            if let Some(limiter) = &self.limiter {
                limiter.until_ready().await;
            }

            debug!(queue, job_id = %job_id, attempt, "Running job");
            let result =
                match tokio::time::timeout(stall, self.handler.handle(&job, JobContext { attempt }))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(JobError::transient(format!(
                        "job stalled for more than {}s",
                        stall.as_secs()
                    ))),
                };

            match result {
                Ok(outcome) => {
                    self.tracker.lock().await.clear(&job_id);
                    cleanup_guard.defuse();
                    return Ok(match outcome {
                        JobOutcome::Completed => {
                            debug!(queue, job_id = %job_id, "Job completed");
                            Disposition::Completed
                        }
                        JobOutcome::Unsuccessful(reason) => {
                            warn!(
                                queue,
                                job_id = %job_id,
                                failure_class = "permanent",
                                reason = %reason,
                                "Job finished unsuccessfully"
                            );
                            Disposition::Unsuccessful(reason)
                        }
                    });
                }
                Err(e) => {
                    let decision = self
                        .tracker
                        .lock()
                        .await
                        .record_failure(&job_id, &e.message);

                    match decision {
                        RetryDecision::Retry { attempt: failed, .. } => {
                            let delay = backoff_for(&self.policy, failed, e.retry_after);
                            warn!(
                                queue,
                                job_id = %job_id,
                                attempt = failed,
                                delay_ms = delay.as_millis() as u64,
                                failure_class = "transient",
                                error = %e,
                                "Retrying job"
                            );
                            tokio::time::sleep(delay).await;
                            attempt = failed.saturating_add(1);
                        }
                        RetryDecision::Exhausted { history } => {
                            error!(
                                queue,
                                job_id = %job_id,
                                attempts = history.len(),
                                error = %e,
                                "Max retries exhausted, sending to DLQ"
                            );

                            let envelope = DlqEnvelope {
                                message_id: job_id.clone(),
                                message_type: <H::Job as Job>::kind(),
                                resource_id: job.resource_id(),
                                payload: serde_json::to_value(&job).unwrap_or_default(),
                                error_code: DlqErrorCode::MaxRetriesExceeded,
                                error_message: e.message,
                                retry_history: history,
                            };
                            self.dead_letter(&envelope).await?;
                            cleanup_guard.defuse();
                            return Ok(Disposition::DeadLettered(DlqErrorCode::MaxRetriesExceeded));
                        }
                    }
                }
            }
        }
    }

    async fn dead_letter(&self, envelope: &DlqEnvelope) -> Result<(), BroccoliError> {
        let payload = serde_json::to_value(envelope)
            .map_err(|e| BroccoliError::Publish(format!("Failed to encode DLQ envelope: {e}")))?;
        self.dlq
            .submit_raw(&self.dlq_queue, payload)
            .await
            .map_err(|e| {
                error!(queue = %self.policy.name, error = %e, "Failed to publish to DLQ");
                BroccoliError::Publish(format!("Failed to publish to DLQ: {e}"))
            })
    }
}

/// Token bucket refilling `rate_limit_max` tokens per window. `None` when
/// the policy disables limiting.
fn limiter_for(policy: &QueuePolicy) -> Option<DirectLimiter> {
    let max = NonZeroU32::new(policy.rate_limit_max)?;
    let period = Duration::from_millis(policy.rate_limit_window_ms) / max.get();
    let quota = Quota::with_period(period)?.allow_burst(max);
    Some(RateLimiter::direct(quota))
}
