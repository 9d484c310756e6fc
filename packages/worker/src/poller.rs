use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::jobs::new_job_id;
use common::mention::parse_mention;
use common::VerificationJob;
use mq::{JobSink, JobSinkExt};
use tracing::{debug, error, info, warn};

use crate::dedup::DedupTracker;
use crate::social::{Mention, SocialClient, SocialError};

/// Counts from one poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub fetched: usize,
    pub enqueued: usize,
    /// Mentions without both an id and a proof.
    pub ignored: usize,
    pub already_handled: usize,
    /// Left for a later poll: unresolved author or failed enqueue.
    pub deferred: usize,
}

/// Turns mentions of the bot into verification jobs.
pub struct MentionPoller {
    client: Arc<dyn SocialClient>,
    dedup: DedupTracker,
    jobs: Arc<dyn JobSink>,
    verification_queue: String,
    bot_user_id: String,
    since_id: Option<String>,
}

impl MentionPoller {
    pub fn new(
        client: Arc<dyn SocialClient>,
        dedup: DedupTracker,
        jobs: Arc<dyn JobSink>,
        verification_queue: impl Into<String>,
        bot_user_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            dedup,
            jobs,
            verification_queue: verification_queue.into(),
            bot_user_id: bot_user_id.into(),
            since_id: None,
        }
    }

    pub fn since_id(&self) -> Option<&str> {
        self.since_id.as_deref()
    }

    /// Fetch every page newer than the cursor and queue what is actionable.
    ///
    /// The cursor only moves past a contiguous run of finished mentions, so a
    /// mention left for later is fetched again on the next poll.
    pub async fn poll_once(&mut self) -> Result<PollReport, SocialError> {
        let (mentions, newest_id) = self.fetch_all().await?;
        let mut report = PollReport {
            fetched: mentions.len(),
            ..Default::default()
        };
        let mut cursor = self.since_id.clone();
        let mut held = false;

        for mention in mentions {
            let id = mention.id.clone();
            let finished = if mention.author_id == self.bot_user_id {
                true
            } else if self.dedup.is_handled(&mention.id).await {
                report.already_handled += 1;
                true
            } else {
                match self.handle_mention(mention).await {
                    Handled::Enqueued => {
                        report.enqueued += 1;
                        true
                    }
                    Handled::Ignored => {
                        report.ignored += 1;
                        true
                    }
                    Handled::Deferred => {
                        report.deferred += 1;
                        false
                    }
                }
            };

            if !finished {
                held = true;
            } else if !held {
                cursor = Some(id);
            }
        }

        if !held {
            if let Some(newest) = newest_id {
                cursor = Some(newest);
            }
        }
        if cursor != self.since_id {
            debug!(since_id = ?cursor, held, "Advanced mention cursor");
            self.since_id = cursor;
        }

        Ok(report)
    }

    /// All pages since the cursor, flattened oldest first, with the newest id.
    async fn fetch_all(&self) -> Result<(Vec<Mention>, Option<String>), SocialError> {
        let mut pages = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let page = self
                .client
                .fetch_mentions(self.since_id.as_deref(), token.as_deref())
                .await?;
            token = page.next_token.clone();
            pages.push(page);
            if token.is_none() {
                break;
            }
        }

        let newest_id = pages.first().and_then(|p| p.newest_id.clone());
        let mentions = pages.into_iter().rev().flat_map(|p| p.mentions).collect();
        Ok((mentions, newest_id))
    }

    async fn handle_mention(&self, mention: Mention) -> Handled {
        let Some(handle) = mention.author_username else {
            warn!(post_id = %mention.id, author_id = %mention.author_id, "Mention author not resolved, skipping");
            return Handled::Deferred;
        };

        let params = parse_mention(&mention.text);
        let (Some(resource_id), Some(proof)) = (params.resource_id, params.proof) else {
            debug!(post_id = %mention.id, "Mention is not actionable");
            self.dedup.mark_handled(&mention.id).await;
            return Handled::Ignored;
        };

        let job = VerificationJob {
            job_id: new_job_id(),
            post_id: mention.id.clone(),
            author_id: mention.author_id,
            handle,
            raw_text: mention.text,
            resource_id,
            proof,
            price: params.price,
            timestamp: mention.created_at.unwrap_or_else(Utc::now),
        };

        match self.jobs.submit(&self.verification_queue, &job).await {
            Ok(()) => {
                self.dedup.mark_handled(&mention.id).await;
                info!(post_id = %mention.id, job_id = %job.job_id, "Queued mention for verification");
                Handled::Enqueued
            }
            Err(e) => {
                error!(post_id = %mention.id, error = %e, "Failed to queue mention");
                Handled::Deferred
            }
        }
    }

    /// Poll every `interval` until the task is dropped.
    pub async fn run(mut self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.poll_once().await {
                Ok(report) if report.fetched > 0 => info!(
                    fetched = report.fetched,
                    enqueued = report.enqueued,
                    ignored = report.ignored,
                    already_handled = report.already_handled,
                    deferred = report.deferred,
                    "Polled mentions"
                ),
                Ok(_) => {}
                Err(SocialError::RateLimited { retry_after }) => {
                    let wait = retry_after.unwrap_or(interval);
                    warn!(wait_secs = wait.as_secs(), "Mention polling rate limited");
                    tokio::time::sleep(wait).await;
                }
                Err(e) => warn!(error = %e, "Mention polling failed"),
            }
        }
    }
}

enum Handled {
    Enqueued,
    Ignored,
    /// Unresolved author or failed enqueue; not marked handled.
    Deferred,
}
