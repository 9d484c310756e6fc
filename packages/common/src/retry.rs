use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::info;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::QueuePolicy;

/// One failed attempt of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryAttempt {
    /// 1-based attempt number.
    pub attempt: u8,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl RetryAttempt {
    pub fn new(attempt: u8, error: impl Into<String>) -> Self {
        Self {
            attempt,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }
}

/// What to do after a job failed.
#[derive(Debug, Clone)]
pub enum RetryDecision {
    Retry {
        attempt: u8,
        history: Vec<RetryAttempt>,
    },
    /// Budget spent; the job goes to the dead-letter queue.
    Exhausted { history: Vec<RetryAttempt> },
}

#[derive(Debug, Clone)]
struct JobAttempts {
    failures: u8,
    history: Vec<RetryAttempt>,
    last_updated: Instant,
}

impl JobAttempts {
    fn new() -> Self {
        Self {
            failures: 0,
            history: Vec::new(),
            last_updated: Instant::now(),
        }
    }
}

/// Counts failures per job id for one queue.
#[derive(Debug, Default)]
pub struct RetryTracker {
    jobs: HashMap<String, JobAttempts>,
    max_retries: u8,
}

impl RetryTracker {
    pub fn new(max_retries: u8) -> Self {
        Self {
            jobs: HashMap::new(),
            max_retries,
        }
    }

    pub fn for_policy(policy: &QueuePolicy) -> Self {
        Self::new(policy.max_retries())
    }

    /// Record a failure of `job_id` and decide whether it gets another go.
    pub fn record_failure(&mut self, job_id: &str, error: &str) -> RetryDecision {
        let entry = self
            .jobs
            .entry(job_id.to_string())
            .or_insert_with(JobAttempts::new);

        entry.failures = entry.failures.saturating_add(1);
        entry.last_updated = Instant::now();
        entry.history.push(RetryAttempt::new(entry.failures, error));

        if entry.failures <= self.max_retries {
            RetryDecision::Retry {
                attempt: entry.failures,
                history: entry.history.clone(),
            }
        } else {
            let history = std::mem::take(&mut entry.history);
            self.jobs.remove(job_id);
            RetryDecision::Exhausted { history }
        }
    }

    pub fn clear(&mut self, job_id: &str) {
        self.jobs.remove(job_id);
    }

    pub fn failures(&self, job_id: &str) -> u8 {
        self.jobs.get(job_id).map(|s| s.failures).unwrap_or(0)
    }

    /// Drop entries that have not changed within `max_age`.
    pub fn cleanup_stale(&mut self, max_age: Duration) {
        let now = Instant::now();
        self.jobs
            .retain(|_, state| now.duration_since(state.last_updated) < max_age);
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Exponential backoff with 0-25% jitter.
///
/// `min(base_ms * 2^(attempt-1) + jitter, max_ms)`
pub fn calculate_backoff(attempt: u8, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exp_factor = 2u64.saturating_pow((attempt - 1) as u32);
    let delay_ms = base_ms.saturating_mul(exp_factor);

    let jitter = if delay_ms > 0 {
        rand::rng().random_range(0..=delay_ms / 4)
    } else {
        0
    };

    Duration::from_millis(delay_ms.saturating_add(jitter).min(max_ms))
}

/// Backoff for a queue, never shorter than a server-provided `floor`
/// (e.g. a rate-limit reset hint).
pub fn backoff_for(policy: &QueuePolicy, attempt: u8, floor: Option<Duration>) -> Duration {
    let delay = calculate_backoff(attempt, policy.base_delay_ms, policy.max_delay_ms);
    match floor {
        Some(floor) => delay.max(floor),
        None => delay,
    }
}

/// Clears a job's retry state when dropped, unless defused.
pub struct RetryCleanupGuard<'a> {
    tracker: &'a Arc<Mutex<RetryTracker>>,
    job_id: String,
    defused: bool,
}

impl<'a> RetryCleanupGuard<'a> {
    pub fn new(tracker: &'a Arc<Mutex<RetryTracker>>, job_id: impl Into<String>) -> Self {
        Self {
            tracker,
            job_id: job_id.into(),
            defused: false,
        }
    }

    pub fn defuse(&mut self) {
        self.defused = true;
    }
}

impl Drop for RetryCleanupGuard<'_> {
    fn drop(&mut self) {
        if !self.defused {
            if let Ok(mut tracker) = self.tracker.try_lock() {
                tracker.clear(&self.job_id);
            }
        }
    }
}

/// Periodically sweep stale entries out of a shared tracker.
pub fn spawn_cleanup_task(
    queue: String,
    tracker: Arc<Mutex<RetryTracker>>,
    cleanup_interval: Duration,
    max_age: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_interval);

        loop {
            interval.tick().await;
            let removed = {
                let mut guard = tracker.lock().await;
                let before = guard.len();
                guard.cleanup_stale(max_age);
                before - guard.len()
            };
            if removed > 0 {
                info!(queue = %queue, removed, "Swept stale retry state");
            }
        }
    })
}
