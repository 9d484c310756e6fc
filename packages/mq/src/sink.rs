use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use common::Job;
use tracing::debug;

use crate::error::MqError;
use crate::models::MqQueue;

/// Anything jobs can be handed to.
///
/// Producers (HTTP handlers, the mention poller, job handlers that fan out
/// replies) only need this much of a queue, so they depend on the trait and
/// tests swap in [`MemoryJobSink`].
#[async_trait]
pub trait JobSink: Send + Sync {
    /// Low-level enqueue of an already serialized job.
    async fn submit_raw(&self, queue: &str, payload: serde_json::Value) -> Result<(), MqError>;
}

/// Extension trait for typed submission.
/// Automatically implemented for any T that implements JobSink.
#[async_trait]
pub trait JobSinkExt: JobSink {
    async fn submit<J: Job>(&self, queue: &str, job: &J) -> Result<(), MqError> {
        let payload = serde_json::to_value(job)?;
        debug!(queue, job_id = %job.job_id(), kind = %J::kind(), "Enqueuing job");
        self.submit_raw(queue, payload).await
    }
}

impl<T: ?Sized + JobSink> JobSinkExt for T {}

#[async_trait]
impl JobSink for MqQueue {
    async fn submit_raw(&self, queue: &str, payload: serde_json::Value) -> Result<(), MqError> {
        self.publish(queue, None, &payload, None).await?;
        Ok(())
    }
}

/// In-process sink that keeps everything it receives, per queue.
#[derive(Debug, Default)]
pub struct MemoryJobSink {
    queues: Mutex<HashMap<String, Vec<serde_json::Value>>>,
    fail: Mutex<bool>,
}

impl MemoryJobSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following submission fail, to simulate a broker outage.
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut fail) = self.fail.lock() {
            *fail = failing;
        }
    }

    /// Raw payloads currently held for `queue`.
    pub fn payloads(&self, queue: &str) -> Vec<serde_json::Value> {
        self.queues
            .lock()
            .map(|q| q.get(queue).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Payloads of `queue` decoded as `J`. Entries that do not decode are
    /// skipped.
    pub fn jobs<J: Job>(&self, queue: &str) -> Vec<J> {
        self.payloads(queue)
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect()
    }

    /// Remove and return everything held for `queue`.
    pub fn drain(&self, queue: &str) -> Vec<serde_json::Value> {
        self.queues
            .lock()
            .map(|mut q| q.remove(queue).unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn len(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .map(|q| q.get(queue).map(Vec::len).unwrap_or(0))
            .unwrap_or(0)
    }
}

#[async_trait]
impl JobSink for MemoryJobSink {
    async fn submit_raw(&self, queue: &str, payload: serde_json::Value) -> Result<(), MqError> {
        if self.fail.lock().map(|f| *f).unwrap_or(false) {
            return Err(MqError::Internal("memory sink is failing".into()));
        }
        let mut queues = self
            .queues
            .lock()
            .map_err(|e| MqError::Internal(e.to_string()))?;
        queues.entry(queue.to_string()).or_default().push(payload);
        Ok(())
    }
}
