use serde::Deserialize;

/// Per-queue processing policy.
///
/// Every queue declares its own concurrency, retry budget, backoff curve and
/// rate limit so the numbers live in configuration rather than inside the
/// queue library.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct QueuePolicy {
    /// Queue (topic) name.
    pub name: String,
    /// Jobs processed in parallel by one worker instance.
    pub concurrency: usize,
    /// Total attempts, including the first one. Must be >= 1.
    pub max_attempts: u8,
    /// Base delay of the exponential backoff curve.
    pub base_delay_ms: u64,
    /// Upper bound for a single backoff delay.
    pub max_delay_ms: u64,
    /// Jobs admitted per rate-limit window.
    pub rate_limit_max: u32,
    /// Length of the rate-limit window.
    pub rate_limit_window_ms: u64,
    /// A job that has not reported completion after this long is abandoned
    /// and counted as a failed attempt.
    pub stall_timeout_secs: u64,
}

impl QueuePolicy {
    /// Retries allowed after the first attempt.
    pub fn max_retries(&self) -> u8 {
        self.max_attempts.saturating_sub(1)
    }

    pub fn ingestion() -> Self {
        Self {
            name: "ingestion".into(),
            concurrency: 5,
            max_attempts: 3,
            base_delay_ms: 2_000,
            max_delay_ms: 60_000,
            rate_limit_max: 10,
            rate_limit_window_ms: 1_000,
            stall_timeout_secs: 60,
        }
    }

    pub fn verification() -> Self {
        Self {
            name: "verification".into(),
            concurrency: 3,
            max_attempts: 3,
            base_delay_ms: 2_000,
            max_delay_ms: 60_000,
            rate_limit_max: 5,
            rate_limit_window_ms: 1_000,
            stall_timeout_secs: 60,
        }
    }

    /// Outbound replies go out strictly one at a time.
    pub fn reply() -> Self {
        Self {
            name: "reply".into(),
            concurrency: 1,
            max_attempts: 5,
            base_delay_ms: 3_000,
            max_delay_ms: 300_000,
            rate_limit_max: 10,
            rate_limit_window_ms: 60_000,
            stall_timeout_secs: 120,
        }
    }
}

/// App-level MQ configuration shared by the server and the worker.
#[derive(Debug, Deserialize, Clone)]
pub struct MqAppConfig {
    /// Whether MQ is enabled. Default: true.
    /// Note: Worker ignores this field (always requires MQ).
    #[serde(default = "default_mq_enabled")]
    pub enabled: bool,
    /// Redis connection URL. Default: "redis://localhost:6379".
    #[serde(default = "default_mq_url")]
    pub url: String,
    /// Connection pool size. Default: 5.
    #[serde(default = "default_mq_pool_size")]
    pub pool_size: u8,
    /// Queue that receives exhausted jobs. Default: "dead_letters".
    #[serde(default = "default_dlq_queue_name")]
    pub dlq_queue_name: String,
    #[serde(default = "QueuePolicy::ingestion")]
    pub ingestion: QueuePolicy,
    #[serde(default = "QueuePolicy::verification")]
    pub verification: QueuePolicy,
    #[serde(default = "QueuePolicy::reply")]
    pub reply: QueuePolicy,
}

fn default_mq_enabled() -> bool {
    true
}
fn default_mq_url() -> String {
    "redis://localhost:6379".into()
}
fn default_mq_pool_size() -> u8 {
    5
}
fn default_dlq_queue_name() -> String {
    "dead_letters".into()
}

impl Default for MqAppConfig {
    fn default() -> Self {
        Self {
            enabled: default_mq_enabled(),
            url: default_mq_url(),
            pool_size: default_mq_pool_size(),
            dlq_queue_name: default_dlq_queue_name(),
            ingestion: QueuePolicy::ingestion(),
            verification: QueuePolicy::verification(),
            reply: QueuePolicy::reply(),
        }
    }
}

/// Encryption, proof and pricing defaults for stored resources.
#[derive(Debug, Deserialize, Clone)]
pub struct VaultConfig {
    /// Hex-encoded 32-byte AES-256-GCM key.
    pub encryption_key: String,
    /// Secret from which proof tokens are derived.
    pub proof_secret: String,
    /// Price applied when ingestion does not specify one (USD cents).
    #[serde(default = "default_price_minor_units")]
    pub default_price_minor_units: i64,
    #[serde(default = "default_currency")]
    pub default_currency: String,
    #[serde(default = "default_chain")]
    pub default_chain: String,
    #[serde(default = "default_content_type")]
    pub default_content_type: String,
}

fn default_price_minor_units() -> i64 {
    20
}
fn default_currency() -> String {
    "USDC".into()
}
fn default_chain() -> String {
    "solana".into()
}
fn default_content_type() -> String {
    "text/plain".into()
}

/// Retry-tracker housekeeping and stuck-purchase detection.
#[derive(Debug, Deserialize, Clone)]
pub struct DlqConfig {
    /// How often stale retry-tracker entries are swept.
    #[serde(default = "default_retry_cleanup_interval_secs")]
    pub retry_cleanup_interval_secs: u64,
    /// Retry state older than this is dropped.
    #[serde(default = "default_retry_max_age_secs")]
    pub retry_max_age_secs: u64,
    /// A purchase still pending after this long is dead-lettered for review.
    #[serde(default = "default_stuck_purchase_timeout_secs")]
    pub stuck_purchase_timeout_secs: u64,
    #[serde(default = "default_stuck_purchase_scan_interval_secs")]
    pub stuck_purchase_scan_interval_secs: u64,
}

fn default_retry_cleanup_interval_secs() -> u64 {
    300
}
fn default_retry_max_age_secs() -> u64 {
    3_600
}
fn default_stuck_purchase_timeout_secs() -> u64 {
    900
}
fn default_stuck_purchase_scan_interval_secs() -> u64 {
    60
}

impl Default for DlqConfig {
    fn default() -> Self {
        Self {
            retry_cleanup_interval_secs: default_retry_cleanup_interval_secs(),
            retry_max_age_secs: default_retry_max_age_secs(),
            stuck_purchase_timeout_secs: default_stuck_purchase_timeout_secs(),
            stuck_purchase_scan_interval_secs: default_stuck_purchase_scan_interval_secs(),
        }
    }
}
