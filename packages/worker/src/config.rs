use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub use common::config::{DlqConfig, MqAppConfig, VaultConfig};

/// Worker-specific configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    /// Identifier of this worker instance, for logs. Default: "worker-1".
    #[serde(default = "default_worker_id")]
    pub id: String,
    /// Origin the payment links point at.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

fn default_worker_id() -> String {
    "worker-1".into()
}
fn default_public_base_url() -> String {
    "http://localhost:4021".into()
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            id: default_worker_id(),
            public_base_url: default_public_base_url(),
        }
    }
}

impl WorkerConfig {
    /// Paid content URL of `resource_id`.
    pub fn payment_link(&self, resource_id: &uuid::Uuid) -> String {
        format!(
            "{}/api/v1/resources/{}",
            self.public_base_url.trim_end_matches('/'),
            resource_id
        )
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Social platform (X API v2) access.
#[derive(Debug, Deserialize, Clone)]
pub struct SocialConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// User-context OAuth 2.0 access token of the bot account.
    pub bearer_token: String,
    pub bot_user_id: String,
    /// Handle users mention, without the `@`.
    pub bot_username: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_api_base_url() -> String {
    "https://api.x.com".into()
}
fn default_request_timeout_secs() -> u64 {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollerConfig {
    #[serde(default = "default_poller_enabled")]
    pub enabled: bool,
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
}

fn default_poller_enabled() -> bool {
    true
}
fn default_poll_interval_secs() -> u64 {
    30
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            enabled: default_poller_enabled(),
            interval_secs: default_poll_interval_secs(),
        }
    }
}

/// Handled-event bookkeeping.
#[derive(Debug, Deserialize, Clone)]
pub struct DedupConfig {
    /// Defaults to the queue's Redis when absent.
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default = "default_ttl_days")]
    pub ttl_days: u64,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_ttl_days() -> u64 {
    7
}
fn default_key_prefix() -> String {
    "proofgate:handled:".into()
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            ttl_days: default_ttl_days(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl DedupConfig {
    pub fn ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.ttl_days * 24 * 60 * 60)
    }
}

/// Worker application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct WorkerAppConfig {
    #[serde(default)]
    pub worker: WorkerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub mq: MqAppConfig,
    pub vault: VaultConfig,
    pub social: SocialConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub dlq: DlqConfig,
}

impl WorkerAppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("PROOFGATE_CONFIG").unwrap_or_else(|_| "config/config".to_string());

        let s = Config::builder()
            .set_default("worker.id", "worker-1")?
            .set_default("database.url", "sqlite://proofgate.db?mode=rwc")?
            .set_default("mq.enabled", true)?
            .set_default("mq.url", "redis://localhost:6379")?
            .set_default("mq.pool_size", 5_i64)?
            .add_source(File::with_name(&config_path).required(false))
            .add_source(Environment::with_prefix("PROOFGATE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
