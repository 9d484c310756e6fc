use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub use common::config::{DlqConfig, MqAppConfig, VaultConfig};

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    pub allow_origins: Vec<String>,
    pub max_age: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: Vec::new(),
            max_age: 3600,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub cors: CorsConfig,
    /// Externally reachable origin, used to build resource URLs.
    pub public_base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

/// x402 settlement parameters.
#[derive(Debug, Deserialize, Clone)]
pub struct PaymentConfig {
    pub facilitator_url: String,
    /// e.g. `solana-devnet` or `solana`.
    pub network: String,
    /// Token mint the price is denominated in.
    pub asset: String,
    pub asset_decimals: u32,
    /// Treasury address that receives payments.
    pub pay_to: String,
    pub max_timeout_seconds: u64,
    /// Timeout for a single facilitator request.
    #[serde(default = "default_facilitator_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_facilitator_timeout_secs() -> u64 {
    15
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DeliveryConfig {
    /// Embed an invisible per-purchase marker into text bodies.
    #[serde(default)]
    pub watermark_enabled: bool,
    #[serde(default)]
    pub watermark_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub mq: MqAppConfig,
    pub vault: VaultConfig,
    pub payment: PaymentConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub dlq: DlqConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var("PROOFGATE_CONFIG").unwrap_or_else(|_| "config/config".to_string());

        let s = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 4021)?
            .set_default("server.public_base_url", "http://localhost:4021")?
            .set_default("database.url", "sqlite://proofgate.db?mode=rwc")?
            .set_default("payment.facilitator_url", "https://facilitator.payai.network")?
            .set_default("payment.network", "solana-devnet")?
            .set_default(
                "payment.asset",
                "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU",
            )?
            .set_default("payment.asset_decimals", 6)?
            .set_default("payment.max_timeout_seconds", 60)?
            .add_source(File::with_name(&path).required(false))
            // e.g. PROOFGATE__VAULT__ENCRYPTION_KEY
            .add_source(Environment::with_prefix("PROOFGATE").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    /// Absolute URL of the paid content endpoint for `resource_id`.
    pub fn resource_url(&self, resource_id: &uuid::Uuid) -> String {
        format!(
            "{}/api/v1/resources/{}",
            self.server.public_base_url.trim_end_matches('/'),
            resource_id
        )
    }
}
