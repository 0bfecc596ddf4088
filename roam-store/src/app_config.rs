use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use roam_shared::Masked;
use uuid::Uuid;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    pub payments: PaymentsConfig,
    pub booking: BookingRules,
    pub reaper: ReaperConfig,
    #[serde(default)]
    pub rate_limits: HashMap<String, RateLimitRule>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Vehicles loaded into the in-memory catalog at startup.
    #[serde(default)]
    pub seed_vehicles: Vec<SeedVehicle>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SeedVehicle {
    pub id: Uuid,
    pub host_id: String,
    pub price_per_day_cents: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String { "USD".to_string() }

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: Masked<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentsConfig {
    pub webhook_secret: Masked<String>,
    #[serde(default = "default_signature_tolerance")]
    pub signature_tolerance_seconds: u64,
    #[serde(default = "default_authorization_timeout")]
    pub authorization_timeout_ms: u64,
}

fn default_signature_tolerance() -> u64 { 300 }
fn default_authorization_timeout() -> u64 { 10_000 }

impl PaymentsConfig {
    pub fn authorization_timeout(&self) -> Duration {
        Duration::from_millis(self.authorization_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BookingRules {
    pub service_fee_cents: i64,
    #[serde(default = "default_max_rental_days")]
    pub max_rental_days: i64,
    #[serde(default = "default_candidate_limit")]
    pub conflict_candidate_limit: usize,
    #[serde(default = "default_store_timeout")]
    pub store_timeout_ms: u64,
}

fn default_max_rental_days() -> i64 { 90 }
fn default_candidate_limit() -> usize { 50 }
fn default_store_timeout() -> u64 { 3_000 }

impl BookingRules {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReaperConfig {
    pub interval_seconds: u64,
    pub max_age_seconds: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize { 100 }

impl ReaperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_seconds)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub max_per_window: u64,
    pub window_seconds: u64,
}

impl RateLimitRule {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Add in the current environment file
            // Note that this file is _optional_
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add in a local configuration file
            // This file shouldn't be checked in to git
            .add_source(config::File::with_name("config/local").required(false))
            // Eg.. `ROAM__SERVER__PORT=8081` would set `server.port`
            .add_source(config::Environment::with_prefix("ROAM").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    /// Build a config from a single inline TOML document, without file or env layering.
    pub fn from_toml(toml: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    pub fn rate_limit(&self, route: &str) -> Option<RateLimitRule> {
        self.rate_limits.get(route).copied()
    }
}
