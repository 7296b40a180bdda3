//! Configuration loaded from the environment.

use serde::Deserialize;

use crate::error::AppError;

/// Top-level service configuration. Every field has a documented default;
/// `Config::load` never panics on a missing variable, only on one that is
/// present but malformed.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    #[serde(default = "default_queue_max_size")]
    pub queue_max_size: usize,

    #[serde(default = "default_max_job_attempts")]
    pub max_job_attempts: u32,

    #[serde(default = "default_retry_backoff_base_ms")]
    pub retry_backoff_base_ms: u64,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_worker_init_timeout_ms")]
    pub worker_init_timeout_ms: u64,

    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    #[serde(default = "default_health_log_interval_secs")]
    pub health_log_interval_secs: u64,

    #[serde(default)]
    pub smtp_host: Option<String>,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    #[serde(default)]
    pub smtp_username: Option<String>,

    #[serde(default)]
    pub smtp_password: Option<String>,

    #[serde(default = "default_smtp_from")]
    pub smtp_from: String,
}

fn default_port() -> u16 {
    3000
}
fn default_worker_pool_size() -> usize {
    4
}
fn default_queue_max_size() -> usize {
    10_000
}
fn default_max_job_attempts() -> u32 {
    3
}
fn default_retry_backoff_base_ms() -> u64 {
    1_000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_poll_interval_ms() -> u64 {
    1_000
}
fn default_worker_init_timeout_ms() -> u64 {
    5_000
}
fn default_shutdown_timeout_secs() -> u64 {
    30
}
fn default_health_log_interval_secs() -> u64 {
    60
}
fn default_smtp_port() -> u16 {
    587
}
fn default_smtp_from() -> String {
    "noreply@localhost".to_string()
}

impl Config {
    /// Load configuration from process environment variables.
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let built = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()
            .map_err(|e| AppError::Configuration(e.to_string()))?;

        built
            .try_deserialize()
            .map_err(|e| AppError::Configuration(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = Config::load().unwrap();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.worker_pool_size, 4);
        assert_eq!(cfg.queue_max_size, 10_000);
        assert_eq!(cfg.max_job_attempts, 3);
        assert_eq!(cfg.retry_backoff_base_ms, 1_000);
    }
}
