use serde::{Deserialize, Serialize};
use std::fs;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config yaml: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub enable_tracing: bool,
    /// PostgreSQL connection URL; absent means the in-memory store (dev/test)
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub billing: BillingConfig,
    #[serde(default)]
    pub recovery: RecoverySettings,
}

/// Billing policy knobs
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BillingConfig {
    /// Platform cut for payees created without an explicit rate
    pub default_commission_pct: u8,
    /// Smallest recharge order the gateway flow accepts
    pub min_recharge_coins: u64,
    /// Retry bound for settlement under balance drift
    pub settlement_max_attempts: u32,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            default_commission_pct: 20,
            min_recharge_coins: 100,
            settlement_max_attempts: 8,
        }
    }
}

/// Settlement recovery worker settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecoverySettings {
    pub scan_interval_secs: u64,
    pub stale_threshold_secs: u64,
    pub batch_size: u32,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            scan_interval_secs: 30,
            stale_threshold_secs: 60,
            batch_size: 100,
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: config_path,
            source,
        })?;
        Ok(serde_yaml::from_str(&content)?)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: "./logs".to_string(),
            log_file: "billing.log".to_string(),
            use_json: false,
            rotation: "daily".to_string(),
            enable_tracing: true,
            postgres_url: None,
            billing: BillingConfig::default(),
            recovery: RecoverySettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.billing.default_commission_pct, 20);
        assert_eq!(config.billing.min_recharge_coins, 100);
        assert_eq!(config.recovery.stale_threshold_secs, 60);
    }

    #[test]
    fn test_parse_minimal_yaml() {
        let yaml = r#"
log_level: debug
log_dir: ./logs
log_file: billing.log
use_json: true
rotation: hourly
enable_tracing: false
billing:
  default_commission_pct: 25
  min_recharge_coins: 50
  settlement_max_attempts: 4
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.log_level, "debug");
        assert!(config.use_json);
        assert_eq!(config.billing.default_commission_pct, 25);
        assert!(config.postgres_url.is_none());
        // Omitted section falls back to defaults
        assert_eq!(config.recovery.batch_size, 100);
    }
}
