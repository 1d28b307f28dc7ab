use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "RiskWatch";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_BIND: &str = "127.0.0.1:8087";
pub const DATABASE_FILE: &str = "riskwatch.db";

pub const ENV_DATA_DIR: &str = "RISKWATCH_DATA_DIR";
pub const ENV_BIND: &str = "RISKWATCH_BIND";
pub const ENV_SIGNIFICANCE: &str = "RISKWATCH_SIGNIFICANCE";
pub const ENV_CRITICAL_DELTA: &str = "RISKWATCH_CRITICAL_DELTA";
pub const ENV_TICK_SECS: &str = "RISKWATCH_TICK_SECS";
pub const ENV_MAX_PARALLEL: &str = "RISKWATCH_MAX_PARALLEL";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Cannot determine home directory; set RISKWATCH_DATA_DIR")]
    NoHomeDir,

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "riskwatch_lib=info,riskwatch=info,tower_http=warn"
}

/// Get the application data directory
/// ~/RiskWatch/ unless overridden
pub fn app_data_dir() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    Ok(home.join(APP_NAME))
}

// ═══════════════════════════════════════════════════════════
// Engine policy
// ═══════════════════════════════════════════════════════════

/// Backoff policy for persistence writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 50,
            max_delay_ms: 1000,
        }
    }
}

impl RetryPolicy {
    /// Exponential delay before retry number `attempt` (1-based), capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }
}

/// Policy constants of the recompute engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Score delta at which a change is significant (persist + notify).
    pub significance_threshold: u8,
    /// Score delta at which a change is critical (CRITICAL notification).
    pub critical_change_threshold: u8,
    pub tick_interval_secs: u64,
    /// Upper bound on patients recomputed concurrently by one sweep.
    pub max_parallel_cycles: usize,
    /// Persist a level change even when the score delta is below threshold.
    pub persist_on_level_change: bool,
    pub store_retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            significance_threshold: 10,
            critical_change_threshold: 20,
            tick_interval_secs: 5,
            max_parallel_cycles: 8,
            persist_on_level_change: true,
            store_retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.significance_threshold == 0 || self.significance_threshold > 100 {
            return Err(ConfigError::InvalidValue {
                key: "significance_threshold",
                reason: "must be between 1 and 100".into(),
            });
        }
        if self.critical_change_threshold < self.significance_threshold
            || self.critical_change_threshold > 100
        {
            return Err(ConfigError::InvalidValue {
                key: "critical_change_threshold",
                reason: "must be between the significance threshold and 100".into(),
            });
        }
        if self.tick_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "tick_interval_secs",
                reason: "must be at least 1".into(),
            });
        }
        if self.max_parallel_cycles == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_parallel_cycles",
                reason: "must be at least 1".into(),
            });
        }
        if self.store_retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "store_retry.max_attempts",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }
}

// ═══════════════════════════════════════════════════════════
// Process configuration
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub bind: SocketAddr,
    pub engine: EngineConfig,
}

impl AppConfig {
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    /// Defaults overridden by `RISKWATCH_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let data_dir = match lookup(ENV_DATA_DIR) {
            Some(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => app_data_dir()?,
        };
        let bind = parse_or(&lookup, ENV_BIND, DEFAULT_BIND.parse().ok())?;

        let defaults = EngineConfig::default();
        let engine = EngineConfig {
            significance_threshold: parse_or(
                &lookup,
                ENV_SIGNIFICANCE,
                Some(defaults.significance_threshold),
            )?,
            critical_change_threshold: parse_or(
                &lookup,
                ENV_CRITICAL_DELTA,
                Some(defaults.critical_change_threshold),
            )?,
            tick_interval_secs: parse_or(&lookup, ENV_TICK_SECS, Some(defaults.tick_interval_secs))?,
            max_parallel_cycles: parse_or(
                &lookup,
                ENV_MAX_PARALLEL,
                Some(defaults.max_parallel_cycles),
            )?,
            ..defaults
        };
        engine.validate()?;

        Ok(Self {
            data_dir,
            bind,
            engine,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: Option<T>,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
            key,
            reason: format!("cannot parse {raw:?}"),
        }),
        None => default.ok_or(ConfigError::InvalidValue {
            key,
            reason: "no default available".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_policy() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.significance_threshold, 10);
        assert_eq!(cfg.critical_change_threshold, 20);
        assert_eq!(cfg.tick_interval_secs, 5);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn env_overrides_apply() {
        let cfg = AppConfig::from_lookup(lookup(&[
            (ENV_DATA_DIR, "/tmp/rw"),
            (ENV_BIND, "0.0.0.0:9000"),
            (ENV_SIGNIFICANCE, "5"),
            (ENV_CRITICAL_DELTA, "15"),
            (ENV_TICK_SECS, "2"),
            (ENV_MAX_PARALLEL, "4"),
        ]))
        .unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/tmp/rw"));
        assert_eq!(cfg.database_path(), PathBuf::from("/tmp/rw/riskwatch.db"));
        assert_eq!(cfg.bind.port(), 9000);
        assert_eq!(cfg.engine.significance_threshold, 5);
        assert_eq!(cfg.engine.critical_change_threshold, 15);
        assert_eq!(cfg.engine.tick_interval_secs, 2);
        assert_eq!(cfg.engine.max_parallel_cycles, 4);
    }

    #[test]
    fn invalid_values_are_rejected_not_defaulted() {
        let err = AppConfig::from_lookup(lookup(&[
            (ENV_DATA_DIR, "/tmp/rw"),
            (ENV_TICK_SECS, "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: ENV_TICK_SECS, .. }));

        let err = AppConfig::from_lookup(lookup(&[
            (ENV_DATA_DIR, "/tmp/rw"),
            (ENV_SIGNIFICANCE, "30"),
            (ENV_CRITICAL_DELTA, "20"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { key: "critical_change_threshold", .. }
        ));
    }

    #[test]
    fn zero_threshold_rejected() {
        let cfg = EngineConfig {
            significance_threshold: 0,
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn retry_delay_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(50));
        assert_eq!(policy.delay_for(2), Duration::from_millis(100));
        assert_eq!(policy.delay_for(10), Duration::from_millis(1000));
    }

    #[test]
    fn app_name_is_riskwatch() {
        assert_eq!(APP_NAME, "RiskWatch");
    }
}
