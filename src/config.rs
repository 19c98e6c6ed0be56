//! Store configuration
//!
//! Defaults follow the platform data directory. Every field can be overridden
//! from the environment so the host shell and tests can point the store
//! somewhere else without code changes.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const ENV_DB_PATH: &str = "DEBATE_FEEDBACK_DB_PATH";
pub const ENV_BUSY_TIMEOUT_MS: &str = "DEBATE_FEEDBACK_BUSY_TIMEOUT_MS";
pub const ENV_RESET_ON_MISMATCH: &str = "DEBATE_FEEDBACK_RESET_ON_MISMATCH";
pub const ENV_RETENTION_DAYS: &str = "DEBATE_FEEDBACK_RETENTION_DAYS";

const DB_FILE_NAME: &str = "debate_feedback.db";

/// Upper bound accepted for `local_retention_days` (about a century)
pub const MAX_RETENTION_DAYS: u32 = 36_500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    /// How long a connection waits on a locked database before failing
    pub busy_timeout_ms: u64,
    /// Delete and recreate a database whose layout does not match.
    /// Off by default: a mismatch fails the open instead.
    pub reset_on_schema_mismatch: bool,
    /// Age after which local audio is eligible for cleanup
    pub local_retention_days: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("debate-feedback");

        Self {
            db_path: data_dir.join(DB_FILE_NAME),
            busy_timeout_ms: 5_000,
            reset_on_schema_mismatch: false,
            local_retention_days: 7,
        }
    }
}

impl StoreConfig {
    /// Default settings for a database at an explicit path
    pub fn at(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }

    /// Defaults overridden by the `DEBATE_FEEDBACK_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup(ENV_DB_PATH) {
            config.db_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup(ENV_BUSY_TIMEOUT_MS) {
            config.busy_timeout_ms = raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: {:?}", ENV_BUSY_TIMEOUT_MS, raw))?;
        }
        if let Some(raw) = lookup(ENV_RESET_ON_MISMATCH) {
            config.reset_on_schema_mismatch = parse_flag(&raw)
                .with_context(|| format!("Invalid {}: {:?}", ENV_RESET_ON_MISMATCH, raw))?;
        }
        if let Some(raw) = lookup(ENV_RETENTION_DAYS) {
            let days: u32 = raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: {:?}", ENV_RETENTION_DAYS, raw))?;
            anyhow::ensure!(
                days <= MAX_RETENTION_DAYS,
                "Invalid {}: {} days exceeds the maximum of {}",
                ENV_RETENTION_DAYS,
                days,
                MAX_RETENTION_DAYS
            );
            config.local_retention_days = days;
        }

        Ok(config)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.local_retention_days))
    }
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => anyhow::bail!("expected true/false, got {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = StoreConfig::at("/tmp/store.db");
        assert_eq!(config.db_path, PathBuf::from("/tmp/store.db"));
        assert_eq!(config.busy_timeout(), Duration::from_secs(5));
        assert!(!config.reset_on_schema_mismatch);
        assert_eq!(config.retention(), chrono::Duration::days(7));
        assert!(StoreConfig::default().db_path.ends_with("debate-feedback/debate_feedback.db"));
    }

    #[test]
    fn test_env_overrides() {
        let config = StoreConfig::from_lookup(lookup(&[
            (ENV_DB_PATH, "/data/df.db"),
            (ENV_BUSY_TIMEOUT_MS, "250"),
            (ENV_RESET_ON_MISMATCH, "TRUE"),
            (ENV_RETENTION_DAYS, "30"),
        ]))
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/data/df.db"));
        assert_eq!(config.busy_timeout_ms, 250);
        assert!(config.reset_on_schema_mismatch);
        assert_eq!(config.local_retention_days, 30);
    }

    #[test]
    fn test_bad_values_are_reported() {
        let err = StoreConfig::from_lookup(lookup(&[(ENV_BUSY_TIMEOUT_MS, "soon")])).unwrap_err();
        assert!(err.to_string().contains(ENV_BUSY_TIMEOUT_MS));

        assert!(StoreConfig::from_lookup(lookup(&[(ENV_RESET_ON_MISMATCH, "maybe")])).is_err());

        let err = StoreConfig::from_lookup(lookup(&[(ENV_RETENTION_DAYS, "1000000000")])).unwrap_err();
        assert!(err.to_string().contains(ENV_RETENTION_DAYS));
        let config = StoreConfig::from_lookup(lookup(&[(ENV_RETENTION_DAYS, "36500")])).unwrap();
        assert_eq!(config.local_retention_days, MAX_RETENTION_DAYS);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: StoreConfig = serde_json::from_str(r#"{"db_path": "/x.db"}"#).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/x.db"));
        assert_eq!(config.local_retention_days, 7);
    }
}
