//! Session configuration

use anyhow::{Context, Result};
use concierge_realtime::CachePolicy;
use concierge_store::PersistenceConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_DB_PATH: &str = "CONCIERGE_DB_PATH";
pub const ENV_ANALYZER_URL: &str = "CONCIERGE_ANALYZER_URL";
pub const ENV_ANON_KEY: &str = "CONCIERGE_ANON_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConciergeConfig {
    pub storage: StorageConfig,
    pub analyzer: AnalyzerConfig,
    pub cache: CacheConfig,
    pub realtime: RealtimeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let persistence = PersistenceConfig::default();
        Self {
            db_path: persistence.db_path,
            max_connections: persistence.max_connections,
        }
    }
}

/// Message analysis service. Analysis only runs when `enabled` is set and
/// an endpoint is configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub enabled: bool,
    pub endpoint: Option<String>,
    pub anon_key: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
            anon_key: None,
            timeout_seconds: 30,
        }
    }
}

impl AnalyzerConfig {
    pub fn is_active(&self) -> bool {
        self.enabled && self.endpoint.is_some()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub conversation_stale_seconds: u64,
    pub conversation_gc_seconds: u64,
    pub messages_stale_seconds: u64,
    pub messages_gc_seconds: u64,
    pub counts_stale_seconds: u64,
    /// How often idle entries past their gc time are swept
    pub gc_interval_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            conversation_stale_seconds: 5 * 60,
            conversation_gc_seconds: 10 * 60,
            messages_stale_seconds: 10,
            messages_gc_seconds: 5 * 60,
            counts_stale_seconds: 30,
            gc_interval_seconds: 60,
        }
    }
}

impl CacheConfig {
    pub fn conversation_policy(&self) -> CachePolicy {
        CachePolicy::new(
            Duration::from_secs(self.conversation_stale_seconds),
            Duration::from_secs(self.conversation_gc_seconds),
        )
    }

    pub fn messages_policy(&self) -> CachePolicy {
        CachePolicy::new(
            Duration::from_secs(self.messages_stale_seconds),
            Duration::from_secs(self.messages_gc_seconds),
        )
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_seconds)
    }

    /// Badge counts are kept as long as the message list
    pub fn counts_policy(&self) -> CachePolicy {
        CachePolicy::new(
            Duration::from_secs(self.counts_stale_seconds),
            Duration::from_secs(self.messages_gc_seconds),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Per-channel event buffer of the change feed
    pub channel_buffer: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self { channel_buffer: 64 }
    }
}

impl ConciergeConfig {
    /// Load a JSON config file, then apply environment overrides
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: ConciergeConfig =
            serde_json::from_str(&content).context("Failed to parse config file")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from any variable source. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(db_path) = var(ENV_DB_PATH) {
            self.storage.db_path = PathBuf::from(db_path);
        }
        if let Some(endpoint) = var(ENV_ANALYZER_URL) {
            self.analyzer.endpoint = Some(endpoint);
        }
        if let Some(anon_key) = var(ENV_ANON_KEY) {
            self.analyzer.anon_key = Some(anon_key);
        }
    }

    pub fn persistence(&self) -> PersistenceConfig {
        PersistenceConfig {
            db_path: self.storage.db_path.clone(),
            max_connections: self.storage.max_connections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: ConciergeConfig = serde_json::from_str(
            r#"{"storage": {"db_path": "/tmp/guest.db"}, "cache": {"messages_stale_seconds": 3}}"#,
        )
        .unwrap();

        assert_eq!(config.storage.db_path, PathBuf::from("/tmp/guest.db"));
        assert_eq!(config.storage.max_connections, 5);
        assert_eq!(config.cache.messages_stale_seconds, 3);
        assert_eq!(config.cache.conversation_stale_seconds, 300);
        assert_eq!(config.realtime.channel_buffer, 64);
        assert!(!config.analyzer.is_active());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_DB_PATH, "/data/concierge.db"),
            (ENV_ANALYZER_URL, "https://example.test/functions/v1/openai-analyzer"),
            (ENV_ANON_KEY, "  "),
        ]
        .into_iter()
        .collect();

        let mut config = ConciergeConfig::default();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.storage.db_path, PathBuf::from("/data/concierge.db"));
        assert!(config.analyzer.is_active());
        assert!(config.analyzer.anon_key.is_none());
    }

    #[test]
    fn test_cache_policies() {
        let cache = CacheConfig::default();
        assert_eq!(cache.conversation_policy().stale_time, Duration::from_secs(300));
        assert_eq!(cache.conversation_policy().gc_time, Duration::from_secs(600));
        assert_eq!(cache.messages_policy().stale_time, Duration::from_secs(10));
        assert_eq!(cache.messages_policy().gc_time, Duration::from_secs(300));
    }
}
