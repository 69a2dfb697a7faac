use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    pub storage: StorageConfig,
    pub watcher: WatcherConfig,
    pub decay: DecayConfig,
    pub community: CommunityConfig,
    pub search: SearchConfig,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory holding the plain-text corpus.
    pub root: String,
    /// Path to the SQLite store.
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WatcherConfig {
    /// Quiet period for corpus file events, in milliseconds.
    pub debounce_ms: u64,
    /// Quiet period for store-file events before community recomputation.
    pub community_debounce_ms: u64,
    /// Applied changes between FTS optimize passes.
    pub optimize_every: u64,
    /// Wall-clock hours between space-reclamation passes.
    pub vacuum_interval_hours: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DecayConfig {
    /// Grace period for ephemeral working sessions (days).
    pub grace_days_sessions: i64,
    /// Grace period for queued workflows (days).
    pub grace_days_workflows: i64,
    /// Grace period for everything else (days).
    pub grace_days_default: i64,
    /// Exponential half-life after the grace period (days).
    pub half_life_days: i64,
    /// "power-law" (default) or "exponential".
    pub curve: String,
    /// Power-law scale parameter.
    pub power_law_a: f64,
    /// Power-law rate parameter. 0.5 means weight halves when elapsed time
    /// quadruples.
    pub power_law_b: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CommunityConfig {
    /// Louvain resolution parameter (gamma).
    pub resolution: f64,
    /// Optional seed for deterministic node-visitation order.
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub rrf_k: usize,
    pub default_page_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            watcher: WatcherConfig::default(),
            decay: DecayConfig::default(),
            community: CommunityConfig::default(),
            search: SearchConfig::default(),
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let root = default_data_dir()
            .join("memory")
            .to_string_lossy()
            .into_owned();
        let db_path = default_data_dir()
            .join("memory.db")
            .to_string_lossy()
            .into_owned();
        Self { root, db_path }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 150,
            community_debounce_ms: 2000,
            optimize_every: 40,
            vacuum_interval_hours: 12,
        }
    }
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            grace_days_sessions: 7,
            grace_days_workflows: 14,
            grace_days_default: 28,
            half_life_days: 30,
            curve: "power-law".into(),
            power_law_a: 1.0,
            power_law_b: 0.5,
        }
    }
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self {
            resolution: 1.0,
            seed: None,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60,
            default_page_size: 10,
        }
    }
}

/// Returns `~/.mnemograph/`
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".mnemograph")
}

/// Returns the default config file path: `~/.mnemograph/config.toml`
pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.toml")
}

impl EngineConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            EngineConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MNEMOGRAPH_ROOT") {
            self.storage.root = val;
        }
        if let Ok(val) = std::env::var("MNEMOGRAPH_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("MNEMOGRAPH_LOG_LEVEL") {
            self.log_level = val;
        }
        if let Ok(val) = std::env::var("MNEMOGRAPH_DEBOUNCE_MS") {
            if let Ok(ms) = val.parse() {
                self.watcher.debounce_ms = ms;
            }
        }
        if let Ok(val) = std::env::var("MNEMOGRAPH_LOUVAIN_GAMMA") {
            if let Ok(gamma) = val.parse() {
                self.community.resolution = gamma;
            }
        }
        if let Ok(val) = std::env::var("MNEMOGRAPH_DECAY_CURVE") {
            self.decay.curve = val;
        }
    }

    /// Resolve the corpus root, expanding `~` if needed.
    pub fn resolved_root(&self) -> PathBuf {
        expand_tilde(&self.storage.root)
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .expect("home directory must exist")
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.watcher.debounce_ms, 150);
        assert_eq!(config.watcher.optimize_every, 40);
        assert_eq!(config.watcher.vacuum_interval_hours, 12);
        assert_eq!(config.decay.grace_days_default, 28);
        assert_eq!(config.decay.curve, "power-law");
        assert_eq!(config.community.resolution, 1.0);
        assert!(config.community.seed.is_none());
        assert_eq!(config.search.rrf_k, 60);
        assert!(config.storage.db_path.ends_with("memory.db"));
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
log_level = "debug"

[storage]
root = "/tmp/corpus"
db_path = "/tmp/test.db"

[decay]
grace_days_default = 14
curve = "exponential"

[community]
resolution = 1.2
seed = 42
"#;
        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.storage.root, "/tmp/corpus");
        assert_eq!(config.storage.db_path, "/tmp/test.db");
        assert_eq!(config.decay.grace_days_default, 14);
        assert_eq!(config.decay.curve, "exponential");
        assert!((config.community.resolution - 1.2).abs() < 1e-9);
        assert_eq!(config.community.seed, Some(42));
        // defaults still apply for unset fields
        assert_eq!(config.search.rrf_k, 60);
        assert_eq!(config.watcher.community_debounce_ms, 2000);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = EngineConfig::default();
        std::env::set_var("MNEMOGRAPH_DB", "/tmp/override.db");
        std::env::set_var("MNEMOGRAPH_ROOT", "/tmp/override-corpus");
        std::env::set_var("MNEMOGRAPH_LOUVAIN_GAMMA", "0.8");

        config.apply_env_overrides();

        assert_eq!(config.storage.db_path, "/tmp/override.db");
        assert_eq!(config.storage.root, "/tmp/override-corpus");
        assert!((config.community.resolution - 0.8).abs() < 1e-9);

        // Clean up
        std::env::remove_var("MNEMOGRAPH_DB");
        std::env::remove_var("MNEMOGRAPH_ROOT");
        std::env::remove_var("MNEMOGRAPH_LOUVAIN_GAMMA");
    }
}
