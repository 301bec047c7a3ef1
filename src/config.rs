use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MnemaConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub retrieval: RetrievalConfig,
    pub hsg: HsgConfig,
    pub coactivation: CoactivationConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub transport: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    /// Metadata backend. Only `sqlite` is wired; `postgres` is recognized
    /// and rejected at startup with a clear error.
    pub metadata_backend: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `synthetic`, `openai`, `gemini`, or `ollama`. Hosted providers are
    /// external adapters; only `synthetic` ships in-tree.
    pub provider: String,
    /// Blending tier: `fast`, `smart`, `deep`, or `hybrid`.
    pub tier: String,
    /// System-wide vector dimension. Must match the provider's output.
    pub dim: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IndexConfig {
    /// Select the approximate HNSW backend instead of exact-linear.
    pub use_approx: bool,
    /// Over-fetch multiplier applied when the backend cannot pre-filter.
    pub overfetch_factor: usize,
    /// Number of user-hash partitions for the approximate backend.
    /// Must be a power of two.
    pub partitions: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_limit: usize,
    /// Top-N candidates whose waypoints seed graph expansion.
    pub expansion_seeds: usize,
    /// Hard cap on neighbors visited during waypoint expansion.
    pub max_expansion: usize,
    /// Re-rank weights: final = α·cosine + β·salience + γ·recency + δ·path.
    pub weight_cosine: f64,
    pub weight_salience: f64,
    pub weight_recency: f64,
    pub weight_path: f64,
    /// Recency half-life in days for the γ term.
    pub recency_half_life_days: f64,
    pub cache_enabled: bool,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HsgConfig {
    /// Cosine threshold: below it an incoming memory starts a new waypoint.
    pub waypoint_threshold: f64,
    /// Max members per waypoint before a new one is forced.
    pub waypoint_capacity: usize,
    /// Max edges followed out of any single waypoint during expansion.
    pub max_waypoint_neighbors: usize,
    /// Salience added on reinforcement, capped at 1.0.
    pub reinforce_step: f64,
    pub salience_floor: f64,
    /// Per-day decay rates; episodic memories fade faster.
    pub episodic_decay_per_day: f64,
    pub default_decay_per_day: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CoactivationConfig {
    /// `cron` (durable queue, default), `interval` (legacy in-memory
    /// buffer), or `disabled`.
    pub mode: String,
    pub batch_size: usize,
    pub max_retries: u32,
    pub poll_interval_secs: u64,
    pub backoff_base_secs: u64,
}

impl Default for MnemaConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            embedding: EmbeddingConfig::default(),
            index: IndexConfig::default(),
            retrieval: RetrievalConfig::default(),
            hsg: HsgConfig::default(),
            coactivation: CoactivationConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".into(),
            host: "127.0.0.1".into(),
            port: 7474,
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_mnema_dir()
            .join("mnema.db")
            .to_string_lossy()
            .into_owned();
        Self {
            db_path,
            metadata_backend: "sqlite".into(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "synthetic".into(),
            tier: "fast".into(),
            dim: 768,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            use_approx: false,
            overfetch_factor: 3,
            partitions: 8,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            expansion_seeds: 3,
            max_expansion: 16,
            weight_cosine: 0.6,
            weight_salience: 0.2,
            weight_recency: 0.15,
            weight_path: 0.05,
            recency_half_life_days: 30.0,
            cache_enabled: true,
            cache_ttl_secs: 60,
            cache_capacity: 512,
        }
    }
}

impl Default for HsgConfig {
    fn default() -> Self {
        Self {
            waypoint_threshold: 0.72,
            waypoint_capacity: 64,
            max_waypoint_neighbors: 8,
            reinforce_step: 0.1,
            salience_floor: 0.05,
            episodic_decay_per_day: 0.05,
            default_decay_per_day: 0.01,
        }
    }
}

impl Default for CoactivationConfig {
    fn default() -> Self {
        Self {
            mode: "cron".into(),
            batch_size: 32,
            max_retries: 5,
            poll_interval_secs: 5,
            backoff_base_secs: 2,
        }
    }
}

/// Returns `~/.mnema/`
pub fn default_mnema_dir() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".mnema")
}

/// Returns the default config file path: `~/.mnema/config.toml`
pub fn default_config_path() -> PathBuf {
    default_mnema_dir().join("config.toml")
}

impl MnemaConfig {
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
            MnemaConfig::default()
        };

        config.apply_env_overrides();
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MNEMA_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("MNEMA_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("METADATA_BACKEND") {
            self.storage.metadata_backend = val;
        }
        if let Ok(val) = std::env::var("USE_APPROX_VECTOR") {
            self.index.use_approx = parse_bool(&val, self.index.use_approx);
        }
        if let Ok(val) = std::env::var("OVERFETCH_FACTOR") {
            if let Ok(f) = val.parse::<usize>() {
                self.index.overfetch_factor = f;
            }
        }
        if let Ok(val) = std::env::var("VECTOR_PARTITIONS") {
            if let Ok(p) = val.parse::<u32>() {
                self.index.partitions = p;
            }
        }
        if let Ok(val) = std::env::var("EMBEDDINGS") {
            self.embedding.provider = val;
        }
        if let Ok(val) = std::env::var("TIER") {
            self.embedding.tier = val;
        }
        if let Ok(val) = std::env::var("VEC_DIM") {
            if let Ok(d) = val.parse::<usize>() {
                self.embedding.dim = d;
            }
        }
        if let Ok(val) = std::env::var("CACHE_ENABLED") {
            self.retrieval.cache_enabled = parse_bool(&val, self.retrieval.cache_enabled);
        }
        if let Ok(val) = std::env::var("COACTIVATION_MODE") {
            self.coactivation.mode = val;
        }
    }

    /// Reject configurations the engine cannot honor.
    pub fn validate(&self) -> Result<()> {
        match self.storage.metadata_backend.as_str() {
            "sqlite" => {}
            other => anyhow::bail!("unknown metadata backend: {other}. Supported: sqlite"),
        }
        if self.embedding.dim == 0 {
            anyhow::bail!("VEC_DIM must be a positive integer");
        }
        if self.index.overfetch_factor == 0 {
            anyhow::bail!("OVERFETCH_FACTOR must be >= 1");
        }
        if !self.index.partitions.is_power_of_two() {
            anyhow::bail!(
                "VECTOR_PARTITIONS must be a power of two, got {}",
                self.index.partitions
            );
        }
        match self.coactivation.mode.as_str() {
            "cron" | "interval" | "disabled" => {}
            other => anyhow::bail!(
                "unknown coactivation mode: {other}. Supported: cron, interval, disabled"
            ),
        }
        Ok(())
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

fn parse_bool(val: &str, fallback: bool) -> bool {
    match val.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => fallback,
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
        let config = MnemaConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.transport, "stdio");
        assert_eq!(config.storage.metadata_backend, "sqlite");
        assert_eq!(config.embedding.dim, 768);
        assert_eq!(config.index.overfetch_factor, 3);
        assert_eq!(config.index.partitions, 8);
        assert_eq!(config.coactivation.mode, "cron");
        assert!(config.storage.db_path.ends_with("mnema.db"));
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"

[storage]
db_path = "/tmp/test.db"

[index]
use_approx = true
partitions = 16

[retrieval]
default_limit = 25
"#;
        let config: MnemaConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.storage.db_path, "/tmp/test.db");
        assert!(config.index.use_approx);
        assert_eq!(config.index.partitions, 16);
        assert_eq!(config.retrieval.default_limit, 25);
        // defaults still apply for unset fields
        assert_eq!(config.retrieval.cache_ttl_secs, 60);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = MnemaConfig::default();
        std::env::set_var("MNEMA_DB", "/tmp/override.db");
        std::env::set_var("USE_APPROX_VECTOR", "true");
        std::env::set_var("OVERFETCH_FACTOR", "5");
        std::env::set_var("CACHE_ENABLED", "false");
        std::env::set_var("COACTIVATION_MODE", "disabled");

        config.apply_env_overrides();

        assert_eq!(config.storage.db_path, "/tmp/override.db");
        assert!(config.index.use_approx);
        assert_eq!(config.index.overfetch_factor, 5);
        assert!(!config.retrieval.cache_enabled);
        assert_eq!(config.coactivation.mode, "disabled");

        // Clean up
        std::env::remove_var("MNEMA_DB");
        std::env::remove_var("USE_APPROX_VECTOR");
        std::env::remove_var("OVERFETCH_FACTOR");
        std::env::remove_var("CACHE_ENABLED");
        std::env::remove_var("COACTIVATION_MODE");
    }

    #[test]
    fn postgres_backend_is_rejected() {
        let mut config = MnemaConfig::default();
        config.storage.metadata_backend = "postgres".into();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("Supported: sqlite"));
    }

    #[test]
    fn non_power_of_two_partitions_rejected() {
        let mut config = MnemaConfig::default();
        config.index.partitions = 6;
        assert!(config.validate().is_err());
    }
}
