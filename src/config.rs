use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngramConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub backup: BackupConfig,
    pub embedding: EmbeddingConfig,
    pub vector: VectorConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// Display name carried in the identity file and health response,
    /// used to tell sibling daemons apart.
    pub name: String,
    pub host: String,
    /// Preferred port. The actual port is negotiated upward when busy.
    pub port: u16,
    pub log_level: String,
    /// Optional append-only log file. Logs go to stderr when unset.
    pub log_file: Option<String>,
    /// CORS origins allowed by the HTTP adapter. Unset means permissive,
    /// the right default for localhost use.
    pub allowed_origins: Option<Vec<String>>,
    /// Directory holding the visualization bundle served at `/`.
    pub static_dir: String,
    /// Wall-clock budget for a normal tool call, in seconds.
    pub request_timeout_secs: u64,
    /// Wall-clock budget for `generate_embeddings`, in seconds.
    pub embedding_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BackupConfig {
    pub backup_dir: String,
    pub backup_on_start: bool,
    /// Hours between periodic backups. 0 disables the ticker.
    pub interval_hours: u64,
    /// Retain at least this many of the newest backups.
    pub min_backups: usize,
    /// Never delete a backup younger than this many days.
    pub min_backup_age_days: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `"local"` (ONNX Runtime) or `"remote"` (OpenAI-style API).
    pub provider: String,
    pub model: String,
    pub api_key: Option<String>,
    pub api_url: String,
    /// Vector width for the remote provider; the local model is fixed at 384.
    pub dimensions: usize,
    pub batch_size: usize,
    /// Embed new entities as part of the write path when true.
    pub auto_generate: bool,
    pub cache_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VectorConfig {
    pub default_k: usize,
    pub default_threshold: f64,
    pub default_hybrid_weight: f64,
}

impl Default for EngramConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            backup: BackupConfig::default(),
            embedding: EmbeddingConfig::default(),
            vector: VectorConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        let static_dir = default_engram_dir()
            .join("web")
            .to_string_lossy()
            .into_owned();
        Self {
            name: "engram".into(),
            host: "localhost".into(),
            port: 6789,
            log_level: "info".into(),
            log_file: None,
            allowed_origins: None,
            static_dir,
            request_timeout_secs: 30,
            embedding_timeout_secs: 600,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_engram_dir()
            .join("data")
            .join("knowledge_graph.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        let backup_dir = default_engram_dir()
            .join("backup")
            .to_string_lossy()
            .into_owned();
        Self {
            backup_dir,
            backup_on_start: true,
            interval_hours: 24,
            min_backups: 5,
            min_backup_age_days: 1,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_engram_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "local".into(),
            model: "all-MiniLM-L6-v2".into(),
            api_key: None,
            api_url: "https://api.openai.com/v1/embeddings".into(),
            dimensions: 1536,
            batch_size: 32,
            auto_generate: false,
            cache_dir,
        }
    }
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            default_k: 10,
            default_threshold: 0.3,
            default_hybrid_weight: 0.7,
        }
    }
}

/// Base directory for configuration, data, backups, and models.
///
/// `ENGRAM_CONFIG_DIR` overrides the default of `~/.engram/`. The directory
/// is shared between host and container so sibling processes can coordinate
/// through the identity file and WAL.
pub fn default_engram_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("ENGRAM_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .map(|h| h.join(".engram"))
        .unwrap_or_else(|| PathBuf::from(".engram"))
}

/// Default config file path: `<base>/config.toml`.
pub fn default_config_path() -> PathBuf {
    default_engram_dir().join("config.toml")
}

/// True when running inside a container.
pub fn in_docker() -> bool {
    if let Ok(val) = std::env::var("ENGRAM_IN_DOCKER") {
        return matches!(val.as_str(), "1" | "true" | "yes");
    }
    Path::new("/.dockerenv").exists()
}

impl EngramConfig {
    /// Load config from the default TOML file, then apply env overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            EngramConfig::default()
        };

        config.apply_env_overrides();
        if in_docker() {
            // Containers must listen on all interfaces; the host port-forward
            // cannot reach a loopback-only bind.
            config.server.host = "0.0.0.0".into();
        }
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("ENGRAM_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("ENGRAM_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("ENGRAM_PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }
        if let Ok(val) = std::env::var("ENGRAM_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("ENGRAM_API_KEY") {
            self.embedding.api_key = Some(val);
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    /// Resolve the backup directory, expanding `~` if needed.
    pub fn resolved_backup_dir(&self) -> PathBuf {
        expand_tilde(&self.backup.backup_dir)
    }

    /// Resolve the static asset directory, expanding `~` if needed.
    pub fn resolved_static_dir(&self) -> PathBuf {
        expand_tilde(&self.server.static_dir)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .map(|h| h.join(rest))
            .unwrap_or_else(|| PathBuf::from(path))
    } else {
        PathBuf::from(path)
    }
}
