//! Configuration management for AUI
//!
//! Loads configuration with priority:
//! 1. aui.toml (or specified config file)
//! 2. `${VAR}` references resolved from the environment
//! 3. Defaults

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "aui.toml";

/// AUI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuiConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP execution endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Prefix for the tool routes (`{base_path}/execute`, `{base_path}/confirm`)
    #[serde(default = "default_base_path")]
    pub base_path: String,
}

/// Client executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// URL of the execute endpoint (can reference env var with ${VAR_NAME})
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token sent with every request
    pub api_key: Option<String>,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Exponential,
    Linear,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    #[serde(default = "default_backoff")]
    pub backoff: BackoffKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStorageKind {
    Memory,
    Local,
    Session,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,

    #[serde(default = "default_max_size")]
    pub max_size: usize,

    #[serde(default = "default_storage")]
    pub storage: CacheStorageKind,

    /// File backing the `local` storage
    pub path: Option<PathBuf>,

    /// Session namespace for the `session` storage
    pub session_id: Option<String>,
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// EnvFilter directive used when RUST_LOG is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    #[serde(default)]
    pub json_logs: bool,

    pub service_name: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_path: default_base_path(),
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            timeout_ms: default_timeout_ms(),
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            delay_ms: default_delay_ms(),
            backoff: default_backoff(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_ms: default_ttl_ms(),
            max_size: default_max_size(),
            storage: default_storage(),
            path: None,
            session_id: None,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            json_logs: false,
            service_name: None,
        }
    }
}

impl AuiConfig {
    /// Load configuration with the following priority:
    /// 1. aui.toml in current directory or a parent
    /// 2. Environment variables referenced from it
    /// 3. Defaults
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p.to_path_buf()
        } else {
            Self::find_config_file()?
        };

        tracing::debug!("Loading configuration from: {:?}", config_path);

        let contents = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", config_path))
    }

    /// Parse configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let mut config: AuiConfig = toml::from_str(contents)?;
        config.resolve_env_vars();
        config.validate()?;
        Ok(config)
    }

    /// Find aui.toml by searching current directory and parents
    fn find_config_file() -> Result<PathBuf> {
        let mut current = env::current_dir()?;

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Ok(config_path);
            }

            if !current.pop() {
                break;
            }
        }

        Err(anyhow!(
            "{} not found. Create one with: cp aui.toml.example {}",
            CONFIG_FILE_NAME,
            CONFIG_FILE_NAME
        ))
    }

    fn resolve_env_vars(&mut self) {
        if let Some(resolved) = Self::resolve_env_var(&self.client.base_url) {
            self.client.base_url = resolved;
        }

        // An unresolved key reference means "no key", not the literal text
        if let Some(ref key) = self.client.api_key {
            self.client.api_key = Self::resolve_env_var(key).filter(|k| !k.is_empty());
        }
    }

    fn validate(&self) -> Result<()> {
        if self.client.retry.attempts == 0 {
            return Err(anyhow!("client.retry.attempts must be at least 1"));
        }
        if self.client.cache.enabled && self.client.cache.max_size == 0 {
            return Err(anyhow!("client.cache.max_size must be at least 1"));
        }
        if self.client.cache.enabled
            && self.client.cache.storage == CacheStorageKind::Local
            && self.client.cache.path.is_none()
        {
            return Err(anyhow!("client.cache.path is required for local storage"));
        }
        Ok(())
    }

    /// Resolve a single ${VAR_NAME} reference
    fn resolve_env_var(value: &str) -> Option<String> {
        if value.starts_with("${") && value.ends_with('}') {
            let var_name = &value[2..value.len() - 1];
            env::var(var_name).ok()
        } else {
            Some(value.to_string())
        }
    }

    /// Create test-friendly defaults (no config file required)
    pub fn test_defaults() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                base_path: default_base_path(),
            },
            client: ClientConfig {
                timeout_ms: 1_000,
                retry: RetryConfig {
                    attempts: 3,
                    delay_ms: 10,
                    backoff: BackoffKind::Exponential,
                },
                ..ClientConfig::default()
            },
            observability: ObservabilityConfig::default(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_base_path() -> String {
    "/api/tools".to_string()
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080/api/tools/execute".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_attempts() -> u32 {
    3
}

fn default_delay_ms() -> u64 {
    1_000
}

fn default_backoff() -> BackoffKind {
    BackoffKind::Exponential
}

fn default_ttl_ms() -> u64 {
    300_000
}

fn default_max_size() -> usize {
    100
}

fn default_storage() -> CacheStorageKind {
    CacheStorageKind::Memory
}

fn default_log_filter() -> String {
    "info".to_string()
}
