use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::extraction::ChatBackendSettings;
use crate::secrets::resolve_secret_optional;
use crate::storage::RetryPolicy;

pub const CONFIG_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub backends: BackendsConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            processing: ProcessingConfig::default(),
            retry: RetryConfig::default(),
            queue: QueueConfig::default(),
            storage: StorageConfig::default(),
            database: DatabaseConfig::default(),
            backends: BackendsConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Documents at or below this size are processed inline.
    #[serde(default = "default_sync_threshold_mb")]
    pub sync_threshold_mb: f64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_render_dpi")]
    pub render_dpi: u32,
    #[serde(default = "default_max_image_dimension")]
    pub max_image_dimension: u32,
    #[serde(default = "default_max_processing_secs")]
    pub max_processing_secs: u64,
}

fn default_sync_threshold_mb() -> f64 {
    10.0
}

fn default_batch_size() -> usize {
    crate::extraction::DEFAULT_BATCH_SIZE
}

fn default_render_dpi() -> u32 {
    300
}

fn default_max_image_dimension() -> u32 {
    2048
}

fn default_max_processing_secs() -> u64 {
    300
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            sync_threshold_mb: default_sync_threshold_mb(),
            batch_size: default_batch_size(),
            render_dpi: default_render_dpi(),
            max_image_dimension: default_max_image_dimension(),
            max_processing_secs: default_max_processing_secs(),
        }
    }
}

impl ProcessingConfig {
    pub fn max_processing(&self) -> Duration {
        Duration::from_secs(self.max_processing_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

fn default_initial_delay_secs() -> f64 {
    5.0
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_factor() -> f64 {
    1.5
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: default_initial_delay_secs(),
            max_retries: default_max_retries(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_secs_f64(self.initial_delay_secs.max(0.0)),
            max_retries: self.max_retries,
            backoff_factor: self.backoff_factor,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_name")]
    pub name: String,
    #[serde(default = "default_dead_letter_name")]
    pub dead_letter_name: String,
    #[serde(default = "default_polling_interval_secs")]
    pub polling_interval_secs: u64,
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
}

fn default_queue_name() -> String {
    "idp-processing-queue".to_string()
}

fn default_dead_letter_name() -> String {
    "failed-processing".to_string()
}

fn default_polling_interval_secs() -> u64 {
    5
}

fn default_visibility_timeout_secs() -> u64 {
    60
}

fn default_max_messages() -> usize {
    1
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: default_queue_name(),
            dead_letter_name: default_dead_letter_name(),
            polling_interval_secs: default_polling_interval_secs(),
            visibility_timeout_secs: default_visibility_timeout_secs(),
            max_messages: default_max_messages(),
        }
    }
}

impl QueueConfig {
    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_secs)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    #[serde(default = "default_container")]
    pub container: String,
    #[serde(default = "default_processed_container")]
    pub processed_container: String,
    #[serde(default = "default_true")]
    pub copy_to_processed: bool,
}

fn default_storage_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".idp")
        .join("objects")
}

fn default_container() -> String {
    "documents".to_string()
}

fn default_processed_container() -> String {
    "processed".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            container: default_container(),
            processed_container: default_processed_container(),
            copy_to_processed: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

fn default_database_path() -> PathBuf {
    crate::db::default_database_path().unwrap_or_else(|| PathBuf::from("idp.db"))
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendsConfig {
    #[serde(default = "BackendConfig::default_primary")]
    pub primary: BackendConfig,
    #[serde(default = "BackendConfig::default_secondary")]
    pub secondary: BackendConfig,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            primary: BackendConfig::default_primary(),
            secondary: BackendConfig::default_secondary(),
        }
    }
}

/// An OpenAI-compatible chat endpoint that accepts image input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub name: String,
    pub endpoint: String,
    pub model: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_tokens() -> u32 {
    4096
}

impl BackendConfig {
    fn local(name: &str) -> Self {
        Self {
            name: name.to_string(),
            endpoint: "http://localhost:11434/v1".to_string(),
            model: "llama3.2-vision".to_string(),
            api_key: None,
            api_key_file: None,
            api_key_env: None,
            timeout_secs: default_timeout_secs(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
        }
    }

    pub fn default_primary() -> Self {
        Self::local("primary")
    }

    pub fn default_secondary() -> Self {
        Self::local("secondary")
    }

    /// Resolves the API key and builds client settings.
    pub fn settings(&self) -> Result<ChatBackendSettings, ConfigError> {
        let api_key = resolve_secret_optional(
            self.api_key.as_deref(),
            self.api_key_file.as_deref(),
            self.api_key_env.as_deref(),
        )
        .map_err(|e| ConfigError::Secret {
            backend: self.name.clone(),
            source: e,
        })?;

        Ok(ChatBackendSettings {
            name: self.name.clone(),
            endpoint: self.endpoint.clone(),
            model: self.model.clone(),
            api_key,
            timeout: Duration::from_secs(self.timeout_secs),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
    /// Empty means any domain not explicitly blocked.
    #[serde(default)]
    pub allowed_domains: Vec<String>,
    #[serde(default)]
    pub blocked_domains: Vec<String>,
    #[serde(default = "default_true")]
    pub require_https: bool,
    #[serde(default = "default_true")]
    pub block_private_ips: bool,
}

fn default_max_file_size_mb() -> u64 {
    100
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: default_max_file_size_mb(),
            allowed_domains: Vec::new(),
            blocked_domains: Vec::new(),
            require_https: true,
            block_private_ips: true,
        }
    }
}
