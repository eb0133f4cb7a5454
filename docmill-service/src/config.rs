use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ServiceError, ServiceResult};

/// Service configuration, loaded once at startup from `config.{toml,yaml,...}`
/// plus `DOCMILL__`-prefixed environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_storage")]
    pub storage: StorageConfig,

    #[serde(default = "default_pipeline")]
    pub pipeline: PipelineConfig,

    #[serde(default = "default_inference")]
    pub inference: InferenceConfig,
}

impl ServiceConfig {
    pub fn load() -> ServiceResult<Self> {
        Config::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("DOCMILL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ServiceError::Config {
                message: e.to_string(),
            })
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            storage: default_storage(),
            pipeline: default_pipeline(),
            inference: default_inference(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Which storage backend holds uploaded document bytes.
/// Resolved once at startup; the pipeline never branches on it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    Local,
    Memory,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_kind")]
    pub backend: StorageKind,

    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Work queue and sweeper configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Number of concurrent pipeline workers
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Reconciliation sweep interval in seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Documents stuck in processing longer than this are failed by the sweeper
    #[serde(default = "default_stale_timeout_secs")]
    pub stale_timeout_secs: u64,

    /// Default max retries recorded on new work items
    #[serde(default = "default_max_retries")]
    pub work_item_max_retries: u32,

    #[serde(default = "default_max_document_size")]
    pub max_document_size_bytes: u64,
}

impl PipelineConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn stale_timeout(&self) -> Duration {
        Duration::from_secs(self.stale_timeout_secs)
    }
}

/// Which inference provider implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceProviderKind {
    Http,
    Mock,
}

/// LLM inference configuration
#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    #[serde(default = "default_provider_kind")]
    pub provider: InferenceProviderKind,

    #[serde(default = "default_inference_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Retries allowed after the initial attempt for transient inference
    /// errors, so a fully transient run makes `max_retries + 1` calls
    #[serde(default = "default_inference_max_retries")]
    pub max_retries: u32,

    /// Base backoff delay; doubles after each transient failure
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl InferenceConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8370
}

fn default_storage() -> StorageConfig {
    StorageConfig {
        backend: default_storage_kind(),
        data_dir: default_data_dir(),
    }
}

fn default_storage_kind() -> StorageKind {
    StorageKind::Local
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_pipeline() -> PipelineConfig {
    PipelineConfig {
        worker_count: default_worker_count(),
        sweep_interval_secs: default_sweep_interval_secs(),
        stale_timeout_secs: default_stale_timeout_secs(),
        work_item_max_retries: default_max_retries(),
        max_document_size_bytes: default_max_document_size(),
    }
}

fn default_worker_count() -> usize {
    4
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_stale_timeout_secs() -> u64 {
    15 * 60
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_document_size() -> u64 {
    100 * 1024 * 1024
}

fn default_inference() -> InferenceConfig {
    InferenceConfig {
        provider: default_provider_kind(),
        base_url: default_inference_url(),
        model: default_model(),
        temperature: default_temperature(),
        top_p: default_top_p(),
        max_tokens: default_max_tokens(),
        request_timeout_secs: default_request_timeout_secs(),
        max_retries: default_inference_max_retries(),
        retry_base_delay_ms: default_retry_base_delay_ms(),
    }
}

fn default_provider_kind() -> InferenceProviderKind {
    InferenceProviderKind::Http
}

fn default_inference_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_top_p() -> f32 {
    0.9
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_inference_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}
