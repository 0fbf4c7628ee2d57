pub mod loader;
pub mod schema;

pub use loader::{load_config, load_config_from_str};
pub use schema::{
    BackendConfig, BackendsConfig, Config, DatabaseConfig, ProcessingConfig, QueueConfig,
    RetryConfig, SecurityConfig, StorageConfig, CONFIG_VERSION,
};
