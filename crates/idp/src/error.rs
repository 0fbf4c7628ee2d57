use std::path::PathBuf;
use thiserror::Error;

use crate::db::DatabaseError;
use crate::extraction::ExtractionError;

#[derive(Error, Debug)]
pub enum IdpError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Security error: {0}")]
    Security(#[from] SecurityError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] DatabaseError),
}

/// Coarse classification used in logs and dead-letter payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Security,
    TransientStorage,
    ExtractionBackend,
    Persistence,
    UnsupportedMode,
    Queue,
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Security => "security",
            Self::TransientStorage => "transient_storage",
            Self::ExtractionBackend => "extraction_backend",
            Self::Persistence => "persistence",
            Self::UnsupportedMode => "unsupported_mode",
            Self::Queue => "queue",
            Self::Config => "config",
        }
    }
}

impl IdpError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Security(_) => ErrorKind::Security,
            Self::Config(_) => ErrorKind::Config,
            Self::Storage(_) => ErrorKind::TransientStorage,
            Self::Queue(_) => ErrorKind::Queue,
            Self::Extraction(ExtractionError::UnsupportedMode(_)) => ErrorKind::UnsupportedMode,
            Self::Extraction(_) => ErrorKind::ExtractionBackend,
            Self::Persistence(_) => ErrorKind::Persistence,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Secret for backend '{backend}' could not be resolved: {source}")]
    Secret {
        backend: String,
        #[source]
        source: crate::secrets::SecretError,
    },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object '{name}' not found in container '{container}'")]
    NotFound { container: String, name: String },

    #[error("Invalid object name '{0}'")]
    InvalidName(String),

    #[error("I/O error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Object '{name}' still unreadable after {attempts} attempts ({waited_secs:.2}s waited): {source}")]
    Unavailable {
        name: String,
        attempts: u32,
        waited_secs: f64,
        #[source]
        source: Box<StorageError>,
    },
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Failed to encode queue message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Lease on message '{message_id}' is no longer held")]
    LeaseLost { message_id: String },

    #[error("Malformed queue message: {0}")]
    Malformed(String),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("At least one field is required")]
    NoFields,

    #[error("Too many fields: {count} (maximum {max})")]
    TooManyFields { count: usize, max: usize },

    #[error("Duplicate field name '{0}'")]
    DuplicateField(String),

    #[error("Invalid field name '{0}': must start with a letter or underscore and contain only letters, digits and underscores (1-100 chars)")]
    InvalidFieldName(String),

    #[error("Description of field '{field}' must be between {min} and {max} characters")]
    InvalidDescription { field: String, min: usize, max: usize },

    #[error("Prompt must be between {min} and {max} characters (got {len})")]
    InvalidPrompt { len: usize, min: usize, max: usize },

    #[error("Unsupported document format '{0}'")]
    UnsupportedFormat(String),
}

#[derive(Error, Debug, PartialEq)]
pub enum SecurityError {
    #[error("File is empty")]
    EmptyFile,

    #[error("File size {size_mb:.2} MB exceeds the {max_mb} MB limit")]
    FileTooLarge { size_mb: f64, max_mb: u64 },

    #[error("Extension '{0}' is not allowed")]
    DangerousExtension(String),

    #[error("Invalid source URL '{0}'")]
    InvalidUrl(String),

    #[error("Only https sources are accepted (got '{0}')")]
    InsecureScheme(String),

    #[error("Domain '{0}' is blocked")]
    DomainBlocked(String),

    #[error("Domain '{0}' is not in the allowed list")]
    DomainNotAllowed(String),

    #[error("Private or loopback address '{0}' is not allowed")]
    PrivateAddress(String),
}

pub type Result<T> = std::result::Result<T, IdpError>;
