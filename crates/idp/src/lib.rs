pub mod config;
pub mod context;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod extraction;
pub mod queue;
pub mod sanitize;
pub mod secrets;
pub mod storage;
pub mod store;
pub mod worker;

pub use config::{load_config, load_config_from_str, Config};
pub use context::ServiceContext;
pub use db::{Database, DatabaseError};
pub use dispatch::{Dispatcher, SubmitOutcome, SubmitRequest};
pub use error::{
    ConfigError, ErrorKind, IdpError, QueueError, Result, SecurityError, StorageError,
    ValidationError,
};
pub use extraction::{
    ExtractionBackend, ExtractionError, ExtractionField, ExtractionOrchestrator, ExtractionResult,
    FieldSpec, FieldType, ProcessingMode,
};
pub use queue::{MessageQueue, ReceivedMessage, SqliteQueue};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use storage::{FileObjectStore, ObjectStore, RetryPolicy, RetryingObjectReader};
pub use store::{JobStore, SqliteJobStore};
pub use worker::{Job, JobStatus, QueueMessage, Worker};
