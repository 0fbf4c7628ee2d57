use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single backend call.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to render PDF: {0}")]
    Pdf(String),

    #[error("Failed to process image: {0}")]
    Image(String),

    #[error("I/O error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Document rendered to zero pages")]
    NoPages,

    #[error("Render task failed: {0}")]
    Task(String),
}

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Unsupported processing mode '{0}'")]
    UnsupportedMode(String),

    #[error("Render failed: {0}")]
    Render(#[from] RenderError),

    #[error("Backend '{backend}' failed: {source}")]
    Backend {
        backend: String,
        #[source]
        source: BackendError,
    },

    #[error("Both backends failed; '{primary}': {source}; '{secondary}': {secondary_error}")]
    BothBackendsFailed {
        primary: String,
        #[source]
        source: BackendError,
        secondary: String,
        secondary_error: BackendError,
    },
}
