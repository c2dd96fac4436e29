//! Error types for the analyzers.
//!
//! Every analyzer run ends either with a JSON result or with exactly one
//! `AnalyzerError`. The error's `Display` text is what the orchestrator sees
//! in the `errorMessage` field.

use std::path::PathBuf;

use crate::http::ServiceError;

/// Message emitted when the artifact's TLP exceeds the configured ceiling.
pub const TLP_ERROR_MESSAGE: &str =
    "Error with TLP value ; see max_tlp in config or tlp value in input data";

/// Terminal error of an analyzer run.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    /// A required artifact field was absent or null
    #[error("{0}")]
    MissingField(String),

    /// The artifact is classified above what the analyzer may process
    #[error("{}", TLP_ERROR_MESSAGE)]
    TlpPolicy { tlp: i64, max_tlp: i64 },

    /// Unknown service, unsupported data type or a field of the wrong shape
    #[error("{0}")]
    InvalidParameter(String),

    /// Failure reported at the HTTP boundary
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Adapter-specific terminal condition
    #[error("{0}")]
    Analysis(String),

    /// I/O error (file read, permissions, etc.)
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using AnalyzerError
pub type AnalyzerResult<T> = Result<T, AnalyzerError>;

impl AnalyzerError {
    /// Create an I/O error with path context
    pub fn io(source: std::io::Error, path: impl Into<Option<PathBuf>>) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn missing(message: impl Into<String>) -> Self {
        Self::MissingField(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }

    pub fn analysis(message: impl Into<String>) -> Self {
        Self::Analysis(message.into())
    }
}

/// Convert from raw I/O errors (without path context)
impl From<std::io::Error> for AnalyzerError {
    fn from(source: std::io::Error) -> Self {
        Self::Io { path: None, source }
    }
}
