//! Error types for the redaction pipeline.
//!
//! Fatal pipeline failures are split by the stage that raises them: a
//! [`RedactorError::Parse`] ends a job before anything is produced and a
//! [`RedactorError::Redaction`] means the output could not be encoded.
//! Per-span problems are never errors; they are recorded as flags on the
//! span and in the log.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type alias for redaction operations.
pub type RedactorResult<T> = Result<T, RedactorError>;

/// Boxed source error carried by backend-facing variants.
pub type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Error type for all pipeline operations.
#[derive(Debug)]
pub enum RedactorError {
    /// Error occurred while reading or writing files
    Io { path: PathBuf, source: io::Error },

    /// Input is not a readable PDF (corrupt, encrypted, unreadable page)
    Parse {
        message: String,
        page: Option<usize>,
        source: Option<BoxedSource>,
    },

    /// The redacted or overlay document could not be produced
    Redaction {
        message: String,
        page: Option<usize>,
        source: Option<BoxedSource>,
    },

    /// Pattern matching or regex compilation error
    PatternError { pattern: String, reason: String },

    /// Policy file could not be loaded or holds an unknown value
    Policy { origin: String, reason: String },

    /// Invalid configuration or parameters
    InvalidInput { parameter: String, reason: String },

    /// Backend-specific error (MuPDF, lopdf, printpdf, ...)
    BackendError {
        backend: String,
        message: String,
        source: Option<BoxedSource>,
    },
}

impl RedactorError {
    /// Builds a parse error without a page reference.
    pub fn parse(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::Parse {
            message: message.into(),
            page: None,
            source,
        }
    }

    /// Builds a redaction (output encoding) error.
    pub fn redaction(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::Redaction {
            message: message.into(),
            page: None,
            source,
        }
    }

    /// Builds a backend error tagged with the backend name.
    pub fn backend(
        backend: impl Into<String>,
        message: impl Into<String>,
        source: Option<BoxedSource>,
    ) -> Self {
        Self::BackendError {
            backend: backend.into(),
            message: message.into(),
            source,
        }
    }

    /// Returns true for errors that end a job.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Parse { .. } | Self::Redaction { .. } | Self::Io { .. })
    }
}

impl fmt::Display for RedactorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "IO error for path '{}': {}", path.display(), source)
            }
            Self::Parse { message, page, .. } => {
                if let Some(p) = page {
                    write!(f, "Parse error on page {}: {}", p, message)
                } else {
                    write!(f, "Parse error: {}", message)
                }
            }
            Self::Redaction { message, page, .. } => {
                if let Some(p) = page {
                    write!(f, "Redaction error on page {}: {}", p, message)
                } else {
                    write!(f, "Redaction error: {}", message)
                }
            }
            Self::PatternError { pattern, reason } => {
                write!(f, "Pattern error for '{}': {}", pattern, reason)
            }
            Self::Policy { origin, reason } => {
                write!(f, "Policy error in {}: {}", origin, reason)
            }
            Self::InvalidInput { parameter, reason } => {
                write!(f, "Invalid input for '{}': {}", parameter, reason)
            }
            Self::BackendError {
                backend, message, ..
            } => {
                write!(f, "{} backend error: {}", backend, message)
            }
        }
    }
}

impl std::error::Error for RedactorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. }
            | Self::Redaction { source, .. }
            | Self::BackendError { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl From<io::Error> for RedactorError {
    fn from(err: io::Error) -> Self {
        Self::BackendError {
            backend: "std::io".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<regex::Error> for RedactorError {
    fn from(err: regex::Error) -> Self {
        Self::PatternError {
            pattern: "<unknown>".to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<lopdf::Error> for RedactorError {
    fn from(err: lopdf::Error) -> Self {
        Self::Redaction {
            message: err.to_string(),
            page: None,
            source: Some(Box::new(err)),
        }
    }
}

impl From<serde_json::Error> for RedactorError {
    fn from(err: serde_json::Error) -> Self {
        Self::BackendError {
            backend: "serde_json".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}
