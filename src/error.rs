//! Typed error hierarchy for rangedl
//!
//! Every error carries enough context to tell which stage of a job failed:
//! input validation, the size probe, or one particular segment.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the download engine
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Invalid input from the caller, rejected before any network I/O
    #[error("Invalid input for '{field}': {message}")]
    InvalidInput {
        field: &'static str,
        message: String,
    },

    /// The metadata (HEAD) request failed; fatal to the whole job
    #[error("Probe failed: {message}")]
    ProbeFailed {
        kind: NetworkErrorKind,
        message: String,
    },

    /// One segment could not be fetched or written
    #[error("Segment {index} failed: {message}")]
    SegmentFailed {
        index: usize,
        kind: NetworkErrorKind,
        message: String,
    },

    /// A worker exited because the job was stopped
    #[error("Download cancelled")]
    Cancelled,

    /// Network error outside the probe/segment context
    #[error("Network error: {message}")]
    Network {
        kind: NetworkErrorKind,
        message: String,
    },

    /// Storage/filesystem errors
    #[error("Storage error at {path:?}: {message}")]
    Storage {
        kind: StorageErrorKind,
        path: PathBuf,
        message: String,
    },

    /// Internal error (bug)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Network error subtypes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    /// Connection refused or could not be established
    ConnectionRefused,
    /// Connect or read timeout elapsed
    Timeout,
    /// Server returned error status
    HttpStatus(u16),
    /// Server rejected the requested byte range (HTTP 416)
    RangeNotSatisfiable,
    /// Server response did not match what was requested
    InvalidResponse,
    /// Too many redirects
    TooManyRedirects,
    /// Writing received bytes to the output file failed
    Write,
    /// Other network error
    Other,
}

/// Storage error subtypes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// File/directory not found
    NotFound,
    /// Permission denied
    PermissionDenied,
    /// Path is outside allowed directory (security)
    PathTraversal,
    /// File already exists
    AlreadyExists,
    /// I/O error
    Io,
}

impl EngineError {
    /// Create a network error
    pub fn network(kind: NetworkErrorKind, message: impl Into<String>) -> Self {
        Self::Network {
            kind,
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(kind: StorageErrorKind, path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Storage {
            kind,
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            message: message.into(),
        }
    }

    /// Create a probe failure
    pub fn probe_failed(kind: NetworkErrorKind, message: impl Into<String>) -> Self {
        Self::ProbeFailed {
            kind,
            message: message.into(),
        }
    }

    /// Create a segment failure
    pub fn segment_failed(index: usize, kind: NetworkErrorKind, message: impl Into<String>) -> Self {
        Self::SegmentFailed {
            index,
            kind,
            message: message.into(),
        }
    }

    /// Re-tag any error as a failure of segment `index`.
    ///
    /// Storage errors become [`NetworkErrorKind::Write`]; errors that are
    /// already segment failures or cancellations pass through unchanged.
    pub fn for_segment(self, index: usize) -> Self {
        match self {
            Self::SegmentFailed { .. } | Self::Cancelled => self,
            Self::Network { kind, message } | Self::ProbeFailed { kind, message } => {
                Self::segment_failed(index, kind, message)
            }
            Self::Storage { message, .. } => {
                Self::segment_failed(index, NetworkErrorKind::Write, message)
            }
            other => Self::segment_failed(index, NetworkErrorKind::Other, other.to_string()),
        }
    }

    /// Index of the failed segment, if this is a segment failure
    pub fn segment_index(&self) -> Option<usize> {
        match self {
            Self::SegmentFailed { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        let kind = match err.kind() {
            ErrorKind::NotFound => StorageErrorKind::NotFound,
            ErrorKind::PermissionDenied => StorageErrorKind::PermissionDenied,
            ErrorKind::AlreadyExists => StorageErrorKind::AlreadyExists,
            _ => StorageErrorKind::Io,
        };
        Self::Storage {
            kind,
            path: PathBuf::new(),
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            NetworkErrorKind::Timeout
        } else if err.is_connect() {
            NetworkErrorKind::ConnectionRefused
        } else if err.is_redirect() {
            NetworkErrorKind::TooManyRedirects
        } else if let Some(status) = err.status() {
            NetworkErrorKind::HttpStatus(status.as_u16())
        } else {
            NetworkErrorKind::Other
        };

        Self::Network {
            kind,
            message: err.to_string(),
        }
    }
}

impl From<url::ParseError> for EngineError {
    fn from(err: url::ParseError) -> Self {
        Self::invalid_input("url", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_segment_retags_network_errors() {
        let err = EngineError::network(NetworkErrorKind::Timeout, "read timed out").for_segment(3);
        match err {
            EngineError::SegmentFailed { index, kind, .. } => {
                assert_eq!(index, 3);
                assert_eq!(kind, NetworkErrorKind::Timeout);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_for_segment_keeps_cancelled() {
        assert!(matches!(
            EngineError::Cancelled.for_segment(1),
            EngineError::Cancelled
        ));
    }

    #[test]
    fn test_storage_errors_become_write_failures() {
        let err = EngineError::storage(StorageErrorKind::Io, "/tmp/x", "disk full").for_segment(0);
        assert_eq!(err.segment_index(), Some(0));
        assert!(matches!(
            err,
            EngineError::SegmentFailed {
                kind: NetworkErrorKind::Write,
                ..
            }
        ));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let err: EngineError = io.into();
        assert!(matches!(
            err,
            EngineError::Storage {
                kind: StorageErrorKind::PermissionDenied,
                ..
            }
        ));
    }
}
