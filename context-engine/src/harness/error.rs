//! Harness error types
//!
//! Only conditions the caller cannot degrade around become errors here.
//! Missing optional artifacts, malformed registries, and unreadable files are
//! handled where they occur and never reach this enum.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Errors that can occur during harness operations
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Test registry contains invalid JSON or entries that are not test cases
    #[error("Invalid test registry at {path}: {message}")]
    InvalidRegistry { path: PathBuf, message: String },

    /// The project tree could not be enumerated at all
    #[error("Cannot walk project root {root}: {source}")]
    Traversal {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Appending a cycle record to the metrics log failed
    #[error("Failed to append to metrics log {path}: {source}")]
    MetricsWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A metrics log line is not a valid entry
    #[error("Corrupt metrics log {path} at line {line}: {message}")]
    MetricsCorrupt {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// A cycle outcome cannot be stored as a valid log entry
    #[error("Invalid cycle outcome: {message}")]
    InvalidOutcome { message: String },

    /// Git operation failed
    #[error("Git operation failed: {operation} - {message}")]
    GitError { operation: String, message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HarnessError {
    /// Create an invalid registry error
    pub fn invalid_registry(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::InvalidRegistry {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a traversal error for an unreadable project root
    pub fn traversal(root: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Traversal {
            root: root.into(),
            source,
        }
    }

    /// Create a metrics write error
    pub fn metrics_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::MetricsWrite {
            path: path.into(),
            source,
        }
    }

    /// Create a corrupt metrics log error
    pub fn metrics_corrupt(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Self::MetricsCorrupt {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    pub fn invalid_outcome(message: impl Into<String>) -> Self {
        Self::InvalidOutcome {
            message: message.into(),
        }
    }

    /// Create a git error
    pub fn git(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::GitError {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Get recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Self::InvalidRegistry { .. } => Some(
                "The feature list is not valid JSON or its entries are not test cases. \
                 Restore it from git: `git checkout -- feature_list.json`",
            ),
            Self::Traversal { source, .. } => match source.kind() {
                std::io::ErrorKind::PermissionDenied => {
                    Some("Permission denied on the project root. Check: ls -ld <root>")
                }
                std::io::ErrorKind::NotFound => {
                    Some("Project root does not exist. Pass the correct --root.")
                }
                _ => Some("The project root cannot be listed. Check the path and disk health."),
            },
            Self::MetricsWrite { .. } => Some(
                "The metrics log is not writable. Check disk space and permissions on \
                 harness_metrics.jsonl; the cycle outcome was not recorded.",
            ),
            Self::MetricsCorrupt { .. } => Some(
                "A metrics line is not valid JSON. Fix or remove the reported line; \
                 entries are independent so the rest of the log stays usable.",
            ),
            Self::InvalidOutcome { .. } => Some(
                "Nothing was written. Pass a finite duration in seconds and record the cycle again.",
            ),
            Self::GitError { message, .. } => {
                if message.to_lowercase().contains("not a git repository") {
                    Some("Initialize git repository: git init")
                } else {
                    Some("Check git status and repository state: git status")
                }
            }
            Self::ConfigError { .. } => Some(
                "Check harness.conf and HARNESS_* environment variables for the reported key.",
            ),
            Self::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => {
                    Some("File or directory not found. Check the path exists.")
                }
                std::io::ErrorKind::PermissionDenied => {
                    Some("Permission denied. Check file permissions: ls -la <path>")
                }
                _ => Some("IO error occurred. Check disk space and file permissions."),
            },
            Self::Json(_) => None,
        }
    }
}
