//! Error types for depcache
//!
//! All modules use `DepcacheResult<T>` as their return type. The error is
//! `Clone` because a single in-flight resolution hands its outcome to every
//! caller waiting on the same fingerprint.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for depcache operations
pub type DepcacheResult<T> = Result<T, DepcacheError>;

/// All errors that can occur in depcache
#[derive(Error, Debug, Clone)]
pub enum DepcacheError {
    // Storage errors
    #[error("Cache directory unusable at {path}: {reason}")]
    Storage { path: PathBuf, reason: String },

    // Resolution errors
    #[error("Requirements for {module} are unsatisfiable: {detail}")]
    Unsatisfiable { module: String, detail: String },

    #[error("Solver unavailable ({solver}): {reason}")]
    SolverUnavailable { solver: String, reason: String },

    #[error("Invalid requirement specifier '{specifier}': {reason}")]
    InvalidSpecifier { specifier: String, reason: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(String),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("{0}")]
    User(String),

    #[error("Bulk resolution task failed: {0}")]
    BulkTask(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for DepcacheError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

impl DepcacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source: Arc::new(source),
        }
    }

    /// Create a storage error for a cache directory
    pub fn storage(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Storage {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a solver unavailable error
    pub fn solver_unavailable(solver: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SolverUnavailable {
            solver: solver.into(),
            reason: reason.into(),
        }
    }

    /// Check if error is retryable
    ///
    /// Only infrastructure failures of the solver are worth retrying. Bad
    /// input and unsatisfiable constraints fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SolverUnavailable { .. })
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Storage { .. } => {
                Some("Check directory permissions or pass a different --cache-dir")
            }
            Self::Unsatisfiable { .. } => {
                Some("Relax the conflicting version constraints and try again")
            }
            Self::SolverUnavailable { .. } => {
                Some("Install pip-tools (pip install pip-tools) or set resolver.command")
            }
            Self::InvalidSpecifier { .. } => Some("Use the form: name[extras]<op>version"),
            _ => None,
        }
    }
}
