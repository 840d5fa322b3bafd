//! # Function Errors

use std::path::PathBuf;

use thiserror::Error;

use super::response::{HttpError, HttpErrorKind};

/// Result type for function lifecycle operations
pub type FunctionResult<T> = Result<T, FunctionError>;

/// Function lifecycle errors
#[derive(Debug, Error)]
pub enum FunctionError {
    /// A descriptor file is malformed or violates an invariant
    #[error("Invalid function description: {0}")]
    Validation(String),

    /// Some requested functions were not discovered
    #[error("The following functions were not found: {}.", .0.join(", "))]
    NotFound(Vec<String>),

    /// A remote platform call failed for a reason other than absence
    #[error("Remote platform error: {0}")]
    Remote(String),

    /// The generated module failed to build
    #[error("Compilation error: {0}")]
    Compile(String),

    /// Loading or executing a compiled module failed
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FunctionError {
    /// Read failure bound to the path that was being read
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    /// Render for a dev server client, keeping the error text
    pub fn http_error(&self) -> HttpError {
        let kind = match self {
            FunctionError::NotFound(_) => HttpErrorKind::NotFound,
            FunctionError::Validation(_) => HttpErrorKind::InputRejected,
            _ => HttpErrorKind::Internal,
        };
        HttpError::new(kind).with_message(self.to_string())
    }
}
