//! Error types shared by the scanning pipeline.
//!
//! [`ScanError`] is what every fallible pipeline operation returns. The error
//! handling policy classifies it (see [`crate::resilience::policy`]), so the
//! variants mirror the handling categories rather than the call sites.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while scanning crash logs
#[derive(Error, Debug)]
pub enum ScanError {
    /// Cooperative cancellation. Not a failure; it unwinds the batch.
    #[error("Operation cancelled{}", .operation.as_deref().map(|op| format!(": {op}")).unwrap_or_default())]
    Cancelled { operation: Option<String> },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Circuit breaker is open")]
    CircuitOpen,

    #[error("Resource manager has been disposed")]
    Disposed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ScanError {
    /// Cancellation without an operation name
    pub fn cancelled() -> Self {
        Self::Cancelled { operation: None }
    }

    /// Cancellation attributed to a named operation
    pub fn cancelled_during(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: Some(operation.into()),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Missing file or access denied: a problem with one file, not with the system
    pub fn is_inaccessible(&self) -> bool {
        let io_err = match self {
            Self::Io(e) => Some(e),
            Self::Other(e) => e.downcast_ref::<io::Error>(),
            _ => None,
        };
        io_err.is_some_and(|e| {
            matches!(
                e.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
            )
        })
    }

    /// True for errors that must abort a whole batch rather than a single file
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Cancelled { .. } | Self::OutOfMemory(_) => true,
            Self::Io(e) => e.kind() == io::ErrorKind::OutOfMemory,
            _ => false,
        }
    }
}

pub type ScanResult<T> = std::result::Result<T, ScanError>;
