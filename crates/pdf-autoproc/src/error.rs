use crate::ledger::LedgerError;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while processing an archive.
///
/// Only `Configuration` is fatal, and only at startup. Everything else is
/// caught at the archive boundary and reported in a `ProcessingResult`.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Retryable I/O failure such as a network share hiccup or a locked file
    #[error("I/O error while {operation} {}: {source}", .path.display())]
    TransientIo {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A document or archive that cannot be decoded or stamped
    #[error("Malformed document {}: {reason}", .path.display())]
    MalformedDocument { path: PathBuf, reason: String },
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// The processed record could not be made durable
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("Printing {} failed: {message}", .path.display())]
    Print {
        path: PathBuf,
        message: String,
        retryable: bool,
    },
    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
    /// The background worker owning the pipeline has exited
    #[error("Pipeline worker stopped")]
    WorkerStopped,
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn io(operation: &'static str, path: impl AsRef<Path>, source: std::io::Error) -> Self {
        PipelineError::TransientIo {
            operation,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn malformed(path: impl AsRef<Path>, reason: impl ToString) -> Self {
        PipelineError::MalformedDocument {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// Whether retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::TransientIo { .. } => true,
            PipelineError::Print { retryable, .. } => *retryable,
            _ => false,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::TransientIo { .. } => FailureKind::TransientIo,
            PipelineError::MalformedDocument { .. } => FailureKind::MalformedDocument,
            PipelineError::Configuration(_) => FailureKind::Configuration,
            PipelineError::Ledger(_) => FailureKind::Ledger,
            PipelineError::Print { .. } => FailureKind::Print,
            PipelineError::TaskJoin(_) | PipelineError::WorkerStopped => FailureKind::Internal,
        }
    }
}

/// Failure category recorded in a `ProcessingResult`
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    TransientIo,
    MalformedDocument,
    Configuration,
    Ledger,
    Print,
    Internal,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FailureKind::TransientIo => "transient I/O",
            FailureKind::MalformedDocument => "malformed document",
            FailureKind::Configuration => "configuration",
            FailureKind::Ledger => "ledger",
            FailureKind::Print => "print",
            FailureKind::Internal => "internal",
        })
    }
}
