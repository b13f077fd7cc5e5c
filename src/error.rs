//! Error handling for the report merge pipeline
//!
//! This module provides:
//! - A typed error for every failure the merge path can surface
//! - Stable error codes and categories for logging
//! - Process exit codes for the command-line front end

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for merge operations
pub type MergeResult<T> = Result<T, MergeError>;

// =============================================================================
// ERROR CODES
// =============================================================================

/// Error codes for merge failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Reading or writing a file failed
    IoError,
    /// An input could not be parsed as XML
    XmlError,
    /// An input is not a test-run report
    NotAReport,
    /// An input is a report but violates the schema
    MalformedReport,
    /// The output location cannot hold a report
    InvalidOutput,
    /// The command line or configuration is unusable
    InvalidArguments,
    /// A conflict could not be resolved
    UnresolvedConflict,
    /// A summary page failed to render
    RenderError,
    /// The merge was cancelled
    Cancelled,
    /// The merge worker itself failed
    Internal,
}

impl ErrorCode {
    /// Get the error category for logs
    pub fn category(&self) -> &'static str {
        match self {
            ErrorCode::IoError => "io_error",
            ErrorCode::XmlError | ErrorCode::NotAReport | ErrorCode::MalformedReport => {
                "parse_error"
            }
            ErrorCode::InvalidOutput | ErrorCode::InvalidArguments => "client_error",
            ErrorCode::UnresolvedConflict => "conflict",
            ErrorCode::RenderError => "render_error",
            ErrorCode::Cancelled => "cancelled",
            ErrorCode::Internal => "internal_error",
        }
    }

    /// Exit status used by the command-line front end
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorCode::Cancelled => 130,
            ErrorCode::UnresolvedConflict => 3,
            ErrorCode::InvalidArguments | ErrorCode::InvalidOutput => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// =============================================================================
// MERGE ERROR
// =============================================================================

/// Errors raised while merging reports
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("XML error in {path:?}: {source}")]
    Xml {
        path: PathBuf,
        #[source]
        source: quick_xml::Error,
    },

    #[error("{path:?} is not a test-run report: {reason}")]
    NotAReport { path: PathBuf, reason: String },

    #[error("malformed report {path:?}: {reason}")]
    MalformedReport { path: PathBuf, reason: String },

    #[error("{path:?} exists and is not a report directory")]
    NotAReportDir { path: PathBuf },

    #[error("output {path:?} already exists (use --force to overwrite)")]
    OutputExists { path: PathBuf },

    #[error("at least two input reports are required, got {count}")]
    NotEnoughInputs { count: usize },

    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("test {url} appears in {} inputs: {}", .inputs.len(), .inputs.join(", "))]
    UnresolvedConflict { url: String, inputs: Vec<String> },

    #[error("conflict resolver failed for {url}: {message}")]
    Resolver { url: String, message: String },

    #[error("failed to render {template}: {source}")]
    Render {
        template: String,
        #[source]
        source: tera::Error,
    },

    #[error("merge cancelled")]
    Cancelled,

    #[error("merge worker failed: {message}")]
    Worker { message: String },
}

impl MergeError {
    /// Stable code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            MergeError::Io { .. } => ErrorCode::IoError,
            MergeError::Xml { .. } => ErrorCode::XmlError,
            MergeError::NotAReport { .. } => ErrorCode::NotAReport,
            MergeError::MalformedReport { .. } => ErrorCode::MalformedReport,
            MergeError::NotAReportDir { .. } | MergeError::OutputExists { .. } => {
                ErrorCode::InvalidOutput
            }
            MergeError::NotEnoughInputs { .. } | MergeError::InvalidConfig { .. } => {
                ErrorCode::InvalidArguments
            }
            MergeError::UnresolvedConflict { .. } | MergeError::Resolver { .. } => {
                ErrorCode::UnresolvedConflict
            }
            MergeError::Render { .. } => ErrorCode::RenderError,
            MergeError::Cancelled => ErrorCode::Cancelled,
            MergeError::Worker { .. } => ErrorCode::Internal,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MergeError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn xml(path: impl Into<PathBuf>, source: impl Into<quick_xml::Error>) -> Self {
        MergeError::Xml {
            path: path.into(),
            source: source.into(),
        }
    }

    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        MergeError::MalformedReport {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        MergeError::InvalidConfig {
            message: message.into(),
        }
    }

    /// Log this error with its code and category
    pub fn track(&self) {
        let code = self.code();
        tracing::debug!(
            error_code = %code,
            category = code.category(),
            error = %self,
            "error recorded"
        );
    }
}

/// Exit status for an error that reached the binary boundary
pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<MergeError>())
        .map(|e| e.code().exit_code())
        .unwrap_or(1)
}
