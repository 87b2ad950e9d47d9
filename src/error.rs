//! Error types for bili-archiver
//!
//! This module provides the error taxonomy for the library:
//! - [`Error`], the top-level error returned by public operations
//! - [`PartError`], the closed set of per-part failures the orchestrator retries
//! - [`CoverError`] and [`LedgerError`], failures that are logged but never fatal
//! - HTTP status code mapping and the JSON error envelope used by the API

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for bili-archiver operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for bili-archiver
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "MAX_RETRIES")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Completion ledger persistence failed
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// A single part failed to download
    #[error("part error: {0}")]
    Part(#[from] PartError),

    /// Cover art could not be fetched or embedded
    #[error("cover error: {0}")]
    Cover(#[from] CoverError),

    /// Task or other resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Input does not contain a usable collection id
    #[error("invalid collection id: {0}")]
    InvalidCollectionId(String),

    /// Request parameters failed validation
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A task with the same id is already streaming
    #[error("task {0} is already running")]
    TaskAlreadyRunning(String),

    /// External tool execution failed (yt-dlp)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Per-part failures
///
/// Every variant is caught at the orchestrator boundary, converted into an
/// `error` event and fed into the retry budget.
#[derive(Debug, Error)]
pub enum PartError {
    /// Fetching or transcoding failed
    #[error("fetch of part {part} failed: {reason}")]
    TransientFetch {
        /// 1-based part index
        part: u32,
        /// The reason the fetch failed
        reason: String,
    },

    /// The transcoded file never became readable within the wait budget
    #[error("output file {path} did not appear within {waited_secs}s")]
    OutputMissing {
        /// The path the orchestrator was waiting for
        path: PathBuf,
        /// How long the orchestrator waited
        waited_secs: u64,
    },

    /// The finished file could not be inspected or recorded
    #[error("finished file {path} is unusable: {reason}")]
    Unrecordable {
        /// The finished file
        path: PathBuf,
        /// The reason
        reason: String,
    },
}

/// Cover art failures (never fail a part)
#[derive(Debug, Error)]
pub enum CoverError {
    /// No cover URL could be found for the part
    #[error("no cover URL available")]
    NotAvailable,

    /// Downloading the cover failed
    #[error("cover download failed: {0}")]
    Download(String),

    /// Decoding or re-encoding the image failed
    #[error("cover image processing failed: {0}")]
    Image(String),

    /// Writing the tag into the audio file failed
    #[error("embedding into {path} failed: {reason}")]
    Embed {
        /// The audio file
        path: PathBuf,
        /// The reason embedding failed
        reason: String,
    },
}

/// Ledger persistence failures (logged, in-memory state continues)
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Reading the ledger file failed
    #[error("failed to load ledger {path}: {reason}")]
    Load {
        /// Ledger file path
        path: PathBuf,
        /// The reason loading failed
        reason: String,
    },

    /// Writing the ledger file failed
    #[error("failed to persist ledger {path}: {reason}")]
    Persist {
        /// Ledger file path
        path: PathBuf,
        /// The reason persisting failed
        reason: String,
    },
}

/// API error response format
///
/// ```json
/// {
///   "error": {
///     "code": "not_found",
///     "message": "not found: task BV1xx_book",
///     "details": { "task_id": "BV1xx_book" }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "validation_error")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::Config { .. } => 400,
            Error::InvalidCollectionId(_) => 400,
            Error::InvalidRequest(_) => 400,

            Error::NotFound(_) => 404,

            Error::TaskAlreadyRunning(_) => 409,

            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::Ledger(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,

            Error::Network(_) => 502,
            Error::Part(_) => 502,
            Error::Cover(_) => 502,

            Error::ExternalTool(_) => 503,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Ledger(_) => "ledger_error",
            Error::Part(e) => match e {
                PartError::TransientFetch { .. } => "fetch_failed",
                PartError::OutputMissing { .. } => "output_missing",
                PartError::Unrecordable { .. } => "unrecordable_output",
            },
            Error::Cover(_) => "cover_error",
            Error::NotFound(_) => "not_found",
            Error::InvalidCollectionId(_) => "invalid_collection_id",
            Error::InvalidRequest(_) => "validation_error",
            Error::TaskAlreadyRunning(_) => "task_already_running",
            Error::ExternalTool(_) => "external_tool_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::TaskAlreadyRunning(task_id) => Some(serde_json::json!({
                "task_id": task_id,
            })),
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({
                "key": key,
            })),
            Error::Part(PartError::OutputMissing { path, waited_secs }) => {
                Some(serde_json::json!({
                    "path": path,
                    "waited_secs": waited_secs,
                }))
            }
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
