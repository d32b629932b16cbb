//! Error types for the edgequake-doc2md library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Doc2MdError`]: fatal for the request. Validation rejected the
//!   input, staging failed, or every conversion strategy was exhausted.
//!   Returned as `Err(Doc2MdError)` from [`crate::convert::Converter::process`]
//!   and turned into an HTTP response by the server layer.
//!
//! * [`StrategyError`]: non-fatal. One strategy of the fallback chain
//!   failed, but the next one may still succeed. Collected by
//!   [`crate::pipeline::chain`] and only surfaced (as the last one) when the
//!   whole chain fails.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All request-level errors returned by the edgequake-doc2md library.
///
/// The variant decides the HTTP status: see [`Doc2MdError::is_client_error`].
#[derive(Debug, Error)]
pub enum Doc2MdError {
    // ── Validation errors (400) ───────────────────────────────────────────
    /// A file part was sent but its filename is empty.
    #[error("No file selected")]
    EmptyFilename,

    /// The upload's extension is not in the allowed set.
    #[error("File type not supported. Allowed types: {allowed}")]
    UnsupportedFileType { filename: String, allowed: String },

    /// Text input is empty after trimming.
    #[error("Input text cannot be empty")]
    EmptyInput,

    /// Text input exceeds the configured character limit.
    #[error("Input text is too long (max {limit} characters)", limit = group_thousands(.max))]
    InputTooLong { len: usize, max: usize },

    /// The `url` field is not an http(s) URL.
    #[error("Invalid URL format")]
    InvalidUrl { url: String },

    /// A JSON / form field failed validation; carries per-field detail.
    #[error("Validation error: {}", summarize(.details))]
    FieldValidation { details: Vec<FieldError> },

    /// Neither a file, nor text, nor a URL was supplied.
    #[error("No file or text provided.")]
    NoInput,

    /// The request body could not be read (broken multipart stream etc.).
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    // ── Conversion errors (500) ───────────────────────────────────────────
    /// Every strategy of the fallback chain failed for this file.
    #[error("Failed to convert file: {detail}")]
    ConversionFailed { filename: String, detail: String },

    /// The single engine call used for text input failed.
    #[error("{0}")]
    EngineFailed(String),

    // ── Staging / download errors (500) ───────────────────────────────────
    /// Could not write the staged temp file.
    #[error("Failed to stage input at '{path}': {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// URL input could not be downloaded.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// URL download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Anything that escaped the handler, e.g. a panic. Shown raw.
    #[error("{0}")]
    Internal(String),
}

impl Doc2MdError {
    /// `true` for errors caused by the request itself (HTTP 400).
    ///
    /// These are never logged as server faults.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Doc2MdError::EmptyFilename
                | Doc2MdError::UnsupportedFileType { .. }
                | Doc2MdError::EmptyInput
                | Doc2MdError::InputTooLong { .. }
                | Doc2MdError::InvalidUrl { .. }
                | Doc2MdError::FieldValidation { .. }
                | Doc2MdError::NoInput
                | Doc2MdError::MalformedRequest(_)
        )
    }

    /// Per-field detail for validation failures of the `inputText` / `url`
    /// fields, empty for everything else.
    pub fn field_errors(&self) -> Vec<FieldError> {
        match self {
            Doc2MdError::FieldValidation { details } => details.clone(),
            Doc2MdError::EmptyInput | Doc2MdError::InputTooLong { .. } => vec![FieldError {
                field: "inputText".to_string(),
                message: self.to_string(),
            }],
            Doc2MdError::InvalidUrl { .. } => vec![FieldError {
                field: "url".to_string(),
                message: self.to_string(),
            }],
            _ => Vec::new(),
        }
    }

    /// Shorthand for a single-field validation failure.
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Doc2MdError::FieldValidation {
            details: vec![FieldError {
                field: field.into(),
                message: message.into(),
            }],
        }
    }
}

/// One failed field in a [`Doc2MdError::FieldValidation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

fn summarize(details: &[FieldError]) -> String {
    details
        .iter()
        .map(|d| format!("{}: {}", d.field, d.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// `100000` → `"100,000"`.
fn group_thousands(n: &usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// A non-fatal failure of one strategy in the fallback chain.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum StrategyError {
    /// The engine call for this strategy failed.
    #[error("{strategy} conversion failed: {detail}")]
    EngineFailed { strategy: String, detail: String },

    /// Raw-text fallback only reads `.txt` / `.md`.
    #[error("Text extraction not supported for this file type")]
    UnsupportedRawText { extension: Option<String> },

    /// Raw-text fallback could not read the staged file as UTF-8.
    #[error("{detail}")]
    RawReadFailed { detail: String },
}
