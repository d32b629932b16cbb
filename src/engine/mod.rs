//! The conversion engine seam.
//!
//! Everything that actually understands document formats lives behind
//! [`ConversionEngine`]. The server only stages a file, hands its path to the
//! engine, and gets Markdown (or an [`EngineError`]) back. The shipped
//! backend is [`DoclingCli`], which drives the `docling` command-line tool;
//! tests plug in their own implementations.

mod docling;

pub use docling::DoclingCli;

use crate::config::PipelineOptions;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// A document-to-Markdown converter.
///
/// Implementations must be safe to share across concurrent requests: the
/// server holds one instance behind an `Arc` for the whole process lifetime
/// and never reconfigures it.
#[async_trait]
pub trait ConversionEngine: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Convert the file at `path` to Markdown.
    ///
    /// `options == None` means "engine defaults, no custom configuration".
    async fn convert(
        &self,
        path: &Path,
        options: Option<&PipelineOptions>,
    ) -> Result<String, EngineError>;

    /// Release cached accelerator / model memory.
    ///
    /// Called before and after every request. Best-effort; the default does
    /// nothing, which is right for engines that run out of process.
    fn release_caches(&self) {}
}

/// Failure of a single engine invocation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine executable could not be started.
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The engine ran but reported failure.
    #[error("Engine exited with {status}: {stderr}")]
    Exited { status: String, stderr: String },

    /// The engine succeeded but produced no Markdown file.
    #[error("Engine produced no Markdown output in '{dir}'")]
    MissingOutput { dir: PathBuf },

    /// The engine output is not valid UTF-8.
    #[error("Engine output is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// The call exceeded the configured timeout.
    #[error("Engine call timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Filesystem trouble around the call (scratch dir, reading output).
    #[error("Engine I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else, reported by the engine as text.
    #[error("{0}")]
    Other(String),
}
