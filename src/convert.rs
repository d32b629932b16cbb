//! Request-level conversion: validate → stage → convert → clean up.
//!
//! [`Converter`] is the one object the HTTP layer talks to. It owns the
//! immutable [`ServerConfig`] and the shared [`ConversionEngine`], and turns
//! an [`InboundRequest`] into a [`ConversionReply`] or a [`Doc2MdError`].
//!
//! ## Request lifecycle
//!
//! ```text
//! Received ─▶ Validating ─▶ Staged ─▶ Converting ─▶ Succeeded / Failed ─▶ Cleaned up
//! ```
//!
//! Validation is pure, so a rejected request never creates a file. Once a
//! file is staged, its guard guarantees removal on every exit path; the
//! normal path removes it explicitly before the reply is returned.

use crate::config::ServerConfig;
use crate::engine::ConversionEngine;
use crate::error::Doc2MdError;
use crate::pipeline::chain::{self, Strategy};
use crate::pipeline::stage::{self, StagedFile};
use crate::pipeline::validate::{ConversionRequest, InboundRequest};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Successful conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionReply {
    /// File upload or downloaded URL.
    File {
        markdown: String,
        /// Sanitized name of the document.
        filename: String,
        strategy: Strategy,
    },
    /// Text input.
    Text { markdown: String },
}

impl ConversionReply {
    pub fn markdown(&self) -> &str {
        match self {
            ConversionReply::File { markdown, .. } | ConversionReply::Text { markdown } => markdown,
        }
    }
}

/// Shared request processor: immutable config plus the engine handle.
///
/// Built once at startup and cloned into handlers behind an `Arc`.
///
/// ```rust,no_run
/// use edgequake_doc2md::{Converter, ServerConfig};
/// use edgequake_doc2md::engine::DoclingCli;
/// use std::sync::Arc;
///
/// let converter = Converter::new(
///     ServerConfig::default(),
///     Arc::new(DoclingCli::new("docling")),
/// );
/// ```
pub struct Converter {
    config: ServerConfig,
    engine: Arc<dyn ConversionEngine>,
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("config", &self.config)
            .field("engine", &self.engine.name())
            .finish()
    }
}

impl Converter {
    pub fn new(config: ServerConfig, engine: Arc<dyn ConversionEngine>) -> Self {
        Self { config, engine }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn engine(&self) -> &dyn ConversionEngine {
        self.engine.as_ref()
    }

    /// Handle one request end to end.
    ///
    /// Engine caches are released before and after, whatever the outcome.
    pub async fn process(&self, inbound: InboundRequest) -> Result<ConversionReply, Doc2MdError> {
        self.engine.release_caches();
        let _release = ReleaseOnDrop(self.engine.as_ref());

        debug!("Validating request");
        let outcome = match inbound.validate(self.config.max_text_chars) {
            Ok(request) => self.process_validated(request).await,
            Err(e) => Err(e),
        };
        outcome.inspect_err(log_failure)
    }

    /// Stage and convert an already validated request.
    pub async fn process_validated(
        &self,
        request: ConversionRequest,
    ) -> Result<ConversionReply, Doc2MdError> {
        let start = Instant::now();
        let kind = request.kind();

        let reply = match request {
            ConversionRequest::FileUpload(upload) => {
                info!(
                    "Converting upload '{}' ({} bytes)",
                    upload.original_name,
                    upload.bytes.len()
                );
                let staged = stage::stage_upload(&self.config.upload_dir, &upload)?;
                self.convert_document(staged, upload.filename).await?
            }
            ConversionRequest::UrlPayload { url } => {
                let (staged, filename) = stage::stage_download(
                    &self.config.upload_dir,
                    &url,
                    self.config.download_timeout_secs,
                    self.config.max_body_bytes,
                )
                .await?;
                self.convert_document(staged, filename).await?
            }
            ConversionRequest::TextPayload { content } => {
                info!("Converting text input ({} chars)", content.chars().count());
                let staged = stage::stage_text(&self.config.upload_dir, &content)?;
                self.convert_text(staged).await?
            }
        };

        info!(
            "Conversion complete: {} input, {}ms",
            kind,
            start.elapsed().as_millis()
        );
        Ok(reply)
    }

    async fn convert_document(
        &self,
        staged: StagedFile,
        filename: String,
    ) -> Result<ConversionReply, Doc2MdError> {
        debug!("Staged {} at {}", filename, staged.path().display());

        debug!("Converting {}", filename);
        let outcome = chain::run_chain(
            self.engine.as_ref(),
            staged.path(),
            &self.config.primary_options,
        )
        .await;

        cleanup(staged);

        match outcome {
            Ok(success) => {
                debug!("Succeeded via {} strategy", success.strategy);
                Ok(ConversionReply::File {
                    markdown: success.markdown,
                    filename,
                    strategy: success.strategy,
                })
            }
            Err(failure) => Err(Doc2MdError::ConversionFailed {
                filename,
                detail: failure.to_string(),
            }),
        }
    }

    async fn convert_text(&self, staged: StagedFile) -> Result<ConversionReply, Doc2MdError> {
        debug!("Staged text at {}", staged.path().display());

        let outcome = if self.config.text_fallback {
            chain::run_chain(
                self.engine.as_ref(),
                staged.path(),
                &self.config.primary_options,
            )
            .await
            .map(|success| success.markdown)
            .map_err(|failure| Doc2MdError::EngineFailed(failure.to_string()))
        } else {
            chain::convert_once(self.engine.as_ref(), staged.path()).await
        };

        cleanup(staged);

        outcome.map(|markdown| ConversionReply::Text { markdown })
    }
}

/// Client errors are expected traffic; everything else is a server fault.
fn log_failure(e: &Doc2MdError) {
    match e {
        _ if e.is_client_error() => debug!("Rejected request: {}", e),
        Doc2MdError::ConversionFailed { filename, .. } => {
            error!("Conversion of '{}' failed: {}", filename, e)
        }
        _ => error!("Request failed: {}", e),
    }
}

/// Remove a staged file on the normal path; log instead of failing.
fn cleanup(staged: StagedFile) {
    let path = staged.path().to_path_buf();
    if let Err(e) = staged.close() {
        warn!("Failed to remove staged file {}: {}", path.display(), e);
    }
    debug!("Cleaned up");
}

/// Calls [`ConversionEngine::release_caches`] when the request scope ends.
struct ReleaseOnDrop<'a>(&'a dyn ConversionEngine);

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        self.0.release_caches();
    }
}
