//! Configuration types for the conversion server.
//!
//! All request-handling behaviour is controlled through [`ServerConfig`],
//! built via its [`ServerConfigBuilder`]. The config is constructed once at
//! startup and shared read-only by every request through
//! [`crate::convert::Converter`]; nothing mutates it afterwards.

use crate::error::Doc2MdError;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Smallest accepted request-body cap. Anything lower rejects ordinary uploads.
const MIN_BODY_BYTES: usize = 1024 * 1024;

/// Configuration for the conversion server.
///
/// Built via [`ServerConfig::builder()`] or using [`ServerConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_doc2md::ServerConfig;
///
/// let config = ServerConfig::builder()
///     .port(8080)
///     .max_text_chars(20_000)
///     .build()
///     .unwrap();
/// assert_eq!(config.socket_addr().port(), 8080);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind. Default: 127.0.0.1.
    pub host: IpAddr,

    /// TCP port. Default: 5001.
    pub port: u16,

    /// Request body cap in bytes, enforced by the framework. Default: 50 MiB.
    pub max_body_bytes: usize,

    /// Maximum characters accepted for text input. Default: 100,000.
    pub max_text_chars: usize,

    /// Directory where staged files are created. Default: the OS temp dir.
    pub upload_dir: PathBuf,

    /// Options for the primary strategy. Default: [`PipelineOptions::minimal`].
    ///
    /// OCR and table-structure models are the engine's most memory-hungry
    /// stages and the usual source of model/tensor failures, so the primary
    /// attempt runs without them. The basic fallback uses engine defaults.
    pub primary_options: PipelineOptions,

    /// Run text input through the full fallback chain. Default: false.
    ///
    /// When off, text input gets exactly one engine call with default
    /// options and any failure is reported directly.
    pub text_fallback: bool,

    /// Thread count handed to the engine's numeric libraries. Default: 1.
    pub engine_threads: usize,

    /// Per-engine-call timeout in seconds. Default: none (wait indefinitely).
    pub engine_timeout_secs: Option<u64>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 5001,
            max_body_bytes: 50 * 1024 * 1024,
            max_text_chars: 100_000,
            upload_dir: std::env::temp_dir(),
            primary_options: PipelineOptions::minimal(),
            text_fallback: false,
            engine_threads: 1,
            engine_timeout_secs: None,
            download_timeout_secs: 120,
        }
    }
}

impl ServerConfig {
    /// Create a new builder for `ServerConfig`.
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder {
            config: Self::default(),
        }
    }

    /// The address the listener binds to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    pub fn host(mut self, host: IpAddr) -> Self {
        self.config.host = host;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn max_body_bytes(mut self, bytes: usize) -> Self {
        self.config.max_body_bytes = bytes;
        self
    }

    pub fn max_text_chars(mut self, n: usize) -> Self {
        self.config.max_text_chars = n;
        self
    }

    pub fn upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.upload_dir = dir.into();
        self
    }

    pub fn primary_options(mut self, options: PipelineOptions) -> Self {
        self.config.primary_options = options;
        self
    }

    pub fn text_fallback(mut self, v: bool) -> Self {
        self.config.text_fallback = v;
        self
    }

    pub fn engine_threads(mut self, n: usize) -> Self {
        self.config.engine_threads = n.max(1);
        self
    }

    pub fn engine_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.config.engine_timeout_secs = secs.filter(|s| *s > 0);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs.max(1);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServerConfig, Doc2MdError> {
        let c = &self.config;
        if c.port == 0 {
            return Err(Doc2MdError::InvalidConfig("Port must be non-zero".into()));
        }
        if c.max_body_bytes < MIN_BODY_BYTES {
            return Err(Doc2MdError::InvalidConfig(format!(
                "Body limit must be at least {} bytes, got {}",
                MIN_BODY_BYTES, c.max_body_bytes
            )));
        }
        if c.max_text_chars == 0 {
            return Err(Doc2MdError::InvalidConfig(
                "Text limit must be ≥ 1 character".into(),
            ));
        }
        if c.upload_dir.as_os_str().is_empty() {
            return Err(Doc2MdError::InvalidConfig(
                "Upload directory must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Engine options ───────────────────────────────────────────────────────

/// Pipeline switches passed to the conversion engine.
///
/// `Default` mirrors the engine's own defaults (everything on). The primary
/// strategy uses [`PipelineOptions::minimal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Run OCR on bitmap content.
    pub do_ocr: bool,
    /// Run the table-structure model.
    pub do_table_structure: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            do_ocr: true,
            do_table_structure: true,
        }
    }
}

impl PipelineOptions {
    /// OCR and table-structure extraction disabled.
    pub fn minimal() -> Self {
        Self {
            do_ocr: false,
            do_table_structure: false,
        }
    }
}
