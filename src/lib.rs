//! # edgequake-doc2md
//!
//! HTTP front-end that turns uploaded documents, pasted text, or document
//! URLs into Markdown using an external conversion engine (docling).
//!
//! ## Why this crate?
//!
//! Document conversion engines are heavy and occasionally fragile: an OCR or
//! table-structure model can fail on one odd PDF while the plain layout
//! pass would have been fine. This crate wraps the engine in a small,
//! predictable service: strict input validation, one temp file per request
//! that is always removed, and a three-step fallback chain so a single
//! model failure does not turn into a failed request.
//!
//! ## Pipeline Overview
//!
//! ```text
//! POST /process
//!  │
//!  ├─ 1. Parse     multipart / JSON / urlencoded → InboundRequest
//!  ├─ 2. Validate  file > text > URL; extension, length, URL checks (pure)
//!  ├─ 3. Stage     unique temp file (upload bytes, text as .md, or download)
//!  ├─ 4. Convert   Primary (no OCR/tables) → Basic (defaults) → RawText
//!  ├─ 5. Clean up  staged file removed on every path
//!  └─ 6. Reply     {result, filename, success} or {error, details}
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_doc2md::engine::DoclingCli;
//! use edgequake_doc2md::{serve, Converter, ServerConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // DOCLING_BIN, the cached venv, or PATH
//!     let engine = DoclingCli::discover()?.threads(2);
//!     let config = ServerConfig::builder().port(5001).build()?;
//!     serve(Arc::new(Converter::new(config, Arc::new(engine)))).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `doc2md-server` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when embedding the router in another service:
//! ```toml
//! edgequake-doc2md = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineOptions, ServerConfig, ServerConfigBuilder};
pub use convert::{ConversionReply, Converter};
pub use engine::{ConversionEngine, DoclingCli, EngineError};
pub use error::{Doc2MdError, FieldError, StrategyError};
pub use pipeline::chain::Strategy;
pub use pipeline::validate::{ConversionRequest, InboundRequest};
pub use server::{router, serve};
