//! The conversion fallback chain.
//!
//! A staged file is tried with up to three strategies, in a fixed order:
//!
//! ```text
//! Primary ──fail──▶ Basic ──fail──▶ RawText ──fail──▶ ChainFailure
//!   │                 │                │
//!   └─ok──────────────┴─ok─────────────┴─ok──▶ ChainSuccess
//! ```
//!
//! 1. **Primary**: engine with [`ServerConfig::primary_options`]
//!    (OCR and table structure off by default).
//! 2. **Basic**: engine with no custom options.
//! 3. **RawText**: no engine; `.txt` / `.md` files are returned verbatim.
//!
//! Each attempt is an explicit `Result`. The first `Ok` wins and later
//! strategies never run. When all three fail, the error of the *last* one
//! is what the client sees.
//!
//! [`ServerConfig::primary_options`]: crate::config::ServerConfig::primary_options

use crate::config::PipelineOptions;
use crate::engine::ConversionEngine;
use crate::error::{Doc2MdError, StrategyError};
use crate::pipeline::validate::extension_of;
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

/// One step of the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Primary,
    Basic,
    RawText,
}

impl Strategy {
    /// Chain order.
    pub const ALL: [Strategy; 3] = [Strategy::Primary, Strategy::Basic, Strategy::RawText];
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Strategy::Primary => "Primary",
            Strategy::Basic => "Basic",
            Strategy::RawText => "Raw text",
        };
        f.write_str(s)
    }
}

/// Markdown produced by the first strategy that succeeded.
#[derive(Debug, Clone)]
pub struct ChainSuccess {
    pub markdown: String,
    pub strategy: Strategy,
    /// Failures of the strategies tried before `strategy`, in order.
    pub failures: Vec<StrategyError>,
}

/// Every strategy failed.
#[derive(Debug, Clone, Error)]
#[error("All conversion methods failed. Last error: {}", last_error(.failures))]
pub struct ChainFailure {
    /// One entry per strategy, in chain order.
    pub failures: Vec<StrategyError>,
}

impl ChainFailure {
    pub fn last(&self) -> Option<&StrategyError> {
        self.failures.last()
    }
}

fn last_error(failures: &[StrategyError]) -> String {
    failures
        .last()
        .map(ToString::to_string)
        .unwrap_or_else(|| "unknown error".to_string())
}

/// Run the full chain on a staged file.
pub async fn run_chain(
    engine: &dyn ConversionEngine,
    path: &Path,
    primary_options: &PipelineOptions,
) -> Result<ChainSuccess, ChainFailure> {
    let mut failures = Vec::with_capacity(Strategy::ALL.len());

    for strategy in Strategy::ALL {
        debug!("Trying {} strategy on {}", strategy, path.display());
        match attempt(strategy, engine, path, primary_options).await {
            Ok(markdown) => {
                if !failures.is_empty() {
                    info!(
                        "{} strategy succeeded after {} failed attempt(s)",
                        strategy,
                        failures.len()
                    );
                }
                return Ok(ChainSuccess {
                    markdown,
                    strategy,
                    failures,
                });
            }
            Err(e) => {
                warn!("{} strategy failed for {}: {}", strategy, path.display(), e);
                failures.push(e);
            }
        }
    }

    Err(ChainFailure { failures })
}

/// Run a single strategy.
pub async fn attempt(
    strategy: Strategy,
    engine: &dyn ConversionEngine,
    path: &Path,
    primary_options: &PipelineOptions,
) -> Result<String, StrategyError> {
    let engine_failed = |e: crate::engine::EngineError| StrategyError::EngineFailed {
        strategy: strategy.to_string(),
        detail: e.to_string(),
    };

    match strategy {
        Strategy::Primary => engine
            .convert(path, Some(primary_options))
            .await
            .map_err(engine_failed),
        Strategy::Basic => engine.convert(path, None).await.map_err(engine_failed),
        Strategy::RawText => read_raw_text(path).await,
    }
}

/// One engine call with default options; used for text input.
pub async fn convert_once(engine: &dyn ConversionEngine, path: &Path) -> Result<String, Doc2MdError> {
    engine
        .convert(path, None)
        .await
        .map_err(|e| Doc2MdError::EngineFailed(e.to_string()))
}

async fn read_raw_text(path: &Path) -> Result<String, StrategyError> {
    let extension = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(extension_of);

    match extension.as_deref() {
        Some("txt") | Some("md") => {}
        _ => return Err(StrategyError::UnsupportedRawText { extension }),
    }

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| StrategyError::RawReadFailed {
            detail: format!("Failed to read {}: {}", path.display(), e),
        })?;

    String::from_utf8(bytes).map_err(|e| StrategyError::RawReadFailed {
        detail: format!("File is not valid UTF-8: {e}"),
    })
}
