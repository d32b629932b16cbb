//! Server binary for edgequake-doc2md.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ServerConfig`, locates the docling engine, and starts the listener.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_doc2md::engine::DoclingCli;
use edgequake_doc2md::{serve, Converter, PipelineOptions, ServerConfig};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve on the default address (127.0.0.1:5001)
  doc2md-server

  # Listen on all interfaces, custom port
  doc2md-server --host 0.0.0.0 --port 8080

  # Install docling into the local cache on first run
  doc2md-server --install-engine

  # Keep OCR on for the primary strategy, allow 4 engine threads
  doc2md-server --ocr --engine-threads 4

REQUESTS:
  curl -F file=@report.pdf http://127.0.0.1:5001/process
  curl -H 'Content-Type: application/json' \
       -d '{"inputText": "Hello world"}' http://127.0.0.1:5001/process
  curl -d 'url=https://example.com/paper.pdf' http://127.0.0.1:5001/process

FALLBACK CHAIN (file and URL input):
  1. Primary   docling with OCR and table structure off (unless --ocr / --tables)
  2. Basic     docling with its own defaults
  3. Raw text  .txt / .md files returned verbatim

ENVIRONMENT VARIABLES:
  DOCLING_BIN              Path to an existing docling executable
  DOCLING_AUTO_CACHE_DIR   Override the docling virtualenv cache directory
  RUST_LOG                 Override the log filter (e.g. edgequake_doc2md=debug)
"#;

/// Serve a document-to-Markdown conversion endpoint backed by docling.
#[derive(Parser, Debug)]
#[command(
    name = "doc2md-server",
    version,
    about = "Serve a document-to-Markdown conversion endpoint backed by docling",
    long_about = "HTTP front-end that converts uploaded documents (PDF, Office, HTML, \
EPUB, ...), pasted text, or document URLs to Markdown. Conversion runs through docling \
with a Primary → Basic → Raw-text fallback chain.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Interface to bind.
    #[arg(long, env = "DOC2MD_HOST", default_value = "127.0.0.1")]
    host: IpAddr,

    /// TCP port.
    #[arg(short, long, env = "DOC2MD_PORT", default_value_t = 5001)]
    port: u16,

    /// Path to the docling executable. Default: discovered automatically.
    #[arg(long, env = "DOCLING_BIN")]
    docling: Option<PathBuf>,

    /// Directory for staged request files. Default: the OS temp dir.
    #[arg(long, env = "DOC2MD_UPLOAD_DIR")]
    upload_dir: Option<PathBuf>,

    /// Request body limit in megabytes.
    #[arg(long, env = "DOC2MD_MAX_BODY_MB", default_value_t = 50)]
    max_body_mb: usize,

    /// Maximum characters accepted for text input.
    #[arg(long, env = "DOC2MD_MAX_TEXT_CHARS", default_value_t = 100_000)]
    max_text_chars: usize,

    /// Thread count for the engine's numeric libraries.
    #[arg(long, env = "DOC2MD_ENGINE_THREADS", default_value_t = 1)]
    engine_threads: usize,

    /// Per-call engine timeout in seconds (0 or unset: no timeout).
    #[arg(long, env = "DOC2MD_ENGINE_TIMEOUT")]
    engine_timeout: Option<u64>,

    /// Download timeout for URL input, in seconds.
    #[arg(long, env = "DOC2MD_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Run OCR in the primary strategy.
    #[arg(long)]
    ocr: bool,

    /// Run table-structure recognition in the primary strategy.
    #[arg(long)]
    tables: bool,

    /// Run text input through the full fallback chain.
    #[arg(long, env = "DOC2MD_TEXT_FALLBACK")]
    text_fallback: bool,

    /// Install docling into the local cache if it cannot be found.
    #[arg(long)]
    install_engine: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOC2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOC2MD_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Locate the docling engine ────────────────────────────────────────
    let docling = match cli.docling.clone() {
        Some(path) => path,
        None if cli.install_engine => install_engine(cli.quiet)?,
        None => docling_auto::require_docling().context("Failed to locate docling")?,
    };
    info!("Using docling at {}", docling.display());

    // ── Build config ─────────────────────────────────────────────────────
    let config = build_config(&cli)?;

    let engine = DoclingCli::new(docling)
        .threads(config.engine_threads)
        .timeout(config.engine_timeout_secs.map(Duration::from_secs));

    let converter = Arc::new(Converter::new(config, Arc::new(engine)));
    serve(converter).await.context("Server error")?;

    Ok(())
}

fn build_config(cli: &Cli) -> Result<ServerConfig> {
    let mut builder = ServerConfig::builder()
        .host(cli.host)
        .port(cli.port)
        .max_body_bytes(cli.max_body_mb.saturating_mul(1024 * 1024))
        .max_text_chars(cli.max_text_chars)
        .primary_options(PipelineOptions {
            do_ocr: cli.ocr,
            do_table_structure: cli.tables,
        })
        .text_fallback(cli.text_fallback)
        .engine_threads(cli.engine_threads)
        .engine_timeout_secs(cli.engine_timeout)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref dir) = cli.upload_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create upload dir {}", dir.display()))?;
        builder = builder.upload_dir(dir);
    }

    builder.build().context("Invalid configuration")
}

/// Find docling, or install it into the cache venv with a spinner.
fn install_engine(quiet: bool) -> Result<PathBuf> {
    if quiet || docling_auto::is_docling_installed() {
        return tokio::task::block_in_place(|| docling_auto::ensure_docling(None))
            .context("Failed to install docling");
    }

    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.set_prefix("docling");
    bar.set_message("Preparing…");
    bar.enable_steady_tick(Duration::from_millis(80));

    let progress = bar.clone();
    // pip install takes minutes; keep it off the async workers.
    let path = tokio::task::block_in_place(|| {
        docling_auto::ensure_docling(Some(&|step: &str| progress.set_message(step.to_string())))
    })
    .context("Failed to install docling")?;

    bar.finish_with_message("ready ✓");
    Ok(path)
}
