//! Subprocess backend: drive the `docling` CLI.
//!
//! Each call gets its own scratch output directory, so concurrent requests
//! never read each other's results. The child is spawned with
//! `kill_on_drop(true)`; if the request future is dropped (client gone,
//! timeout) the conversion process goes with it.

use super::{ConversionEngine, EngineError};
use crate::config::PipelineOptions;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, warn};

/// Bytes of stderr kept in [`EngineError::Exited`].
const STDERR_TAIL: usize = 2000;

/// [`ConversionEngine`] backed by the `docling` command-line converter.
///
/// ```rust,no_run
/// use edgequake_doc2md::engine::DoclingCli;
/// use std::time::Duration;
///
/// let engine = DoclingCli::new("/usr/local/bin/docling")
///     .threads(2)
///     .timeout(Some(Duration::from_secs(300)));
/// ```
#[derive(Debug, Clone)]
pub struct DoclingCli {
    program: PathBuf,
    leading_args: Vec<OsString>,
    threads: usize,
    timeout: Option<Duration>,
}

impl DoclingCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            threads: 1,
            timeout: None,
        }
    }

    /// Use whatever docling [`docling_auto::require_docling`] finds.
    pub fn discover() -> Result<Self, docling_auto::DoclingAutoError> {
        docling_auto::require_docling().map(Self::new)
    }

    /// Arguments placed before the input path, e.g. `["-m", "docling.cli.main"]`
    /// when `program` is a Python interpreter.
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Thread count for the engine's numeric libraries (`OMP_NUM_THREADS` etc.).
    pub fn threads(mut self, n: usize) -> Self {
        self.threads = n.max(1);
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Full argument list for one conversion.
    fn build_args(
        &self,
        input: &Path,
        out_dir: &Path,
        options: Option<&PipelineOptions>,
    ) -> Vec<OsString> {
        let mut args = self.leading_args.clone();
        args.push(input.as_os_str().to_owned());
        args.extend(["--to", "md", "--output"].map(OsString::from));
        args.push(out_dir.as_os_str().to_owned());

        if let Some(opts) = options {
            let ocr = if opts.do_ocr { "--ocr" } else { "--no-ocr" };
            let tables = if opts.do_table_structure {
                "--tables"
            } else {
                "--no-tables"
            };
            args.push(ocr.into());
            args.push(tables.into());
        }
        args
    }

    async fn run(&self, args: Vec<OsString>) -> Result<std::process::Output, EngineError> {
        let threads = self.threads.to_string();
        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .env("OMP_NUM_THREADS", &threads)
            .env("MKL_NUM_THREADS", &threads)
            .env("TOKENIZERS_PARALLELISM", "false")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.output();
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child)
                .await
                .map_err(|_| EngineError::Timeout(limit))?,
            None => child.await,
        };

        output.map_err(|source| EngineError::Spawn {
            program: self.program.clone(),
            source,
        })
    }
}

#[async_trait]
impl ConversionEngine for DoclingCli {
    fn name(&self) -> &str {
        "docling"
    }

    async fn convert(
        &self,
        path: &Path,
        options: Option<&PipelineOptions>,
    ) -> Result<String, EngineError> {
        let out_dir = TempDir::new()?;
        let args = self.build_args(path, out_dir.path(), options);
        debug!(program = %self.program.display(), ?args, "running docling");

        let output = self.run(args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = %output.status, "docling failed");
            return Err(EngineError::Exited {
                status: output.status.to_string(),
                stderr: tail(stderr.trim(), STDERR_TAIL).to_string(),
            });
        }

        let md_path = find_output(path, out_dir.path()).await?;
        let bytes = tokio::fs::read(&md_path).await?;
        Ok(String::from_utf8(bytes)?)
    }
}

/// Locate the Markdown file docling wrote for `input` inside `out_dir`.
///
/// docling names it after the input stem; if that is missing (older releases
/// normalise some names) the first `.md` file in the directory is used.
async fn find_output(input: &Path, out_dir: &Path) -> Result<PathBuf, EngineError> {
    if let Some(stem) = input.file_stem() {
        let mut expected = out_dir.join(stem);
        expected.set_extension("md");
        if tokio::fs::try_exists(&expected).await? {
            return Ok(expected);
        }
    }

    let mut entries = tokio::fs::read_dir(out_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let p = entry.path();
        if p.extension().is_some_and(|e| e.eq_ignore_ascii_case("md")) {
            return Ok(p);
        }
    }

    Err(EngineError::MissingOutput {
        dir: out_dir.to_path_buf(),
    })
}

/// Last `max` bytes of `s`, cut on a char boundary.
fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}
