//! # docling-auto
//!
//! Locate the [docling](https://github.com/docling-project/docling) command-line
//! converter, installing it into a private virtualenv on first use, so that
//! servers built on top of it do not need a hand-managed Python environment.
//!
//! ## How it works
//!
//! On the first call to [`ensure_docling`]:
//!
//! 1. Honours `DOCLING_BIN` if it points to an existing file.
//! 2. Checks `~/.cache/doc2md/docling-{VERSION}/venv/` for a cached install.
//! 3. Falls back to the first `docling` executable on `PATH`.
//! 4. If none is found, creates the virtualenv with `python3 -m venv` and runs
//!    `pip install docling=={VERSION}` inside it.
//!
//! Subsequent calls return the memoized path without touching the filesystem.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use docling_auto::{ensure_docling, find_docling};
//!
//! // Option A: only use what is already there
//! if let Some(path) = find_docling() {
//!     println!("docling at {}", path.display());
//! }
//!
//! // Option B: install on demand, reporting each step
//! let path = ensure_docling(Some(&|step: &str| eprintln!("docling: {step}")))
//!     .expect("docling unavailable");
//! ```
//!
//! ## Environment variable overrides
//!
//! - `DOCLING_BIN`: path to an existing docling executable; skips discovery.
//! - `DOCLING_AUTO_CACHE_DIR`: override the default cache directory.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// The docling release installed into the cached virtualenv.
pub const DOCLING_VERSION: &str = "2.31.0";

/// Interpreters tried, in order, when creating the virtualenv.
const PYTHON_CANDIDATES: &[&str] = &["python3", "python"];

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by docling-auto operations.
#[derive(Error, Debug)]
pub enum DoclingAutoError {
    /// No usable Python interpreter to build the virtualenv with.
    #[error("Python not found (tried {tried}). Install python3 or set DOCLING_BIN.")]
    PythonNotFound { tried: String },

    /// Could not create or navigate the local cache directory.
    #[error("Cache directory error: {0}")]
    CacheDir(#[source] std::io::Error),

    /// `venv` creation or `pip install` failed.
    #[error("Installing docling failed during '{step}': {detail}")]
    Install { step: String, detail: String },

    /// Discovery found nothing and installation was not requested.
    #[error("docling executable not found. Set DOCLING_BIN, put docling on PATH, or install it with --install-engine.")]
    NotInstalled,
}

// ── Internal: platform layout ────────────────────────────────────────────────

/// Directory inside a virtualenv that holds console scripts.
fn venv_bin_dir() -> &'static str {
    if cfg!(windows) {
        "Scripts"
    } else {
        "bin"
    }
}

/// File name of the docling console script on this platform.
fn executable_name() -> &'static str {
    if cfg!(windows) {
        "docling.exe"
    } else {
        "docling"
    }
}

// ── Cache directory resolution ───────────────────────────────────────────────

/// Returns the per-version cache directory for the docling virtualenv.
///
/// Default locations:
/// - **macOS**: `~/Library/Caches/doc2md/docling-{VERSION}/`
/// - **Linux**: `~/.cache/doc2md/docling-{VERSION}/`
/// - **Windows**: `%LOCALAPPDATA%\doc2md\docling-{VERSION}\`
///
/// Override by setting `DOCLING_AUTO_CACHE_DIR`.
pub fn docling_cache_dir() -> PathBuf {
    cache_dir_from(std::env::var_os("DOCLING_AUTO_CACHE_DIR"))
}

fn cache_dir_from(override_dir: Option<OsString>) -> PathBuf {
    if let Some(dir) = override_dir.filter(|d| !d.is_empty()) {
        return PathBuf::from(dir).join(format!("docling-{DOCLING_VERSION}"));
    }

    let base = dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(std::env::temp_dir);

    base.join("doc2md").join(format!("docling-{DOCLING_VERSION}"))
}

/// Path of the docling executable inside the cached virtualenv.
pub fn cached_docling_path() -> PathBuf {
    venv_executable(&docling_cache_dir().join("venv"))
}

fn venv_executable(venv: &Path) -> PathBuf {
    venv.join(venv_bin_dir()).join(executable_name())
}

// ── Thread-safe singleton path cache ─────────────────────────────────────────

static RESOLVED_PATH: OnceLock<PathBuf> = OnceLock::new();

// ── Public API ───────────────────────────────────────────────────────────────

/// Returns the docling executable without installing anything.
///
/// Search order: `DOCLING_BIN`, the cached virtualenv, then `PATH`.
pub fn find_docling() -> Option<PathBuf> {
    if let Some(path) = RESOLVED_PATH.get() {
        return Some(path.clone());
    }

    if let Some(env_path) = std::env::var_os("DOCLING_BIN") {
        let p = PathBuf::from(env_path);
        if p.is_file() {
            return Some(p);
        }
        eprintln!(
            "docling-auto: DOCLING_BIN '{}' not found; searching elsewhere …",
            p.display()
        );
    }

    let cached = cached_docling_path();
    if cached.is_file() {
        return Some(cached);
    }

    std::env::var_os("PATH").and_then(|path| search_path(executable_name(), &path))
}

/// Returns `true` when [`find_docling`] would succeed without installing.
pub fn is_docling_installed() -> bool {
    find_docling().is_some()
}

/// Ensures a docling executable is available, installing it if necessary.
///
/// `on_step` receives a short description of each installation step
/// (`"creating virtualenv"`, `"pip install docling==…"`). Pass `None` to stay
/// silent.
///
/// # Thread safety
///
/// Safe to call from multiple threads; the resolved path is memoized for the
/// process lifetime. Two racing first calls may both install, which pip
/// tolerates.
pub fn ensure_docling(on_step: Option<&dyn Fn(&str)>) -> Result<PathBuf, DoclingAutoError> {
    if let Some(path) = RESOLVED_PATH.get() {
        return Ok(path.clone());
    }

    let path = match find_docling() {
        Some(path) => path,
        None => install_into_cache(on_step)?,
    };

    let _ = RESOLVED_PATH.set(path.clone());

    Ok(path)
}

/// Like [`ensure_docling`] but never installs; maps "absent" to an error.
pub fn require_docling() -> Result<PathBuf, DoclingAutoError> {
    let path = find_docling().ok_or(DoclingAutoError::NotInstalled)?;
    let _ = RESOLVED_PATH.set(path.clone());
    Ok(path)
}

// ── Internal helpers ─────────────────────────────────────────────────────────

/// Returns the first `name` found in the directories of a `PATH`-style list.
fn search_path(name: &str, path_var: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

fn find_python() -> Result<&'static str, DoclingAutoError> {
    PYTHON_CANDIDATES
        .iter()
        .copied()
        .find(|name| {
            Command::new(name)
                .arg("--version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|s| s.success())
                .unwrap_or(false)
        })
        .ok_or_else(|| DoclingAutoError::PythonNotFound {
            tried: PYTHON_CANDIDATES.join(", "),
        })
}

fn install_into_cache(on_step: Option<&dyn Fn(&str)>) -> Result<PathBuf, DoclingAutoError> {
    let report = |step: &str| {
        if let Some(cb) = on_step {
            cb(step);
        }
    };

    let python = find_python()?;
    let cache_dir = docling_cache_dir();
    let venv = cache_dir.join("venv");

    std::fs::create_dir_all(&cache_dir).map_err(DoclingAutoError::CacheDir)?;

    report("creating virtualenv");
    run_step(
        "venv",
        Command::new(python).arg("-m").arg("venv").arg(&venv),
    )?;

    let pip = venv.join(venv_bin_dir()).join(if cfg!(windows) { "pip.exe" } else { "pip" });
    let requirement = format!("docling=={DOCLING_VERSION}");
    report(&format!("pip install {requirement}"));
    run_step(
        "pip install",
        Command::new(&pip)
            .arg("install")
            .arg("--disable-pip-version-check")
            .arg(&requirement),
    )?;

    let exe = venv_executable(&venv);
    if !exe.is_file() {
        return Err(DoclingAutoError::Install {
            step: "verify".to_string(),
            detail: format!("'{}' missing after install", exe.display()),
        });
    }

    report("ready");
    Ok(exe)
}

/// Runs one installation command, folding a non-zero exit into an error that
/// carries the tail of stderr.
fn run_step(step: &str, command: &mut Command) -> Result<(), DoclingAutoError> {
    let output = command
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| DoclingAutoError::Install {
            step: step.to_string(),
            detail: e.to_string(),
        })?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(DoclingAutoError::Install {
        step: step.to_string(),
        detail: format!("{}: {}", output.status, tail(stderr.trim(), 400)),
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

// ── Tests ─────────────────────────────────────────────────────────────────────
