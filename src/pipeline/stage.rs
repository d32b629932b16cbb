//! Staging: put validated input on disk for the engine.
//!
//! ## Why a file at all?
//!
//! The conversion engine works on paths and picks its parser from the file
//! extension, so every input (upload, text, URL) becomes exactly one
//! temporary file whose name ends in the right extension.
//!
//! ## Cleanup
//!
//! [`StagedFile`] wraps a [`tempfile::NamedTempFile`]: the file is removed
//! when the guard is dropped, on every exit path including panics and
//! cancelled request futures. The happy path calls [`StagedFile::close`]
//! instead so a failed removal is reported rather than silently ignored.
//!
//! Storage names are always unique (`doc2md-<random>-<name>`), so two
//! requests uploading `report.pdf` at the same moment never share a file.

use crate::error::Doc2MdError;
use crate::pipeline::validate::{extension_of, is_allowed_extension, secure_filename, ValidatedUpload};
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info};

const STAGE_PREFIX: &str = "doc2md-";

/// A request-scoped temp file. Deleted on drop.
#[derive(Debug)]
pub struct StagedFile {
    file: NamedTempFile,
}

impl StagedFile {
    /// Path handed to the conversion engine.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), Doc2MdError> {
        self.file.write_all(bytes).map_err(|e| self.staging_err(e))
    }

    fn flush(&mut self) -> Result<(), Doc2MdError> {
        self.file.flush().map_err(|e| self.staging_err(e))
    }

    fn staging_err(&self, source: std::io::Error) -> Doc2MdError {
        Doc2MdError::Staging {
            path: self.file.path().to_path_buf(),
            source,
        }
    }

    /// Delete the file now, reporting any error.
    pub fn close(self) -> std::io::Result<()> {
        let path = self.file.path().to_path_buf();
        self.file.close()?;
        debug!("Removed staged file {}", path.display());
        Ok(())
    }
}

/// Write an upload verbatim under a unique name ending in its sanitized name.
pub fn stage_upload(dir: &Path, upload: &ValidatedUpload) -> Result<StagedFile, Doc2MdError> {
    let suffix = format!("-{}", upload.filename);
    stage_bytes(dir, &suffix, &upload.bytes)
}

/// Write text input to a unique `.md` file so the engine reads it as Markdown.
pub fn stage_text(dir: &Path, text: &str) -> Result<StagedFile, Doc2MdError> {
    stage_bytes(dir, ".md", text.as_bytes())
}

/// Download `url` into a staged file.
///
/// Returns the staged file and the display filename used in the response.
/// The name comes from the last URL path segment when it carries an allowed
/// extension, otherwise from the response `Content-Type`.
pub async fn stage_download(
    dir: &Path,
    url: &Url,
    timeout_secs: u64,
    max_bytes: usize,
) -> Result<(StagedFile, String), Doc2MdError> {
    info!("Downloading document from: {}", url);

    let failed = |reason: String| Doc2MdError::DownloadFailed {
        url: url.to_string(),
        reason,
    };
    let fetch_err = |e: reqwest::Error| {
        if e.is_timeout() {
            Doc2MdError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let mut response = client.get(url.clone()).send().await.map_err(fetch_err)?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    if response
        .content_length()
        .is_some_and(|len| len > max_bytes as u64)
    {
        return Err(failed(format!("body larger than {max_bytes} bytes")));
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let filename = download_name(url, content_type.as_deref()).ok_or_else(|| {
        Doc2MdError::UnsupportedFileType {
            filename: url.to_string(),
            allowed: crate::pipeline::validate::allowed_extensions_display(),
        }
    })?;

    // Chunked responses carry no length up front, so the cap is enforced
    // while streaming into the staged file.
    let mut staged = create_staged(dir, &format!("-{filename}"))?;
    let mut total = 0usize;
    while let Some(chunk) = response.chunk().await.map_err(fetch_err)? {
        total += chunk.len();
        if total > max_bytes {
            return Err(failed(format!("body larger than {max_bytes} bytes")));
        }
        staged.write(&chunk)?;
    }
    staged.flush()?;

    info!("Downloaded {} bytes to: {}", total, staged.path().display());

    Ok((staged, filename))
}

/// Pick a storage/display name for a downloaded document.
fn download_name(url: &Url, content_type: Option<&str>) -> Option<String> {
    let from_path = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .map(secure_filename)
        .filter(|name| {
            extension_of(name).is_some_and(|ext| is_allowed_extension(&ext))
        });
    if from_path.is_some() {
        return from_path;
    }

    let mime = content_type?
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    let name = match mime.as_str() {
        "text/html" | "application/xhtml+xml" => "download.html",
        "application/pdf" => "download.pdf",
        "text/plain" => "download.txt",
        "text/markdown" | "text/x-markdown" => "download.md",
        _ => return None,
    };
    Some(name.to_string())
}

fn stage_bytes(dir: &Path, suffix: &str, bytes: &[u8]) -> Result<StagedFile, Doc2MdError> {
    let mut staged = create_staged(dir, suffix)?;
    staged.write(bytes)?;
    staged.flush()?;

    debug!(
        "Staged {} bytes at {}",
        bytes.len(),
        staged.path().display()
    );
    Ok(staged)
}

fn create_staged(dir: &Path, suffix: &str) -> Result<StagedFile, Doc2MdError> {
    let file = tempfile::Builder::new()
        .prefix(STAGE_PREFIX)
        .suffix(suffix)
        .tempfile_in(dir)
        .map_err(|source| Doc2MdError::Staging {
            path: dir.join(format!("{STAGE_PREFIX}*{suffix}")),
            source,
        })?;
    Ok(StagedFile { file })
}

/// Paths of all staged files currently in `dir`.
///
/// Used by tests and diagnostics to confirm nothing outlives its request.
pub fn staged_files_in(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.starts_with(STAGE_PREFIX))
        {
            found.push(entry.path());
        }
    }
    Ok(found)
}
