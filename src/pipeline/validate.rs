//! Input validation: raw request parts → [`ConversionRequest`].
//!
//! Pure functions only. Nothing here touches the filesystem, so a rejected
//! request never leaves a staged file behind.

use crate::error::Doc2MdError;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use serde_json::Value;
use unicode_normalization::UnicodeNormalization;

/// Extensions accepted for uploads, compared case-insensitively.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "pdf", "docx", "doc", "pptx", "ppt", "xlsx", "xls", "html", "htm", "txt", "md", "rtf", "odt",
    "epub",
];

/// Name of the JSON / form field carrying text input.
pub const TEXT_FIELD: &str = "inputText";

/// Name of the JSON / form field carrying a document URL.
pub const URL_FIELD: &str = "url";

static UNSAFE_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_.\-]").expect("static regex"));

static URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)^https?://",
        r"(?:(?:[A-Z0-9](?:[A-Z0-9-]{0,61}[A-Z0-9])?\.)+[A-Z]{2,6}\.?|",
        r"localhost|",
        r"\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})",
        r"(?::\d+)?",
        r"(?:/?|[/?]\S+)$",
    ))
    .expect("static regex")
});

const WINDOWS_DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// A file part as it arrived, before validation.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Everything the HTTP layer could pull out of one request body.
///
/// At most one of these ends up being used; see [`InboundRequest::validate`].
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    /// The `file` multipart part, if any.
    pub file: Option<FilePart>,
    /// Parsed JSON body, if the request was JSON and parsed cleanly.
    pub json: Option<Value>,
    /// `inputText` form field (urlencoded or multipart).
    pub form_text: Option<String>,
    /// `url` form field (urlencoded or multipart).
    pub form_url: Option<String>,
}

/// A validated upload.
#[derive(Debug, Clone)]
pub struct ValidatedUpload {
    /// Filename exactly as the client sent it.
    pub original_name: String,
    /// Sanitized filename; used in responses and as the staged-name suffix.
    pub filename: String,
    /// Lower-cased extension, guaranteed to be in [`ALLOWED_EXTENSIONS`].
    pub extension: String,
    pub bytes: Vec<u8>,
}

/// A request that passed validation. Exactly one input kind.
#[derive(Debug, Clone)]
pub enum ConversionRequest {
    FileUpload(ValidatedUpload),
    /// Trimmed, non-empty text within the configured limit.
    TextPayload { content: String },
    UrlPayload { url: Url },
}

impl ConversionRequest {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ConversionRequest::FileUpload(_) => "file",
            ConversionRequest::TextPayload { .. } => "text",
            ConversionRequest::UrlPayload { .. } => "url",
        }
    }
}

impl InboundRequest {
    /// Pick the input path (file > text > URL) and validate it.
    pub fn validate(self, max_text_chars: usize) -> Result<ConversionRequest, Doc2MdError> {
        if let Some(file) = self.file.filter(|f| !f.filename.is_empty()) {
            return validate_upload(file).map(ConversionRequest::FileUpload);
        }

        // JSON `null` is the same as no JSON body.
        if let Some(json) = self.json.filter(|v| !v.is_null()) {
            return validate_json(&json, max_text_chars);
        }

        if let Some(text) = self.form_text.filter(|t| !t.is_empty()) {
            let content = validate_text(&text, max_text_chars).map_err(as_text_field)?;
            return Ok(ConversionRequest::TextPayload { content });
        }

        if let Some(url) = self.form_url.filter(|u| !u.is_empty()) {
            return validate_url(&url).map(|url| ConversionRequest::UrlPayload { url });
        }

        Err(Doc2MdError::NoInput)
    }
}

fn validate_json(json: &Value, max_text_chars: usize) -> Result<ConversionRequest, Doc2MdError> {
    let obj = json
        .as_object()
        .ok_or_else(|| Doc2MdError::field("body", "Input should be a JSON object"))?;

    match (obj.get(TEXT_FIELD), obj.get(URL_FIELD)) {
        (Some(Value::String(text)), _) => {
            let content = validate_text(text, max_text_chars).map_err(as_text_field)?;
            Ok(ConversionRequest::TextPayload { content })
        }
        (Some(_), _) => Err(Doc2MdError::field(TEXT_FIELD, "Input should be a valid string")),
        (None, Some(Value::String(url))) => {
            validate_url(url).map(|url| ConversionRequest::UrlPayload { url })
        }
        (None, Some(_)) => Err(Doc2MdError::field(URL_FIELD, "Input should be a valid string")),
        (None, None) => Err(Doc2MdError::field(TEXT_FIELD, "Field required")),
    }
}

/// Text arriving in a JSON or form field reports failures against that field.
fn as_text_field(e: Doc2MdError) -> Doc2MdError {
    match e {
        Doc2MdError::EmptyInput | Doc2MdError::InputTooLong { .. } => {
            Doc2MdError::field(TEXT_FIELD, e.to_string())
        }
        other => other,
    }
}

/// Validate an upload's filename and extension.
pub fn validate_upload(file: FilePart) -> Result<ValidatedUpload, Doc2MdError> {
    if file.filename.trim().is_empty() {
        return Err(Doc2MdError::EmptyFilename);
    }

    let unsupported = || Doc2MdError::UnsupportedFileType {
        filename: file.filename.clone(),
        allowed: allowed_extensions_display(),
    };

    let extension = extension_of(&file.filename)
        .filter(|ext| is_allowed_extension(ext))
        .ok_or_else(unsupported)?;

    // Sanitising can strip the name down to nothing, or eat the extension
    // ("..pdf" → "pdf"); neither is a usable storage name.
    let filename = secure_filename(&file.filename);
    if extension_of(&filename).as_deref() != Some(extension.as_str()) {
        return Err(unsupported());
    }

    Ok(ValidatedUpload {
        original_name: file.filename,
        filename,
        extension,
        bytes: file.bytes,
    })
}

/// Trim and bound-check text input.
///
/// The length limit applies to the text as received, before trimming.
pub fn validate_text(raw: &str, max_chars: usize) -> Result<String, Doc2MdError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Doc2MdError::EmptyInput);
    }
    let len = raw.chars().count();
    if len > max_chars {
        return Err(Doc2MdError::InputTooLong {
            len,
            max: max_chars,
        });
    }
    Ok(trimmed.to_string())
}

/// Check that `raw` is an http(s) URL with a plausible host.
pub fn validate_url(raw: &str) -> Result<Url, Doc2MdError> {
    let invalid = || Doc2MdError::InvalidUrl {
        url: raw.to_string(),
    };
    if !URL_PATTERN.is_match(raw) {
        return Err(invalid());
    }
    Url::parse(raw).map_err(|_| invalid())
}

/// Lower-cased text after the last `.`, if there is one.
pub fn extension_of(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

pub fn is_allowed_extension(ext: &str) -> bool {
    ALLOWED_EXTENSIONS
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(ext))
}

/// Comma-separated allowed extensions, for error messages.
pub fn allowed_extensions_display() -> String {
    ALLOWED_EXTENSIONS.join(", ")
}

/// Make a client-supplied filename safe to use as part of a storage name.
///
/// The name is NFKD-folded and what is still non-ASCII is dropped
/// (`é` → `e`, CJK disappears). Path separators become spaces,
/// whitespace runs collapse into `_`, anything outside `[A-Za-z0-9_.-]` is
/// removed, leading/trailing `.` and `_` are stripped, and Windows device
/// names get a `_` prefix. The result may be empty.
pub fn secure_filename(name: &str) -> String {
    let ascii: String = name
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned = UNSAFE_FILENAME_CHARS.replace_all(&joined, "");
    let trimmed = cleaned.trim_matches(|c: char| c == '.' || c == '_');

    let stem = trimmed.split('.').next().unwrap_or("");
    if !trimmed.is_empty()
        && WINDOWS_DEVICE_NAMES
            .iter()
            .any(|dev| dev.eq_ignore_ascii_case(stem))
    {
        return format!("_{trimmed}");
    }
    trimmed.to_string()
}
