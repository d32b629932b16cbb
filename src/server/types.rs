//! JSON bodies returned by `POST /process`.

use crate::convert::ConversionReply;
use crate::error::FieldError;
use serde::{Deserialize, Serialize};

/// 200 body. `filename` and `success` are present only for document input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

impl From<ConversionReply> for ProcessResponse {
    fn from(reply: ConversionReply) -> Self {
        match reply {
            ConversionReply::File {
                markdown, filename, ..
            } => Self {
                result: markdown,
                filename: Some(filename),
                success: Some(true),
            },
            ConversionReply::Text { markdown } => Self {
                result: markdown,
                filename: None,
                success: None,
            },
        }
    }
}

/// 4xx / 5xx body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<FieldError>,
}
