use super::error::{ApiError, ApiResult};
use crate::pipeline::validate::{FilePart, InboundRequest, TEXT_FIELD, URL_FIELD};
use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::Form;
use std::collections::HashMap;

/// Multipart field carrying the document.
pub const FILE_FIELD: &str = "file";

/// Split a `/process` request body into its raw parts by `Content-Type`.
///
/// Nothing is validated here. A JSON body that does not parse is treated as
/// absent, and an unknown content type yields an empty [`InboundRequest`]
/// (which validation turns into "no input").
pub async fn parse_inbound(req: Request) -> ApiResult<InboundRequest> {
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(req, &())
            .await
            .map_err(|e| rejected(e.status(), e.body_text()))?;
        return parse_multipart(multipart).await;
    }

    if is_json(&content_type) {
        let bytes = Bytes::from_request(req, &())
            .await
            .map_err(|e| rejected(e.status(), e.body_text()))?;
        return Ok(InboundRequest {
            json: serde_json::from_slice(&bytes).ok(),
            ..Default::default()
        });
    }

    if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(mut fields) = Form::<HashMap<String, String>>::from_request(req, &())
            .await
            .map_err(|e| rejected(e.status(), e.body_text()))?;
        return Ok(InboundRequest {
            form_text: fields.remove(TEXT_FIELD),
            form_url: fields.remove(URL_FIELD),
            ..Default::default()
        });
    }

    Ok(InboundRequest::default())
}

/// Read the `file`, `inputText` and `url` parts; other parts are skipped.
pub async fn parse_multipart(mut multipart: Multipart) -> ApiResult<InboundRequest> {
    let mut inbound = InboundRequest::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| rejected(e.status(), format!("Failed to read form field: {}", e.body_text())))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            FILE_FIELD => {
                let filename = field.file_name().unwrap_or("").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| rejected(e.status(), format!("Failed to read file data: {}", e.body_text())))?
                    .to_vec();
                inbound.file = Some(FilePart { filename, bytes });
            }
            TEXT_FIELD | URL_FIELD => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| rejected(e.status(), format!("Failed to read {}: {}", name, e.body_text())))?;
                if name == TEXT_FIELD {
                    inbound.form_text = Some(value);
                } else {
                    inbound.form_url = Some(value);
                }
            }
            _ => {}
        }
    }

    Ok(inbound)
}

fn is_json(content_type: &str) -> bool {
    let mime = content_type.split(';').next().unwrap_or("").trim();
    mime == "application/json" || mime.ends_with("+json")
}

fn rejected(status: StatusCode, text: String) -> ApiError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(text)
    } else {
        crate::error::Doc2MdError::MalformedRequest(text).into()
    }
}
