use super::error::ApiResult;
use super::types::ProcessResponse;
use super::upload::parse_inbound;
use crate::convert::Converter;
use axum::extract::{Request, State};
use axum::response::Html;
use axum::Json;
use std::sync::Arc;

const INDEX_HTML: &str = include_str!("../../assets/index.html");

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// `POST /process`: file upload, text, or URL in; Markdown out.
pub async fn process(
    State(converter): State<Arc<Converter>>,
    request: Request,
) -> ApiResult<Json<ProcessResponse>> {
    let inbound = parse_inbound(request).await?;
    let reply = converter.process(inbound).await?;
    Ok(Json(reply.into()))
}
