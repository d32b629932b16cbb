//! HTTP front-end.
//!
//! Two routes, both thin adapters over [`Converter`]:
//!
//! | Route           | Handler                  |
//! |-----------------|--------------------------|
//! | `GET /`         | static landing page      |
//! | `POST /process` | convert file/text/URL    |
//!
//! The request body cap comes from [`ServerConfig::max_body_bytes`] and is
//! enforced by axum's [`DefaultBodyLimit`]; oversized bodies get a 413
//! before any validation runs.
//!
//! A panic escaping a handler is caught by [`CatchPanicLayer`], logged, and
//! answered with `500 {"error": <panic message>}`.
//!
//! [`ServerConfig::max_body_bytes`]: crate::config::ServerConfig::max_body_bytes

pub mod error;
pub mod handlers;
pub mod types;
pub mod upload;

use self::error::ApiError;
use crate::convert::Converter;
use crate::error::Doc2MdError;
use axum::extract::DefaultBodyLimit;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Build the application router around a shared [`Converter`].
pub fn router(converter: Arc<Converter>) -> Router {
    let body_limit = DefaultBodyLimit::max(converter.config().max_body_bytes);

    Router::new()
        .route("/", get(handlers::index))
        .route("/process", post(handlers::process))
        .layer(body_limit)
        .layer(CatchPanicLayer::custom(unhandled))
        .layer(TraceLayer::new_for_http())
        .with_state(converter)
}

fn unhandled(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unhandled error while processing request".to_string()
    };
    error!("Unhandled error in request handler: {}", message);
    ApiError::from(Doc2MdError::Internal(message)).into_response()
}

/// Bind to the configured address and serve until Ctrl-C.
pub async fn serve(converter: Arc<Converter>) -> std::io::Result<()> {
    let addr = converter.config().socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        "Listening on http://{} (engine: {})",
        listener.local_addr()?,
        converter.engine().name()
    );

    axum::serve(listener, router(converter))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutting down"),
        // No signal handler: run until killed.
        Err(_) => std::future::pending::<()>().await,
    }
}
