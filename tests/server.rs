//! HTTP-level tests for `POST /process` and `GET /`.
//!
//! The router runs in-process via `tower::ServiceExt::oneshot`, with a
//! scripted in-memory engine in place of docling and a fresh upload
//! directory per test.

use async_trait::async_trait;
use axum::body::{self, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use edgequake_doc2md::pipeline::stage::staged_files_in;
use edgequake_doc2md::{
    router, ConversionEngine, Converter, EngineError, PipelineOptions, ServerConfig,
};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tower::util::ServiceExt;

// ── Test engine ──────────────────────────────────────────────────────────────

type Script = dyn Fn(usize, &str) -> Result<String, String> + Send + Sync;

/// Engine driven by a closure `(call_index, staged_file_content) -> result`.
///
/// Records every call so tests can check options, paths, and that the staged
/// file existed while the engine was running.
struct ScriptedEngine {
    script: Box<Script>,
    calls: Mutex<Vec<Call>>,
    releases: AtomicUsize,
}

#[derive(Debug, Clone)]
struct Call {
    path: PathBuf,
    options: Option<PipelineOptions>,
    file_existed: bool,
}

impl ScriptedEngine {
    fn new(script: impl Fn(usize, &str) -> Result<String, String> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
            releases: AtomicUsize::new(0),
        })
    }

    /// Echo the staged file back.
    fn pass_through() -> Arc<Self> {
        Self::new(|_, content| Ok(content.to_string()))
    }

    /// Fail every call with `msg`.
    fn failing(msg: &'static str) -> Arc<Self> {
        Self::new(move |_, _| Err(msg.to_string()))
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConversionEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn convert(
        &self,
        path: &Path,
        options: Option<&PipelineOptions>,
    ) -> Result<String, EngineError> {
        let content = tokio::fs::read(path).await.ok();
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Call {
                path: path.to_path_buf(),
                options: options.copied(),
                file_existed: content.is_some(),
            });
            calls.len() - 1
        };
        tokio::time::sleep(Duration::from_millis(5)).await;

        let text = String::from_utf8_lossy(content.as_deref().unwrap_or_default()).into_owned();
        (self.script)(index, &text).map_err(EngineError::Other)
    }

    fn release_caches(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

struct Harness {
    app: Router,
    engine: Arc<ScriptedEngine>,
    upload_dir: TempDir,
}

impl Harness {
    fn new(engine: Arc<ScriptedEngine>) -> Self {
        Self::with_config(engine, |b| b)
    }

    fn with_config(
        engine: Arc<ScriptedEngine>,
        configure: impl FnOnce(edgequake_doc2md::ServerConfigBuilder) -> edgequake_doc2md::ServerConfigBuilder,
    ) -> Self {
        let upload_dir = TempDir::new().unwrap();
        let config = configure(ServerConfig::builder().upload_dir(upload_dir.path()))
            .build()
            .unwrap();
        let converter = Arc::new(Converter::new(config, engine.clone()));
        Self {
            app: router(converter),
            engine,
            upload_dir,
        }
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = self.app.clone().oneshot(req).await.expect("router oneshot failed");
        let status = resp.status();
        let bytes = body::to_bytes(resp.into_body(), 16 * 1024 * 1024).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn staged_files(&self) -> Vec<PathBuf> {
        staged_files_in(self.upload_dir.path()).unwrap()
    }
}

const BOUNDARY: &str = "DOC2MD_TEST_BOUNDARY";

fn upload(filename: &str, content: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/process")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn json_request(value: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/process")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(value.to_string()))
        .unwrap()
}

fn form_request(body: impl Into<String>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/process")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.into()))
        .unwrap()
}

// ── Local document server ────────────────────────────────────────────────────

/// Serves fixed documents over plain HTTP/1.1 on an ephemeral port.
///
/// Returns the base URL, e.g. `http://127.0.0.1:40123`.
async fn document_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve_document(stream));
        }
    });
    format!("http://{addr}")
}

async fn serve_document(mut stream: TcpStream) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    let request = String::from_utf8_lossy(&head).into_owned();
    let path = request.split_whitespace().nth(1).unwrap_or("/");

    // Write errors are expected once the client gives up on a response.
    let _ = match path {
        "/papers/report.pdf" => {
            respond(&mut stream, "200 OK", "application/pdf", b"%PDF-1.7 downloaded").await
        }
        "/blog/post" => {
            respond(&mut stream, "200 OK", "text/html; charset=utf-8", b"<h1>Post</h1>").await
        }
        "/logo" => respond(&mut stream, "200 OK", "image/png", b"\x89PNG\r\n").await,
        "/endless.pdf" => respond_chunked(&mut stream, 8 * 1024 * 1024).await,
        "/slow.pdf" => {
            tokio::time::sleep(Duration::from_secs(3)).await;
            respond(&mut stream, "200 OK", "application/pdf", b"%PDF late").await
        }
        _ => respond(&mut stream, "404 Not Found", "text/plain", b"not found").await,
    };
}

async fn respond(
    stream: &mut TcpStream,
    status: &str,
    content_type: &str,
    body: &[u8],
) -> std::io::Result<()> {
    let head = format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\n\
         Connection: close\r\n\r\n",
        body.len()
    );
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(body).await?;
    stream.shutdown().await
}

/// A PDF sent with `Transfer-Encoding: chunked`, so no `Content-Length`.
async fn respond_chunked(stream: &mut TcpStream, total: usize) -> std::io::Result<()> {
    stream
        .write_all(
            b"HTTP/1.1 200 OK\r\nContent-Type: application/pdf\r\n\
              Transfer-Encoding: chunked\r\nConnection: close\r\n\r\n",
        )
        .await?;
    let chunk = vec![b'x'; 64 * 1024];
    let mut sent = 0;
    while sent < total {
        stream.write_all(format!("{:x}\r\n", chunk.len()).as_bytes()).await?;
        stream.write_all(&chunk).await?;
        stream.write_all(b"\r\n").await?;
        sent += chunk.len();
    }
    stream.write_all(b"0\r\n\r\n").await?;
    stream.shutdown().await
}

// ── Success paths ────────────────────────────────────────────────────────────

#[tokio::test]
async fn json_text_round_trips_through_engine() {
    let h = Harness::new(ScriptedEngine::pass_through());
    let (status, body) = h.send(json_request(json!({ "inputText": "Hello world" }))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "result": "Hello world" }));

    let calls = h.engine.calls();
    assert_eq!(calls.len(), 1, "text input is a single engine call");
    assert_eq!(calls[0].options, None);
    assert_eq!(calls[0].path.extension().unwrap(), "md");
}

#[tokio::test]
async fn urlencoded_text_is_accepted() {
    let h = Harness::new(ScriptedEngine::pass_through());
    let (status, body) = h.send(form_request("inputText=%23+Title")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], "# Title");
}

#[tokio::test]
async fn pdf_upload_succeeds_on_primary() {
    let h = Harness::new(ScriptedEngine::new(|_, _| Ok("# Quarterly report".into())));
    let (status, body) = h.send(upload("report.pdf", b"%PDF-1.7 fake")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "result": "# Quarterly report", "filename": "report.pdf", "success": true })
    );

    let calls = h.engine.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].options, Some(PipelineOptions::minimal()));
    assert!(calls[0].file_existed);
}

#[tokio::test]
async fn basic_strategy_runs_with_engine_defaults() {
    let h = Harness::new(ScriptedEngine::new(|i, _| match i {
        0 => Err("CUDA out of memory".into()),
        _ => Ok("recovered".into()),
    }));
    let (status, body) = h.send(upload("slides.pptx", b"PK\x03\x04")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], "recovered");
    let options: Vec<_> = h.engine.calls().into_iter().map(|c| c.options).collect();
    assert_eq!(options, vec![Some(PipelineOptions::minimal()), None]);
}

#[tokio::test]
async fn txt_falls_back_to_verbatim_content() {
    let h = Harness::new(ScriptedEngine::failing("tensor size mismatch"));
    let content = "line one\n\n  indented line two\n";
    let (status, body) = h.send(upload("notes.txt", content.as_bytes())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], content);
    assert_eq!(body["filename"], "notes.txt");
    assert_eq!(h.engine.calls().len(), 2);
}

#[tokio::test]
async fn configured_primary_options_are_used() {
    let opts = PipelineOptions {
        do_ocr: true,
        do_table_structure: false,
    };
    let h = Harness::with_config(ScriptedEngine::pass_through(), |b| b.primary_options(opts));
    h.send(upload("a.html", b"<p>x</p>")).await;
    assert_eq!(h.engine.calls()[0].options, Some(opts));
}

#[tokio::test]
async fn url_pdf_is_downloaded_and_converted() {
    let base = document_server().await;
    let h = Harness::new(ScriptedEngine::pass_through());
    let url = format!("{base}/papers/report.pdf");
    let (status, body) = h.send(json_request(json!({ "url": url }))).await;

    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(
        body,
        json!({ "result": "%PDF-1.7 downloaded", "filename": "report.pdf", "success": true })
    );
    let calls = h.engine.calls();
    assert_eq!(calls[0].options, Some(PipelineOptions::minimal()));
    assert!(calls[0].file_existed);
    assert!(h.staged_files().is_empty());
}

#[tokio::test]
async fn url_without_extension_is_named_from_content_type() {
    let base = document_server().await;
    let h = Harness::new(ScriptedEngine::pass_through());
    let (status, body) = h.send(json_request(json!({ "url": format!("{base}/blog/post") }))).await;

    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["filename"], "download.html");
    assert_eq!(body["result"], "<h1>Post</h1>");
    assert_eq!(h.engine.calls()[0].path.extension().unwrap(), "html");
}

// ── Failure paths ────────────────────────────────────────────────────────────

#[tokio::test]
async fn pdf_with_failing_engine_is_500_with_last_error() {
    let h = Harness::new(ScriptedEngine::failing("model load failed"));
    let (status, body) = h.send(upload("scan.pdf", b"%PDF")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let error = body["error"].as_str().unwrap();
    assert!(
        error.starts_with("Failed to convert file: All conversion methods failed. Last error:"),
        "got: {error}"
    );
    assert!(
        error.ends_with("Text extraction not supported for this file type"),
        "got: {error}"
    );
    assert_eq!(h.engine.calls().len(), 2);
}

#[tokio::test]
async fn text_engine_failure_is_500_with_raw_message() {
    let h = Harness::new(ScriptedEngine::failing("docling crashed"));
    let (status, body) = h.send(json_request(json!({ "inputText": "hi" }))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "docling crashed" }));
}

#[tokio::test]
async fn no_input_is_400() {
    let h = Harness::new(ScriptedEngine::pass_through());
    let req = Request::builder()
        .method("POST")
        .uri("/process")
        .body(Body::empty())
        .unwrap();
    let (status, body) = h.send(req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "No file or text provided." }));
    assert!(h.engine.calls().is_empty());
}

#[tokio::test]
async fn unparseable_json_is_no_input() {
    let h = Harness::new(ScriptedEngine::pass_through());
    let req = Request::builder()
        .method("POST")
        .uri("/process")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"inputText\": "))
        .unwrap();
    let (status, body) = h.send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No file or text provided.");
}

#[tokio::test]
async fn unsupported_extension_is_400_without_staging() {
    let h = Harness::new(ScriptedEngine::pass_through());
    for name in ["virus.exe", "archive.zip", "README"] {
        let (status, body) = h.send(upload(name, b"MZ")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{name}");
        let error = body["error"].as_str().unwrap();
        assert!(error.starts_with("File type not supported. Allowed types:"), "got: {error}");
    }
    assert!(h.engine.calls().is_empty());
    assert!(h.staged_files().is_empty());
}

#[tokio::test]
async fn empty_text_is_400_with_field_detail() {
    let h = Harness::new(ScriptedEngine::pass_through());
    let (status, body) = h.send(json_request(json!({ "inputText": "   \n\t " }))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error = body["error"].as_str().unwrap();
    assert!(error.starts_with("Validation error:"), "got: {error}");
    assert!(error.contains("empty"), "got: {error}");
    assert_eq!(body["details"][0]["field"], "inputText");
    assert!(h.engine.calls().is_empty());
    assert!(h.staged_files().is_empty());
}

#[tokio::test]
async fn too_long_text_is_400() {
    let h = Harness::new(ScriptedEngine::pass_through());
    let long = "a".repeat(100_001);
    let (status, body) = h.send(json_request(json!({ "inputText": long }))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "Validation error: inputText: Input text is too long (max 100,000 characters)"
    );
    assert_eq!(
        body["details"][0]["message"],
        "Input text is too long (max 100,000 characters)"
    );
    assert!(h.engine.calls().is_empty());
}

#[tokio::test]
async fn text_at_the_limit_is_accepted() {
    let h = Harness::new(ScriptedEngine::pass_through());
    let exact = "b".repeat(100_000);
    let (status, _) = h.send(json_request(json!({ "inputText": exact }))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn missing_json_field_is_400() {
    let h = Harness::new(ScriptedEngine::pass_through());
    let (status, body) = h.send(json_request(json!({ "text": "wrong key" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Validation error:"));
    assert_eq!(body["details"][0]["message"], "Field required");
}

#[tokio::test]
async fn invalid_url_is_400() {
    let h = Harness::new(ScriptedEngine::pass_through());
    let (status, body) = h.send(json_request(json!({ "url": "file:///etc/passwd" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid URL format");
}

#[tokio::test]
async fn whitespace_form_text_is_validation_error() {
    let h = Harness::new(ScriptedEngine::pass_through());
    let (status, body) = h.send(form_request("inputText=+++")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "Validation error: inputText: Input text cannot be empty"
    );
    assert!(h.engine.calls().is_empty());
}

#[tokio::test]
async fn url_not_found_is_500() {
    let base = document_server().await;
    let h = Harness::new(ScriptedEngine::pass_through());
    let (status, body) = h.send(json_request(json!({ "url": format!("{base}/missing.pdf") }))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let error = body["error"].as_str().unwrap();
    assert!(error.starts_with("Failed to download"), "got: {error}");
    assert!(error.contains("HTTP 404"), "got: {error}");
    assert!(h.engine.calls().is_empty());
    assert!(h.staged_files().is_empty());
}

#[tokio::test]
async fn url_with_unsupported_content_type_is_400() {
    let base = document_server().await;
    let h = Harness::new(ScriptedEngine::pass_through());
    let (status, body) = h.send(form_request(format!("url={base}/logo"))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error = body["error"].as_str().unwrap();
    assert!(error.starts_with("File type not supported"), "got: {error}");
    assert!(h.engine.calls().is_empty());
    assert!(h.staged_files().is_empty());
}

#[tokio::test]
async fn chunked_download_over_the_cap_is_rejected() {
    let base = document_server().await;
    let h = Harness::with_config(ScriptedEngine::pass_through(), |b| {
        b.max_body_bytes(1024 * 1024)
    });
    let url = format!("{base}/endless.pdf");
    let (status, body) = h.send(json_request(json!({ "url": url }))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let error = body["error"].as_str().unwrap();
    assert!(error.contains("body larger than 1048576 bytes"), "got: {error}");
    assert!(h.engine.calls().is_empty());
    assert!(h.staged_files().is_empty());
}

#[tokio::test]
async fn slow_download_times_out() {
    let base = document_server().await;
    let h = Harness::with_config(ScriptedEngine::pass_through(), |b| {
        b.download_timeout_secs(1)
    });
    let (status, body) = h.send(json_request(json!({ "url": format!("{base}/slow.pdf") }))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let error = body["error"].as_str().unwrap();
    assert!(error.starts_with("Download timed out after 1s"), "got: {error}");
    assert!(h.staged_files().is_empty());
}

#[tokio::test]
async fn engine_panic_is_500_with_message() {
    let h = Harness::new(ScriptedEngine::new(|_, _| {
        panic!("layout model tensor shape mismatch")
    }));
    let (status, body) = h.send(upload("deck.pptx", b"PK\x03\x04")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "layout model tensor shape mismatch" }));
    assert!(h.staged_files().is_empty());
}

#[tokio::test]
async fn oversized_body_is_413() {
    let h = Harness::with_config(ScriptedEngine::pass_through(), |b| {
        b.max_body_bytes(1024 * 1024)
    });
    let big = "x".repeat(2 * 1024 * 1024);
    let (status, _) = h.send(json_request(json!({ "inputText": big }))).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(h.engine.calls().is_empty());
}

// ── Resource hygiene ─────────────────────────────────────────────────────────

#[tokio::test]
async fn staged_files_are_removed_after_every_outcome() {
    let ok = Harness::new(ScriptedEngine::pass_through());
    ok.send(upload("a.docx", b"doc")).await;
    ok.send(json_request(json!({ "inputText": "text" }))).await;
    assert!(ok.engine.calls().iter().all(|c| c.file_existed));
    assert!(ok.engine.calls().iter().all(|c| !c.path.exists()));
    assert!(ok.staged_files().is_empty());

    let failing = Harness::new(ScriptedEngine::failing("boom"));
    failing.send(upload("b.pdf", b"%PDF")).await;
    failing.send(upload("c.txt", b"raw")).await;
    failing.send(json_request(json!({ "inputText": "text" }))).await;
    assert!(failing.engine.calls().iter().all(|c| c.file_existed));
    assert!(failing.staged_files().is_empty());
}

#[tokio::test]
async fn identical_concurrent_uploads_use_distinct_paths() {
    let h = Harness::new(ScriptedEngine::pass_through());
    let (a, b) = tokio::join!(
        h.send(upload("same.md", b"# first")),
        h.send(upload("same.md", b"# second")),
    );

    assert_eq!(a.1["result"], "# first");
    assert_eq!(b.1["result"], "# second");
    let calls = h.engine.calls();
    assert_eq!(calls.len(), 2);
    assert_ne!(calls[0].path, calls[1].path);
    assert!(h.staged_files().is_empty());
}

#[tokio::test]
async fn engine_caches_released_before_and_after_each_request() {
    let h = Harness::new(ScriptedEngine::pass_through());
    h.send(upload("a.md", b"x")).await;
    assert_eq!(h.engine.releases.load(Ordering::SeqCst), 2);
    h.send(json_request(json!({}))).await;
    assert_eq!(h.engine.releases.load(Ordering::SeqCst), 4);
}

// ── Landing page ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn index_serves_html_forms() {
    let h = Harness::new(ScriptedEngine::pass_through());
    let resp = h
        .app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let content_type = resp.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/html"));
    let bytes = body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("action=\"/process\""));
    assert!(html.contains("name=\"inputText\""));
    assert!(html.contains("name=\"file\""));
}
