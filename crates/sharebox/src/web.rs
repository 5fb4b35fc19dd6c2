//! HTTP endpoints for sharebox.
//!
//! Uploads and shared text go in through `/upload` and `/share` and come back
//! out of `/retrieve` by code. `/visitor-count` counts each browser session
//! once. Store calls do blocking filesystem I/O and run on the blocking pool.

use crate::session::{self, SessionRegistry};
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, FromRequest, Multipart, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use sharestore::{
    Artifact, ArtifactKind, ArtifactRef, ArtifactStore, CounterStore, FileStore, ShareCode,
    ShareError,
};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::io::ReaderStream;

/// Default request body limit: 50 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

const NOT_FOUND_MESSAGE: &str = "File or text not found.";
const UNAVAILABLE_MESSAGE: &str = "Content unavailable.";

/// Shared state for web handlers
#[derive(Clone)]
pub struct WebState {
    pub store: Arc<FileStore>,
    pub counter: Arc<CounterStore>,
    pub sessions: Arc<SessionRegistry>,
    pub started_at: Instant,
    pub max_upload_bytes: usize,
}

impl WebState {
    pub fn new(store: Arc<FileStore>, counter: Arc<CounterStore>) -> Self {
        Self {
            store,
            counter,
            sessions: Arc::new(SessionRegistry::new()),
            started_at: Instant::now(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }

    /// Forget visitor sessions after `idle_timeout` without a visit.
    pub fn with_session_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.sessions = Arc::new(SessionRegistry::with_idle_timeout(idle_timeout));
        self
    }
}

pub fn router(state: WebState) -> Router {
    let body_limit = state.max_upload_bytes;
    Router::new()
        .route("/", get(serve_root))
        .route("/health", get(health))
        .route("/upload", post(upload))
        .route("/share", post(share))
        .route("/retrieve", get(retrieve))
        .route("/visitor-count", get(visitor_count))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Serve root discovery endpoint
async fn serve_root() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "sharebox",
        "version": env!("CARGO_PKG_VERSION"),
        "links": {
            "upload": "/upload",
            "share": "/share",
            "retrieve": "/retrieve?fileCode={code}",
            "visitor_count": "/visitor-count",
            "health": "/health",
        }
    }))
}

async fn health(State(state): State<WebState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "artifacts": state.store.len(),
        "sessions": state.sessions.len(),
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}

/// JSON body of every upload and share response.
#[derive(Debug, Serialize)]
struct UploadResponse {
    status: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    /// Key read by the original browser client for file uploads.
    #[serde(rename = "fileCode", skip_serializing_if = "Option::is_none")]
    file_code: Option<String>,
    /// Key read by the original browser client for shared text.
    #[serde(rename = "textCode", skip_serializing_if = "Option::is_none")]
    text_code: Option<String>,
}

impl UploadResponse {
    fn stored(kind: ArtifactKind, code: &ShareCode) -> Response {
        let (message, file_code, text_code) = match kind {
            ArtifactKind::File => ("File uploaded successfully.", Some(code.to_string()), None),
            ArtifactKind::Text => ("Text shared successfully.", None, Some(code.to_string())),
        };
        let body = UploadResponse {
            status: "success",
            message: message.to_string(),
            code: Some(code.to_string()),
            file_code,
            text_code,
        };
        (StatusCode::OK, Json(body)).into_response()
    }

    fn error(status: StatusCode, message: impl Into<String>) -> Response {
        let body = UploadResponse {
            status: "error",
            message: message.into(),
            code: None,
            file_code: None,
            text_code: None,
        };
        (status, Json(body)).into_response()
    }
}

/// Fields of an upload form, from either form encoding.
#[derive(Debug, Default)]
struct FormInput {
    text_sharing: Option<String>,
    shared_text: Option<String>,
    file: Option<UploadedFile>,
}

#[derive(Debug)]
struct UploadedFile {
    /// Name as sent by the client, possibly with a path.
    name: String,
    bytes: axum::body::Bytes,
}

impl UploadedFile {
    /// Browsers send an empty, nameless part when no file was picked.
    fn is_blank(&self) -> bool {
        self.name.is_empty() && self.bytes.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct UrlEncodedForm {
    #[serde(rename = "textSharing")]
    text_sharing: Option<String>,
    #[serde(rename = "sharedText")]
    shared_text: Option<String>,
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim_start().to_ascii_lowercase().starts_with("multipart/form-data"))
}

async fn read_form(request: Request) -> Result<FormInput, Response> {
    if !is_multipart(request.headers()) {
        let Form(form) = Form::<UrlEncodedForm>::from_request(request, &())
            .await
            .map_err(|rejection| UploadResponse::error(rejection.status(), rejection.body_text()))?;
        return Ok(FormInput {
            text_sharing: form.text_sharing,
            shared_text: form.shared_text,
            file: None,
        });
    }

    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|rejection| UploadResponse::error(rejection.status(), rejection.body_text()))?;

    let mut form = FormInput::default();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(UploadResponse::error(e.status(), e.body_text())),
        };

        let field_name = field.name().map(str::to_string);
        let read = match field_name.as_deref() {
            Some("file") => {
                let name = field.file_name().unwrap_or_default().to_string();
                field.bytes().await.map(|bytes| {
                    form.file = Some(UploadedFile { name, bytes });
                })
            }
            Some("textSharing") => field.text().await.map(|v| form.text_sharing = Some(v)),
            Some("sharedText") => field.text().await.map(|v| form.shared_text = Some(v)),
            _ => Ok(()),
        };
        read.map_err(|e| UploadResponse::error(e.status(), e.body_text()))?;
    }
    Ok(form)
}

/// Upload a file (`file` part) or share text (`textSharing=true` + `sharedText`).
#[tracing::instrument(name = "http.upload", skip(state, request))]
async fn upload(State(state): State<WebState>, request: Request) -> Response {
    let form = match read_form(request).await {
        Ok(form) => form,
        Err(response) => return response,
    };

    if form.text_sharing.as_deref() == Some("true") {
        return store_text(&state, form.shared_text).await;
    }

    match form.file {
        Some(file) if !file.is_blank() => store_file(&state, file).await,
        _ => UploadResponse::error(StatusCode::BAD_REQUEST, "No file uploaded."),
    }
}

/// Share text (`sharedText`).
#[tracing::instrument(name = "http.share", skip(state, request))]
async fn share(State(state): State<WebState>, request: Request) -> Response {
    match read_form(request).await {
        Ok(form) => store_text(&state, form.shared_text).await,
        Err(response) => response,
    }
}

async fn store_text(state: &WebState, shared_text: Option<String>) -> Response {
    let Some(text) = shared_text.filter(|t| !t.is_empty()) else {
        return UploadResponse::error(StatusCode::BAD_REQUEST, "No text shared.");
    };

    let store = state.store.clone();
    match blocking(move || store.put_text(&text)).await {
        Some(Ok(code)) => {
            tracing::info!(code = %code, "text shared");
            UploadResponse::stored(ArtifactKind::Text, &code)
        }
        Some(Err(e)) => store_error(e),
        None => UploadResponse::error(StatusCode::INTERNAL_SERVER_ERROR, "Upload failed."),
    }
}

async fn store_file(state: &WebState, file: UploadedFile) -> Response {
    let name = client_file_name(&file.name).to_string();
    let size = file.bytes.len();

    let store = state.store.clone();
    let stored_name = name.clone();
    match blocking(move || store.put_file(&stored_name, &file.bytes)).await {
        Some(Ok(code)) => {
            tracing::info!(code = %code, size, "file uploaded: {}", name);
            UploadResponse::stored(ArtifactKind::File, &code)
        }
        Some(Err(e)) => store_error(e),
        None => UploadResponse::error(StatusCode::INTERNAL_SERVER_ERROR, "Upload failed."),
    }
}

fn store_error(e: ShareError) -> Response {
    match e {
        ShareError::Validation(message) => {
            tracing::debug!("upload rejected: {}", message);
            UploadResponse::error(StatusCode::BAD_REQUEST, message)
        }
        ShareError::ReadOnly => {
            UploadResponse::error(StatusCode::SERVICE_UNAVAILABLE, "Uploads are disabled.")
        }
        other => {
            tracing::error!("upload failed: {}", other);
            UploadResponse::error(StatusCode::INTERNAL_SERVER_ERROR, "Upload failed.")
        }
    }
}

/// Last path component of a client-supplied file name.
///
/// Browsers on some platforms send `C:\Users\me\report.pdf`; only
/// `report.pdf` is kept.
fn client_file_name(raw: &str) -> &str {
    raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim()
}

#[derive(Debug, Deserialize)]
struct RetrieveQuery {
    #[serde(rename = "fileCode")]
    file_code: Option<String>,
}

/// Download the artifact behind `?fileCode=`.
#[tracing::instrument(name = "http.retrieve", skip(state))]
async fn retrieve(State(state): State<WebState>, Query(query): Query<RetrieveQuery>) -> Response {
    let Some(raw) = query.file_code.filter(|c| !c.trim().is_empty()) else {
        return plain(StatusCode::BAD_REQUEST, "No file code provided.");
    };

    let code: ShareCode = match raw.trim().parse() {
        Ok(code) => code,
        Err(e) => {
            tracing::debug!("malformed code {:?}: {}", raw, e);
            return plain(StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE);
        }
    };

    let store = state.store.clone();
    let lookup = code.clone();
    let reference = match blocking(move || store.locate(&lookup)).await {
        Some(Ok(Some(reference))) => reference,
        Some(Ok(None)) => return plain(StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE),
        Some(Err(e)) => {
            tracing::error!(code = %code, "lookup failed: {}", e);
            return plain(StatusCode::INTERNAL_SERVER_ERROR, UNAVAILABLE_MESSAGE);
        }
        None => return plain(StatusCode::INTERNAL_SERVER_ERROR, UNAVAILABLE_MESSAGE),
    };

    match reference.kind {
        ArtifactKind::Text => serve_text(&state, code).await,
        ArtifactKind::File => serve_file(reference).await,
    }
}

async fn serve_text(state: &WebState, code: ShareCode) -> Response {
    let store = state.store.clone();
    let lookup = code.clone();
    let text = match blocking(move || store.resolve(&lookup)).await {
        Some(Ok(Some(Artifact::Text(text)))) => text,
        Some(Ok(Some(Artifact::File(_)))) | Some(Ok(None)) => {
            return plain(StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE)
        }
        Some(Err(e)) => {
            tracing::error!(code = %code, "reading text failed: {}", e);
            return plain(StatusCode::INTERNAL_SERVER_ERROR, UNAVAILABLE_MESSAGE);
        }
        None => return plain(StatusCode::INTERNAL_SERVER_ERROR, UNAVAILABLE_MESSAGE),
    };

    let file_name = format!("{}.txt", text.code);
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::CONTENT_DISPOSITION, content_disposition(&file_name))
        .body(Body::from(line_terminated(&text.content)))
        .unwrap_or_else(|e| build_failed(e))
}

async fn serve_file(reference: ArtifactRef) -> Response {
    let file = match tokio::fs::File::open(&reference.path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(code = %reference.code, "file vanished before download");
            return plain(StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE);
        }
        Err(e) => {
            tracing::error!(
                code = %reference.code,
                "opening {} failed: {}",
                reference.path.display(),
                e
            );
            return plain(StatusCode::INTERNAL_SERVER_ERROR, UNAVAILABLE_MESSAGE);
        }
    };

    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, reference.mime_hint.as_str())
        .header(header::CONTENT_LENGTH, reference.size_bytes)
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition(&reference.display_name),
        )
        .body(body)
        .unwrap_or_else(|e| build_failed(e))
}

/// Report the visitor count, counting this session if it is new.
#[tracing::instrument(name = "http.visit", skip(state, headers))]
async fn visitor_count(State(state): State<WebState>, headers: HeaderMap) -> Response {
    let presented = session::token_from_headers(&headers);
    let visit = state.sessions.visit(presented.as_deref());

    let counter = state.counter.clone();
    let is_new = visit.is_new;
    let count = match blocking(move || {
        if is_new {
            counter.increment_and_persist()
        } else {
            counter.current_value()
        }
    })
    .await
    {
        Some(Ok(count)) => count,
        failed => {
            if let Some(Err(e)) = failed {
                tracing::error!("visitor counter failed: {}", e);
            }
            // Let the next request try to count this visitor again
            if visit.is_new {
                state.sessions.forget(&visit.token);
            }
            return plain(StatusCode::INTERNAL_SERVER_ERROR, "Visitor count unavailable.");
        }
    };

    let mut response = plain(StatusCode::OK, count.to_string());
    if visit.is_new {
        if let Some(cookie) = session::set_cookie(&visit.token) {
            response.headers_mut().insert(header::SET_COOKIE, cookie);
        }
    }
    response
}

/// Run store I/O on the blocking pool. `None` if the task panicked.
async fn blocking<T, F>(f: F) -> Option<sharestore::Result<T>>
where
    F: FnOnce() -> sharestore::Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => Some(result),
        Err(e) => {
            tracing::error!("store task failed: {}", e);
            None
        }
    }
}

fn plain(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        message.into(),
    )
        .into_response()
}

fn build_failed(e: axum::http::Error) -> Response {
    tracing::error!("Failed to build response: {}", e);
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

/// Text as written line by line: every line ends in `\n`, including the
/// last, and `\r\n` or `\r` breaks become `\n`.
pub fn line_terminated(content: &str) -> String {
    let mut out = String::with_capacity(content.len() + 1);
    let mut rest = content;
    while !rest.is_empty() {
        match rest.find(['\r', '\n']) {
            Some(i) => {
                out.push_str(&rest[..i]);
                out.push('\n');
                let skip = if rest[i..].starts_with("\r\n") { 2 } else { 1 };
                rest = &rest[i + skip..];
            }
            None => {
                out.push_str(rest);
                out.push('\n');
                break;
            }
        }
    }
    out
}

/// `attachment` disposition suggesting `file_name`.
///
/// Names that are not plain printable ASCII get an ASCII fallback plus an
/// RFC 5987 `filename*` parameter.
pub fn content_disposition(file_name: &str) -> HeaderValue {
    let fallback: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c == ' ' || c.is_ascii_graphic() => c,
            _ => '_',
        })
        .collect();

    let mut value = format!("attachment; filename=\"{}\"", fallback);
    if fallback != file_name {
        value.push_str("; filename*=UTF-8''");
        for byte in file_name.bytes() {
            if byte.is_ascii_alphanumeric() || b"-._~".contains(&byte) {
                value.push(byte as char);
            } else {
                let _ = write!(value, "%{:02X}", byte);
            }
        }
    }

    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::Request;
    use sharestore::StoreConfig;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "sharebox-test-boundary";

    fn setup_test_state() -> (WebState, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = StoreConfig::with_base_path(temp_dir.path());
        let store = FileStore::new(config.clone()).unwrap();
        let counter = CounterStore::new(&config);
        (WebState::new(Arc::new(store), Arc::new(counter)), temp_dir)
    }

    /// Multipart body with plain text fields.
    fn fields_form(fields: &[(&str, &str)]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\n\
                     Content-Disposition: form-data; name=\"{name}\"\r\n\r\n\
                     {value}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    /// Multipart body with a single `file` part.
    fn file_form(file_name: &str, bytes: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn multipart_request(uri: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn form_request(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    async fn text_body(response: Response) -> String {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[test]
    fn test_line_terminated() {
        assert_eq!(line_terminated("hello world"), "hello world\n");
        assert_eq!(line_terminated("a\nb"), "a\nb\n");
        assert_eq!(line_terminated("a\n"), "a\n");
        assert_eq!(line_terminated("a\r\nb\rc"), "a\nb\nc\n");
        assert_eq!(line_terminated("a\n\nb"), "a\n\nb\n");
        assert_eq!(line_terminated(""), "");
    }

    #[test]
    fn test_client_file_name() {
        assert_eq!(client_file_name("report.pdf"), "report.pdf");
        assert_eq!(client_file_name("C:\\Users\\me\\report.pdf"), "report.pdf");
        assert_eq!(client_file_name("../../etc/passwd"), "passwd");
        assert_eq!(client_file_name("dir/"), "");
    }

    #[test]
    fn test_content_disposition() {
        assert_eq!(
            content_disposition("report.pdf"),
            "attachment; filename=\"report.pdf\""
        );
        assert_eq!(
            content_disposition("my \"best\".txt"),
            "attachment; filename=\"my _best_.txt\"; filename*=UTF-8''my%20%22best%22.txt"
        );
        assert_eq!(
            content_disposition("résumé.pdf"),
            "attachment; filename=\"r_sum_.pdf\"; filename*=UTF-8''r%C3%A9sum%C3%A9.pdf"
        );
    }

    #[tokio::test]
    async fn test_root_and_health() {
        let (state, _temp_dir) = setup_test_state();
        let app = router(state);

        let response = app.clone().oneshot(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["name"], "sharebox");
        assert_eq!(json["links"]["health"], "/health");

        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["artifacts"], 0);
        assert!(json["uptime_secs"].is_u64());
    }

    #[tokio::test]
    async fn test_share_text_and_retrieve() {
        let (state, _temp_dir) = setup_test_state();
        let app = router(state);

        let response = app
            .clone()
            .oneshot(form_request("/share", "sharedText=hello+world"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "success");
        assert_eq!(json["message"], "Text shared successfully.");
        let code = json["code"].as_str().unwrap().to_string();
        assert_eq!(json["textCode"], code.as_str());
        assert!(json.get("fileCode").is_none());

        let response = app
            .oneshot(get(&format!("/retrieve?fileCode={}", code)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
        assert_eq!(
            response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
            format!("attachment; filename=\"{}.txt\"", code).as_str()
        );
        assert_eq!(text_body(response).await, "hello world\n");
    }

    #[tokio::test]
    async fn test_share_accepts_multipart() {
        let (state, _temp_dir) = setup_test_state();
        let app = router(state);

        let body = fields_form(&[("sharedText", "from a browser form")]);
        let response = app.oneshot(multipart_request("/share", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "success");
    }

    #[tokio::test]
    async fn test_share_empty_text_rejected() {
        let (state, _temp_dir) = setup_test_state();
        let app = router(state.clone());

        let response = app.clone().oneshot(form_request("/share", "sharedText=")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], "No text shared.");
        assert!(json.get("code").is_none());

        let response = app.oneshot(form_request("/share", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(state.store.is_empty());
    }

    #[tokio::test]
    async fn test_upload_file_and_retrieve() {
        let (state, _temp_dir) = setup_test_state();
        let app = router(state);

        let bytes: &[u8] = b"%PDF-1.7\n\x00\x01binary";
        let body = file_form("report.pdf", bytes);
        let response = app
            .clone()
            .oneshot(multipart_request("/upload", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["message"], "File uploaded successfully.");
        let code = json["fileCode"].as_str().unwrap().to_string();
        assert_eq!(json["code"], code.as_str());

        let response = app
            .oneshot(get(&format!("/retrieve?fileCode={}", code)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/pdf"
        );
        assert_eq!(
            response.headers().get(header::CONTENT_LENGTH).unwrap(),
            bytes.len().to_string().as_str()
        );
        assert_eq!(
            response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
            "attachment; filename=\"report.pdf\""
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], bytes);
    }

    #[tokio::test]
    async fn test_upload_strips_client_path() {
        let (state, _temp_dir) = setup_test_state();
        let app = router(state.clone());

        let body = file_form("C:\\Users\\me\\notes.txt", b"notes");
        let response = app.oneshot(multipart_request("/upload", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let code: ShareCode = json_body(response).await["code"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();
        let reference = state.store.locate(&code).unwrap().unwrap();
        assert_eq!(reference.display_name, "notes.txt");
    }

    #[tokio::test]
    async fn test_upload_text_sharing_mode() {
        let (state, _temp_dir) = setup_test_state();
        let app = router(state);

        let body = fields_form(&[("textSharing", "true"), ("sharedText", "line one")]);
        let response = app.oneshot(multipart_request("/upload", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["message"], "Text shared successfully.");
        assert!(json["textCode"].is_string());
    }

    #[tokio::test]
    async fn test_upload_without_file() {
        let (state, _temp_dir) = setup_test_state();
        let app = router(state);

        let body = fields_form(&[("comment", "nothing attached")]);
        let response = app
            .clone()
            .oneshot(multipart_request("/upload", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["message"], "No file uploaded.");

        // An empty file input still sends a nameless part
        let body = file_form("", b"");
        let response = app.oneshot(multipart_request("/upload", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_rejects_disallowed_extension() {
        let temp_dir = TempDir::new().unwrap();
        let config = StoreConfig::with_base_path(temp_dir.path())
            .with_allowed_extensions(["txt", "pdf"]);
        let store = FileStore::new(config.clone()).unwrap();
        let state = WebState::new(Arc::new(store), Arc::new(CounterStore::new(&config)));
        let app = router(state);

        let body = file_form("tool.exe", b"MZ");
        let response = app.oneshot(multipart_request("/upload", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["status"], "error");
        assert!(json["message"].as_str().unwrap().contains("not allowed"));
    }

    #[tokio::test]
    async fn test_upload_too_large() {
        let (state, _temp_dir) = setup_test_state();
        let app = router(state.with_max_upload_bytes(1024));

        let body = file_form("big.bin", &[7u8; 4096]);
        let response = app.oneshot(multipart_request("/upload", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_upload_read_only_store() {
        let temp_dir = TempDir::new().unwrap();
        let config = StoreConfig::read_only(temp_dir.path());
        let store = FileStore::new(config.clone()).unwrap();
        let state = WebState::new(Arc::new(store), Arc::new(CounterStore::new(&config)));
        let app = router(state);

        let response = app
            .oneshot(form_request("/share", "sharedText=hi"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_upload_storage_failure() {
        let (state, temp_dir) = setup_test_state();
        let app = router(state.clone());

        let staging = temp_dir.path().join("staging");
        std::fs::remove_dir_all(&staging).unwrap();
        std::fs::write(&staging, b"not a directory").unwrap();

        let response = app
            .clone()
            .oneshot(form_request("/share", "sharedText=lost"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = json_body(response).await;
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], "Upload failed.");
        assert!(json.get("code").is_none());

        let body = file_form("lost.bin", b"lost");
        let response = app.oneshot(multipart_request("/upload", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(state.store.is_empty());
    }

    #[tokio::test]
    async fn test_retrieve_not_found() {
        let (state, _temp_dir) = setup_test_state();
        let app = router(state);

        for uri in ["/retrieve?fileCode=12345678", "/retrieve?fileCode=abc"] {
            let response = app.clone().oneshot(get(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            assert_eq!(text_body(response).await, NOT_FOUND_MESSAGE);
        }

        let response = app.oneshot(get("/retrieve")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_visitor_count_once_per_session() {
        let (state, _temp_dir) = setup_test_state();
        let app = router(state);

        let response = app.clone().oneshot(get("/visitor-count")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert_eq!(text_body(response).await, "1");

        let token = cookie.split(';').next().unwrap().to_string();
        let again = Request::builder()
            .uri("/visitor-count")
            .header(header::COOKIE, token)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(again).await.unwrap();
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        assert_eq!(text_body(response).await, "1");

        let response = app.oneshot(get("/visitor-count")).await.unwrap();
        assert_eq!(text_body(response).await, "2");
    }

    #[tokio::test]
    async fn test_visitor_count_corrupt_counter() {
        let (state, temp_dir) = setup_test_state();
        std::fs::write(temp_dir.path().join("counter.txt"), "garbage").unwrap();
        let app = router(state.clone());

        let response = app.oneshot(get("/visitor-count")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(state.sessions.is_empty());
    }
}
