//! End-to-end tests through the HTTP router.
//!
//! These tests verify:
//! - Shared text comes back line-terminated as a .txt download
//! - Uploaded files come back byte-for-byte under their original name
//! - Unknown codes are a plain not-found, never a crash
//! - Visitors are counted once per session
//! - Everything survives a restart on the same data directory

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use shareconf::ShareConfig;
use sharebox::{open_state, web};
use std::path::Path;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "integration-boundary";

fn config_at(path: &Path) -> ShareConfig {
    let mut config = ShareConfig::default();
    config.paths.data_dir = path.to_path_buf();
    config
}

/// Helper to start an app on a fresh data directory.
fn test_app() -> Result<(Router, TempDir)> {
    let temp_dir = TempDir::new()?;
    let app = app_at(temp_dir.path())?;
    Ok((app, temp_dir))
}

/// Helper to open an app on an existing data directory (for restart tests).
fn app_at(path: &Path) -> Result<Router> {
    Ok(web::router(open_state(&config_at(path))?))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn share_text(text: &str) -> Request<Body> {
    let encoded: String = text
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' => (b as char).to_string(),
            b' ' => "+".to_string(),
            _ => format!("%{:02X}", b),
        })
        .collect();
    Request::builder()
        .method("POST")
        .uri("/share")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("sharedText={}", encoded)))
        .unwrap()
}

fn upload_file(file_name: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn visit(cookie: Option<&str>) -> Request<Body> {
    let mut request = Request::builder().uri("/visitor-count");
    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, cookie);
    }
    request.body(Body::empty()).unwrap()
}

async fn body_bytes(response: Response<Body>) -> Result<Vec<u8>> {
    Ok(to_bytes(response.into_body(), usize::MAX).await?.to_vec())
}

/// Send a share/upload request and return the issued code.
async fn issued_code(app: &Router, request: Request<Body>) -> Result<String> {
    let response = app.clone().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await?)?;
    assert_eq!(json["status"], "success");

    let code = json["code"].as_str().expect("code in response").to_string();
    assert_eq!(code.len(), 8);
    assert!(code.bytes().all(|b| b.is_ascii_digit()));
    assert_ne!(code.as_bytes()[0], b'0');
    Ok(code)
}

async fn retrieve(app: &Router, code: &str) -> Result<Response<Body>> {
    Ok(app
        .clone()
        .oneshot(get(&format!("/retrieve?fileCode={}", code)))
        .await?)
}

/// Returns the counter value and the session cookie, if one was issued.
async fn visitor_count(app: &Router, cookie: Option<&str>) -> Result<(u64, Option<String>)> {
    let response = app.clone().oneshot(visit(cookie)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_string);
    let count = String::from_utf8(body_bytes(response).await?)?.parse()?;
    Ok((count, cookie))
}

#[tokio::test]
async fn test_shared_text_is_retrieved_line_terminated() -> Result<()> {
    let (app, _temp) = test_app()?;

    let code = issued_code(&app, share_text("hello world")).await?;

    let response = retrieve(&app, &code).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/plain; charset=utf-8"
    );
    assert_eq!(body_bytes(response).await?, b"hello world\n");
    Ok(())
}

#[tokio::test]
async fn test_multiline_text_keeps_its_lines() -> Result<()> {
    let (app, _temp) = test_app()?;

    let code = issued_code(&app, share_text("first\r\nsecond\nthird")).await?;

    let response = retrieve(&app, &code).await?;
    assert_eq!(body_bytes(response).await?, b"first\nsecond\nthird\n");
    Ok(())
}

#[tokio::test]
async fn test_uploaded_file_is_retrieved_verbatim() -> Result<()> {
    let (app, _temp) = test_app()?;

    let pdf: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
    let code = issued_code(&app, upload_file("report.pdf", &pdf)).await?;

    let response = retrieve(&app, &code).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
        "attachment; filename=\"report.pdf\""
    );
    assert_eq!(body_bytes(response).await?, pdf);
    Ok(())
}

#[tokio::test]
async fn test_unknown_code_is_not_found() -> Result<()> {
    let (app, _temp) = test_app()?;
    issued_code(&app, share_text("something else")).await?;

    // The store never hands out codes below 10000000
    for code in ["00000000", "99999999x", "1234"] {
        let response = retrieve(&app, code).await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_bytes(response).await?, b"File or text not found.");
    }
    Ok(())
}

#[tokio::test]
async fn test_visitors_counted_once_per_session() -> Result<()> {
    let (app, _temp) = test_app()?;

    let (first, alice) = visitor_count(&app, None).await?;
    let (second, bob) = visitor_count(&app, None).await?;
    assert_eq!(first, 1);
    assert_eq!(second, 2);
    assert!(alice.is_some());
    assert_ne!(alice, bob);

    let (again, cookie) = visitor_count(&app, alice.as_deref()).await?;
    assert_eq!(again, 2);
    assert!(cookie.is_none(), "known sessions get no new cookie");
    Ok(())
}

#[tokio::test]
async fn test_state_survives_restart() -> Result<()> {
    let temp = TempDir::new()?;

    let (text_code, file_code) = {
        let app = app_at(temp.path())?;
        let text_code = issued_code(&app, share_text("still here")).await?;
        let file_code = issued_code(&app, upload_file("photo.png", b"\x89PNG")).await?;
        visitor_count(&app, None).await?;
        visitor_count(&app, None).await?;
        (text_code, file_code)
    };

    let app = app_at(temp.path())?;

    let response = retrieve(&app, &text_code).await?;
    assert_eq!(body_bytes(response).await?, b"still here\n");

    let response = retrieve(&app, &file_code).await?;
    assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "image/png");
    assert_eq!(body_bytes(response).await?, b"\x89PNG");

    // Sessions are in memory, so a restarted server sees a new visitor
    let (count, _) = visitor_count(&app, None).await?;
    assert_eq!(count, 3);

    let health = app.clone().oneshot(get("/health")).await?;
    let json: serde_json::Value = serde_json::from_slice(&body_bytes(health).await?)?;
    assert_eq!(json["artifacts"], 2);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_uploads_get_distinct_codes() -> Result<()> {
    let (app, _temp) = test_app()?;

    let mut handles = Vec::new();
    for i in 0..32 {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            issued_code(&app, share_text(&format!("note {}", i))).await
        }));
    }

    let mut codes = Vec::new();
    for handle in handles {
        codes.push(handle.await??);
    }
    codes.sort();
    codes.dedup();
    assert_eq!(codes.len(), 32);
    Ok(())
}
