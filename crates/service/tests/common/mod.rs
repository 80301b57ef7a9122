//! Shared test utilities for the portal integration tests
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::Router;
use bytes::Bytes;
use http::{Request, Response, StatusCode};
use tempfile::TempDir;
use tower::ServiceExt;

use service::backend::MemoryBackend;
use service::policy::AccessPolicy;
use service::ServiceState;

pub const BOUNDARY: &str = "pubaccess-test-boundary";

/// Set up a router + state over a fresh in-memory backend.
pub fn setup_test_env() -> (Router, ServiceState, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let (router, state) = setup_with_dir(temp_dir.path());
    (router, state, temp_dir)
}

/// Set up over an existing persist dir (for restart tests).
pub fn setup_with_dir(persist_dir: &Path) -> (Router, ServiceState) {
    let policy = AccessPolicy::load(persist_dir).unwrap();
    let state = ServiceState::from_parts(Arc::new(MemoryBackend::new()), policy);
    let router = service::http::router(state.clone());
    (router, state)
}

/// Set up with a handle on the concrete backend, for tests that seed
/// pubfiles directly.
pub fn setup_with_backend() -> (Router, Arc<MemoryBackend>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let policy = AccessPolicy::load(temp_dir.path()).unwrap();
    let backend = Arc::new(MemoryBackend::new());
    let state = ServiceState::from_parts(backend.clone(), policy);
    let router = service::http::router(state);
    (router, backend, temp_dir)
}

/// Set up over a backend that delays downloads, for deadline tests.
pub fn setup_slow_env(latency: Duration) -> (Router, ServiceState, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let policy = AccessPolicy::load(temp_dir.path()).unwrap();
    let state = ServiceState::from_parts(Arc::new(MemoryBackend::with_latency(latency)), policy);
    let router = service::http::router(state.clone());
    (router, state, temp_dir)
}

pub async fn send(router: &Router, request: Request<Body>) -> Response<axum::body::Body> {
    router.clone().oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<axum::body::Body>) -> Bytes {
    axum::body::to_bytes(response.into_body(), 64 * 1024 * 1024)
        .await
        .unwrap()
}

pub async fn get(router: &Router, uri: &str) -> Response<axum::body::Body> {
    send(
        router,
        Request::builder().uri(uri).body(Body::empty()).unwrap(),
    )
    .await
}

/// One part of a multipart upload body.
pub struct Part {
    pub filename: &'static str,
    pub content_type: &'static str,
    pub mode: Option<&'static str>,
    pub data: Vec<u8>,
}

impl Part {
    pub fn new(filename: &'static str, content_type: &'static str, data: Vec<u8>) -> Self {
        Self {
            filename,
            content_type,
            mode: None,
            data,
        }
    }
}

/// Assemble a multipart/form-data body the way upload clients send it.
pub fn multipart_body(parts: &[Part]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"files[]\"; filename=\"{}\"\r\n",
                part.filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n", part.content_type).as_bytes());
        if let Some(mode) = part.mode {
            body.extend_from_slice(format!("Mode: {mode}\r\n").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(&part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Upload a single-file pubfile through the router, returning the publink.
pub async fn upload_raw(
    router: &Router,
    site_path: &str,
    filename: &str,
    mode: &str,
    data: Vec<u8>,
) -> String {
    let uri = format!("/pubaccess/pubfile/{site_path}?filename={filename}&mode={mode}");
    let response = send(
        router,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/octet-stream")
            .body(Body::from(data))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    publink_from_upload(response).await
}

/// Upload a multipart pubfile; extra query parameters are appended as-is.
pub async fn upload_multipart(
    router: &Router,
    site_path: &str,
    extra_query: &str,
    parts: &[Part],
) -> Response<axum::body::Body> {
    let uri = if extra_query.is_empty() {
        format!("/pubaccess/pubfile/{site_path}")
    } else {
        format!("/pubaccess/pubfile/{site_path}?{extra_query}")
    };
    send(
        router,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap(),
    )
    .await
}

/// Pull the publink string out of an upload response.
pub async fn publink_from_upload(response: Response<axum::body::Body>) -> String {
    let body = body_bytes(response).await;
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    value["publink"].as_str().unwrap().to_string()
}

/// A well-formed publink for a root that no backend has content for.
pub fn publink_for_root(root: [u8; 32]) -> String {
    ::common::prelude::Publink::new_v1(root, 0, 4096)
        .unwrap()
        .to_string()
}

pub async fn error_message(response: Response<axum::body::Body>) -> String {
    let body = body_bytes(response).await;
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    value["message"].as_str().unwrap_or_default().to_string()
}
