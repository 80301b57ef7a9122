//! Integration tests for the pubfile upload route

mod common;

use http::StatusCode;

use common::{error_message, get, upload_multipart, Part};

fn html_parts() -> Vec<Part> {
    vec![
        Part::new("a.html", "text/html", b"<html>a</html>".to_vec()),
        Part::new("b.html", "text/html", b"<html>b</html>".to_vec()),
    ]
}

#[tokio::test]
async fn test_default_path_must_name_existing_subfile() {
    let (router, _, _temp) = common::setup_test_env();
    let response =
        upload_multipart(&router, "badsite", "defaultpath=/index.html", &html_parts()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let message = error_message(response).await;
    assert!(message.contains("no such path"), "unexpected message: {message}");
}

#[tokio::test]
async fn test_default_path_and_disable_are_exclusive() {
    let (router, _, _temp) = common::setup_test_env();
    let response = upload_multipart(
        &router,
        "conflict",
        "defaultpath=/a.html&disabledefaultpath=true",
        &html_parts(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_non_html_default_path_rejected() {
    let (router, _, _temp) = common::setup_test_env();
    let parts = vec![
        Part::new("notes.txt", "text/plain", b"notes".to_vec()),
        Part::new("more.txt", "text/plain", b"more".to_vec()),
    ];
    let response = upload_multipart(&router, "texts", "defaultpath=/notes.txt", &parts).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_dryrun_and_force_cannot_combine() {
    let (router, _, _temp) = common::setup_test_env();
    let response =
        upload_multipart(&router, "dryforce", "dryrun=true&force=true", &html_parts()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let message = error_message(response).await;
    assert!(message.contains("combined"), "unexpected message: {message}");
}

#[tokio::test]
async fn test_force_disabled_by_directive() {
    let (router, _, _temp) = common::setup_test_env();
    let body = common::multipart_body(&html_parts());
    let response = common::send(
        &router,
        http::Request::builder()
            .method("POST")
            .uri("/pubaccess/pubfile/forced?force=true")
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={}", common::BOUNDARY),
            )
            .header("Pubaccess-Disable-Force", "true")
            .body(axum::body::Body::from(body))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let message = error_message(response).await;
    assert!(message.contains("force"), "unexpected message: {message}");
}

#[tokio::test]
async fn test_key_name_and_id_are_exclusive() {
    let (router, _, _temp) = common::setup_test_env();
    let response = upload_multipart(
        &router,
        "keyed",
        "pubaccesskeyname=mykey&pubaccesskeyid=abcd",
        &html_parts(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_dryrun_returns_publink_without_storing() {
    let (router, _, _temp) = common::setup_test_env();
    let response = upload_multipart(&router, "ghost", "dryrun=true", &html_parts()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let publink = common::publink_from_upload(response).await;

    let response = get(&router, &format!("/pubaccess/publink/{publink}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_duplicate_site_path_needs_force() {
    let (router, _, _temp) = common::setup_test_env();
    let first = upload_multipart(&router, "dup", "", &html_parts()).await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = upload_multipart(&router, "dup", "", &html_parts()).await;
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
    let message = error_message(second).await;
    assert!(message.contains("already exists"), "unexpected message: {message}");

    let forced = upload_multipart(&router, "dup", "force=true", &html_parts()).await;
    assert_eq!(forced.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_single_subfile_filename_fallback() {
    let (router, _, _temp) = common::setup_test_env();
    let parts = vec![Part::new("only.dat", "application/octet-stream", vec![1, 2, 3])];
    let response = upload_multipart(&router, "solo", "", &parts).await;
    assert_eq!(response.status(), StatusCode::OK);
    let publink = common::publink_from_upload(response).await;

    // A single-subfile pubfile defaults to that subfile; the URL needs the
    // trailing slash after the redirect.
    let response = get(&router, &format!("/pubaccess/publink/{publink}/")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let metadata: serde_json::Value = serde_json::from_str(
        response.headers()["Pubfile-Metadata"].to_str().unwrap(),
    )
    .unwrap();
    assert_eq!(metadata["filename"], "only.dat");
}

#[tokio::test]
async fn test_subfile_mode_header_is_stored() {
    let (router, _, _temp) = common::setup_test_env();
    let mut part = Part::new("script.sh", "text/x-sh", b"#!/bin/sh\n".to_vec());
    part.mode = Some("755");
    let response = upload_multipart(&router, "modes", "", &[part]).await;
    assert_eq!(response.status(), StatusCode::OK);
    let publink = common::publink_from_upload(response).await;

    let response = get(&router, &format!("/pubaccess/publink/{publink}/script.sh")).await;
    let metadata: serde_json::Value = serde_json::from_str(
        response.headers()["Pubfile-Metadata"].to_str().unwrap(),
    )
    .unwrap();
    assert_eq!(metadata["subfiles"]["script.sh"]["mode"], 0o755);
}

#[tokio::test]
async fn test_upload_counts_into_stats() {
    let (router, _, _temp) = common::setup_test_env();
    upload_multipart(&router, "counted", "", &html_parts()).await;

    let response = get(&router, "/pubaccess/stats").await;
    assert_eq!(response.status(), StatusCode::OK);
    let stats: serde_json::Value =
        serde_json::from_slice(&common::body_bytes(response).await).unwrap();
    assert_eq!(stats["uploadstats"]["numfiles"], 1);
    assert_eq!(stats["performancestats"]["upload4mb"]["requests"], 1);
    assert!(stats["versioninfo"]["version"].as_str().is_some());
}
