//! # Retrieval engine
//!
//! Executes a GET/HEAD for a publink: policy gate, deadline-bound fetch
//! from the backend, metadata validation, default-path and inner-path
//! resolution, archive promotion, header assembly, and body streaming.

pub mod body;
pub mod default_path;
pub mod negotiate;

use std::io::{Seek, SeekFrom};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::response::Response;
use http::{header, StatusCode};

use common::prelude::{PublinkError, PubfileFormat};
use common::publink::parse_request;
use common::pubfile::MetadataError;

use crate::backend::BackendError;
use crate::state::ServiceState;
use crate::streamer::LimitStreamer;

use body::BodyContext;
use default_path::DefaultPathOutcome;

/// Timeout applied when the request does not carry one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on the per-request timeout. Larger values fail fast
/// instead of letting a caller park tasks indefinitely.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(900);

/// Response header carrying the JSON-encoded pubfile metadata.
pub const PUBFILE_METADATA_HEADER: &str = "Pubfile-Metadata";

#[derive(Debug)]
pub struct RetrievalRequest {
    /// The raw route capture: publink, optional inner path, no query.
    pub publink_path: String,
    pub attachment: bool,
    pub format: PubfileFormat,
    pub timeout: Duration,
    pub head: bool,
}

pub async fn serve(
    state: &ServiceState,
    request: RetrievalRequest,
) -> Result<Response, RetrievalError> {
    let started = Instant::now();

    let (publink, no_query, inner_path) = parse_request(&request.publink_path)?;

    // Blacklisted roots are indistinguishable from missing ones on the
    // retrieval path.
    if state.policy().is_blacklisted(&publink) {
        return Err(RetrievalError::NotFound(
            "failed to fetch publink".to_string(),
        ));
    }

    let deadline = started + request.timeout;
    let (mut metadata, mut streamer) =
        match tokio::time::timeout(request.timeout, state.backend().download(&publink, request.timeout))
            .await
        {
            Err(_) => return Err(RetrievalError::Timeout),
            Ok(Err(BackendError::NotFound)) => {
                return Err(RetrievalError::NotFound(
                    "failed to fetch publink".to_string(),
                ))
            }
            Ok(Err(BackendError::Timeout)) => return Err(RetrievalError::Timeout),
            Ok(Err(err)) => return Err(RetrievalError::Backend(err.to_string())),
            Ok(Ok(found)) => found,
        };

    metadata.validate_serving()?;

    let mut is_subfile = false;
    let mut response_content_type = metadata.content_type();
    let mut serve_offset = 0u64;
    let mut serve_length = metadata.length;

    if inner_path == "/" && request.format == PubfileFormat::NotSpecified {
        match default_path::resolve(&metadata)? {
            DefaultPathOutcome::ServeWhole => {}
            DefaultPathOutcome::Subfile(default_path) => {
                // Relative links inside the served HTML must resolve
                // against the pubfile root, so a missing trailing slash
                // becomes a redirect that adds it.
                if !no_query.ends_with('/') {
                    state.stats().observe_error();
                    return Response::builder()
                        .status(StatusCode::TEMPORARY_REDIRECT)
                        .header(header::LOCATION, format!("{no_query}/"))
                        .body(Body::empty())
                        .map_err(|e| RetrievalError::Internal(e.to_string()));
                }
                let (scoped, is_file, offset, size) = metadata.for_path(&default_path);
                if scoped.subfiles.is_empty() {
                    return Err(RetrievalError::NotFound(format!(
                        "failed to download contents for default path: {default_path}"
                    )));
                }
                if !is_file {
                    return Err(RetrievalError::AmbiguousRequest(format!(
                        "default path {default_path} is a directory, please specify a specific path or a format"
                    )));
                }
                // The metadata header keeps describing the whole pubfile;
                // only the served byte range and content type narrow.
                is_subfile = true;
                response_content_type = scoped.content_type();
                serve_offset = offset;
                serve_length = size;
            }
        }
    }

    if inner_path != "/" {
        let (scoped, is_file, offset, size) = metadata.for_path(&inner_path);
        if scoped.subfiles.is_empty() {
            return Err(RetrievalError::NotFound(format!(
                "failed to download contents for path: {inner_path}"
            )));
        }
        metadata = scoped;
        is_subfile = is_file;
        response_content_type = metadata.content_type();
        serve_offset = offset;
        serve_length = size;
    }

    // Historic single-file publinks may lack a recorded length; learn it
    // from the streamer (compatibility fallback).
    if serve_length == 0 && metadata.subfiles.is_empty() && inner_path == "/" {
        serve_length = streamer
            .seek(SeekFrom::End(0))
            .and_then(|end| streamer.seek(SeekFrom::Start(0)).map(|_| end))
            .map_err(|e| RetrievalError::Internal(e.to_string()))?;
    }

    let negotiated = negotiate::negotiate(request.format, request.attachment, is_subfile, &metadata);

    let encoded_metadata = serde_json::to_string(&metadata)
        .map_err(|e| RetrievalError::Internal(e.to_string()))?;

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_DISPOSITION, negotiated.content_disposition)
        .header(PUBFILE_METADATA_HEADER, encoded_metadata);
    if let Some(archive_type) = negotiated.format.content_type() {
        builder = builder.header(header::CONTENT_TYPE, archive_type);
    } else if !response_content_type.is_empty() {
        builder = builder.header(header::CONTENT_TYPE, response_content_type);
    }
    if request.head || !negotiated.format.is_archive() {
        builder = builder.header(header::CONTENT_LENGTH, serve_length);
    }

    state.stats().observe_ttfb(started.elapsed());

    if request.head {
        return builder
            .body(Body::empty())
            .map_err(|e| RetrievalError::Internal(e.to_string()));
    }

    let sliced = Box::new(LimitStreamer::new(streamer, serve_offset, serve_length));
    let ctx = BodyContext {
        stats: state.stats_arc(),
        started,
        deadline,
        fetch_size: publink.fetch_size().ok(),
    };
    let response_body = match negotiated.format {
        PubfileFormat::NotSpecified | PubfileFormat::Concat => {
            body::stream_raw(sliced, serve_length, ctx)
        }
        PubfileFormat::Tar | PubfileFormat::TarGz | PubfileFormat::Zip => {
            body::stream_archive(negotiated.format, sliced, metadata, ctx)
        }
    };
    builder
        .body(response_body)
        .map_err(|e| RetrievalError::Internal(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("error parsing publink: {0}")]
    InvalidPublink(#[from] PublinkError),
    #[error("{0}")]
    InvalidMetadata(#[from] MetadataError),
    #[error("{0}")]
    AmbiguousRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("failed to fetch publink: request timed out")]
    Timeout,
    #[error("failed to fetch publink: {0}")]
    Backend(String),
    #[error("failed to serve pubfile: {0}")]
    Internal(String),
}
