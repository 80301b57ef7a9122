//! `POST /pubaccess/pubfile/*sitepath` - upload a pubfile, returning the
//! publink addressing it.

use axum::extract::multipart::Multipart;
use axum::extract::{FromRequest, Path, Query, Request, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use http::{header, HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};

use crate::http::{error_response, parse_disable_force, MAX_UPLOAD_SIZE_BYTES};
use crate::state::ServiceState;
use crate::upload::{self, UploadContent, UploadQuery};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub publink: String,
    pub merkleroot: String,
    pub bitfield: u16,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Path(site_path): Path<String>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    request: Request,
) -> Response {
    let disable_force = match parse_disable_force(&headers) {
        Ok(value) => value,
        Err(response) => return response,
    };
    let params = match upload::parse_params(&site_path, &query, disable_force) {
        Ok(params) => params,
        Err(err) => return err.into_response(),
    };

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let content = if params.convert_path.is_some() {
        // Conversions source their bytes from the store; the body is unused.
        UploadContent::Raw { data: Bytes::new() }
    } else if content_type.starts_with("multipart/form-data") {
        let mut multipart = match Multipart::from_request(request, &()).await {
            Ok(multipart) => multipart,
            Err(err) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    format!("failed parsing multipart request: {err}"),
                )
            }
        };
        match upload::read_multipart(&mut multipart).await {
            Ok(content) => content,
            Err(err) => return err.into_response(),
        }
    } else {
        match axum::body::to_bytes(request.into_body(), MAX_UPLOAD_SIZE_BYTES).await {
            Ok(data) => UploadContent::Raw { data },
            Err(err) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    format!("failed reading request body: {err}"),
                )
            }
        }
    };

    match upload::upload_pubfile(&state, params, content).await {
        Ok(publink) => (
            StatusCode::OK,
            Json(UploadResponse {
                publink: publink.to_string(),
                merkleroot: hex::encode(publink.merkle_root()),
                bitfield: publink.bitfield(),
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}
