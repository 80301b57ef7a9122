//! `POST /pubaccess/pin/:publink` - re-persist a remote publink locally.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use http::{HeaderMap, StatusCode};
use serde::Deserialize;

use crate::http::{parse_bool_param, parse_disable_force, parse_timeout};
use crate::pin::{self, PinRequest};
use crate::state::ServiceState;

#[derive(Debug, Default, Deserialize)]
pub struct PinQuery {
    #[serde(default)]
    pub sitepath: Option<String>,
    #[serde(default)]
    pub root: Option<String>,
    #[serde(default)]
    pub force: Option<String>,
    #[serde(default)]
    pub basechunkredundancy: Option<String>,
    #[serde(default)]
    pub timeout: Option<String>,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Path(publink): Path<String>,
    Query(query): Query<PinQuery>,
    headers: HeaderMap,
) -> Response {
    let request = match build_request(publink, &query, &headers) {
        Ok(request) => request,
        Err(response) => return response,
    };
    match pin::pin(&state, request).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

fn build_request(
    publink: String,
    query: &PinQuery,
    headers: &HeaderMap,
) -> Result<PinRequest, Response> {
    let disable_force = parse_disable_force(headers)?;
    let root = parse_bool_param("root", query.root.as_deref())?;
    let force = parse_bool_param("force", query.force.as_deref())?;
    let base_chunk_redundancy = match query.basechunkredundancy.as_deref() {
        None | Some("") => 0,
        Some(raw) => raw.parse().map_err(|_| {
            crate::http::error_response(
                StatusCode::BAD_REQUEST,
                format!("unable to parse basechunkredundancy: {raw:?}"),
            )
        })?,
    };
    let timeout = parse_timeout(query.timeout.as_deref())?;
    Ok(PinRequest {
        publink,
        site_path: query.sitepath.clone().unwrap_or_default(),
        root,
        force,
        base_chunk_redundancy,
        timeout,
        disable_force,
    })
}
