//! `GET`/`HEAD /pubaccess/publink/*publink` - stream the content behind a
//! publink.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use http::Method;
use serde::Deserialize;

use common::prelude::PubfileFormat;

use crate::http::{error_response, parse_bool_param, parse_timeout};
use crate::retrieval::{self, RetrievalRequest};
use crate::state::ServiceState;

#[derive(Debug, Default, Deserialize)]
pub struct PublinkQuery {
    #[serde(default)]
    pub attachment: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub timeout: Option<String>,
}

pub async fn handler(
    State(state): State<ServiceState>,
    method: Method,
    Path(publink_path): Path<String>,
    Query(query): Query<PublinkQuery>,
) -> Response {
    let request = match build_request(&publink_path, &query, method == Method::HEAD) {
        Ok(request) => request,
        Err(response) => {
            state.stats().observe_error();
            return response;
        }
    };
    match retrieval::serve(&state, request).await {
        Ok(response) => response,
        Err(err) => {
            tracing::debug!(error = %err, "publink retrieval failed");
            state.stats().observe_error();
            err.into_response()
        }
    }
}

fn build_request(
    publink_path: &str,
    query: &PublinkQuery,
    head: bool,
) -> Result<RetrievalRequest, Response> {
    let attachment = parse_bool_param("attachment", query.attachment.as_deref())?;
    let format = PubfileFormat::from_query(query.format.as_deref())
        .map_err(|e| error_response(http::StatusCode::BAD_REQUEST, e.to_string()))?;
    let timeout = parse_timeout(query.timeout.as_deref())?;
    Ok(RetrievalRequest {
        publink_path: publink_path.to_string(),
        attachment,
        format,
        timeout,
        head,
    })
}
