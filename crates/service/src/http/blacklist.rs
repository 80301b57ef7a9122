//! `GET`/`POST /pubaccess/blacklist` - snapshot and batch-update the
//! blacklist of hashed merkle roots.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::{Deserialize, Serialize};

use common::prelude::Publink;

use crate::http::error::{error_response, policy_error_response};
use crate::state::ServiceState;

#[derive(Debug, Serialize)]
pub struct BlacklistResponse {
    /// Hex-encoded hashes of the blacklisted merkle roots.
    pub blacklist: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BlacklistUpdateRequest {
    #[serde(default)]
    pub add: Vec<String>,
    #[serde(default)]
    pub remove: Vec<String>,
}

pub async fn handler_get(State(state): State<ServiceState>) -> Json<BlacklistResponse> {
    let blacklist = state
        .policy()
        .blacklist_snapshot()
        .iter()
        .map(hex::encode)
        .collect();
    Json(BlacklistResponse { blacklist })
}

pub async fn handler_post(
    State(state): State<ServiceState>,
    payload: Result<Json<BlacklistUpdateRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(err) => {
            return error_response(StatusCode::BAD_REQUEST, format!("invalid parameters: {err}"))
        }
    };
    if request.add.is_empty() && request.remove.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "no publinks submitted");
    }

    let additions = match parse_publinks(&request.add) {
        Ok(links) => links,
        Err(response) => return response,
    };
    let removals = match parse_publinks(&request.remove) {
        Ok(links) => links,
        Err(response) => return response,
    };

    match state.policy().update_blacklist(&additions, &removals) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => policy_error_response(err),
    }
}

fn parse_publinks(raw: &[String]) -> Result<Vec<Publink>, Response> {
    raw.iter()
        .map(|s| {
            s.parse().map_err(|e| {
                error_response(
                    StatusCode::BAD_REQUEST,
                    format!("error parsing publink: {e}"),
                )
            })
        })
        .collect()
}
