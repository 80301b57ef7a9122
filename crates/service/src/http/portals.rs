//! `GET`/`POST /pubaccess/portals` - snapshot and batch-update the list
//! of known pubaccess portals.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::http::error::{error_response, policy_error_response};
use crate::policy::{NetAddress, Portal};
use crate::state::ServiceState;

#[derive(Debug, Serialize)]
pub struct PortalsResponse {
    pub portals: Vec<Portal>,
}

#[derive(Debug, Deserialize)]
pub struct PortalEntry {
    pub address: String,
    #[serde(default)]
    pub public: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct PortalsUpdateRequest {
    #[serde(default)]
    pub add: Vec<PortalEntry>,
    #[serde(default)]
    pub remove: Vec<String>,
}

pub async fn handler_get(State(state): State<ServiceState>) -> Json<PortalsResponse> {
    Json(PortalsResponse {
        portals: state.policy().portals_snapshot(),
    })
}

pub async fn handler_post(
    State(state): State<ServiceState>,
    payload: Result<Json<PortalsUpdateRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(err) => {
            return error_response(StatusCode::BAD_REQUEST, format!("invalid parameters: {err}"))
        }
    };

    let mut additions = Vec::with_capacity(request.add.len());
    for entry in &request.add {
        let address: NetAddress = match entry.address.parse() {
            Ok(address) => address,
            Err(err) => return policy_error_response(err),
        };
        additions.push(Portal {
            address,
            public: entry.public,
        });
    }
    let mut removals = Vec::with_capacity(request.remove.len());
    for raw in &request.remove {
        match raw.parse::<NetAddress>() {
            Ok(address) => removals.push(address),
            Err(err) => return policy_error_response(err),
        }
    }

    match state.policy().update_portals(&additions, &removals) {
        Ok(summary) => {
            if summary.ignored_removals > 0 {
                tracing::debug!(
                    ignored = summary.ignored_removals,
                    "portal removals named absent portals"
                );
            }
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => policy_error_response(err),
    }
}
