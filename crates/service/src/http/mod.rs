//! The portal's HTTP surface.
//!
//! One module per endpoint, with the request/response structs next to
//! their handler. The router wires them under `/pubaccess`.

use axum::extract::DefaultBodyLimit;
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use http::{HeaderMap, StatusCode};

use crate::state::ServiceState;

pub mod blacklist;
pub mod error;
pub mod pin;
pub mod publink;
pub mod pubfile;
pub mod stats;
pub mod portals;

pub use error::error_response;

/// Maximum upload size in bytes (500 MB)
pub const MAX_UPLOAD_SIZE_BYTES: usize = 500 * 1024 * 1024;

/// Request directive that forbids `force` on uploads and pins.
pub const DISABLE_FORCE_HEADER: &str = "Pubaccess-Disable-Force";

pub fn router(state: ServiceState) -> Router {
    Router::new()
        // `get` also matches HEAD; the handler branches on the method.
        .route("/pubaccess/publink/*publink", get(publink::handler))
        .route("/pubaccess/pubfile/*sitepath", post(pubfile::handler))
        .route("/pubaccess/pin/:publink", post(pin::handler))
        .route(
            "/pubaccess/blacklist",
            get(blacklist::handler_get).post(blacklist::handler_post),
        )
        .route(
            "/pubaccess/portals",
            get(portals::handler_get).post(portals::handler_post),
        )
        .route("/pubaccess/stats", get(stats::handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE_BYTES))
        .with_state(state)
}

/// Lenient boolean query values, matching what clients historically send.
pub(crate) fn parse_bool_param(name: &str, value: Option<&str>) -> Result<bool, Response> {
    match value {
        None | Some("") => Ok(false),
        Some("1") | Some("t") | Some("T") | Some("true") | Some("True") | Some("TRUE") => Ok(true),
        Some("0") | Some("f") | Some("F") | Some("false") | Some("False") | Some("FALSE") => {
            Ok(false)
        }
        Some(other) => Err(error_response(
            StatusCode::BAD_REQUEST,
            format!("unable to parse '{name}' parameter: {other:?}"),
        )),
    }
}

/// The `Pubaccess-Disable-Force` directive; any truthy value disables
/// forced overwrites for this request.
pub(crate) fn parse_disable_force(headers: &HeaderMap) -> Result<bool, Response> {
    let raw = headers
        .get(DISABLE_FORCE_HEADER)
        .and_then(|v| v.to_str().ok());
    parse_bool_param("Pubaccess-Disable-Force", raw)
}

/// Parse and clamp the `timeout` query parameter.
pub(crate) fn parse_timeout(raw: Option<&str>) -> Result<std::time::Duration, Response> {
    use crate::retrieval::{DEFAULT_TIMEOUT, MAX_TIMEOUT};
    match raw {
        None | Some("") => Ok(DEFAULT_TIMEOUT),
        Some(raw) => {
            let seconds: u64 = raw.parse().map_err(|_| {
                error_response(
                    StatusCode::BAD_REQUEST,
                    format!("unable to parse 'timeout' parameter: {raw:?}"),
                )
            })?;
            if seconds > MAX_TIMEOUT.as_secs() {
                return Err(error_response(
                    StatusCode::BAD_REQUEST,
                    format!(
                        "'timeout' parameter too high, maximum allowed timeout is {}s",
                        MAX_TIMEOUT.as_secs()
                    ),
                ));
            }
            if seconds == 0 {
                Ok(DEFAULT_TIMEOUT)
            } else {
                Ok(std::time::Duration::from_secs(seconds))
            }
        }
    }
}
