//! `GET /pubaccess/stats` - performance counters, store totals, uptime
//! and version.

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::Serialize;

use crate::http::error_response;
use crate::state::ServiceState;
use crate::stats::PerformanceSnapshot;

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub performancestats: PerformanceSnapshot,
    /// Seconds since the portal started.
    pub uptime: u64,
    pub uploadstats: UploadStats,
    pub versioninfo: VersionInfo,
}

#[derive(Debug, Serialize)]
pub struct UploadStats {
    pub numfiles: u64,
    pub totalsize: u64,
}

#[derive(Debug, Serialize)]
pub struct VersionInfo {
    pub version: String,
}

pub async fn handler(State(state): State<ServiceState>) -> Response {
    let store = match state.backend().store_stats().await {
        Ok(store) => store,
        Err(err) => {
            return error_response(
                StatusCode::BAD_GATEWAY,
                format!("failed to get store stats: {err}"),
            )
        }
    };
    Json(StatsResponse {
        performancestats: state.stats().snapshot(),
        uptime: state.stats().uptime().as_secs(),
        uploadstats: UploadStats {
            numfiles: store.num_files,
            totalsize: store.total_size,
        },
        versioninfo: VersionInfo {
            version: state.version().to_string(),
        },
    })
    .into_response()
}
