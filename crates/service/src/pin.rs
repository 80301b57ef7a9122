//! # Pin engine
//!
//! Pinning re-persists the bytes behind a remote publink into the local
//! store under a caller-chosen site path, so the pubfile's availability
//! stops depending on the original uploader. The blacklist is consulted
//! before any backend work; portals that forbid forced overwrites signal
//! it through the `Pubaccess-Disable-Force` request directive.

use std::time::Duration;

use common::prelude::{Publink, PublinkError};

use crate::backend::{BackendError, UploadRequest, UploadSource};
use crate::site_path::{SitePath, SitePathError};
use crate::state::ServiceState;

#[derive(Debug)]
pub struct PinRequest {
    pub publink: String,
    pub site_path: String,
    /// Address `site_path` from the store root instead of `pubaccess/`.
    pub root: bool,
    pub force: bool,
    /// 0 applies the backend's default redundancy.
    pub base_chunk_redundancy: u8,
    pub timeout: Duration,
    /// The `Pubaccess-Disable-Force` request directive.
    pub disable_force: bool,
}

pub async fn pin(state: &ServiceState, request: PinRequest) -> Result<Publink, PinError> {
    if request.disable_force && request.force {
        return Err(PinError::ForceDisabled);
    }

    let publink: Publink = request.publink.parse()?;
    let site_path = SitePath::rebase(&request.site_path, request.root)?;

    if state.policy().is_blacklisted(&publink) {
        return Err(PinError::Blacklisted);
    }

    let (metadata, streamer) =
        match tokio::time::timeout(request.timeout, state.backend().download(&publink, request.timeout))
            .await
        {
            Err(_) => return Err(PinError::Timeout),
            Ok(Err(BackendError::NotFound)) => return Err(PinError::NotFound),
            Ok(Err(BackendError::Timeout)) => return Err(PinError::Timeout),
            Ok(Err(err)) => return Err(PinError::Backend(err.to_string())),
            Ok(Ok(found)) => found,
        };

    // The metadata travels unchanged: altering it would change the
    // publink, which is the opposite of pinning.
    let upload = UploadRequest {
        site_path,
        force: request.force,
        dry_run: false,
        base_chunk_redundancy: request.base_chunk_redundancy,
        metadata,
        key: None,
        source: UploadSource::Reader(Box::new(streamer)),
    };
    match state.backend().upload(upload).await {
        Ok(pinned) => {
            tracing::info!(publink = %pinned, "pinned publink");
            Ok(pinned)
        }
        Err(BackendError::AlreadyExists(path)) => Err(PinError::AlreadyExists(path)),
        Err(BackendError::Timeout) => Err(PinError::Timeout),
        Err(BackendError::NotFound) => Err(PinError::NotFound),
        Err(err) => Err(PinError::Backend(err.to_string())),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PinError {
    #[error("error parsing publink: {0}")]
    InvalidPublink(#[from] PublinkError),
    #[error("invalid sitepath provided: {0}")]
    InvalidSitePath(#[from] SitePathError),
    #[error("'force' has been disabled on this node")]
    ForceDisabled,
    #[error("publink is blacklisted")]
    Blacklisted,
    #[error("failed to pin file: publink root not found")]
    NotFound,
    #[error("failed to pin file: request timed out")]
    Timeout,
    #[error("a file already exists at {0}")]
    AlreadyExists(String),
    #[error("failed to pin file: {0}")]
    Backend(String),
}
