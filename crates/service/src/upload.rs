//! # Upload path
//!
//! Builds pubfile metadata out of an HTTP upload and hands it to the
//! backend. Raw-body uploads become single-file pubfiles; multipart
//! uploads become multi-subfile pubfiles whose offsets follow the part
//! order. Conversions re-address a file already in the store.

use std::io::Cursor;
use std::time::Instant;

use axum::extract::multipart::Multipart;
use bytes::Bytes;

use common::prelude::{
    validate_path, Publink, PubfileMetadata, Subfiles, SubfileMetadata,
};
use common::pubfile::{resolve_upload_default_path, MetadataError};

use crate::backend::{BackendError, PubaccesskeyRef, UploadRequest, UploadSource};
use crate::site_path::{SitePath, SitePathError};
use crate::state::ServiceState;

/// The query parameters of `POST /pubaccess/pubfile/*sitepath`, as sent.
#[derive(Debug, Default, serde::Deserialize)]
pub struct UploadQuery {
    pub root: Option<String>,
    pub force: Option<String>,
    pub dryrun: Option<String>,
    pub basechunkredundancy: Option<String>,
    pub filename: Option<String>,
    pub mode: Option<String>,
    pub convertpath: Option<String>,
    pub defaultpath: Option<String>,
    pub disabledefaultpath: Option<String>,
    pub pubaccesskeyname: Option<String>,
    pub pubaccesskeyid: Option<String>,
}

#[derive(Debug)]
pub struct UploadParams {
    pub site_path: SitePath,
    pub force: bool,
    pub dry_run: bool,
    pub base_chunk_redundancy: u8,
    pub filename: String,
    pub mode: u32,
    pub default_path: Option<String>,
    pub disable_default_path: bool,
    pub convert_path: Option<SitePath>,
    pub key: Option<PubaccesskeyRef>,
}

/// Validate the query parameters against each other and the
/// `Pubaccess-Disable-Force` directive.
pub fn parse_params(
    site_path_raw: &str,
    query: &UploadQuery,
    disable_force: bool,
) -> Result<UploadParams, UploadError> {
    let root = parse_bool("root", query.root.as_deref())?;
    let force = parse_bool("force", query.force.as_deref())?;
    let dry_run = parse_bool("dryrun", query.dryrun.as_deref())?;
    if disable_force && force {
        return Err(UploadError::ForceDisabled);
    }
    if force && dry_run {
        return Err(UploadError::BadRequest(
            "'dryrun' and 'force' can not be combined".to_string(),
        ));
    }

    let site_path = SitePath::rebase(site_path_raw, root)?;

    let base_chunk_redundancy = match query.basechunkredundancy.as_deref() {
        None | Some("") => 0,
        Some(raw) => raw.parse().map_err(|_| {
            UploadError::BadRequest(format!("unable to parse basechunkredundancy: {raw:?}"))
        })?,
    };

    let mode = match query.mode.as_deref() {
        None | Some("") => 0,
        Some(raw) => u32::from_str_radix(raw, 8)
            .map_err(|_| UploadError::BadRequest(format!("unable to parse mode: {raw:?}")))?,
    };

    let key = match (
        non_empty(query.pubaccesskeyname.as_deref()),
        non_empty(query.pubaccesskeyid.as_deref()),
    ) {
        (Some(_), Some(_)) => {
            return Err(UploadError::BadRequest(
                "can only use either pubaccesskeyname or pubaccesskeyid, not both".to_string(),
            ))
        }
        (Some(name), None) => Some(PubaccesskeyRef::Name(name.to_string())),
        (None, Some(id)) => Some(PubaccesskeyRef::Id(id.to_string())),
        (None, None) => None,
    };

    let filename = query.filename.clone().unwrap_or_default();
    let convert_path = match non_empty(query.convertpath.as_deref()) {
        Some(raw) => {
            if !filename.is_empty() {
                return Err(UploadError::BadRequest(
                    "cannot set both a convertpath and a filename".to_string(),
                ));
            }
            Some(SitePath::rebase(raw, false)?)
        }
        None => None,
    };

    Ok(UploadParams {
        site_path,
        force,
        dry_run,
        base_chunk_redundancy,
        filename,
        mode,
        default_path: non_empty(query.defaultpath.as_deref()).map(str::to_string),
        disable_default_path: parse_bool(
            "disabledefaultpath",
            query.disabledefaultpath.as_deref(),
        )?,
        convert_path,
        key,
    })
}

/// The body of an upload after transport decoding.
pub enum UploadContent {
    Raw { data: Bytes },
    Multipart { subfiles: Subfiles, payload: Bytes },
}

/// Drain an axum multipart body into ordered subfiles plus the
/// concatenated payload. Offsets follow the part order, which keeps the
/// payload layout deterministic.
pub async fn read_multipart(multipart: &mut Multipart) -> Result<UploadContent, UploadError> {
    let mut subfiles = Subfiles::new();
    let mut payload = Vec::new();
    let mut offset = 0u64;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        UploadError::BadRequest(format!("failed parsing multipart request: {e}"))
    })? {
        match field.name() {
            Some("file") | Some("files[]") => {}
            _ => continue,
        }
        let filename = match field.file_name() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => return Err(UploadError::BadRequest("no filename provided".to_string())),
        };
        let mode = match field.headers().get("Mode").and_then(|v| v.to_str().ok()) {
            None | Some("") => 0,
            Some(raw) => u32::from_str_radix(raw, 8).map_err(|_| {
                UploadError::BadRequest(format!("failed to parse file mode: {raw:?}"))
            })?,
        };
        let content_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| mime_guess::from_path(&filename).first_or_octet_stream().to_string());
        let data = field.bytes().await.map_err(|e| {
            UploadError::BadRequest(format!("could not read multipart file: {e}"))
        })?;

        let length = data.len() as u64;
        payload.extend_from_slice(&data);
        let previous = subfiles.insert(
            filename.clone(),
            SubfileMetadata {
                mode,
                filename,
                content_type,
                offset,
                length,
            },
        );
        if let Some(previous) = previous {
            return Err(UploadError::BadRequest(format!(
                "duplicate filename in multipart upload: {}",
                previous.filename
            )));
        }
        offset += length;
    }

    if subfiles.is_empty() {
        return Err(UploadError::BadRequest(
            "could not find multipart file".to_string(),
        ));
    }
    Ok(UploadContent::Multipart {
        subfiles,
        payload: payload.into(),
    })
}

/// Store a pubfile and return its publink.
pub async fn upload_pubfile(
    state: &ServiceState,
    params: UploadParams,
    content: UploadContent,
) -> Result<Publink, UploadError> {
    let started = Instant::now();

    let (metadata, source, stored_size) = match (&params.convert_path, content) {
        (Some(convert_path), _) => {
            let metadata = PubfileMetadata {
                mode: params.mode,
                ..Default::default()
            };
            (metadata, UploadSource::Convert(convert_path.clone()), 0u64)
        }
        (None, UploadContent::Raw { data }) => {
            validate_path(&params.filename)
                .map_err(|e| UploadError::BadRequest(format!("invalid filename provided: {e}")))?;
            // Default-path parameters are meaningless without subfiles.
            resolve_upload_default_path(
                params.default_path.as_deref(),
                params.disable_default_path,
                &Subfiles::new(),
            )?;
            let metadata = PubfileMetadata {
                filename: params.filename.clone(),
                length: data.len() as u64,
                mode: params.mode,
                ..Default::default()
            };
            let size = data.len() as u64;
            (
                metadata,
                UploadSource::Reader(Box::new(Cursor::new(data.to_vec()))),
                size,
            )
        }
        (None, UploadContent::Multipart { subfiles, payload }) => {
            let filename = if params.filename.is_empty() && subfiles.len() == 1 {
                subfiles
                    .values()
                    .next()
                    .map(|sf| sf.filename.clone())
                    .unwrap_or_default()
            } else {
                params.filename.clone()
            };
            validate_path(&filename)
                .map_err(|e| UploadError::BadRequest(format!("invalid filename provided: {e}")))?;
            for (key, sf) in &subfiles {
                if key != &sf.filename {
                    return Err(UploadError::BadRequest(
                        "subfile name did not match metadata filename".to_string(),
                    ));
                }
                validate_path(&sf.filename).map_err(|e| {
                    UploadError::BadRequest(format!("invalid filename provided: {e}"))
                })?;
            }
            let (default_path, disable_default_path) = resolve_upload_default_path(
                params.default_path.as_deref(),
                params.disable_default_path,
                &subfiles,
            )?;
            let metadata = PubfileMetadata {
                filename,
                length: payload.len() as u64,
                mode: params.mode,
                subfiles,
                default_path,
                disable_default_path,
                ..Default::default()
            };
            metadata.validate_strict()?;
            let size = payload.len() as u64;
            (
                metadata,
                UploadSource::Reader(Box::new(Cursor::new(payload.to_vec()))),
                size,
            )
        }
    };

    let request = UploadRequest {
        site_path: params.site_path,
        force: params.force,
        dry_run: params.dry_run,
        base_chunk_redundancy: params.base_chunk_redundancy,
        metadata,
        key: params.key,
        source,
    };
    let publink = match state.backend().upload(request).await {
        Ok(publink) => publink,
        Err(BackendError::AlreadyExists(path)) => return Err(UploadError::AlreadyExists(path)),
        Err(err) => return Err(UploadError::Backend(err.to_string())),
    };

    // The upload path honors the blacklist too: a blacklisted root is
    // never acknowledged.
    if state.policy().is_blacklisted(&publink) {
        return Err(UploadError::Blacklisted);
    }

    state.stats().observe_upload(stored_size, started.elapsed());
    Ok(publink)
}

fn parse_bool(name: &str, value: Option<&str>) -> Result<bool, UploadError> {
    match value {
        None | Some("") => Ok(false),
        Some("1") | Some("t") | Some("T") | Some("true") | Some("True") | Some("TRUE") => Ok(true),
        Some("0") | Some("f") | Some("F") | Some("false") | Some("False") | Some("FALSE") => {
            Ok(false)
        }
        Some(other) => Err(UploadError::BadRequest(format!(
            "unable to parse '{name}' parameter: {other:?}"
        ))),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Metadata(#[from] MetadataError),
    #[error("invalid sitepath provided: {0}")]
    SitePath(#[from] SitePathError),
    #[error("'force' has been disabled on this node")]
    ForceDisabled,
    #[error("failed to upload file: publink is blacklisted")]
    Blacklisted,
    #[error("a file already exists at {0}")]
    AlreadyExists(String),
    #[error("failed to upload file: {0}")]
    Backend(String),
}
