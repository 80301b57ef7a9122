//! Default-path resolution.
//!
//! Decides, for a retrieval of the pubfile root with no explicit format,
//! whether to serve the whole pubfile or a specific subfile. The rules,
//! in order: no subfiles means no default path; an explicit default path
//! is validated and wins; `disabledefaultpath` forces the whole pubfile;
//! a sole subfile is its own default; a root-level `index.html` is picked
//! up implicitly; anything else serves the whole pubfile.

use common::prelude::{ensure_prefix, PubfileMetadata};
use common::pubfile::MetadataError;

/// Name picked up implicitly when the uploader set no default path.
pub const DEFAULT_PATH_NAME: &str = "index.html";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultPathOutcome {
    /// No default path applies; serve the pubfile itself.
    ServeWhole,
    /// Serve this subfile (normalized, slash-prefixed).
    Subfile(String),
}

pub fn resolve(metadata: &PubfileMetadata) -> Result<DefaultPathOutcome, MetadataError> {
    if metadata.subfiles.is_empty() {
        return Ok(DefaultPathOutcome::ServeWhole);
    }

    if !metadata.default_path.is_empty() {
        let prefixed = ensure_prefix(&metadata.default_path, "/");
        let multiple = metadata.subfiles.len() > 1;
        if prefixed.matches('/').count() > 1 && multiple {
            return Err(MetadataError::InvalidDefaultPath(format!(
                "pubfile has invalid default path ({prefixed}) which refers to a non-root file, please specify a format"
            )));
        }
        let is_html = prefixed.ends_with(".html") || prefixed.ends_with(".htm");
        if !is_html && multiple {
            return Err(MetadataError::InvalidDefaultPath(format!(
                "pubfile has invalid default path ({prefixed}), please specify a format"
            )));
        }
        return Ok(DefaultPathOutcome::Subfile(prefixed));
    }

    if metadata.disable_default_path {
        return Ok(DefaultPathOutcome::ServeWhole);
    }

    if metadata.subfiles.len() == 1 {
        if let Some(sole) = metadata.subfiles.values().next() {
            return Ok(DefaultPathOutcome::Subfile(ensure_prefix(&sole.filename, "/")));
        }
    }

    if metadata.subfiles.contains_key(DEFAULT_PATH_NAME) {
        return Ok(DefaultPathOutcome::Subfile(format!("/{DEFAULT_PATH_NAME}")));
    }

    Ok(DefaultPathOutcome::ServeWhole)
}
