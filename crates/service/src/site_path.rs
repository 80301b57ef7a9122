//! Site paths: where a pubfile lives in the local store.
//!
//! Uploads and pins name their target with a slash-delimited store path.
//! Unless the caller asks for root addressing, the path is rebased under
//! the fixed `pubaccess/` folder so portal content stays in one place.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Store folder that non-root uploads and pins are rebased under.
pub const PUBACCESS_FOLDER: &str = "pubaccess";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SitePath(String);

impl SitePath {
    /// Validate and normalize a store path. Leading and trailing slashes
    /// are stripped; empty and traversing paths are rejected.
    pub fn new(raw: &str) -> Result<Self, SitePathError> {
        let trimmed = raw.trim_matches('/');
        if trimmed.is_empty() {
            return Err(SitePathError::Empty);
        }
        for segment in trimmed.split('/') {
            match segment {
                "" => return Err(SitePathError::EmptySegment(raw.to_string())),
                "." | ".." => return Err(SitePathError::RelativeSegment(raw.to_string())),
                _ => {}
            }
        }
        Ok(SitePath(trimmed.to_string()))
    }

    /// Build the effective path for an upload or pin: rebased under
    /// [`PUBACCESS_FOLDER`] unless `root` addressing was requested.
    pub fn rebase(raw: &str, root: bool) -> Result<Self, SitePathError> {
        let trimmed = raw.trim_matches('/');
        if trimmed.is_empty() {
            return Err(SitePathError::Empty);
        }
        if root {
            Self::new(trimmed)
        } else {
            Self::new(&format!("{PUBACCESS_FOLDER}/{trimmed}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The final path segment.
    pub fn base_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for SitePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for SitePath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SitePath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        SitePath::new(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SitePathError {
    #[error("site path is empty")]
    Empty,
    #[error("site path {0} contains an empty segment")]
    EmptySegment(String),
    #[error("site path {0} contains a relative segment")]
    RelativeSegment(String),
}
