//! # Pubfile metadata
//!
//! The metadata that rides in the leading bytes of a pubfile's base
//! sector. It is JSON-encoded on the wire, so the struct can grow without
//! breaking compatibility; the serde field names below are the wire names
//! and must not change.
//!
//! A pubfile is either a single payload (no subfiles) or a collection of
//! subfiles sharing one concatenated payload. Subfile offsets partition
//! `[0, length)`; path resolution and the default-path rules operate on
//! normalized absolute paths (leading `/`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::path::{ensure_prefix, validate_path};

/// Subfiles of a pubfile, keyed by their in-pubfile path.
pub type Subfiles = BTreeMap<String, SubfileMetadata>;

/// Metadata of a single subfile: a named byte range of the payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubfileMetadata {
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub mode: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub filename: String,
    #[serde(rename = "contenttype", default, skip_serializing_if = "String::is_empty")]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub offset: u64,
    #[serde(rename = "len", default, skip_serializing_if = "is_zero_u64")]
    pub length: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubfileMetadata {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub filename: String,
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub length: u64,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub mode: u32,
    /// Content type to respond with when the pubfile itself is served.
    /// Empty means the transport is free to sniff.
    #[serde(rename = "contenttype", default, skip_serializing_if = "String::is_empty")]
    pub default_content_type: String,
    #[serde(default, skip_serializing_if = "Subfiles::is_empty")]
    pub subfiles: Subfiles,
    /// The in-pubfile path served when the root is requested without an
    /// explicit format.
    #[serde(rename = "defaultpath", default, skip_serializing_if = "String::is_empty")]
    pub default_path: String,
    /// Prevents any default-path resolution for this pubfile.
    #[serde(rename = "disabledefaultpath", default, skip_serializing_if = "is_false")]
    pub disable_default_path: bool,
}

impl PubfileMetadata {
    /// Scope the metadata to `path`.
    ///
    /// Returns the scoped metadata, whether the match is a single file,
    /// and the `(offset, length)` of the matched range in the payload.
    /// Scoped subfile offsets are rebased so the range starts at zero. A
    /// miss returns empty subfiles and a zero range.
    pub fn for_path(&self, path: &str) -> (PubfileMetadata, bool, u64, u64) {
        let path = ensure_prefix(path, "/");
        if path == "/" {
            return (self.clone(), self.subfiles.len() <= 1, 0, self.length);
        }

        let mut scoped = PubfileMetadata {
            filename: path.clone(),
            ..Default::default()
        };
        let mut is_file = false;
        for sf in self.subfiles.values() {
            if ensure_prefix(&sf.filename, "/") == path {
                scoped.subfiles.insert(sf.filename.clone(), sf.clone());
                is_file = true;
                break;
            }
        }
        if scoped.subfiles.is_empty() {
            let dir_prefix = format!("{path}/");
            for sf in self.subfiles.values() {
                if ensure_prefix(&sf.filename, "/").starts_with(&dir_prefix) {
                    scoped.subfiles.insert(sf.filename.clone(), sf.clone());
                }
            }
        }
        if scoped.subfiles.is_empty() {
            return (scoped, false, 0, 0);
        }

        let offset = scoped
            .subfiles
            .values()
            .map(|sf| sf.offset)
            .min()
            .unwrap_or(0);
        if offset > 0 {
            for sf in scoped.subfiles.values_mut() {
                sf.offset -= offset;
            }
        }
        scoped.length = scoped.subfiles.values().map(|sf| sf.length).sum();
        let length = scoped.length;
        (scoped, is_file, offset, length)
    }

    /// The Content-Type to respond with: the explicit one when set, the
    /// sole subfile's otherwise. Empty when it cannot be known.
    pub fn content_type(&self) -> String {
        if !self.default_content_type.is_empty() {
            return self.default_content_type.clone();
        }
        if self.subfiles.len() == 1 {
            if let Some(sf) = self.subfiles.values().next() {
                return sf.content_type.clone();
            }
        }
        String::new()
    }

    /// Whether this pubfile represents more than a single flat file.
    pub fn is_directory(&self) -> bool {
        if self.subfiles.len() > 1 {
            return true;
        }
        if let Some(sf) = self.subfiles.values().next() {
            return sf.filename.contains('/');
        }
        false
    }

    /// Subfiles sorted by ascending payload offset.
    pub fn ordered_subfiles(&self) -> Vec<SubfileMetadata> {
        let mut files: Vec<SubfileMetadata> = self.subfiles.values().cloned().collect();
        files.sort_by_key(|sf| sf.offset);
        files
    }

    /// Enforce every structural invariant of the metadata. Used on the
    /// upload path; retrieval applies the lighter [`Self::validate_serving`].
    pub fn validate_strict(&self) -> Result<(), MetadataError> {
        if self.subfiles.is_empty() {
            if self.length == 0 {
                return Err(MetadataError::InvalidMetadata(
                    "single-file pubfile has zero length".to_string(),
                ));
            }
        } else {
            for (key, sf) in &self.subfiles {
                if key != &sf.filename {
                    return Err(MetadataError::InvalidMetadata(format!(
                        "subfile key {key:?} does not match its filename {:?}",
                        sf.filename
                    )));
                }
                validate_path(&sf.filename)
                    .map_err(|e| MetadataError::InvalidMetadata(e.to_string()))?;
            }
            let ordered = self.ordered_subfiles();
            let mut expected_offset = 0u64;
            for sf in &ordered {
                if sf.offset != expected_offset {
                    return Err(MetadataError::InvalidMetadata(format!(
                        "subfile {:?} starts at offset {} instead of {}",
                        sf.filename, sf.offset, expected_offset
                    )));
                }
                expected_offset += sf.length;
            }
            if expected_offset != self.length {
                return Err(MetadataError::InvalidMetadata(format!(
                    "subfile lengths sum to {} but pubfile length is {}",
                    expected_offset, self.length
                )));
            }
        }
        self.validate_serving()
    }

    /// The default-path sanity checks applied before serving: exclusivity
    /// of `defaultpath`/`disabledefaultpath` and their applicability.
    pub fn validate_serving(&self) -> Result<(), MetadataError> {
        if self.subfiles.is_empty() && !self.default_path.is_empty() {
            return Err(MetadataError::InvalidDefaultPath(
                "defaultpath is not allowed on single files".to_string(),
            ));
        }
        if self.subfiles.is_empty() && self.disable_default_path {
            return Err(MetadataError::InvalidDefaultPath(
                "disabledefaultpath is not allowed on single files".to_string(),
            ));
        }
        if !self.default_path.is_empty() && self.disable_default_path {
            return Err(MetadataError::InvalidDefaultPath(
                "defaultpath and disabledefaultpath are mutually exclusive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Derive the stored default-path state from upload parameters.
///
/// Returns the normalized (slash-prefixed) default path and the disable
/// flag. Mirrors the upload-side rules: the pair is meaningless without
/// subfiles, mutually exclusive, must name an existing subfile in the
/// pubfile root, and must be an HTML file unless it is the only subfile.
pub fn resolve_upload_default_path(
    default_path: Option<&str>,
    disable_default_path: bool,
    subfiles: &Subfiles,
) -> Result<(String, bool), MetadataError> {
    let requested = default_path.unwrap_or_default();
    if subfiles.is_empty() && (disable_default_path || !requested.is_empty()) {
        return Err(MetadataError::InvalidDefaultPath(
            "defaultpath and disabledefaultpath are not applicable to pubfiles without subfiles"
                .to_string(),
        ));
    }
    if disable_default_path && !requested.is_empty() {
        return Err(MetadataError::InvalidDefaultPath(
            "defaultpath and disabledefaultpath are mutually exclusive".to_string(),
        ));
    }
    if disable_default_path {
        return Ok((String::new(), true));
    }
    if requested.is_empty() {
        return Ok((String::new(), false));
    }

    let relative = requested.trim_start_matches('/');
    if !subfiles.contains_key(relative) {
        return Err(MetadataError::InvalidDefaultPath(format!(
            "no such path: {requested}"
        )));
    }
    let prefixed = ensure_prefix(relative, "/");
    let sole_subfile = subfiles.len() == 1;
    let is_html = prefixed.ends_with(".html") || prefixed.ends_with(".htm");
    if !is_html && !sole_subfile {
        return Err(MetadataError::InvalidDefaultPath(
            "defaultpath must point to an HTML file".to_string(),
        ));
    }
    if prefixed.matches('/').count() > 1 && !sole_subfile {
        return Err(MetadataError::InvalidDefaultPath(
            "defaultpath must point to a file in the root directory of the pubfile".to_string(),
        ));
    }
    Ok((prefixed, false))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),
    #[error("invalid default path: {0}")]
    InvalidDefaultPath(String),
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

fn is_zero_u64(v: &u64) -> bool {
    *v == 0
}

fn is_false(v: &bool) -> bool {
    !*v
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subfile(name: &str, offset: u64, length: u64) -> SubfileMetadata {
        SubfileMetadata {
            mode: 0o644,
            filename: name.to_string(),
            content_type: "application/octet-stream".to_string(),
            offset,
            length,
        }
    }

    fn multi_metadata() -> PubfileMetadata {
        let mut subfiles = Subfiles::new();
        subfiles.insert("a/one.txt".to_string(), subfile("a/one.txt", 0, 10));
        subfiles.insert("a/two.txt".to_string(), subfile("a/two.txt", 10, 20));
        subfiles.insert("b/three.txt".to_string(), subfile("b/three.txt", 30, 5));
        PubfileMetadata {
            filename: "bundle".to_string(),
            length: 35,
            subfiles,
            ..Default::default()
        }
    }

    #[test]
    fn test_for_path_root() {
        let md = multi_metadata();
        let (scoped, is_file, offset, length) = md.for_path("/");
        assert_eq!(scoped, md);
        assert!(!is_file);
        assert_eq!((offset, length), (0, 35));
    }

    #[test]
    fn test_for_path_exact_file() {
        let md = multi_metadata();
        let (scoped, is_file, offset, length) = md.for_path("/a/two.txt");
        assert!(is_file);
        assert_eq!((offset, length), (10, 20));
        assert_eq!(scoped.subfiles.len(), 1);
        let sf = scoped.subfiles.values().next().unwrap();
        assert_eq!(sf.offset, 0, "scoped offsets are rebased");
        assert_eq!(sf.length, 20);
    }

    #[test]
    fn test_for_path_every_stored_subfile_resolves() {
        let md = multi_metadata();
        for (key, stored) in &md.subfiles {
            let (scoped, is_file, offset, length) = md.for_path(&format!("/{key}"));
            assert!(is_file, "{key} should resolve to a file");
            assert_eq!(scoped.subfiles.len(), 1);
            assert_eq!(offset, stored.offset);
            assert_eq!(length, stored.length);
        }
    }

    #[test]
    fn test_for_path_directory() {
        let md = multi_metadata();
        let (scoped, is_file, offset, length) = md.for_path("/a");
        assert!(!is_file);
        assert_eq!(scoped.subfiles.len(), 2);
        assert_eq!((offset, length), (0, 30));
        assert_eq!(scoped.length, 30);
    }

    #[test]
    fn test_for_path_directory_does_not_match_sibling_prefix() {
        let mut md = multi_metadata();
        md.subfiles
            .insert("ab/four.txt".to_string(), subfile("ab/four.txt", 35, 7));
        md.length = 42;
        let (scoped, _, _, _) = md.for_path("/a");
        assert!(scoped.subfiles.keys().all(|k| k.starts_with("a/")));
    }

    #[test]
    fn test_for_path_miss() {
        let md = multi_metadata();
        let (scoped, is_file, offset, length) = md.for_path("/nope");
        assert!(scoped.subfiles.is_empty());
        assert!(!is_file);
        assert_eq!((offset, length), (0, 0));
    }

    #[test]
    fn test_content_type_prefers_explicit() {
        let mut md = multi_metadata();
        md.default_content_type = "text/html".to_string();
        assert_eq!(md.content_type(), "text/html");
    }

    #[test]
    fn test_content_type_from_sole_subfile() {
        let mut subfiles = Subfiles::new();
        subfiles.insert(
            "only.css".to_string(),
            SubfileMetadata {
                content_type: "text/css".to_string(),
                filename: "only.css".to_string(),
                length: 4,
                ..Default::default()
            },
        );
        let md = PubfileMetadata {
            length: 4,
            subfiles,
            ..Default::default()
        };
        assert_eq!(md.content_type(), "text/css");
        assert_eq!(multi_metadata().content_type(), "");
    }

    #[test]
    fn test_is_directory() {
        assert!(multi_metadata().is_directory());

        let mut subfiles = Subfiles::new();
        subfiles.insert("nested/file".to_string(), subfile("nested/file", 0, 1));
        let nested = PubfileMetadata {
            length: 1,
            subfiles,
            ..Default::default()
        };
        assert!(nested.is_directory());

        let mut subfiles = Subfiles::new();
        subfiles.insert("flat".to_string(), subfile("flat", 0, 1));
        let flat = PubfileMetadata {
            length: 1,
            subfiles,
            ..Default::default()
        };
        assert!(!flat.is_directory());
        assert!(!PubfileMetadata::default().is_directory());
    }

    #[test]
    fn test_validate_strict_accepts_partition() {
        multi_metadata().validate_strict().unwrap();
    }

    #[test]
    fn test_validate_strict_rejects_gap() {
        let mut md = multi_metadata();
        md.subfiles.get_mut("b/three.txt").unwrap().offset = 31;
        assert!(matches!(
            md.validate_strict(),
            Err(MetadataError::InvalidMetadata(_))
        ));
    }

    #[test]
    fn test_validate_strict_rejects_length_mismatch() {
        let mut md = multi_metadata();
        md.length = 40;
        assert!(md.validate_strict().is_err());
    }

    #[test]
    fn test_validate_strict_rejects_key_mismatch() {
        let mut md = multi_metadata();
        md.subfiles
            .insert("renamed".to_string(), subfile("other", 35, 1));
        assert!(md.validate_strict().is_err());
    }

    #[test]
    fn test_validate_strict_rejects_empty_single_file() {
        let md = PubfileMetadata {
            filename: "empty".to_string(),
            ..Default::default()
        };
        assert!(md.validate_strict().is_err());
    }

    #[test]
    fn test_validate_serving_exclusivity() {
        let mut md = multi_metadata();
        md.default_path = "/a/one.txt".to_string();
        md.disable_default_path = true;
        assert!(matches!(
            md.validate_serving(),
            Err(MetadataError::InvalidDefaultPath(_))
        ));
    }

    #[test]
    fn test_validate_serving_default_path_on_single_file() {
        let md = PubfileMetadata {
            filename: "file".to_string(),
            length: 3,
            default_path: "/file".to_string(),
            ..Default::default()
        };
        assert!(md.validate_serving().is_err());
    }

    #[test]
    fn test_upload_default_path_missing_subfile() {
        let mut subfiles = Subfiles::new();
        subfiles.insert("a.html".to_string(), subfile("a.html", 0, 1));
        subfiles.insert("b.html".to_string(), subfile("b.html", 1, 1));
        let err =
            resolve_upload_default_path(Some("/index.html"), false, &subfiles).unwrap_err();
        assert!(matches!(err, MetadataError::InvalidDefaultPath(_)));
    }

    #[test]
    fn test_upload_default_path_requires_html_when_multiple() {
        let mut subfiles = Subfiles::new();
        subfiles.insert("a.txt".to_string(), subfile("a.txt", 0, 1));
        subfiles.insert("b.txt".to_string(), subfile("b.txt", 1, 1));
        assert!(resolve_upload_default_path(Some("a.txt"), false, &subfiles).is_err());
    }

    #[test]
    fn test_upload_default_path_sole_subfile_any_type() {
        let mut subfiles = Subfiles::new();
        subfiles.insert("only.txt".to_string(), subfile("only.txt", 0, 1));
        let (path, disable) =
            resolve_upload_default_path(Some("only.txt"), false, &subfiles).unwrap();
        assert_eq!(path, "/only.txt");
        assert!(!disable);
    }

    #[test]
    fn test_upload_default_path_rejects_nested() {
        let mut subfiles = Subfiles::new();
        subfiles.insert("a/deep.html".to_string(), subfile("a/deep.html", 0, 1));
        subfiles.insert("b.html".to_string(), subfile("b.html", 1, 1));
        assert!(resolve_upload_default_path(Some("a/deep.html"), false, &subfiles).is_err());
    }

    #[test]
    fn test_upload_default_path_mutually_exclusive() {
        let mut subfiles = Subfiles::new();
        subfiles.insert("index.html".to_string(), subfile("index.html", 0, 1));
        subfiles.insert("b.html".to_string(), subfile("b.html", 1, 1));
        assert!(resolve_upload_default_path(Some("index.html"), true, &subfiles).is_err());
        let (path, _) =
            resolve_upload_default_path(Some("index.html"), false, &subfiles).unwrap();
        assert_eq!(path, "/index.html");
    }

    #[test]
    fn test_upload_default_path_disable_without_subfiles() {
        let subfiles = Subfiles::new();
        assert!(resolve_upload_default_path(None, true, &subfiles).is_err());
        let (path, disable) = resolve_upload_default_path(None, false, &subfiles).unwrap();
        assert_eq!(path, "");
        assert!(!disable);
    }

    #[test]
    fn test_wire_field_names() {
        let md = multi_metadata();
        let json = serde_json::to_value(&md).unwrap();
        assert!(json.get("filename").is_some());
        assert!(json.get("length").is_some());
        let subfiles = json.get("subfiles").unwrap();
        let sf = subfiles.get("a/two.txt").unwrap();
        assert_eq!(sf.get("len").unwrap(), 20);
        assert_eq!(sf.get("contenttype").unwrap(), "application/octet-stream");
        assert_eq!(sf.get("offset").unwrap(), 10);
    }

    #[test]
    fn test_wire_omits_empty_fields() {
        let md = PubfileMetadata {
            filename: "testSmall".to_string(),
            length: 1024,
            mode: 0o640,
            ..Default::default()
        };
        let json = serde_json::to_value(&md).unwrap();
        assert!(json.get("subfiles").is_none());
        assert!(json.get("defaultpath").is_none());
        assert!(json.get("disabledefaultpath").is_none());
        assert_eq!(json.get("mode").unwrap(), 0o640);
    }
}
