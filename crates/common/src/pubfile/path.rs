//! Validation for paths stored inside a pubfile.
//!
//! Subfile names are relative paths: no leading slash, no `.`/`..`
//! segments, no empty segments. The retrieval side normalizes them to a
//! leading `/` before comparing against a requested inner path.

/// Prefix `s` with `prefix` unless it already starts with it.
pub fn ensure_prefix(s: &str, prefix: &str) -> String {
    if s.starts_with(prefix) {
        s.to_string()
    } else {
        format!("{prefix}{s}")
    }
}

/// Check that `path` is a well-formed in-pubfile path.
pub fn validate_path(path: &str) -> Result<(), PathError> {
    if path.is_empty() {
        return Err(PathError::Empty);
    }
    if path.starts_with('/') {
        return Err(PathError::LeadingSlash(path.to_string()));
    }
    for segment in path.split('/') {
        match segment {
            "" => return Err(PathError::EmptySegment(path.to_string())),
            "." | ".." => return Err(PathError::RelativeSegment(path.to_string())),
            _ => {}
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    #[error("path {0} must not start with a slash")]
    LeadingSlash(String),
    #[error("path {0} contains an empty segment")]
    EmptySegment(String),
    #[error("path {0} contains a relative segment")]
    RelativeSegment(String),
}
