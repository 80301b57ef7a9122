//! Response-shape negotiation.
//!
//! The effective format starts from the client's `format` query value:
//! an unspecified format on a multi-file target is promoted to zip, a
//! single target stays raw, anything explicit is honored. The negotiator
//! also produces the `Content-Disposition` recipe: archives always
//! download as attachments named after the pubfile plus the archive
//! extension.

use common::prelude::{PubfileFormat, PubfileMetadata};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    pub format: PubfileFormat,
    pub content_disposition: String,
}

pub fn negotiate(
    requested: PubfileFormat,
    attachment: bool,
    is_subfile: bool,
    metadata: &PubfileMetadata,
) -> Negotiated {
    let format = if requested == PubfileFormat::NotSpecified
        && !is_subfile
        && metadata.is_directory()
    {
        PubfileFormat::Zip
    } else {
        requested
    };

    let filename = base_name(&metadata.filename);
    let content_disposition = if format.is_archive() {
        format!(
            "attachment; filename={}",
            quote(&format!("{}{}", filename, format.extension()))
        )
    } else if attachment {
        format!("attachment; filename={}", quote(filename))
    } else {
        format!("inline; filename={}", quote(filename))
    };

    Negotiated {
        format,
        content_disposition,
    }
}

fn base_name(filename: &str) -> &str {
    filename
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(filename)
}

fn quote(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}
