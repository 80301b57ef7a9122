use std::fmt;

/// The response shape requested through the `format` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PubfileFormat {
    /// No format requested; the engine picks raw or promotes to zip.
    #[default]
    NotSpecified,
    /// The concatenated payload bytes, no framing.
    Concat,
    Tar,
    TarGz,
    Zip,
}

impl PubfileFormat {
    /// Parse the query value. An absent or empty value means unspecified.
    pub fn from_query(value: Option<&str>) -> Result<Self, FormatError> {
        match value.map(|v| v.to_ascii_lowercase()).as_deref() {
            None | Some("") => Ok(PubfileFormat::NotSpecified),
            Some("concat") => Ok(PubfileFormat::Concat),
            Some("tar") => Ok(PubfileFormat::Tar),
            Some("targz") => Ok(PubfileFormat::TarGz),
            Some("zip") => Ok(PubfileFormat::Zip),
            Some(other) => Err(FormatError::Unknown(other.to_string())),
        }
    }

    pub fn is_archive(&self) -> bool {
        matches!(self, PubfileFormat::Tar | PubfileFormat::TarGz | PubfileFormat::Zip)
    }

    /// Filename extension appended to the `Content-Disposition` name.
    pub fn extension(&self) -> &'static str {
        match self {
            PubfileFormat::Tar => ".tar",
            PubfileFormat::TarGz => ".tar.gz",
            PubfileFormat::Zip => ".zip",
            _ => "",
        }
    }

    /// The Content-Type of an archive response.
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            PubfileFormat::Tar => Some("application/x-tar"),
            PubfileFormat::TarGz => Some("application/gzip"),
            PubfileFormat::Zip => Some("application/zip"),
            _ => None,
        }
    }
}

impl fmt::Display for PubfileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PubfileFormat::NotSpecified => "",
            PubfileFormat::Concat => "concat",
            PubfileFormat::Tar => "tar",
            PubfileFormat::TarGz => "targz",
            PubfileFormat::Zip => "zip",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("unknown format {0:?}, allowed values are: 'concat', 'tar', 'targz' and 'zip'")]
    Unknown(String),
}
