//! # Publink
//!
//! A publink is the compact, self-describing identifier for a pubfile's
//! base sector. It packs a 16-bit bitfield and a 32-byte merkle root into
//! 34 bytes, rendered as 46 characters of URL-safe base64.
//!
//! The bitfield encodes, from the least significant bit:
//!
//! 1. 2 bits: version minus one (only version 1 is in use)
//! 2. a unary mode run: `m` one-bits terminated by a zero, `m ∈ [0, 7]`
//! 3. 3 bits: fetch-size index
//! 4. the remaining `10 - m` bits: offset index
//!
//! Mode `m` selects the alignment `4096 << m`. Larger modes trade offset
//! granularity for a larger representable fetch size, which keeps small
//! fetches tightly packed while still addressing anywhere in a sector.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Size of a base sector. Fetch ranges never cross a sector boundary.
pub const SECTOR_SIZE: u64 = 1 << 22;

/// Raw byte length of a publink: 2-byte bitfield + 32-byte merkle root.
pub const PUBLINK_RAW_SIZE: usize = 34;

/// Length of the base64 textual form.
pub const PUBLINK_ENCODED_LEN: usize = 46;

/// Smallest alignment of a fetch range within the base sector.
const FETCH_ALIGN: u64 = 4096;

/// Highest representable mode; the unary run must fit the bitfield.
const MAX_MODE: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Publink {
    bitfield: u16,
    merkle_root: [u8; 32],
}

impl Publink {
    /// Build a version-1 publink for the given fetch range.
    ///
    /// `fetch_size` is rounded up to the next representable value at the
    /// smallest viable mode. `offset` must be aligned to that mode's
    /// increment, and the (rounded) range must stay inside the sector.
    pub fn new_v1(merkle_root: [u8; 32], offset: u64, fetch_size: u64) -> Result<Self, PublinkError> {
        if fetch_size == 0 || fetch_size > SECTOR_SIZE {
            return Err(PublinkError::InvalidFetchSize(fetch_size));
        }

        let mut mode = 0u32;
        while fetch_size > mode_base(mode) + 8 * mode_increment(mode) {
            mode += 1;
            if mode > MAX_MODE {
                return Err(PublinkError::InvalidFetchSize(fetch_size));
            }
        }
        let inc = mode_increment(mode);
        let base = mode_base(mode);
        let fetch_index = (fetch_size - base).div_ceil(inc) - 1;
        let rounded = base + (fetch_index + 1) * inc;

        if offset % inc != 0 {
            return Err(PublinkError::InvalidOffset(offset));
        }
        let offset_index = offset / inc;
        let offset_bits = 10 - mode;
        if offset_index >= 1 << offset_bits {
            return Err(PublinkError::InvalidOffset(offset));
        }
        if offset + rounded > SECTOR_SIZE {
            return Err(PublinkError::RangeOutOfBounds { offset, fetch_size: rounded });
        }

        let mut bits = offset_index as u16;
        bits = (bits << 3) | fetch_index as u16;
        // Make room for the unary mode run; the terminating zero is implicit.
        bits <<= mode + 1;
        bits |= (1u16 << mode) - 1;
        let bitfield = bits << 2;

        Ok(Publink { bitfield, merkle_root })
    }

    /// Reconstruct a publink from its 34-byte representation.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PublinkError> {
        if bytes.len() != PUBLINK_RAW_SIZE {
            return Err(PublinkError::InvalidLength(bytes.len()));
        }
        let bitfield = u16::from_le_bytes([bytes[0], bytes[1]]);
        let mut merkle_root = [0u8; 32];
        merkle_root.copy_from_slice(&bytes[2..]);
        let link = Publink { bitfield, merkle_root };
        // Reject bitfields that do not decode to a sane range.
        link.offset_and_fetch_size()?;
        Ok(link)
    }

    /// The 34-byte representation: little-endian bitfield, then the root.
    pub fn to_bytes(&self) -> [u8; PUBLINK_RAW_SIZE] {
        let mut out = [0u8; PUBLINK_RAW_SIZE];
        out[..2].copy_from_slice(&self.bitfield.to_le_bytes());
        out[2..].copy_from_slice(&self.merkle_root);
        out
    }

    pub fn bitfield(&self) -> u16 {
        self.bitfield
    }

    pub fn merkle_root(&self) -> &[u8; 32] {
        &self.merkle_root
    }

    pub fn version(&self) -> u16 {
        (self.bitfield & 0x3) + 1
    }

    /// Decode the fetch range described by the bitfield.
    pub fn offset_and_fetch_size(&self) -> Result<(u64, u64), PublinkError> {
        if self.version() != 1 {
            return Err(PublinkError::UnsupportedVersion(self.version()));
        }
        let mut bits = self.bitfield >> 2;
        let mut mode = 0u32;
        while bits & 1 == 1 {
            mode += 1;
            bits >>= 1;
            if mode > MAX_MODE {
                return Err(PublinkError::InvalidBitfield(self.bitfield));
            }
        }
        bits >>= 1; // mode run terminator
        let fetch_index = u64::from(bits & 0x7);
        bits >>= 3;
        let offset_index = u64::from(bits);

        let inc = mode_increment(mode);
        let fetch_size = mode_base(mode) + (fetch_index + 1) * inc;
        let offset = offset_index * inc;
        if offset + fetch_size > SECTOR_SIZE {
            return Err(PublinkError::RangeOutOfBounds { offset, fetch_size });
        }
        Ok((offset, fetch_size))
    }

    /// The byte offset of the fetch range within the base sector.
    pub fn offset(&self) -> Result<u64, PublinkError> {
        self.offset_and_fetch_size().map(|(offset, _)| offset)
    }

    /// How many bytes must be fetched to obtain the metadata header.
    pub fn fetch_size(&self) -> Result<u64, PublinkError> {
        self.offset_and_fetch_size().map(|(_, fetch_size)| fetch_size)
    }
}

fn mode_increment(mode: u32) -> u64 {
    FETCH_ALIGN << mode
}

fn mode_base(mode: u32) -> u64 {
    if mode == 0 {
        0
    } else {
        (FETCH_ALIGN * 8) << (mode - 1)
    }
}

impl fmt::Display for Publink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&URL_SAFE_NO_PAD.encode(self.to_bytes()))
    }
}

impl FromStr for Publink {
    type Err = PublinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != PUBLINK_ENCODED_LEN {
            return Err(PublinkError::InvalidLength(s.len()));
        }
        let bytes = URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|_| PublinkError::DecodeFailed)?;
        Publink::from_bytes(&bytes)
    }
}

impl Serialize for Publink {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Publink {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Split the raw retrieval route capture into its components: the publink,
/// the request string with any query stripped, and the in-pubfile path.
///
/// The returned no-query string keeps a trailing slash if the caller sent
/// one; the retrieval engine uses that to decide whether a default-path
/// redirect is needed.
pub fn parse_request(s: &str) -> Result<(Publink, String, String), PublinkError> {
    let s = s.strip_prefix('/').unwrap_or(s);
    let no_query = s.split('?').next().unwrap_or_default();

    let (link_str, rest) = match no_query.split_once('/') {
        Some((link, rest)) => (link, rest),
        None => (no_query, ""),
    };
    let inner_path = if rest.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", rest.trim_start_matches('/'))
    };
    if inner_path.split('/').any(|segment| segment == "..") {
        return Err(PublinkError::InnerPathTraversal(inner_path));
    }

    let publink = link_str.parse()?;
    Ok((publink, no_query.to_string(), inner_path))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublinkError {
    #[error("publink has invalid length {0}")]
    InvalidLength(usize),
    #[error("publink is not valid base64")]
    DecodeFailed,
    #[error("unsupported publink version {0}")]
    UnsupportedVersion(u16),
    #[error("publink bitfield {0:#06x} does not decode")]
    InvalidBitfield(u16),
    #[error("offset {0} is not representable")]
    InvalidOffset(u64),
    #[error("fetch size {0} is not representable")]
    InvalidFetchSize(u64),
    #[error("fetch range {offset}+{fetch_size} exceeds the sector")]
    RangeOutOfBounds { offset: u64, fetch_size: u64 },
    #[error("inner path {0} contains a parent-directory segment")]
    InnerPathTraversal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root(byte: u8) -> [u8; 32] {
        [byte; 32]
    }

    #[test]
    fn test_string_roundtrip() {
        let link = Publink::new_v1(root(0xab), 0, 4096).unwrap();
        let s = link.to_string();
        assert_eq!(s.len(), PUBLINK_ENCODED_LEN);
        let parsed: Publink = s.parse().unwrap();
        assert_eq!(parsed, link);
    }

    #[test]
    fn test_bytes_roundtrip() {
        let link = Publink::new_v1(root(7), 8192, 12288).unwrap();
        let parsed = Publink::from_bytes(&link.to_bytes()).unwrap();
        assert_eq!(parsed, link);
        assert_eq!(parsed.merkle_root(), &root(7));
    }

    #[test]
    fn test_small_fetch_sizes_exact() {
        for fetch in [4096u64, 8192, 16384, 32768] {
            let link = Publink::new_v1(root(1), 0, fetch).unwrap();
            let (offset, decoded) = link.offset_and_fetch_size().unwrap();
            assert_eq!(offset, 0);
            assert_eq!(decoded, fetch, "fetch size {fetch} should be exact");
        }
    }

    #[test]
    fn test_fetch_size_rounds_up() {
        let link = Publink::new_v1(root(1), 0, 1000).unwrap();
        let (_, fetch) = link.offset_and_fetch_size().unwrap();
        assert_eq!(fetch, 4096);

        let link = Publink::new_v1(root(1), 0, 4097).unwrap();
        let (_, fetch) = link.offset_and_fetch_size().unwrap();
        assert_eq!(fetch, 8192);
    }

    #[test]
    fn test_full_sector_fetch() {
        let link = Publink::new_v1(root(2), 0, SECTOR_SIZE).unwrap();
        let (offset, fetch) = link.offset_and_fetch_size().unwrap();
        assert_eq!(offset, 0);
        assert_eq!(fetch, SECTOR_SIZE);
    }

    #[test]
    fn test_offset_and_fetch_roundtrip() {
        let cases = [
            (0u64, 4096u64),
            (4096, 4096),
            (40960, 20480),
            (1 << 21, 1 << 21),
            (0, 3 << 20),
        ];
        for (offset, fetch) in cases {
            let link = Publink::new_v1(root(3), offset, fetch).unwrap();
            let (decoded_offset, decoded_fetch) = link.offset_and_fetch_size().unwrap();
            assert_eq!(decoded_offset, offset);
            assert!(decoded_fetch >= fetch);
            let again = Publink::new_v1(root(3), decoded_offset, decoded_fetch).unwrap();
            assert_eq!(again, link);
        }
    }

    #[test]
    fn test_unaligned_offset_rejected() {
        assert!(matches!(
            Publink::new_v1(root(0), 100, 4096),
            Err(PublinkError::InvalidOffset(100))
        ));
    }

    #[test]
    fn test_range_past_sector_rejected() {
        let err = Publink::new_v1(root(0), SECTOR_SIZE - 4096, 8192).unwrap_err();
        assert!(matches!(err, PublinkError::RangeOutOfBounds { .. }));
    }

    #[test]
    fn test_zero_fetch_rejected() {
        assert!(Publink::new_v1(root(0), 0, 0).is_err());
    }

    #[test]
    fn test_parse_rejects_bad_strings() {
        assert!(matches!("".parse::<Publink>(), Err(PublinkError::InvalidLength(0))));
        assert!("short".parse::<Publink>().is_err());
        let not_base64 = "!".repeat(PUBLINK_ENCODED_LEN);
        assert!(matches!(not_base64.parse::<Publink>(), Err(PublinkError::DecodeFailed)));
    }

    #[test]
    fn test_parse_request_bare_link() {
        let link = Publink::new_v1(root(9), 0, 4096).unwrap();
        let s = link.to_string();
        let (parsed, no_query, path) = parse_request(&s).unwrap();
        assert_eq!(parsed, link);
        assert_eq!(no_query, s);
        assert_eq!(path, "/");
    }

    #[test]
    fn test_parse_request_with_path_and_query() {
        let link = Publink::new_v1(root(9), 0, 4096).unwrap();
        let raw = format!("/{}/assets/app.js?attachment=1", link);
        let (parsed, no_query, path) = parse_request(&raw).unwrap();
        assert_eq!(parsed, link);
        assert_eq!(no_query, format!("{}/assets/app.js", link));
        assert_eq!(path, "/assets/app.js");
    }

    #[test]
    fn test_parse_request_preserves_trailing_slash() {
        let link = Publink::new_v1(root(9), 0, 4096).unwrap();
        let raw = format!("{}/", link);
        let (_, no_query, path) = parse_request(&raw).unwrap();
        assert_eq!(no_query, raw);
        assert_eq!(path, "/");
    }

    #[test]
    fn test_parse_request_rejects_traversal() {
        let link = Publink::new_v1(root(9), 0, 4096).unwrap();
        let raw = format!("{}/a/../b", link);
        assert!(matches!(
            parse_request(&raw),
            Err(PublinkError::InnerPathTraversal(_))
        ));
    }

    #[test]
    fn test_parse_request_empty_input() {
        assert!(parse_request("").is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let link = Publink::new_v1(root(4), 0, 8192).unwrap();
        let json = serde_json::to_string(&link).unwrap();
        assert_eq!(json, format!("\"{}\"", link));
        let back: Publink = serde_json::from_str(&json).unwrap();
        assert_eq!(back, link);
    }
}
