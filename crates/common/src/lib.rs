/**
 * Publink value type and codec.
 *  - 34-byte identifier (bitfield + merkle root)
 *  - URL-safe base64 textual form
 *  - request-path splitting for the retrieval route
 */
pub mod publink;
/**
 * Pubfile metadata and response formats.
 *  - subfile layout, path resolution and validation
 *  - the format requested by the `format` query parameter
 */
pub mod pubfile;

pub mod prelude {
    pub use crate::publink::{Publink, PublinkError, SECTOR_SIZE};
    pub use crate::pubfile::{
        ensure_prefix, validate_path, PathError, PubfileFormat, PubfileMetadata, Subfiles,
        SubfileMetadata,
    };
}
