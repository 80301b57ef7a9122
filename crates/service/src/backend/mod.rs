//! The storage backend contract.
//!
//! The engines never talk to the network or the erasure-coded store
//! directly; they are written against [`Backend`], which resolves a
//! publink into pubfile metadata plus a random-access streamer over the
//! payload, and accepts uploads addressed by site path. The production
//! deployment plugs the real storage engine in here; the in-memory
//! [`MemoryBackend`] backs the standalone portal binary and the tests.

mod memory;

use std::io::{Read, Seek};
use std::time::Duration;

use async_trait::async_trait;

use common::prelude::{Publink, PubfileMetadata};

use crate::site_path::SitePath;

pub use memory::MemoryBackend;

/// A blocking read+seek cursor over exactly the pubfile payload.
///
/// Reads advance the cursor, seeks are absolute within the payload, and
/// dropping the streamer releases its backing resources.
pub trait PubfileStreamer: Read + Seek + Send {}

impl<T: Read + Seek + Send> PubfileStreamer for T {}

pub type BoxedStreamer = Box<dyn PubfileStreamer>;

/// Where the bytes of an upload come from.
pub enum UploadSource {
    /// Stream the payload from a reader (HTTP body, pin copy).
    Reader(Box<dyn Read + Send>),
    /// Convert a file already in the store into a pubfile.
    Convert(SitePath),
}

/// Reference to a pubaccesskey used to encrypt an upload. Opaque to the
/// engines; the backend owns key management.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PubaccesskeyRef {
    Name(String),
    Id(String),
}

pub struct UploadRequest {
    pub site_path: SitePath,
    pub force: bool,
    pub dry_run: bool,
    /// 0 means the backend's default redundancy.
    pub base_chunk_redundancy: u8,
    pub metadata: PubfileMetadata,
    pub key: Option<PubaccesskeyRef>,
    pub source: UploadSource,
}

/// Aggregate numbers about the local store, surfaced by the stats route.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreStats {
    pub num_files: u64,
    pub total_size: u64,
}

#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Resolve a publink into its metadata and a payload streamer.
    ///
    /// The deadline is advisory: callers additionally enforce it, but the
    /// backend should abort in-flight network work when it expires.
    async fn download(
        &self,
        publink: &Publink,
        deadline: Duration,
    ) -> Result<(PubfileMetadata, BoxedStreamer), BackendError>;

    /// Store a pubfile and return the publink addressing it.
    async fn upload(&self, request: UploadRequest) -> Result<Publink, BackendError>;

    /// Numbers for the stats route.
    async fn store_stats(&self) -> Result<StoreStats, BackendError>;
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("publink root not found")]
    NotFound,
    #[error("a file already exists at {0}")]
    AlreadyExists(String),
    #[error("backend deadline exceeded")]
    Timeout,
    #[error("{0}")]
    Other(String),
}
