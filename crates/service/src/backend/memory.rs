//! In-memory backend.
//!
//! Content-addresses every upload by hashing the metadata header and the
//! payload, which is enough to exercise the engines and the HTTP surface.
//! It intentionally knows nothing about sectors, fanouts or redundancy;
//! `base_chunk_redundancy` is accepted and ignored.

use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use common::prelude::{Publink, PubfileMetadata, SECTOR_SIZE};

use super::{Backend, BackendError, BoxedStreamer, StoreStats, UploadRequest, UploadSource};

#[derive(Default)]
pub struct MemoryBackend {
    inner: RwLock<Inner>,
    latency: Option<Duration>,
}

#[derive(Default)]
struct Inner {
    pubfiles: HashMap<[u8; 32], StoredPubfile>,
    site_paths: BTreeMap<String, [u8; 32]>,
}

#[derive(Clone)]
struct StoredPubfile {
    metadata: PubfileMetadata,
    payload: Bytes,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that sleeps before answering downloads. Lets tests drive
    /// the deadline paths.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            latency: Some(latency),
        }
    }

    /// Seed a pubfile directly, bypassing the upload path.
    pub fn insert_pubfile(
        &self,
        metadata: PubfileMetadata,
        payload: impl Into<Bytes>,
    ) -> Result<Publink, BackendError> {
        let payload = payload.into();
        let publink = address(&metadata, &payload)?;
        self.inner
            .write()
            .pubfiles
            .insert(*publink.merkle_root(), StoredPubfile { metadata, payload });
        Ok(publink)
    }
}

fn address(metadata: &PubfileMetadata, payload: &[u8]) -> Result<Publink, BackendError> {
    let header =
        serde_json::to_vec(metadata).map_err(|e| BackendError::Other(e.to_string()))?;
    let mut hasher = Sha256::new();
    hasher.update(&header);
    hasher.update(payload);
    let root: [u8; 32] = hasher.finalize().into();

    let fetch_size = ((header.len() + payload.len()) as u64).clamp(1, SECTOR_SIZE);
    Publink::new_v1(root, 0, fetch_size).map_err(|e| BackendError::Other(e.to_string()))
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn download(
        &self,
        publink: &Publink,
        _deadline: Duration,
    ) -> Result<(PubfileMetadata, BoxedStreamer), BackendError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let stored = self
            .inner
            .read()
            .pubfiles
            .get(publink.merkle_root())
            .cloned()
            .ok_or(BackendError::NotFound)?;
        let streamer: BoxedStreamer = Box::new(Cursor::new(stored.payload));
        Ok((stored.metadata, streamer))
    }

    async fn upload(&self, request: UploadRequest) -> Result<Publink, BackendError> {
        let mut metadata = request.metadata;
        let payload: Bytes = match request.source {
            UploadSource::Reader(mut reader) => {
                let mut buf = Vec::new();
                reader
                    .read_to_end(&mut buf)
                    .map_err(|e| BackendError::Other(e.to_string()))?;
                buf.into()
            }
            UploadSource::Convert(convert_path) => {
                let inner = self.inner.read();
                let root = inner
                    .site_paths
                    .get(convert_path.as_str())
                    .ok_or(BackendError::NotFound)?;
                inner.pubfiles[root].payload.clone()
            }
        };
        if metadata.subfiles.is_empty() {
            metadata.length = payload.len() as u64;
        }
        if metadata.filename.is_empty() {
            metadata.filename = request.site_path.base_name().to_string();
        }

        let publink = address(&metadata, &payload)?;
        let mut inner = self.inner.write();
        let target = request.site_path.as_str().to_string();
        if !request.force && !request.dry_run && inner.site_paths.contains_key(&target) {
            return Err(BackendError::AlreadyExists(target));
        }
        if !request.dry_run {
            inner
                .pubfiles
                .insert(*publink.merkle_root(), StoredPubfile { metadata, payload });
            inner.site_paths.insert(target, *publink.merkle_root());
        }
        Ok(publink)
    }

    async fn store_stats(&self) -> Result<StoreStats, BackendError> {
        let inner = self.inner.read();
        let total_size = inner
            .site_paths
            .values()
            .filter_map(|root| inner.pubfiles.get(root))
            .map(|stored| stored.payload.len() as u64)
            .sum();
        Ok(StoreStats {
            num_files: inner.site_paths.len() as u64,
            total_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::site_path::SitePath;

    fn upload_request(path: &str, payload: &[u8]) -> UploadRequest {
        UploadRequest {
            site_path: SitePath::new(path).unwrap(),
            force: false,
            dry_run: false,
            base_chunk_redundancy: 0,
            metadata: PubfileMetadata {
                filename: "file".to_string(),
                ..Default::default()
            },
            key: None,
            source: UploadSource::Reader(Box::new(Cursor::new(payload.to_vec()))),
        }
    }

    #[tokio::test]
    async fn test_upload_then_download() {
        let backend = MemoryBackend::new();
        let publink = backend
            .upload(upload_request("pubaccess/test", b"hello"))
            .await
            .unwrap();

        let (metadata, mut streamer) = backend
            .download(&publink, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(metadata.length, 5);
        let mut body = Vec::new();
        streamer.read_to_end(&mut body).unwrap();
        assert_eq!(body, b"hello");
    }

    #[tokio::test]
    async fn test_duplicate_site_path_requires_force() {
        let backend = MemoryBackend::new();
        backend
            .upload(upload_request("pubaccess/dup", b"one"))
            .await
            .unwrap();
        let err = backend
            .upload(upload_request("pubaccess/dup", b"two"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::AlreadyExists(_)));

        let mut forced = upload_request("pubaccess/dup", b"two");
        forced.force = true;
        backend.upload(forced).await.unwrap();
    }

    #[tokio::test]
    async fn test_dry_run_does_not_store() {
        let backend = MemoryBackend::new();
        let mut request = upload_request("pubaccess/ghost", b"phantom");
        request.dry_run = true;
        let publink = backend.upload(request).await.unwrap();
        assert!(matches!(
            backend.download(&publink, Duration::from_secs(1)).await,
            Err(BackendError::NotFound)
        ));
        let stats = backend.store_stats().await.unwrap();
        assert_eq!(stats.num_files, 0);
    }

    #[tokio::test]
    async fn test_store_stats() {
        let backend = MemoryBackend::new();
        backend
            .upload(upload_request("pubaccess/a", b"aaaa"))
            .await
            .unwrap();
        backend
            .upload(upload_request("pubaccess/b", b"bb"))
            .await
            .unwrap();
        let stats = backend.store_stats().await.unwrap();
        assert_eq!(stats.num_files, 2);
        assert_eq!(stats.total_size, 6);
    }
}
