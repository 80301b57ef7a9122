//! Bucketed latency counters for the stats route.
//!
//! Downloads are bucketed by the publink's declared fetch size, uploads
//! by the stored file size. Time-to-first-byte is a single distribution;
//! requests that fail before headers contribute a zero-duration
//! observation so the request count stays honest.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, Default)]
struct Distribution {
    requests: u64,
    total: Duration,
}

impl Distribution {
    fn add(&mut self, duration: Duration) {
        self.requests += 1;
        self.total += duration;
    }

    fn snapshot(&self) -> DistributionSnapshot {
        let total_ms = self.total.as_millis() as u64;
        DistributionSnapshot {
            requests: self.requests,
            total_ms,
            avg_ms: if self.requests == 0 {
                0
            } else {
                total_ms / self.requests
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct DistributionSnapshot {
    pub requests: u64,
    #[serde(rename = "totalms")]
    pub total_ms: u64,
    #[serde(rename = "avgms")]
    pub avg_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DownloadBucket {
    Small64K,
    Medium1M,
    Large4M,
    Huge,
}

impl DownloadBucket {
    fn for_fetch_size(fetch_size: u64) -> Self {
        if fetch_size <= 64 * KIB {
            DownloadBucket::Small64K
        } else if fetch_size <= MIB {
            DownloadBucket::Medium1M
        } else if fetch_size <= 4 * MIB {
            DownloadBucket::Large4M
        } else {
            DownloadBucket::Huge
        }
    }
}

#[derive(Default)]
struct Counters {
    ttfb: Distribution,
    download_64kb: Distribution,
    download_1mb: Distribution,
    download_4mb: Distribution,
    download_large: Distribution,
    upload_4mb: Distribution,
    upload_large: Distribution,
}

pub struct StatsRecorder {
    started_at: Instant,
    counters: Mutex<Counters>,
}

impl Default for StatsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Time from request start until the response headers were ready.
    pub fn observe_ttfb(&self, duration: Duration) {
        self.counters.lock().ttfb.add(duration);
    }

    /// A request that failed before producing headers.
    pub fn observe_error(&self) {
        self.observe_ttfb(Duration::ZERO);
    }

    /// A completed download, bucketed by the publink's fetch size.
    pub fn observe_download(&self, fetch_size: u64, duration: Duration) {
        let mut counters = self.counters.lock();
        match DownloadBucket::for_fetch_size(fetch_size) {
            DownloadBucket::Small64K => counters.download_64kb.add(duration),
            DownloadBucket::Medium1M => counters.download_1mb.add(duration),
            DownloadBucket::Large4M => counters.download_4mb.add(duration),
            DownloadBucket::Huge => counters.download_large.add(duration),
        }
    }

    /// A completed upload, bucketed by the stored file size.
    pub fn observe_upload(&self, size: u64, duration: Duration) {
        let mut counters = self.counters.lock();
        if size <= 4 * MIB {
            counters.upload_4mb.add(duration);
        } else {
            counters.upload_large.add(duration);
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn snapshot(&self) -> PerformanceSnapshot {
        let counters = self.counters.lock();
        PerformanceSnapshot {
            ttfb: counters.ttfb.snapshot(),
            download_64kb: counters.download_64kb.snapshot(),
            download_1mb: counters.download_1mb.snapshot(),
            download_4mb: counters.download_4mb.snapshot(),
            download_large: counters.download_large.snapshot(),
            upload_4mb: counters.upload_4mb.snapshot(),
            upload_large: counters.upload_large.snapshot(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct PerformanceSnapshot {
    #[serde(rename = "timetofirstbyte")]
    pub ttfb: DistributionSnapshot,
    #[serde(rename = "download64kb")]
    pub download_64kb: DistributionSnapshot,
    #[serde(rename = "download1mb")]
    pub download_1mb: DistributionSnapshot,
    #[serde(rename = "download4mb")]
    pub download_4mb: DistributionSnapshot,
    #[serde(rename = "downloadlarge")]
    pub download_large: DistributionSnapshot,
    #[serde(rename = "upload4mb")]
    pub upload_4mb: DistributionSnapshot,
    #[serde(rename = "uploadlarge")]
    pub upload_large: DistributionSnapshot,
}
