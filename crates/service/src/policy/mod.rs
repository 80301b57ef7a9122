//! # Access policy
//!
//! The blacklist (hashed merkle roots whose pubfiles must not be served
//! or pinned) and the portal list (known portal net-addresses). Both are
//! mutated in all-or-nothing batches, persisted to append-logs before the
//! in-memory state changes, and replayed on startup.
//!
//! Readers take the shared lock; batch mutations take the exclusive lock
//! and persist inside it, so a failed write leaves the pre-batch state
//! visible everywhere.

mod persist;

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use common::prelude::Publink;

use persist::AppendLog;

const BLACKLIST_LOG: &str = "blacklist.log";
const PORTALS_LOG: &str = "portals.log";
const BLACKLIST_RECORD_SIZE: usize = 33;

/// A portal network address, `host:port`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NetAddress(String);

impl NetAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for NetAddress {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| PolicyError::Validation(format!("address {s:?} is missing a port")))?;
        if host.is_empty() || host.contains(|c: char| c.is_whitespace() || c == '/') {
            return Err(PolicyError::Validation(format!("invalid host in address {s:?}")));
        }
        if host.starts_with('[') != host.ends_with(']') {
            return Err(PolicyError::Validation(format!("invalid host in address {s:?}")));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| PolicyError::Validation(format!("invalid port in address {s:?}")))?;
        if port == 0 {
            return Err(PolicyError::Validation(format!("invalid port in address {s:?}")));
        }
        Ok(NetAddress(s.to_string()))
    }
}

impl fmt::Display for NetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for NetAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for NetAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A known pubaccess portal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Portal {
    pub address: NetAddress,
    pub public: bool,
}

/// Outcome of a portal batch; removals naming absent portals are ignored
/// but surfaced to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortalUpdateSummary {
    pub ignored_removals: usize,
}

pub struct AccessPolicy {
    inner: RwLock<PolicyInner>,
}

struct PolicyInner {
    blacklist: HashSet<[u8; 32]>,
    portals: BTreeMap<NetAddress, bool>,
    blacklist_log: AppendLog,
    portals_log: AppendLog,
}

/// The blacklist stores hashes of merkle roots, never the roots
/// themselves.
pub fn hash_root(root: &[u8; 32]) -> [u8; 32] {
    Sha256::digest(root).into()
}

impl AccessPolicy {
    /// Open the policy logs in `dir` and replay them.
    pub fn load(dir: &Path) -> Result<Self, PolicyError> {
        std::fs::create_dir_all(dir)?;

        let (blacklist_log, blacklist_records) = AppendLog::open(&dir.join(BLACKLIST_LOG))?;
        let mut blacklist = HashSet::new();
        for record in blacklist_records {
            match decode_blacklist_record(&record) {
                Some((hash, true)) => {
                    blacklist.insert(hash);
                }
                Some((hash, false)) => {
                    blacklist.remove(&hash);
                }
                None => {
                    tracing::warn!(path = %blacklist_log.path().display(), "skipping malformed blacklist record");
                }
            }
        }

        let (portals_log, portal_records) = AppendLog::open(&dir.join(PORTALS_LOG))?;
        let mut portals = BTreeMap::new();
        for record in portal_records {
            match decode_portal_record(&record) {
                Some((address, public, true)) => {
                    portals.insert(address, public);
                }
                Some((address, _, false)) => {
                    portals.remove(&address);
                }
                None => {
                    tracing::warn!(path = %portals_log.path().display(), "skipping malformed portal record");
                }
            }
        }

        Ok(Self {
            inner: RwLock::new(PolicyInner {
                blacklist,
                portals,
                blacklist_log,
                portals_log,
            }),
        })
    }

    /// Admission check for the retrieval and pin paths.
    pub fn check_retrieval(&self, publink: &Publink) -> Result<(), PolicyError> {
        if self.is_blacklisted(publink) {
            return Err(PolicyError::Blacklisted);
        }
        Ok(())
    }

    pub fn is_blacklisted(&self, publink: &Publink) -> bool {
        self.inner
            .read()
            .blacklist
            .contains(&hash_root(publink.merkle_root()))
    }

    /// Batch-update the blacklist. Additions and removals must be
    /// disjoint; the batch is persisted before it becomes visible.
    pub fn update_blacklist(
        &self,
        additions: &[Publink],
        removals: &[Publink],
    ) -> Result<(), PolicyError> {
        let add_hashes: Vec<[u8; 32]> =
            additions.iter().map(|p| hash_root(p.merkle_root())).collect();
        let remove_hashes: Vec<[u8; 32]> =
            removals.iter().map(|p| hash_root(p.merkle_root())).collect();
        let remove_set: HashSet<&[u8; 32]> = remove_hashes.iter().collect();
        if add_hashes.iter().any(|h| remove_set.contains(h)) {
            return Err(PolicyError::Validation(
                "a publink cannot be added and removed in the same batch".to_string(),
            ));
        }

        let mut records = Vec::with_capacity(add_hashes.len() + remove_hashes.len());
        for hash in &add_hashes {
            records.push(encode_blacklist_record(hash, true));
        }
        for hash in &remove_hashes {
            records.push(encode_blacklist_record(hash, false));
        }

        let mut inner = self.inner.write();
        inner.blacklist_log.append_batch(&records)?;
        for hash in add_hashes {
            inner.blacklist.insert(hash);
        }
        for hash in remove_hashes {
            inner.blacklist.remove(&hash);
        }
        Ok(())
    }

    /// Batch-update the portal list. Added addresses must be unique and
    /// must not appear among the removals; removals of absent portals are
    /// ignored but counted.
    pub fn update_portals(
        &self,
        additions: &[Portal],
        removals: &[NetAddress],
    ) -> Result<PortalUpdateSummary, PolicyError> {
        let mut seen = HashSet::new();
        for portal in additions {
            if !seen.insert(&portal.address) {
                return Err(PolicyError::Validation(format!(
                    "duplicate portal address {}",
                    portal.address
                )));
            }
        }
        if removals.iter().any(|addr| seen.contains(addr)) {
            return Err(PolicyError::Validation(
                "a portal cannot be added and removed in the same batch".to_string(),
            ));
        }

        let mut records = Vec::with_capacity(additions.len() + removals.len());
        for portal in additions {
            records.push(encode_portal_record(&portal.address, portal.public, true));
        }
        for address in removals {
            records.push(encode_portal_record(address, false, false));
        }

        let mut inner = self.inner.write();
        let ignored_removals = removals
            .iter()
            .filter(|addr| !inner.portals.contains_key(addr))
            .count();
        inner.portals_log.append_batch(&records)?;
        for portal in additions {
            inner.portals.insert(portal.address.clone(), portal.public);
        }
        for address in removals {
            inner.portals.remove(address);
        }
        Ok(PortalUpdateSummary { ignored_removals })
    }

    /// Consistent copy of the blacklisted root hashes, sorted.
    pub fn blacklist_snapshot(&self) -> Vec<[u8; 32]> {
        let mut hashes: Vec<[u8; 32]> = self.inner.read().blacklist.iter().copied().collect();
        hashes.sort_unstable();
        hashes
    }

    /// Consistent copy of the portal list.
    pub fn portals_snapshot(&self) -> Vec<Portal> {
        self.inner
            .read()
            .portals
            .iter()
            .map(|(address, public)| Portal {
                address: address.clone(),
                public: *public,
            })
            .collect()
    }
}

fn encode_blacklist_record(hash: &[u8; 32], listed: bool) -> Vec<u8> {
    let mut record = Vec::with_capacity(BLACKLIST_RECORD_SIZE);
    record.extend_from_slice(hash);
    record.push(listed as u8);
    record
}

fn decode_blacklist_record(record: &[u8]) -> Option<([u8; 32], bool)> {
    if record.len() != BLACKLIST_RECORD_SIZE {
        return None;
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&record[..32]);
    Some((hash, record[32] == 1))
}

fn encode_portal_record(address: &NetAddress, public: bool, listed: bool) -> Vec<u8> {
    let mut record = Vec::with_capacity(2 + address.as_str().len());
    record.push(listed as u8);
    record.push(public as u8);
    record.extend_from_slice(address.as_str().as_bytes());
    record
}

fn decode_portal_record(record: &[u8]) -> Option<(NetAddress, bool, bool)> {
    if record.len() < 3 {
        return None;
    }
    let listed = record[0] == 1;
    let public = record[1] == 1;
    let address = std::str::from_utf8(&record[2..]).ok()?.parse().ok()?;
    Some((address, public, listed))
}

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("publink is blacklisted")]
    Blacklisted,
    #[error("could not validate additions and removals: {0}")]
    Validation(String),
    #[error("policy persistence failed: {0}")]
    Persist(#[from] std::io::Error),
}
