//! Append-log persistence for the access policy.
//!
//! Each list lives in its own log file. The file starts with a 32-byte
//! header (16-byte magic specifier + 16-byte version) and is followed by
//! length-prefixed records, each closed by an 8-byte truncated SHA-256
//! checksum. A batch commit is one contiguous write + flush + fsync, so
//! readers replaying the log either see the whole batch or none of it;
//! replay stops at the first torn or corrupt record.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

const MAGIC: [u8; 16] = *b"pubaccess-list\0\0";
const VERSION: [u8; 16] = *b"v1\0\0\0\0\0\0\0\0\0\0\0\0\0\0";
const HEADER_SIZE: usize = 32;
const CHECKSUM_SIZE: usize = 8;

pub struct AppendLog {
    path: PathBuf,
    file: File,
}

impl AppendLog {
    /// Open (or create) the log at `path` and replay its records.
    pub fn open(path: &Path) -> io::Result<(Self, Vec<Vec<u8>>)> {
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;

        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;

        if contents.is_empty() {
            let mut header = Vec::with_capacity(HEADER_SIZE);
            header.extend_from_slice(&MAGIC);
            header.extend_from_slice(&VERSION);
            file.write_all(&header)?;
            file.sync_all()?;
            return Ok((
                Self {
                    path: path.to_path_buf(),
                    file,
                },
                Vec::new(),
            ));
        }

        if contents.len() < HEADER_SIZE
            || contents[..16] != MAGIC
            || contents[16..HEADER_SIZE] != VERSION
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} is not a pubaccess list log", path.display()),
            ));
        }

        let records = replay(&contents[HEADER_SIZE..], path);
        Ok((
            Self {
                path: path.to_path_buf(),
                file,
            },
            records,
        ))
    }

    /// Append a batch of records as one contiguous, durable write.
    pub fn append_batch(&mut self, records: &[Vec<u8>]) -> io::Result<()> {
        let mut buf = Vec::new();
        for record in records {
            frame_record(&mut buf, record)?;
        }
        self.file.write_all(&buf)?;
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn frame_record(buf: &mut Vec<u8>, payload: &[u8]) -> io::Result<()> {
    let len = u16::try_from(payload.len()).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, "policy record too large")
    })?;
    let len_bytes = len.to_le_bytes();
    buf.extend_from_slice(&len_bytes);
    buf.extend_from_slice(payload);
    buf.extend_from_slice(&checksum(&len_bytes, payload));
    Ok(())
}

fn checksum(len_bytes: &[u8; 2], payload: &[u8]) -> [u8; CHECKSUM_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(len_bytes);
    hasher.update(payload);
    let digest = hasher.finalize();
    let mut out = [0u8; CHECKSUM_SIZE];
    out.copy_from_slice(&digest[..CHECKSUM_SIZE]);
    out
}

fn replay(mut data: &[u8], path: &Path) -> Vec<Vec<u8>> {
    let mut records = Vec::new();
    loop {
        if data.len() < 2 {
            break;
        }
        let len_bytes = [data[0], data[1]];
        let len = u16::from_le_bytes(len_bytes) as usize;
        let total = 2 + len + CHECKSUM_SIZE;
        if data.len() < total {
            tracing::warn!(path = %path.display(), "truncated trailing record in policy log");
            break;
        }
        let payload = &data[2..2 + len];
        let stored = &data[2 + len..total];
        if stored != checksum(&len_bytes, payload) {
            tracing::warn!(path = %path.display(), "corrupt record in policy log, stopping replay");
            break;
        }
        records.push(payload.to_vec());
        data = &data[total..];
    }
    records
}
