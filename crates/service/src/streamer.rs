//! A limit+offset slice over a pubfile streamer.
//!
//! Wraps a `Read + Seek` payload cursor so that only the window
//! `[offset, offset + length)` is visible. The underlying seek to the
//! window start is deferred until the first read, so wrapping is free for
//! requests that never produce a body (HEAD, redirects).

use std::io::{self, Read, Seek, SeekFrom};

pub struct LimitStreamer<S> {
    inner: S,
    base: u64,
    length: u64,
    /// Position within the window, `0..=length`.
    pos: u64,
    positioned: bool,
}

impl<S: Read + Seek> LimitStreamer<S> {
    pub fn new(inner: S, offset: u64, length: u64) -> Self {
        Self {
            inner,
            base: offset,
            length,
            pos: 0,
            positioned: false,
        }
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: Read + Seek> Read for LimitStreamer<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.positioned {
            self.inner.seek(SeekFrom::Start(self.base + self.pos))?;
            self.positioned = true;
        }
        let remaining = self.length.saturating_sub(self.pos);
        if remaining == 0 {
            return Ok(0);
        }
        let cap = buf.len().min(remaining as usize);
        let n = self.inner.read(&mut buf[..cap])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<S: Read + Seek> Seek for LimitStreamer<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => n as i64,
            SeekFrom::End(n) => self.length as i64 + n,
            SeekFrom::Current(n) => self.pos as i64 + n,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before the start of the streamer window",
            ));
        }
        self.pos = target as u64;
        self.positioned = false;
        Ok(self.pos)
    }
}
