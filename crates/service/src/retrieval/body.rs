//! Response-body streaming.
//!
//! The payload copy runs on a blocking thread: the streamer contract is
//! synchronous `Read + Seek`, and the archive writers are synchronous
//! too. Chunks travel through a bounded flume channel into the axum
//! `Body`, which gives natural backpressure against slow clients. The
//! writer checks the request deadline between chunks; an expired deadline
//! or a read failure pushes an error into the channel, aborting the
//! response stream mid-body.

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use bytes::Bytes;

use common::prelude::{PubfileFormat, PubfileMetadata};

use crate::archive::{archive_entries, write_tar, write_tar_gz, write_zip, ArchiveError};
use crate::backend::BoxedStreamer;
use crate::stats::StatsRecorder;

const COPY_BUF_SIZE: usize = 64 * 1024;
const CHANNEL_DEPTH: usize = 8;

pub struct BodyContext {
    pub stats: Arc<StatsRecorder>,
    pub started: Instant,
    pub deadline: Instant,
    /// The publink's declared fetch size, for stats bucketing. `None`
    /// skips the download observation.
    pub fetch_size: Option<u64>,
}

/// Stream `length` bytes from the (already sliced) streamer.
pub fn stream_raw(mut streamer: BoxedStreamer, length: u64, ctx: BodyContext) -> Body {
    spawn_copy(ctx, move |writer| {
        copy_exact(&mut streamer, writer, length).map_err(ArchiveError::Io)
    })
}

/// Stream the scoped pubfile as an archive of the given format.
pub fn stream_archive(
    format: PubfileFormat,
    mut streamer: BoxedStreamer,
    metadata: PubfileMetadata,
    ctx: BodyContext,
) -> Body {
    spawn_copy(ctx, move |writer| {
        let files = archive_entries(&metadata, &mut streamer)?;
        match format {
            PubfileFormat::Tar => write_tar(writer, &mut streamer, &files),
            PubfileFormat::TarGz => write_tar_gz(writer, &mut streamer, &files),
            PubfileFormat::Zip => write_zip(writer, &mut streamer, &files),
            _ => Err(ArchiveError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{format} is not an archive format"),
            ))),
        }
    })
}

fn spawn_copy<F>(ctx: BodyContext, copy: F) -> Body
where
    F: FnOnce(&mut ChannelWriter) -> Result<(), ArchiveError> + Send + 'static,
{
    let (tx, rx) = flume::bounded::<Result<Bytes, io::Error>>(CHANNEL_DEPTH);
    tokio::task::spawn_blocking(move || {
        let mut writer = ChannelWriter {
            tx: tx.clone(),
            deadline: ctx.deadline,
        };
        match copy(&mut writer).and_then(|()| writer.flush().map_err(ArchiveError::Io)) {
            Ok(()) => {
                if let Some(fetch_size) = ctx.fetch_size {
                    ctx.stats
                        .observe_download(fetch_size, ctx.started.elapsed());
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "response body aborted");
                let _ = tx.send(Err(io::Error::new(io::ErrorKind::Other, err.to_string())));
            }
        }
    });
    Body::from_stream(rx.into_stream())
}

fn copy_exact<R: Read>(src: &mut R, dst: &mut ChannelWriter, length: u64) -> io::Result<()> {
    let mut remaining = length;
    let mut buf = [0u8; COPY_BUF_SIZE];
    while remaining > 0 {
        let want = buf.len().min(remaining as usize);
        let n = src.read(&mut buf[..want])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "streamer ended before the declared length",
            ));
        }
        dst.write_all(&buf[..n])?;
        remaining -= n as u64;
    }
    Ok(())
}

struct ChannelWriter {
    tx: flume::Sender<Result<Bytes, io::Error>>,
    deadline: Instant,
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if Instant::now() > self.deadline {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "request deadline exceeded while streaming the body",
            ));
        }
        if buf.is_empty() {
            return Ok(0);
        }
        self.tx
            .send(Ok(Bytes::copy_from_slice(buf)))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "response stream closed"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
