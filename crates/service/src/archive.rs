//! Streaming archive writers.
//!
//! Each writer walks the subfile sequence in the order it is given
//! (callers pass subfiles sorted by ascending payload offset) and copies
//! exactly `length` bytes per entry from the payload streamer into the
//! archive. Nothing is buffered beyond the copy buffer and the archive
//! framing state, so arbitrarily large pubfiles stream in constant
//! memory.
//!
//! Tar and tar+gzip ride on the `tar` and `flate2` crates. The zip
//! container is framed here directly: `zip`'s writer needs a seekable
//! sink to patch entry headers, which an HTTP response body cannot
//! provide, so entries are written in streaming mode with data-descriptor
//! records and deflate-compressed payloads.

use std::io::{self, Read, Seek, SeekFrom, Write};

use flate2::write::{DeflateEncoder, GzEncoder};
use flate2::Compression;

use common::prelude::{PubfileMetadata, SubfileMetadata};

const COPY_BUF_SIZE: usize = 64 * 1024;

/// The entries to archive for a pubfile, sorted by ascending offset.
///
/// A pubfile without subfiles becomes a single entry synthesized from the
/// top-level metadata. Legacy pubfiles may lack a recorded length; those
/// learn it by seeking the streamer to its end and back (compatibility
/// fallback for historic publinks).
pub fn archive_entries<S: Read + Seek>(
    metadata: &PubfileMetadata,
    src: &mut S,
) -> Result<Vec<SubfileMetadata>, ArchiveError> {
    if !metadata.subfiles.is_empty() {
        return Ok(metadata.ordered_subfiles());
    }
    let length = if metadata.length > 0 {
        metadata.length
    } else {
        let end = src.seek(SeekFrom::End(0))?;
        src.seek(SeekFrom::Start(0))?;
        end
    };
    Ok(vec![SubfileMetadata {
        mode: metadata.mode,
        filename: metadata.filename.clone(),
        content_type: metadata.default_content_type.clone(),
        offset: 0,
        length,
    }])
}

/// Stream `files` from `src` into `dst` as a tar archive.
pub fn write_tar<W: Write, R: Read>(
    dst: W,
    src: &mut R,
    files: &[SubfileMetadata],
) -> Result<(), ArchiveError> {
    let mut builder = tar::Builder::new(dst);
    for file in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(file.length);
        header.set_mode(file.mode);
        let mut taken = (&mut *src).take(file.length);
        builder.append_data(&mut header, &file.filename, &mut taken)?;
    }
    builder.finish()?;
    Ok(())
}

/// Stream `files` from `src` into `dst` as a gzip-compressed tar archive.
pub fn write_tar_gz<W: Write, R: Read>(
    dst: W,
    src: &mut R,
    files: &[SubfileMetadata],
) -> Result<(), ArchiveError> {
    let mut encoder = GzEncoder::new(dst, Compression::default());
    write_tar(&mut encoder, src, files)?;
    encoder.try_finish()?;
    Ok(())
}

/// Stream `files` from `src` into `dst` as a zip archive.
pub fn write_zip<W: Write, R: Read>(
    dst: W,
    src: &mut R,
    files: &[SubfileMetadata],
) -> Result<(), ArchiveError> {
    let mut out = CountingWriter::new(dst);
    let mut central: Vec<CentralRecord> = Vec::with_capacity(files.len());

    for file in files {
        let name = file.filename.as_bytes();
        if name.len() > u16::MAX as usize {
            return Err(ArchiveError::EntryTooLarge(file.filename.clone()));
        }
        let header_offset = out.count;

        // Local file header. Sizes and CRC live in the trailing data
        // descriptor (general-purpose bit 3); bit 11 marks UTF-8 names.
        out.write_all(&LOCAL_HEADER_SIGNATURE.to_le_bytes())?;
        out.write_all(&VERSION_NEEDED.to_le_bytes())?;
        out.write_all(&FLAGS.to_le_bytes())?;
        out.write_all(&METHOD_DEFLATE.to_le_bytes())?;
        out.write_all(&[0u8; 4])?; // mod time + date
        out.write_all(&[0u8; 12])?; // crc, compressed size, uncompressed size
        out.write_all(&(name.len() as u16).to_le_bytes())?;
        out.write_all(&0u16.to_le_bytes())?; // extra field length
        out.write_all(name)?;

        let data_start = out.count;
        let mut crc = crc32fast::Hasher::new();
        {
            let mut encoder = DeflateEncoder::new(&mut out, Compression::default());
            let mut remaining = file.length;
            let mut buf = [0u8; COPY_BUF_SIZE];
            while remaining > 0 {
                let want = buf.len().min(remaining as usize);
                let n = src.read(&mut buf[..want])?;
                if n == 0 {
                    return Err(ArchiveError::TruncatedSource(file.filename.clone()));
                }
                crc.update(&buf[..n]);
                encoder.write_all(&buf[..n])?;
                remaining -= n as u64;
            }
            encoder.finish()?;
        }
        let compressed_size = out.count - data_start;
        let crc = crc.finalize();
        if file.length > u32::MAX as u64 || compressed_size > u32::MAX as u64 {
            return Err(ArchiveError::EntryTooLarge(file.filename.clone()));
        }

        out.write_all(&DESCRIPTOR_SIGNATURE.to_le_bytes())?;
        out.write_all(&crc.to_le_bytes())?;
        out.write_all(&(compressed_size as u32).to_le_bytes())?;
        out.write_all(&(file.length as u32).to_le_bytes())?;

        central.push(CentralRecord {
            name: file.filename.clone(),
            mode: file.mode,
            crc,
            compressed_size: compressed_size as u32,
            uncompressed_size: file.length as u32,
            header_offset,
        });
    }

    let central_start = out.count;
    for record in &central {
        if record.header_offset > u32::MAX as u64 {
            return Err(ArchiveError::EntryTooLarge(record.name.clone()));
        }
        let name = record.name.as_bytes();
        out.write_all(&CENTRAL_HEADER_SIGNATURE.to_le_bytes())?;
        out.write_all(&VERSION_MADE_BY.to_le_bytes())?;
        out.write_all(&VERSION_NEEDED.to_le_bytes())?;
        out.write_all(&FLAGS.to_le_bytes())?;
        out.write_all(&METHOD_DEFLATE.to_le_bytes())?;
        out.write_all(&[0u8; 4])?; // mod time + date
        out.write_all(&record.crc.to_le_bytes())?;
        out.write_all(&record.compressed_size.to_le_bytes())?;
        out.write_all(&record.uncompressed_size.to_le_bytes())?;
        out.write_all(&(name.len() as u16).to_le_bytes())?;
        out.write_all(&0u16.to_le_bytes())?; // extra field length
        out.write_all(&0u16.to_le_bytes())?; // comment length
        out.write_all(&0u16.to_le_bytes())?; // disk number start
        out.write_all(&0u16.to_le_bytes())?; // internal attributes
        let external = (UNIX_REGULAR_FILE | record.mode) << 16;
        out.write_all(&external.to_le_bytes())?;
        out.write_all(&(record.header_offset as u32).to_le_bytes())?;
        out.write_all(name)?;
    }
    let central_size = out.count - central_start;
    if central_start > u32::MAX as u64 {
        return Err(ArchiveError::EntryTooLarge("central directory".to_string()));
    }

    out.write_all(&END_OF_CENTRAL_SIGNATURE.to_le_bytes())?;
    out.write_all(&0u16.to_le_bytes())?; // this disk
    out.write_all(&0u16.to_le_bytes())?; // central directory disk
    out.write_all(&(central.len() as u16).to_le_bytes())?;
    out.write_all(&(central.len() as u16).to_le_bytes())?;
    out.write_all(&(central_size as u32).to_le_bytes())?;
    out.write_all(&(central_start as u32).to_le_bytes())?;
    out.write_all(&0u16.to_le_bytes())?; // comment length
    out.flush()?;
    Ok(())
}

const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;
const DESCRIPTOR_SIGNATURE: u32 = 0x0807_4b50;
const CENTRAL_HEADER_SIGNATURE: u32 = 0x0201_4b50;
const END_OF_CENTRAL_SIGNATURE: u32 = 0x0605_4b50;
const VERSION_NEEDED: u16 = 20;
/// Upper byte 3 = unix, so readers honor the mode in external attributes.
const VERSION_MADE_BY: u16 = 0x031e;
/// Bit 3: sizes follow in a data descriptor. Bit 11: UTF-8 names.
const FLAGS: u16 = 0x0808;
const METHOD_DEFLATE: u16 = 8;
const UNIX_REGULAR_FILE: u32 = 0o100000;

struct CentralRecord {
    name: String,
    mode: u32,
    crc: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    header_offset: u64,
}

struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("failed to write archive: {0}")]
    Io(#[from] io::Error),
    #[error("payload ended before {0} was fully read")]
    TruncatedSource(String),
    #[error("{0} does not fit in a zip archive")]
    EntryTooLarge(String),
}
