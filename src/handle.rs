//! Public handle: `read`/`write`/`seek` over the logical media stream,
//! header/hash accumulation, finalization.

use crate::cache::ChunkCache;
use crate::chunk::compress::decode_chunk;
use crate::config::HandleConfig;
use crate::error::EwfError;
use crate::format::FormatVariant;
use crate::geometry::{MediaFlags, MediaGeometry, MediaType};
use crate::header::HeaderValues;
use crate::naming::find_segments;
use crate::pool::{FilePool, OpenMode};
use crate::record::SectorRange;
use crate::reader::read_segment;
use crate::table::ChunkTable;
use crate::writer::SegmentWriter;
use log::{debug, error, info};
use md5::{Digest as _, Md5};
use sha1::Sha1;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Read,
    Write,
}

/// One read-error-list entry: a chunk whose stored checksum did not
/// verify, and whether the returned bytes were zero-filled or surfaced as
/// an error to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadErrorEntry {
    pub chunk_index: usize,
    pub zero_filled: bool,
}

/// The random-access handle over a set of segment files, presenting them
/// as one contiguous media stream.
pub struct Handle {
    mode: Mode,
    pool: FilePool,
    chunk_table: ChunkTable,
    cache: ChunkCache,
    geometry: MediaGeometry,
    config: HandleConfig,
    header_values: HeaderValues,
    current_offset: u64,

    md5_accumulator: Md5,
    sha1_accumulator: Sha1,
    final_md5: Option<[u8; 16]>,
    final_sha1: Option<[u8; 20]>,

    acquiry_errors: Vec<SectorRange>,
    read_errors: Vec<ReadErrorEntry>,
    session_table: Vec<SectorRange>,

    aborted_flag: AtomicBool,
    writer: Option<SegmentWriter>,
}

impl Handle {
    /// Opens every segment belonging to `path`'s set through the pool,
    /// runs the segment reader on each in order, and assembles the global
    /// chunk table. Structural errors in one segment do not poison the
    /// others; the first segment's geometry is authoritative.
    pub fn open(path: &Path, config: HandleConfig) -> Result<Self, EwfError> {
        config.validate()?;
        let segment_paths = find_segments(path)?;
        info!("opening {} segment(s) for {path:?}", segment_paths.len());

        let mut pool = FilePool::new(config.max_open_files);
        let mut chunk_table = ChunkTable::new();
        let mut first_volume = None;
        let mut header_values = HeaderValues::new();
        let mut final_md5 = None;
        let mut final_sha1 = None;
        let mut acquiry_errors = Vec::new();
        let mut session_table = Vec::new();
        let mut variant = None;

        for (index, segment_path) in segment_paths.iter().enumerate() {
            pool.open(index, segment_path.clone(), OpenMode::Read)?;
            let contents = read_segment(&mut pool, index, &mut chunk_table, config.header_codepage)?;

            if let Some(v) = contents.variant {
                match variant {
                    None => variant = Some(v),
                    Some(existing) if existing != v => {
                        return Err(EwfError::FormatMismatch(format!(
                            "segment {index} reports {v:?}, expected {existing:?}"
                        )))
                    }
                    _ => {}
                }
            }
            if index == 0 {
                first_volume = contents.volume;
            }
            if let Some(h) = contents.header {
                header_values = h;
            }
            if contents.md5.is_some() {
                final_md5 = contents.md5;
            }
            if contents.sha1.is_some() {
                final_sha1 = contents.sha1;
            }
            acquiry_errors.extend(contents.error_ranges);
            session_table.extend(contents.session_ranges);
        }

        let volume = first_volume.ok_or_else(|| {
            EwfError::corrupt(crate::error::CorruptContext::Geometry, "no volume/disk section found in segment set")
        })?;
        let media_size = volume.total_sector_count * volume.bytes_per_sector as u64;
        let geometry = MediaGeometry::new(media_size, volume.sectors_per_chunk, volume.bytes_per_sector)?;
        info!(
            "media size {media_size} bytes, {} chunks of {} bytes",
            geometry.chunk_count,
            geometry.chunk_size()
        );

        let mut config = config;
        config.format = variant.unwrap_or(config.format);
        config.media_type = volume.media_type;
        config.media_flags = volume.media_flags;
        config.sectors_per_chunk = volume.sectors_per_chunk;
        config.bytes_per_sector = volume.bytes_per_sector;
        config.error_granularity_sectors = volume.error_granularity_sectors;

        Ok(Handle {
            mode: Mode::Read,
            pool,
            chunk_table,
            cache: ChunkCache::new(config.cache_capacity),
            geometry,
            config,
            header_values,
            current_offset: 0,
            md5_accumulator: Md5::new(),
            sha1_accumulator: Sha1::new(),
            final_md5,
            final_sha1,
            acquiry_errors,
            read_errors: Vec::new(),
            session_table,
            aborted_flag: AtomicBool::new(false),
            writer: None,
        })
    }

    /// Opens `base_path` for writing: validates it as an extensionless
    /// base name and prepares an empty writer state.
    pub fn create(base_path: &Path, config: HandleConfig, media_size: u64, header_values: HeaderValues) -> Result<Self, EwfError> {
        config.validate()?;
        info!("creating acquisition at {base_path:?}, media size {media_size} bytes");
        let geometry = MediaGeometry::new(media_size, config.sectors_per_chunk, config.bytes_per_sector)?;
        let mut pool = FilePool::new(config.max_open_files);
        let writer = SegmentWriter::create(&mut pool, base_path.to_path_buf(), config.clone(), header_values.clone())?;

        Ok(Handle {
            mode: Mode::Write,
            pool,
            chunk_table: ChunkTable::new(),
            cache: ChunkCache::new(config.cache_capacity),
            geometry,
            config,
            header_values,
            current_offset: 0,
            md5_accumulator: Md5::new(),
            sha1_accumulator: Sha1::new(),
            final_md5: None,
            final_sha1: None,
            acquiry_errors: Vec::new(),
            read_errors: Vec::new(),
            session_table: Vec::new(),
            aborted_flag: AtomicBool::new(false),
            writer: Some(writer),
        })
    }

    // ----- metadata accessors -----

    pub fn media_size(&self) -> u64 {
        self.geometry.media_size
    }

    pub fn chunk_size(&self) -> usize {
        self.geometry.chunk_size()
    }

    pub fn sectors_per_chunk(&self) -> u32 {
        self.geometry.sectors_per_chunk
    }

    pub fn bytes_per_sector(&self) -> u32 {
        self.geometry.bytes_per_sector
    }

    pub fn chunk_count(&self) -> u32 {
        self.geometry.chunk_count
    }

    pub fn format(&self) -> FormatVariant {
        self.config.format
    }

    pub fn media_type(&self) -> MediaType {
        self.config.media_type
    }

    pub fn media_flags(&self) -> MediaFlags {
        self.config.media_flags
    }

    pub fn md5(&self) -> Option<[u8; 16]> {
        self.final_md5
    }

    pub fn sha1(&self) -> Option<[u8; 20]> {
        self.final_sha1
    }

    pub fn header_value(&self, identifier: &str) -> Option<&str> {
        self.header_values.get(identifier)
    }

    /// Setter mirroring `header_value`; rejected once the first chunk has
    /// been written.
    pub fn set_header_value(&mut self, identifier: &str, value: impl Into<String>) -> Result<(), EwfError> {
        if self.writer.as_ref().map(|w| w.chunk_count() > 0).unwrap_or(false) {
            return Err(EwfError::InvalidArgument(
                "header values cannot change after the first chunk write".into(),
            ));
        }
        self.header_values.set(identifier, value);
        Ok(())
    }

    pub fn read_errors(&self) -> &[ReadErrorEntry] {
        &self.read_errors
    }

    pub fn acquiry_errors(&self) -> &[SectorRange] {
        &self.acquiry_errors
    }

    /// Cooperative cancellation flag, polled at the top of every chunk
    /// loop; the current chunk still completes.
    pub fn abort(&self) {
        self.aborted_flag.store(true, Ordering::SeqCst);
    }

    fn check_aborted(&self) -> Result<(), EwfError> {
        if self.aborted_flag.load(Ordering::SeqCst) {
            Err(EwfError::Aborted)
        } else {
            Ok(())
        }
    }

    // ----- I/O surface -----

    /// Copies up to `buf.len()` bytes starting at `current_offset`,
    /// advancing it; returns 0 at or past `media_size`.
    /// Reads spanning chunk boundaries are assembled from consecutive
    /// cache entries. A checksum mismatch on any one chunk is recorded in
    /// `read_errors` and, per `zero_chunk_on_read_error`, either zero-fills
    /// that chunk's contribution or surfaces `EwfError::BadChecksum`.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, EwfError> {
        if self.mode != Mode::Read {
            return Err(EwfError::InvalidArgument("read is only valid on a handle opened for read".into()));
        }
        let media_size = self.geometry.media_size;
        if self.current_offset >= media_size || buf.is_empty() {
            return Ok(0);
        }

        let mut written = 0usize;
        while written < buf.len() && self.current_offset < media_size {
            self.check_aborted()?;
            let chunk_size = self.geometry.chunk_size() as u64;
            let chunk_index = (self.current_offset / chunk_size) as usize;
            let within_chunk = (self.current_offset % chunk_size) as usize;

            let chunk_bytes = self.materialize_chunk(chunk_index)?;
            let available = chunk_bytes.len().saturating_sub(within_chunk);
            let to_copy = available.min(buf.len() - written);
            if to_copy == 0 {
                break;
            }
            buf[written..written + to_copy].copy_from_slice(&chunk_bytes[within_chunk..within_chunk + to_copy]);
            written += to_copy;
            self.current_offset += to_copy as u64;
        }
        Ok(written)
    }

    /// Returns the decompressed bytes for `chunk_index`, serving from the
    /// cache on hit. On a checksum failure the chunk is recorded in
    /// `read_errors`; the returned bytes are zero-filled or the error is
    /// surfaced, per `config.wipe_chunk_on_checksum_error` /
    /// `zero_chunk_on_read_error`.
    fn materialize_chunk(&mut self, chunk_index: usize) -> Result<Vec<u8>, EwfError> {
        if let Some(cached) = self.cache.get(chunk_index) {
            debug!("chunk {chunk_index} served from cache");
            return Ok(cached.to_vec());
        }
        let entry = *self
            .chunk_table
            .get(chunk_index)
            .ok_or_else(|| EwfError::InvalidArgument(format!("chunk index {chunk_index} out of range")))?;

        let expected_len = self.geometry.chunk_len(chunk_index as u32);
        let mut stored = vec![0u8; entry.stored_size as usize];
        let mut attempt = 0;
        let bytes = loop {
            match self.pool.read_exact_at(entry.segment_index, entry.file_offset, &mut stored) {
                Ok(()) => break stored.clone(),
                Err(e @ EwfError::Io { .. }) => {
                    attempt += 1;
                    if attempt > self.config.read_error_retries {
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
        };

        let decoded = match decode_chunk(&bytes, entry.is_compressed, expected_len) {
            Ok(d) => d,
            Err(EwfError::BadChecksum { .. }) => {
                error!(
                    "checksum failure on chunk {chunk_index} (segment {}, offset 0x{:x}); zero_filled={}",
                    entry.segment_index, entry.file_offset, self.config.zero_chunk_on_read_error
                );
                self.read_errors.push(ReadErrorEntry {
                    chunk_index,
                    zero_filled: self.config.zero_chunk_on_read_error,
                });
                if self.config.zero_chunk_on_read_error {
                    vec![0u8; expected_len]
                } else {
                    return Err(EwfError::bad_checksum(crate::error::ChecksumContext::Chunk, None));
                }
            }
            Err(e) => return Err(e),
        };

        self.cache.insert(chunk_index, decoded.clone());
        Ok(decoded)
    }

    /// Buffers bytes until a whole chunk's worth is available, then
    /// encodes and emits it through the writer.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize, EwfError> {
        if self.mode != Mode::Write {
            return Err(EwfError::InvalidArgument("write is only valid on a handle opened for write".into()));
        }
        self.check_aborted()?;
        self.md5_accumulator.update(buf);
        self.sha1_accumulator.update(buf);
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| EwfError::InvalidArgument("handle already finalized".into()))?;
        writer.write(&mut self.pool, buf)
    }

    /// Updates `current_offset`; does not touch the pool. Seeking past
    /// `media_size` is legal; a later `read` there returns 0.
    pub fn seek(&mut self, offset: i64, whence: SeekFrom) -> Result<u64, EwfError> {
        let base = match whence {
            SeekFrom::Start => 0i64,
            SeekFrom::Current => self.current_offset as i64,
            SeekFrom::End => self.geometry.media_size as i64,
        };
        let target = base
            .checked_add(offset)
            .ok_or_else(|| EwfError::Overflow("seek offset overflow".into()))?;
        if target < 0 {
            return Err(EwfError::InvalidArgument("seek to a negative offset".into()));
        }
        self.current_offset = target as u64;
        Ok(self.current_offset)
    }

    /// Flushes the partial chunk, emits trailer sections and back-patches
    /// the first segment. All-or-nothing; after this no further writes are
    /// accepted.
    pub fn finalize(&mut self) -> Result<u64, EwfError> {
        if self.mode != Mode::Write {
            return Err(EwfError::InvalidArgument("finalize is only valid on a handle opened for write".into()));
        }
        info!("finalizing acquisition, {} bytes written so far", self.geometry.media_size);
        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| EwfError::InvalidArgument("finalize called after finalize/close".into()))?;

        let md5 = self.md5_accumulator.clone().finalize();
        let sha1 = self.sha1_accumulator.clone().finalize();
        let mut md5_bytes = [0u8; 16];
        md5_bytes.copy_from_slice(&md5);
        let mut sha1_bytes = [0u8; 20];
        sha1_bytes.copy_from_slice(&sha1);

        let written = writer.finalize(
            &mut self.pool,
            &md5_bytes,
            &sha1_bytes,
            &self.acquiry_errors,
            &self.session_table,
        )?;
        self.final_md5 = Some(md5_bytes);
        self.final_sha1 = Some(sha1_bytes);
        info!("finalize complete: {written} bytes written");
        Ok(written)
    }

    /// Tears down the pool, cache and tables. A handle that still had an
    /// active writer (never finalized) simply drops its in-progress
    /// segment files as-is.
    pub fn close(mut self) -> Result<(), EwfError> {
        self.pool.close_all()?;
        self.cache.clear();
        Ok(())
    }
}

/// Mirrors `std::io::SeekFrom` without requiring the caller to depend on
/// `std::io` semantics this crate does not otherwise use (the pool layer
/// works in absolute offsets only).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekFrom {
    Start,
    Current,
    End,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::CompressionLevel;

    fn small_config() -> HandleConfig {
        HandleConfig {
            compression_level: CompressionLevel::Fast,
            format: FormatVariant::Encase6,
            sectors_per_chunk: 16,
            bytes_per_sector: 512,
            ..HandleConfig::default()
        }
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("image");
        // A whole number of 512-byte sectors: EWF's volume record tracks
        // sector counts, not raw byte lengths, so an unaligned length would
        // round up on reopen.
        let payload: Vec<u8> = (0..204_800u32).map(|i| (i % 256) as u8).collect();

        let mut writer_handle = Handle::create(&base, small_config(), payload.len() as u64, HeaderValues::new()).unwrap();
        writer_handle.write(&payload).unwrap();
        writer_handle.finalize().unwrap();
        writer_handle.close().unwrap();

        let segment_path = base.with_extension("E01");
        let mut reader_handle = Handle::open(&segment_path, small_config()).unwrap();
        assert_eq!(reader_handle.media_size(), payload.len() as u64);

        let mut out = vec![0u8; payload.len()];
        let n = reader_handle.read(&mut out).unwrap();
        assert_eq!(n, payload.len());
        assert_eq!(out, payload);

        let mut trailing = [0u8; 16];
        assert_eq!(reader_handle.read(&mut trailing).unwrap(), 0);
    }

    #[test]
    fn seek_then_partial_read() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("image");
        let payload: Vec<u8> = (0..102_400u32).map(|i| (i % 251) as u8).collect();

        let mut writer_handle = Handle::create(&base, small_config(), payload.len() as u64, HeaderValues::new()).unwrap();
        writer_handle.write(&payload).unwrap();
        writer_handle.finalize().unwrap();
        writer_handle.close().unwrap();

        let segment_path = base.with_extension("E01");
        let mut reader_handle = Handle::open(&segment_path, small_config()).unwrap();
        reader_handle.seek(50_000, SeekFrom::Start).unwrap();
        let mut out = vec![0u8; 1000];
        reader_handle.read(&mut out).unwrap();
        assert_eq!(&out[..], &payload[50_000..51_000]);
    }
}
