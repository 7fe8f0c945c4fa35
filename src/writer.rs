//! Segment writer: `Header → Volume → ChunksInProgress → TableFlush →
//! (MoreSegments? Next : Done)`.

use crate::chunk::compress::{encode_chunk, EncodedChunk};
use crate::config::HandleConfig;
use crate::error::EwfError;
use crate::format::FormatVariant;
use crate::header::HeaderValues;
use crate::naming::segment_path;
use crate::pool::{FilePool, OpenMode};
use crate::record::{encode_digest, encode_hash, encode_ranges, SectorRange, VolumeSection};
use crate::section::{SectionHeader, SECTION_HEADER_SIZE};
use crate::segment::SegmentFileHeader;
use crate::table::{encode_table, TABLE_PREFIX_SIZE};
use log::{debug, info};
use std::path::PathBuf;

/// Real-world EWF/libewf cap on entries in a single `table`/`table2` pair;
/// independent of the byte budget and flushed within the same segment file
/// once reached.
pub const MAX_CHUNKS_PER_TABLE_GROUP: usize = 16_375;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Header,
    Volume,
    ChunksInProgress,
    TableFlush,
    Next,
    Done,
}

/// Drives the on-disk layout of a write session across one or more segment
/// files. Owns no file descriptors itself — every I/O call goes through
/// the caller's [`FilePool`].
pub struct SegmentWriter {
    config: HandleConfig,
    base_path: PathBuf,
    header_values: HeaderValues,
    state: WriterState,

    pool_index: usize,
    segment_number: u32,
    cursor: u64,

    first_segment_pool_index: usize,
    /// Absolute offset of the `chunk_count` field inside the first
    /// segment's `volume`/`disk` payload, back-patched at `finalize`.
    first_segment_chunk_count_field: u64,
    /// Absolute offset of the `total_sector_count` field in the same
    /// payload, back-patched alongside `chunk_count` — neither is known
    /// until the caller's last `write` call, since a handle created
    /// without a declared media size (e.g. acquiring from a stream of
    /// unknown length) only learns the true total at `finalize`.
    first_segment_total_sectors_field: u64,
    raw_media_bytes: u64,

    /// Chunk payload bytes accumulated for the `sectors` section currently
    /// being built, plus each chunk's `(relative_offset, compressed)`
    /// within that buffer — converted to absolute offsets only once the
    /// group is actually flushed to disk.
    group_payload: Vec<u8>,
    group_offsets: Vec<(u64, bool)>,

    /// Bytes written so far into the in-progress chunk (`write` buffers
    /// until a whole chunk is available).
    partial_chunk: Vec<u8>,

    chunk_count: u32,
    bytes_written: u64,
    finalized: bool,
}

impl SegmentWriter {
    /// Opens the first segment file at `base_path` (an extensionless base
    /// name) and writes its signature, header sections and placeholder
    /// `volume`/`disk` record. `config.validate()` must already have been
    /// called by the caller (`handle::Handle::create`).
    pub fn create(
        pool: &mut FilePool,
        base_path: PathBuf,
        config: HandleConfig,
        header_values: HeaderValues,
    ) -> Result<Self, EwfError> {
        let mut writer = SegmentWriter {
            config,
            base_path,
            header_values,
            state: WriterState::Header,
            pool_index: 0,
            segment_number: 0,
            cursor: 0,
            first_segment_pool_index: 0,
            first_segment_chunk_count_field: 0,
            first_segment_total_sectors_field: 0,
            raw_media_bytes: 0,
            group_payload: Vec::new(),
            group_offsets: Vec::new(),
            partial_chunk: Vec::new(),
            chunk_count: 0,
            bytes_written: 0,
            finalized: false,
        };
        writer.open_next_segment(pool, true)?;
        writer.state = WriterState::ChunksInProgress;
        Ok(writer)
    }

    pub fn chunk_count(&self) -> u32 {
        self.chunk_count
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn write_section(
        &mut self,
        pool: &mut FilePool,
        type_tag: &str,
        payload: &[u8],
        terminal: bool,
    ) -> Result<u64, EwfError> {
        let self_offset = self.cursor;
        let section_size = SECTION_HEADER_SIZE + payload.len() as u64;
        let next_offset = if terminal { self_offset } else { self_offset + section_size };
        let header = SectionHeader::encode(type_tag, next_offset, section_size)?;
        pool.write_at(self.pool_index, self_offset, &header)?;
        if !payload.is_empty() {
            pool.write_at(self.pool_index, self_offset + SECTION_HEADER_SIZE, payload)?;
        }
        self.cursor = self_offset + section_size;
        self.bytes_written += section_size;
        Ok(self_offset)
    }

    /// Opens the next segment file in sequence, writing its 13-byte
    /// signature and the header sections the format variant requires
    /// (`header`/`header2`/`xheader`) plus a `volume`/`disk` record for
    /// the first segment, or a `data` consistency copy for every
    /// subsequent one.
    fn open_next_segment(&mut self, pool: &mut FilePool, is_first: bool) -> Result<(), EwfError> {
        self.segment_number += 1;
        let family = self.config.format.extension_family();
        let path = segment_path(&self.base_path, family, self.segment_number)?;
        debug!("opening segment {} at {path:?}", self.segment_number);
        let index = pool.len();
        pool.open(index, path, OpenMode::Write)?;
        self.pool_index = index;
        self.cursor = 0;

        let seg_header = SegmentFileHeader {
            variant: self.config.format,
            segment_number: self.segment_number as u16,
        };
        pool.write_at(self.pool_index, 0, &seg_header.encode())?;
        self.cursor = crate::segment::SEGMENT_HEADER_SIZE;
        self.bytes_written += crate::segment::SEGMENT_HEADER_SIZE;

        self.state = WriterState::Header;
        for section_name in self.config.format.header_sections() {
            let payload = match *section_name {
                "header" => self.header_values.encode_header(self.config.header_codepage)?,
                "header2" => self.header_values.encode_header2(),
                "xheader" => self.header_values.encode_xheader(),
                other => {
                    return Err(EwfError::FormatUnsupported(format!(
                        "unknown header section '{other}' named by format variant"
                    )))
                }
            };
            self.write_section(pool, section_name, &payload, false)?;
        }

        self.state = WriterState::Volume;
        let volume = VolumeSection {
            media_type: self.config.media_type,
            chunk_count: 0,
            sectors_per_chunk: self.config.sectors_per_chunk,
            bytes_per_sector: self.config.bytes_per_sector,
            total_sector_count: 0,
            media_flags: self.config.media_flags,
            compression_level: compression_level_byte(self.config.compression_level),
            error_granularity_sectors: self.config.error_granularity_sectors,
            guid: uuid::Uuid::new_v4(),
        };
        let tag = if is_first {
            if self.config.format.uses_disk_tag() {
                "disk"
            } else {
                "volume"
            }
        } else {
            "data"
        };
        let volume_offset = self.write_section(pool, tag, &volume.encode(), false)?;
        if is_first {
            self.first_segment_pool_index = self.pool_index;
            // `chunk_count` and `total_sector_count` sit at byte offsets 4
            // and 16 within `VolumeSection`'s encoding (see `record.rs`).
            self.first_segment_chunk_count_field = volume_offset + SECTION_HEADER_SIZE + 4;
            self.first_segment_total_sectors_field = volume_offset + SECTION_HEADER_SIZE + 16;
        }
        Ok(())
    }

    /// Worst-case bytes needed to flush the current group (`sectors` +
    /// `table` + `table2`) plus a terminal section, used by the
    /// segment-size discipline check in [`Self::write`].
    fn group_flush_worst_case(&self, extra_chunk_len: usize) -> u64 {
        let n = self.group_offsets.len() + 1;
        let table_payload_size = (TABLE_PREFIX_SIZE + n * 4 + 4) as u64;
        let sectors_size = SECTION_HEADER_SIZE + self.group_payload.len() as u64 + extra_chunk_len as u64;
        sectors_size + 2 * (SECTION_HEADER_SIZE + table_payload_size) + SECTION_HEADER_SIZE
    }

    /// Writes `buf`, chunk-encoding whole chunks as they accumulate.
    /// Returns the number of bytes consumed (always `buf.len()`; the
    /// trailing partial chunk is held until [`Self::finalize`]).
    pub fn write(&mut self, pool: &mut FilePool, buf: &[u8]) -> Result<usize, EwfError> {
        if self.finalized {
            return Err(EwfError::InvalidArgument("write after finalize".into()));
        }
        self.partial_chunk.extend_from_slice(buf);
        self.raw_media_bytes += buf.len() as u64;
        let chunk_size = self.config.chunk_size();
        while self.partial_chunk.len() >= chunk_size {
            let raw: Vec<u8> = self.partial_chunk.drain(..chunk_size).collect();
            let encoded = encode_chunk(&raw, self.config.compression_level)?;
            self.append_chunk(pool, encoded)?;
        }
        Ok(buf.len())
    }

    fn append_chunk(&mut self, pool: &mut FilePool, encoded: EncodedChunk) -> Result<(), EwfError> {
        let projected = self.cursor + self.group_flush_worst_case(encoded.stored.len());
        if self.group_offsets.len() >= MAX_CHUNKS_PER_TABLE_GROUP {
            self.flush_group(pool)?;
        } else if projected > self.config.maximum_segment_size {
            if self.group_offsets.is_empty() {
                // A single chunk does not fit even in a fresh segment;
                // this is a configuration error, not a recoverable state.
                return Err(EwfError::Overflow(
                    "chunk does not fit within maximum_segment_size even in an empty segment".into(),
                ));
            }
            self.seal_segment(pool)?;
        }
        let relative_offset = self.group_payload.len() as u64;
        self.group_offsets.push((relative_offset, encoded.compressed));
        self.group_payload.extend_from_slice(&encoded.stored);
        self.chunk_count += 1;
        Ok(())
    }

    /// Emits the current group's `sectors` + `table` + `table2` sections,
    /// if any chunks are pending, and clears the group buffers.
    fn flush_group(&mut self, pool: &mut FilePool) -> Result<(), EwfError> {
        if self.group_offsets.is_empty() {
            return Ok(());
        }
        self.state = WriterState::TableFlush;
        let payload = std::mem::take(&mut self.group_payload);
        let sectors_offset = self.write_section(pool, "sectors", &payload, false)?;
        let base_absolute = sectors_offset + SECTION_HEADER_SIZE;
        let absolute_entries: Vec<(u64, bool)> = self
            .group_offsets
            .iter()
            .map(|&(rel, compressed)| (base_absolute + rel, compressed))
            .collect();
        let table_payload = encode_table(base_absolute, &absolute_entries)?;
        self.write_section(pool, "table", &table_payload, false)?;
        self.write_section(pool, "table2", &table_payload, false)?;

        self.group_payload.clear();
        self.group_offsets.clear();
        self.state = WriterState::ChunksInProgress;
        Ok(())
    }

    /// Closes the current segment with a `next` section and opens the
    /// following one, per the configured segment-size discipline.
    fn seal_segment(&mut self, pool: &mut FilePool) -> Result<(), EwfError> {
        self.flush_group(pool)?;
        self.state = WriterState::Next;
        self.write_section(pool, "next", &[], true)?;
        pool.close(self.pool_index)?;
        self.open_next_segment(pool, false)?;
        self.state = WriterState::ChunksInProgress;
        Ok(())
    }

    /// Flushes the trailing partial chunk, emits trailer sections (`hash`/
    /// `digest`, `error2`, `session`, `done`) on the final segment, then
    /// back-patches the first segment's `volume`/`disk` `chunk_count`
    /// field now that the definitive total is known. All-or-nothing: any
    /// failure here leaves the output set unusable for the caller to
    /// discard.
    pub fn finalize(
        &mut self,
        pool: &mut FilePool,
        md5: &[u8; 16],
        sha1: &[u8; 20],
        error_ranges: &[SectorRange],
        session_ranges: &[SectorRange],
    ) -> Result<u64, EwfError> {
        if self.finalized {
            return Err(EwfError::InvalidArgument("finalize called twice".into()));
        }
        info!(
            "finalizing segment writer: {} chunks, {} bytes written across {} segment(s)",
            self.chunk_count, self.bytes_written, self.segment_number
        );
        if !self.partial_chunk.is_empty() {
            let raw = std::mem::take(&mut self.partial_chunk);
            let encoded = encode_chunk(&raw, self.config.compression_level)?;
            self.append_chunk(pool, encoded)?;
        }
        self.flush_group(pool)?;

        if self.config.format.emits_digest() {
            let payload = encode_digest(md5, sha1);
            self.write_section(pool, "digest", &payload, false)?;
        } else {
            let payload = encode_hash(md5);
            self.write_section(pool, "hash", &payload, false)?;
        }
        if !error_ranges.is_empty() {
            let payload = encode_ranges(error_ranges);
            self.write_section(pool, "error2", &payload, false)?;
        }
        if self.config.format.emits_session() && !session_ranges.is_empty() {
            let payload = encode_ranges(session_ranges);
            self.write_section(pool, "session", &payload, false)?;
        }

        self.state = WriterState::Done;
        self.write_section(pool, "done", &[], true)?;
        pool.close(self.pool_index)?;

        // Back-patch the first segment's chunk_count and total_sector_count,
        // reopening it for write if the pool already evicted its descriptor.
        let total_sector_count =
            (self.raw_media_bytes + self.config.bytes_per_sector as u64 - 1) / self.config.bytes_per_sector as u64;
        pool.write_at(
            self.first_segment_pool_index,
            self.first_segment_chunk_count_field,
            &self.chunk_count.to_le_bytes(),
        )?;
        pool.write_at(
            self.first_segment_pool_index,
            self.first_segment_total_sectors_field,
            &total_sector_count.to_le_bytes(),
        )?;
        pool.close(self.first_segment_pool_index)?;

        self.finalized = true;
        info!("finalize complete: {} total chunks, {} bytes", self.chunk_count, self.bytes_written);
        Ok(self.bytes_written)
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }
}

fn compression_level_byte(level: crate::geometry::CompressionLevel) -> u8 {
    use crate::geometry::CompressionLevel::*;
    match level {
        None => 0,
        EmptyBlockOnly => 0,
        Fast => 1,
        Best => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::CompressionLevel;

    fn test_config(max_segment_size: u64) -> HandleConfig {
        HandleConfig {
            maximum_segment_size: max_segment_size,
            sectors_per_chunk: 16,
            bytes_per_sector: 512,
            compression_level: CompressionLevel::None,
            format: FormatVariant::Encase6,
            ..HandleConfig::default()
        }
    }

    #[test]
    fn writes_single_segment_round_trippable() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("image");
        let mut pool = FilePool::new(10);
        let config = test_config(1_500_000_000);
        let mut writer =
            SegmentWriter::create(&mut pool, base.clone(), config, HeaderValues::new()).unwrap();

        let data = vec![0x42u8; 16 * 512 * 3];
        writer.write(&mut pool, &data).unwrap();
        let written = writer
            .finalize(&mut pool, &[0u8; 16], &[0u8; 20], &[], &[])
            .unwrap();
        assert!(written > 0);
        assert_eq!(writer.chunk_count(), 3);
        assert!(writer.is_finalized());

        let expected_path = base.with_extension("E01");
        assert!(expected_path.exists());
    }

    #[test]
    fn splits_into_multiple_segments_under_tiny_budget() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("image");
        let mut pool = FilePool::new(10);
        // Large enough to hold a chunk or two plus the worst-case table
        // flush, small enough to force a split well before 20 chunks land.
        let config = test_config(20_000);
        let mut writer =
            SegmentWriter::create(&mut pool, base.clone(), config, HeaderValues::new()).unwrap();

        let data = vec![0x7u8; 16 * 512 * 20];
        writer.write(&mut pool, &data).unwrap();
        writer
            .finalize(&mut pool, &[0u8; 16], &[0u8; 20], &[], &[])
            .unwrap();

        assert!(base.with_extension("E01").exists());
        assert!(base.with_extension("E02").exists());
    }
}
