//! Handle configuration: acquisition and geometry knobs accepted by
//! `Handle::create` and carried through to `SegmentWriter`.

use crate::format::FormatVariant;
use crate::geometry::{CompressionLevel, MediaFlags, MediaType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderCodepage {
    Ascii,
    Windows874,
    Windows1250,
    Windows1251,
    Windows1252,
    Windows1253,
    Windows1254,
    Windows1255,
    Windows1256,
    Windows1257,
    Windows1258,
}

impl Default for HeaderCodepage {
    fn default() -> Self {
        HeaderCodepage::Ascii
    }
}

/// Configuration accepted by `handle::Handle::create` / carried through to
/// `writer::SegmentWriter`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandleConfig {
    pub compression_level: CompressionLevel,
    pub format: FormatVariant,
    pub media_type: MediaType,
    pub media_flags: MediaFlags,
    pub sectors_per_chunk: u32,
    pub bytes_per_sector: u32,
    pub error_granularity_sectors: u32,
    pub maximum_segment_size: u64,
    pub header_codepage: HeaderCodepage,
    pub read_error_retries: u32,
    pub zero_chunk_on_read_error: bool,
    pub wipe_chunk_on_checksum_error: bool,
    /// Cap on simultaneously-open file descriptors in the byte I/O pool
    /// (default 1000).
    pub max_open_files: usize,
    /// Chunk cache capacity in entries (default 16).
    pub cache_capacity: usize,
}

impl Default for HandleConfig {
    fn default() -> Self {
        Self {
            compression_level: CompressionLevel::Fast,
            format: FormatVariant::Encase6,
            media_type: MediaType::Fixed,
            media_flags: MediaFlags::PHYSICAL,
            sectors_per_chunk: 64,
            bytes_per_sector: 512,
            error_granularity_sectors: 64,
            maximum_segment_size: 1_500_000_000,
            header_codepage: HeaderCodepage::Ascii,
            read_error_retries: 2,
            zero_chunk_on_read_error: true,
            wipe_chunk_on_checksum_error: false,
            max_open_files: 1000,
            cache_capacity: 16,
        }
    }
}

impl HandleConfig {
    pub fn chunk_size(&self) -> usize {
        self.sectors_per_chunk as usize * self.bytes_per_sector as usize
    }

    pub fn validate(&self) -> Result<(), crate::error::EwfError> {
        use crate::error::EwfError;
        if !crate::geometry::VALID_SECTORS_PER_CHUNK.contains(&self.sectors_per_chunk) {
            return Err(EwfError::InvalidArgument(format!(
                "sectors_per_chunk {} is not a legal power-of-two value",
                self.sectors_per_chunk
            )));
        }
        if self.bytes_per_sector == 0 {
            return Err(EwfError::InvalidArgument("bytes_per_sector must be non-zero".into()));
        }
        if self.maximum_segment_size == 0 {
            return Err(EwfError::InvalidArgument("maximum_segment_size must be non-zero".into()));
        }
        if self.maximum_segment_size > self.format.max_segment_size() {
            return Err(EwfError::InvalidArgument(format!(
                "maximum_segment_size {} exceeds the {:?} cap of {}",
                self.maximum_segment_size,
                self.format,
                self.format.max_segment_size()
            )));
        }
        if self.max_open_files == 0 {
            return Err(EwfError::InvalidArgument("max_open_files must be non-zero".into()));
        }
        Ok(())
    }
}
