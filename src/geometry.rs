//! Media geometry and the small enums configuring an acquisition.

use crate::error::EwfError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionLevel {
    None,
    EmptyBlockOnly,
    Fast,
    Best,
}

impl CompressionLevel {
    pub fn parse(s: &str) -> Result<Self, EwfError> {
        Ok(match s {
            "none" => CompressionLevel::None,
            "empty-block-only" => CompressionLevel::EmptyBlockOnly,
            "fast" => CompressionLevel::Fast,
            "best" => CompressionLevel::Best,
            other => return Err(EwfError::InvalidArgument(format!("unknown compression level: {other}"))),
        })
    }

    /// `flate2::Compression` level to use, when DEFLATE is actually invoked.
    pub fn deflate_level(&self) -> flate2::Compression {
        match self {
            CompressionLevel::None | CompressionLevel::EmptyBlockOnly => flate2::Compression::none(),
            CompressionLevel::Fast => flate2::Compression::fast(),
            CompressionLevel::Best => flate2::Compression::best(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaType {
    Removable,
    Fixed,
    Optical,
    Memory,
}

impl MediaType {
    pub fn parse(s: &str) -> Result<Self, EwfError> {
        Ok(match s {
            "removable" => MediaType::Removable,
            "fixed" => MediaType::Fixed,
            "optical" => MediaType::Optical,
            "memory" => MediaType::Memory,
            other => return Err(EwfError::InvalidArgument(format!("unknown media type: {other}"))),
        })
    }

    pub fn to_byte(self) -> u8 {
        match self {
            MediaType::Removable => 0x00,
            MediaType::Fixed => 0x01,
            MediaType::Optical => 0x03,
            MediaType::Memory => 0x10,
        }
    }

    pub fn from_byte(b: u8) -> Self {
        match b {
            0x01 => MediaType::Fixed,
            0x03 => MediaType::Optical,
            0x10 => MediaType::Memory,
            _ => MediaType::Removable,
        }
    }
}

/// `media_flags` bitset as stored in the volume section.
///
/// A plain newtype over `u8` rather than a `bitflags` dependency — three
/// bits don't need a derive macro.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MediaFlags(pub u8);

impl MediaFlags {
    pub const PHYSICAL: MediaFlags = MediaFlags(0b0000_0001);
    pub const FASTBLOCK: MediaFlags = MediaFlags(0b0000_0010);
    pub const TABLEAU: MediaFlags = MediaFlags(0b0000_0100);

    pub fn empty() -> Self {
        MediaFlags(0)
    }

    pub fn contains(&self, other: MediaFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: MediaFlags) {
        self.0 |= other.0;
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn from_bits(bits: u8) -> Self {
        MediaFlags(bits)
    }
}

impl std::ops::BitOr for MediaFlags {
    type Output = MediaFlags;
    fn bitor(self, rhs: MediaFlags) -> MediaFlags {
        MediaFlags(self.0 | rhs.0)
    }
}

/// Fixed-size-chunk geometry of the logical media stream.
///
/// `chunk_count * chunk_size >= media_size > (chunk_count - 1) * chunk_size`
/// always holds; the last chunk is short rather than padded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaGeometry {
    pub media_size: u64,
    pub sectors_per_chunk: u32,
    pub bytes_per_sector: u32,
    pub chunk_count: u32,
}

/// Legal values for `sectors_per_chunk` — powers of two from 16 to 32768.
pub const VALID_SECTORS_PER_CHUNK: &[u32] = &[
    16, 32, 64, 128, 256, 512, 1024, 2048, 4096, 8192, 16384, 32768,
];

impl MediaGeometry {
    pub fn new(media_size: u64, sectors_per_chunk: u32, bytes_per_sector: u32) -> Result<Self, EwfError> {
        if !VALID_SECTORS_PER_CHUNK.contains(&sectors_per_chunk) {
            return Err(EwfError::InvalidArgument(format!(
                "sectors_per_chunk {sectors_per_chunk} is not one of the legal power-of-two values"
            )));
        }
        if bytes_per_sector == 0 {
            return Err(EwfError::InvalidArgument("bytes_per_sector must be non-zero".into()));
        }
        let chunk_size = sectors_per_chunk as u64 * bytes_per_sector as u64;
        let chunk_count = if media_size == 0 {
            0
        } else {
            ((media_size + chunk_size - 1) / chunk_size) as u32
        };
        Ok(Self {
            media_size,
            sectors_per_chunk,
            bytes_per_sector,
            chunk_count,
        })
    }

    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.sectors_per_chunk as usize * self.bytes_per_sector as usize
    }

    /// Size in bytes of chunk `index`, accounting for a short final chunk.
    pub fn chunk_len(&self, index: u32) -> usize {
        let full = self.chunk_size();
        if index + 1 < self.chunk_count {
            full
        } else {
            let remainder = self.media_size as usize % full;
            if remainder == 0 {
                full
            } else {
                remainder
            }
        }
    }

    pub fn total_sector_count(&self) -> u64 {
        (self.media_size + self.bytes_per_sector as u64 - 1) / self.bytes_per_sector as u64
    }
}
