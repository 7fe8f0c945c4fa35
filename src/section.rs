//! Section descriptor codec.
//!
//! Every section in an EWF segment opens with a fixed 76-byte descriptor:
//! a 16-byte type tag, the absolute offset of the next descriptor, the
//! section's total size (header included), 40 reserved bytes, and a
//! trailing Adler-32 checksum over the first 72 bytes.
//!
//! Ref: https://github.com/libyal/libewf/blob/main/documentation/Expert%20Witness%20Compression%20Format%20(EWF).asciidoc#31-section-descriptor

use crate::chunk::checksum::adler32;
use crate::error::{ChecksumContext, EwfError};

/// Fixed 76-byte on-disk layout: 16 (type) + 8 (next offset) + 8 (size) +
/// 40 (reserved) + 4 (checksum).
pub const SECTION_HEADER_SIZE: u64 = 76;
const TYPE_LEN: usize = 16;
const CHECKSUMMED_LEN: usize = 72;

/// A decoded section header plus where its payload begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    pub type_tag: String,
    pub next_offset: u64,
    pub section_size: u64,
    /// Absolute file offset where this header started.
    pub self_offset: u64,
}

impl SectionHeader {
    /// Absolute offset of the first payload byte.
    pub fn payload_offset(&self) -> u64 {
        self.self_offset + SECTION_HEADER_SIZE
    }

    /// Payload size in bytes (`section_size` includes the header).
    pub fn payload_size(&self) -> u64 {
        self.section_size.saturating_sub(SECTION_HEADER_SIZE)
    }

    /// A self-referential `next_offset` (pointing back at this header's own
    /// offset) marks the last section in the chain, same as an explicit
    /// `next`/`done` type tag — checked structurally so a truncated or
    /// unusual terminator still stops the walk instead of looping forever.
    pub fn is_terminal(&self) -> bool {
        self.next_offset == self.self_offset || self.type_tag == "next" || self.type_tag == "done"
    }

    /// Decodes the 76-byte header starting at `bytes[0]`, which must
    /// represent the bytes found at absolute offset `self_offset`.
    pub fn decode(bytes: &[u8], self_offset: u64) -> Result<Self, EwfError> {
        if bytes.len() < SECTION_HEADER_SIZE as usize {
            return Err(EwfError::corrupt(
                crate::error::CorruptContext::Section,
                "truncated section header",
            ));
        }
        let checksummed = &bytes[..CHECKSUMMED_LEN];
        let stored_checksum = u32::from_le_bytes(bytes[72..76].try_into().unwrap());
        let computed = adler32(checksummed);
        if stored_checksum != computed {
            return Err(EwfError::bad_checksum(
                ChecksumContext::Section,
                Some(format!("offset 0x{self_offset:x}")),
            ));
        }

        let mut raw_type = bytes[0..TYPE_LEN].to_vec();
        if let Some(nul) = raw_type.iter().position(|&b| b == 0) {
            raw_type.truncate(nul);
        }
        let type_tag = String::from_utf8(raw_type)
            .map_err(|_| EwfError::corrupt(crate::error::CorruptContext::Section, "non-ASCII section type"))?;

        let next_offset = u64::from_le_bytes(bytes[16..24].try_into().unwrap());
        let section_size = u64::from_le_bytes(bytes[24..32].try_into().unwrap());

        Ok(SectionHeader {
            type_tag,
            next_offset,
            section_size,
            self_offset,
        })
    }

    /// Encodes this header into its 76-byte on-disk form, computing the
    /// checksum over the first 72 bytes.
    pub fn encode(type_tag: &str, next_offset: u64, section_size: u64) -> Result<[u8; SECTION_HEADER_SIZE as usize], EwfError> {
        if type_tag.len() > TYPE_LEN {
            return Err(EwfError::InvalidArgument(format!(
                "section type tag '{type_tag}' longer than {TYPE_LEN} bytes"
            )));
        }
        let mut buf = [0u8; SECTION_HEADER_SIZE as usize];
        buf[..type_tag.len()].copy_from_slice(type_tag.as_bytes());
        buf[16..24].copy_from_slice(&next_offset.to_le_bytes());
        buf[24..32].copy_from_slice(&section_size.to_le_bytes());
        // bytes[32..72] reserved, left zero.
        let checksum = adler32(&buf[..CHECKSUMMED_LEN]);
        buf[72..76].copy_from_slice(&checksum.to_le_bytes());
        Ok(buf)
    }
}
