//! The 13-byte segment file header that precedes every section sequence:
//! 8-byte signature, 1-byte fields-start marker, 2-byte LE segment number
//! (1-based), 2-byte end-of-fields marker.
//!
//! Recognises both the EWF and EWF-S signatures via `format::FormatVariant`.

use crate::error::EwfError;
use crate::format::FormatVariant;

pub const SEGMENT_HEADER_SIZE: u64 = 13;
const FIELDS_START_MARKER: u8 = 1;
const END_OF_FIELDS_MARKER: [u8; 2] = [0, 0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentFileHeader {
    pub variant: FormatVariant,
    pub segment_number: u16,
}

impl SegmentFileHeader {
    pub fn encode(&self) -> [u8; SEGMENT_HEADER_SIZE as usize] {
        let mut buf = [0u8; SEGMENT_HEADER_SIZE as usize];
        buf[0..8].copy_from_slice(&self.variant.signature());
        buf[8] = FIELDS_START_MARKER;
        buf[9..11].copy_from_slice(&self.segment_number.to_le_bytes());
        buf[11..13].copy_from_slice(&END_OF_FIELDS_MARKER);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, EwfError> {
        if bytes.len() < SEGMENT_HEADER_SIZE as usize {
            return Err(EwfError::BadSignature);
        }
        let signature: [u8; 8] = bytes[0..8].try_into().unwrap();
        let variant = if signature == FormatVariant::Smart.signature() {
            FormatVariant::Smart
        } else if signature == FormatVariant::Ewf.signature() {
            // Disambiguated to the default EWF variant here; the caller
            // (reader::SegmentReader) refines this using header/volume
            // content, since the signature alone cannot distinguish
            // EnCase1..6 / FTK / linen5..6 / EWFX from each other.
            FormatVariant::Ewf
        } else {
            return Err(EwfError::BadSignature);
        };
        if bytes[8] != FIELDS_START_MARKER || bytes[11..13] != END_OF_FIELDS_MARKER {
            return Err(EwfError::corrupt(
                crate::error::CorruptContext::Section,
                "invalid segment header fields marker",
            ));
        }
        let segment_number = u16::from_le_bytes(bytes[9..11].try_into().unwrap());
        Ok(Self { variant, segment_number })
    }
}
