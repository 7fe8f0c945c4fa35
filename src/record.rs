//! Fixed-layout section payloads other than `header`/`table`: `volume`/
//! `disk` (media geometry), `hash`/`digest` (integrity hashes), `error2`
//! (acquiry error ranges) and `session` (optical session table).
//!
//! The `volume` layout's first four fields keep their well-known byte
//! offsets so real-world EWF images stay readable; the rest follow the
//! field lists libewf documents for a `disk` record, a `hash` record and
//! an `error2` table.

use crate::chunk::checksum::adler32;
use crate::error::{CorruptContext, EwfError};
use crate::geometry::{MediaFlags, MediaType};
use uuid::Uuid;

/// `volume`/`disk` section payload. 64 bytes, no trailing checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeSection {
    pub media_type: MediaType,
    pub chunk_count: u32,
    pub sectors_per_chunk: u32,
    pub bytes_per_sector: u32,
    pub total_sector_count: u64,
    pub media_flags: MediaFlags,
    pub compression_level: u8,
    pub error_granularity_sectors: u32,
    pub guid: Uuid,
}

pub const VOLUME_PAYLOAD_SIZE: usize = 64;

impl VolumeSection {
    pub fn encode(&self) -> [u8; VOLUME_PAYLOAD_SIZE] {
        let mut buf = [0u8; VOLUME_PAYLOAD_SIZE];
        buf[0] = self.media_type.to_byte();
        buf[4..8].copy_from_slice(&self.chunk_count.to_le_bytes());
        buf[8..12].copy_from_slice(&self.sectors_per_chunk.to_le_bytes());
        buf[12..16].copy_from_slice(&self.bytes_per_sector.to_le_bytes());
        buf[16..24].copy_from_slice(&self.total_sector_count.to_le_bytes());
        buf[24] = self.media_flags.bits();
        buf[25] = self.compression_level;
        buf[28..32].copy_from_slice(&self.error_granularity_sectors.to_le_bytes());
        buf[32..48].copy_from_slice(self.guid.as_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, EwfError> {
        if bytes.len() < VOLUME_PAYLOAD_SIZE {
            return Err(EwfError::corrupt(CorruptContext::Geometry, "truncated volume section"));
        }
        let chunk_count = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let sectors_per_chunk = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        let bytes_per_sector = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
        let total_sector_count = u64::from_le_bytes(bytes[16..24].try_into().unwrap());
        let error_granularity_sectors = u32::from_le_bytes(bytes[28..32].try_into().unwrap());
        let guid = Uuid::from_slice(&bytes[32..48]).unwrap_or(Uuid::nil());
        Ok(Self {
            media_type: MediaType::from_byte(bytes[0]),
            chunk_count,
            sectors_per_chunk,
            bytes_per_sector,
            total_sector_count,
            media_flags: MediaFlags::from_bits(bytes[24]),
            compression_level: bytes[25],
            error_granularity_sectors,
            guid,
        })
    }
}

/// `hash` section: MD5 only, plus trailing checksum.
pub const HASH_PAYLOAD_SIZE: usize = 16 + 16 + 4;

pub fn encode_hash(md5: &[u8; 16]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HASH_PAYLOAD_SIZE);
    buf.extend_from_slice(md5);
    buf.extend_from_slice(&[0u8; 16]);
    let checksum = adler32(&buf);
    buf.extend_from_slice(&checksum.to_le_bytes());
    buf
}

pub fn decode_hash(bytes: &[u8]) -> Result<[u8; 16], EwfError> {
    if bytes.len() < HASH_PAYLOAD_SIZE {
        return Err(EwfError::corrupt(CorruptContext::Section, "truncated hash section"));
    }
    let stored_checksum = u32::from_le_bytes(bytes[32..36].try_into().unwrap());
    if adler32(&bytes[..32]) != stored_checksum {
        return Err(EwfError::bad_checksum(crate::error::ChecksumContext::Section, Some("hash".into())));
    }
    let mut md5 = [0u8; 16];
    md5.copy_from_slice(&bytes[0..16]);
    Ok(md5)
}

/// `digest` section: MD5 + SHA-1, plus trailing checksum.
pub const DIGEST_PAYLOAD_SIZE: usize = 16 + 20 + 40 + 4;

pub fn encode_digest(md5: &[u8; 16], sha1: &[u8; 20]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(DIGEST_PAYLOAD_SIZE);
    buf.extend_from_slice(md5);
    buf.extend_from_slice(sha1);
    buf.extend_from_slice(&[0u8; 40]);
    let checksum = adler32(&buf);
    buf.extend_from_slice(&checksum.to_le_bytes());
    buf
}

pub fn decode_digest(bytes: &[u8]) -> Result<([u8; 16], [u8; 20]), EwfError> {
    if bytes.len() < DIGEST_PAYLOAD_SIZE {
        return Err(EwfError::corrupt(CorruptContext::Section, "truncated digest section"));
    }
    let stored_checksum = u32::from_le_bytes(bytes[76..80].try_into().unwrap());
    if adler32(&bytes[..76]) != stored_checksum {
        return Err(EwfError::bad_checksum(crate::error::ChecksumContext::Section, Some("digest".into())));
    }
    let mut md5 = [0u8; 16];
    md5.copy_from_slice(&bytes[0..16]);
    let mut sha1 = [0u8; 20];
    sha1.copy_from_slice(&bytes[16..36]);
    Ok((md5, sha1))
}

/// A `(first_sector, sector_count)` range, used by both `error2`
/// (acquiry errors) and `session` (optical session table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorRange {
    pub first_sector: u32,
    pub sector_count: u32,
}

pub fn encode_ranges(ranges: &[SectorRange]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + ranges.len() * 8 + 4);
    buf.extend_from_slice(&(ranges.len() as u32).to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes());
    for r in ranges {
        buf.extend_from_slice(&r.first_sector.to_le_bytes());
        buf.extend_from_slice(&r.sector_count.to_le_bytes());
    }
    let checksum = adler32(&buf[8..]);
    buf.extend_from_slice(&checksum.to_le_bytes());
    buf
}

pub fn decode_ranges(bytes: &[u8]) -> Result<Vec<SectorRange>, EwfError> {
    if bytes.len() < 8 {
        return Err(EwfError::corrupt(CorruptContext::Section, "truncated range table"));
    }
    let count = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
    let entries_end = 8 + count * 8;
    if bytes.len() < entries_end + 4 {
        return Err(EwfError::corrupt(CorruptContext::Section, "truncated range entries"));
    }
    let stored_checksum = u32::from_le_bytes(bytes[entries_end..entries_end + 4].try_into().unwrap());
    if adler32(&bytes[8..entries_end]) != stored_checksum {
        return Err(EwfError::bad_checksum(crate::error::ChecksumContext::Section, Some("ranges".into())));
    }
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let start = 8 + i * 8;
        let first_sector = u32::from_le_bytes(bytes[start..start + 4].try_into().unwrap());
        let sector_count = u32::from_le_bytes(bytes[start + 4..start + 8].try_into().unwrap());
        out.push(SectorRange { first_sector, sector_count });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_round_trip() {
        let v = VolumeSection {
            media_type: MediaType::Fixed,
            chunk_count: 32,
            sectors_per_chunk: 64,
            bytes_per_sector: 512,
            total_sector_count: 2048,
            media_flags: MediaFlags::PHYSICAL,
            compression_level: 1,
            error_granularity_sectors: 64,
            guid: Uuid::nil(),
        };
        let encoded = v.encode();
        let decoded = VolumeSection::decode(&encoded).unwrap();
        assert_eq!(decoded, v);
    }

    #[test]
    fn hash_round_trip() {
        let md5 = [7u8; 16];
        let encoded = encode_hash(&md5);
        assert_eq!(decode_hash(&encoded).unwrap(), md5);
    }

    #[test]
    fn digest_round_trip() {
        let md5 = [1u8; 16];
        let sha1 = [2u8; 20];
        let encoded = encode_digest(&md5, &sha1);
        assert_eq!(decode_digest(&encoded).unwrap(), (md5, sha1));
    }

    #[test]
    fn ranges_round_trip() {
        let ranges = vec![
            SectorRange { first_sector: 10, sector_count: 5 },
            SectorRange { first_sector: 100, sector_count: 1 },
        ];
        let encoded = encode_ranges(&ranges);
        assert_eq!(decode_ranges(&encoded).unwrap(), ranges);
    }
}
