//! Per-chunk compression pipeline: DEFLATE via `flate2`, with the
//! keep-raw-if-not-smaller rule that decides whether a chunk's high
//! "compressed" bit gets set at all.

use crate::chunk::checksum::adler32;
use crate::error::{ChecksumContext, EwfError};
use crate::geometry::CompressionLevel;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use std::io::{Read, Write};

/// Classical DEFLATE worst-case expansion bound:
/// `chunk_size + chunk_size/1000 + 12`.
pub fn compression_scratch_capacity(chunk_size: usize) -> usize {
    chunk_size + chunk_size / 1000 + 12
}

/// Result of encoding one chunk for storage: the bytes to write into the
/// `sectors` payload (payload plus trailing checksum) and whether the
/// high "compressed" bit must be set on this chunk's table entry.
pub struct EncodedChunk {
    pub stored: Vec<u8>,
    pub compressed: bool,
}

/// Encodes `raw` (exactly one chunk's worth of media bytes, possibly short
/// for the final chunk) per the level in effect.
///
/// - `None`: stored raw, unless `raw` is entirely zero and the all-zero
///   fast path below is what `EmptyBlockOnly` exists for; `None` always
///   skips compression.
/// - `EmptyBlockOnly`: an all-zero chunk is still run through DEFLATE
///   (which collapses it extremely well); any other chunk is stored raw.
/// - `Fast` / `Best`: DEFLATE is attempted at the configured level; if the
///   compressed output is not strictly smaller than `raw`, the raw form
///   is kept and the compressed flag stays clear.
pub fn encode_chunk(raw: &[u8], level: CompressionLevel) -> Result<EncodedChunk, EwfError> {
    let try_deflate = match level {
        CompressionLevel::None => false,
        CompressionLevel::EmptyBlockOnly => raw.iter().all(|&b| b == 0),
        CompressionLevel::Fast | CompressionLevel::Best => true,
    };

    if try_deflate {
        let deflate_level = if matches!(level, CompressionLevel::EmptyBlockOnly) {
            flate2::Compression::best()
        } else {
            level.deflate_level()
        };
        let mut capacity = compression_scratch_capacity(raw.len());
        capacity = capacity.max(64);
        let mut encoder = ZlibEncoder::new(Vec::with_capacity(capacity), deflate_level);
        encoder
            .write_all(raw)
            .map_err(|e| EwfError::io("compress", None, e))?;
        let compressed = encoder
            .finish()
            .map_err(|e| EwfError::io("compress", None, e))?;

        if compressed.len() < raw.len() {
            let mut stored = compressed;
            let sum = adler32(&stored);
            stored.extend_from_slice(&sum.to_le_bytes());
            return Ok(EncodedChunk {
                stored,
                compressed: true,
            });
        }
    }

    let mut stored = raw.to_vec();
    let sum = adler32(&stored);
    stored.extend_from_slice(&sum.to_le_bytes());
    Ok(EncodedChunk {
        stored,
        compressed: false,
    })
}

/// Decodes one stored chunk (`stored` includes the trailing 4-byte
/// checksum). `expected_len` is the geometry-derived length of this chunk
/// (short for the final chunk) used to size the inflate output buffer.
///
/// Verifies the checksum before inflating: look up the chunk entry, read
/// `stored_size` bytes, verify the trailing checksum, then inflate if the
/// compressed bit was set.
pub fn decode_chunk(stored: &[u8], compressed: bool, expected_len: usize) -> Result<Vec<u8>, EwfError> {
    if stored.len() < 4 {
        return Err(EwfError::corrupt(
            crate::error::CorruptContext::Section,
            "stored chunk shorter than the trailing checksum",
        ));
    }
    let (payload, sum_bytes) = stored.split_at(stored.len() - 4);
    let stored_sum = u32::from_le_bytes(sum_bytes.try_into().unwrap());
    let computed_sum = adler32(payload);
    if stored_sum != computed_sum {
        return Err(EwfError::bad_checksum(ChecksumContext::Chunk, None));
    }

    if !compressed {
        return Ok(payload.to_vec());
    }

    let mut decoder = ZlibDecoder::new(payload);
    let mut out = Vec::with_capacity(expected_len);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| EwfError::io("decompress", None, e))?;
    Ok(out)
}
