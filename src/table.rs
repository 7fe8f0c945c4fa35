//! Chunk table: the `table`/`table2` wire format and the global offset
//! table assembled from it across segments.
//!
//! `table2` duplicates `table`'s entries as a redundancy check: prefer
//! `table` unless its checksum fails, fall back to `table2` if its
//! checksum is good, and otherwise accept `table` anyway while flagging
//! the range present-but-unverified rather than treating it as absent.
//!
//! Ref: https://github.com/libyal/libewf/blob/main/documentation/Expert%20Witness%20Compression%20Format%20(EWF).asciidoc#37-table-section

use crate::chunk::checksum::adler32;
use crate::error::{CorruptContext, EwfError};

/// `[u32 count][u32 zero][u64 base_offset][16 zero][u32 checksum]`.
pub const TABLE_PREFIX_SIZE: usize = 4 + 4 + 8 + 16 + 4;
const COMPRESSED_BIT: u32 = 0x8000_0000;
const OFFSET_MASK: u32 = 0x7FFF_FFFF;

/// A single chunk's location and status within the global chunk table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkTableEntry {
    pub segment_index: usize,
    pub file_offset: u64,
    pub stored_size: u64,
    pub is_compressed: bool,
    /// False when neither `table` nor `table2` could be trusted for this
    /// chunk; reads still return data but surface a checksum error.
    pub checksum_known: bool,
    /// Whether this chunk has already been folded into the handle's
    /// running MD5/SHA-1 accumulators (monotonic left-to-right during a
    /// sequential read or a finalize pass).
    pub hashed_through_here: bool,
}

/// One decoded `table`/`table2` section: the raw per-chunk offsets plus the
/// base offset they are relative to, before `stored_size` is derived from
/// neighbouring entries (or the `sectors` section's end, for the last
/// chunk in the group).
#[derive(Debug, Clone)]
pub struct RawTable {
    pub base_offset: u64,
    /// `(file_offset, is_compressed)` per chunk, in chunk order.
    pub entries: Vec<(u64, bool)>,
}

/// Decodes a `table`/`table2` payload. `payload` is the section's payload
/// bytes (not including the 76-byte section header).
///
/// Structural corruption (truncated prefix or entry array) is a hard
/// error. A checksum mismatch is *not* — the chunks for a table whose
/// checksum fails are still considered present but unverified rather than
/// absent, so the decoded offsets are returned alongside a `checksum_ok`
/// flag instead of an `Err`. Callers (`ChunkTable::merge_segment_table`)
/// decide what "unverified" means for reads.
pub fn decode_table(payload: &[u8]) -> Result<(RawTable, bool), EwfError> {
    if payload.len() < TABLE_PREFIX_SIZE {
        return Err(EwfError::corrupt(CorruptContext::Table, "truncated table prefix"));
    }
    let count = u32::from_le_bytes(payload[0..4].try_into().unwrap()) as usize;
    let base_offset = u64::from_le_bytes(payload[8..16].try_into().unwrap());
    let stored_prefix_checksum = u32::from_le_bytes(payload[32..36].try_into().unwrap());
    let computed_prefix_checksum = adler32(&payload[0..32]);
    let mut checksum_ok = stored_prefix_checksum == computed_prefix_checksum;

    let entries_start = TABLE_PREFIX_SIZE;
    let entries_bytes = count
        .checked_mul(4)
        .ok_or_else(|| EwfError::Overflow("table entry count overflow".into()))?;
    let entries_end = entries_start
        .checked_add(entries_bytes)
        .ok_or_else(|| EwfError::Overflow("table entry count overflow".into()))?;
    if payload.len() < entries_end + 4 {
        return Err(EwfError::corrupt(CorruptContext::Table, "truncated table entries"));
    }

    let array_checksum_stored =
        u32::from_le_bytes(payload[entries_end..entries_end + 4].try_into().unwrap());
    let array_checksum_computed = adler32(&payload[entries_start..entries_end]);
    checksum_ok &= array_checksum_stored == array_checksum_computed;

    let mut entries = Vec::with_capacity(count);
    for i in 0..count {
        let start = entries_start + i * 4;
        let raw = u32::from_le_bytes(payload[start..start + 4].try_into().unwrap());
        let compressed = raw & COMPRESSED_BIT != 0;
        let rel = (raw & OFFSET_MASK) as u64;
        entries.push((base_offset + rel, compressed));
    }

    Ok((RawTable { base_offset, entries }, checksum_ok))
}

/// Encodes a `table`/`table2` payload from absolute `(file_offset,
/// compressed)` pairs, storing them as deltas from `base_offset`.
pub fn encode_table(base_offset: u64, entries: &[(u64, bool)]) -> Result<Vec<u8>, EwfError> {
    let mut payload = Vec::with_capacity(TABLE_PREFIX_SIZE + entries.len() * 4 + 4);
    payload.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    payload.extend_from_slice(&0u32.to_le_bytes());
    payload.extend_from_slice(&base_offset.to_le_bytes());
    payload.extend_from_slice(&[0u8; 16]);
    let prefix_checksum = adler32(&payload[0..32]);
    payload.extend_from_slice(&prefix_checksum.to_le_bytes());
    debug_assert_eq!(payload.len(), TABLE_PREFIX_SIZE);

    let array_start = payload.len();
    for &(abs_offset, compressed) in entries {
        let rel = abs_offset
            .checked_sub(base_offset)
            .ok_or_else(|| EwfError::Overflow("chunk offset precedes table base_offset".into()))?;
        if rel > OFFSET_MASK as u64 {
            return Err(EwfError::Overflow(format!(
                "chunk delta offset {rel} exceeds the 31-bit table encoding"
            )));
        }
        let mut raw = rel as u32;
        if compressed {
            raw |= COMPRESSED_BIT;
        }
        payload.extend_from_slice(&raw.to_le_bytes());
    }
    let array_checksum = adler32(&payload[array_start..]);
    payload.extend_from_slice(&array_checksum.to_le_bytes());
    Ok(payload)
}

/// Global chunk table: index `0..N` maps to a `ChunkTableEntry`. Built
/// incrementally as segments are opened or chunks are written.
#[derive(Debug, Default, Clone)]
pub struct ChunkTable {
    entries: Vec<ChunkTableEntry>,
}

impl ChunkTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ChunkTableEntry> {
        self.entries.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut ChunkTableEntry> {
        self.entries.get_mut(index)
    }

    pub fn push(&mut self, entry: ChunkTableEntry) {
        self.entries.push(entry);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChunkTableEntry> {
        self.entries.iter()
    }

    /// Merges one segment's decoded chunk offsets into the global table,
    /// deriving `stored_size` for each chunk from the distance to the next
    /// chunk's offset (or, for the last chunk in the group, `sectors_end`
    /// — the absolute end of the `sectors` section payload).
    ///
    /// `chosen` is whichever of `table`/`table2` the caller selected: prefer
    /// `table`, fall back to `table2` if `table`'s checksum was bad and
    /// `table2`'s was not; if neither checksummed, use `table` anyway and
    /// pass `checksum_known = false` so every chunk in the group is
    /// recorded as present-but-unverified.
    pub fn merge_segment_table(
        &mut self,
        segment_index: usize,
        chosen: &RawTable,
        sectors_end: u64,
        checksum_known: bool,
    ) {
        let n = chosen.entries.len();
        for i in 0..n {
            let (file_offset, is_compressed) = chosen.entries[i];
            let end = if i + 1 < n {
                chosen.entries[i + 1].0
            } else {
                sectors_end
            };
            let stored_size = end.saturating_sub(file_offset);
            self.entries.push(ChunkTableEntry {
                segment_index,
                file_offset,
                stored_size,
                is_compressed,
                checksum_known,
                hashed_through_here: false,
            });
        }
    }
}
