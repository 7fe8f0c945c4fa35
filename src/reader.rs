//! Segment reader: `Signature → FieldsMarker → Section* → Terminal`,
//! dispatching by type tag as the `next_offset` chain is walked.
//!
//! Sections are collected into a single `SegmentContents` as the chain is
//! walked rather than modelled as a graph — a segment file is always a
//! linear sequence, never a tree.

use crate::config::HeaderCodepage;
use crate::error::{CorruptContext, EwfError};
use crate::format::FormatVariant;
use crate::header::HeaderValues;
use crate::pool::FilePool;
use crate::record::{SectorRange, VolumeSection};
use crate::section::{SectionHeader, SECTION_HEADER_SIZE};
use crate::segment::{SegmentFileHeader, SEGMENT_HEADER_SIZE};
use crate::table::{decode_table, ChunkTable, RawTable};
use log::{debug, error};

/// Everything a single segment file contributed to the handle once fully
/// indexed: its header metadata, volume geometry (if this was the first
/// segment, or a `data` consistency copy otherwise), and whatever trailer
/// sections it carried.
#[derive(Default)]
pub struct SegmentContents {
    pub variant: Option<FormatVariant>,
    pub segment_number: Option<u16>,
    pub volume: Option<VolumeSection>,
    pub header: Option<HeaderValues>,
    pub md5: Option<[u8; 16]>,
    pub sha1: Option<[u8; 20]>,
    pub error_ranges: Vec<SectorRange>,
    pub session_ranges: Vec<SectorRange>,
    pub saw_terminal: bool,
}

/// Reads every section of segment `segment_index` (whose file is already
/// registered at that index in `pool`), merging chunk offsets into
/// `chunk_table` and returning the non-chunk-table contents of the
/// segment. Errors here are fatal to this segment only — the caller
/// decides whether to keep going with the segments that did parse.
pub fn read_segment(
    pool: &mut FilePool,
    segment_index: usize,
    chunk_table: &mut ChunkTable,
    header_codepage: HeaderCodepage,
) -> Result<SegmentContents, EwfError> {
    let size = pool.size(segment_index)?;
    debug!("opening segment {segment_index} ({size} bytes)");

    // Signature + FieldsMarker.
    let mut seg_header_bytes = vec![0u8; SEGMENT_HEADER_SIZE as usize];
    pool.read_exact_at(segment_index, 0, &mut seg_header_bytes)?;
    let seg_header = SegmentFileHeader::decode(&seg_header_bytes)?;
    debug!(
        "segment {segment_index} header: variant {:?}, segment_number {}",
        seg_header.variant, seg_header.segment_number
    );

    let mut contents = SegmentContents {
        variant: Some(seg_header.variant),
        segment_number: Some(seg_header.segment_number),
        ..Default::default()
    };

    let mut offset = SEGMENT_HEADER_SIZE;
    // Deferred `table`/`table2` pairing: a group is one-or-more `sectors`
    // sections followed by a `table` and a `table2` section.
    // `pending_sectors` accumulates the extents seen since the last flushed
    // group so the last chunk in the group can be sized against the end of
    // `sectors`, and `pending_table`/`pending_table2` hold whichever of the
    // pair has been seen so far.
    let mut pending_sectors: Vec<u64> = Vec::new();
    let mut pending_table: Option<(RawTable, bool)> = None;
    let mut pending_table2: Option<(RawTable, bool)> = None;

    loop {
        if offset + SECTION_HEADER_SIZE > size {
            return Err(EwfError::corrupt(
                CorruptContext::Section,
                format!("section header at 0x{offset:x} runs past end of segment"),
            ));
        }
        let mut header_bytes = [0u8; SECTION_HEADER_SIZE as usize];
        pool.read_exact_at(segment_index, offset, &mut header_bytes)?;
        let section = SectionHeader::decode(&header_bytes, offset).map_err(|e| {
            error!("segment {segment_index}: bad section header at 0x{offset:x}: {e}");
            e
        })?;

        let payload_offset = section.payload_offset();
        let payload_size = section.payload_size();
        if payload_offset + payload_size > size {
            return Err(EwfError::corrupt(
                CorruptContext::Section,
                format!("{} section payload runs past end of segment", section.type_tag),
            ));
        }
        let mut payload = vec![0u8; payload_size as usize];
        if payload_size > 0 {
            pool.read_exact_at(segment_index, payload_offset, &mut payload)?;
        }

        debug!("segment {segment_index}: section '{}' at 0x{offset:x}", section.type_tag);

        match section.type_tag.as_str() {
            "header" => {
                let text = HeaderValues::decode_text(&payload, header_codepage, false);
                contents.header = Some(HeaderValues::parse_metadata(&text));
            }
            "header2" => {
                let text = HeaderValues::decode_text(&payload, header_codepage, true);
                let parsed = HeaderValues::parse_metadata(&text);
                // `header2` is the richer UTF-16 form; prefer it over a
                // plain `header` already absorbed for the same segment.
                contents.header = Some(parsed);
            }
            "xheader" => {
                contents.header = Some(HeaderValues::parse_xheader(&payload));
            }
            "volume" | "disk" => {
                contents.volume = Some(VolumeSection::decode(&payload)?);
            }
            "data" => {
                // Consistency copy; decoded but not authoritative — the
                // first segment's `volume`/`disk` wins.
                let _ = VolumeSection::decode(&payload)?;
            }
            "sectors" => {
                pending_sectors.push(payload_offset + payload_size);
            }
            "table" => {
                pending_table = Some(decode_table(&payload)?);
            }
            "table2" => {
                pending_table2 = Some(decode_table(&payload)?);
            }
            "digest" => {
                let (md5, sha1) = crate::record::decode_digest(&payload)?;
                contents.md5 = Some(md5);
                contents.sha1 = Some(sha1);
            }
            "hash" => {
                let md5 = crate::record::decode_hash(&payload)?;
                contents.md5.get_or_insert(md5);
            }
            "xhash" => {
                let parsed = HeaderValues::parse_xheader(&payload);
                if let Some(md5_hex) = parsed.get("md5") {
                    if let Some(md5) = hex_to_array16(md5_hex) {
                        contents.md5.get_or_insert(md5);
                    }
                }
            }
            "error2" => {
                contents.error_ranges = crate::record::decode_ranges(&payload)?;
            }
            "session" => {
                contents.session_ranges = crate::record::decode_ranges(&payload)?;
            }
            "next" | "done" => {
                flush_pending_group(
                    segment_index,
                    chunk_table,
                    &mut pending_sectors,
                    &mut pending_table,
                    &mut pending_table2,
                )?;
                contents.saw_terminal = true;
                break;
            }
            other => {
                // Unknown/vendor section: not a structural error, just
                // nothing this reader absorbs.
                debug!("segment {segment_index}: skipping unrecognised section '{other}'");
            }
        }

        // `table2` always closes a group (it's always the second of the
        // pair), so flush as soon as both halves are in hand. Waiting for
        // `table2` rather than flushing on every `table` lets the
        // redundancy rule compare the two checksums.
        if section.type_tag == "table2" {
            flush_pending_group(
                segment_index,
                chunk_table,
                &mut pending_sectors,
                &mut pending_table,
                &mut pending_table2,
            )?;
        }

        if section.is_terminal() {
            contents.saw_terminal = true;
            break;
        }
        if section.next_offset <= offset {
            return Err(EwfError::corrupt(
                CorruptContext::Section,
                format!("non-increasing next_offset at 0x{offset:x}"),
            ));
        }
        offset = section.next_offset;
    }

    if !pending_sectors.is_empty() || pending_table.is_some() {
        flush_pending_group(
            segment_index,
            chunk_table,
            &mut pending_sectors,
            &mut pending_table,
            &mut pending_table2,
        )?;
    }

    Ok(contents)
}

/// Applies the `table`/`table2` redundancy rule to the currently pending
/// pair (and the `sectors` extents collected since the last flush), then
/// clears all three for the next group.
fn flush_pending_group(
    segment_index: usize,
    chunk_table: &mut ChunkTable,
    pending_sectors: &mut Vec<u64>,
    pending_table: &mut Option<(RawTable, bool)>,
    pending_table2: &mut Option<(RawTable, bool)>,
) -> Result<(), EwfError> {
    let table = pending_table.take();
    let table2 = pending_table2.take();
    let sectors_end = pending_sectors.last().copied().unwrap_or(0);
    pending_sectors.clear();

    let (chosen, checksum_known) = match (table, table2) {
        (Some((raw, true)), _) => (raw, true),
        (_, Some((raw, true))) => (raw, true),
        (Some((raw, false)), Some((_, false))) => (raw, false),
        (Some((raw, false)), None) => (raw, false),
        (None, Some((raw, false))) => (raw, false),
        (None, None) => return Ok(()),
    };

    chunk_table.merge_segment_table(segment_index, &chosen, sectors_end, checksum_known);
    Ok(())
}

fn hex_to_array16(hex: &str) -> Option<[u8; 16]> {
    if hex.len() != 32 {
        return None;
    }
    let mut out = [0u8; 16];
    for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
        let s = std::str::from_utf8(chunk).ok()?;
        out[i] = u8::from_str_radix(s, 16).ok()?;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{MediaFlags, MediaType};
    use crate::pool::OpenMode;
    use crate::table::encode_table;
    use std::io::Write;

    fn write_section(
        buf: &mut Vec<u8>,
        type_tag: &str,
        payload: &[u8],
        next_offset_override: Option<u64>,
    ) {
        let self_offset = buf.len() as u64;
        let section_size = SECTION_HEADER_SIZE + payload.len() as u64;
        let next_offset = next_offset_override.unwrap_or(self_offset + section_size);
        let header = SectionHeader::encode(type_tag, next_offset, section_size).unwrap();
        buf.extend_from_slice(&header);
        buf.extend_from_slice(payload);
    }

    #[test]
    fn reads_minimal_segment_with_one_chunk_group() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.E01");

        let mut buf = Vec::new();
        let seg_header = SegmentFileHeader {
            variant: FormatVariant::Ewf,
            segment_number: 1,
        };
        buf.extend_from_slice(&seg_header.encode());

        let volume = VolumeSection {
            media_type: MediaType::Fixed,
            chunk_count: 1,
            sectors_per_chunk: 64,
            bytes_per_sector: 512,
            total_sector_count: 64,
            media_flags: MediaFlags::PHYSICAL,
            compression_level: 0,
            error_granularity_sectors: 64,
            guid: uuid::Uuid::nil(),
        };
        write_section(&mut buf, "volume", &volume.encode(), None);

        let chunk_bytes = vec![0xABu8; 32_768];
        let sectors_offset = buf.len() as u64 + SECTION_HEADER_SIZE;
        write_section(&mut buf, "sectors", &chunk_bytes, None);
        let sectors_end = sectors_offset + chunk_bytes.len() as u64;

        let table_payload = encode_table(sectors_offset, &[(sectors_offset, false)]).unwrap();
        write_section(&mut buf, "table", &table_payload, None);
        write_section(&mut buf, "table2", &table_payload, None);

        let done_offset = buf.len() as u64;
        write_section(&mut buf, "done", &[], Some(done_offset));

        std::fs::File::create(&path).unwrap().write_all(&buf).unwrap();

        let mut pool = FilePool::new(10);
        pool.open(0, path, OpenMode::Read).unwrap();
        let mut chunk_table = ChunkTable::new();
        let contents = read_segment(&mut pool, 0, &mut chunk_table, HeaderCodepage::Ascii).unwrap();

        assert!(contents.saw_terminal);
        assert_eq!(contents.volume.unwrap().chunk_count, 1);
        assert_eq!(chunk_table.len(), 1);
        let entry = chunk_table.get(0).unwrap();
        assert!(entry.checksum_known);
        assert_eq!(entry.file_offset, sectors_offset);
        assert_eq!(entry.stored_size, sectors_end - sectors_offset);
    }

    #[test]
    fn table2_rescues_bad_table_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.E01");

        let mut buf = Vec::new();
        let seg_header = SegmentFileHeader {
            variant: FormatVariant::Ewf,
            segment_number: 1,
        };
        buf.extend_from_slice(&seg_header.encode());

        let sectors_offset = buf.len() as u64 + SECTION_HEADER_SIZE;
        write_section(&mut buf, "sectors", &[0u8; 512], None);

        let table_payload = encode_table(sectors_offset, &[(sectors_offset, false)]).unwrap();
        let mut bad_table_payload = table_payload.clone();
        bad_table_payload[0] ^= 0xFF;
        write_section(&mut buf, "table", &bad_table_payload, None);
        write_section(&mut buf, "table2", &table_payload, None);

        let done_offset = buf.len() as u64;
        write_section(&mut buf, "done", &[], Some(done_offset));

        std::fs::File::create(&path).unwrap().write_all(&buf).unwrap();

        let mut pool = FilePool::new(10);
        pool.open(0, path, OpenMode::Read).unwrap();
        let mut chunk_table = ChunkTable::new();
        read_segment(&mut pool, 0, &mut chunk_table, HeaderCodepage::Ascii).unwrap();

        let entry = chunk_table.get(0).unwrap();
        assert!(entry.checksum_known);
    }

    #[test]
    fn both_tables_bad_marks_unverified() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.E01");

        let mut buf = Vec::new();
        let seg_header = SegmentFileHeader {
            variant: FormatVariant::Ewf,
            segment_number: 1,
        };
        buf.extend_from_slice(&seg_header.encode());

        let sectors_offset = buf.len() as u64 + SECTION_HEADER_SIZE;
        write_section(&mut buf, "sectors", &[0u8; 512], None);

        let table_payload = encode_table(sectors_offset, &[(sectors_offset, false)]).unwrap();
        let mut bad1 = table_payload.clone();
        bad1[0] ^= 0xFF;
        let mut bad2 = table_payload;
        bad2[0] ^= 0x11;
        write_section(&mut buf, "table", &bad1, None);
        write_section(&mut buf, "table2", &bad2, None);

        let done_offset = buf.len() as u64;
        write_section(&mut buf, "done", &[], Some(done_offset));

        std::fs::File::create(&path).unwrap().write_all(&buf).unwrap();

        let mut pool = FilePool::new(10);
        pool.open(0, path, OpenMode::Read).unwrap();
        let mut chunk_table = ChunkTable::new();
        read_segment(&mut pool, 0, &mut chunk_table, HeaderCodepage::Ascii).unwrap();

        let entry = chunk_table.get(0).unwrap();
        assert!(!entry.checksum_known);
    }
}
