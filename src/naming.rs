//! Segment file naming: base name + `.E01`, `.E02`, …, `.EAA`, `.EAB`, …
//! (`.s01`, … for SMART); case-insensitive match on open.
//!
//! The numeric range only covers `E01`..`E99`; past that the extension
//! rolls over into the alphabetic scheme libewf uses for large segment
//! sets. Discovered paths are sorted by parsed segment number rather than
//! lexical path order, since lexical order puts `E100`-style names (which
//! don't exist in this scheme) and the alphabetic suffixes in the wrong
//! place relative to `E99`.

use crate::error::EwfError;
use crate::format::ExtensionFamily;
use std::path::{Path, PathBuf};

/// Returns the file extension (without the leading dot) for the `n`-th
/// (1-based) segment of `family`.
pub fn segment_extension(family: ExtensionFamily, n: u32) -> Result<String, EwfError> {
    if n == 0 {
        return Err(EwfError::InvalidArgument("segment numbers start at 1".into()));
    }
    let (lead_base, numeric_prefix, alpha_base): (u8, char, u8) = match family {
        ExtensionFamily::Ewf => (b'E', 'E', b'A'),
        ExtensionFamily::Smart => (b's', 's', b'a'),
    };
    if n <= 99 {
        return Ok(format!("{numeric_prefix}{n:02}"));
    }
    let idx = n - 100;
    let span = 26 * 26;
    let lead_offset = idx / span;
    let rem = idx % span;
    let first = alpha_base + (rem / 26) as u8;
    let second = alpha_base + (rem % 26) as u8;
    let lead_char = lead_base
        .checked_add(1 + lead_offset as u8)
        .ok_or_else(|| EwfError::Overflow("segment number exceeds the naming scheme's range".into()))?;
    Ok(format!(
        "{}{}{}",
        lead_char as char, first as char, second as char
    ))
}

/// Builds the path for the `n`-th segment given the base path supplied to
/// `open` in write mode (which the caller validates is an extensionless
/// base name).
pub fn segment_path(base: &Path, family: ExtensionFamily, n: u32) -> Result<PathBuf, EwfError> {
    let ext = segment_extension(family, n)?;
    Ok(base.with_extension(ext))
}

/// Discovers every segment belonging to the same multi-part image as
/// `path`, sorted by segment number. Matches case-insensitively on the
/// extension.
pub fn find_segments(path: &Path) -> Result<Vec<PathBuf>, EwfError> {
    let path = path
        .canonicalize()
        .map_err(|e| EwfError::io("open", None, e))?;
    let filename = path
        .file_name()
        .and_then(|f| f.to_str())
        .ok_or_else(|| EwfError::InvalidArgument("invalid file name".into()))?;
    if filename.len() < 2 {
        return Err(EwfError::InvalidArgument("file name too short to carry a segment extension".into()));
    }
    let base_filename = &filename[..filename.len() - 2];
    let parent = path
        .parent()
        .ok_or_else(|| EwfError::InvalidArgument("no parent directory".into()))?;

    let pattern = parent.join(format!("{base_filename}*"));
    let pattern_str = pattern
        .to_str()
        .ok_or_else(|| EwfError::InvalidArgument("invalid glob pattern".into()))?
        .to_string();

    let candidates: Vec<PathBuf> = glob::glob(&pattern_str)
        .map_err(|e| EwfError::InvalidArgument(format!("glob error: {e}")))?
        .filter_map(Result::ok)
        .collect();

    let mut numbered: Vec<(u32, PathBuf)> = Vec::new();
    for candidate in candidates {
        let ext = match candidate.extension().and_then(|e| e.to_str()) {
            Some(e) => e,
            None => continue,
        };
        if ext.len() != 3 {
            continue;
        }
        let lower_base = ext.to_ascii_lowercase();
        let prefix = lower_base.chars().next().unwrap();
        if prefix != 'e' && prefix != 's' {
            continue;
        }
        if let Some(num) = parse_segment_number(ext) {
            numbered.push((num, candidate));
        }
    }
    numbered.sort_by_key(|(n, _)| *n);
    if numbered.is_empty() {
        return Err(EwfError::InvalidArgument(format!(
            "no segment files found matching {pattern_str}"
        )));
    }
    Ok(numbered.into_iter().map(|(_, p)| p).collect())
}

/// Inverse of `segment_extension`: recovers the 1-based segment number
/// from a three-character extension, case-insensitively.
fn parse_segment_number(ext: &str) -> Option<u32> {
    let bytes = ext.as_bytes();
    if bytes.len() != 3 {
        return None;
    }
    let tail = &ext[1..];
    if tail.chars().all(|c| c.is_ascii_digit()) {
        return tail.parse().ok();
    }
    if tail.chars().all(|c| c.is_ascii_alphabetic()) {
        let upper: Vec<u8> = tail.bytes().map(|b| b.to_ascii_uppercase()).collect();
        let first = upper[0] - b'A';
        let second = upper[1] - b'A';
        return Some(100 + first as u32 * 26 + second as u32);
    }
    None
}
