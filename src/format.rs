//! Format variant selection: which on-disk dialect a handle speaks.
//!
//! The variant governs which header sections are emitted, whether 64-bit
//! segment sizes are legal, and whether `digest`/`session` sections are
//! written at all. Encase5 and earlier cap segments at 2 GiB; Encase6,
//! linen6 and EWFX allow the 64-bit segment size libewf calls "EX".

use crate::error::EwfError;
use serde::{Deserialize, Serialize};

/// EWF signature: `45 56 46 09 0D 0A FF 00`.
pub const EWF_SIGNATURE: [u8; 8] = [0x45, 0x56, 0x46, 0x09, 0x0d, 0x0a, 0xff, 0x00];
/// EWF-S (SMART) signature: `45 56 46 2D 53 4D 41 52 54 09 ...` truncated to
/// the first 8 bytes actually compared against the fixed-size header field.
pub const EWF_S_SIGNATURE: [u8; 8] = [0x45, 0x56, 0x46, 0x2d, 0x53, 0x4d, 0x41, 0x52];

/// 32-bit segment size cap used by every variant except EnCase 6 and EWFX.
pub const SEGMENT_CAP_32: u64 = 0x7FFF_FFFF; // ~2 GiB, signed 32-bit headroom
/// 64-bit segment size cap permitted for EnCase 6 / EWFX.
pub const SEGMENT_CAP_64: u64 = 0x7FFF_FFFF_FFFF; // ~7 EiB headroom used in practice

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormatVariant {
    Ewf,
    Smart,
    Ftk,
    Encase1,
    Encase2,
    Encase3,
    Encase4,
    Encase5,
    Encase6,
    Linen5,
    Linen6,
    Ewfx,
}

impl FormatVariant {
    pub fn parse(name: &str) -> Result<Self, EwfError> {
        use FormatVariant::*;
        Ok(match name {
            "ewf" => Ewf,
            "smart" => Smart,
            "ftk" => Ftk,
            "encase1" => Encase1,
            "encase2" => Encase2,
            "encase3" => Encase3,
            "encase4" => Encase4,
            "encase5" => Encase5,
            "encase6" => Encase6,
            "linen5" => Linen5,
            "linen6" => Linen6,
            "ewfx" => Ewfx,
            other => return Err(EwfError::FormatUnsupported(other.to_string())),
        })
    }

    /// Whether this variant permits 64-bit segment sizes (up to ~7 EiB).
    /// All others are capped at the 32-bit ~2 GiB boundary.
    pub fn allows_64bit_segments(&self) -> bool {
        matches!(self, FormatVariant::Encase6 | FormatVariant::Ewfx)
    }

    pub fn max_segment_size(&self) -> u64 {
        if self.allows_64bit_segments() {
            SEGMENT_CAP_64
        } else {
            SEGMENT_CAP_32
        }
    }

    /// Segment signature bytes for this variant.
    pub fn signature(&self) -> [u8; 8] {
        match self {
            FormatVariant::Smart => EWF_S_SIGNATURE,
            _ => EWF_SIGNATURE,
        }
    }

    /// Which header sections are emitted by the writer, in order.
    pub fn header_sections(&self) -> &'static [&'static str] {
        use FormatVariant::*;
        match self {
            Ewf | Smart | Ftk | Encase1 => &["header"],
            Encase2 | Encase3 | Encase4 => &["header", "header2"],
            Encase5 | Encase6 | Linen5 | Linen6 => &["header", "header2"],
            Ewfx => &["header", "header2", "xheader"],
        }
    }

    /// Whether `digest` is ever emitted by this variant at finalize time.
    pub fn emits_digest(&self) -> bool {
        use FormatVariant::*;
        matches!(
            self,
            Encase5 | Encase6 | Linen5 | Linen6 | Ewfx
        )
    }

    /// Whether `session` (optical session table) is ever emitted.
    pub fn emits_session(&self) -> bool {
        use FormatVariant::*;
        matches!(self, Encase5 | Encase6 | Linen5 | Linen6 | Ewfx)
    }

    /// Whether the `volume` record uses the newer `disk` tag name instead.
    pub fn uses_disk_tag(&self) -> bool {
        matches!(self, FormatVariant::Ewfx)
    }

    /// File extension base used for segment naming (see `naming.rs`).
    pub fn extension_family(&self) -> ExtensionFamily {
        match self {
            FormatVariant::Smart => ExtensionFamily::Smart,
            _ => ExtensionFamily::Ewf,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionFamily {
    /// `.E01`, `.E02`, …, `.EAA`, …
    Ewf,
    /// `.s01`, `.s02`, …
    Smart,
}
