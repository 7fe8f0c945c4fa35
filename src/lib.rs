//! Chunked storage engine for the EWF (Expert Witness Compression Format)
//! family of forensic disk-image segment files: random-access read/write
//! over a `.E01`/`.E02`/… segment set through a single [`Handle`].
//!
//! See `handle::Handle` for the entry point; `format::FormatVariant` for
//! the supported on-disk dialects (EWF, SMART, FTK, EnCase1-6, linen5-6,
//! EWFX); `config::HandleConfig` for acquisition/access configuration.

pub mod cache;
pub mod chunk;
pub mod config;
pub mod error;
pub mod format;
pub mod geometry;
pub mod handle;
pub mod header;
pub mod naming;
pub mod pool;
pub mod record;
pub mod reader;
pub mod section;
pub mod segment;
pub mod table;
pub mod writer;

pub use config::{HandleConfig, HeaderCodepage};
pub use error::{ChecksumContext, CorruptContext, EwfError};
pub use format::FormatVariant;
pub use geometry::{CompressionLevel, MediaFlags, MediaGeometry, MediaType};
pub use handle::{Handle, ReadErrorEntry, SeekFrom};
pub use header::HeaderValues;
pub use record::SectorRange;
pub use table::{ChunkTable, ChunkTableEntry};
