//! Error taxonomy for the EWF chunked storage engine.
//!
//! The original libewf idiom returns `1 / 0 / -1` with an out-parameter error
//! object threaded through every call. This module replaces that uniformly
//! with a single typed [`EwfError`] enum; out-parameter style is reserved for
//! a future C-compatible boundary and never leaks into the Rust API.

use thiserror::Error;

/// Which checksummed structure a [`EwfError::BadChecksum`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumContext {
    Section,
    Chunk,
    Table,
}

impl std::fmt::Display for ChecksumContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChecksumContext::Section => "section",
            ChecksumContext::Chunk => "chunk",
            ChecksumContext::Table => "table",
        };
        f.write_str(s)
    }
}

/// Which structural element a [`EwfError::Corrupt`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorruptContext {
    Section,
    Table,
    Geometry,
}

impl std::fmt::Display for CorruptContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CorruptContext::Section => "section",
            CorruptContext::Table => "table",
            CorruptContext::Geometry => "geometry",
        };
        f.write_str(s)
    }
}

/// Errors produced by the chunked storage engine.
///
/// Propagation discipline: the pool surfaces raw [`EwfError::Io`]; the
/// section codec adds section-type and offset context via the error
/// message; the handle adds logical-offset and chunk-index context the same
/// way. Checksum errors are recovered locally (see `handle::Handle::read`)
/// and never abort the whole stream by themselves.
#[derive(Debug, Error)]
pub enum EwfError {
    #[error("I/O error during {op} (segment index {index:?}): {source}")]
    Io {
        op: &'static str,
        index: Option<usize>,
        #[source]
        source: std::io::Error,
    },

    #[error("segment file does not begin with a recognised EWF/EWF-S signature")]
    BadSignature,

    #[error("{context} checksum mismatch{}", at.map(|a| format!(" at {a}")).unwrap_or_default())]
    BadChecksum {
        context: ChecksumContext,
        at: Option<String>,
    },

    #[error("{context} is structurally corrupt: {detail}")]
    Corrupt {
        context: CorruptContext,
        detail: String,
    },

    #[error("format variant is not recognised: {0}")]
    FormatUnsupported(String),

    #[error("format variant is inconsistent across segments: {0}")]
    FormatMismatch(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("size or arithmetic budget exceeded: {0}")]
    Overflow(String),

    #[error("operation aborted cooperatively")]
    Aborted,
}

impl EwfError {
    pub fn io(op: &'static str, index: Option<usize>, source: std::io::Error) -> Self {
        EwfError::Io { op, index, source }
    }

    pub fn bad_checksum(context: ChecksumContext, at: impl Into<Option<String>>) -> Self {
        EwfError::BadChecksum {
            context,
            at: at.into(),
        }
    }

    pub fn corrupt(context: CorruptContext, detail: impl Into<String>) -> Self {
        EwfError::Corrupt {
            context,
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EwfError>;
