//! Error types shared by the storage backends, the codec and the store.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure of a key-value storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid storage key {key:?} (expected [A-Za-z0-9._-]+)")]
    InvalidKey { key: String },

    #[error("{op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The backend refused the write (used by `MemoryStore` failure injection).
    #[error("write to slot {key:?} rejected: {reason}")]
    Rejected { key: String, reason: String },
}

impl StorageError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        StorageError::Io {
            op,
            path: path.into(),
            source,
        }
    }
}

/// Coarse classification of a decode failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeKind {
    /// Not well-formed JSON
    Syntax,
    /// Well-formed JSON with the wrong shape or a bad field value
    Data,
    /// Input ended early
    Eof,
    /// Reader failure underneath the decoder
    Io,
    /// Decoded, but rejected by record validation
    Invalid,
}

impl fmt::Display for DecodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DecodeKind::Syntax => "syntax",
            DecodeKind::Data => "data",
            DecodeKind::Eof => "eof",
            DecodeKind::Io => "io",
            DecodeKind::Invalid => "invalid",
        };
        f.write_str(s)
    }
}

/// Structured decode failure: what was being decoded, where, and why.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("decoding {what} failed at line {line}, column {column} ({kind}): {message}")]
pub struct DecodeError {
    pub what: String,
    pub kind: DecodeKind,
    /// 1-based; 0 when the failure has no position (validation)
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl DecodeError {
    pub fn from_json(what: impl Into<String>, err: &serde_json::Error) -> Self {
        use serde_json::error::Category;

        let kind = match err.classify() {
            Category::Syntax => DecodeKind::Syntax,
            Category::Data => DecodeKind::Data,
            Category::Eof => DecodeKind::Eof,
            Category::Io => DecodeKind::Io,
        };
        Self {
            what: what.into(),
            kind,
            line: err.line(),
            column: err.column(),
            message: err.to_string(),
        }
    }

    pub fn invalid(what: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            what: what.into(),
            kind: DecodeKind::Invalid,
            line: 0,
            column: 0,
            message: message.into(),
        }
    }
}

/// Failure of a `ReceiptStore` operation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("encoding receipts: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("a receipt with identifier {id:?} already exists")]
    DuplicateId { id: String },
}
