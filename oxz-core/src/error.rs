//! Error types for oxz operations.
//!
//! Every failure the codec core can produce is represented here as a typed
//! variant. Decoders halt on the first detected problem; nothing is retried
//! inside the codec, and partial output already handed to a sink is not
//! rewound.

use std::io;
use thiserror::Error;

/// The main error type for oxz operations.
#[derive(Debug, Error)]
pub enum OxzError {
    /// I/O error from the underlying reader/writer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Source ended in the middle of a structure.
    #[error("Unexpected end of input: expected {expected} more bytes")]
    UnexpectedEof {
        /// Number of bytes that were expected but not available.
        expected: usize,
    },

    /// Stream or footer magic mismatch.
    #[error("Invalid magic: expected {expected:02x?}, found {found:02x?}")]
    BadMagic {
        /// Expected magic bytes.
        expected: Vec<u8>,
        /// Actual bytes found.
        found: Vec<u8>,
    },

    /// Corrupted data: range coder underrun, invalid control byte, illegal
    /// state transition, end marker where forbidden, distance past the
    /// dictionary, and similar bit-level violations.
    #[error("Corrupted data at offset {offset}: {message}")]
    CorruptedData {
        /// Byte offset where the corruption was detected.
        offset: u64,
        /// Description of the violated invariant.
        message: String,
    },

    /// A stored check did not match the recomputed one.
    #[error("{kind} check failed: expected {expected:02x?}, computed {actual:02x?}")]
    ChecksumFailed {
        /// Which check failed ("CRC32", "CRC64", "SHA-256", ...).
        kind: &'static str,
        /// Check bytes stored in the stream.
        expected: Vec<u8>,
        /// Check bytes computed from the data.
        actual: Vec<u8>,
    },

    /// Unknown or unimplemented filter ID in a block header.
    #[error("Unsupported filter ID {id:#x}")]
    UnsupportedFilter {
        /// The filter ID as encoded in the stream.
        id: u64,
    },

    /// Unknown check type byte in the stream flags.
    #[error("Unsupported check type {kind:#04x}")]
    UnsupportedCheck {
        /// The raw check-type byte.
        kind: u8,
    },

    /// Declared dictionary exceeds the memory policy ceiling.
    #[error("Dictionary of {requested} bytes exceeds the limit of {limit} bytes")]
    DictionaryTooLarge {
        /// Dictionary size requested by the stream.
        requested: u64,
        /// Configured ceiling.
        limit: u64,
    },

    /// The index disagrees with the blocks that were actually read.
    #[error("Index mismatch in {field}: observed {observed}, declared {declared}")]
    IndexMismatch {
        /// Which index field disagreed.
        field: &'static str,
        /// Value observed while reading blocks.
        observed: u64,
        /// Value declared by the index.
        declared: u64,
    },

    /// Structurally invalid header.
    #[error("Invalid header: {message}")]
    InvalidHeader {
        /// Description of the header problem.
        message: String,
    },
}

/// Result type alias for oxz operations.
pub type Result<T> = std::result::Result<T, OxzError>;

impl OxzError {
    /// Create an unexpected EOF error.
    pub fn unexpected_eof(expected: usize) -> Self {
        Self::UnexpectedEof { expected }
    }

    /// Create a bad magic error.
    pub fn bad_magic(expected: impl Into<Vec<u8>>, found: impl Into<Vec<u8>>) -> Self {
        Self::BadMagic {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create a corrupted data error.
    pub fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        Self::CorruptedData {
            offset,
            message: message.into(),
        }
    }

    /// Create a checksum failure.
    pub fn checksum_failed(
        kind: &'static str,
        expected: impl Into<Vec<u8>>,
        actual: impl Into<Vec<u8>>,
    ) -> Self {
        Self::ChecksumFailed {
            kind,
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create an unsupported filter error.
    pub fn unsupported_filter(id: u64) -> Self {
        Self::UnsupportedFilter { id }
    }

    /// Create an unsupported check error.
    pub fn unsupported_check(kind: u8) -> Self {
        Self::UnsupportedCheck { kind }
    }

    /// Create a dictionary-too-large error.
    pub fn dict_too_large(requested: u64, limit: u64) -> Self {
        Self::DictionaryTooLarge { requested, limit }
    }

    /// Create an index mismatch error.
    pub fn index_mismatch(field: &'static str, observed: u64, declared: u64) -> Self {
        Self::IndexMismatch {
            field,
            observed,
            declared,
        }
    }

    /// Create an invalid header error.
    pub fn invalid_header(message: impl Into<String>) -> Self {
        Self::InvalidHeader {
            message: message.into(),
        }
    }

    /// True when the error means the input was malformed rather than the
    /// environment failing. Used by callers that map errors to exit codes.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::UnexpectedEof { .. }
                | Self::BadMagic { .. }
                | Self::CorruptedData { .. }
                | Self::InvalidHeader { .. }
        )
    }
}
