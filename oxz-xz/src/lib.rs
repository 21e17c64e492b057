//! # oxz XZ
//!
//! XZ container support: stream header/footer framing, block headers with
//! filter chains, the Delta and BCJ transform filters, per-block checks
//! (CRC-32, CRC-64, SHA-256), and index verification. Compression itself is
//! [`oxz_lzma`]'s LZMA2.
//!
//! ## Example
//!
//! ```
//! use oxz_xz::{decode, encode, XzOptions, XzWriteOptions};
//!
//! let stream = encode(b"hello xz", &XzWriteOptions::default()).unwrap();
//! let mut out = Vec::new();
//! let stats = decode(&stream[..], &mut out, &XzOptions::default()).unwrap();
//! assert_eq!(out, b"hello xz");
//! assert_eq!(stats.blocks, 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bcj;
pub mod block;
pub mod check;
pub mod delta;
pub mod filter;
pub mod reader;
pub mod vli;
pub mod writer;

pub use bcj::{BcjArch, BcjFilter};
pub use check::{CheckKind, Checksummer};
pub use delta::Delta;
pub use filter::FilterSpec;
pub use reader::{decode, decompress};
pub use writer::{encode, encode_to};

use oxz_lzma::{DEFAULT_MEMLIMIT, LzmaParams};

/// XZ stream magic: 0xFD, '7', 'z', 'X', 'Z', 0x00.
pub const STREAM_MAGIC: [u8; 6] = [0xFD, b'7', b'z', b'X', b'Z', 0x00];

/// XZ stream footer magic: 'Y', 'Z'.
pub const FOOTER_MAGIC: [u8; 2] = [b'Y', b'Z'];

/// Decode options.
#[derive(Debug, Clone, Copy)]
pub struct XzOptions {
    /// Refuse blocks whose dictionary exceeds this many bytes.
    pub memlimit_bytes: u64,
    /// Reject unknown filter IDs already while parsing block headers.
    /// When false, a header with unknown filters parses structurally and
    /// the error surfaces only if that block's payload must be decoded.
    pub reject_unknown_filters: bool,
}

impl Default for XzOptions {
    fn default() -> Self {
        Self {
            memlimit_bytes: DEFAULT_MEMLIMIT,
            reject_unknown_filters: true,
        }
    }
}

/// Encode options.
#[derive(Debug, Clone)]
pub struct XzWriteOptions {
    /// Per-block check kind.
    pub check: CheckKind,
    /// Non-terminal filters, in encode order; LZMA2 is appended implicitly.
    pub filters: Vec<FilterSpec>,
    /// LZMA parameters for the terminal filter.
    pub lzma: LzmaParams,
    /// Split input into blocks of this size; `None` writes one block.
    pub block_size: Option<usize>,
}

impl Default for XzWriteOptions {
    fn default() -> Self {
        Self {
            check: CheckKind::Crc64,
            filters: Vec::new(),
            lzma: LzmaParams::default(),
            block_size: None,
        }
    }
}

/// Result of a decode or encode run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Compressed bytes consumed (decode) or produced (encode).
    pub bytes_in: u64,
    /// Uncompressed bytes produced (decode) or consumed (encode).
    pub bytes_out: u64,
    /// Number of streams.
    pub streams: u32,
    /// Number of blocks across all streams.
    pub blocks: u32,
    /// Check kind of the last stream seen.
    pub check_kind: CheckKind,
}
