//! # oxz Core
//!
//! Core components for the oxz LZMA/XZ codec workspace.
//!
//! This crate provides the building blocks the codec crates share:
//!
//! - [`io`]: exact-size byte reads with a typed end-of-input error, endian
//!   helpers, and an offset-counting reader
//! - [`crc`]: incremental CRC-32 and CRC-64/ECMA-182
//! - [`error`]: the error taxonomy for the whole workspace
//!
//! ## Architecture
//!
//! oxz is layered bottom-up:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ L4: CLI                                                 │
//! │     oxz compress / decompress / list                    │
//! ├─────────────────────────────────────────────────────────┤
//! │ L3: Container                                           │
//! │     XZ stream/block framing, LZMA-alone, LZIP           │
//! ├─────────────────────────────────────────────────────────┤
//! │ L2: Codec                                               │
//! │     Range coder, LZMA, LZMA2, Delta/BCJ filters         │
//! ├─────────────────────────────────────────────────────────┤
//! │ L1: This crate                                          │
//! │     ByteReader/ByteWriter, CRC, errors                  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use oxz_core::crc::{Crc32, Crc64};
//!
//! assert_eq!(Crc32::compute(b"123456789"), 0xCBF43926);
//! assert_eq!(Crc64::compute(b"123456789"), 0x995DC9BBDF1939FA);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod crc;
pub mod error;
pub mod io;

// Re-exports for convenience
pub use crc::{Crc32, Crc64};
pub use error::{OxzError, Result};
pub use io::{ByteReader, ByteWriter, CountingReader};
