//! # oxz LZMA
//!
//! LZMA and LZMA2 compression and decompression, plus the thin `.lzma`
//! (LZMA-alone) and `.lz` (LZIP) envelopes.
//!
//! The codec is built from four pieces that mirror the format's structure:
//!
//! - [`range_coder`]: the binary arithmetic coder with adaptive bit models
//! - [`model`]: the probability model and the 12-state symbol history
//! - [`window`]: the dictionary ring buffer
//! - [`decoder`] / [`encoder`]: the symbol loops on top of the three above
//! - [`lzma2`]: the chunk framer that decides what survives between chunks
//!
//! ## Decompression
//!
//! ```
//! use oxz_lzma::{decode_lzma2, encode_lzma2, LzmaParams};
//!
//! let params = LzmaParams::default();
//! let stream = encode_lzma2(b"Hello, LZMA2!", &params).unwrap();
//! let plain = decode_lzma2(&stream, params.dict_size).unwrap();
//! assert_eq!(plain, b"Hello, LZMA2!");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod decoder;
pub mod encoder;
pub mod lzip;
pub mod lzma2;
pub mod model;
pub mod price;
pub mod range_coder;
pub mod window;

// Re-exports
pub use decoder::{decompress, decompress_raw, decompress_with_memlimit, LzmaDecoder};
pub use encoder::{compress, compress_raw, LzmaEncoder};
pub use lzma2::{
    decode_lzma2, dict_size_from_props, encode_lzma2, props_from_dict_size, ChunkHeader,
    Lzma2Decoder, Lzma2Encoder, Reset,
};
pub use model::{LzmaProps, State};
pub use range_coder::{RangeDecoder, RangeEncoder};
pub use window::LzWindow;

/// Default dictionary ceiling: 1.5 GiB.
///
/// The format allows dictionaries up to 4 GiB - 1; anything above this
/// policy limit is refused with `DictionaryTooLarge` unless the caller
/// raises it.
pub const DEFAULT_MEMLIMIT: u64 = 1536 << 20;

/// LZMA encoding parameters.
///
/// `lc`/`lp`/`pb` shape the probability model (with `lc + lp <= 4` required
/// by LZMA2), `dict_size` bounds match distances, and `nice_len`/`depth`
/// control how hard the match finder works.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LzmaParams {
    /// Literal context bits (0-8).
    pub lc: u32,
    /// Literal position bits (0-4).
    pub lp: u32,
    /// Position bits (0-4).
    pub pb: u32,
    /// Dictionary size in bytes.
    pub dict_size: u32,
    /// Match length that stops the search early.
    pub nice_len: u32,
    /// Hash chain positions examined per search.
    pub depth: u32,
}

impl LzmaParams {
    /// Preset for a 0-9 compression level.
    pub fn from_level(level: u8) -> Self {
        let level = level.min(9);
        let dict_size = match level {
            0 => 1 << 16,
            1 => 1 << 18,
            2 => 1 << 19,
            3 => 1 << 20,
            4 => 1 << 21,
            5 => 1 << 22,
            6 => 1 << 23,
            7 => 1 << 24,
            8 => 1 << 25,
            _ => 1 << 26,
        };
        let depth = [0, 4, 8, 16, 32, 64, 128, 256, 512, 1024][level as usize];
        let nice_len = match level {
            0..=3 => 32,
            4..=6 => 64,
            7 | 8 => 128,
            _ => 273,
        };

        Self {
            lc: 3,
            lp: 0,
            pb: 2,
            dict_size,
            nice_len,
            depth,
        }
    }

    /// The model-shaping parameters as an [`LzmaProps`].
    pub fn props(&self) -> LzmaProps {
        LzmaProps {
            lc: self.lc,
            lp: self.lp,
            pb: self.pb,
        }
    }

    /// Validate ranges, including the LZMA2 `lc + lp` constraint.
    pub fn validate(&self) -> oxz_core::Result<()> {
        LzmaProps::new(self.lc, self.lp, self.pb)?;
        if self.lc + self.lp > 4 {
            return Err(oxz_core::OxzError::invalid_header(format!(
                "LZMA2 requires lc + lp <= 4, got {} + {}",
                self.lc, self.lp
            )));
        }
        if self.dict_size < 4096 {
            return Err(oxz_core::OxzError::invalid_header(format!(
                "dictionary of {} bytes is below the 4096-byte minimum",
                self.dict_size
            )));
        }
        Ok(())
    }
}

impl Default for LzmaParams {
    fn default() -> Self {
        Self::from_level(6)
    }
}
