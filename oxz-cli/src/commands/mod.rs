//! Command implementations for the oxz CLI.

pub mod compress;
pub mod decompress;
pub mod list;

pub use compress::{CheckArg, FormatArg, cmd_compress};
pub use decompress::cmd_decompress;
pub use list::cmd_list;

use oxz_xz::STREAM_MAGIC;
use std::path::Path;

/// Container formats the CLI can read and write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    /// `.xz` stream.
    Xz,
    /// `.lz` (LZIP) member chain.
    Lzip,
    /// `.lzma` (LZMA-alone) stream.
    LzmaAlone,
}

impl Container {
    /// File extension for the container.
    pub fn extension(self) -> &'static str {
        match self {
            Container::Xz => "xz",
            Container::Lzip => "lz",
            Container::LzmaAlone => "lzma",
        }
    }
}

/// Detect the container from leading magic bytes, falling back to the file
/// extension for the magicless LZMA-alone format.
pub fn detect_container(path: &Path, data: &[u8]) -> Option<Container> {
    if data.len() >= 6 && data[..6] == STREAM_MAGIC {
        return Some(Container::Xz);
    }
    if data.len() >= 4 && &data[..4] == b"LZIP" {
        return Some(Container::Lzip);
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some("lzma") => Some(Container::LzmaAlone),
        Some("xz") => Some(Container::Xz),
        Some("lz") => Some(Container::Lzip),
        _ => None,
    }
}
