//! `oxz list`.

use super::{Container, detect_container};
use oxz_core::{OxzError, Result};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::Path;

/// Machine-readable listing entry.
#[derive(Debug, Serialize)]
struct Listing {
    file: String,
    format: &'static str,
    compressed_size: u64,
    uncompressed_size: u64,
    streams: u32,
    blocks: u32,
    check: String,
    ratio: f64,
}

/// Verify `file` and print its structure.
pub fn cmd_list(file: &Path, json: bool) -> Result<()> {
    let data = fs::read(file)?;

    let container = detect_container(file, &data).ok_or_else(|| {
        OxzError::invalid_header(format!(
            "cannot determine the format of {}",
            file.display()
        ))
    })?;

    let listing = match container {
        Container::Xz => {
            let stats = oxz_xz::decode(&data[..], &mut io::sink(), &oxz_xz::XzOptions::default())?;
            Listing {
                file: file.display().to_string(),
                format: "xz",
                compressed_size: data.len() as u64,
                uncompressed_size: stats.bytes_out,
                streams: stats.streams,
                blocks: stats.blocks,
                check: stats.check_kind.name().to_string(),
                ratio: ratio(data.len() as u64, stats.bytes_out),
            }
        }
        Container::Lzip => {
            let decoded = oxz_lzma::lzip::decompress(&data)?;
            Listing {
                file: file.display().to_string(),
                format: "lzip",
                compressed_size: data.len() as u64,
                uncompressed_size: decoded.len() as u64,
                streams: 1,
                blocks: 1,
                check: "CRC32".to_string(),
                ratio: ratio(data.len() as u64, decoded.len() as u64),
            }
        }
        Container::LzmaAlone => {
            let decoded = oxz_lzma::decompress(&data[..])?;
            Listing {
                file: file.display().to_string(),
                format: "lzma",
                compressed_size: data.len() as u64,
                uncompressed_size: decoded.len() as u64,
                streams: 1,
                blocks: 1,
                check: "none".to_string(),
                ratio: ratio(data.len() as u64, decoded.len() as u64),
            }
        }
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&listing).expect("listing serializes")
        );
    } else {
        println!("file:         {}", listing.file);
        println!("format:       {}", listing.format);
        println!("streams:      {}", listing.streams);
        println!("blocks:       {}", listing.blocks);
        println!("check:        {}", listing.check);
        println!("compressed:   {} bytes", listing.compressed_size);
        println!("uncompressed: {} bytes", listing.uncompressed_size);
        println!("ratio:        {:.3}", listing.ratio);
    }
    Ok(())
}

fn ratio(compressed: u64, uncompressed: u64) -> f64 {
    if uncompressed == 0 {
        return 0.0;
    }
    compressed as f64 / uncompressed as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio() {
        assert_eq!(ratio(50, 100), 0.5);
        assert_eq!(ratio(10, 0), 0.0);
    }
}
