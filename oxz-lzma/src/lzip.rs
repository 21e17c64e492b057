//! LZIP (.lz) format support, version 1.
//!
//! A member is a 6-byte header (magic "LZIP", version, coded dictionary
//! size), a raw LZMA stream with the fixed lc=3 lp=0 pb=2 properties
//! terminated by the end-of-payload marker, and a 20-byte footer: CRC-32 of
//! the uncompressed data, the uncompressed size, and the member size, all
//! little-endian. Members may be concatenated back to back.

use crate::decoder::decompress_raw;
use crate::encoder::compress_raw;
use crate::model::LzmaProps;
use crate::LzmaParams;
use oxz_core::crc::Crc32;
use oxz_core::error::{OxzError, Result};
use std::io::Cursor;

/// Member magic.
pub const LZIP_MAGIC: [u8; 4] = *b"LZIP";

/// Smallest dictionary the format allows (4 KiB).
pub const LZIP_DICT_MIN: u32 = 1 << 12;

/// Largest dictionary the format allows (512 MiB).
pub const LZIP_DICT_MAX: u32 = 1 << 29;

const HEADER_SIZE: usize = 6;
const FOOTER_SIZE: usize = 20;

/// Decode a coded dictionary-size byte: a power of two in bits 0-4 with up
/// to 7/16 of it subtracted back, encoded in bits 5-7.
fn dict_size_from_byte(byte: u8, offset: u64) -> Result<u32> {
    let log2 = (byte & 0x1F) as u32;
    if !(12..=29).contains(&log2) {
        return Err(OxzError::corrupted(
            offset,
            format!("invalid LZIP dictionary size byte {byte:#04x}"),
        ));
    }
    let base = 1u32 << log2;
    let fraction = ((byte >> 5) & 0x7) as u32;
    Ok(base - fraction * (base / 16))
}

/// Smallest coded byte whose dictionary covers `size`.
fn dict_byte_from_size(size: u32) -> u8 {
    let size = size.clamp(LZIP_DICT_MIN, LZIP_DICT_MAX);
    let log2 = 32 - (size - 1).leading_zeros();
    let log2 = log2.clamp(12, 29);
    let base = 1u32 << log2;

    let mut byte = log2 as u8;
    for fraction in (1..=7u32).rev() {
        if base - fraction * (base / 16) >= size {
            byte = log2 as u8 | ((fraction as u8) << 5);
            break;
        }
    }
    byte
}

/// Decode one member starting at `data[0]`; returns its output and the
/// number of bytes it occupied.
fn decode_member(data: &[u8], base_offset: u64) -> Result<(Vec<u8>, usize)> {
    if data.len() < HEADER_SIZE {
        return Err(OxzError::unexpected_eof(HEADER_SIZE - data.len()));
    }
    if data[..4] != LZIP_MAGIC {
        return Err(OxzError::bad_magic(LZIP_MAGIC.to_vec(), data[..4].to_vec()));
    }
    if data[4] != 1 {
        return Err(OxzError::invalid_header(format!(
            "unsupported LZIP version {}",
            data[4]
        )));
    }
    let dict_size = dict_size_from_byte(data[5], base_offset + 5)?;

    let mut cursor = Cursor::new(&data[HEADER_SIZE..]);
    let out = decompress_raw(&mut cursor, LzmaProps::default(), dict_size, None)?;
    let lzma_len = cursor.position() as usize;

    let footer_start = HEADER_SIZE + lzma_len;
    let footer = data
        .get(footer_start..footer_start + FOOTER_SIZE)
        .ok_or_else(|| OxzError::unexpected_eof(FOOTER_SIZE))?;

    let stored_crc = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
    let computed_crc = Crc32::compute(&out);
    if stored_crc != computed_crc {
        return Err(OxzError::checksum_failed(
            "CRC32",
            stored_crc.to_le_bytes().to_vec(),
            computed_crc.to_le_bytes().to_vec(),
        ));
    }

    let stored_size = u64::from_le_bytes(footer[4..12].try_into().expect("slice is 8 bytes"));
    if stored_size != out.len() as u64 {
        return Err(OxzError::corrupted(
            base_offset + footer_start as u64 + 4,
            format!(
                "LZIP data size mismatch: footer says {stored_size}, decoded {}",
                out.len()
            ),
        ));
    }

    let member_size = (footer_start + FOOTER_SIZE) as u64;
    let stored_member = u64::from_le_bytes(footer[12..20].try_into().expect("slice is 8 bytes"));
    if stored_member != member_size {
        return Err(OxzError::corrupted(
            base_offset + footer_start as u64 + 12,
            format!(
                "LZIP member size mismatch: footer says {stored_member}, actual {member_size}"
            ),
        ));
    }

    Ok((out, member_size as usize))
}

/// Decompress a `.lz` file: one or more concatenated members.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Err(OxzError::unexpected_eof(HEADER_SIZE));
    }

    let mut out = Vec::new();
    let mut pos = 0usize;
    while pos < data.len() {
        let (member_out, consumed) = decode_member(&data[pos..], pos as u64)?;
        out.extend_from_slice(&member_out);
        pos += consumed;
    }
    Ok(out)
}

/// Compress data into a single-member `.lz` file.
///
/// LZIP fixes the LZMA properties at lc=3 lp=0 pb=2; only the dictionary
/// size (and search effort) of `params` is honored.
pub fn compress(data: &[u8], params: &LzmaParams) -> Result<Vec<u8>> {
    let dict_byte = dict_byte_from_size(params.dict_size);
    let coded_dict = dict_size_from_byte(dict_byte, 0)?;

    let lzma_params = LzmaParams {
        lc: 3,
        lp: 0,
        pb: 2,
        dict_size: coded_dict,
        ..*params
    };
    let payload = compress_raw(data, &lzma_params, true)?;

    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len() + FOOTER_SIZE);
    out.extend_from_slice(&LZIP_MAGIC);
    out.push(1);
    out.push(dict_byte);
    out.extend_from_slice(&payload);

    out.extend_from_slice(&Crc32::compute(data).to_le_bytes());
    out.extend_from_slice(&(data.len() as u64).to_le_bytes());
    let member_size = (HEADER_SIZE + payload.len() + FOOTER_SIZE) as u64;
    out.extend_from_slice(&member_size.to_le_bytes());

    Ok(out)
}
