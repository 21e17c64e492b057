//! Block headers.
//!
//! A block header is sized in 4-byte units by its first byte (0x00 there
//! means "index follows" and is handled by the caller), carries the filter
//! chain and optional compressed/uncompressed sizes, is padded with zeros
//! to its declared size, and ends with a CRC-32 over everything before it.

use crate::filter::{RawFilter, validate_chain};
use crate::vli;
use oxz_core::crc::Crc32;
use oxz_core::error::{OxzError, Result};
use oxz_core::io::ByteReader;
use std::io::Read;

/// Parsed block header.
#[derive(Debug, Clone)]
pub struct BlockHeader {
    /// Total encoded size including the size byte and CRC.
    pub header_size: usize,
    /// Declared compressed size, if present.
    pub compressed_size: Option<u64>,
    /// Declared uncompressed size, if present.
    pub uncompressed_size: Option<u64>,
    /// Filter chain, in encode order (LZMA2 last).
    pub filters: Vec<RawFilter>,
}

impl BlockHeader {
    /// Parse a block header whose nonzero size byte has already been read.
    ///
    /// With `strict` set, the filter chain is validated here and unknown
    /// filter IDs reject the header outright; otherwise structure alone is
    /// checked and chain problems surface when the block is decoded.
    pub fn parse<R: Read>(reader: &mut R, size_byte: u8, offset: u64, strict: bool) -> Result<Self> {
        let header_size = (size_byte as usize + 1) * 4;

        let mut raw = vec![0u8; header_size];
        raw[0] = size_byte;
        reader.read_exact_bytes(&mut raw[1..])?;

        let stored_crc = u32::from_le_bytes(
            raw[header_size - 4..]
                .try_into()
                .expect("slice is 4 bytes"),
        );
        let computed_crc = Crc32::compute(&raw[..header_size - 4]);
        if stored_crc != computed_crc {
            return Err(OxzError::checksum_failed(
                "CRC32",
                stored_crc.to_le_bytes().to_vec(),
                computed_crc.to_le_bytes().to_vec(),
            ));
        }

        let flags = raw[1];
        if flags & 0x3C != 0 {
            return Err(OxzError::invalid_header(
                "reserved block flag bits are set",
            ));
        }
        let num_filters = (flags & 0x03) as usize + 1;
        let has_compressed_size = flags & 0x40 != 0;
        let has_uncompressed_size = flags & 0x80 != 0;

        let body = &raw[..header_size - 4];
        let mut pos = 2usize;

        let compressed_size = if has_compressed_size {
            Some(vli::decode_vli(body, &mut pos)?)
        } else {
            None
        };
        let uncompressed_size = if has_uncompressed_size {
            Some(vli::decode_vli(body, &mut pos)?)
        } else {
            None
        };

        let mut filters = Vec::with_capacity(num_filters);
        for _ in 0..num_filters {
            let id = vli::decode_vli(body, &mut pos)?;
            let props_len = vli::decode_vli(body, &mut pos)? as usize;
            let props = body
                .get(pos..pos + props_len)
                .ok_or_else(|| {
                    OxzError::corrupted(offset, "filter properties run past the block header")
                })?
                .to_vec();
            pos += props_len;
            filters.push(RawFilter { id, props });
        }

        if body[pos..].iter().any(|&b| b != 0) {
            return Err(OxzError::corrupted(
                offset,
                "nonzero padding in block header",
            ));
        }

        if strict {
            validate_chain(&filters)?;
        }

        Ok(Self {
            header_size,
            compressed_size,
            uncompressed_size,
            filters,
        })
    }

    /// Encode a block header for the given filter chain (sizes omitted).
    pub fn encode(filters: &[RawFilter]) -> Result<Vec<u8>> {
        validate_chain(filters)?;
        debug_assert!(filters.len() <= 4);

        let mut body = Vec::new();
        body.push((filters.len() - 1) as u8);
        for filter in filters {
            vli::encode_vli(filter.id, &mut body);
            vli::encode_vli(filter.props.len() as u64, &mut body);
            body.extend_from_slice(&filter.props);
        }

        // size byte + body + padding + CRC must be a multiple of 4.
        let unpadded = 1 + body.len() + 4;
        let padding = (4 - unpadded % 4) % 4;
        let total = unpadded + padding;

        let mut out = Vec::with_capacity(total);
        out.push((total / 4 - 1) as u8);
        out.extend_from_slice(&body);
        out.extend(std::iter::repeat_n(0u8, padding));
        let crc = Crc32::compute(&out);
        out.extend_from_slice(&crc.to_le_bytes());

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FILTER_ID_DELTA, FILTER_ID_LZMA2};
    use std::io::Cursor;

    fn lzma2_chain() -> Vec<RawFilter> {
        vec![RawFilter {
            id: FILTER_ID_LZMA2,
            props: vec![0x16],
        }]
    }

    fn parse_back(encoded: &[u8]) -> Result<BlockHeader> {
        let mut cursor = Cursor::new(&encoded[1..]);
        BlockHeader::parse(&mut cursor, encoded[0], 0, true)
    }

    #[test]
    fn test_roundtrip_minimal() {
        let encoded = BlockHeader::encode(&lzma2_chain()).unwrap();
        assert_eq!(encoded.len() % 4, 0);

        let header = parse_back(&encoded).unwrap();
        assert_eq!(header.header_size, encoded.len());
        assert_eq!(header.filters, lzma2_chain());
        assert_eq!(header.compressed_size, None);
        assert_eq!(header.uncompressed_size, None);
    }

    #[test]
    fn test_roundtrip_with_delta() {
        let chain = vec![
            RawFilter {
                id: FILTER_ID_DELTA,
                props: vec![3],
            },
            RawFilter {
                id: FILTER_ID_LZMA2,
                props: vec![0x16],
            },
        ];
        let encoded = BlockHeader::encode(&chain).unwrap();
        let header = parse_back(&encoded).unwrap();
        assert_eq!(header.filters, chain);
    }

    #[test]
    fn test_crc_mismatch() {
        let mut encoded = BlockHeader::encode(&lzma2_chain()).unwrap();
        let len = encoded.len();
        encoded[len - 1] ^= 0x01;
        assert!(matches!(
            parse_back(&encoded).unwrap_err(),
            OxzError::ChecksumFailed { .. }
        ));
    }

    #[test]
    fn test_reserved_flag_bits_rejected() {
        let mut encoded = BlockHeader::encode(&lzma2_chain()).unwrap();
        encoded[1] |= 0x04;
        // Re-seal the CRC so only the reserved bit is at fault.
        let len = encoded.len();
        let crc = Crc32::compute(&encoded[..len - 4]);
        encoded[len - 4..].copy_from_slice(&crc.to_le_bytes());
        assert!(matches!(
            parse_back(&encoded).unwrap_err(),
            OxzError::InvalidHeader { .. }
        ));
    }

    #[test]
    fn test_nonzero_padding_rejected() {
        // A minimal LZMA2 header has padding bytes; poke one.
        let mut encoded = BlockHeader::encode(&lzma2_chain()).unwrap();
        let len = encoded.len();
        // Padding sits right before the CRC.
        encoded[len - 5] = 0xAA;
        let crc = Crc32::compute(&encoded[..len - 4]);
        encoded[len - 4..].copy_from_slice(&crc.to_le_bytes());
        assert!(matches!(
            parse_back(&encoded).unwrap_err(),
            OxzError::CorruptedData { .. }
        ));
    }

    #[test]
    fn test_truncated_header() {
        let encoded = BlockHeader::encode(&lzma2_chain()).unwrap();
        let mut cursor = Cursor::new(&encoded[1..encoded.len() - 2]);
        assert!(matches!(
            BlockHeader::parse(&mut cursor, encoded[0], 0, true).unwrap_err(),
            OxzError::UnexpectedEof { .. }
        ));
    }
}
