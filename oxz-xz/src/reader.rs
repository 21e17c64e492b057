//! XZ stream decoding.
//!
//! One-shot decoder for whole `.xz` inputs: stream header, blocks through
//! the filter chain, per-block check, index verification against what was
//! actually read, footer, and optional zero padding between concatenated
//! streams. Any violation stops decoding at the first detected offset.

use crate::block::BlockHeader;
use crate::check::{CheckKind, Checksummer};
use crate::filter::{Stage, build_stage};
use crate::{FOOTER_MAGIC, STREAM_MAGIC, Stats, XzOptions};
use oxz_core::crc::Crc32;
use oxz_core::error::{OxzError, Result};
use oxz_core::io::{ByteReader, CountingReader};
use oxz_lzma::lzma2::{Lzma2Decoder, dict_size_from_props};
use std::io::{Read, Write};

/// Per-block bookkeeping matched against the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlockRecord {
    unpadded: u64,
    uncompressed: u64,
}

/// Decode one or more concatenated XZ streams from `reader` into `sink`.
pub fn decode<R: Read, W: Write>(reader: R, sink: &mut W, opts: &XzOptions) -> Result<Stats> {
    let mut reader = CountingReader::new(reader);
    let mut stats = Stats::default();
    let mut first = true;

    loop {
        // Between streams: clean EOF, 4-byte groups of zero padding, or the
        // next stream header.
        let mut head = [0u8; 4];
        match read_or_eof(&mut reader, &mut head)? {
            None => {
                if first {
                    return Err(OxzError::unexpected_eof(12));
                }
                break;
            }
            Some(()) => {}
        }
        if head == [0u8; 4] {
            if first {
                return Err(OxzError::bad_magic(STREAM_MAGIC.to_vec(), head.to_vec()));
            }
            continue;
        }

        let mut rest = [0u8; 8];
        reader.read_exact_bytes(&mut rest)?;
        let mut header = [0u8; 12];
        header[..4].copy_from_slice(&head);
        header[4..].copy_from_slice(&rest);

        let check = parse_stream_header(&header)?;
        stats.check_kind = check;

        decode_stream_body(&mut reader, sink, opts, check, &mut stats)?;
        stats.streams += 1;
        first = false;
    }

    stats.bytes_in = reader.offset();
    Ok(stats)
}

/// Decode a whole in-memory `.xz` input with default options.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    decode(data, &mut out, &XzOptions::default())?;
    Ok(out)
}

fn parse_stream_header(header: &[u8; 12]) -> Result<CheckKind> {
    if header[..6] != STREAM_MAGIC {
        return Err(OxzError::bad_magic(
            STREAM_MAGIC.to_vec(),
            header[..6].to_vec(),
        ));
    }
    if header[6] != 0x00 || header[7] & 0xF0 != 0 {
        return Err(OxzError::invalid_header(
            "reserved stream flag bits are set",
        ));
    }
    let check = CheckKind::from_byte(header[7])?;

    let stored_crc = u32::from_le_bytes(header[8..12].try_into().expect("slice is 4 bytes"));
    let computed_crc = Crc32::compute(&header[6..8]);
    if stored_crc != computed_crc {
        return Err(OxzError::checksum_failed(
            "CRC32",
            stored_crc.to_le_bytes().to_vec(),
            computed_crc.to_le_bytes().to_vec(),
        ));
    }
    Ok(check)
}

fn decode_stream_body<R: Read, W: Write>(
    reader: &mut CountingReader<R>,
    sink: &mut W,
    opts: &XzOptions,
    check: CheckKind,
    stats: &mut Stats,
) -> Result<()> {
    let mut observed = Vec::new();

    loop {
        let size_byte = reader.read_u8()?;
        if size_byte == 0x00 {
            break;
        }
        let header_start = reader.offset() - 1;
        let header = BlockHeader::parse(
            reader,
            size_byte,
            header_start,
            opts.reject_unknown_filters,
        )?;
        let record = decode_block(reader, sink, opts, check, &header, header_start)?;
        stats.blocks += 1;
        stats.bytes_out += record.uncompressed;
        observed.push(record);
    }

    let index_size = verify_index(reader, &observed)?;
    verify_footer(reader, check, index_size)?;
    Ok(())
}

fn decode_block<R: Read, W: Write>(
    reader: &mut CountingReader<R>,
    sink: &mut W,
    opts: &XzOptions,
    check: CheckKind,
    header: &BlockHeader,
    header_start: u64,
) -> Result<BlockRecord> {
    // Header parsing may have been lenient; decoding never is.
    crate::filter::validate_chain(&header.filters)?;
    let lzma2 = header.filters.last().expect("validated chain is non-empty");

    let dict_size = dict_size_from_props(lzma2.props[0])?;
    if dict_size as u64 > opts.memlimit_bytes {
        return Err(OxzError::dict_too_large(dict_size as u64, opts.memlimit_bytes));
    }

    let front = &header.filters[..header.filters.len() - 1];
    let mut stages = front
        .iter()
        .map(|raw| build_stage(raw, false))
        .collect::<Result<Vec<Stage>>>()?;

    let payload_start = reader.offset();
    let mut buf = Vec::new();
    Lzma2Decoder::new(dict_size).decode_into(reader, &mut buf)?;
    let compressed_len = reader.offset() - payload_start;

    if let Some(declared) = header.compressed_size {
        if declared != compressed_len {
            return Err(OxzError::corrupted(
                header_start,
                format!(
                    "block declared {declared} compressed bytes, found {compressed_len}"
                ),
            ));
        }
    }

    // Undo the non-terminal filters, last listed first.
    for stage in stages.iter_mut().rev() {
        stage.decode(&mut buf);
    }

    if let Some(declared) = header.uncompressed_size {
        if declared != buf.len() as u64 {
            return Err(OxzError::corrupted(
                header_start,
                format!(
                    "block declared {declared} uncompressed bytes, produced {}",
                    buf.len()
                ),
            ));
        }
    }

    let mut summer = Checksummer::new(check);
    summer.update(&buf);
    let mut stored = vec![0u8; check.size()];
    reader.read_exact_bytes(&mut stored)?;
    summer.verify(&stored)?;

    read_zero_padding(reader)?;

    sink.write_all(&buf)?;
    Ok(BlockRecord {
        unpadded: header.header_size as u64 + compressed_len + check.size() as u64,
        uncompressed: buf.len() as u64,
    })
}

/// Consume zero bytes up to the next 4-byte boundary.
fn read_zero_padding<R: Read>(reader: &mut CountingReader<R>) -> Result<()> {
    let pad = (4 - reader.offset() % 4) % 4;
    for _ in 0..pad {
        let byte = reader.read_u8()?;
        if byte != 0 {
            return Err(OxzError::corrupted(
                reader.offset() - 1,
                format!("nonzero padding byte {byte:#04x}"),
            ));
        }
    }
    Ok(())
}

/// Parse the index (indicator already consumed) and compare it against the
/// blocks actually read. Returns the total index size in bytes.
fn verify_index<R: Read>(
    reader: &mut CountingReader<R>,
    observed: &[BlockRecord],
) -> Result<u64> {
    let mut crc = Crc32::new();
    crc.update(&[0x00]);
    let mut size: u64 = 1;

    let declared_count = read_vli_tracked(reader, &mut crc, &mut size)?;
    if declared_count != observed.len() as u64 {
        return Err(OxzError::index_mismatch(
            "record count",
            observed.len() as u64,
            declared_count,
        ));
    }

    for record in observed {
        let unpadded = read_vli_tracked(reader, &mut crc, &mut size)?;
        if unpadded != record.unpadded {
            return Err(OxzError::index_mismatch(
                "unpadded size",
                record.unpadded,
                unpadded,
            ));
        }
        let uncompressed = read_vli_tracked(reader, &mut crc, &mut size)?;
        if uncompressed != record.uncompressed {
            return Err(OxzError::index_mismatch(
                "uncompressed size",
                record.uncompressed,
                uncompressed,
            ));
        }
    }

    let pad = (4 - size % 4) % 4;
    for _ in 0..pad {
        let byte = reader.read_u8()?;
        if byte != 0 {
            return Err(OxzError::corrupted(
                reader.offset() - 1,
                "nonzero padding in index",
            ));
        }
        crc.update(&[0]);
    }
    size += pad;

    let stored_crc = reader.read_u32_le()?;
    let computed_crc = crc.finalize();
    if stored_crc != computed_crc {
        return Err(OxzError::checksum_failed(
            "CRC32",
            stored_crc.to_le_bytes().to_vec(),
            computed_crc.to_le_bytes().to_vec(),
        ));
    }

    Ok(size + 4)
}

/// Read a VLI byte by byte, feeding the index CRC and size counter.
fn read_vli_tracked<R: Read>(
    reader: &mut CountingReader<R>,
    crc: &mut Crc32,
    size: &mut u64,
) -> Result<u64> {
    let mut result = 0u64;
    for i in 0..9 {
        let byte = reader.read_u8()?;
        crc.update(&[byte]);
        *size += 1;
        result |= ((byte & 0x7F) as u64) << (7 * i);
        if byte & 0x80 == 0 {
            if byte == 0 && i > 0 {
                return Err(OxzError::invalid_header(
                    "non-canonical variable-length integer in index",
                ));
            }
            return Ok(result);
        }
    }
    Err(OxzError::invalid_header("variable-length integer too long"))
}

fn verify_footer<R: Read>(
    reader: &mut CountingReader<R>,
    check: CheckKind,
    index_size: u64,
) -> Result<()> {
    let mut footer = [0u8; 12];
    reader.read_exact_bytes(&mut footer)?;

    if footer[10..12] != FOOTER_MAGIC {
        return Err(OxzError::bad_magic(
            FOOTER_MAGIC.to_vec(),
            footer[10..12].to_vec(),
        ));
    }

    let stored_crc = u32::from_le_bytes(footer[..4].try_into().expect("slice is 4 bytes"));
    let computed_crc = Crc32::compute(&footer[4..10]);
    if stored_crc != computed_crc {
        return Err(OxzError::checksum_failed(
            "CRC32",
            stored_crc.to_le_bytes().to_vec(),
            computed_crc.to_le_bytes().to_vec(),
        ));
    }

    let backward_size = u32::from_le_bytes(footer[4..8].try_into().expect("slice is 4 bytes"));
    let real_backward = (backward_size as u64 + 1) * 4;
    if real_backward != index_size {
        return Err(OxzError::index_mismatch(
            "backward size",
            index_size,
            real_backward,
        ));
    }

    if footer[8] != 0x00 || footer[9] != check.to_byte() {
        return Err(OxzError::invalid_header(
            "stream footer flags disagree with the header",
        ));
    }

    Ok(())
}

/// Fill `buf` completely, or report a clean EOF if no byte was available.
fn read_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<Option<()>> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(OxzError::unexpected_eof(buf.len() - filled));
        }
        filled += n;
    }
    Ok(Some(()))
}
