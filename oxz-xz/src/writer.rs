//! XZ stream encoding.
//!
//! One-shot encoder producing a single stream: header, one or more blocks
//! (non-terminal filters applied in order, then LZMA2), the index, and the
//! footer. Filter state is fresh per block so blocks stay independently
//! decodable.

use crate::block::BlockHeader;
use crate::check::Checksummer;
use crate::filter::{FILTER_ID_LZMA2, RawFilter, Stage, build_stage};
use crate::vli;
use crate::{FOOTER_MAGIC, STREAM_MAGIC, Stats, XzWriteOptions};
use oxz_core::crc::Crc32;
use oxz_core::error::{OxzError, Result};
use oxz_lzma::lzma2::{dict_size_from_props, encode_lzma2, props_from_dict_size};
use oxz_lzma::LzmaParams;
use std::io::Write;

/// Encode `data` as one XZ stream with the given options.
pub fn encode(data: &[u8], opts: &XzWriteOptions) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    encode_to(data, &mut out, opts)?;
    Ok(out)
}

/// Encode `data` as one XZ stream into `sink`.
pub fn encode_to<W: Write>(data: &[u8], sink: &mut W, opts: &XzWriteOptions) -> Result<Stats> {
    opts.lzma.validate()?;
    for spec in &opts.filters {
        spec.validate()?;
    }
    if opts.filters.len() > 3 {
        return Err(OxzError::invalid_header(
            "at most 3 filters may precede LZMA2",
        ));
    }

    let chain = build_chain(opts);
    let header_bytes = BlockHeader::encode(&chain)?;

    // The LZMA2 property byte rounds the dictionary up; code with the same
    // size the decoder will allocate.
    let dict_props = props_from_dict_size(opts.lzma.dict_size);
    let lzma = LzmaParams {
        dict_size: dict_size_from_props(dict_props)?,
        ..opts.lzma
    };

    let mut out = Vec::new();

    // Stream header.
    out.extend_from_slice(&STREAM_MAGIC);
    let flags = [0x00, opts.check.to_byte()];
    out.extend_from_slice(&flags);
    out.extend_from_slice(&Crc32::compute(&flags).to_le_bytes());

    // Blocks.
    let mut records: Vec<(u64, u64)> = Vec::new();
    let block_size = opts.block_size.unwrap_or(usize::MAX).max(1);

    for block_data in blocks_of(data, block_size) {
        let mut filtered = block_data.to_vec();
        for spec in &opts.filters {
            let raw = RawFilter {
                id: spec.id(),
                props: spec.props(),
            };
            let mut stage: Stage = build_stage(&raw, true)?;
            stage.encode(&mut filtered);
        }

        let payload = encode_lzma2(&filtered, &lzma)?;

        out.extend_from_slice(&header_bytes);
        out.extend_from_slice(&payload);

        let mut summer = Checksummer::new(opts.check);
        summer.update(block_data);
        out.extend_from_slice(&summer.finalize());

        let unpadded = header_bytes.len() + payload.len() + opts.check.size();
        let padding = (4 - unpadded % 4) % 4;
        out.extend(std::iter::repeat_n(0u8, padding));

        records.push((unpadded as u64, block_data.len() as u64));
    }

    // Index.
    let mut index = vec![0x00u8];
    vli::encode_vli(records.len() as u64, &mut index);
    for &(unpadded, uncompressed) in &records {
        vli::encode_vli(unpadded, &mut index);
        vli::encode_vli(uncompressed, &mut index);
    }
    let padding = (4 - index.len() % 4) % 4;
    index.extend(std::iter::repeat_n(0u8, padding));
    let index_crc = Crc32::compute(&index);
    index.extend_from_slice(&index_crc.to_le_bytes());
    out.extend_from_slice(&index);

    // Footer.
    let backward_size = (index.len() as u32 / 4) - 1;
    let mut footer_body = [0u8; 6];
    footer_body[..4].copy_from_slice(&backward_size.to_le_bytes());
    footer_body[4..].copy_from_slice(&flags);
    out.extend_from_slice(&Crc32::compute(&footer_body).to_le_bytes());
    out.extend_from_slice(&footer_body);
    out.extend_from_slice(&FOOTER_MAGIC);

    sink.write_all(&out)?;
    Ok(Stats {
        bytes_in: out.len() as u64,
        bytes_out: data.len() as u64,
        streams: 1,
        blocks: records.len() as u32,
        check_kind: opts.check,
    })
}

fn build_chain(opts: &XzWriteOptions) -> Vec<RawFilter> {
    let mut chain: Vec<RawFilter> = opts
        .filters
        .iter()
        .map(|spec| RawFilter {
            id: spec.id(),
            props: spec.props(),
        })
        .collect();
    chain.push(RawFilter {
        id: FILTER_ID_LZMA2,
        props: vec![props_from_dict_size(opts.lzma.dict_size)],
    });
    chain
}

/// Split data into encode blocks; empty input yields no blocks.
fn blocks_of(data: &[u8], block_size: usize) -> impl Iterator<Item = &[u8]> {
    data.chunks(block_size)
}
