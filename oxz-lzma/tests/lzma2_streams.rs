//! Hand-built LZMA2 byte streams.
//!
//! These tests construct chunk sequences byte by byte so the decoder is
//! checked against the wire format itself rather than against our own
//! encoder.

use oxz_core::OxzError;
use oxz_lzma::model::{LzmaModel, LzmaProps, len_to_dist_state};
use oxz_lzma::range_coder::RangeEncoder;
use oxz_lzma::{LzmaParams, Lzma2Decoder, decode_lzma2, encode_lzma2};
use std::io::Cursor;

/// Encode a single MATCH symbol (fresh model, state 0) as a raw LZMA
/// payload. `dist` is the zero-based distance, so the copy reaches back
/// `dist + 1` bytes.
fn lzma_payload_single_match(dist: u32, len: u32) -> Vec<u8> {
    let mut model = LzmaModel::new(LzmaProps::default());
    let mut rc = RangeEncoder::new();

    // is_match[state=0][pos_state=0] = 1, is_rep = 0.
    rc.encode_bit(&mut model.is_match[0][0], 1);
    rc.encode_bit(&mut model.is_rep[0], 0);

    // Length coder, biased by 2.
    let biased = len - 2;
    if biased < 8 {
        rc.encode_bit(&mut model.match_len.choice, 0);
        rc.encode_bit_tree(&mut model.match_len.low[0], biased);
    } else if biased < 16 {
        rc.encode_bit(&mut model.match_len.choice, 1);
        rc.encode_bit(&mut model.match_len.choice2, 0);
        rc.encode_bit_tree(&mut model.match_len.mid[0], biased - 8);
    } else {
        rc.encode_bit(&mut model.match_len.choice, 1);
        rc.encode_bit(&mut model.match_len.choice2, 1);
        rc.encode_bit_tree(&mut model.match_len.high, biased - 16);
    }

    // Distance: slot tree, then the per-slot reverse tree (small slots).
    let slot = oxz_lzma::model::dist_slot(dist);
    assert!(slot >= 4 && slot < 14, "test helper covers special slots only");
    rc.encode_bit_tree(
        &mut model.distance.slot[len_to_dist_state(len)],
        slot,
    );
    let footer_bits = (slot >> 1) - 1;
    let reduced = dist - ((2 | (slot & 1)) << footer_bits);
    rc.encode_reverse_bit_tree(&mut model.distance.special[slot as usize - 4], reduced);

    rc.finish()
}

/// An uncompressed chunk preloads the dictionary, then a
/// compressed chunk (state reset + props, dictionary preserved) copies
/// distance 8, length 32 out of it.
#[test]
fn uncompressed_chunk_preloads_dictionary() {
    let payload = lzma_payload_single_match(7, 32);

    let mut stream = Vec::new();
    // Uncompressed chunk with dictionary reset: "ABCDEFGH".
    stream.push(0x01);
    stream.extend_from_slice(&7u16.to_be_bytes());
    stream.extend_from_slice(b"ABCDEFGH");
    // Compressed chunk, control 0xC0 (state reset + props, dict kept).
    stream.push(0xC0);
    stream.extend_from_slice(&31u16.to_be_bytes());
    stream.extend_from_slice(&((payload.len() - 1) as u16).to_be_bytes());
    stream.push(LzmaProps::default().to_byte());
    stream.extend_from_slice(&payload);
    stream.push(0x00);

    let out = decode_lzma2(&stream, 1 << 16).unwrap();
    assert_eq!(out.len(), 40);
    assert_eq!(&out[..8], b"ABCDEFGH");
    assert_eq!(&out[8..], b"ABCDEFGH".repeat(4).as_slice());
}

/// The same stream without the preload must fail: the match has nothing to
/// reach back into.
#[test]
fn match_into_empty_dictionary_is_corrupt() {
    let payload = lzma_payload_single_match(7, 32);

    let mut stream = Vec::new();
    stream.push(0xE0); // full reset, empty dictionary
    stream.extend_from_slice(&31u16.to_be_bytes());
    stream.extend_from_slice(&((payload.len() - 1) as u16).to_be_bytes());
    stream.push(LzmaProps::default().to_byte());
    stream.extend_from_slice(&payload);
    stream.push(0x00);

    assert!(matches!(
        decode_lzma2(&stream, 1 << 16).unwrap_err(),
        OxzError::CorruptedData { .. }
    ));
}

/// Every strict prefix of a valid stream must fail, never
/// "succeed short".
#[test]
fn truncated_prefixes_never_succeed() {
    let params = LzmaParams::default();
    let stream = encode_lzma2(b"Hello, LZMA2!", &params).unwrap();

    for cut in 2..stream.len() {
        let prefix = &stream[..cut];
        let result = decode_lzma2(prefix, params.dict_size);
        match result {
            Err(OxzError::UnexpectedEof { .. }) | Err(OxzError::CorruptedData { .. }) => {}
            Err(other) => panic!("prefix {cut}: unexpected error kind {other:?}"),
            Ok(out) => panic!("prefix {cut}: decoded {} bytes from a truncated stream", out.len()),
        }
    }
}

/// An illegal control byte fails without touching the sink.
#[test]
fn illegal_control_byte_leaves_sink_untouched() {
    let stream = [0x03u8, 0xAA, 0xBB, 0xCC];
    let mut out = Vec::new();
    let mut decoder = Lzma2Decoder::new(1 << 16);
    let err = decoder
        .decode_into(&mut Cursor::new(&stream[..]), &mut out)
        .unwrap_err();
    assert!(matches!(err, OxzError::CorruptedData { .. }));
    assert!(out.is_empty(), "sink must stay untouched");
}

/// Boundary case: a maximum-size (65536 byte) uncompressed chunk with
/// dictionary reset as the final data-bearing chunk.
#[test]
fn max_size_uncompressed_chunk() {
    let body: Vec<u8> = (0u32..65536).map(|i| (i % 253) as u8).collect();

    let mut stream = Vec::new();
    stream.push(0x01);
    stream.extend_from_slice(&0xFFFFu16.to_be_bytes());
    stream.extend_from_slice(&body);
    stream.push(0x00);

    let out = decode_lzma2(&stream, 1 << 16).unwrap();
    assert_eq!(out, body);
}

/// Two uncompressed chunks where the second must not reset: the bytes of
/// both end up in the dictionary and in the output in order.
#[test]
fn uncompressed_chunks_concatenate() {
    let mut stream = Vec::new();
    stream.push(0x01);
    stream.extend_from_slice(&3u16.to_be_bytes());
    stream.extend_from_slice(b"left");
    stream.push(0x02);
    stream.extend_from_slice(&4u16.to_be_bytes());
    stream.extend_from_slice(b"right");
    stream.push(0x00);

    assert_eq!(decode_lzma2(&stream, 1 << 16).unwrap(), b"leftright");
}

/// The dictionary must survive a 0xC0 (state reset + props) chunk: only
/// 0xE0 and 0x01 reset it. A match in a 0xC0 chunk that reaches back into
/// bytes produced before an intervening uncompressed chunk proves the
/// window was preserved through both.
#[test]
fn dictionary_survives_state_resets() {
    let payload = lzma_payload_single_match(12, 13); // reach 13 back, copy 13

    let mut stream = Vec::new();
    stream.push(0x01);
    stream.extend_from_slice(&7u16.to_be_bytes());
    stream.extend_from_slice(b"ABCDEFGH");
    stream.push(0x02);
    stream.extend_from_slice(&4u16.to_be_bytes());
    stream.extend_from_slice(b"12345");
    stream.push(0xC0);
    stream.extend_from_slice(&12u16.to_be_bytes());
    stream.extend_from_slice(&((payload.len() - 1) as u16).to_be_bytes());
    stream.push(LzmaProps::default().to_byte());
    stream.extend_from_slice(&payload);
    stream.push(0x00);

    let out = decode_lzma2(&stream, 1 << 16).unwrap();
    assert_eq!(out, b"ABCDEFGH12345ABCDEFGH12345");
}

/// Model preservation across 0x80 chunks: a long input goes through the
/// encoder's multi-chunk path and must come back identical.
#[test]
fn model_preserved_across_continuation_chunks() {
    let data: Vec<u8> = b"abcdefghij"
        .iter()
        .copied()
        .cycle()
        .take(200_000)
        .collect();
    let params = LzmaParams::default();
    let stream = encode_lzma2(&data, &params).unwrap();

    // Walk the chunk headers: at least one continuation chunk (0x80-0x9F)
    // proves the decoder carried model state across a chunk boundary.
    let controls = chunk_controls(&stream);
    assert!(controls.len() > 1);
    assert!(
        controls.iter().any(|c| (0x80..0xA0).contains(c)),
        "expected a no-reset continuation chunk, got {controls:02x?}"
    );

    let out = decode_lzma2(&stream, params.dict_size).unwrap();
    assert_eq!(out, data);
}

/// Control bytes of every chunk in an LZMA2 stream.
fn chunk_controls(stream: &[u8]) -> Vec<u8> {
    let mut controls = Vec::new();
    let mut pos = 0;
    loop {
        let control = stream[pos];
        if control == 0x00 {
            break;
        }
        controls.push(control);
        if control < 0x80 {
            let size = u16::from_be_bytes([stream[pos + 1], stream[pos + 2]]) as usize + 1;
            pos += 3 + size;
        } else {
            let compressed =
                u16::from_be_bytes([stream[pos + 3], stream[pos + 4]]) as usize + 1;
            let header = if control >= 0xC0 { 6 } else { 5 };
            pos += header + compressed;
        }
    }
    controls
}
