//! LZMA2 chunk framing.
//!
//! LZMA2 wraps raw LZMA in a chunked container: each chunk is either stored
//! bytes or an LZMA-coded payload, and its control byte says which of the
//! dictionary, the coder state, and the properties survive from the previous
//! chunk. The decoder here is an explicit state machine over parsed
//! [`ChunkHeader`] values; which resources reset is decided entirely by the
//! control byte, never by call order.
//!
//! ## Control bytes
//!
//! | byte        | meaning                                    |
//! |-------------|--------------------------------------------|
//! | 0x00        | end of stream                              |
//! | 0x01        | uncompressed chunk, dictionary reset       |
//! | 0x02        | uncompressed chunk, no reset               |
//! | 0x03..0x7F  | invalid                                    |
//! | 0x80..0x9F  | LZMA chunk, no reset                       |
//! | 0xA0..0xBF  | LZMA chunk, state reset                    |
//! | 0xC0..0xDF  | LZMA chunk, state reset + new properties   |
//! | 0xE0..0xFF  | LZMA chunk, dictionary + state + properties|
//!
//! Only the last row (and 0x01) touches the dictionary; everything else
//! preserves it, which is what lets a chunk reference bytes produced by its
//! predecessors.

use crate::decoder::LzmaDecoder;
use crate::encoder::LzmaEncoder;
use crate::model::LzmaProps;
use crate::range_coder::{RangeDecoder, RangeEncoder};
use crate::window::LzWindow;
use crate::LzmaParams;
use oxz_core::error::{OxzError, Result};
use oxz_core::io::ByteReader;
use std::io::{Cursor, Read};

/// Largest compressed payload a chunk can carry.
pub const CHUNK_COMPRESSED_MAX: usize = 1 << 16;

/// Largest uncompressed size a chunk header can express (21 bits).
pub const CHUNK_UNCOMPRESSED_MAX: usize = 1 << 21;

/// Input consumed per chunk by the encoder. Kept well under the stored
/// chunk maximum so an incompressible chunk always fits a stored fallback.
const ENCODER_CHUNK_SIZE: usize = 1 << 15;

/// Reset level carried by a compressed chunk's control byte (bits 6-5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Reset {
    /// Continue with everything preserved.
    None,
    /// Reset coder state and rep distances.
    State,
    /// Reset state and read a new property byte.
    StateProps,
    /// Reset the dictionary as well.
    DictStateProps,
}

/// One parsed LZMA2 chunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkHeader {
    /// Control byte 0x00: stream end.
    End,
    /// Stored bytes, optionally after a dictionary reset.
    Uncompressed {
        /// True for control 0x01.
        reset_dict: bool,
        /// Payload length (1..=65536).
        size: usize,
    },
    /// LZMA-coded payload.
    Compressed {
        /// Which coder resources reset before this chunk.
        reset: Reset,
        /// Exact number of bytes the chunk must produce (1..=2 MiB).
        uncompressed_size: usize,
        /// Exact number of payload bytes (1..=64 KiB).
        compressed_size: usize,
        /// New properties, present iff `reset >= StateProps`.
        props: Option<LzmaProps>,
    },
}

impl ChunkHeader {
    /// Parse the next chunk header. `offset` is only used to position error
    /// messages.
    pub fn parse<R: Read>(reader: &mut R, offset: u64) -> Result<Self> {
        let control = reader.read_u8()?;

        match control {
            0x00 => Ok(ChunkHeader::End),
            0x01 | 0x02 => {
                let size = reader.read_u16_be()? as usize + 1;
                Ok(ChunkHeader::Uncompressed {
                    reset_dict: control == 0x01,
                    size,
                })
            }
            0x03..=0x7F => Err(OxzError::corrupted(
                offset,
                format!("invalid LZMA2 control byte {control:#04x}"),
            )),
            _ => {
                let reset = match (control >> 5) & 0x3 {
                    0 => Reset::None,
                    1 => Reset::State,
                    2 => Reset::StateProps,
                    _ => Reset::DictStateProps,
                };
                let uncompressed_size =
                    (((control & 0x1F) as usize) << 16 | reader.read_u16_be()? as usize) + 1;
                let compressed_size = reader.read_u16_be()? as usize + 1;
                let props = if reset >= Reset::StateProps {
                    let props = LzmaProps::from_byte(reader.read_u8()?)?;
                    if props.lc + props.lp > 4 {
                        return Err(OxzError::corrupted(
                            offset,
                            format!("LZMA2 requires lc + lp <= 4, got {} + {}", props.lc, props.lp),
                        ));
                    }
                    Some(props)
                } else {
                    None
                };

                Ok(ChunkHeader::Compressed {
                    reset,
                    uncompressed_size,
                    compressed_size,
                    props,
                })
            }
        }
    }
}

/// LZMA2 stream decoder.
///
/// The window and the LZMA decoder persist across chunks; a fresh range
/// decoder is created for every compressed chunk from its first five payload
/// bytes.
#[derive(Debug)]
pub struct Lzma2Decoder {
    window: LzWindow,
    lzma: Option<LzmaDecoder>,
    need_dict_reset: bool,
    need_props: bool,
}

impl Lzma2Decoder {
    /// Create a decoder with the given dictionary size.
    pub fn new(dict_size: u32) -> Self {
        Self {
            window: LzWindow::new(dict_size as usize),
            lzma: None,
            need_dict_reset: true,
            need_props: true,
        }
    }

    /// Decode a complete LZMA2 stream (terminated by control byte 0x00).
    pub fn decode<R: Read>(&mut self, reader: &mut R) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.decode_into(reader, &mut out)?;
        Ok(out)
    }

    /// Decode a complete LZMA2 stream, appending output to `out`.
    pub fn decode_into<R: Read>(&mut self, reader: &mut R, out: &mut Vec<u8>) -> Result<()> {
        loop {
            let header = ChunkHeader::parse(reader, out.len() as u64)?;
            match header {
                ChunkHeader::End => return Ok(()),
                ChunkHeader::Uncompressed { reset_dict, size } => {
                    self.uncompressed_chunk(reader, out, reset_dict, size)?;
                }
                ChunkHeader::Compressed {
                    reset,
                    uncompressed_size,
                    compressed_size,
                    props,
                } => {
                    self.compressed_chunk(
                        reader,
                        out,
                        reset,
                        uncompressed_size,
                        compressed_size,
                        props,
                    )?;
                }
            }
        }
    }

    fn uncompressed_chunk<R: Read>(
        &mut self,
        reader: &mut R,
        out: &mut Vec<u8>,
        reset_dict: bool,
        size: usize,
    ) -> Result<()> {
        if reset_dict {
            self.window.reset();
            self.need_dict_reset = false;
        } else if self.need_dict_reset {
            return Err(OxzError::corrupted(
                out.len() as u64,
                "LZMA2 chunk before the initial dictionary reset",
            ));
        }

        let mut remaining = size;
        while remaining > 0 {
            let copied = self.window.copy_uncompressed(reader, remaining)?;
            self.window.flush_to(out);
            remaining -= copied;
        }
        Ok(())
    }

    fn compressed_chunk<R: Read>(
        &mut self,
        reader: &mut R,
        out: &mut Vec<u8>,
        reset: Reset,
        uncompressed_size: usize,
        compressed_size: usize,
        props: Option<LzmaProps>,
    ) -> Result<()> {
        match reset {
            Reset::DictStateProps => {
                self.window.reset();
                self.need_dict_reset = false;
            }
            _ if self.need_dict_reset => {
                return Err(OxzError::corrupted(
                    out.len() as u64,
                    "LZMA2 chunk before the initial dictionary reset",
                ));
            }
            _ => {}
        }

        match reset {
            Reset::StateProps | Reset::DictStateProps => {
                let props = props.expect("parser supplies props at this reset level");
                match self.lzma.as_mut() {
                    Some(lzma) => lzma.reset_with_props(props),
                    None => self.lzma = Some(LzmaDecoder::new(props)),
                }
                self.need_props = false;
            }
            Reset::State | Reset::None => {
                if self.need_props {
                    return Err(OxzError::corrupted(
                        out.len() as u64,
                        "LZMA2 chunk without established properties",
                    ));
                }
                if reset == Reset::State {
                    self.lzma
                        .as_mut()
                        .expect("properties established implies decoder exists")
                        .reset();
                }
            }
        }

        // The whole payload is pulled in up front: the chunk must consume
        // exactly these bytes, no more, no fewer.
        let payload = reader.read_vec(compressed_size)?;
        let mut cursor = Cursor::new(&payload[..]);
        let mut rc = RangeDecoder::new(&mut cursor)?;
        let lzma = self
            .lzma
            .as_mut()
            .expect("decoder exists after reset handling");

        let mut remaining = uncompressed_size;
        while remaining > 0 {
            let room = self.window.capacity() - self.window.pos();
            self.window.set_limit(remaining.min(room));
            lzma.decode(&mut self.window, &mut rc, false)?;
            let produced = self.window.flush_to(out);
            debug_assert!(produced > 0);
            remaining -= produced;
        }

        let clean = rc.is_finished() && !self.window.has_pending();
        drop(rc);
        if !clean || cursor.position() != payload.len() as u64 {
            return Err(OxzError::corrupted(
                out.len() as u64,
                "LZMA2 chunk did not consume its payload exactly",
            ));
        }
        Ok(())
    }
}

/// Decode an LZMA2 byte stream. Trailing bytes after the end marker are
/// rejected; a container that frames the stream itself should use
/// [`Lzma2Decoder::decode_into`] instead.
pub fn decode_lzma2(data: &[u8], dict_size: u32) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(data);
    let out = Lzma2Decoder::new(dict_size).decode(&mut cursor)?;
    if cursor.position() != data.len() as u64 {
        return Err(OxzError::corrupted(
            cursor.position(),
            "trailing bytes after the LZMA2 end marker",
        ));
    }
    Ok(out)
}

/// LZMA2 stream encoder.
///
/// The first chunk resets everything (control 0xE0); later chunks continue
/// with the model preserved (control 0x80). A chunk that LZMA fails to
/// shrink is stored raw instead, which costs a state reset on the next
/// compressed chunk.
#[derive(Debug)]
pub struct Lzma2Encoder {
    params: LzmaParams,
}

impl Lzma2Encoder {
    /// Create an encoder with the given parameters.
    pub fn new(params: LzmaParams) -> Self {
        Self { params }
    }

    /// Encode `data` as a complete LZMA2 stream, end marker included.
    pub fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.params.validate()?;
        let mut out = Vec::new();

        if data.is_empty() {
            out.push(0x00);
            return Ok(out);
        }

        let mut encoder = LzmaEncoder::new(&self.params, data.len());
        let mut props_sent = false;
        let mut state_reset_needed = false;
        let mut dict_reset_done = false;

        let mut start = 0;
        while start < data.len() {
            let end = (start + ENCODER_CHUNK_SIZE).min(data.len());
            let chunk = &data[start..end];

            if state_reset_needed {
                encoder.reset_state();
            }

            let mut rc = RangeEncoder::new();
            encoder.encode_range(&mut rc, data, start, end)?;
            let payload = rc.finish();

            // The stored form only pays off once its header amortizes; tiny
            // chunks always go through LZMA.
            let store = chunk.len() > 64 && payload.len() >= chunk.len();

            if store {
                // Stored chunk wins; the attempted symbols never reach the
                // decoder, so the coder state must restart afterwards.
                out.push(if dict_reset_done { 0x02 } else { 0x01 });
                out.extend_from_slice(&((chunk.len() - 1) as u16).to_be_bytes());
                out.extend_from_slice(chunk);
                state_reset_needed = true;
            } else {
                let control = if !dict_reset_done {
                    0xE0
                } else if !props_sent {
                    0xC0
                } else if state_reset_needed {
                    0xA0
                } else {
                    0x80
                };
                let size_bits = chunk.len() - 1;
                out.push(control | ((size_bits >> 16) as u8));
                out.extend_from_slice(&((size_bits & 0xFFFF) as u16).to_be_bytes());
                out.extend_from_slice(&((payload.len() - 1) as u16).to_be_bytes());
                if control >= 0xC0 {
                    out.push(self.params.props().to_byte());
                    props_sent = true;
                }
                out.extend_from_slice(&payload);
                state_reset_needed = false;
            }

            dict_reset_done = true;
            start = end;
        }

        out.push(0x00);
        Ok(out)
    }
}

/// Encode data as an LZMA2 stream with the given parameters.
pub fn encode_lzma2(data: &[u8], params: &LzmaParams) -> Result<Vec<u8>> {
    Lzma2Encoder::new(*params).encode(data)
}

/// Dictionary size for an LZMA2 dictionary property byte.
///
/// `dict = (2 | (p & 1)) << (p / 2 + 11)` for p in 0..40; p = 40 is the
/// 4 GiB - 1 maximum.
pub fn dict_size_from_props(props: u8) -> Result<u32> {
    match props {
        40 => Ok(0xFFFF_FFFF),
        0..=39 => {
            let base = 2u32 | (props as u32 & 1);
            Ok(base << (props / 2 + 11))
        }
        _ => Err(OxzError::invalid_header(format!(
            "invalid LZMA2 dictionary property byte {props}"
        ))),
    }
}

/// Smallest dictionary property byte covering `dict_size`.
pub fn props_from_dict_size(dict_size: u32) -> u8 {
    for props in 0..=40u8 {
        if dict_size_from_props(props).expect("props in range") >= dict_size {
            return props;
        }
    }
    40
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(data: &[u8], params: &LzmaParams) {
        let encoded = encode_lzma2(data, params).unwrap();
        let decoded = decode_lzma2(&encoded, params.dict_size).unwrap();
        assert_eq!(decoded, data, "LZMA2 roundtrip mismatch");
    }

    #[test]
    fn test_empty_stream_is_end_marker() {
        let encoded = encode_lzma2(b"", &LzmaParams::default()).unwrap();
        assert_eq!(encoded, vec![0x00]);
        assert_eq!(decode_lzma2(&encoded, 1 << 16).unwrap(), b"");
    }

    #[test]
    fn test_roundtrip_small() {
        roundtrip(b"Hello, LZMA2!", &LzmaParams::default());
    }

    #[test]
    fn test_roundtrip_compressible() {
        let data = b"repetition repetition repetition ".repeat(64);
        roundtrip(&data, &LzmaParams::default());
    }

    #[test]
    fn test_roundtrip_multi_chunk() {
        // Spans several encoder chunks to exercise the 0x80 continuation.
        let data: Vec<u8> = b"0123456789abcdef"
            .iter()
            .copied()
            .cycle()
            .take(5 * ENCODER_CHUNK_SIZE + 17)
            .collect();
        roundtrip(&data, &LzmaParams::default());
    }

    #[test]
    fn test_roundtrip_incompressible() {
        // Pseudo-random bytes force the stored-chunk fallback.
        let data: Vec<u8> = (0u64..40_000)
            .map(|i| (i.wrapping_mul(0x9E3779B97F4A7C15) >> 56) as u8)
            .collect();
        roundtrip(&data, &LzmaParams::default());
    }

    #[test]
    fn test_roundtrip_stored_then_compressed() {
        // An incompressible head forces a stored chunk; the compressible
        // tail then has to open with a state reset and fresh properties.
        let mut data: Vec<u8> = (0u64..33_000)
            .map(|i| (i.wrapping_mul(0x2545F4914F6CDD1D) >> 55) as u8)
            .collect();
        data.extend(std::iter::repeat_n(b'=', 40_000));
        roundtrip(&data, &LzmaParams::default());
    }

    #[test]
    fn test_first_chunk_shape() {
        // Compressible input: property byte for an 8 MiB dictionary is 0x16
        // and the stream is one full-reset chunk plus the end marker.
        let params = LzmaParams {
            dict_size: 8 << 20,
            ..LzmaParams::default()
        };
        assert_eq!(props_from_dict_size(params.dict_size), 0x16);

        let encoded = encode_lzma2(b"Hello, LZMA2!", &params).unwrap();
        assert!(encoded[0] >= 0xE0, "first chunk must reset everything");
        assert_eq!(*encoded.last().unwrap(), 0x00);
    }

    #[test]
    fn test_dict_size_props_table() {
        assert_eq!(dict_size_from_props(0).unwrap(), 4096);
        assert_eq!(dict_size_from_props(1).unwrap(), 6144);
        assert_eq!(dict_size_from_props(2).unwrap(), 8192);
        assert_eq!(dict_size_from_props(3).unwrap(), 12288);
        assert_eq!(dict_size_from_props(22).unwrap(), 8 << 20);
        assert_eq!(dict_size_from_props(39).unwrap(), 3 << 30);
        assert_eq!(dict_size_from_props(40).unwrap(), 0xFFFF_FFFF);
        assert!(dict_size_from_props(41).is_err());
    }

    #[test]
    fn test_props_from_dict_size_covers() {
        for &size in &[4096u32, 4097, 1 << 16, (1 << 20) + 1, 1 << 26, u32::MAX] {
            let props = props_from_dict_size(size);
            assert!(dict_size_from_props(props).unwrap() >= size);
            if props > 0 {
                assert!(dict_size_from_props(props - 1).unwrap() < size);
            }
        }
    }

    #[test]
    fn test_invalid_control_bytes() {
        for control in [0x03u8, 0x10, 0x7F] {
            let stream = [control, 0, 0];
            let err = decode_lzma2(&stream, 1 << 16).unwrap_err();
            assert!(
                matches!(err, OxzError::CorruptedData { .. }),
                "control {control:#04x} must be CorruptedData, got {err:?}"
            );
        }
    }

    #[test]
    fn test_chunk_without_initial_reset() {
        // 0x02 (uncompressed, no reset) cannot open a stream.
        let stream = [0x02u8, 0x00, 0x00, b'x'];
        assert!(matches!(
            decode_lzma2(&stream, 1 << 16).unwrap_err(),
            OxzError::CorruptedData { .. }
        ));
    }

    #[test]
    fn test_compressed_chunk_without_props() {
        // 0x80 (no reset) as the first chunk: dictionary reset missing.
        let stream = [0x80u8, 0x00, 0x00, 0x00, 0x00];
        assert!(matches!(
            decode_lzma2(&stream, 1 << 16).unwrap_err(),
            OxzError::CorruptedData { .. }
        ));
    }

    #[test]
    fn test_reset_ordering() {
        assert!(Reset::None < Reset::State);
        assert!(Reset::State < Reset::StateProps);
        assert!(Reset::StateProps < Reset::DictStateProps);
    }
}
