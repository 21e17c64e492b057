//! LZMA decompression.
//!
//! [`LzmaDecoder`] holds the probability model, the state machine value, and
//! the four rep distances; it decodes symbols into an [`LzWindow`] from a
//! [`RangeDecoder`]. The window and range decoder are passed in by the
//! caller so the LZMA2 framer can preserve the dictionary and the model
//! across chunks while recreating the range decoder per chunk.
//!
//! The module also provides the `.lzma` (LZMA-alone) envelope: a 13-byte
//! header (property byte, u32 dictionary size, u64 uncompressed size where
//! all-ones means "unknown, end marker terminated") followed by one raw
//! LZMA stream.

use crate::model::{
    ALIGN_BITS, DIST_MODEL_END, DIST_MODEL_START, EOPM_DISTANCE, LengthCoder, LzmaModel,
    LzmaProps, MATCH_LEN_MIN, State, dist_slot_base, dist_slot_footer_bits, len_to_dist_state,
};
use crate::range_coder::RangeDecoder;
use crate::window::LzWindow;
use crate::DEFAULT_MEMLIMIT;
use oxz_core::error::{OxzError, Result};
use oxz_core::io::ByteReader;
use std::io::Read;

/// Decode a length symbol (already biased by the minimum match length).
fn decode_length<R: Read>(
    rc: &mut RangeDecoder<R>,
    coder: &mut LengthCoder,
    pos_state: usize,
) -> Result<u32> {
    let base = MATCH_LEN_MIN as u32;
    if rc.decode_bit(&mut coder.choice)? == 0 {
        Ok(base + rc.decode_bit_tree(&mut coder.low[pos_state])?)
    } else if rc.decode_bit(&mut coder.choice2)? == 0 {
        Ok(base + 8 + rc.decode_bit_tree(&mut coder.mid[pos_state])?)
    } else {
        Ok(base + 16 + rc.decode_bit_tree(&mut coder.high)?)
    }
}

/// LZMA symbol decoder.
#[derive(Debug)]
pub struct LzmaDecoder {
    model: LzmaModel,
    state: State,
    reps: [u32; 4],
}

impl LzmaDecoder {
    /// Create a decoder for the given parameters.
    pub fn new(props: LzmaProps) -> Self {
        Self {
            model: LzmaModel::new(props),
            state: State::new(),
            reps: [0; 4],
        }
    }

    /// Reset state, rep distances, and every probability table (the LZMA2
    /// "state reset").
    pub fn reset(&mut self) {
        self.model.reset();
        self.state = State::new();
        self.reps = [0; 4];
    }

    /// Replace the parameters and reset (the LZMA2 "props reset").
    pub fn reset_with_props(&mut self, props: LzmaProps) {
        self.model = LzmaModel::new(props);
        self.state = State::new();
        self.reps = [0; 4];
    }

    /// Decode symbols until the window's limit is reached or, when
    /// `allow_eopm` is set, the end-of-payload marker arrives. Returns true
    /// when the marker terminated the stream.
    pub fn decode<R: Read>(
        &mut self,
        window: &mut LzWindow,
        rc: &mut RangeDecoder<R>,
        allow_eopm: bool,
    ) -> Result<bool> {
        window.resume_pending()?;

        while window.has_space() {
            let pos_state = self.model.props.pos_state(window_pos(window));

            if rc
                .decode_bit(&mut self.model.is_match[self.state.value()][pos_state])?
                == 0
            {
                self.decode_literal(window, rc)?;
                continue;
            }

            let len;
            if rc.decode_bit(&mut self.model.is_rep[self.state.value()])? == 0 {
                // New match: rotate reps, then length and distance.
                self.reps[3] = self.reps[2];
                self.reps[2] = self.reps[1];
                self.reps[1] = self.reps[0];

                len = decode_length(rc, &mut self.model.match_len, pos_state)?;
                self.reps[0] = self.decode_distance(rc, len)?;

                if self.reps[0] == EOPM_DISTANCE {
                    if !allow_eopm {
                        return Err(OxzError::corrupted(
                            window.available() as u64,
                            "end-of-payload marker where a sized stream was promised",
                        ));
                    }
                    return Ok(true);
                }

                self.state.update_match();
            } else {
                if rc.decode_bit(&mut self.model.is_rep_g0[self.state.value()])? == 0 {
                    if rc
                        .decode_bit(&mut self.model.is_rep0_long[self.state.value()][pos_state])?
                        == 0
                    {
                        // Short rep: a single byte at rep0.
                        if self.reps[0] as usize >= window.available() {
                            return Err(OxzError::corrupted(
                                window.available() as u64,
                                "short rep distance exceeds dictionary",
                            ));
                        }
                        let byte = window.peek(self.reps[0] as usize);
                        window.put_byte(byte);
                        self.state.update_short_rep();
                        continue;
                    }
                } else if rc.decode_bit(&mut self.model.is_rep_g1[self.state.value()])? == 0 {
                    let d = self.reps[1];
                    self.reps[1] = self.reps[0];
                    self.reps[0] = d;
                } else if rc.decode_bit(&mut self.model.is_rep_g2[self.state.value()])? == 0 {
                    let d = self.reps[2];
                    self.reps[2] = self.reps[1];
                    self.reps[1] = self.reps[0];
                    self.reps[0] = d;
                } else {
                    let d = self.reps[3];
                    self.reps[3] = self.reps[2];
                    self.reps[2] = self.reps[1];
                    self.reps[1] = self.reps[0];
                    self.reps[0] = d;
                }

                len = decode_length(rc, &mut self.model.rep_len, pos_state)?;
                self.state.update_rep();
            }

            window.copy_match(self.reps[0] as usize, len as usize)?;
        }

        Ok(false)
    }

    fn decode_literal<R: Read>(
        &mut self,
        window: &mut LzWindow,
        rc: &mut RangeDecoder<R>,
    ) -> Result<()> {
        let prev_byte = window.peek(0);
        let ctx = self
            .model
            .literal
            .context(window_pos(window), prev_byte);
        let probs = &mut self.model.literal.probs[ctx];

        let mut symbol = 1usize;
        if self.state.is_literal() {
            while symbol < 0x100 {
                let bit = rc.decode_bit(&mut probs[symbol])?;
                symbol = (symbol << 1) | bit as usize;
            }
        } else {
            // Matched literal: fold in the byte at rep0 until the decoded
            // bits diverge from it.
            let mut match_byte = window.peek_or_zero(self.reps[0] as usize) as usize;
            loop {
                let match_bit = (match_byte >> 7) & 1;
                match_byte = (match_byte << 1) & 0xFF;

                let bit =
                    rc.decode_bit(&mut probs[0x100 + (match_bit << 8) + symbol])? as usize;
                symbol = (symbol << 1) | bit;

                if symbol >= 0x100 {
                    break;
                }
                if bit != match_bit {
                    while symbol < 0x100 {
                        let bit = rc.decode_bit(&mut probs[symbol])?;
                        symbol = (symbol << 1) | bit as usize;
                    }
                    break;
                }
            }
        }

        window.put_byte((symbol - 0x100) as u8);
        self.state.update_literal();
        Ok(())
    }

    fn decode_distance<R: Read>(&mut self, rc: &mut RangeDecoder<R>, len: u32) -> Result<u32> {
        let dist_state = len_to_dist_state(len);
        let slot = rc.decode_bit_tree(&mut self.model.distance.slot[dist_state])?;

        if slot < DIST_MODEL_START as u32 {
            return Ok(slot);
        }

        let footer_bits = dist_slot_footer_bits(slot);
        let mut dist = dist_slot_base(slot);

        if (slot as usize) < DIST_MODEL_END {
            dist += rc.decode_reverse_bit_tree(
                &mut self.model.distance.special[slot as usize - DIST_MODEL_START],
            )?;
        } else {
            dist += rc.decode_direct_bits(footer_bits - ALIGN_BITS)? << ALIGN_BITS;
            dist += rc.decode_reverse_bit_tree(&mut self.model.distance.align)?;
        }

        Ok(dist)
    }
}

fn window_pos(window: &LzWindow) -> u64 {
    window.pos() as u64
}

/// Decompress a raw LZMA stream (no envelope).
///
/// When `uncompressed_size` is known the stream must deliver exactly that
/// many bytes without an end marker; when unknown, the end marker terminates
/// it and the range coder must finish clean.
pub fn decompress_raw<R: Read>(
    reader: R,
    props: LzmaProps,
    dict_size: u32,
    uncompressed_size: Option<u64>,
) -> Result<Vec<u8>> {
    let mut rc = RangeDecoder::new(reader)?;
    let mut window = LzWindow::new(dict_size as usize);
    let mut decoder = LzmaDecoder::new(props);
    let mut out = Vec::new();

    loop {
        if let Some(size) = uncompressed_size {
            if out.len() as u64 >= size {
                break;
            }
        }

        let room = window_room(&window);
        let budget = match uncompressed_size {
            Some(size) => room.min((size - out.len() as u64) as usize),
            None => room,
        };
        window.set_limit(budget);

        let eopm = decoder.decode(&mut window, &mut rc, uncompressed_size.is_none())?;
        window.flush_to(&mut out);

        if eopm {
            if !rc.is_finished() {
                return Err(OxzError::corrupted(
                    out.len() as u64,
                    "range coder not finished after end marker",
                ));
            }
            break;
        }
    }

    if window.has_pending() {
        return Err(OxzError::corrupted(
            out.len() as u64,
            "match extends past the declared uncompressed size",
        ));
    }

    Ok(out)
}

fn window_room(window: &LzWindow) -> usize {
    // Fill to the end of the ring; flush_to wraps pos back to zero.
    window.capacity() - window.pos()
}

/// Decompress a `.lzma` (LZMA-alone) stream, header included.
pub fn decompress<R: Read>(mut reader: R) -> Result<Vec<u8>> {
    decompress_with_memlimit(&mut reader, DEFAULT_MEMLIMIT)
}

/// Decompress a `.lzma` stream with an explicit dictionary ceiling.
pub fn decompress_with_memlimit<R: Read>(mut reader: R, memlimit: u64) -> Result<Vec<u8>> {
    let props = LzmaProps::from_byte(reader.read_u8()?)?;
    let dict_size = reader.read_u32_le()?;
    let uncompressed_size = reader.read_u64_le()?;

    if dict_size as u64 > memlimit {
        return Err(OxzError::dict_too_large(dict_size as u64, memlimit));
    }

    let size = if uncompressed_size == u64::MAX {
        None
    } else {
        Some(uncompressed_size)
    };

    decompress_raw(reader, props, dict_size, size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alone_header_too_large_dict() {
        let mut header = vec![0x5D];
        header.extend_from_slice(&u32::MAX.to_le_bytes());
        header.extend_from_slice(&u64::MAX.to_le_bytes());
        let err = decompress(&header[..]).unwrap_err();
        assert!(matches!(err, OxzError::DictionaryTooLarge { .. }));
    }

    #[test]
    fn test_alone_header_bad_props() {
        let mut header = vec![0xFF];
        header.extend_from_slice(&4096u32.to_le_bytes());
        header.extend_from_slice(&u64::MAX.to_le_bytes());
        assert!(decompress(&header[..]).is_err());
    }

    #[test]
    fn test_alone_truncated_header() {
        let header = [0x5Du8, 0x00, 0x00];
        assert!(matches!(
            decompress(&header[..]),
            Err(OxzError::UnexpectedEof { .. })
        ));
    }
}
