//! Range coder for LZMA.
//!
//! The range coder is a binary arithmetic coder working on a 32-bit `range`
//! register. Probabilities are 11-bit adaptive bit models owned by the
//! caller; this module only performs the interval arithmetic, the carry
//! propagation on the encoder side, and the model update rule (move
//! constant 5).

use oxz_core::error::{OxzError, Result};
use oxz_core::io::ByteReader;
use std::io::Read;

/// Number of bits in the probability model.
pub const PROB_BITS: u32 = 11;

/// Initial probability (one half).
pub const PROB_INIT: u16 = 1 << (PROB_BITS - 1);

/// Exclusive upper bound of a probability.
pub const PROB_MAX: u16 = 1 << PROB_BITS;

/// Shift used by the adaptation rule.
pub const MOVE_BITS: u32 = 5;

/// Normalization threshold.
const TOP_VALUE: u32 = 1 << 24;

/// Range decoder for LZMA decompression.
///
/// Initialization reads one byte that must be zero followed by four
/// big-endian code bytes. A finished stream leaves `code == 0`; anything
/// else means the input did not come from a matching encoder.
#[derive(Debug)]
pub struct RangeDecoder<R> {
    reader: R,
    range: u32,
    code: u32,
}

impl<R: Read> RangeDecoder<R> {
    /// Create a new range decoder, consuming the 5 initialization bytes.
    pub fn new(mut reader: R) -> Result<Self> {
        let first = reader.read_u8()?;
        if first != 0x00 {
            return Err(OxzError::invalid_header(
                "range coder stream must start with a zero byte",
            ));
        }
        let code = reader.read_u32_be()?;

        Ok(Self {
            reader,
            range: 0xFFFF_FFFF,
            code,
        })
    }

    /// Refill 8 bits when the range has shrunk below 2^24.
    fn normalize(&mut self) -> Result<()> {
        if self.range < TOP_VALUE {
            let byte = self.reader.read_u8()?;
            self.range <<= 8;
            self.code = (self.code << 8) | byte as u32;
        }
        Ok(())
    }

    /// Decode one bit under an adaptive probability.
    pub fn decode_bit(&mut self, prob: &mut u16) -> Result<u32> {
        self.normalize()?;

        let bound = (self.range >> PROB_BITS) * (*prob as u32);

        if self.code < bound {
            self.range = bound;
            *prob += (PROB_MAX - *prob) >> MOVE_BITS;
            Ok(0)
        } else {
            self.range -= bound;
            self.code -= bound;
            *prob -= *prob >> MOVE_BITS;
            Ok(1)
        }
    }

    /// Decode `count` bits at fixed probability, MSB first.
    pub fn decode_direct_bits(&mut self, count: u32) -> Result<u32> {
        let mut result = 0u32;
        for _ in 0..count {
            self.normalize()?;
            self.range >>= 1;
            // Borrow trick: t is 1 when code < range (bit 0), 0 otherwise.
            let t = self.code.wrapping_sub(self.range) >> 31;
            self.code -= self.range & t.wrapping_sub(1);
            result = (result << 1) | 1u32.wrapping_sub(t);
        }
        Ok(result)
    }

    /// Decode a bit tree; the symbol width is implied by the probs length.
    pub fn decode_bit_tree(&mut self, probs: &mut [u16]) -> Result<u32> {
        let mut symbol = 1usize;
        loop {
            let bit = self.decode_bit(&mut probs[symbol])?;
            symbol = (symbol << 1) | bit as usize;
            if symbol >= probs.len() {
                break;
            }
        }
        Ok((symbol - probs.len()) as u32)
    }

    /// Decode a reverse bit tree (LSB first result).
    pub fn decode_reverse_bit_tree(&mut self, probs: &mut [u16]) -> Result<u32> {
        let mut symbol = 1usize;
        let mut result = 0u32;
        let mut shift = 0;
        loop {
            let bit = self.decode_bit(&mut probs[symbol])?;
            symbol = (symbol << 1) | bit as usize;
            result |= bit << shift;
            shift += 1;
            if symbol >= probs.len() {
                break;
            }
        }
        Ok(result)
    }

    /// True once the decoder has consumed the stream cleanly.
    pub fn is_finished(&self) -> bool {
        self.code == 0
    }

    /// Unwrap, returning the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Range encoder for LZMA compression.
///
/// Output accumulates in an internal buffer. `low` is a 33-bit-plus carry
/// accumulator; `cache` holds the last byte that cannot be committed until
/// we know whether a carry reaches it, and `cache_size` counts it plus any
/// run of suspended 0xFF bytes.
#[derive(Debug)]
pub struct RangeEncoder {
    buffer: Vec<u8>,
    range: u32,
    low: u64,
    cache: u8,
    cache_size: u64,
}

impl RangeEncoder {
    /// Create a new range encoder.
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            range: 0xFFFF_FFFF,
            low: 0,
            cache: 0,
            cache_size: 1,
        }
    }

    /// Commit one byte of `low`, propagating a pending carry through the
    /// cache and any suspended 0xFF run.
    fn shift_low(&mut self) {
        if self.low < 0xFF00_0000 || self.low > 0xFFFF_FFFF {
            let carry = (self.low >> 32) as u8;
            let mut pending = self.cache;

            loop {
                self.buffer.push(pending.wrapping_add(carry));
                pending = 0xFF;
                self.cache_size -= 1;
                if self.cache_size == 0 {
                    break;
                }
            }

            self.cache = (self.low >> 24) as u8;
        }

        self.cache_size += 1;
        self.low = (self.low << 8) & 0xFFFF_FFFF;
    }

    fn normalize(&mut self) {
        if self.range < TOP_VALUE {
            self.range <<= 8;
            self.shift_low();
        }
    }

    /// Encode one bit under an adaptive probability.
    pub fn encode_bit(&mut self, prob: &mut u16, bit: u32) {
        let bound = (self.range >> PROB_BITS) * (*prob as u32);

        if bit == 0 {
            self.range = bound;
            *prob += (PROB_MAX - *prob) >> MOVE_BITS;
        } else {
            self.low += bound as u64;
            self.range -= bound;
            *prob -= *prob >> MOVE_BITS;
        }

        self.normalize();
    }

    /// Encode `count` bits at fixed probability, MSB first.
    pub fn encode_direct_bits(&mut self, value: u32, count: u32) {
        for i in (0..count).rev() {
            self.range >>= 1;
            if (value >> i) & 1 != 0 {
                self.low += self.range as u64;
            }
            self.normalize();
        }
    }

    /// Encode a bit tree symbol; width implied by the probs length.
    pub fn encode_bit_tree(&mut self, probs: &mut [u16], symbol: u32) {
        let num_bits = probs.len().trailing_zeros();
        let mut m = 1usize;
        for i in (0..num_bits).rev() {
            let bit = (symbol >> i) & 1;
            self.encode_bit(&mut probs[m], bit);
            m = (m << 1) | bit as usize;
        }
    }

    /// Encode a reverse bit tree symbol (LSB first).
    pub fn encode_reverse_bit_tree(&mut self, probs: &mut [u16], symbol: u32) {
        let num_bits = probs.len().trailing_zeros();
        let mut m = 1usize;
        for i in 0..num_bits {
            let bit = (symbol >> i) & 1;
            self.encode_bit(&mut probs[m], bit);
            m = (m << 1) | bit as usize;
        }
    }

    /// Number of bytes committed so far (excludes the unflushed cache).
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Flush the remaining state and return the encoded bytes.
    ///
    /// The decoder's 5 initialization bytes come out of this flush, so every
    /// bit ever encoded is recoverable from the returned buffer.
    pub fn finish(mut self) -> Vec<u8> {
        for _ in 0..5 {
            self.shift_low();
        }
        self.buffer
    }
}

impl Default for RangeEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_prob_constants() {
        assert_eq!(PROB_INIT, 1024);
        assert_eq!(PROB_MAX, 2048);
    }

    #[test]
    fn test_rejects_nonzero_first_byte() {
        let data = [0x01u8, 0, 0, 0, 0];
        assert!(RangeDecoder::new(Cursor::new(&data[..])).is_err());
    }

    #[test]
    fn test_bit_roundtrip_shared_model() {
        // A fixed pseudo-random bit pattern over a handful of models, decoded
        // with the same model access sequence.
        let bits: Vec<u32> = (0u32..2000)
            .map(|i| (i.wrapping_mul(2654435761) >> 31) & 1)
            .collect();
        let mut enc_probs = [PROB_INIT; 8];
        let mut encoder = RangeEncoder::new();
        for (i, &bit) in bits.iter().enumerate() {
            encoder.encode_bit(&mut enc_probs[i % 8], bit);
        }
        let encoded = encoder.finish();

        let mut dec_probs = [PROB_INIT; 8];
        let mut decoder = RangeDecoder::new(Cursor::new(&encoded[..])).unwrap();
        for (i, &bit) in bits.iter().enumerate() {
            assert_eq!(decoder.decode_bit(&mut dec_probs[i % 8]).unwrap(), bit);
        }
        assert!(decoder.is_finished(), "code must return to zero");
        assert_eq!(enc_probs, dec_probs);
    }

    #[test]
    fn test_probability_stays_in_range() {
        let mut prob = PROB_INIT;
        let mut encoder = RangeEncoder::new();
        // Hammer one model with the same bit to drive it to the extreme.
        for _ in 0..10_000 {
            encoder.encode_bit(&mut prob, 1);
            assert!(prob >= 1 && prob < PROB_MAX, "prob escaped range: {prob}");
        }
        let mut prob = PROB_INIT;
        for _ in 0..10_000 {
            encoder.encode_bit(&mut prob, 0);
            assert!(prob >= 1 && prob < PROB_MAX, "prob escaped range: {prob}");
        }
    }

    #[test]
    fn test_direct_bits_roundtrip() {
        let values = [(0u32, 1u32), (1, 1), (0x15, 5), (0x2AAA_AAAA, 30), (0, 30)];

        let mut encoder = RangeEncoder::new();
        for &(value, count) in &values {
            encoder.encode_direct_bits(value, count);
        }
        let encoded = encoder.finish();

        let mut decoder = RangeDecoder::new(Cursor::new(&encoded[..])).unwrap();
        for &(value, count) in &values {
            assert_eq!(decoder.decode_direct_bits(count).unwrap(), value);
        }
        assert!(decoder.is_finished());
    }

    #[test]
    fn test_bit_tree_roundtrip() {
        let symbols = [0u32, 7, 3, 5, 1, 6, 2, 4, 7, 0];

        let mut enc_tree = [PROB_INIT; 8];
        let mut encoder = RangeEncoder::new();
        for &sym in &symbols {
            encoder.encode_bit_tree(&mut enc_tree, sym);
        }
        let encoded = encoder.finish();

        let mut dec_tree = [PROB_INIT; 8];
        let mut decoder = RangeDecoder::new(Cursor::new(&encoded[..])).unwrap();
        for &sym in &symbols {
            assert_eq!(decoder.decode_bit_tree(&mut dec_tree).unwrap(), sym);
        }
    }

    #[test]
    fn test_reverse_bit_tree_roundtrip() {
        let symbols = [0u32, 15, 8, 1, 12, 3, 9];

        let mut enc_tree = [PROB_INIT; 16];
        let mut encoder = RangeEncoder::new();
        for &sym in &symbols {
            encoder.encode_reverse_bit_tree(&mut enc_tree, sym);
        }
        let encoded = encoder.finish();

        let mut dec_tree = [PROB_INIT; 16];
        let mut decoder = RangeDecoder::new(Cursor::new(&encoded[..])).unwrap();
        for &sym in &symbols {
            assert_eq!(decoder.decode_reverse_bit_tree(&mut dec_tree).unwrap(), sym);
        }
    }

    #[test]
    fn test_carry_propagation() {
        // Long runs of 1-bits at skewed probabilities exercise the 0xFF
        // cache run in shift_low.
        let mut probs = [PROB_INIT; 4];
        let mut encoder = RangeEncoder::new();
        for i in 0..5000u32 {
            encoder.encode_bit(&mut probs[(i % 4) as usize], (i % 5 == 0) as u32);
        }
        let encoded = encoder.finish();

        let mut probs = [PROB_INIT; 4];
        let mut decoder = RangeDecoder::new(Cursor::new(&encoded[..])).unwrap();
        for i in 0..5000u32 {
            assert_eq!(
                decoder.decode_bit(&mut probs[(i % 4) as usize]).unwrap(),
                (i % 5 == 0) as u32
            );
        }
        assert!(decoder.is_finished());
    }

    #[test]
    fn test_truncated_stream_is_typed_eof() {
        let mut probs = [PROB_INIT; 1];
        let mut encoder = RangeEncoder::new();
        for _ in 0..1000 {
            encoder.encode_bit(&mut probs[0], 1);
        }
        let encoded = encoder.finish();

        let truncated = &encoded[..encoded.len() / 2];
        let mut probs = [PROB_INIT; 1];
        let mut decoder = RangeDecoder::new(Cursor::new(truncated)).unwrap();
        let mut saw_eof = false;
        for _ in 0..1000 {
            match decoder.decode_bit(&mut probs[0]) {
                Ok(_) => {}
                Err(OxzError::UnexpectedEof { .. }) => {
                    saw_eof = true;
                    break;
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert!(saw_eof);
    }
}
