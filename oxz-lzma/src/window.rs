//! LZ dictionary window.
//!
//! A ring buffer of up to `dict_size` bytes holding the most recent decoder
//! output. Matches copy from it, literals append to it, and decoded bytes
//! leave it only through [`LzWindow::flush_to`]. The window survives across
//! LZMA2 chunks unless a dictionary reset is requested, which is what lets
//! a chunk reference bytes produced by earlier chunks.
//!
//! Distances here are zero-based: distance 0 is the most recently written
//! byte. A match may overlap its own output (distance < length); bytes are
//! then produced left to right so later copies observe earlier ones.

use oxz_core::error::{OxzError, Result};
use oxz_core::io::ByteReader;
use std::io::Read;

/// Smallest dictionary the format allows.
pub const DICT_SIZE_MIN: usize = 4096;

/// Sliding dictionary window with a flush cursor and an output limit.
#[derive(Debug)]
pub struct LzWindow {
    buf: Vec<u8>,
    size: usize,
    /// Flush cursor: bytes in `start..pos` have not been handed out yet.
    start: usize,
    /// Write position.
    pos: usize,
    /// High-water mark of valid bytes; equals `size` once wrapped.
    full: usize,
    /// Decode limit for the current slice of output.
    limit: usize,
    /// Remainder of a match that ran into the limit.
    pending_len: usize,
    pending_dist: usize,
}

impl LzWindow {
    /// Create a window of `dict_size` bytes, clamped up to the format
    /// minimum of 4 KiB and rounded to a multiple of 16 so the ring
    /// position stays congruent to the uncompressed position for every
    /// valid `pb`/`lp`.
    pub fn new(dict_size: usize) -> Self {
        let size = (dict_size.max(DICT_SIZE_MIN) + 15) & !15;
        Self {
            buf: vec![0u8; size],
            size,
            start: 0,
            pos: 0,
            full: 0,
            limit: 0,
            pending_len: 0,
            pending_dist: 0,
        }
    }

    /// Forget all history (LZMA2 dictionary reset).
    pub fn reset(&mut self) {
        self.start = 0;
        self.pos = 0;
        self.full = 0;
        self.limit = 0;
        self.pending_len = 0;
        self.pending_dist = 0;
        self.buf[self.size - 1] = 0;
    }

    /// Allow up to `out_max` more bytes to be produced before the next flush.
    pub fn set_limit(&mut self, out_max: usize) {
        self.limit = (self.pos + out_max).min(self.size);
    }

    /// True while the current limit has room.
    pub fn has_space(&self) -> bool {
        self.pos < self.limit
    }

    /// True when a match was cut short by the limit and must be resumed.
    pub fn has_pending(&self) -> bool {
        self.pending_len > 0
    }

    /// Number of history bytes a match may reach back over.
    pub fn available(&self) -> usize {
        self.full
    }

    /// Ring capacity (the dictionary size).
    pub fn capacity(&self) -> usize {
        self.size
    }

    /// Current ring position. The dictionary size is kept a multiple of 16,
    /// so this is congruent to the uncompressed position modulo any valid
    /// `1 << pb` and serves as the position-state source.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Byte at `dist` back from the write position (0 = most recent).
    pub fn peek(&self, dist: usize) -> u8 {
        let offset = if dist >= self.pos {
            self.size + self.pos - dist - 1
        } else {
            self.pos - dist - 1
        };
        self.buf[offset]
    }

    /// Like [`LzWindow::peek`], but tolerates distances past the history
    /// (corrupt input probing a matched-literal context) by yielding zero.
    pub fn peek_or_zero(&self, dist: usize) -> u8 {
        if dist >= self.full { 0 } else { self.peek(dist) }
    }

    /// Append one literal byte.
    pub fn put_byte(&mut self, b: u8) {
        self.buf[self.pos] = b;
        self.pos += 1;
        if self.full < self.pos {
            self.full = self.pos;
        }
    }

    /// Copy a match of `len` bytes from `dist` back. A match that crosses
    /// the current limit is carried as pending and resumed after the next
    /// flush via [`LzWindow::resume_pending`].
    pub fn copy_match(&mut self, dist: usize, len: usize) -> Result<()> {
        if dist >= self.full {
            return Err(OxzError::corrupted(
                self.full as u64,
                format!("match distance {} exceeds dictionary ({})", dist + 1, self.full),
            ));
        }

        let mut left = (self.limit - self.pos).min(len);
        self.pending_len = len - left;
        self.pending_dist = dist;

        let back = if self.pos < dist + 1 {
            // Source wraps around the end of the ring. Only reachable once
            // the dictionary is full.
            debug_assert_eq!(self.full, self.size);
            let back = self.size + self.pos - dist - 1;

            let copy_size = (self.size - back).min(left);
            self.buf.copy_within(back..back + copy_size, self.pos);
            self.pos += copy_size;
            left -= copy_size;

            if left == 0 {
                return Ok(());
            }
            0
        } else {
            self.pos - dist - 1
        };

        debug_assert!(back < self.pos);
        debug_assert!(left > 0);

        if dist >= left {
            // No self-overlap: one straight copy.
            let (src, dst) = self.buf.split_at_mut(self.pos);
            dst[..left].copy_from_slice(&src[back..back + left]);
            self.pos += left;
        } else {
            // Self-overlapping match: copy in distance-sized steps so each
            // step reads bytes the previous step produced.
            let mut back = back;
            loop {
                let copy_size = left.min(self.pos - back);
                self.buf.copy_within(back..back + copy_size, self.pos);
                self.pos += copy_size;
                back += copy_size;
                left -= copy_size;
                if left == 0 {
                    break;
                }
            }
        }

        if self.full < self.pos {
            self.full = self.pos;
        }
        Ok(())
    }

    /// Resume a match interrupted by the limit.
    pub fn resume_pending(&mut self) -> Result<()> {
        if self.pending_len > 0 {
            let len = self.pending_len;
            let dist = self.pending_dist;
            self.pending_len = 0;
            self.copy_match(dist, len)?;
        }
        Ok(())
    }

    /// Read raw bytes straight into the window (LZMA2 uncompressed chunk).
    /// Copies at most up to the end of the ring; the caller loops with a
    /// flush in between.
    pub fn copy_uncompressed<R: Read>(&mut self, reader: &mut R, len: usize) -> Result<usize> {
        let copy_size = (self.size - self.pos).min(len);
        reader.read_exact_bytes(&mut self.buf[self.pos..self.pos + copy_size])?;
        self.pos += copy_size;
        if self.full < self.pos {
            self.full = self.pos;
        }
        Ok(copy_size)
    }

    /// Hand all not-yet-flushed bytes to the sink, in stream order. This is
    /// the only way bytes leave the window.
    pub fn flush_to(&mut self, out: &mut Vec<u8>) -> usize {
        let copy_size = self.pos - self.start;
        out.extend_from_slice(&self.buf[self.start..self.pos]);

        if self.pos == self.size {
            self.pos = 0;
        }
        self.start = self.pos;
        copy_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window_with(data: &[u8], dict_size: usize) -> LzWindow {
        let mut w = LzWindow::new(dict_size);
        w.set_limit(data.len());
        for &b in data {
            w.put_byte(b);
        }
        w
    }

    #[test]
    fn test_put_and_peek() {
        let w = window_with(b"abcdef", 4096);
        assert_eq!(w.peek(0), b'f');
        assert_eq!(w.peek(5), b'a');
        assert_eq!(w.available(), 6);
    }

    #[test]
    fn test_copy_match_no_overlap() {
        let mut w = window_with(b"abcdef", 4096);
        let mut out = Vec::new();
        w.flush_to(&mut out);

        w.set_limit(3);
        w.copy_match(5, 3).unwrap();
        out.clear();
        w.flush_to(&mut out);
        assert_eq!(out, b"abc");
    }

    #[test]
    fn test_copy_match_self_overlap() {
        // Distance 0, length 5: repeat the last byte five times.
        let mut w = window_with(b"xy", 4096);
        w.set_limit(5);
        w.copy_match(0, 5).unwrap();

        let mut out = Vec::new();
        w.flush_to(&mut out);
        assert_eq!(out, b"xyyyyyy");
    }

    #[test]
    fn test_copy_match_overlap_period() {
        // Distance 3 (period 4), length 12 starting from "abcd".
        let mut w = window_with(b"abcd", 4096);
        w.set_limit(12);
        w.copy_match(3, 12).unwrap();

        let mut out = Vec::new();
        w.flush_to(&mut out);
        assert_eq!(out, b"abcdabcdabcdabcd");
    }

    #[test]
    fn test_distance_past_history_fails() {
        let mut w = window_with(b"abc", 4096);
        w.set_limit(4);
        assert!(w.copy_match(3, 1).is_err());
        assert!(w.copy_match(2, 1).is_ok());
    }

    #[test]
    fn test_pending_match_across_limit() {
        let mut w = window_with(b"abcd", 4096);
        let mut out = Vec::new();
        w.flush_to(&mut out);

        // Ask for 10 bytes but only allow 6 before the flush.
        w.set_limit(6);
        w.copy_match(3, 10).unwrap();
        assert!(w.has_pending());

        out.clear();
        w.flush_to(&mut out);
        assert_eq!(out, b"abcdab");

        w.set_limit(4);
        w.resume_pending().unwrap();
        assert!(!w.has_pending());
        out.clear();
        w.flush_to(&mut out);
        assert_eq!(out, b"cdab");
    }

    #[test]
    fn test_wraparound_copy() {
        // Fill a minimal dictionary past its size so the ring wraps, then
        // copy across the wrap point.
        let mut w = LzWindow::new(DICT_SIZE_MIN);
        let mut out = Vec::new();

        let pattern: Vec<u8> = (0..=255u8).cycle().take(DICT_SIZE_MIN).collect();
        w.set_limit(pattern.len());
        for &b in &pattern {
            w.put_byte(b);
        }
        w.flush_to(&mut out);
        assert_eq!(w.available(), DICT_SIZE_MIN);

        // pos wrapped to 0; a short match now reads from the buffer tail.
        out.clear();
        w.set_limit(8);
        w.copy_match(7, 8).unwrap();
        w.flush_to(&mut out);
        assert_eq!(&out, &pattern[pattern.len() - 8..]);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut w = window_with(b"abc", 4096);
        w.reset();
        assert_eq!(w.available(), 0);
        w.set_limit(1);
        assert!(w.copy_match(0, 1).is_err());
    }
}
