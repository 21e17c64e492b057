//! LZMA compression.
//!
//! The encoder drives the same probability model as the decoder. A
//! hash-chain match finder proposes `(distance, length)` candidates, the
//! four rep distances are probed separately, and the cheapest symbol under
//! the current model prices (see [`crate::price`]) is emitted. Chain depth
//! and nice-length come from the level presets, so higher levels search
//! harder.

use crate::model::{
    ALIGN_BITS, DIST_MODEL_END, DIST_MODEL_START, EOPM_DISTANCE, LengthCoder, LzmaModel,
    MATCH_LEN_MAX, MATCH_LEN_MIN, State, dist_slot, dist_slot_footer_bits, len_to_dist_state,
};
use crate::price;
use crate::range_coder::RangeEncoder;
use crate::LzmaParams;
use oxz_core::error::Result;

const HASH_BITS: u32 = 16;
const HASH_SIZE: usize = 1 << HASH_BITS;
const NO_POS: u32 = u32::MAX;

/// Hash-chain match finder over the input buffer.
///
/// `head` maps a 3-byte hash to the most recent position, `prev` links each
/// position to the previous one with the same hash.
#[derive(Debug)]
struct MatchFinder {
    head: Vec<u32>,
    prev: Vec<u32>,
    depth: usize,
    nice_len: usize,
    dict_size: usize,
}

impl MatchFinder {
    fn new(data_len: usize, dict_size: usize, depth: usize, nice_len: usize) -> Self {
        Self {
            head: vec![NO_POS; HASH_SIZE],
            prev: vec![NO_POS; data_len],
            depth,
            nice_len,
            dict_size,
        }
    }

    fn hash(data: &[u8], pos: usize) -> usize {
        // FNV-1a over three bytes, folded to the table size.
        let mut h = 2166136261u32;
        h = (h ^ data[pos] as u32).wrapping_mul(16777619);
        h = (h ^ data[pos + 1] as u32).wrapping_mul(16777619);
        h = (h ^ data[pos + 2] as u32).wrapping_mul(16777619);
        (h as usize) & (HASH_SIZE - 1)
    }

    fn insert(&mut self, data: &[u8], pos: usize) {
        if pos + 3 > data.len() {
            return;
        }
        let h = Self::hash(data, pos);
        self.prev[pos] = self.head[h];
        self.head[h] = pos as u32;
    }

    /// Best `(distance - 1, length)` at `pos`, or None. Ties go to the
    /// shorter distance because the chain runs newest-first.
    fn best_match(&self, data: &[u8], pos: usize, max_len: usize) -> Option<(u32, u32)> {
        if self.depth == 0 || pos + MATCH_LEN_MIN > data.len() {
            return None;
        }

        let mut cursor = self.head[Self::hash(data, pos)];
        let mut best_len = MATCH_LEN_MIN - 1;
        let mut best_dist = 0u32;
        let mut steps = 0;

        while cursor != NO_POS && steps < self.depth {
            let candidate = cursor as usize;
            debug_assert!(candidate < pos);
            let dist = pos - candidate;
            if dist > self.dict_size {
                break;
            }

            if data[candidate + best_len] == data[pos + best_len] {
                let mut len = 0;
                while len < max_len && data[candidate + len] == data[pos + len] {
                    len += 1;
                }
                if len > best_len {
                    best_len = len;
                    best_dist = (dist - 1) as u32;
                    if len >= self.nice_len || len >= max_len {
                        break;
                    }
                }
            }

            cursor = self.prev[candidate];
            steps += 1;
        }

        if best_len >= MATCH_LEN_MIN {
            Some((best_dist, best_len as u32))
        } else {
            None
        }
    }
}

/// LZMA symbol encoder.
#[derive(Debug)]
pub struct LzmaEncoder {
    model: LzmaModel,
    state: State,
    reps: [u32; 4],
    finder: MatchFinder,
}

impl LzmaEncoder {
    /// Create an encoder for one input buffer.
    pub fn new(params: &LzmaParams, data_len: usize) -> Self {
        Self {
            model: LzmaModel::new(params.props()),
            state: State::new(),
            reps: [0; 4],
            finder: MatchFinder::new(
                data_len,
                params.dict_size as usize,
                params.depth as usize,
                (params.nice_len as usize).clamp(MATCH_LEN_MIN, MATCH_LEN_MAX),
            ),
        }
    }

    /// Reset state, reps, and probabilities (mirrors the decoder's LZMA2
    /// state reset). The match finder keeps its history: distances stay
    /// valid because only coder state is being reset, not the dictionary.
    pub fn reset_state(&mut self) {
        self.model.reset();
        self.state = State::new();
        self.reps = [0; 4];
    }

    /// Encode `data[start..end]` as one run of symbols.
    pub fn encode_range(
        &mut self,
        rc: &mut RangeEncoder,
        data: &[u8],
        start: usize,
        end: usize,
    ) -> Result<()> {
        let mut pos = start;

        while pos < end {
            let pos_state = self.model.props.pos_state(pos as u64);
            let max_len = (end - pos).min(MATCH_LEN_MAX);

            let symbol = self.choose_symbol(data, pos, max_len);

            match symbol {
                Choice::Literal => {
                    self.encode_literal(rc, data, pos, pos_state);
                    self.finder.insert(data, pos);
                    pos += 1;
                }
                Choice::ShortRep => {
                    self.encode_short_rep(rc, pos_state);
                    self.finder.insert(data, pos);
                    pos += 1;
                }
                Choice::Rep { index, len } => {
                    self.encode_rep(rc, index, len, pos_state);
                    for i in 0..len as usize {
                        self.finder.insert(data, pos + i);
                    }
                    pos += len as usize;
                }
                Choice::Match { dist, len } => {
                    self.encode_match(rc, dist, len, pos_state);
                    for i in 0..len as usize {
                        self.finder.insert(data, pos + i);
                    }
                    pos += len as usize;
                }
            }
        }

        Ok(())
    }

    /// Emit the end-of-payload marker (a match with the reserved distance).
    pub fn encode_eopm(&mut self, rc: &mut RangeEncoder, pos: usize) {
        let pos_state = self.model.props.pos_state(pos as u64);
        let state_idx = self.state.value();
        rc.encode_bit(&mut self.model.is_match[state_idx][pos_state], 1);
        rc.encode_bit(&mut self.model.is_rep[state_idx], 0);
        encode_length(rc, &mut self.model.match_len, MATCH_LEN_MIN as u32, pos_state);
        encode_distance(rc, &mut self.model.distance, EOPM_DISTANCE, MATCH_LEN_MIN as u32);
        self.state.update_match();
    }

    fn choose_symbol(&self, data: &[u8], pos: usize, max_len: usize) -> Choice {
        let pos_state = self.model.props.pos_state(pos as u64);
        let state_idx = self.state.value();

        let match_bit0 = price::bit_price(self.model.is_match[state_idx][pos_state], 0);
        let match_bit1 = price::bit_price(self.model.is_match[state_idx][pos_state], 1);
        let rep_bit0 = price::bit_price(self.model.is_rep[state_idx], 0);
        let rep_bit1 = price::bit_price(self.model.is_rep[state_idx], 1);

        let literal_price = match_bit0 + self.literal_price(data, pos);
        let mut best = Scored::new(Choice::Literal, literal_price, 1);

        // Short rep: a single byte repeated from rep0.
        if self.rep_len(data, pos, 0, max_len.min(1)) == 1 {
            let price = match_bit1
                + rep_bit1
                + price::bit_price(self.model.is_rep_g0[state_idx], 0)
                + price::bit_price(self.model.is_rep0_long[state_idx][pos_state], 0);
            best.consider(Choice::ShortRep, price, 1);
        }

        if max_len >= MATCH_LEN_MIN {
            // Rep matches.
            for index in 0..4usize {
                let len = self.rep_len(data, pos, index, max_len);
                if len >= MATCH_LEN_MIN as u32 {
                    let price = match_bit1
                        + rep_bit1
                        + self.rep_selector_price(index, pos_state)
                        + price::length_price(&self.model.rep_len, len, pos_state);
                    best.consider(Choice::Rep { index, len }, price, len);
                }
            }

            // Normal match.
            if let Some((dist, len)) = self.finder.best_match(data, pos, max_len) {
                let price = match_bit1
                    + rep_bit0
                    + price::length_price(&self.model.match_len, len, pos_state)
                    + price::distance_price(&self.model.distance, dist, len);
                best.consider(Choice::Match { dist, len }, price, len);
            }
        }

        best.choice
    }

    /// Length of the rep match at `pos` for rep slot `index`, capped.
    fn rep_len(&self, data: &[u8], pos: usize, index: usize, max_len: usize) -> u32 {
        let back = self.reps[index] as usize + 1;
        if back > pos {
            return 0;
        }
        let src = pos - back;
        let mut len = 0;
        while len < max_len && data[src + len] == data[pos + len] {
            len += 1;
        }
        len as u32
    }

    fn rep_selector_price(&self, index: usize, pos_state: usize) -> u32 {
        let state_idx = self.state.value();
        match index {
            0 => {
                price::bit_price(self.model.is_rep_g0[state_idx], 0)
                    + price::bit_price(self.model.is_rep0_long[state_idx][pos_state], 1)
            }
            1 => {
                price::bit_price(self.model.is_rep_g0[state_idx], 1)
                    + price::bit_price(self.model.is_rep_g1[state_idx], 0)
            }
            2 => {
                price::bit_price(self.model.is_rep_g0[state_idx], 1)
                    + price::bit_price(self.model.is_rep_g1[state_idx], 1)
                    + price::bit_price(self.model.is_rep_g2[state_idx], 0)
            }
            _ => {
                price::bit_price(self.model.is_rep_g0[state_idx], 1)
                    + price::bit_price(self.model.is_rep_g1[state_idx], 1)
                    + price::bit_price(self.model.is_rep_g2[state_idx], 1)
            }
        }
    }

    fn literal_price(&self, data: &[u8], pos: usize) -> u32 {
        let prev = if pos > 0 { data[pos - 1] } else { 0 };
        let ctx = self.model.literal.context(pos as u64, prev);
        let probs = &self.model.literal.probs[ctx];
        let byte = data[pos] as usize;

        if self.state.is_literal() {
            let mut total = 0;
            let mut symbol = byte | 0x100;
            let mut context = 1usize;
            while context < 0x100 {
                let bit = ((symbol >> 7) & 1) as u32;
                symbol <<= 1;
                total += price::bit_price(probs[context], bit);
                context = (context << 1) | bit as usize;
            }
            total
        } else {
            let back = self.reps[0] as usize + 1;
            let match_byte = if back <= pos { data[pos - back] } else { 0 };
            matched_literal_price(probs, byte, match_byte as usize)
        }
    }

    fn encode_literal(&mut self, rc: &mut RangeEncoder, data: &[u8], pos: usize, pos_state: usize) {
        let state_idx = self.state.value();
        rc.encode_bit(&mut self.model.is_match[state_idx][pos_state], 0);

        let prev = if pos > 0 { data[pos - 1] } else { 0 };
        let ctx = self.model.literal.context(pos as u64, prev);
        let probs = &mut self.model.literal.probs[ctx];
        let byte = data[pos] as usize;

        if self.state.is_literal() {
            let mut symbol = byte | 0x100;
            let mut context = 1usize;
            while context < 0x100 {
                let bit = ((symbol >> 7) & 1) as u32;
                symbol <<= 1;
                rc.encode_bit(&mut probs[context], bit);
                context = (context << 1) | bit as usize;
            }
        } else {
            let back = self.reps[0] as usize + 1;
            let match_byte = if back <= pos { data[pos - back] } else { 0 };
            let mut match_symbol = (match_byte as usize) << 1;
            let mut symbol = byte | 0x100;
            let mut context = 1usize;

            loop {
                let match_bit = (match_symbol >> 8) & 1;
                match_symbol = (match_symbol << 1) & 0x1FF;

                let bit = ((symbol >> 7) & 1) as usize;
                symbol <<= 1;

                rc.encode_bit(&mut probs[0x100 + (match_bit << 8) + context], bit as u32);
                context = (context << 1) | bit;

                if context >= 0x100 {
                    break;
                }
                if bit != match_bit {
                    while context < 0x100 {
                        let bit = ((symbol >> 7) & 1) as u32;
                        symbol <<= 1;
                        rc.encode_bit(&mut probs[context], bit);
                        context = (context << 1) | bit as usize;
                    }
                    break;
                }
            }
        }

        self.state.update_literal();
    }

    fn encode_short_rep(&mut self, rc: &mut RangeEncoder, pos_state: usize) {
        let state_idx = self.state.value();
        rc.encode_bit(&mut self.model.is_match[state_idx][pos_state], 1);
        rc.encode_bit(&mut self.model.is_rep[state_idx], 1);
        rc.encode_bit(&mut self.model.is_rep_g0[state_idx], 0);
        rc.encode_bit(&mut self.model.is_rep0_long[state_idx][pos_state], 0);
        self.state.update_short_rep();
    }

    fn encode_rep(&mut self, rc: &mut RangeEncoder, index: usize, len: u32, pos_state: usize) {
        let state_idx = self.state.value();
        rc.encode_bit(&mut self.model.is_match[state_idx][pos_state], 1);
        rc.encode_bit(&mut self.model.is_rep[state_idx], 1);

        match index {
            0 => {
                rc.encode_bit(&mut self.model.is_rep_g0[state_idx], 0);
                rc.encode_bit(&mut self.model.is_rep0_long[state_idx][pos_state], 1);
            }
            1 => {
                rc.encode_bit(&mut self.model.is_rep_g0[state_idx], 1);
                rc.encode_bit(&mut self.model.is_rep_g1[state_idx], 0);
                let d = self.reps[1];
                self.reps[1] = self.reps[0];
                self.reps[0] = d;
            }
            2 => {
                rc.encode_bit(&mut self.model.is_rep_g0[state_idx], 1);
                rc.encode_bit(&mut self.model.is_rep_g1[state_idx], 1);
                rc.encode_bit(&mut self.model.is_rep_g2[state_idx], 0);
                let d = self.reps[2];
                self.reps[2] = self.reps[1];
                self.reps[1] = self.reps[0];
                self.reps[0] = d;
            }
            _ => {
                rc.encode_bit(&mut self.model.is_rep_g0[state_idx], 1);
                rc.encode_bit(&mut self.model.is_rep_g1[state_idx], 1);
                rc.encode_bit(&mut self.model.is_rep_g2[state_idx], 1);
                let d = self.reps[3];
                self.reps[3] = self.reps[2];
                self.reps[2] = self.reps[1];
                self.reps[1] = self.reps[0];
                self.reps[0] = d;
            }
        }

        encode_length(rc, &mut self.model.rep_len, len, pos_state);
        self.state.update_rep();
    }

    fn encode_match(&mut self, rc: &mut RangeEncoder, dist: u32, len: u32, pos_state: usize) {
        let state_idx = self.state.value();
        rc.encode_bit(&mut self.model.is_match[state_idx][pos_state], 1);
        rc.encode_bit(&mut self.model.is_rep[state_idx], 0);

        encode_length(rc, &mut self.model.match_len, len, pos_state);
        encode_distance(rc, &mut self.model.distance, dist, len);

        self.reps[3] = self.reps[2];
        self.reps[2] = self.reps[1];
        self.reps[1] = self.reps[0];
        self.reps[0] = dist;
        self.state.update_match();
    }
}

/// Pick of the symbol to emit at a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Choice {
    Literal,
    ShortRep,
    Rep { index: usize, len: u32 },
    Match { dist: u32, len: u32 },
}

/// Running best candidate, compared by price per output byte.
struct Scored {
    choice: Choice,
    price: u64,
    len: u64,
}

impl Scored {
    fn new(choice: Choice, price: u32, len: u32) -> Self {
        Self {
            choice,
            price: price as u64,
            len: len as u64,
        }
    }

    fn consider(&mut self, choice: Choice, price: u32, len: u32) {
        // a/b < c/d  <=>  a*d < c*b; <= lets longer symbols win ties.
        let price = price as u64;
        let len = len as u64;
        if price * self.len <= self.price * len {
            self.choice = choice;
            self.price = price;
            self.len = len;
        }
    }
}

fn matched_literal_price(probs: &[u16; 0x300], byte: usize, match_byte: usize) -> u32 {
    let mut price = 0;
    let mut match_symbol = match_byte << 1;
    let mut symbol = byte | 0x100;
    let mut context = 1usize;

    loop {
        let match_bit = (match_symbol >> 8) & 1;
        match_symbol <<= 1;

        let bit = (symbol >> 7) & 1;
        symbol <<= 1;

        price += price::bit_price(probs[0x100 + (match_bit << 8) + context], bit as u32);
        context = (context << 1) | bit;

        if context >= 0x100 {
            break;
        }
        if bit != match_bit {
            while context < 0x100 {
                let bit = (symbol >> 7) & 1;
                symbol <<= 1;
                price += price::bit_price(probs[context], bit as u32);
                context = (context << 1) | bit;
            }
            break;
        }
    }
    price
}

fn encode_length(rc: &mut RangeEncoder, coder: &mut LengthCoder, len: u32, pos_state: usize) {
    let len = len - MATCH_LEN_MIN as u32;
    if len < 8 {
        rc.encode_bit(&mut coder.choice, 0);
        rc.encode_bit_tree(&mut coder.low[pos_state], len);
    } else if len < 16 {
        rc.encode_bit(&mut coder.choice, 1);
        rc.encode_bit(&mut coder.choice2, 0);
        rc.encode_bit_tree(&mut coder.mid[pos_state], len - 8);
    } else {
        rc.encode_bit(&mut coder.choice, 1);
        rc.encode_bit(&mut coder.choice2, 1);
        rc.encode_bit_tree(&mut coder.high, len - 16);
    }
}

fn encode_distance(
    rc: &mut RangeEncoder,
    coder: &mut crate::model::DistanceCoder,
    dist: u32,
    len: u32,
) {
    let dist_state = len_to_dist_state(len);
    let slot = dist_slot(dist);
    rc.encode_bit_tree(&mut coder.slot[dist_state], slot);

    if slot >= DIST_MODEL_START as u32 {
        let footer_bits = dist_slot_footer_bits(slot);
        let reduced = dist - ((2 | (slot & 1)) << footer_bits);
        if (slot as usize) < DIST_MODEL_END {
            rc.encode_reverse_bit_tree(&mut coder.special[slot as usize - DIST_MODEL_START], reduced);
        } else {
            rc.encode_direct_bits(reduced >> ALIGN_BITS, footer_bits - ALIGN_BITS);
            rc.encode_reverse_bit_tree(&mut coder.align, reduced & ((1 << ALIGN_BITS) - 1));
        }
    }
}

/// Compress to a `.lzma` (LZMA-alone) stream.
///
/// The header records an unknown size and the payload is terminated by the
/// end-of-payload marker, which is the streaming-friendly variant.
pub fn compress(data: &[u8], params: &LzmaParams) -> Result<Vec<u8>> {
    // LZMA-alone takes any in-range properties; the lc + lp rule is LZMA2's.
    crate::model::LzmaProps::new(params.lc, params.lp, params.pb)?;

    let mut out = Vec::new();
    out.push(params.props().to_byte());
    out.extend_from_slice(&params.dict_size.to_le_bytes());
    out.extend_from_slice(&u64::MAX.to_le_bytes());

    let compressed = compress_raw(data, params, true)?;
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// Compress a whole buffer as one raw LZMA stream.
pub fn compress_raw(data: &[u8], params: &LzmaParams, write_eopm: bool) -> Result<Vec<u8>> {
    let mut rc = RangeEncoder::new();
    let mut encoder = LzmaEncoder::new(params, data.len());
    encoder.encode_range(&mut rc, data, 0, data.len())?;
    if write_eopm {
        encoder.encode_eopm(&mut rc, data.len());
    }
    Ok(rc.finish())
}
