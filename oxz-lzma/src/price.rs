//! Bit prices for encoder decisions.
//!
//! The encoder chooses between literal, match, and rep symbols by comparing
//! their cost under the current probability model. The cost of one bit under
//! probability p is −log₂(p), held here in 1/16-bit fixed point and looked
//! up from a table built at compile time.

use crate::model::{
    ALIGN_BITS, DIST_MODEL_END, DIST_MODEL_START, DistanceCoder, LengthCoder, MATCH_LEN_MIN,
    dist_slot, dist_slot_footer_bits, len_to_dist_state,
};
use crate::range_coder::{PROB_BITS, PROB_MAX};

/// Fixed-point shift: prices are in units of 1/16 bit.
pub const BIT_PRICE_SHIFT: u32 = 4;

const MOVE_REDUCING_BITS: u32 = 4;

/// Price of one direct (unmodeled) bit.
pub const DIRECT_BIT_PRICE: u32 = 1 << BIT_PRICE_SHIFT;

static PRICES: [u32; (PROB_MAX as usize) >> MOVE_REDUCING_BITS as usize] = {
    let mut prices = [0u32; (PROB_MAX as usize) >> MOVE_REDUCING_BITS as usize];
    let step = 1usize << MOVE_REDUCING_BITS;
    let mut i = step / 2;
    while i < PROB_MAX as usize {
        // Repeated squaring computes floor(-log2(i / 2048) * 16).
        let mut w = i as u64;
        let mut bit_count = 0u32;
        let mut j = 0;
        while j < BIT_PRICE_SHIFT {
            w *= w;
            bit_count <<= 1;
            while w >= 1 << 16 {
                w >>= 1;
                bit_count += 1;
            }
            j += 1;
        }
        prices[i >> MOVE_REDUCING_BITS] = (PROB_BITS << BIT_PRICE_SHIFT) - 15 - bit_count;
        i += step;
    }
    prices
};

/// Price of encoding `bit` under probability `prob`.
#[inline]
pub fn bit_price(prob: u16, bit: u32) -> u32 {
    debug_assert!(bit <= 1);
    let mask = (PROB_MAX - 1) as u32;
    let p = (prob as u32 ^ (bit.wrapping_neg() & mask)) >> MOVE_REDUCING_BITS;
    PRICES[p as usize]
}

/// Price of a bit-tree symbol (width implied by the probs length).
pub fn bit_tree_price(probs: &[u16], symbol: u32) -> u32 {
    let num_bits = probs.len().trailing_zeros();
    let mut price = 0;
    let mut m = 1usize;
    for i in (0..num_bits).rev() {
        let bit = (symbol >> i) & 1;
        price += bit_price(probs[m], bit);
        m = (m << 1) | bit as usize;
    }
    price
}

/// Price of a reverse bit-tree symbol.
pub fn reverse_bit_tree_price(probs: &[u16], symbol: u32) -> u32 {
    let num_bits = probs.len().trailing_zeros();
    let mut price = 0;
    let mut m = 1usize;
    for i in 0..num_bits {
        let bit = (symbol >> i) & 1;
        price += bit_price(probs[m], bit);
        m = (m << 1) | bit as usize;
    }
    price
}

/// Price of a length symbol under a length coder.
pub fn length_price(coder: &LengthCoder, len: u32, pos_state: usize) -> u32 {
    let len = len - MATCH_LEN_MIN as u32;
    if len < 8 {
        bit_price(coder.choice, 0) + bit_tree_price(&coder.low[pos_state], len)
    } else if len < 16 {
        bit_price(coder.choice, 1)
            + bit_price(coder.choice2, 0)
            + bit_tree_price(&coder.mid[pos_state], len - 8)
    } else {
        bit_price(coder.choice, 1)
            + bit_price(coder.choice2, 1)
            + bit_tree_price(&coder.high, len - 16)
    }
}

/// Price of a match distance for a given length.
pub fn distance_price(coder: &DistanceCoder, dist: u32, len: u32) -> u32 {
    let dist_state = len_to_dist_state(len);
    let slot = dist_slot(dist);
    let mut price = bit_tree_price(&coder.slot[dist_state], slot);

    if slot >= DIST_MODEL_START as u32 {
        let footer_bits = dist_slot_footer_bits(slot);
        let reduced = dist - ((2 | (slot & 1)) << footer_bits);
        if (slot as usize) < DIST_MODEL_END {
            price += reverse_bit_tree_price(
                &coder.special[slot as usize - DIST_MODEL_START],
                reduced,
            );
        } else {
            price += (footer_bits - ALIGN_BITS) * DIRECT_BIT_PRICE;
            price += reverse_bit_tree_price(&coder.align, reduced & ((1 << ALIGN_BITS) - 1));
        }
    }

    price
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range_coder::PROB_INIT;

    #[test]
    fn test_even_probability_costs_one_bit() {
        assert_eq!(bit_price(PROB_INIT, 0), 1 << BIT_PRICE_SHIFT);
        assert_eq!(bit_price(PROB_INIT, 1), 1 << BIT_PRICE_SHIFT);
    }

    #[test]
    fn test_skewed_probability_ordering() {
        // A likely bit must cost less than an unlikely one.
        let confident: u16 = 1900;
        assert!(bit_price(confident, 0) < bit_price(PROB_INIT, 0));
        assert!(bit_price(confident, 1) > bit_price(PROB_INIT, 1));
    }

    #[test]
    fn test_prices_monotonic_in_probability() {
        let mut last = u32::MAX;
        for p in (32u16..2048).step_by(16) {
            let price = bit_price(p, 0);
            assert!(price <= last, "price must fall as probability rises");
            last = price;
        }
    }

    #[test]
    fn test_tree_price_accumulates() {
        let probs = [PROB_INIT; 8];
        // Three mid-probability bits = three bit units.
        assert_eq!(bit_tree_price(&probs, 5), 3 << BIT_PRICE_SHIFT);
        assert_eq!(reverse_bit_tree_price(&probs, 5), 3 << BIT_PRICE_SHIFT);
    }

    #[test]
    fn test_length_price_grows_with_tier() {
        let coder = LengthCoder::new();
        let low = length_price(&coder, 2, 0);
        let mid = length_price(&coder, 10, 0);
        let high = length_price(&coder, 40, 0);
        assert!(low < mid);
        assert!(mid < high);
    }

    #[test]
    fn test_distance_price_grows_with_distance() {
        let coder = DistanceCoder::new();
        let near = distance_price(&coder, 1, 2);
        let mid = distance_price(&coder, 1 << 10, 2);
        let far = distance_price(&coder, 1 << 28, 2);
        assert!(near < mid);
        assert!(mid < far);
    }
}
