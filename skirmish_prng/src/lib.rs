// Deterministic, portable pseudo-random number generator.
//
// Implements xoshiro256++ (Blackman & Vigna, 2019) with SplitMix64 seeding.
// Hand-rolled with zero external dependencies so the output is identical on
// every platform, compiler version, and optimization level.
//
// This crate is the single source of randomness in the Skirmish workspace.
// The host's session coordinator owns one `GameRng` and draws from it for
// weighted stat rolls, deterministic entity UUIDs, and the random relocation
// of defeated factions. Clients never roll anything themselves — all random
// outcomes originate on the host and reach clients as replicated state, so
// a seeded host can replay a session exactly.
//
// **Critical constraint: determinism.** Every method on `GameRng` must produce
// identical output given the same prior state. No floating-point arithmetic in
// the core generator, no stdlib PRNG, no OS entropy.

use serde::{Deserialize, Serialize};

/// Xoshiro256++ PRNG — the workspace's sole source of randomness.
///
/// The state is serde-serializable so a host can snapshot it alongside the
/// session state and resume an identical roll sequence.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameRng {
    s: [u64; 4],
}

impl GameRng {
    /// Create a new PRNG seeded from a `u64`.
    ///
    /// Uses SplitMix64 to expand the seed into the 256-bit internal state.
    /// Two `GameRng` instances created with the same seed produce identical
    /// output sequences.
    pub fn new(seed: u64) -> Self {
        let mut sm = seed;
        Self {
            s: [
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
            ],
        }
    }

    /// Generate the next `u64` in the sequence.
    pub fn next_u64(&mut self) -> u64 {
        let result = (self.s[0].wrapping_add(self.s[3]))
            .rotate_left(23)
            .wrapping_add(self.s[0]);

        let t = self.s[1] << 17;

        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];

        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);

        result
    }

    /// Generate a uniform `f64` in [0, 1).
    ///
    /// Uses the upper 53 bits of a `u64` to fill the mantissa of an f64.
    /// 53 bits gives full f64 precision (IEEE 754 double has a 52-bit
    /// mantissa + 1 implicit bit).
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Generate 16 random bytes (used for UUID v4 generation).
    pub fn next_128_bits(&mut self) -> [u8; 16] {
        let a = self.next_u64().to_le_bytes();
        let b = self.next_u64().to_le_bytes();
        let mut out = [0u8; 16];
        out[..8].copy_from_slice(&a);
        out[8..].copy_from_slice(&b);
        out
    }

    /// Generate a uniform random integer in `[low, high)`.
    ///
    /// Uses rejection sampling to avoid modulo bias.
    /// Panics if `low >= high`.
    pub fn range_u64(&mut self, low: u64, high: u64) -> u64 {
        assert!(low < high, "range_u64: low must be less than high");
        let range = high - low;
        if range.is_power_of_two() {
            return low + (self.next_u64() & (range - 1));
        }
        // Rejection sampling to avoid modulo bias.
        let threshold = range.wrapping_neg() % range; // = (2^64 - range) % range
        loop {
            let r = self.next_u64();
            if r >= threshold {
                return low + (r % range);
            }
        }
    }

    /// Generate a uniform random `usize` in `[low, high)`.
    ///
    /// Delegates to `range_u64` for the actual sampling.
    /// Panics if `low >= high`.
    pub fn range_usize(&mut self, low: usize, high: usize) -> usize {
        self.range_u64(low as u64, high as u64) as usize
    }

    /// Shuffle a slice in place (Fisher-Yates).
    ///
    /// Used for combat initiative when no initiative stat is configured —
    /// turn order is then uniformly random but still deterministic per seed.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.range_usize(0, i + 1);
            items.swap(i, j);
        }
    }

    /// Weighted index selection: returns `i` with probability
    /// `weights[i] / Σweights`.
    ///
    /// Weights must be non-negative and sum to a positive value; the caller
    /// filters out non-positive weights beforehand. Panics if the sum is 0.
    pub fn weighted_index(&mut self, weights: &[u64]) -> usize {
        let total: u64 = weights.iter().sum();
        assert!(total > 0, "weighted_index: weights must sum to > 0");
        let mut pick = self.range_u64(0, total);
        for (i, w) in weights.iter().enumerate() {
            if pick < *w {
                return i;
            }
            pick -= w;
        }
        // Unreachable: pick < total and the loop consumes exactly total.
        weights.len() - 1
    }
}

/// SplitMix64 — used only for seeding xoshiro256++ from a single `u64`.
///
/// This is the standard recommendation from the xoshiro authors for
/// expanding a small seed into a larger state.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn determinism_same_seed_same_output() {
        let mut a = GameRng::new(42);
        let mut b = GameRng::new(42);
        for _ in 0..1000 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn different_seeds_different_output() {
        let mut a = GameRng::new(42);
        let mut b = GameRng::new(43);
        // Extremely unlikely to collide on the first value.
        assert_ne!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn f64_in_unit_range() {
        let mut rng = GameRng::new(12345);
        for _ in 0..10_000 {
            let v = rng.next_f64();
            assert!((0.0..1.0).contains(&v), "f64 out of range: {v}");
        }
    }

    #[test]
    fn range_u64_within_bounds() {
        let mut rng = GameRng::new(999);
        for _ in 0..10_000 {
            let v = rng.range_u64(10, 20);
            assert!((10..20).contains(&v), "range_u64 out of range: {v}");
        }
    }

    #[test]
    fn range_usize_within_bounds() {
        let mut rng = GameRng::new(555);
        for _ in 0..10_000 {
            let v = rng.range_usize(5, 15);
            assert!((5..15).contains(&v), "range_usize out of range: {v}");
        }
    }

    #[test]
    fn shuffle_preserves_elements() {
        let mut rng = GameRng::new(7);
        let mut items: Vec<u32> = (0..20).collect();
        rng.shuffle(&mut items);
        let mut sorted = items.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..20).collect::<Vec<u32>>());
    }

    #[test]
    fn shuffle_determinism() {
        let mut a = GameRng::new(42);
        let mut b = GameRng::new(42);
        let mut items_a: Vec<u32> = (0..50).collect();
        let mut items_b: Vec<u32> = (0..50).collect();
        a.shuffle(&mut items_a);
        b.shuffle(&mut items_b);
        assert_eq!(items_a, items_b);
    }

    #[test]
    fn weighted_index_single_entry() {
        let mut rng = GameRng::new(1);
        for _ in 0..100 {
            assert_eq!(rng.weighted_index(&[5]), 0);
        }
    }

    #[test]
    fn weighted_index_respects_weights() {
        // With weights [1, 3], index 1 should be picked ~75% of the time.
        let mut rng = GameRng::new(42);
        let n = 100_000;
        let mut hits = [0u32; 2];
        for _ in 0..n {
            hits[rng.weighted_index(&[1, 3])] += 1;
        }
        let pct = f64::from(hits[1]) / f64::from(n);
        assert!(
            (0.73..0.77).contains(&pct),
            "weighted_index(1,3) should pick index 1 ~75%, got {:.1}%",
            pct * 100.0
        );
    }

    #[test]
    fn weighted_index_zero_probability_of_missing_mass() {
        // A weight of 0 next to positive weights is never selected.
        let mut rng = GameRng::new(9);
        for _ in 0..10_000 {
            assert_ne!(rng.weighted_index(&[4, 0, 4]), 1);
        }
    }

    #[test]
    fn serialization_roundtrip() {
        let mut rng = GameRng::new(42);
        // Advance state
        for _ in 0..100 {
            rng.next_u64();
        }
        let json = serde_json::to_string(&rng).unwrap();
        let mut restored: GameRng = serde_json::from_str(&json).unwrap();
        // Continued sequences should match.
        for _ in 0..100 {
            assert_eq!(rng.next_u64(), restored.next_u64());
        }
    }

    #[test]
    fn next_128_bits_determinism() {
        let mut a = GameRng::new(42);
        let mut b = GameRng::new(42);
        assert_eq!(a.next_128_bits(), b.next_128_bits());
        assert_eq!(a.next_128_bits(), b.next_128_bits());
    }
}
