//! Deterministic xorshift64* PRNG with splitmix64 seed diffusion.
//!
//! Pinned as the reproducibility contract for the whole kernel: any change
//! to the algorithm or constants below must bump [`PRNG_ALGORITHM_VERSION`]
//! so a host can detect a replay pinned to the old sequence. The generator
//! implements `rand_core::RngCore`/`SeedableRng` so it composes with
//! ordinary `rand` distributions without losing bit-for-bit determinism.

use rand_core::{RngCore, SeedableRng};

/// Bump whenever the algorithm or its constants change.
pub const PRNG_ALGORITHM_VERSION: u32 = 1;

const MULTIPLIER: u64 = 2685821657736338717;
const DEFAULT_SEED: u64 = 0xDEADBEEFCAFEBABE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegRng {
    state: u64,
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

impl NegRng {
    /// Seed, mapping zero to the fixed non-zero default and running a
    /// single splitmix64 diffusion step so adjacent seeds decorrelate.
    pub fn new(seed: u64) -> Self {
        let raw = if seed == 0 { DEFAULT_SEED } else { seed };
        NegRng {
            state: splitmix64(raw),
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(MULTIPLIER)
    }

    pub fn next_u32_upper(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    /// Uniform `f64` in `[0,1)` using the top 53 bits.
    pub fn next_f64(&mut self) -> f64 {
        let bits = self.next_u64() >> 11;
        bits as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Bounded integer range `[0, bound)` by modulus. Tolerable bias for
    /// the small ranges used throughout this kernel.
    pub fn next_bounded(&mut self, bound: u64) -> u64 {
        if bound == 0 {
            return 0;
        }
        self.next_u64() % bound
    }

    /// Standard normal sample via the sum-of-twelve-uniforms CLT
    /// approximation (mean 0, variance 1 after the shift by six).
    pub fn next_gaussian(&mut self) -> f64 {
        let mut sum = 0.0f64;
        for _ in 0..12 {
            sum += self.next_f64();
        }
        sum - 6.0
    }

    pub fn next_gaussian_scaled(&mut self, mu: f64, sigma: f64) -> f64 {
        mu + sigma * self.next_gaussian()
    }

    /// Gaussian clamped to be non-negative, for sampling parameters that
    /// cannot go negative (e.g. conductivities, porosities).
    pub fn next_gaussian_nonnegative(&mut self, mu: f64, sigma: f64) -> f64 {
        self.next_gaussian_scaled(mu, sigma).max(0.0)
    }

    /// Gaussian clamped to `[lo,hi]`.
    pub fn next_gaussian_bounded(&mut self, mu: f64, sigma: f64, lo: f64, hi: f64) -> f64 {
        self.next_gaussian_scaled(mu, sigma).clamp(lo, hi)
    }
}

impl RngCore for NegRng {
    fn next_u32(&mut self) -> u32 {
        self.next_u32_upper()
    }

    fn next_u64(&mut self) -> u64 {
        NegRng::next_u64(self)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        let mut chunks = dest.chunks_exact_mut(8);
        for chunk in &mut chunks {
            let v = self.next_u64();
            chunk.copy_from_slice(&v.to_le_bytes());
        }
        let rem = chunks.into_remainder();
        if !rem.is_empty() {
            let v = self.next_u64().to_le_bytes();
            rem.copy_from_slice(&v[..rem.len()]);
        }
    }
}

impl SeedableRng for NegRng {
    type Seed = [u8; 8];

    fn from_seed(seed: Self::Seed) -> Self {
        NegRng::new(u64::from_le_bytes(seed))
    }

    fn seed_from_u64(seed: u64) -> Self {
        NegRng::new(seed)
    }
}
