//! Deterministic, fork-able random source.
//!
//! Every generation run owns one [`RandomSource`]. Recursive work never shares
//! a stream: it forks a child with an explicit salt, so sibling branches draw
//! the same numbers no matter which one runs first.

use glam::IVec3;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

/// SplitMix64 finalizer.
#[inline]
pub fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Seeded random stream with reproducible child streams.
#[derive(Debug, Clone)]
pub struct RandomSource {
    rng: ChaCha8Rng,
}

impl RandomSource {
    /// Create a source from a 64-bit seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Local random keyed by a block position, independent of any stream state.
    ///
    /// Used for per-cell deformation that must not depend on visit order.
    pub fn at_position(seed: u64, pos: IVec3) -> Self {
        let mut h = mix64(seed ^ GOLDEN_GAMMA);
        h = mix64(h ^ (pos.x as u32 as u64));
        h = mix64(h ^ ((pos.y as u32 as u64) << 21));
        h = mix64(h ^ ((pos.z as u32 as u64) << 42));
        Self::new(h)
    }

    /// Derive an independent child stream.
    ///
    /// The child depends only on the parent's current state and `salt`; the
    /// parent stream is not advanced.
    pub fn fork(&self, salt: u64) -> Self {
        let parent_seed = self.rng.get_seed();
        let word_pos = self.rng.get_word_pos();
        let stream = self.rng.get_stream();

        let salt_hash = mix64(salt.wrapping_add(GOLDEN_GAMMA));
        let position_hash = mix64((word_pos as u64) ^ mix64((word_pos >> 64) as u64 ^ stream));

        let mut child_seed = [0u8; 32];
        for (lane, chunk) in parent_seed.chunks_exact(8).enumerate() {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(chunk);
            let parent_lane = u64::from_le_bytes(bytes);
            let lane_salt = (lane as u64 + 1).wrapping_mul(GOLDEN_GAMMA);
            let mixed = mix64(parent_lane ^ mix64(salt_hash ^ lane_salt) ^ position_hash);
            child_seed[lane * 8..lane * 8 + 8].copy_from_slice(&mixed.to_le_bytes());
        }

        Self {
            rng: ChaCha8Rng::from_seed(child_seed),
        }
    }

    /// Integer in `[min, max)`. Returns `min` when the range is empty.
    pub fn next_int(&mut self, min: i32, max: i32) -> i32 {
        if max <= min {
            return min;
        }
        self.rng.gen_range(min..max)
    }

    /// Integer in `[min, max]`. Returns `min` when `max < min`.
    pub fn next_int_inclusive(&mut self, min: i32, max: i32) -> i32 {
        if max <= min {
            return min;
        }
        self.rng.gen_range(min..=max)
    }

    /// Float in `[0, 1)`.
    pub fn next_double(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Float in `[min, max)`. Returns `min` when the range is empty.
    pub fn next_range(&mut self, min: f64, max: f64) -> f64 {
        if max <= min {
            return min;
        }
        min + self.next_double() * (max - min)
    }

    /// Full-width signed integer.
    pub fn next_long(&mut self) -> i64 {
        self.rng.next_u64() as i64
    }

    /// True with probability `p` (clamped to `[0, 1]`).
    pub fn chance(&mut self, p: f64) -> bool {
        if p <= 0.0 {
            return false;
        }
        if p >= 1.0 {
            return true;
        }
        self.next_double() < p
    }

    /// Uniformly distributed unit vector.
    pub fn next_unit_vector(&mut self) -> glam::DVec3 {
        let z = self.next_range(-1.0, 1.0);
        let theta = self.next_range(0.0, std::f64::consts::TAU);
        let r = (1.0 - z * z).max(0.0).sqrt();
        glam::DVec3::new(r * theta.cos(), z, r * theta.sin())
    }
}

impl RngCore for RandomSource {
    fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.rng.try_fill_bytes(dest)
    }
}
