//! Multi-octave Perlin noise used by height samplers and the climate biome source.

use noise::{NoiseFn, Perlin};
use serde::{Deserialize, Serialize};
use strata_core::rng::mix64;

/// Configuration for multi-octave noise generation.
///
/// `seed` is a salt: [`NoiseConfig::reseeded`] mixes it with the world seed,
/// so one config can be shared by every world.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// Number of octaves (layers of detail)
    pub octaves: u32,
    /// Frequency multiplier between octaves
    pub lacunarity: f64,
    /// Amplitude multiplier between octaves (persistence)
    pub persistence: f64,
    /// Base frequency (scale)
    pub frequency: f64,
    pub seed: u32,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            octaves: 4,
            lacunarity: 2.0,
            persistence: 0.5,
            frequency: 1.0,
            seed: 0,
        }
    }
}

impl NoiseConfig {
    /// Large rolling terrain shared by every biome height sampler.
    pub fn terrain() -> Self {
        Self {
            octaves: 4,
            lacunarity: 2.0,
            persistence: 0.5,
            frequency: 0.01,
            seed: 1000,
        }
    }

    /// Continental scale: separates oceans from land.
    pub fn continental() -> Self {
        Self {
            octaves: 3,
            lacunarity: 2.2,
            persistence: 0.6,
            frequency: 0.004,
            seed: 2000,
        }
    }

    pub fn temperature() -> Self {
        Self {
            octaves: 3,
            lacunarity: 2.0,
            persistence: 0.5,
            frequency: 0.008,
            seed: 3000,
        }
    }

    pub fn humidity() -> Self {
        Self {
            octaves: 3,
            lacunarity: 2.0,
            persistence: 0.5,
            frequency: 0.008,
            seed: 4000,
        }
    }

    /// Copy of this config with its salt mixed into `world_seed`.
    pub fn reseeded(&self, world_seed: u64) -> Self {
        Self {
            seed: derive_seed(world_seed, u64::from(self.seed)),
            ..*self
        }
    }
}

/// 32-bit noise seed for a world seed and layer salt.
pub fn derive_seed(world_seed: u64, salt: u64) -> u32 {
    (mix64(world_seed ^ mix64(salt)) >> 32) as u32
}

/// Fractal Perlin noise.
#[derive(Debug, Clone)]
pub struct NoiseGenerator {
    perlin: Perlin,
    config: NoiseConfig,
}

impl NoiseGenerator {
    pub fn new(config: NoiseConfig) -> Self {
        Self {
            perlin: Perlin::new(config.seed),
            config,
        }
    }

    pub fn config(&self) -> &NoiseConfig {
        &self.config
    }

    /// Multi-octave sample in `[-1.0, 1.0]`.
    pub fn sample_2d(&self, x: f64, z: f64) -> f64 {
        let mut value = 0.0;
        let mut amplitude = 1.0;
        let mut frequency = self.config.frequency;
        let mut max_value = 0.0;

        for _ in 0..self.config.octaves.max(1) {
            value += self.perlin.get([x * frequency, z * frequency]) * amplitude;
            max_value += amplitude;

            amplitude *= self.config.persistence;
            frequency *= self.config.lacunarity;
        }

        (value / max_value).clamp(-1.0, 1.0)
    }

    /// Sample and map from `[-1, 1]` to `[min, max]`.
    pub fn sample_2d_range(&self, x: f64, z: f64, min: f64, max: f64) -> f64 {
        let noise = self.sample_2d(x, z);
        (noise + 1.0) * 0.5 * (max - min) + min
    }
}
