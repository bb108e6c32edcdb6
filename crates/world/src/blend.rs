//! Terrain height blending across chunk and biome boundaries.
//!
//! Two strategies sit on top of [`HeightProviderCache`]:
//!
//! * [`smooth_fixed`]: a binomial 3x3 kernel over the neighbor chunks'
//!   arrays at the same local index. Cheap, and only an approximation of a
//!   spatial blur.
//! * [`BiomeAwareBlender`]: a true column neighborhood weighted by Gaussian
//!   distance and a pluggable [`BiomeSimilarity`] policy.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strata_core::RegistryKey;

use crate::biome::{Biome, BiomeSource};
use crate::chunk::{column_index, ChunkPos, CHUNK_SIZE_X, CHUNK_SIZE_Z};
use crate::height::{ChunkHeightProvider, HeightProviderCache};
use crate::heightmap::Heightmap;

const KERNEL: [[i32; 3]; 3] = [[1, 2, 1], [2, 4, 2], [1, 2, 1]];

/// Blend one column with the binomial kernel over the 3x3 chunk neighborhood.
///
/// Every neighbor contributes its value at the same local index as the
/// center column.
pub fn smooth_fixed(provider: &ChunkHeightProvider, chunk: ChunkPos, local_x: usize, local_z: usize) -> i32 {
    let index = local_z * CHUNK_SIZE_X + local_x;
    let mut sum = 0;
    for (dz, row) in KERNEL.iter().enumerate() {
        for (dx, weight) in row.iter().enumerate() {
            let neighbor = chunk.offset(dx as i32 - 1, dz as i32 - 1);
            sum += weight * provider.heights(neighbor).at_index(index);
        }
    }
    (f64::from(sum) / 16.0).round() as i32
}

/// Fixed smoothing for a whole chunk of one provider.
pub fn smooth_fixed_chunk(provider: &ChunkHeightProvider, chunk: ChunkPos) -> Heightmap {
    let mut out = Heightmap::filled(0);
    for z in 0..CHUNK_SIZE_Z {
        for x in 0..CHUNK_SIZE_X {
            out.set(x, z, smooth_fixed(provider, chunk, x, z));
        }
    }
    out
}

/// Weight in `[0, 1]` for letting `sample`'s height influence `center`.
pub trait BiomeSimilarity: Send + Sync {
    fn weight(&self, center: &Biome, sample: &Biome) -> f64;
}

/// Default policy from ocean/beach tags and shared family prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggedSimilarity {
    /// Same biome, or both ocean-like.
    pub same: f64,
    /// Across an ocean/land boundary.
    pub ocean_land: f64,
    /// Either side is a beach, or both share a family prefix.
    pub bridge: f64,
    pub default: f64,
}

impl Default for TaggedSimilarity {
    fn default() -> Self {
        Self {
            same: 1.0,
            ocean_land: 0.15,
            bridge: 0.9,
            default: 0.6,
        }
    }
}

impl BiomeSimilarity for TaggedSimilarity {
    fn weight(&self, center: &Biome, sample: &Biome) -> f64 {
        let (a_ocean, b_ocean) = (center.is_ocean(), sample.is_ocean());
        if center.key == sample.key || (a_ocean && b_ocean) {
            return self.same;
        }
        if a_ocean != b_ocean {
            return self.ocean_land;
        }
        if center.is_beach() || sample.is_beach() || center.key.family() == sample.key.family() {
            return self.bridge;
        }
        self.default
    }
}

impl<F> BiomeSimilarity for F
where
    F: Fn(&Biome, &Biome) -> f64 + Send + Sync,
{
    fn weight(&self, center: &Biome, sample: &Biome) -> f64 {
        self(center, sample)
    }
}

/// Biomes of a rectangle of columns, resolved once.
pub struct PaddedBiomeGrid {
    min_x: i32,
    min_z: i32,
    width: usize,
    depth: usize,
    cells: Vec<Arc<Biome>>,
}

impl PaddedBiomeGrid {
    /// Resolve `width x depth` columns starting at `(min_x, min_z)`, grown by `pad` on every side.
    pub fn new(
        source: &dyn BiomeSource,
        seed: u64,
        (min_x, min_z): (i32, i32),
        (width, depth): (usize, usize),
        pad: usize,
    ) -> Self {
        let min_x = min_x - pad as i32;
        let min_z = min_z - pad as i32;
        let width = width + 2 * pad;
        let depth = depth + 2 * pad;
        let mut cells = Vec::with_capacity(width * depth);
        for dz in 0..depth {
            for dx in 0..width {
                cells.push(source.biome_at(seed, min_x + dx as i32, min_z + dz as i32));
            }
        }
        Self {
            min_x,
            min_z,
            width,
            depth,
            cells,
        }
    }

    /// Biome at a world column, if it lies inside the grid.
    pub fn get(&self, x: i32, z: i32) -> Option<&Arc<Biome>> {
        let dx = usize::try_from(x - self.min_x).ok()?;
        let dz = usize::try_from(z - self.min_z).ok()?;
        if dx >= self.width || dz >= self.depth {
            return None;
        }
        self.cells.get(dz * self.width + dx)
    }

    /// Covered world rectangle as `(min_x, min_z, width, depth)`.
    pub fn extent(&self) -> (i32, i32, usize, usize) {
        (self.min_x, self.min_z, self.width, self.depth)
    }
}

/// Height strategy used by the terrain pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BlendMode {
    /// Unblended provider heights.
    None,
    Fixed,
    BiomeAware { radius: u32 },
}

impl Default for BlendMode {
    fn default() -> Self {
        BlendMode::BiomeAware { radius: 4 }
    }
}

impl BlendMode {
    /// Extra biome columns needed around a region.
    pub fn padding(self) -> usize {
        match self {
            BlendMode::BiomeAware { radius } => radius as usize,
            BlendMode::None | BlendMode::Fixed => 0,
        }
    }
}

/// Memo of per-(provider, chunk) arrays for one blend call.
struct ArrayMemo<'a> {
    cache: &'a HeightProviderCache,
    arrays: HashMap<(RegistryKey, u64), Arc<Heightmap>>,
}

impl<'a> ArrayMemo<'a> {
    fn new(cache: &'a HeightProviderCache) -> Self {
        Self {
            cache,
            arrays: HashMap::new(),
        }
    }

    fn height(&mut self, biome: &Biome, x: i32, z: i32) -> i32 {
        let chunk = ChunkPos::from_world(x, z);
        let key = (biome.key.clone(), chunk.pack());
        let cache = self.cache;
        self.arrays
            .entry(key)
            .or_insert_with(|| cache.provider(biome).heights(chunk))
            .at_index(column_index(x, z))
    }
}

/// Gaussian x similarity blend over a square neighborhood.
#[derive(Clone)]
pub struct BiomeAwareBlender {
    radius: u32,
    similarity: Arc<dyn BiomeSimilarity>,
}

impl BiomeAwareBlender {
    pub fn new(radius: u32) -> Self {
        Self::with_similarity(radius, Arc::new(TaggedSimilarity::default()))
    }

    pub fn with_similarity(radius: u32, similarity: Arc<dyn BiomeSimilarity>) -> Self {
        Self { radius, similarity }
    }

    pub fn radius(&self) -> u32 {
        self.radius
    }

    /// Distance weight `exp(-d²/2σ²)` with `σ = r/2`. Radius 0 weights the center only.
    pub fn gaussian(&self, d2: i32) -> f64 {
        if self.radius == 0 {
            return if d2 == 0 { 1.0 } else { 0.0 };
        }
        let sigma = f64::from(self.radius) / 2.0;
        (-f64::from(d2) / (2.0 * sigma * sigma)).exp()
    }

    /// Blended heights of a `width x depth` region, row-major.
    pub fn blend_region(
        &self,
        cache: &HeightProviderCache,
        source: &dyn BiomeSource,
        origin: (i32, i32),
        size: (usize, usize),
    ) -> Vec<i32> {
        let grid = PaddedBiomeGrid::new(source, cache.seed(), origin, size, self.radius as usize);
        self.blend_with_grid(cache, &grid, origin, size)
    }

    /// Blended heights of one chunk.
    pub fn blend_chunk(
        &self,
        cache: &HeightProviderCache,
        source: &dyn BiomeSource,
        chunk: ChunkPos,
    ) -> Heightmap {
        let values = self.blend_region(cache, source, chunk.origin(), (CHUNK_SIZE_X, CHUNK_SIZE_Z));
        Heightmap::from_slice(&values).unwrap_or_else(|| Heightmap::filled(cache.bounds().0))
    }

    /// Blend a region against a prebuilt grid, which must cover the region
    /// plus the radius on every side.
    ///
    /// Columns whose samples fall outside the grid skip those samples.
    pub fn blend_with_grid(
        &self,
        cache: &HeightProviderCache,
        grid: &PaddedBiomeGrid,
        (min_x, min_z): (i32, i32),
        (width, depth): (usize, usize),
    ) -> Vec<i32> {
        let mut memo = ArrayMemo::new(cache);
        let r = self.radius as i32;
        let mut out = Vec::with_capacity(width * depth);
        for dz in 0..depth {
            for dx in 0..width {
                let (x, z) = (min_x + dx as i32, min_z + dz as i32);
                let Some(center) = grid.get(x, z) else {
                    out.push(cache.bounds().0);
                    continue;
                };
                let mut total_weight = 0.0;
                let mut weighted = 0.0;
                for oz in -r..=r {
                    for ox in -r..=r {
                        let distance = self.gaussian(ox * ox + oz * oz);
                        if distance <= 0.0 {
                            continue;
                        }
                        let Some(sample) = grid.get(x + ox, z + oz) else {
                            continue;
                        };
                        let weight = distance * self.similarity.weight(center, sample);
                        if weight <= 0.0 || !weight.is_finite() {
                            continue;
                        }
                        total_weight += weight;
                        weighted += weight * f64::from(memo.height(sample, x + ox, z + oz));
                    }
                }
                let height = if total_weight > 0.0 {
                    (weighted / total_weight).round() as i32
                } else {
                    memo.height(center, x, z)
                };
                out.push(height);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biome::{BiomeTags, FixedBiomeSource, LayeredPalette};
    use crate::blocks;

    fn biome(name: &str, height: f64) -> Biome {
        Biome::new(
            RegistryKey::builtin(name),
            move |_: u64, _: i32, _: i32| height,
            LayeredPalette::new(blocks::GRASS, blocks::DIRT, blocks::STONE),
        )
    }

    /// `west` for x < 0, `east` otherwise.
    struct Split {
        west: Arc<Biome>,
        east: Arc<Biome>,
    }

    impl BiomeSource for Split {
        fn biome_at(&self, _seed: u64, x: i32, _z: i32) -> Arc<Biome> {
            if x < 0 {
                Arc::clone(&self.west)
            } else {
                Arc::clone(&self.east)
            }
        }
    }

    fn provider_with(heights: impl Fn(i32, i32) -> f64 + Send + Sync + 'static) -> ChunkHeightProvider {
        ChunkHeightProvider::new(
            RegistryKey::builtin("test"),
            Arc::new(move |_: u64, x: i32, z: i32| heights(x, z)),
            0,
            (-64, 319),
            16,
        )
    }

    #[test]
    fn fixed_kernel_preserves_flat_terrain() {
        let provider = provider_with(|_, _| 70.0);
        assert_eq!(smooth_fixed_chunk(&provider, ChunkPos::new(2, -1)), Heightmap::filled(70));
    }

    #[test]
    fn fixed_kernel_weights_neighbor_chunks() {
        // Only the chunk at +X is raised by 16.
        let provider = provider_with(|x, _| if (16..32).contains(&x) { 80.0 } else { 64.0 });
        // Center chunk (0,0): east column of neighbors has weights 1+2+1 = 4.
        assert_eq!(smooth_fixed(&provider, ChunkPos::new(0, 0), 3, 3), 64 + 4);
        // Same local index in every neighbor, so the position inside the chunk does not matter.
        assert_eq!(smooth_fixed(&provider, ChunkPos::new(0, 0), 15, 0), 68);
    }

    #[test]
    fn tagged_similarity_rules() {
        let sim = TaggedSimilarity::default();
        let plains = biome("plains", 64.0);
        let ocean = biome("ocean", 40.0).with_tags(BiomeTags::OCEAN);
        let deep = biome("deep_ocean", 30.0);
        let beach = biome("beach", 63.0).with_tags(BiomeTags::BEACH);
        let snowy_plains = biome("snowy_plains", 64.0);
        let snowy_taiga = biome("snowy_taiga", 64.0);
        let desert = biome("desert", 64.0);

        assert_eq!(sim.weight(&plains, &plains), 1.0);
        assert_eq!(sim.weight(&ocean, &deep), 1.0);
        assert_eq!(sim.weight(&plains, &ocean), 0.15);
        assert_eq!(sim.weight(&beach, &ocean), 0.15);
        assert_eq!(sim.weight(&plains, &beach), 0.9);
        assert_eq!(sim.weight(&snowy_plains, &snowy_taiga), 0.9);
        assert_eq!(sim.weight(&plains, &desert), 0.6);
    }

    #[test]
    fn gaussian_weights() {
        let blender = BiomeAwareBlender::new(4);
        assert_eq!(blender.gaussian(0), 1.0);
        // sigma = 2 -> exp(-4 / 8)
        assert!((blender.gaussian(4) - (-0.5f64).exp()).abs() < 1e-12);
        let center_only = BiomeAwareBlender::new(0);
        assert_eq!(center_only.gaussian(0), 1.0);
        assert_eq!(center_only.gaussian(1), 0.0);
    }

    #[test]
    fn uniform_biome_is_unchanged() {
        let cache = HeightProviderCache::new(1, (-64, 319));
        let source = FixedBiomeSource::new(biome("plains", 72.0));
        let blended = BiomeAwareBlender::new(3).blend_chunk(&cache, &source, ChunkPos::new(-3, 5));
        assert_eq!(blended, Heightmap::filled(72));
    }

    #[test]
    fn zero_weight_falls_back_to_provider() {
        let cache = HeightProviderCache::new(1, (-64, 319));
        let source = Split {
            west: Arc::new(biome("plains", 60.0)),
            east: Arc::new(biome("hills", 90.0)),
        };
        let never = |_: &Biome, _: &Biome| 0.0;
        for radius in [0, 2] {
            let blender = BiomeAwareBlender::with_similarity(radius, Arc::new(never));
            let west = blender.blend_chunk(&cache, &source, ChunkPos::new(-1, 0));
            let east = blender.blend_chunk(&cache, &source, ChunkPos::new(0, 0));
            assert_eq!(west, Heightmap::filled(60));
            assert_eq!(east, Heightmap::filled(90));
        }
    }

    #[test]
    fn blend_smooths_a_biome_step() {
        let cache = HeightProviderCache::new(1, (-64, 319));
        let source = Split {
            west: Arc::new(biome("plains", 60.0)),
            east: Arc::new(biome("hills", 90.0)),
        };
        let heights = BiomeAwareBlender::new(4).blend_region(&cache, &source, (-8, 0), (16, 1));
        assert_eq!(heights[0], 60);
        assert_eq!(heights[15], 90);
        assert!(heights.windows(2).all(|w| w[0] <= w[1]), "{heights:?}");
        let max_step = heights.windows(2).map(|w| w[1] - w[0]).max().unwrap();
        assert!(max_step < 30, "{heights:?}");
    }

    #[test]
    fn region_matches_per_chunk_blend() {
        let cache = HeightProviderCache::new(5, (-64, 319));
        let source = Split {
            west: Arc::new(biome("ocean", 40.0).with_tags(BiomeTags::OCEAN)),
            east: Arc::new(biome("beach", 63.0).with_tags(BiomeTags::BEACH)),
        };
        let blender = BiomeAwareBlender::new(4);
        let region = blender.blend_region(&cache, &source, (-16, 0), (32, 16));
        let west = blender.blend_chunk(&cache, &source, ChunkPos::new(-1, 0));
        let east = blender.blend_chunk(&cache, &source, ChunkPos::new(0, 0));
        for z in 0..16 {
            for x in 0..16 {
                assert_eq!(region[z * 32 + x], west.get(x, z));
                assert_eq!(region[z * 32 + 16 + x], east.get(x, z));
            }
        }
    }

    #[test]
    fn padded_grid_bounds() {
        let source = FixedBiomeSource::new(biome("plains", 64.0));
        let grid = PaddedBiomeGrid::new(&source, 0, (0, 0), (16, 16), 2);
        assert_eq!(grid.extent(), (-2, -2, 20, 20));
        assert!(grid.get(-2, 17).is_some());
        assert!(grid.get(-3, 0).is_none());
        assert!(grid.get(0, 18).is_none());
    }

    #[test]
    fn blend_mode_config_roundtrip() {
        let mode: BlendMode = serde_json::from_str(r#"{"mode":"biome_aware","radius":6}"#).unwrap();
        assert_eq!(mode, BlendMode::BiomeAware { radius: 6 });
        assert_eq!(mode.padding(), 6);
        let fixed: BlendMode = serde_json::from_str(r#"{"mode":"fixed"}"#).unwrap();
        assert_eq!(fixed, BlendMode::Fixed);
    }
}
