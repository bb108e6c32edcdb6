//! Biome model consumed by the terrain pipeline, plus built-in presets.
//!
//! A [`Biome`] bundles an identifier, a [`HeightSampler`], a [`BlockPalette`]
//! and the features it declares. Hosts normally supply their own
//! [`BiomeSource`]; [`ClimateBiomeSource`] assigns the built-in presets from
//! temperature, humidity and continental noise.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strata_core::RegistryKey;

use crate::blocks;
use crate::branch_tree::BranchTreeGenerator;
use crate::chunk::{BlockId, ChunkPos, CHUNK_AREA, CHUNK_SIZE_X};
use crate::crystal::CrystalGenerator;
use crate::error::ConfigError;
use crate::mushroom::MushroomGenerator;
use crate::noise::{NoiseConfig, NoiseGenerator};
use crate::scheduler::Generator;
use crate::tree::TreeGenerator;
use crate::tube::TubeGenerator;

/// Default sea level for the built-in presets.
pub const SEA_LEVEL: i32 = 64;

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    /// Classification flags read by blending policies.
    pub struct BiomeTags: u8 {
        const OCEAN = 0b0000_0001;
        const BEACH = 0b0000_0010;
        const COLD = 0b0000_0100;
        const ARID = 0b0000_1000;
        const WOODED = 0b0001_0000;
    }
}

/// Surface height source for one biome.
pub trait HeightSampler: Send + Sync {
    /// Terrain top for one world column.
    fn sample(&self, seed: u64, x: i32, z: i32) -> f64;

    /// Heights for a whole chunk, row-major.
    ///
    /// Callers treat a result that is not exactly 256 finite values as missing.
    fn sample_chunk(&self, seed: u64, chunk: ChunkPos) -> Vec<f64> {
        let (ox, oz) = chunk.origin();
        (0..CHUNK_AREA)
            .map(|i| {
                let x = ox + (i % CHUNK_SIZE_X) as i32;
                let z = oz + (i / CHUNK_SIZE_X) as i32;
                self.sample(seed, x, z)
            })
            .collect()
    }
}

impl<F> HeightSampler for F
where
    F: Fn(u64, i32, i32) -> f64 + Send + Sync,
{
    fn sample(&self, seed: u64, x: i32, z: i32) -> f64 {
        self(seed, x, z)
    }
}

/// `base + amplitude * noise`, sharing one noise field across biomes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseHeightSampler {
    pub base: f64,
    pub amplitude: f64,
    pub noise: NoiseConfig,
}

impl NoiseHeightSampler {
    pub fn new(base: f64, amplitude: f64) -> Self {
        Self {
            base,
            amplitude,
            noise: NoiseConfig::terrain(),
        }
    }

    fn height(&self, noise: &NoiseGenerator, x: i32, z: i32) -> f64 {
        self.base + self.amplitude * noise.sample_2d(f64::from(x), f64::from(z))
    }
}

impl HeightSampler for NoiseHeightSampler {
    fn sample(&self, seed: u64, x: i32, z: i32) -> f64 {
        let noise = NoiseGenerator::new(self.noise.reseeded(seed));
        self.height(&noise, x, z)
    }

    fn sample_chunk(&self, seed: u64, chunk: ChunkPos) -> Vec<f64> {
        let noise = NoiseGenerator::new(self.noise.reseeded(seed));
        let (ox, oz) = chunk.origin();
        (0..CHUNK_AREA)
            .map(|i| {
                let x = ox + (i % CHUNK_SIZE_X) as i32;
                let z = oz + (i / CHUNK_SIZE_X) as i32;
                self.height(&noise, x, z)
            })
            .collect()
    }
}

/// Where a block sits in its column, handed to [`BlockPalette::block_at`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnContext {
    pub y: i32,
    /// Terrain top of the column.
    pub top: i32,
    pub sea_level: i32,
    /// Distance below the top (0 at the surface block).
    pub depth: i32,
}

impl ColumnContext {
    pub fn new(y: i32, top: i32, sea_level: i32) -> Self {
        Self {
            y,
            top,
            sea_level,
            depth: top - y,
        }
    }

    pub fn is_submerged(&self) -> bool {
        self.top < self.sea_level
    }
}

/// Per-height block distribution of a biome.
pub trait BlockPalette: Send + Sync {
    fn block_at(&self, ctx: &ColumnContext) -> BlockId;
}

/// Surface block, a few layers of filler, then the base material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayeredPalette {
    pub surface: BlockId,
    pub subsurface: BlockId,
    pub subsurface_depth: i32,
    pub base: BlockId,
    /// Replaces `surface` and `subsurface` on columns below sea level.
    pub underwater: Option<BlockId>,
}

impl LayeredPalette {
    pub const fn new(surface: BlockId, subsurface: BlockId, base: BlockId) -> Self {
        Self {
            surface,
            subsurface,
            subsurface_depth: 3,
            base,
            underwater: None,
        }
    }

    pub fn with_underwater(mut self, block: BlockId) -> Self {
        self.underwater = Some(block);
        self
    }
}

impl BlockPalette for LayeredPalette {
    fn block_at(&self, ctx: &ColumnContext) -> BlockId {
        if ctx.depth > self.subsurface_depth {
            return self.base;
        }
        if let Some(floor) = self.underwater.filter(|_| ctx.is_submerged()) {
            return floor;
        }
        if ctx.depth <= 0 {
            self.surface
        } else {
            self.subsurface
        }
    }
}

/// A feature a biome declares, tried on the pipeline's candidate grid.
#[derive(Clone)]
pub struct FeatureEntry {
    pub key: RegistryKey,
    pub generator: Arc<dyn Generator>,
    /// Probability of placement at a candidate column.
    pub chance: f64,
    /// Only place on columns below sea level (otherwise only on dry land).
    pub submerged: bool,
}

impl FeatureEntry {
    pub fn new(key: &str, generator: impl Generator + 'static, chance: f64) -> Self {
        Self {
            key: RegistryKey::builtin(key),
            generator: Arc::new(generator),
            chance,
            submerged: false,
        }
    }

    pub fn submerged(mut self) -> Self {
        self.submerged = true;
        self
    }
}

impl fmt::Debug for FeatureEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureEntry")
            .field("key", &self.key)
            .field("generator", &self.generator.name())
            .field("chance", &self.chance)
            .field("submerged", &self.submerged)
            .finish()
    }
}

/// Everything the pipeline needs to know about one biome.
#[derive(Clone)]
pub struct Biome {
    pub key: RegistryKey,
    pub tags: BiomeTags,
    pub height: Arc<dyn HeightSampler>,
    pub palette: Arc<dyn BlockPalette>,
    pub features: Vec<FeatureEntry>,
}

impl Biome {
    pub fn new(
        key: RegistryKey,
        height: impl HeightSampler + 'static,
        palette: impl BlockPalette + 'static,
    ) -> Self {
        Self {
            key,
            tags: BiomeTags::empty(),
            height: Arc::new(height),
            palette: Arc::new(palette),
            features: Vec::new(),
        }
    }

    pub fn with_tags(mut self, tags: BiomeTags) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_feature(mut self, feature: FeatureEntry) -> Self {
        self.features.push(feature);
        self
    }

    /// Tagged ocean, or an identifier containing the word `ocean`.
    pub fn is_ocean(&self) -> bool {
        self.tags.contains(BiomeTags::OCEAN) || self.key.has_word("ocean")
    }

    pub fn is_beach(&self) -> bool {
        self.tags.contains(BiomeTags::BEACH) || self.key.has_word("beach")
    }

    /// Largest known reach among this biome's features.
    pub fn feature_reach(&self) -> u32 {
        self.features
            .iter()
            .filter_map(|entry| entry.generator.reach())
            .max()
            .unwrap_or(0)
    }
}

impl fmt::Debug for Biome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Biome")
            .field("key", &self.key)
            .field("tags", &self.tags)
            .field("features", &self.features)
            .finish_non_exhaustive()
    }
}

/// Host biome lookup.
pub trait BiomeSource: Send + Sync {
    fn biome_at(&self, seed: u64, x: i32, z: i32) -> Arc<Biome>;

    /// Largest feature reach of any biome this source can return.
    ///
    /// Sources that cannot enumerate their biomes report 0 and rely on the
    /// configured feature margin.
    fn feature_reach(&self) -> u32 {
        0
    }
}

/// The same biome everywhere.
#[derive(Debug, Clone)]
pub struct FixedBiomeSource(pub Arc<Biome>);

impl FixedBiomeSource {
    pub fn new(biome: Biome) -> Self {
        Self(Arc::new(biome))
    }
}

impl BiomeSource for FixedBiomeSource {
    fn biome_at(&self, _seed: u64, _x: i32, _z: i32) -> Arc<Biome> {
        Arc::clone(&self.0)
    }

    fn feature_reach(&self) -> u32 {
        self.0.feature_reach()
    }
}

/// Built-in biome identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiomeId {
    IcePlains,
    IceMountains,
    Tundra,
    Plains,
    Forest,
    BirchForest,
    Mountains,
    Hills,
    Desert,
    Savanna,
    Swamp,
    RainForest,
    Beach,
    Ocean,
    DeepOcean,
}

impl BiomeId {
    pub fn all() -> &'static [BiomeId] {
        &[
            BiomeId::IcePlains,
            BiomeId::IceMountains,
            BiomeId::Tundra,
            BiomeId::Plains,
            BiomeId::Forest,
            BiomeId::BirchForest,
            BiomeId::Mountains,
            BiomeId::Hills,
            BiomeId::Desert,
            BiomeId::Savanna,
            BiomeId::Swamp,
            BiomeId::RainForest,
            BiomeId::Beach,
            BiomeId::Ocean,
            BiomeId::DeepOcean,
        ]
    }

    pub fn name(self) -> &'static str {
        match self {
            BiomeId::IcePlains => "ice_plains",
            BiomeId::IceMountains => "ice_mountains",
            BiomeId::Tundra => "tundra",
            BiomeId::Plains => "plains",
            BiomeId::Forest => "forest",
            BiomeId::BirchForest => "birch_forest",
            BiomeId::Mountains => "mountains",
            BiomeId::Hills => "hills",
            BiomeId::Desert => "desert",
            BiomeId::Savanna => "savanna",
            BiomeId::Swamp => "swamp",
            BiomeId::RainForest => "rain_forest",
            BiomeId::Beach => "beach",
            BiomeId::Ocean => "ocean",
            BiomeId::DeepOcean => "deep_ocean",
        }
    }

    pub fn key(self) -> RegistryKey {
        RegistryKey::builtin(self.name())
    }

    pub fn tags(self) -> BiomeTags {
        match self {
            BiomeId::Ocean | BiomeId::DeepOcean => BiomeTags::OCEAN,
            BiomeId::Beach => BiomeTags::BEACH,
            BiomeId::IcePlains | BiomeId::IceMountains | BiomeId::Tundra => BiomeTags::COLD,
            BiomeId::Desert | BiomeId::Savanna => BiomeTags::ARID,
            BiomeId::Forest | BiomeId::BirchForest | BiomeId::RainForest | BiomeId::Swamp => {
                BiomeTags::WOODED
            }
            BiomeId::Plains | BiomeId::Mountains | BiomeId::Hills => BiomeTags::empty(),
        }
    }

    /// Single character used by the debug maps.
    pub fn glyph(self) -> char {
        match self {
            BiomeId::IcePlains => 'i',
            BiomeId::IceMountains => 'I',
            BiomeId::Tundra => 't',
            BiomeId::Plains => 'p',
            BiomeId::Forest => 'f',
            BiomeId::BirchForest => 'b',
            BiomeId::Mountains => 'M',
            BiomeId::Hills => 'h',
            BiomeId::Desert => 'd',
            BiomeId::Savanna => 's',
            BiomeId::Swamp => 'w',
            BiomeId::RainForest => 'r',
            BiomeId::Beach => '.',
            BiomeId::Ocean => '~',
            BiomeId::DeepOcean => '=',
        }
    }

    pub fn from_key(key: &RegistryKey) -> Option<Self> {
        Self::all().iter().copied().find(|id| id.key() == *key)
    }

    /// Build the preset biome: climate-driven height, palette and features.
    pub fn build(self) -> Result<Biome, ConfigError> {
        let data = BiomeData::get(self);
        let height = NoiseHeightSampler::new(
            f64::from(SEA_LEVEL) + 40.0 * f64::from(data.height_modifier),
            2.0 + 16.0 * f64::from(data.height_variation),
        );
        let mut biome = Biome::new(self.key(), height, self.palette()).with_tags(self.tags());
        biome.features = self.features()?;
        Ok(biome)
    }

    fn palette(self) -> LayeredPalette {
        use blocks::*;
        match self {
            BiomeId::IcePlains | BiomeId::Tundra => {
                LayeredPalette::new(SNOW, DIRT, STONE).with_underwater(GRAVEL)
            }
            BiomeId::IceMountains => LayeredPalette::new(SNOW, STONE, STONE),
            BiomeId::Mountains => LayeredPalette::new(STONE, STONE, STONE),
            BiomeId::Desert | BiomeId::Beach => LayeredPalette::new(SAND, SAND, STONE),
            BiomeId::Swamp => LayeredPalette::new(GRASS, CLAY, STONE).with_underwater(CLAY),
            BiomeId::Ocean | BiomeId::DeepOcean => {
                LayeredPalette::new(SAND, SAND, STONE).with_underwater(GRAVEL)
            }
            _ => LayeredPalette::new(GRASS, DIRT, STONE).with_underwater(DIRT),
        }
    }

    fn features(self) -> Result<Vec<FeatureEntry>, ConfigError> {
        Ok(match self {
            BiomeId::Forest => vec![
                FeatureEntry::new("oak", TreeGenerator::oak()?, 0.5),
                FeatureEntry::new("red_mushroom", MushroomGenerator::red()?, 0.05),
            ],
            BiomeId::BirchForest => vec![FeatureEntry::new("birch", TreeGenerator::birch()?, 0.5)],
            BiomeId::RainForest => vec![FeatureEntry::new("jungle", TreeGenerator::jungle()?, 0.6)],
            BiomeId::Tundra => vec![FeatureEntry::new("pine", TreeGenerator::pine()?, 0.3)],
            BiomeId::IceMountains => vec![
                FeatureEntry::new("ice_spire", CrystalGenerator::ice_spire()?, 0.15),
                FeatureEntry::new("pine", TreeGenerator::pine()?, 0.1),
            ],
            BiomeId::IcePlains => {
                vec![FeatureEntry::new("ice_spire", CrystalGenerator::ice_spire()?, 0.05)]
            }
            BiomeId::Swamp => vec![
                FeatureEntry::new("mangrove", BranchTreeGenerator::mangrove()?, 0.35),
                FeatureEntry::new("brown_mushroom", MushroomGenerator::brown()?, 0.15),
            ],
            BiomeId::Plains => vec![
                FeatureEntry::new("oak", TreeGenerator::oak()?, 0.05),
                FeatureEntry::new("brown_mushroom", MushroomGenerator::brown()?, 0.03),
            ],
            BiomeId::Mountains => vec![
                FeatureEntry::new("amethyst", CrystalGenerator::amethyst_cluster()?, 0.04),
                FeatureEntry::new("pine", TreeGenerator::pine()?, 0.1),
            ],
            BiomeId::Hills => vec![FeatureEntry::new("oak", TreeGenerator::oak()?, 0.15)],
            BiomeId::Savanna => vec![FeatureEntry::new("oak", TreeGenerator::oak()?, 0.06)],
            BiomeId::Ocean => {
                vec![FeatureEntry::new("tube_coral", TubeGenerator::coral()?, 0.2).submerged()]
            }
            BiomeId::DeepOcean => {
                vec![FeatureEntry::new("tube_coral", TubeGenerator::coral()?, 0.1).submerged()]
            }
            BiomeId::Desert | BiomeId::Beach => Vec::new(),
        })
    }
}

/// Climate and relief parameters of a preset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiomeData {
    pub id: BiomeId,
    /// Temperature value [0.0, 1.0] (0=cold, 1=hot)
    pub temperature: f32,
    /// Humidity value [0.0, 1.0] (0=dry, 1=wet)
    pub humidity: f32,
    /// Base height modifier [-1.0, 1.0]
    pub height_modifier: f32,
    /// Height variation multiplier [0.0, 2.0]
    pub height_variation: f32,
}

impl BiomeData {
    pub fn get(id: BiomeId) -> Self {
        let (temperature, humidity, height_modifier, height_variation) = match id {
            BiomeId::IcePlains => (0.0, 0.3, 0.0, 0.5),
            BiomeId::IceMountains => (0.0, 0.5, 0.6, 1.5),
            BiomeId::Tundra => (0.2, 0.2, 0.1, 0.6),
            BiomeId::Plains => (0.5, 0.4, 0.05, 0.4),
            BiomeId::Forest => (0.5, 0.6, 0.1, 0.7),
            BiomeId::BirchForest => (0.5, 0.5, 0.1, 0.6),
            BiomeId::Mountains => (0.4, 0.3, 0.8, 1.8),
            BiomeId::Hills => (0.5, 0.4, 0.3, 1.2),
            BiomeId::Desert => (0.9, 0.1, 0.05, 0.5),
            BiomeId::Savanna => (0.8, 0.3, 0.1, 0.6),
            BiomeId::Swamp => (0.6, 0.9, -0.02, 0.2),
            BiomeId::RainForest => (0.8, 0.9, 0.2, 0.8),
            BiomeId::Beach => (0.6, 0.5, 0.0, 0.1),
            BiomeId::Ocean => (0.5, 1.0, -0.5, 0.2),
            BiomeId::DeepOcean => (0.5, 1.0, -0.8, 0.3),
        };
        Self {
            id,
            temperature,
            humidity,
            height_modifier,
            height_variation,
        }
    }
}

/// Biome lookup table based on temperature and humidity.
#[derive(Debug, Clone)]
pub struct BiomeLookup {
    resolution: usize,
    /// Indexed as `[temp_idx][humidity_idx]`.
    table: Vec<Vec<BiomeId>>,
}

impl BiomeLookup {
    pub fn new() -> Self {
        const RESOLUTION: usize = 16;
        let mut table = vec![vec![BiomeId::Plains; RESOLUTION]; RESOLUTION];

        for (temp_idx, row) in table.iter_mut().enumerate() {
            let temp = temp_idx as f32 / (RESOLUTION - 1) as f32;
            for (humidity_idx, cell) in row.iter_mut().enumerate() {
                let humidity = humidity_idx as f32 / (RESOLUTION - 1) as f32;
                *cell = Self::select_biome(temp, humidity);
            }
        }

        Self {
            resolution: RESOLUTION,
            table,
        }
    }

    fn select_biome(temp: f32, humidity: f32) -> BiomeId {
        if temp < 0.3 {
            if humidity > 0.6 {
                BiomeId::IceMountains
            } else if humidity > 0.3 {
                BiomeId::Tundra
            } else {
                BiomeId::IcePlains
            }
        } else if temp > 0.7 {
            if humidity > 0.7 {
                BiomeId::RainForest
            } else if humidity > 0.4 {
                BiomeId::Savanna
            } else {
                BiomeId::Desert
            }
        } else if humidity > 0.8 {
            BiomeId::Swamp
        } else if humidity > 0.55 {
            BiomeId::Forest
        } else if humidity > 0.45 {
            BiomeId::BirchForest
        } else if humidity > 0.3 {
            BiomeId::Plains
        } else if humidity > 0.15 {
            BiomeId::Hills
        } else {
            BiomeId::Mountains
        }
    }

    /// Look up a land biome from temperature and humidity in `[0, 1]`.
    pub fn lookup(&self, temp: f32, humidity: f32) -> BiomeId {
        let temp_idx = (temp.clamp(0.0, 1.0) * (self.resolution - 1) as f32) as usize;
        let humidity_idx = (humidity.clamp(0.0, 1.0) * (self.resolution - 1) as f32) as usize;
        self.table[temp_idx][humidity_idx]
    }
}

impl Default for BiomeLookup {
    fn default() -> Self {
        Self::new()
    }
}

/// Continental thresholds separating ocean, beach and land.
const DEEP_OCEAN_BELOW: f64 = -0.45;
const OCEAN_BELOW: f64 = -0.2;
const BEACH_BELOW: f64 = -0.14;

#[derive(Debug, Clone)]
struct Climate {
    seed: u64,
    continental: NoiseGenerator,
    temperature: NoiseGenerator,
    humidity: NoiseGenerator,
}

impl Climate {
    fn new(seed: u64) -> Self {
        Self {
            seed,
            continental: NoiseGenerator::new(NoiseConfig::continental().reseeded(seed)),
            temperature: NoiseGenerator::new(NoiseConfig::temperature().reseeded(seed)),
            humidity: NoiseGenerator::new(NoiseConfig::humidity().reseeded(seed)),
        }
    }

    fn classify(&self, lookup: &BiomeLookup, x: i32, z: i32) -> BiomeId {
        let (x, z) = (f64::from(x), f64::from(z));
        let continental = self.continental.sample_2d(x, z);
        if continental < DEEP_OCEAN_BELOW {
            return BiomeId::DeepOcean;
        }
        if continental < OCEAN_BELOW {
            return BiomeId::Ocean;
        }
        if continental < BEACH_BELOW {
            return BiomeId::Beach;
        }
        let temp = (self.temperature.sample_2d(x, z) + 1.0) * 0.5;
        let humidity = (self.humidity.sample_2d(x, z) + 1.0) * 0.5;
        lookup.lookup(temp as f32, humidity as f32)
    }
}

/// Assigns the built-in presets from climate noise.
///
/// Noise generators are prepared for the seed given at construction; other
/// seeds work but rebuild them per lookup.
#[derive(Debug, Clone)]
pub struct ClimateBiomeSource {
    climate: Climate,
    lookup: BiomeLookup,
    biomes: HashMap<BiomeId, Arc<Biome>>,
    fallback: Arc<Biome>,
}

impl ClimateBiomeSource {
    pub fn new(seed: u64) -> Result<Self, ConfigError> {
        let mut biomes = HashMap::with_capacity(BiomeId::all().len());
        for &id in BiomeId::all() {
            biomes.insert(id, Arc::new(id.build()?));
        }
        let fallback = Arc::new(BiomeId::Plains.build()?);
        Ok(Self {
            climate: Climate::new(seed),
            lookup: BiomeLookup::new(),
            biomes,
            fallback,
        })
    }

    pub fn biome_id_at(&self, seed: u64, x: i32, z: i32) -> BiomeId {
        if seed == self.climate.seed {
            self.climate.classify(&self.lookup, x, z)
        } else {
            Climate::new(seed).classify(&self.lookup, x, z)
        }
    }

    pub fn biome(&self, id: BiomeId) -> Arc<Biome> {
        self.biomes
            .get(&id)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }
}

impl BiomeSource for ClimateBiomeSource {
    fn biome_at(&self, seed: u64, x: i32, z: i32) -> Arc<Biome> {
        self.biome(self.biome_id_at(seed, x, z))
    }

    fn feature_reach(&self) -> u32 {
        self.biomes
            .values()
            .chain(std::iter::once(&self.fallback))
            .map(|biome| biome.feature_reach())
            .max()
            .unwrap_or(0)
    }
}
