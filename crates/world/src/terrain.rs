//! Chunk column pipeline: blended heights, palette fill, water, then features.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strata_core::{pack_pos, BlockPos, RandomSource, RegistryKey};
use tracing::{debug, instrument, warn};

use crate::biome::{Biome, BiomeSource, ColumnContext, FeatureEntry, SEA_LEVEL};
use crate::blend::{smooth_fixed, BiomeAwareBlender, BiomeSimilarity, BlendMode, PaddedBiomeGrid, TaggedSimilarity};
use crate::blocks;
use crate::chunk::{Chunk, ChunkPos, CHUNK_SIZE_X, CHUNK_SIZE_Z, WORLD_MAX_Y, WORLD_MIN_Y};
use crate::error::{check_within, ConfigError};
use crate::height::HeightProviderCache;
use crate::heightmap::Heightmap;
use crate::placement::{ChunkWriter, PendingAction};
use crate::scheduler::{ExecutionMode, Scheduler};

const CANDIDATE_SALT: u64 = 0xFEA7_0000;

/// Tunables of the column pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainSettings {
    pub sea_level: i32,
    /// Floor marker height; terrain starts one block above.
    pub min_y: i32,
    pub max_y: i32,
    pub blend: BlendMode,
    pub execution: ExecutionMode,
    pub features: bool,
    /// Side of the jittered feature grid cell.
    pub feature_spacing: u32,
    /// Minimum distance outside the chunk at which feature origins are still
    /// run. The generator widens it to the largest reach its biome source
    /// reports, so this only matters for features that cannot bound their reach.
    pub feature_margin: u32,
}

impl Default for TerrainSettings {
    fn default() -> Self {
        Self {
            sea_level: SEA_LEVEL,
            min_y: WORLD_MIN_Y,
            max_y: WORLD_MAX_Y,
            blend: BlendMode::default(),
            execution: ExecutionMode::Sequential,
            features: true,
            feature_spacing: 8,
            feature_margin: 8,
        }
    }
}

impl TerrainSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        const NAME: &str = "terrain";
        let (lo, hi) = (f64::from(WORLD_MIN_Y), f64::from(WORLD_MAX_Y));
        check_within(NAME, "min_y", f64::from(self.min_y), lo, hi - 1.0, "inside world height")?;
        check_within(
            NAME,
            "max_y",
            f64::from(self.max_y),
            f64::from(self.min_y) + 1.0,
            hi,
            "min_y < max_y <= world top",
        )?;
        check_within(
            NAME,
            "sea_level",
            f64::from(self.sea_level),
            f64::from(self.min_y),
            f64::from(self.max_y),
            "min_y..=max_y",
        )?;
        check_within(NAME, "feature_spacing", f64::from(self.feature_spacing), 1.0, 64.0, "1..=64")?;
        check_within(NAME, "feature_margin", f64::from(self.feature_margin), 0.0, 32.0, "0..=32")?;
        if let ExecutionMode::Parallel { workers } = self.execution {
            check_within(NAME, "execution.workers", workers as f64, 1.0, 256.0, "1..=256")?;
        }
        Ok(())
    }
}

/// Result of one feature attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FeatureOutcome {
    Placed {
        feature: RegistryKey,
        origin: BlockPos,
        /// Blocks written into this chunk.
        written: usize,
        failed_subtasks: usize,
    },
    Skipped {
        feature: RegistryKey,
        origin: BlockPos,
        reason: String,
    },
}

impl FeatureOutcome {
    pub fn feature(&self) -> &RegistryKey {
        match self {
            FeatureOutcome::Placed { feature, .. } | FeatureOutcome::Skipped { feature, .. } => {
                feature
            }
        }
    }

    pub fn is_placed(&self) -> bool {
        matches!(self, FeatureOutcome::Placed { .. })
    }
}

/// What happened while generating one chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkReport {
    pub chunk: ChunkPos,
    /// Terrain top of each column before features.
    pub surface: Heightmap,
    /// Features whose origin lies in this chunk.
    pub outcomes: Vec<FeatureOutcome>,
    /// Feature blocks written, including spill-over from neighbors.
    pub feature_blocks: usize,
    pub actions: Vec<(BlockPos, PendingAction)>,
}

impl ChunkReport {
    fn new(chunk: ChunkPos) -> Self {
        Self {
            chunk,
            surface: Heightmap::filled(0),
            outcomes: Vec::new(),
            feature_blocks: 0,
            actions: Vec::new(),
        }
    }

    pub fn placed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_placed()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.placed()
    }
}

/// Heights and biomes of a rectangle of columns.
pub struct ColumnSurvey {
    pub origin: (i32, i32),
    pub size: (usize, usize),
    pub tops: Vec<i32>,
    pub biomes: Vec<Arc<Biome>>,
}

impl ColumnSurvey {
    fn index(&self, x: i32, z: i32) -> Option<usize> {
        let dx = usize::try_from(x - self.origin.0).ok()?;
        let dz = usize::try_from(z - self.origin.1).ok()?;
        (dx < self.size.0 && dz < self.size.1).then_some(dz * self.size.0 + dx)
    }

    pub fn top(&self, x: i32, z: i32) -> Option<i32> {
        self.index(x, z).map(|i| self.tops[i])
    }

    pub fn biome(&self, x: i32, z: i32) -> Option<&Arc<Biome>> {
        self.index(x, z).map(|i| &self.biomes[i])
    }
}

/// Fills chunks from a biome source. `Send + Sync`; chunks may be generated
/// from any thread against the same height provider cache.
pub struct TerrainGenerator {
    seed: u64,
    biome_source: Arc<dyn BiomeSource>,
    cache: Arc<HeightProviderCache>,
    similarity: Arc<dyn BiomeSimilarity>,
    settings: TerrainSettings,
    feature_margin: u32,
}

impl TerrainGenerator {
    pub fn new(seed: u64, biome_source: Arc<dyn BiomeSource>, settings: TerrainSettings) -> Self {
        let cache = Arc::new(HeightProviderCache::new(
            seed,
            (settings.min_y + 1, settings.max_y),
        ));
        let reach = biome_source.feature_reach();
        let feature_margin = settings.feature_margin.max(reach);
        if feature_margin > settings.feature_margin {
            debug!(
                configured = settings.feature_margin,
                feature_margin, "feature margin widened to cover feature reach"
            );
        }
        Self {
            seed,
            biome_source,
            cache,
            similarity: Arc::new(TaggedSimilarity::default()),
            settings,
            feature_margin,
        }
    }

    /// Share a provider cache with other generators of the same world.
    pub fn with_cache(mut self, cache: Arc<HeightProviderCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_similarity(mut self, similarity: Arc<dyn BiomeSimilarity>) -> Self {
        self.similarity = similarity;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn settings(&self) -> &TerrainSettings {
        &self.settings
    }

    pub fn cache(&self) -> &Arc<HeightProviderCache> {
        &self.cache
    }

    /// Distance outside a chunk at which feature origins are evaluated.
    pub fn feature_margin(&self) -> u32 {
        self.feature_margin
    }

    /// Resolve biomes and clamped tops for a rectangle of columns.
    pub fn survey(&self, origin: (i32, i32), size: (usize, usize)) -> ColumnSurvey {
        let grid = PaddedBiomeGrid::new(
            self.biome_source.as_ref(),
            self.seed,
            origin,
            size,
            self.settings.blend.padding(),
        );
        let mut biomes = Vec::with_capacity(size.0 * size.1);
        for dz in 0..size.1 {
            for dx in 0..size.0 {
                let (x, z) = (origin.0 + dx as i32, origin.1 + dz as i32);
                let biome = match grid.get(x, z) {
                    Some(biome) => Arc::clone(biome),
                    None => self.biome_source.biome_at(self.seed, x, z),
                };
                biomes.push(biome);
            }
        }

        let raw = match self.settings.blend {
            BlendMode::BiomeAware { radius } => {
                BiomeAwareBlender::with_similarity(radius, Arc::clone(&self.similarity))
                    .blend_with_grid(&self.cache, &grid, origin, size)
            }
            BlendMode::Fixed => self.columns(origin, size, &biomes, |provider, x, z| {
                let local_x = x.rem_euclid(CHUNK_SIZE_X as i32) as usize;
                let local_z = z.rem_euclid(CHUNK_SIZE_Z as i32) as usize;
                smooth_fixed(provider, ChunkPos::from_world(x, z), local_x, local_z)
            }),
            BlendMode::None => {
                self.columns(origin, size, &biomes, |provider, x, z| provider.height_at(x, z))
            }
        };
        let tops = raw
            .into_iter()
            .map(|h| h.clamp(self.settings.min_y + 1, self.settings.max_y))
            .collect();
        ColumnSurvey {
            origin,
            size,
            tops,
            biomes,
        }
    }

    fn columns(
        &self,
        origin: (i32, i32),
        size: (usize, usize),
        biomes: &[Arc<Biome>],
        height: impl Fn(&crate::height::ChunkHeightProvider, i32, i32) -> i32,
    ) -> Vec<i32> {
        let mut out = Vec::with_capacity(biomes.len());
        for dz in 0..size.1 {
            for dx in 0..size.0 {
                let biome = &biomes[dz * size.0 + dx];
                let provider = self.cache.provider(biome);
                out.push(height(&provider, origin.0 + dx as i32, origin.1 + dz as i32));
            }
        }
        out
    }

    /// Generate one chunk: terrain columns, then declared features.
    #[instrument(skip(self), fields(chunk = %pos, seed = self.seed))]
    pub fn generate_chunk(&self, pos: ChunkPos) -> (Chunk, ChunkReport) {
        debug!("starting terrain generation");
        let margin = if self.settings.features {
            self.feature_margin as i32
        } else {
            0
        };
        let (ox, oz) = pos.origin();
        let survey = self.survey(
            (ox - margin, oz - margin),
            (
                CHUNK_SIZE_X + 2 * margin as usize,
                CHUNK_SIZE_Z + 2 * margin as usize,
            ),
        );

        let mut chunk = Chunk::new(pos);
        let mut report = ChunkReport::new(pos);
        for local_z in 0..CHUNK_SIZE_Z {
            for local_x in 0..CHUNK_SIZE_X {
                let (x, z) = (ox + local_x as i32, oz + local_z as i32);
                if let (Some(top), Some(biome)) = (survey.top(x, z), survey.biome(x, z)) {
                    self.fill_column(&mut chunk, local_x, local_z, top, biome);
                    report.surface.set(local_x, local_z, top);
                }
            }
        }

        if self.settings.features {
            self.place_features(&mut chunk, &survey, &mut report);
        }
        debug!(
            placed = report.placed(),
            skipped = report.skipped(),
            feature_blocks = report.feature_blocks,
            "terrain generation complete"
        );
        (chunk, report)
    }

    fn fill_column(&self, chunk: &mut Chunk, x: usize, z: usize, top: i32, biome: &Biome) {
        let sea_level = self.settings.sea_level;
        chunk.set_block(x, self.settings.min_y, z, blocks::BEDROCK);
        for y in (self.settings.min_y + 1)..=top {
            let block = biome.palette.block_at(&ColumnContext::new(y, top, sea_level));
            chunk.set_block(x, y, z, block);
        }
        chunk.set_biome(x, z, biome.key.clone());
        for y in (top + 1)..=sea_level {
            if chunk.block(x, y, z) == blocks::AIR {
                chunk.set_block(x, y, z, blocks::WATER);
            }
        }
    }

    /// Jittered-grid candidates over the surveyed area; at most one feature per candidate.
    fn place_features(&self, chunk: &mut Chunk, survey: &ColumnSurvey, report: &mut ChunkReport) {
        let spacing = self.settings.feature_spacing.max(1) as i32;
        let (rx, rz) = survey.origin;
        let (w, d) = (survey.size.0 as i32, survey.size.1 as i32);
        let root = RandomSource::new(self.seed);
        let mut scheduler = Scheduler::new(self.settings.execution);

        for cz in rz.div_euclid(spacing)..=(rz + d - 1).div_euclid(spacing) {
            for cx in rx.div_euclid(spacing)..=(rx + w - 1).div_euclid(spacing) {
                let mut cell = root.fork(pack_pos(BlockPos::new(cx, 0, cz)) ^ CANDIDATE_SALT);
                let x = cx * spacing + cell.next_int(0, spacing);
                let z = cz * spacing + cell.next_int(0, spacing);
                let (Some(top), Some(biome)) = (survey.top(x, z), survey.biome(x, z)) else {
                    continue;
                };
                let submerged = top < self.settings.sea_level;
                let mut rng = root.fork(pack_pos(BlockPos::new(x, 0, z)));
                let Some(entry) = biome
                    .features
                    .iter()
                    .filter(|entry| entry.submerged == submerged)
                    .find(|entry| rng.chance(entry.chance))
                else {
                    continue;
                };
                let origin = BlockPos::new(x, top + 1, z);
                let owned = ChunkPos::from_world(x, z) == chunk.position();
                let outcome = self.run_feature(&mut scheduler, chunk, entry, rng, origin, report);
                if owned {
                    if let FeatureOutcome::Skipped { reason, .. } = &outcome {
                        warn!(chunk = %chunk.position(), feature = %entry.key, ?origin, %reason, "feature skipped");
                    }
                    report.outcomes.push(outcome);
                }
            }
        }
    }

    fn run_feature(
        &self,
        scheduler: &mut Scheduler,
        chunk: &mut Chunk,
        entry: &FeatureEntry,
        mut rng: RandomSource,
        origin: BlockPos,
        report: &mut ChunkReport,
    ) -> FeatureOutcome {
        if origin.y > self.settings.max_y {
            return FeatureOutcome::Skipped {
                feature: entry.key.clone(),
                origin,
                reason: "origin above the world height limit".to_string(),
            };
        }
        match scheduler.run(entry.generator.as_ref(), &mut rng, origin) {
            Ok(output) => {
                let mut writer = ChunkWriter::new(chunk);
                let failures = output.apply_to(&mut writer);
                report.feature_blocks += writer.written;
                report.actions.append(&mut writer.actions);
                FeatureOutcome::Placed {
                    feature: entry.key.clone(),
                    origin,
                    written: writer.written,
                    failed_subtasks: failures.len(),
                }
            }
            Err(error) => FeatureOutcome::Skipped {
                feature: entry.key.clone(),
                origin,
                reason: error.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biome::{BiomeId, ClimateBiomeSource, FixedBiomeSource, LayeredPalette};
    use crate::error::GenerationError;
    use crate::point_tester::PointTester;
    use crate::scheduler::{Generator, SubGenerator};

    fn flat_biome(height: f64) -> Biome {
        Biome::new(
            RegistryKey::builtin("flatland"),
            move |_: u64, _: i32, _: i32| height,
            LayeredPalette::new(blocks::GRASS, blocks::DIRT, blocks::STONE),
        )
    }

    fn flat_settings() -> TerrainSettings {
        TerrainSettings {
            min_y: 0,
            max_y: 200,
            features: false,
            ..TerrainSettings::default()
        }
    }

    struct AlwaysFails;

    impl Generator for AlwaysFails {
        fn name(&self) -> &str {
            "always_fails"
        }

        fn build(
            &self,
            _ctx: &mut SubGenerator<'_>,
            _rng: &mut RandomSource,
            origin: BlockPos,
        ) -> Result<(), GenerationError> {
            Err(GenerationError::InvalidOrigin(format!("{origin:?}")))
        }
    }

    #[test]
    fn columns_are_filled_in_order() {
        let source = Arc::new(FixedBiomeSource::new(flat_biome(70.0)));
        let gen = TerrainGenerator::new(1, source, flat_settings());
        let (chunk, report) = gen.generate_chunk(ChunkPos::new(0, 0));

        assert_eq!(chunk.block(3, 0, 3), blocks::BEDROCK);
        assert_eq!(chunk.block(3, 1, 3), blocks::STONE);
        assert_eq!(chunk.block(3, 68, 3), blocks::DIRT);
        assert_eq!(chunk.block(3, 70, 3), blocks::GRASS);
        assert_eq!(chunk.block(3, 71, 3), blocks::AIR);
        assert_eq!(chunk.biome(3, 3), Some(&RegistryKey::builtin("flatland")));
        assert_eq!(report.surface, Heightmap::filled(70));
        assert!(report.outcomes.is_empty());
    }

    #[test]
    fn water_fills_up_to_sea_level() {
        let source = Arc::new(FixedBiomeSource::new(flat_biome(50.0)));
        let gen = TerrainGenerator::new(1, source, flat_settings());
        let (chunk, _) = gen.generate_chunk(ChunkPos::new(2, -1));
        assert_eq!(chunk.block(0, 50, 0), blocks::GRASS);
        assert_eq!(chunk.block(0, 51, 0), blocks::WATER);
        assert_eq!(chunk.block(0, SEA_LEVEL, 0), blocks::WATER);
        assert_eq!(chunk.block(0, SEA_LEVEL + 1, 0), blocks::AIR);
    }

    #[test]
    fn heights_are_clamped_to_bounds() {
        let source = Arc::new(FixedBiomeSource::new(flat_biome(5000.0)));
        let gen = TerrainGenerator::new(1, source, flat_settings());
        let (chunk, _) = gen.generate_chunk(ChunkPos::new(0, 0));
        assert_eq!(chunk.highest_matching(0, 0, |b| b != blocks::AIR), Some(200));

        let low = Arc::new(FixedBiomeSource::new(flat_biome(-5000.0)));
        let gen = TerrainGenerator::new(1, low, flat_settings());
        let (chunk, _) = gen.generate_chunk(ChunkPos::new(0, 0));
        assert_eq!(chunk.block(0, 1, 0), blocks::GRASS);
    }

    #[test]
    fn features_run_at_the_first_air_block() {
        let biome = flat_biome(70.0).with_feature(FeatureEntry::new("marker", PointTester::default(), 1.0));
        let gen = TerrainGenerator::new(
            3,
            Arc::new(FixedBiomeSource::new(biome)),
            TerrainSettings {
                features: true,
                ..flat_settings()
            },
        );
        let (chunk, report) = gen.generate_chunk(ChunkPos::new(0, 0));
        // Spacing 8 gives exactly four candidate cells owned by the chunk.
        assert_eq!(report.outcomes.len(), 4);
        assert_eq!(report.placed(), 4);
        for outcome in &report.outcomes {
            let FeatureOutcome::Placed { origin, written, .. } = outcome else {
                panic!("unexpected {outcome:?}");
            };
            assert_eq!(origin.y, 71);
            assert_eq!(*written, 1);
            let (x, _, z) = chunk.local_of(*origin).unwrap();
            assert_eq!(chunk.block(x, 71, z), blocks::MARKER);
        }
        assert_eq!(report.actions.len(), 4);
    }

    #[test]
    fn failing_features_are_skipped_not_fatal() {
        let biome = flat_biome(70.0).with_feature(FeatureEntry::new("broken", AlwaysFails, 1.0));
        let gen = TerrainGenerator::new(
            3,
            Arc::new(FixedBiomeSource::new(biome)),
            TerrainSettings {
                features: true,
                ..flat_settings()
            },
        );
        let (chunk, report) = gen.generate_chunk(ChunkPos::new(0, 0));
        assert_eq!(report.skipped(), 4);
        assert!(report
            .outcomes
            .iter()
            .all(|o| o.feature() == &RegistryKey::builtin("broken")));
        assert_eq!(chunk.block(8, 70, 8), blocks::GRASS);
    }

    #[test]
    fn submerged_features_stay_under_water() {
        let biome = flat_biome(70.0).with_feature(FeatureEntry::new("coral", PointTester::default(), 1.0).submerged());
        let gen = TerrainGenerator::new(
            3,
            Arc::new(FixedBiomeSource::new(biome)),
            TerrainSettings {
                features: true,
                ..flat_settings()
            },
        );
        let (_, report) = gen.generate_chunk(ChunkPos::new(0, 0));
        assert!(report.outcomes.is_empty());
    }

    #[test]
    fn chunks_are_deterministic() {
        let source = Arc::new(ClimateBiomeSource::new(42).unwrap());
        let a = TerrainGenerator::new(42, source.clone(), TerrainSettings::default());
        let b = TerrainGenerator::new(42, source, TerrainSettings::default());
        let pos = ChunkPos::new(3, -2);
        let (chunk_a, report_a) = a.generate_chunk(pos);
        let (chunk_b, report_b) = b.generate_chunk(pos);
        assert_eq!(report_a, report_b);
        for z in 0..CHUNK_SIZE_Z {
            for x in 0..CHUNK_SIZE_X {
                for y in WORLD_MIN_Y..=WORLD_MAX_Y {
                    assert_eq!(chunk_a.block(x, y, z), chunk_b.block(x, y, z));
                }
            }
        }
    }

    #[test]
    fn settings_validation() {
        assert!(TerrainSettings::default().validate().is_ok());
        let inverted = TerrainSettings {
            min_y: 100,
            max_y: 50,
            ..TerrainSettings::default()
        };
        assert!(inverted.validate().is_err());
        let no_workers = TerrainSettings {
            execution: ExecutionMode::Parallel { workers: 0 },
            ..TerrainSettings::default()
        };
        assert!(no_workers.validate().is_err());
    }

    #[test]
    fn preset_biomes_produce_a_surface() {
        let source = Arc::new(FixedBiomeSource::new(BiomeId::Forest.build().unwrap()));
        let gen = TerrainGenerator::new(8, source, TerrainSettings::default());
        let (chunk, _) = gen.generate_chunk(ChunkPos::new(0, 0));
        let top = chunk.highest_matching(8, 8, blocks::is_solid_ground);
        assert!(top.is_some());
    }
}
