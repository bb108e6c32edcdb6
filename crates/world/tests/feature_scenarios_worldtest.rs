//! Feature placement through the chunk pipeline on hand-built biomes.

use std::sync::Arc;

use strata_world::blocks;
use strata_world::{
    generate, Biome, BlendMode, BlockPos, ChunkPos, FeatureEntry, FeatureOutcome,
    FixedBiomeSource, LayeredPalette, PendingAction, PointTester, RandomSource, RecordingSink,
    RegistryKey, TerrainGenerator, TerrainSettings, TubeGenerator, CHUNK_SIZE_X,
    CHUNK_SIZE_Z,
};

fn flat(key: &str, height: f64) -> Biome {
    Biome::new(
        RegistryKey::builtin(key),
        move |_: u64, _: i32, _: i32| height,
        LayeredPalette::new(blocks::GRASS, blocks::DIRT, blocks::STONE),
    )
}

fn settings() -> TerrainSettings {
    TerrainSettings {
        min_y: 0,
        max_y: 200,
        blend: BlendMode::None,
        ..TerrainSettings::default()
    }
}

fn count_blocks(chunk: &strata_world::Chunk, block: u16) -> usize {
    let mut n = 0;
    for z in 0..CHUNK_SIZE_Z {
        for x in 0..CHUNK_SIZE_X {
            for y in 0..=200 {
                if chunk.block(x, y, z) == block {
                    n += 1;
                }
            }
        }
    }
    n
}

#[test]
fn coral_tubes_grow_on_the_sea_floor() {
    let biome = flat("reef", 50.0)
        .with_feature(FeatureEntry::new("tube_coral", TubeGenerator::coral().unwrap(), 1.0).submerged());
    let gen = TerrainGenerator::new(5, Arc::new(FixedBiomeSource::new(biome)), settings());
    let (chunk, report) = gen.generate_chunk(ChunkPos::new(0, 0));

    assert_eq!(report.placed(), 4);
    assert!(report
        .outcomes
        .iter()
        .all(|o| o.feature() == &RegistryKey::builtin("tube_coral")));
    assert!(count_blocks(&chunk, blocks::TUBE_CORAL) > 0);
    for outcome in &report.outcomes {
        let FeatureOutcome::Placed { origin, .. } = outcome else {
            panic!("unexpected {outcome:?}");
        };
        assert_eq!(origin.y, 51);
    }
    // Coral tops out below the surface of the water.
    assert_eq!(chunk.block(0, 64, 0), blocks::WATER);
}

#[test]
fn dry_land_features_do_not_grow_in_the_sea() {
    let biome = flat("reef", 50.0).with_feature(FeatureEntry::new("marker", PointTester::default(), 1.0));
    let gen = TerrainGenerator::new(5, Arc::new(FixedBiomeSource::new(biome)), settings());
    let (chunk, report) = gen.generate_chunk(ChunkPos::new(0, 0));
    assert!(report.outcomes.is_empty());
    assert_eq!(count_blocks(&chunk, blocks::MARKER), 0);
}

#[test]
fn features_spill_into_neighbor_chunks() {
    let tester = PointTester::with_offsets([BlockPos::new(16, 0, 0)]);
    let biome = flat("meadow", 70.0).with_feature(FeatureEntry::new("marker", tester, 1.0));
    let gen = TerrainGenerator::new(9, Arc::new(FixedBiomeSource::new(biome)), settings());
    assert_eq!(gen.feature_margin(), 16);
    let (chunk, report) = gen.generate_chunk(ChunkPos::new(1, 0));

    // Four origins owned by this chunk, four more reaching in from the west.
    assert_eq!(report.outcomes.len(), 4);
    assert_eq!(report.feature_blocks, 8);
    assert_eq!(report.actions.len(), 4);
    assert!(report
        .actions
        .iter()
        .all(|(_, action)| matches!(action, PendingAction::Decorate(_))));
    assert!(count_blocks(&chunk, blocks::MARKER) >= 4);
}

#[test]
fn pipeline_matches_standalone_generation() {
    let tester = PointTester::with_offsets([BlockPos::new(1, 0, 0), BlockPos::new(0, 2, 0)]);
    let mut rng = RandomSource::new(3);
    let output = generate(&tester, &mut rng, BlockPos::new(4, 71, 4)).unwrap();
    let mut sink = RecordingSink::default();
    let failures = output.apply_to(&mut sink);
    assert!(failures.is_empty());
    let written: Vec<_> = sink.placements().map(|p| (p.pos, p.block)).collect();
    assert_eq!(written.len(), 3);
    assert!(written.contains(&(BlockPos::new(4, 71, 4), blocks::MARKER)));
    assert!(written.contains(&(BlockPos::new(5, 71, 4), blocks::MARKER)));
    assert!(written.contains(&(BlockPos::new(4, 73, 4), blocks::MARKER)));

    let biome = flat("meadow", 70.0).with_feature(FeatureEntry::new("marker", tester, 1.0));
    let gen = TerrainGenerator::new(3, Arc::new(FixedBiomeSource::new(biome)), settings());
    let (chunk, report) = gen.generate_chunk(ChunkPos::new(0, 0));
    for outcome in &report.outcomes {
        let FeatureOutcome::Placed { origin, .. } = outcome else {
            panic!("unexpected {outcome:?}");
        };
        let (x, y, z) = chunk.local_of(*origin).unwrap();
        assert_eq!(chunk.block(x, y + 2, z), blocks::MARKER);
    }
}
