//! Property-based tests for chunk seam continuity.
//!
//! A column's height must not depend on which chunk asked for it: the edge
//! columns of two neighbors are compared against a survey spanning both, for
//! every blend mode, seed and chunk coordinate.

use std::sync::Arc;

use proptest::prelude::*;
use strata_world::{
    BlendMode, ChunkPos, ClimateBiomeSource, TerrainGenerator, TerrainSettings, CHUNK_SIZE_X,
    CHUNK_SIZE_Z,
};

fn terrain(seed: u64, blend: BlendMode) -> TerrainGenerator {
    let source = Arc::new(ClimateBiomeSource::new(seed).expect("presets are valid"));
    TerrainGenerator::new(
        seed,
        source,
        TerrainSettings {
            blend,
            features: false,
            ..TerrainSettings::default()
        },
    )
}

fn blend_mode() -> impl Strategy<Value = BlendMode> {
    prop_oneof![
        Just(BlendMode::None),
        Just(BlendMode::Fixed),
        (0u32..6).prop_map(|radius| BlendMode::BiomeAware { radius }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Adjacent chunks along X agree with a joint survey on both sides of the seam.
    #[test]
    fn x_seam_matches_joint_survey(
        world_seed in any::<u64>(),
        chunk_x in -100i32..100i32,
        chunk_z in -100i32..100i32,
        blend in blend_mode(),
    ) {
        let gen = terrain(world_seed, blend);
        let (_, west) = gen.generate_chunk(ChunkPos::new(chunk_x, chunk_z));
        let (_, east) = gen.generate_chunk(ChunkPos::new(chunk_x + 1, chunk_z));
        let (ox, oz) = west.chunk.origin();
        let survey = gen.survey((ox, oz), (2 * CHUNK_SIZE_X, CHUNK_SIZE_Z));

        for z in 0..CHUNK_SIZE_Z {
            let wz = oz + z as i32;
            prop_assert_eq!(Some(west.surface.get(CHUNK_SIZE_X - 1, z)), survey.top(ox + 15, wz));
            prop_assert_eq!(Some(east.surface.get(0, z)), survey.top(ox + 16, wz));
        }
    }

    /// Adjacent chunks along Z agree with a joint survey on both sides of the seam.
    #[test]
    fn z_seam_matches_joint_survey(
        world_seed in any::<u64>(),
        chunk_x in -100i32..100i32,
        chunk_z in -100i32..100i32,
        blend in blend_mode(),
    ) {
        let gen = terrain(world_seed, blend);
        let (_, north) = gen.generate_chunk(ChunkPos::new(chunk_x, chunk_z));
        let (_, south) = gen.generate_chunk(ChunkPos::new(chunk_x, chunk_z + 1));
        let (ox, oz) = north.chunk.origin();
        let survey = gen.survey((ox, oz), (CHUNK_SIZE_X, 2 * CHUNK_SIZE_Z));

        for x in 0..CHUNK_SIZE_X {
            let wx = ox + x as i32;
            prop_assert_eq!(Some(north.surface.get(x, CHUNK_SIZE_Z - 1)), survey.top(wx, oz + 15));
            prop_assert_eq!(Some(south.surface.get(x, 0)), survey.top(wx, oz + 16));
        }
    }

    /// Surfaces stay inside the configured vertical bounds.
    #[test]
    fn surfaces_respect_bounds(
        world_seed in any::<u64>(),
        chunk_x in -1000i32..1000i32,
        chunk_z in -1000i32..1000i32,
    ) {
        let gen = terrain(world_seed, BlendMode::default());
        let (_, report) = gen.generate_chunk(ChunkPos::new(chunk_x, chunk_z));
        let settings = gen.settings();
        prop_assert!(report.surface.min_height() > settings.min_y);
        prop_assert!(report.surface.max_height() <= settings.max_y);
    }
}
