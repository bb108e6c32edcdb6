//! Voxel world generation: chunk terrain, biome blending, and recursive
//! feature generators that write through a guarded placement buffer.

pub mod biome;
pub mod blend;
pub mod blocks;
pub mod branch_tree;
mod chunk;
pub mod crystal;
pub mod curve;
mod error;
pub mod height;
mod heightmap;
pub mod mushroom;
pub mod noise;
pub mod path;
mod placement;
mod point_tester;
mod scheduler;
pub mod terrain;
pub mod tree;
pub mod tube;

pub use biome::{
    Biome, BiomeId, BiomeSource, BiomeTags, BlockPalette, ClimateBiomeSource, FeatureEntry,
    FixedBiomeSource, HeightSampler, LayeredPalette, NoiseHeightSampler, SEA_LEVEL,
};
pub use blend::{BiomeAwareBlender, BiomeSimilarity, BlendMode, TaggedSimilarity};
pub use branch_tree::{BranchTreeBuilder, BranchTreeGenerator};
pub use chunk::*;
pub use crystal::{CrystalBuilder, CrystalGenerator};
pub use curve::{Profile, SharedProfile};
pub use error::{ConfigError, GenerationError};
pub use height::{ChunkHeightProvider, HeightProviderCache};
pub use heightmap::{max_seam_step, Heightmap, Seam};
pub use mushroom::{MushroomBuilder, MushroomGenerator};
pub use placement::*;
pub use point_tester::PointTester;
pub use scheduler::*;
pub use terrain::{ChunkReport, FeatureOutcome, TerrainGenerator, TerrainSettings};
pub use tree::{TreeBuilder, TreeGenerator};
pub use tube::{TubeBuilder, TubeGenerator};

pub use strata_core::{BlockPos, RandomSource, RegistryKey, Vec3};
