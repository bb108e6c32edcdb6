//! Built-in block ids used by the default palettes and feature presets.
//!
//! Hosts map these to their own block states in the sink adapter.

use crate::chunk::BlockId;

pub use crate::chunk::BLOCK_AIR as AIR;

pub const STONE: BlockId = 1;
pub const DIRT: BlockId = 2;
pub const GRASS: BlockId = 3;
pub const SAND: BlockId = 4;
pub const GRAVEL: BlockId = 5;
pub const WATER: BlockId = 6;
pub const ICE: BlockId = 7;
pub const SNOW: BlockId = 8;
pub const CLAY: BlockId = 9;
pub const BEDROCK: BlockId = 10;

pub const LOG: BlockId = 11;
pub const LEAVES: BlockId = 12;
pub const BIRCH_LOG: BlockId = 13;
pub const BIRCH_LEAVES: BlockId = 14;
pub const PINE_LOG: BlockId = 15;
pub const PINE_LEAVES: BlockId = 16;
pub const VINE: BlockId = 17;
pub const FLOWER: BlockId = 18;

pub const PACKED_ICE: BlockId = 20;
pub const AMETHYST: BlockId = 21;
pub const CALCITE: BlockId = 22;

pub const MUSHROOM_STEM: BlockId = 30;
pub const RED_MUSHROOM_CAP: BlockId = 31;
pub const BROWN_MUSHROOM_CAP: BlockId = 32;
pub const MUSHROOM_SPOT: BlockId = 33;

pub const BRAIN_CORAL: BlockId = 40;
pub const TUBE_CORAL: BlockId = 41;
pub const ROOTS: BlockId = 42;

/// Marker block placed by the point tester.
pub const MARKER: BlockId = 50;

/// True for blocks the column pipeline treats as fluid.
pub fn is_fluid(block: BlockId) -> bool {
    matches!(block, WATER)
}

/// True for blocks that can carry a surface feature.
pub fn is_solid_ground(block: BlockId) -> bool {
    matches!(
        block,
        STONE | DIRT | GRASS | SAND | GRAVEL | SNOW | CLAY | ICE | PACKED_ICE
    )
}
