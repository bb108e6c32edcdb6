#![warn(missing_docs)]
//! Core primitives shared across the workspace: deterministic randomness,
//! vector math aliases, packed block positions and registry keys.

pub mod math;
pub mod registry;
pub mod rng;

pub use math::{pack_pos, to_block_pos, unpack_pos, BlockPos, Vec3};
pub use registry::{RegistryKey, RegistryKeyError, DEFAULT_NAMESPACE};
pub use rng::RandomSource;
