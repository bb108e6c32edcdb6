//! Marker feature for checking host adapters: known voxels plus one decorate
//! action, with no randomness involved.

use serde::{Deserialize, Serialize};
use strata_core::{BlockPos, RandomSource, RegistryKey};

use crate::blocks;
use crate::chunk::BlockId;
use crate::error::GenerationError;
use crate::placement::PendingAction;
use crate::scheduler::{Generator, SubGenerator};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointTester {
    pub marker: BlockId,
    /// Extra marker positions relative to the origin.
    pub offsets: Vec<BlockPos>,
    pub decoration: RegistryKey,
}

impl Default for PointTester {
    fn default() -> Self {
        Self {
            marker: blocks::MARKER,
            offsets: Vec::new(),
            decoration: RegistryKey::builtin("point_tester"),
        }
    }
}

impl PointTester {
    pub fn with_offsets(offsets: impl IntoIterator<Item = BlockPos>) -> Self {
        Self {
            offsets: offsets.into_iter().collect(),
            ..Self::default()
        }
    }
}

impl Generator for PointTester {
    fn name(&self) -> &str {
        "point_tester"
    }

    fn build(
        &self,
        ctx: &mut SubGenerator<'_>,
        _rng: &mut RandomSource,
        origin: BlockPos,
    ) -> Result<(), GenerationError> {
        ctx.guard_and_store(origin, self.marker, true);
        for offset in &self.offsets {
            ctx.guard_and_store(origin + *offset, self.marker, false);
        }
        ctx.queue_action(origin, PendingAction::Decorate(self.decoration.clone()));
        Ok(())
    }

    fn reach(&self) -> Option<u32> {
        let far = self
            .offsets
            .iter()
            .map(|o| o.x.unsigned_abs().max(o.z.unsigned_abs()))
            .max()
            .unwrap_or(0);
        Some(far)
    }
}
