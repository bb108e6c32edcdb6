//! Placement guard buffer.
//!
//! Generators never write to the world directly. They propose writes into a
//! [`PlacementBuffer`], which resolves overlaps and hands one ordered batch to
//! a [`VoxelSink`] when the run flushes.
//!
//! Guarding is advisory: reading a position nobody wrote returns air, and a
//! write without override permission onto an occupied position is dropped.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strata_core::{pack_pos, BlockPos, RegistryKey, Vec3};
use tracing::trace;

use crate::chunk::{BlockId, Chunk, BLOCK_AIR};

/// A proposed voxel write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPlacement {
    pub pos: BlockPos,
    pub block: BlockId,
    /// Whether this write was allowed to replace an earlier one.
    pub overridable: bool,
}

/// Deferred per-position work handed to the host with the placements.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PendingAction {
    /// Run a host decorator at this position once the world exists.
    Decorate(RegistryKey),
    /// Ask the host to tick the block here after placement.
    ScheduleTick { delay: u32 },
}

/// Shape used when stamping a radius.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stamp {
    #[default]
    Sphere,
    /// Horizontal disc, one voxel tall.
    Disc,
}

/// Voxels covered by a stamp of `radius` around `center`, in a fixed y/z/x order.
///
/// Radii below 0.5 (or non-finite) cover the center voxel only.
pub fn stamp_cells(center: BlockPos, radius: f64, stamp: Stamp) -> Vec<BlockPos> {
    if !radius.is_finite() || radius < 0.5 {
        return vec![center];
    }
    let reach = radius.ceil() as i32;
    let limit = radius * radius + 0.25;
    let vertical = match stamp {
        Stamp::Sphere => reach,
        Stamp::Disc => 0,
    };
    let mut cells = Vec::new();
    for dy in -vertical..=vertical {
        for dz in -reach..=reach {
            for dx in -reach..=reach {
                if ((dx * dx + dy * dy + dz * dz) as f64) <= limit {
                    cells.push(center + BlockPos::new(dx, dy, dz));
                }
            }
        }
    }
    cells
}

/// Final output of a generation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlacementBatch {
    pub placements: Vec<BlockPlacement>,
    pub actions: Vec<(BlockPos, PendingAction)>,
}

impl PlacementBatch {
    pub fn is_empty(&self) -> bool {
        self.placements.is_empty() && self.actions.is_empty()
    }

    /// Bounding box of all placements as `(min, max)`.
    pub fn bounds(&self) -> Option<(BlockPos, BlockPos)> {
        let mut iter = self.placements.iter();
        let first = iter.next()?.pos;
        Some(iter.fold((first, first), |(lo, hi), p| {
            (lo.min(p.pos), hi.max(p.pos))
        }))
    }
}

/// Conflict-aware accumulator of proposed writes for one generation run.
#[derive(Debug, Clone, Default)]
pub struct PlacementBuffer {
    slots: Vec<Option<BlockPlacement>>,
    index: HashMap<u64, usize>,
    actions: HashMap<u64, (BlockPos, PendingAction)>,
    live: usize,
}

impl PlacementBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffered placements.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0 && self.actions.is_empty()
    }

    /// Store `block` at `pos` unless the position is taken and `allow_override` is false.
    ///
    /// Returns true when the buffer now holds this write.
    pub fn guard_and_store(&mut self, pos: BlockPos, block: BlockId, allow_override: bool) -> bool {
        let key = pack_pos(pos);
        match self.index.get(&key) {
            Some(&slot) => {
                if !allow_override {
                    return false;
                }
                self.slots[slot] = Some(BlockPlacement {
                    pos,
                    block,
                    overridable: true,
                });
                true
            }
            None => {
                self.index.insert(key, self.slots.len());
                self.slots.push(Some(BlockPlacement {
                    pos,
                    block,
                    overridable: allow_override,
                }));
                self.live += 1;
                true
            }
        }
    }

    /// Stamp a filled sphere or disc of `radius` around `center`, guarding each voxel.
    ///
    /// Radii below 0.5 stamp the center voxel only. Returns the number of voxels stored.
    pub fn guard_and_store_radius(
        &mut self,
        center: BlockPos,
        block: BlockId,
        allow_override: bool,
        radius: f64,
        stamp: Stamp,
    ) -> usize {
        stamp_cells(center, radius, stamp)
            .into_iter()
            .filter(|&pos| self.guard_and_store(pos, block, allow_override))
            .count()
    }

    /// Stamp around a floating-point center.
    pub fn stamp_at(
        &mut self,
        center: Vec3,
        block: BlockId,
        allow_override: bool,
        radius: f64,
        stamp: Stamp,
    ) -> usize {
        self.guard_and_store_radius(
            strata_core::to_block_pos(center),
            block,
            allow_override,
            radius,
            stamp,
        )
    }

    /// Drop any buffered placement at `pos`.
    pub fn remove_at(&mut self, pos: BlockPos) -> Option<BlockPlacement> {
        let slot = self.index.remove(&pack_pos(pos))?;
        let removed = self.slots[slot].take();
        if removed.is_some() {
            self.live -= 1;
        }
        removed
    }

    /// Buffered material at `pos`, or air when nothing is queued.
    pub fn queued_state(&self, pos: BlockPos) -> BlockId {
        self.get(pos).map(|p| p.block).unwrap_or(BLOCK_AIR)
    }

    /// Buffered placement at `pos`.
    pub fn get(&self, pos: BlockPos) -> Option<&BlockPlacement> {
        self.index
            .get(&pack_pos(pos))
            .and_then(|&slot| self.slots[slot].as_ref())
    }

    pub fn contains(&self, pos: BlockPos) -> bool {
        self.index.contains_key(&pack_pos(pos))
    }

    /// Queue a deferred action. The first action queued at a position is kept.
    pub fn queue_action(&mut self, pos: BlockPos, action: PendingAction) -> bool {
        let key = pack_pos(pos);
        if self.actions.contains_key(&key) {
            return false;
        }
        self.actions.insert(key, (pos, action));
        true
    }

    pub fn action_at(&self, pos: BlockPos) -> Option<&PendingAction> {
        self.actions.get(&pack_pos(pos)).map(|(_, a)| a)
    }

    /// Buffered placements in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &BlockPlacement> {
        self.slots.iter().flatten()
    }

    /// Remove and return every placement matching `pred`, in insertion order.
    pub fn take_where(&mut self, mut pred: impl FnMut(&BlockPlacement) -> bool) -> Vec<BlockPlacement> {
        let mut taken = Vec::new();
        for slot in self.slots.iter_mut() {
            if slot.as_ref().is_some_and(&mut pred) {
                if let Some(placement) = slot.take() {
                    self.index.remove(&pack_pos(placement.pos));
                    taken.push(placement);
                }
            }
        }
        self.live -= taken.len();
        taken
    }

    /// Replay another buffer's writes and actions into this one, in its order.
    pub fn merge(&mut self, other: PlacementBuffer) {
        let PlacementBuffer { slots, actions, .. } = other;
        for placement in slots.into_iter().flatten() {
            self.guard_and_store(placement.pos, placement.block, placement.overridable);
        }
        let mut actions: Vec<_> = actions.into_iter().collect();
        actions.sort_unstable_by_key(|(key, _)| *key);
        for (_, (pos, action)) in actions {
            self.queue_action(pos, action);
        }
    }

    /// Consume the buffer into the final ordered batch.
    pub fn flush(self) -> PlacementBatch {
        let placements: Vec<BlockPlacement> = self.slots.into_iter().flatten().collect();
        let mut keyed: Vec<_> = self.actions.into_iter().collect();
        keyed.sort_unstable_by_key(|(key, _)| *key);
        trace!(
            placements = placements.len(),
            actions = keyed.len(),
            "flushed placement buffer"
        );
        PlacementBatch {
            placements,
            actions: keyed.into_iter().map(|(_, entry)| entry).collect(),
        }
    }
}

/// Anything generators can stamp voxels into.
///
/// Implemented by the raw [`PlacementBuffer`] and by the scheduler's task context.
pub trait PlacementTarget {
    fn place(&mut self, pos: BlockPos, block: BlockId, allow_override: bool) -> bool;

    fn occupant(&self, pos: BlockPos) -> BlockId;

    fn stamp(
        &mut self,
        center: BlockPos,
        block: BlockId,
        allow_override: bool,
        radius: f64,
        stamp: Stamp,
    ) -> usize {
        stamp_cells(center, radius, stamp)
            .into_iter()
            .filter(|&pos| self.place(pos, block, allow_override))
            .count()
    }
}

impl PlacementTarget for PlacementBuffer {
    fn place(&mut self, pos: BlockPos, block: BlockId, allow_override: bool) -> bool {
        self.guard_and_store(pos, block, allow_override)
    }

    fn occupant(&self, pos: BlockPos) -> BlockId {
        self.queued_state(pos)
    }
}

/// Receives the final batch and performs the host-world mutation.
pub trait VoxelSink {
    fn apply(&mut self, batch: PlacementBatch);
}

/// Sink that keeps every batch it receives, for tests and previews.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub batches: Vec<PlacementBatch>,
}

impl RecordingSink {
    /// All placements across received batches.
    pub fn placements(&self) -> impl Iterator<Item = &BlockPlacement> {
        self.batches.iter().flat_map(|b| b.placements.iter())
    }
}

impl VoxelSink for RecordingSink {
    fn apply(&mut self, batch: PlacementBatch) {
        self.batches.push(batch);
    }
}

/// Writes the part of a batch that falls inside one chunk.
///
/// Placements outside the chunk are dropped; actions inside it are kept for the host.
pub struct ChunkWriter<'a> {
    chunk: &'a mut Chunk,
    pub written: usize,
    pub clipped: usize,
    pub actions: Vec<(BlockPos, PendingAction)>,
}

impl<'a> ChunkWriter<'a> {
    pub fn new(chunk: &'a mut Chunk) -> Self {
        Self {
            chunk,
            written: 0,
            clipped: 0,
            actions: Vec::new(),
        }
    }
}

impl VoxelSink for ChunkWriter<'_> {
    fn apply(&mut self, batch: PlacementBatch) {
        for placement in batch.placements {
            match self.chunk.local_of(placement.pos) {
                Some((x, y, z)) => {
                    self.chunk.set_block(x, y, z, placement.block);
                    self.written += 1;
                }
                None => self.clipped += 1,
            }
        }
        for (pos, action) in batch.actions {
            if self.chunk.local_of(pos).is_some() {
                self.actions.push((pos, action));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkPos;

    const LOG: BlockId = 11;
    const LEAVES: BlockId = 12;

    #[test]
    fn guard_keeps_existing_without_override() {
        let mut buffer = PlacementBuffer::new();
        let pos = BlockPos::new(1, 2, 3);
        assert!(buffer.guard_and_store(pos, LOG, false));
        assert!(!buffer.guard_and_store(pos, LEAVES, false));
        assert_eq!(buffer.queued_state(pos), LOG);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn guard_is_idempotent() {
        let mut buffer = PlacementBuffer::new();
        let pos = BlockPos::new(0, 0, 0);
        buffer.guard_and_store(pos, LOG, false);
        let before: Vec<_> = buffer.iter().copied().collect();
        buffer.guard_and_store(pos, LOG, false);
        let after: Vec<_> = buffer.iter().copied().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn override_replaces_in_place() {
        let mut buffer = PlacementBuffer::new();
        buffer.guard_and_store(BlockPos::new(0, 0, 0), LEAVES, false);
        buffer.guard_and_store(BlockPos::new(1, 0, 0), LEAVES, false);
        assert!(buffer.guard_and_store(BlockPos::new(0, 0, 0), LOG, true));
        let batch = buffer.flush();
        assert_eq!(batch.placements.len(), 2);
        assert_eq!(batch.placements[0].pos, BlockPos::new(0, 0, 0));
        assert_eq!(batch.placements[0].block, LOG);
    }

    #[test]
    fn missing_position_reads_as_air() {
        let buffer = PlacementBuffer::new();
        assert_eq!(buffer.queued_state(BlockPos::new(9, 9, 9)), BLOCK_AIR);
    }

    #[test]
    fn remove_then_store_again() {
        let mut buffer = PlacementBuffer::new();
        let pos = BlockPos::new(4, 4, 4);
        buffer.guard_and_store(pos, LOG, false);
        assert!(buffer.remove_at(pos).is_some());
        assert!(buffer.remove_at(pos).is_none());
        assert_eq!(buffer.queued_state(pos), BLOCK_AIR);
        assert!(buffer.guard_and_store(pos, LEAVES, false));
        assert_eq!(buffer.flush().placements.len(), 1);
    }

    #[test]
    fn sphere_stamp_is_symmetric() {
        let mut buffer = PlacementBuffer::new();
        let stored = buffer.guard_and_store_radius(BlockPos::ZERO, LEAVES, false, 1.0, Stamp::Sphere);
        // Center plus six face neighbors.
        assert_eq!(stored, 7);
        assert!(buffer.contains(BlockPos::new(0, -1, 0)));
        assert!(!buffer.contains(BlockPos::new(1, 1, 0)));
    }

    #[test]
    fn disc_stamp_is_flat() {
        let mut buffer = PlacementBuffer::new();
        buffer.guard_and_store_radius(BlockPos::ZERO, LEAVES, false, 2.0, Stamp::Disc);
        assert!(buffer.iter().all(|p| p.pos.y == 0));
        assert!(buffer.contains(BlockPos::new(2, 0, 0)));
        assert!(buffer.contains(BlockPos::new(1, 0, 1)));
    }

    #[test]
    fn tiny_radius_stamps_single_voxel() {
        let mut buffer = PlacementBuffer::new();
        assert_eq!(
            buffer.guard_and_store_radius(BlockPos::ZERO, LOG, false, 0.2, Stamp::Sphere),
            1
        );
        assert_eq!(
            buffer.guard_and_store_radius(BlockPos::X, LOG, false, f64::NAN, Stamp::Sphere),
            1
        );
    }

    #[test]
    fn actions_are_append_only_and_sorted() {
        let mut buffer = PlacementBuffer::new();
        let key = RegistryKey::builtin("glow");
        assert!(buffer.queue_action(BlockPos::new(5, 0, 0), PendingAction::ScheduleTick { delay: 2 }));
        assert!(buffer.queue_action(BlockPos::new(-5, 0, 0), PendingAction::Decorate(key.clone())));
        assert!(!buffer.queue_action(BlockPos::new(5, 0, 0), PendingAction::Decorate(key)));
        let batch = buffer.flush();
        assert_eq!(batch.actions.len(), 2);
        assert_eq!(
            batch.actions.iter().find(|(p, _)| *p == BlockPos::new(5, 0, 0)).map(|(_, a)| a),
            Some(&PendingAction::ScheduleTick { delay: 2 })
        );
    }

    #[test]
    fn take_where_moves_placements_out() {
        let mut buffer = PlacementBuffer::new();
        for y in 0..6 {
            buffer.guard_and_store(BlockPos::new(0, y, 0), LOG, false);
        }
        let upper = buffer.take_where(|p| p.pos.y >= 3);
        assert_eq!(upper.len(), 3);
        assert_eq!(buffer.len(), 3);
        assert!(!buffer.contains(BlockPos::new(0, 4, 0)));
    }

    #[test]
    fn merge_respects_override_flags() {
        let mut base = PlacementBuffer::new();
        base.guard_and_store(BlockPos::ZERO, LOG, false);

        let mut soft = PlacementBuffer::new();
        soft.guard_and_store(BlockPos::ZERO, LEAVES, false);
        soft.guard_and_store(BlockPos::Y, LEAVES, false);
        base.merge(soft);
        assert_eq!(base.queued_state(BlockPos::ZERO), LOG);
        assert_eq!(base.queued_state(BlockPos::Y), LEAVES);

        let mut hard = PlacementBuffer::new();
        hard.guard_and_store(BlockPos::ZERO, LEAVES, true);
        base.merge(hard);
        assert_eq!(base.queued_state(BlockPos::ZERO), LEAVES);
    }

    #[test]
    fn chunk_writer_clips_to_chunk() {
        let mut chunk = Chunk::new(ChunkPos::new(0, 0));
        let mut buffer = PlacementBuffer::new();
        buffer.guard_and_store(BlockPos::new(15, 70, 15), LOG, false);
        buffer.guard_and_store(BlockPos::new(16, 70, 15), LOG, false);
        buffer.queue_action(BlockPos::new(16, 70, 0), PendingAction::ScheduleTick { delay: 1 });

        let mut writer = ChunkWriter::new(&mut chunk);
        writer.apply(buffer.flush());
        assert_eq!(writer.written, 1);
        assert_eq!(writer.clipped, 1);
        assert!(writer.actions.is_empty());
        assert_eq!(chunk.block(15, 70, 15), LOG);
    }

    #[test]
    fn batch_bounds() {
        let mut buffer = PlacementBuffer::new();
        buffer.guard_and_store(BlockPos::new(-2, 5, 1), LOG, false);
        buffer.guard_and_store(BlockPos::new(3, 0, -4), LOG, false);
        let batch = buffer.flush();
        assert_eq!(
            batch.bounds(),
            Some((BlockPos::new(-2, 0, -4), BlockPos::new(3, 5, 1)))
        );
        assert_eq!(PlacementBatch::default().bounds(), None);
    }
}
