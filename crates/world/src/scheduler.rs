//! Recursive generation pipeline.
//!
//! A [`Generator`] body writes into a [`SubGenerator`] and may submit child
//! work. Ordinary subtasks are drained in waves: every task in a wave reads the
//! same merged snapshot, writes only to its own buffer, and is merged back in
//! submission order. Finalising subtasks run one at a time after the ordinary
//! queue is empty, so a leaf pass always sees the finished skeleton.
//!
//! Because no task observes a sibling's in-flight buffer, a wave may be spread
//! across worker threads without changing the output.

use std::collections::{HashSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};
use strata_core::{pack_pos, BlockPos, RandomSource};
use tracing::{debug, trace, warn};

use crate::chunk::{BlockId, BLOCK_AIR};
use crate::error::GenerationError;
use crate::placement::{
    stamp_cells, BlockPlacement, PendingAction, PlacementBatch, PlacementBuffer, PlacementTarget,
    Stamp, VoxelSink,
};

/// A structure or feature that can be run through the [`Scheduler`].
pub trait Generator: Send + Sync {
    /// Short identifier used in logs and reports.
    fn name(&self) -> &str;

    /// Primary body. Writes go to `ctx`; recursive work is submitted through it.
    fn build(
        &self,
        ctx: &mut SubGenerator<'_>,
        rng: &mut RandomSource,
        origin: BlockPos,
    ) -> Result<(), GenerationError>;

    /// Upper bound on how far from the origin, horizontally, any write can land.
    ///
    /// `None` when the generator cannot bound its output; the pipeline then
    /// falls back to the configured feature margin.
    fn reach(&self) -> Option<u32> {
        None
    }
}

type Work = Box<dyn for<'a> FnOnce(&mut SubGenerator<'a>) -> Result<(), GenerationError> + Send>;

/// Queued unit of work.
pub struct Subtask {
    work: Work,
}

impl fmt::Debug for Subtask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Subtask")
    }
}

/// Which queue a task came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Primary,
    Ordinary,
    Finalising,
}

/// A subtask that returned an error. Its writes were discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtaskFailure {
    pub phase: Phase,
    /// Wave number within the run (finalising tasks count as their own wave).
    pub wave: usize,
    /// Position of the task within its wave.
    pub index: usize,
    pub error: GenerationError,
}

/// Counters collected during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub waves: usize,
    pub ordinary_tasks: usize,
    pub finalising_tasks: usize,
    /// Largest number of tasks in any single wave.
    pub widest_wave: usize,
}

/// Everything a run produced.
#[derive(Debug, Clone, Default)]
pub struct GenerationOutput {
    pub batch: PlacementBatch,
    pub failures: Vec<SubtaskFailure>,
    pub stats: RunStats,
}

impl GenerationOutput {
    /// Hand the batch to a sink, returning the failures for reporting.
    pub fn apply_to(self, sink: &mut dyn VoxelSink) -> Vec<SubtaskFailure> {
        sink.apply(self.batch);
        self.failures
    }
}

/// How waves of ordinary subtasks are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Sequential,
    /// Split each wave across scoped worker threads.
    Parallel { workers: usize },
}

/// Write context handed to generator bodies and subtasks.
///
/// Reads see this task's own writes first, then the merged snapshot.
pub struct SubGenerator<'a> {
    view: &'a PlacementBuffer,
    local: PlacementBuffer,
    removed: Vec<BlockPos>,
    removed_keys: HashSet<u64>,
    ordinary: Vec<Subtask>,
    finalising: Vec<Subtask>,
}

impl<'a> SubGenerator<'a> {
    pub fn new(view: &'a PlacementBuffer) -> Self {
        Self {
            view,
            local: PlacementBuffer::new(),
            removed: Vec::new(),
            removed_keys: HashSet::new(),
            ordinary: Vec::new(),
            finalising: Vec::new(),
        }
    }

    /// Queue geometry work that must finish before any finalising task.
    pub fn submit_subtask<F>(&mut self, work: F)
    where
        F: for<'b> FnOnce(&mut SubGenerator<'b>) -> Result<(), GenerationError> + Send + 'static,
    {
        self.ordinary.push(Subtask {
            work: Box::new(work),
        });
    }

    /// Queue work that runs after every ordinary subtask has merged.
    pub fn submit_finalising_subtask<F>(&mut self, work: F)
    where
        F: for<'b> FnOnce(&mut SubGenerator<'b>) -> Result<(), GenerationError> + Send + 'static,
    {
        self.finalising.push(Subtask {
            work: Box::new(work),
        });
    }

    fn visible(&self, pos: BlockPos) -> Option<&BlockPlacement> {
        if let Some(p) = self.local.get(pos) {
            return Some(p);
        }
        if self.removed_keys.contains(&pack_pos(pos)) {
            return None;
        }
        self.view.get(pos)
    }

    /// Material visible at `pos`, or air.
    pub fn queued_state(&self, pos: BlockPos) -> BlockId {
        self.visible(pos).map(|p| p.block).unwrap_or(BLOCK_AIR)
    }

    pub fn is_occupied(&self, pos: BlockPos) -> bool {
        self.visible(pos).is_some()
    }

    /// Guarded write against both the snapshot and this task's own writes.
    pub fn guard_and_store(&mut self, pos: BlockPos, block: BlockId, allow_override: bool) -> bool {
        if !allow_override && self.visible(pos).is_some() {
            return false;
        }
        self.local.guard_and_store(pos, block, allow_override)
    }

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

    /// Remove whatever is visible at `pos`, including merged output from earlier tasks.
    pub fn remove_at(&mut self, pos: BlockPos) -> Option<BlockPlacement> {
        let local = self.local.remove_at(pos);
        let key = pack_pos(pos);
        let merged = if self.removed_keys.contains(&key) {
            None
        } else {
            self.view.get(pos).copied()
        };
        if merged.is_some() {
            self.removed_keys.insert(key);
            self.removed.push(pos);
        }
        local.or(merged)
    }

    /// Remove and return every visible placement matching `pred`.
    ///
    /// Snapshot entries come first in their merged order, then this task's own.
    pub fn take_where(
        &mut self,
        mut pred: impl FnMut(&BlockPlacement) -> bool,
    ) -> Vec<BlockPlacement> {
        let from_view: Vec<BlockPlacement> = self
            .view
            .iter()
            .filter(|p| !self.removed_keys.contains(&pack_pos(p.pos)) && !self.local.contains(p.pos))
            .filter(|p| pred(p))
            .copied()
            .collect();
        for placement in &from_view {
            self.removed_keys.insert(pack_pos(placement.pos));
            self.removed.push(placement.pos);
        }
        let mut taken = from_view;
        for placement in self.local.take_where(&mut pred) {
            let key = pack_pos(placement.pos);
            if self.view.contains(placement.pos) && self.removed_keys.insert(key) {
                self.removed.push(placement.pos);
            }
            taken.push(placement);
        }
        taken
    }

    pub fn queue_action(&mut self, pos: BlockPos, action: PendingAction) -> bool {
        if self.view.action_at(pos).is_some() {
            return false;
        }
        self.local.queue_action(pos, action)
    }

    /// Every placement visible to this task, snapshot first.
    pub fn visible_placements(&self) -> Vec<BlockPlacement> {
        self.view
            .iter()
            .filter(|p| !self.removed_keys.contains(&pack_pos(p.pos)) && !self.local.contains(p.pos))
            .chain(self.local.iter())
            .copied()
            .collect()
    }

    /// Writes made by this task so far.
    pub fn local(&self) -> &PlacementBuffer {
        &self.local
    }

    fn into_output(self) -> TaskOutput {
        TaskOutput {
            buffer: self.local,
            removed: self.removed,
            ordinary: self.ordinary,
            finalising: self.finalising,
        }
    }
}

impl PlacementTarget for SubGenerator<'_> {
    fn place(&mut self, pos: BlockPos, block: BlockId, allow_override: bool) -> bool {
        self.guard_and_store(pos, block, allow_override)
    }

    fn occupant(&self, pos: BlockPos) -> BlockId {
        self.queued_state(pos)
    }
}

struct TaskOutput {
    buffer: PlacementBuffer,
    removed: Vec<BlockPos>,
    ordinary: Vec<Subtask>,
    finalising: Vec<Subtask>,
}

fn run_task(view: &PlacementBuffer, task: Subtask) -> Result<TaskOutput, GenerationError> {
    let mut ctx = SubGenerator::new(view);
    (task.work)(&mut ctx)?;
    Ok(ctx.into_output())
}

fn run_wave(
    view: &PlacementBuffer,
    tasks: Vec<Subtask>,
    mode: ExecutionMode,
) -> Vec<Result<TaskOutput, GenerationError>> {
    let workers = match mode {
        ExecutionMode::Parallel { workers } if workers > 1 && tasks.len() > 1 => workers,
        _ => return tasks.into_iter().map(|task| run_task(view, task)).collect(),
    };

    let per_worker = tasks.len().div_ceil(workers);
    let mut groups: Vec<Vec<Subtask>> = Vec::new();
    let mut iter = tasks.into_iter().peekable();
    while iter.peek().is_some() {
        groups.push(iter.by_ref().take(per_worker).collect());
    }

    std::thread::scope(|scope| {
        let handles: Vec<_> = groups
            .into_iter()
            .map(|group| {
                scope.spawn(move || {
                    group
                        .into_iter()
                        .map(|task| run_task(view, task))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| match handle.join() {
                Ok(results) => results,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    })
}

/// Drives one generation run from primary body to flushed batch.
#[derive(Debug, Default)]
pub struct Scheduler {
    mode: ExecutionMode,
    merged: PlacementBuffer,
    finalising: VecDeque<Subtask>,
    failures: Vec<SubtaskFailure>,
    stats: RunStats,
}

impl Scheduler {
    pub fn new(mode: ExecutionMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Reset the generation context so the scheduler can be reused.
    pub fn prepare_flush(&mut self) {
        self.merged = PlacementBuffer::new();
        self.finalising.clear();
        self.failures.clear();
        self.stats = RunStats::default();
    }

    /// Run `generator` at `origin` and flush the merged result.
    ///
    /// An error from the primary body fails the run. Subtask errors are
    /// collected in [`GenerationOutput::failures`].
    pub fn run<G: Generator + ?Sized>(
        &mut self,
        generator: &G,
        rng: &mut RandomSource,
        origin: BlockPos,
    ) -> Result<GenerationOutput, GenerationError> {
        self.prepare_flush();
        debug!(generator = generator.name(), ?origin, mode = ?self.mode, "generation started");

        let empty = PlacementBuffer::new();
        let mut root = SubGenerator::new(&empty);
        generator.build(&mut root, rng, origin)?;
        let children = self.absorb(root.into_output());
        self.drain(children);

        while let Some(task) = self.finalising.pop_front() {
            self.stats.waves += 1;
            self.stats.finalising_tasks += 1;
            let wave = self.stats.waves;
            let outcome = run_task(&self.merged, task);
            let children = match outcome {
                Ok(output) => self.absorb(output),
                Err(error) => {
                    self.record(Phase::Finalising, wave, 0, error);
                    Vec::new()
                }
            };
            self.drain(children);
        }

        let merged = std::mem::take(&mut self.merged);
        let output = GenerationOutput {
            batch: merged.flush(),
            failures: std::mem::take(&mut self.failures),
            stats: self.stats,
        };
        debug!(
            generator = generator.name(),
            placements = output.batch.placements.len(),
            failures = output.failures.len(),
            waves = output.stats.waves,
            "generation finished"
        );
        Ok(output)
    }

    /// Merge one task's output; returns its ordinary children.
    fn absorb(&mut self, output: TaskOutput) -> Vec<Subtask> {
        for pos in output.removed {
            self.merged.remove_at(pos);
        }
        self.merged.merge(output.buffer);
        self.finalising.extend(output.finalising);
        output.ordinary
    }

    fn drain(&mut self, mut wave: Vec<Subtask>) {
        while !wave.is_empty() {
            self.stats.waves += 1;
            self.stats.ordinary_tasks += wave.len();
            self.stats.widest_wave = self.stats.widest_wave.max(wave.len());
            let number = self.stats.waves;
            trace!(wave = number, tasks = wave.len(), "running wave");

            let results = run_wave(&self.merged, wave, self.mode);
            let mut next = Vec::new();
            for (index, result) in results.into_iter().enumerate() {
                match result {
                    Ok(output) => next.extend(self.absorb(output)),
                    Err(error) => self.record(Phase::Ordinary, number, index, error),
                }
            }
            wave = next;
        }
    }

    fn record(&mut self, phase: Phase, wave: usize, index: usize, error: GenerationError) {
        warn!(?phase, wave, index, %error, "subtask failed; discarding its writes");
        self.failures.push(SubtaskFailure {
            phase,
            wave,
            index,
            error,
        });
    }
}

/// Run a generator once with a fresh sequential scheduler.
pub fn generate<G: Generator + ?Sized>(
    generator: &G,
    rng: &mut RandomSource,
    origin: BlockPos,
) -> Result<GenerationOutput, GenerationError> {
    Scheduler::default().run(generator, rng, origin)
}
