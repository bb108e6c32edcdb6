//! Branch-and-root trees.
//!
//! A tapering disc-stack trunk with straight branches fanned out over an even
//! (Fibonacci) hemisphere, and a mirrored set of roots below the base.

use std::f64::consts::TAU;
use std::sync::Arc;

use strata_core::math::{any_perpendicular, block_center, rotate_around};
use strata_core::{to_block_pos, BlockPos, RandomSource, Vec3};

use crate::blocks;
use crate::chunk::BlockId;
use crate::curve::{radius, Curve, Profile};
use crate::error::{check_range, check_within, ConfigError, GenerationError};
use crate::placement::Stamp;
use crate::scheduler::{Generator, SubGenerator};

const NAME: &str = "branch_tree";
const GOLDEN_ANGLE: f64 = 2.399_963_229_728_653;
/// Hard recursion cap for child branches.
pub const MAX_BRANCH_DEPTH: u32 = 4;

/// `count` unit directions spread evenly over a band of the unit sphere.
///
/// `min_y..=max_y` bounds the vertical component; pass `(0, 1)` for the upper
/// hemisphere or `(-1, 0)` for the lower one.
pub fn fibonacci_hemisphere(count: usize, min_y: f64, max_y: f64, phase: f64) -> Vec<Vec3> {
    (0..count)
        .map(|i| {
            let y = max_y - (max_y - min_y) * (i as f64 + 0.5) / count as f64;
            let r = (1.0 - y * y).max(0.0).sqrt();
            let theta = i as f64 * GOLDEN_ANGLE + phase;
            Vec3::new(r * theta.cos(), y, r * theta.sin())
        })
        .collect()
}

/// Points along a straight march where a stamp is due.
///
/// The march advances in half-voxel steps and only emits a point once it has
/// moved at least `spacing` from the previous one. The end point is always
/// emitted.
pub fn march_samples(start: Vec3, direction: Vec3, length: f64, spacing: f64) -> Vec<Vec3> {
    let dir = direction.normalize_or_zero();
    let mut samples = vec![start];
    if dir == Vec3::ZERO || !(length > 0.0) {
        return samples;
    }
    let spacing = spacing.max(0.5);
    let mut last = start;
    let mut travelled = 0.0;
    while travelled < length {
        travelled = (travelled + 0.5).min(length);
        let here = start + dir * travelled;
        if here.distance(last) >= spacing || travelled >= length {
            samples.push(here);
            last = here;
        }
    }
    samples
}

/// Validated branch-and-root parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchTreeConfig {
    pub wood: BlockId,
    pub roots: Option<BlockId>,
    pub foliage: Option<BlockId>,
    pub height: (u32, u32),
    pub base_radius: f64,
    pub top_radius: f64,
    pub branch_count: usize,
    pub root_count: usize,
    pub branch_length: f64,
    pub root_length: f64,
    /// Vertical component range of branch directions.
    pub elevation: (f64, f64),
    pub child_chance: f64,
    pub shrink: f64,
    pub max_depth: u32,
    pub stamp_spacing: f64,
    pub foliage_radius: f64,
}

/// Collects branch-and-root parameters; nothing is usable until [`BranchTreeBuilder::build`].
#[derive(Debug, Clone)]
pub struct BranchTreeBuilder {
    wood: Option<BlockId>,
    roots: Option<BlockId>,
    foliage: Option<(BlockId, f64)>,
    height: (u32, u32),
    trunk_radius: (f64, f64),
    branches: (usize, f64),
    roots_spread: (usize, f64),
    elevation: (f64, f64),
    children: (f64, f64, u32),
    stamp_spacing: f64,
}

impl Default for BranchTreeBuilder {
    fn default() -> Self {
        Self {
            wood: None,
            roots: None,
            foliage: None,
            height: (6, 9),
            trunk_radius: (2.0, 0.8),
            branches: (6, 6.0),
            roots_spread: (4, 4.0),
            elevation: (0.2, 0.8),
            children: (0.5, 0.6, 2),
            stamp_spacing: 1.0,
        }
    }
}

impl BranchTreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wood(mut self, block: BlockId) -> Self {
        self.wood = Some(block);
        self
    }

    pub fn roots(mut self, block: BlockId) -> Self {
        self.roots = Some(block);
        self
    }

    pub fn foliage(mut self, block: BlockId, radius: f64) -> Self {
        self.foliage = Some((block, radius));
        self
    }

    pub fn height(mut self, min: u32, max: u32) -> Self {
        self.height = (min, max);
        self
    }

    pub fn trunk_radius(mut self, base: f64, top: f64) -> Self {
        self.trunk_radius = (base, top);
        self
    }

    pub fn branches(mut self, count: usize, length: f64) -> Self {
        self.branches = (count, length);
        self
    }

    pub fn root_spread(mut self, count: usize, length: f64) -> Self {
        self.roots_spread = (count, length);
        self
    }

    pub fn elevation(mut self, min_y: f64, max_y: f64) -> Self {
        self.elevation = (min_y, max_y);
        self
    }

    pub fn children(mut self, chance: f64, shrink: f64, max_depth: u32) -> Self {
        self.children = (chance, shrink, max_depth);
        self
    }

    pub fn stamp_spacing(mut self, spacing: f64) -> Self {
        self.stamp_spacing = spacing;
        self
    }

    pub fn build(self) -> Result<BranchTreeConfig, ConfigError> {
        let wood = self.wood.ok_or(ConfigError::missing(NAME, "wood"))?;
        let (min_height, max_height) = self.height;
        let (base_radius, top_radius) = self.trunk_radius;
        let (branch_count, branch_length) = self.branches;
        let (root_count, root_length) = self.roots_spread;
        let (child_chance, shrink, max_depth) = self.children;

        check_range(NAME, "height", f64::from(min_height), f64::from(max_height))?;
        check_within(NAME, "height", f64::from(min_height), 1.0, 128.0, "1..=128")?;
        check_within(NAME, "base_radius", base_radius, 0.0, 8.0, "0..=8")?;
        check_within(NAME, "top_radius", top_radius, 0.0, base_radius, "0..=base_radius")?;
        check_within(NAME, "branch_length", branch_length, 0.0, 64.0, "0..=64")?;
        check_within(NAME, "root_length", root_length, 0.0, 64.0, "0..=64")?;
        check_range(NAME, "elevation", self.elevation.0, self.elevation.1)?;
        check_within(NAME, "elevation", self.elevation.0, -1.0, 1.0, "-1..=1")?;
        check_within(NAME, "elevation", self.elevation.1, -1.0, 1.0, "-1..=1")?;
        check_within(NAME, "child_chance", child_chance, 0.0, 1.0, "0..=1")?;
        if !(shrink > 0.0 && shrink < 1.0) {
            return Err(ConfigError::out_of_range(NAME, "shrink", shrink, "0 < shrink < 1"));
        }
        check_within(
            NAME,
            "max_depth",
            f64::from(max_depth),
            0.0,
            f64::from(MAX_BRANCH_DEPTH),
            "0..=4",
        )?;
        check_within(NAME, "stamp_spacing", self.stamp_spacing, 0.5, 8.0, "0.5..=8")?;
        let (foliage, foliage_radius) = match self.foliage {
            Some((block, radius)) => {
                check_within(NAME, "foliage_radius", radius, 0.5, 6.0, "0.5..=6")?;
                (Some(block), radius)
            }
            None => (None, 0.0),
        };

        Ok(BranchTreeConfig {
            wood,
            roots: self.roots,
            foliage,
            height: self.height,
            base_radius,
            top_radius,
            branch_count,
            root_count,
            branch_length,
            root_length,
            elevation: self.elevation,
            child_chance,
            shrink,
            max_depth,
            stamp_spacing: self.stamp_spacing,
            foliage_radius,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct Limb {
    start: Vec3,
    direction: Vec3,
    length: f64,
    radius: f64,
    depth: u32,
    block: BlockId,
    leafy: bool,
}

#[derive(Debug, Clone)]
pub struct BranchTreeGenerator {
    config: Arc<BranchTreeConfig>,
}

impl BranchTreeGenerator {
    pub fn new(config: BranchTreeConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Mangrove-like preset with roots and leafy tips.
    pub fn mangrove() -> Result<Self, ConfigError> {
        BranchTreeBuilder::new()
            .wood(blocks::LOG)
            .roots(blocks::ROOTS)
            .foliage(blocks::LEAVES, 2.0)
            .root_spread(6, 5.0)
            .build()
            .map(Self::new)
    }
}

impl Generator for BranchTreeGenerator {
    fn name(&self) -> &str {
        NAME
    }

    fn reach(&self) -> Option<u32> {
        let cfg = &self.config;
        let chain: f64 = (0..=cfg.max_depth).map(|d| cfg.branch_length * cfg.shrink.powi(d as i32)).sum();
        let limb = (cfg.top_radius * 1.2).max(0.5);
        let tips = if cfg.foliage.is_some() { cfg.foliage_radius.max(limb) } else { limb };
        let roots = cfg.root_length + (cfg.base_radius * 0.5).max(0.5);
        let far = (chain + tips).max(roots).max(cfg.base_radius);
        Some(far.ceil() as u32 + 1)
    }

    fn build(
        &self,
        ctx: &mut SubGenerator<'_>,
        rng: &mut RandomSource,
        origin: BlockPos,
    ) -> Result<(), GenerationError> {
        let cfg = &self.config;
        let height = rng.next_int_inclusive(cfg.height.0 as i32, cfg.height.1 as i32);
        let taper = radius(cfg.base_radius, cfg.top_radius, 0.0, 1.0, Curve::InvertedQuadratic);
        for y in 0..height {
            let t = f64::from(y) / f64::from((height - 1).max(1));
            ctx.guard_and_store_radius(origin + BlockPos::new(0, y, 0), cfg.wood, false, taper.eval(t), Stamp::Disc);
        }

        let base = block_center(origin);
        let top = base + Vec3::Y * f64::from(height - 1);
        let phase = rng.next_range(0.0, TAU);
        let directions = fibonacci_hemisphere(cfg.branch_count, cfg.elevation.0, cfg.elevation.1, phase);
        for (i, direction) in directions.into_iter().enumerate() {
            let along = rng.next_range(0.6, 1.0);
            let limb = Limb {
                start: base.lerp(top, along),
                direction,
                length: cfg.branch_length * rng.next_range(0.8, 1.0),
                radius: (cfg.top_radius * 1.2).max(0.5),
                depth: 0,
                block: cfg.wood,
                leafy: true,
            };
            let child = rng.fork(i as u64);
            let config = Arc::clone(cfg);
            ctx.submit_subtask(move |ctx| grow_limb(ctx, config, child, limb));
        }

        let root_block = cfg.roots.unwrap_or(cfg.wood);
        let root_dirs = fibonacci_hemisphere(cfg.root_count, -0.6, -0.15, phase + 0.5);
        for (i, direction) in root_dirs.into_iter().enumerate() {
            let limb = Limb {
                start: base,
                direction,
                length: cfg.root_length * rng.next_range(0.7, 1.0),
                radius: (cfg.base_radius * 0.5).max(0.5),
                depth: cfg.max_depth,
                block: root_block,
                leafy: false,
            };
            let child = rng.fork(0x4000 + i as u64);
            let config = Arc::clone(cfg);
            ctx.submit_subtask(move |ctx| grow_limb(ctx, config, child, limb));
        }
        Ok(())
    }
}

fn grow_limb(
    ctx: &mut SubGenerator<'_>,
    cfg: Arc<BranchTreeConfig>,
    mut rng: RandomSource,
    limb: Limb,
) -> Result<(), GenerationError> {
    let samples = march_samples(limb.start, limb.direction, limb.length, cfg.stamp_spacing);
    let taper = radius(limb.radius, (limb.radius * 0.5).max(0.5), 0.0, 1.0, Curve::Linear);
    let last = samples.len().saturating_sub(1).max(1) as f64;
    for (i, point) in samples.iter().enumerate() {
        ctx.guard_and_store_radius(to_block_pos(*point), limb.block, false, taper.eval(i as f64 / last), Stamp::Sphere);
    }

    if limb.depth < cfg.max_depth && rng.chance(cfg.child_chance) {
        let along = rng.next_range(0.3, 0.7);
        let axis = any_perpendicular(limb.direction);
        let bent = rotate_around(limb.direction, axis, rng.next_range(0.4, 0.9));
        let direction = rotate_around(bent, limb.direction, rng.next_range(0.0, TAU));
        let child = Limb {
            start: limb.start + limb.direction.normalize_or_zero() * limb.length * along,
            direction,
            length: limb.length * cfg.shrink,
            radius: (limb.radius * cfg.shrink).max(0.5),
            depth: limb.depth + 1,
            ..limb
        };
        let child_rng = rng.fork(1);
        let config = Arc::clone(&cfg);
        ctx.submit_subtask(move |ctx| grow_limb(ctx, config, child_rng, child));
    }

    if let (true, Some(foliage)) = (limb.leafy, cfg.foliage) {
        let tip = samples.last().copied().unwrap_or(limb.start);
        let radius = cfg.foliage_radius;
        ctx.submit_finalising_subtask(move |ctx| {
            ctx.guard_and_store_radius(to_block_pos(tip), foliage, false, radius, Stamp::Sphere);
            Ok(())
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::generate;

    fn tree() -> BranchTreeBuilder {
        BranchTreeBuilder::new().wood(blocks::LOG)
    }

    #[test]
    fn fibonacci_directions_are_spread() {
        let dirs = fibonacci_hemisphere(12, 0.0, 1.0, 0.0);
        assert_eq!(dirs.len(), 12);
        for d in &dirs {
            assert!((d.length() - 1.0).abs() < 1e-9);
            assert!(d.y > 0.0);
        }
        let mut closest = f64::MAX;
        for (i, a) in dirs.iter().enumerate() {
            for b in &dirs[i + 1..] {
                closest = closest.min(a.dot(*b).clamp(-1.0, 1.0).acos());
            }
        }
        assert!(closest > 0.3, "closest pair {closest} rad");
    }

    #[test]
    fn lower_band_points_down() {
        for d in fibonacci_hemisphere(5, -0.6, -0.15, 1.0) {
            assert!(d.y < 0.0);
        }
    }

    #[test]
    fn march_skips_redundant_stamps() {
        let samples = march_samples(Vec3::ZERO, Vec3::X, 10.0, 2.0);
        assert_eq!(samples.first(), Some(&Vec3::ZERO));
        assert_eq!(samples.last(), Some(&Vec3::new(10.0, 0.0, 0.0)));
        assert_eq!(samples.len(), 6);
        for pair in samples.windows(2) {
            assert!(pair[0].distance(pair[1]) >= 2.0 - 1e-9);
        }
        assert_eq!(march_samples(Vec3::ONE, Vec3::ZERO, 5.0, 1.0), vec![Vec3::ONE]);
    }

    #[test]
    fn wood_is_required() {
        assert_eq!(
            BranchTreeBuilder::new().build().unwrap_err(),
            ConfigError::missing(NAME, "wood")
        );
        assert!(tree().children(0.5, 0.6, 9).build().is_err());
        assert!(tree().elevation(0.9, 0.1).build().is_err());
    }

    #[test]
    fn build_carries_every_setting() {
        let cfg = tree()
            .roots(blocks::ROOTS)
            .foliage(blocks::LEAVES, 2.5)
            .height(5, 7)
            .trunk_radius(1.5, 0.6)
            .branches(4, 5.0)
            .root_spread(3, 3.0)
            .children(0.25, 0.5, 3)
            .stamp_spacing(1.5)
            .build()
            .unwrap();
        assert_eq!(cfg.wood, blocks::LOG);
        assert_eq!(cfg.roots, Some(blocks::ROOTS));
        assert_eq!(cfg.foliage, Some(blocks::LEAVES));
        assert_eq!(cfg.foliage_radius, 2.5);
        assert_eq!(cfg.height, (5, 7));
        assert_eq!((cfg.base_radius, cfg.top_radius), (1.5, 0.6));
        assert_eq!((cfg.branch_count, cfg.branch_length), (4, 5.0));
        assert_eq!((cfg.root_count, cfg.root_length), (3, 3.0));
        assert_eq!((cfg.child_chance, cfg.shrink, cfg.max_depth), (0.25, 0.5, 3));
        assert_eq!(cfg.stamp_spacing, 1.5);

        assert!(tree().foliage(blocks::LEAVES, 9.0).build().is_err());
        let bare = tree().build().unwrap();
        assert_eq!(bare.foliage, None);
        assert_ne!(bare.wood, blocks::AIR);
    }

    #[test]
    fn reach_covers_every_placement() {
        let generator = BranchTreeGenerator::new(
            tree().foliage(blocks::LEAVES, 2.0).children(1.0, 0.7, 3).build().unwrap(),
        );
        let reach = generator.reach().unwrap() as i32;
        assert!(reach >= 6 + 2 + 1);
        for seed in 0..16 {
            let out = generate(&generator, &mut RandomSource::new(seed), BlockPos::ZERO).unwrap();
            for p in &out.batch.placements {
                assert!(p.pos.x.abs() <= reach && p.pos.z.abs() <= reach, "{:?} beyond {reach}", p.pos);
            }
        }
    }

    #[test]
    fn roots_grow_below_origin() {
        let generator = BranchTreeGenerator::mangrove().unwrap();
        let origin = BlockPos::new(0, 64, 0);
        let out = generate(&generator, &mut RandomSource::new(3), origin).unwrap();
        let roots: Vec<_> = out.batch.placements.iter().filter(|p| p.block == blocks::ROOTS).collect();
        assert!(!roots.is_empty());
        assert!(roots.iter().any(|p| p.pos.y < origin.y));
        assert!(out.batch.placements.iter().any(|p| p.block == blocks::LEAVES));
    }

    #[test]
    fn generation_is_deterministic_and_bounded() {
        let generator = BranchTreeGenerator::new(tree().children(1.0, 0.7, 3).build().unwrap());
        let a = generate(&generator, &mut RandomSource::new(8), BlockPos::ZERO).unwrap();
        let b = generate(&generator, &mut RandomSource::new(8), BlockPos::ZERO).unwrap();
        assert_eq!(a.batch, b.batch);
        // Limbs at depth 0 plus up to three child levels.
        assert!(a.stats.waves <= 4);
    }
}
