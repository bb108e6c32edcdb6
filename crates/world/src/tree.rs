//! Recursive trees.
//!
//! The trunk is a perturbed centerline stamped with a tapering disc profile.
//! Branches are ordinary subtasks that shrink by a fixed factor per level and
//! stop at `max_depth`. Leaves are finalising subtasks submitted at every
//! branch tip, so they always wrap the finished wood.

use std::f64::consts::{FRAC_PI_2, TAU};
use std::sync::Arc;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use strata_core::math::{block_center, rotate_around};
use strata_core::{to_block_pos, BlockPos, RandomSource, Vec3};

use crate::blocks;
use crate::chunk::BlockId;
use crate::curve::{multi_fade, radius, Curve, Profile};
use crate::error::{check_range, check_within, ConfigError, GenerationError};
use crate::path::{frame_at, resample, smooth, stamp_along, Frame, Helix, PathFactory};
use crate::placement::{PlacementTarget, Stamp};
use crate::scheduler::{Generator, SubGenerator};

const NAME: &str = "tree";
const GOLDEN_ANGLE: f64 = 2.399_963_229_728_653;
const LEAF_SALT: u64 = 0x1EAF;

/// Overall trunk silhouette.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrunkShape {
    Bonsai,
    Coniferous,
    MultiTrunk { count: u32 },
    /// Leans `lean` radians away from vertical.
    Slanted { lean: f64 },
    TaperedSpindle,
}

/// Path and radius parameters a [`TrunkShape`] expands into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrunkProfile {
    pub height: (f64, f64),
    pub base_radius: f64,
    pub tip_radius: f64,
    pub curve: Curve,
    /// Swells to twice the base radius before tapering.
    pub swell: bool,
    pub divergence_chance: f64,
    pub divergence_strength: f64,
    pub wobble: f64,
    pub smoothing: usize,
    pub helix: Option<Helix>,
    /// Fraction of the trunk below which no branches start.
    pub branch_start: f64,
    /// Angle of each trunk away from vertical.
    pub tilt: f64,
    pub trunks: u32,
}

impl TrunkShape {
    pub fn profile(&self) -> TrunkProfile {
        let straight = TrunkProfile {
            height: (8.0, 11.0),
            base_radius: 1.1,
            tip_radius: 0.5,
            curve: Curve::Quadratic,
            swell: false,
            divergence_chance: 0.05,
            divergence_strength: 0.2,
            wobble: 0.3,
            smoothing: 1,
            helix: None,
            branch_start: 0.5,
            tilt: 0.0,
            trunks: 1,
        };
        match *self {
            TrunkShape::Bonsai => TrunkProfile {
                height: (4.0, 6.0),
                base_radius: 1.4,
                tip_radius: 0.6,
                curve: Curve::InvertedQuadratic,
                divergence_chance: 0.35,
                divergence_strength: 0.8,
                wobble: 0.6,
                helix: Some(Helix {
                    radius: 0.8,
                    turns: 0.5,
                }),
                branch_start: 0.45,
                ..straight
            },
            TrunkShape::Coniferous => TrunkProfile {
                height: (12.0, 18.0),
                base_radius: 1.2,
                tip_radius: 0.4,
                curve: Curve::Linear,
                divergence_chance: 0.02,
                divergence_strength: 0.1,
                wobble: 0.15,
                smoothing: 2,
                branch_start: 0.25,
                ..straight
            },
            TrunkShape::MultiTrunk { count } => TrunkProfile {
                height: (7.0, 10.0),
                base_radius: 0.9,
                tip_radius: 0.4,
                curve: Curve::InvertedQuadratic,
                divergence_chance: 0.08,
                divergence_strength: 0.25,
                wobble: 0.4,
                branch_start: 0.55,
                tilt: 0.3,
                trunks: count.max(1),
                ..straight
            },
            TrunkShape::Slanted { lean } => TrunkProfile { tilt: lean, ..straight },
            TrunkShape::TaperedSpindle => TrunkProfile {
                height: (9.0, 13.0),
                base_radius: 0.8,
                tip_radius: 0.3,
                curve: Curve::EaseInOutCubic,
                swell: true,
                divergence_chance: 0.03,
                divergence_strength: 0.15,
                wobble: 0.2,
                smoothing: 2,
                branch_start: 0.6,
                ..straight
            },
        }
    }
}

impl TrunkProfile {
    /// Radius along the trunk.
    pub fn radius_profile(&self) -> Box<dyn Profile> {
        if self.swell {
            let peak = self.base_radius * 2.0;
            Box::new(multi_fade(vec![
                radius(self.base_radius, peak, 0.0, 0.3, self.curve),
                radius(peak, self.tip_radius, 0.3, 1.0, self.curve),
            ]))
        } else {
            Box::new(radius(self.base_radius, self.tip_radius, 0.0, 1.0, self.curve))
        }
    }
}

/// How foliage is placed around branch tips.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LeafStyle {
    Blob { radius: f64 },
    /// Leaf blob with vines hanging from its underside.
    HangingVines { length: u32 },
    /// Leaf blob with curtains of leaves hanging from its rim.
    ThickHanging { length: u32 },
    /// Flat dome whose rim is deformed per cell.
    MushroomCap { radius: f64 },
    /// Small blob with decoration blocks oriented along the branch.
    TipDecoration,
    /// Horizontal arms radiating from points along the trunk.
    NeedleArms { length: f64 },
}

/// Validated tree parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeConfig {
    pub trunk: TrunkShape,
    pub leaf_style: LeafStyle,
    pub wood: BlockId,
    pub leaves: BlockId,
    pub decoration: Option<BlockId>,
    /// Inclusive range of first-level branches per trunk.
    pub branches: (u32, u32),
    pub branch_length: f64,
    /// Per-level length and radius factor, strictly between 0 and 1.
    pub shrink: f64,
    pub max_depth: u32,
    pub height_scale: f64,
}

/// Builder for [`TreeConfig`].
#[derive(Debug, Clone)]
pub struct TreeBuilder {
    trunk: TrunkShape,
    leaf_style: LeafStyle,
    wood: Option<BlockId>,
    leaves: Option<BlockId>,
    decoration: Option<BlockId>,
    branches: (u32, u32),
    branch_length: f64,
    shrink: f64,
    max_depth: u32,
    height_scale: f64,
}

impl TreeBuilder {
    pub fn new(trunk: TrunkShape) -> Self {
        Self {
            trunk,
            leaf_style: LeafStyle::Blob { radius: 2.5 },
            wood: None,
            leaves: None,
            decoration: None,
            branches: (2, 4),
            branch_length: 4.0,
            shrink: 0.65,
            max_depth: 2,
            height_scale: 1.0,
        }
    }

    pub fn wood(mut self, block: BlockId) -> Self {
        self.wood = Some(block);
        self
    }

    pub fn leaves(mut self, block: BlockId) -> Self {
        self.leaves = Some(block);
        self
    }

    pub fn decoration(mut self, block: BlockId) -> Self {
        self.decoration = Some(block);
        self
    }

    pub fn leaf_style(mut self, style: LeafStyle) -> Self {
        self.leaf_style = style;
        self
    }

    pub fn branches(mut self, min: u32, max: u32) -> Self {
        self.branches = (min, max);
        self
    }

    pub fn branch_length(mut self, length: f64) -> Self {
        self.branch_length = length;
        self
    }

    pub fn shrink(mut self, factor: f64) -> Self {
        self.shrink = factor;
        self
    }

    pub fn max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn height_scale(mut self, scale: f64) -> Self {
        self.height_scale = scale;
        self
    }

    pub fn build(self) -> Result<TreeConfig, ConfigError> {
        let wood = self.wood.ok_or(ConfigError::missing(NAME, "wood"))?;
        let leaves = self.leaves.ok_or(ConfigError::missing(NAME, "leaves"))?;
        if matches!(
            self.leaf_style,
            LeafStyle::HangingVines { .. } | LeafStyle::TipDecoration
        ) && self.decoration.is_none()
        {
            return Err(ConfigError::missing(NAME, "decoration"));
        }
        if !(self.shrink > 0.0 && self.shrink < 1.0) {
            return Err(ConfigError::out_of_range(
                NAME,
                "shrink",
                self.shrink,
                "0 < shrink < 1",
            ));
        }
        check_within(NAME, "max_depth", f64::from(self.max_depth), 0.0, 6.0, "0..=6")?;
        check_range(
            NAME,
            "branches",
            f64::from(self.branches.0),
            f64::from(self.branches.1),
        )?;
        check_within(NAME, "branches", f64::from(self.branches.1), 0.0, 12.0, "0..=12")?;
        check_within(NAME, "branch_length", self.branch_length, 1.0, 64.0, "1..=64")?;
        check_within(NAME, "height_scale", self.height_scale, 0.25, 4.0, "0.25..=4")?;

        match self.trunk {
            TrunkShape::MultiTrunk { count } => {
                check_within(NAME, "trunk.count", f64::from(count), 1.0, 6.0, "1..=6")?
            }
            TrunkShape::Slanted { lean } => {
                check_within(NAME, "trunk.lean", lean, 0.0, FRAC_PI_2 * 0.9, "0..=1.41 rad")?
            }
            _ => {}
        }
        match self.leaf_style {
            LeafStyle::Blob { radius } => {
                check_within(NAME, "leaf.radius", radius, 0.5, 6.0, "0.5..=6")?
            }
            LeafStyle::MushroomCap { radius } => {
                check_within(NAME, "leaf.radius", radius, 1.0, 8.0, "1..=8")?
            }
            LeafStyle::HangingVines { length } | LeafStyle::ThickHanging { length } => {
                check_within(NAME, "leaf.length", f64::from(length), 1.0, 16.0, "1..=16")?
            }
            LeafStyle::NeedleArms { length } => {
                check_within(NAME, "leaf.length", length, 1.0, 8.0, "1..=8")?
            }
            LeafStyle::TipDecoration => {}
        }

        Ok(TreeConfig {
            trunk: self.trunk,
            leaf_style: self.leaf_style,
            wood,
            leaves,
            decoration: self.decoration,
            branches: self.branches,
            branch_length: self.branch_length,
            shrink: self.shrink,
            max_depth: self.max_depth,
            height_scale: self.height_scale,
        })
    }
}

/// Tree feature generator.
#[derive(Debug, Clone)]
pub struct TreeGenerator {
    config: Arc<TreeConfig>,
}

impl TreeGenerator {
    pub fn new(config: TreeConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Oak-like preset used by the built-in biomes.
    pub fn oak() -> Result<Self, ConfigError> {
        TreeBuilder::new(TrunkShape::Slanted { lean: 0.05 })
            .wood(blocks::LOG)
            .leaves(blocks::LEAVES)
            .build()
            .map(Self::new)
    }

    pub fn birch() -> Result<Self, ConfigError> {
        TreeBuilder::new(TrunkShape::TaperedSpindle)
            .wood(blocks::BIRCH_LOG)
            .leaves(blocks::BIRCH_LEAVES)
            .leaf_style(LeafStyle::Blob { radius: 2.0 })
            .branches(1, 3)
            .max_depth(1)
            .build()
            .map(Self::new)
    }

    pub fn pine() -> Result<Self, ConfigError> {
        TreeBuilder::new(TrunkShape::Coniferous)
            .wood(blocks::PINE_LOG)
            .leaves(blocks::PINE_LEAVES)
            .leaf_style(LeafStyle::NeedleArms { length: 4.0 })
            .branches(0, 0)
            .max_depth(0)
            .build()
            .map(Self::new)
    }

    pub fn jungle() -> Result<Self, ConfigError> {
        TreeBuilder::new(TrunkShape::MultiTrunk { count: 2 })
            .wood(blocks::LOG)
            .leaves(blocks::LEAVES)
            .decoration(blocks::VINE)
            .leaf_style(LeafStyle::HangingVines { length: 4 })
            .height_scale(1.4)
            .build()
            .map(Self::new)
    }

    fn spawn_branches(
        &self,
        ctx: &mut SubGenerator<'_>,
        rng: &mut RandomSource,
        trunk: &[Vec3],
        profile: &TrunkProfile,
        trunk_index: u32,
    ) {
        let cfg = &self.config;
        if cfg.max_depth == 0 || trunk.len() < 2 {
            return;
        }
        let count = rng.next_int_inclusive(cfg.branches.0 as i32, cfg.branches.1 as i32).max(0);
        let radius_at = profile.radius_profile();
        let conifer = matches!(cfg.trunk, TrunkShape::Coniferous);

        for j in 0..count {
            let t = profile.branch_start
                + (1.0 - profile.branch_start) * (j as f64 + rng.next_double()) / count as f64;
            let index = ((trunk.len() - 1) as f64 * t).round() as usize;
            let start = trunk[index.min(trunk.len() - 1)];
            let azimuth = j as f64 * GOLDEN_ANGLE + rng.next_range(0.0, 0.5);
            let elevation = if conifer {
                rng.next_range(-0.3, 0.05)
            } else {
                rng.next_range(0.25, 0.9)
            };
            let direction = Vec3::new(
                elevation.cos() * azimuth.cos(),
                elevation.sin(),
                elevation.cos() * azimuth.sin(),
            );
            let length = if conifer {
                cfg.branch_length * (1.0 - 0.5 * t)
            } else {
                cfg.branch_length * rng.next_range(0.7, 1.0)
            };
            let branch = Branch {
                start,
                direction,
                length,
                radius: (radius_at.eval(t) * 0.6).max(0.5),
                level: 1,
            };
            let child = rng.fork((u64::from(trunk_index) << 16) | j as u64);
            let config = Arc::clone(&self.config);
            ctx.submit_subtask(move |ctx| grow_branch(ctx, config, child, branch));
        }
    }
}

impl Generator for TreeGenerator {
    fn name(&self) -> &str {
        NAME
    }

    fn reach(&self) -> Option<u32> {
        let cfg = &self.config;
        let profile = cfg.trunk.profile();
        let trunk = PathFactory::new(Vec3::Y, profile.height.1 * cfg.height_scale)
            .with_wobble(profile.wobble, 2.0);
        let trunk = match profile.helix {
            Some(helix) => trunk.with_helix(helix),
            None => trunk,
        };
        let trunk_radius = if profile.swell { profile.base_radius * 2.0 } else { profile.base_radius };
        let branches: f64 = (0..cfg.max_depth)
            .map(|level| {
                PathFactory::new(Vec3::X, cfg.branch_length * cfg.shrink.powi(level as i32))
                    .with_wobble(0.4, 2.0)
                    .reach()
            })
            .sum();
        let foliage = match cfg.leaf_style {
            LeafStyle::Blob { radius } | LeafStyle::MushroomCap { radius } => radius + 0.3,
            LeafStyle::HangingVines { .. } => 2.0,
            LeafStyle::ThickHanging { .. } | LeafStyle::TipDecoration => 3.0,
            LeafStyle::NeedleArms { length } => length + 1.0,
        };
        let far = trunk.reach() + branches + trunk_radius.max(foliage);
        Some(far.ceil() as u32 + 1)
    }

    fn build(
        &self,
        ctx: &mut SubGenerator<'_>,
        rng: &mut RandomSource,
        origin: BlockPos,
    ) -> Result<(), GenerationError> {
        let cfg = &self.config;
        let profile = cfg.trunk.profile();
        let height = rng.next_range(profile.height.0, profile.height.1) * cfg.height_scale;
        let base = block_center(origin);
        let first_azimuth = rng.next_range(0.0, TAU);
        let trunk_radius = profile.radius_profile();

        for k in 0..profile.trunks {
            let azimuth = first_azimuth + TAU * f64::from(k) / f64::from(profile.trunks);
            let direction = Vec3::new(
                profile.tilt.sin() * azimuth.cos(),
                profile.tilt.cos(),
                profile.tilt.sin() * azimuth.sin(),
            );
            let mut trunk_rng = rng.fork(u64::from(k));
            let mut factory = PathFactory::new(direction, height)
                .with_divergence(profile.divergence_chance, profile.divergence_strength)
                .with_wobble(profile.wobble, 2.0);
            if let Some(helix) = profile.helix {
                factory = factory.with_helix(helix);
            }
            let raw = factory.build(&mut trunk_rng, base);
            let points = resample(&smooth(&raw, profile.smoothing), 0.5);
            stamp_along(ctx, &points, trunk_radius.as_ref(), cfg.wood, false, Stamp::Disc);

            self.spawn_branches(ctx, &mut trunk_rng, &points, &profile, k);

            let tip = points.last().copied().unwrap_or(base);
            let frame = frame_at(&points, points.len().saturating_sub(1));
            submit_leaves(ctx, Arc::clone(cfg), trunk_rng.fork(LEAF_SALT), tip, frame);

            if let LeafStyle::NeedleArms { length } = cfg.leaf_style {
                let config = Arc::clone(cfg);
                let arm_rng = trunk_rng.fork(LEAF_SALT + 1);
                ctx.submit_finalising_subtask(move |ctx| {
                    needle_arms(ctx, &config, arm_rng, &points, length);
                    Ok(())
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Branch {
    start: Vec3,
    direction: Vec3,
    length: f64,
    radius: f64,
    level: u32,
}

fn grow_branch(
    ctx: &mut SubGenerator<'_>,
    cfg: Arc<TreeConfig>,
    mut rng: RandomSource,
    branch: Branch,
) -> Result<(), GenerationError> {
    let raw = PathFactory::new(branch.direction, branch.length)
        .with_divergence(0.15, 0.35)
        .with_wobble(0.4, 2.0)
        .build(&mut rng, branch.start);
    let points = resample(&raw, 0.5);
    let taper = radius(branch.radius, (branch.radius * 0.5).max(0.3), 0.0, 1.0, Curve::Linear);
    stamp_along(ctx, &points, &taper, cfg.wood, false, Stamp::Sphere);

    let last = points.len().saturating_sub(1);
    let tip = points.last().copied().unwrap_or(branch.start);
    let frame = frame_at(&points, last);

    let child_length = branch.length * cfg.shrink;
    if branch.level < cfg.max_depth && child_length >= 1.0 {
        let children = rng.next_int_inclusive(1, 2);
        for c in 0..children {
            let at = points[(last as f64 * rng.next_range(0.5, 1.0)) as usize];
            let side = if c % 2 == 0 { 1.0 } else { -1.0 };
            let bent = rotate_around(branch.direction, frame.left, side * rng.next_range(0.3, 0.7));
            let direction = rotate_around(bent, branch.direction, rng.next_range(0.0, TAU));
            let child = Branch {
                start: at,
                direction,
                length: child_length,
                radius: (branch.radius * cfg.shrink).max(0.4),
                level: branch.level + 1,
            };
            let child_rng = rng.fork(c as u64);
            let config = Arc::clone(&cfg);
            ctx.submit_subtask(move |ctx| grow_branch(ctx, config, child_rng, child));
        }
    }

    let leaf_rng = rng.fork(LEAF_SALT);
    submit_leaves(ctx, cfg, leaf_rng, tip, frame);
    Ok(())
}

fn submit_leaves(
    ctx: &mut SubGenerator<'_>,
    cfg: Arc<TreeConfig>,
    rng: RandomSource,
    tip: Vec3,
    frame: Frame,
) {
    ctx.submit_finalising_subtask(move |ctx| {
        place_leaves(ctx, &cfg, rng, tip, frame);
        Ok(())
    });
}

/// Lowest y offset of a stamped sphere's column at horizontal offset `d2`.
fn sphere_floor(radius: f64, d2: i32) -> i32 {
    let limit = radius * radius + 0.25 - f64::from(d2);
    if limit < 0.0 {
        0
    } else {
        -(limit.sqrt().floor() as i32)
    }
}

fn place_leaves<T: PlacementTarget + ?Sized>(
    target: &mut T,
    cfg: &TreeConfig,
    mut rng: RandomSource,
    tip: Vec3,
    frame: Frame,
) {
    let center = to_block_pos(tip);
    let leaves = cfg.leaves;
    match cfg.leaf_style {
        LeafStyle::Blob { radius } => {
            let r = radius + rng.next_range(-0.3, 0.3);
            target.stamp(center, leaves, false, r, Stamp::Sphere);
        }
        LeafStyle::HangingVines { length } => {
            let r = 2.0;
            target.stamp(center, leaves, false, r, Stamp::Sphere);
            let vine = cfg.decoration.unwrap_or(blocks::VINE);
            for dz in -2..=2 {
                for dx in -2..=2 {
                    let d2 = dx * dx + dz * dz;
                    if d2 > 4 || !rng.chance(0.35) {
                        continue;
                    }
                    let drop = rng.next_int_inclusive(1, length as i32);
                    let bottom = center.y + sphere_floor(r, d2);
                    for dy in 1..=drop {
                        let pos = BlockPos::new(center.x + dx, bottom - dy, center.z + dz);
                        if !target.place(pos, vine, false) {
                            break;
                        }
                    }
                }
            }
        }
        LeafStyle::ThickHanging { length } => {
            let r = 2.5;
            target.stamp(center, leaves, false, r, Stamp::Sphere);
            for dz in -3..=3 {
                for dx in -3..=3 {
                    let d2 = dx * dx + dz * dz;
                    if !(4..=6).contains(&d2) || !rng.chance(0.6) {
                        continue;
                    }
                    let drop = rng.next_int_inclusive(1, length as i32);
                    let bottom = center.y + sphere_floor(r, d2);
                    for dy in 1..=drop {
                        let pos = BlockPos::new(center.x + dx, bottom - dy, center.z + dz);
                        if !target.place(pos, leaves, false) {
                            break;
                        }
                    }
                }
            }
        }
        LeafStyle::MushroomCap { radius } => {
            let seed = rng.next_u64();
            let reach = radius.ceil() as i32;
            for dz in -reach..=reach {
                for dx in -reach..=reach {
                    let d = f64::from(dx * dx + dz * dz).sqrt();
                    if d > radius {
                        continue;
                    }
                    let u = d / radius;
                    let rise = ((1.0 - u * u) * radius * 0.5).round() as i32;
                    let mut pos = BlockPos::new(center.x + dx, center.y + rise, center.z + dz);
                    if d > radius - 1.0 {
                        // Rim sag depends only on the cell, not on visit order.
                        let mut local = RandomSource::at_position(seed, pos);
                        pos.y -= local.next_int_inclusive(0, 1);
                        target.place(pos, leaves, false);
                        pos.y -= 1;
                    }
                    target.place(pos, leaves, false);
                }
            }
        }
        LeafStyle::TipDecoration => {
            target.stamp(center, leaves, false, 1.0, Stamp::Sphere);
            let deco = cfg.decoration.unwrap_or(blocks::FLOWER);
            let tip_offsets = [
                Vec3::new(0.0, 0.0, 2.0),
                Vec3::new(1.0, 0.0, 1.5),
                Vec3::new(-1.0, 0.0, 1.5),
                Vec3::new(0.0, 1.0, 1.5),
                Vec3::new(0.0, -1.0, 1.5),
            ];
            for local in tip_offsets {
                target.place(to_block_pos(tip + frame.to_world(local)), deco, false);
            }
        }
        LeafStyle::NeedleArms { .. } => {
            target.stamp(center, leaves, false, 1.0, Stamp::Sphere);
        }
    }
}

fn needle_arms<T: PlacementTarget + ?Sized>(
    target: &mut T,
    cfg: &TreeConfig,
    mut rng: RandomSource,
    trunk: &[Vec3],
    length: f64,
) {
    let n = trunk.len();
    if n < 4 {
        return;
    }
    for i in (n / 4..n).step_by(3) {
        let t = i as f64 / (n - 1) as f64;
        let reach = length * (1.0 - t) + 1.0;
        let arms = rng.next_int_inclusive(4, 6);
        let phase = rng.next_range(0.0, TAU);
        for a in 0..arms {
            let azimuth = phase + TAU * f64::from(a) / f64::from(arms);
            let dir = Vec3::new(azimuth.cos(), -0.15, azimuth.sin()).normalize();
            let mut s = 1.0;
            while s <= reach {
                target.place(to_block_pos(trunk[i] + dir * s), cfg.leaves, false);
                s += 0.5;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{generate, ExecutionMode, Scheduler};

    fn builder(trunk: TrunkShape) -> TreeBuilder {
        TreeBuilder::new(trunk).wood(blocks::LOG).leaves(blocks::LEAVES)
    }

    const ALL_SHAPES: [TrunkShape; 5] = [
        TrunkShape::Bonsai,
        TrunkShape::Coniferous,
        TrunkShape::MultiTrunk { count: 3 },
        TrunkShape::Slanted { lean: 0.4 },
        TrunkShape::TaperedSpindle,
    ];

    #[test]
    fn missing_wood_fails_fast() {
        let err = TreeBuilder::new(TrunkShape::Bonsai)
            .leaves(blocks::LEAVES)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::missing(NAME, "wood"));
        assert!(err.to_string().contains("wood"));
    }

    #[test]
    fn vines_need_decoration_block() {
        let err = builder(TrunkShape::Bonsai)
            .leaf_style(LeafStyle::HangingVines { length: 3 })
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing { field: "decoration", .. }));
    }

    #[test]
    fn shrink_must_be_below_one() {
        for bad in [0.0, 1.0, 1.5, f64::NAN] {
            assert!(builder(TrunkShape::Bonsai).shrink(bad).build().is_err(), "{bad}");
        }
        assert!(builder(TrunkShape::Bonsai).shrink(0.99).build().is_ok());
    }

    #[test]
    fn inverted_branch_range_rejected() {
        let err = builder(TrunkShape::Bonsai).branches(4, 2).build().unwrap_err();
        assert!(matches!(err, ConfigError::InvertedRange { .. }));
    }

    #[test]
    fn every_trunk_shape_is_deterministic() {
        for shape in ALL_SHAPES {
            let tree = TreeGenerator::new(builder(shape).build().unwrap());
            let origin = BlockPos::new(3, 64, -7);
            let a = generate(&tree, &mut RandomSource::new(11), origin).unwrap();
            let b = generate(&tree, &mut RandomSource::new(11), origin).unwrap();
            assert_eq!(a.batch, b.batch, "{shape:?}");
            assert!(a.failures.is_empty());
            assert_eq!(
                a.batch.placements.iter().find(|p| p.pos == origin).map(|p| p.block),
                Some(blocks::LOG),
                "{shape:?} trunk starts at origin"
            );
            assert!(a.batch.placements.iter().any(|p| p.block == blocks::LEAVES));
        }
    }

    #[test]
    fn branch_recursion_stops_at_max_depth() {
        for depth in 0..=4 {
            for seed in 0..8 {
                let tree = TreeGenerator::new(
                    builder(TrunkShape::Bonsai)
                        .branches(3, 3)
                        .branch_length(6.0)
                        .shrink(0.9)
                        .max_depth(depth)
                        .build()
                        .unwrap(),
                );
                let out = generate(&tree, &mut RandomSource::new(seed), BlockPos::ZERO).unwrap();
                let ordinary_waves = out.stats.waves - out.stats.finalising_tasks;
                assert!(
                    ordinary_waves <= depth as usize,
                    "depth {depth} seed {seed}: {ordinary_waves} waves"
                );
                if depth == 0 {
                    assert_eq!(out.stats.ordinary_tasks, 0);
                }
            }
        }
    }

    #[test]
    fn leaves_never_replace_wood() {
        let wood_of = |leaf_radius: f64| {
            let tree = TreeGenerator::new(
                builder(TrunkShape::Slanted { lean: 0.2 })
                    .leaf_style(LeafStyle::Blob { radius: leaf_radius })
                    .build()
                    .unwrap(),
            );
            let out = generate(&tree, &mut RandomSource::new(4), BlockPos::ZERO).unwrap();
            let mut wood: Vec<_> = out
                .batch
                .placements
                .iter()
                .filter(|p| p.block == blocks::LOG)
                .map(|p| p.pos.to_array())
                .collect();
            wood.sort_unstable();
            wood
        };
        assert_eq!(wood_of(0.5), wood_of(4.0));
    }

    #[test]
    fn leaf_styles_all_produce_foliage() {
        let styles = [
            LeafStyle::HangingVines { length: 3 },
            LeafStyle::ThickHanging { length: 3 },
            LeafStyle::MushroomCap { radius: 4.0 },
            LeafStyle::TipDecoration,
            LeafStyle::NeedleArms { length: 3.0 },
        ];
        for style in styles {
            let tree = TreeGenerator::new(
                builder(TrunkShape::Coniferous)
                    .decoration(blocks::VINE)
                    .leaf_style(style)
                    .build()
                    .unwrap(),
            );
            let out = generate(&tree, &mut RandomSource::new(21), BlockPos::new(0, 70, 0)).unwrap();
            let leaves = out
                .batch
                .placements
                .iter()
                .filter(|p| p.block == blocks::LEAVES)
                .count();
            assert!(leaves > 0, "{style:?}");
        }
    }

    #[test]
    fn presets_build() {
        for tree in [
            TreeGenerator::oak(),
            TreeGenerator::birch(),
            TreeGenerator::pine(),
            TreeGenerator::jungle(),
        ] {
            assert!(tree.is_ok());
        }
    }

    #[test]
    fn parallel_waves_match_sequential() {
        let tree = TreeGenerator::new(builder(TrunkShape::MultiTrunk { count: 3 }).max_depth(3).build().unwrap());
        let seq = generate(&tree, &mut RandomSource::new(9), BlockPos::ZERO).unwrap();
        let par = Scheduler::new(ExecutionMode::Parallel { workers: 3 })
            .run(&tree, &mut RandomSource::new(9), BlockPos::ZERO)
            .unwrap();
        assert_eq!(seq.batch, par.batch);
    }
}
