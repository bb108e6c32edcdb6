//! Crystal shards: hexagonal columns along a tilted axis.
//!
//! Clustered copies run as ordinary subtasks. Damage is applied by a single
//! finalising pass over everything the shard and its cluster placed.

use std::f64::consts::TAU;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strata_core::math::{any_perpendicular, block_center, rotate_around};
use strata_core::{to_block_pos, BlockPos, RandomSource, Vec3};
use tracing::trace;

use crate::blocks;
use crate::chunk::BlockId;
use crate::curve::{radius, Curve, Profile};
use crate::error::{check_range, check_within, ConfigError, GenerationError};
use crate::scheduler::{Generator, SubGenerator};

const NAME: &str = "crystal";
const SQRT_3: f64 = 1.732_050_807_568_877_2;
const DAMAGE_SALT: u64 = 0xDA4A;

/// True when `(x, z)` lies inside a flat-sided hexagon of circumradius `r`.
#[inline]
pub fn in_hexagon(x: f64, z: f64, r: f64) -> bool {
    let (x, z) = (x.abs(), z.abs());
    z <= SQRT_3 / 2.0 * r && z + SQRT_3 * x <= SQRT_3 * r
}

/// Post-processing applied once all shards are placed.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Damage {
    #[default]
    None,
    /// The part above a random break plane is rotated and shifted.
    SlightlyBroken,
    /// A horizontal band loses voxels at random.
    Cracked,
}

/// Satellite shards scattered around the main one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub count: (u32, u32),
    /// Horizontal distance range from the origin.
    pub spread: (f64, f64),
    /// Size factor range applied to satellites.
    pub shrink: (f64, f64),
}

/// Validated shard parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CrystalConfig {
    pub block: BlockId,
    pub height: (f64, f64),
    pub radius: (f64, f64),
    /// Maximum tilt of the axis away from vertical.
    pub max_tilt: f64,
    /// Fraction of the height where the tip taper begins.
    pub tip_start: f64,
    pub tip_curve: Curve,
    /// Inner radius as a fraction of the outer one.
    pub hollow: Option<f64>,
    pub cluster: Option<Cluster>,
    pub damage: Damage,
    /// Fraction of voxels removed inside a crack band.
    pub crack_density: f64,
}

#[derive(Debug, Clone)]
pub struct CrystalBuilder {
    block: Option<BlockId>,
    height: (f64, f64),
    radius: (f64, f64),
    max_tilt: f64,
    tip_start: f64,
    tip_curve: Curve,
    hollow: Option<f64>,
    cluster: Option<Cluster>,
    damage: Damage,
    crack_density: f64,
}

impl Default for CrystalBuilder {
    fn default() -> Self {
        Self {
            block: None,
            height: (6.0, 10.0),
            radius: (1.5, 2.5),
            max_tilt: 0.35,
            tip_start: 0.7,
            tip_curve: Curve::Quadratic,
            hollow: None,
            cluster: None,
            damage: Damage::None,
            crack_density: 0.6,
        }
    }
}

impl CrystalBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block(mut self, block: BlockId) -> Self {
        self.block = Some(block);
        self
    }

    pub fn height(mut self, min: f64, max: f64) -> Self {
        self.height = (min, max);
        self
    }

    pub fn radius(mut self, min: f64, max: f64) -> Self {
        self.radius = (min, max);
        self
    }

    pub fn max_tilt(mut self, radians: f64) -> Self {
        self.max_tilt = radians;
        self
    }

    pub fn tip(mut self, start: f64, curve: Curve) -> Self {
        self.tip_start = start;
        self.tip_curve = curve;
        self
    }

    pub fn hollow(mut self, inner_fraction: f64) -> Self {
        self.hollow = Some(inner_fraction);
        self
    }

    pub fn cluster(mut self, cluster: Cluster) -> Self {
        self.cluster = Some(cluster);
        self
    }

    pub fn damage(mut self, damage: Damage) -> Self {
        self.damage = damage;
        self
    }

    pub fn crack_density(mut self, density: f64) -> Self {
        self.crack_density = density;
        self
    }

    pub fn build(self) -> Result<CrystalConfig, ConfigError> {
        let block = self.block.ok_or(ConfigError::missing(NAME, "block"))?;
        check_range(NAME, "height", self.height.0, self.height.1)?;
        check_within(NAME, "height", self.height.0, 1.0, 64.0, "1..=64")?;
        check_within(NAME, "height", self.height.1, 1.0, 64.0, "1..=64")?;
        check_range(NAME, "radius", self.radius.0, self.radius.1)?;
        check_within(NAME, "radius", self.radius.0, 0.5, 16.0, "0.5..=16")?;
        check_within(NAME, "radius", self.radius.1, 0.5, 16.0, "0.5..=16")?;
        check_within(NAME, "max_tilt", self.max_tilt, 0.0, 1.2, "0..=1.2 rad")?;
        check_within(NAME, "tip_start", self.tip_start, 0.0, 1.0, "0..=1")?;
        check_within(NAME, "crack_density", self.crack_density, 0.0, 1.0, "0..=1")?;
        if let Some(inner) = self.hollow {
            if !(0.0..1.0).contains(&inner) {
                return Err(ConfigError::out_of_range(NAME, "hollow", inner, "0 <= hollow < 1"));
            }
        }
        if let Some(cluster) = self.cluster {
            check_range(NAME, "cluster.count", f64::from(cluster.count.0), f64::from(cluster.count.1))?;
            check_within(NAME, "cluster.count", f64::from(cluster.count.1), 0.0, 16.0, "0..=16")?;
            check_range(NAME, "cluster.spread", cluster.spread.0, cluster.spread.1)?;
            check_within(NAME, "cluster.spread", cluster.spread.0, 0.0, 32.0, "0..=32")?;
            check_range(NAME, "cluster.shrink", cluster.shrink.0, cluster.shrink.1)?;
            if !(cluster.shrink.0 > 0.0 && cluster.shrink.1 < 1.0) {
                return Err(ConfigError::out_of_range(
                    NAME,
                    "cluster.shrink",
                    cluster.shrink.1,
                    "0 < shrink < 1",
                ));
            }
        }
        Ok(CrystalConfig {
            block,
            height: self.height,
            radius: self.radius,
            max_tilt: self.max_tilt,
            tip_start: self.tip_start,
            tip_curve: self.tip_curve,
            hollow: self.hollow,
            cluster: self.cluster,
            damage: self.damage,
            crack_density: self.crack_density,
        })
    }
}

/// One shard instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shard {
    pub base: Vec3,
    pub axis: Vec3,
    pub height: f64,
    pub radius: f64,
}

impl Shard {
    /// Voxels covered by this shard, in a fixed scan order.
    pub fn cells(&self, cfg: &CrystalConfig) -> Vec<BlockPos> {
        let axis = self.axis.normalize_or_zero();
        let axis = if axis == Vec3::ZERO { Vec3::Y } else { axis };
        let u = any_perpendicular(axis);
        let w = axis.cross(u);
        let profile = radius(self.radius, 0.0, cfg.tip_start, 1.0, cfg.tip_curve);

        let reach = (self.height + self.radius).ceil() as i32 + 1;
        let lo = to_block_pos(self.base) - BlockPos::splat(reach);
        let hi = to_block_pos(self.base) + BlockPos::splat(reach);
        let mut cells = Vec::new();
        for y in lo.y..=hi.y {
            for z in lo.z..=hi.z {
                for x in lo.x..=hi.x {
                    let pos = BlockPos::new(x, y, z);
                    let v = block_center(pos) - self.base;
                    let h = v.dot(axis);
                    if h < 0.0 || h > self.height {
                        continue;
                    }
                    let r = profile.eval(h / self.height);
                    let q = v - axis * h;
                    let (lx, lz) = (q.dot(u), q.dot(w));
                    if !in_hexagon(lx, lz, r.max(0.5)) {
                        continue;
                    }
                    if let Some(inner) = cfg.hollow {
                        // Keep the base plate closed.
                        if h >= 1.0 && in_hexagon(lx, lz, r * inner) {
                            continue;
                        }
                    }
                    cells.push(pos);
                }
            }
        }
        cells
    }
}

#[derive(Debug, Clone)]
pub struct CrystalGenerator {
    config: Arc<CrystalConfig>,
}

impl CrystalGenerator {
    pub fn new(config: CrystalConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn amethyst_cluster() -> Result<Self, ConfigError> {
        CrystalBuilder::new()
            .block(blocks::AMETHYST)
            .cluster(Cluster {
                count: (2, 4),
                spread: (2.0, 4.0),
                shrink: (0.4, 0.7),
            })
            .build()
            .map(Self::new)
    }

    pub fn ice_spire() -> Result<Self, ConfigError> {
        CrystalBuilder::new()
            .block(blocks::PACKED_ICE)
            .height(10.0, 18.0)
            .radius(2.0, 3.0)
            .max_tilt(0.15)
            .damage(Damage::Cracked)
            .build()
            .map(Self::new)
    }
}

fn tilted_axis(rng: &mut RandomSource, max_tilt: f64) -> Vec3 {
    let tilt = rng.next_range(0.0, max_tilt);
    let azimuth = rng.next_range(0.0, TAU);
    Vec3::new(tilt.sin() * azimuth.cos(), tilt.cos(), tilt.sin() * azimuth.sin())
}

fn place_shard(ctx: &mut SubGenerator<'_>, cfg: &CrystalConfig, shard: &Shard) -> usize {
    shard
        .cells(cfg)
        .into_iter()
        .filter(|&pos| ctx.guard_and_store(pos, cfg.block, false))
        .count()
}

impl Generator for CrystalGenerator {
    fn name(&self) -> &str {
        NAME
    }

    fn reach(&self) -> Option<u32> {
        let cfg = &self.config;
        let (height, radius) = (cfg.height.1, cfg.radius.1);
        // Shard cells stay inside a cube of half-side `height + radius + 1` around the base.
        let mut far = (height + radius).ceil() + 1.0;
        if let Some(cluster) = cfg.cluster {
            let satellite = ((height + radius) * cluster.shrink.1 + 0.5).ceil() + 1.0;
            far = far.max(cluster.spread.1 + 0.5 + satellite);
        }
        if cfg.damage == Damage::SlightlyBroken {
            // Broken tips swing around a pivot on the axis and shift by up to a block.
            far = far.max(1.8 * height + 1.2 * radius + 3.0);
        }
        Some(far.ceil() as u32 + 1)
    }

    fn build(
        &self,
        ctx: &mut SubGenerator<'_>,
        rng: &mut RandomSource,
        origin: BlockPos,
    ) -> Result<(), GenerationError> {
        let cfg = &self.config;
        let main = Shard {
            base: block_center(origin),
            axis: tilted_axis(rng, cfg.max_tilt),
            height: rng.next_range(cfg.height.0, cfg.height.1),
            radius: rng.next_range(cfg.radius.0, cfg.radius.1),
        };
        let placed = place_shard(ctx, cfg, &main);
        if placed == 0 {
            return Err(GenerationError::Degenerate(format!(
                "shard at {origin} placed no voxels"
            )));
        }
        trace!(placed, height = main.height, "main shard");

        if let Some(cluster) = cfg.cluster {
            let count = rng.next_int_inclusive(cluster.count.0 as i32, cluster.count.1 as i32);
            for i in 0..count.max(0) {
                let mut child = rng.fork(i as u64);
                let config = Arc::clone(cfg);
                ctx.submit_subtask(move |ctx| {
                    let angle = child.next_range(0.0, TAU);
                    let distance = child.next_range(cluster.spread.0, cluster.spread.1);
                    let factor = child.next_range(cluster.shrink.0, cluster.shrink.1);
                    let offset = Vec3::new(angle.cos(), 0.0, angle.sin()) * distance;
                    // Satellites lean away from the main shard.
                    let outward = rotate_around(Vec3::Y, Vec3::new(-angle.sin(), 0.0, angle.cos()), -0.35);
                    let satellite = Shard {
                        base: main.base + offset,
                        axis: (outward + tilted_axis(&mut child, config.max_tilt) * 0.5).normalize_or_zero(),
                        height: main.height * factor,
                        radius: (main.radius * factor).max(0.5),
                    };
                    place_shard(ctx, &config, &satellite);
                    Ok(())
                });
            }
        }

        match cfg.damage {
            Damage::None => {}
            Damage::SlightlyBroken => {
                let damage_rng = rng.fork(DAMAGE_SALT);
                let block = cfg.block;
                ctx.submit_finalising_subtask(move |ctx| {
                    break_off(ctx, damage_rng, &main, block);
                    Ok(())
                });
            }
            Damage::Cracked => {
                let damage_rng = rng.fork(DAMAGE_SALT);
                let (block, density) = (cfg.block, cfg.crack_density);
                ctx.submit_finalising_subtask(move |ctx| {
                    crack(ctx, damage_rng, &main, block, density);
                    Ok(())
                });
            }
        }
        Ok(())
    }
}

/// Rotate and shift everything above a random plane through the main shard.
fn break_off(ctx: &mut SubGenerator<'_>, mut rng: RandomSource, main: &Shard, block: BlockId) {
    let axis = main.axis.normalize_or_zero();
    let pivot = main.base + axis * main.height * rng.next_range(0.4, 0.8);
    let hinge = rotate_around(any_perpendicular(axis), axis, rng.next_range(0.0, TAU));
    let normal = rotate_around(axis, hinge, rng.next_range(0.0, 0.4));
    let tilt = rng.next_range(0.2, 0.5);
    let shift = Vec3::new(rng.next_range(-1.0, 1.0), -1.0, rng.next_range(-1.0, 1.0));

    let upper = ctx.take_where(|p| p.block == block && (block_center(p.pos) - pivot).dot(normal) > 0.0);
    trace!(moved = upper.len(), "breaking shard");
    for placement in upper {
        let rel = block_center(placement.pos) - pivot;
        let moved = pivot + rotate_around(rel, hinge, tilt) + shift;
        ctx.guard_and_store(to_block_pos(moved), placement.block, false);
    }
}

/// Remove voxels at random inside a horizontal band of the main shard.
fn crack(ctx: &mut SubGenerator<'_>, mut rng: RandomSource, main: &Shard, block: BlockId, density: f64) {
    let top = main.height * main.axis.normalize_or_zero().y;
    let band_start = main.base.y + top * rng.next_range(0.3, 0.7);
    let band = rng.next_int_inclusive(1, 2);
    let lo = band_start.floor() as i32;
    let hi = lo + band;
    let candidates: Vec<BlockPos> = ctx
        .visible_placements()
        .into_iter()
        .filter(|p| p.block == block && (lo..hi).contains(&p.pos.y))
        .map(|p| p.pos)
        .collect();
    for pos in candidates {
        if rng.chance(density) {
            ctx.remove_at(pos);
        }
    }
}
