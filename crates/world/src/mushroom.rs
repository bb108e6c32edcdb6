//! Giant mushrooms: a leaning stem and a cap shaped by a radial height profile.

use std::f64::consts::TAU;
use std::fmt;
use std::sync::Arc;

use strata_core::math::block_center;
use strata_core::{BlockPos, RandomSource, Vec3};

use crate::blocks;
use crate::chunk::BlockId;
use crate::curve::{Profile, SharedProfile};
use crate::error::{check_range, check_within, ConfigError, GenerationError};
use crate::placement::Stamp;
use crate::scheduler::{Generator, SubGenerator};

const NAME: &str = "mushroom";
const SPOT_SALT: u64 = 0x5907;

/// Ellipsoidal spots painted onto the finished cap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spots {
    pub block: BlockId,
    pub count: (u32, u32),
    /// Ellipsoid semi-axes (x, y, z).
    pub size: Vec3,
}

/// True when `offset` lies inside the ellipsoid with semi-axes `size`.
#[inline]
pub fn in_ellipsoid(offset: Vec3, size: Vec3) -> bool {
    let q = offset / size.max(Vec3::splat(1e-6));
    q.length_squared() <= 1.0
}

#[derive(Clone)]
pub struct MushroomConfig {
    pub stem: BlockId,
    pub cap: BlockId,
    pub stem_height: (u32, u32),
    pub stem_radius: f64,
    /// Largest horizontal drift per block of height.
    pub max_lean: f64,
    /// Random change applied to the drift each layer.
    pub lean_step: f64,
    pub cap_radius: (f64, f64),
    /// Cap height above its base as a function of normalized radial distance.
    pub cap_profile: SharedProfile,
    pub cap_thickness: u32,
    /// Thin the inner rings to a single shell.
    pub hollow: bool,
    pub spots: Option<Spots>,
}

impl fmt::Debug for MushroomConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MushroomConfig")
            .field("stem", &self.stem)
            .field("cap", &self.cap)
            .field("stem_height", &self.stem_height)
            .field("max_lean", &self.max_lean)
            .field("cap_radius", &self.cap_radius)
            .field("hollow", &self.hollow)
            .field("spots", &self.spots)
            .finish_non_exhaustive()
    }
}

/// Builder for [`MushroomConfig`].
#[derive(Clone)]
pub struct MushroomBuilder {
    stem: Option<BlockId>,
    cap: Option<BlockId>,
    stem_height: (u32, u32),
    stem_radius: f64,
    max_lean: f64,
    lean_step: f64,
    cap_radius: (f64, f64),
    cap_profile: Option<SharedProfile>,
    cap_thickness: u32,
    hollow: bool,
    spots: Option<Spots>,
}

impl Default for MushroomBuilder {
    fn default() -> Self {
        Self {
            stem: None,
            cap: None,
            stem_height: (5, 8),
            stem_radius: 1.0,
            max_lean: 0.3,
            lean_step: 0.15,
            cap_radius: (3.0, 5.0),
            cap_profile: None,
            cap_thickness: 2,
            hollow: false,
            spots: None,
        }
    }
}

impl MushroomBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stem(mut self, block: BlockId) -> Self {
        self.stem = Some(block);
        self
    }

    pub fn cap(mut self, block: BlockId) -> Self {
        self.cap = Some(block);
        self
    }

    pub fn stem_height(mut self, min: u32, max: u32) -> Self {
        self.stem_height = (min, max);
        self
    }

    pub fn stem_radius(mut self, radius: f64) -> Self {
        self.stem_radius = radius;
        self
    }

    pub fn lean(mut self, max_lean: f64, step: f64) -> Self {
        self.max_lean = max_lean;
        self.lean_step = step;
        self
    }

    pub fn cap_radius(mut self, min: f64, max: f64) -> Self {
        self.cap_radius = (min, max);
        self
    }

    pub fn cap_profile(mut self, profile: SharedProfile) -> Self {
        self.cap_profile = Some(profile);
        self
    }

    pub fn cap_thickness(mut self, layers: u32) -> Self {
        self.cap_thickness = layers;
        self
    }

    pub fn hollow(mut self, hollow: bool) -> Self {
        self.hollow = hollow;
        self
    }

    pub fn spots(mut self, spots: Spots) -> Self {
        self.spots = Some(spots);
        self
    }

    pub fn build(self) -> Result<MushroomConfig, ConfigError> {
        let stem = self.stem.ok_or(ConfigError::missing(NAME, "stem"))?;
        let cap = self.cap.ok_or(ConfigError::missing(NAME, "cap"))?;
        check_range(
            NAME,
            "stem_height",
            f64::from(self.stem_height.0),
            f64::from(self.stem_height.1),
        )?;
        check_within(NAME, "stem_height", f64::from(self.stem_height.0), 1.0, 64.0, "1..=64")?;
        check_within(NAME, "stem_radius", self.stem_radius, 0.0, 6.0, "0..=6")?;
        check_within(NAME, "max_lean", self.max_lean, 0.0, 1.0, "0..=1")?;
        check_within(NAME, "lean_step", self.lean_step, 0.0, 1.0, "0..=1")?;
        check_range(NAME, "cap_radius", self.cap_radius.0, self.cap_radius.1)?;
        check_within(NAME, "cap_radius", self.cap_radius.0, 1.0, 16.0, "1..=16")?;
        check_within(NAME, "cap_radius", self.cap_radius.1, 1.0, 16.0, "1..=16")?;
        check_within(NAME, "cap_thickness", f64::from(self.cap_thickness), 1.0, 8.0, "1..=8")?;
        if let Some(spots) = self.spots {
            check_range(NAME, "spots.count", f64::from(spots.count.0), f64::from(spots.count.1))?;
            if spots.size.min_element() <= 0.0 {
                return Err(ConfigError::out_of_range(
                    NAME,
                    "spots.size",
                    spots.size.min_element(),
                    "positive semi-axes",
                ));
            }
        }
        let cap_profile = self
            .cap_profile
            .unwrap_or_else(|| Arc::new(|t: f64| 2.5 * (1.0 - t * t)));
        Ok(MushroomConfig {
            stem,
            cap,
            stem_height: self.stem_height,
            stem_radius: self.stem_radius,
            max_lean: self.max_lean,
            lean_step: self.lean_step,
            cap_radius: self.cap_radius,
            cap_profile,
            cap_thickness: self.cap_thickness,
            hollow: self.hollow,
            spots: self.spots,
        })
    }
}

/// Random-walk stem centerline, one point per layer starting at `origin`.
///
/// The horizontal drift per layer never exceeds `max_lean`.
pub fn stem_path(rng: &mut RandomSource, cfg: &MushroomConfig, origin: Vec3, height: u32) -> Vec<Vec3> {
    let mut drift = (0.0f64, 0.0f64);
    let mut center = origin;
    let mut points = Vec::with_capacity(height as usize);
    points.push(center);
    for _ in 1..height {
        drift.0 += rng.next_range(-cfg.lean_step, cfg.lean_step);
        drift.1 += rng.next_range(-cfg.lean_step, cfg.lean_step);
        let len = (drift.0 * drift.0 + drift.1 * drift.1).sqrt();
        if len > cfg.max_lean {
            let scale = cfg.max_lean / len;
            drift = (drift.0 * scale, drift.1 * scale);
        }
        center += Vec3::new(drift.0, 1.0, drift.1);
        points.push(center);
    }
    points
}

#[derive(Debug, Clone)]
pub struct MushroomGenerator {
    config: Arc<MushroomConfig>,
}

impl MushroomGenerator {
    pub fn new(config: MushroomConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &MushroomConfig {
        &self.config
    }

    pub fn red() -> Result<Self, ConfigError> {
        MushroomBuilder::new()
            .stem(blocks::MUSHROOM_STEM)
            .cap(blocks::RED_MUSHROOM_CAP)
            .hollow(true)
            .spots(Spots {
                block: blocks::MUSHROOM_SPOT,
                count: (3, 6),
                size: Vec3::new(1.2, 0.8, 1.2),
            })
            .build()
            .map(Self::new)
    }

    pub fn brown() -> Result<Self, ConfigError> {
        MushroomBuilder::new()
            .stem(blocks::MUSHROOM_STEM)
            .cap(blocks::BROWN_MUSHROOM_CAP)
            .cap_radius(4.0, 6.0)
            .cap_thickness(1)
            .cap_profile(Arc::new(|t: f64| 1.0 - t.powi(4)))
            .build()
            .map(Self::new)
    }
}

impl Generator for MushroomGenerator {
    fn name(&self) -> &str {
        NAME
    }

    fn reach(&self) -> Option<u32> {
        let cfg = &self.config;
        let lean = f64::from(cfg.stem_height.1.saturating_sub(1)) * cfg.max_lean;
        let spots = cfg.spots.map_or(0.0, |s| s.size.max_element().ceil());
        let far = lean + cfg.stem_radius.max(cfg.cap_radius.1 + spots);
        Some(far.ceil() as u32 + 1)
    }

    fn build(
        &self,
        ctx: &mut SubGenerator<'_>,
        rng: &mut RandomSource,
        origin: BlockPos,
    ) -> Result<(), GenerationError> {
        let cfg = &self.config;
        let height = rng.next_int_inclusive(cfg.stem_height.0 as i32, cfg.stem_height.1 as i32) as u32;
        let stem = stem_path(rng, cfg, block_center(origin), height);
        for point in &stem {
            ctx.guard_and_store_radius(
                strata_core::to_block_pos(*point),
                cfg.stem,
                false,
                cfg.stem_radius,
                Stamp::Disc,
            );
        }

        let top = stem.last().copied().unwrap_or_else(|| block_center(origin));
        let cap_radius = rng.next_range(cfg.cap_radius.0, cfg.cap_radius.1);
        let base = strata_core::to_block_pos(top) + BlockPos::Y;
        build_cap(ctx, cfg, base, cap_radius);

        if let Some(spots) = cfg.spots {
            let spot_rng = rng.fork(SPOT_SALT);
            let cap = cfg.cap;
            ctx.submit_finalising_subtask(move |ctx| {
                paint_spots(ctx, spot_rng, cap, spots);
                Ok(())
            });
        }
        Ok(())
    }
}

fn build_cap(ctx: &mut SubGenerator<'_>, cfg: &MushroomConfig, base: BlockPos, radius: f64) {
    let reach = radius.ceil() as i32;
    let inner_rings = (radius * 0.6).floor() as i32;
    for dz in -reach..=reach {
        for dx in -reach..=reach {
            let d = f64::from(dx * dx + dz * dz).sqrt();
            if d > radius {
                continue;
            }
            let ring = d.round() as i32;
            let lift = cfg.cap_profile.eval(d / radius).round() as i32;
            let layers = if cfg.hollow && ring < inner_rings {
                1
            } else {
                cfg.cap_thickness as i32
            };
            for layer in 0..layers {
                let pos = BlockPos::new(base.x + dx, base.y + lift - layer, base.z + dz);
                ctx.guard_and_store(pos, cfg.cap, false);
            }
        }
    }
}

/// Replace cap voxels inside a few ellipsoids centred on the cap surface.
fn paint_spots(ctx: &mut SubGenerator<'_>, mut rng: RandomSource, cap: BlockId, spots: Spots) {
    let mut surface: Vec<BlockPos> = ctx
        .visible_placements()
        .into_iter()
        .filter(|p| p.block == cap && ctx.queued_state(p.pos + BlockPos::Y) != cap)
        .map(|p| p.pos)
        .collect();
    surface.sort_unstable_by_key(|p| (p.x, p.z, p.y));
    if surface.is_empty() {
        return;
    }
    let count = rng.next_int_inclusive(spots.count.0 as i32, spots.count.1 as i32);
    let reach = spots.size.max_element().ceil() as i32;
    for _ in 0..count {
        let center = surface[rng.next_int(0, surface.len() as i32) as usize];
        let spin = rng.next_range(0.0, TAU);
        let (sin, cos) = spin.sin_cos();
        for dy in -reach..=reach {
            for dz in -reach..=reach {
                for dx in -reach..=reach {
                    let offset = Vec3::new(
                        f64::from(dx) * cos - f64::from(dz) * sin,
                        f64::from(dy),
                        f64::from(dx) * sin + f64::from(dz) * cos,
                    );
                    let pos = center + BlockPos::new(dx, dy, dz);
                    if in_ellipsoid(offset, spots.size) && ctx.queued_state(pos) == cap {
                        ctx.guard_and_store(pos, spots.block, true);
                    }
                }
            }
        }
    }
}
