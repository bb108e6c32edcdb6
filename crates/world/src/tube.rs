//! Tube coral: a hollow vertical tube with an optional flared mouth, rim
//! and spherical reservoir.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strata_core::{BlockPos, RandomSource};

use crate::blocks;
use crate::chunk::BlockId;
use crate::error::{check_range, check_within, ConfigError, GenerationError};
use crate::scheduler::{Generator, SubGenerator};

const NAME: &str = "tube";

/// True when `(dx, dz)` is part of the ring between `inner` and `outer`.
#[inline]
pub fn in_ring(dx: i32, dz: i32, outer: f64, inner: f64) -> bool {
    let d2 = f64::from(dx * dx + dz * dz);
    d2 <= outer * outer && d2 > inner * inner
}

/// Quadratic widening of the tube above `start` (a fraction of the height).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Flare {
    pub start: f64,
    /// Extra radius reached at the top layer.
    pub strength: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TubeConfig {
    pub wall: BlockId,
    /// Interior fill for the tube and reservoir.
    pub fill: Option<BlockId>,
    pub height: (u32, u32),
    pub tube_radius: f64,
    pub wall_thickness: f64,
    pub flare: Option<Flare>,
    pub rim_cap: bool,
    /// Radius of the spherical shell below the origin.
    pub reservoir: Option<f64>,
}

impl TubeConfig {
    /// Outer radius of layer `y` (0 at the origin) in a tube of `height`.
    pub fn outer_radius(&self, y: u32, height: u32) -> f64 {
        match self.flare {
            Some(flare) if height > 0 => {
                let start = flare.start * f64::from(height);
                let y = f64::from(y);
                if y <= start {
                    self.tube_radius
                } else {
                    let t = (y - start) / (f64::from(height) - start).max(1e-9);
                    self.tube_radius + flare.strength * t * t
                }
            }
            _ => self.tube_radius,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TubeBuilder {
    wall: Option<BlockId>,
    fill: Option<BlockId>,
    height: (u32, u32),
    tube_radius: f64,
    wall_thickness: f64,
    flare: Option<Flare>,
    rim_cap: bool,
    reservoir: (bool, f64),
}

impl Default for TubeBuilder {
    fn default() -> Self {
        Self {
            wall: None,
            fill: None,
            height: (4, 9),
            tube_radius: 2.0,
            wall_thickness: 1.0,
            flare: None,
            rim_cap: false,
            reservoir: (false, 0.0),
        }
    }
}

impl TubeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wall(mut self, block: BlockId) -> Self {
        self.wall = Some(block);
        self
    }

    pub fn fill(mut self, block: BlockId) -> Self {
        self.fill = Some(block);
        self
    }

    pub fn height_range(mut self, min: u32, max: u32) -> Self {
        self.height = (min, max);
        self
    }

    pub fn tube_radius(mut self, radius: f64) -> Self {
        self.tube_radius = radius;
        self
    }

    pub fn wall_thickness(mut self, thickness: f64) -> Self {
        self.wall_thickness = thickness;
        self
    }

    pub fn flare(mut self, start: f64, strength: f64) -> Self {
        self.flare = Some(Flare { start, strength });
        self
    }

    pub fn rim_cap(mut self, enabled: bool) -> Self {
        self.rim_cap = enabled;
        self
    }

    pub fn reservoir(mut self, enabled: bool, radius: f64) -> Self {
        self.reservoir = (enabled, radius);
        self
    }

    pub fn build(self) -> Result<TubeConfig, ConfigError> {
        let wall = self.wall.ok_or(ConfigError::missing(NAME, "wall"))?;
        check_range(NAME, "height", f64::from(self.height.0), f64::from(self.height.1))?;
        check_within(NAME, "height", f64::from(self.height.1), 0.0, 128.0, "0..=128")?;
        check_within(NAME, "tube_radius", self.tube_radius, 1.0, 16.0, "1..=16")?;
        check_within(
            NAME,
            "wall_thickness",
            self.wall_thickness,
            f64::EPSILON,
            self.tube_radius,
            "0 < thickness <= tube_radius",
        )?;
        if let Some(flare) = self.flare {
            check_within(NAME, "flare.start", flare.start, 0.0, 1.0, "0..=1")?;
            check_within(NAME, "flare.strength", flare.strength, 0.0, 16.0, "0..=16")?;
        }
        let reservoir = match self.reservoir {
            (true, radius) => {
                check_within(NAME, "reservoir", radius, 1.0, 16.0, "1..=16")?;
                Some(radius)
            }
            (false, _) => None,
        };
        Ok(TubeConfig {
            wall,
            fill: self.fill,
            height: self.height,
            tube_radius: self.tube_radius,
            wall_thickness: self.wall_thickness,
            flare: self.flare,
            rim_cap: self.rim_cap,
            reservoir,
        })
    }
}

#[derive(Debug, Clone)]
pub struct TubeGenerator {
    config: Arc<TubeConfig>,
}

impl TubeGenerator {
    pub fn new(config: TubeConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &TubeConfig {
        &self.config
    }

    /// Flared tube coral with a rim, as used by the warm ocean biome.
    pub fn coral() -> Result<Self, ConfigError> {
        TubeBuilder::new()
            .wall(blocks::TUBE_CORAL)
            .fill(blocks::WATER)
            .height_range(4, 8)
            .flare(0.6, 1.5)
            .rim_cap(true)
            .build()
            .map(Self::new)
    }
}

impl Generator for TubeGenerator {
    fn name(&self) -> &str {
        NAME
    }

    fn reach(&self) -> Option<u32> {
        let cfg = &self.config;
        let flare = cfg.flare.map_or(0.0, |f| f.strength.max(0.0));
        let mut far = cfg.tube_radius + flare;
        if cfg.rim_cap {
            far += 1.0;
        }
        if let Some(radius) = cfg.reservoir {
            far = far.max(radius);
        }
        Some(far.ceil() as u32 + 1)
    }

    fn build(
        &self,
        ctx: &mut SubGenerator<'_>,
        rng: &mut RandomSource,
        origin: BlockPos,
    ) -> Result<(), GenerationError> {
        let cfg = Arc::clone(&self.config);
        let height = rng.next_int_inclusive(cfg.height.0 as i32, cfg.height.1 as i32) as u32;

        for y in 0..=height {
            let outer = cfg.outer_radius(y, height);
            let inner = outer - cfg.wall_thickness;
            stamp_ring(ctx, origin + BlockPos::new(0, y as i32, 0), cfg.wall, outer, inner);
        }

        if cfg.rim_cap {
            let outer = cfg.outer_radius(height, height);
            let lip = origin + BlockPos::new(0, height as i32 + 1, 0);
            let inner = outer - cfg.wall_thickness;
            let wall = cfg.wall;
            ctx.submit_subtask(move |ctx| {
                stamp_ring(ctx, lip, wall, outer + 1.0, inner);
                Ok(())
            });
        }

        if let Some(radius) = cfg.reservoir {
            let center = origin - BlockPos::new(0, radius.ceil() as i32, 0);
            let cfg = Arc::clone(&cfg);
            ctx.submit_subtask(move |ctx| {
                reservoir_shell(ctx, center, &cfg, radius);
                Ok(())
            });
        }

        if let Some(fill) = cfg.fill {
            let cfg = Arc::clone(&cfg);
            ctx.submit_finalising_subtask(move |ctx| {
                fill_interior(ctx, origin, &cfg, height, fill);
                Ok(())
            });
        }
        Ok(())
    }
}

fn stamp_ring(ctx: &mut SubGenerator<'_>, center: BlockPos, block: BlockId, outer: f64, inner: f64) {
    let reach = outer.ceil() as i32;
    for dz in -reach..=reach {
        for dx in -reach..=reach {
            if in_ring(dx, dz, outer, inner) {
                ctx.guard_and_store(center + BlockPos::new(dx, 0, dz), block, false);
            }
        }
    }
}

fn reservoir_shell(ctx: &mut SubGenerator<'_>, center: BlockPos, cfg: &TubeConfig, radius: f64) {
    let reach = radius.ceil() as i32;
    let inner = radius - cfg.wall_thickness;
    for dy in -reach..=reach {
        for dz in -reach..=reach {
            for dx in -reach..=reach {
                let d2 = f64::from(dx * dx + dy * dy + dz * dz);
                if d2 > radius * radius {
                    continue;
                }
                let pos = center + BlockPos::new(dx, dy, dz);
                // The tube opens into the top of the shell.
                if dx == 0 && dz == 0 && dy > 0 {
                    continue;
                }
                if d2 > inner * inner {
                    ctx.guard_and_store(pos, cfg.wall, false);
                }
            }
        }
    }
}

/// Fill every open cell inside the tube and the reservoir.
fn fill_interior(
    ctx: &mut SubGenerator<'_>,
    origin: BlockPos,
    cfg: &TubeConfig,
    height: u32,
    fill: BlockId,
) {
    for y in 0..=height {
        let inner = cfg.outer_radius(y, height) - cfg.wall_thickness;
        let reach = inner.ceil() as i32;
        for dz in -reach..=reach {
            for dx in -reach..=reach {
                if f64::from(dx * dx + dz * dz) <= inner * inner {
                    ctx.guard_and_store(origin + BlockPos::new(dx, y as i32, dz), fill, false);
                }
            }
        }
    }
    if let Some(radius) = cfg.reservoir {
        let center = origin - BlockPos::new(0, radius.ceil() as i32, 0);
        let inner = radius - cfg.wall_thickness;
        let reach = inner.ceil() as i32;
        for dy in -reach..=reach {
            for dz in -reach..=reach {
                for dx in -reach..=reach {
                    if f64::from(dx * dx + dy * dy + dz * dz) <= inner * inner {
                        ctx.guard_and_store(center + BlockPos::new(dx, dy, dz), fill, false);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::generate;
    use std::collections::HashMap;

    fn plain() -> TubeBuilder {
        TubeBuilder::new()
            .wall(blocks::TUBE_CORAL)
            .height_range(6, 6)
            .tube_radius(2.0)
            .wall_thickness(1.0)
            .reservoir(false, 0.0)
            .rim_cap(false)
    }

    #[test]
    fn ring_membership() {
        assert!(in_ring(2, 0, 2.0, 1.0));
        assert!(in_ring(1, 1, 2.0, 1.0));
        assert!(!in_ring(1, 0, 2.0, 1.0));
        assert!(!in_ring(2, 1, 2.0, 1.0));
        assert!(!in_ring(0, 0, 2.0, 1.0));
    }

    #[test]
    fn wall_is_required() {
        let err = TubeBuilder::new().build().unwrap_err();
        assert_eq!(err, ConfigError::missing(NAME, "wall"));
    }

    #[test]
    fn wall_thicker_than_radius_is_rejected() {
        let err = plain().wall_thickness(3.0).build().unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { field: "wall_thickness", .. }));
    }

    #[test]
    fn plain_tube_is_seven_rings_of_eight() {
        let gen = TubeGenerator::new(plain().build().unwrap());
        let out = generate(&gen, &mut RandomSource::new(3), BlockPos::ZERO).unwrap();
        assert!(out.failures.is_empty());
        assert!(out.batch.actions.is_empty());
        assert_eq!(out.batch.placements.len(), 56);

        let mut per_layer: HashMap<i32, usize> = HashMap::new();
        for p in &out.batch.placements {
            assert_eq!(p.block, blocks::TUBE_CORAL);
            assert!((0..=6).contains(&p.pos.y));
            assert!(in_ring(p.pos.x, p.pos.z, 2.0, 1.0), "{:?}", p.pos);
            *per_layer.entry(p.pos.y).or_default() += 1;
        }
        assert_eq!(per_layer.len(), 7);
        assert!(per_layer.values().all(|&n| n == 8));
    }

    #[test]
    fn flare_widens_only_above_start() {
        let cfg = plain().flare(0.5, 2.0).build().unwrap();
        assert_eq!(cfg.outer_radius(0, 6), 2.0);
        assert_eq!(cfg.outer_radius(3, 6), 2.0);
        assert!(cfg.outer_radius(5, 6) > 2.0);
        assert!((cfg.outer_radius(6, 6) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn rim_sits_on_top() {
        let gen = TubeGenerator::new(plain().rim_cap(true).build().unwrap());
        let out = generate(&gen, &mut RandomSource::new(3), BlockPos::ZERO).unwrap();
        let rim: Vec<_> = out.batch.placements.iter().filter(|p| p.pos.y == 7).collect();
        assert!(!rim.is_empty());
        assert!(rim.iter().any(|p| p.pos.x.abs() == 3 || p.pos.z.abs() == 3));
        assert!(out.batch.placements.iter().all(|p| p.pos.y <= 7));
    }

    #[test]
    fn reservoir_hangs_below_and_fill_stays_inside() {
        let gen = TubeGenerator::new(
            plain()
                .reservoir(true, 3.0)
                .fill(blocks::WATER)
                .build()
                .unwrap(),
        );
        let out = generate(&gen, &mut RandomSource::new(3), BlockPos::ZERO).unwrap();
        let below = out.batch.placements.iter().filter(|p| p.pos.y < 0).count();
        assert!(below > 0);
        let water: Vec<_> = out
            .batch
            .placements
            .iter()
            .filter(|p| p.block == blocks::WATER)
            .collect();
        assert!(!water.is_empty());
        for w in &water {
            let d2 = w.pos.x * w.pos.x + w.pos.z * w.pos.z;
            if w.pos.y >= 0 {
                assert!(d2 <= 1, "{:?}", w.pos);
            }
        }
    }

    #[test]
    fn coral_preset_is_deterministic() {
        let gen = TubeGenerator::coral().unwrap();
        let a = generate(&gen, &mut RandomSource::new(77), BlockPos::new(3, 40, 3)).unwrap();
        let b = generate(&gen, &mut RandomSource::new(77), BlockPos::new(3, 40, 3)).unwrap();
        assert_eq!(a.batch, b.batch);
    }
}
