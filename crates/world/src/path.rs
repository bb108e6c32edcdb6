//! Centerline construction and stamping helpers shared by the shape generators.
//!
//! A shape is built by producing a list of control points, smoothing and
//! resampling it to an even spacing, then stamping a radius profile along it.

use std::f64::consts::TAU;

use noise::{NoiseFn, Perlin};
use rand::RngCore;
use strata_core::math::{any_perpendicular, rotate_around};
use strata_core::{to_block_pos, RandomSource, Vec3};

use crate::chunk::BlockId;
use crate::curve::Profile;
use crate::placement::{PlacementTarget, Stamp};

/// Helical offset wrapped around the path's main axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Helix {
    pub radius: f64,
    /// Full revolutions over the path length.
    pub turns: f64,
}

/// Builds noise-perturbed centerlines.
#[derive(Debug, Clone, PartialEq)]
pub struct PathFactory {
    pub direction: Vec3,
    pub length: f64,
    /// Distance between control points.
    pub step: f64,
    /// Per-step probability of a sudden heading change.
    pub divergence_chance: f64,
    /// Maximum heading change in radians when a divergence fires.
    pub divergence_strength: f64,
    /// Lateral Perlin offset amplitude.
    pub wobble: f64,
    /// Perlin frequency over normalized progress.
    pub wobble_scale: f64,
    pub helix: Option<Helix>,
}

impl PathFactory {
    /// Straight path of `length` along `direction`.
    pub fn new(direction: Vec3, length: f64) -> Self {
        Self {
            direction,
            length,
            step: 1.0,
            divergence_chance: 0.0,
            divergence_strength: 0.0,
            wobble: 0.0,
            wobble_scale: 2.0,
            helix: None,
        }
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    pub fn with_divergence(mut self, chance: f64, strength: f64) -> Self {
        self.divergence_chance = chance;
        self.divergence_strength = strength;
        self
    }

    pub fn with_wobble(mut self, amplitude: f64, scale: f64) -> Self {
        self.wobble = amplitude;
        self.wobble_scale = scale;
        self
    }

    pub fn with_helix(mut self, helix: Helix) -> Self {
        self.helix = Some(helix);
        self
    }

    /// Build the control points starting at `start`.
    ///
    /// Always returns at least the start point. A non-positive length yields
    /// just the start.
    /// Farthest any built point can lie from the start.
    pub fn reach(&self) -> f64 {
        let helix = self.helix.map_or(0.0, |h| 2.0 * h.radius.abs());
        self.length.max(0.0) + 2.0 * self.wobble.abs() + helix
    }

    pub fn build(&self, rng: &mut RandomSource, start: Vec3) -> Vec<Vec3> {
        let mut points = vec![start];
        if !(self.length > 0.0) || !self.length.is_finite() {
            return points;
        }
        let step = if self.step > 0.0 { self.step } else { 1.0 };
        let steps = (self.length / step).ceil().max(1.0) as usize;
        let step = self.length / steps as f64;

        let perlin = Perlin::new(rng.next_u32());
        let mut heading = self.direction.normalize_or_zero();
        if heading == Vec3::ZERO {
            heading = Vec3::Y;
        }
        let side = any_perpendicular(heading);
        let up = heading.cross(side);

        let mut cursor = start;
        for i in 1..=steps {
            if rng.chance(self.divergence_chance) {
                let axis = rng.next_unit_vector();
                let angle = rng.next_range(-self.divergence_strength, self.divergence_strength);
                let turned = rotate_around(heading, axis, angle).normalize_or_zero();
                if turned != Vec3::ZERO {
                    heading = turned;
                }
            }
            cursor += heading * step;

            let t = i as f64 / steps as f64;
            let mut offset = Vec3::ZERO;
            if self.wobble != 0.0 {
                let u = t * self.wobble_scale;
                offset += side * perlin.get([u, 0.5]) * self.wobble;
                offset += up * perlin.get([u, 17.5]) * self.wobble;
            }
            if let Some(helix) = self.helix {
                let angle = TAU * helix.turns * t;
                offset += (side * (angle.cos() - 1.0) + up * angle.sin()) * helix.radius;
            }
            points.push(cursor + offset);
        }
        points
    }
}

/// Total polyline length.
pub fn path_length(points: &[Vec3]) -> f64 {
    points.windows(2).map(|w| w[0].distance(w[1])).sum()
}

/// Moving average over `window` neighbors on each side. Endpoints stay fixed.
pub fn smooth(points: &[Vec3], window: usize) -> Vec<Vec3> {
    if window == 0 || points.len() < 3 {
        return points.to_vec();
    }
    let last = points.len() - 1;
    points
        .iter()
        .enumerate()
        .map(|(i, &p)| {
            if i == 0 || i == last {
                return p;
            }
            let lo = i.saturating_sub(window);
            let hi = (i + window).min(last);
            let sum: Vec3 = points[lo..=hi].iter().copied().sum();
            sum / (hi - lo + 1) as f64
        })
        .collect()
}

/// Re-space a polyline so consecutive points are `spacing` apart.
///
/// The last input point is always kept. A zero-length path collapses to its
/// first point.
pub fn resample(points: &[Vec3], spacing: f64) -> Vec<Vec3> {
    let Some(&first) = points.first() else {
        return Vec::new();
    };
    let total = path_length(points);
    if total <= f64::EPSILON {
        return vec![first];
    }
    if !(spacing > 0.0) || !spacing.is_finite() {
        return points.to_vec();
    }

    let mut out = vec![first];
    let mut carried = 0.0;
    for segment in points.windows(2) {
        let (a, b) = (segment[0], segment[1]);
        let len = a.distance(b);
        if len <= f64::EPSILON {
            continue;
        }
        let mut along = spacing - carried;
        while along <= len {
            out.push(a.lerp(b, along / len));
            along += spacing;
        }
        carried = len - (along - spacing);
    }
    if let Some(&end) = points.last() {
        if out.last().is_some_and(|&p| p.distance(end) > 1e-9) {
            out.push(end);
        }
    }
    out
}

/// Stamp `profile(t)` radii along the points, `t` running 0..=1.
///
/// Returns the number of voxels stored.
pub fn stamp_along<T: PlacementTarget + ?Sized>(
    target: &mut T,
    points: &[Vec3],
    profile: &dyn Profile,
    block: BlockId,
    allow_override: bool,
    stamp: Stamp,
) -> usize {
    let denom = points.len().saturating_sub(1).max(1) as f64;
    points
        .iter()
        .enumerate()
        .map(|(i, &p)| {
            let radius = profile.eval(i as f64 / denom);
            target.stamp(to_block_pos(p), block, allow_override, radius, stamp)
        })
        .sum()
}

/// Orthonormal basis at a path point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub tangent: Vec3,
    pub normal: Vec3,
    pub left: Vec3,
}

impl Frame {
    /// Map local `(left, normal, tangent)` coordinates to world space.
    pub fn to_world(&self, local: Vec3) -> Vec3 {
        self.left * local.x + self.normal * local.y + self.tangent * local.z
    }
}

/// Reconstruct the local frame at point `i` from its neighbors.
///
/// The normal leans toward world up where possible.
pub fn frame_at(points: &[Vec3], i: usize) -> Frame {
    let tangent = if points.len() < 2 {
        Vec3::Y
    } else {
        let i = i.min(points.len() - 1);
        let prev = points[i.saturating_sub(1)];
        let next = points[(i + 1).min(points.len() - 1)];
        let t = (next - prev).normalize_or_zero();
        if t == Vec3::ZERO {
            Vec3::Y
        } else {
            t
        }
    };
    let projected = (Vec3::Y - tangent * tangent.dot(Vec3::Y)).normalize_or_zero();
    let normal = if projected == Vec3::ZERO {
        any_perpendicular(tangent)
    } else {
        projected
    };
    Frame {
        tangent,
        normal,
        left: tangent.cross(normal),
    }
}
