//! Easing curves and radius/pitch profiles used by the shape generators.
//!
//! A profile maps normalized progress `t` along a shape to a value such as a
//! radius or a rotation angle. Profiles are pure and cheap to evaluate.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Named easing curve mapping `[0, 1]` onto `[0, 1]` with `f(0) = 0`, `f(1) = 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Curve {
    #[default]
    Linear,
    /// Slow start, fast finish.
    Quadratic,
    /// Fast start, slow finish.
    InvertedQuadratic,
    InvertedCubic,
    EaseInOutCubic,
    ExponentialOut,
}

impl Curve {
    /// Every curve kind, for exhaustive checks.
    pub const ALL: [Curve; 6] = [
        Curve::Linear,
        Curve::Quadratic,
        Curve::InvertedQuadratic,
        Curve::InvertedCubic,
        Curve::EaseInOutCubic,
        Curve::ExponentialOut,
    ];

    /// Evaluate the curve. `t` is clamped to `[0, 1]`.
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Curve::Linear => t,
            Curve::Quadratic => t * t,
            Curve::InvertedQuadratic => {
                let u = 1.0 - t;
                1.0 - u * u
            }
            Curve::InvertedCubic => {
                let u = 1.0 - t;
                1.0 - u * u * u
            }
            Curve::EaseInOutCubic => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    let u = -2.0 * t + 2.0;
                    1.0 - u * u * u / 2.0
                }
            }
            Curve::ExponentialOut => {
                // Normalized so that t = 1 lands exactly on 1.
                let norm = 1.0 - 2f64.powf(-10.0);
                (1.0 - 2f64.powf(-10.0 * t)) / norm
            }
        }
    }
}

/// A function of normalized progress.
pub trait Profile: Send + Sync {
    fn eval(&self, t: f64) -> f64;
}

impl<F> Profile for F
where
    F: Fn(f64) -> f64 + Send + Sync,
{
    fn eval(&self, t: f64) -> f64 {
        self(t)
    }
}

/// Shared, type-erased profile stored in generator configs.
pub type SharedProfile = Arc<dyn Profile>;

/// Profile that ignores progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constant(pub f64);

impl Profile for Constant {
    fn eval(&self, _t: f64) -> f64 {
        self.0
    }
}

/// Interpolates from `start` to `end` over `[t_start, t_end]` along a curve,
/// flat outside that range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fade {
    pub start: f64,
    pub end: f64,
    pub t_start: f64,
    pub t_end: f64,
    pub curve: Curve,
}

impl Fade {
    /// True when the fade grows from start to end.
    pub fn is_growth(&self) -> bool {
        self.end >= self.start
    }
}

impl Profile for Fade {
    fn eval(&self, t: f64) -> f64 {
        if t <= self.t_start {
            return self.start;
        }
        if t >= self.t_end {
            return self.end;
        }
        let span = self.t_end - self.t_start;
        let u = (t - self.t_start) / span;
        self.start + (self.end - self.start) * self.curve.apply(u)
    }
}

/// Radius that fades from `start` to `end` between `t_start` and `t_end`.
///
/// An inverted range is stored swapped, so `start` is still returned at
/// `t_start` and `end` at `t_end`.
pub fn radius(start: f64, end: f64, t_start: f64, t_end: f64, curve: Curve) -> Fade {
    if t_start > t_end {
        return Fade {
            start: end,
            end: start,
            t_start: t_end,
            t_end: t_start,
            curve,
        };
    }
    Fade {
        start,
        end,
        t_start,
        t_end,
        curve,
    }
}

/// Rotation angle (radians) that fades from `start` to `end`.
pub fn pitch(start: f64, end: f64, t_start: f64, t_end: f64, curve: Curve) -> Fade {
    radius(start, end, t_start, t_end, curve)
}

/// Several fades composed end to end.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiFade {
    segments: Vec<Fade>,
}

impl MultiFade {
    pub fn segments(&self) -> &[Fade] {
        &self.segments
    }
}

/// Compose segments; they are ordered by `t_start`.
pub fn multi_fade(mut segments: Vec<Fade>) -> MultiFade {
    segments.sort_by(|a, b| a.t_start.total_cmp(&b.t_start));
    MultiFade { segments }
}

impl Profile for MultiFade {
    fn eval(&self, t: f64) -> f64 {
        let Some(first) = self.segments.first() else {
            return 0.0;
        };
        if t < first.t_start {
            return first.start;
        }
        let mut previous = first;
        for segment in &self.segments {
            if t >= segment.t_start && t <= segment.t_end {
                return segment.eval(t);
            }
            if segment.t_end < t {
                previous = segment;
            }
        }
        previous.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curves_hit_endpoints_exactly() {
        for curve in Curve::ALL {
            assert_eq!(curve.apply(0.0), 0.0, "{curve:?} at 0");
            assert_eq!(curve.apply(1.0), 1.0, "{curve:?} at 1");
        }
    }

    #[test]
    fn curves_are_monotonic() {
        for curve in Curve::ALL {
            let mut last = curve.apply(0.0);
            for i in 1..=200 {
                let value = curve.apply(i as f64 / 200.0);
                assert!(value >= last, "{curve:?} decreased at step {i}");
                last = value;
            }
        }
    }

    #[test]
    fn radius_boundary_law() {
        for curve in Curve::ALL {
            for (start, end, t0, t1) in [
                (5.0, 1.0, 0.0, 1.0),
                (0.5, 3.25, 0.2, 0.7),
                (-2.0, 2.0, 0.1, 0.9),
                (7.3, 7.3, 0.0, 0.5),
            ] {
                let fade = radius(start, end, t0, t1, curve);
                assert_eq!(fade.eval(t0), start, "{curve:?} start");
                assert_eq!(fade.eval(t1), end, "{curve:?} end");
            }
        }
    }

    #[test]
    fn inverted_range_keeps_boundary_values() {
        for curve in Curve::ALL {
            let fade = radius(5.0, 1.0, 0.8, 0.2, curve);
            assert_eq!(fade.eval(0.8), 5.0, "{curve:?} start");
            assert_eq!(fade.eval(0.2), 1.0, "{curve:?} end");
            assert_eq!(fade.eval(0.0), 1.0);
            assert_eq!(fade.eval(1.0), 5.0);
            let mid = fade.eval(0.5);
            assert!((1.0..=5.0).contains(&mid), "{curve:?} {mid}");

            let angle = pitch(0.0, 1.2, 1.0, 0.5, curve);
            assert_eq!(angle.eval(1.0), 0.0);
            assert_eq!(angle.eval(0.5), 1.2);
        }
    }

    #[test]
    fn radius_extrapolates_flat() {
        let fade = radius(4.0, 1.0, 0.25, 0.75, Curve::Quadratic);
        assert_eq!(fade.eval(0.0), 4.0);
        assert_eq!(fade.eval(1.0), 1.0);
    }

    #[test]
    fn decay_is_monotonic() {
        let fade = radius(6.0, 1.0, 0.0, 1.0, Curve::EaseInOutCubic);
        assert!(!fade.is_growth());
        let mut last = fade.eval(0.0);
        for i in 1..=50 {
            let v = fade.eval(i as f64 / 50.0);
            assert!(v <= last);
            last = v;
        }
    }

    #[test]
    fn pitch_matches_radius_shape() {
        let p = pitch(0.0, 1.2, 0.0, 1.0, Curve::InvertedCubic);
        assert_eq!(p.eval(0.0), 0.0);
        assert_eq!(p.eval(1.0), 1.2);
        assert!(p.eval(0.5) > 0.6);
    }

    #[test]
    fn multi_fade_selects_active_segment() {
        let profile = multi_fade(vec![
            radius(1.0, 3.0, 0.5, 1.0, Curve::Linear),
            radius(2.0, 1.0, 0.0, 0.3, Curve::Linear),
        ]);
        assert_eq!(profile.eval(0.0), 2.0);
        assert_eq!(profile.eval(0.3), 1.0);
        // Gap between segments holds the previous end.
        assert_eq!(profile.eval(0.4), 1.0);
        assert_eq!(profile.eval(0.5), 1.0);
        assert!((profile.eval(0.75) - 2.0).abs() < 1e-12);
        assert_eq!(profile.eval(1.5), 3.0);
    }

    #[test]
    fn empty_multi_fade_is_zero() {
        assert_eq!(multi_fade(Vec::new()).eval(0.5), 0.0);
    }

    #[test]
    fn closures_are_profiles() {
        let dome: SharedProfile = Arc::new(|t: f64| 1.0 - t * t);
        assert_eq!(dome.eval(0.0), 1.0);
        assert_eq!(dome.eval(1.0), 0.0);
        assert_eq!(Constant(2.5).eval(0.9), 2.5);
    }
}
