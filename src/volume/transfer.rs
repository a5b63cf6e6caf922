//! Transfer function: normalised density to color and absorption
//!
//! Absorption control points are tagged with their convention, so a table
//! authored as opacity can never be read as extinction (or the reverse):
//!
//! ```text
//! extinction = -ln(1 - opacity)      opacity = 1 - exp(-extinction)
//! ```
//!
//! Opacity here is the absorption over one unit of length.

use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Highest opacity fed into the logarithm
pub const MAX_OPACITY: f32 = 1.0 - 1e-6;

/// Unit-length opacity to extinction coefficient
#[inline(always)]
pub fn opacity_to_extinction(opacity: f32) -> f32 {
    -(1.0 - opacity.clamp(0.0, MAX_OPACITY)).ln()
}

/// Extinction coefficient to unit-length opacity
#[inline(always)]
pub fn extinction_to_opacity(extinction: f32) -> f32 {
    1.0 - (-extinction.max(0.0)).exp()
}

/// Color control point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorPoint {
    /// Normalised density
    pub value: f32,
    /// RGB color
    pub color: Vec3,
}

/// Absorption control point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AbsorptionPoint {
    /// Normalised density
    pub value: f32,
    /// Opacity or extinction, depending on the enclosing [`Absorption`]
    pub amount: f32,
}

/// Absorption table with its convention
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "convention", content = "points", rename_all = "snake_case")]
pub enum Absorption {
    /// Points give unit-length opacity in `[0, 1]`
    Opacity(Vec<AbsorptionPoint>),
    /// Points give extinction coefficients (`>= 0`)
    Extinction(Vec<AbsorptionPoint>),
}

impl Absorption {
    fn points(&self) -> &[AbsorptionPoint] {
        match self {
            Absorption::Opacity(p) | Absorption::Extinction(p) => p,
        }
    }

    fn points_mut(&mut self) -> &mut Vec<AbsorptionPoint> {
        match self {
            Absorption::Opacity(p) | Absorption::Extinction(p) => p,
        }
    }
}

/// Piecewise-linear transfer function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferFunction {
    /// Color points, sorted by value
    pub colors: Vec<ColorPoint>,
    /// Absorption points, sorted by value
    pub absorption: Absorption,
}

impl Default for TransferFunction {
    fn default() -> Self {
        TransferFunction::ramp(Vec3::ONE, 1.0)
    }
}

impl TransferFunction {
    /// Create a transfer function, sorting both point sets by value
    pub fn new(mut colors: Vec<ColorPoint>, mut absorption: Absorption) -> Self {
        colors.sort_by(|a, b| a.value.total_cmp(&b.value));
        absorption.points_mut().sort_by(|a, b| a.value.total_cmp(&b.value));
        TransferFunction { colors, absorption }
    }

    /// Constant color, extinction rising linearly from 0 to `max_extinction`
    pub fn ramp(color: Vec3, max_extinction: f32) -> Self {
        TransferFunction::new(
            vec![ColorPoint { value: 0.0, color }],
            Absorption::Extinction(vec![
                AbsorptionPoint { value: 0.0, amount: 0.0 },
                AbsorptionPoint {
                    value: 1.0,
                    amount: max_extinction,
                },
            ]),
        )
    }

    /// Same color and extinction for every density
    pub fn constant(color: Vec3, extinction: f32) -> Self {
        TransferFunction::new(
            vec![ColorPoint { value: 0.0, color }],
            Absorption::Extinction(vec![AbsorptionPoint {
                value: 0.0,
                amount: extinction,
            }]),
        )
    }

    /// RGB color at normalised density `v`
    pub fn color_at(&self, v: f32) -> Vec3 {
        interpolate(&self.colors, v, |p| p.value, |p| p.color, Vec3::lerp).unwrap_or(Vec3::ONE)
    }

    fn raw_absorption_at(&self, v: f32) -> f32 {
        interpolate(self.absorption.points(), v, |p| p.value, |p| p.amount, |a, b, t| a + (b - a) * t)
            .unwrap_or(0.0)
    }

    /// Extinction coefficient at normalised density `v`
    pub fn extinction_at(&self, v: f32) -> f32 {
        let raw = self.raw_absorption_at(v);
        match self.absorption {
            Absorption::Opacity(_) => opacity_to_extinction(raw),
            Absorption::Extinction(_) => raw.max(0.0),
        }
    }

    /// Unit-length opacity at normalised density `v`
    pub fn opacity_at(&self, v: f32) -> f32 {
        let raw = self.raw_absorption_at(v);
        match self.absorption {
            Absorption::Opacity(_) => raw.clamp(0.0, 1.0),
            Absorption::Extinction(_) => extinction_to_opacity(raw),
        }
    }

    /// Color and extinction packed as `(r, g, b, extinction)`
    #[inline]
    pub fn sample(&self, v: f32) -> Vec4 {
        self.color_at(v).extend(self.extinction_at(v))
    }

    /// Copy of this function with the absorption table in extinction form
    ///
    /// Only the control points are converted, so values between points
    /// interpolate in the extinction domain afterwards.
    pub fn to_extinction_points(&self) -> TransferFunction {
        match &self.absorption {
            Absorption::Extinction(_) => self.clone(),
            Absorption::Opacity(points) => TransferFunction {
                colors: self.colors.clone(),
                absorption: Absorption::Extinction(
                    points
                        .iter()
                        .map(|p| AbsorptionPoint {
                            value: p.value,
                            amount: opacity_to_extinction(p.amount),
                        })
                        .collect(),
                ),
            },
        }
    }
}

/// Piecewise-linear lookup over sorted points, clamped at both ends
///
/// NaN densities read the first point.
fn interpolate<P, T: Copy>(
    points: &[P],
    v: f32,
    key: impl Fn(&P) -> f32,
    val: impl Fn(&P) -> T,
    lerp: impl Fn(T, T, f32) -> T,
) -> Option<T> {
    let first = points.first()?;
    let last = points.last()?;

    if v.is_nan() || v <= key(first) || points.len() < 2 {
        return Some(val(first));
    }
    if v >= key(last) {
        return Some(val(last));
    }

    let hi = points.partition_point(|p| key(p) <= v).clamp(1, points.len() - 1);
    let (a, b) = (&points[hi - 1], &points[hi]);
    let span = key(b) - key(a);
    if span <= 0.0 {
        return Some(val(b));
    }
    Some(lerp(val(a), val(b), (v - key(a)) / span))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opacity_tf() -> TransferFunction {
        TransferFunction::new(
            vec![
                ColorPoint {
                    value: 1.0,
                    color: Vec3::X,
                },
                ColorPoint {
                    value: 0.0,
                    color: Vec3::Z,
                },
            ],
            Absorption::Opacity(vec![
                AbsorptionPoint { value: 0.0, amount: 0.0 },
                AbsorptionPoint { value: 1.0, amount: 0.5 },
            ]),
        )
    }

    #[test]
    fn test_points_sorted() {
        let tf = opacity_tf();
        assert_eq!(tf.colors[0].value, 0.0);
        assert_eq!(tf.color_at(0.0), Vec3::Z);
        assert_eq!(tf.color_at(1.0), Vec3::X);
    }

    #[test]
    fn test_interpolation_and_clamping() {
        let tf = opacity_tf();
        assert!((tf.opacity_at(0.5) - 0.25).abs() < 1e-6);
        assert_eq!(tf.opacity_at(-1.0), 0.0);
        assert_eq!(tf.opacity_at(2.0), 0.5);
        let c = tf.color_at(0.5);
        assert!((c - Vec3::new(0.5, 0.0, 0.5)).length() < 1e-6);
    }

    #[test]
    fn test_nan_density_reads_first_point() {
        let tf = opacity_tf();
        assert_eq!(tf.opacity_at(f32::NAN), 0.0);
        assert_eq!(tf.color_at(f32::NAN), Vec3::Z);
        let ramp = TransferFunction::ramp(Vec3::ONE, 3.0);
        assert_eq!(ramp.extinction_at(f32::NAN), 0.0);
        assert_eq!(ramp.sample(f32::NAN), Vec4::new(1.0, 1.0, 1.0, 0.0));
    }

    #[test]
    fn test_opacity_convention_converts() {
        let tf = opacity_tf();
        let expected = -(1.0f32 - 0.5).ln();
        assert!((tf.extinction_at(1.0) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_extinction_convention_converts() {
        let tf = TransferFunction::constant(Vec3::ONE, 2.0);
        assert_eq!(tf.extinction_at(0.3), 2.0);
        assert!((tf.opacity_at(0.3) - (1.0 - (-2.0f32).exp())).abs() < 1e-6);
    }

    #[test]
    fn test_conversion_round_trip() {
        for &a in &[0.0f32, 0.1, 0.5, 0.9, 0.999] {
            let back = extinction_to_opacity(opacity_to_extinction(a));
            assert!((back - a).abs() < 1e-5, "a={} back={}", a, back);
        }
    }

    #[test]
    fn test_full_opacity_is_finite() {
        assert!(opacity_to_extinction(1.0).is_finite());
    }

    #[test]
    fn test_empty_tables() {
        let tf = TransferFunction::new(vec![], Absorption::Extinction(vec![]));
        assert_eq!(tf.color_at(0.5), Vec3::ONE);
        assert_eq!(tf.extinction_at(0.5), 0.0);
    }

    #[test]
    fn test_to_extinction_points() {
        let tf = opacity_tf().to_extinction_points();
        assert!(matches!(tf.absorption, Absorption::Extinction(_)));
        assert!((tf.extinction_at(1.0) - opacity_tf().extinction_at(1.0)).abs() < 1e-6);
    }

    #[test]
    fn test_serde_tagged() {
        let json = serde_json::to_string(&opacity_tf()).unwrap();
        assert!(json.contains("\"convention\":\"opacity\""));
        let back: TransferFunction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, opacity_tf());
    }
}
