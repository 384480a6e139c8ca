//! Keyframes and tangent descriptions

use serde::{Deserialize, Serialize};

/// Handle time fraction that makes a Bezier segment identical to the cubic
/// Hermite segment with the same slopes.
pub const UNWEIGHTED_HANDLE_FRACTION: f64 = 1.0 / 3.0;

/// One retained control point of a curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keyframe {
    pub time: f64,
    pub value: f64,
    /// Slope (dv/dt) arriving at the key
    pub in_slope: f64,
    /// Slope (dv/dt) leaving the key
    pub out_slope: f64,
    /// Time extent of the in handle
    pub in_weight: f64,
    /// Time extent of the out handle
    pub out_weight: f64,
    pub tangent_weighted: bool,
    pub tangent_split: bool,
}

impl Keyframe {
    /// A flat, unified, unweighted key.
    pub fn new(time: f64, value: f64) -> Self {
        Self::unified(time, value, 0.0)
    }

    /// A key whose in and out tangents share one slope.
    pub fn unified(time: f64, value: f64, slope: f64) -> Self {
        Self {
            time,
            value,
            in_slope: slope,
            out_slope: slope,
            in_weight: 0.0,
            out_weight: 0.0,
            tangent_weighted: false,
            tangent_split: false,
        }
    }

    /// A key with independent in and out slopes.
    pub fn split(time: f64, value: f64, in_slope: f64, out_slope: f64) -> Self {
        Self {
            in_slope,
            out_slope,
            tangent_split: true,
            ..Self::unified(time, value, 0.0)
        }
    }

    /// Attach handle lengths and mark the key as weighted.
    pub fn with_weights(mut self, in_weight: f64, out_weight: f64) -> Self {
        self.in_weight = in_weight;
        self.out_weight = out_weight;
        self.tangent_weighted = true;
        self
    }

    pub fn shape(&self) -> TangentShape {
        TangentShape {
            split: self.tangent_split,
            weighted: self.tangent_weighted,
        }
    }

    /// In tangent angle in degrees, measured in the (time, value) plane.
    pub fn in_angle(&self) -> f64 {
        slope_to_degrees(self.in_slope)
    }

    /// Out tangent angle in degrees, measured in the (time, value) plane.
    pub fn out_angle(&self) -> f64 {
        slope_to_degrees(self.out_slope)
    }

    pub fn is_finite(&self) -> bool {
        self.time.is_finite()
            && self.value.is_finite()
            && self.in_slope.is_finite()
            && self.out_slope.is_finite()
            && self.in_weight.is_finite()
            && self.out_weight.is_finite()
    }
}

/// Which tangent unknowns a fit solves for at a keyframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TangentShape {
    /// In and out slopes are independent
    pub split: bool,
    /// Handles carry a length as well as a slope
    pub weighted: bool,
}

impl TangentShape {
    pub fn unified(weighted: bool) -> Self {
        Self { split: false, weighted }
    }

    pub fn split(weighted: bool) -> Self {
        Self { split: true, weighted }
    }
}

/// Interpolation behaviour of one side of an authored key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TangentKind {
    #[default]
    Smooth,
    /// Holds the previous value (a stepped in or out tangent)
    Stepped,
}

/// Tangent information a host exposes about one of its authored keys.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AuthoredTangents {
    pub in_slope: f64,
    pub out_slope: f64,
    pub in_kind: TangentKind,
    pub out_kind: TangentKind,
}

impl AuthoredTangents {
    pub fn smooth(in_slope: f64, out_slope: f64) -> Self {
        Self {
            in_slope,
            out_slope,
            in_kind: TangentKind::Smooth,
            out_kind: TangentKind::Smooth,
        }
    }

    /// Absolute difference between the in and out angles, in degrees.
    pub fn angle_difference(&self) -> f64 {
        (slope_to_degrees(self.in_slope) - slope_to_degrees(self.out_slope)).abs()
    }

    pub fn is_stepped(&self) -> bool {
        self.in_kind == TangentKind::Stepped || self.out_kind == TangentKind::Stepped
    }
}

impl From<&Keyframe> for AuthoredTangents {
    fn from(key: &Keyframe) -> Self {
        Self::smooth(key.in_slope, key.out_slope)
    }
}

/// Angle of a slope in degrees.
pub fn slope_to_degrees(slope: f64) -> f64 {
    slope.atan().to_degrees()
}
