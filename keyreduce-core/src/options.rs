//! Reduction options

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Configuration of a single curve reduction.
///
/// Field names serialize in camelCase, matching the option names hosts
/// already use (`error`, `step`, `weightedTangents`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReductionOptions {
    /// Maximum allowed deviation from the sampled curve
    pub error: f64,
    /// Sampling step in curve time units
    pub step: f64,
    /// Solve handle lengths as well as slopes
    pub weighted_tangents: bool,
    /// Split tangents at detected corners
    pub tangent_split_auto: bool,
    /// Split tangents where the source curve already has split tangents
    pub tangent_split_existing: bool,
    /// Split tangents where the local angle exceeds a threshold
    pub tangent_split_angle_threshold: bool,
    /// Angle threshold in degrees
    pub tangent_split_angle_threshold_value: f64,
}

impl Default for ReductionOptions {
    fn default() -> Self {
        Self {
            error: 1.0,
            step: 1.0,
            weighted_tangents: true,
            tangent_split_auto: false,
            tangent_split_existing: false,
            tangent_split_angle_threshold: false,
            tangent_split_angle_threshold_value: 15.0,
        }
    }
}

impl ReductionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_error(mut self, error: f64) -> Self {
        self.error = error;
        self
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    pub fn with_weighted_tangents(mut self, weighted: bool) -> Self {
        self.weighted_tangents = weighted;
        self
    }

    pub fn with_tangent_split_auto(mut self, enabled: bool) -> Self {
        self.tangent_split_auto = enabled;
        self
    }

    pub fn with_tangent_split_existing(mut self, enabled: bool) -> Self {
        self.tangent_split_existing = enabled;
        self
    }

    /// Enable the angle-threshold split policy with `degrees` as threshold.
    pub fn with_tangent_split_angle(mut self, degrees: f64) -> Self {
        self.tangent_split_angle_threshold = true;
        self.tangent_split_angle_threshold_value = degrees;
        self
    }

    /// Whether any tangent split policy is enabled.
    pub fn splits_enabled(&self) -> bool {
        self.tangent_split_auto || self.tangent_split_existing || self.tangent_split_angle_threshold
    }

    /// Check the options before any work is done.
    pub fn validate(&self) -> Result<()> {
        if !self.error.is_finite() || self.error < 0.0 {
            return Err(Error::InvalidInput(format!(
                "error tolerance must be a finite value >= 0, got {}",
                self.error
            )));
        }
        if !self.step.is_finite() || self.step <= 0.0 {
            return Err(Error::InvalidInput(format!(
                "sampling step must be a finite value > 0, got {}",
                self.step
            )));
        }
        if self.tangent_split_angle_threshold
            && (!self.tangent_split_angle_threshold_value.is_finite()
                || self.tangent_split_angle_threshold_value < 0.0)
        {
            return Err(Error::InvalidInput(format!(
                "tangent split angle must be a finite value >= 0, got {}",
                self.tangent_split_angle_threshold_value
            )));
        }
        Ok(())
    }
}
