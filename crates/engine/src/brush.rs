//! Brush configuration and pressure dynamics
//!
//! `BrushConfig` is the plain-data brush record the tool layer hands to
//! every `process_point` call. Nothing in the engine keeps a global brush;
//! the stamper reads the config it is given.

use serde::{Deserialize, Serialize};

use crate::blend::BlendMode;
use crate::constants::{MIN_DAB_SIZE, MIN_DAB_SPACING, MIN_INTERPOLATION_STEP, MIN_SPACING_FRACTION};
use crate::types::MaskShape;

/// Pressure response curve applied to raw pen pressure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PressureCurve {
    /// 1:1 mapping
    #[default]
    Linear,
    /// Easier light pressure
    Soft,
    /// Requires more pressure
    Hard,
    /// Smoothstep
    SCurve,
}

impl PressureCurve {
    /// Map a normalized pressure through the curve
    pub fn apply(&self, pressure: f32) -> f32 {
        let p = pressure.clamp(0.0, 1.0);
        match self {
            PressureCurve::Linear => p,
            PressureCurve::Soft => p.sqrt(),
            PressureCurve::Hard => p * p,
            PressureCurve::SCurve => p * p * (3.0 - 2.0 * p),
        }
    }
}

/// Which dab channels follow pen pressure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PressureDynamics {
    pub size: bool,
    pub flow: bool,
    pub opacity: bool,
}

impl Default for PressureDynamics {
    fn default() -> Self {
        Self {
            size: true,
            flow: true,
            opacity: false,
        }
    }
}

/// Brush configuration record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrushConfig {
    /// Diameter in pixels at full pressure
    pub size: f32,
    /// Per-dab intensity 0.0-1.0
    pub flow: f32,
    /// Stroke opacity ceiling 0.0-1.0
    pub opacity: f32,
    /// Edge hardness: 0.0 = soft, 1.0 = hard
    pub hardness: f32,
    pub mask_shape: MaskShape,
    /// Spacing as fraction of size (e.g., 0.25 = 25% of diameter)
    pub spacing: f32,
    /// Minor/major axis ratio
    pub roundness: f32,
    /// Tip rotation in radians
    pub angle: f32,
    /// Straight-alpha RGBA, gamma-encoded
    pub color: [f32; 4],
    pub dynamics: PressureDynamics,
    pub pressure_curve: PressureCurve,
    /// Size ratio at zero pressure when size dynamics are on
    pub min_size_ratio: f32,
    /// Flow/opacity ratio at zero pressure when those dynamics are on
    pub min_alpha_ratio: f32,
    /// Add the pen tilt direction to the tip angle
    pub tilt_angle: bool,
    /// How the finished stroke combines with the layer
    pub blend_mode: BlendMode,
}

impl Default for BrushConfig {
    fn default() -> Self {
        Self {
            size: 20.0,
            flow: 1.0,
            opacity: 1.0,
            hardness: 1.0,
            mask_shape: MaskShape::Round,
            spacing: 0.25,
            roundness: 1.0,
            angle: 0.0,
            color: [0.0, 0.0, 0.0, 1.0],
            dynamics: PressureDynamics::default(),
            pressure_curve: PressureCurve::Linear,
            min_size_ratio: 0.0,
            min_alpha_ratio: 0.0,
            tilt_angle: false,
            blend_mode: BlendMode::Normal,
        }
    }
}

impl BrushConfig {
    /// Brush diameter for a (curve-mapped) pressure, never below `MIN_DAB_SIZE`
    pub fn size_for_pressure(&self, pressure: f32) -> f32 {
        let size = if self.dynamics.size {
            let min = self.size * self.min_size_ratio.clamp(0.0, 1.0);
            min + (self.size - min) * pressure.clamp(0.0, 1.0)
        } else {
            self.size
        };
        size.max(MIN_DAB_SIZE)
    }

    /// Per-dab flow for a pressure
    pub fn flow_for_pressure(&self, pressure: f32) -> f32 {
        let flow = self.flow.clamp(0.0, 1.0);
        if self.dynamics.flow {
            scale_by_pressure(flow, self.min_alpha_ratio, pressure)
        } else {
            flow
        }
    }

    /// Per-dab opacity factor for a pressure (1.0 when opacity dynamics are off)
    pub fn dab_opacity_for_pressure(&self, pressure: f32) -> f32 {
        if self.dynamics.opacity {
            scale_by_pressure(1.0, self.min_alpha_ratio, pressure)
        } else {
            1.0
        }
    }

    /// Distance between dabs of the given diameter
    ///
    /// The fraction has a floor and the result an absolute floor, so a
    /// near-zero size cannot explode the dab count.
    pub fn spacing_for_size(&self, size: f32) -> f32 {
        let fraction = self.spacing.max(MIN_SPACING_FRACTION);
        (size * fraction).max(MIN_DAB_SPACING)
    }

    /// Stroke opacity ceiling
    pub fn opacity_ceiling(&self) -> f32 {
        self.opacity.clamp(0.0, 1.0)
    }

    /// Densification step for the path smoother: half the full-size spacing
    pub fn interpolation_step(&self) -> f32 {
        (self.size * self.spacing.max(MIN_SPACING_FRACTION) * 0.5).max(MIN_INTERPOLATION_STEP)
    }
}

fn scale_by_pressure(base: f32, min_ratio: f32, pressure: f32) -> f32 {
    let min = base * min_ratio.clamp(0.0, 1.0);
    min + (base - min) * pressure.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pressure_curve_linear() {
        let curve = PressureCurve::Linear;
        assert_eq!(curve.apply(0.0), 0.0);
        assert_eq!(curve.apply(0.5), 0.5);
        assert_eq!(curve.apply(1.0), 1.0);
    }

    #[test]
    fn test_pressure_curve_shapes() {
        assert!(PressureCurve::Soft.apply(0.25) > 0.25);
        assert!(PressureCurve::Hard.apply(0.5) < 0.5);
        assert_eq!(PressureCurve::SCurve.apply(0.5), 0.5);
        assert_eq!(PressureCurve::Linear.apply(-0.5), 0.0);
        assert_eq!(PressureCurve::Linear.apply(1.5), 1.0);
    }

    #[test]
    fn test_size_for_pressure() {
        let config = BrushConfig {
            size: 50.0,
            min_size_ratio: 0.2,
            ..Default::default()
        };
        assert!((config.size_for_pressure(0.0) - 10.0).abs() < 0.001);
        assert!((config.size_for_pressure(1.0) - 50.0).abs() < 0.001);
        assert!((config.size_for_pressure(0.5) - 30.0).abs() < 0.001);
    }

    #[test]
    fn test_size_clamped_to_minimum() {
        let config = BrushConfig::default();
        assert_eq!(config.size_for_pressure(0.0), MIN_DAB_SIZE);
    }

    #[test]
    fn test_spacing_floor() {
        let config = BrushConfig {
            spacing: 0.0,
            ..Default::default()
        };
        assert_eq!(config.spacing_for_size(1.0), MIN_DAB_SPACING);
        assert!((config.spacing_for_size(1000.0) - 10.0).abs() < 0.001);
    }

    #[test]
    fn test_interpolation_step() {
        let config = BrushConfig::default();
        assert!((config.interpolation_step() - 2.5).abs() < 0.001);
        let tiny = BrushConfig {
            size: 1.0,
            ..Default::default()
        };
        assert_eq!(tiny.interpolation_step(), MIN_INTERPOLATION_STEP);
    }

    #[test]
    fn test_zero_pressure_is_transparent_with_flow_dynamics() {
        let config = BrushConfig::default();
        assert_eq!(config.flow_for_pressure(0.0), 0.0);
        assert_eq!(config.dab_opacity_for_pressure(0.0), 1.0);
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: BrushConfig =
            serde_json::from_str(r#"{"size": 8.0, "pressure_curve": "soft"}"#).unwrap();
        assert_eq!(config.size, 8.0);
        assert_eq!(config.pressure_curve, PressureCurve::Soft);
        assert_eq!(config.spacing, 0.25);
        assert_eq!(config.blend_mode, BlendMode::Normal);

        let config: BrushConfig = serde_json::from_str(r#"{"blend_mode": "multiply"}"#).unwrap();
        assert_eq!(config.blend_mode, BlendMode::Multiply);
    }
}
