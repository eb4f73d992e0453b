use serde::{Deserialize, Serialize};

use crate::constants::MIN_COVERAGE_RADIUS;

/// Raw pointer sample as delivered by the input layer.
///
/// Coordinates are canvas-space (the viewport transform has already been
/// applied upstream).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerSample {
    pub x: f32,
    pub y: f32,
    /// Normalized pressure 0.0-1.0
    pub pressure: f32,
    /// Tilt in degrees, -90..90
    #[serde(default)]
    pub tilt_x: f32,
    /// Tilt in degrees, -90..90
    #[serde(default)]
    pub tilt_y: f32,
    /// Timestamp in milliseconds
    #[serde(default)]
    pub timestamp_ms: u64,
}

impl PointerSample {
    /// Create a sample with no tilt and a zero timestamp
    pub fn new(x: f32, y: f32, pressure: f32) -> Self {
        Self {
            x,
            y,
            pressure,
            tilt_x: 0.0,
            tilt_y: 0.0,
            timestamp_ms: 0,
        }
    }

    /// Set the tilt components
    pub fn with_tilt(mut self, tilt_x: f32, tilt_y: f32) -> Self {
        self.tilt_x = tilt_x;
        self.tilt_y = tilt_y;
        self
    }
}

/// A point on the densified stroke path.
///
/// Timestamps are carried as f64 so interpolated points can sit between
/// input samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokePoint {
    pub x: f32,
    pub y: f32,
    pub pressure: f32,
    pub tilt_x: f32,
    pub tilt_y: f32,
    pub timestamp_ms: f64,
}

impl StrokePoint {
    pub fn new(x: f32, y: f32, pressure: f32) -> Self {
        Self {
            x,
            y,
            pressure,
            tilt_x: 0.0,
            tilt_y: 0.0,
            timestamp_ms: 0.0,
        }
    }

    /// Linear interpolation of every channel
    pub fn lerp(&self, other: &Self, t: f32) -> Self {
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
            pressure: self.pressure + (other.pressure - self.pressure) * t,
            tilt_x: self.tilt_x + (other.tilt_x - self.tilt_x) * t,
            tilt_y: self.tilt_y + (other.tilt_y - self.tilt_y) * t,
            timestamp_ms: self.timestamp_ms + (other.timestamp_ms - self.timestamp_ms) * t as f64,
        }
    }

    #[inline]
    pub fn distance_to(&self, other: &Self) -> f32 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

impl From<PointerSample> for StrokePoint {
    fn from(sample: PointerSample) -> Self {
        Self {
            x: sample.x,
            y: sample.y,
            pressure: sample.pressure.clamp(0.0, 1.0),
            tilt_x: sample.tilt_x.clamp(-90.0, 90.0),
            tilt_y: sample.tilt_y.clamp(-90.0, 90.0),
            timestamp_ms: sample.timestamp_ms as f64,
        }
    }
}

/// Brush tip shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[repr(u32)]
pub enum MaskShape {
    #[default]
    Round = 0,
    Square = 1,
}

impl MaskShape {
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => MaskShape::Square,
            _ => MaskShape::Round,
        }
    }
}

/// A single dab ready for the stamp kernel.
///
/// Layout matches `struct Dab` in `stamp.wgsl` (64 bytes, 16-byte aligned
/// color).
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct DabParams {
    /// Center x in canvas pixels
    pub x: f32,
    /// Center y in canvas pixels
    pub y: f32,
    /// Diameter in pixels (>= MIN_DAB_SIZE)
    pub size: f32,
    /// Rotation in radians
    pub angle: f32,
    /// Minor/major axis ratio, 0.01-1.0
    pub roundness: f32,
    /// Per-dab intensity
    pub flow: f32,
    /// Per-dab opacity factor (pressure dynamics)
    pub opacity: f32,
    /// Edge hardness 0.0-1.0
    pub hardness: f32,
    /// Straight-alpha RGBA, gamma-encoded
    pub color: [f32; 4],
    /// `MaskShape` discriminant
    pub mask_shape: u32,
    pub _padding: [u32; 3],
}

impl DabParams {
    /// Radius of the major axis
    #[inline]
    pub fn radius(&self) -> f32 {
        (self.size * 0.5).max(MIN_COVERAGE_RADIUS)
    }

    /// Semi-axes (major, minor) used for coverage
    #[inline]
    pub fn axes(&self) -> (f32, f32) {
        let a = self.radius();
        let b = (a * self.roundness.clamp(0.01, 1.0)).max(MIN_COVERAGE_RADIUS);
        (a, b)
    }

    pub fn mask(&self) -> MaskShape {
        MaskShape::from_u32(self.mask_shape)
    }

    /// Half extents of the axis-aligned box around the rotated tip.
    ///
    /// Square tips use the rotated rectangle, round tips the rotated ellipse.
    pub fn half_extents(&self) -> (f32, f32) {
        let (a, b) = self.axes();
        let (sin_a, cos_a) = self.angle.sin_cos();
        match self.mask() {
            MaskShape::Round => {
                let half_w = (a * a * cos_a * cos_a + b * b * sin_a * sin_a).sqrt();
                let half_h = (a * a * sin_a * sin_a + b * b * cos_a * cos_a).sqrt();
                (half_w, half_h)
            }
            MaskShape::Square => {
                let half_w = a * cos_a.abs() + b * sin_a.abs();
                let half_h = a * sin_a.abs() + b * cos_a.abs();
                (half_w, half_h)
            }
        }
    }
}

impl Default for DabParams {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            size: 1.0,
            angle: 0.0,
            roundness: 1.0,
            flow: 1.0,
            opacity: 1.0,
            hardness: 1.0,
            color: [0.0, 0.0, 0.0, 1.0],
            mask_shape: MaskShape::Round.as_u32(),
            _padding: [0; 3],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dab_params_layout() {
        assert_eq!(std::mem::size_of::<DabParams>(), 64);
        assert_eq!(std::mem::offset_of!(DabParams, color), 32);
    }

    #[test]
    fn test_half_extents_rotated_ellipse() {
        let dab = DabParams {
            size: 20.0,
            roundness: 0.5,
            angle: std::f32::consts::FRAC_PI_2,
            ..Default::default()
        };
        let (w, h) = dab.half_extents();
        assert!((w - 5.0).abs() < 0.01);
        assert!((h - 10.0).abs() < 0.01);
    }

    #[test]
    fn test_sample_conversion_clamps() {
        let point: StrokePoint = PointerSample::new(1.0, 2.0, 1.5).with_tilt(120.0, -10.0).into();
        assert_eq!(point.pressure, 1.0);
        assert_eq!(point.tilt_x, 90.0);
        assert_eq!(point.tilt_y, -10.0);
    }
}
