//! Dab stamper
//!
//! Walks the densified path and places dabs at fixed arc-length intervals.
//! The distance walked since the last dab is carried between calls, so the
//! dab spacing does not depend on how often the pointer was sampled.
//!
//! With a canvas set, only the part of each segment within brush reach of
//! the canvas is walked. The rest advances the spacing phase without
//! placing dabs, so a wild jump costs the same as a short one.

use std::f32::consts::FRAC_1_SQRT_2;

use tracing::debug;

use crate::brush::{BrushConfig, PressureDynamics};
use crate::constants::{MIN_COVERAGE_RADIUS, MIN_DAB_SIZE};
use crate::types::{DabParams, StrokePoint};

/// Segments shorter than this do not advance the walk
const MIN_SEGMENT_LENGTH: f32 = 1e-4;

/// Dab stamper for one stroke
#[derive(Debug, Clone, Default)]
pub struct DabStamper {
    /// Last path point walked to (None if the stroke has not started)
    last: Option<StrokePoint>,
    /// Arc length walked since the last dab
    debt: f32,
    /// Dabs emitted this stroke
    emitted: u64,
    /// Canvas size dabs are clipped against
    canvas: Option<(u32, u32)>,
}

impl DabStamper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip dabs that cannot touch a `width x height` canvas
    pub fn with_canvas(mut self, width: u32, height: u32) -> Self {
        self.canvas = Some((width, height));
        self
    }

    /// Start a new stroke
    pub fn reset(&mut self) {
        self.last = None;
        self.debt = 0.0;
        self.emitted = 0;
    }

    /// Arc length carried toward the next dab
    pub fn debt(&self) -> f32 {
        self.debt
    }

    /// Dabs emitted since the last reset
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Walk to `point`, returning the dabs placed along the way.
    ///
    /// The first point of a stroke always places a dab. Spacing is
    /// recomputed from the size at each dab position. Non-finite points
    /// are ignored.
    pub fn process_point(&mut self, point: &StrokePoint, config: &BrushConfig) -> Vec<DabParams> {
        let mut dabs = Vec::new();
        if !point.x.is_finite() || !point.y.is_finite() {
            return dabs;
        }

        let Some(last) = self.last else {
            self.last = Some(*point);
            self.debt = 0.0;
            dabs.push(make_dab(point, config));
            self.emitted += 1;
            return dabs;
        };

        // f64 keeps the length finite between extreme coordinates
        let dx = point.x as f64 - last.x as f64;
        let dy = point.y as f64 - last.y as f64;
        let length = dx.hypot(dy);
        if length < MIN_SEGMENT_LENGTH as f64 {
            return dabs;
        }

        let rect = match self.canvas {
            Some((width, height)) => reach_rect(width, height, config),
            None => [f64::NEG_INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::INFINITY],
        };
        match clip_span(&last, dx, dy, rect) {
            Some((enter, exit)) => {
                let from = if enter > 0.0 { point_along(&last, point, enter, rect) } else { last };
                let to = if exit < 1.0 { point_along(&last, point, exit, rect) } else { *point };
                if enter > 0.0 {
                    self.skip(enter * length, &from, config);
                }
                self.walk(&from, &to, config, &mut dabs);
                if exit < 1.0 {
                    self.skip((1.0 - exit) * length, &to, config);
                }
            }
            None => self.skip(length, point, config),
        }

        self.last = Some(*point);
        self.emitted += dabs.len() as u64;

        if !dabs.is_empty() {
            debug!(
                "DabStamper::process_point: {} dabs from ({:.1}, {:.1}) to ({:.1}, {:.1}), debt={:.2}",
                dabs.len(),
                last.x,
                last.y,
                point.x,
                point.y,
                self.debt
            );
        }

        dabs
    }

    /// Place dabs along the straight run `from -> to`
    fn walk(&mut self, from: &StrokePoint, to: &StrokePoint, config: &BrushConfig, dabs: &mut Vec<DabParams>) {
        let length = from.distance_to(to);
        if length < MIN_SEGMENT_LENGTH {
            self.debt += length;
            return;
        }

        let mut walked = 0.0f32;
        loop {
            let here = from.lerp(to, walked / length);
            let size = config.size_for_pressure(config.pressure_curve.apply(here.pressure));
            let needed = (config.spacing_for_size(size) - self.debt).max(0.0);

            if walked + needed > length {
                self.debt += length - walked;
                break;
            }

            walked += needed;
            let at = from.lerp(to, walked / length);
            dabs.push(make_dab(&at, config));
            self.debt = 0.0;
        }
    }

    /// Advance the spacing phase over `distance` without placing dabs
    fn skip(&mut self, distance: f64, at: &StrokePoint, config: &BrushConfig) {
        let size = config.size_for_pressure(config.pressure_curve.apply(at.pressure));
        let spacing = config.spacing_for_size(size) as f64;
        self.debt = ((self.debt as f64 + distance) % spacing) as f32;
    }

    /// Raw-parameter form: fixed diameter and spacing fraction, pressure
    /// carried on the point without dynamics.
    pub fn stamp_to(
        &mut self,
        x: f32,
        y: f32,
        pressure: f32,
        size: f32,
        spacing_fraction: f32,
    ) -> Vec<DabParams> {
        let config = BrushConfig {
            size,
            spacing: spacing_fraction,
            dynamics: PressureDynamics {
                size: false,
                flow: false,
                opacity: false,
            },
            ..Default::default()
        };
        self.process_point(&StrokePoint::new(x, y, pressure), &config)
    }
}

/// Canvas rect grown by the farthest a dab center can be from a pixel it
/// covers: `[left, top, right, bottom]`
fn reach_rect(width: u32, height: u32, config: &BrushConfig) -> [f64; 4] {
    let reach = (config.size.max(MIN_DAB_SIZE) * FRAC_1_SQRT_2 + MIN_COVERAGE_RADIUS + 1.0) as f64;
    [-reach, -reach, width as f64 + reach, height as f64 + reach]
}

/// Parameter range `[enter, exit]` of `origin + t * (dx, dy)` inside `rect`
/// (Liang-Barsky); `None` if the segment misses it
fn clip_span(origin: &StrokePoint, dx: f64, dy: f64, rect: [f64; 4]) -> Option<(f64, f64)> {
    let (x0, y0) = (origin.x as f64, origin.y as f64);
    let (mut enter, mut exit) = (0.0f64, 1.0f64);
    for (p, q) in [(-dx, x0 - rect[0]), (dx, rect[2] - x0), (-dy, y0 - rect[1]), (dy, rect[3] - y0)] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > exit {
                return None;
            }
            enter = enter.max(r);
        } else {
            if r < enter {
                return None;
            }
            exit = exit.min(r);
        }
    }
    Some((enter, exit))
}

/// Point at parameter `t` of `from -> to`, position computed in f64 and
/// kept inside `rect` (rounding on huge coordinates can land outside)
fn point_along(from: &StrokePoint, to: &StrokePoint, t: f64, rect: [f64; 4]) -> StrokePoint {
    let mut out = from.lerp(to, t as f32);
    let x = from.x as f64 + (to.x as f64 - from.x as f64) * t;
    let y = from.y as f64 + (to.y as f64 - from.y as f64) * t;
    out.x = x.clamp(rect[0], rect[2]) as f32;
    out.y = y.clamp(rect[1], rect[3]) as f32;
    out
}

/// Build the dab for a path point under a brush config
pub fn make_dab(point: &StrokePoint, config: &BrushConfig) -> DabParams {
    let pressure = config.pressure_curve.apply(point.pressure);

    let mut angle = config.angle;
    if config.tilt_angle && (point.tilt_x != 0.0 || point.tilt_y != 0.0) {
        angle += point.tilt_y.atan2(point.tilt_x);
    }

    DabParams {
        x: point.x,
        y: point.y,
        size: config.size_for_pressure(pressure),
        angle,
        roundness: config.roundness.clamp(0.01, 1.0),
        flow: config.flow_for_pressure(pressure),
        opacity: config.dab_opacity_for_pressure(pressure),
        hardness: config.hardness.clamp(0.0, 1.0),
        color: config.color,
        mask_shape: config.mask_shape.as_u32(),
        _padding: [0; 3],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_size_config(size: f32, spacing: f32) -> BrushConfig {
        BrushConfig {
            size,
            spacing,
            dynamics: PressureDynamics {
                size: false,
                flow: false,
                opacity: false,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_first_point_emits_dab() {
        let mut stamper = DabStamper::new();
        let dabs = stamper.process_point(&StrokePoint::new(100.0, 100.0, 1.0), &BrushConfig::default());
        assert_eq!(dabs.len(), 1);
        assert!((dabs[0].x - 100.0).abs() < 0.001);
        assert!((dabs[0].y - 100.0).abs() < 0.001);
    }

    #[test]
    fn test_straight_line_spacing() {
        let config = fixed_size_config(20.0, 0.5);
        let mut stamper = DabStamper::new();
        stamper.process_point(&StrokePoint::new(0.0, 0.0, 1.0), &config);

        // 50 pixels at 10 pixel spacing
        let dabs = stamper.process_point(&StrokePoint::new(50.0, 0.0, 1.0), &config);
        assert_eq!(dabs.len(), 5);
        for (i, dab) in dabs.iter().enumerate() {
            assert!((dab.x - 10.0 * (i + 1) as f32).abs() < 0.01);
        }
    }

    #[test]
    fn test_debt_carries_between_calls() {
        let config = fixed_size_config(20.0, 0.5);
        let mut stamper = DabStamper::new();
        stamper.process_point(&StrokePoint::new(0.0, 0.0, 1.0), &config);

        // Small moves accumulate until a full step is covered
        assert!(stamper.process_point(&StrokePoint::new(4.0, 0.0, 1.0), &config).is_empty());
        assert!(stamper.process_point(&StrokePoint::new(8.0, 0.0, 1.0), &config).is_empty());
        let dabs = stamper.process_point(&StrokePoint::new(12.0, 0.0, 1.0), &config);
        assert_eq!(dabs.len(), 1);
        assert!((dabs[0].x - 10.0).abs() < 0.01);
        assert!((stamper.debt() - 2.0).abs() < 0.01);
    }

    #[test]
    fn test_sampling_rate_independence() {
        let config = fixed_size_config(10.0, 0.3);

        let mut coarse = DabStamper::new();
        let mut coarse_dabs = Vec::new();
        for i in 0..=10 {
            coarse_dabs.extend(coarse.process_point(&StrokePoint::new(i as f32 * 20.0, 0.0, 1.0), &config));
        }

        let mut fine = DabStamper::new();
        let mut fine_dabs = Vec::new();
        for i in 0..=80 {
            fine_dabs.extend(fine.process_point(&StrokePoint::new(i as f32 * 2.5, 0.0, 1.0), &config));
        }

        assert!((coarse_dabs.len() as i64 - fine_dabs.len() as i64).abs() <= 1);
        for (a, b) in coarse_dabs.iter().zip(fine_dabs.iter()) {
            assert!((a.x - b.x).abs() < 0.05);
        }
    }

    #[test]
    fn test_tiny_brush_spacing_floor() {
        let config = fixed_size_config(0.1, 0.01);
        let mut stamper = DabStamper::new();
        stamper.process_point(&StrokePoint::new(0.0, 0.0, 1.0), &config);
        let dabs = stamper.process_point(&StrokePoint::new(100.0, 0.0, 1.0), &config);
        // One dab per pixel at most
        assert!(dabs.len() <= 100);
        assert!(dabs.iter().all(|d| d.size >= 1.0));
    }

    #[test]
    fn test_pressure_dynamics_on_dab() {
        let config = BrushConfig::default();
        let dab = make_dab(&StrokePoint::new(0.0, 0.0, 0.5), &config);
        assert!((dab.size - 10.0).abs() < 0.001);
        assert!((dab.flow - 0.5).abs() < 0.001);
        assert_eq!(dab.opacity, 1.0);
    }

    #[test]
    fn test_tilt_angle() {
        let config = BrushConfig {
            tilt_angle: true,
            ..Default::default()
        };
        let mut point = StrokePoint::new(0.0, 0.0, 1.0);
        point.tilt_x = 0.0;
        point.tilt_y = 45.0;
        let dab = make_dab(&point, &config);
        assert!((dab.angle - std::f32::consts::FRAC_PI_2).abs() < 0.001);
    }

    #[test]
    fn test_canvas_clipping_keeps_on_canvas_dabs() {
        let config = fixed_size_config(10.0, 0.5);
        // Out past the right edge and back
        let path = [
            StrokePoint::new(10.0, 30.0, 1.0),
            StrokePoint::new(200.0, 30.0, 1.0),
            StrokePoint::new(22.0, 30.0, 1.0),
        ];

        let mut free = DabStamper::new();
        let mut clipped = DabStamper::new().with_canvas(64, 64);
        let mut expected = Vec::new();
        let mut actual = Vec::new();
        for point in &path {
            expected.extend(free.process_point(point, &config));
            actual.extend(clipped.process_point(point, &config));
        }
        // Dabs centered past x=72 cannot reach a 64 pixel wide canvas
        expected.retain(|d| d.x < 72.0);

        assert_eq!(actual.len(), expected.len());
        for (a, b) in actual.iter().zip(expected.iter()) {
            assert!((a.x - b.x).abs() < 0.01, "{} vs {}", a.x, b.x);
        }
    }

    #[test]
    fn test_far_jump_stamps_only_near_canvas() {
        let config = fixed_size_config(4.0, 0.25);
        let mut stamper = DabStamper::new().with_canvas(64, 64);
        stamper.process_point(&StrokePoint::new(10.0, 10.0, 1.0), &config);
        let dabs = stamper.process_point(&StrokePoint::new(1.0e7, 10.0, 1.0), &config);
        assert!(!dabs.is_empty());
        assert!(dabs.len() < 64);
        assert!(dabs.iter().all(|d| d.x > 10.0 && d.x < 70.0));

        // Jumping back lands on the canvas again
        let back = stamper.process_point(&StrokePoint::new(20.0, 10.0, 1.0), &config);
        assert!(back.len() < 64);
        assert!(back.iter().all(|d| d.x > 19.9 && d.x < 70.0));
    }

    #[test]
    fn test_extreme_coordinates_do_not_overflow() {
        let config = fixed_size_config(4.0, 0.25);
        let mut stamper = DabStamper::new().with_canvas(64, 64);
        assert_eq!(stamper.process_point(&StrokePoint::new(-3.0e38, 10.0, 1.0), &config).len(), 1);
        let dabs = stamper.process_point(&StrokePoint::new(3.0e38, 10.0, 1.0), &config);
        // At most the crossing of the canvas is stamped
        assert!(dabs.len() < 80);
        assert!(dabs.iter().all(|d| d.x.is_finite() && d.x > -10.0 && d.x < 74.0));

        assert!(stamper.process_point(&StrokePoint::new(f32::NAN, 10.0, 1.0), &config).is_empty());
    }

    #[test]
    fn test_stamp_to_raw_form() {
        let mut stamper = DabStamper::new();
        assert_eq!(stamper.stamp_to(0.0, 0.0, 0.6, 20.0, 0.25).len(), 1);
        let dabs = stamper.stamp_to(100.0, 0.0, 0.6, 20.0, 0.25);
        assert_eq!(dabs.len(), 20);
        assert_eq!(stamper.emitted(), 21);
    }
}
