//! Input densification
//!
//! Raw pointer samples arrive at whatever rate the input device reports.
//! The smoother turns them into a path whose consecutive points are never
//! farther apart than `min_distance`, using a cardinal spline through the
//! accepted samples and a straight line where there is not enough history.

use std::collections::VecDeque;

use crate::constants::{DEFAULT_SMOOTHING_TENSION, JITTER_FACTOR, MAX_SPAN_STEPS, MIN_INTERPOLATION_STEP};
use crate::types::StrokePoint;

fn step_or_floor(min_distance: f32) -> f32 {
    if min_distance.is_finite() {
        min_distance.max(MIN_INTERPOLATION_STEP)
    } else {
        MIN_INTERPOLATION_STEP
    }
}

/// Subdivisions needed to cover `extent` in steps of `step`, capped at
/// `MAX_SPAN_STEPS`. `None` when the extent is not finite.
fn span_steps(extent: f32, step: f32) -> Option<usize> {
    let steps = (extent / step).ceil();
    if !steps.is_finite() {
        return None;
    }
    Some((steps as usize).clamp(1, MAX_SPAN_STEPS))
}

/// Point on the cardinal spline through p0..p3, for `t` in the p1-p2 span
fn cardinal_point(
    p0: &StrokePoint,
    p1: &StrokePoint,
    p2: &StrokePoint,
    p3: &StrokePoint,
    t: f32,
    tension: f32,
) -> StrokePoint {
    let s = tension;
    let t2 = t * t;
    let t3 = t2 * t;

    let b0 = -s * t3 + 2.0 * s * t2 - s * t;
    let b1 = (2.0 - s) * t3 + (s - 3.0) * t2 + 1.0;
    let b2 = (s - 2.0) * t3 + (3.0 - 2.0 * s) * t2 + s * t;
    let b3 = s * t3 - s * t2;

    let blend = |a: f32, b: f32, c: f32, d: f32| b0 * a + b1 * b + b2 * c + b3 * d;

    StrokePoint {
        x: blend(p0.x, p1.x, p2.x, p3.x),
        y: blend(p0.y, p1.y, p2.y, p3.y),
        pressure: blend(p0.pressure, p1.pressure, p2.pressure, p3.pressure).clamp(0.0, 1.0),
        tilt_x: blend(p0.tilt_x, p1.tilt_x, p2.tilt_x, p3.tilt_x),
        tilt_y: blend(p0.tilt_y, p1.tilt_y, p2.tilt_y, p3.tilt_y),
        timestamp_ms: p1.timestamp_ms + (p2.timestamp_ms - p1.timestamp_ms) * t as f64,
    }
}

/// Longest leg of the Bezier control polygon equivalent to the p1-p2 span
fn max_control_leg(
    p0: &StrokePoint,
    p1: &StrokePoint,
    p2: &StrokePoint,
    p3: &StrokePoint,
    tension: f32,
) -> f32 {
    let k = tension / 3.0;
    let c1 = (p1.x + k * (p2.x - p0.x), p1.y + k * (p2.y - p0.y));
    let c2 = (p2.x - k * (p3.x - p1.x), p2.y - k * (p3.y - p1.y));
    let len = |ax: f32, ay: f32, bx: f32, by: f32| ((bx - ax).powi(2) + (by - ay).powi(2)).sqrt();
    len(p1.x, p1.y, c1.0, c1.1)
        .max(len(c1.0, c1.1, c2.0, c2.1))
        .max(len(c2.0, c2.1, p2.x, p2.y))
}

/// Densify the p1-p2 span of a cardinal spline.
///
/// Output excludes p1 and ends exactly at p2. The subdivision count bounds
/// the curve's speed by its Bezier control polygon, so no two consecutive
/// points (p1 included) are farther apart than `min_distance`. Spans too
/// long for `MAX_SPAN_STEPS` are subdivided more coarsely, and a span whose
/// control polygon overflows falls back to a straight line.
pub fn interpolate_segment(
    p0: &StrokePoint,
    p1: &StrokePoint,
    p2: &StrokePoint,
    p3: &StrokePoint,
    min_distance: f32,
    tension: f32,
) -> Vec<StrokePoint> {
    let step = step_or_floor(min_distance);
    let bound = 3.0 * max_control_leg(p0, p1, p2, p3, tension);
    let (Some(chord_steps), Some(curve_steps)) = (span_steps(p1.distance_to(p2), step), span_steps(bound, step))
    else {
        return interpolate_linear(p1, p2, min_distance);
    };
    let steps = chord_steps.max(curve_steps);

    let mut points = Vec::with_capacity(steps);
    for i in 1..steps {
        let t = i as f32 / steps as f32;
        points.push(cardinal_point(p0, p1, p2, p3, t, tension));
    }
    points.push(*p2);
    points
}

/// Densify a straight line from p1 to p2 (excludes p1, ends exactly at p2)
pub fn interpolate_linear(p1: &StrokePoint, p2: &StrokePoint, min_distance: f32) -> Vec<StrokePoint> {
    let step = step_or_floor(min_distance);
    let Some(steps) = span_steps(p1.distance_to(p2), step) else {
        return vec![*p2];
    };

    let mut points = Vec::with_capacity(steps);
    for i in 1..steps {
        points.push(p1.lerp(p2, i as f32 / steps as f32));
    }
    points.push(*p2);
    points
}

/// Streaming spline smoother for one stroke.
///
/// Keeps the last four accepted samples. The first sample is emitted
/// as-is and the first span is a straight line; every later span is
/// emitted once the sample after it arrives, since the spline needs it as
/// a control point. `finish` flushes the span still waiting on that sample.
#[derive(Debug, Clone)]
pub struct PathSmoother {
    min_distance: f32,
    tension: f32,
    history: VecDeque<StrokePoint>,
    accepted: usize,
}

impl Default for PathSmoother {
    fn default() -> Self {
        Self::new(MIN_INTERPOLATION_STEP)
    }
}

impl PathSmoother {
    pub fn new(min_distance: f32) -> Self {
        Self {
            min_distance: step_or_floor(min_distance),
            tension: DEFAULT_SMOOTHING_TENSION,
            history: VecDeque::with_capacity(4),
            accepted: 0,
        }
    }

    pub fn with_tension(mut self, tension: f32) -> Self {
        self.tension = tension.clamp(0.0, 1.0);
        self
    }

    /// Update the densification step (brush size may change mid-stroke)
    pub fn set_min_distance(&mut self, min_distance: f32) {
        self.min_distance = step_or_floor(min_distance);
    }

    pub fn min_distance(&self) -> f32 {
        self.min_distance
    }

    /// Number of samples accepted so far
    pub fn accepted(&self) -> usize {
        self.accepted
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.accepted = 0;
    }

    /// Feed one sample; returns the path points it completes
    pub fn push(&mut self, point: StrokePoint) -> Vec<StrokePoint> {
        if let Some(last) = self.history.back() {
            if last.distance_to(&point) < self.min_distance * JITTER_FACTOR {
                return Vec::new();
            }
        }

        if self.history.len() == 4 {
            self.history.pop_front();
        }
        self.history.push_back(point);
        self.accepted += 1;

        match self.accepted {
            1 => vec![point],
            2 => interpolate_linear(&self.history[0], &self.history[1], self.min_distance),
            // The second span needs the sample after it
            3 => Vec::new(),
            _ => interpolate_segment(
                &self.history[0],
                &self.history[1],
                &self.history[2],
                &self.history[3],
                self.min_distance,
                self.tension,
            ),
        }
    }

    /// Emit the final pending span and reset
    pub fn finish(&mut self) -> Vec<StrokePoint> {
        let points = match self.accepted {
            0..=2 => Vec::new(),
            3 => interpolate_linear(&self.history[1], &self.history[2], self.min_distance),
            _ => {
                let last = self.history[3];
                interpolate_segment(
                    &self.history[1],
                    &self.history[2],
                    &last,
                    &last,
                    self.min_distance,
                    self.tension,
                )
            }
        };
        self.reset();
        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: f32, y: f32) -> StrokePoint {
        StrokePoint::new(x, y, 1.0)
    }

    fn max_gap(start: &StrokePoint, points: &[StrokePoint]) -> f32 {
        let mut prev = *start;
        let mut gap = 0.0f32;
        for p in points {
            gap = gap.max(prev.distance_to(p));
            prev = *p;
        }
        gap
    }

    #[test]
    fn test_segment_ends_exactly_at_p2() {
        let (p0, p1, p2, p3) = (point(0.0, 0.0), point(10.0, 5.0), point(20.0, -3.0), point(30.0, 8.0));
        let points = interpolate_segment(&p0, &p1, &p2, &p3, 2.0, DEFAULT_SMOOTHING_TENSION);
        assert_eq!(*points.last().unwrap(), p2);
        assert!(max_gap(&p1, &points) <= 2.0 + 1e-3);
    }

    #[test]
    fn test_segment_tight_curve_respects_min_distance() {
        // Sharp hairpin: p0 and p3 pull the tangents far outside the chord
        let (p0, p1, p2, p3) = (point(0.0, 100.0), point(0.0, 0.0), point(5.0, 0.0), point(5.0, 100.0));
        let points = interpolate_segment(&p0, &p1, &p2, &p3, 1.0, DEFAULT_SMOOTHING_TENSION);
        assert!(max_gap(&p1, &points) <= 1.0 + 1e-3);
        assert!(points.len() > 5);
    }

    #[test]
    fn test_straight_segment_count() {
        let (p0, p1, p2, p3) = (point(0.0, 0.0), point(10.0, 0.0), point(20.0, 0.0), point(30.0, 0.0));
        let points = interpolate_segment(&p0, &p1, &p2, &p3, 3.0, DEFAULT_SMOOTHING_TENSION);
        assert_eq!(points.len(), 4);
        for p in &points {
            assert!(p.y.abs() < 1e-4);
        }
    }

    #[test]
    fn test_linear_interpolation() {
        let points = interpolate_linear(&point(0.0, 0.0), &point(10.0, 0.0), 2.5);
        assert_eq!(points.len(), 4);
        assert!((points[0].x - 2.5).abs() < 1e-4);
        assert_eq!(points[3], point(10.0, 0.0));
    }

    #[test]
    fn test_pressure_clamped_after_spline() {
        let mut p1 = point(10.0, 0.0);
        p1.pressure = 1.0;
        let mut p2 = point(20.0, 0.0);
        p2.pressure = 1.0;
        let mut p0 = point(0.0, 0.0);
        p0.pressure = 0.0;
        let mut p3 = point(30.0, 0.0);
        p3.pressure = 0.0;
        // Overshoot between two full-pressure points must not exceed 1.0
        for p in interpolate_segment(&p0, &p1, &p2, &p3, 1.0, DEFAULT_SMOOTHING_TENSION) {
            assert!(p.pressure <= 1.0);
        }
    }

    #[test]
    fn test_extreme_spans_are_bounded() {
        // Distance overflows f32: a single jump to the far endpoint
        let far = interpolate_linear(&point(-3.0e38, 10.0), &point(3.0e38, 10.0), 1.0);
        assert_eq!(far, vec![point(3.0e38, 10.0)]);

        let long = interpolate_linear(&point(10.0, 10.0), &point(1.0e7, 10.0), 2.5);
        assert_eq!(long.len(), MAX_SPAN_STEPS);
        assert_eq!(*long.last().unwrap(), point(1.0e7, 10.0));

        // Control polygon overflows: the span is drawn as a straight line
        let (p0, p1, p2) = (point(-3.0e38, 0.0), point(0.0, 0.0), point(3.0e38, 0.0));
        let points = interpolate_segment(&p0, &p1, &p2, &p2, 1.0, DEFAULT_SMOOTHING_TENSION);
        assert_eq!(*points.last().unwrap(), p2);
        assert_eq!(points.len(), MAX_SPAN_STEPS);
        assert!(points.iter().all(|p| p.y == 0.0 && p.x.is_finite() && p.x >= 0.0));
    }

    #[test]
    fn test_smoother_survives_extreme_samples() {
        let mut smoother = PathSmoother::new(2.5);
        let mut path = smoother.push(point(-3.0e38, 10.0));
        path.extend(smoother.push(point(3.0e38, 10.0)));
        path.extend(smoother.push(point(10.0, 10.0)));
        path.extend(smoother.push(point(20.0, 10.0)));
        path.extend(smoother.finish());
        assert!(path.len() <= 1 + 3 * MAX_SPAN_STEPS);
        assert_eq!(*path.last().unwrap(), point(20.0, 10.0));
    }

    #[test]
    fn test_default_tension_comes_from_config() {
        let smoother = PathSmoother::default();
        assert_eq!(smoother.tension, brushwork_config::EngineConfig::default().smoothing_tension);
        assert_eq!(smoother.tension, DEFAULT_SMOOTHING_TENSION);
    }

    #[test]
    fn test_smoother_first_point_and_jitter() {
        let mut smoother = PathSmoother::new(2.0);
        assert_eq!(smoother.push(point(0.0, 0.0)), vec![point(0.0, 0.0)]);
        // Closer than min_distance * 0.5
        assert!(smoother.push(point(0.5, 0.0)).is_empty());
        assert_eq!(smoother.accepted(), 1);
    }

    #[test]
    fn test_smoother_covers_whole_path() {
        let mut smoother = PathSmoother::new(1.0);
        let samples: Vec<StrokePoint> = (0..8).map(|i| point(i as f32 * 7.0, (i % 2) as f32 * 4.0)).collect();

        let mut path = Vec::new();
        for s in &samples {
            path.extend(smoother.push(*s));
        }
        path.extend(smoother.finish());

        assert_eq!(path[0], samples[0]);
        assert_eq!(*path.last().unwrap(), *samples.last().unwrap());
        // Every sample appears exactly once on the path
        for s in &samples {
            assert_eq!(path.iter().filter(|p| *p == s).count(), 1);
        }
        assert!(max_gap(&path[0], &path[1..]) <= 1.0 + 1e-3);
    }

    #[test]
    fn test_smoother_three_points_finish_linear() {
        let mut smoother = PathSmoother::new(1.0);
        smoother.push(point(0.0, 0.0));
        smoother.push(point(3.0, 0.0));
        assert!(smoother.push(point(6.0, 0.0)).is_empty());
        let tail = smoother.finish();
        assert_eq!(tail.len(), 3);
        assert_eq!(*tail.last().unwrap(), point(6.0, 0.0));
        assert_eq!(smoother.accepted(), 0);
    }
}
