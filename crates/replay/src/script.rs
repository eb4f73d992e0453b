//! Replay script format
//!
//! A script is a JSON document naming the canvas, a default brush and a
//! list of strokes. Each stroke is either explicit pointer samples or a
//! generated straight line:
//!
//! ```json
//! {
//!   "engine": { "width": 256, "height": 128 },
//!   "brush": { "size": 12.0, "spacing": 0.25 },
//!   "strokes": [
//!     { "path": { "kind": "line", "from": [10, 10], "to": [200, 10] } },
//!     { "path": { "kind": "samples", "samples": [{ "x": 40, "y": 60, "pressure": 0.5 }] },
//!       "opacity": 0.5 }
//!   ]
//! }
//! ```

use std::path::Path;

use anyhow::Context;
use brushwork_config::EngineConfig;
use brushwork_engine::{BrushConfig, PointerSample};
use serde::Deserialize;

/// Milliseconds between generated samples (a 125 Hz pen)
const GENERATED_SAMPLE_INTERVAL_MS: u64 = 8;

fn default_steps() -> u32 {
    16
}

fn full() -> f32 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrokePath {
    /// Samples exactly as a pen would deliver them
    Samples { samples: Vec<PointerSample> },
    /// Evenly spaced samples along a straight line, endpoints included
    Line {
        from: [f32; 2],
        to: [f32; 2],
        #[serde(default = "default_steps")]
        steps: u32,
        #[serde(default = "full")]
        pressure: f32,
    },
}

impl StrokePath {
    pub fn samples(&self) -> Vec<PointerSample> {
        match self {
            StrokePath::Samples { samples } => samples.clone(),
            StrokePath::Line {
                from,
                to,
                steps,
                pressure,
            } => {
                let steps = (*steps).max(1);
                (0..=steps)
                    .map(|i| {
                        let t = i as f32 / steps as f32;
                        let mut sample = PointerSample::new(
                            from[0] + (to[0] - from[0]) * t,
                            from[1] + (to[1] - from[1]) * t,
                            *pressure,
                        );
                        sample.timestamp_ms = i as u64 * GENERATED_SAMPLE_INTERVAL_MS;
                        sample
                    })
                    .collect()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StrokeScript {
    pub path: StrokePath,
    /// Overrides the script's default brush
    #[serde(default)]
    pub brush: Option<BrushConfig>,
    /// End-of-stroke opacity multiplier
    #[serde(default = "full")]
    pub opacity: f32,
    /// Cancel instead of committing
    #[serde(default)]
    pub abort: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub brush: BrushConfig,
    pub strokes: Vec<StrokeScript>,
}

impl Script {
    pub fn parse(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("Invalid replay script")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {}", path.display()))?;
        Self::parse(&json)
    }

    /// Brush used for a stroke
    pub fn brush_for<'a>(&'a self, stroke: &'a StrokeScript) -> &'a BrushConfig {
        stroke.brush.as_ref().unwrap_or(&self.brush)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_script() {
        let script = Script::parse(
            r#"{"strokes": [{"path": {"kind": "line", "from": [0, 0], "to": [100, 0]}}]}"#,
        )
        .unwrap();
        assert_eq!(script.engine, EngineConfig::default());
        assert_eq!(script.strokes.len(), 1);
        assert_eq!(script.strokes[0].opacity, 1.0);
        assert!(!script.strokes[0].abort);
    }

    #[test]
    fn test_line_samples_include_endpoints() {
        let path = StrokePath::Line {
            from: [0.0, 0.0],
            to: [100.0, 0.0],
            steps: 4,
            pressure: 0.5,
        };
        let samples = path.samples();
        assert_eq!(samples.len(), 5);
        assert_eq!(samples[0].x, 0.0);
        assert_eq!(samples[4].x, 100.0);
        assert_eq!(samples[2].x, 50.0);
        assert!(samples.iter().all(|s| s.pressure == 0.5));
        assert_eq!(samples[4].timestamp_ms, 4 * GENERATED_SAMPLE_INTERVAL_MS);
    }

    #[test]
    fn test_explicit_samples_and_brush_override() {
        let script = Script::parse(
            r#"{
                "engine": {"width": 64, "height": 32},
                "brush": {"size": 4.0},
                "strokes": [{
                    "path": {"kind": "samples", "samples": [
                        {"x": 1.0, "y": 2.0, "pressure": 0.25, "tilt_x": 30.0}
                    ]},
                    "brush": {"size": 9.0},
                    "opacity": 0.5,
                    "abort": true
                }]
            }"#,
        )
        .unwrap();
        assert_eq!(script.engine.width, 64);
        let stroke = &script.strokes[0];
        assert_eq!(script.brush_for(stroke).size, 9.0);
        assert!(stroke.abort);
        let samples = stroke.path.samples();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].tilt_x, 30.0);
        assert_eq!(samples[0].tilt_y, 0.0);
    }

    #[test]
    fn test_unknown_path_kind_is_rejected() {
        let result = Script::parse(r#"{"strokes": [{"path": {"kind": "spiral"}}]}"#);
        assert!(result.is_err());
    }
}
