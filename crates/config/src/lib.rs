//! Shared configuration for Brushwork
//!
//! This crate provides the single source of truth for canvas dimensions,
//! device backend selection and failure escalation, shared by the engine
//! and the tools built on it.

use serde::{Deserialize, Serialize};

/// Default canvas width in pixels
pub const DEFAULT_WIDTH: u32 = 1024;

/// Default canvas height in pixels
pub const DEFAULT_HEIGHT: u32 = 1024;

/// Consecutive dropped strokes before degraded mode is reported
pub const DEFAULT_DEGRADED_AFTER: u32 = 3;

/// Default cardinal spline tension (0.5 = Catmull-Rom)
pub const DEFAULT_SMOOTHING_TENSION: f32 = 0.5;

/// Environment variable selecting the device backend
pub const BACKEND_ENV: &str = "BRUSHWORK_BACKEND";

/// Device that runs the stamp kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Deterministic CPU device (default, always available)
    #[default]
    Software,
    /// wgpu compute device (requires the `wgpu` feature in the engine)
    Wgpu,
}

impl BackendKind {
    /// Parse from environment variable BRUSHWORK_BACKEND
    pub fn from_env() -> Self {
        match std::env::var(BACKEND_ENV).as_deref() {
            Ok(value) => Self::parse(value),
            Err(_) => Self::Software,
        }
    }

    /// Parse a backend name; unknown names fall back to software
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "wgpu" | "gpu" => Self::Wgpu,
            _ => Self::Software,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Canvas width in pixels
    pub width: u32,
    /// Canvas height in pixels
    pub height: u32,
    pub backend: BackendKind,
    /// Consecutive dropped strokes before `DegradedMode` is emitted
    pub degraded_after: u32,
    /// Spline tension used by the path smoother
    pub smoothing_tension: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            backend: BackendKind::default(),
            degraded_after: DEFAULT_DEGRADED_AFTER,
            smoothing_tension: DEFAULT_SMOOTHING_TENSION,
        }
    }
}

impl EngineConfig {
    /// Create a config for the given canvas dimensions
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Defaults with the backend taken from the environment
    pub fn from_env() -> Self {
        Self {
            backend: BackendKind::from_env(),
            ..Default::default()
        }
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Total pixel count of the canvas
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.width, DEFAULT_WIDTH);
        assert_eq!(config.height, DEFAULT_HEIGHT);
        assert_eq!(config.backend, BackendKind::Software);
        assert_eq!(config.degraded_after, DEFAULT_DEGRADED_AFTER);
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!(BackendKind::parse("wgpu"), BackendKind::Wgpu);
        assert_eq!(BackendKind::parse(" GPU "), BackendKind::Wgpu);
        assert_eq!(BackendKind::parse("software"), BackendKind::Software);
        assert_eq!(BackendKind::parse("nonsense"), BackendKind::Software);
    }

    #[test]
    fn test_partial_deserialize() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"width": 64, "backend": "wgpu"}"#).unwrap();
        assert_eq!(config.width, 64);
        assert_eq!(config.height, DEFAULT_HEIGHT);
        assert_eq!(config.backend, BackendKind::Wgpu);
    }

    #[test]
    fn test_pixel_count() {
        assert_eq!(EngineConfig::new(10, 20).pixel_count(), 200);
    }
}
