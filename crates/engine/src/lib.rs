//! Brushwork stroke engine - real-time brush stroke accumulation
//!
//! This crate turns a stream of pointer samples into dabs, accumulates them
//! on a pair of device surfaces and commits the result into a layer:
//! - [`lifecycle`] - Stroke state machine (Idle, Starting, Active, Finishing)
//! - [`interpolation`] - Cardinal spline path smoothing
//! - [`stamper`] - Arc-length dab placement
//! - [`dispatcher`] - Fixed-capacity dab batches, one dispatch per batch
//! - [`accumulation`] - Ping-pong surface pair
//! - [`gpu`] - Device seam with software and wgpu implementations
//! - [`sync`] - Single readback authority for preview and commit
//! - [`compositor`] - The one function that writes stroke pixels to a layer
//! - [`engine`] - [`StrokeEngine`], the public entry point
//! - [`blend`] - Per-pixel dab math shared with the compute shader
//! - [`surface`] - CPU RGBA f32 layer surface

pub mod accumulation;
pub mod blend;
pub mod brush;
pub mod compositor;
pub mod constants;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod gpu;
pub mod interpolation;
pub mod lifecycle;
pub mod rect;
pub mod stamper;
pub mod surface;
pub mod sync;
pub mod types;
pub mod validation;

pub use brushwork_config::{BackendKind, EngineConfig};

pub use accumulation::AccumulationPair;
pub use blend::{BlendMode, Rgba};
pub use brush::{BrushConfig, PressureCurve, PressureDynamics};
pub use compositor::{composite_stroke, preview_composite};
pub use constants::*;
pub use dispatcher::BatchDispatcher;
pub use engine::{EndStroke, EngineEvent, LayerRef, StrokeEngine, StrokeSummary};
pub use error::EngineError;
pub use gpu::{DabDevice, DeviceError, FaultPlan, SoftwareDevice};
pub use interpolation::PathSmoother;
pub use lifecycle::{StrokeId, StrokeState};
pub use rect::DirtyRect;
pub use stamper::DabStamper;
pub use surface::CpuSurface;
pub use sync::{ReadbackAuthority, Snapshot};
pub use types::{DabParams, MaskShape, PointerSample, StrokePoint};
pub use validation::ValidationError;

#[cfg(feature = "wgpu")]
pub use gpu::WgpuDevice;
