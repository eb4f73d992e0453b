//! Events reported by the stroke engine.

use serde::Serialize;

use crate::lifecycle::StrokeId;
use crate::rect::DirtyRect;

/// Events the host can drain with `StrokeEngine::take_events`.
///
/// These let the UI react to stroke outcomes (commit, drop, degraded
/// device) without the engine calling back into it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum EngineEvent {
    /// Surfaces were requested for a new stroke.
    StrokeStarted { stroke_id: StrokeId },
    /// The stroke was composited into its target layer.
    StrokeCommitted { summary: StrokeSummary },
    /// The stroke failed and was discarded; the layer is untouched.
    StrokeDropped { stroke_id: StrokeId, reason: String },
    /// The stroke was cancelled by the host.
    StrokeAborted { stroke_id: StrokeId },
    /// Several strokes in a row have failed.
    DegradedMode { consecutive_failures: u32 },
}

/// Bookkeeping for a committed stroke
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrokeSummary {
    pub stroke_id: StrokeId,
    /// Dabs dispatched to the device
    pub dabs: u64,
    /// Batches dispatched to the device
    pub batches: u64,
    /// Layer region that was composited
    pub rect: DirtyRect,
    /// The commit used the snapshot already shown as preview
    pub reused_preview: bool,
}
