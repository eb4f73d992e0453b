//! Stroke engine
//!
//! [`StrokeEngine`] is the public face of the crate. It connects:
//! - Pointer input (`begin_stroke`, `process_point`, `end_stroke`)
//! - The lifecycle state machine
//! - Path smoothing and dab stamping
//! - Batched ping-pong dispatch on a [`DabDevice`]
//! - The readback authority shared by preview and commit
//!
//! Everything runs on the caller's thread. The host calls [`StrokeEngine::pump`]
//! once per display frame; that is where allocations resolve and the
//! preview advances.

mod events;
mod stroke;

pub use events::{EngineEvent, StrokeSummary};
pub use stroke::LayerRef;

use std::sync::Arc;
use std::task::Poll;

use brushwork_config::EngineConfig;
use tracing::{debug, info, warn};

use crate::accumulation::AccumulationPair;
use crate::blend::BlendMode;
use crate::brush::BrushConfig;
use crate::compositor::composite_stroke;
use crate::constants::DAB_BATCH_CAPACITY;
use crate::dispatcher::BatchDispatcher;
use crate::error::EngineError;
use crate::gpu::{DabDevice, SurfaceId};
use crate::lifecycle::{EndRequest, LifecycleError, StrokeId, StrokeLifecycle, StrokeState};
use crate::rect::DirtyRect;
use crate::sync::Snapshot;
use crate::types::PointerSample;
use crate::validation::{validate_brush_config, validate_sample};
use stroke::{StrokeContext, StrokeGpu};

/// Result of `end_stroke`
#[derive(Debug, Clone, PartialEq)]
pub enum EndStroke {
    /// No stroke in progress
    Ignored,
    /// Surfaces are still being allocated; the commit runs from `pump`
    Deferred,
    /// The stroke was composited into the layer
    Committed(StrokeSummary),
    /// The stroke failed and the layer was left untouched
    Dropped(StrokeId),
}

/// Real-time stroke engine over a dab device
pub struct StrokeEngine<D: DabDevice> {
    device: D,
    config: EngineConfig,
    lifecycle: StrokeLifecycle,
    stroke: Option<StrokeContext>,
    events: Vec<EngineEvent>,
    consecutive_failures: u32,
}

impl<D: DabDevice> StrokeEngine<D> {
    /// Create an engine for the canvas described by `config`.
    ///
    /// Fails if the device kernel was dimensioned for a different batch
    /// capacity than the host batches with.
    pub fn new(device: D, config: EngineConfig) -> Result<Self, EngineError> {
        let kernel = device.kernel_capacity();
        if kernel != DAB_BATCH_CAPACITY {
            return Err(EngineError::CapacityMismatch {
                host: DAB_BATCH_CAPACITY,
                kernel,
            });
        }
        info!(
            "StrokeEngine: {}x{} canvas, batch capacity {}",
            config.width, config.height, DAB_BATCH_CAPACITY
        );
        Ok(Self {
            device,
            config,
            lifecycle: StrokeLifecycle::new(),
            stroke: None,
            events: Vec::new(),
            consecutive_failures: 0,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Current lifecycle state
    pub fn state(&self) -> StrokeState {
        self.lifecycle.state()
    }

    /// Id of the stroke in progress
    pub fn stroke_id(&self) -> Option<StrokeId> {
        self.lifecycle.stroke_id()
    }

    /// Whether a stroke is between begin and commit
    pub fn is_stroke_active(&self) -> bool {
        !self.lifecycle.is_idle()
    }

    /// Strokes dropped in a row since the last commit
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Samples waiting for surfaces
    pub fn pending_points(&self) -> usize {
        self.stroke.as_ref().map_or(0, |s| s.pending.len())
    }

    /// Canvas region touched by the stroke so far
    pub fn dirty_rect(&self) -> DirtyRect {
        self.stroke
            .as_ref()
            .map(|s| s.dirty_rect())
            .unwrap_or_else(DirtyRect::empty)
    }

    /// Latest completed preview snapshot of the stroke
    pub fn preview_surface(&self) -> Option<Arc<Snapshot>> {
        self.stroke.as_ref().and_then(|s| s.authority.latest())
    }

    /// Device surface holding the latest accumulation result
    pub fn preview_surface_id(&self) -> Option<SurfaceId> {
        let gpu = self.stroke.as_ref()?.gpu.as_ref()?;
        Some(gpu.pair.read_surface())
    }

    /// Opacity the preview is displayed at; the commit uses the same value
    /// (times the end multiplier)
    pub fn preview_opacity(&self) -> f32 {
        self.stroke
            .as_ref()
            .and_then(|s| s.latched_opacity)
            .unwrap_or(0.0)
    }

    /// Blend mode the preview is displayed with; the commit uses the same
    pub fn preview_blend_mode(&self) -> BlendMode {
        self.stroke.as_ref().map_or(BlendMode::Normal, |s| s.blend_mode)
    }

    /// Whether an end arrived before surfaces and waits on `pump`
    pub fn end_pending(&self) -> bool {
        self.lifecycle.pending_end()
    }

    /// Drain reported events
    pub fn take_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    /// Start a stroke. Returns false if one is already in progress or the
    /// device refused the surface request.
    pub fn begin_stroke(&mut self) -> bool {
        let id = match self.lifecycle.begin() {
            Ok(id) => id,
            Err(err) => {
                debug!("StrokeEngine::begin_stroke ignored: {}", err);
                return false;
            }
        };
        self.events.push(EngineEvent::StrokeStarted { stroke_id: id });

        let ticket = match self
            .device
            .request_surfaces(self.config.width, self.config.height)
        {
            Ok(ticket) => ticket,
            Err(err) => {
                self.drop_stroke(err.into());
                return false;
            }
        };

        info!("StrokeEngine: stroke {} started", id.0);
        self.stroke = Some(StrokeContext::new(
            id,
            ticket,
            self.config.smoothing_tension,
            (self.config.width, self.config.height),
        ));
        self.pump();
        true
    }

    /// Feed one pointer sample with the brush it was drawn with.
    ///
    /// Invalid samples or configs are logged and skipped; the stroke
    /// continues.
    pub fn process_point(&mut self, sample: PointerSample, config: &BrushConfig) {
        let state = self.lifecycle.state();
        let Some(stroke) = self.stroke.as_mut() else {
            return;
        };
        if !matches!(state, StrokeState::Starting | StrokeState::Active) {
            return;
        }
        if let Err(err) = validate_sample(&sample).and_then(|_| validate_brush_config(config)) {
            warn!("StrokeEngine::process_point: skipping point: {}", err);
            return;
        }

        stroke.latch(config);
        if state == StrokeState::Starting {
            stroke.pending.push_back((sample, config.clone()));
            return;
        }
        if let Err(err) = stroke.stamp_sample(&mut self.device, sample, config) {
            self.drop_stroke(err.into());
        }
    }

    /// End the stroke and commit it into `layer` at `opacity` times the
    /// latched brush opacity.
    pub fn end_stroke(&mut self, layer: LayerRef, opacity: f32) -> EndStroke {
        match self.lifecycle.request_end() {
            EndRequest::Ignored => EndStroke::Ignored,
            EndRequest::Deferred => {
                if let Some(stroke) = self.stroke.as_mut() {
                    stroke.end_target = Some((layer, opacity));
                }
                debug!("StrokeEngine::end_stroke deferred until surfaces are ready");
                EndStroke::Deferred
            }
            EndRequest::Finish => self.finish(layer, opacity),
        }
    }

    /// Cancel the stroke. Nothing is written to any layer.
    pub fn abort_stroke(&mut self) -> bool {
        let Some(stroke) = self.stroke.take() else {
            return false;
        };
        let dropped_points = stroke.pending.len();
        stroke.release(&mut self.device);
        if let Some(id) = self.lifecycle.reset() {
            info!(
                "StrokeEngine: stroke {} aborted ({} queued points discarded)",
                id.0, dropped_points
            );
            self.events.push(EngineEvent::StrokeAborted { stroke_id: id });
        }
        true
    }

    /// Cooperative tick: resolve a pending allocation or advance the preview
    pub fn pump(&mut self) {
        match self.lifecycle.state() {
            StrokeState::Starting => self.poll_allocation(),
            StrokeState::Active => {
                let Some(stroke) = self.stroke.as_mut() else {
                    return;
                };
                if let Err(err) = stroke.refresh_preview(&mut self.device) {
                    self.drop_stroke(err.into());
                }
            }
            StrokeState::Idle | StrokeState::Finishing => {}
        }
    }

    fn poll_allocation(&mut self) {
        match self.activate() {
            Ok(None) => {}
            Ok(Some(false)) => {}
            Ok(Some(true)) => {
                if let Err(err) = self.lifecycle.begin_finishing() {
                    self.drop_stroke(err.into());
                    return;
                }
                let target = self.stroke.as_mut().and_then(|s| s.end_target.take());
                match target {
                    Some((layer, opacity)) => {
                        self.finish(layer, opacity);
                    }
                    None => {
                        let state = self.lifecycle.state();
                        self.drop_stroke(
                            LifecycleError::InvalidTransition {
                                action: "commit without target",
                                state,
                            }
                            .into(),
                        );
                    }
                }
            }
            Err(err) => self.drop_stroke(err),
        }
    }

    /// Starting -> Active once surfaces exist. Returns `None` while the
    /// allocation is pending, otherwise whether an end was deferred.
    fn activate(&mut self) -> Result<Option<bool>, EngineError> {
        let Some(stroke) = self.stroke.as_mut() else {
            return Ok(None);
        };
        let Some(ticket) = stroke.allocation else {
            return Ok(None);
        };
        let surfaces = match self.device.poll_surfaces(ticket) {
            Poll::Pending => return Ok(None),
            Poll::Ready(result) => {
                stroke.allocation = None;
                result?
            }
        };

        let (width, height) = (self.config.width, self.config.height);
        let dispatcher = match BatchDispatcher::new(&self.device, width, height) {
            Ok(dispatcher) => dispatcher,
            Err(err) => {
                for id in surfaces {
                    self.device.release(id);
                }
                return Err(err);
            }
        };
        stroke.gpu = Some(StrokeGpu {
            pair: AccumulationPair::new(surfaces, width, height),
            dispatcher,
        });
        let pending_end = self.lifecycle.surfaces_ready()?;

        let queued = stroke.pending.len();
        while let Some((sample, config)) = stroke.pending.pop_front() {
            stroke.stamp_sample(&mut self.device, sample, &config)?;
        }
        debug!(
            "StrokeEngine: stroke {} active, replayed {} queued points",
            stroke.id.0, queued
        );
        Ok(Some(pending_end))
    }

    fn finish(&mut self, layer: LayerRef, opacity: f32) -> EndStroke {
        let Some(mut stroke) = self.stroke.take() else {
            self.lifecycle.reset();
            return EndStroke::Ignored;
        };
        let id = stroke.id;
        let result = self.commit(&mut stroke, &layer, opacity);
        stroke.release(&mut self.device);

        match result {
            Ok(summary) => {
                self.consecutive_failures = 0;
                info!(
                    "StrokeEngine: stroke {} committed ({} dabs in {} batches, reused preview: {})",
                    id.0, summary.dabs, summary.batches, summary.reused_preview
                );
                self.events.push(EngineEvent::StrokeCommitted {
                    summary: summary.clone(),
                });
                EndStroke::Committed(summary)
            }
            Err(err) => {
                self.drop_stroke(err);
                EndStroke::Dropped(id)
            }
        }
    }

    /// Finishing -> Idle: flush, read back, composite once into the layer
    fn commit(
        &mut self,
        stroke: &mut StrokeContext,
        layer: &LayerRef,
        opacity: f32,
    ) -> Result<StrokeSummary, EngineError> {
        let Some((snapshot, reused_preview)) = stroke.final_snapshot(&mut self.device)? else {
            return Err(LifecycleError::InvalidTransition {
                action: "commit without surfaces",
                state: self.lifecycle.state(),
            }
            .into());
        };

        let ceiling = stroke.latched_opacity.unwrap_or(0.0) * opacity.clamp(0.0, 1.0);
        let rect = {
            let mut layer = layer.lock().map_err(|_| EngineError::LayerPoisoned)?;
            if layer.width != self.config.width || layer.height != self.config.height {
                return Err(EngineError::LayerSizeMismatch {
                    layer_width: layer.width,
                    layer_height: layer.height,
                    canvas_width: self.config.width,
                    canvas_height: self.config.height,
                });
            }
            composite_stroke(&snapshot, &mut layer, ceiling, stroke.blend_mode)
        };
        let stroke_id = self.lifecycle.complete()?;

        let (dabs, batches) = stroke
            .gpu
            .as_ref()
            .map_or((0, 0), |gpu| (gpu.dispatcher.dabs_dispatched(), gpu.dispatcher.batches_dispatched()));
        Ok(StrokeSummary {
            stroke_id,
            dabs,
            batches,
            rect,
            reused_preview,
        })
    }

    /// Recover from a failed stroke: release everything, back to Idle
    fn drop_stroke(&mut self, err: EngineError) {
        let context_id = self.stroke.as_ref().map(|s| s.id);
        if let Some(stroke) = self.stroke.take() {
            stroke.release(&mut self.device);
        }
        let stroke_id = self.lifecycle.reset().or(context_id);
        self.consecutive_failures += 1;

        warn!(
            "StrokeEngine: dropping stroke {:?}: {} ({} consecutive failures)",
            stroke_id, err, self.consecutive_failures
        );
        if let Some(stroke_id) = stroke_id {
            self.events.push(EngineEvent::StrokeDropped {
                stroke_id,
                reason: err.to_string(),
            });
        }
        if self.config.degraded_after > 0 && self.consecutive_failures == self.config.degraded_after {
            warn!("StrokeEngine: entering degraded mode");
            self.events.push(EngineEvent::DegradedMode {
                consecutive_failures: self.consecutive_failures,
            });
        }
    }
}
