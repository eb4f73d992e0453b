//! Drive a script through the engine the way an input loop would

use std::sync::{Arc, Mutex};

use brushwork_engine::{CpuSurface, DabDevice, EndStroke, EngineEvent, LayerRef, StrokeEngine};
use tracing::{debug, info, warn};

use crate::script::Script;

/// Frames to wait for a deferred commit before giving up on the stroke
const MAX_SETTLE_FRAMES: usize = 1000;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayReport {
    pub committed: usize,
    pub dropped: usize,
    pub aborted: usize,
    pub dabs: u64,
    pub reused_previews: usize,
}

impl ReplayReport {
    fn record(&mut self, event: &EngineEvent) {
        match event {
            EngineEvent::StrokeCommitted { summary } => {
                self.committed += 1;
                self.dabs += summary.dabs;
                if summary.reused_preview {
                    self.reused_previews += 1;
                }
            }
            EngineEvent::StrokeDropped { .. } => self.dropped += 1,
            EngineEvent::StrokeAborted { .. } => self.aborted += 1,
            EngineEvent::StrokeStarted { .. } | EngineEvent::DegradedMode { .. } => {}
        }
    }
}

/// Fresh transparent layer matching the engine canvas
pub fn blank_layer<D: DabDevice>(engine: &StrokeEngine<D>) -> LayerRef {
    let config = engine.config();
    Arc::new(Mutex::new(CpuSurface::new(config.width, config.height)))
}

/// Replay every stroke, pumping one frame per `points_per_frame` samples.
pub fn run<D: DabDevice>(
    engine: &mut StrokeEngine<D>,
    script: &Script,
    layer: &LayerRef,
    points_per_frame: usize,
) -> ReplayReport {
    let mut report = ReplayReport::default();
    let points_per_frame = points_per_frame.max(1);

    for (index, stroke) in script.strokes.iter().enumerate() {
        let brush = script.brush_for(stroke);
        if !engine.begin_stroke() {
            warn!("Stroke {} was not started", index);
            drain(engine, &mut report);
            continue;
        }

        for frame in stroke.path.samples().chunks(points_per_frame) {
            for sample in frame {
                engine.process_point(*sample, brush);
            }
            engine.pump();
        }

        if stroke.abort {
            engine.abort_stroke();
        } else if engine.end_stroke(Arc::clone(layer), stroke.opacity) == EndStroke::Deferred {
            let mut frames = 0;
            while engine.end_pending() && frames < MAX_SETTLE_FRAMES {
                engine.pump();
                frames += 1;
            }
            if engine.is_stroke_active() {
                warn!("Stroke {} never finished; aborting", index);
                engine.abort_stroke();
            }
        }
        drain(engine, &mut report);
    }

    info!(
        "Replay finished: {} committed, {} dropped, {} aborted, {} dabs",
        report.committed, report.dropped, report.aborted, report.dabs
    );
    report
}

fn drain<D: DabDevice>(engine: &mut StrokeEngine<D>, report: &mut ReplayReport) {
    for event in engine.take_events() {
        debug!("{:?}", event);
        if let EngineEvent::DegradedMode { consecutive_failures } = event {
            warn!("Device degraded after {} failed strokes", consecutive_failures);
        }
        report.record(&event);
    }
}
