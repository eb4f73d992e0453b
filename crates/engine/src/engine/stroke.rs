//! Per-stroke state owned by the engine between begin and commit

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::accumulation::AccumulationPair;
use crate::blend::BlendMode;
use crate::brush::BrushConfig;
use crate::dispatcher::BatchDispatcher;
use crate::gpu::{AllocationTicket, DabDevice, DeviceError};
use crate::interpolation::PathSmoother;
use crate::lifecycle::StrokeId;
use crate::rect::DirtyRect;
use crate::stamper::DabStamper;
use crate::surface::CpuSurface;
use crate::sync::{ReadbackAuthority, Snapshot};
use crate::types::{PointerSample, StrokePoint};

/// Shared handle to the permanent layer a stroke commits into
pub type LayerRef = Arc<Mutex<CpuSurface>>;

/// Device resources that exist once allocation has finished
#[derive(Debug)]
pub(crate) struct StrokeGpu {
    pub pair: AccumulationPair,
    pub dispatcher: BatchDispatcher,
}

#[derive(Debug)]
pub(crate) struct StrokeContext {
    pub id: StrokeId,
    /// Outstanding surface allocation (`None` once resolved)
    pub allocation: Option<AllocationTicket>,
    /// Samples received while `Starting`, replayed in order on activation
    pub pending: VecDeque<(PointerSample, BrushConfig)>,
    pub gpu: Option<StrokeGpu>,
    pub smoother: PathSmoother,
    pub stamper: DabStamper,
    pub authority: ReadbackAuthority,
    /// Config of the most recent stamped sample, reused for the smoothed tail
    pub last_config: Option<BrushConfig>,
    /// Opacity ceiling taken from the first sample's config
    pub latched_opacity: Option<f32>,
    /// Layer blend mode taken from the first sample's config
    pub blend_mode: BlendMode,
    /// Commit target of a deferred end
    pub end_target: Option<(LayerRef, f32)>,
}

impl StrokeContext {
    pub fn new(id: StrokeId, allocation: AllocationTicket, tension: f32, canvas: (u32, u32)) -> Self {
        Self {
            id,
            allocation: Some(allocation),
            pending: VecDeque::new(),
            gpu: None,
            smoother: PathSmoother::default().with_tension(tension),
            stamper: DabStamper::new().with_canvas(canvas.0, canvas.1),
            authority: ReadbackAuthority::new(),
            last_config: None,
            latched_opacity: None,
            blend_mode: BlendMode::Normal,
            end_target: None,
        }
    }

    /// Latch the stroke opacity and blend mode from the first sample's config
    pub fn latch(&mut self, config: &BrushConfig) {
        if self.latched_opacity.is_none() {
            self.latched_opacity = Some(config.opacity_ceiling());
            self.blend_mode = config.blend_mode;
        }
    }

    pub fn dirty_rect(&self) -> DirtyRect {
        self.gpu
            .as_ref()
            .map(|gpu| gpu.dispatcher.dirty_rect())
            .unwrap_or_else(DirtyRect::empty)
    }

    /// Run one sample through smoothing, stamping and batching
    pub fn stamp_sample<D: DabDevice + ?Sized>(
        &mut self,
        device: &mut D,
        sample: PointerSample,
        config: &BrushConfig,
    ) -> Result<(), DeviceError> {
        self.smoother.set_min_distance(config.interpolation_step());
        let path = self.smoother.push(StrokePoint::from(sample));
        self.last_config = Some(config.clone());
        self.stamp_path(device, &path, config)
    }

    /// Stamp the smoother's pending tail with the last seen config
    pub fn stamp_tail<D: DabDevice + ?Sized>(&mut self, device: &mut D) -> Result<(), DeviceError> {
        let tail = self.smoother.finish();
        let Some(config) = self.last_config.take() else {
            return Ok(());
        };
        self.stamp_path(device, &tail, &config)
    }

    fn stamp_path<D: DabDevice + ?Sized>(
        &mut self,
        device: &mut D,
        path: &[StrokePoint],
        config: &BrushConfig,
    ) -> Result<(), DeviceError> {
        let Some(gpu) = self.gpu.as_mut() else {
            return Ok(());
        };
        for point in path {
            for dab in self.stamper.process_point(point, config) {
                gpu.dispatcher.queue(device, &mut gpu.pair, dab)?;
            }
        }
        Ok(())
    }

    /// Per-frame step: dispatch the partial batch, then advance the preview
    pub fn refresh_preview<D: DabDevice + ?Sized>(&mut self, device: &mut D) -> Result<(), DeviceError> {
        let Some(gpu) = self.gpu.as_mut() else {
            return Ok(());
        };
        gpu.dispatcher.flush(device, &mut gpu.pair)?;
        self.authority
            .preview_frame(device, &gpu.pair, gpu.dispatcher.dirty_rect())?;
        Ok(())
    }

    /// Flush everything and produce the commit snapshot.
    ///
    /// The flag is set when no readback was needed because the latest
    /// preview snapshot already covered every dispatched batch.
    pub fn final_snapshot<D: DabDevice + ?Sized>(
        &mut self,
        device: &mut D,
    ) -> Result<Option<(Arc<Snapshot>, bool)>, DeviceError> {
        self.stamp_tail(device)?;
        let Some(gpu) = self.gpu.as_mut() else {
            return Ok(None);
        };
        gpu.dispatcher.flush(device, &mut gpu.pair)?;

        let issued = self.authority.readbacks_issued();
        let snapshot = self.authority.final_snapshot(
            device,
            &gpu.pair,
            gpu.dispatcher.dirty_rect(),
            gpu.dispatcher.last_submission(),
        )?;
        let reused = self.authority.readbacks_issued() == issued && !snapshot.rect.is_empty();
        Ok(Some((snapshot, reused)))
    }

    /// Return every device resource this stroke holds
    pub fn release<D: DabDevice + ?Sized>(mut self, device: &mut D) {
        self.authority.reset(device);
        if let Some(ticket) = self.allocation.take() {
            device.cancel_surfaces(ticket);
        }
        if let Some(mut gpu) = self.gpu.take() {
            gpu.dispatcher.discard();
            gpu.pair.release(device);
        }
    }
}
