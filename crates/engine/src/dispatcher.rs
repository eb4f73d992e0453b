//! Batch dispatcher
//!
//! Collects dabs into batches of exactly the kernel's shared capacity and
//! submits each full batch as one ping-pong dispatch. The dispatch region
//! is the stroke's dirty rect grown by the batch, so the untouched parts of
//! the pair stay identical (transparent) on both surfaces.

use tracing::debug;

use crate::accumulation::AccumulationPair;
use crate::constants::DAB_BATCH_CAPACITY;
use crate::error::EngineError;
use crate::gpu::{DabDevice, DeviceError, SubmissionIndex};
use crate::rect::DirtyRect;
use crate::types::DabParams;
use crate::validation::validate_batch;

#[derive(Debug)]
pub struct BatchDispatcher {
    pending: Vec<DabParams>,
    /// Union of every dispatched dab's footprint, clamped to the canvas
    dirty: DirtyRect,
    width: u32,
    height: u32,
    last_submission: Option<SubmissionIndex>,
    batches_dispatched: u64,
    dabs_dispatched: u64,
    dabs_clipped: u64,
}

impl BatchDispatcher {
    /// Create a dispatcher for a `width x height` canvas.
    ///
    /// Fails if the device kernel was built for a different batch capacity:
    /// a smaller kernel would silently drop the tail of every full batch.
    pub fn new<D: DabDevice + ?Sized>(device: &D, width: u32, height: u32) -> Result<Self, EngineError> {
        let kernel = device.kernel_capacity();
        if kernel != DAB_BATCH_CAPACITY {
            return Err(EngineError::CapacityMismatch {
                host: DAB_BATCH_CAPACITY,
                kernel,
            });
        }
        Ok(Self {
            pending: Vec::with_capacity(DAB_BATCH_CAPACITY),
            dirty: DirtyRect::empty(),
            width,
            height,
            last_submission: None,
            batches_dispatched: 0,
            dabs_dispatched: 0,
            dabs_clipped: 0,
        })
    }

    /// Add a dab; a batch that reaches capacity is dispatched immediately
    pub fn queue<D: DabDevice + ?Sized>(
        &mut self,
        device: &mut D,
        pair: &mut AccumulationPair,
        dab: DabParams,
    ) -> Result<Option<SubmissionIndex>, DeviceError> {
        debug_assert!(self.pending.len() < DAB_BATCH_CAPACITY);
        self.pending.push(dab);
        if self.pending.len() >= DAB_BATCH_CAPACITY {
            return self.flush(device, pair);
        }
        Ok(None)
    }

    /// Dispatch whatever is pending (no-op when empty)
    pub fn flush<D: DabDevice + ?Sized>(
        &mut self,
        device: &mut D,
        pair: &mut AccumulationPair,
    ) -> Result<Option<SubmissionIndex>, DeviceError> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        debug_assert!(validate_batch(&self.pending).is_ok(), "malformed batch");

        let mut batch_bounds = DirtyRect::empty();
        for dab in &self.pending {
            batch_bounds.expand_by_dab(dab);
        }
        let batch_bounds = batch_bounds.clamped(self.width, self.height);

        if batch_bounds.is_empty() {
            // Entire batch lies off-canvas
            self.dabs_clipped += self.pending.len() as u64;
            debug!("BatchDispatcher: dropping {} off-canvas dabs", self.pending.len());
            self.pending.clear();
            return Ok(None);
        }

        let region = self.dirty.united(&batch_bounds);
        let result = device.dispatch(pair.read_surface(), pair.write_surface(), &self.pending, region);
        let count = self.pending.len();
        self.pending.clear();
        let index = result?;

        pair.swap();
        self.dirty = region;
        self.last_submission = Some(index);
        self.batches_dispatched += 1;
        self.dabs_dispatched += count as u64;

        debug!(
            "BatchDispatcher: batch {} ({} dabs) -> {:?}, region {}x{} at ({}, {})",
            self.batches_dispatched,
            count,
            index,
            region.width(),
            region.height(),
            region.left,
            region.top
        );

        Ok(Some(index))
    }

    /// Drop the undispatched batch without submitting it
    pub fn discard(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn dirty_rect(&self) -> DirtyRect {
        self.dirty
    }

    pub fn last_submission(&self) -> Option<SubmissionIndex> {
        self.last_submission
    }

    pub fn batches_dispatched(&self) -> u64 {
        self.batches_dispatched
    }

    pub fn dabs_dispatched(&self) -> u64 {
        self.dabs_dispatched
    }

    /// Dabs dropped because their whole batch fell outside the canvas
    pub fn dabs_clipped(&self) -> u64 {
        self.dabs_clipped
    }
}
