//! Deterministic CPU implementation of [`DabDevice`]
//!
//! Dispatches and readbacks are queued and only execute when the device is
//! polled or waited on, in submission order, so callers see the same
//! asynchronous behavior a GPU queue gives them. The stamp kernel copies
//! the batch into a fixed shared array before touching pixels, like the
//! compute shader does with workgroup memory.

use std::collections::{HashMap, VecDeque};
use std::task::Poll;

use bytemuck::Zeroable;
use tracing::{debug, warn};

use super::{AllocationTicket, DabDevice, DeviceError, ReadbackTicket, SubmissionIndex, SurfaceId};
use crate::blend::{Rgba, TRANSPARENT, stamp_pixel};
use crate::constants::DAB_BATCH_CAPACITY;
use crate::rect::DirtyRect;
use crate::surface::CpuSurface;
use crate::types::DabParams;

/// Failures to inject, for exercising recovery paths
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FaultPlan {
    /// Polls an allocation stays pending before it resolves
    pub allocation_latency: u32,
    /// Every allocation resolves to an error
    pub fail_allocation: bool,
    /// The dispatch with this ordinal (0-based, device lifetime) fails
    pub fail_dispatch_at: Option<u64>,
    /// Every readback request fails
    pub fail_readback: bool,
}

#[derive(Debug)]
struct PendingAllocation {
    width: u32,
    height: u32,
    polls_remaining: u32,
}

#[derive(Debug)]
enum QueuedOp {
    Stamp {
        index: u64,
        read: SurfaceId,
        write: SurfaceId,
        batch: Vec<DabParams>,
        region: DirtyRect,
    },
    Readback {
        index: u64,
        ticket: ReadbackTicket,
        surface: SurfaceId,
        rect: DirtyRect,
    },
}

/// CPU device with queued, in-order execution
#[derive(Debug)]
pub struct SoftwareDevice {
    surfaces: HashMap<SurfaceId, CpuSurface>,
    allocations: HashMap<AllocationTicket, PendingAllocation>,
    queue: VecDeque<QueuedOp>,
    /// `None` while queued
    readbacks: HashMap<ReadbackTicket, Option<Result<Vec<Rgba>, DeviceError>>>,
    next_id: u64,
    next_submission: u64,
    completed_through: u64,
    kernel_capacity: usize,
    ops_per_poll: Option<usize>,
    faults: FaultPlan,
    dispatch_calls: u64,
    dispatches_run: u64,
    readbacks_run: u64,
    max_batch_len: usize,
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareDevice {
    pub fn new() -> Self {
        Self {
            surfaces: HashMap::new(),
            allocations: HashMap::new(),
            queue: VecDeque::new(),
            readbacks: HashMap::new(),
            next_id: 1,
            next_submission: 1,
            completed_through: 0,
            kernel_capacity: DAB_BATCH_CAPACITY,
            ops_per_poll: None,
            faults: FaultPlan::default(),
            dispatch_calls: 0,
            dispatches_run: 0,
            readbacks_run: 0,
            max_batch_len: 0,
        }
    }

    /// Report a different kernel capacity (a mis-dimensioned kernel)
    pub fn with_kernel_capacity(mut self, capacity: usize) -> Self {
        self.kernel_capacity = capacity.min(DAB_BATCH_CAPACITY);
        self
    }

    /// Execute at most `ops` queued operations per non-blocking poll
    pub fn with_ops_per_poll(mut self, ops: usize) -> Self {
        self.ops_per_poll = Some(ops);
        self
    }

    pub fn with_faults(mut self, faults: FaultPlan) -> Self {
        self.faults = faults;
        self
    }

    pub fn faults_mut(&mut self) -> &mut FaultPlan {
        &mut self.faults
    }

    /// Direct view of a surface (for inspection in tests and tools)
    pub fn surface(&self, id: SurfaceId) -> Option<&CpuSurface> {
        self.surfaces.get(&id)
    }

    pub fn live_surfaces(&self) -> usize {
        self.surfaces.len()
    }

    /// Stamp dispatches executed so far
    pub fn dispatch_count(&self) -> u64 {
        self.dispatches_run
    }

    /// Readbacks executed so far
    pub fn readback_count(&self) -> u64 {
        self.readbacks_run
    }

    /// Largest batch ever submitted
    pub fn max_batch_len(&self) -> usize {
        self.max_batch_len
    }

    /// Operations waiting to execute
    pub fn queued_ops(&self) -> usize {
        self.queue.len()
    }

    fn next_handle(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn next_index(&mut self) -> u64 {
        let index = self.next_submission;
        self.next_submission += 1;
        index
    }

    /// Execute up to `limit` queued operations (all if `None`)
    fn run_queue(&mut self, limit: Option<usize>) {
        let mut budget = limit.unwrap_or(usize::MAX);
        while budget > 0 {
            let Some(op) = self.queue.pop_front() else {
                break;
            };
            budget -= 1;
            match op {
                QueuedOp::Stamp {
                    index,
                    read,
                    write,
                    batch,
                    region,
                } => {
                    self.execute_stamp(read, write, &batch, region);
                    self.completed_through = index;
                }
                QueuedOp::Readback {
                    index,
                    ticket,
                    surface,
                    rect,
                } => {
                    let result = self
                        .surfaces
                        .get(&surface)
                        .map(|s| s.region(&rect))
                        .ok_or(DeviceError::SurfaceLost(surface));
                    self.readbacks_run += 1;
                    if let Some(slot) = self.readbacks.get_mut(&ticket) {
                        *slot = Some(result);
                    }
                    self.completed_through = index;
                }
            }
        }
    }

    fn execute_stamp(&mut self, read: SurfaceId, write: SurfaceId, batch: &[DabParams], region: DirtyRect) {
        let Some(mut dst) = self.surfaces.remove(&write) else {
            warn!("SoftwareDevice: write surface {:?} released before dispatch ran", write);
            return;
        };
        match self.surfaces.get(&read) {
            Some(src) => run_stamp_kernel(src, &mut dst, batch, region, self.kernel_capacity),
            None => warn!("SoftwareDevice: read surface {:?} released before dispatch ran", read),
        }
        self.surfaces.insert(write, dst);
        self.dispatches_run += 1;
    }
}

/// The stamp kernel: rewrite every pixel of `region` in `dst` from `src`
/// with the batch applied in order.
fn run_stamp_kernel(
    src: &CpuSurface,
    dst: &mut CpuSurface,
    batch: &[DabParams],
    region: DirtyRect,
    capacity: usize,
) {
    let mut shared = [DabParams::zeroed(); DAB_BATCH_CAPACITY];
    let count = batch.len().min(capacity).min(DAB_BATCH_CAPACITY);
    shared[..count].copy_from_slice(&batch[..count]);
    let dabs = &shared[..count];

    let region = region.clamped(dst.width, dst.height);
    for y in region.top..region.bottom {
        for x in region.left..region.right {
            let (x, y) = (x as u32, y as u32);
            let base = src.get_pixel(x, y).unwrap_or(TRANSPARENT);
            dst.set_pixel(x, y, stamp_pixel(base, dabs, x, y));
        }
    }
}

impl DabDevice for SoftwareDevice {
    fn kernel_capacity(&self) -> usize {
        self.kernel_capacity
    }

    fn request_surfaces(&mut self, width: u32, height: u32) -> Result<AllocationTicket, DeviceError> {
        if width == 0 || height == 0 {
            return Err(DeviceError::AllocationFailed(format!(
                "empty surface {}x{}",
                width, height
            )));
        }
        let ticket = AllocationTicket(self.next_handle());
        self.allocations.insert(
            ticket,
            PendingAllocation {
                width,
                height,
                polls_remaining: self.faults.allocation_latency,
            },
        );
        Ok(ticket)
    }

    fn poll_surfaces(&mut self, ticket: AllocationTicket) -> Poll<Result<[SurfaceId; 2], DeviceError>> {
        let Some(pending) = self.allocations.get_mut(&ticket) else {
            return Poll::Ready(Err(DeviceError::UnknownAllocation(ticket)));
        };
        if pending.polls_remaining > 0 {
            pending.polls_remaining -= 1;
            return Poll::Pending;
        }
        let (width, height) = (pending.width, pending.height);
        self.allocations.remove(&ticket);

        if self.faults.fail_allocation {
            return Poll::Ready(Err(DeviceError::AllocationFailed(
                "injected allocation failure".to_string(),
            )));
        }

        let a = SurfaceId(self.next_handle());
        let b = SurfaceId(self.next_handle());
        self.surfaces.insert(a, CpuSurface::new(width, height));
        self.surfaces.insert(b, CpuSurface::new(width, height));
        debug!("SoftwareDevice: allocated {:?}/{:?} ({}x{})", a, b, width, height);
        Poll::Ready(Ok([a, b]))
    }

    fn cancel_surfaces(&mut self, ticket: AllocationTicket) {
        self.allocations.remove(&ticket);
    }

    fn dispatch(
        &mut self,
        read: SurfaceId,
        write: SurfaceId,
        batch: &[DabParams],
        region: DirtyRect,
    ) -> Result<SubmissionIndex, DeviceError> {
        if read == write {
            return Err(DeviceError::AliasedSurfaces(read));
        }
        for id in [read, write] {
            if !self.surfaces.contains_key(&id) {
                return Err(DeviceError::SurfaceLost(id));
            }
        }
        if batch.len() > self.kernel_capacity {
            return Err(DeviceError::BatchTooLarge {
                len: batch.len(),
                capacity: self.kernel_capacity,
            });
        }

        let ordinal = self.dispatch_calls;
        self.dispatch_calls += 1;
        if self.faults.fail_dispatch_at == Some(ordinal) {
            return Err(DeviceError::DispatchFailed(format!(
                "injected failure at dispatch {}",
                ordinal
            )));
        }

        self.max_batch_len = self.max_batch_len.max(batch.len());
        let index = self.next_index();
        self.queue.push_back(QueuedOp::Stamp {
            index,
            read,
            write,
            batch: batch.to_vec(),
            region,
        });
        Ok(SubmissionIndex(index))
    }

    fn is_complete(&mut self, index: SubmissionIndex) -> bool {
        if index.0 > self.completed_through {
            self.run_queue(self.ops_per_poll);
        }
        index.0 <= self.completed_through
    }

    fn wait_for(&mut self, index: SubmissionIndex) -> Result<(), DeviceError> {
        while index.0 > self.completed_through && !self.queue.is_empty() {
            self.run_queue(Some(1));
        }
        Ok(())
    }

    fn request_readback(&mut self, surface: SurfaceId, rect: DirtyRect) -> Result<ReadbackTicket, DeviceError> {
        if self.faults.fail_readback {
            return Err(DeviceError::ReadbackFailed("injected readback failure".to_string()));
        }
        if !self.surfaces.contains_key(&surface) {
            return Err(DeviceError::SurfaceLost(surface));
        }
        let ticket = ReadbackTicket(self.next_handle());
        let index = self.next_index();
        self.queue.push_back(QueuedOp::Readback {
            index,
            ticket,
            surface,
            rect,
        });
        self.readbacks.insert(ticket, None);
        Ok(ticket)
    }

    fn poll_readback(&mut self, ticket: ReadbackTicket) -> Poll<Result<Vec<Rgba>, DeviceError>> {
        if matches!(self.readbacks.get(&ticket), Some(None)) {
            self.run_queue(self.ops_per_poll);
        }
        match self.readbacks.get(&ticket) {
            None => Poll::Ready(Err(DeviceError::UnknownReadback(ticket))),
            Some(None) => Poll::Pending,
            Some(Some(_)) => match self.readbacks.remove(&ticket) {
                Some(Some(result)) => Poll::Ready(result),
                _ => Poll::Ready(Err(DeviceError::UnknownReadback(ticket))),
            },
        }
    }

    fn wait_readback(&mut self, ticket: ReadbackTicket) -> Result<Vec<Rgba>, DeviceError> {
        while matches!(self.readbacks.get(&ticket), Some(None)) && !self.queue.is_empty() {
            self.run_queue(Some(1));
        }
        match self.readbacks.remove(&ticket) {
            Some(Some(result)) => result,
            _ => Err(DeviceError::UnknownReadback(ticket)),
        }
    }

    fn release(&mut self, surface: SurfaceId) {
        self.surfaces.remove(&surface);
    }
}
