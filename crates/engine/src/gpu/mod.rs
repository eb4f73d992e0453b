//! Device seam for the accumulation surfaces
//!
//! The engine talks to the GPU only through [`DabDevice`]: surface
//! allocation, one stamp dispatch per batch, completion polling and
//! readback. All waits are explicit handle waits; nothing calls back into
//! the engine.
//!
//! - [`software::SoftwareDevice`] - deterministic CPU device with queued execution
//! - `wgpu_device::WgpuDevice` - compute-shader device (feature `wgpu`)

pub mod software;
#[cfg(feature = "wgpu")]
pub mod wgpu_device;

use std::task::Poll;

use thiserror::Error;

use crate::blend::Rgba;
use crate::rect::DirtyRect;
use crate::types::DabParams;

pub use software::{FaultPlan, SoftwareDevice};
#[cfg(feature = "wgpu")]
pub use wgpu_device::WgpuDevice;

/// Handle to a device-resident RGBA f32 surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u64);

/// Handle for an in-progress surface pair allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocationTicket(pub u64);

/// Position of a dispatch in the device's submission order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubmissionIndex(pub u64);

/// Handle for an in-progress readback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReadbackTicket(pub u64);

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DeviceError {
    #[error("Surface allocation failed: {0}")]
    AllocationFailed(String),
    #[error("Unknown allocation ticket {0:?}")]
    UnknownAllocation(AllocationTicket),
    #[error("Surface {0:?} is not allocated")]
    SurfaceLost(SurfaceId),
    #[error("Dispatch would read and write surface {0:?}")]
    AliasedSurfaces(SurfaceId),
    #[error("Batch of {len} dabs exceeds kernel capacity {capacity}")]
    BatchTooLarge { len: usize, capacity: usize },
    #[error("Dispatch failed: {0}")]
    DispatchFailed(String),
    #[error("Readback failed: {0}")]
    ReadbackFailed(String),
    #[error("Unknown readback ticket {0:?}")]
    UnknownReadback(ReadbackTicket),
}

/// A device that owns accumulation surfaces and runs the stamp kernel.
///
/// Work is ordered: a readback requested after a dispatch observes that
/// dispatch, and dispatches complete in submission order.
pub trait DabDevice {
    /// Length of the kernel's shared dab array
    fn kernel_capacity(&self) -> usize;

    /// Start allocating two transparent `width x height` surfaces
    fn request_surfaces(&mut self, width: u32, height: u32) -> Result<AllocationTicket, DeviceError>;

    /// Non-blocking check on an allocation
    fn poll_surfaces(&mut self, ticket: AllocationTicket) -> Poll<Result<[SurfaceId; 2], DeviceError>>;

    /// Drop an allocation that is no longer wanted (ready or not)
    fn cancel_surfaces(&mut self, ticket: AllocationTicket);

    /// Stamp `batch` over `region`, reading `read` and writing `write`.
    ///
    /// Every pixel of `region` in `write` is rewritten from `read`; pixels
    /// outside it are left untouched.
    fn dispatch(
        &mut self,
        read: SurfaceId,
        write: SurfaceId,
        batch: &[DabParams],
        region: DirtyRect,
    ) -> Result<SubmissionIndex, DeviceError>;

    /// Non-blocking completion check
    fn is_complete(&mut self, index: SubmissionIndex) -> bool;

    /// Block until `index` (and everything before it) has completed
    fn wait_for(&mut self, index: SubmissionIndex) -> Result<(), DeviceError>;

    /// Queue a copy of `rect` out of `surface`
    fn request_readback(&mut self, surface: SurfaceId, rect: DirtyRect) -> Result<ReadbackTicket, DeviceError>;

    /// Non-blocking check on a readback; `Ready` consumes the ticket
    fn poll_readback(&mut self, ticket: ReadbackTicket) -> Poll<Result<Vec<Rgba>, DeviceError>>;

    /// Block until a readback is available; consumes the ticket
    fn wait_readback(&mut self, ticket: ReadbackTicket) -> Result<Vec<Rgba>, DeviceError>;

    /// Free a surface
    fn release(&mut self, surface: SurfaceId);
}

impl<D: DabDevice + ?Sized> DabDevice for Box<D> {
    fn kernel_capacity(&self) -> usize {
        (**self).kernel_capacity()
    }

    fn request_surfaces(&mut self, width: u32, height: u32) -> Result<AllocationTicket, DeviceError> {
        (**self).request_surfaces(width, height)
    }

    fn poll_surfaces(&mut self, ticket: AllocationTicket) -> Poll<Result<[SurfaceId; 2], DeviceError>> {
        (**self).poll_surfaces(ticket)
    }

    fn cancel_surfaces(&mut self, ticket: AllocationTicket) {
        (**self).cancel_surfaces(ticket)
    }

    fn dispatch(
        &mut self,
        read: SurfaceId,
        write: SurfaceId,
        batch: &[DabParams],
        region: DirtyRect,
    ) -> Result<SubmissionIndex, DeviceError> {
        (**self).dispatch(read, write, batch, region)
    }

    fn is_complete(&mut self, index: SubmissionIndex) -> bool {
        (**self).is_complete(index)
    }

    fn wait_for(&mut self, index: SubmissionIndex) -> Result<(), DeviceError> {
        (**self).wait_for(index)
    }

    fn request_readback(&mut self, surface: SurfaceId, rect: DirtyRect) -> Result<ReadbackTicket, DeviceError> {
        (**self).request_readback(surface, rect)
    }

    fn poll_readback(&mut self, ticket: ReadbackTicket) -> Poll<Result<Vec<Rgba>, DeviceError>> {
        (**self).poll_readback(ticket)
    }

    fn wait_readback(&mut self, ticket: ReadbackTicket) -> Result<Vec<Rgba>, DeviceError> {
        (**self).wait_readback(ticket)
    }

    fn release(&mut self, surface: SurfaceId) {
        (**self).release(surface)
    }
}
