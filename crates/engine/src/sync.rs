//! Preview/commit synchronization
//!
//! [`ReadbackAuthority`] is the only path from the accumulation surfaces
//! back to the CPU. The live preview and the final commit both read through
//! it, which gives two guarantees:
//!
//! - at most one readback is in flight at any time
//! - when the preview already shows the last dispatched batch, the commit
//!   reuses that exact snapshot instead of reading the surface again

use std::sync::Arc;
use std::task::Poll;

use tracing::debug;

use crate::accumulation::AccumulationPair;
use crate::blend::{Rgba, TRANSPARENT};
use crate::gpu::{DabDevice, DeviceError, ReadbackTicket, SubmissionIndex};
use crate::rect::DirtyRect;

/// Accumulated stroke pixels over the dirty rect at some generation
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Dispatches reflected in `pixels`
    pub generation: u64,
    /// Canvas-space region covered by `pixels`
    pub rect: DirtyRect,
    /// Premultiplied RGBA, row-major over `rect`
    pub pixels: Vec<Rgba>,
}

impl Snapshot {
    pub fn empty(generation: u64) -> Self {
        Self {
            generation,
            rect: DirtyRect::empty(),
            pixels: Vec::new(),
        }
    }

    /// Pixel at canvas coordinates; transparent outside the rect
    pub fn pixel(&self, x: i32, y: i32) -> Rgba {
        if !self.rect.contains(x, y) {
            return TRANSPARENT;
        }
        let index = (y - self.rect.top) as usize * self.rect.width() as usize + (x - self.rect.left) as usize;
        self.pixels.get(index).copied().unwrap_or(TRANSPARENT)
    }
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    ticket: ReadbackTicket,
    generation: u64,
    rect: DirtyRect,
}

/// Single owner of accumulation readbacks for one stroke
#[derive(Debug, Default)]
pub struct ReadbackAuthority {
    in_flight: Option<InFlight>,
    latest: Option<Arc<Snapshot>>,
    readbacks_issued: u64,
}

impl ReadbackAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent completed snapshot
    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.latest.clone()
    }

    /// Whether a readback is outstanding
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Readbacks requested from the device so far
    pub fn readbacks_issued(&self) -> u64 {
        self.readbacks_issued
    }

    fn latest_generation(&self) -> Option<u64> {
        self.latest.as_ref().map(|s| s.generation)
    }

    fn install(&mut self, flight: InFlight, pixels: Vec<Rgba>) {
        // Generations only grow; an older result never replaces a newer one
        if self.latest_generation().is_some_and(|g| g > flight.generation) {
            return;
        }
        self.latest = Some(Arc::new(Snapshot {
            generation: flight.generation,
            rect: flight.rect,
            pixels,
        }));
    }

    fn start<D: DabDevice + ?Sized>(
        &mut self,
        device: &mut D,
        pair: &AccumulationPair,
        dirty: DirtyRect,
    ) -> Result<(), DeviceError> {
        debug_assert!(self.in_flight.is_none(), "concurrent readback");
        let ticket = device.request_readback(pair.read_surface(), dirty)?;
        self.readbacks_issued += 1;
        self.in_flight = Some(InFlight {
            ticket,
            generation: pair.generation(),
            rect: dirty,
        });
        Ok(())
    }

    fn poll_in_flight<D: DabDevice + ?Sized>(&mut self, device: &mut D) -> Result<(), DeviceError> {
        let Some(flight) = self.in_flight else {
            return Ok(());
        };
        match device.poll_readback(flight.ticket) {
            Poll::Pending => Ok(()),
            Poll::Ready(result) => {
                self.in_flight = None;
                self.install(flight, result?);
                Ok(())
            }
        }
    }

    /// Per-frame preview step; never blocks.
    ///
    /// Collects a finished readback if there is one, then starts a new one
    /// only when the pair has moved past the latest snapshot and nothing is
    /// in flight. Returns the latest completed snapshot.
    pub fn preview_frame<D: DabDevice + ?Sized>(
        &mut self,
        device: &mut D,
        pair: &AccumulationPair,
        dirty: DirtyRect,
    ) -> Result<Option<Arc<Snapshot>>, DeviceError> {
        self.poll_in_flight(device)?;

        let behind = match self.latest_generation() {
            Some(generation) => pair.generation() > generation,
            None => pair.generation() > 0,
        };
        if behind && self.in_flight.is_none() && !dirty.is_empty() {
            self.start(device, pair, dirty)?;
        }
        Ok(self.latest())
    }

    /// Snapshot for the commit, blocking until it is exact.
    ///
    /// Waits for the last dispatch and any outstanding readback. If the
    /// latest snapshot already reflects every dispatch it is returned as is;
    /// otherwise exactly one fresh readback is performed.
    pub fn final_snapshot<D: DabDevice + ?Sized>(
        &mut self,
        device: &mut D,
        pair: &AccumulationPair,
        dirty: DirtyRect,
        last_submission: Option<SubmissionIndex>,
    ) -> Result<Arc<Snapshot>, DeviceError> {
        if let Some(index) = last_submission {
            device.wait_for(index)?;
        }
        if let Some(flight) = self.in_flight.take() {
            let pixels = device.wait_readback(flight.ticket)?;
            self.install(flight, pixels);
        }

        if let Some(latest) = &self.latest {
            if latest.generation == pair.generation() && latest.rect == dirty {
                debug!(
                    "ReadbackAuthority: reusing preview snapshot (generation {})",
                    latest.generation
                );
                return Ok(Arc::clone(latest));
            }
        }

        if dirty.is_empty() {
            let snapshot = Arc::new(Snapshot::empty(pair.generation()));
            self.latest = Some(Arc::clone(&snapshot));
            return Ok(snapshot);
        }

        self.start(device, pair, dirty)?;
        let Some(flight) = self.in_flight.take() else {
            return Err(DeviceError::ReadbackFailed("readback not started".to_string()));
        };
        let pixels = device.wait_readback(flight.ticket)?;
        self.install(flight, pixels);
        debug!(
            "ReadbackAuthority: final readback at generation {}",
            pair.generation()
        );

        self.latest
            .clone()
            .ok_or_else(|| DeviceError::ReadbackFailed("no snapshot installed".to_string()))
    }

    /// Settle any outstanding readback and forget all snapshots
    pub fn reset<D: DabDevice + ?Sized>(&mut self, device: &mut D) {
        if let Some(flight) = self.in_flight.take() {
            // Result is irrelevant; the ticket just must not outlive the stroke
            let _ = device.wait_readback(flight.ticket);
        }
        self.latest = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::BatchDispatcher;
    use crate::gpu::SoftwareDevice;
    use crate::types::DabParams;

    struct Rig {
        device: SoftwareDevice,
        pair: AccumulationPair,
        dispatcher: BatchDispatcher,
        authority: ReadbackAuthority,
    }

    fn rig() -> Rig {
        rig_with(SoftwareDevice::new())
    }

    fn rig_with(mut device: SoftwareDevice) -> Rig {
        let ticket = device.request_surfaces(64, 64).unwrap();
        let surfaces = match device.poll_surfaces(ticket) {
            Poll::Ready(Ok(surfaces)) => surfaces,
            other => panic!("allocation failed: {:?}", other),
        };
        let dispatcher = BatchDispatcher::new(&device, 64, 64).unwrap();
        Rig {
            device,
            pair: AccumulationPair::new(surfaces, 64, 64),
            dispatcher,
            authority: ReadbackAuthority::new(),
        }
    }

    fn stamp(rig: &mut Rig, x: f32) {
        let dab = DabParams {
            x,
            y: 32.0,
            size: 8.0,
            ..Default::default()
        };
        rig.dispatcher.queue(&mut rig.device, &mut rig.pair, dab).unwrap();
        rig.dispatcher.flush(&mut rig.device, &mut rig.pair).unwrap();
    }

    fn preview(rig: &mut Rig) -> Option<Arc<Snapshot>> {
        let dirty = rig.dispatcher.dirty_rect();
        rig.authority.preview_frame(&mut rig.device, &rig.pair, dirty).unwrap()
    }

    #[test]
    fn test_preview_is_one_frame_behind() {
        let mut rig = rig();
        stamp(&mut rig, 10.0);

        // First frame starts the readback, second frame collects it
        assert!(preview(&mut rig).is_none());
        assert!(rig.authority.is_busy());
        let snapshot = preview(&mut rig).unwrap();
        assert_eq!(snapshot.generation, 1);
        assert!(snapshot.pixel(10, 32)[3] > 0.99);
    }

    #[test]
    fn test_single_readback_in_flight() {
        let mut rig = rig_with(SoftwareDevice::new().with_ops_per_poll(0));

        stamp(&mut rig, 10.0);
        preview(&mut rig);
        stamp(&mut rig, 20.0);
        preview(&mut rig);
        stamp(&mut rig, 30.0);
        preview(&mut rig);

        // Device never made progress, so only the first readback was issued
        assert_eq!(rig.authority.readbacks_issued(), 1);
    }

    #[test]
    fn test_final_snapshot_reuses_current_preview() {
        let mut rig = rig();
        stamp(&mut rig, 10.0);
        preview(&mut rig);
        let shown = preview(&mut rig).unwrap();

        let dirty = rig.dispatcher.dirty_rect();
        let last = rig.dispatcher.last_submission();
        let committed = rig
            .authority
            .final_snapshot(&mut rig.device, &rig.pair, dirty, last)
            .unwrap();
        assert!(Arc::ptr_eq(&shown, &committed));
        assert_eq!(rig.authority.readbacks_issued(), 1);
    }

    #[test]
    fn test_final_snapshot_reads_again_when_stale() {
        let mut rig = rig();
        stamp(&mut rig, 10.0);
        preview(&mut rig);
        let shown = preview(&mut rig).unwrap();
        stamp(&mut rig, 40.0);

        let dirty = rig.dispatcher.dirty_rect();
        let last = rig.dispatcher.last_submission();
        let committed = rig
            .authority
            .final_snapshot(&mut rig.device, &rig.pair, dirty, last)
            .unwrap();
        assert!(!Arc::ptr_eq(&shown, &committed));
        assert_eq!(committed.generation, 2);
        assert!(committed.pixel(40, 32)[3] > 0.99);
        assert_eq!(rig.authority.readbacks_issued(), 2);
    }

    #[test]
    fn test_final_snapshot_settles_in_flight_readback() {
        let mut rig = rig();
        stamp(&mut rig, 10.0);
        // Starts a readback that is still outstanding at commit time
        assert!(preview(&mut rig).is_none());

        let dirty = rig.dispatcher.dirty_rect();
        let last = rig.dispatcher.last_submission();
        let committed = rig
            .authority
            .final_snapshot(&mut rig.device, &rig.pair, dirty, last)
            .unwrap();
        assert_eq!(committed.generation, 1);
        // The in-flight result was exact, so no second readback
        assert_eq!(rig.authority.readbacks_issued(), 1);
        assert!(!rig.authority.is_busy());
    }

    #[test]
    fn test_empty_stroke_snapshot() {
        let mut rig = rig();
        let snapshot = rig
            .authority
            .final_snapshot(&mut rig.device, &rig.pair, DirtyRect::empty(), None)
            .unwrap();
        assert!(snapshot.pixels.is_empty());
        assert_eq!(rig.authority.readbacks_issued(), 0);
    }
}
