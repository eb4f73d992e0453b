//! Ping-pong accumulation surfaces for one stroke

use crate::gpu::{DabDevice, SurfaceId};

/// Two equally sized device surfaces with swapping roles.
///
/// Each dispatch reads the surface holding the latest result and writes
/// the other one; the roles swap once the dispatch is submitted. A
/// dispatch therefore never reads and writes the same surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccumulationPair {
    surfaces: [SurfaceId; 2],
    /// Index of the surface holding the latest result
    latest: usize,
    /// Dispatches submitted into this pair
    generation: u64,
    width: u32,
    height: u32,
}

impl AccumulationPair {
    pub fn new(surfaces: [SurfaceId; 2], width: u32, height: u32) -> Self {
        Self {
            surfaces,
            latest: 0,
            generation: 0,
            width,
            height,
        }
    }

    /// Surface the next dispatch reads (holds the latest result)
    #[inline]
    pub fn read_surface(&self) -> SurfaceId {
        self.surfaces[self.latest]
    }

    /// Surface the next dispatch writes
    #[inline]
    pub fn write_surface(&self) -> SurfaceId {
        self.surfaces[1 - self.latest]
    }

    /// Record a submitted dispatch: the written surface becomes the latest
    pub fn swap(&mut self) {
        self.latest = 1 - self.latest;
        self.generation += 1;
    }

    /// Number of dispatches the latest surface reflects
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn surfaces(&self) -> [SurfaceId; 2] {
        self.surfaces
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Return both surfaces to the device
    pub fn release<D: DabDevice + ?Sized>(self, device: &mut D) {
        for id in self.surfaces {
            device.release(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_alternate() {
        let mut pair = AccumulationPair::new([SurfaceId(1), SurfaceId(2)], 16, 16);
        assert_eq!(pair.read_surface(), SurfaceId(1));
        assert_eq!(pair.write_surface(), SurfaceId(2));

        pair.swap();
        assert_eq!(pair.read_surface(), SurfaceId(2));
        assert_eq!(pair.write_surface(), SurfaceId(1));
        assert_eq!(pair.generation(), 1);

        for _ in 0..5 {
            assert_ne!(pair.read_surface(), pair.write_surface());
            pair.swap();
        }
        assert_eq!(pair.generation(), 6);
    }
}
