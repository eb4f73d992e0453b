//! Dirty rectangle tracking for stroke regions

use serde::{Deserialize, Serialize};

use crate::types::DabParams;

/// Half-open pixel rectangle `[left, right) x [top, bottom)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirtyRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Default for DirtyRect {
    fn default() -> Self {
        Self::empty()
    }
}

impl DirtyRect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// An inverted rectangle that any union replaces
    pub fn empty() -> Self {
        Self {
            left: i32::MAX,
            top: i32::MAX,
            right: i32::MIN,
            bottom: i32::MIN,
        }
    }

    /// The full `width x height` canvas
    pub fn canvas(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.left >= self.right || self.top >= self.bottom
    }

    #[inline]
    pub fn width(&self) -> u32 {
        if self.is_empty() {
            0
        } else {
            (self.right - self.left) as u32
        }
    }

    #[inline]
    pub fn height(&self) -> u32 {
        if self.is_empty() {
            0
        } else {
            (self.bottom - self.top) as u32
        }
    }

    /// Number of pixels covered
    pub fn area(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }

    /// Bounding box of the pixels a dab can touch
    pub fn from_dab(dab: &DabParams) -> Self {
        let (half_w, half_h) = dab.half_extents();
        Self::new(
            (dab.x - half_w).floor() as i32,
            (dab.y - half_h).floor() as i32,
            ((dab.x + half_w).ceil() as i32).saturating_add(1),
            ((dab.y + half_h).ceil() as i32).saturating_add(1),
        )
    }

    /// Grow to include a dab's footprint
    pub fn expand_by_dab(&mut self, dab: &DabParams) {
        self.union(&Self::from_dab(dab));
    }

    pub fn union(&mut self, other: &DirtyRect) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            *self = *other;
            return;
        }
        self.left = self.left.min(other.left);
        self.top = self.top.min(other.top);
        self.right = self.right.max(other.right);
        self.bottom = self.bottom.max(other.bottom);
    }

    /// Union without mutating either side
    pub fn united(&self, other: &DirtyRect) -> DirtyRect {
        let mut out = *self;
        out.union(other);
        out
    }

    /// Clip to `[0, width) x [0, height)`
    pub fn clamp_to(&mut self, width: u32, height: u32) {
        self.left = self.left.max(0);
        self.top = self.top.max(0);
        self.right = self.right.min(width as i32);
        self.bottom = self.bottom.min(height as i32);
    }

    pub fn clamped(&self, width: u32, height: u32) -> DirtyRect {
        let mut out = *self;
        out.clamp_to(width, height);
        if out.is_empty() {
            DirtyRect::empty()
        } else {
            out
        }
    }
}
