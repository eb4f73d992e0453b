//! CPU surface for the permanent layer and readback snapshots
//!
//! Pixels are premultiplied RGBA f32, gamma-encoded, row-major.

use crate::blend::{BlendMode, Rgba, TRANSPARENT, unpremultiply};
use crate::rect::DirtyRect;

/// A premultiplied RGBA f32 surface
#[derive(Debug, Clone, PartialEq)]
pub struct CpuSurface {
    /// Surface dimensions
    pub width: u32,
    pub height: u32,
    pixels: Vec<Rgba>,
}

impl CpuSurface {
    /// Create a new surface with the given dimensions, initialized to transparent black
    pub fn new(width: u32, height: u32) -> Self {
        let pixel_count = (width as usize) * (height as usize);
        Self {
            width,
            height,
            pixels: vec![TRANSPARENT; pixel_count],
        }
    }

    /// Clear the surface to a solid premultiplied color
    pub fn clear(&mut self, color: Rgba) {
        self.pixels.fill(color);
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some((y as usize) * (self.width as usize) + (x as usize))
    }

    /// Get a pixel; None if out of bounds
    #[inline]
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        self.index(x, y).map(|i| self.pixels[i])
    }

    /// Set a pixel; out-of-bounds writes are ignored
    #[inline]
    pub fn set_pixel(&mut self, x: u32, y: u32, color: Rgba) {
        if let Some(i) = self.index(x, y) {
            self.pixels[i] = color;
        }
    }

    /// Composite a premultiplied color onto a pixel
    #[inline]
    pub fn blend_pixel(&mut self, x: u32, y: u32, src: Rgba, mode: BlendMode) {
        if let Some(i) = self.index(x, y) {
            self.pixels[i] = mode.apply(src, self.pixels[i]);
        }
    }

    /// Copy out a rectangle (clamped to bounds) in row-major order
    pub fn region(&self, rect: &DirtyRect) -> Vec<Rgba> {
        let rect = rect.clamped(self.width, self.height);
        let mut data = Vec::with_capacity(rect.area());
        for y in rect.top..rect.bottom {
            let start = (y as usize) * (self.width as usize) + rect.left as usize;
            let end = start + rect.width() as usize;
            data.extend_from_slice(&self.pixels[start..end]);
        }
        data
    }

    /// Raw pixel bytes (for GPU upload)
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    /// Straight-alpha RGBA8, for image export
    pub fn to_rgba8(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixels.len() * 4);
        for pixel in &self.pixels {
            let straight = unpremultiply(*pixel);
            for channel in straight {
                out.push((channel.clamp(0.0, 1.0) * 255.0 + 0.5) as u8);
            }
        }
        out
    }

    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.pixels.len()
    }

    #[inline]
    pub fn pixels(&self) -> &[Rgba] {
        &self.pixels
    }

    #[inline]
    pub fn pixels_mut(&mut self) -> &mut [Rgba] {
        &mut self.pixels
    }
}
