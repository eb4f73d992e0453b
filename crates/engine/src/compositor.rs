//! Stroke compositing onto the permanent layer
//!
//! [`composite_stroke`] is the only code that writes stroke pixels into a
//! layer. The preview composite calls it on a copy, so what is displayed
//! during the stroke and what is committed at the end are produced by the
//! same arithmetic, including the stroke's blend mode.

use crate::blend::{BlendMode, Rgba, apply_ceiling};
use crate::rect::DirtyRect;
use crate::surface::CpuSurface;
use crate::sync::Snapshot;

/// Composite a stroke snapshot onto `layer` with `mode`, capping the
/// stroke's alpha at `ceiling`. Returns the layer region that was touched.
pub fn composite_stroke(snapshot: &Snapshot, layer: &mut CpuSurface, ceiling: f32, mode: BlendMode) -> DirtyRect {
    let ceiling = ceiling.clamp(0.0, 1.0);
    let rect = snapshot.rect.clamped(layer.width, layer.height);
    if rect.is_empty() {
        return rect;
    }

    for y in rect.top..rect.bottom {
        for x in rect.left..rect.right {
            let stroke = snapshot.pixel(x, y);
            if stroke[3] <= 0.0 {
                continue;
            }
            layer.blend_pixel(x as u32, y as u32, apply_ceiling(stroke, ceiling), mode);
        }
    }
    rect
}

/// Layer with the in-progress stroke composited on top, for display
pub fn preview_composite(snapshot: &Snapshot, layer: &CpuSurface, ceiling: f32, mode: BlendMode) -> CpuSurface {
    let mut out = layer.clone();
    composite_stroke(snapshot, &mut out, ceiling, mode);
    out
}

/// Composited value of a single pixel, without copying the layer
pub fn preview_pixel(
    snapshot: &Snapshot,
    layer: &CpuSurface,
    ceiling: f32,
    mode: BlendMode,
    x: u32,
    y: u32,
) -> Option<Rgba> {
    let base = layer.get_pixel(x, y)?;
    let stroke = snapshot.pixel(x as i32, y as i32);
    if stroke[3] <= 0.0 {
        return Some(base);
    }
    Some(mode.apply(apply_ceiling(stroke, ceiling.clamp(0.0, 1.0)), base))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_with(rect: DirtyRect, color: Rgba) -> Snapshot {
        Snapshot {
            generation: 1,
            rect,
            pixels: vec![color; rect.area()],
        }
    }

    #[test]
    fn test_composite_over_layer() {
        let mut layer = CpuSurface::new(8, 8);
        layer.clear([1.0, 1.0, 1.0, 1.0]);
        let snapshot = snapshot_with(DirtyRect::new(2, 2, 4, 4), [1.0, 0.0, 0.0, 1.0]);

        let touched = composite_stroke(&snapshot, &mut layer, 1.0, BlendMode::Normal);
        assert_eq!(touched, DirtyRect::new(2, 2, 4, 4));
        assert_eq!(layer.get_pixel(2, 2), Some([1.0, 0.0, 0.0, 1.0]));
        assert_eq!(layer.get_pixel(5, 5), Some([1.0, 1.0, 1.0, 1.0]));
    }

    #[test]
    fn test_ceiling_caps_stroke_alpha() {
        let mut layer = CpuSurface::new(4, 4);
        let snapshot = snapshot_with(DirtyRect::new(0, 0, 4, 4), [0.9, 0.0, 0.0, 0.9]);
        composite_stroke(&snapshot, &mut layer, 0.5, BlendMode::Normal);
        let pixel = layer.get_pixel(1, 1).unwrap();
        assert!((pixel[3] - 0.5).abs() < 1e-6);
        assert!((pixel[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_blend_mode_applies_to_layer() {
        let mut layer = CpuSurface::new(4, 4);
        layer.clear([0.5, 0.5, 0.5, 1.0]);
        let snapshot = snapshot_with(DirtyRect::new(0, 0, 2, 4), [0.2, 0.2, 0.2, 1.0]);

        let mut lighter = layer.clone();
        composite_stroke(&snapshot, &mut layer, 1.0, BlendMode::Darken);
        composite_stroke(&snapshot, &mut lighter, 1.0, BlendMode::Lighten);

        let darkened = layer.get_pixel(0, 0).unwrap();
        assert!((darkened[0] - 0.2).abs() < 1e-6);
        assert!((darkened[3] - 1.0).abs() < 1e-6);
        let lightened = lighter.get_pixel(1, 3).unwrap();
        assert!((lightened[0] - 0.5).abs() < 1e-6);
        // Outside the stroke
        assert_eq!(layer.get_pixel(3, 0), Some([0.5, 0.5, 0.5, 1.0]));
    }

    #[test]
    fn test_preview_matches_commit() {
        let mut layer = CpuSurface::new(16, 16);
        layer.clear([0.0, 0.0, 1.0, 0.5]);
        let snapshot = snapshot_with(DirtyRect::new(-4, 3, 9, 12), [0.3, 0.6, 0.0, 0.6]);

        for mode in [BlendMode::Normal, BlendMode::Multiply, BlendMode::Overlay] {
            let mut committed = layer.clone();
            let preview = preview_composite(&snapshot, &layer, 0.8, mode);
            composite_stroke(&snapshot, &mut committed, 0.8, mode);
            assert_eq!(preview, committed);
        }
    }

    #[test]
    fn test_preview_pixel_matches_composite() {
        let mut layer = CpuSurface::new(8, 8);
        layer.clear([0.2, 0.2, 0.2, 1.0]);
        let snapshot = snapshot_with(DirtyRect::new(0, 0, 8, 8), [0.4, 0.0, 0.0, 0.4]);
        let single = preview_pixel(&snapshot, &layer, 0.7, BlendMode::Screen, 3, 3).unwrap();
        composite_stroke(&snapshot, &mut layer, 0.7, BlendMode::Screen);
        assert_eq!(Some(single), layer.get_pixel(3, 3));
    }
}
