//! Per-pixel dab compositing
//!
//! All arithmetic runs on gamma-encoded channel values with premultiplied
//! alpha, never converting to linear light. `stamp.wgsl` mirrors these
//! functions operation for operation; the software kernel calls them
//! directly.
//!
//! Dabs always accumulate with "over". [`BlendMode`] only applies when the
//! finished stroke is composited onto the layer.

use serde::{Deserialize, Serialize};

use crate::constants::ALPHA_EPSILON;
use crate::types::{DabParams, MaskShape};

/// Premultiplied RGBA pixel
pub type Rgba = [f32; 4];

pub const TRANSPARENT: Rgba = [0.0, 0.0, 0.0, 0.0];

/// Falloff for a normalized distance (0 at center, 1 at edge).
///
/// Full strength inside `hardness`, then a linear fade to zero at the edge.
#[inline]
pub fn calculate_hardness_falloff(distance_normalized: f32, hardness: f32) -> f32 {
    if distance_normalized > 1.0 {
        return 0.0;
    }
    let hardness = hardness.clamp(0.0, 1.0);
    if distance_normalized <= hardness {
        return 1.0;
    }
    let fade = 1.0 - hardness;
    if fade <= ALPHA_EPSILON {
        return 1.0;
    }
    1.0 - (distance_normalized - hardness) / fade
}

/// Normalized tip distance of the pixel center `(px, py)` from the dab
#[inline]
pub fn mask_distance(dab: &DabParams, px: u32, py: u32) -> f32 {
    let (radius_major, radius_minor) = dab.axes();
    let (sin_a, cos_a) = dab.angle.sin_cos();

    let dx = (px as f32 + 0.5) - dab.x;
    let dy = (py as f32 + 0.5) - dab.y;

    // Rotate into the tip frame
    let rotated_x = dx * cos_a + dy * sin_a;
    let rotated_y = -dx * sin_a + dy * cos_a;

    let nx = rotated_x / radius_major;
    let ny = rotated_y / radius_minor;

    match dab.mask() {
        MaskShape::Round => (nx * nx + ny * ny).sqrt(),
        MaskShape::Square => nx.abs().max(ny.abs()),
    }
}

/// Tip coverage (0.0-1.0) of one pixel
#[inline]
pub fn dab_coverage(dab: &DabParams, px: u32, py: u32) -> f32 {
    calculate_hardness_falloff(mask_distance(dab, px, py), dab.hardness)
}

/// Premultiplied source color of a dab at a given coverage
#[inline]
pub fn dab_source(dab: &DabParams, coverage: f32) -> Rgba {
    let alpha = dab.color[3] * dab.flow * dab.opacity * coverage;
    [
        dab.color[0] * alpha,
        dab.color[1] * alpha,
        dab.color[2] * alpha,
        alpha,
    ]
}

/// Porter-Duff "over" for premultiplied pixels: `src + dst * (1 - src.a)`
#[inline]
pub fn blend_over(src: Rgba, dst: Rgba) -> Rgba {
    let inv_src_a = 1.0 - src[3];
    [
        src[0] + dst[0] * inv_src_a,
        src[1] + dst[1] * inv_src_a,
        src[2] + dst[2] * inv_src_a,
        src[3] + dst[3] * inv_src_a,
    ]
}

/// How a stroke combines with the layer beneath it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    /// Porter-Duff over
    #[default]
    Normal,
    /// `s * d`, darkens
    Multiply,
    /// `1 - (1 - s) * (1 - d)`, lightens
    Screen,
    /// Multiply below mid-grey, screen above
    Overlay,
    /// `min(s, d)`
    Darken,
    /// `max(s, d)`
    Lighten,
}

impl BlendMode {
    /// Composite a premultiplied stroke pixel onto a premultiplied layer pixel
    #[inline]
    pub fn apply(self, src: Rgba, dst: Rgba) -> Rgba {
        let mix: fn(f32, f32) -> f32 = match self {
            BlendMode::Normal => return blend_over(src, dst),
            BlendMode::Multiply => |s, d| s * d,
            BlendMode::Screen => |s, d| 1.0 - (1.0 - s) * (1.0 - d),
            BlendMode::Overlay => |s, d| {
                if d < 0.5 {
                    2.0 * s * d
                } else {
                    1.0 - 2.0 * (1.0 - s) * (1.0 - d)
                }
            },
            BlendMode::Darken => f32::min,
            BlendMode::Lighten => f32::max,
        };
        blend_separable(src, dst, mix)
    }
}

/// Separable blend on straight colors, faded in by the source alpha and
/// re-premultiplied with the "over" alpha
#[inline]
fn blend_separable(src: Rgba, dst: Rgba, mix: fn(f32, f32) -> f32) -> Rgba {
    if src[3] < ALPHA_EPSILON {
        return dst;
    }
    if dst[3] < ALPHA_EPSILON {
        return src;
    }
    let s = unpremultiply(src);
    let d = unpremultiply(dst);
    let out_a = src[3] + dst[3] * (1.0 - src[3]);

    let mut out = [0.0, 0.0, 0.0, out_a];
    for c in 0..3 {
        let blended = mix(s[c], d[c]);
        out[c] = (d[c] + (blended - d[c]) * src[3]) * out_a;
    }
    out
}

/// Apply a batch of dabs, in order, to one pixel
#[inline]
pub fn stamp_pixel(dst: Rgba, dabs: &[DabParams], px: u32, py: u32) -> Rgba {
    let mut out = dst;
    for dab in dabs {
        let coverage = dab_coverage(dab, px, py);
        if coverage <= 0.0 {
            continue;
        }
        let src = dab_source(dab, coverage);
        if src[3] < ALPHA_EPSILON {
            continue;
        }
        out = blend_over(src, out);
    }
    out
}

/// Cap a premultiplied pixel's alpha at `ceiling`, rescaling color
#[inline]
pub fn apply_ceiling(pixel: Rgba, ceiling: f32) -> Rgba {
    if pixel[3] <= ceiling {
        return pixel;
    }
    if pixel[3] < ALPHA_EPSILON {
        return TRANSPARENT;
    }
    let scale = ceiling / pixel[3];
    [pixel[0] * scale, pixel[1] * scale, pixel[2] * scale, ceiling]
}

/// Straight-alpha to premultiplied
#[inline]
pub fn premultiply(straight: Rgba) -> Rgba {
    let a = straight[3];
    [straight[0] * a, straight[1] * a, straight[2] * a, a]
}

/// Premultiplied to straight-alpha
#[inline]
pub fn unpremultiply(pixel: Rgba) -> Rgba {
    if pixel[3] < ALPHA_EPSILON {
        return TRANSPARENT;
    }
    let inv_a = 1.0 / pixel[3];
    [pixel[0] * inv_a, pixel[1] * inv_a, pixel[2] * inv_a, pixel[3]]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 0.01
    }

    #[test]
    fn test_hardness_falloff() {
        // Hard brush
        assert_eq!(calculate_hardness_falloff(0.0, 1.0), 1.0);
        assert_eq!(calculate_hardness_falloff(1.0, 1.0), 1.0);
        assert_eq!(calculate_hardness_falloff(1.01, 1.0), 0.0);

        // Soft brush
        assert_eq!(calculate_hardness_falloff(0.0, 0.0), 1.0);
        assert!(approx_eq(calculate_hardness_falloff(0.5, 0.0), 0.5));
        assert_eq!(calculate_hardness_falloff(1.0, 0.0), 0.0);

        // Medium brush
        assert_eq!(calculate_hardness_falloff(0.4, 0.5), 1.0);
        assert!(approx_eq(calculate_hardness_falloff(0.75, 0.5), 0.5));
    }

    #[test]
    fn test_blend_over_opaque() {
        let src = [1.0, 0.0, 0.0, 1.0];
        let dst = [0.0, 1.0, 0.0, 1.0];
        assert_eq!(blend_over(src, dst), [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_blend_over_transparent_source() {
        let dst = [0.0, 1.0, 0.0, 1.0];
        assert_eq!(blend_over(TRANSPARENT, dst), dst);
    }

    #[test]
    fn test_flow_accumulates() {
        let dab = DabParams {
            x: 10.0,
            y: 10.0,
            size: 10.0,
            flow: 0.2,
            color: [1.0, 1.0, 1.0, 1.0],
            ..Default::default()
        };
        let batch = [dab; 5];
        let pixel = stamp_pixel(TRANSPARENT, &batch, 10, 10);
        assert!(pixel[3] > 0.5);
        assert!(pixel[3] < 1.0);
    }

    #[test]
    fn test_square_mask_covers_corners() {
        let dab = DabParams {
            x: 10.0,
            y: 10.0,
            size: 10.0,
            mask_shape: MaskShape::Square.as_u32(),
            ..Default::default()
        };
        // (14.5, 14.5) is outside the circle of radius 5 but inside the square
        assert!(dab_coverage(&dab, 14, 14) > 0.0);
        let round = DabParams {
            mask_shape: MaskShape::Round.as_u32(),
            ..dab
        };
        assert_eq!(dab_coverage(&round, 14, 14), 0.0);
    }

    #[test]
    fn test_elliptical_coverage() {
        let dab = DabParams {
            x: 128.0,
            y: 128.0,
            size: 40.0,
            roundness: 0.5,
            ..Default::default()
        };
        // Along the major axis
        assert_eq!(dab_coverage(&dab, 145, 127), 1.0);
        // Beyond the minor axis
        assert_eq!(dab_coverage(&dab, 127, 140), 0.0);
    }

    #[test]
    fn test_apply_ceiling() {
        let pixel = [0.8, 0.0, 0.0, 0.8];
        let capped = apply_ceiling(pixel, 0.5);
        assert!(approx_eq(capped[3], 0.5));
        assert!(approx_eq(capped[0], 0.5));
        assert_eq!(apply_ceiling(pixel, 1.0), pixel);
    }

    #[test]
    fn test_premultiply_roundtrip() {
        let straight = [0.5, 0.25, 1.0, 0.5];
        let back = unpremultiply(premultiply(straight));
        for (a, b) in straight.iter().zip(back.iter()) {
            assert!(approx_eq(*a, *b));
        }
    }

    #[test]
    fn test_blend_modes_on_opaque_pixels() {
        let src = [0.8, 0.2, 0.5, 1.0];
        let dst = [0.4, 0.6, 0.5, 1.0];
        let expect = |mode: BlendMode, rgb: [f32; 3]| {
            let out = mode.apply(src, dst);
            for c in 0..3 {
                assert!(approx_eq(out[c], rgb[c]), "{:?} channel {}: {}", mode, c, out[c]);
            }
            assert!(approx_eq(out[3], 1.0));
        };

        expect(BlendMode::Normal, [0.8, 0.2, 0.5]);
        expect(BlendMode::Multiply, [0.32, 0.12, 0.25]);
        expect(BlendMode::Screen, [0.88, 0.68, 0.75]);
        // d < 0.5 multiplies, d >= 0.5 screens
        expect(BlendMode::Overlay, [0.64, 0.36, 0.5]);
        expect(BlendMode::Darken, [0.4, 0.2, 0.5]);
        expect(BlendMode::Lighten, [0.8, 0.6, 0.5]);
    }

    #[test]
    fn test_blend_mode_identities() {
        let red = [1.0, 0.0, 0.0, 1.0];
        // White multiplied by any color is that color
        assert_eq!(BlendMode::Multiply.apply([1.0, 1.0, 1.0, 1.0], red), red);
        // Black screened over any color is that color
        assert_eq!(BlendMode::Screen.apply([0.0, 0.0, 0.0, 1.0], red), red);
    }

    #[test]
    fn test_blend_mode_alpha_edges() {
        let dst = [0.2, 0.4, 0.6, 1.0];
        let src = [0.3, 0.3, 0.3, 0.5];
        for mode in [
            BlendMode::Normal,
            BlendMode::Multiply,
            BlendMode::Screen,
            BlendMode::Overlay,
            BlendMode::Darken,
            BlendMode::Lighten,
        ] {
            // Transparent source leaves the layer alone
            assert_eq!(mode.apply(TRANSPARENT, dst), dst);
            // Nothing underneath: the stroke shows as is
            assert_eq!(mode.apply(src, TRANSPARENT), src);
            // Alpha always composites with "over"
            assert!(approx_eq(mode.apply(src, [0.1, 0.1, 0.1, 0.5])[3], 0.75));
        }
    }

    #[test]
    fn test_blend_mode_half_alpha_fades_in() {
        // Half-covered white multiply over grey lands halfway
        let out = BlendMode::Multiply.apply([0.5, 0.5, 0.5, 0.5], [0.5, 0.5, 0.5, 1.0]);
        assert!(approx_eq(out[0], 0.5));
        let out = BlendMode::Multiply.apply([0.0, 0.0, 0.0, 0.5], [0.5, 0.5, 0.5, 1.0]);
        assert!(approx_eq(out[0], 0.25));
    }

    #[test]
    fn test_blend_mode_serde_names() {
        assert_eq!(serde_json::to_string(&BlendMode::Overlay).unwrap(), "\"overlay\"");
        let mode: BlendMode = serde_json::from_str("\"lighten\"").unwrap();
        assert_eq!(mode, BlendMode::Lighten);
    }

    #[test]
    fn test_minimum_size_dab_is_visible() {
        let dab = DabParams {
            x: 30.0,
            y: 30.0,
            size: 1.0,
            ..Default::default()
        };
        assert!(dab_coverage(&dab, 30, 30) > 0.0);
        assert!(dab_coverage(&dab, 29, 29) > 0.0);
    }
}
