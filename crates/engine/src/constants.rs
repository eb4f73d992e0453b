/// Number of dabs in one dispatch batch.
///
/// This is also the length of the workgroup-shared dab array in the stamp
/// kernel (substituted into the WGSL source and used for the software
/// kernel's fixed array). Host batching and device dimensioning both read
/// this one constant.
pub const DAB_BATCH_CAPACITY: usize = 64;

/// Workgroup edge length for the stamp kernel (8x8 pixels per workgroup).
pub const STAMP_WORKGROUP_SIZE: u32 = 8;

/// Smallest dab diameter in pixels.
pub const MIN_DAB_SIZE: f32 = 1.0;

/// Smallest tip radius used for coverage, so a 1px dab always covers the
/// pixel centers around it.
pub const MIN_COVERAGE_RADIUS: f32 = 0.75;

/// Smallest distance between two dabs in pixels, regardless of size.
pub const MIN_DAB_SPACING: f32 = 1.0;

/// Smallest spacing fraction accepted from a brush config.
pub const MIN_SPACING_FRACTION: f32 = 0.01;

/// Smallest interpolation step in pixels.
pub const MIN_INTERPOLATION_STEP: f32 = 0.5;

/// Most points one spline span is subdivided into. Longer spans get
/// coarser steps; the stamper walks straight between path points anyway.
pub const MAX_SPAN_STEPS: usize = 16_384;

/// Default cardinal spline tension, owned by the config crate.
pub use brushwork_config::DEFAULT_SMOOTHING_TENSION;

/// Points closer than `min_distance * JITTER_FACTOR` to the previous
/// accepted point are dropped.
pub const JITTER_FACTOR: f32 = 0.5;

/// Alpha below this is treated as fully transparent.
pub const ALPHA_EPSILON: f32 = 0.001;

/// Bytes per accumulation pixel (RGBA f32).
pub const PIXEL_BYTES: u64 = 16;

// Both kernels size their shared dab storage from DAB_BATCH_CAPACITY; a zero
// capacity would make every flush a no-op.
const _: () = assert!(DAB_BATCH_CAPACITY > 0);
const _: () = assert!(DAB_BATCH_CAPACITY <= 256);
