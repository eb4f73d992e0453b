use crate::brush::BrushConfig;
use crate::constants::{DAB_BATCH_CAPACITY, MIN_DAB_SIZE};
use crate::types::{DabParams, PointerSample};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid brush size: {0}")]
    InvalidSize(f32),
    #[error("Invalid {field}: {value} (expected 0.0-1.0)")]
    OutOfUnitRange { field: &'static str, value: f32 },
    #[error("Invalid spacing: {0}")]
    InvalidSpacing(f32),
    #[error("Non-finite dab position: ({x}, {y})")]
    NonFinitePosition { x: f32, y: f32 },
    #[error("Batch of {len} dabs exceeds capacity {}", DAB_BATCH_CAPACITY)]
    BatchTooLarge { len: usize },
}

fn unit_range(field: &'static str, value: f32) -> Result<(), ValidationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::OutOfUnitRange { field, value })
    }
}

/// Validate a brush configuration before it is used for a stroke
pub fn validate_brush_config(config: &BrushConfig) -> Result<(), ValidationError> {
    if !config.size.is_finite() || config.size <= 0.0 {
        return Err(ValidationError::InvalidSize(config.size));
    }
    if !config.spacing.is_finite() || config.spacing < 0.0 {
        return Err(ValidationError::InvalidSpacing(config.spacing));
    }
    unit_range("flow", config.flow)?;
    unit_range("opacity", config.opacity)?;
    unit_range("hardness", config.hardness)?;
    unit_range("roundness", config.roundness)?;
    unit_range("min_size_ratio", config.min_size_ratio)?;
    unit_range("min_alpha_ratio", config.min_alpha_ratio)?;
    for channel in config.color {
        unit_range("color", channel)?;
    }
    Ok(())
}

/// Validate a pointer sample before it enters the stroke path.
///
/// Out-of-range pressure and tilt are clamped later; only values that
/// cannot be clamped are rejected.
pub fn validate_sample(sample: &PointerSample) -> Result<(), ValidationError> {
    if !sample.x.is_finite() || !sample.y.is_finite() {
        return Err(ValidationError::NonFinitePosition {
            x: sample.x,
            y: sample.y,
        });
    }
    if sample.pressure.is_nan() {
        return Err(ValidationError::OutOfUnitRange {
            field: "pressure",
            value: sample.pressure,
        });
    }
    Ok(())
}

/// Validate a dab's parameters
pub fn validate_dab(dab: &DabParams) -> Result<(), ValidationError> {
    if !dab.x.is_finite() || !dab.y.is_finite() {
        return Err(ValidationError::NonFinitePosition { x: dab.x, y: dab.y });
    }
    // Size must never drop below one pixel
    if !(dab.size >= MIN_DAB_SIZE) {
        return Err(ValidationError::InvalidSize(dab.size));
    }
    unit_range("flow", dab.flow)?;
    unit_range("opacity", dab.opacity)?;
    Ok(())
}

/// Validate a batch before it is handed to a device
pub fn validate_batch(batch: &[DabParams]) -> Result<(), ValidationError> {
    if batch.len() > DAB_BATCH_CAPACITY {
        return Err(ValidationError::BatchTooLarge { len: batch.len() });
    }
    batch.iter().try_for_each(validate_dab)
}
