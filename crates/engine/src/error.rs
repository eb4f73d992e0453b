use thiserror::Error;

use crate::gpu::DeviceError;
use crate::lifecycle::LifecycleError;
use crate::validation::ValidationError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("Batch capacity {host} does not match kernel capacity {kernel}")]
    CapacityMismatch { host: usize, kernel: usize },
    #[error("Layer is {layer_width}x{layer_height}, canvas is {canvas_width}x{canvas_height}")]
    LayerSizeMismatch {
        layer_width: u32,
        layer_height: u32,
        canvas_width: u32,
        canvas_height: u32,
    },
    #[error("Layer lock poisoned")]
    LayerPoisoned,
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}
