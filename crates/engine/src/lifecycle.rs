//! Stroke lifecycle state machine
//!
//! ```text
//! Idle --begin--> Starting --surfaces ready--> Active --end--> Finishing --composite--> Idle
//!                    |  ^
//!                    +--+ end (sets pending_end, honored once Active)
//! ```
//!
//! Any failure in Starting, Active or Finishing returns to Idle.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StrokeState {
    #[default]
    Idle,
    /// Surfaces requested; input is queued
    Starting,
    /// Input is stamped as it arrives
    Active,
    /// Flushing and compositing
    Finishing,
}

/// Monotonically increasing per accepted `begin`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StrokeId(pub u64);

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LifecycleError {
    #[error("Cannot {action} while {state:?}")]
    InvalidTransition {
        action: &'static str,
        state: StrokeState,
    },
}

/// Outcome of an end request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndRequest {
    /// No stroke in progress
    Ignored,
    /// Surfaces not ready yet; the end is remembered
    Deferred,
    /// Moved to Finishing; the caller runs the commit now
    Finish,
}

#[derive(Debug, Clone, Default)]
pub struct StrokeLifecycle {
    state: StrokeState,
    current: Option<StrokeId>,
    next_id: u64,
    pending_end: bool,
}

impl StrokeLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn state(&self) -> StrokeState {
        self.state
    }

    /// Id of the stroke in progress
    pub fn stroke_id(&self) -> Option<StrokeId> {
        self.current
    }

    pub fn pending_end(&self) -> bool {
        self.pending_end
    }

    pub fn is_idle(&self) -> bool {
        self.state == StrokeState::Idle
    }

    fn invalid(&self, action: &'static str) -> LifecycleError {
        LifecycleError::InvalidTransition {
            action,
            state: self.state,
        }
    }

    /// Idle -> Starting
    pub fn begin(&mut self) -> Result<StrokeId, LifecycleError> {
        if self.state != StrokeState::Idle {
            return Err(self.invalid("begin"));
        }
        self.next_id += 1;
        let id = StrokeId(self.next_id);
        self.current = Some(id);
        self.pending_end = false;
        self.state = StrokeState::Starting;
        Ok(id)
    }

    /// Starting -> Active; returns whether an end arrived while starting
    pub fn surfaces_ready(&mut self) -> Result<bool, LifecycleError> {
        if self.state != StrokeState::Starting {
            return Err(self.invalid("activate"));
        }
        self.state = StrokeState::Active;
        Ok(self.pending_end)
    }

    /// Handle an end request in any state
    pub fn request_end(&mut self) -> EndRequest {
        match self.state {
            StrokeState::Idle | StrokeState::Finishing => EndRequest::Ignored,
            StrokeState::Starting => {
                self.pending_end = true;
                EndRequest::Deferred
            }
            StrokeState::Active => {
                self.state = StrokeState::Finishing;
                EndRequest::Finish
            }
        }
    }

    /// Active -> Finishing, for a deferred end
    pub fn begin_finishing(&mut self) -> Result<(), LifecycleError> {
        if self.state != StrokeState::Active {
            return Err(self.invalid("finish"));
        }
        self.state = StrokeState::Finishing;
        Ok(())
    }

    /// Finishing -> Idle
    pub fn complete(&mut self) -> Result<StrokeId, LifecycleError> {
        if self.state != StrokeState::Finishing {
            return Err(self.invalid("complete"));
        }
        let id = self.current.take().ok_or_else(|| self.invalid("complete"))?;
        self.state = StrokeState::Idle;
        self.pending_end = false;
        Ok(id)
    }

    /// Any state -> Idle, for errors and aborts. Returns the dropped stroke.
    pub fn reset(&mut self) -> Option<StrokeId> {
        self.state = StrokeState::Idle;
        self.pending_end = false;
        self.current.take()
    }
}
