//! Run State Machine
//!
//! Tracks the progress of a single installer run and enforces valid
//! transitions between stages.
//!
//! # Stage Flow
//!
//! ```text
//! Collecting
//!     ↓
//! Confirming
//!     ↓
//! Rendering
//!     ↓
//! Installing
//!     ↓
//! CleaningUp ──→ Done
//!     └────────→ Failed
//!
//! (Any active stage can jump to CleaningUp on failure or cancellation)
//! ```
//!
//! A failed run always passes through `CleaningUp` before reaching `Failed`.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Run stages in sequential order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RunStage {
    /// Resolving values from flags, environment and prompts
    Collecting = 0,

    /// Summary shown, waiting for confirmation
    Confirming = 1,

    /// Writing the values file
    Rendering = 2,

    /// Running helm
    Installing = 3,

    /// Removing the values file
    CleaningUp = 4,

    /// Run finished successfully or was declined (terminal state)
    Done = 5,

    /// Run failed (terminal state)
    Failed = 255,
}

impl RunStage {
    /// Returns the numeric order of this stage
    #[inline]
    pub const fn order(self) -> u8 {
        self as u8
    }

    /// Returns true if this is a terminal state (Done or Failed)
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if the stage may create or modify state outside the process
    #[inline]
    pub const fn is_mutating(self) -> bool {
        matches!(self, Self::Rendering | Self::Installing)
    }

    /// Next stage on the success path, or None from CleaningUp and terminal states
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Collecting => Some(Self::Confirming),
            Self::Confirming => Some(Self::Rendering),
            Self::Rendering => Some(Self::Installing),
            Self::Installing => Some(Self::CleaningUp),
            Self::CleaningUp | Self::Done | Self::Failed => None,
        }
    }

    /// Returns a human-readable description of this stage
    pub const fn description(self) -> &'static str {
        match self {
            Self::Collecting => "Collecting configuration",
            Self::Confirming => "Awaiting confirmation",
            Self::Rendering => "Rendering values file",
            Self::Installing => "Installing chart",
            Self::CleaningUp => "Cleaning up",
            Self::Done => "Done",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur during state transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunTransitionError {
    /// Attempted to skip one or more stages
    #[error("Cannot skip from {from} to {to}")]
    SkippedStage { from: RunStage, to: RunStage },

    /// Attempted to go backwards (not allowed)
    #[error("Cannot go backwards from {from} to {to}")]
    BackwardTransition { from: RunStage, to: RunStage },

    /// Attempted to transition from a terminal state
    #[error("Cannot transition from terminal state {from}")]
    FromTerminalState { from: RunStage },

    /// Entering a mutating stage without confirmation
    #[error("Stage {stage} requires confirmation")]
    MissingConfirmation { stage: RunStage },

    /// finish() called before CleaningUp
    #[error("Cannot finish from {from}; cleanup has not run")]
    CleanupSkipped { from: RunStage },
}

/// Owns the current stage of a run.
///
/// # Example
///
/// ```
/// use k8smon::run_state::{RunContext, RunStage};
///
/// let mut ctx = RunContext::new();
/// assert_eq!(ctx.current_stage(), RunStage::Collecting);
///
/// ctx.advance().unwrap();
/// assert_eq!(ctx.current_stage(), RunStage::Confirming);
///
/// // Cannot render before confirmation
/// assert!(ctx.advance().is_err());
/// ```
#[derive(Debug, Clone)]
pub struct RunContext {
    current: RunStage,
    /// Stage that was active when the run failed
    failed_at: Option<RunStage>,
    /// Entered stages with unix timestamps
    stage_history: Vec<(RunStage, u64)>,
    confirmed: bool,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    /// Create a context in the Collecting stage.
    pub fn new() -> Self {
        let mut ctx = Self {
            current: RunStage::Collecting,
            failed_at: None,
            stage_history: Vec::with_capacity(6),
            confirmed: false,
        };
        ctx.record(RunStage::Collecting);
        ctx
    }

    #[inline]
    pub fn current_stage(&self) -> RunStage {
        self.current
    }

    #[inline]
    pub fn failed_at(&self) -> Option<RunStage> {
        self.failed_at
    }

    #[inline]
    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    pub fn stage_history(&self) -> &[(RunStage, u64)] {
        &self.stage_history
    }

    /// Record that the operator (or non-interactive mode) approved mutation.
    pub fn confirm(&mut self) {
        self.confirmed = true;
    }

    /// Advance to the next stage on the success path.
    ///
    /// # Errors
    ///
    /// - `FromTerminalState` from Done or Failed
    /// - `SkippedStage` from CleaningUp (use `finish`)
    /// - `MissingConfirmation` when entering Rendering unconfirmed
    pub fn advance(&mut self) -> Result<RunStage, RunTransitionError> {
        if self.current.is_terminal() {
            return Err(RunTransitionError::FromTerminalState { from: self.current });
        }
        let Some(next) = self.current.next() else {
            return Err(RunTransitionError::SkippedStage {
                from: self.current,
                to: RunStage::Done,
            });
        };
        if next.is_mutating() && !self.confirmed {
            return Err(RunTransitionError::MissingConfirmation { stage: next });
        }
        self.enter(next);
        Ok(next)
    }

    /// Transition to `target`, which must be the next stage.
    pub fn transition_to(&mut self, target: RunStage) -> Result<(), RunTransitionError> {
        if self.current.is_terminal() {
            return Err(RunTransitionError::FromTerminalState { from: self.current });
        }
        if target.order() < self.current.order() {
            return Err(RunTransitionError::BackwardTransition {
                from: self.current,
                to: target,
            });
        }
        if self.current.next() != Some(target) {
            return Err(RunTransitionError::SkippedStage {
                from: self.current,
                to: target,
            });
        }
        self.advance().map(|_| ())
    }

    /// Abort the active stage and move to CleaningUp, remembering the failure.
    ///
    /// Idempotent once CleaningUp is reached.
    pub fn fail(&mut self) {
        if self.current.is_terminal() {
            return;
        }
        if self.current != RunStage::CleaningUp {
            tracing::warn!("Run failed during: {}", self.current);
            self.failed_at = Some(self.current);
            self.enter(RunStage::CleaningUp);
        } else if self.failed_at.is_none() {
            self.failed_at = Some(RunStage::CleaningUp);
        }
    }

    /// Stop early without failure (operator declined) and move to CleaningUp.
    pub fn cancel(&mut self) {
        if !self.current.is_terminal() && self.current != RunStage::CleaningUp {
            self.enter(RunStage::CleaningUp);
        }
    }

    /// Leave CleaningUp for Done or Failed.
    pub fn finish(&mut self) -> Result<RunStage, RunTransitionError> {
        if self.current != RunStage::CleaningUp {
            return Err(RunTransitionError::CleanupSkipped { from: self.current });
        }
        let terminal = if self.failed_at.is_some() {
            RunStage::Failed
        } else {
            RunStage::Done
        };
        self.enter(terminal);
        Ok(terminal)
    }

    fn enter(&mut self, stage: RunStage) {
        tracing::debug!("Stage: {} -> {}", self.current, stage);
        self.current = stage;
        self.record(stage);
    }

    fn record(&mut self, stage: RunStage) {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.stage_history.push((stage, ts));
    }
}
