//! Run-level phase state machine with gated transitions.
//!
//! Enforces the phase order of a pipeline run:
//! Init -> Collecting -> Analyzing -> Curating -> Succeeded
//! Any non-terminal state -> Failed

use serde::{Deserialize, Serialize};

use crate::error::PhaseTransitionError;

/// Phase of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Init,
    Collecting,
    Analyzing,
    Curating,
    Succeeded,
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Collecting => "collecting",
            Self::Analyzing => "analyzing",
            Self::Curating => "curating",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate that a phase transition is allowed.
pub fn validate_transition(
    from: PipelineState,
    to: PipelineState,
) -> Result<(), PhaseTransitionError> {
    use PipelineState::*;
    let valid = matches!(
        (from, to),
        (Init, Collecting)
            | (Collecting, Analyzing)
            | (Analyzing, Curating)
            | (Curating, Succeeded)
    ) || (to == Failed && !from.is_terminal());

    if valid {
        Ok(())
    } else {
        Err(PhaseTransitionError { from, to })
    }
}

/// Gate out of `Collecting`: analysis only runs when the collector succeeded
/// and at least one new item was stored.
pub fn after_collect(collector_ok: bool, stored: usize) -> PipelineState {
    if collector_ok && stored > 0 {
        PipelineState::Analyzing
    } else {
        PipelineState::Failed
    }
}

/// Gate out of `Analyzing`: item-local failures do not stop curation, only a
/// phase-fatal error (the work set could not be loaded) does.
pub fn after_analyze(phase_fatal: bool) -> PipelineState {
    if phase_fatal {
        PipelineState::Failed
    } else {
        PipelineState::Curating
    }
}

/// Gate out of `Curating`: every output of the run must have been delivered.
pub fn after_curate(delivered: bool) -> PipelineState {
    if delivered {
        PipelineState::Succeeded
    } else {
        PipelineState::Failed
    }
}

/// Tracks the current phase of one run.
#[derive(Debug)]
pub struct PhaseMachine {
    state: PipelineState,
}

impl PhaseMachine {
    pub fn new() -> Self {
        Self {
            state: PipelineState::Init,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn advance(&mut self, to: PipelineState) -> Result<(), PhaseTransitionError> {
        validate_transition(self.state, to)?;
        self.state = to;
        Ok(())
    }

    /// Move to `Failed` unless the run already ended.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = PipelineState::Failed;
        }
    }
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self::new()
    }
}
