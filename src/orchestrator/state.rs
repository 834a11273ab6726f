//! Build State Management and Phase Tracking
//!
//! `Idle → Cleaning (optional) → Preparing → Invoking → {Succeeded | Failed}`.
//! Every non-terminal phase may fail. Terminal phases have no successors: a
//! failed build is reported, and the caller decides whether to invoke again.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::error::BuildError;

/// Discrete states of one build attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildPhaseState {
    Idle,
    /// Removing build and distribution output
    Cleaning,
    /// Creating output directories
    Preparing,
    /// Toolchain subprocess running
    Invoking,
    Succeeded,
    Failed,
}

impl BuildPhaseState {
    /// Get the human-readable name for this phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildPhaseState::Idle => "idle",
            BuildPhaseState::Cleaning => "cleaning",
            BuildPhaseState::Preparing => "preparing",
            BuildPhaseState::Invoking => "invoking",
            BuildPhaseState::Succeeded => "succeeded",
            BuildPhaseState::Failed => "failed",
        }
    }

    /// Get all valid phase transitions FROM this phase.
    pub fn valid_next_phases(&self) -> &'static [BuildPhaseState] {
        match self {
            BuildPhaseState::Idle => &[
                BuildPhaseState::Cleaning,
                BuildPhaseState::Preparing,
                BuildPhaseState::Failed,
            ],
            BuildPhaseState::Cleaning => &[BuildPhaseState::Preparing, BuildPhaseState::Failed],
            BuildPhaseState::Preparing => &[BuildPhaseState::Invoking, BuildPhaseState::Failed],
            BuildPhaseState::Invoking => &[BuildPhaseState::Succeeded, BuildPhaseState::Failed],
            BuildPhaseState::Succeeded | BuildPhaseState::Failed => &[],
        }
    }

    pub fn can_transition_to(&self, next: BuildPhaseState) -> bool {
        self.valid_next_phases().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildPhaseState::Succeeded | BuildPhaseState::Failed)
    }
}

/// Tracks the phase and timing of one build attempt.
#[derive(Debug, Clone)]
pub struct BuildAttempt {
    phase: BuildPhaseState,
    started: Instant,
    error: Option<String>,
}

impl BuildAttempt {
    pub fn start() -> Self {
        BuildAttempt {
            phase: BuildPhaseState::Idle,
            started: Instant::now(),
            error: None,
        }
    }

    pub fn phase(&self) -> BuildPhaseState {
        self.phase
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Attempt to transition to the next phase.
    pub fn transition_to(&mut self, next: BuildPhaseState) -> Result<(), BuildError> {
        if !self.phase.can_transition_to(next) {
            return Err(BuildError::InvalidTransition(format!(
                "{} -> {}",
                self.phase.as_str(),
                next.as_str()
            )));
        }
        self.phase = next;
        Ok(())
    }

    /// Record an error and mark the attempt as failed.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.phase = BuildPhaseState::Failed;
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
