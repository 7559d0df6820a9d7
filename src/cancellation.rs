//! Arbitration between a user cancel and the polling loop.
//!
//! The controller is pure bookkeeping: it decides whether a cancel request
//! must hit the transport, and it applies the transport's answer to the
//! state machine. Once a cancel is requested every poll result is discarded,
//! so no later poll can override the move to `Cancelled`.

use tracing::warn;

use crate::state_machine::{JobSnapshot, JobStateMachine, Transition};
use crate::transport::TransportError;

/// How a cancel ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelResolution {
    /// The service acknowledged the cancel.
    Confirmed,
    /// The cancel call failed. The job is stopped locally and reported
    /// inactive, but the service may still be running it.
    LocalOnly { reason: String },
}

/// What the caller must do after [`CancellationController::request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelDecision {
    /// Call the transport now.
    Dispatch,
    /// Submission is still pending; the handle is cancelled when it arrives.
    Deferred,
    /// A cancel is already outstanding or has finished.
    AlreadyRequested,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum Phase {
    #[default]
    Idle,
    Deferred,
    InFlight,
    Resolved(CancelResolution),
}

#[derive(Debug, Default)]
pub struct CancellationController {
    phase: Phase,
}

impl CancellationController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a cancel request. `handle_known` is false while `start` is
    /// still outstanding.
    pub fn request(&mut self, handle_known: bool) -> CancelDecision {
        if self.phase != Phase::Idle {
            return CancelDecision::AlreadyRequested;
        }
        if handle_known {
            self.phase = Phase::InFlight;
            CancelDecision::Dispatch
        } else {
            self.phase = Phase::Deferred;
            CancelDecision::Deferred
        }
    }

    /// True from the moment a cancel is requested; poll results must be dropped.
    pub fn is_requested(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// A submission resolved with a fresh handle. Returns true when a
    /// deferred cancel must now be dispatched instead of starting to poll.
    pub fn handle_arrived(&mut self) -> bool {
        if self.phase == Phase::Deferred {
            self.phase = Phase::InFlight;
            true
        } else {
            false
        }
    }

    /// Apply the transport's answer to a cancel call and force `Cancelled`.
    ///
    /// A failed cancel call still stops the job locally.
    pub fn resolve(
        &mut self,
        machine: &mut JobStateMachine,
        outcome: Result<JobSnapshot, TransportError>,
    ) -> (CancelResolution, Transition) {
        let (resolution, transition) = match outcome {
            Ok(snapshot) => (CancelResolution::Confirmed, machine.cancelled(Some(&snapshot))),
            Err(err) => {
                warn!(error = %err, "Cancel call failed; stopping locally, service state unconfirmed");
                (
                    CancelResolution::LocalOnly {
                        reason: err.to_string(),
                    },
                    machine.cancelled(None),
                )
            }
        };
        self.phase = Phase::Resolved(resolution.clone());
        (resolution, transition)
    }

    pub fn resolution(&self) -> Option<&CancelResolution> {
        match &self.phase {
            Phase::Resolved(resolution) => Some(resolution),
            _ => None,
        }
    }

    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
    }
}
