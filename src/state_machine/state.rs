use std::fmt;

use tracing::warn;

use super::job::{JobSnapshot, JobStatus};

/// Lifecycle states of the job held by one orchestrator.
///
/// A job flows through: IDLE → PENDING → RUNNING(k) → {COMPLETE, ERROR, CANCELLED}
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Pending,
    Running { stage: u8 },
    Complete,
    Error { message: String },
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Complete | JobState::Error { .. } | JobState::Cancelled
        )
    }

    /// True while a job handle exists and polling is meaningful.
    pub fn is_active(&self) -> bool {
        matches!(self, JobState::Pending | JobState::Running { .. })
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Idle => write!(f, "IDLE"),
            JobState::Pending => write!(f, "PENDING"),
            JobState::Running { stage } => write!(f, "RUNNING({stage})"),
            JobState::Complete => write!(f, "COMPLETE"),
            JobState::Error { message } => write!(f, "ERROR: {message}"),
            JobState::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// The result of feeding an event into the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Moved into a new state.
    Next(JobState),
    /// State kept; stage results may still have been merged.
    Unchanged,
    /// The report carried a lower stage than already observed.
    Stale { observed: u8, current: u8 },
    /// Idle or terminal: the event was not applied.
    Frozen,
}

/// Holds the current job state and the merged snapshot, and validates
/// every change against the lifecycle rules.
///
/// Stage progress and stage results form a monotone lattice: applying any
/// report, in any order, can only move the stage upwards and only add
/// results, so out-of-order polls never erase progress.
#[derive(Debug, Clone)]
pub struct JobStateMachine {
    state: JobState,
    snapshot: JobSnapshot,
    stage_count: u8,
}

impl JobStateMachine {
    pub fn new(stage_count: u8) -> Self {
        Self {
            state: JobState::Idle,
            snapshot: JobSnapshot::pending(),
            stage_count,
        }
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn snapshot(&self) -> &JobSnapshot {
        &self.snapshot
    }

    pub fn stage_count(&self) -> u8 {
        self.stage_count
    }

    /// `Idle → Pending` after the service accepted a submission.
    pub fn submitted(&mut self) -> Transition {
        if self.state != JobState::Idle {
            return Transition::Frozen;
        }
        self.snapshot = JobSnapshot::pending();
        self.enter(JobState::Pending)
    }

    /// Apply a status report from a poll.
    pub fn apply_poll(&mut self, observed: JobSnapshot) -> Transition {
        if !self.state.is_active() {
            return Transition::Frozen;
        }
        self.merge_results(&observed);

        match observed.status {
            JobStatus::Pending => Transition::Unchanged,
            JobStatus::Running => self.advance(&observed),
            JobStatus::Complete => {
                self.absorb_artifact(&observed);
                self.enter(JobState::Complete)
            }
            JobStatus::Error => {
                let message = observed
                    .error
                    .clone()
                    .unwrap_or_else(|| "Unknown error".to_string());
                self.enter(JobState::Error { message })
            }
            JobStatus::Cancelled => self.enter(JobState::Cancelled),
        }
    }

    /// Force `Cancelled` from any non-terminal state.
    ///
    /// `observed` is the service's post-cancel snapshot, or `None` when the
    /// cancel call failed and the stop is local only.
    pub fn cancelled(&mut self, observed: Option<&JobSnapshot>) -> Transition {
        if !self.state.is_active() {
            return Transition::Frozen;
        }
        if let Some(observed) = observed {
            self.merge_results(observed);
        }
        self.enter(JobState::Cancelled)
    }

    /// Fail-stop after a transport error while polling.
    pub fn failed(&mut self, message: impl Into<String>) -> Transition {
        if !self.state.is_active() {
            return Transition::Frozen;
        }
        self.enter(JobState::Error {
            message: message.into(),
        })
    }

    /// Discard the job and return to `Idle`.
    pub fn reset(&mut self) {
        self.state = JobState::Idle;
        self.snapshot = JobSnapshot::pending();
    }

    fn advance(&mut self, observed: &JobSnapshot) -> Transition {
        let reported = observed.current_stage;
        if reported > self.stage_count {
            warn!(
                stage = reported,
                max = self.stage_count,
                "Ignoring out-of-range stage in status report"
            );
            return Transition::Unchanged;
        }

        match self.state {
            JobState::Running { stage } if reported < stage => Transition::Stale {
                observed: reported,
                current: stage,
            },
            JobState::Running { stage } if reported == stage => {
                self.absorb_label(observed);
                Transition::Unchanged
            }
            _ => {
                self.snapshot.current_stage = reported;
                self.absorb_label(observed);
                self.enter(JobState::Running { stage: reported })
            }
        }
    }

    fn merge_results(&mut self, observed: &JobSnapshot) {
        for (&index, result) in &observed.stage_results {
            if index == 0 || index > self.stage_count {
                warn!(stage = index, "Dropping stage result outside pipeline range");
                continue;
            }
            self.snapshot
                .stage_results
                .entry(index)
                .or_insert_with(|| result.clone());
        }
    }

    fn absorb_label(&mut self, observed: &JobSnapshot) {
        if observed.stage_label.is_some() {
            self.snapshot.stage_label = observed.stage_label.clone();
        }
    }

    fn absorb_artifact(&mut self, observed: &JobSnapshot) {
        self.snapshot.download_ready |= observed.download_ready;
        if observed.artifact_name.is_some() {
            self.snapshot.artifact_name = observed.artifact_name.clone();
        }
        self.absorb_label(observed);
    }

    fn enter(&mut self, next: JobState) -> Transition {
        self.snapshot.status = match &next {
            JobState::Idle | JobState::Pending => JobStatus::Pending,
            JobState::Running { .. } => JobStatus::Running,
            JobState::Complete => JobStatus::Complete,
            JobState::Error { .. } => JobStatus::Error,
            JobState::Cancelled => JobStatus::Cancelled,
        };
        if let JobState::Error { message } = &next {
            self.snapshot.error = Some(message.clone());
        }
        self.state = next.clone();
        Transition::Next(next)
    }
}
