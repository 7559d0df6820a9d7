use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of agent stages in the reference valuation pipeline.
pub const DEFAULT_STAGE_COUNT: u8 = 4;

/// Display names of the reference pipeline stages, indexed from stage 1.
pub const STAGE_NAMES: [&str; DEFAULT_STAGE_COUNT as usize] = [
    "Company Existence Validation",
    "DCF Input Data Collection",
    "DCF Calculation",
    "Validation & Realism Audit",
];

/// Name of a reference stage, if `index` is within `1..=4`.
pub fn stage_name(index: u8) -> Option<&'static str> {
    index
        .checked_sub(1)
        .and_then(|i| STAGE_NAMES.get(i as usize))
        .copied()
}

/// Opaque job identifier issued by the analysis service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status of a job as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Complete,
    Error,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Complete | JobStatus::Error | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Complete => write!(f, "complete"),
            JobStatus::Error => write!(f, "error"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Output of one finished agent stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: u8,
    pub name: String,
    pub result: String,
}

/// Latest known status of a job.
///
/// The orchestrator keeps one merged snapshot per job; the transport
/// produces a fresh one for every status or cancel response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub status: JobStatus,
    /// Current stage index, 0 if no stage is running.
    pub current_stage: u8,
    /// Free-form label the service attaches to the current step.
    pub stage_label: Option<String>,
    pub stage_results: BTreeMap<u8, StageResult>,
    pub error: Option<String>,
    pub download_ready: bool,
    pub artifact_name: Option<String>,
}

impl JobSnapshot {
    pub fn pending() -> Self {
        Self {
            status: JobStatus::Pending,
            current_stage: 0,
            stage_label: None,
            stage_results: BTreeMap::new(),
            error: None,
            download_ready: false,
            artifact_name: None,
        }
    }

    pub fn result_of(&self, stage: u8) -> Option<&str> {
        self.stage_results.get(&stage).map(|r| r.result.as_str())
    }

    /// Result of the highest stage that has reported one.
    pub fn last_result(&self) -> Option<&StageResult> {
        self.stage_results.values().next_back()
    }
}

impl Default for JobSnapshot {
    fn default() -> Self {
        Self::pending()
    }
}

/// Validation outcome of the final audit stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationClass {
    #[serde(rename = "Validated")]
    Validated,
    #[serde(rename = "Adjusted & Validated")]
    AdjustedAndValidated,
    #[serde(rename = "Rejected")]
    Rejected,
}

impl fmt::Display for ValidationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationClass::Validated => write!(f, "Validated"),
            ValidationClass::AdjustedAndValidated => write!(f, "Adjusted & Validated"),
            ValidationClass::Rejected => write!(f, "Rejected"),
        }
    }
}

/// Audit record produced at most once for a successfully completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub handle: JobHandle,
    pub identity: String,
    pub subject: String,
    pub synopsis: String,
    pub classification: ValidationClass,
    pub created_at: DateTime<Utc>,
}
