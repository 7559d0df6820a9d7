mod job;
mod state;

pub use job::{
    CompletionRecord, DEFAULT_STAGE_COUNT, JobHandle, JobSnapshot, JobStatus, STAGE_NAMES,
    StageResult, ValidationClass, stage_name,
};
pub use state::{JobState, JobStateMachine, Transition};
