mod job;
mod state;
mod store;

pub use job::{
    DEFAULT_TARGET_LANGUAGE, JobError, JobPayload, JobRecord, JobSnapshot, Transition,
};
pub use state::{JobState, StateMachine, TransitionRejection};
pub use store::JobStore;
