//! Result records, run counters and log reading

mod collector;
mod report;
mod types;

pub use collector::{RunContext, RunCounters, RunInfo};
pub use report::{LogSummary, ResultLog};
pub(crate) use types::secs;
pub use types::{
    GenerationAttempt, LogEntry, OutcomeKind, ResultRecord, RunMetadata, RunStatus,
    VerificationOutcome,
};
