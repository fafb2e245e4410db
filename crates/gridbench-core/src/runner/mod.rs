//! Run orchestration: configuration, per-task processing, the concurrent run
//! loop and the result log

pub mod checkpoint;
pub mod config;
pub mod coordinator;
pub mod processor;

pub use checkpoint::CheckpointWriter;
pub use config::{BenchConfig, CheckpointSettings, ConfigLoader, ConfigSource, SandboxSettings};
pub use coordinator::Coordinator;
pub use processor::TaskProcessor;
