//! CLI commands

pub mod run;
pub mod summary;
pub mod tasks;
pub mod verify;
