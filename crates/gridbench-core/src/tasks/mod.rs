//! Task definitions and sources

mod loader;
mod task;

pub use loader::{TaskRange, TaskSelection, TaskSource, TaskStream};
pub use task::{Example, TaskDescriptor, TestCase};
