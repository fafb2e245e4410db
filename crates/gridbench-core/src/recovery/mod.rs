//! Recovery from transient external failures

mod retry;

pub use retry::{RetryPolicy, invoke};
