//! Stage execution: retries, timeouts and backoff.

mod backoff;
mod stage;

pub use backoff::{backoff_delay, JitterStrategy};
pub use stage::StageExecutor;
