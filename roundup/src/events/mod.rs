//! Structured run events.
//!
//! Sinks are passed explicitly to the orchestrator; there is no global sink.
//! Event types emitted by the crate:
//!
//! | type | emitted when |
//! |---|---|
//! | `run.started` / `run.completed` | run boundaries |
//! | `topic.transition` | a topic enters a new state |
//! | `stage.attempt` / `stage.retry` / `stage.failed` | executor attempts |
//! | `stage.resumed` | a stage is satisfied from the manifest |
//! | `run.cancelled` / `run.aborted` | failure budget exceeded |
//! | `assembly.completed` | final artifacts written |

mod run_log;
mod sink;

pub use run_log::{JsonlRunLog, RUN_LOG_FILE};
pub use sink::{CollectingEventSink, EventSink, FanoutEventSink, LoggingEventSink, NoOpEventSink};
