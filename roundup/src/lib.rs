//! # Roundup
//!
//! Deterministic orchestration for a narrated daily news roundup.
//!
//! A run takes an ordered list of topics and drives each one through search,
//! summarization, image selection, speech synthesis and slide rendering,
//! then assembles an intro, the surviving topics and an outro into one
//! document, audio track and video. It provides:
//!
//! - **Deterministic artifact keys**: every output is named by stage, slot
//!   and sequence number before the stage runs
//! - **A persisted manifest**: the single source of truth for assembly and
//!   resume
//! - **Classified retries**: transient errors back off and retry, permanent
//!   and validation errors fail at once
//! - **A failure budget**: too many failed topics cancel the run before
//!   assembly
//! - **Pluggable providers**: search, text, images, speech and rendering are
//!   traits, with a subprocess renderer included
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use roundup::prelude::*;
//!
//! let config = RunConfig::from_path("roundup.json")?;
//! let report = RunOrchestrator::new(config, providers)
//!     .with_run_log(true)
//!     .run()
//!     .await?;
//!
//! for entry in &report.timeline {
//!     println!("{} at {}ms", entry.title, entry.start_ms);
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod executor;
pub mod media;
pub mod observability;
pub mod pipeline;
pub mod providers;
pub mod render;
pub mod search;
pub mod store;
pub mod testing;
pub mod text;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{RunConfig, RunPolicy, TopicConfig};
    pub use crate::core::{
        ArtifactKey, Outcome, Slot, StageName, StageResult, Topic, TopicState, TopicStatus,
    };
    pub use crate::errors::{
        ErrorClass, RoundupError, RoundupResult, RunError, StageError, TopicFailure,
    };
    pub use crate::events::{
        CollectingEventSink, EventSink, JsonlRunLog, LoggingEventSink, NoOpEventSink,
    };
    pub use crate::executor::{JitterStrategy, StageExecutor};
    pub use crate::media::{DecodingImageValidator, ImageValidator};
    pub use crate::observability::init_tracing;
    pub use crate::pipeline::{RunOrchestrator, RunReport, TimelineEntry};
    pub use crate::providers::{
        ImageProvider, Providers, SearchProvider, SlideRenderer, SpeechSynthesizer,
        TextGenerator, VideoEncoder,
    };
    pub use crate::render::CommandRenderer;
    pub use crate::store::{ArtifactStore, Manifest, ManifestEntry, OutputLayout};
    pub use crate::utils::{iso_timestamp, Timestamp};
}
