//! Run execution.
//!
//! This module provides:
//! - The per-topic state machine
//! - Intro and outro jobs
//! - The orchestrator with its failure budget
//! - Terminal assembly and the run report

mod assembly;
mod bookend;
mod context;
mod orchestrator;
mod report;
mod topic;


pub use assembly::{AssemblyOutput, AssemblyStage, DocumentSegment, RoundupDocument, TimelineEntry};
pub use bookend::{
    intro_fallback, Bookend, BookendOutcome, NarrationText, INTRO_TITLE, OUTRO_FALLBACK,
    OUTRO_SUBTITLE, OUTRO_TITLE,
};
pub use context::RunContext;
pub use orchestrator::{FailureBudget, RunOrchestrator};
pub use report::{RunReport, TopicReport};
pub use topic::{TopicOutcome, TopicPipeline, TopicText};
