//! Core domain model types.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Stage names and topic states
//! - Deterministic artifact keys
//! - Stage results and manifest outcomes
//! - Topics

mod artifact;
mod result;
mod status;
mod topic;

pub use artifact::{ArtifactKey, Slot};
pub use result::{Outcome, StageResult};
pub use status::{StageName, TopicState, TopicStatus};
pub use topic::Topic;
