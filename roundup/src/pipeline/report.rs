//! Summary of a finished run.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use super::assembly::{AssemblyOutput, TimelineEntry};
use crate::core::{Topic, TopicState, TopicStatus};
use crate::errors::TopicFailure;

/// Terminal state of one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicReport {
    /// 1-based topic number.
    pub number: usize,
    /// Topic label.
    pub label: String,
    /// Terminal state.
    pub state: TopicState,
    /// Coarse status.
    pub status: TopicStatus,
}

impl From<&Topic> for TopicReport {
    fn from(topic: &Topic) -> Self {
        Self {
            number: topic.number,
            label: topic.label.clone(),
            state: topic.state,
            status: topic.status(),
        }
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Run identifier.
    pub run_id: Uuid,
    /// Output root.
    pub output_dir: PathBuf,
    /// Every topic in configured order.
    pub topics: Vec<TopicReport>,
    /// Topics that failed but stayed within the failure budget.
    pub failures: Vec<TopicFailure>,
    /// Whether the intro made it into the assembly.
    pub intro: bool,
    /// Whether the outro made it into the assembly.
    pub outro: bool,
    /// Combined document.
    pub document: PathBuf,
    /// Audio track.
    pub audio_track: PathBuf,
    /// Final video.
    pub video: PathBuf,
    /// Segment positions in running order.
    pub timeline: Vec<TimelineEntry>,
    /// Total running time.
    pub total_duration_ms: u64,
}

impl RunReport {
    pub(crate) fn new(
        run_id: Uuid,
        output_dir: PathBuf,
        topics: &[Topic],
        failures: Vec<TopicFailure>,
        output: AssemblyOutput,
    ) -> Self {
        let intro = output.timeline.first().is_some_and(|t| t.slot == crate::core::Slot::Intro);
        let outro = output.timeline.last().is_some_and(|t| t.slot == crate::core::Slot::Outro);
        Self {
            run_id,
            output_dir,
            topics: topics.iter().map(TopicReport::from).collect(),
            failures,
            intro,
            outro,
            document: output.document,
            audio_track: output.audio_track,
            video: output.video,
            timeline: output.timeline,
            total_duration_ms: output.total_duration_ms,
        }
    }

    /// Topics that reached `Complete` or `PartialComplete`.
    pub fn assembled_topics(&self) -> impl Iterator<Item = &TopicReport> {
        self.topics.iter().filter(|t| t.state.is_assemblable())
    }

    /// Returns true if any topic fell back to text-only.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.topics
            .iter()
            .any(|t| t.state == TopicState::PartialComplete)
    }
}
