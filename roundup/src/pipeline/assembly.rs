//! Terminal assembly: document, audio track and video.
//!
//! Assembly reads nothing but the manifest and the files it points to. It
//! lays out every available segment in configured order (intro, surviving
//! topics, outro), writes the document, then has the encoder stitch the
//! audio track and encode the video. All three outputs are recorded
//! together or not at all.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;

use super::bookend::{NarrationText, INTRO_TITLE, OUTRO_TITLE};
use super::topic::TopicText;
use super::RunContext;
use crate::core::{ArtifactKey, Slot, StageName, StageResult, Topic};
use crate::errors::StageError;
use crate::executor::StageExecutor;
use crate::providers::VideoSegment;
use crate::store::{Manifest, ManifestEntry};

/// One segment of the final roundup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSegment {
    /// Segment slot.
    pub slot: Slot,
    /// Slide title.
    pub title: String,
    /// Bullet lines; empty for bookends.
    #[serde(default)]
    pub bullets: Vec<String>,
    /// Spoken text.
    pub narration: String,
    /// Image path relative to the output root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<PathBuf>,
    /// Audio path relative to the output root.
    pub audio: PathBuf,
    /// Slide path relative to the output root.
    pub slide: PathBuf,
    /// Offset into the audio track.
    pub start_ms: u64,
    /// Segment length.
    pub duration_ms: u64,
}

/// The assembled document, stored as `final/document.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundupDocument {
    /// Display date of the roundup.
    pub date: String,
    /// Segments in running order.
    pub segments: Vec<DocumentSegment>,
    /// Sum of segment durations.
    pub total_duration_ms: u64,
}

/// Position of one segment in the final timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// Segment slot.
    pub slot: Slot,
    /// Slide title.
    pub title: String,
    /// Offset into the audio track.
    pub start_ms: u64,
    /// Segment length.
    pub duration_ms: u64,
}

impl From<&DocumentSegment> for TimelineEntry {
    fn from(segment: &DocumentSegment) -> Self {
        Self {
            slot: segment.slot,
            title: segment.title.clone(),
            start_ms: segment.start_ms,
            duration_ms: segment.duration_ms,
        }
    }
}

/// Paths and timeline of a successful assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyOutput {
    /// Absolute path of the document.
    pub document: PathBuf,
    /// Absolute path of the audio track.
    pub audio_track: PathBuf,
    /// Absolute path of the video.
    pub video: PathBuf,
    /// Segment positions.
    pub timeline: Vec<TimelineEntry>,
    /// Total running time.
    pub total_duration_ms: u64,
}

/// The single terminal stage of a run.
pub struct AssemblyStage<'a> {
    ctx: &'a RunContext,
    executor: StageExecutor,
}

impl<'a> AssemblyStage<'a> {
    /// Creates the stage; it never retries.
    #[must_use]
    pub fn new(ctx: &'a RunContext) -> Self {
        Self {
            ctx,
            executor: ctx.executor.single_attempt(),
        }
    }

    fn final_keys() -> [ArtifactKey; 3] {
        [
            ArtifactKey::new(StageName::Document, Slot::Final),
            ArtifactKey::new(StageName::AudioTrack, Slot::Final),
            ArtifactKey::new(StageName::Video, Slot::Final),
        ]
    }

    /// Assembles every available segment of the terminal-success `topics`
    /// (configured order) plus the bookends.
    ///
    /// # Errors
    ///
    /// Returns a validation error when no topic survived, otherwise the
    /// error of whichever output failed. Nothing is recorded as a success
    /// unless all three outputs were produced.
    pub async fn run(&self, topics: &[Topic]) -> Result<AssemblyOutput, StageError> {
        let manifest = self.ctx.store.snapshot().await;
        let document = match self.compose(&manifest, topics).await {
            Ok(document) => document,
            Err(error) => return Err(self.abandon(error, 0).await),
        };

        let timeline: Vec<TimelineEntry> = document.segments.iter().map(Into::into).collect();
        let total_duration_ms = document.total_duration_ms;
        let [doc_key, track_key, video_key] = Self::final_keys();
        let output = AssemblyOutput {
            document: self.ctx.store.path_for(&doc_key),
            audio_track: self.ctx.store.path_for(&track_key),
            video: self.ctx.store.path_for(&video_key),
            timeline,
            total_duration_ms,
        };

        if self.already_assembled(&manifest, &document).await {
            for key in &Self::final_keys() {
                self.ctx.emit_resumed(key);
            }
            return Ok(output);
        }

        match self.produce(&document).await {
            Ok(entries) => {
                for entry in entries {
                    if let Err(e) = self.ctx.store.record(entry).await {
                        return Err(self.abandon(e.into(), 1).await);
                    }
                }
                tracing::info!(
                    segments = document.segments.len(),
                    total_duration_ms,
                    "Assembly completed"
                );
                self.ctx.sink.try_emit(
                    "assembly.completed",
                    Some(json!({
                        "segments": document.segments.len(),
                        "total_duration_ms": total_duration_ms,
                    })),
                );
                Ok(output)
            }
            Err(error) => Err(self.abandon(error, 1).await),
        }
    }

    /// Lays out the segments from manifest entries alone.
    async fn compose(
        &self,
        manifest: &Manifest,
        topics: &[Topic],
    ) -> Result<RoundupDocument, StageError> {
        let mut slots: Vec<(Slot, String)> = Vec::with_capacity(topics.len() + 2);
        slots.push((Slot::Intro, INTRO_TITLE.to_string()));
        slots.extend(
            topics
                .iter()
                .filter(|t| t.state.is_assemblable())
                .map(|t| (t.slot(), t.label.clone())),
        );
        slots.push((Slot::Outro, OUTRO_TITLE.to_string()));

        let mut segments = Vec::with_capacity(slots.len());
        let mut cursor = 0u64;
        for (slot, title) in slots {
            let Some((audio, slide, duration_ms)) = Self::media_for(manifest, slot) else {
                tracing::debug!(slot = %slot, "Segment unavailable, omitted from assembly");
                continue;
            };
            let (bullets, narration) = self.text_for(slot).await?;
            let image = manifest
                .get(&ArtifactKey::new(StageName::Image, slot))
                .filter(|entry| entry.is_success())
                .and_then(|entry| entry.path.clone());
            segments.push(DocumentSegment {
                slot,
                title,
                bullets,
                narration,
                image,
                audio,
                slide,
                start_ms: cursor,
                duration_ms,
            });
            cursor += duration_ms;
        }

        if !segments.iter().any(|s| s.slot.topic_number().is_some()) {
            return Err(StageError::validation("no topics survived to assembly"));
        }
        Ok(RoundupDocument {
            date: self.ctx.date_label(),
            segments,
            total_duration_ms: cursor,
        })
    }

    /// Audio path, slide path and duration of a segment whose speech and
    /// slide both succeeded. Topic slides must also have led to a
    /// terminal success state.
    fn media_for(manifest: &Manifest, slot: Slot) -> Option<(PathBuf, PathBuf, u64)> {
        let speech = manifest
            .get(&ArtifactKey::new(StageName::Speech, slot))
            .filter(|entry| entry.is_success())?;
        let slide = manifest
            .get(&ArtifactKey::new(StageName::Slide, slot))
            .filter(|entry| entry.is_success())?;
        if slot.topic_number().is_some() && !slide.state.is_some_and(|s| s.is_assemblable()) {
            return None;
        }
        Some((speech.path.clone()?, slide.path.clone()?, speech.duration_ms?))
    }

    async fn text_for(&self, slot: Slot) -> Result<(Vec<String>, String), StageError> {
        let stage = if slot.topic_number().is_some() {
            StageName::Summarize
        } else {
            StageName::Narration
        };
        let key = ArtifactKey::new(stage, slot);
        let bytes = self.ctx.store.read(&key).await?;
        let unreadable =
            |e: serde_json::Error| StageError::permanent(format!("unreadable {key}: {e}"));
        if stage == StageName::Summarize {
            let text: TopicText = serde_json::from_slice(&bytes).map_err(unreadable)?;
            Ok((text.bullets, text.script))
        } else {
            let text: NarrationText = serde_json::from_slice(&bytes).map_err(unreadable)?;
            Ok((Vec::new(), text.text))
        }
    }

    /// True when a previous run already produced exactly this document and
    /// all three outputs still resolve.
    async fn already_assembled(&self, manifest: &Manifest, document: &RoundupDocument) -> bool {
        let Ok(bytes) = serde_json::to_vec_pretty(document) else {
            return false;
        };
        let [doc_key, ..] = Self::final_keys();
        let same_document = manifest
            .get(&doc_key)
            .and_then(|entry| entry.sha256.as_deref())
            == Some(crate::store::sha256_hex(&bytes).as_str());
        if !same_document {
            return false;
        }
        for key in &Self::final_keys() {
            if self.ctx.store.resolve(key).await.is_none() {
                return false;
            }
        }
        true
    }

    /// Writes the document and runs the encoder. Returns the entries to
    /// record, without recording them.
    async fn produce(&self, document: &RoundupDocument) -> Result<Vec<ManifestEntry>, StageError> {
        let [doc_key, track_key, video_key] = Self::final_keys();
        let root = self.ctx.store.root();
        let encoder = &self.ctx.providers.video;

        let (doc_path, doc_sha) = self.ctx.write_json(&doc_key, document).await?;

        let clips: Vec<PathBuf> = document
            .segments
            .iter()
            .map(|s| root.join(&s.audio))
            .collect();
        let track = self.ctx.store.path_for(&track_key);
        let track_out = track.as_path();
        let result = self
            .executor
            .execute(&track_key, clips.as_slice(), move |clips| {
                encoder.stitch_audio(clips, track_out)
            })
            .await;
        let track_attempts = settled(result)?;
        let (track_path, track_sha) = self.ctx.store.adopt(&track_key).await?;

        let segments: Vec<VideoSegment> = document
            .segments
            .iter()
            .map(|s| VideoSegment {
                slot: s.slot,
                slide: root.join(&s.slide),
                start_ms: s.start_ms,
                duration_ms: s.duration_ms,
            })
            .collect();
        let video = self.ctx.store.path_for(&video_key);
        let video_out = video.as_path();
        let result = self
            .executor
            .execute(&video_key, segments.as_slice(), move |segments| {
                encoder.encode_video(segments, track_out, video_out)
            })
            .await;
        let video_attempts = settled(result)?;
        let (video_path, video_sha) = self.ctx.store.adopt(&video_key).await?;

        Ok(vec![
            ManifestEntry::success(doc_key, doc_path, doc_sha, 1),
            ManifestEntry::success(track_key, track_path, track_sha, track_attempts)
                .with_duration_ms(document.total_duration_ms),
            ManifestEntry::success(video_key, video_path, video_sha, video_attempts)
                .with_duration_ms(document.total_duration_ms),
        ])
    }

    /// Removes partial outputs and records the failure against every final
    /// key, so no stale output resolves.
    async fn abandon(&self, error: StageError, attempts: u32) -> StageError {
        tracing::error!(
            error_class = %error.class,
            error = %error.message,
            "Assembly failed"
        );
        for key in Self::final_keys() {
            self.ctx.store.discard(&key).await;
            let entry = ManifestEntry::failed(key, error.clone(), attempts);
            if let Err(e) = self.ctx.store.record(entry).await {
                tracing::error!(key = %key, error = %e, "Failed to record assembly failure");
            }
        }
        self.ctx.sink.try_emit(
            "assembly.failed",
            Some(json!({ "error": error.to_dict() })),
        );
        error
    }
}

fn settled<T>(result: StageResult<T>) -> Result<u32, StageError> {
    match result {
        StageResult::Success { attempts, .. } => Ok(attempts),
        StageResult::Failed { error, .. } => Err(error),
        StageResult::Skipped { reason } => Err(StageError::permanent(reason)),
    }
}

impl std::fmt::Debug for AssemblyStage<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssemblyStage").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TopicState;

    fn entry(stage: StageName, slot: Slot, duration_ms: Option<u64>) -> ManifestEntry {
        let key = ArtifactKey::new(stage, slot);
        let mut entry = ManifestEntry::success(key, crate::store::OutputLayout::relative_path(&key), "00".into(), 1);
        if let Some(d) = duration_ms {
            entry = entry.with_duration_ms(d);
        }
        entry
    }

    #[test]
    fn test_media_requires_speech_and_slide() {
        let mut manifest = Manifest::new(uuid::Uuid::new_v4());
        manifest.record(entry(StageName::Speech, Slot::Intro, Some(900)));
        assert!(AssemblyStage::media_for(&manifest, Slot::Intro).is_none());

        manifest.record(entry(StageName::Slide, Slot::Intro, None));
        let (audio, slide, duration) = AssemblyStage::media_for(&manifest, Slot::Intro).unwrap();
        assert_eq!(audio, PathBuf::from("audio/intro.wav"));
        assert_eq!(slide, PathBuf::from("slides/intro_slide.png"));
        assert_eq!(duration, 900);
    }

    #[test]
    fn test_topic_media_requires_terminal_state() {
        let mut manifest = Manifest::new(uuid::Uuid::new_v4());
        let slot = Slot::Topic(2);
        manifest.record(entry(StageName::Speech, slot, Some(1_200)));
        manifest.record(entry(StageName::Slide, slot, None));
        assert!(AssemblyStage::media_for(&manifest, slot).is_none());

        manifest.record(entry(StageName::Slide, slot, None).with_state(TopicState::PartialComplete));
        assert!(AssemblyStage::media_for(&manifest, slot).is_some());
    }

    #[test]
    fn test_timeline_entry_from_segment() {
        let segment = DocumentSegment {
            slot: Slot::Topic(1),
            title: "OpenAI".into(),
            bullets: vec![],
            narration: "Today.".into(),
            image: None,
            audio: "audio/topic_01.wav".into(),
            slide: "slides/topic_01_slide.png".into(),
            start_ms: 1_500,
            duration_ms: 2_000,
        };
        let entry = TimelineEntry::from(&segment);
        assert_eq!(entry.start_ms, 1_500);
        assert_eq!(entry.title, "OpenAI");
    }
}
