//! Intro and outro segments.
//!
//! Each bookend narrates, synthesizes speech and renders a title slide. A
//! failed narration falls back to a fixed line; a failed speech or slide
//! stage leaves the bookend out of the final assembly.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use super::topic::synthesize;
use super::RunContext;
use crate::core::{ArtifactKey, Slot, StageName, StageResult};
use crate::errors::StageError;
use crate::providers::{SlideSpec, TextGenerator};
use crate::store::ManifestEntry;

/// Title of the intro slide.
pub const INTRO_TITLE: &str = "AI & Tech News Roundup";
/// Title of the outro slide.
pub const OUTRO_TITLE: &str = "Thanks for Watching";
/// Subtitle of the outro slide.
pub const OUTRO_SUBTITLE: &str = "Stay tuned for tomorrow's update!";
/// Outro line used when narration fails.
pub const OUTRO_FALLBACK: &str =
    "Thanks for watching. Join us again tomorrow for the next roundup.";

/// Intro line used when narration fails.
#[must_use]
pub fn intro_fallback(date: &str) -> String {
    format!("Welcome to your AI and tech news roundup for {date}.")
}

/// Narration artifact of a bookend, stored as `text/{intro,outro}.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrationText {
    /// Spoken text.
    pub text: String,
    /// True when the fixed fallback line was used.
    #[serde(default)]
    pub fallback: bool,
}

/// Result of one bookend job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookendOutcome {
    /// `Slot::Intro` or `Slot::Outro`.
    pub slot: Slot,
    /// The error that kept the bookend out, if any.
    pub error: Option<StageError>,
}

impl BookendOutcome {
    /// Returns true if speech and slide are both available.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.error.is_none()
    }
}

/// Intro or outro job.
pub struct Bookend {
    slot: Slot,
    ctx: Arc<RunContext>,
    topics: Vec<String>,
    resuming: bool,
}

impl Bookend {
    /// The intro, naming the configured topics.
    #[must_use]
    pub fn intro(ctx: Arc<RunContext>) -> Self {
        let topics = ctx.config.topics.iter().map(|t| t.label.clone()).collect();
        Self {
            slot: Slot::Intro,
            ctx,
            topics,
            resuming: true,
        }
    }

    /// The outro.
    #[must_use]
    pub fn outro(ctx: Arc<RunContext>) -> Self {
        Self {
            slot: Slot::Outro,
            ctx,
            topics: Vec::new(),
            resuming: true,
        }
    }

    /// Runs narration, speech and slide.
    pub async fn run(mut self) -> BookendOutcome {
        let error = self.drive().await.err();
        if let Some(error) = &error {
            tracing::warn!(
                slot = %self.slot,
                error_class = %error.class,
                error = %error.message,
                "Bookend unavailable, assembly will omit it"
            );
        }
        BookendOutcome {
            slot: self.slot,
            error,
        }
    }

    async fn drive(&mut self) -> Result<(), StageError> {
        let narration = self.narration().await?;
        self.speech(&narration.text).await?;
        self.slide().await
    }

    fn key(&self, stage: StageName) -> ArtifactKey {
        ArtifactKey::new(stage, self.slot)
    }

    async fn resolves(&mut self, key: &ArtifactKey) -> Option<ManifestEntry> {
        if !self.resuming {
            return None;
        }
        let entry = self.ctx.store.resolve(key).await.filter(|entry| entry.path.is_some());
        match entry {
            Some(entry) => {
                self.ctx.emit_resumed(key);
                Some(entry)
            }
            None => {
                self.resuming = false;
                None
            }
        }
    }

    async fn narration(&mut self) -> Result<NarrationText, StageError> {
        let key = self.key(StageName::Narration);
        if self.resuming {
            if let Some((_, text)) = self.ctx.resume_json::<NarrationText>(&key).await {
                self.ctx.emit_resumed(&key);
                return Ok(text);
            }
            self.resuming = false;
        }

        let ctx = Arc::clone(&self.ctx);
        let generator = &ctx.providers.text;
        let date = ctx.date_label();
        let date = date.as_str();
        let slot = self.slot;

        let result = ctx
            .executor
            .execute(&key, self.topics.as_slice(), move |topics| {
                narrate(generator.as_ref(), slot, date, topics)
            })
            .await;

        match result {
            StageResult::Success { output, attempts } => {
                let narration = NarrationText {
                    text: output,
                    fallback: false,
                };
                let (path, sha256) = ctx.write_json(&key, &narration).await?;
                ctx.store
                    .record(ManifestEntry::success(key, path, sha256, attempts))
                    .await?;
                Ok(narration)
            }
            StageResult::Failed { error, attempts } => {
                let text = match slot {
                    Slot::Intro => intro_fallback(date),
                    _ => OUTRO_FALLBACK.to_string(),
                };
                tracing::warn!(
                    slot = %slot,
                    error_class = %error.class,
                    error = %error.message,
                    "Narration failed, using fallback line"
                );
                let narration = NarrationText {
                    text,
                    fallback: true,
                };
                let (path, sha256) = ctx.write_json(&key, &narration).await?;
                let entry = ManifestEntry::skipped(key, format!("fallback narration: {error}"), attempts)
                    .with_file(path, sha256);
                ctx.store.record(entry).await?;
                Ok(narration)
            }
            StageResult::Skipped { reason } => Err(StageError::permanent(reason)),
        }
    }

    async fn speech(&mut self, text: &str) -> Result<(), StageError> {
        let key = self.key(StageName::Speech);
        if self
            .resolves(&key)
            .await
            .is_some_and(|entry| entry.is_success() && entry.duration_ms.is_some())
        {
            return Ok(());
        }
        self.resuming = false;

        let ctx = Arc::clone(&self.ctx);
        let speech = &ctx.providers.speech;
        let result = ctx
            .executor
            .execute(&key, text, move |text| synthesize(speech.as_ref(), text))
            .await;
        let (clip, attempts) = self.settle(&key, result).await?;

        let (path, sha256) = ctx.store.write(&key, &clip.audio).await?;
        ctx.store
            .record(
                ManifestEntry::success(key, path, sha256, attempts)
                    .with_duration_ms(clip.duration_ms),
            )
            .await?;
        Ok(())
    }

    async fn slide(&mut self) -> Result<(), StageError> {
        let key = self.key(StageName::Slide);
        if self
            .resolves(&key)
            .await
            .is_some_and(|entry| entry.is_success())
        {
            return Ok(());
        }
        self.resuming = false;

        let ctx = Arc::clone(&self.ctx);
        let spec = match self.slot {
            Slot::Intro => SlideSpec::title(INTRO_TITLE, ctx.date_label()),
            _ => SlideSpec::title(OUTRO_TITLE, OUTRO_SUBTITLE),
        };
        let renderer = &ctx.providers.slides;
        let output: PathBuf = ctx.store.path_for(&key);
        let output = output.as_path();
        let result = ctx
            .executor
            .execute(&key, &spec, move |spec| renderer.render_slide(spec, output))
            .await;
        let ((), attempts) = self.settle(&key, result).await?;

        let (path, sha256) = ctx.store.adopt(&key).await?;
        ctx.store
            .record(ManifestEntry::success(key, path, sha256, attempts))
            .await?;
        Ok(())
    }

    async fn settle<T>(
        &self,
        key: &ArtifactKey,
        result: StageResult<T>,
    ) -> Result<(T, u32), StageError> {
        let (error, attempts) = match result {
            StageResult::Success { output, attempts } => return Ok((output, attempts)),
            StageResult::Failed { error, attempts } => (error, attempts),
            StageResult::Skipped { reason } => (StageError::permanent(reason), 0),
        };
        if let Err(e) = self
            .ctx
            .store
            .record(ManifestEntry::failed(*key, error.clone(), attempts))
            .await
        {
            tracing::error!(key = %key, error = %e, "Failed to record stage failure");
        }
        Err(error)
    }
}

async fn narrate(
    generator: &dyn TextGenerator,
    slot: Slot,
    date: &str,
    topics: &[String],
) -> Result<String, StageError> {
    let text = match slot {
        Slot::Intro => generator.intro(date, topics).await?,
        _ => generator.outro().await?,
    };
    let text = text.trim();
    if text.is_empty() {
        return Err(StageError::empty_result("empty narration"));
    }
    Ok(text.to_string())
}

impl std::fmt::Debug for Bookend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bookend")
            .field("slot", &self.slot)
            .field("resuming", &self.resuming)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intro_fallback_names_date() {
        assert_eq!(
            intro_fallback("October 17, 2026"),
            "Welcome to your AI and tech news roundup for October 17, 2026."
        );
    }

    #[test]
    fn test_narration_text_defaults_fallback_flag() {
        let text: NarrationText = serde_json::from_str(r#"{"text":"Hello"}"#).unwrap();
        assert!(!text.fallback);
    }
}
