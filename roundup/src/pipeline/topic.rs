//! Per-topic state machine.
//!
//! ```text
//! Pending → Searching → Summarizing → ImageFetching → Synthesizing → SlideBuilding → Complete
//!                                          └─ no valid image, fallback allowed ─→ … → PartialComplete
//! any working state ─→ Failed
//! ```
//!
//! Stages run strictly in order. Every stage the pipeline passes through
//! leaves one manifest entry carrying the state the transition led to. When
//! resuming, leading stages whose entries resolve are skipped; once one stage
//! runs again, every later stage runs again too.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

use super::RunContext;
use crate::core::{ArtifactKey, StageName, StageResult, Topic, TopicState};
use crate::errors::{ErrorClass, StageError, StoreError, TopicFailure};
use crate::providers::{
    Providers, SearchProvider, SlideSpec, SpeechClip, SpeechSynthesizer, TextGenerator,
};
use crate::search::{aggregate_snippets, PlannedQuery, SearchDigest};
use crate::store::ManifestEntry;
use crate::text::{normalize_bullets, sanitize_keywords};

/// Output of the summarize stage, stored as `text/topic_NN.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicText {
    /// Topic label.
    pub label: String,
    /// Bullet lines for the slide.
    pub bullets: Vec<String>,
    /// Narration script.
    pub script: String,
}

/// Terminal result of one topic pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicOutcome {
    /// The topic in its terminal state.
    pub topic: Topic,
    /// Set when the topic failed.
    pub failure: Option<TopicFailure>,
}

/// Drives one topic through its stages.
pub struct TopicPipeline {
    topic: Topic,
    ctx: Arc<RunContext>,
    degraded: bool,
    resuming: bool,
}

impl TopicPipeline {
    /// Creates a pipeline for a pending topic.
    #[must_use]
    pub fn new(topic: Topic, ctx: Arc<RunContext>) -> Self {
        Self {
            topic,
            ctx,
            degraded: false,
            resuming: true,
        }
    }

    /// The topic as it currently stands.
    #[must_use]
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Runs every stage and returns the terminal outcome.
    pub async fn run(mut self) -> TopicOutcome {
        tracing::info!(
            topic = self.topic.number,
            label = %self.topic.label,
            "Topic pipeline started"
        );
        let failure = self.drive().await.err();
        TopicOutcome {
            topic: self.topic,
            failure,
        }
    }

    async fn drive(&mut self) -> Result<(), TopicFailure> {
        self.transition(TopicState::Searching);
        let digest = self.search().await?;

        self.transition(TopicState::Summarizing);
        let text = self.summarize(&digest).await?;

        self.transition(TopicState::ImageFetching);
        let image = self.image(&digest).await?;

        self.transition(TopicState::Synthesizing);
        self.speech(&text).await?;

        self.transition(TopicState::SlideBuilding);
        let terminal = self.slide(&text, image).await?;

        self.transition(terminal);
        Ok(())
    }

    fn key(&self, stage: StageName) -> ArtifactKey {
        ArtifactKey::new(stage, self.topic.slot())
    }

    fn transition(&mut self, to: TopicState) {
        let from = self.topic.state;
        if from == to {
            return;
        }
        self.topic.state = to;
        tracing::info!(
            topic = self.topic.number,
            label = %self.topic.label,
            from = %from,
            to = %to,
            "Topic state changed"
        );
        self.ctx.sink.try_emit(
            "topic.transition",
            Some(json!({
                "topic": self.topic.number,
                "label": self.topic.label,
                "from": from,
                "to": to,
            })),
        );
    }

    async fn search(&mut self) -> Result<SearchDigest, TopicFailure> {
        let key = self.key(StageName::Search);
        if let Some(digest) = self.try_resume_json::<SearchDigest>(&key).await {
            return Ok(digest);
        }
        self.ensure_running(StageName::Search).await?;

        let ctx = Arc::clone(&self.ctx);
        let plan = ctx.planner.plan(&self.topic);
        let search = &ctx.providers.search;
        let per_query = ctx.config.snippets_per_query;
        let max_chars = ctx.config.snippet_chars;

        let result = ctx
            .executor
            .execute(&key, plan.as_slice(), move |plan| {
                gather_snippets(search.as_ref(), plan, per_query, max_chars)
            })
            .await;

        let (digest, attempts) = self.settle(StageName::Search, result).await?;
        let stored = ctx.write_json(&key, &digest).await;
        self.record_stored(&key, stored, attempts, TopicState::Summarizing, None)
            .await?;
        Ok(digest)
    }

    async fn summarize(&mut self, digest: &SearchDigest) -> Result<TopicText, TopicFailure> {
        let key = self.key(StageName::Summarize);
        if let Some(text) = self.try_resume_json::<TopicText>(&key).await {
            return Ok(text);
        }
        self.ensure_running(StageName::Summarize).await?;

        let ctx = Arc::clone(&self.ctx);
        let generator = &ctx.providers.text;
        let label = self.topic.label.clone();
        let label = label.as_str();
        let summary = digest.summary();

        let result = ctx
            .executor
            .execute(&key, summary.as_str(), move |summary| {
                write_text(generator.as_ref(), label, summary)
            })
            .await;

        let (text, attempts) = self.settle(StageName::Summarize, result).await?;
        let stored = ctx.write_json(&key, &text).await;
        self.record_stored(&key, stored, attempts, TopicState::ImageFetching, None)
            .await?;
        Ok(text)
    }

    async fn image(&mut self, digest: &SearchDigest) -> Result<Option<PathBuf>, TopicFailure> {
        let key = self.key(StageName::Image);
        if self.resuming {
            if let Some(entry) = self.ctx.store.resolve(&key).await {
                self.ctx.emit_resumed(&key);
                if entry.is_success() {
                    return Ok(Some(self.ctx.store.path_for(&key)));
                }
                self.degraded = true;
                return Ok(None);
            }
            self.resuming = false;
        }
        self.ensure_running(StageName::Image).await?;

        let ctx = Arc::clone(&self.ctx);
        let providers = &ctx.providers;
        let max_candidates = ctx.config.image_candidates;
        let summary = digest.summary();

        let result = ctx
            .executor
            .execute(&key, summary.as_str(), move |summary| {
                pick_image(providers, summary, max_candidates)
            })
            .await;

        match result {
            StageResult::Success { output, attempts } => {
                let stored = ctx.store.write(&key, &output).await;
                self.record_stored(&key, stored, attempts, TopicState::Synthesizing, None)
                    .await?;
                Ok(Some(ctx.store.path_for(&key)))
            }
            StageResult::Failed { error, attempts } if self.fallback_applies(&error) => {
                tracing::warn!(
                    topic = self.topic.number,
                    label = %self.topic.label,
                    error_class = %error.class,
                    error = %error.message,
                    "No usable image, continuing text-only"
                );
                let entry = ManifestEntry::skipped(key, error.to_string(), attempts)
                    .with_state(TopicState::Synthesizing);
                if let Err(e) = ctx.store.record(entry).await {
                    return Err(self.fail(StageName::Image, e.into(), attempts).await);
                }
                ctx.store.discard(&key).await;
                self.degraded = true;
                Ok(None)
            }
            other => self.settle(StageName::Image, other).await.map(|_| None),
        }
    }

    async fn speech(&mut self, text: &TopicText) -> Result<u64, TopicFailure> {
        let key = self.key(StageName::Speech);
        if self.resuming {
            if let Some(duration) = self
                .ctx
                .store
                .resolve(&key)
                .await
                .filter(ManifestEntry::is_success)
                .and_then(|entry| entry.duration_ms)
            {
                self.ctx.emit_resumed(&key);
                return Ok(duration);
            }
            self.resuming = false;
        }
        self.ensure_running(StageName::Speech).await?;

        let ctx = Arc::clone(&self.ctx);
        let speech = &ctx.providers.speech;

        let result = ctx
            .executor
            .execute(&key, text.script.as_str(), move |script| {
                synthesize(speech.as_ref(), script)
            })
            .await;

        let (clip, attempts) = self.settle(StageName::Speech, result).await?;
        let stored = ctx.store.write(&key, &clip.audio).await;
        self.record_stored(
            &key,
            stored,
            attempts,
            TopicState::SlideBuilding,
            Some(clip.duration_ms),
        )
        .await?;
        Ok(clip.duration_ms)
    }

    async fn slide(
        &mut self,
        text: &TopicText,
        image: Option<PathBuf>,
    ) -> Result<TopicState, TopicFailure> {
        let terminal = if self.degraded {
            TopicState::PartialComplete
        } else {
            TopicState::Complete
        };
        let key = self.key(StageName::Slide);
        if self.resuming {
            if self
                .ctx
                .store
                .resolve(&key)
                .await
                .is_some_and(|entry| entry.is_success())
            {
                self.ctx.emit_resumed(&key);
                return Ok(terminal);
            }
            self.resuming = false;
        }
        self.ensure_running(StageName::Slide).await?;

        let ctx = Arc::clone(&self.ctx);
        let renderer = &ctx.providers.slides;
        let spec = SlideSpec::topic(self.topic.label.clone(), text.bullets.clone(), image);
        let output = ctx.store.path_for(&key);
        let output = output.as_path();

        let result = ctx
            .executor
            .execute(&key, &spec, move |spec| renderer.render_slide(spec, output))
            .await;

        let ((), attempts) = self.settle(StageName::Slide, result).await?;
        let stored = ctx.store.adopt(&key).await;
        self.record_stored(&key, stored, attempts, terminal, None)
            .await?;
        Ok(terminal)
    }

    fn fallback_applies(&self, error: &StageError) -> bool {
        self.ctx.config.policy.allow_text_only_fallback
            && !error.cancelled
            && error.class != ErrorClass::Permanent
    }

    async fn try_resume_json<T: DeserializeOwned>(&mut self, key: &ArtifactKey) -> Option<T> {
        if !self.resuming {
            return None;
        }
        if let Some((_, value)) = self.ctx.resume_json::<T>(key).await {
            self.ctx.emit_resumed(key);
            return Some(value);
        }
        self.resuming = false;
        None
    }

    fn cancel_reason(&self) -> Option<String> {
        let cancel = self.ctx.executor.cancellation();
        cancel
            .is_cancelled()
            .then(|| cancel.reason().unwrap_or_default())
    }

    async fn ensure_running(&mut self, stage: StageName) -> Result<(), TopicFailure> {
        match self.cancel_reason() {
            Some(reason) => Err(self.fail(stage, StageError::cancelled(reason), 0).await),
            None => Ok(()),
        }
    }

    async fn settle<T>(
        &mut self,
        stage: StageName,
        result: StageResult<T>,
    ) -> Result<(T, u32), TopicFailure> {
        match result {
            StageResult::Success { output, attempts } => Ok((output, attempts)),
            StageResult::Failed { error, attempts } => Err(self.fail(stage, error, attempts).await),
            StageResult::Skipped { reason } => {
                Err(self.fail(stage, StageError::permanent(reason), 0).await)
            }
        }
    }

    async fn record_stored(
        &mut self,
        key: &ArtifactKey,
        stored: Result<(PathBuf, String), StoreError>,
        attempts: u32,
        next: TopicState,
        duration_ms: Option<u64>,
    ) -> Result<(), TopicFailure> {
        let recorded = match stored {
            Ok((path, sha256)) => {
                let mut entry =
                    ManifestEntry::success(*key, path, sha256, attempts).with_state(next);
                if let Some(duration_ms) = duration_ms {
                    entry = entry.with_duration_ms(duration_ms);
                }
                self.ctx.store.record(entry).await
            }
            Err(e) => Err(e),
        };
        match recorded {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(key.stage, e.into(), attempts).await),
        }
    }

    async fn fail(&mut self, stage: StageName, error: StageError, attempts: u32) -> TopicFailure {
        let state = self.topic.state;
        let key = self.key(stage);
        let entry =
            ManifestEntry::failed(key, error.clone(), attempts).with_state(TopicState::Failed);
        if let Err(e) = self.ctx.store.record(entry).await {
            tracing::error!(key = %key, error = %e, "Failed to record stage failure");
        }
        retract_later(&self.ctx, &self.topic, stage).await;
        tracing::warn!(
            topic = self.topic.number,
            label = %self.topic.label,
            stage = %stage,
            attempt = attempts,
            error_class = %error.class,
            error = %error.message,
            "Topic failed"
        );
        self.transition(TopicState::Failed);
        TopicFailure {
            topic: self.topic.number,
            label: self.topic.label.clone(),
            stage,
            state,
            attempts,
            error,
        }
    }

    /// Builds the failure for a pipeline task that died without reporting.
    ///
    /// The failing stage is the first one without a settled manifest entry.
    pub(crate) async fn crashed(ctx: &RunContext, topic: &Topic, message: String) -> TopicFailure {
        let mut failed_at = (TopicState::Searching, StageName::Search);
        for state in TopicState::WORKING {
            let Some(stage) = state.stage() else { continue };
            failed_at = (state, stage);
            let key = ArtifactKey::new(stage, topic.slot());
            let settled = ctx
                .store
                .lookup(&key)
                .await
                .is_some_and(|entry| entry.outcome.is_settled());
            if !settled {
                break;
            }
        }
        let (state, stage) = failed_at;
        let error = StageError::permanent(message);
        let entry = ManifestEntry::failed(ArtifactKey::new(stage, topic.slot()), error.clone(), 1)
            .with_state(TopicState::Failed);
        if let Err(e) = ctx.store.record(entry).await {
            tracing::error!(topic = topic.number, error = %e, "Failed to record crash");
        }
        retract_later(ctx, topic, stage).await;
        TopicFailure {
            topic: topic.number,
            label: topic.label.clone(),
            stage,
            state,
            attempts: 1,
            error,
        }
    }
}

/// Topic stages that run after `stage`.
fn stages_after(stage: StageName) -> impl Iterator<Item = StageName> {
    TopicState::WORKING
        .into_iter()
        .filter_map(|state| state.stage())
        .skip_while(move |s| *s != stage)
        .skip(1)
}

/// Drops entries a previous run left for stages after a failed one, so a
/// failed topic never carries a successful speech or slide.
async fn retract_later(ctx: &RunContext, topic: &Topic, stage: StageName) {
    let keys: Vec<ArtifactKey> = stages_after(stage)
        .map(|later| ArtifactKey::new(later, topic.slot()))
        .collect();
    match ctx.store.retract(&keys).await {
        Ok(0) => {}
        Ok(retracted) => tracing::info!(
            topic = topic.number,
            stage = %stage,
            retracted,
            "Dropped stale entries after failed stage"
        ),
        Err(e) => tracing::error!(topic = topic.number, error = %e, "Failed to drop stale entries"),
    }
}

async fn gather_snippets(
    search: &dyn SearchProvider,
    plan: &[PlannedQuery],
    per_query: usize,
    max_chars: usize,
) -> Result<SearchDigest, StageError> {
    let mut digest = SearchDigest {
        queries: Vec::with_capacity(plan.len()),
        site_summaries: Vec::new(),
    };
    for planned in plan {
        tracing::debug!(query = %planned.query, "Searching");
        let snippets = search.search(&planned.query, per_query).await?;
        digest.queries.push(planned.query.clone());
        if let Some(summary) =
            aggregate_snippets(planned.site.as_deref(), &snippets, per_query, max_chars)
        {
            digest.site_summaries.push(summary);
        }
    }
    if digest.site_summaries.is_empty() {
        return Err(StageError::empty_result("search returned no results"));
    }
    Ok(digest)
}

async fn write_text(
    generator: &dyn TextGenerator,
    label: &str,
    summary: &str,
) -> Result<TopicText, StageError> {
    let bullets = normalize_bullets(&generator.summarize(summary).await?);
    if bullets.is_empty() {
        return Err(StageError::validation("no bullet points generated"));
    }
    let script = generator.narrate(summary, &bullets).await?;
    let script = script.trim();
    if script.is_empty() {
        return Err(StageError::validation("empty narration script"));
    }
    Ok(TopicText {
        label: label.to_string(),
        bullets,
        script: script.to_string(),
    })
}

/// Generates keywords, fetches candidates and keeps the first that validates.
async fn pick_image(
    providers: &Providers,
    summary: &str,
    max_candidates: usize,
) -> Result<Vec<u8>, StageError> {
    let keywords = sanitize_keywords(&providers.text.keywords(summary).await?);
    if keywords.is_empty() {
        return Err(StageError::validation("no usable image keywords"));
    }
    let candidates = providers
        .images
        .fetch_candidates(&keywords, max_candidates)
        .await?;
    let offered = candidates.len();
    candidates
        .into_iter()
        .take(max_candidates)
        .find(|candidate| providers.validator.validate(candidate))
        .ok_or_else(|| {
            StageError::empty_result(format!(
                "none of {offered} image candidate(s) for '{keywords}' passed validation"
            ))
        })
}

pub(super) async fn synthesize(
    speech: &dyn SpeechSynthesizer,
    script: &str,
) -> Result<SpeechClip, StageError> {
    let clip = speech.synthesize(script).await?;
    if clip.audio.is_empty() {
        return Err(StageError::validation("speech synthesis returned no audio"));
    }
    Ok(clip)
}

impl std::fmt::Debug for TopicPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicPipeline")
            .field("topic", &self.topic)
            .field("degraded", &self.degraded)
            .field("resuming", &self.resuming)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stages_after_follows_pipeline_order() {
        let later: Vec<_> = stages_after(StageName::Summarize).collect();
        assert_eq!(
            later,
            vec![StageName::Image, StageName::Speech, StageName::Slide]
        );
        assert_eq!(stages_after(StageName::Slide).count(), 0);
    }
}
