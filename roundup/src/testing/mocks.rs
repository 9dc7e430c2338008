//! Scripted provider fakes.
//!
//! Every fake records its calls and consults a [`Script`] before producing a
//! deterministic default answer. Rules match on the operation name and a
//! substring of the call input, and may be limited to a number of uses.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::fixtures::{png_bytes, tagged_png};
use crate::errors::StageError;
use crate::media::DecodingImageValidator;
use crate::providers::{
    ImageProvider, Providers, SearchProvider, SlideRenderer, SlideSpec, Snippet, SpeechClip,
    SpeechSynthesizer, TextGenerator, VideoEncoder, VideoSegment,
};

/// What a matching rule does to a call.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Return this error.
    Fail(StageError),
    /// Return an empty result.
    Empty,
    /// Return candidates that will not validate (images only).
    Invalid,
    /// Sleep, then answer normally.
    Delay(Duration),
    /// Panic inside the provider.
    Panic,
}

#[derive(Debug)]
struct Rule {
    op: String,
    pattern: String,
    action: Scripted,
    remaining: Option<u32>,
}

/// Rules and call log shared by the fakes.
#[derive(Debug, Default)]
pub struct Script {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl Script {
    /// Adds a rule for calls to `op` whose input contains `pattern`.
    ///
    /// `times` limits how often the rule fires; `None` means always.
    pub fn on(&self, op: &str, pattern: &str, action: Scripted, times: Option<u32>) -> &Self {
        self.rules.lock().push(Rule {
            op: op.to_string(),
            pattern: pattern.to_string(),
            action,
            remaining: times,
        });
        self
    }

    /// Shorthand for an always-failing rule.
    pub fn fail(&self, op: &str, pattern: &str, error: StageError) -> &Self {
        self.on(op, pattern, Scripted::Fail(error), None)
    }

    /// Number of calls to `op`.
    #[must_use]
    pub fn calls(&self, op: &str) -> usize {
        self.calls.lock().iter().filter(|(o, _)| o == op).count()
    }

    /// Number of calls to `op` whose input contains `pattern`.
    #[must_use]
    pub fn calls_matching(&self, op: &str, pattern: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|(o, input)| o == op && input.contains(pattern))
            .count()
    }

    /// Total number of calls.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }

    /// Records the call and returns the action of the first live rule.
    fn take(&self, op: &str, input: &str) -> Option<Scripted> {
        self.calls.lock().push((op.to_string(), input.to_string()));
        let mut rules = self.rules.lock();
        let rule = rules.iter_mut().find(|r| {
            r.op == op && input.contains(&r.pattern) && r.remaining.map_or(true, |n| n > 0)
        })?;
        if let Some(n) = rule.remaining.as_mut() {
            *n -= 1;
        }
        Some(rule.action.clone())
    }

    /// Applies the script; `Ok(Some(action))` is left for the caller.
    async fn apply(&self, op: &str, input: &str) -> Result<Option<Scripted>, StageError> {
        match self.take(op, input) {
            Some(Scripted::Fail(error)) => Err(error),
            Some(Scripted::Delay(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(None)
            }
            Some(Scripted::Panic) => panic!("scripted panic in {op}"),
            other => Ok(other),
        }
    }
}

/// Search fake answering three snippets per query.
#[derive(Debug, Default)]
pub struct ScriptedSearch {
    script: Script,
}

impl ScriptedSearch {
    /// Creates the fake.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The rule set and call log (op `search`).
    #[must_use]
    pub fn script(&self) -> &Script {
        &self.script
    }
}

#[async_trait]
impl SearchProvider for ScriptedSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Snippet>, StageError> {
        if matches!(self.script.apply("search", query).await?, Some(Scripted::Empty)) {
            return Ok(Vec::new());
        }
        Ok((1..=3)
            .take(max_results)
            .map(|i| Snippet::new(format!("Headline {i}"), format!("Story about {query}")))
            .collect())
    }
}

/// Text generation fake (ops `summarize`, `narrate`, `keywords`, `intro`,
/// `outro`).
#[derive(Debug, Default)]
pub struct ScriptedText {
    script: Script,
}

impl ScriptedText {
    /// Creates the fake.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The rule set and call log.
    #[must_use]
    pub fn script(&self) -> &Script {
        &self.script
    }

    async fn answer(&self, op: &str, input: &str, default: String) -> Result<String, StageError> {
        match self.script.apply(op, input).await? {
            Some(Scripted::Empty) => Ok(String::new()),
            _ => Ok(default),
        }
    }
}

#[async_trait]
impl TextGenerator for ScriptedText {
    async fn summarize(&self, summary: &str) -> Result<String, StageError> {
        let first = summary.split_whitespace().take(4).collect::<Vec<_>>().join(" ");
        self.answer(
            "summarize",
            summary,
            format!("• {first}\n\n- Second point\n• Third point"),
        )
        .await
    }

    async fn narrate(&self, summary: &str, bullets: &[String]) -> Result<String, StageError> {
        let input = format!("{summary}\n{}", bullets.join("\n"));
        self.answer("narrate", &input, format!("Today: {}.", bullets.join(". ")))
            .await
    }

    async fn keywords(&self, summary: &str) -> Result<String, StageError> {
        self.answer("keywords", summary, "\"AI chip\", data center; robots".to_string())
            .await
    }

    async fn intro(&self, date: &str, topics: &[String]) -> Result<String, StageError> {
        let input = format!("{date}: {}", topics.join(", "));
        self.answer("intro", &input, format!("Welcome to the roundup for {input}."))
            .await
    }

    async fn outro(&self) -> Result<String, StageError> {
        self.answer("outro", "", "Thanks for listening, see you tomorrow.".to_string())
            .await
    }
}

/// Image fake returning one valid PNG candidate per call (op `images`).
#[derive(Debug, Default)]
pub struct ScriptedImages {
    script: Script,
}

impl ScriptedImages {
    /// Creates the fake.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The rule set and call log.
    #[must_use]
    pub fn script(&self) -> &Script {
        &self.script
    }
}

#[async_trait]
impl ImageProvider for ScriptedImages {
    async fn fetch_candidates(
        &self,
        keywords: &str,
        max_candidates: usize,
    ) -> Result<Vec<Vec<u8>>, StageError> {
        match self.script.apply("images", keywords).await? {
            Some(Scripted::Empty) => Ok(Vec::new()),
            Some(Scripted::Invalid) => Ok(vec![b"<html>blocked</html>".to_vec(), png_bytes(32, 32)]
                .into_iter()
                .take(max_candidates)
                .collect()),
            _ => {
                Ok(vec![tagged_png(200, 120, keywords.as_bytes())])
            }
        }
    }
}

/// Speech fake; duration is 500 ms plus 40 ms per word (op `speech`).
#[derive(Debug, Default)]
pub struct FakeSpeech {
    script: Script,
}

impl FakeSpeech {
    /// Creates the fake.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The rule set and call log.
    #[must_use]
    pub fn script(&self) -> &Script {
        &self.script
    }

    /// Duration reported for `text`.
    #[must_use]
    pub fn duration_for(text: &str) -> u64 {
        500 + 40 * text.split_whitespace().count() as u64
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSpeech {
    async fn synthesize(&self, text: &str) -> Result<SpeechClip, StageError> {
        self.script.apply("speech", text).await?;
        let mut audio = b"RIFF".to_vec();
        audio.extend_from_slice(text.as_bytes());
        Ok(SpeechClip {
            audio,
            duration_ms: Self::duration_for(text),
        })
    }
}

async fn write_output(path: &Path, bytes: &[u8]) -> Result<(), StageError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StageError::permanent(e.to_string()))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| StageError::permanent(e.to_string()))
}

/// Slide renderer fake that writes a PNG and records each slide
/// (op `slide`, matched against the slide title).
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    script: Script,
    slides: Mutex<Vec<(PathBuf, SlideSpec)>>,
}

impl RecordingRenderer {
    /// Creates the fake.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The rule set and call log.
    #[must_use]
    pub fn script(&self) -> &Script {
        &self.script
    }

    /// Slides rendered so far.
    #[must_use]
    pub fn slides(&self) -> Vec<(PathBuf, SlideSpec)> {
        self.slides.lock().clone()
    }
}

#[async_trait]
impl SlideRenderer for RecordingRenderer {
    async fn render_slide(&self, slide: &SlideSpec, output: &Path) -> Result<(), StageError> {
        self.script.apply("slide", &slide.title).await?;
        let bytes = tagged_png(64, 36, slide.title.as_bytes());
        write_output(output, &bytes).await?;
        self.slides.lock().push((output.to_path_buf(), slide.clone()));
        Ok(())
    }
}

/// Encoder fake (ops `stitch_audio`, `encode_video`).
#[derive(Debug, Default)]
pub struct RecordingEncoder {
    script: Script,
    stitched: Mutex<Vec<Vec<PathBuf>>>,
    encoded: Mutex<Vec<Vec<VideoSegment>>>,
}

impl RecordingEncoder {
    /// Creates the fake.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The rule set and call log.
    #[must_use]
    pub fn script(&self) -> &Script {
        &self.script
    }

    /// Clip lists passed to `stitch_audio`.
    #[must_use]
    pub fn stitched(&self) -> Vec<Vec<PathBuf>> {
        self.stitched.lock().clone()
    }

    /// Segment lists passed to `encode_video`.
    #[must_use]
    pub fn encoded(&self) -> Vec<Vec<VideoSegment>> {
        self.encoded.lock().clone()
    }
}

#[async_trait]
impl VideoEncoder for RecordingEncoder {
    async fn stitch_audio(&self, clips: &[PathBuf], output: &Path) -> Result<(), StageError> {
        self.script
            .apply("stitch_audio", &output.display().to_string())
            .await?;
        write_output(output, format!("RIFF {} clips", clips.len()).as_bytes()).await?;
        self.stitched.lock().push(clips.to_vec());
        Ok(())
    }

    async fn encode_video(
        &self,
        segments: &[VideoSegment],
        _audio_track: &Path,
        output: &Path,
    ) -> Result<(), StageError> {
        self.script
            .apply("encode_video", &output.display().to_string())
            .await?;
        write_output(output, format!("MP4 {} segments", segments.len()).as_bytes()).await?;
        self.encoded.lock().push(segments.to_vec());
        Ok(())
    }
}

/// Handles to every fake behind a [`Providers`] set.
#[derive(Debug, Clone, Default)]
pub struct FakeProviders {
    /// Search fake.
    pub search: Arc<ScriptedSearch>,
    /// Text fake.
    pub text: Arc<ScriptedText>,
    /// Image fake.
    pub images: Arc<ScriptedImages>,
    /// Speech fake.
    pub speech: Arc<FakeSpeech>,
    /// Slide fake.
    pub renderer: Arc<RecordingRenderer>,
    /// Encoder fake.
    pub encoder: Arc<RecordingEncoder>,
}

impl FakeProviders {
    /// Creates fresh fakes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A provider set backed by these fakes and the header validator.
    #[must_use]
    pub fn providers(&self) -> Providers {
        Providers {
            search: self.search.clone(),
            text: self.text.clone(),
            images: self.images.clone(),
            validator: Arc::new(DecodingImageValidator::new()),
            speech: self.speech.clone(),
            slides: self.renderer.clone(),
            video: self.encoder.clone(),
        }
    }

    /// Calls made to every provider together.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.search.script().total_calls()
            + self.text.script().total_calls()
            + self.images.script().total_calls()
            + self.speech.script().total_calls()
            + self.renderer.script().total_calls()
            + self.encoder.script().total_calls()
    }
}

impl Providers {
    /// A provider set of fresh, unscripted fakes.
    #[must_use]
    pub fn fake() -> Self {
        FakeProviders::new().providers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rule_fires_limited_times() {
        let search = ScriptedSearch::new();
        search
            .script()
            .on("search", "Beta", Scripted::Fail(StageError::transient("503")), Some(1));

        assert!(search.search("Beta news", 5).await.is_err());
        assert_eq!(search.search("Beta news", 5).await.unwrap().len(), 3);
        assert_eq!(search.search("Alpha news", 2).await.unwrap().len(), 2);
        assert_eq!(search.script().calls_matching("search", "Beta"), 2);
    }

    #[tokio::test]
    async fn test_text_empty_rule() {
        let text = ScriptedText::new();
        text.script().on("outro", "", Scripted::Empty, None);
        assert_eq!(text.outro().await.unwrap(), "");
        assert!(!text.intro("May 01, 2026", &["A".into()]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_renderer_writes_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = RecordingRenderer::new();
        let out = dir.path().join("slides/intro_slide.png");

        renderer
            .render_slide(&SlideSpec::title("Hello", "World"), &out)
            .await
            .unwrap();

        assert!(out.exists());
        assert_eq!(renderer.slides()[0].1.title, "Hello");
    }
}
