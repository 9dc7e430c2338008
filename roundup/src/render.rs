//! Rendering through an external program.
//!
//! Every job is written as JSON next to its target, then the configured
//! program is run as `program [args..] <job.json> <output>`. The program must
//! exit with status 0 and leave the output file in place. A job whose future
//! is dropped (an attempt timing out) kills its process.

use async_trait::async_trait;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::errors::StageError;
use crate::providers::{SlideRenderer, SlideSpec, VideoEncoder, VideoSegment};

/// Slide renderer and video encoder backed by a subprocess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRenderer {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandRenderer {
    /// Creates a renderer running `program`.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Sets arguments placed before the job and output paths.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    fn job_path(output: &Path) -> PathBuf {
        let mut job = output.as_os_str().to_owned();
        job.push(".job.json");
        PathBuf::from(job)
    }

    async fn run_job(&self, job: serde_json::Value, output: &Path) -> Result<(), StageError> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StageError::permanent(format!("create {}: {e}", parent.display())))?;
        }
        let body = serde_json::to_vec_pretty(&job)
            .map_err(|e| StageError::permanent(format!("encode render job: {e}")))?;
        let job_file = JobFile(Self::job_path(output));
        let job_path = job_file.0.as_path();
        tokio::fs::write(job_path, body)
            .await
            .map_err(|e| StageError::permanent(format!("write {}: {e}", job_path.display())))?;

        tracing::debug!(
            program = %self.program.display(),
            job = %job_path.display(),
            output = %output.display(),
            "Running render job"
        );
        let result = Command::new(&self.program)
            .args(&self.args)
            .arg(job_path)
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await;
        drop(job_file);

        let result = result.map_err(|e| {
            StageError::permanent(format!("failed to start {}: {e}", self.program.display()))
        })?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(StageError::permanent(format!(
                "{} exited with {}: {}",
                self.program.display(),
                result.status,
                stderr.trim()
            )));
        }
        if tokio::fs::metadata(output).await.is_err() {
            return Err(StageError::permanent(format!(
                "{} produced no output at {}",
                self.program.display(),
                output.display()
            )));
        }
        Ok(())
    }
}

/// Job description on disk, removed when the job ends or its attempt is
/// dropped.
struct JobFile(PathBuf);

impl Drop for JobFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(job = %self.0.display(), error = %e, "Failed to remove render job");
            }
        }
    }
}

#[async_trait]
impl SlideRenderer for CommandRenderer {
    async fn render_slide(&self, slide: &SlideSpec, output: &Path) -> Result<(), StageError> {
        self.run_job(json!({ "job": "slide", "slide": slide }), output)
            .await
    }
}

#[async_trait]
impl VideoEncoder for CommandRenderer {
    async fn stitch_audio(&self, clips: &[PathBuf], output: &Path) -> Result<(), StageError> {
        self.run_job(json!({ "job": "stitch_audio", "clips": clips }), output)
            .await
    }

    async fn encode_video(
        &self,
        segments: &[VideoSegment],
        audio_track: &Path,
        output: &Path,
    ) -> Result<(), StageError> {
        self.run_job(
            json!({
                "job": "encode_video",
                "segments": segments,
                "audio_track": audio_track,
            }),
            output,
        )
        .await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::errors::ErrorClass;

    fn copy_job_renderer() -> CommandRenderer {
        CommandRenderer::new("sh").with_args(["-c", "cp \"$1\" \"$2\"", "render"])
    }

    #[tokio::test]
    async fn test_render_slide_runs_program() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("slides/topic_01_slide.png");

        copy_job_renderer()
            .render_slide(&SlideSpec::topic("OpenAI", vec!["a".into()], None), &output)
            .await
            .unwrap();

        let job: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&output).unwrap()).unwrap();
        assert_eq!(job["job"], "slide");
        assert_eq!(job["slide"]["title"], "OpenAI");
        assert!(!CommandRenderer::job_path(&output).exists());
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_permanent_with_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = CommandRenderer::new("sh").with_args(["-c", "echo boom >&2; exit 3", "render"]);

        let err = renderer
            .stitch_audio(&[], &dir.path().join("final/audio-track.wav"))
            .await
            .unwrap_err();

        assert_eq!(err.class, ErrorClass::Permanent);
        assert!(err.message.contains("boom"));
    }

    #[tokio::test]
    async fn test_missing_output_is_permanent() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = CommandRenderer::new("sh").with_args(["-c", "true", "render"]);

        let err = renderer
            .encode_video(&[], Path::new("a.wav"), &dir.path().join("final/video.mp4"))
            .await
            .unwrap_err();
        assert!(err.message.contains("no output"));
    }

    #[tokio::test]
    async fn test_timed_out_job_is_killed_and_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("slides/topic_01_slide.png");
        let renderer =
            CommandRenderer::new("sh").with_args(["-c", "sleep 0.4; echo late > \"$2\"", "render"]);

        let attempt = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            renderer.render_slide(&SlideSpec::title("t", "s"), &output),
        )
        .await;

        assert!(attempt.is_err());
        assert!(!CommandRenderer::job_path(&output).exists());
        tokio::time::sleep(std::time::Duration::from_millis(700)).await;
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_missing_program_is_permanent() {
        let dir = tempfile::tempdir().unwrap();
        let err = CommandRenderer::new("/nonexistent/renderer")
            .render_slide(&SlideSpec::title("t", "s"), &dir.path().join("x.png"))
            .await
            .unwrap_err();
        assert_eq!(err.class, ErrorClass::Permanent);
    }
}
