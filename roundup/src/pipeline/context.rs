//! State shared by every job of one run.

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::RunConfig;
use crate::core::ArtifactKey;
use crate::errors::StoreError;
use crate::events::EventSink;
use crate::executor::StageExecutor;
use crate::providers::Providers;
use crate::search::QueryPlanner;
use crate::store::{ArtifactStore, ManifestEntry};
use crate::utils::display_date;

/// Read-only run inputs plus the two shared mutable pieces: the manifest
/// (inside the store) and the cancellation token (inside the executor).
pub struct RunContext {
    /// Immutable run configuration.
    pub config: RunConfig,
    /// Artifact files and manifest.
    pub store: ArtifactStore,
    /// Stage executor bound to the run policy.
    pub executor: StageExecutor,
    /// External providers.
    pub providers: Providers,
    /// Query planner.
    pub planner: QueryPlanner,
    /// Event sink.
    pub sink: Arc<dyn EventSink>,
    /// Date the roundup is for.
    pub run_date: NaiveDate,
}

impl RunContext {
    /// The run date as spoken and shown on slides.
    #[must_use]
    pub fn date_label(&self) -> String {
        display_date(self.run_date)
    }

    /// Returns true once the run has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.executor.cancellation().is_cancelled()
    }

    /// Loads a JSON artifact whose manifest entry resolves.
    pub(crate) async fn resume_json<T: DeserializeOwned>(
        &self,
        key: &ArtifactKey,
    ) -> Option<(ManifestEntry, T)> {
        let entry = self.store.resolve(key).await?;
        let bytes = self.store.read(key).await.ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some((entry, value)),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Stored artifact unreadable, rerunning stage");
                None
            }
        }
    }

    /// Serializes and stores a JSON artifact.
    pub(crate) async fn write_json<T: Serialize>(
        &self,
        key: &ArtifactKey,
        value: &T,
    ) -> Result<(PathBuf, String), StoreError> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|e| StoreError::Write {
            key: key.to_string(),
            source: std::io::Error::other(e),
        })?;
        self.store.write(key, &bytes).await
    }

    /// Reports a stage satisfied from the manifest.
    pub(crate) fn emit_resumed(&self, key: &ArtifactKey) {
        tracing::info!(key = %key, "Stage resumed from manifest");
        self.sink
            .try_emit("stage.resumed", Some(json!({ "key": key.to_string() })));
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("output_dir", &self.config.output_dir)
            .field("run_date", &self.run_date)
            .finish_non_exhaustive()
    }
}
