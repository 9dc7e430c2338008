//! The run manifest: ordered artifact key to (location, outcome).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::core::{ArtifactKey, Outcome, Slot, TopicState};
use crate::errors::{StageError, StoreError};
use crate::utils::{now_utc, Timestamp};

/// One recorded stage outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Artifact key.
    pub key: ArtifactKey,
    /// Location relative to the output root; `None` when nothing was stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Stage outcome.
    pub outcome: Outcome,
    /// Attempts made.
    pub attempts: u32,
    /// SHA-256 of the stored bytes (hex).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    /// Media duration, for audio artifacts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Topic state the transition led to, for topic stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<TopicState>,
    /// When the entry was recorded.
    pub recorded_at: Timestamp,
}

impl ManifestEntry {
    /// A successful stage with a stored artifact.
    #[must_use]
    pub fn success(key: ArtifactKey, path: PathBuf, sha256: String, attempts: u32) -> Self {
        Self {
            key,
            path: Some(path),
            outcome: Outcome::Success,
            attempts,
            sha256: Some(sha256),
            duration_ms: None,
            state: None,
            recorded_at: now_utc(),
        }
    }

    /// A deliberately absent artifact.
    #[must_use]
    pub fn skipped(key: ArtifactKey, reason: impl Into<String>, attempts: u32) -> Self {
        Self {
            key,
            path: None,
            outcome: Outcome::Skipped {
                reason: reason.into(),
            },
            attempts,
            sha256: None,
            duration_ms: None,
            state: None,
            recorded_at: now_utc(),
        }
    }

    /// A failed stage.
    #[must_use]
    pub fn failed(key: ArtifactKey, error: StageError, attempts: u32) -> Self {
        Self {
            key,
            path: None,
            outcome: Outcome::Failed { error },
            attempts,
            sha256: None,
            duration_ms: None,
            state: None,
            recorded_at: now_utc(),
        }
    }

    /// Attaches a stored file to a skipped entry (fallback text).
    #[must_use]
    pub fn with_file(mut self, path: PathBuf, sha256: String) -> Self {
        self.path = Some(path);
        self.sha256 = Some(sha256);
        self
    }

    /// Sets the media duration.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Sets the topic state reached.
    #[must_use]
    pub fn with_state(mut self, state: TopicState) -> Self {
        self.state = Some(state);
        self
    }

    /// Returns true for success entries.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

/// On-disk form of the manifest.
#[derive(Debug, Serialize, Deserialize)]
struct ManifestFile {
    run_id: Uuid,
    started_at: Timestamp,
    entries: Vec<ManifestEntry>,
}

/// Ordered key → entry map for one run.
///
/// Keys are unique; recording a key again replaces the earlier entry, which
/// is how a rerun overwrites an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    run_id: Uuid,
    started_at: Timestamp,
    entries: BTreeMap<ArtifactKey, ManifestEntry>,
}

impl Manifest {
    /// Creates an empty manifest.
    #[must_use]
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            started_at: now_utc(),
            entries: BTreeMap::new(),
        }
    }

    /// The run that owns this manifest.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// When the run started.
    #[must_use]
    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    /// Records an entry, returning the one it replaced.
    pub fn record(&mut self, entry: ManifestEntry) -> Option<ManifestEntry> {
        self.entries.insert(entry.key, entry)
    }

    /// Removes an entry, returning it.
    pub fn remove(&mut self, key: &ArtifactKey) -> Option<ManifestEntry> {
        self.entries.remove(key)
    }

    /// Looks up an entry.
    #[must_use]
    pub fn get(&self, key: &ArtifactKey) -> Option<&ManifestEntry> {
        self.entries.get(key)
    }

    /// Entries in key order (slot, then stage, then sequence).
    pub fn entries(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.values()
    }

    /// Entries belonging to one slot.
    pub fn entries_for(&self, slot: Slot) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.values().filter(move |e| e.key.slot == slot)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adopts a previous run's entries under a new run id.
    #[must_use]
    pub fn resumed_as(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    /// Serializes to pretty JSON.
    pub fn to_json_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        let file = ManifestFile {
            run_id: self.run_id,
            started_at: self.started_at,
            entries: self.entries.values().cloned().collect(),
        };
        serde_json::to_vec_pretty(&file)
    }

    /// Parses a manifest read from `path`.
    pub fn from_json_slice(bytes: &[u8], path: &Path) -> Result<Self, StoreError> {
        let file: ManifestFile =
            serde_json::from_slice(bytes).map_err(|e| StoreError::CorruptManifest {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        let mut entries = BTreeMap::new();
        for entry in file.entries {
            if entries.insert(entry.key, entry).is_some() {
                return Err(StoreError::CorruptManifest {
                    path: path.to_path_buf(),
                    reason: "duplicate artifact key".to_string(),
                });
            }
        }
        Ok(Self {
            run_id: file.run_id,
            started_at: file.started_at,
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageName;
    use pretty_assertions::assert_eq;

    fn key(stage: StageName, slot: Slot) -> ArtifactKey {
        ArtifactKey::new(stage, slot)
    }

    #[test]
    fn test_entries_are_ordered_by_slot_then_stage() {
        let mut manifest = Manifest::new(Uuid::new_v4());
        manifest.record(ManifestEntry::skipped(key(StageName::Speech, Slot::Outro), "x", 0));
        manifest.record(ManifestEntry::skipped(key(StageName::Slide, Slot::Topic(2)), "x", 0));
        manifest.record(ManifestEntry::skipped(key(StageName::Search, Slot::Topic(2)), "x", 0));
        manifest.record(ManifestEntry::skipped(key(StageName::Speech, Slot::Intro), "x", 0));
        manifest.record(ManifestEntry::skipped(key(StageName::Search, Slot::Topic(1)), "x", 0));

        let order: Vec<String> = manifest.entries().map(|e| e.key.to_string()).collect();
        assert_eq!(
            order,
            vec![
                "speech:intro:0",
                "search:topic_01:0",
                "search:topic_02:0",
                "slide:topic_02:0",
                "speech:outro:0",
            ]
        );
    }

    #[test]
    fn test_record_replaces_same_key() {
        let mut manifest = Manifest::new(Uuid::new_v4());
        let k = key(StageName::Image, Slot::Topic(1));
        assert!(manifest
            .record(ManifestEntry::failed(k, StageError::transient("503"), 3))
            .is_none());
        let replaced = manifest.record(ManifestEntry::success(
            k,
            PathBuf::from("images/topic_01.jpg"),
            "ab".to_string(),
            1,
        ));

        assert!(replaced.is_some());
        assert_eq!(manifest.len(), 1);
        assert!(manifest.get(&k).unwrap().is_success());
    }

    #[test]
    fn test_json_roundtrip_preserves_entries() {
        let mut manifest = Manifest::new(Uuid::new_v4());
        manifest.record(
            ManifestEntry::success(
                key(StageName::Speech, Slot::Topic(1)),
                PathBuf::from("audio/topic_01.wav"),
                "00ff".to_string(),
                2,
            )
            .with_duration_ms(1500)
            .with_state(TopicState::Synthesizing),
        );

        let bytes = manifest.to_json_vec().unwrap();
        let parsed = Manifest::from_json_slice(&bytes, Path::new("manifest.json")).unwrap();
        assert_eq!(parsed, manifest);
    }

    #[test]
    fn test_corrupt_manifest_is_reported() {
        let err = Manifest::from_json_slice(b"{not json", Path::new("m.json")).unwrap_err();
        assert!(matches!(err, StoreError::CorruptManifest { .. }));
    }
}
