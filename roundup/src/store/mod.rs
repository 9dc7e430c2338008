//! Artifact storage: positional naming plus the persisted manifest.
//!
//! The manifest is the single source of truth for assembly and resume. It is
//! rewritten atomically (temp file, then rename) after every record so a
//! crashed run leaves a readable manifest behind.

mod layout;
mod manifest;

pub use layout::{OutputLayout, MANIFEST_FILE, PREVIOUS_MANIFEST_FILE};
pub use manifest::{Manifest, ManifestEntry};

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::core::ArtifactKey;
use crate::errors::StoreError;

/// How an output root is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Start a new manifest; the previous one is replaced.
    #[default]
    Fresh,
    /// Start a new manifest, moving the previous one to
    /// `manifest.previous.json`.
    KeepPrevious,
    /// Continue from the existing manifest if there is one.
    Resume,
}

/// Returns the hex SHA-256 digest of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await
}

/// Deterministically named artifact files plus the run manifest.
///
/// Safe for concurrent use: manifest updates and their persistence happen
/// under one lock, so concurrent records never interleave on disk.
#[derive(Debug)]
pub struct ArtifactStore {
    layout: OutputLayout,
    manifest: Mutex<Manifest>,
}

impl ArtifactStore {
    /// Opens `root` for the run `run_id`.
    ///
    /// # Errors
    ///
    /// Fails if the root cannot be created, or if resuming from a manifest
    /// that cannot be parsed.
    pub async fn open(
        root: impl Into<PathBuf>,
        run_id: Uuid,
        mode: OpenMode,
    ) -> Result<Self, StoreError> {
        let layout = OutputLayout::new(root);
        let manifest_path = layout.manifest_path();
        tokio::fs::create_dir_all(layout.root())
            .await
            .map_err(|source| StoreError::Write {
                key: layout.root().display().to_string(),
                source,
            })?;

        let existing = match tokio::fs::read(&manifest_path).await {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(source) => {
                return Err(StoreError::Read {
                    key: MANIFEST_FILE.to_string(),
                    source,
                })
            }
        };

        let manifest = match (mode, existing) {
            (OpenMode::Resume, Some(bytes)) => {
                let previous = Manifest::from_json_slice(&bytes, &manifest_path)?;
                tracing::info!(
                    root = %layout.root().display(),
                    previous_run = %previous.run_id(),
                    entries = previous.len(),
                    "Resuming from existing manifest"
                );
                previous.resumed_as(run_id)
            }
            (OpenMode::KeepPrevious, Some(_)) => {
                tokio::fs::rename(&manifest_path, layout.previous_manifest_path())
                    .await
                    .map_err(|source| StoreError::Write {
                        key: PREVIOUS_MANIFEST_FILE.to_string(),
                        source,
                    })?;
                Manifest::new(run_id)
            }
            _ => Manifest::new(run_id),
        };

        let store = Self {
            layout,
            manifest: Mutex::new(manifest),
        };
        {
            let manifest = store.manifest.lock().await;
            store.persist(&manifest).await?;
        }
        Ok(store)
    }

    /// The output root.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    /// The output layout.
    #[must_use]
    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Absolute location for `key`; computable before the stage runs.
    #[must_use]
    pub fn path_for(&self, key: &ArtifactKey) -> PathBuf {
        self.layout.path_for(key)
    }

    /// Writes the bytes for `key` atomically, replacing any earlier file.
    ///
    /// Returns the relative path and SHA-256 of the stored bytes.
    pub async fn write(&self, key: &ArtifactKey, bytes: &[u8]) -> Result<(PathBuf, String), StoreError> {
        let relative = OutputLayout::relative_path(key);
        write_atomic(&self.layout.root().join(&relative), bytes)
            .await
            .map_err(|source| StoreError::Write {
                key: key.to_string(),
                source,
            })?;
        Ok((relative, sha256_hex(bytes)))
    }

    /// Hashes a file a provider wrote directly at `path_for(key)`.
    ///
    /// Returns the relative path and SHA-256, as [`ArtifactStore::write`].
    pub async fn adopt(&self, key: &ArtifactKey) -> Result<(PathBuf, String), StoreError> {
        let bytes = self.read(key).await?;
        Ok((OutputLayout::relative_path(key), sha256_hex(&bytes)))
    }

    /// Removes the file for `key`, if present.
    pub async fn discard(&self, key: &ArtifactKey) {
        if let Err(e) = tokio::fs::remove_file(self.path_for(key)).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(key = %key, error = %e, "Failed to remove artifact");
            }
        }
    }

    /// Reads the stored bytes for `key`.
    pub async fn read(&self, key: &ArtifactKey) -> Result<Vec<u8>, StoreError> {
        tokio::fs::read(self.path_for(key))
            .await
            .map_err(|source| StoreError::Read {
                key: key.to_string(),
                source,
            })
    }

    /// Records an entry and persists the manifest.
    pub async fn record(&self, entry: ManifestEntry) -> Result<(), StoreError> {
        let mut manifest = self.manifest.lock().await;
        let key = entry.key;
        if manifest.record(entry).is_some() {
            tracing::debug!(key = %key, "Manifest entry replaced");
        }
        self.persist(&manifest).await
    }

    /// Drops the entries for `keys` along with their files, persisting the
    /// manifest once. Returns how many entries were removed.
    pub async fn retract(&self, keys: &[ArtifactKey]) -> Result<usize, StoreError> {
        let mut manifest = self.manifest.lock().await;
        let mut removed = 0;
        for key in keys {
            if manifest.remove(key).is_some() {
                tracing::debug!(key = %key, "Manifest entry retracted");
                removed += 1;
            }
            self.discard(key).await;
        }
        if removed > 0 {
            self.persist(&manifest).await?;
        }
        Ok(removed)
    }

    /// Returns the entry for `key`, if recorded.
    pub async fn lookup(&self, key: &ArtifactKey) -> Option<ManifestEntry> {
        self.manifest.lock().await.get(key).cloned()
    }

    /// Returns the entry for `key` if a later stage may rely on it.
    ///
    /// An entry resolves when its outcome is settled and, if it names a file,
    /// that file exists with the recorded digest.
    pub async fn resolve(&self, key: &ArtifactKey) -> Option<ManifestEntry> {
        let entry = self.lookup(key).await?;
        if !entry.outcome.is_settled() {
            return None;
        }
        if let Some(path) = &entry.path {
            let bytes = tokio::fs::read(self.layout.root().join(path)).await.ok()?;
            if entry.sha256.as_deref() != Some(sha256_hex(&bytes).as_str()) {
                tracing::warn!(key = %key, "Stored artifact does not match manifest digest");
                return None;
            }
        }
        Some(entry)
    }

    /// A copy of the manifest as it stands.
    pub async fn snapshot(&self) -> Manifest {
        self.manifest.lock().await.clone()
    }

    async fn persist(&self, manifest: &Manifest) -> Result<(), StoreError> {
        let bytes = manifest.to_json_vec().map_err(|e| StoreError::Write {
            key: MANIFEST_FILE.to_string(),
            source: std::io::Error::other(e),
        })?;
        write_atomic(&self.layout.manifest_path(), &bytes)
            .await
            .map_err(|source| StoreError::Write {
                key: MANIFEST_FILE.to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Outcome, Slot, StageName};
    use crate::errors::StageError;
    use std::sync::Arc;

    fn key(stage: StageName, n: usize) -> ArtifactKey {
        ArtifactKey::new(stage, Slot::Topic(n))
    }

    async fn stored(store: &ArtifactStore, key: ArtifactKey, bytes: &[u8]) {
        let (path, sha) = store.write(&key, bytes).await.unwrap();
        store
            .record(ManifestEntry::success(key, path, sha, 1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_write_and_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path(), Uuid::new_v4(), OpenMode::Fresh)
            .await
            .unwrap();
        let k = key(StageName::Speech, 1);

        stored(&store, k, b"RIFF....").await;

        assert!(dir.path().join("audio/topic_01.wav").exists());
        assert!(store.resolve(&k).await.is_some());
        assert_eq!(store.read(&k).await.unwrap(), b"RIFF....");
    }

    #[tokio::test]
    async fn test_tampered_file_does_not_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path(), Uuid::new_v4(), OpenMode::Fresh)
            .await
            .unwrap();
        let k = key(StageName::Search, 2);
        stored(&store, k, b"{}").await;

        std::fs::write(store.path_for(&k), b"changed").unwrap();
        assert!(store.resolve(&k).await.is_none());

        std::fs::remove_file(store.path_for(&k)).unwrap();
        assert!(store.resolve(&k).await.is_none());
    }

    #[tokio::test]
    async fn test_failed_entry_does_not_resolve_but_skipped_does() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path(), Uuid::new_v4(), OpenMode::Fresh)
            .await
            .unwrap();
        let failed = key(StageName::Speech, 1);
        let skipped = key(StageName::Image, 1);

        store
            .record(ManifestEntry::failed(failed, StageError::permanent("401"), 1))
            .await
            .unwrap();
        store
            .record(ManifestEntry::skipped(skipped, "no valid image", 3))
            .await
            .unwrap();

        assert!(store.lookup(&failed).await.is_some());
        assert!(store.resolve(&failed).await.is_none());
        let entry = store.resolve(&skipped).await.unwrap();
        assert!(matches!(entry.outcome, Outcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_retract_removes_entries_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path(), Uuid::new_v4(), OpenMode::Fresh)
            .await
            .unwrap();
        let speech = key(StageName::Speech, 1);
        let slide = key(StageName::Slide, 1);
        let kept = key(StageName::Search, 1);
        stored(&store, kept, b"{}").await;
        stored(&store, speech, b"RIFF").await;

        let removed = store.retract(&[speech, slide]).await.unwrap();

        assert_eq!(removed, 1);
        assert!(store.lookup(&speech).await.is_none());
        assert!(!store.path_for(&speech).exists());
        assert!(store.resolve(&kept).await.is_some());
        let persisted = Manifest::from_json_slice(
            &std::fs::read(dir.path().join(MANIFEST_FILE)).unwrap(),
            dir.path(),
        )
        .unwrap();
        assert_eq!(persisted.len(), 1);
    }

    #[tokio::test]
    async fn test_resume_reloads_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let k = key(StageName::Search, 1);
        {
            let store = ArtifactStore::open(dir.path(), Uuid::new_v4(), OpenMode::Fresh)
                .await
                .unwrap();
            stored(&store, k, b"[]").await;
        }

        let run_id = Uuid::new_v4();
        let resumed = ArtifactStore::open(dir.path(), run_id, OpenMode::Resume)
            .await
            .unwrap();
        assert!(resumed.resolve(&k).await.is_some());
        assert_eq!(resumed.snapshot().await.run_id(), run_id);

        let fresh = ArtifactStore::open(dir.path(), Uuid::new_v4(), OpenMode::Fresh)
            .await
            .unwrap();
        assert!(fresh.lookup(&k).await.is_none());
    }

    #[tokio::test]
    async fn test_keep_previous_manifest() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = ArtifactStore::open(dir.path(), Uuid::new_v4(), OpenMode::Fresh)
                .await
                .unwrap();
            stored(&store, key(StageName::Search, 1), b"[]").await;
        }

        let store = ArtifactStore::open(dir.path(), Uuid::new_v4(), OpenMode::KeepPrevious)
            .await
            .unwrap();
        assert!(store.snapshot().await.is_empty());
        assert!(dir.path().join(PREVIOUS_MANIFEST_FILE).exists());
    }

    #[tokio::test]
    async fn test_concurrent_records_have_unique_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            ArtifactStore::open(dir.path(), Uuid::new_v4(), OpenMode::Fresh)
                .await
                .unwrap(),
        );

        let mut handles = Vec::new();
        for n in 1..=8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                stored(&store, key(StageName::Search, n), format!("{n}").as_bytes()).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let raw = std::fs::read(dir.path().join(MANIFEST_FILE)).unwrap();
        let manifest = Manifest::from_json_slice(&raw, Path::new(MANIFEST_FILE)).unwrap();
        assert_eq!(manifest.len(), 8);
    }

    #[tokio::test]
    async fn test_corrupt_manifest_on_resume() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), b"garbage").unwrap();
        let err = ArtifactStore::open(dir.path(), Uuid::new_v4(), OpenMode::Resume)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::CorruptManifest { .. }));
    }
}
