//! The job store: the ordered list of intake items and their lifecycle.
//!
//! Each [`IntakeItem`] moves through a small state machine:
//!
//! ```text
//!            ┌──────────── retry ────────────┐
//!            ▼                               │
//! Pending ──▶ Converting ──▶ Completed       │
//!                  │                         │
//!                  └───────▶ Failed ─────────┘
//! ```
//!
//! [`JobStore::set_status`] is the only way to move an item and it rejects
//! anything outside this table, so `result().is_some()` holds exactly when
//! the status is `Completed`. The store never suspends; the orchestrator
//! shares it behind a [`SharedStore`] and only holds the lock between awaits.

use crate::config::OutputFormat;
use crate::error::{IntakeError, ItemFailure, TransitionError};
use crate::handle::DownloadHandle;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;
use uuid::Uuid;

/// Job store shared between the orchestrator and any front end.
pub type SharedStore = Arc<Mutex<JobStore>>;

/// Lock a shared store, recovering the data if a previous holder panicked.
pub fn lock(store: &SharedStore) -> MutexGuard<'_, JobStore> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Identifiers and status ───────────────────────────────────────────────

/// Stable identifier of an intake item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(Uuid);

impl ItemId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of an intake item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Converting,
    Completed,
    Failed,
}

impl ItemStatus {
    /// Whether the state machine allows `self -> next`.
    pub fn can_transition_to(self, next: ItemStatus) -> bool {
        use ItemStatus::*;
        matches!(
            (self, next),
            (Pending, Converting)
                | (Failed, Converting)
                | (Converting, Completed)
                | (Converting, Failed)
        )
    }

    /// Pending and Failed items are picked up by "convert all".
    pub fn is_eligible(self) -> bool {
        matches!(self, ItemStatus::Pending | ItemStatus::Failed)
    }
}

// ── Source files ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum SourceContent {
    Path(PathBuf),
    Memory(Arc<[u8]>),
}

/// A raw file handle as delivered by the intake surface.
///
/// Content is read lazily, when the item is converted.
#[derive(Debug, Clone)]
pub struct SourceFile {
    name: String,
    media_type: Option<String>,
    size: Option<u64>,
    content: SourceContent,
}

impl SourceFile {
    /// A file on disk. Name is the final path component.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            name,
            media_type: None,
            size: None,
            content: SourceContent::Path(path),
        }
    }

    /// An in-memory file.
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let bytes: Vec<u8> = bytes.into();
        Self {
            name: name.into(),
            media_type: None,
            size: Some(bytes.len() as u64),
            content: SourceContent::Memory(bytes.into()),
        }
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }

    /// Declared size in bytes, if known before reading.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Location on disk, for path-backed sources.
    pub fn path(&self) -> Option<&Path> {
        match &self.content {
            SourceContent::Path(p) => Some(p),
            SourceContent::Memory(_) => None,
        }
    }

    /// Read the full content.
    pub async fn read_all(&self) -> Result<Vec<u8>, IntakeError> {
        match &self.content {
            SourceContent::Path(p) => tokio::fs::read(p)
                .await
                .map_err(|e| IntakeError::from_io(p, &e)),
            SourceContent::Memory(bytes) => Ok(bytes.to_vec()),
        }
    }
}

// ── Converted artifacts ──────────────────────────────────────────────────

/// The output of a successful conversion. Owns its bytes and download handle;
/// dropping the artifact releases the handle.
#[derive(Debug)]
pub struct ConvertedArtifact {
    id: Uuid,
    derived_name: String,
    format: OutputFormat,
    bytes: Vec<u8>,
    handle: DownloadHandle,
}

impl ConvertedArtifact {
    pub fn new(
        derived_name: impl Into<String>,
        format: OutputFormat,
        bytes: Vec<u8>,
        handle: DownloadHandle,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            derived_name: derived_name.into(),
            format,
            bytes,
            handle,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn derived_name(&self) -> &str {
        &self.derived_name
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn handle(&self) -> &DownloadHandle {
        &self.handle
    }
}

// ── Items ────────────────────────────────────────────────────────────────

/// One user-supplied file and its conversion state.
#[derive(Debug)]
pub struct IntakeItem {
    id: ItemId,
    source: SourceFile,
    status: ItemStatus,
    result: Option<ConvertedArtifact>,
    failure: Option<ItemFailure>,
}

impl IntakeItem {
    fn new(source: SourceFile) -> Self {
        Self {
            id: ItemId::new(),
            source,
            status: ItemStatus::Pending,
            result: None,
            failure: None,
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn source(&self) -> &SourceFile {
        &self.source
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    pub fn status(&self) -> ItemStatus {
        self.status
    }

    /// Present iff `status() == Completed`.
    pub fn result(&self) -> Option<&ConvertedArtifact> {
        self.result.as_ref()
    }

    /// The reason for the most recent failure, while the item is `Failed`.
    pub fn failure(&self) -> Option<&ItemFailure> {
        self.failure.as_ref()
    }
}

/// Item counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub total: usize,
    pub pending: usize,
    pub converting: usize,
    pub completed: usize,
    pub failed: usize,
}

// ── Store ────────────────────────────────────────────────────────────────

/// Ordered collection of intake items.
#[derive(Debug, Default)]
pub struct JobStore {
    items: Vec<IntakeItem>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap the store for sharing with an orchestrator.
    pub fn into_shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    /// Append one `Pending` item per file, in input order.
    pub fn add_items<I>(&mut self, files: I) -> Vec<ItemId>
    where
        I: IntoIterator<Item = SourceFile>,
    {
        let start = self.items.len();
        self.items.extend(files.into_iter().map(IntakeItem::new));
        let added: Vec<ItemId> = self.items[start..].iter().map(|i| i.id).collect();
        debug!("Added {} items ({} total)", added.len(), self.items.len());
        added
    }

    /// Delete the item if present, releasing its download handle.
    /// Returns whether anything was removed.
    pub fn remove_item(&mut self, id: ItemId) -> bool {
        match self.position(id) {
            Some(pos) => {
                let item = self.items.remove(pos);
                debug!("Removed {} ({})", item.source_name(), id);
                true
            }
            None => false,
        }
    }

    /// Delete every item, releasing every download handle.
    pub fn clear_all(&mut self) -> usize {
        let n = self.items.len();
        self.items.clear();
        debug!("Cleared {} items", n);
        n
    }

    /// Apply a status transition.
    ///
    /// `result` must be `Some` exactly when `status` is `Completed`. On
    /// rejection the store is unchanged and any supplied result is dropped.
    pub fn set_status(
        &mut self,
        id: ItemId,
        status: ItemStatus,
        result: Option<ConvertedArtifact>,
    ) -> Result<(), TransitionError> {
        let item = self
            .items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or(TransitionError::UnknownItem { id })?;

        if !item.status.can_transition_to(status) {
            return Err(TransitionError::Illegal {
                id,
                from: item.status,
                to: status,
            });
        }
        if result.is_some() != (status == ItemStatus::Completed) {
            return Err(TransitionError::ResultMismatch { id, status });
        }

        item.status = status;
        item.result = result;
        item.failure = None;
        Ok(())
    }

    /// Move a `Converting` item to `Failed` and remember why.
    pub fn mark_failed(&mut self, id: ItemId, failure: ItemFailure) -> Result<(), TransitionError> {
        self.set_status(id, ItemStatus::Failed, None)?;
        if let Some(item) = self.items.iter_mut().find(|i| i.id == id) {
            item.failure = Some(failure);
        }
        Ok(())
    }

    pub fn get(&self, id: ItemId) -> Option<&IntakeItem> {
        self.items.iter().find(|i| i.id == id)
    }

    /// Items in store order.
    pub fn iter(&self) -> impl Iterator<Item = &IntakeItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Ids of items whose status is in `statuses`, in store order.
    pub fn ids_with_status(&self, statuses: &[ItemStatus]) -> Vec<ItemId> {
        self.items
            .iter()
            .filter(|i| statuses.contains(&i.status))
            .map(|i| i.id)
            .collect()
    }

    /// Whether any item is still `Pending`.
    pub fn has_pending(&self) -> bool {
        self.items.iter().any(|i| i.status == ItemStatus::Pending)
    }

    /// Artifacts of all `Completed` items, in store order.
    pub fn completed_artifacts(&self) -> impl Iterator<Item = &ConvertedArtifact> {
        self.items.iter().filter_map(|i| i.result.as_ref())
    }

    pub fn counts(&self) -> StoreCounts {
        let mut c = StoreCounts {
            total: self.items.len(),
            ..StoreCounts::default()
        };
        for item in &self.items {
            match item.status {
                ItemStatus::Pending => c.pending += 1,
                ItemStatus::Converting => c.converting += 1,
                ItemStatus::Completed => c.completed += 1,
                ItemStatus::Failed => c.failed += 1,
            }
        }
        c
    }

    fn position(&self, id: ItemId) -> Option<usize> {
        self.items.iter().position(|i| i.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;
    use crate::handle::HandleRegistry;

    fn files(names: &[&str]) -> Vec<SourceFile> {
        names
            .iter()
            .map(|n| SourceFile::from_bytes(*n, b"payload".to_vec()))
            .collect()
    }

    fn artifact(reg: &HandleRegistry, name: &str) -> ConvertedArtifact {
        ConvertedArtifact::new(name, OutputFormat::Jpeg, vec![0xFF, 0xD8], reg.issue())
    }

    fn assert_pairing(store: &JobStore) {
        for item in store.iter() {
            assert_eq!(
                item.status() == ItemStatus::Completed,
                item.result().is_some(),
                "status/result mismatch on {}",
                item.source_name()
            );
        }
    }

    #[test]
    fn add_items_preserves_order_and_starts_pending() {
        let mut store = JobStore::new();
        let ids = store.add_items(files(&["a.heic", "b.heic", "c.heif"]));
        assert_eq!(ids.len(), 3);
        assert_eq!(store.len(), 3);

        let names: Vec<&str> = store.iter().map(|i| i.source_name()).collect();
        assert_eq!(names, ["a.heic", "b.heic", "c.heif"]);
        assert!(store.iter().all(|i| i.status() == ItemStatus::Pending));
        assert!(store.has_pending());
        assert_pairing(&store);
    }

    #[test]
    fn ids_are_unique() {
        let mut store = JobStore::new();
        let mut ids = store.add_items(files(&["a.heic"; 50]));
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 50);
    }

    #[test]
    fn legal_lifecycle() {
        let reg = HandleRegistry::new();
        let mut store = JobStore::new();
        let id = store.add_items(files(&["a.heic"]))[0];

        store.set_status(id, ItemStatus::Converting, None).unwrap();
        assert_pairing(&store);
        store
            .mark_failed(id, ItemFailure::new("a.heic", DecodeError::NotHeif))
            .unwrap();
        assert!(store.get(id).unwrap().failure().is_some());
        assert_pairing(&store);

        // Retry clears the recorded failure.
        store.set_status(id, ItemStatus::Converting, None).unwrap();
        assert!(store.get(id).unwrap().failure().is_none());

        store
            .set_status(id, ItemStatus::Completed, Some(artifact(&reg, "a.jpg")))
            .unwrap();
        assert_eq!(store.get(id).unwrap().result().unwrap().derived_name(), "a.jpg");
        assert_pairing(&store);
        assert_eq!(reg.live(), 1);
    }

    #[test]
    fn pending_cannot_jump_to_terminal() {
        let reg = HandleRegistry::new();
        let mut store = JobStore::new();
        let id = store.add_items(files(&["a.heic"]))[0];

        let err = store
            .set_status(id, ItemStatus::Completed, Some(artifact(&reg, "a.jpg")))
            .unwrap_err();
        assert_eq!(
            err,
            TransitionError::Illegal {
                id,
                from: ItemStatus::Pending,
                to: ItemStatus::Completed
            }
        );
        assert!(store.set_status(id, ItemStatus::Failed, None).is_err());
        assert_eq!(store.get(id).unwrap().status(), ItemStatus::Pending);
        // The rejected artifact's handle was released.
        assert_eq!(reg.live(), 0);
    }

    #[test]
    fn completed_is_terminal() {
        let reg = HandleRegistry::new();
        let mut store = JobStore::new();
        let id = store.add_items(files(&["a.heic"]))[0];
        store.set_status(id, ItemStatus::Converting, None).unwrap();
        store
            .set_status(id, ItemStatus::Completed, Some(artifact(&reg, "a.jpg")))
            .unwrap();

        for next in [ItemStatus::Pending, ItemStatus::Converting, ItemStatus::Failed] {
            assert!(matches!(
                store.set_status(id, next, None),
                Err(TransitionError::Illegal { .. })
            ));
        }
        assert_eq!(store.get(id).unwrap().status(), ItemStatus::Completed);
        assert_pairing(&store);
    }

    #[test]
    fn result_must_match_status() {
        let reg = HandleRegistry::new();
        let mut store = JobStore::new();
        let id = store.add_items(files(&["a.heic"]))[0];
        store.set_status(id, ItemStatus::Converting, None).unwrap();

        assert!(matches!(
            store.set_status(id, ItemStatus::Completed, None),
            Err(TransitionError::ResultMismatch { .. })
        ));
        assert!(matches!(
            store.set_status(id, ItemStatus::Failed, Some(artifact(&reg, "a.jpg"))),
            Err(TransitionError::ResultMismatch { .. })
        ));
        assert_eq!(store.get(id).unwrap().status(), ItemStatus::Converting);
        assert_pairing(&store);
    }

    #[test]
    fn unknown_item_is_reported() {
        let mut store = JobStore::new();
        let id = store.add_items(files(&["a.heic"]))[0];
        store.remove_item(id);
        assert_eq!(
            store.set_status(id, ItemStatus::Converting, None),
            Err(TransitionError::UnknownItem { id })
        );
    }

    #[test]
    fn remove_is_idempotent_and_releases_handle() {
        let reg = HandleRegistry::new();
        let mut store = JobStore::new();
        let ids = store.add_items(files(&["a.heic", "b.heic"]));
        store.set_status(ids[0], ItemStatus::Converting, None).unwrap();
        store
            .set_status(ids[0], ItemStatus::Completed, Some(artifact(&reg, "a.jpg")))
            .unwrap();
        assert_eq!(reg.live(), 1);

        assert!(store.remove_item(ids[0]));
        assert_eq!(reg.live(), 0);
        assert_eq!(store.len(), 1);

        assert!(!store.remove_item(ids[0]));
        assert_eq!(store.len(), 1);
        assert_eq!(store.iter().next().unwrap().id(), ids[1]);
    }

    #[test]
    fn clear_all_releases_every_handle() {
        let reg = HandleRegistry::new();
        let mut store = JobStore::new();
        let ids = store.add_items(files(&["a.heic", "b.heic", "c.heic"]));
        for (i, id) in ids.iter().take(2).enumerate() {
            store.set_status(*id, ItemStatus::Converting, None).unwrap();
            store
                .set_status(
                    *id,
                    ItemStatus::Completed,
                    Some(artifact(&reg, &format!("{i}.jpg"))),
                )
                .unwrap();
        }
        assert_eq!(reg.live(), 2);
        assert_eq!(store.clear_all(), 3);
        assert!(store.is_empty());
        assert_eq!(reg.live(), 0);
    }

    #[test]
    fn counts_and_selection() {
        let reg = HandleRegistry::new();
        let mut store = JobStore::new();
        let ids = store.add_items(files(&["a", "b", "c", "d"]));
        store.set_status(ids[1], ItemStatus::Converting, None).unwrap();
        store.set_status(ids[2], ItemStatus::Converting, None).unwrap();
        store
            .set_status(ids[2], ItemStatus::Completed, Some(artifact(&reg, "c.jpg")))
            .unwrap();
        store.set_status(ids[3], ItemStatus::Converting, None).unwrap();
        store.set_status(ids[3], ItemStatus::Failed, None).unwrap();

        assert_eq!(
            store.counts(),
            StoreCounts {
                total: 4,
                pending: 1,
                converting: 1,
                completed: 1,
                failed: 1
            }
        );
        assert_eq!(
            store.ids_with_status(&[ItemStatus::Pending, ItemStatus::Failed]),
            vec![ids[0], ids[3]]
        );
        assert_eq!(store.completed_artifacts().count(), 1);
    }

    #[test]
    fn transition_table() {
        use ItemStatus::*;
        let all = [Pending, Converting, Completed, Failed];
        let allowed = [
            (Pending, Converting),
            (Failed, Converting),
            (Converting, Completed),
            (Converting, Failed),
        ];
        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from:?} -> {to:?}"
                );
            }
        }
    }

    #[tokio::test]
    async fn memory_source_reads_back() {
        let src = SourceFile::from_bytes("x.heic", vec![1, 2, 3]).with_media_type("image/heic");
        assert_eq!(src.size(), Some(3));
        assert_eq!(src.media_type(), Some("image/heic"));
        assert!(src.path().is_none());
        assert_eq!(src.read_all().await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn missing_path_source_is_intake_error() {
        let src = SourceFile::from_path("/definitely/not/here/x.heic");
        assert_eq!(src.name(), "x.heic");
        assert!(matches!(
            src.read_all().await,
            Err(IntakeError::NotFound { .. })
        ));
    }
}
