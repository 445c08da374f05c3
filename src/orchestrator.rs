//! The batch orchestrator: drives conversions and packaging for a job store.
//!
//! ## Why strictly sequential?
//!
//! Decoding is heavy. One conversion at a time bounds peak memory to a single
//! source/output buffer pair and keeps the progress indicator honest
//! (`index / total` means what it says). `convert_all_pending` therefore
//! awaits each item to a terminal state before touching the next.
//!
//! ## Why re-check each item?
//!
//! The selection is captured once when a pass starts, but the store stays
//! open to removal and clearing between items. Every step re-reads the item
//! under the lock; vanished or no-longer-eligible items are counted as
//! skipped, and an item removed while its decode was in flight drops the
//! finished artifact (releasing its handle) instead of resurrecting it.
//!
//! The store lock is only ever held between awaits, never across one.

use crate::config::ConversionConfig;
use crate::error::{AvalonError, DecodeError, ItemErrorKind, ItemFailure, TransitionError};
use crate::handle::HandleRegistry;
use crate::pipeline::archive::{ArchiveEntry, Archiver};
use crate::pipeline::decode::{DecodeOptions, Decoder};
use crate::pipeline::naming::{disambiguate, NameDeriver};
use crate::pipeline::save::Saver;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::store::{lock, ConvertedArtifact, ItemId, ItemStatus, SharedStore, SourceFile};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How one conversion ended.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum ItemOutcome {
    Completed { derived_name: String, bytes: usize },
    Failed(ItemFailure),
}

impl ItemOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, ItemOutcome::Completed { .. })
    }
}

/// Result of one "convert all" pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    /// Items captured when the pass started.
    pub selected: usize,
    pub completed: usize,
    pub failed: usize,
    /// Captured items that vanished or stopped being eligible before their turn.
    pub skipped: usize,
    pub failures: Vec<ItemFailure>,
}

/// Clears the "convert all" flag when a pass ends, including by cancellation.
struct BatchFlag<'a>(&'a AtomicBool);

impl Drop for BatchFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Fails an item left in Converting when its conversion future is dropped.
///
/// Armed after the item enters Converting; `disarm` once the real outcome
/// is about to be recorded.
struct ConvertingGuard<'a> {
    store: &'a SharedStore,
    id: ItemId,
    source_name: &'a str,
    armed: bool,
}

impl<'a> ConvertingGuard<'a> {
    fn new(store: &'a SharedStore, id: ItemId, source_name: &'a str) -> Self {
        Self {
            store,
            id,
            source_name,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ConvertingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let failure = ItemFailure::new(self.source_name, ItemErrorKind::Cancelled);
        // UnknownItem here means the item was removed meanwhile; nothing to reset.
        if lock(self.store).mark_failed(self.id, failure).is_ok() {
            warn!("Conversion of {} was cancelled", self.source_name);
        }
    }
}

/// Drives single-item and batch conversions against a shared job store.
pub struct BatchOrchestrator {
    store: SharedStore,
    decoder: Arc<dyn Decoder>,
    archiver: Arc<dyn Archiver>,
    saver: Arc<dyn Saver>,
    config: ConversionConfig,
    names: NameDeriver,
    handles: HandleRegistry,
    progress: ProgressCallback,
    converting_all: AtomicBool,
}

impl BatchOrchestrator {
    pub fn new(
        store: SharedStore,
        decoder: Arc<dyn Decoder>,
        archiver: Arc<dyn Archiver>,
        saver: Arc<dyn Saver>,
        config: ConversionConfig,
    ) -> Self {
        let progress = config
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback));
        let names = NameDeriver::new(&config.accepted_extensions);
        Self {
            store,
            decoder,
            archiver,
            saver,
            config,
            names,
            handles: HandleRegistry::new(),
            progress,
            converting_all: AtomicBool::new(false),
        }
    }

    /// Issue download handles from `handles` instead of a private registry.
    pub fn with_handle_registry(mut self, handles: HandleRegistry) -> Self {
        self.handles = handles;
        self
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn handles(&self) -> &HandleRegistry {
        &self.handles
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Whether a `convert_all_pending` pass is running.
    pub fn is_converting_all(&self) -> bool {
        self.converting_all.load(Ordering::SeqCst)
    }

    // ── Conversion ───────────────────────────────────────────────────────

    /// Convert one item.
    ///
    /// Returns `Ok(None)` when the id is not in the store. Read and decode
    /// failures come back as `Ok(Some(ItemOutcome::Failed(..)))`; only an
    /// illegal transition (the item is Completed or already Converting) is
    /// an `Err`.
    pub async fn convert_one(&self, id: ItemId) -> Result<Option<ItemOutcome>, AvalonError> {
        self.convert_item(id, 1, 1, false).await
    }

    /// Convert every Pending and Failed item, one at a time, in store order.
    ///
    /// Items added after the pass starts are not included.
    pub async fn convert_all_pending(&self) -> Result<BatchSummary, AvalonError> {
        if self.converting_all.swap(true, Ordering::SeqCst) {
            return Err(AvalonError::BatchInProgress);
        }
        let _flag = BatchFlag(&self.converting_all);

        let selected = lock(&self.store).ids_with_status(&[ItemStatus::Pending, ItemStatus::Failed]);
        let total = selected.len();
        let mut summary = BatchSummary {
            selected: total,
            ..BatchSummary::default()
        };

        info!("Converting {} items", total);
        self.progress.on_batch_start(total);

        for (i, id) in selected.into_iter().enumerate() {
            match self.convert_item(id, i + 1, total, true).await? {
                Some(ItemOutcome::Completed { .. }) => summary.completed += 1,
                Some(ItemOutcome::Failed(failure)) => {
                    summary.failed += 1;
                    summary.failures.push(failure);
                }
                None => summary.skipped += 1,
            }
        }

        self.progress.on_batch_complete(total, summary.completed);
        info!(
            "Batch done: {} completed, {} failed, {} skipped",
            summary.completed, summary.failed, summary.skipped
        );
        Ok(summary)
    }

    async fn convert_item(
        &self,
        id: ItemId,
        index: usize,
        total: usize,
        eligible_only: bool,
    ) -> Result<Option<ItemOutcome>, AvalonError> {
        let Some(source) = self.begin(id, eligible_only)? else {
            return Ok(None);
        };
        let source_name = source.name().to_string();
        let mut guard = ConvertingGuard::new(&self.store, id, &source_name);
        self.progress.on_item_start(index, total, &source_name);

        let attempt = self.attempt(&source).await;
        guard.disarm();
        match attempt {
            Ok((derived_name, bytes)) => {
                let len = bytes.len();
                let artifact = ConvertedArtifact::new(
                    derived_name.clone(),
                    self.config.format,
                    bytes,
                    self.handles.issue(),
                );
                let applied = lock(&self.store).set_status(id, ItemStatus::Completed, Some(artifact));
                if !self.settle(id, applied)? {
                    return Ok(None);
                }
                info!("Converted {} → {} ({} bytes)", source_name, derived_name, len);
                self.progress
                    .on_item_complete(index, total, &source_name, &derived_name, len);
                Ok(Some(ItemOutcome::Completed {
                    derived_name,
                    bytes: len,
                }))
            }
            Err(failure) => {
                let applied = lock(&self.store).mark_failed(id, failure.clone());
                if !self.settle(id, applied)? {
                    return Ok(None);
                }
                warn!("{}", failure);
                self.progress.on_item_error(index, total, &failure);
                Ok(Some(ItemOutcome::Failed(failure)))
            }
        }
    }

    /// Move the item to Converting and hand back its source.
    fn begin(&self, id: ItemId, eligible_only: bool) -> Result<Option<SourceFile>, AvalonError> {
        let mut store = lock(&self.store);
        let Some(item) = store.get(id) else {
            debug!("Item {} is gone, skipping", id);
            return Ok(None);
        };
        if eligible_only && !item.status().is_eligible() {
            debug!("Item {} is {:?}, skipping", id, item.status());
            return Ok(None);
        }
        let source = item.source().clone();
        store.set_status(id, ItemStatus::Converting, None)?;
        Ok(Some(source))
    }

    /// An item removed mid-conversion is not an error; anything else is.
    fn settle(&self, id: ItemId, applied: Result<(), TransitionError>) -> Result<bool, AvalonError> {
        match applied {
            Ok(()) => Ok(true),
            Err(TransitionError::UnknownItem { .. }) => {
                debug!("Item {} was removed during conversion, result dropped", id);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read and decode one source. Every failure names the source file.
    async fn attempt(&self, source: &SourceFile) -> Result<(String, Vec<u8>), ItemFailure> {
        let name = source.name();
        let bytes = source
            .read_all()
            .await
            .map_err(|e| ItemFailure::new(name, e))?;
        debug!("Read {} ({} bytes)", name, bytes.len());

        let output = self
            .decoder
            .decode(bytes, DecodeOptions::from_config(&self.config))
            .await
            .map_err(|e| ItemFailure::new(name, e))?;
        if output.is_empty() {
            return Err(ItemFailure::new(
                name,
                DecodeError::MalformedOutput("decoder returned no bytes".into()),
            ));
        }

        let derived = self.names.derive(name, self.config.format.extension());
        Ok((derived, output))
    }

    // ── Downloads ────────────────────────────────────────────────────────

    /// Save one Completed item's artifact under its derived name.
    ///
    /// Returns `Ok(None)` when the item is absent or not Completed.
    pub async fn download_one(&self, id: ItemId) -> Result<Option<PathBuf>, AvalonError> {
        let copy = lock(&self.store)
            .get(id)
            .and_then(|item| item.result())
            .map(|a| (a.derived_name().to_string(), a.bytes().to_vec()));
        let Some((name, bytes)) = copy else {
            debug!("Item {} has no artifact to download", id);
            return Ok(None);
        };
        self.saver.save(&bytes, &name).await.map(Some)
    }

    /// Save an artifact the caller already holds.
    pub async fn download_artifact(&self, artifact: &ConvertedArtifact) -> Result<PathBuf, AvalonError> {
        self.saver
            .save(artifact.bytes(), artifact.derived_name())
            .await
    }

    /// Package every Completed artifact into one archive and save it.
    ///
    /// With nothing Completed, neither the archiver nor the saver is called
    /// and the result is `Ok(None)`. Duplicate derived names are suffixed
    /// (`a.jpg`, `a (2).jpg`) so no entry overwrites another.
    pub async fn download_all_completed(&self) -> Result<Option<PathBuf>, AvalonError> {
        let (names, payloads) = self.completed_copies();
        if names.is_empty() {
            debug!("Nothing completed, no archive to build");
            return Ok(None);
        }

        let entries: Vec<ArchiveEntry> = disambiguate(&names)
            .into_iter()
            .zip(payloads)
            .map(|(name, bytes)| ArchiveEntry::new(name, bytes))
            .collect();
        let count = entries.len();

        let archive = self.archiver.pack(entries).await?;
        let path = self.saver.save(&archive, &self.config.archive_name).await?;
        info!(
            "Saved {} files in {} ({} bytes)",
            count,
            path.display(),
            archive.len()
        );
        Ok(Some(path))
    }

    /// Save every Completed artifact as its own file.
    ///
    /// Names are disambiguated across the set exactly as archive entries
    /// are, so two sources deriving `a.jpg` are saved as `a.jpg` and
    /// `a (2).jpg` instead of one overwriting the other.
    pub async fn download_each_completed(&self) -> Result<Vec<PathBuf>, AvalonError> {
        let (names, payloads) = self.completed_copies();
        let mut saved = Vec::with_capacity(names.len());
        for (name, bytes) in disambiguate(&names).into_iter().zip(payloads) {
            saved.push(self.saver.save(&bytes, &name).await?);
        }
        if !saved.is_empty() {
            info!("Saved {} files", saved.len());
        }
        Ok(saved)
    }

    /// Derived names and bytes of every Completed artifact, in store order.
    fn completed_copies(&self) -> (Vec<String>, Vec<Vec<u8>>) {
        lock(&self.store)
            .completed_artifacts()
            .map(|a| (a.derived_name().to_string(), a.bytes().to_vec()))
            .unzip()
    }
}

impl std::fmt::Debug for BatchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchOrchestrator")
            .field("config", &self.config)
            .field("handles", &self.handles)
            .field("converting_all", &self.is_converting_all())
            .finish_non_exhaustive()
    }
}
