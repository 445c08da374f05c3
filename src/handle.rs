//! Revocable download handles.
//!
//! Every converted artifact carries a [`DownloadHandle`]: an opaque locator a
//! front end can use to display or save the artifact once. The
//! [`HandleRegistry`] is the table of handles currently issued. A handle is
//! released exactly once, either explicitly with [`DownloadHandle::revoke`] or
//! when it is dropped, so removing an item or clearing the store can never
//! leave a stale entry behind.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;
use uuid::Uuid;

const LOCATOR_SCHEME: &str = "avalon-blob:";

/// Table of live download handles.
///
/// Cloning the registry is cheap; clones share the same table.
#[derive(Clone, Default)]
pub struct HandleRegistry {
    live: Arc<Mutex<HashSet<Uuid>>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh handle and record it as live.
    pub fn issue(&self) -> DownloadHandle {
        let id = Uuid::new_v4();
        self.table().insert(id);
        debug!("Issued download handle {}{}", LOCATOR_SCHEME, id);
        DownloadHandle {
            id,
            registry: self.clone(),
        }
    }

    /// Number of handles issued and not yet released.
    pub fn live(&self) -> usize {
        self.table().len()
    }

    /// Whether `locator` refers to a handle that is still live.
    pub fn is_live(&self, locator: &str) -> bool {
        locator
            .strip_prefix(LOCATOR_SCHEME)
            .and_then(|s| Uuid::parse_str(s).ok())
            .map(|id| self.table().contains(&id))
            .unwrap_or(false)
    }

    fn release(&self, id: Uuid) {
        if self.table().remove(&id) {
            debug!("Released download handle {}{}", LOCATOR_SCHEME, id);
        }
    }

    fn table(&self) -> std::sync::MutexGuard<'_, HashSet<Uuid>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for HandleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("live", &self.live())
            .finish()
    }
}

/// A single-owner, revocable reference to one converted artifact.
///
/// Not `Clone`: exactly one owner releases it.
pub struct DownloadHandle {
    id: Uuid,
    registry: HandleRegistry,
}

impl DownloadHandle {
    /// Opaque locator string, e.g. `avalon-blob:6f1c…`.
    pub fn locator(&self) -> String {
        format!("{}{}", LOCATOR_SCHEME, self.id)
    }

    /// Release the handle now instead of at drop time.
    pub fn revoke(self) {
        // Drop does the work.
    }
}

impl Drop for DownloadHandle {
    fn drop(&mut self) {
        self.registry.release(self.id);
    }
}

impl fmt::Debug for DownloadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DownloadHandle").field(&self.locator()).finish()
    }
}
