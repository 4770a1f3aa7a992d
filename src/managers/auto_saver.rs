//! Auto-saver.
//!
//! Persists the local tree into the snapshot store once edits have settled,
//! using a [`BookmarksModificationBatcher`] for the quiet period.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::debug;

use crate::database::{BookmarkDatabase, BookmarksListener};
use crate::managers::modification_batcher::{BatchHandler, BookmarksModificationBatcher};
use crate::storage::SnapshotStore;
use crate::types::errors::StorageError;
use crate::types::modification::Modification;
use crate::types::settings::StorageSettings;

struct SaveHandler {
    // Weak: the database owns this handler through its listener list.
    database: Weak<BookmarkDatabase>,
    store: Arc<SnapshotStore>,
    dirty: Arc<AtomicBool>,
}

impl SaveHandler {
    fn save(&self) -> Result<(), StorageError> {
        let Some(database) = self.database.upgrade() else {
            return Ok(());
        };
        // Cleared before reading, so an edit committed meanwhile marks it dirty again.
        self.dirty.store(false, Ordering::SeqCst);
        let tree = database.get_bookmarks_tree();
        if let Err(e) = self.store.save_local_tree(&tree) {
            self.dirty.store(true, Ordering::SeqCst);
            return Err(e);
        }
        debug!(bookmarks = tree.len(), "saved local bookmarks");
        Ok(())
    }
}

impl BatchHandler for SaveHandler {
    fn handle_batch(&self, _batch: Vec<Modification>) -> Result<(), String> {
        self.save().map_err(|e| e.to_string())
    }
}

struct DirtyTracker {
    dirty: Arc<AtomicBool>,
    batcher: BookmarksModificationBatcher,
}

impl BookmarksListener for DirtyTracker {
    fn bookmarks_modified(&self, modifications: &[Modification]) {
        self.dirty.store(true, Ordering::SeqCst);
        self.batcher.bookmarks_modified(modifications);
    }
}

/// Saves the database tree a quiet period after the last edit.
pub struct AutoSaver {
    database: Weak<BookmarkDatabase>,
    handler: Arc<SaveHandler>,
    batcher: BookmarksModificationBatcher,
    listener: Arc<dyn BookmarksListener>,
}

impl AutoSaver {
    /// Subscribes to `database` and starts saving into `store`.
    pub fn install(
        runtime: Handle,
        database: &Arc<BookmarkDatabase>,
        store: Arc<SnapshotStore>,
        settings: &StorageSettings,
    ) -> Self {
        let dirty = Arc::new(AtomicBool::new(false));
        let handler = Arc::new(SaveHandler {
            database: Arc::downgrade(database),
            store,
            dirty: dirty.clone(),
        });
        let batcher = BookmarksModificationBatcher::new(
            runtime,
            Duration::from_millis(settings.auto_save_debounce_ms),
            handler.clone(),
        );
        let listener: Arc<dyn BookmarksListener> = Arc::new(DirtyTracker {
            dirty,
            batcher: batcher.clone(),
        });
        database.add_listener(listener.clone());
        Self {
            database: Arc::downgrade(database),
            handler,
            batcher,
            listener,
        }
    }

    /// True while committed edits have not reached storage.
    pub fn is_dirty(&self) -> bool {
        self.handler.dirty.load(Ordering::SeqCst)
    }

    /// Saves immediately, dropping any pending timer.
    pub fn save_now(&self) -> Result<(), StorageError> {
        self.batcher.flush().map_err(StorageError::DatabaseError)?;
        if self.is_dirty() {
            self.handler.save()?;
        }
        Ok(())
    }

    /// Unsubscribes from the database. Pending edits are not saved.
    pub fn uninstall(&self) {
        if let Some(database) = self.database.upgrade() {
            database.remove_listener(&self.listener);
        }
    }
}
