//! Sync scheduler.
//!
//! Pushes local edits to remote stores once they have settled: database
//! commits feed a [`BookmarksModificationBatcher`] whose batches reach the
//! [`RemoteSynchronizer`].

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::runtime::Handle;

use crate::database::{BookmarkDatabase, BookmarksListener};
use crate::managers::modification_batcher::{BatchHandler, BookmarksModificationBatcher};
use crate::services::remote_sync::RemoteSynchronizer;
use crate::types::modification::Modification;
use crate::types::settings::SyncSettings;

struct SyncHandler {
    // Weak: the synchronizer holds the database, which holds this handler.
    synchronizer: Weak<RemoteSynchronizer>,
}

impl BatchHandler for SyncHandler {
    fn handle_batch(&self, batch: Vec<Modification>) -> Result<(), String> {
        match self.synchronizer.upgrade() {
            Some(synchronizer) => synchronizer.handle_batch(batch),
            None => Ok(()),
        }
    }
}

/// Synchronizes touched shared folders a quiet period after the last edit.
pub struct SyncScheduler {
    database: Weak<BookmarkDatabase>,
    batcher: BookmarksModificationBatcher,
    listener: Arc<dyn BookmarksListener>,
}

impl SyncScheduler {
    /// Subscribes to `database`, debouncing with `settings.debounce_ms`.
    pub fn install(
        runtime: Handle,
        database: &Arc<BookmarkDatabase>,
        synchronizer: &Arc<RemoteSynchronizer>,
        settings: &SyncSettings,
    ) -> Self {
        let handler = Arc::new(SyncHandler {
            synchronizer: Arc::downgrade(synchronizer),
        });
        let batcher = BookmarksModificationBatcher::new(
            runtime,
            Duration::from_millis(settings.debounce_ms),
            handler,
        );
        let listener: Arc<dyn BookmarksListener> = Arc::new(batcher.clone());
        database.add_listener(listener.clone());
        Self {
            database: Arc::downgrade(database),
            batcher,
            listener,
        }
    }

    /// Edits waiting for the quiet period.
    pub fn pending_count(&self) -> usize {
        self.batcher.pending_count()
    }

    /// Synchronizes pending edits now instead of after the quiet period.
    pub fn sync_now(&self) -> Result<(), String> {
        self.batcher.flush()
    }

    /// Unsubscribes from the database. Pending edits are not synchronized.
    pub fn uninstall(&self) {
        if let Some(database) = self.database.upgrade() {
            database.remove_listener(&self.listener);
        }
    }
}
