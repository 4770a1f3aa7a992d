//! Remote synchronization orchestrator.
//!
//! Owns the reload → merge → save loop for shared folders. The remote store
//! only does compare-and-swap saves; conflicts are resolved here by merging
//! the freshly loaded remote state with the local folder over the last agreed
//! state (the ancestor kept by the [`SyncStateRepository`]).

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::database::validation::AcceptAllValidator;
use crate::database::BookmarkDatabase;
use crate::managers::modification_batcher::BatchHandler;
use crate::managers::remote_store_manager::RemoteStoreManager;
use crate::services::merge_engine::{MergeConflict, MergeEngine, MergeReport};
use crate::services::remote_store::{CancellationToken, RemoteBookmarksStore};
use crate::storage::SyncStateRepository;
use crate::tree::BookmarksTree;
use crate::types::bookmark::{Bookmark, BookmarkId, Properties};
use crate::types::errors::{RemoteError, SyncError};
use crate::types::modification::Modification;
use crate::types::remote::{RemoteBookmarkFolder, RemoteBookmarksTree, RemoteStoreState};
use crate::types::settings::SyncSettings;

/// What one synchronization did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub folder_id: BookmarkId,
    /// Remote version the local folder agrees with afterwards.
    pub version: String,
    /// Modifications committed locally from remote changes.
    pub merged_modifications: usize,
    /// Whether local changes were written to the store.
    pub pushed: bool,
    /// Save attempts made, conflicts included.
    pub save_attempts: u32,
    pub conflicts: Vec<MergeConflict>,
}

/// Keeps shared folders and their remote stores in agreement.
pub struct RemoteSynchronizer {
    database: Arc<BookmarkDatabase>,
    manager: Arc<RemoteStoreManager>,
    repository: Arc<dyn SyncStateRepository>,
    engine: MergeEngine,
    max_save_attempts: u32,
}

impl RemoteSynchronizer {
    pub fn new(
        database: Arc<BookmarkDatabase>,
        manager: Arc<RemoteStoreManager>,
        repository: Arc<dyn SyncStateRepository>,
        settings: &SyncSettings,
    ) -> Self {
        Self {
            database,
            manager,
            repository,
            engine: MergeEngine::new(settings.property_conflict_policy),
            max_save_attempts: settings.max_save_attempts.max(1),
        }
    }

    /// Starts sharing a local folder with `store_id`.
    ///
    /// # Errors
    /// `UnknownStore`, or the remote errors `FolderNotFound`, `AlreadyShared`
    /// and `Nested` when the folder cannot be shared.
    pub fn share_folder(
        &self,
        store_id: &str,
        folder_id: &BookmarkId,
        properties: Properties,
        cancel: &CancellationToken,
    ) -> Result<RemoteBookmarkFolder, SyncError> {
        let store = self
            .manager
            .store(store_id)
            .ok_or_else(|| SyncError::UnknownStore(store_id.to_string()))?;
        let tree = self.database.get_bookmarks_tree();
        self.manager.check_can_share(&tree, folder_id)?;

        let subtree = tree.sub_tree(folder_id)?;
        let stored = store.add(&subtree, properties.clone(), cancel)?;
        self.repository.save_ancestor(&stored)?;
        info!(store = store_id, folder = %folder_id, version = %stored.version, "folder shared");
        Ok(RemoteBookmarkFolder {
            store_id: store_id.to_string(),
            folder_id: folder_id.clone(),
            properties,
        })
    }

    /// Stops sharing a folder. The local folder is left as it is.
    pub fn unshare_folder(
        &self,
        folder_id: &BookmarkId,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        let (folder, store) = self.resolve(folder_id)?;
        store.remove(folder_id, cancel)?;
        self.repository.remove_ancestor(&folder.store_id, folder_id)?;
        info!(store = %folder.store_id, folder = %folder_id, "folder unshared");
        Ok(())
    }

    /// Brings remote changes into the local folder without pushing anything.
    pub fn pull(
        &self,
        folder_id: &BookmarkId,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome, SyncError> {
        let (folder, store) = self.resolve(folder_id)?;
        let ancestor = self.ancestor(&folder)?;
        let remote = store.load(folder_id, cancel)?;
        let mut outcome = SyncOutcome {
            folder_id: folder_id.clone(),
            ..SyncOutcome::default()
        };
        self.merge_remote(&ancestor, &remote, &mut outcome)?;
        outcome.version = remote.version;
        Ok(outcome)
    }

    /// Reloads the remote folder, merges it into the local one and saves the
    /// result, retrying on version conflicts up to the configured attempts.
    ///
    /// # Errors
    /// `Remote(Conflict)` once every save attempt conflicted; other remote,
    /// storage and local errors as they occur. The local tree stays valid.
    pub fn synchronize(
        &self,
        folder_id: &BookmarkId,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome, SyncError> {
        let (folder, store) = self.resolve(folder_id)?;
        let mut outcome = SyncOutcome {
            folder_id: folder_id.clone(),
            ..SyncOutcome::default()
        };

        loop {
            cancel.check()?;
            let mut ancestor = self.ancestor(&folder)?;
            let remote = store.load(folder_id, cancel)?;
            if remote.version != ancestor.version {
                self.merge_remote(&ancestor, &remote, &mut outcome)?;
                ancestor = remote;
            }

            let local = self.database.get_bookmarks_tree().sub_tree(folder_id)?;
            if local == ancestor.tree {
                outcome.version = ancestor.version;
                return Ok(outcome);
            }

            outcome.save_attempts += 1;
            match store.save(&local, folder_id, &ancestor.version, cancel) {
                Ok(version) => {
                    self.repository.save_ancestor(&RemoteBookmarksTree {
                        store_id: folder.store_id.clone(),
                        tree: local,
                        version: version.clone(),
                    })?;
                    debug!(folder = %folder_id, version = %version, "pushed local changes");
                    outcome.version = version;
                    outcome.pushed = true;
                    return Ok(outcome);
                }
                Err(e @ RemoteError::Conflict { .. }) => {
                    if outcome.save_attempts >= self.max_save_attempts {
                        warn!(
                            folder = %folder_id,
                            attempts = outcome.save_attempts,
                            "giving up after repeated conflicts"
                        );
                        return Err(e.into());
                    }
                    debug!(folder = %folder_id, error = %e, "save conflicted, reloading");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Synchronizes every shared folder touched by `modifications`.
    ///
    /// Folders of disconnected stores are skipped. All folders are attempted;
    /// the first failure is returned.
    pub fn synchronize_affected(&self, modifications: &[Modification]) -> Result<(), SyncError> {
        let mut first_error = None;
        for folder in self.affected_folders(modifications) {
            let connected = self
                .manager
                .store(&folder.store_id)
                .is_some_and(|s| s.state() == RemoteStoreState::Connected);
            if !connected {
                debug!(folder = %folder.folder_id, "skipping folder of disconnected store");
                continue;
            }
            if let Err(e) = self.synchronize(&folder.folder_id, &CancellationToken::new()) {
                warn!(folder = %folder.folder_id, error = %e, "synchronization failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn affected_folders(&self, modifications: &[Modification]) -> Vec<RemoteBookmarkFolder> {
        let current = self.database.get_bookmarks_tree();
        let mut folders: Vec<RemoteBookmarkFolder> = Vec::new();
        for modification in modifications {
            let touched = modification
                .source_ids()
                .into_iter()
                .map(|id| (modification.source_tree(), id))
                .chain(
                    modification
                        .target_ids()
                        .into_iter()
                        .map(|id| (modification.target_tree(), id)),
                );
            for (tree, id) in touched {
                let Some(folder) = self.manager.remote_folder_containing(tree, &id) else {
                    continue;
                };
                if current.contains(&folder.folder_id)
                    && !folders.iter().any(|f| f.folder_id == folder.folder_id)
                {
                    folders.push(folder);
                }
            }
        }
        folders
    }

    fn resolve(
        &self,
        folder_id: &BookmarkId,
    ) -> Result<(RemoteBookmarkFolder, Arc<dyn RemoteBookmarksStore>), SyncError> {
        let folder = self
            .manager
            .remote_bookmark_folder(folder_id)
            .ok_or_else(|| SyncError::NotShared(folder_id.to_string()))?;
        let store = self
            .manager
            .store(&folder.store_id)
            .ok_or_else(|| SyncError::UnknownStore(folder.store_id.clone()))?;
        Ok((folder, store))
    }

    // Last agreed state, or a bare folder when none was recorded.
    fn ancestor(&self, folder: &RemoteBookmarkFolder) -> Result<RemoteBookmarksTree, SyncError> {
        if let Some(ancestor) = self
            .repository
            .load_ancestor(&folder.store_id, &folder.folder_id)?
        {
            return Ok(ancestor);
        }
        let root = Bookmark::new_folder(folder.folder_id.clone(), Properties::new());
        Ok(RemoteBookmarksTree {
            store_id: folder.store_id.clone(),
            tree: BookmarksTree::new(root)?,
            version: String::new(),
        })
    }

    // Commits the merge of `remote` and records it as the new ancestor.
    fn merge_remote(
        &self,
        ancestor: &RemoteBookmarksTree,
        remote: &RemoteBookmarksTree,
        outcome: &mut SyncOutcome,
    ) -> Result<(), SyncError> {
        let mut report = MergeReport::default();
        let committed = self
            .database
            .modify_with(Arc::new(AcceptAllValidator), |modifier| {
                report = self.engine.merge(modifier, &ancestor.tree, &remote.tree)?;
                Ok(())
            })?;
        self.repository.save_ancestor(remote)?;

        debug!(
            folder = %remote.tree.root_id(),
            version = %remote.version,
            modifications = committed.len(),
            "merged remote changes"
        );
        outcome.merged_modifications += committed.len();
        outcome.conflicts.extend(report.conflicts);
        Ok(())
    }
}

impl BatchHandler for RemoteSynchronizer {
    fn handle_batch(&self, batch: Vec<Modification>) -> Result<(), String> {
        self.synchronize_affected(&batch).map_err(|e| e.to_string())
    }
}
