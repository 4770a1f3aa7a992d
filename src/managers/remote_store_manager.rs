//! Remote Store Manager.
//!
//! Explicit registry of the configured remote stores, constructed at startup
//! and passed to the components that need it. Resolves which shared folder
//! (if any) owns a bookmark and guards local edits inside shared folders.

use std::sync::Arc;

use crate::database::validation::ModificationValidator;
use crate::services::remote_store::RemoteBookmarksStore;
use crate::tree::{BookmarksTree, TraversalOrder};
use crate::types::bookmark::BookmarkId;
use crate::types::errors::RemoteError;
use crate::types::remote::{RemoteBookmarkFolder, RemoteStoreState};

/// Registry of remote stores and the folders shared with them.
pub struct RemoteStoreManager {
    stores: Vec<Arc<dyn RemoteBookmarksStore>>,
}

impl RemoteStoreManager {
    pub fn new(stores: Vec<Arc<dyn RemoteBookmarksStore>>) -> Self {
        Self { stores }
    }

    pub fn stores(&self) -> &[Arc<dyn RemoteBookmarksStore>] {
        &self.stores
    }

    /// Looks up a store by descriptor id.
    pub fn store(&self, store_id: &str) -> Option<Arc<dyn RemoteBookmarksStore>> {
        self.stores
            .iter()
            .find(|s| s.descriptor().id == store_id)
            .cloned()
    }

    /// Every folder shared with any store.
    pub fn remote_bookmark_folders(&self) -> Vec<RemoteBookmarkFolder> {
        self.stores.iter().flat_map(|s| s.remote_folders()).collect()
    }

    /// The sharing of `folder_id` itself, if it is shared.
    pub fn remote_bookmark_folder(&self, folder_id: &BookmarkId) -> Option<RemoteBookmarkFolder> {
        self.stores.iter().find_map(|s| s.remote_folder(folder_id))
    }

    /// Nearest folder, `id` included, that is shared with a remote store.
    pub fn remote_folder_containing(
        &self,
        tree: &BookmarksTree,
        id: &BookmarkId,
    ) -> Option<RemoteBookmarkFolder> {
        self.remote_bookmark_folder(id)
            .or_else(|| self.shared_ancestor(tree, id))
    }

    /// Shared folders located at or below `folder_id`.
    pub fn remote_folders_within(
        &self,
        tree: &BookmarksTree,
        folder_id: &BookmarkId,
    ) -> Vec<RemoteBookmarkFolder> {
        let folders = self.remote_bookmark_folders();
        if folders.is_empty() {
            return folders;
        }
        folders
            .into_iter()
            .filter(|f| f.folder_id == *folder_id || tree.is_ancestor_of(folder_id, &f.folder_id))
            .collect()
    }

    /// Checks that `folder_id` can start being shared.
    ///
    /// # Errors
    /// - `FolderNotFound` if the id is not a folder of `tree`
    /// - `AlreadyShared` if the folder is already shared
    /// - `Nested` if a shared folder contains it or is contained by it
    pub fn check_can_share(
        &self,
        tree: &BookmarksTree,
        folder_id: &BookmarkId,
    ) -> Result<(), RemoteError> {
        match tree.get_bookmark(folder_id) {
            Some(bookmark) if bookmark.is_folder() => {}
            _ => return Err(RemoteError::FolderNotFound(folder_id.to_string())),
        }
        if self.remote_bookmark_folder(folder_id).is_some() {
            return Err(RemoteError::AlreadyShared(folder_id.to_string()));
        }
        if let Some(outer) = self.shared_ancestor(tree, folder_id) {
            return Err(RemoteError::Nested(format!(
                "{} is inside shared folder {}",
                folder_id, outer.folder_id
            )));
        }
        let inner: Vec<BookmarkId> = tree
            .iter_from(folder_id, TraversalOrder::PreOrder)
            .filter(|b| b.is_folder() && b.id != *folder_id)
            .filter(|b| self.remote_bookmark_folder(&b.id).is_some())
            .map(|b| b.id.clone())
            .collect();
        if let Some(first) = inner.first() {
            return Err(RemoteError::Nested(format!(
                "{} contains shared folder {}",
                folder_id, first
            )));
        }
        Ok(())
    }

    fn shared_ancestor(
        &self,
        tree: &BookmarksTree,
        id: &BookmarkId,
    ) -> Option<RemoteBookmarkFolder> {
        tree.ancestors(id)
            .iter()
            .find_map(|ancestor| self.remote_bookmark_folder(ancestor))
    }
}

/// Rejects local edits inside read-only or disconnected shared folders, and
/// edits that would nest one shared folder inside another.
pub struct RemoteBookmarksValidator {
    manager: Arc<RemoteStoreManager>,
}

impl RemoteBookmarksValidator {
    pub fn new(manager: Arc<RemoteStoreManager>) -> Self {
        Self { manager }
    }
}

impl ModificationValidator for RemoteBookmarksValidator {
    fn validate(&self, tree: &BookmarksTree, affected_id: &BookmarkId) -> Result<(), String> {
        if let Some(outer) = self.manager.shared_ancestor(tree, affected_id) {
            let nested = self.manager.remote_folders_within(tree, affected_id);
            if let Some(inner) = nested.first() {
                return Err(format!(
                    "Shared folder {} cannot be placed inside shared folder {}",
                    inner.folder_id, outer.folder_id
                ));
            }
        }

        let Some(folder) = self.manager.remote_folder_containing(tree, affected_id) else {
            return Ok(());
        };
        let store = self
            .manager
            .store(&folder.store_id)
            .ok_or_else(|| format!("Unknown remote store: {}", folder.store_id))?;
        if store.state() != RemoteStoreState::Connected {
            return Err(format!(
                "Remote store {} is not connected for folder {}",
                folder.store_id, folder.folder_id
            ));
        }
        if folder.is_read_only() {
            return Err(format!("Remote folder {} is read-only", folder.folder_id));
        }
        Ok(())
    }
}
