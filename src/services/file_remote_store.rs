// File-backed remote bookmark store
// Keeps every shared folder as a JSON document inside one directory, next to an
// index recording each folder's version token and remote properties. Stands in
// for a cloud file service: one directory, whole-document reads and writes.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::services::persistence::JsonBookmarksCodec;
use crate::services::remote_store::{
    CancellationToken, RemoteBookmarksStore, RemoteStoreListener, RemoteStoreStatus,
};
use crate::tree::BookmarksTree;
use crate::types::bookmark::{BookmarkId, Properties};
use crate::types::errors::RemoteError;
use crate::types::remote::{
    RemoteBookmarkFolder, RemoteBookmarksTree, RemoteStoreDescriptor, RemoteStoreState,
};

const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FolderIndex {
    folders: BTreeMap<BookmarkId, IndexEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    file: String,
    version: u64,
    #[serde(default)]
    properties: Properties,
}

/// Remote store keeping shared folders in a local (or mounted) directory.
pub struct FileRemoteStore {
    descriptor: RemoteStoreDescriptor,
    directory: PathBuf,
    status: RemoteStoreStatus,
    codec: JsonBookmarksCodec,
    // Held for the whole of every add/remove/save, which makes saves compare-and-swap.
    index: Mutex<FolderIndex>,
}

impl FileRemoteStore {
    /// Creates a store over `directory`, reading the folder index if one exists.
    ///
    /// # Errors
    /// `RemoteError::Io` if an existing index cannot be read.
    pub fn open<P: AsRef<Path>>(
        descriptor: RemoteStoreDescriptor,
        directory: P,
    ) -> Result<Self, RemoteError> {
        let directory = directory.as_ref().to_path_buf();
        let index = Self::read_index(&directory)?;
        let status = RemoteStoreStatus::new(&descriptor.id);
        Ok(Self {
            descriptor,
            directory,
            status,
            codec: JsonBookmarksCodec::new(),
            index: Mutex::new(index),
        })
    }

    /// Message of the failure behind `DisconnectedWithError`, if any.
    pub fn last_error(&self) -> Option<String> {
        self.status.last_error()
    }

    fn io_error(context: &str, e: impl std::fmt::Display) -> RemoteError {
        RemoteError::Io(format!("{}: {}", context, e))
    }

    fn read_index(directory: &Path) -> Result<FolderIndex, RemoteError> {
        let path = directory.join(INDEX_FILE);
        if !path.exists() {
            return Ok(FolderIndex::default());
        }
        let content =
            fs::read(&path).map_err(|e| Self::io_error("Failed to read folder index", e))?;
        serde_json::from_slice(&content).map_err(|e| Self::io_error("Malformed folder index", e))
    }

    fn write_index(&self, index: &FolderIndex) -> Result<(), RemoteError> {
        let content = serde_json::to_vec_pretty(index)
            .map_err(|e| Self::io_error("Failed to encode folder index", e))?;
        self.write_atomically(&self.directory.join(INDEX_FILE), &content)
    }

    fn write_atomically(&self, path: &Path, content: &[u8]) -> Result<(), RemoteError> {
        let temp = path.with_extension("tmp");
        fs::write(&temp, content).map_err(|e| Self::io_error("Failed to write remote file", e))?;
        fs::rename(&temp, path).map_err(|e| Self::io_error("Failed to replace remote file", e))
    }

    fn write_tree(&self, file: &str, subtree: &BookmarksTree) -> Result<(), RemoteError> {
        let content = self
            .codec
            .to_bytes(subtree, subtree.root_id())
            .map_err(|e| Self::io_error("Failed to encode bookmarks", e))?;
        self.write_atomically(&self.directory.join(file), &content)
    }

    // Only called for documents the index does not reference, so a leftover file is harmless.
    fn discard_document(&self, file: &str) {
        if let Err(e) = fs::remove_file(self.directory.join(file)) {
            debug!(file, error = %e, "could not remove remote document");
        }
    }

    fn to_remote_folder(&self, folder_id: &BookmarkId, entry: &IndexEntry) -> RemoteBookmarkFolder {
        RemoteBookmarkFolder {
            store_id: self.descriptor.id.clone(),
            folder_id: folder_id.clone(),
            properties: entry.properties.clone(),
        }
    }
}

impl RemoteBookmarksStore for FileRemoteStore {
    fn descriptor(&self) -> &RemoteStoreDescriptor {
        &self.descriptor
    }

    fn state(&self) -> RemoteStoreState {
        self.status.state()
    }

    fn add_listener(&self, listener: Arc<dyn RemoteStoreListener>) {
        self.status.add_listener(listener);
    }

    fn connect(&self, cancel: &CancellationToken) -> Result<(), RemoteError> {
        self.status.connect_with(|| {
            cancel.check()?;
            fs::create_dir_all(&self.directory)
                .map_err(|e| Self::io_error("Failed to open remote directory", e))?;
            cancel.check()?;
            let index = Self::read_index(&self.directory)?;
            *self.index.lock() = index;
            Ok(())
        })
    }

    fn disconnect(&self, cancel: &CancellationToken) -> Result<(), RemoteError> {
        cancel.check()?;
        self.status.disconnect();
        Ok(())
    }

    fn remote_folders(&self) -> Vec<RemoteBookmarkFolder> {
        let index = self.index.lock();
        index
            .folders
            .iter()
            .map(|(id, entry)| self.to_remote_folder(id, entry))
            .collect()
    }

    fn add(
        &self,
        subtree: &BookmarksTree,
        properties: Properties,
        cancel: &CancellationToken,
    ) -> Result<RemoteBookmarksTree, RemoteError> {
        self.status.ensure_connected()?;
        cancel.check()?;
        let folder_id = subtree.root_id().clone();
        let mut index = self.index.lock();
        if index.folders.contains_key(&folder_id) {
            return Err(RemoteError::AlreadyShared(folder_id.to_string()));
        }

        let entry = IndexEntry {
            file: format!("{}.json", Uuid::new_v4()),
            version: 1,
            properties,
        };
        cancel.check()?;
        let file = entry.file.clone();
        self.write_tree(&file, subtree)?;
        let mut updated = index.clone();
        updated.folders.insert(folder_id.clone(), entry);
        if let Err(e) = self.write_index(&updated) {
            self.discard_document(&file);
            return Err(e);
        }
        *index = updated;

        debug!(store = %self.descriptor.id, folder = %folder_id, "folder added to remote store");
        Ok(RemoteBookmarksTree {
            store_id: self.descriptor.id.clone(),
            tree: subtree.clone(),
            version: "1".to_string(),
        })
    }

    fn remove(
        &self,
        folder_id: &BookmarkId,
        cancel: &CancellationToken,
    ) -> Result<(), RemoteError> {
        self.status.ensure_connected()?;
        cancel.check()?;
        let mut index = self.index.lock();
        let mut updated = index.clone();
        let entry = updated
            .folders
            .remove(folder_id)
            .ok_or_else(|| RemoteError::FolderNotFound(folder_id.to_string()))?;
        self.write_index(&updated)?;
        *index = updated;
        self.discard_document(&entry.file);
        Ok(())
    }

    fn load(
        &self,
        folder_id: &BookmarkId,
        cancel: &CancellationToken,
    ) -> Result<RemoteBookmarksTree, RemoteError> {
        self.status.ensure_connected()?;
        cancel.check()?;
        let index = self.index.lock();
        let entry = index
            .folders
            .get(folder_id)
            .ok_or_else(|| RemoteError::FolderNotFound(folder_id.to_string()))?;
        let content = fs::read(self.directory.join(&entry.file))
            .map_err(|e| Self::io_error("Failed to read remote bookmarks", e))?;
        cancel.check()?;
        let tree = self
            .codec
            .from_bytes(&content)
            .map_err(|e| Self::io_error("Failed to decode remote bookmarks", e))?;
        Ok(RemoteBookmarksTree {
            store_id: self.descriptor.id.clone(),
            tree,
            version: entry.version.to_string(),
        })
    }

    fn save(
        &self,
        subtree: &BookmarksTree,
        folder_id: &BookmarkId,
        version: &str,
        cancel: &CancellationToken,
    ) -> Result<String, RemoteError> {
        self.status.ensure_connected()?;
        if subtree.root_id() != folder_id {
            return Err(RemoteError::InvalidState(format!(
                "subtree is rooted at {}, not {}",
                subtree.root_id(),
                folder_id
            )));
        }
        cancel.check()?;
        let mut index = self.index.lock();
        let current = index
            .folders
            .get(folder_id)
            .cloned()
            .ok_or_else(|| RemoteError::FolderNotFound(folder_id.to_string()))?;
        let actual = current.version.to_string();
        if actual != version {
            return Err(RemoteError::Conflict {
                folder_id: folder_id.to_string(),
                expected: version.to_string(),
                actual,
            });
        }

        cancel.check()?;
        // Every version gets its own document; the index switch publishes it.
        let file = format!("{}.json", Uuid::new_v4());
        self.write_tree(&file, subtree)?;
        let next_version = current.version + 1;
        let mut updated = index.clone();
        updated.folders.insert(
            folder_id.clone(),
            IndexEntry {
                file: file.clone(),
                version: next_version,
                properties: current.properties.clone(),
            },
        );
        if let Err(e) = self.write_index(&updated) {
            self.discard_document(&file);
            return Err(e);
        }
        *index = updated;
        self.discard_document(&current.file);

        debug!(
            store = %self.descriptor.id,
            folder = %folder_id,
            version = next_version,
            "remote folder saved"
        );
        Ok(next_version.to_string())
    }
}
