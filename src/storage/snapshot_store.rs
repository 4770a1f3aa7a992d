//! Persisted tree snapshots.
//!
//! Stores the local bookmarks tree and, per shared folder, the last remote
//! state both sides agreed on. That agreed state is the common ancestor of
//! the next three-way merge.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, OptionalExtension};

use crate::services::persistence::JsonBookmarksCodec;
use crate::storage::connection::Database;
use crate::tree::BookmarksTree;
use crate::types::bookmark::BookmarkId;
use crate::types::errors::StorageError;
use crate::types::remote::RemoteBookmarksTree;

const LOCAL_SNAPSHOT: &str = "local";

/// Trait defining access to the last synchronized state of shared folders.
pub trait SyncStateRepository: Send + Sync {
    fn load_ancestor(
        &self,
        store_id: &str,
        folder_id: &BookmarkId,
    ) -> Result<Option<RemoteBookmarksTree>, StorageError>;
    fn save_ancestor(&self, ancestor: &RemoteBookmarksTree) -> Result<(), StorageError>;
    fn remove_ancestor(&self, store_id: &str, folder_id: &BookmarkId) -> Result<(), StorageError>;
}

/// Snapshot store backed by the SQLite [`Database`].
pub struct SnapshotStore {
    db: Arc<Database>,
    codec: JsonBookmarksCodec,
}

impl SnapshotStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            codec: JsonBookmarksCodec::new(),
        }
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }

    /// Replaces the stored local tree.
    pub fn save_local_tree(&self, tree: &BookmarksTree) -> Result<(), StorageError> {
        let document = self.codec.to_bytes(tree, tree.root_id())?;
        self.db.connection().execute(
            "INSERT INTO tree_snapshots (name, document, saved_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET document = excluded.document, saved_at = excluded.saved_at",
            params![LOCAL_SNAPSHOT, document, Self::now()],
        )?;
        Ok(())
    }

    /// Returns the stored local tree, or `None` if nothing was saved yet.
    pub fn load_local_tree(&self) -> Result<Option<BookmarksTree>, StorageError> {
        let document: Option<Vec<u8>> = self
            .db
            .connection()
            .query_row(
                "SELECT document FROM tree_snapshots WHERE name = ?1",
                params![LOCAL_SNAPSHOT],
                |row| row.get(0),
            )
            .optional()?;
        match document {
            Some(bytes) => Ok(Some(self.codec.from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }
}

impl SyncStateRepository for SnapshotStore {
    fn load_ancestor(
        &self,
        store_id: &str,
        folder_id: &BookmarkId,
    ) -> Result<Option<RemoteBookmarksTree>, StorageError> {
        let row: Option<(String, Vec<u8>)> = self
            .db
            .connection()
            .query_row(
                "SELECT version, document FROM sync_ancestors WHERE store_id = ?1 AND folder_id = ?2",
                params![store_id, folder_id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        match row {
            Some((version, bytes)) => Ok(Some(RemoteBookmarksTree {
                store_id: store_id.to_string(),
                tree: self.codec.from_bytes(&bytes)?,
                version,
            })),
            None => Ok(None),
        }
    }

    fn save_ancestor(&self, ancestor: &RemoteBookmarksTree) -> Result<(), StorageError> {
        let tree = &ancestor.tree;
        let document = self.codec.to_bytes(tree, tree.root_id())?;
        self.db.connection().execute(
            "INSERT INTO sync_ancestors (store_id, folder_id, version, document, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(store_id, folder_id) DO UPDATE SET
                 version = excluded.version,
                 document = excluded.document,
                 updated_at = excluded.updated_at",
            params![
                ancestor.store_id,
                tree.root_id().as_str(),
                ancestor.version,
                document,
                Self::now()
            ],
        )?;
        Ok(())
    }

    fn remove_ancestor(&self, store_id: &str, folder_id: &BookmarkId) -> Result<(), StorageError> {
        self.db.connection().execute(
            "DELETE FROM sync_ancestors WHERE store_id = ?1 AND folder_id = ?2",
            params![store_id, folder_id.as_str()],
        )?;
        Ok(())
    }
}
