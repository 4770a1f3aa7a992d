use serde::{Deserialize, Serialize};

use crate::tree::BookmarksTree;
use crate::types::bookmark::{BookmarkId, Properties};

/// Remote folder property marking the folder as read-only (`"true"`).
pub const PROPERTY_READONLY: &str = "readonly";

/// Identifies a remote store and how it is presented to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteStoreDescriptor {
    pub id: String,
    pub label: String,
}

/// Connection lifecycle of a remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteStoreState {
    Disconnected,
    Connecting,
    Connected,
    DisconnectedWithError,
}

/// A local folder shared with a remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteBookmarkFolder {
    pub store_id: String,
    pub folder_id: BookmarkId,
    pub properties: Properties,
}

impl RemoteBookmarkFolder {
    pub fn is_read_only(&self) -> bool {
        self.properties
            .get(PROPERTY_READONLY)
            .is_some_and(|v| v == "true")
    }
}

/// A subtree as stored remotely, with the version token it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBookmarksTree {
    pub store_id: String,
    pub tree: BookmarksTree,
    pub version: String,
}
