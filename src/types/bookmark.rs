use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Property key holding the display name of a bookmark or folder.
pub const PROPERTY_NAME: &str = "name";
/// Property key holding a free-form user comment.
pub const PROPERTY_COMMENT: &str = "comment";
/// Property key holding the creation time (UNIX seconds).
pub const PROPERTY_CREATED: &str = "created";

/// Ordered property bag attached to every bookmark.
pub type Properties = BTreeMap<String, String>;

/// Opaque, globally unique bookmark identifier. Clones share one allocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookmarkId(Arc<str>);

impl BookmarkId {
    /// Generates a fresh identifier.
    pub fn new() -> Self {
        Self(Arc::from(Uuid::new_v4().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BookmarkId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BookmarkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BookmarkId {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

impl From<String> for BookmarkId {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

/// Whether a bookmark is a leaf entry or a folder that can own children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookmarkKind {
    Bookmark,
    Folder,
}

/// A bookmark entity: an id plus an open property bag.
///
/// Folders are bookmarks of kind [`BookmarkKind::Folder`]; their ordered
/// children are owned by the tree, not by the entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: BookmarkId,
    pub kind: BookmarkKind,
    pub properties: Properties,
}

impl Bookmark {
    pub fn new(id: BookmarkId, properties: Properties) -> Self {
        Self {
            id,
            kind: BookmarkKind::Bookmark,
            properties,
        }
    }

    pub fn new_folder(id: BookmarkId, properties: Properties) -> Self {
        Self {
            id,
            kind: BookmarkKind::Folder,
            properties,
        }
    }

    /// Creates a leaf bookmark with a fresh id, a name and the current creation time.
    pub fn named(name: &str) -> Self {
        Self::new(BookmarkId::new(), Self::initial_properties(name))
    }

    /// Creates a folder with a fresh id, a name and the current creation time.
    pub fn named_folder(name: &str) -> Self {
        Self::new_folder(BookmarkId::new(), Self::initial_properties(name))
    }

    fn initial_properties(name: &str) -> Properties {
        let created = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let mut properties = Properties::new();
        properties.insert(PROPERTY_NAME.to_string(), name.to_string());
        properties.insert(PROPERTY_CREATED.to_string(), created.to_string());
        properties
    }

    pub fn is_folder(&self) -> bool {
        self.kind == BookmarkKind::Folder
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.property(PROPERTY_NAME)
    }

    pub fn comment(&self) -> Option<&str> {
        self.property(PROPERTY_COMMENT)
    }

    /// Creation time in UNIX seconds, if the property is present and well-formed.
    pub fn created(&self) -> Option<u64> {
        self.property(PROPERTY_CREATED).and_then(|v| v.parse().ok())
    }

    /// Returns a copy of this bookmark carrying different properties.
    pub fn with_properties(&self, properties: Properties) -> Self {
        Self {
            id: self.id.clone(),
            kind: self.kind,
            properties,
        }
    }
}
