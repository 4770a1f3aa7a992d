// Bookmarks persistence codec
// Serializes a (sub)tree into a versioned JSON document and back.
// Documents written by an unknown format version are rejected up front.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::tree::BookmarksTree;
use crate::types::bookmark::{Bookmark, BookmarkId, BookmarkKind, Properties};
use crate::types::errors::PersistenceError;

/// Format version written by this codec. Bump when the document layout changes.
pub const FORMAT_VERSION: u32 = 1;

/// Trait defining the tree serialization interface.
pub trait BookmarksTreeSerializer {
    /// Writes the subtree rooted at `subtree_root` to `writer`.
    fn serialize(
        &self,
        tree: &BookmarksTree,
        subtree_root: &BookmarkId,
        writer: &mut dyn Write,
    ) -> Result<(), PersistenceError>;
}

/// Trait defining the tree deserialization interface.
pub trait BookmarksTreeDeserializer {
    fn deserialize(&self, reader: &mut dyn Read) -> Result<BookmarksTree, PersistenceError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct TreeDocument {
    version: u32,
    root: NodeDocument,
}

#[derive(Debug, Serialize, Deserialize)]
struct NodeDocument {
    id: BookmarkId,
    kind: BookmarkKind,
    #[serde(default)]
    properties: Properties,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<NodeDocument>,
}

/// JSON codec for bookmarks trees.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBookmarksCodec {
    pretty: bool,
}

impl JsonBookmarksCodec {
    pub fn new() -> Self {
        Self { pretty: false }
    }

    /// Codec producing indented output.
    pub fn pretty() -> Self {
        Self { pretty: true }
    }

    pub fn to_bytes(
        &self,
        tree: &BookmarksTree,
        subtree_root: &BookmarkId,
    ) -> Result<Vec<u8>, PersistenceError> {
        let mut buffer = Vec::new();
        self.serialize(tree, subtree_root, &mut buffer)?;
        Ok(buffer)
    }

    pub fn from_bytes(&self, bytes: &[u8]) -> Result<BookmarksTree, PersistenceError> {
        let mut reader = bytes;
        self.deserialize(&mut reader)
    }

    fn to_document(
        tree: &BookmarksTree,
        id: &BookmarkId,
    ) -> Result<NodeDocument, PersistenceError> {
        let bookmark = tree.get_bookmark(id).ok_or_else(|| {
            PersistenceError::SerializationError(format!("unknown bookmark {}", id))
        })?;
        let children = tree
            .children_ids(id)
            .iter()
            .map(|child| Self::to_document(tree, child))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(NodeDocument {
            id: bookmark.id.clone(),
            kind: bookmark.kind,
            properties: bookmark.properties.clone(),
            children,
        })
    }

    fn to_tree(root: NodeDocument) -> Result<BookmarksTree, PersistenceError> {
        let invalid = |e: crate::types::errors::BookmarkError| {
            PersistenceError::SerializationError(e.to_string())
        };
        let NodeDocument {
            id,
            kind,
            properties,
            children,
        } = root;
        let mut tree = BookmarksTree::new(Bookmark { id: id.clone(), kind, properties })
            .map_err(invalid)?;

        let mut pending: Vec<(BookmarkId, Vec<NodeDocument>)> = vec![(id, children)];
        while let Some((parent_id, children)) = pending.pop() {
            for child in children {
                if child.kind == BookmarkKind::Bookmark && !child.children.is_empty() {
                    return Err(PersistenceError::SerializationError(format!(
                        "bookmark {} is not a folder but has children",
                        child.id
                    )));
                }
                let bookmark = Bookmark {
                    id: child.id.clone(),
                    kind: child.kind,
                    properties: child.properties,
                };
                tree.push_child(&parent_id, bookmark).map_err(invalid)?;
                if !child.children.is_empty() {
                    pending.push((child.id, child.children));
                }
            }
        }
        Ok(tree)
    }
}

impl BookmarksTreeSerializer for JsonBookmarksCodec {
    fn serialize(
        &self,
        tree: &BookmarksTree,
        subtree_root: &BookmarkId,
        writer: &mut dyn Write,
    ) -> Result<(), PersistenceError> {
        let document = TreeDocument {
            version: FORMAT_VERSION,
            root: Self::to_document(tree, subtree_root)?,
        };
        let result = if self.pretty {
            serde_json::to_writer_pretty(writer, &document)
        } else {
            serde_json::to_writer(writer, &document)
        };
        result.map_err(|e| {
            if e.is_io() {
                PersistenceError::IoError(e.to_string())
            } else {
                PersistenceError::SerializationError(e.to_string())
            }
        })
    }
}

impl BookmarksTreeDeserializer for JsonBookmarksCodec {
    fn deserialize(&self, reader: &mut dyn Read) -> Result<BookmarksTree, PersistenceError> {
        let mut content = Vec::new();
        reader
            .read_to_end(&mut content)
            .map_err(|e| PersistenceError::IoError(e.to_string()))?;

        // Check the version tag before interpreting anything else
        let value: serde_json::Value = serde_json::from_slice(&content)
            .map_err(|e| PersistenceError::SerializationError(e.to_string()))?;
        let version = value
            .get("version")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| {
                PersistenceError::SerializationError("missing format version".to_string())
            })?;
        if version != u64::from(FORMAT_VERSION) {
            return Err(PersistenceError::UnsupportedVersion(
                u32::try_from(version).unwrap_or(u32::MAX),
            ));
        }

        let document: TreeDocument = serde_json::from_value(value)
            .map_err(|e| PersistenceError::SerializationError(e.to_string()))?;
        Self::to_tree(document.root)
    }
}
