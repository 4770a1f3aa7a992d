use std::sync::Arc;

use crate::tree::{BookmarksTree, TraversalOrder};
use crate::types::bookmark::{Bookmark, BookmarkId, Properties};
use crate::types::errors::BookmarkError;

/// One atomic, replayable tree edit.
///
/// Every variant carries the tree before (`source_tree`) and after
/// (`target_tree`) the edit.
#[derive(Debug, Clone)]
pub enum Modification {
    Added {
        parent_id: BookmarkId,
        after_id: Option<BookmarkId>,
        bookmarks: Vec<Bookmark>,
        source_tree: Arc<BookmarksTree>,
        target_tree: Arc<BookmarksTree>,
    },
    Deleted {
        bookmark_id: BookmarkId,
        parent_id: BookmarkId,
        delete_children: bool,
        source_tree: Arc<BookmarksTree>,
        target_tree: Arc<BookmarksTree>,
    },
    Moved {
        bookmark_ids: Vec<BookmarkId>,
        new_parent_id: BookmarkId,
        after_id: Option<BookmarkId>,
        source_tree: Arc<BookmarksTree>,
        target_tree: Arc<BookmarksTree>,
    },
    PropertiesChanged {
        bookmark_id: BookmarkId,
        old_properties: Properties,
        new_properties: Properties,
        source_tree: Arc<BookmarksTree>,
        target_tree: Arc<BookmarksTree>,
    },
}

impl Modification {
    pub fn source_tree(&self) -> &Arc<BookmarksTree> {
        match self {
            Modification::Added { source_tree, .. }
            | Modification::Deleted { source_tree, .. }
            | Modification::Moved { source_tree, .. }
            | Modification::PropertiesChanged { source_tree, .. } => source_tree,
        }
    }

    pub fn target_tree(&self) -> &Arc<BookmarksTree> {
        match self {
            Modification::Added { target_tree, .. }
            | Modification::Deleted { target_tree, .. }
            | Modification::Moved { target_tree, .. }
            | Modification::PropertiesChanged { target_tree, .. } => target_tree,
        }
    }

    /// Ids touched by this edit that exist in the source tree.
    ///
    /// A deletion touches the deleted bookmark and all of its descendants.
    pub fn source_ids(&self) -> Vec<BookmarkId> {
        match self {
            Modification::Added { parent_id, .. } => vec![parent_id.clone()],
            Modification::Deleted {
                bookmark_id,
                source_tree,
                ..
            } => source_tree
                .iter_from(bookmark_id, TraversalOrder::PreOrder)
                .map(|b| b.id.clone())
                .collect(),
            Modification::Moved { bookmark_ids, .. } => bookmark_ids.clone(),
            Modification::PropertiesChanged { bookmark_id, .. } => vec![bookmark_id.clone()],
        }
    }

    /// Ids touched by this edit that exist in the target tree.
    pub fn target_ids(&self) -> Vec<BookmarkId> {
        match self {
            Modification::Added { bookmarks, .. } => {
                bookmarks.iter().map(|b| b.id.clone()).collect()
            }
            Modification::Deleted { parent_id, .. } => vec![parent_id.clone()],
            Modification::Moved { bookmark_ids, .. } => bookmark_ids.clone(),
            Modification::PropertiesChanged { bookmark_id, .. } => vec![bookmark_id.clone()],
        }
    }

    /// Applies the same edit to another tree.
    pub fn replay(&self, tree: &BookmarksTree) -> Result<BookmarksTree, BookmarkError> {
        match self {
            Modification::Added {
                parent_id,
                after_id,
                bookmarks,
                ..
            } => tree.add_bookmarks(parent_id, after_id.as_ref(), bookmarks.clone()),
            Modification::Deleted {
                bookmark_id,
                delete_children,
                ..
            } => tree.delete_bookmark(bookmark_id, *delete_children),
            Modification::Moved {
                bookmark_ids,
                new_parent_id,
                after_id,
                ..
            } => tree.move_bookmarks(bookmark_ids, new_parent_id, after_id.as_ref()),
            Modification::PropertiesChanged {
                bookmark_id,
                new_properties,
                ..
            } => tree.set_properties(bookmark_id, new_properties.clone()),
        }
    }
}
