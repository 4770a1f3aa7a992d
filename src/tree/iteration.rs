//! Deterministic tree traversal.
//!
//! Pre-order visits a folder before its children; post-order visits children
//! first. Children are always visited in stored order, which gives the merge
//! engine a canonical order to correlate nodes across tree versions.

use crate::tree::bookmarks_tree::BookmarksTree;
use crate::types::bookmark::{Bookmark, BookmarkId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalOrder {
    PreOrder,
    PostOrder,
}

/// Iterator over the bookmarks of a (sub)tree.
///
/// An unknown start id yields an empty iteration.
pub struct BookmarksTreeIterator<'a> {
    tree: &'a BookmarksTree,
    order: TraversalOrder,
    // (id, children already pushed); the flag is only used in post-order
    stack: Vec<(&'a BookmarkId, bool)>,
}

impl<'a> BookmarksTreeIterator<'a> {
    pub fn new(tree: &'a BookmarksTree, start: &BookmarkId, order: TraversalOrder) -> Self {
        let stack = match tree.get_bookmark(start) {
            Some(bookmark) => vec![(&bookmark.id, false)],
            None => Vec::new(),
        };
        Self { tree, order, stack }
    }

    fn push_children(&mut self, id: &BookmarkId) {
        let children = self.tree.children_ids(id);
        self.stack.extend(children.iter().rev().map(|c| (c, false)));
    }
}

impl<'a> Iterator for BookmarksTreeIterator<'a> {
    type Item = &'a Bookmark;

    fn next(&mut self) -> Option<Self::Item> {
        match self.order {
            TraversalOrder::PreOrder => {
                let (id, _) = self.stack.pop()?;
                self.push_children(id);
                self.tree.get_bookmark(id)
            }
            TraversalOrder::PostOrder => loop {
                let (id, expanded) = self.stack.pop()?;
                if expanded || self.tree.children_ids(id).is_empty() {
                    return self.tree.get_bookmark(id);
                }
                self.stack.push((id, true));
                self.push_children(id);
            },
        }
    }
}
