//! Persistent bookmarks tree and its traversal.

pub mod bookmarks_tree;
pub mod iteration;

pub use bookmarks_tree::BookmarksTree;
pub use iteration::{BookmarksTreeIterator, TraversalOrder};
