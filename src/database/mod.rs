//! Bookmark database layer.
//!
//! Provides the transactional [`BookmarkDatabase`], the [`BookmarksTreeModifier`]
//! its transactions run against, and the validation policies they consult.
//!
//! # Usage
//!
//! ```
//! use bookmarks_core::database::BookmarkDatabase;
//! use bookmarks_core::tree::BookmarksTree;
//! use bookmarks_core::types::bookmark::Bookmark;
//!
//! let root = Bookmark::named_folder("root");
//! let root_id = root.id.clone();
//! let db = BookmarkDatabase::new(BookmarksTree::new(root).unwrap());
//!
//! db.modify(|m| m.add_bookmarks(&root_id, None, vec![Bookmark::named("Rust")]))
//!     .unwrap();
//! assert_eq!(db.get_bookmarks_tree().children_ids(&root_id).len(), 1);
//! ```

pub mod bookmark_database;
pub mod modifier;
pub mod validation;

pub use bookmark_database::{BookmarkDatabase, BookmarksListener};
pub use modifier::BookmarksTreeModifier;
pub use validation::{AcceptAllValidator, CompositeValidator, ModificationValidator};
