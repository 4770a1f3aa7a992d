//! SQLite storage layer.
//!
//! Provides connection management, schema migrations, and snapshot
//! persistence for the local tree and the sync ancestors.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use bookmarks_core::storage::{Database, SnapshotStore};
//!
//! let db = Arc::new(Database::open("bookmarks.db").expect("failed to open database"));
//! let snapshots = SnapshotStore::new(db);
//! let restored = snapshots.load_local_tree().expect("failed to read snapshot");
//! ```

pub mod connection;
pub mod migrations;
pub mod snapshot_store;

pub use connection::Database;
pub use snapshot_store::{SnapshotStore, SyncStateRepository};
