//! Bookmarks core: a versioned bookmark tree with transactional edits,
//! local persistence and three-way synchronization with remote stores.
//!
//! This library crate exposes all modules for use by embedding applications
//! and integration tests.

pub mod database;
pub mod managers;
pub mod services;
pub mod storage;
pub mod tree;
pub mod types;
