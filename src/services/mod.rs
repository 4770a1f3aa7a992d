// Bookmarks services
// Services provide functional engines: merging, persistence, remote stores and sync,
// recent bookmarks and settings.

pub mod file_remote_store;
pub mod merge_engine;
pub mod persistence;
pub mod recent_bookmarks;
pub mod remote_store;
pub mod remote_sync;
pub mod settings_engine;
