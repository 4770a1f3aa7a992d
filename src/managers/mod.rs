// Bookmarks state managers
// Managers are long-lived coordinators over the database: the remote store registry,
// the debounced batcher, the auto-saver and the sync scheduler.

pub mod auto_saver;
pub mod modification_batcher;
pub mod remote_store_manager;
pub mod sync_scheduler;
