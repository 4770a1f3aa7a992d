use serde::{Deserialize, Serialize};

/// Top-level settings container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BookmarksSettings {
    pub sync: SyncSettings,
    pub recents: RecentsSettings,
    pub storage: StorageSettings,
}

/// Remote synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncSettings {
    /// Quiet period before a burst of local edits is pushed to remote stores.
    pub debounce_ms: u64,
    /// Upper bound on save attempts in one reload → merge → save loop.
    pub max_save_attempts: u32,
    pub property_conflict_policy: PropertyConflictPolicy,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 2000,
            max_save_attempts: 3,
            property_conflict_policy: PropertyConflictPolicy::RemoteWins,
        }
    }
}

/// Which side wins when both changed the same property to different values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PropertyConflictPolicy {
    #[default]
    RemoteWins,
    LocalWins,
}

/// Recent bookmarks settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecentsSettings {
    pub capacity: usize,
}

impl Default for RecentsSettings {
    fn default() -> Self {
        Self { capacity: 20 }
    }
}

/// Local persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageSettings {
    /// Quiet period before the local tree is written to storage.
    pub auto_save_debounce_ms: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            auto_save_debounce_ms: 1000,
        }
    }
}
