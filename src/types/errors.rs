use std::fmt;

// === BookmarkError ===

/// Errors raised by tree edits and bookmark database transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookmarkError {
    /// Bookmark with the given ID was not found.
    NotFound(String),
    /// The bookmark exists but is not a folder.
    NotAFolder(String),
    /// A bookmark with the given ID is already part of the tree.
    AlreadyExists(String),
    /// Folder still has children and cascading delete was not requested.
    NotEmpty(String),
    /// The move would make a folder its own descendant.
    Cycle(String),
    /// The operation is not permitted on the root folder.
    RootFolder(String),
    /// A validator rejected the transaction.
    Validation(String),
    /// The writer lock could not be acquired in time.
    LockTimeout(String),
    /// A listener tried to modify the database from inside its callback.
    Reentrant,
}

impl fmt::Display for BookmarkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookmarkError::NotFound(id) => write!(f, "Bookmark not found: {}", id),
            BookmarkError::NotAFolder(id) => write!(f, "Bookmark is not a folder: {}", id),
            BookmarkError::AlreadyExists(id) => write!(f, "Bookmark already exists: {}", id),
            BookmarkError::NotEmpty(id) => write!(f, "Bookmark folder is not empty: {}", id),
            BookmarkError::Cycle(id) => {
                write!(f, "Move would create a cycle at: {}", id)
            }
            BookmarkError::RootFolder(id) => {
                write!(f, "Operation not permitted on root folder: {}", id)
            }
            BookmarkError::Validation(msg) => write!(f, "Modification rejected: {}", msg),
            BookmarkError::LockTimeout(msg) => write!(f, "Bookmark database busy: {}", msg),
            BookmarkError::Reentrant => {
                write!(f, "Bookmark database cannot be modified from a listener")
            }
        }
    }
}

impl std::error::Error for BookmarkError {}

// === RemoteError ===

/// Errors raised by remote bookmark stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The supplied version token no longer matches the remote one.
    Conflict {
        folder_id: String,
        expected: String,
        actual: String,
    },
    /// The operation observed a cancellation request.
    Cancelled,
    /// Transport or file system failure.
    Io(String),
    /// The store is not connected.
    NotConnected(String),
    /// The folder is not shared with this store.
    FolderNotFound(String),
    /// The folder is already shared.
    AlreadyShared(String),
    /// Sharing the folder would nest remote folders.
    Nested(String),
    /// The store state machine refused the transition.
    InvalidState(String),
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::Conflict {
                folder_id,
                expected,
                actual,
            } => write!(
                f,
                "Remote conflict on {}: expected version {}, found {}",
                folder_id, expected, actual
            ),
            RemoteError::Cancelled => write!(f, "Remote operation cancelled"),
            RemoteError::Io(msg) => write!(f, "Remote I/O error: {}", msg),
            RemoteError::NotConnected(store) => {
                write!(f, "Remote store not connected: {}", store)
            }
            RemoteError::FolderNotFound(id) => write!(f, "Remote folder not found: {}", id),
            RemoteError::AlreadyShared(id) => write!(f, "Folder already shared: {}", id),
            RemoteError::Nested(id) => {
                write!(f, "Remote folders cannot be nested: {}", id)
            }
            RemoteError::InvalidState(msg) => write!(f, "Invalid remote store state: {}", msg),
        }
    }
}

impl std::error::Error for RemoteError {}

// === PersistenceError ===

/// Errors raised while serializing or deserializing bookmark trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    /// The document was written by a newer (or unknown) format version.
    UnsupportedVersion(u32),
    /// The document could not be encoded or decoded.
    SerializationError(String),
    /// Reading or writing the byte stream failed.
    IoError(String),
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceError::UnsupportedVersion(v) => {
                write!(f, "Unsupported bookmarks format version: {}", v)
            }
            PersistenceError::SerializationError(msg) => {
                write!(f, "Bookmarks serialization error: {}", msg)
            }
            PersistenceError::IoError(msg) => write!(f, "Bookmarks I/O error: {}", msg),
        }
    }
}

impl std::error::Error for PersistenceError {}

// === StorageError ===

/// Errors raised by the SQLite storage layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Database operation failed.
    DatabaseError(String),
    /// A stored tree could not be encoded or decoded.
    SerializationError(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::DatabaseError(msg) => write!(f, "Storage database error: {}", msg),
            StorageError::SerializationError(msg) => {
                write!(f, "Storage serialization error: {}", msg)
            }
        }
    }
}

impl std::error::Error for StorageError {}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::DatabaseError(e.to_string())
    }
}

impl From<PersistenceError> for StorageError {
    fn from(e: PersistenceError) -> Self {
        StorageError::SerializationError(e.to_string())
    }
}

// === SettingsError ===

/// Errors related to settings management.
#[derive(Debug)]
pub enum SettingsError {
    /// An I/O error occurred while reading or writing settings.
    IoError(String),
    /// Failed to serialize or deserialize settings.
    SerializationError(String),
    /// The provided settings key is invalid.
    InvalidKey(String),
    /// The provided settings value is invalid.
    InvalidValue(String),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::IoError(msg) => write!(f, "Settings I/O error: {}", msg),
            SettingsError::SerializationError(msg) => {
                write!(f, "Settings serialization error: {}", msg)
            }
            SettingsError::InvalidKey(key) => write!(f, "Invalid settings key: {}", key),
            SettingsError::InvalidValue(msg) => {
                write!(f, "Invalid settings value: {}", msg)
            }
        }
    }
}

impl std::error::Error for SettingsError {}

// === SyncError ===

/// Errors surfaced by the remote synchronization orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// A local transaction failed.
    Bookmark(BookmarkError),
    /// The remote store failed.
    Remote(RemoteError),
    /// Sync state could not be read or written.
    Storage(StorageError),
    /// No remote store is registered under the given ID.
    UnknownStore(String),
    /// The folder is not mapped to any remote store.
    NotShared(String),
}

impl SyncError {
    /// Whether the orchestrator may retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Remote(RemoteError::Conflict { .. }) | SyncError::Remote(RemoteError::Io(_))
        )
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Bookmark(e) => write!(f, "Sync failed locally: {}", e),
            SyncError::Remote(e) => write!(f, "Sync failed remotely: {}", e),
            SyncError::Storage(e) => write!(f, "Sync state error: {}", e),
            SyncError::UnknownStore(id) => write!(f, "Unknown remote store: {}", id),
            SyncError::NotShared(id) => write!(f, "Folder is not shared: {}", id),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<BookmarkError> for SyncError {
    fn from(e: BookmarkError) -> Self {
        SyncError::Bookmark(e)
    }
}

impl From<RemoteError> for SyncError {
    fn from(e: RemoteError) -> Self {
        SyncError::Remote(e)
    }
}

impl From<StorageError> for SyncError {
    fn from(e: StorageError) -> Self {
        SyncError::Storage(e)
    }
}
