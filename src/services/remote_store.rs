//! Remote bookmark store contract.
//!
//! A remote store holds shared folders, each as a subtree with a version
//! token. Saves are compare-and-swap on that token; the store never retries
//! or merges on its own. All calls are blocking and observe a cooperative
//! [`CancellationToken`] at every I/O boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::tree::BookmarksTree;
use crate::types::bookmark::{BookmarkId, Properties};
use crate::types::errors::RemoteError;
use crate::types::remote::{
    RemoteBookmarkFolder, RemoteBookmarksTree, RemoteStoreDescriptor, RemoteStoreState,
};

/// Cooperative cancellation flag shared between a caller and a remote call.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fails with `RemoteError::Cancelled` once cancellation was requested.
    pub fn check(&self) -> Result<(), RemoteError> {
        if self.is_cancelled() {
            Err(RemoteError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Notified on every state transition of a remote store.
pub trait RemoteStoreListener: Send + Sync {
    fn state_changed(&self, store_id: &str, state: RemoteStoreState);
}

impl<F> RemoteStoreListener for F
where
    F: Fn(&str, RemoteStoreState) + Send + Sync,
{
    fn state_changed(&self, store_id: &str, state: RemoteStoreState) {
        self(store_id, state)
    }
}

/// Trait defining a remote bookmark store.
pub trait RemoteBookmarksStore: Send + Sync {
    fn descriptor(&self) -> &RemoteStoreDescriptor;

    fn state(&self) -> RemoteStoreState;

    fn add_listener(&self, listener: Arc<dyn RemoteStoreListener>);

    /// `disconnected → connecting → connected`, or `connecting → disconnectedWithError`.
    /// A cancelled connect ends in `Disconnected`.
    fn connect(&self, cancel: &CancellationToken) -> Result<(), RemoteError>;

    fn disconnect(&self, cancel: &CancellationToken) -> Result<(), RemoteError>;

    /// Folders currently shared with this store.
    fn remote_folders(&self) -> Vec<RemoteBookmarkFolder>;

    fn remote_folder(&self, folder_id: &BookmarkId) -> Option<RemoteBookmarkFolder> {
        self.remote_folders()
            .into_iter()
            .find(|f| f.folder_id == *folder_id)
    }

    /// Starts sharing `subtree` (rooted at the shared folder). Returns the
    /// stored tree with its first version token.
    fn add(
        &self,
        subtree: &BookmarksTree,
        properties: Properties,
        cancel: &CancellationToken,
    ) -> Result<RemoteBookmarksTree, RemoteError>;

    /// Stops sharing a folder.
    fn remove(&self, folder_id: &BookmarkId, cancel: &CancellationToken) -> Result<(), RemoteError>;

    fn load(
        &self,
        folder_id: &BookmarkId,
        cancel: &CancellationToken,
    ) -> Result<RemoteBookmarksTree, RemoteError>;

    /// Replaces the remote subtree if `version` is still current.
    ///
    /// # Errors
    /// `RemoteError::Conflict` when the remote version moved on.
    fn save(
        &self,
        subtree: &BookmarksTree,
        folder_id: &BookmarkId,
        version: &str,
        cancel: &CancellationToken,
    ) -> Result<String, RemoteError>;
}

/// Connection state machine shared by store implementations.
pub struct RemoteStoreStatus {
    store_id: String,
    state: Mutex<RemoteStoreState>,
    last_error: Mutex<Option<String>>,
    listeners: Mutex<Vec<Arc<dyn RemoteStoreListener>>>,
}

impl RemoteStoreStatus {
    pub fn new(store_id: &str) -> Self {
        Self {
            store_id: store_id.to_string(),
            state: Mutex::new(RemoteStoreState::Disconnected),
            last_error: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> RemoteStoreState {
        *self.state.lock()
    }

    /// Message of the failure that led to `DisconnectedWithError`.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    pub fn add_listener(&self, listener: Arc<dyn RemoteStoreListener>) {
        self.listeners.lock().push(listener);
    }

    pub fn ensure_connected(&self) -> Result<(), RemoteError> {
        match self.state() {
            RemoteStoreState::Connected => Ok(()),
            _ => Err(RemoteError::NotConnected(self.store_id.clone())),
        }
    }

    /// Runs `open` between `Connecting` and its outcome state. Connecting an
    /// already connected store is a no-op.
    pub fn connect_with<F>(&self, open: F) -> Result<(), RemoteError>
    where
        F: FnOnce() -> Result<(), RemoteError>,
    {
        {
            let mut state = self.state.lock();
            match *state {
                RemoteStoreState::Connected => return Ok(()),
                RemoteStoreState::Connecting => {
                    return Err(RemoteError::InvalidState(format!(
                        "{} is already connecting",
                        self.store_id
                    )))
                }
                RemoteStoreState::Disconnected | RemoteStoreState::DisconnectedWithError => {
                    *state = RemoteStoreState::Connecting;
                }
            }
        }
        self.notify(RemoteStoreState::Connecting);

        let result = open();
        let outcome = match &result {
            Ok(()) => RemoteStoreState::Connected,
            Err(RemoteError::Cancelled) => RemoteStoreState::Disconnected,
            Err(_) => RemoteStoreState::DisconnectedWithError,
        };
        *self.last_error.lock() = result.as_ref().err().map(ToString::to_string);
        self.transition(outcome);
        result
    }

    /// Moves to `Disconnected`, whatever the current state.
    pub fn disconnect(&self) {
        if self.state() != RemoteStoreState::Disconnected {
            self.transition(RemoteStoreState::Disconnected);
        }
    }

    fn transition(&self, next: RemoteStoreState) {
        *self.state.lock() = next;
        self.notify(next);
    }

    fn notify(&self, state: RemoteStoreState) {
        info!(store = %self.store_id, ?state, "remote store state changed");
        let listeners = self.listeners.lock().clone();
        for listener in &listeners {
            listener.state_changed(&self.store_id, state);
        }
    }
}
