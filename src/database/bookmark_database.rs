//! Owner of the authoritative bookmarks tree.
//!
//! Provides the [`BookmarkDatabase`] struct: lock-free snapshot reads, one
//! writer at a time, and synchronous listener notification after every
//! committed transaction.

use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard, RwLock};
use tracing::debug;

use crate::database::modifier::BookmarksTreeModifier;
use crate::database::validation::{AcceptAllValidator, ModificationValidator};
use crate::tree::BookmarksTree;
use crate::types::errors::BookmarkError;
use crate::types::modification::Modification;

/// Receives the modification log of each committed transaction.
///
/// Called on the writer's thread while the writer lock is held. Listeners
/// must not modify the database from inside the callback; long work should
/// be handed off to another thread with the modifications passed by value.
pub trait BookmarksListener: Send + Sync {
    fn bookmarks_modified(&self, modifications: &[Modification]);
}

impl<F> BookmarksListener for F
where
    F: Fn(&[Modification]) + Send + Sync,
{
    fn bookmarks_modified(&self, modifications: &[Modification]) {
        self(modifications)
    }
}

/// Transactional store for one bookmarks tree.
pub struct BookmarkDatabase {
    tree: RwLock<Arc<BookmarksTree>>,
    write_lock: Mutex<()>,
    writer: Mutex<Option<ThreadId>>,
    listeners: RwLock<Vec<Arc<dyn BookmarksListener>>>,
    validator: Arc<dyn ModificationValidator>,
}

impl BookmarkDatabase {
    /// Creates a database whose transactions accept every edit.
    pub fn new(tree: BookmarksTree) -> Self {
        Self::with_validator(tree, Arc::new(AcceptAllValidator))
    }

    /// Creates a database validating every edit with `validator`.
    pub fn with_validator(tree: BookmarksTree, validator: Arc<dyn ModificationValidator>) -> Self {
        Self {
            tree: RwLock::new(Arc::new(tree)),
            write_lock: Mutex::new(()),
            writer: Mutex::new(None),
            listeners: RwLock::new(Vec::new()),
            validator,
        }
    }

    /// Returns the current tree snapshot. Never observes a partial transaction.
    pub fn get_bookmarks_tree(&self) -> Arc<BookmarksTree> {
        self.tree.read().clone()
    }

    pub fn add_listener(&self, listener: Arc<dyn BookmarksListener>) {
        self.listeners.write().push(listener);
    }

    /// Removes a listener previously added with [`add_listener`](Self::add_listener).
    pub fn remove_listener(&self, listener: &Arc<dyn BookmarksListener>) {
        self.listeners
            .write()
            .retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Runs `edit` against a fresh modifier on the current tree using the
    /// database validator, then commits atomically and notifies listeners.
    ///
    /// Blocks while another writer is active. Returns the committed log.
    ///
    /// # Errors
    /// Any error returned by `edit`, `BookmarkError::Validation` if an edit was
    /// rejected, or `BookmarkError::Reentrant` when called from a listener.
    pub fn modify<F>(&self, edit: F) -> Result<Vec<Modification>, BookmarkError>
    where
        F: FnOnce(&mut BookmarksTreeModifier) -> Result<(), BookmarkError>,
    {
        self.modify_with(self.validator.clone(), edit)
    }

    /// Like [`modify`](Self::modify) but validating with `validator`.
    pub fn modify_with<F>(
        &self,
        validator: Arc<dyn ModificationValidator>,
        edit: F,
    ) -> Result<Vec<Modification>, BookmarkError>
    where
        F: FnOnce(&mut BookmarksTreeModifier) -> Result<(), BookmarkError>,
    {
        self.check_reentrancy()?;
        let guard = self.write_lock.lock();
        self.run_transaction(guard, validator, edit)
    }

    /// Like [`modify`](Self::modify) but gives up after waiting `timeout`
    /// for the writer lock.
    ///
    /// # Errors
    /// `BookmarkError::LockTimeout` if another writer held the lock too long.
    pub fn try_modify<F>(
        &self,
        timeout: Duration,
        edit: F,
    ) -> Result<Vec<Modification>, BookmarkError>
    where
        F: FnOnce(&mut BookmarksTreeModifier) -> Result<(), BookmarkError>,
    {
        self.check_reentrancy()?;
        let guard = self.write_lock.try_lock_for(timeout).ok_or_else(|| {
            BookmarkError::LockTimeout(format!("writer lock not acquired within {:?}", timeout))
        })?;
        self.run_transaction(guard, self.validator.clone(), edit)
    }

    fn check_reentrancy(&self) -> Result<(), BookmarkError> {
        if *self.writer.lock() == Some(thread::current().id()) {
            return Err(BookmarkError::Reentrant);
        }
        Ok(())
    }

    fn run_transaction<F>(
        &self,
        _guard: MutexGuard<'_, ()>,
        validator: Arc<dyn ModificationValidator>,
        edit: F,
    ) -> Result<Vec<Modification>, BookmarkError>
    where
        F: FnOnce(&mut BookmarksTreeModifier) -> Result<(), BookmarkError>,
    {
        let _mark = WriterMark::new(&self.writer);
        self.apply_and_notify(validator, edit)
    }

    fn apply_and_notify<F>(
        &self,
        validator: Arc<dyn ModificationValidator>,
        edit: F,
    ) -> Result<Vec<Modification>, BookmarkError>
    where
        F: FnOnce(&mut BookmarksTreeModifier) -> Result<(), BookmarkError>,
    {
        let mut modifier = BookmarksTreeModifier::new(self.get_bookmarks_tree(), validator);
        edit(&mut modifier)?;
        if let Some(reason) = modifier.rejection() {
            return Err(BookmarkError::Validation(reason.to_string()));
        }
        if modifier.modifications().is_empty() {
            return Ok(Vec::new());
        }

        let new_tree = modifier.current_tree().clone();
        let modifications = modifier.into_modifications();
        *self.tree.write() = new_tree;
        debug!(count = modifications.len(), "committed bookmarks transaction");

        let listeners = self.listeners.read().clone();
        for listener in &listeners {
            listener.bookmarks_modified(&modifications);
        }
        Ok(modifications)
    }
}

/// Records the writing thread for the duration of a transaction.
struct WriterMark<'a>(&'a Mutex<Option<ThreadId>>);

impl<'a> WriterMark<'a> {
    fn new(slot: &'a Mutex<Option<ThreadId>>) -> Self {
        *slot.lock() = Some(thread::current().id());
        Self(slot)
    }
}

impl Drop for WriterMark<'_> {
    fn drop(&mut self) {
        *self.0.lock() = None;
    }
}
