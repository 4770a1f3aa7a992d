//! Unit tests for the directory-backed remote store: connection lifecycle,
//! version tokens and compare-and-swap saves.

use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use tempfile::TempDir;

use bookmarks_core::services::file_remote_store::FileRemoteStore;
use bookmarks_core::services::remote_store::{CancellationToken, RemoteBookmarksStore};
use bookmarks_core::tree::BookmarksTree;
use bookmarks_core::types::bookmark::{Bookmark, BookmarkId, Properties};
use bookmarks_core::types::errors::RemoteError;
use bookmarks_core::types::remote::{RemoteStoreDescriptor, RemoteStoreState, PROPERTY_READONLY};

fn id(s: &str) -> BookmarkId {
    BookmarkId::from(s)
}

fn descriptor() -> RemoteStoreDescriptor {
    RemoteStoreDescriptor {
        id: "files".to_string(),
        label: "Shared directory".to_string(),
    }
}

fn shared_tree(children: &[&str]) -> BookmarksTree {
    let bookmarks = children
        .iter()
        .map(|c| Bookmark::new(id(c), Properties::new()))
        .collect();
    BookmarksTree::new(Bookmark::new_folder(id("shared"), Properties::new()))
        .unwrap()
        .add_bookmarks(&id("shared"), None, bookmarks)
        .unwrap()
}

fn connected_store(dir: &TempDir) -> FileRemoteStore {
    let store = FileRemoteStore::open(descriptor(), dir.path().join("remote")).unwrap();
    store.connect(&CancellationToken::new()).unwrap();
    store
}

#[test]
fn test_connect_reports_state_transitions() {
    let dir = TempDir::new().unwrap();
    let store = FileRemoteStore::open(descriptor(), dir.path().join("remote")).unwrap();
    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = states.clone();
    store.add_listener(Arc::new(move |store_id: &str, state: RemoteStoreState| {
        assert_eq!(store_id, "files");
        sink.lock().unwrap().push(state);
    }));

    assert_eq!(store.state(), RemoteStoreState::Disconnected);
    store.connect(&CancellationToken::new()).unwrap();
    store.disconnect(&CancellationToken::new()).unwrap();

    assert_eq!(
        *states.lock().unwrap(),
        vec![
            RemoteStoreState::Connecting,
            RemoteStoreState::Connected,
            RemoteStoreState::Disconnected,
        ]
    );
    assert!(dir.path().join("remote").is_dir());
}

#[test]
fn test_connect_failure_ends_disconnected_with_error() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-directory");
    std::fs::write(&blocker, b"occupied").unwrap();

    let store = FileRemoteStore::open(descriptor(), blocker.join("remote")).unwrap();
    let err = store.connect(&CancellationToken::new()).unwrap_err();

    assert!(matches!(err, RemoteError::Io(_)));
    assert_eq!(store.state(), RemoteStoreState::DisconnectedWithError);
    assert!(store.last_error().is_some());
}

#[test]
fn test_cancelled_connect_ends_disconnected() {
    let dir = TempDir::new().unwrap();
    let store = FileRemoteStore::open(descriptor(), dir.path().join("remote")).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    assert_eq!(store.connect(&cancel).unwrap_err(), RemoteError::Cancelled);
    assert_eq!(store.state(), RemoteStoreState::Disconnected);
}

#[test]
fn test_operations_require_connection() {
    let dir = TempDir::new().unwrap();
    let store = FileRemoteStore::open(descriptor(), dir.path().join("remote")).unwrap();
    let err = store
        .add(&shared_tree(&[]), Properties::new(), &CancellationToken::new())
        .unwrap_err();
    assert_eq!(err, RemoteError::NotConnected("files".to_string()));
}

#[test]
fn test_added_folder_loads_with_first_version() {
    let dir = TempDir::new().unwrap();
    let store = connected_store(&dir);
    let cancel = CancellationToken::new();

    let mut properties = Properties::new();
    properties.insert(PROPERTY_READONLY.to_string(), "true".to_string());
    let stored = store.add(&shared_tree(&["a"]), properties, &cancel).unwrap();
    assert_eq!(stored.version, "1");

    let loaded = store.load(&id("shared"), &cancel).unwrap();
    assert_eq!(loaded.version, "1");
    assert_eq!(loaded.tree, shared_tree(&["a"]));
    assert_eq!(loaded.store_id, "files");

    let folder = store.remote_folder(&id("shared")).unwrap();
    assert!(folder.is_read_only());
}

#[test]
fn test_adding_twice_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = connected_store(&dir);
    let cancel = CancellationToken::new();
    store.add(&shared_tree(&[]), Properties::new(), &cancel).unwrap();

    assert_eq!(
        store.add(&shared_tree(&[]), Properties::new(), &cancel).unwrap_err(),
        RemoteError::AlreadyShared("shared".to_string())
    );
}

#[test]
fn test_save_advances_version() {
    let dir = TempDir::new().unwrap();
    let store = connected_store(&dir);
    let cancel = CancellationToken::new();
    store.add(&shared_tree(&["a"]), Properties::new(), &cancel).unwrap();

    let version = store
        .save(&shared_tree(&["a", "b"]), &id("shared"), "1", &cancel)
        .unwrap();
    assert_eq!(version, "2");

    let loaded = store.load(&id("shared"), &cancel).unwrap();
    assert_eq!(loaded.version, "2");
    assert_eq!(loaded.tree, shared_tree(&["a", "b"]));
}

/// Folder documents in the store directory, excluding the index.
fn documents(dir: &TempDir) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir.path().join("remote"))
        .unwrap()
        .map(|entry| entry.unwrap())
        .filter(|entry| entry.path().is_file())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".json") && name != "index.json")
        .collect();
    names.sort();
    names
}

#[test]
fn test_save_replaces_document() {
    let dir = TempDir::new().unwrap();
    let store = connected_store(&dir);
    let cancel = CancellationToken::new();
    store.add(&shared_tree(&["a"]), Properties::new(), &cancel).unwrap();
    let first = documents(&dir);
    assert_eq!(first.len(), 1);

    store.save(&shared_tree(&["a", "b"]), &id("shared"), "1", &cancel).unwrap();
    let second = documents(&dir);
    assert_eq!(second.len(), 1);
    assert_ne!(first, second);
}

#[test]
fn test_failed_index_write_keeps_previous_version() {
    let dir = TempDir::new().unwrap();
    let store = connected_store(&dir);
    let cancel = CancellationToken::new();
    store.add(&shared_tree(&["a"]), Properties::new(), &cancel).unwrap();
    let before = documents(&dir);

    // A non-empty directory in place of the index makes the replace fail.
    let index = dir.path().join("remote").join("index.json");
    std::fs::remove_file(&index).unwrap();
    std::fs::create_dir(&index).unwrap();
    std::fs::write(index.join("blocker"), b"x").unwrap();

    let err = store
        .save(&shared_tree(&["a", "b"]), &id("shared"), "1", &cancel)
        .unwrap_err();
    assert!(matches!(err, RemoteError::Io(_)), "got {:?}", err);

    let loaded = store.load(&id("shared"), &cancel).unwrap();
    assert_eq!(loaded.version, "1");
    assert_eq!(loaded.tree, shared_tree(&["a"]));
    assert_eq!(documents(&dir), before);

    std::fs::remove_dir_all(&index).unwrap();
    let version = store
        .save(&shared_tree(&["a", "b"]), &id("shared"), "1", &cancel)
        .unwrap();
    assert_eq!(version, "2");
    assert_eq!(store.load(&id("shared"), &cancel).unwrap().tree, shared_tree(&["a", "b"]));
}

#[test]
fn test_failed_add_leaves_no_document() {
    let dir = TempDir::new().unwrap();
    let store = connected_store(&dir);
    let index = dir.path().join("remote").join("index.json");
    std::fs::create_dir(&index).unwrap();
    std::fs::write(index.join("blocker"), b"x").unwrap();

    let err = store
        .add(&shared_tree(&["a"]), Properties::new(), &CancellationToken::new())
        .unwrap_err();
    assert!(matches!(err, RemoteError::Io(_)), "got {:?}", err);
    assert!(store.remote_folders().is_empty());
    assert!(documents(&dir).is_empty());
}

#[test]
fn test_stale_save_conflicts_and_keeps_remote() {
    let dir = TempDir::new().unwrap();
    let store = connected_store(&dir);
    let cancel = CancellationToken::new();
    store.add(&shared_tree(&["a"]), Properties::new(), &cancel).unwrap();
    store.save(&shared_tree(&["a", "b"]), &id("shared"), "1", &cancel).unwrap();

    let err = store
        .save(&shared_tree(&["c"]), &id("shared"), "1", &cancel)
        .unwrap_err();
    assert_eq!(
        err,
        RemoteError::Conflict {
            folder_id: "shared".to_string(),
            expected: "1".to_string(),
            actual: "2".to_string(),
        }
    );
    assert_eq!(store.load(&id("shared"), &cancel).unwrap().tree, shared_tree(&["a", "b"]));
}

#[test]
fn test_concurrent_saves_with_same_token_admit_one() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(connected_store(&dir));
    store
        .add(&shared_tree(&[]), Properties::new(), &CancellationToken::new())
        .unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = ["left", "right"]
        .into_iter()
        .map(|child| {
            let store = store.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                store.save(&shared_tree(&[child]), &id("shared"), "1", &CancellationToken::new())
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let conflicted = results
        .iter()
        .filter(|r| matches!(r, Err(RemoteError::Conflict { .. })))
        .count();
    assert_eq!((succeeded, conflicted), (1, 1));
    assert_eq!(
        store.load(&id("shared"), &CancellationToken::new()).unwrap().version,
        "2"
    );
}

#[test]
fn test_save_rejects_subtree_of_other_folder() {
    let dir = TempDir::new().unwrap();
    let store = connected_store(&dir);
    let cancel = CancellationToken::new();
    store.add(&shared_tree(&[]), Properties::new(), &cancel).unwrap();

    assert!(matches!(
        store.save(&shared_tree(&[]), &id("elsewhere"), "1", &cancel),
        Err(RemoteError::InvalidState(_))
    ));
}

#[test]
fn test_cancelled_load_is_reported() {
    let dir = TempDir::new().unwrap();
    let store = connected_store(&dir);
    store
        .add(&shared_tree(&[]), Properties::new(), &CancellationToken::new())
        .unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    assert_eq!(store.load(&id("shared"), &cancel).unwrap_err(), RemoteError::Cancelled);
    assert_eq!(store.state(), RemoteStoreState::Connected);
}

#[test]
fn test_remove_forgets_folder() {
    let dir = TempDir::new().unwrap();
    let store = connected_store(&dir);
    let cancel = CancellationToken::new();
    store.add(&shared_tree(&[]), Properties::new(), &cancel).unwrap();

    store.remove(&id("shared"), &cancel).unwrap();
    assert!(store.remote_folders().is_empty());
    assert_eq!(
        store.load(&id("shared"), &cancel).unwrap_err(),
        RemoteError::FolderNotFound("shared".to_string())
    );
    assert_eq!(
        store.remove(&id("shared"), &cancel).unwrap_err(),
        RemoteError::FolderNotFound("shared".to_string())
    );
}

#[test]
fn test_index_persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let store = connected_store(&dir);
        let cancel = CancellationToken::new();
        store.add(&shared_tree(&["a"]), Properties::new(), &cancel).unwrap();
        store.save(&shared_tree(&["a", "b"]), &id("shared"), "1", &cancel).unwrap();
    }

    let reopened = FileRemoteStore::open(descriptor(), dir.path().join("remote")).unwrap();
    assert_eq!(reopened.remote_folders().len(), 1);
    reopened.connect(&CancellationToken::new()).unwrap();
    let loaded = reopened.load(&id("shared"), &CancellationToken::new()).unwrap();
    assert_eq!(loaded.version, "2");
    assert_eq!(loaded.tree, shared_tree(&["a", "b"]));
}
