//! Unit tests for BookmarkDatabase: atomic commits, listener notification,
//! writer exclusion and re-entrancy protection.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use bookmarks_core::database::{BookmarkDatabase, BookmarksListener};
use bookmarks_core::tree::BookmarksTree;
use bookmarks_core::types::bookmark::{Bookmark, BookmarkId, Properties};
use bookmarks_core::types::errors::BookmarkError;
use bookmarks_core::types::modification::Modification;

fn id(s: &str) -> BookmarkId {
    BookmarkId::from(s)
}

fn database() -> BookmarkDatabase {
    let tree = BookmarksTree::new(Bookmark::new_folder(id("root"), Properties::new()))
        .unwrap()
        .add_bookmarks(
            &id("root"),
            None,
            vec![Bookmark::new_folder(id("A"), Properties::new())],
        )
        .unwrap();
    BookmarkDatabase::new(tree)
}

/// Listener recording the size of every notified log.
fn recording_listener() -> (Arc<dyn BookmarksListener>, Arc<Mutex<Vec<usize>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink = calls.clone();
    let listener: Arc<dyn BookmarksListener> = Arc::new(move |mods: &[Modification]| {
        sink.lock().unwrap().push(mods.len());
    });
    (listener, calls)
}

#[test]
fn test_snapshots_are_not_affected_by_later_commits() {
    let db = database();
    let before = db.get_bookmarks_tree();

    db.modify(|m| m.add_bookmarks(&id("A"), None, vec![Bookmark::new(id("x"), Properties::new())]))
        .unwrap();

    assert!(!before.contains(&id("x")));
    assert!(db.get_bookmarks_tree().contains(&id("x")));
}

#[test]
fn test_listener_receives_the_whole_transaction() {
    let db = database();
    let (listener, calls) = recording_listener();
    db.add_listener(listener);

    let log = db
        .modify(|m| {
            m.add_bookmarks(&id("A"), None, vec![Bookmark::new(id("x"), Properties::new())])?;
            m.set_property_value(&id("x"), "name", Some("X"))?;
            m.move_bookmarks(&[id("x")], &id("root"), None)
        })
        .unwrap();

    assert_eq!(log.len(), 3);
    assert_eq!(*calls.lock().unwrap(), vec![3]);
}

#[test]
fn test_failed_transaction_changes_nothing() {
    let db = database();
    let (listener, calls) = recording_listener();
    db.add_listener(listener);
    let before = db.get_bookmarks_tree();

    let err = db
        .modify(|m| {
            m.add_bookmarks(&id("A"), None, vec![Bookmark::new(id("x"), Properties::new())])?;
            m.delete_bookmark(&id("missing"), false)
        })
        .unwrap_err();

    assert_eq!(err, BookmarkError::NotFound("missing".to_string()));
    assert!(Arc::ptr_eq(&before, &db.get_bookmarks_tree()));
    assert!(calls.lock().unwrap().is_empty());
}

#[test]
fn test_validator_rejection_discards_transaction() {
    let tree = (*database().get_bookmarks_tree()).clone();
    let db = BookmarkDatabase::with_validator(
        tree,
        Arc::new(|_tree: &BookmarksTree, affected: &BookmarkId| {
            if affected.as_str() == "A" {
                Err("A is frozen".to_string())
            } else {
                Ok(())
            }
        }),
    );

    let err = db
        .modify(|m| {
            m.add_bookmarks(&id("A"), None, vec![Bookmark::new(id("x"), Properties::new())])
        })
        .unwrap_err();
    assert_eq!(err, BookmarkError::Validation("A is frozen".to_string()));
    assert!(!db.get_bookmarks_tree().contains(&id("x")));
}

#[test]
fn test_empty_transaction_notifies_nobody() {
    let db = database();
    let (listener, calls) = recording_listener();
    db.add_listener(listener);

    let log = db.modify(|_| Ok(())).unwrap();
    assert!(log.is_empty());
    assert!(calls.lock().unwrap().is_empty());
}

#[test]
fn test_removed_listener_is_not_notified() {
    let db = database();
    let (listener, calls) = recording_listener();
    db.add_listener(listener.clone());
    db.remove_listener(&listener);

    db.modify(|m| m.set_property_value(&id("A"), "name", Some("A"))).unwrap();
    assert!(calls.lock().unwrap().is_empty());
}

struct ReentrantListener {
    database: Mutex<Option<Arc<BookmarkDatabase>>>,
    outcome: Mutex<Option<Result<Vec<Modification>, BookmarkError>>>,
}

impl BookmarksListener for ReentrantListener {
    fn bookmarks_modified(&self, _modifications: &[Modification]) {
        let database = self.database.lock().unwrap().clone();
        if let Some(db) = database {
            let result = db.modify(|m| m.set_property_value(&id("A"), "comment", Some("again")));
            *self.outcome.lock().unwrap() = Some(result);
        }
    }
}

#[test]
fn test_listener_cannot_modify_reentrantly() {
    let db = Arc::new(database());
    let listener = Arc::new(ReentrantListener {
        database: Mutex::new(Some(db.clone())),
        outcome: Mutex::new(None),
    });
    db.add_listener(listener.clone());

    db.modify(|m| m.set_property_value(&id("A"), "name", Some("A"))).unwrap();

    let outcome = listener.outcome.lock().unwrap().take();
    assert!(matches!(outcome, Some(Err(BookmarkError::Reentrant))));
    assert_eq!(
        db.get_bookmarks_tree().get_bookmark(&id("A")).unwrap().comment(),
        None
    );
    // Break the listener → database cycle.
    listener.database.lock().unwrap().take();
}

#[test]
fn test_try_modify_times_out_while_another_writer_runs() {
    let db = Arc::new(database());
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let writer = {
        let db = db.clone();
        thread::spawn(move || {
            db.modify(|m| {
                entered_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                m.set_property_value(&id("A"), "name", Some("slow"))
            })
        })
    };

    entered_rx.recv().unwrap();
    let err = db
        .try_modify(Duration::from_millis(20), |m| {
            m.set_property_value(&id("A"), "name", Some("fast"))
        })
        .unwrap_err();
    assert!(matches!(err, BookmarkError::LockTimeout(_)));

    release_tx.send(()).unwrap();
    writer.join().unwrap().unwrap();
    assert_eq!(
        db.get_bookmarks_tree().get_bookmark(&id("A")).unwrap().name(),
        Some("slow")
    );
}

#[test]
fn test_concurrent_writers_are_serialized() {
    let db = Arc::new(database());
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let db = db.clone();
            thread::spawn(move || {
                for i in 0..10 {
                    let bookmark = Bookmark::new(id(&format!("t{t}-{i}")), Properties::new());
                    db.modify(|m| m.add_bookmarks(&id("A"), None, vec![bookmark]))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let tree = db.get_bookmarks_tree();
    assert_eq!(tree.children_ids(&id("A")).len(), 80);
    assert_eq!(tree.len(), 82);
}
