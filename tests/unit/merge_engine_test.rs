//! Unit tests for the three-way MergeEngine.
//!
//! Trees are written as `(parent, id, is_folder)` rows under a folder named
//! `root`; the ancestor/local/remote variants are derived by editing a copy.

use rstest::rstest;

use bookmarks_core::database::{AcceptAllValidator, BookmarkDatabase};
use bookmarks_core::services::merge_engine::{ChangeKind, MergeConflict, MergeEngine};
use bookmarks_core::tree::BookmarksTree;
use bookmarks_core::types::bookmark::{Bookmark, BookmarkId, Properties};
use bookmarks_core::types::modification::Modification;
use bookmarks_core::types::settings::PropertyConflictPolicy;

use std::sync::Arc;

fn id(s: &str) -> BookmarkId {
    BookmarkId::from(s)
}

fn build(rows: &[(&str, &str, bool)]) -> BookmarksTree {
    let mut tree = BookmarksTree::new(Bookmark::new_folder(id("root"), Properties::new())).unwrap();
    for (parent, child, is_folder) in rows {
        let bookmark = if *is_folder {
            Bookmark::new_folder(id(child), Properties::new())
        } else {
            Bookmark::new(id(child), Properties::new())
        };
        let after = tree.children_ids(&id(parent)).last().cloned();
        tree = tree.add_bookmarks(&id(parent), after.as_ref(), vec![bookmark]).unwrap();
    }
    tree
}

fn with_prop(tree: BookmarksTree, target: &str, key: &str, value: &str) -> BookmarksTree {
    tree.set_property_value(&id(target), key, Some(value)).unwrap()
}

fn children(tree: &BookmarksTree, parent: &str) -> Vec<String> {
    tree.children_ids(&id(parent)).iter().map(|c| c.to_string()).collect()
}

fn engine() -> MergeEngine {
    MergeEngine::default()
}

#[test]
fn test_disjoint_property_edits_merge_into_one_change() {
    let ancestor = with_prop(build(&[("root", "X", false)]), "X", "name", "x");
    let local = with_prop(ancestor.clone(), "X", "name", "foo");
    let remote = with_prop(ancestor.clone(), "X", "comment", "bar");

    let result = engine().compute(&ancestor, &local, &remote).unwrap();

    assert_eq!(result.modifications.len(), 1);
    match &result.modifications[0] {
        Modification::PropertiesChanged {
            bookmark_id,
            new_properties,
            ..
        } => {
            assert_eq!(bookmark_id, &id("X"));
            assert_eq!(new_properties.get("name").map(String::as_str), Some("foo"));
            assert_eq!(new_properties.get("comment").map(String::as_str), Some("bar"));
        }
        other => panic!("expected a property change, got {:?}", other),
    }
    assert!(result.conflicts.is_empty());
}

#[rstest]
#[case::remote_wins(PropertyConflictPolicy::RemoteWins, "remote")]
#[case::local_wins(PropertyConflictPolicy::LocalWins, "local")]
fn test_conflicting_property_follows_policy(
    #[case] policy: PropertyConflictPolicy,
    #[case] expected: &str,
) {
    let ancestor = with_prop(build(&[("root", "X", false)]), "X", "name", "base");
    let local = with_prop(ancestor.clone(), "X", "name", "local");
    let remote = with_prop(ancestor.clone(), "X", "name", "remote");

    let result = MergeEngine::new(policy).compute(&ancestor, &local, &remote).unwrap();

    let merged = result.merged.get_bookmark(&id("X")).unwrap();
    assert_eq!(merged.name(), Some(expected));
    assert!(matches!(
        result.conflicts.as_slice(),
        [MergeConflict::Property { key, .. }] if key == "name"
    ));
}

#[test]
fn test_identical_edits_on_both_sides_are_a_no_op() {
    let ancestor = build(&[("root", "X", false)]);
    let local = with_prop(ancestor.clone(), "X", "name", "same");
    let remote = local.clone();

    let result = engine().compute(&ancestor, &local, &remote).unwrap();
    assert!(result.is_empty());
    assert!(result.conflicts.is_empty());
}

#[test]
fn test_remote_additions_are_applied_with_their_children() {
    let ancestor = build(&[("root", "a", false)]);
    let local = ancestor.clone();
    let remote = build(&[("root", "a", false), ("root", "F", true), ("F", "f1", false)]);

    let result = engine().compute(&ancestor, &local, &remote).unwrap();

    assert_eq!(*result.merged, remote);
}

#[test]
fn test_additions_on_both_sides_keep_relative_positions() {
    let ancestor = build(&[("root", "a", false), ("root", "b", false)]);
    let local = build(&[("root", "a", false), ("root", "l", false), ("root", "b", false)]);
    let remote = build(&[("root", "r", false), ("root", "a", false), ("root", "b", false)]);

    let result = engine().compute(&ancestor, &local, &remote).unwrap();

    assert_eq!(children(&result.merged, "root"), vec!["r", "a", "l", "b"]);
}

#[test]
fn test_delete_wins_over_concurrent_edit() {
    let ancestor = build(&[("root", "X", false), ("root", "Y", false)]);
    let local = with_prop(ancestor.clone(), "X", "name", "edited");
    let remote = ancestor.delete_bookmark(&id("X"), false).unwrap();

    let result = engine().compute(&ancestor, &local, &remote).unwrap();

    assert!(!result.merged.contains(&id("X")));
    assert!(result.merged.contains(&id("Y")));
}

#[test]
fn test_remote_edit_of_locally_deleted_bookmark_is_dropped() {
    let ancestor = build(&[("root", "X", false)]);
    let local = ancestor.delete_bookmark(&id("X"), false).unwrap();
    let remote = with_prop(ancestor.clone(), "X", "name", "edited");

    let result = engine().compute(&ancestor, &local, &remote).unwrap();

    assert!(result.is_empty());
    assert!(!result.merged.contains(&id("X")));
}

#[test]
fn test_addition_into_deleted_folder_goes_to_surviving_ancestor() {
    let ancestor = build(&[("root", "P", true), ("P", "F", true), ("F", "f1", false)]);
    let local = ancestor.delete_bookmark(&id("F"), true).unwrap();
    let remote = ancestor
        .add_bookmarks(&id("F"), Some(&id("f1")), vec![Bookmark::new(id("n"), Properties::new())])
        .unwrap();

    let result = engine().compute(&ancestor, &local, &remote).unwrap();

    assert!(!result.merged.contains(&id("F")));
    assert!(!result.merged.contains(&id("f1")));
    assert_eq!(result.merged.parent_id(&id("n")), Some(&id("P")));
    assert!(result.conflicts.contains(&MergeConflict::Relocated {
        bookmark_id: id("n"),
        intended_parent: id("F"),
        new_parent: id("P"),
    }));
}

#[test]
fn test_local_addition_into_remotely_deleted_folder_is_rescued() {
    let ancestor = build(&[("root", "F", true), ("F", "f1", false)]);
    let local = ancestor
        .add_bookmarks(&id("F"), None, vec![Bookmark::new(id("mine"), Properties::new())])
        .unwrap();
    let remote = ancestor.delete_bookmark(&id("F"), true).unwrap();

    let result = engine().compute(&ancestor, &local, &remote).unwrap();

    assert!(!result.merged.contains(&id("F")));
    assert_eq!(children(&result.merged, "root"), vec!["mine"]);
}

#[test]
fn test_remote_move_is_applied() {
    let ancestor = build(&[("root", "F", true), ("root", "x", false)]);
    let local = ancestor.clone();
    let remote = ancestor.move_bookmarks(&[id("x")], &id("F"), None).unwrap();

    let result = engine().compute(&ancestor, &local, &remote).unwrap();

    assert_eq!(result.merged.parent_id(&id("x")), Some(&id("F")));
    assert_eq!(*result.merged, remote);
}

#[test]
fn test_local_move_is_kept_when_remote_did_not_move() {
    let ancestor = build(&[("root", "F", true), ("root", "x", false)]);
    let local = ancestor.move_bookmarks(&[id("x")], &id("F"), None).unwrap();
    let remote = with_prop(ancestor.clone(), "x", "name", "renamed");

    let result = engine().compute(&ancestor, &local, &remote).unwrap();

    let merged = &result.merged;
    assert_eq!(merged.parent_id(&id("x")), Some(&id("F")));
    assert_eq!(merged.get_bookmark(&id("x")).unwrap().name(), Some("renamed"));
}

#[rstest]
#[case::remote_wins(PropertyConflictPolicy::RemoteWins, "R")]
#[case::local_wins(PropertyConflictPolicy::LocalWins, "L")]
fn test_conflicting_moves_follow_policy(
    #[case] policy: PropertyConflictPolicy,
    #[case] expected: &str,
) {
    let ancestor = build(&[("root", "L", true), ("root", "R", true), ("root", "x", false)]);
    let local = ancestor.move_bookmarks(&[id("x")], &id("L"), None).unwrap();
    let remote = ancestor.move_bookmarks(&[id("x")], &id("R"), None).unwrap();

    let result = MergeEngine::new(policy).compute(&ancestor, &local, &remote).unwrap();

    assert_eq!(result.merged.parent_id(&id("x")), Some(&id(expected)));
    assert!(result
        .conflicts
        .iter()
        .any(|c| matches!(c, MergeConflict::Move { bookmark_id, .. } if *bookmark_id == id("x"))));
}

#[test]
fn test_crossing_moves_do_not_create_a_cycle() {
    let ancestor = build(&[("root", "P", true), ("root", "Q", true)]);
    let local = ancestor.move_bookmarks(&[id("P")], &id("Q"), None).unwrap();
    let remote = ancestor.move_bookmarks(&[id("Q")], &id("P"), None).unwrap();

    let result = engine().compute(&ancestor, &local, &remote).unwrap();

    assert_eq!(result.merged.parent_id(&id("P")), Some(&id("Q")));
    assert_eq!(result.merged.parent_id(&id("Q")), Some(&id("root")));
    assert!(result
        .conflicts
        .iter()
        .any(|c| matches!(c, MergeConflict::Move { bookmark_id, .. } if *bookmark_id == id("Q"))));
}

#[test]
fn test_remote_reorder_is_adopted() {
    let ancestor = build(&[("root", "a", false), ("root", "b", false), ("root", "c", false)]);
    let local = ancestor.clone();
    let remote = ancestor
        .move_bookmarks(&[id("c")], &id("root"), None)
        .unwrap();

    let result = engine().compute(&ancestor, &local, &remote).unwrap();
    assert_eq!(children(&result.merged, "root"), vec!["c", "a", "b"]);
}

#[test]
fn test_local_reorder_wins_over_remote_reorder() {
    let ancestor = build(&[("root", "a", false), ("root", "b", false), ("root", "c", false)]);
    let local = ancestor
        .move_bookmarks(&[id("a")], &id("root"), Some(&id("c")))
        .unwrap();
    let remote = ancestor
        .move_bookmarks(&[id("c")], &id("root"), None)
        .unwrap();

    let result = engine().compute(&ancestor, &local, &remote).unwrap();
    assert_eq!(children(&result.merged, "root"), vec!["b", "c", "a"]);
}

#[test]
fn test_merge_into_database_only_touches_the_shared_folder() {
    let full = build(&[
        ("root", "shared", true),
        ("shared", "s1", false),
        ("root", "private", false),
    ]);
    let ancestor = full.sub_tree(&id("shared")).unwrap();
    let remote = ancestor
        .add_bookmarks(
            &id("shared"),
            Some(&id("s1")),
            vec![Bookmark::new(id("s2"), Properties::new())],
        )
        .unwrap();
    let db = BookmarkDatabase::new(full);

    let log = db
        .modify_with(Arc::new(AcceptAllValidator), |modifier| {
            engine().merge(modifier, &ancestor, &remote)?;
            Ok(())
        })
        .unwrap();

    assert_eq!(log.len(), 1);
    let tree = db.get_bookmarks_tree();
    assert_eq!(children(&tree, "shared"), vec!["s1", "s2"]);
    assert_eq!(children(&tree, "root"), vec!["shared", "private"]);
}

#[rstest]
#[case::unchanged("same", ChangeKind::Unchanged)]
#[case::added_locally("l_new", ChangeKind::AddedLocally)]
#[case::added_remotely("r_new", ChangeKind::AddedRemotely)]
#[case::deleted_locally("l_gone", ChangeKind::DeletedLocally)]
#[case::deleted_remotely("r_gone", ChangeKind::DeletedRemotely)]
#[case::modified_locally("l_edit", ChangeKind::ModifiedLocally)]
#[case::modified_remotely("r_edit", ChangeKind::ModifiedRemotely)]
#[case::modified_both("both", ChangeKind::ModifiedBoth)]
fn test_classify(#[case] bookmark: &str, #[case] expected: ChangeKind) {
    let ancestor = build(&[
        ("root", "same", false),
        ("root", "l_gone", false),
        ("root", "r_gone", false),
        ("root", "l_edit", false),
        ("root", "r_edit", false),
        ("root", "both", false),
    ]);
    let local = ancestor
        .delete_bookmark(&id("l_gone"), false)
        .unwrap()
        .add_bookmarks(&id("root"), None, vec![Bookmark::new(id("l_new"), Properties::new())])
        .unwrap();
    let local = with_prop(with_prop(local, "l_edit", "name", "l"), "both", "name", "l");
    let remote = ancestor
        .delete_bookmark(&id("r_gone"), false)
        .unwrap()
        .add_bookmarks(&id("root"), None, vec![Bookmark::new(id("r_new"), Properties::new())])
        .unwrap();
    let remote = with_prop(with_prop(remote, "r_edit", "name", "r"), "both", "comment", "r");

    assert_eq!(MergeEngine::classify(&ancestor, &local, &remote, &id(bookmark)), expected);
}
