//! Three-way merge of a shared folder.
//!
//! Given the last agreed state (`ancestor`), the local subtree and the remote
//! subtree, all rooted at the same folder, the engine classifies every id and
//! emits the edits that bring the local tree to the merged state. Edits go
//! through a [`BookmarksTreeModifier`], so the result is an ordinary
//! modification log that the database commits like any user transaction.
//!
//! Resolution rules:
//! - a node deleted on either side stays deleted, edits on the other side are dropped
//! - properties merge per key; a key changed on both sides follows the
//!   [`PropertyConflictPolicy`]
//! - a node placed under a folder that no longer survives goes to the nearest
//!   surviving ancestor
//! - a move that would create a cycle in the merged tree is skipped

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::database::modifier::BookmarksTreeModifier;
use crate::database::validation::AcceptAllValidator;
use crate::tree::{BookmarksTree, TraversalOrder};
use crate::types::bookmark::{BookmarkId, Properties};
use crate::types::errors::BookmarkError;
use crate::types::modification::Modification;
use crate::types::settings::PropertyConflictPolicy;

/// How one id differs between ancestor, local and remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Unchanged,
    AddedLocally,
    AddedRemotely,
    /// Absent locally. Also used when both sides deleted the node.
    DeletedLocally,
    DeletedRemotely,
    ModifiedLocally,
    ModifiedRemotely,
    ModifiedBoth,
}

/// A disagreement the merge resolved on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeConflict {
    /// Both sides changed the same property differently.
    Property {
        bookmark_id: BookmarkId,
        key: String,
        local: Option<String>,
        remote: Option<String>,
        chosen: Option<String>,
    },
    /// Both sides moved a node to different parents, or the preferred move
    /// would have created a cycle and the node stayed where it was.
    Move {
        bookmark_id: BookmarkId,
        local_parent: Option<BookmarkId>,
        remote_parent: Option<BookmarkId>,
        chosen_parent: BookmarkId,
    },
    /// The intended parent did not survive the merge.
    Relocated {
        bookmark_id: BookmarkId,
        intended_parent: BookmarkId,
        new_parent: BookmarkId,
    },
}

/// Conflicts resolved while merging into a modifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub conflicts: Vec<MergeConflict>,
}

/// Outcome of a standalone merge.
#[derive(Debug, Clone)]
pub struct MergeResult {
    /// Edits that turn `local` into `merged`.
    pub modifications: Vec<Modification>,
    pub merged: Arc<BookmarksTree>,
    pub conflicts: Vec<MergeConflict>,
}

impl MergeResult {
    pub fn is_empty(&self) -> bool {
        self.modifications.is_empty()
    }
}

/// Three-way merge engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeEngine {
    policy: PropertyConflictPolicy,
}

/// The three inputs of one merge, all rooted at `root`.
struct MergeInputs<'a> {
    root: &'a BookmarkId,
    ancestor: &'a BookmarksTree,
    local: &'a BookmarksTree,
    remote: &'a BookmarksTree,
}

impl MergeInputs<'_> {
    /// Present on at least one side and deleted on neither.
    fn survives(&self, id: &BookmarkId) -> bool {
        let local = self.local.contains(id);
        let remote = self.remote.contains(id);
        if self.ancestor.contains(id) {
            local && remote
        } else {
            local || remote
        }
    }
}

impl MergeEngine {
    pub fn new(policy: PropertyConflictPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> PropertyConflictPolicy {
        self.policy
    }

    /// Classifies `id` across the three trees.
    pub fn classify(
        ancestor: &BookmarksTree,
        local: &BookmarksTree,
        remote: &BookmarksTree,
        id: &BookmarkId,
    ) -> ChangeKind {
        let in_ancestor = ancestor.contains(id);
        let in_local = local.contains(id);
        let in_remote = remote.contains(id);
        match (in_ancestor, in_local, in_remote) {
            (false, true, false) => ChangeKind::AddedLocally,
            (false, false, true) => ChangeKind::AddedRemotely,
            (false, true, true) => {
                if Self::differs(local, remote, id) {
                    ChangeKind::ModifiedBoth
                } else {
                    ChangeKind::Unchanged
                }
            }
            (true, false, _) | (false, false, false) => ChangeKind::DeletedLocally,
            (true, true, false) => ChangeKind::DeletedRemotely,
            (true, true, true) => {
                let local_changed = Self::differs(ancestor, local, id);
                let remote_changed = Self::differs(ancestor, remote, id);
                match (local_changed, remote_changed) {
                    (false, false) => ChangeKind::Unchanged,
                    (true, false) => ChangeKind::ModifiedLocally,
                    (false, true) => ChangeKind::ModifiedRemotely,
                    (true, true) => ChangeKind::ModifiedBoth,
                }
            }
        }
    }

    /// Classification of every id present in any of the trees, in pre-order
    /// of remote, then local, then ancestor.
    pub fn diff(
        ancestor: &BookmarksTree,
        local: &BookmarksTree,
        remote: &BookmarksTree,
    ) -> Vec<(BookmarkId, ChangeKind)> {
        let mut seen = HashSet::new();
        remote
            .iter()
            .chain(local.iter())
            .chain(ancestor.iter())
            .filter(|b| seen.insert(b.id.clone()))
            .map(|b| (b.id.clone(), Self::classify(ancestor, local, remote, &b.id)))
            .collect()
    }

    // Same entity and same parent. Sibling order is not a modification of the node.
    fn differs(a: &BookmarksTree, b: &BookmarksTree, id: &BookmarkId) -> bool {
        a.get_bookmark(id) != b.get_bookmark(id) || a.parent_id(id) != b.parent_id(id)
    }

    /// Merges `local` and `remote` over `ancestor` without touching a database.
    ///
    /// `local` must be rooted at the same folder as `ancestor` and `remote`.
    pub fn compute(
        &self,
        ancestor: &BookmarksTree,
        local: &BookmarksTree,
        remote: &BookmarksTree,
    ) -> Result<MergeResult, BookmarkError> {
        let mut modifier =
            BookmarksTreeModifier::new(Arc::new(local.clone()), Arc::new(AcceptAllValidator));
        let report = self.merge(&mut modifier, ancestor, remote)?;
        let merged = modifier.current_tree().clone();
        Ok(MergeResult {
            modifications: modifier.into_modifications(),
            merged,
            conflicts: report.conflicts,
        })
    }

    /// Applies the merge of `remote` into the folder `ancestor.root_id()` of
    /// the modifier's current tree.
    ///
    /// # Errors
    /// `NotFound`/`NotAFolder` if the shared folder is not a local folder, or
    /// any error raised by the modifier.
    pub fn merge(
        &self,
        modifier: &mut BookmarksTreeModifier,
        ancestor: &BookmarksTree,
        remote: &BookmarksTree,
    ) -> Result<MergeReport, BookmarkError> {
        let root = ancestor.root_id();
        if remote.root_id() != root {
            return Err(BookmarkError::NotFound(remote.root_id().to_string()));
        }
        let local = modifier.current_tree().sub_tree(root)?;
        let inputs = MergeInputs {
            root,
            ancestor,
            local: &local,
            remote,
        };
        let mut report = MergeReport::default();

        self.apply_structure(modifier, &inputs, &mut report)?;
        Self::rescue_orphans(modifier, &inputs, &mut report)?;
        Self::delete_dead(modifier, &inputs)?;
        Self::restore_order(modifier, &inputs)?;
        self.merge_properties(modifier, &inputs, &mut report)?;

        debug!(
            folder = %root,
            edits = modifier.modifications().len(),
            conflicts = report.conflicts.len(),
            "merged remote folder"
        );
        Ok(report)
    }

    // Remote additions and moves, parents before children.
    fn apply_structure(
        &self,
        modifier: &mut BookmarksTreeModifier,
        inputs: &MergeInputs<'_>,
        report: &mut MergeReport,
    ) -> Result<(), BookmarkError> {
        let remote_ids: Vec<BookmarkId> = inputs
            .remote
            .iter()
            .map(|b| b.id.clone())
            .filter(|id| id != inputs.root)
            .collect();

        for id in remote_ids {
            if !inputs.survives(&id) {
                continue;
            }
            let (intended, from_remote) = self.intended_parent(inputs, &id, report);
            let parent =
                Self::surviving_parent(modifier, inputs, &id, &intended, from_remote, report);
            let current = modifier.current_tree().clone();

            if !current.contains(&id) {
                let Some(bookmark) = inputs.remote.get_bookmark(&id) else {
                    continue;
                };
                let after = current.children_ids(&parent).last().cloned();
                modifier.add_bookmarks(&parent, after.as_ref(), vec![bookmark.clone()])?;
                continue;
            }
            if !Self::in_scope(&current, inputs.root, &id) {
                warn!(bookmark = %id, "remote bookmark already exists outside the shared folder");
                continue;
            }
            if current.parent_id(&id) == Some(&parent) {
                continue;
            }
            if id == parent || current.is_ancestor_of(&id, &parent) {
                let stays = current.parent_id(&id).cloned().unwrap_or_else(|| inputs.root.clone());
                warn!(
                    bookmark = %id,
                    parent = %parent,
                    "skipped merge move that would create a cycle"
                );
                report.conflicts.push(MergeConflict::Move {
                    bookmark_id: id.clone(),
                    local_parent: inputs.local.parent_id(&id).cloned(),
                    remote_parent: inputs.remote.parent_id(&id).cloned(),
                    chosen_parent: stays,
                });
                continue;
            }
            let after = current.children_ids(&parent).last().cloned();
            modifier.move_bookmarks(std::slice::from_ref(&id), &parent, after.as_ref())?;
        }
        Ok(())
    }

    // Parent the merged tree should use for `id`, and whether it comes from remote.
    fn intended_parent(
        &self,
        inputs: &MergeInputs<'_>,
        id: &BookmarkId,
        report: &mut MergeReport,
    ) -> (BookmarkId, bool) {
        let local_parent = inputs.local.parent_id(id);
        let remote_parent = inputs.remote.parent_id(id);
        let (local_parent, remote_parent) = match (local_parent, remote_parent) {
            (_, None) => {
                return (
                    local_parent.cloned().unwrap_or_else(|| inputs.root.clone()),
                    false,
                )
            }
            (None, Some(remote)) => return (remote.clone(), true),
            (Some(local), Some(remote)) => (local, remote),
        };
        if local_parent == remote_parent {
            return (local_parent.clone(), false);
        }

        let ancestor_parent = inputs.ancestor.parent_id(id);
        if ancestor_parent == Some(local_parent) {
            return (remote_parent.clone(), true);
        }
        if ancestor_parent == Some(remote_parent) {
            return (local_parent.clone(), false);
        }

        let (chosen, from_remote) = match self.policy {
            PropertyConflictPolicy::RemoteWins => (remote_parent.clone(), true),
            PropertyConflictPolicy::LocalWins => (local_parent.clone(), false),
        };
        warn!(bookmark = %id, parent = %chosen, "resolved conflicting moves by policy");
        report.conflicts.push(MergeConflict::Move {
            bookmark_id: id.clone(),
            local_parent: Some(local_parent.clone()),
            remote_parent: Some(remote_parent.clone()),
            chosen_parent: chosen.clone(),
        });
        (chosen, from_remote)
    }

    // Walks up from `intended` in the tree it was taken from until a folder
    // that survives and already exists in the merged tree.
    fn surviving_parent(
        modifier: &BookmarksTreeModifier,
        inputs: &MergeInputs<'_>,
        id: &BookmarkId,
        intended: &BookmarkId,
        from_remote: bool,
        report: &mut MergeReport,
    ) -> BookmarkId {
        let current = modifier.current_tree();
        let source = if from_remote { inputs.remote } else { inputs.local };
        let usable = |candidate: &BookmarkId| {
            inputs.survives(candidate)
                && Self::in_scope(current, inputs.root, candidate)
                && current.get_bookmark(candidate).is_some_and(|b| b.is_folder())
        };
        if usable(intended) {
            return intended.clone();
        }
        let parent = source
            .ancestors(intended)
            .into_iter()
            .find(|candidate| usable(candidate))
            .unwrap_or_else(|| inputs.root.clone());
        report.conflicts.push(MergeConflict::Relocated {
            bookmark_id: id.clone(),
            intended_parent: intended.clone(),
            new_parent: parent.clone(),
        });
        parent
    }

    // Surviving nodes whose merged parent is about to be deleted.
    fn rescue_orphans(
        modifier: &mut BookmarksTreeModifier,
        inputs: &MergeInputs<'_>,
        report: &mut MergeReport,
    ) -> Result<(), BookmarkError> {
        let ids = Self::scope_ids(modifier.current_tree(), inputs.root, TraversalOrder::PreOrder);
        for id in ids {
            if !inputs.survives(&id) {
                continue;
            }
            let current = modifier.current_tree().clone();
            let Some(parent) = current.parent_id(&id) else {
                continue;
            };
            if inputs.survives(parent) {
                continue;
            }
            let new_parent = current
                .ancestors(&id)
                .into_iter()
                .find(|candidate| inputs.survives(candidate))
                .unwrap_or_else(|| inputs.root.clone());
            report.conflicts.push(MergeConflict::Relocated {
                bookmark_id: id.clone(),
                intended_parent: parent.clone(),
                new_parent: new_parent.clone(),
            });
            let after = current.children_ids(&new_parent).last().cloned();
            modifier.move_bookmarks(std::slice::from_ref(&id), &new_parent, after.as_ref())?;
        }
        Ok(())
    }

    // Topmost dead nodes, each with its whole (already emptied of survivors) subtree.
    fn delete_dead(
        modifier: &mut BookmarksTreeModifier,
        inputs: &MergeInputs<'_>,
    ) -> Result<(), BookmarkError> {
        let current = modifier.current_tree().clone();
        let doomed: Vec<BookmarkId> =
            Self::scope_ids(&current, inputs.root, TraversalOrder::PreOrder)
                .into_iter()
                .filter(|id| !inputs.survives(id))
                .filter(|id| current.parent_id(id).is_some_and(|p| inputs.survives(p)))
                .collect();
        for id in doomed {
            modifier.delete_bookmark(&id, true)?;
        }
        Ok(())
    }

    // Adopts the remote child order unless local reordered the folder itself.
    fn restore_order(
        modifier: &mut BookmarksTreeModifier,
        inputs: &MergeInputs<'_>,
    ) -> Result<(), BookmarkError> {
        let folders: Vec<BookmarkId> =
            Self::scope_ids(modifier.current_tree(), inputs.root, TraversalOrder::PreOrder)
                .into_iter()
                .filter(|id| inputs.remote.contains(id))
                .filter(|id| {
                    modifier
                        .current_tree()
                        .get_bookmark(id)
                        .is_some_and(|b| b.is_folder())
                })
                .collect();

        for folder in folders {
            let current = modifier.current_tree().clone();
            let children = current.children_ids(&folder);
            if children.len() < 2 {
                continue;
            }
            let local_children = inputs.local.children_ids(&folder);
            let remote_children = inputs.remote.children_ids(&folder);
            let locally_reordered =
                Self::reordered(inputs.ancestor.children_ids(&folder), local_children);
            let (base, hints) = if locally_reordered {
                (local_children, remote_children)
            } else {
                (remote_children, local_children)
            };

            let desired = Self::interleave(children, base, hints);
            if desired.as_slice() != children {
                modifier.move_bookmarks(&desired, &folder, None)?;
            }
        }
        Ok(())
    }

    // True if the ids `ancestor` and `side` have in common appear in a different order.
    fn reordered(ancestor: &[BookmarkId], side: &[BookmarkId]) -> bool {
        let in_side: HashSet<&BookmarkId> = side.iter().collect();
        let in_ancestor: HashSet<&BookmarkId> = ancestor.iter().collect();
        let before = ancestor.iter().filter(|id| in_side.contains(id));
        let after = side.iter().filter(|id| in_ancestor.contains(id));
        !before.eq(after)
    }

    // `children` arranged in `base` order, with the remaining ids placed after
    // their predecessor in `hints`, or at the end.
    fn interleave(
        children: &[BookmarkId],
        base: &[BookmarkId],
        hints: &[BookmarkId],
    ) -> Vec<BookmarkId> {
        let present: HashSet<&BookmarkId> = children.iter().collect();
        let mut result: Vec<BookmarkId> = base
            .iter()
            .filter(|id| present.contains(id))
            .cloned()
            .collect();
        let mut placed: HashSet<BookmarkId> = result.iter().cloned().collect();

        for (index, id) in hints.iter().enumerate() {
            if !present.contains(id) || placed.contains(id) {
                continue;
            }
            let position = hints[..index]
                .iter()
                .rev()
                .find_map(|prev| result.iter().position(|r| r == prev))
                .map_or(0, |p| p + 1);
            result.insert(position, id.clone());
            placed.insert(id.clone());
        }
        for id in children {
            if placed.insert(id.clone()) {
                result.push(id.clone());
            }
        }
        result
    }

    fn merge_properties(
        &self,
        modifier: &mut BookmarksTreeModifier,
        inputs: &MergeInputs<'_>,
        report: &mut MergeReport,
    ) -> Result<(), BookmarkError> {
        let shared: Vec<BookmarkId> =
            Self::scope_ids(modifier.current_tree(), inputs.root, TraversalOrder::PreOrder)
                .into_iter()
                .filter(|id| inputs.local.contains(id) && inputs.remote.contains(id))
                .collect();

        let empty = Properties::new();
        for id in shared {
            let local = inputs.local.get_bookmark(&id).map_or(&empty, |b| &b.properties);
            let remote = inputs.remote.get_bookmark(&id).map_or(&empty, |b| &b.properties);
            if local == remote {
                continue;
            }
            let base = inputs.ancestor.get_bookmark(&id).map_or(&empty, |b| &b.properties);
            let merged = self.merge_property_maps(&id, base, local, remote, report);
            modifier.set_properties(&id, merged)?;
        }
        Ok(())
    }

    fn merge_property_maps(
        &self,
        id: &BookmarkId,
        base: &Properties,
        local: &Properties,
        remote: &Properties,
        report: &mut MergeReport,
    ) -> Properties {
        let keys: BTreeSet<&String> = base
            .keys()
            .chain(local.keys())
            .chain(remote.keys())
            .collect();
        let mut merged = Properties::new();
        for key in keys {
            let a = base.get(key);
            let l = local.get(key);
            let r = remote.get(key);
            let chosen = if l == r || a == r {
                l
            } else if a == l {
                r
            } else {
                let chosen = match self.policy {
                    PropertyConflictPolicy::RemoteWins => r,
                    PropertyConflictPolicy::LocalWins => l,
                };
                warn!(bookmark = %id, key = %key, "resolved property conflict by policy");
                report.conflicts.push(MergeConflict::Property {
                    bookmark_id: id.clone(),
                    key: key.clone(),
                    local: l.cloned(),
                    remote: r.cloned(),
                    chosen: chosen.cloned(),
                });
                chosen
            };
            if let Some(value) = chosen {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged
    }

    fn in_scope(tree: &BookmarksTree, root: &BookmarkId, id: &BookmarkId) -> bool {
        id == root || tree.is_ancestor_of(root, id)
    }

    fn scope_ids(
        tree: &BookmarksTree,
        root: &BookmarkId,
        order: TraversalOrder,
    ) -> Vec<BookmarkId> {
        tree.iter_from(root, order).map(|b| b.id.clone()).collect()
    }
}
