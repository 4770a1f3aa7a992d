//! Per-edit validation policies for tree transactions.

use std::sync::Arc;

use crate::tree::BookmarksTree;
use crate::types::bookmark::BookmarkId;

/// Policy consulted for every id an edit touches.
///
/// `tree` is the tree in which `affected_id` is present: the tree before the
/// edit for ids the edit removes or changes, the tree after the edit for ids
/// it adds or relocates. Returning `Err(reason)` rejects the whole transaction.
pub trait ModificationValidator: Send + Sync {
    fn validate(&self, tree: &BookmarksTree, affected_id: &BookmarkId) -> Result<(), String>;
}

impl<F> ModificationValidator for F
where
    F: Fn(&BookmarksTree, &BookmarkId) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, tree: &BookmarksTree, affected_id: &BookmarkId) -> Result<(), String> {
        self(tree, affected_id)
    }
}

/// Accepts every edit.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllValidator;

impl ModificationValidator for AcceptAllValidator {
    fn validate(&self, _tree: &BookmarksTree, _affected_id: &BookmarkId) -> Result<(), String> {
        Ok(())
    }
}

/// Runs several validators in order; the first rejection wins.
#[derive(Clone, Default)]
pub struct CompositeValidator {
    validators: Vec<Arc<dyn ModificationValidator>>,
}

impl CompositeValidator {
    pub fn new(validators: Vec<Arc<dyn ModificationValidator>>) -> Self {
        Self { validators }
    }

    pub fn push(&mut self, validator: Arc<dyn ModificationValidator>) {
        self.validators.push(validator);
    }
}

impl ModificationValidator for CompositeValidator {
    fn validate(&self, tree: &BookmarksTree, affected_id: &BookmarkId) -> Result<(), String> {
        self.validators
            .iter()
            .try_for_each(|v| v.validate(tree, affected_id))
    }
}
