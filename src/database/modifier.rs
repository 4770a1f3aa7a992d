//! In-progress transaction over one tree snapshot.

use std::sync::Arc;

use crate::database::validation::ModificationValidator;
use crate::tree::BookmarksTree;
use crate::types::bookmark::{Bookmark, BookmarkId, Properties};
use crate::types::errors::BookmarkError;
use crate::types::modification::Modification;

/// Applies a sequence of edits to a working copy of a tree, validating each
/// one and recording the resulting [`Modification`] log.
///
/// The first validation rejection poisons the modifier: every later edit
/// fails with the same `BookmarkError::Validation`.
pub struct BookmarksTreeModifier {
    original: Arc<BookmarksTree>,
    current: Arc<BookmarksTree>,
    validator: Arc<dyn ModificationValidator>,
    modifications: Vec<Modification>,
    rejection: Option<String>,
}

impl BookmarksTreeModifier {
    pub fn new(tree: Arc<BookmarksTree>, validator: Arc<dyn ModificationValidator>) -> Self {
        Self {
            original: tree.clone(),
            current: tree,
            validator,
            modifications: Vec::new(),
            rejection: None,
        }
    }

    /// The snapshot the transaction started from.
    pub fn original_tree(&self) -> &Arc<BookmarksTree> {
        &self.original
    }

    /// The working tree with every accepted edit applied.
    pub fn current_tree(&self) -> &Arc<BookmarksTree> {
        &self.current
    }

    /// Accepted edits, in application order.
    pub fn modifications(&self) -> &[Modification] {
        &self.modifications
    }

    pub fn into_modifications(self) -> Vec<Modification> {
        self.modifications
    }

    /// Reason of the first rejected edit, if any.
    pub fn rejection(&self) -> Option<&str> {
        self.rejection.as_deref()
    }

    pub fn add_bookmarks(
        &mut self,
        parent_id: &BookmarkId,
        after_id: Option<&BookmarkId>,
        bookmarks: Vec<Bookmark>,
    ) -> Result<(), BookmarkError> {
        self.ensure_not_rejected()?;
        let target = self
            .current
            .add_bookmarks(parent_id, after_id, bookmarks.clone())?;
        self.commit(target, |source_tree, target_tree| Modification::Added {
            parent_id: parent_id.clone(),
            after_id: after_id.cloned(),
            bookmarks,
            source_tree,
            target_tree,
        })
    }

    pub fn delete_bookmark(
        &mut self,
        bookmark_id: &BookmarkId,
        delete_children: bool,
    ) -> Result<(), BookmarkError> {
        self.ensure_not_rejected()?;
        let parent_id = self
            .current
            .parent_id(bookmark_id)
            .cloned()
            .ok_or_else(|| self.missing_or_root(bookmark_id))?;
        let target = self.current.delete_bookmark(bookmark_id, delete_children)?;
        self.commit(target, |source_tree, target_tree| Modification::Deleted {
            bookmark_id: bookmark_id.clone(),
            parent_id,
            delete_children,
            source_tree,
            target_tree,
        })
    }

    pub fn move_bookmarks(
        &mut self,
        bookmark_ids: &[BookmarkId],
        new_parent_id: &BookmarkId,
        after_id: Option<&BookmarkId>,
    ) -> Result<(), BookmarkError> {
        self.ensure_not_rejected()?;
        let target = self
            .current
            .move_bookmarks(bookmark_ids, new_parent_id, after_id)?;
        let unchanged = bookmark_ids
            .iter()
            .all(|id| self.current.parent_id(id) == Some(new_parent_id))
            && target.children_ids(new_parent_id) == self.current.children_ids(new_parent_id);
        if unchanged {
            return Ok(());
        }
        self.commit(target, |source_tree, target_tree| Modification::Moved {
            bookmark_ids: bookmark_ids.to_vec(),
            new_parent_id: new_parent_id.clone(),
            after_id: after_id.cloned(),
            source_tree,
            target_tree,
        })
    }

    /// Sets (`Some`) or removes (`None`) a single property.
    pub fn set_property_value(
        &mut self,
        bookmark_id: &BookmarkId,
        key: &str,
        value: Option<&str>,
    ) -> Result<(), BookmarkError> {
        let bookmark = self
            .current
            .get_bookmark(bookmark_id)
            .ok_or_else(|| BookmarkError::NotFound(bookmark_id.to_string()))?;
        let mut properties = bookmark.properties.clone();
        match value {
            Some(v) => {
                properties.insert(key.to_string(), v.to_string());
            }
            None => {
                properties.remove(key);
            }
        }
        self.set_properties(bookmark_id, properties)
    }

    /// Replaces all properties of a bookmark. A no-op edit records nothing.
    pub fn set_properties(
        &mut self,
        bookmark_id: &BookmarkId,
        properties: Properties,
    ) -> Result<(), BookmarkError> {
        self.ensure_not_rejected()?;
        let old_properties = self
            .current
            .get_bookmark(bookmark_id)
            .map(|b| b.properties.clone())
            .ok_or_else(|| BookmarkError::NotFound(bookmark_id.to_string()))?;
        if old_properties == properties {
            return Ok(());
        }
        let target = self
            .current
            .set_properties(bookmark_id, properties.clone())?;
        self.commit(target, |source_tree, target_tree| {
            Modification::PropertiesChanged {
                bookmark_id: bookmark_id.clone(),
                old_properties,
                new_properties: properties,
                source_tree,
                target_tree,
            }
        })
    }

    fn ensure_not_rejected(&self) -> Result<(), BookmarkError> {
        match &self.rejection {
            Some(reason) => Err(BookmarkError::Validation(reason.clone())),
            None => Ok(()),
        }
    }

    fn missing_or_root(&self, id: &BookmarkId) -> BookmarkError {
        if self.current.root_id() == id {
            BookmarkError::RootFolder(id.to_string())
        } else {
            BookmarkError::NotFound(id.to_string())
        }
    }

    fn commit<F>(&mut self, target: BookmarksTree, build: F) -> Result<(), BookmarkError>
    where
        F: FnOnce(Arc<BookmarksTree>, Arc<BookmarksTree>) -> Modification,
    {
        let source = self.current.clone();
        let target = Arc::new(target);
        let modification = build(source.clone(), target.clone());

        let checks = modification
            .source_ids()
            .into_iter()
            .map(|id| (source.clone(), id))
            .chain(
                modification
                    .target_ids()
                    .into_iter()
                    .map(|id| (target.clone(), id)),
            );
        for (tree, id) in checks {
            if let Err(reason) = self.validator.validate(&tree, &id) {
                self.rejection = Some(reason.clone());
                return Err(BookmarkError::Validation(reason));
            }
        }

        self.current = target;
        self.modifications.push(modification);
        Ok(())
    }
}
