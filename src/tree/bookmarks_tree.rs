//! Immutable bookmarks tree.
//!
//! Every edit returns a new [`BookmarksTree`]; the receiver is never touched.
//! Entities and child lists are reference counted, so an edit only copies the
//! id index and the child lists it actually changes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::tree::iteration::{BookmarksTreeIterator, TraversalOrder};
use crate::types::bookmark::{Bookmark, BookmarkId, Properties};
use crate::types::errors::BookmarkError;

#[derive(Debug, Clone, PartialEq, Eq)]
struct TreeNode {
    bookmark: Arc<Bookmark>,
    parent: Option<BookmarkId>,
    /// `Some` for folders, `None` for leaf bookmarks.
    children: Option<Arc<Vec<BookmarkId>>>,
}

impl TreeNode {
    fn new(bookmark: Bookmark, parent: Option<BookmarkId>) -> Self {
        let children = if bookmark.is_folder() {
            Some(Arc::new(Vec::new()))
        } else {
            None
        };
        Self {
            bookmark: Arc::new(bookmark),
            parent,
            children,
        }
    }
}

/// A rooted, ordered tree of bookmarks and folders.
///
/// Equality compares content, not identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookmarksTree {
    root_id: BookmarkId,
    nodes: HashMap<BookmarkId, TreeNode>,
}

impl BookmarksTree {
    /// Creates an empty tree holding only `root`.
    ///
    /// # Errors
    /// Returns `BookmarkError::NotAFolder` if `root` is a leaf bookmark.
    pub fn new(root: Bookmark) -> Result<Self, BookmarkError> {
        if !root.is_folder() {
            return Err(BookmarkError::NotAFolder(root.id.to_string()));
        }
        let root_id = root.id.clone();
        let mut nodes = HashMap::new();
        nodes.insert(root_id.clone(), TreeNode::new(root, None));
        Ok(Self { root_id, nodes })
    }

    pub fn root_id(&self) -> &BookmarkId {
        &self.root_id
    }

    pub fn root_folder(&self) -> &Bookmark {
        // The root node is inserted on construction and can never be deleted.
        &self.nodes[&self.root_id].bookmark
    }

    pub fn get_bookmark(&self, id: &BookmarkId) -> Option<&Bookmark> {
        self.nodes.get(id).map(|n| n.bookmark.as_ref())
    }

    pub fn contains(&self, id: &BookmarkId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of bookmarks in the tree, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// A tree always holds its root, so it is never empty.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// All ids in the tree, in no particular order.
    pub fn ids(&self) -> impl Iterator<Item = &BookmarkId> {
        self.nodes.keys()
    }

    pub fn parent_id(&self, id: &BookmarkId) -> Option<&BookmarkId> {
        self.nodes.get(id).and_then(|n| n.parent.as_ref())
    }

    pub fn get_parent(&self, id: &BookmarkId) -> Option<&Bookmark> {
        self.parent_id(id).and_then(|p| self.get_bookmark(p))
    }

    /// Ordered child ids of `folder_id`. Empty for leaves and unknown ids.
    pub fn children_ids(&self, folder_id: &BookmarkId) -> &[BookmarkId] {
        self.nodes
            .get(folder_id)
            .and_then(|n| n.children.as_deref())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn get_children(&self, folder_id: &BookmarkId) -> Vec<&Bookmark> {
        self.children_ids(folder_id)
            .iter()
            .filter_map(|c| self.get_bookmark(c))
            .collect()
    }

    /// Ancestors of `id`, nearest first, ending with the root.
    pub fn ancestors(&self, id: &BookmarkId) -> Vec<BookmarkId> {
        let mut result = Vec::new();
        let mut current = self.parent_id(id);
        while let Some(parent) = current {
            result.push(parent.clone());
            current = self.parent_id(parent);
        }
        result
    }

    /// True if `ancestor` is a strict ancestor of `id`.
    pub fn is_ancestor_of(&self, ancestor: &BookmarkId, id: &BookmarkId) -> bool {
        let mut current = self.parent_id(id);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.parent_id(parent);
        }
        false
    }

    /// Pre-order traversal of the whole tree.
    pub fn iter(&self) -> BookmarksTreeIterator<'_> {
        BookmarksTreeIterator::new(self, &self.root_id, TraversalOrder::PreOrder)
    }

    /// Traversal of the subtree rooted at `id` in the given order.
    pub fn iter_from(&self, id: &BookmarkId, order: TraversalOrder) -> BookmarksTreeIterator<'_> {
        BookmarksTreeIterator::new(self, id, order)
    }

    /// Inserts `bookmarks` as consecutive children of `parent_id`, right after
    /// `after_id` or as the first children when `after_id` is `None`.
    ///
    /// # Errors
    /// - `NotFound` if the parent is absent or not a folder, or `after_id` is not
    ///   one of its children
    /// - `AlreadyExists` if any bookmark id is already present (or repeated)
    pub fn add_bookmarks(
        &self,
        parent_id: &BookmarkId,
        after_id: Option<&BookmarkId>,
        bookmarks: Vec<Bookmark>,
    ) -> Result<Self, BookmarkError> {
        if !self.is_folder(parent_id) {
            return Err(BookmarkError::NotFound(parent_id.to_string()));
        }
        let index = Self::insertion_index(self.children_ids(parent_id), after_id)?;

        let mut seen = HashSet::new();
        for bookmark in &bookmarks {
            if self.contains(&bookmark.id) || !seen.insert(&bookmark.id) {
                return Err(BookmarkError::AlreadyExists(bookmark.id.to_string()));
            }
        }

        let mut next = self.clone();
        let new_ids: Vec<BookmarkId> = bookmarks.iter().map(|b| b.id.clone()).collect();
        insert_at(next.children_mut(parent_id)?, index, new_ids);
        for bookmark in bookmarks {
            let id = bookmark.id.clone();
            next.nodes
                .insert(id, TreeNode::new(bookmark, Some(parent_id.clone())));
        }
        Ok(next)
    }

    /// Removes a bookmark. Folders with children require `delete_children`.
    ///
    /// # Errors
    /// - `RootFolder` when targeting the root
    /// - `NotFound` if the bookmark is absent
    /// - `NotEmpty` for a non-empty folder without `delete_children`
    pub fn delete_bookmark(
        &self,
        id: &BookmarkId,
        delete_children: bool,
    ) -> Result<Self, BookmarkError> {
        if *id == self.root_id {
            return Err(BookmarkError::RootFolder(id.to_string()));
        }
        let node = self
            .nodes
            .get(id)
            .ok_or_else(|| BookmarkError::NotFound(id.to_string()))?;
        let has_children = node.children.as_ref().is_some_and(|c| !c.is_empty());
        if has_children && !delete_children {
            return Err(BookmarkError::NotEmpty(id.to_string()));
        }

        let mut next = self.clone();
        if let Some(parent) = node.parent.clone() {
            next.children_mut(&parent)?.retain(|c| c != id);
        }
        let removed: Vec<BookmarkId> = self
            .iter_from(id, TraversalOrder::PreOrder)
            .map(|b| b.id.clone())
            .collect();
        for removed_id in removed {
            next.nodes.remove(&removed_id);
        }
        Ok(next)
    }

    /// Moves `ids` under `new_parent_id`, consecutively and in the given order,
    /// right after `after_id` (or first when `None`).
    ///
    /// # Errors
    /// - `NotFound` if the new parent is absent or not a folder, any id is absent,
    ///   or `after_id` is not a remaining child of the new parent
    /// - `RootFolder` when moving the root
    /// - `Cycle` when a moved id is the new parent or one of its ancestors
    pub fn move_bookmarks(
        &self,
        ids: &[BookmarkId],
        new_parent_id: &BookmarkId,
        after_id: Option<&BookmarkId>,
    ) -> Result<Self, BookmarkError> {
        if !self.is_folder(new_parent_id) {
            return Err(BookmarkError::NotFound(new_parent_id.to_string()));
        }
        let mut moved: Vec<BookmarkId> = Vec::with_capacity(ids.len());
        for id in ids {
            if *id == self.root_id {
                return Err(BookmarkError::RootFolder(id.to_string()));
            }
            if !self.contains(id) {
                return Err(BookmarkError::NotFound(id.to_string()));
            }
            if id == new_parent_id || self.is_ancestor_of(id, new_parent_id) {
                return Err(BookmarkError::Cycle(id.to_string()));
            }
            if !moved.contains(id) {
                moved.push(id.clone());
            }
        }

        let mut next = self.clone();
        for id in &moved {
            if let Some(old_parent) = self.parent_id(id) {
                next.children_mut(old_parent)?.retain(|c| c != id);
            }
        }
        let index = Self::insertion_index(next.children_ids(new_parent_id), after_id)?;
        insert_at(next.children_mut(new_parent_id)?, index, moved.clone());
        for id in &moved {
            if let Some(node) = next.nodes.get_mut(id) {
                node.parent = Some(new_parent_id.clone());
            }
        }
        Ok(next)
    }

    /// Sets (`Some`) or removes (`None`) a single property.
    pub fn set_property_value(
        &self,
        id: &BookmarkId,
        key: &str,
        value: Option<&str>,
    ) -> Result<Self, BookmarkError> {
        let bookmark = self
            .get_bookmark(id)
            .ok_or_else(|| BookmarkError::NotFound(id.to_string()))?;
        let mut properties = bookmark.properties.clone();
        match value {
            Some(v) => {
                properties.insert(key.to_string(), v.to_string());
            }
            None => {
                properties.remove(key);
            }
        }
        self.set_properties(id, properties)
    }

    /// Replaces the whole property map of a bookmark.
    pub fn set_properties(
        &self,
        id: &BookmarkId,
        properties: Properties,
    ) -> Result<Self, BookmarkError> {
        let node = self
            .nodes
            .get(id)
            .ok_or_else(|| BookmarkError::NotFound(id.to_string()))?;
        let mut next = self.clone();
        if node.bookmark.properties != properties {
            let replaced = TreeNode {
                bookmark: Arc::new(node.bookmark.with_properties(properties)),
                parent: node.parent.clone(),
                children: node.children.clone(),
            };
            next.nodes.insert(id.clone(), replaced);
        }
        Ok(next)
    }

    /// Extracts the self-contained subtree rooted at `root_id`. Ids are preserved.
    ///
    /// # Errors
    /// `NotFound` if absent, `NotAFolder` if `root_id` is a leaf.
    pub fn sub_tree(&self, root_id: &BookmarkId) -> Result<Self, BookmarkError> {
        let root = self
            .nodes
            .get(root_id)
            .ok_or_else(|| BookmarkError::NotFound(root_id.to_string()))?;
        if root.children.is_none() {
            return Err(BookmarkError::NotAFolder(root_id.to_string()));
        }
        let mut nodes = HashMap::new();
        for bookmark in self.iter_from(root_id, TraversalOrder::PreOrder) {
            let mut node = self.nodes[&bookmark.id].clone();
            if bookmark.id == *root_id {
                node.parent = None;
            }
            nodes.insert(bookmark.id.clone(), node);
        }
        Ok(Self {
            root_id: root_id.clone(),
            nodes,
        })
    }

    /// Appends `bookmark` as the last child of `parent_id`, in place.
    ///
    /// Only for trees under construction that no one else observes yet.
    pub(crate) fn push_child(
        &mut self,
        parent_id: &BookmarkId,
        bookmark: Bookmark,
    ) -> Result<(), BookmarkError> {
        if self.contains(&bookmark.id) {
            return Err(BookmarkError::AlreadyExists(bookmark.id.to_string()));
        }
        let id = bookmark.id.clone();
        self.children_mut(parent_id)?.push(id.clone());
        self.nodes
            .insert(id, TreeNode::new(bookmark, Some(parent_id.clone())));
        Ok(())
    }

    fn is_folder(&self, id: &BookmarkId) -> bool {
        self.nodes.get(id).is_some_and(|n| n.children.is_some())
    }

    fn children_mut(
        &mut self,
        folder_id: &BookmarkId,
    ) -> Result<&mut Vec<BookmarkId>, BookmarkError> {
        self.nodes
            .get_mut(folder_id)
            .and_then(|n| n.children.as_mut())
            .map(Arc::make_mut)
            .ok_or_else(|| BookmarkError::NotFound(folder_id.to_string()))
    }

    fn insertion_index(
        children: &[BookmarkId],
        after_id: Option<&BookmarkId>,
    ) -> Result<usize, BookmarkError> {
        match after_id {
            None => Ok(0),
            Some(after) => children
                .iter()
                .position(|c| c == after)
                .map(|i| i + 1)
                .ok_or_else(|| BookmarkError::NotFound(after.to_string())),
        }
    }
}

fn insert_at(children: &mut Vec<BookmarkId>, index: usize, ids: Vec<BookmarkId>) {
    let tail = children.split_off(index);
    children.extend(ids);
    children.extend(tail);
}
