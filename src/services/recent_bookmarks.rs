// Recent bookmarks
// Database listener remembering the most recently added bookmarks, newest first.

use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;

use crate::database::BookmarksListener;
use crate::types::bookmark::BookmarkId;
use crate::types::modification::Modification;
use crate::types::settings::RecentsSettings;

/// Bounded list of recently added (non-folder) bookmarks.
pub struct RecentBookmarks {
    capacity: usize,
    recent: Mutex<VecDeque<BookmarkId>>,
}

impl RecentBookmarks {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            recent: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn from_settings(settings: &RecentsSettings) -> Self {
        Self::new(settings.capacity)
    }

    /// Most recent first.
    pub fn recent_ids(&self) -> Vec<BookmarkId> {
        self.recent.lock().iter().cloned().collect()
    }

    pub fn contains(&self, id: &BookmarkId) -> bool {
        self.recent.lock().contains(id)
    }

    pub fn clear(&self) {
        self.recent.lock().clear();
    }
}

impl BookmarksListener for RecentBookmarks {
    fn bookmarks_modified(&self, modifications: &[Modification]) {
        let mut recent = self.recent.lock();
        for modification in modifications {
            match modification {
                Modification::Added { bookmarks, .. } => {
                    for bookmark in bookmarks.iter().filter(|b| !b.is_folder()) {
                        recent.retain(|id| *id != bookmark.id);
                        recent.push_front(bookmark.id.clone());
                    }
                }
                Modification::Deleted { .. } => {
                    let gone: HashSet<BookmarkId> = modification.source_ids().into_iter().collect();
                    recent.retain(|id| !gone.contains(id));
                }
                Modification::Moved { .. } | Modification::PropertiesChanged { .. } => {}
            }
        }
        recent.truncate(self.capacity);
    }
}
