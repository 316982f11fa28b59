//! Watched thread subscription

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Loadable;

/// A pinned thread.
///
/// Counters are `-1` until the first load completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pin {
    pub id: Uuid,
    pub loadable: Loadable,
    pub watching: bool,
    /// Posts seen when the user last reached the bottom
    pub watch_last_count: i32,
    /// Posts (excluding your own) at the last load
    pub watch_new_count: i32,
    pub quote_last_count: i32,
    pub quote_new_count: i32,
    /// The thread 404'd
    pub is_error: bool,
    pub archived: bool,
    pub is_sticky: bool,
    pub order: i32,
    pub thumbnail_url: Option<String>,
}

impl Pin {
    /// Create a watching pin that has never been loaded
    pub fn new(loadable: Loadable, thumbnail_url: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            loadable,
            watching: true,
            watch_last_count: -1,
            watch_new_count: -1,
            quote_last_count: -1,
            quote_new_count: -1,
            is_error: false,
            archived: false,
            is_sticky: false,
            order: 0,
            thumbnail_url,
        }
    }

    /// Posts not yet viewed
    pub fn new_post_count(&self) -> i32 {
        if self.watch_last_count < 0 || self.watch_new_count < 0 {
            0
        } else {
            (self.watch_new_count - self.watch_last_count).max(0)
        }
    }

    /// Quotes of your posts not yet viewed
    pub fn new_quote_count(&self) -> i32 {
        if self.quote_last_count < 0 || self.quote_new_count < 0 {
            0
        } else {
            (self.quote_new_count - self.quote_last_count).max(0)
        }
    }

    /// Whether the watcher should still poll this pin
    pub const fn is_active(&self) -> bool {
        self.watching && !self.is_error && !self.archived
    }
}
