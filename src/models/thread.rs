//! Immutable thread snapshot

use serde::{Deserialize, Serialize};

use super::{Loadable, Post};

/// A loaded catalog or thread.
///
/// Snapshots are never mutated once published; every load produces a new
/// one which is shared as `Arc<ChanThread>`. Post numbers are unique
/// within a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChanThread {
    pub loadable: Loadable,
    pub posts: Vec<Post>,
    pub closed: bool,
    pub archived: bool,
}

impl ChanThread {
    pub fn new(loadable: Loadable, posts: Vec<Post>) -> Self {
        Self {
            loadable,
            posts,
            closed: false,
            archived: false,
        }
    }

    /// The opening post (thread mode), or the first post
    pub fn op(&self) -> Option<&Post> {
        self.posts
            .iter()
            .find(|p| p.is_op)
            .or_else(|| self.posts.first())
    }

    /// Total attachments across all posts
    pub fn images_count(&self) -> usize {
        self.posts.iter().map(|p| p.images.len()).sum()
    }

    pub fn find(&self, no: u64) -> Option<&Post> {
        self.posts.iter().find(|p| p.no == no)
    }

    /// Status line such as `12R / 3I / 5P`
    pub fn summary(&self) -> String {
        let Some(op) = self.op() else {
            return String::new();
        };

        let replies = op
            .replies
            .map_or_else(|| self.posts.len().saturating_sub(1), |r| r as usize);
        let images = op
            .images_count
            .map_or_else(|| self.images_count(), |i| i as usize);

        let mut parts = vec![format!("{replies}R"), format!("{images}I")];
        if let Some(ips) = op.unique_ips.filter(|ips| *ips > 0) {
            parts.push(format!("{ips}P"));
        }
        parts.join(" / ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PostBuilder, PostComment, PostImage};
    use crate::site::Site;

    fn post(no: u64, op: bool) -> Post {
        let mut builder = PostBuilder::new("g", no);
        builder.op = op;
        builder.op_id = 1;
        builder.build(PostComment::default())
    }

    #[test]
    fn summary_uses_op_counters() {
        let mut op = post(1, true);
        op.replies = Some(12);
        op.images_count = Some(3);
        op.unique_ips = Some(5);
        let thread = ChanThread::new(
            Loadable::thread(Site::FourChan, "g", 1, ""),
            vec![op, post(2, false)],
        );
        assert_eq!(thread.summary(), "12R / 3I / 5P");
    }

    #[test]
    fn summary_falls_back_to_counting() {
        let mut reply = post(2, false);
        reply.images.push(PostImage::default());
        let thread = ChanThread::new(
            Loadable::thread(Site::FourChan, "g", 1, ""),
            vec![post(1, true), reply, post(3, false)],
        );
        assert_eq!(thread.summary(), "2R / 1I");
        assert_eq!(thread.find(3).map(|p| p.no), Some(3));
        assert!(thread.find(9).is_none());
    }
}
