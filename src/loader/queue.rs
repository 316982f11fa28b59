//! Processing queue: splits a response into reused and freshly parsed posts

use rayon::prelude::*;
use std::collections::{HashMap, HashSet};

use crate::filter::FilterEngine;
use crate::models::{Loadable, Post, PostBuilder, PostHide};
use crate::parser::CommentParser;

/// Collects the builders a reader produces for one response.
///
/// Posts already present in the previous snapshot are reused as-is; only
/// unknown post numbers are filtered and comment-parsed. A number seen twice
/// in one response keeps its first occurrence.
pub struct ProcessingQueue {
    loadable: Loadable,
    cached: HashMap<u64, Post>,
    queued: HashSet<u64>,
    to_reuse: Vec<Post>,
    to_parse: Vec<PostBuilder>,
    op: Option<PostBuilder>,
}

impl ProcessingQueue {
    pub fn new(cached: &[Post], loadable: Loadable) -> Self {
        Self {
            loadable,
            cached: cached.iter().map(|p| (p.no, p.clone())).collect(),
            queued: HashSet::new(),
            to_reuse: Vec::new(),
            to_parse: Vec::new(),
            op: None,
        }
    }

    pub const fn loadable(&self) -> &Loadable {
        &self.loadable
    }

    pub fn cached_post(&self, no: u64) -> Option<&Post> {
        self.cached.get(&no)
    }

    /// Queue a post, reusing the cached copy when the number is known
    pub fn add(&mut self, builder: PostBuilder) {
        if !self.queued.insert(builder.no) {
            tracing::debug!("Skipping duplicate post {}", builder.no);
            return;
        }
        match self.cached.get(&builder.no) {
            Some(cached) => self.to_reuse.push(cached.clone()),
            None => self.to_parse.push(builder),
        }
    }

    /// Record the freshly read OP; its counters override the snapshot's
    pub fn set_op(&mut self, builder: PostBuilder) {
        self.op = Some(builder);
    }

    pub const fn op(&self) -> Option<&PostBuilder> {
        self.op.as_ref()
    }

    pub fn to_reuse(&self) -> &[Post] {
        &self.to_reuse
    }

    pub fn to_parse(&self) -> &[PostBuilder] {
        &self.to_parse
    }
}

/// Filter and parse every queued builder on the rayon pool.
///
/// The set of post numbers in the thread is fixed before any worker
/// starts. The result holds the reused posts first, then the parsed posts
/// in response order.
pub fn parse_posts(
    queue: ProcessingQueue,
    filters: &FilterEngine,
    saved: &HashSet<u64>,
    hides: &[PostHide],
) -> Vec<Post> {
    let ProcessingQueue {
        loadable,
        cached,
        to_reuse,
        to_parse,
        ..
    } = queue;

    let internal_nos: HashSet<u64> = cached
        .keys()
        .copied()
        .chain(to_reuse.iter().map(|p| p.no))
        .chain(to_parse.iter().map(|b| b.no))
        .collect();
    let hides_by_no: HashMap<u64, &PostHide> = hides.iter().map(|h| (h.no, h)).collect();
    let parser = CommentParser::new();

    let parsed: Vec<Post> = to_parse
        .into_par_iter()
        .map(|mut builder| {
            builder.is_saved_reply = saved.contains(&builder.no);
            filters.apply(&loadable.site, &mut builder);

            // A thread's own OP is never hidden inside the thread
            if let Some(hide) = hides_by_no.get(&builder.no)
                && !(builder.op && loadable.is_thread_mode())
            {
                if hide.hide {
                    builder.filter.stub = true;
                } else {
                    builder.filter.remove = true;
                }
            }

            let comment = parser.parse(&mut builder, &internal_nos, saved);
            builder.build(comment)
        })
        .collect();

    let mut posts = to_reuse;
    posts.extend(parsed);
    posts
}
