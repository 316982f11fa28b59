//! Post model and the builder site readers fill in

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A file attached to a post
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostImage {
    /// Server side name (usually a timestamp)
    pub server_filename: String,
    /// Original upload name, without extension
    pub filename: String,
    /// Extension without the dot
    pub extension: String,
    pub width: u32,
    pub height: u32,
    /// Size in bytes
    pub size: u64,
    pub spoiler: bool,
    /// The file was deleted but the post remains
    pub deleted: bool,
    /// Base64 MD5 as reported by the site
    pub file_hash: Option<String>,
    pub image_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub spoiler_thumbnail_url: Option<String>,
}

/// Flags set on a post by filters and post hides
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostFilter {
    /// Highlight colour (RGB)
    pub highlight_color: Option<u32>,
    /// Collapse the post to a stub
    pub stub: bool,
    /// Drop the post from the list
    pub remove: bool,
    /// Watch the thread (catalog watch filters)
    pub watch: bool,
    /// Apply the same treatment to replies
    pub replies: bool,
    /// The filter only matched on OPs
    pub only_op: bool,
    /// The filter also applies to your own posts
    pub saved: bool,
}

impl PostFilter {
    /// Whether any visible action is set
    pub const fn has_action(&self) -> bool {
        self.highlight_color.is_some() || self.stub || self.remove || self.replies
    }
}

/// Target of a clickable span in a comment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LinkValue {
    /// Quote of a post in the same thread
    Quote {
        no: u64,
        to_op: bool,
        to_you: bool,
        to_self: bool,
    },
    /// Link to a post in another thread
    Thread { board: String, op: u64, post: u64 },
    /// Link to a board
    Board(String),
    /// Catalog search on a board
    Search { board: String, query: String },
    /// Spoilered text
    Spoiler,
    /// Quote of a post that no longer exists
    Dead(u64),
    /// Plain web link
    Link(String),
}

/// A clickable span in a parsed comment (byte offsets into `PostComment::text`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostLinkable {
    pub start: usize,
    pub end: usize,
    pub value: LinkValue,
}

/// A comment converted to plain text plus its linkables
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostComment {
    pub text: String,
    pub linkables: Vec<PostLinkable>,
}

impl PostComment {
    /// Numbers of posts quoted in this comment
    pub fn quotes(&self) -> impl Iterator<Item = u64> + '_ {
        self.linkables.iter().filter_map(|l| match l.value {
            LinkValue::Quote { no, .. } => Some(no),
            _ => None,
        })
    }

    /// Text covered by a linkable
    pub fn span_text(&self, linkable: &PostLinkable) -> &str {
        self.text.get(linkable.start..linkable.end).unwrap_or_default()
    }
}

/// Mutable accumulator filled in by site readers
#[derive(Debug, Clone, Default)]
pub struct PostBuilder {
    pub board: String,
    pub no: u64,
    pub op_id: u64,
    pub op: bool,
    pub replies: Option<u32>,
    pub images_count: Option<u32>,
    pub unique_ips: Option<u32>,
    pub sticky: bool,
    pub closed: bool,
    pub archived: bool,
    pub last_modified: Option<i64>,
    pub subject: String,
    pub name: String,
    /// Raw comment HTML as sent by the site
    pub comment: String,
    pub tripcode: String,
    /// Unix timestamp in seconds
    pub unix_timestamp: i64,
    pub images: Vec<PostImage>,
    pub poster_id: String,
    pub moderator_capcode: String,
    pub country_code: String,
    pub country_name: String,
    pub filter: PostFilter,
    pub is_saved_reply: bool,
    pub replies_to: BTreeSet<u64>,
}

impl PostBuilder {
    /// Start a builder for post `no` on `board`
    pub fn new(board: &str, no: u64) -> Self {
        Self {
            board: board.to_string(),
            no,
            ..Self::default()
        }
    }

    /// Finish the post with its parsed comment
    pub fn build(self, comment: PostComment) -> Post {
        Post {
            board: self.board,
            no: self.no,
            op_id: self.op_id,
            is_op: self.op,
            replies: self.replies,
            images_count: self.images_count,
            unique_ips: self.unique_ips,
            sticky: self.sticky,
            closed: self.closed,
            archived: self.archived,
            last_modified: self.last_modified,
            subject: self.subject,
            name: self.name,
            comment,
            raw_comment: self.comment,
            tripcode: self.tripcode,
            time: self.unix_timestamp,
            images: self.images,
            poster_id: self.poster_id,
            capcode: self.moderator_capcode,
            country_code: self.country_code,
            country_name: self.country_name,
            filter: self.filter,
            is_saved_reply: self.is_saved_reply,
            replies_to: self.replies_to,
            replies_from: Vec::new(),
            deleted: false,
        }
    }
}

/// A parsed post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub board: String,
    pub no: u64,
    /// Number of the thread's OP
    pub op_id: u64,
    pub is_op: bool,
    /// OP only: reply count reported by the site
    pub replies: Option<u32>,
    /// OP only: image count reported by the site
    pub images_count: Option<u32>,
    /// OP only: distinct posters
    pub unique_ips: Option<u32>,
    pub sticky: bool,
    pub closed: bool,
    pub archived: bool,
    pub last_modified: Option<i64>,
    pub subject: String,
    pub name: String,
    pub comment: PostComment,
    pub raw_comment: String,
    pub tripcode: String,
    pub time: i64,
    pub images: Vec<PostImage>,
    pub poster_id: String,
    pub capcode: String,
    pub country_code: String,
    pub country_name: String,
    pub filter: PostFilter,
    pub is_saved_reply: bool,
    /// Posts this post quotes
    pub replies_to: BTreeSet<u64>,
    /// Posts quoting this post, in thread order
    pub replies_from: Vec<u64>,
    /// Gone from the server since it was first seen
    pub deleted: bool,
}

impl Post {
    /// Creation time
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.time, 0)
    }

    /// Single-line comment preview, at most `max_chars` characters
    pub fn excerpt(&self, max_chars: usize) -> String {
        let content = self.comment.text.split_whitespace().collect::<Vec<_>>().join(" ");
        if content.chars().count() <= max_chars {
            content
        } else {
            let cut: String = content.chars().take(max_chars.saturating_sub(3)).collect();
            format!("{cut}...")
        }
    }

    /// Title for a thread: the subject, or the start of the comment
    pub fn title(&self) -> String {
        if self.subject.trim().is_empty() {
            self.excerpt(50)
        } else {
            self.subject.trim().to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post_with_text(text: &str) -> Post {
        PostBuilder::new("g", 1).build(PostComment {
            text: text.to_string(),
            linkables: Vec::new(),
        })
    }

    #[test]
    fn build_carries_fields() {
        let mut builder = PostBuilder::new("g", 42);
        builder.op = true;
        builder.op_id = 42;
        builder.comment = "<b>hi</b>".to_string();
        builder.replies_to.insert(7);

        let post = builder.build(PostComment::default());
        assert!(post.is_op);
        assert_eq!(post.no, 42);
        assert_eq!(post.raw_comment, "<b>hi</b>");
        assert!(post.replies_to.contains(&7));
        assert!(post.replies_from.is_empty());
        assert!(!post.deleted);
    }

    #[test]
    fn excerpt_collapses_whitespace_and_truncates() {
        let post = post_with_text("hello\n\nworld   again");
        assert_eq!(post.excerpt(100), "hello world again");
        assert_eq!(post.excerpt(8), "hello...");
    }

    #[test]
    fn title_prefers_subject() {
        let mut post = post_with_text("comment body");
        assert_eq!(post.title(), "comment body");
        post.subject = " Subject ".to_string();
        assert_eq!(post.title(), "Subject");
    }

    #[test]
    fn quotes_lists_quote_linkables() {
        let comment = PostComment {
            text: ">>1 >>2 http://x".to_string(),
            linkables: vec![
                PostLinkable {
                    start: 0,
                    end: 3,
                    value: LinkValue::Quote {
                        no: 1,
                        to_op: true,
                        to_you: false,
                        to_self: false,
                    },
                },
                PostLinkable {
                    start: 8,
                    end: 16,
                    value: LinkValue::Link("http://x".to_string()),
                },
            ],
        };
        assert_eq!(comment.quotes().collect::<Vec<_>>(), vec![1]);
        assert_eq!(comment.span_text(&comment.linkables[1]), "http://x");
    }
}
