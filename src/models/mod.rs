//! Data models for threadwatch

mod filter;
mod loadable;
mod pin;
mod post;
mod thread;

pub use filter::{Filter, FilterAction, FilterFields, HistoryEntry, PostHide, SavedReply};
pub use loadable::{Board, Loadable, LoadableMode};
pub use pin::Pin;
pub use post::{LinkValue, Post, PostBuilder, PostComment, PostFilter, PostImage, PostLinkable};
pub use thread::ChanThread;
