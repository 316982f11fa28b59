//! # threadwatch
//!
//! Imageboard thread loader and watcher for 4chan, vichan and 2ch style sites.
//!
//! ## Overview
//!
//! threadwatch fetches catalogs and threads, merges every refresh into the
//! previous snapshot (new posts appended, vanished posts marked deleted,
//! reply back-links rebuilt) and polls pinned threads with a back-off timer,
//! counting unread posts and quotes of your own posts.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       WatchManager                          │
//! │   Pins, foreground/background ticks, unread bookkeeping     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       ThreadLoader                          │
//! │   HTTP fetch → reader → filter + parse (rayon) → merge      │
//! └─────────────────────────────────────────────────────────────┘
//!          │                   │                   │
//!          ▼                   ▼                   ▼
//! ┌─────────────────┐ ┌─────────────────┐ ┌─────────────────┐
//! │      Site       │ │     Filter      │ │    Database     │
//! │                 │ │                 │ │                 │
//! │ • Endpoints     │ │ • Patterns      │ │ • Pins          │
//! │ • Futaba JSON   │ │ • Board scope   │ │ • Hides, saved  │
//! │ • 2ch JSON      │ │ • Actions       │ │ • Thread cache  │
//! └─────────────────┘ └─────────────────┘ └─────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration management
//! - [`db`]: `SQLite` database for pins, history, filters and cached threads
//! - [`filter`]: Post filter engine
//! - [`loader`]: Thread loading and post merging
//! - [`models`]: Data models (Loadable, Post, Pin, Filter)
//! - [`parser`]: Comment markup parsing and linkification
//! - [`site`]: Site endpoints and JSON readers
//! - [`watch`]: Pinned thread watcher
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use threadwatch::loader::{LoaderContext, LoaderEvent, ThreadLoader};
//! use threadwatch::models::Loadable;
//! use threadwatch::site::Site;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let ctx = Arc::new(LoaderContext::new(reqwest::Client::new(), None));
//! let loader = ThreadLoader::new(ctx, Loadable::thread(Site::FourChan, "g", 1, ""));
//! let mut events = loader.subscribe();
//! loader.request_data();
//! if let LoaderEvent::Data(thread) = events.recv().await? {
//!     println!("{} posts", thread.posts.len());
//! }
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/threadwatch/0.1.0")]
#![warn(rustdoc::missing_crate_level_docs)]
#![allow(clippy::unused_async)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::if_not_else)]
#![allow(clippy::single_match_else)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::trivially_copy_pass_by_ref)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::use_self)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::should_implement_trait)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::similar_names)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::return_self_not_must_use)]

pub mod config;
pub mod db;
pub mod filter;
pub mod loader;
pub mod models;
pub mod parser;
pub mod paths;
pub mod site;
pub mod watch;

// Re-export main types for convenience
pub use config::{Config, NotifyMode};
pub use db::Database;
pub use filter::FilterEngine;
pub use loader::{LoaderContext, LoaderError, LoaderEvent, ThreadLoader, WATCH_TIMEOUTS};
pub use models::{ChanThread, Filter, FilterAction, FilterFields, Loadable, LoadableMode, Pin, Post};
pub use site::Site;
pub use watch::{IntervalType, WatchEvent, WatchManager, WatchSettings};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
