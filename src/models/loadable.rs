//! Loadable and board definitions

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

use crate::site::Site;

/// Static information about a board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    /// Board code without slashes (e.g. `g`)
    pub code: String,
    /// Display name
    pub name: String,
    /// Number of catalog pages before a thread falls off
    pub pages: u32,
    /// Replies after which the thread stops bumping (0 = none)
    pub bump_limit: u32,
    /// Images after which no more files may be posted (0 = none)
    pub image_limit: u32,
}

impl Board {
    /// Create a board with no known limits
    pub fn new(code: &str) -> Self {
        Self {
            code: code.to_string(),
            name: format!("/{code}/"),
            pages: 10,
            bump_limit: 0,
            image_limit: 0,
        }
    }

    /// Whether `replies` has reached the bump limit
    pub const fn is_bump_limited(&self, replies: u32) -> bool {
        self.bump_limit > 0 && replies >= self.bump_limit
    }

    /// Whether `images` has reached the image limit
    pub const fn is_image_limited(&self, images: u32) -> bool {
        self.image_limit > 0 && images >= self.image_limit
    }
}

/// What a loadable points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadableMode {
    /// A board catalog
    #[default]
    Catalog,
    /// A single thread
    Thread,
}

impl LoadableMode {
    /// Get the storage name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Catalog => "catalog",
            Self::Thread => "thread",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "catalog" => Some(Self::Catalog),
            "thread" => Some(Self::Thread),
            _ => None,
        }
    }
}

/// Something that can be loaded: a board catalog or a thread.
///
/// Two loadables are equal when they point at the same thing; the
/// scroll position and bookkeeping fields are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loadable {
    /// Site this loadable belongs to
    pub site: Site,
    /// Board code
    pub board: String,
    /// Catalog or thread
    pub mode: LoadableMode,
    /// Thread number (0 for catalogs)
    pub no: u64,
    /// Thread title, filled in once the OP is known
    pub title: String,
    /// Index of the first visible list item
    #[serde(default)]
    pub list_view_index: usize,
    /// Pixel offset of the first visible list item
    #[serde(default)]
    pub list_view_top: i32,
    /// Last post the user scrolled to
    #[serde(default)]
    pub last_viewed: Option<u64>,
    /// Last post seen at the previous load
    #[serde(default)]
    pub last_loaded: Option<u64>,
    /// Post to highlight after the next load
    #[serde(default)]
    pub marked_no: Option<u64>,
}

impl Loadable {
    /// A board catalog
    pub fn catalog(site: Site, board: &str) -> Self {
        Self {
            site,
            board: board.to_string(),
            mode: LoadableMode::Catalog,
            no: 0,
            title: String::new(),
            list_view_index: 0,
            list_view_top: 0,
            last_viewed: None,
            last_loaded: None,
            marked_no: None,
        }
    }

    /// A single thread
    pub fn thread(site: Site, board: &str, no: u64, title: &str) -> Self {
        Self {
            mode: LoadableMode::Thread,
            no,
            title: title.to_string(),
            ..Self::catalog(site, board)
        }
    }

    pub fn is_thread_mode(&self) -> bool {
        self.mode == LoadableMode::Thread
    }

    pub fn is_catalog_mode(&self) -> bool {
        self.mode == LoadableMode::Catalog
    }

    /// Web URL for a browser
    pub fn desktop_url(&self) -> String {
        self.site.desktop_url(self, None)
    }

    /// `/g/123` for threads, `/g/` for catalogs
    pub fn short_string(&self) -> String {
        match self.mode {
            LoadableMode::Catalog => format!("/{}/", self.board),
            LoadableMode::Thread => format!("/{}/{}", self.board, self.no),
        }
    }

    /// Stable persistence key: `site:board:no`
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.site.id(), self.board, self.no)
    }
}

impl PartialEq for Loadable {
    fn eq(&self, other: &Self) -> bool {
        self.site == other.site
            && self.board == other.board
            && self.mode == other.mode
            && (self.mode == LoadableMode::Catalog || self.no == other.no)
    }
}

impl Eq for Loadable {}

impl Hash for Loadable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.site.hash(state);
        self.board.hash(state);
        self.mode.hash(state);
        if self.mode == LoadableMode::Thread {
            self.no.hash(state);
        }
    }
}

impl std::fmt::Display for Loadable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.site, self.short_string())
    }
}
