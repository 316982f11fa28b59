//! Imageboard sites: endpoints and JSON readers
//!
//! Every supported site speaks one of two JSON dialects. 4chan and the
//! vichan family share the Futaba layout, 2ch has its own. Loader code only
//! ever talks to [`Site`] and [`Reader`], so adding a site means adding an
//! endpoint arm here and, if needed, a reader.

pub mod dvach;
pub mod futaba;

use serde::{Deserialize, Deserializer, Serialize};

use crate::loader::ProcessingQueue;
use crate::models::{Board, Loadable, LoadableMode};

const FOURCHAN_API: &str = "https://a.4cdn.org";
const FOURCHAN_MEDIA: &str = "https://i.4cdn.org";
const FOURCHAN_STATIC: &str = "https://s.4cdn.org";
const FOURCHAN_BOARDS: &str = "https://boards.4chan.org";
const DVACH_ROOT: &str = "https://2ch.hk";

/// Unified reader trait for site JSON dialects
pub trait ChanReader {
    /// Parse a thread response, pushing every post into the queue
    fn load_thread(&self, json: &[u8], queue: &mut ProcessingQueue) -> serde_json::Result<()>;

    /// Parse a catalog response, pushing every thread OP into the queue
    fn load_catalog(&self, json: &[u8], queue: &mut ProcessingQueue) -> serde_json::Result<()>;
}

/// Reader that wraps the dialect-specific implementations
pub enum Reader {
    /// 4chan and vichan JSON
    Futaba(futaba::FutabaReader),
    /// 2ch JSON
    Dvach(dvach::DvachReader),
}

impl Reader {
    /// Parse a thread response
    pub fn load_thread(&self, json: &[u8], queue: &mut ProcessingQueue) -> serde_json::Result<()> {
        match self {
            Self::Futaba(r) => r.load_thread(json, queue),
            Self::Dvach(r) => r.load_thread(json, queue),
        }
    }

    /// Parse a catalog response
    pub fn load_catalog(&self, json: &[u8], queue: &mut ProcessingQueue) -> serde_json::Result<()> {
        match self {
            Self::Futaba(r) => r.load_catalog(json, queue),
            Self::Dvach(r) => r.load_catalog(json, queue),
        }
    }

    /// Parse whichever response the queue's loadable expects
    pub fn load(&self, json: &[u8], queue: &mut ProcessingQueue) -> serde_json::Result<()> {
        match queue.loadable().mode {
            LoadableMode::Thread => self.load_thread(json, queue),
            LoadableMode::Catalog => self.load_catalog(json, queue),
        }
    }
}

/// Supported imageboards
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Site {
    /// 4chan
    #[default]
    FourChan,
    /// Any vichan/infinity style board at `root`
    Vichan { name: String, root: String },
    /// 2ch.hk
    Dvach,
}

impl Site {
    /// Parse `4chan`, `2ch` or `vichan:<root url>`
    pub fn from_str(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Some(root) = s.strip_prefix("vichan:") {
            return Self::vichan(root);
        }
        match s.to_lowercase().as_str() {
            "4chan" | "4channel" => Some(Self::FourChan),
            "2ch" | "2ch.hk" | "dvach" => Some(Self::Dvach),
            _ => None,
        }
    }

    /// A vichan site rooted at `root` (`http(s)://host[/path]`)
    pub fn vichan(root: &str) -> Option<Self> {
        let root = root.trim().trim_end_matches('/');
        let host = root
            .strip_prefix("https://")
            .or_else(|| root.strip_prefix("http://"))?;
        if host.is_empty() {
            return None;
        }
        let name = host.split('/').next().unwrap_or(host).to_string();
        Some(Self::Vichan {
            name,
            root: root.to_string(),
        })
    }

    /// Stable identifier used for persistence
    pub fn id(&self) -> String {
        match self {
            Self::FourChan => "4chan".to_string(),
            Self::Vichan { root, .. } => format!("vichan:{root}"),
            Self::Dvach => "2ch".to_string(),
        }
    }

    /// Display name
    pub fn name(&self) -> &str {
        match self {
            Self::FourChan => "4chan",
            Self::Vichan { name, .. } => name,
            Self::Dvach => "2ch",
        }
    }

    /// The JSON reader for this site's dialect
    pub fn reader(&self) -> Reader {
        match self {
            Self::FourChan | Self::Vichan { .. } => Reader::Futaba(futaba::FutabaReader::new(self.clone())),
            Self::Dvach => Reader::Dvach(dvach::DvachReader::new()),
        }
    }

    /// Known board limits
    pub fn board(&self, code: &str) -> Board {
        let mut board = Board::new(code);
        match self {
            Self::FourChan => {
                board.bump_limit = 300;
                board.image_limit = 150;
            }
            Self::Dvach => {
                board.bump_limit = 500;
                board.pages = 5;
            }
            Self::Vichan { .. } => {}
        }
        board
    }

    // ==================== Endpoints ====================

    pub fn catalog_url(&self, board: &str) -> String {
        match self {
            Self::FourChan => format!("{FOURCHAN_API}/{board}/catalog.json"),
            Self::Vichan { root, .. } => format!("{root}/{board}/catalog.json"),
            Self::Dvach => format!("{DVACH_ROOT}/{board}/catalog.json"),
        }
    }

    pub fn thread_url(&self, board: &str, no: u64) -> String {
        match self {
            Self::FourChan => format!("{FOURCHAN_API}/{board}/thread/{no}.json"),
            Self::Vichan { root, .. } => format!("{root}/{board}/res/{no}.json"),
            Self::Dvach => format!("{DVACH_ROOT}/{board}/res/{no}.json"),
        }
    }

    /// JSON endpoint for a loadable
    pub fn url(&self, loadable: &Loadable) -> String {
        match loadable.mode {
            LoadableMode::Catalog => self.catalog_url(&loadable.board),
            LoadableMode::Thread => self.thread_url(&loadable.board, loadable.no),
        }
    }

    /// Full-size file URL.
    ///
    /// `server_filename` is the site's stored name; 2ch sends a path instead,
    /// which is resolved against the site root. /f/ on 4chan keys files by
    /// their original name.
    pub fn image_url(&self, board: &str, server_filename: &str, filename: &str, ext: &str) -> String {
        match self {
            Self::FourChan if board == "f" => format!("{FOURCHAN_MEDIA}/{board}/{filename}.{ext}"),
            Self::FourChan => format!("{FOURCHAN_MEDIA}/{board}/{server_filename}.{ext}"),
            Self::Vichan { root, .. } => format!("{root}/{board}/src/{server_filename}.{ext}"),
            Self::Dvach => format!("{DVACH_ROOT}{server_filename}"),
        }
    }

    /// Thumbnail URL, or the generic spoiler image
    pub fn thumbnail_url(&self, board: &str, server_filename: &str, ext: &str, spoiler: bool) -> String {
        match self {
            Self::FourChan if spoiler => format!("{FOURCHAN_STATIC}/image/spoiler.png"),
            Self::FourChan => format!("{FOURCHAN_MEDIA}/{board}/{server_filename}s.jpg"),
            Self::Vichan { root, .. } if spoiler => format!("{root}/static/spoiler.png"),
            Self::Vichan { root, .. } => {
                let ext = match ext {
                    "webm" | "mp4" | "pdf" => "jpg",
                    other => other,
                };
                format!("{root}/{board}/thumb/{server_filename}.{ext}")
            }
            Self::Dvach => format!("{DVACH_ROOT}{server_filename}"),
        }
    }

    /// Country flag image, when the site has them
    pub fn flag_url(&self, country_code: &str) -> Option<String> {
        if country_code.is_empty() {
            return None;
        }
        let cc = country_code.to_lowercase();
        match self {
            Self::FourChan => Some(format!("{FOURCHAN_STATIC}/image/country/{cc}.gif")),
            Self::Vichan { root, .. } => Some(format!("{root}/static/flags/{cc}.png")),
            Self::Dvach => None,
        }
    }

    /// Browser URL for a loadable, optionally anchored at a post
    pub fn desktop_url(&self, loadable: &Loadable, post: Option<u64>) -> String {
        let board = &loadable.board;
        let no = loadable.no;
        match (self, loadable.mode) {
            (Self::FourChan, LoadableMode::Catalog) => format!("{FOURCHAN_BOARDS}/{board}/"),
            (Self::FourChan, LoadableMode::Thread) => match post {
                Some(p) => format!("{FOURCHAN_BOARDS}/{board}/thread/{no}#p{p}"),
                None => format!("{FOURCHAN_BOARDS}/{board}/thread/{no}"),
            },
            (Self::Vichan { root, .. }, LoadableMode::Catalog) => format!("{root}/{board}/"),
            (Self::Dvach, LoadableMode::Catalog) => format!("{DVACH_ROOT}/{board}/"),
            (Self::Vichan { root, .. }, LoadableMode::Thread) => res_url(root, board, no, post),
            (Self::Dvach, LoadableMode::Thread) => res_url(DVACH_ROOT, board, no, post),
        }
    }
}

fn res_url(root: &str, board: &str, no: u64, post: Option<u64>) -> String {
    match post {
        Some(p) => format!("{root}/{board}/res/{no}.html#{p}"),
        None => format!("{root}/{board}/res/{no}.html"),
    }
}

impl std::fmt::Display for Site {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl TryFrom<String> for Site {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(&value).ok_or_else(|| format!("unknown site: {value}"))
    }
}

impl From<Site> for String {
    fn from(site: Site) -> Self {
        site.id()
    }
}

// ==================== Lenient JSON helpers ====================

#[derive(Deserialize)]
#[serde(untagged)]
enum NumOrString {
    Num(i64),
    Float(f64),
    Str(String),
}

/// Accept `1`, `"1"`, `true` or `null` as a flag
pub(crate) fn de_flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Other(NumOrString),
    }

    Ok(match Option::<Flag>::deserialize(d)? {
        None => false,
        Some(Flag::Bool(b)) => b,
        Some(Flag::Other(NumOrString::Num(n))) => n != 0,
        Some(Flag::Other(NumOrString::Float(n))) => n != 0.0,
        Some(Flag::Other(NumOrString::Str(s))) => !matches!(s.as_str(), "" | "0" | "false"),
    })
}

/// Accept a post number sent either as an integer or a string
pub(crate) fn de_number<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    use serde::de::Error;

    match NumOrString::deserialize(d)? {
        NumOrString::Num(n) => u64::try_from(n).map_err(D::Error::custom),
        NumOrString::Float(_) => Err(D::Error::custom("expected an integer post number")),
        NumOrString::Str(s) => s.trim().parse().map_err(D::Error::custom),
    }
}

/// Accept an optional value that may be a string or a number, as a string
pub(crate) fn de_opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<NumOrString>::deserialize(d)?.map(|v| match v {
        NumOrString::Num(n) => n.to_string(),
        NumOrString::Float(n) => n.to_string(),
        NumOrString::Str(s) => s,
    }))
}
