//! Filters, post hides, saved replies and history entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Loadable;
use crate::site::Site;

/// Bitmask of post fields a filter looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterFields(u32);

impl FilterFields {
    pub const TRIPCODE: Self = Self(1);
    pub const NAME: Self = Self(1 << 1);
    pub const COMMENT: Self = Self(1 << 2);
    pub const ID: Self = Self(1 << 3);
    pub const SUBJECT: Self = Self(1 << 4);
    pub const FILENAME: Self = Self(1 << 5);
    pub const COUNTRY_CODE: Self = Self(1 << 6);

    /// Fields in the order they are checked
    pub const ORDERED: [Self; 7] = [
        Self::TRIPCODE,
        Self::NAME,
        Self::COMMENT,
        Self::ID,
        Self::SUBJECT,
        Self::COUNTRY_CODE,
        Self::FILENAME,
    ];

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn all() -> Self {
        Self(0x7f)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits & 0x7f)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Single-field name, as used on the command line
    pub const fn name(self) -> &'static str {
        match self.0 {
            1 => "tripcode",
            2 => "name",
            4 => "comment",
            8 => "id",
            16 => "subject",
            32 => "filename",
            64 => "country",
            _ => "mixed",
        }
    }

    /// Parse a comma separated list of field names
    pub fn parse_list(s: &str) -> Option<Self> {
        let mut fields = Self::empty();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let field = match part.to_lowercase().as_str() {
                "tripcode" | "trip" => Self::TRIPCODE,
                "name" => Self::NAME,
                "comment" | "com" => Self::COMMENT,
                "id" => Self::ID,
                "subject" | "sub" => Self::SUBJECT,
                "filename" | "file" => Self::FILENAME,
                "country" | "flag" => Self::COUNTRY_CODE,
                "all" => Self::all(),
                _ => return None,
            };
            fields = fields.union(field);
        }
        (!fields.is_empty()).then_some(fields)
    }
}

impl std::fmt::Display for FilterFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = Self::ORDERED
            .iter()
            .filter(|field| self.contains(**field))
            .map(|field| field.name())
            .collect();
        write!(f, "{}", names.join(","))
    }
}

/// What happens to a post a filter matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterAction {
    /// Collapse to a stub
    #[default]
    Hide,
    /// Highlight with the filter colour
    Color,
    /// Remove from the list
    Remove,
    /// Pin matching catalog threads
    Watch,
}

impl FilterAction {
    /// Stable numeric id used in the database
    pub const fn id(&self) -> i32 {
        match self {
            Self::Hide => 0,
            Self::Color => 1,
            Self::Remove => 2,
            Self::Watch => 3,
        }
    }

    pub const fn from_id(id: i32) -> Option<Self> {
        match id {
            0 => Some(Self::Hide),
            1 => Some(Self::Color),
            2 => Some(Self::Remove),
            3 => Some(Self::Watch),
            _ => None,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Hide => "hide",
            Self::Color => "color",
            Self::Remove => "remove",
            Self::Watch => "watch",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "hide" => Some(Self::Hide),
            "color" | "colour" | "highlight" => Some(Self::Color),
            "remove" => Some(Self::Remove),
            "watch" => Some(Self::Watch),
            _ => None,
        }
    }
}

impl std::fmt::Display for FilterAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A user-defined post filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub id: Uuid,
    pub enabled: bool,
    pub fields: FilterFields,
    pub pattern: String,
    /// Applies everywhere, regardless of `boards`
    pub all_boards: bool,
    /// `board` or `site:board` entries
    pub boards: Vec<String>,
    pub action: FilterAction,
    /// RGB colour for `FilterAction::Color`
    pub color: u32,
    pub apply_to_replies: bool,
    pub only_on_op: bool,
    pub apply_to_saved: bool,
    pub order: i32,
}

impl Filter {
    /// An enabled filter on all boards
    pub fn new(pattern: &str, fields: FilterFields, action: FilterAction) -> Self {
        Self {
            id: Uuid::new_v4(),
            enabled: true,
            fields,
            pattern: pattern.to_string(),
            all_boards: true,
            boards: Vec::new(),
            action,
            color: 0x00ff_0000,
            apply_to_replies: false,
            only_on_op: false,
            apply_to_saved: false,
            order: 0,
        }
    }
}

/// A post the user hid or removed by hand
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostHide {
    pub site: Site,
    pub board: String,
    pub no: u64,
    /// Thread the post belongs to
    pub thread_no: u64,
    /// The hide targets the whole thread (catalog entry)
    pub whole_thread: bool,
    /// `true` collapses to a stub, `false` removes
    pub hide: bool,
}

/// A post the user made
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SavedReply {
    pub site: Site,
    pub board: String,
    pub no: u64,
}

/// A visited catalog or thread
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub loadable: Loadable,
    pub last_visited: DateTime<Utc>,
}
