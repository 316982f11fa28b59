//! Database module for `SQLite` storage (history, pins, filters, saved replies, hides, thread cache)

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;
use uuid::Uuid;

use crate::models::{
    ChanThread, Filter, FilterAction, FilterFields, HistoryEntry, Loadable, LoadableMode, Pin,
    PostHide, SavedReply,
};
use crate::paths;
use crate::site::Site;

/// Database connection wrapper
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create the database at the default location
    pub fn open() -> Result<Self> {
        let path = Self::default_path()?;
        Self::open_path(&path)
    }

    /// Open or create the database at a specific path
    pub fn open_path(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create data directory")?;
        }

        let conn = Connection::open(path).context("Failed to open database")?;

        let db = Self { conn };
        db.init()?;

        Ok(db)
    }

    /// Get the default database path
    pub fn default_path() -> Result<PathBuf> {
        paths::database_path()
    }

    /// Initialize the database schema
    fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r"
            -- Browsing history
            CREATE TABLE IF NOT EXISTS loadables (
                key TEXT PRIMARY KEY,
                site TEXT NOT NULL,
                board TEXT NOT NULL,
                mode TEXT NOT NULL,
                no INTEGER NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                list_view_index INTEGER NOT NULL DEFAULT 0,
                list_view_top INTEGER NOT NULL DEFAULT 0,
                last_viewed INTEGER,
                last_loaded INTEGER,
                marked_no INTEGER,
                last_visited TEXT NOT NULL
            );

            -- Pinned threads
            CREATE TABLE IF NOT EXISTS pins (
                id TEXT PRIMARY KEY,
                site TEXT NOT NULL,
                board TEXT NOT NULL,
                no INTEGER NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                watching INTEGER NOT NULL DEFAULT 1,
                watch_last_count INTEGER NOT NULL DEFAULT -1,
                watch_new_count INTEGER NOT NULL DEFAULT -1,
                quote_last_count INTEGER NOT NULL DEFAULT -1,
                quote_new_count INTEGER NOT NULL DEFAULT -1,
                is_error INTEGER NOT NULL DEFAULT 0,
                archived INTEGER NOT NULL DEFAULT 0,
                is_sticky INTEGER NOT NULL DEFAULT 0,
                pin_order INTEGER NOT NULL DEFAULT 0,
                thumbnail_url TEXT,
                UNIQUE(site, board, no)
            );

            -- Filters
            CREATE TABLE IF NOT EXISTS filters (
                id TEXT PRIMARY KEY,
                enabled INTEGER NOT NULL DEFAULT 1,
                fields INTEGER NOT NULL,
                pattern TEXT NOT NULL,
                all_boards INTEGER NOT NULL DEFAULT 1,
                boards TEXT NOT NULL DEFAULT '',
                action INTEGER NOT NULL,
                color INTEGER NOT NULL DEFAULT 0,
                apply_to_replies INTEGER NOT NULL DEFAULT 0,
                only_on_op INTEGER NOT NULL DEFAULT 0,
                apply_to_saved INTEGER NOT NULL DEFAULT 0,
                filter_order INTEGER NOT NULL DEFAULT 0
            );

            -- Posts made by the user
            CREATE TABLE IF NOT EXISTS saved_replies (
                site TEXT NOT NULL,
                board TEXT NOT NULL,
                no INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (site, board, no)
            );

            -- Hidden and removed posts
            CREATE TABLE IF NOT EXISTS post_hides (
                site TEXT NOT NULL,
                board TEXT NOT NULL,
                no INTEGER NOT NULL,
                thread_no INTEGER NOT NULL,
                whole_thread INTEGER NOT NULL DEFAULT 0,
                hide INTEGER NOT NULL DEFAULT 1,
                PRIMARY KEY (site, board, no)
            );

            -- Last known thread snapshots
            CREATE TABLE IF NOT EXISTS thread_cache (
                key TEXT PRIMARY KEY,
                json TEXT NOT NULL,
                cached_at TEXT NOT NULL
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_loadables_last_visited ON loadables(last_visited);
            CREATE INDEX IF NOT EXISTS idx_post_hides_thread ON post_hides(site, board, thread_no);
            CREATE INDEX IF NOT EXISTS idx_thread_cache_cached_at ON thread_cache(cached_at);
            ",
        )?;

        Ok(())
    }

    // ==================== History ====================

    /// Record a visit, replacing any previous entry for the same loadable
    pub fn record_history(&self, loadable: &Loadable) -> Result<()> {
        self.conn.execute(
            r"INSERT OR REPLACE INTO loadables
               (key, site, board, mode, no, title, list_view_index, list_view_top,
                last_viewed, last_loaded, marked_no, last_visited)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                loadable.key(),
                loadable.site.id(),
                loadable.board,
                loadable.mode.name(),
                to_sql_int(loadable.no),
                loadable.title,
                to_sql_int(loadable.list_view_index as u64),
                loadable.list_view_top,
                loadable.last_viewed.map(to_sql_int),
                loadable.last_loaded.map(to_sql_int),
                loadable.marked_no.map(to_sql_int),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Most recently visited first
    pub fn history(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT site, board, mode, no, title, list_view_index, list_view_top,
                    last_viewed, last_loaded, marked_no, last_visited
             FROM loadables ORDER BY last_visited DESC LIMIT ?1",
        )?;

        let entries = stmt.query_map(params![to_sql_int(limit as u64)], |row| {
            let mode_str: String = row.get(2)?;
            let loadable = Loadable {
                site: site_column(row, 0)?,
                board: row.get(1)?,
                mode: LoadableMode::from_str(&mode_str).unwrap_or_default(),
                no: u64_column(row, 3)?,
                title: row.get(4)?,
                list_view_index: usize::try_from(u64_column(row, 5)?).unwrap_or_default(),
                list_view_top: row.get(6)?,
                last_viewed: opt_u64_column(row, 7)?,
                last_loaded: opt_u64_column(row, 8)?,
                marked_no: opt_u64_column(row, 9)?,
            };
            Ok(HistoryEntry {
                loadable,
                last_visited: time_column(row, 10)?,
            })
        })?;

        entries.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Forget all history
    pub fn clear_history(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM loadables", [])?)
    }

    // ==================== Pins ====================

    /// Insert a new pin
    pub fn insert_pin(&self, pin: &Pin) -> Result<()> {
        self.conn.execute(
            r"INSERT INTO pins (id, site, board, no, title, watching, watch_last_count, watch_new_count,
                                quote_last_count, quote_new_count, is_error, archived, is_sticky,
                                pin_order, thumbnail_url)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                pin.id.to_string(),
                pin.loadable.site.id(),
                pin.loadable.board,
                to_sql_int(pin.loadable.no),
                pin.loadable.title,
                i32::from(pin.watching),
                pin.watch_last_count,
                pin.watch_new_count,
                pin.quote_last_count,
                pin.quote_new_count,
                i32::from(pin.is_error),
                i32::from(pin.archived),
                i32::from(pin.is_sticky),
                pin.order,
                pin.thumbnail_url,
            ],
        )?;
        Ok(())
    }

    /// Update a pin's state
    pub fn update_pin(&self, pin: &Pin) -> Result<()> {
        self.conn.execute(
            r"UPDATE pins SET title = ?2, watching = ?3, watch_last_count = ?4, watch_new_count = ?5,
                              quote_last_count = ?6, quote_new_count = ?7, is_error = ?8,
                              archived = ?9, is_sticky = ?10, pin_order = ?11, thumbnail_url = ?12
               WHERE id = ?1",
            params![
                pin.id.to_string(),
                pin.loadable.title,
                i32::from(pin.watching),
                pin.watch_last_count,
                pin.watch_new_count,
                pin.quote_last_count,
                pin.quote_new_count,
                i32::from(pin.is_error),
                i32::from(pin.archived),
                i32::from(pin.is_sticky),
                pin.order,
                pin.thumbnail_url,
            ],
        )?;
        Ok(())
    }

    /// Delete a pin
    pub fn delete_pin(&self, id: Uuid) -> Result<()> {
        self.conn
            .execute("DELETE FROM pins WHERE id = ?1", params![id.to_string()])?;
        Ok(())
    }

    /// All pins in display order
    pub fn pins(&self) -> Result<Vec<Pin>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, site, board, no, title, watching, watch_last_count, watch_new_count,
                    quote_last_count, quote_new_count, is_error, archived, is_sticky,
                    pin_order, thumbnail_url
             FROM pins ORDER BY pin_order, rowid",
        )?;

        let pins = stmt.query_map([], |row| {
            let site = site_column(row, 1)?;
            let board: String = row.get(2)?;
            let title: String = row.get(4)?;
            Ok(Pin {
                id: uuid_column(row, 0)?,
                loadable: Loadable::thread(site, &board, u64_column(row, 3)?, &title),
                watching: row.get::<_, i32>(5)? != 0,
                watch_last_count: row.get(6)?,
                watch_new_count: row.get(7)?,
                quote_last_count: row.get(8)?,
                quote_new_count: row.get(9)?,
                is_error: row.get::<_, i32>(10)? != 0,
                archived: row.get::<_, i32>(11)? != 0,
                is_sticky: row.get::<_, i32>(12)? != 0,
                order: row.get(13)?,
                thumbnail_url: row.get(14)?,
            })
        })?;

        pins.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ==================== Filters ====================

    /// Insert or replace a filter
    pub fn save_filter(&self, filter: &Filter) -> Result<()> {
        self.conn.execute(
            r"INSERT OR REPLACE INTO filters
               (id, enabled, fields, pattern, all_boards, boards, action, color,
                apply_to_replies, only_on_op, apply_to_saved, filter_order)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                filter.id.to_string(),
                i32::from(filter.enabled),
                filter.fields.bits(),
                filter.pattern,
                i32::from(filter.all_boards),
                filter.boards.join(","),
                filter.action.id(),
                filter.color,
                i32::from(filter.apply_to_replies),
                i32::from(filter.only_on_op),
                i32::from(filter.apply_to_saved),
                filter.order,
            ],
        )?;
        Ok(())
    }

    /// Delete a filter
    pub fn delete_filter(&self, id: Uuid) -> Result<()> {
        self.conn
            .execute("DELETE FROM filters WHERE id = ?1", params![id.to_string()])?;
        Ok(())
    }

    /// All filters, enabled or not, by order
    pub fn filters(&self) -> Result<Vec<Filter>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, enabled, fields, pattern, all_boards, boards, action, color,
                    apply_to_replies, only_on_op, apply_to_saved, filter_order
             FROM filters ORDER BY filter_order, rowid",
        )?;

        let filters = stmt.query_map([], |row| {
            let boards: String = row.get(5)?;
            Ok(Filter {
                id: uuid_column(row, 0)?,
                enabled: row.get::<_, i32>(1)? != 0,
                fields: FilterFields::from_bits(row.get(2)?),
                pattern: row.get(3)?,
                all_boards: row.get::<_, i32>(4)? != 0,
                boards: boards
                    .split(',')
                    .filter(|b| !b.is_empty())
                    .map(str::to_string)
                    .collect(),
                action: FilterAction::from_id(row.get(6)?).unwrap_or_default(),
                color: row.get(7)?,
                apply_to_replies: row.get::<_, i32>(8)? != 0,
                only_on_op: row.get::<_, i32>(9)? != 0,
                apply_to_saved: row.get::<_, i32>(10)? != 0,
                order: row.get(11)?,
            })
        })?;

        filters.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ==================== Saved replies ====================

    /// Remember a post the user made
    pub fn add_saved_reply(&self, reply: &SavedReply) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO saved_replies (site, board, no, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![reply.site.id(), reply.board, to_sql_int(reply.no), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Numbers of the user's posts on a board
    pub fn saved_reply_nos(&self, site: &Site, board: &str) -> Result<HashSet<u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT no FROM saved_replies WHERE site = ?1 AND board = ?2")?;
        let nos = stmt.query_map(params![site.id(), board], |row| u64_column(row, 0))?;
        nos.collect::<Result<HashSet<_>, _>>().map_err(Into::into)
    }

    /// Every saved reply, newest first
    pub fn saved_replies(&self) -> Result<Vec<SavedReply>> {
        let mut stmt = self
            .conn
            .prepare("SELECT site, board, no FROM saved_replies ORDER BY created_at DESC")?;
        let replies = stmt.query_map([], |row| {
            Ok(SavedReply {
                site: site_column(row, 0)?,
                board: row.get(1)?,
                no: u64_column(row, 2)?,
            })
        })?;
        replies.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ==================== Post hides ====================

    /// Hide or remove a post
    pub fn hide_post(&self, hide: &PostHide) -> Result<()> {
        self.conn.execute(
            r"INSERT OR REPLACE INTO post_hides (site, board, no, thread_no, whole_thread, hide)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                hide.site.id(),
                hide.board,
                to_sql_int(hide.no),
                to_sql_int(hide.thread_no),
                i32::from(hide.whole_thread),
                i32::from(hide.hide),
            ],
        )?;
        Ok(())
    }

    /// Undo a hide
    pub fn unhide_post(&self, site: &Site, board: &str, no: u64) -> Result<()> {
        self.conn.execute(
            "DELETE FROM post_hides WHERE site = ?1 AND board = ?2 AND no = ?3",
            params![site.id(), board, to_sql_int(no)],
        )?;
        Ok(())
    }

    /// Hides for posts of one thread; `thread_no == 0` returns the
    /// whole-thread hides of the board (catalog view)
    pub fn post_hides_for_thread(&self, site: &Site, board: &str, thread_no: u64) -> Result<Vec<PostHide>> {
        let sql = if thread_no == 0 {
            "SELECT site, board, no, thread_no, whole_thread, hide FROM post_hides
             WHERE site = ?1 AND board = ?2 AND whole_thread = 1 AND ?3 = 0"
        } else {
            "SELECT site, board, no, thread_no, whole_thread, hide FROM post_hides
             WHERE site = ?1 AND board = ?2 AND thread_no = ?3"
        };
        let mut stmt = self.conn.prepare(sql)?;
        let hides = stmt.query_map(params![site.id(), board, to_sql_int(thread_no)], |row| {
            Ok(PostHide {
                site: site_column(row, 0)?,
                board: row.get(1)?,
                no: u64_column(row, 2)?,
                thread_no: u64_column(row, 3)?,
                whole_thread: row.get::<_, i32>(4)? != 0,
                hide: row.get::<_, i32>(5)? != 0,
            })
        })?;
        hides.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ==================== Thread cache ====================

    /// Store the last known snapshot of a thread
    pub fn cache_thread(&self, thread: &ChanThread) -> Result<()> {
        let json = serde_json::to_string(thread).context("Failed to serialize thread")?;
        self.conn.execute(
            "INSERT OR REPLACE INTO thread_cache (key, json, cached_at) VALUES (?1, ?2, ?3)",
            params![thread.loadable.key(), json, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Last known snapshot of a thread, if any
    pub fn cached_thread(&self, loadable: &Loadable) -> Result<Option<ChanThread>> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT json FROM thread_cache WHERE key = ?1",
                params![loadable.key()],
                |row| row.get(0),
            )
            .optional()?;

        json.map(|j| serde_json::from_str(&j).context("Failed to parse cached thread"))
            .transpose()
    }

    /// Drop snapshots older than `max_age_hours`
    pub fn clear_old_thread_cache(&self, max_age_hours: u64) -> Result<usize> {
        let hours = i64::try_from(max_age_hours).unwrap_or(i64::MAX / 3600);
        let cutoff = Utc::now() - chrono::Duration::hours(hours);
        let count = self.conn.execute(
            "DELETE FROM thread_cache WHERE cached_at < ?1",
            params![cutoff.to_rfc3339()],
        )?;
        Ok(count)
    }
}

/// Post numbers are stored as signed `INTEGER`s
fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn conversion_error(
    idx: usize,
    ty: Type,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(err))
}

fn u64_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let value: i64 = row.get(idx)?;
    u64::try_from(value).map_err(|e| conversion_error(idx, Type::Integer, e))
}

fn opt_u64_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<u64>> {
    let value: Option<i64> = row.get(idx)?;
    value
        .map(|v| u64::try_from(v).map_err(|e| conversion_error(idx, Type::Integer, e)))
        .transpose()
}

fn uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(&row.get::<_, String>(idx)?).map_err(|e| conversion_error(idx, Type::Text, e))
}

fn site_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Site> {
    let id: String = row.get(idx)?;
    Site::from_str(&id).ok_or_else(|| {
        conversion_error(
            idx,
            Type::Text,
            std::io::Error::new(std::io::ErrorKind::InvalidData, format!("unknown site: {id}")),
        )
    })
}

fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&row.get::<_, String>(idx)?)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, Type::Text, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PostBuilder, PostComment};
    use tempfile::tempdir;

    fn open() -> (tempfile::TempDir, Database) {
        let dir = tempdir().unwrap();
        let db = Database::open_path(&dir.path().join("test.sqlite")).unwrap();
        (dir, db)
    }

    #[test]
    fn test_database_init() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("test.sqlite");
        let _db = Database::open_path(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn history_keeps_latest_visit_once() {
        let (_dir, db) = open();
        let thread = Loadable::thread(Site::FourChan, "g", 1, "first");
        db.record_history(&Loadable::catalog(Site::Dvach, "b")).unwrap();
        db.record_history(&thread).unwrap();
        db.record_history(&thread).unwrap();

        let history = db.history(10).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().any(|h| h.loadable == thread && h.loadable.title == "first"));

        assert_eq!(db.clear_history().unwrap(), 2);
        assert!(db.history(10).unwrap().is_empty());
    }

    #[test]
    fn test_pin_crud() {
        let (_dir, db) = open();
        let site = Site::vichan("https://example.org").unwrap();
        let mut pin = Pin::new(Loadable::thread(site.clone(), "b", 42, "A thread"), None);
        db.insert_pin(&pin).unwrap();

        pin.watch_last_count = 3;
        pin.watch_new_count = 5;
        pin.archived = true;
        db.update_pin(&pin).unwrap();

        let pins = db.pins().unwrap();
        assert_eq!(pins.len(), 1);
        assert_eq!(pins[0].id, pin.id);
        assert_eq!(pins[0].loadable.site, site);
        assert_eq!(pins[0].loadable.title, "A thread");
        assert_eq!(pins[0].new_post_count(), 2);
        assert!(pins[0].archived);

        assert!(db.insert_pin(&Pin::new(pin.loadable.clone(), None)).is_err());

        db.delete_pin(pin.id).unwrap();
        assert!(db.pins().unwrap().is_empty());
    }

    #[test]
    fn test_filter_crud() {
        let (_dir, db) = open();
        let mut filter = Filter::new("spam", FilterFields::COMMENT, FilterAction::Remove);
        filter.all_boards = false;
        filter.boards = vec!["g".to_string(), "4chan:v".to_string()];
        db.save_filter(&filter).unwrap();

        filter.enabled = false;
        db.save_filter(&filter).unwrap();

        let filters = db.filters().unwrap();
        assert_eq!(filters, vec![filter.clone()]);

        db.delete_filter(filter.id).unwrap();
        assert!(db.filters().unwrap().is_empty());
    }

    #[test]
    fn saved_replies_by_board() {
        let (_dir, db) = open();
        for (board, no) in [("g", 1), ("g", 2), ("v", 3)] {
            db.add_saved_reply(&SavedReply {
                site: Site::FourChan,
                board: board.to_string(),
                no,
            })
            .unwrap();
        }

        let nos = db.saved_reply_nos(&Site::FourChan, "g").unwrap();
        assert_eq!(nos, HashSet::from([1, 2]));
        assert!(db.saved_reply_nos(&Site::Dvach, "g").unwrap().is_empty());
        assert_eq!(db.saved_replies().unwrap().len(), 3);
    }

    #[test]
    fn hides_per_thread_and_catalog() {
        let (_dir, db) = open();
        let hide = |no, thread_no, whole_thread| PostHide {
            site: Site::FourChan,
            board: "g".to_string(),
            no,
            thread_no,
            whole_thread,
            hide: false,
        };
        db.hide_post(&hide(11, 10, false)).unwrap();
        db.hide_post(&hide(20, 20, true)).unwrap();

        let in_thread = db.post_hides_for_thread(&Site::FourChan, "g", 10).unwrap();
        assert_eq!(in_thread, vec![hide(11, 10, false)]);

        let catalog = db.post_hides_for_thread(&Site::FourChan, "g", 0).unwrap();
        assert_eq!(catalog, vec![hide(20, 20, true)]);

        db.unhide_post(&Site::FourChan, "g", 11).unwrap();
        assert!(db.post_hides_for_thread(&Site::FourChan, "g", 10).unwrap().is_empty());
    }

    #[test]
    fn thread_cache_round_trip() {
        let (_dir, db) = open();
        let loadable = Loadable::thread(Site::FourChan, "g", 1, "");
        assert!(db.cached_thread(&loadable).unwrap().is_none());

        let mut op = PostBuilder::new("g", 1);
        op.op = true;
        op.op_id = 1;
        let thread = ChanThread::new(loadable.clone(), vec![op.build(PostComment::default())]);
        db.cache_thread(&thread).unwrap();

        let cached = db.cached_thread(&loadable).unwrap().unwrap();
        assert_eq!(cached.posts, thread.posts);

        assert_eq!(db.clear_old_thread_cache(1).unwrap(), 0);
    }
}
