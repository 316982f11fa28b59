//! 2ch JSON dialect

use serde::Deserialize;

use super::{ChanReader, Site, de_flag, de_number};
use crate::loader::ProcessingQueue;
use crate::models::{PostBuilder, PostImage};

/// Reader for the 2ch.hk JSON API
#[derive(Default)]
pub struct DvachReader;

impl DvachReader {
    pub const fn new() -> Self {
        Self
    }

    fn push(post: DvachPost, queue: &mut ProcessingQueue) {
        let loadable = queue.loadable();
        let catalog = loadable.is_catalog_mode();
        let thread_no = loadable.no;
        let board = loadable.board.clone();

        let builder = post.into_builder(&board, catalog, thread_no);
        if builder.op {
            queue.set_op(builder.clone());
        }
        queue.add(builder);
    }
}

impl ChanReader for DvachReader {
    fn load_thread(&self, json: &[u8], queue: &mut ProcessingQueue) -> serde_json::Result<()> {
        let response: DvachThreadResponse = serde_json::from_slice(json)?;
        for post in response.threads.into_iter().flat_map(|t| t.posts) {
            Self::push(post, queue);
        }
        Ok(())
    }

    fn load_catalog(&self, json: &[u8], queue: &mut ProcessingQueue) -> serde_json::Result<()> {
        let response: DvachCatalogResponse = serde_json::from_slice(json)?;
        for post in response.threads {
            Self::push(post, queue);
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct DvachThreadResponse {
    #[serde(default)]
    threads: Vec<DvachThread>,
}

#[derive(Deserialize)]
struct DvachThread {
    #[serde(default)]
    posts: Vec<DvachPost>,
}

#[derive(Deserialize)]
struct DvachCatalogResponse {
    #[serde(default)]
    threads: Vec<DvachPost>,
}

#[derive(Deserialize)]
struct DvachFile {
    path: Option<String>,
    name: Option<String>,
    /// Kilobytes
    #[serde(default)]
    size: u64,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    thumbnail: Option<String>,
    md5: Option<String>,
}

impl DvachFile {
    fn into_image(self) -> Option<PostImage> {
        let site = Site::Dvach;
        let path = self.path?;
        let full_name = self.name?;
        let (filename, extension) = full_name
            .rsplit_once('.')
            .map_or((full_name.as_str(), ""), |(n, e)| (n, e));
        let thumbnail = self.thumbnail.unwrap_or_else(|| path.clone());

        Some(PostImage {
            server_filename: filename.to_string(),
            filename: filename.to_string(),
            extension: extension.to_string(),
            width: self.width,
            height: self.height,
            size: self.size.saturating_mul(1024),
            spoiler: false,
            deleted: false,
            file_hash: self.md5,
            image_url: Some(site.image_url("", &path, filename, extension)),
            thumbnail_url: Some(site.thumbnail_url("", &thumbnail, extension, false)),
            spoiler_thumbnail_url: Some(site.thumbnail_url("", &thumbnail, extension, true)),
        })
    }
}

#[derive(Deserialize)]
struct DvachPost {
    #[serde(deserialize_with = "de_number")]
    num: u64,
    /// Parent thread number, 0 for an OP
    #[serde(default, deserialize_with = "de_parent")]
    op: u64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    comment: String,
    #[serde(default)]
    timestamp: i64,
    #[serde(default)]
    trip: String,
    #[serde(default, deserialize_with = "de_flag")]
    sticky: bool,
    #[serde(default, deserialize_with = "de_flag")]
    closed: bool,
    #[serde(default, deserialize_with = "de_flag")]
    archived: bool,
    posts_count: Option<u32>,
    files_count: Option<u32>,
    lasthit: Option<i64>,
    #[serde(default)]
    files: Option<Vec<DvachFile>>,
}

fn de_parent<'de, D: serde::Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    Ok(super::de_opt_string(d)?
        .and_then(|s| s.parse().ok())
        .unwrap_or(0))
}

impl DvachPost {
    fn into_builder(self, board: &str, catalog: bool, thread_no: u64) -> PostBuilder {
        let mut builder = PostBuilder::new(board, self.num);
        builder.op = self.op == 0 && (catalog || thread_no == self.num);
        builder.op_id = if self.op == 0 { self.num } else { self.op };
        builder.name = self.name;
        builder.subject = self.subject;
        builder.comment = self.comment;
        builder.unix_timestamp = self.timestamp;
        builder.tripcode = self.trip;
        builder.sticky = self.sticky && builder.op;
        builder.closed = self.closed;
        builder.archived = self.archived;
        builder.replies = self.posts_count.map(|c| c.saturating_sub(1));
        builder.images_count = self.files_count;
        builder.last_modified = self.lasthit;
        builder.images = self
            .files
            .unwrap_or_default()
            .into_iter()
            .filter_map(DvachFile::into_image)
            .collect();
        builder
    }
}
