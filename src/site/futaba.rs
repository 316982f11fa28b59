//! Futaba JSON dialect (4chan, vichan)

use serde::Deserialize;

use super::{ChanReader, Site, de_flag, de_number, de_opt_string};
use crate::loader::ProcessingQueue;
use crate::models::{PostBuilder, PostImage};

/// Reader for the 4chan-style JSON API
pub struct FutabaReader {
    site: Site,
}

impl FutabaReader {
    pub const fn new(site: Site) -> Self {
        Self { site }
    }

    fn push(&self, post: FutabaPost, queue: &mut ProcessingQueue) {
        let board = queue.loadable().board.clone();
        let builder = post.into_builder(&self.site, &board);
        if builder.op {
            queue.set_op(builder.clone());
        }
        queue.add(builder);
    }
}

impl ChanReader for FutabaReader {
    fn load_thread(&self, json: &[u8], queue: &mut ProcessingQueue) -> serde_json::Result<()> {
        let thread: FutabaThread = serde_json::from_slice(json)?;
        for post in thread.posts {
            self.push(post, queue);
        }
        Ok(())
    }

    fn load_catalog(&self, json: &[u8], queue: &mut ProcessingQueue) -> serde_json::Result<()> {
        let pages: Vec<FutabaPage> = serde_json::from_slice(json)?;
        for thread in pages.into_iter().flat_map(|page| page.threads) {
            self.push(thread, queue);
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct FutabaThread {
    #[serde(default)]
    posts: Vec<FutabaPost>,
}

#[derive(Deserialize)]
struct FutabaPage {
    #[serde(default)]
    threads: Vec<FutabaPost>,
}

#[derive(Deserialize)]
struct FutabaFile {
    #[serde(default, deserialize_with = "de_opt_string")]
    tim: Option<String>,
    filename: Option<String>,
    ext: Option<String>,
    #[serde(default)]
    w: u32,
    #[serde(default)]
    h: u32,
    #[serde(default)]
    fsize: u64,
    md5: Option<String>,
    #[serde(default, deserialize_with = "de_flag")]
    spoiler: bool,
}

impl FutabaFile {
    fn into_image(self, site: &Site, board: &str) -> Option<PostImage> {
        let (Some(tim), Some(filename), Some(ext)) = (self.tim, self.filename, self.ext) else {
            return None;
        };
        let ext = ext.trim_start_matches('.').to_string();
        Some(PostImage {
            image_url: Some(site.image_url(board, &tim, &filename, &ext)),
            thumbnail_url: Some(site.thumbnail_url(board, &tim, &ext, false)),
            spoiler_thumbnail_url: Some(site.thumbnail_url(board, &tim, &ext, true)),
            server_filename: tim,
            filename: html_escape::decode_html_entities(&filename).into_owned(),
            extension: ext,
            width: self.w,
            height: self.h,
            size: self.fsize,
            spoiler: self.spoiler,
            deleted: false,
            file_hash: self.md5,
        })
    }
}

#[derive(Deserialize)]
struct FutabaPost {
    #[serde(deserialize_with = "de_number")]
    no: u64,
    #[serde(default, deserialize_with = "de_number_or_zero")]
    resto: u64,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    com: Option<String>,
    #[serde(default)]
    trip: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    id: Option<String>,
    #[serde(default)]
    capcode: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    country_name: Option<String>,
    #[serde(default)]
    time: i64,
    #[serde(default)]
    replies: Option<u32>,
    #[serde(default)]
    images: Option<u32>,
    #[serde(default)]
    unique_ips: Option<u32>,
    #[serde(default)]
    last_modified: Option<i64>,
    #[serde(default, deserialize_with = "de_flag")]
    sticky: bool,
    #[serde(default, deserialize_with = "de_flag")]
    closed: bool,
    #[serde(default, deserialize_with = "de_flag")]
    archived: bool,
    #[serde(default, deserialize_with = "de_flag")]
    filedeleted: bool,
    #[serde(flatten)]
    file: FutabaFile,
    #[serde(default)]
    extra_files: Vec<FutabaFile>,
}

fn de_number_or_zero<'de, D: serde::Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    Ok(de_opt_string(d)?.and_then(|s| s.parse().ok()).unwrap_or(0))
}

impl FutabaPost {
    fn into_builder(self, site: &Site, board: &str) -> PostBuilder {
        let mut builder = PostBuilder::new(board, self.no);
        builder.op = self.resto == 0;
        builder.op_id = if builder.op { self.no } else { self.resto };
        builder.subject = self.sub.unwrap_or_default();
        builder.name = self.name.unwrap_or_default();
        builder.comment = self.com.unwrap_or_default();
        builder.tripcode = self.trip.unwrap_or_default();
        builder.poster_id = self.id.unwrap_or_default();
        builder.moderator_capcode = self.capcode.unwrap_or_default();
        builder.country_code = self.country.unwrap_or_default();
        builder.country_name = self.country_name.unwrap_or_default();
        builder.unix_timestamp = self.time;
        builder.replies = self.replies;
        builder.images_count = self.images;
        builder.unique_ips = self.unique_ips;
        builder.last_modified = self.last_modified;
        builder.sticky = self.sticky;
        builder.closed = self.closed;
        builder.archived = self.archived;

        if self.filedeleted {
            builder.images.push(PostImage {
                deleted: true,
                ..PostImage::default()
            });
        } else if let Some(image) = self.file.into_image(site, board) {
            builder.images.push(image);
        }
        builder.images.extend(
            self.extra_files
                .into_iter()
                .filter_map(|f| f.into_image(site, board)),
        );

        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Loadable;

    const THREAD: &str = r##"{"posts":[
        {"no":100,"resto":0,"sticky":0,"closed":0,"now":"x","name":"Anonymous","sub":"Thread title",
         "com":"OP text","filename":"cat","ext":".png","w":800,"h":600,"tn_w":250,"tn_h":187,
         "tim":1600000000000,"time":1600000000,"md5":"abc==","fsize":1234,"replies":2,"images":1,
         "unique_ips":2,"country":"US","country_name":"United States"},
        {"no":101,"resto":100,"name":"Anonymous","com":"<a href=\"#p100\" class=\"quotelink\">&gt;&gt;100</a>","time":1600000060,"id":"abcd1234"},
        {"no":102,"resto":100,"name":"Anonymous","filedeleted":1,"time":1600000120,"capcode":"mod"}
    ]}"##;

    fn queue(site: Site, no: u64) -> ProcessingQueue {
        ProcessingQueue::new(&[], Loadable::thread(site, "g", no, ""))
    }

    #[test]
    fn reads_thread_posts_and_op() {
        let reader = FutabaReader::new(Site::FourChan);
        let mut queue = queue(Site::FourChan, 100);
        reader.load_thread(THREAD.as_bytes(), &mut queue).unwrap();

        let op = queue.op().unwrap();
        assert_eq!(op.no, 100);
        assert_eq!(op.replies, Some(2));
        assert_eq!(op.unique_ips, Some(2));
        assert_eq!(op.subject, "Thread title");

        let parse = queue.to_parse();
        assert_eq!(parse.len(), 3);
        assert_eq!(parse[1].op_id, 100);
        assert!(!parse[1].op);
        assert_eq!(parse[1].poster_id, "abcd1234");

        let image = &parse[0].images[0];
        assert_eq!(image.extension, "png");
        assert_eq!(image.server_filename, "1600000000000");
        assert_eq!(
            image.image_url.as_deref(),
            Some("https://i.4cdn.org/g/1600000000000.png")
        );

        assert!(parse[2].images[0].deleted);
        assert_eq!(parse[2].moderator_capcode, "mod");
    }

    #[test]
    fn reads_catalog_pages() {
        let json = r#"[
            {"page":1,"threads":[{"no":1,"resto":0,"com":"a","time":1},{"no":2,"resto":0,"com":"b","time":2}]},
            {"page":2,"threads":[{"no":3,"resto":0,"sub":"c","time":3}]}
        ]"#;
        let reader = FutabaReader::new(Site::FourChan);
        let mut queue = ProcessingQueue::new(&[], Loadable::catalog(Site::FourChan, "g"));
        reader.load_catalog(json.as_bytes(), &mut queue).unwrap();

        let nos: Vec<_> = queue.to_parse().iter().map(|b| b.no).collect();
        assert_eq!(nos, vec![1, 2, 3]);
        assert!(queue.to_parse().iter().all(|b| b.op));
    }

    #[test]
    fn reads_vichan_extra_files_with_string_tim() {
        let json = r#"{"posts":[{"no":5,"resto":0,"time":1,"tim":"1599","filename":"a","ext":".jpg",
            "extra_files":[{"tim":"1600","filename":"b","ext":".webm","w":1,"h":1,"fsize":2}]}]}"#;
        let site = Site::vichan("https://example.org").unwrap();
        let reader = FutabaReader::new(site.clone());
        let mut queue = queue(site, 5);
        reader.load_thread(json.as_bytes(), &mut queue).unwrap();

        let images = &queue.to_parse()[0].images;
        assert_eq!(images.len(), 2);
        assert_eq!(
            images[1].image_url.as_deref(),
            Some("https://example.org/g/src/1600.webm")
        );
        assert_eq!(
            images[1].thumbnail_url.as_deref(),
            Some("https://example.org/g/thumb/1600.jpg")
        );
    }

    #[test]
    fn invalid_json_is_an_error() {
        let reader = FutabaReader::new(Site::FourChan);
        let mut queue = queue(Site::FourChan, 1);
        assert!(reader.load_thread(b"<html>", &mut queue).is_err());
    }
}
