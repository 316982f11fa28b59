//! Comment parsing: site HTML to plain text plus clickable spans

use once_cell::sync::Lazy;
use regex_lite::Regex;
use std::collections::HashSet;

use crate::models::{LinkValue, PostBuilder, PostComment, PostLinkable};

static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(/?)([a-zA-Z][a-zA-Z0-9]*)([^>]*)>").expect("valid tag regex"));
static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([a-zA-Z-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid attribute regex")
});
static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"]+"#).expect("valid url regex"));
static THREAD_HREF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/([a-zA-Z0-9_]+)/(?:thread|res)/(\d+)(?:\.html)?(?:/[^#]*)?(?:#p?(\d+))?$")
        .expect("valid thread link regex")
});
static BOARD_HREF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/([a-zA-Z0-9_]+)/(?:catalog(?:\.html)?)?(?:#s=(.*))?$").expect("valid board link regex")
});
static DEAD_QUOTE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r">>(\d+)").expect("valid dead quote regex"));

/// An element that was opened and not yet closed
struct OpenTag {
    name: String,
    href: Option<String>,
    class: String,
    start: usize,
}

/// Converts raw comment HTML into a [`PostComment`].
#[derive(Debug, Default, Clone, Copy)]
pub struct CommentParser;

impl CommentParser {
    pub const fn new() -> Self {
        Self
    }

    /// Parse `builder.comment`.
    ///
    /// `internal_nos` holds every post number known to be in the thread;
    /// quotes of those numbers are added to `builder.replies_to`.
    /// `saved_nos` holds the user's own post numbers.
    pub fn parse(
        &self,
        builder: &mut PostBuilder,
        internal_nos: &HashSet<u64>,
        saved_nos: &HashSet<u64>,
    ) -> PostComment {
        let html = builder.comment.replace("<wbr>", "");
        let mut text = String::with_capacity(html.len());
        let mut linkables = Vec::new();
        let mut stack: Vec<OpenTag> = Vec::new();
        let mut last = 0;

        for caps in TAG_RE.captures_iter(&html) {
            let Some(whole) = caps.get(0) else { continue };
            push_text(&mut text, &html[last..whole.start()]);
            last = whole.end();

            let closing = &caps[1] == "/";
            let name = caps[2].to_lowercase();
            match name.as_str() {
                "br" => text.push('\n'),
                "p" | "div" | "pre" => block_break(&mut text),
                "a" | "span" | "s" | "strike" if !closing => {
                    let attrs = &caps[3];
                    stack.push(OpenTag {
                        name: name.clone(),
                        href: attribute(attrs, "href").map(|h| html_escape::decode_html_entities(&h).into_owned()),
                        class: attribute(attrs, "class").unwrap_or_default(),
                        start: text.len(),
                    });
                }
                "a" | "span" | "s" | "strike" => {
                    if let Some(pos) = stack.iter().rposition(|t| t.name == name) {
                        let open = stack.remove(pos);
                        let span = &text[open.start..];
                        if let Some(value) = self.classify(&open, span, builder, internal_nos, saved_nos) {
                            linkables.push(PostLinkable {
                                start: open.start,
                                end: text.len(),
                                value,
                            });
                        }
                    }
                }
                _ => {}
            }
        }
        push_text(&mut text, &html[last..]);

        let trimmed = text.trim_end().len();
        text.truncate(trimmed);
        for linkable in &mut linkables {
            linkable.end = linkable.end.min(trimmed);
            linkable.start = linkable.start.min(linkable.end);
        }

        linkify(&text, &mut linkables);
        linkables.sort_by_key(|l| l.start);

        PostComment { text, linkables }
    }

    fn classify(
        &self,
        open: &OpenTag,
        span: &str,
        builder: &mut PostBuilder,
        internal_nos: &HashSet<u64>,
        saved_nos: &HashSet<u64>,
    ) -> Option<LinkValue> {
        match open.name.as_str() {
            "s" | "strike" => Some(LinkValue::Spoiler),
            "span" if has_class(&open.class, "spoiler") => Some(LinkValue::Spoiler),
            "span" if has_class(&open.class, "deadlink") => DEAD_QUOTE_RE
                .captures(span)
                .and_then(|c| c[1].parse().ok())
                .map(LinkValue::Dead),
            "a" => {
                let href = open.href.as_deref()?;
                self.classify_href(href, builder, internal_nos, saved_nos)
            }
            _ => None,
        }
    }

    fn classify_href(
        &self,
        href: &str,
        builder: &mut PostBuilder,
        internal_nos: &HashSet<u64>,
        saved_nos: &HashSet<u64>,
    ) -> Option<LinkValue> {
        if let Some(fragment) = href.strip_prefix('#') {
            let no = fragment.trim_start_matches('p').parse().ok()?;
            return Some(self.quote(no, builder, internal_nos, saved_nos));
        }

        let path = strip_host(href);
        if let Some(caps) = THREAD_HREF_RE.captures(path) {
            let board = caps[1].to_string();
            let op: u64 = caps[2].parse().ok()?;
            let post = caps
                .get(3)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(op);
            if board == builder.board && op == builder.op_id {
                return Some(self.quote(post, builder, internal_nos, saved_nos));
            }
            return Some(LinkValue::Thread { board, op, post });
        }

        if let Some(caps) = BOARD_HREF_RE.captures(path) {
            let board = caps[1].to_string();
            return Some(match caps.get(2) {
                Some(query) if !query.as_str().is_empty() => LinkValue::Search {
                    board,
                    query: query.as_str().replace('+', " "),
                },
                _ => LinkValue::Board(board),
            });
        }

        (href.starts_with("http://") || href.starts_with("https://"))
            .then(|| LinkValue::Link(href.to_string()))
    }

    fn quote(
        &self,
        no: u64,
        builder: &mut PostBuilder,
        internal_nos: &HashSet<u64>,
        saved_nos: &HashSet<u64>,
    ) -> LinkValue {
        if !internal_nos.contains(&no) {
            return LinkValue::Dead(no);
        }
        builder.replies_to.insert(no);
        let quotes_saved = saved_nos.contains(&no);
        LinkValue::Quote {
            no,
            to_op: no == builder.op_id,
            to_you: quotes_saved && !builder.is_saved_reply,
            to_self: quotes_saved && builder.is_saved_reply,
        }
    }
}

fn push_text(out: &mut String, raw: &str) {
    if !raw.is_empty() {
        out.push_str(&html_escape::decode_html_entities(raw));
    }
}

fn block_break(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

fn attribute(attrs: &str, name: &str) -> Option<String> {
    ATTR_RE.captures_iter(attrs).find_map(|c| {
        c[1].eq_ignore_ascii_case(name)
            .then(|| c.get(2).or_else(|| c.get(3)).map_or_else(String::new, |m| m.as_str().to_string()))
    })
}

fn has_class(classes: &str, class: &str) -> bool {
    classes.split_whitespace().any(|c| c == class)
}

/// Drop a `https://host` or `//host` prefix, leaving the path
fn strip_host(href: &str) -> &str {
    let rest = href
        .strip_prefix("https://")
        .or_else(|| href.strip_prefix("http://"))
        .or_else(|| href.strip_prefix("//"));
    match rest {
        Some(rest) => rest.find('/').map_or("", |i| &rest[i..]),
        None => href,
    }
}

/// Add `Link` spans for bare URLs not already covered by another span
fn linkify(text: &str, linkables: &mut Vec<PostLinkable>) {
    let mut found = Vec::new();
    for m in URL_RE.find_iter(text) {
        let url = m.as_str().trim_end_matches(['.', ',', ')', '!', '?', ';', ':']);
        let (start, end) = (m.start(), m.start() + url.len());
        let covered = linkables.iter().any(|l| l.start < end && start < l.end);
        if !covered {
            found.push(PostLinkable {
                start,
                end,
                value: LinkValue::Link(url.to_string()),
            });
        }
    }
    linkables.extend(found);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder(no: u64, op_id: u64, comment: &str) -> PostBuilder {
        let mut b = PostBuilder::new("g", no);
        b.op_id = op_id;
        b.op = no == op_id;
        b.comment = comment.to_string();
        b
    }

    fn set(nos: &[u64]) -> HashSet<u64> {
        nos.iter().copied().collect()
    }

    #[test]
    fn converts_markup_to_text() {
        let mut b = builder(2, 1, "line one<br>line &amp; two<br><span class=\"quote\">&gt;implying</span>");
        let comment = CommentParser::new().parse(&mut b, &set(&[1, 2]), &HashSet::new());
        assert_eq!(comment.text, "line one\nline & two\n>implying");
        assert!(comment.linkables.is_empty());
    }

    #[test]
    fn quotes_record_replies_and_flags() {
        let html = "<a href=\"#p1\" class=\"quotelink\">&gt;&gt;1</a><br>\
                    <a href=\"#p3\" class=\"quotelink\">&gt;&gt;3</a>";
        let mut b = builder(4, 1, html);
        let comment = CommentParser::new().parse(&mut b, &set(&[1, 3, 4]), &set(&[3]));

        assert_eq!(b.replies_to.iter().copied().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(comment.linkables.len(), 2);
        assert_eq!(comment.span_text(&comment.linkables[0]), ">>1");
        assert_eq!(
            comment.linkables[0].value,
            LinkValue::Quote { no: 1, to_op: true, to_you: false, to_self: false }
        );
        assert_eq!(
            comment.linkables[1].value,
            LinkValue::Quote { no: 3, to_op: false, to_you: true, to_self: false }
        );
    }

    #[test]
    fn quoting_own_post_from_own_post_is_to_self() {
        let mut b = builder(5, 1, "<a href=\"#p3\">&gt;&gt;3</a>");
        b.is_saved_reply = true;
        let comment = CommentParser::new().parse(&mut b, &set(&[1, 3, 5]), &set(&[3, 5]));
        assert_eq!(
            comment.linkables[0].value,
            LinkValue::Quote { no: 3, to_op: false, to_you: false, to_self: true }
        );
    }

    #[test]
    fn unknown_quote_is_dead() {
        let mut b = builder(2, 1, "<a href=\"#p99\">&gt;&gt;99</a>");
        let comment = CommentParser::new().parse(&mut b, &set(&[1, 2]), &HashSet::new());
        assert_eq!(comment.linkables[0].value, LinkValue::Dead(99));
        assert!(b.replies_to.is_empty());
    }

    #[test]
    fn same_thread_path_links_are_quotes() {
        let mut b = builder(502, 500, "<a href=\"/g/res/500.html#501\" class=\"post-reply-link\">&gt;&gt;501</a>");
        CommentParser::new().parse(&mut b, &set(&[500, 501, 502]), &HashSet::new());
        assert!(b.replies_to.contains(&501));
    }

    #[test]
    fn cross_thread_board_and_search_links() {
        let html = "<a href=\"/v/thread/77#p78\" class=\"quotelink\">&gt;&gt;&gt;/v/78</a> \
                    <a href=\"//boards.4chan.org/a/\" class=\"quotelink\">&gt;&gt;&gt;/a/</a> \
                    <a href=\"//boards.4chan.org/g/catalog#s=rust+lang\">&gt;&gt;&gt;/g/rust</a>";
        let mut b = builder(2, 1, html);
        let comment = CommentParser::new().parse(&mut b, &set(&[1, 2]), &HashSet::new());

        let values: Vec<_> = comment.linkables.iter().map(|l| l.value.clone()).collect();
        assert_eq!(
            values,
            vec![
                LinkValue::Thread { board: "v".to_string(), op: 77, post: 78 },
                LinkValue::Board("a".to_string()),
                LinkValue::Search { board: "g".to_string(), query: "rust lang".to_string() },
            ]
        );
    }

    #[test]
    fn spoilers_and_dead_links() {
        let html = "<s>secret</s> <span class=\"deadlink\">&gt;&gt;12</span>";
        let mut b = builder(2, 1, html);
        let comment = CommentParser::new().parse(&mut b, &set(&[1, 2]), &HashSet::new());
        assert_eq!(comment.text, "secret >>12");
        assert_eq!(comment.linkables[0].value, LinkValue::Spoiler);
        assert_eq!(comment.span_text(&comment.linkables[0]), "secret");
        assert_eq!(comment.linkables[1].value, LinkValue::Dead(12));
    }

    #[test]
    fn bare_urls_are_linkified() {
        let mut b = builder(2, 1, "see https://example.com/page. and <a href=\"#p1\">&gt;&gt;1</a>");
        let comment = CommentParser::new().parse(&mut b, &set(&[1, 2]), &HashSet::new());
        let link = comment
            .linkables
            .iter()
            .find(|l| matches!(l.value, LinkValue::Link(_)))
            .unwrap();
        assert_eq!(link.value, LinkValue::Link("https://example.com/page".to_string()));
        assert_eq!(comment.span_text(link), "https://example.com/page");
    }
}
