//! Filter engine: matches user filters against incoming posts

use regex_lite::Regex;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::models::{Filter, FilterAction, FilterFields, PostBuilder};
use crate::site::Site;

/// Compiles and applies the enabled filters.
///
/// Compiled patterns are cached by `(pattern, action)`; a pattern that fails
/// to compile is cached as `None` and never matches.
pub struct FilterEngine {
    filters: Vec<Filter>,
    cache: Mutex<HashMap<(String, FilterAction), Option<Regex>>>,
}

impl Default for FilterEngine {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl FilterEngine {
    /// Keep the enabled filters, ordered by `order`
    pub fn new(filters: Vec<Filter>) -> Self {
        let mut enabled: Vec<_> = filters.into_iter().filter(|f| f.enabled).collect();
        enabled.sort_by_key(|f| f.order);
        Self {
            filters: enabled,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Enabled filters in match order
    pub fn enabled(&self) -> &[Filter] {
        &self.filters
    }

    /// Enabled watch filters
    pub fn watch_filters(&self) -> Vec<&Filter> {
        self.filters
            .iter()
            .filter(|f| f.action == FilterAction::Watch)
            .collect()
    }

    /// Whether `filter` is active on `board` of `site`
    pub fn matches_board(filter: &Filter, site: &Site, board: &str) -> bool {
        if filter.all_boards || filter.boards.is_empty() {
            return true;
        }
        let qualified = format!("{}:{board}", site.id());
        filter
            .boards
            .iter()
            .any(|entry| entry == board || *entry == qualified)
    }

    /// Compile a filter pattern.
    ///
    /// Three syntaxes are accepted: `/regex/` with an optional `i` flag,
    /// `"exact phrase"`, or space separated words where `*` matches any run
    /// of non-space characters. Non-watch filters run against raw comment
    /// HTML, so their pattern text is HTML-escaped.
    pub fn compile(pattern: &str, action: FilterAction) -> Option<Regex> {
        if pattern.is_empty() {
            return None;
        }

        let escape_html = |text: &str| -> String {
            if action == FilterAction::Watch {
                text.to_string()
            } else {
                html_escape::encode_text(text).into_owned()
            }
        };

        let source = if let Some(body) = regex_body(pattern) {
            let (body, case_insensitive) = body;
            let body = escape_html(body);
            if case_insensitive {
                format!("(?i){body}")
            } else {
                body
            }
        } else if pattern.len() >= 2 && pattern.starts_with('"') && pattern.ends_with('"') {
            let phrase = regex_lite::escape(&pattern[1..pattern.len() - 1]);
            format!("(?i){}", escape_html(&phrase))
        } else {
            let words: Vec<String> = pattern
                .split(' ')
                .map(|word| format!(r"(\b{}\b)", regex_lite::escape(word).replace(r"\*", r"\S*")))
                .collect();
            format!("(?i){}", escape_html(&words.join("|")))
        };

        Regex::new(&source).ok()
    }

    fn cached_pattern(&self, filter: &Filter) -> Option<Regex> {
        let key = (filter.pattern.clone(), filter.action);
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .entry(key)
            .or_insert_with(|| {
                let compiled = Self::compile(&filter.pattern, filter.action);
                if compiled.is_none() {
                    tracing::warn!(pattern = %filter.pattern, "Invalid filter pattern");
                }
                compiled
            })
            .clone()
    }

    /// Whether `filter`'s pattern is found in `text`
    pub fn matches_text(&self, filter: &Filter, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        self.cached_pattern(filter)
            .is_some_and(|re| re.is_match(text))
    }

    /// Whether `filter` matches the post.
    ///
    /// Moderator posts and stickies never match.
    pub fn matches(&self, filter: &Filter, post: &PostBuilder) -> bool {
        if !post.moderator_capcode.is_empty() || post.sticky {
            return false;
        }
        if filter.only_on_op && !post.op {
            return false;
        }

        FilterFields::ORDERED
            .iter()
            .filter(|field| filter.fields.contains(**field))
            .any(|field| match *field {
                FilterFields::TRIPCODE => self.matches_text(filter, &post.tripcode),
                FilterFields::NAME => self.matches_text(filter, &post.name),
                FilterFields::COMMENT => self.matches_text(filter, &post.comment),
                FilterFields::ID => self.matches_text(filter, &post.poster_id),
                FilterFields::SUBJECT => self.matches_text(filter, &post.subject),
                FilterFields::COUNTRY_CODE => self.matches_text(filter, &post.country_code),
                FilterFields::FILENAME => {
                    let names: Vec<&str> = post.images.iter().map(|i| i.filename.as_str()).collect();
                    self.matches_text(filter, &names.join(" "))
                }
                _ => false,
            })
    }

    /// Apply the first matching filter to the builder's filter flags.
    ///
    /// Returns the action taken, if any.
    pub fn apply(&self, site: &Site, post: &mut PostBuilder) -> Option<FilterAction> {
        let filter = self.filters.iter().find(|f| {
            (!post.is_saved_reply || f.apply_to_saved)
                && Self::matches_board(f, site, &post.board)
                && self.matches(f, post)
        })?;

        let flags = &mut post.filter;
        match filter.action {
            FilterAction::Color => {
                flags.highlight_color = Some(filter.color);
                flags.saved = filter.apply_to_saved;
            }
            FilterAction::Hide => flags.stub = true,
            FilterAction::Remove => flags.remove = true,
            FilterAction::Watch => {
                flags.watch = true;
                flags.only_op = true;
                return Some(FilterAction::Watch);
            }
        }
        flags.replies = filter.apply_to_replies;
        flags.only_op = filter.only_on_op;
        Some(filter.action)
    }
}

/// Split `/body/flags` into the body and whether `i` was given
fn regex_body(pattern: &str) -> Option<(&str, bool)> {
    let rest = pattern.strip_prefix('/')?;
    if let Some(body) = rest.strip_suffix("/i") {
        return Some((body, true));
    }
    rest.strip_suffix('/').map(|body| (body, false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PostImage;

    fn post(comment: &str) -> PostBuilder {
        let mut post = PostBuilder::new("g", 10);
        post.op_id = 1;
        post.comment = comment.to_string();
        post
    }

    fn comment_filter(pattern: &str, action: FilterAction) -> Filter {
        Filter::new(pattern, FilterFields::COMMENT, action)
    }

    #[test]
    fn word_patterns_match_on_boundaries() {
        let re = FilterEngine::compile("rust go*", FilterAction::Hide).unwrap();
        assert!(re.is_match("I like Rust"));
        assert!(re.is_match("gopher"));
        assert!(!re.is_match("trusty"));
    }

    #[test]
    fn exact_phrase_is_escaped() {
        let re = FilterEngine::compile("\"c++ (again)\"", FilterAction::Watch).unwrap();
        assert!(re.is_match("not C++ (again) please"));
        assert!(!re.is_match("c (again)"));
    }

    #[test]
    fn regex_syntax_with_and_without_flag() {
        let sensitive = FilterEngine::compile("/^Hello/", FilterAction::Watch).unwrap();
        assert!(sensitive.is_match("Hello there"));
        assert!(!sensitive.is_match("hello there"));

        let insensitive = FilterEngine::compile("/^Hello/i", FilterAction::Watch).unwrap();
        assert!(insensitive.is_match("hello there"));
    }

    #[test]
    fn non_watch_patterns_match_escaped_html() {
        let re = FilterEngine::compile("\">implying\"", FilterAction::Hide).unwrap();
        assert!(re.is_match("<span class=\"quote\">&gt;implying</span>"));
        assert!(!re.is_match(">implying"));
    }

    #[test]
    fn invalid_patterns_never_match() {
        assert!(FilterEngine::compile("/(unclosed/", FilterAction::Hide).is_none());
        assert!(FilterEngine::compile("", FilterAction::Hide).is_none());

        let engine = FilterEngine::new(vec![comment_filter("/(unclosed/", FilterAction::Hide)]);
        let filter = engine.enabled()[0].clone();
        assert!(!engine.matches(&filter, &post("(unclosed")));
        assert!(!engine.matches(&filter, &post("(unclosed")));
    }

    #[test]
    fn capcode_and_sticky_posts_are_exempt() {
        let engine = FilterEngine::default();
        let filter = comment_filter("spam", FilterAction::Hide);

        let mut moderator = post("spam");
        moderator.moderator_capcode = "mod".to_string();
        assert!(!engine.matches(&filter, &moderator));

        let mut sticky = post("spam");
        sticky.sticky = true;
        assert!(!engine.matches(&filter, &sticky));

        assert!(engine.matches(&filter, &post("spam")));
    }

    #[test]
    fn only_on_op_and_filenames() {
        let engine = FilterEngine::default();
        let mut filter = Filter::new("cat*", FilterFields::FILENAME, FilterAction::Hide);
        let mut reply = post("");
        reply.images.push(PostImage {
            filename: "catgirl".to_string(),
            ..PostImage::default()
        });
        assert!(engine.matches(&filter, &reply));

        filter.only_on_op = true;
        assert!(!engine.matches(&filter, &reply));
        reply.op = true;
        assert!(engine.matches(&filter, &reply));
    }

    #[test]
    fn first_matching_filter_wins() {
        let mut remove = comment_filter("spam", FilterAction::Remove);
        remove.order = 1;
        let mut color = comment_filter("spam", FilterAction::Color);
        color.order = 0;
        color.color = 0x0012_3456;
        color.apply_to_replies = true;
        let engine = FilterEngine::new(vec![remove, color]);

        let mut builder = post("buy spam now");
        assert_eq!(engine.apply(&Site::FourChan, &mut builder), Some(FilterAction::Color));
        assert_eq!(builder.filter.highlight_color, Some(0x0012_3456));
        assert!(builder.filter.replies);
        assert!(!builder.filter.remove);
    }

    #[test]
    fn saved_replies_need_apply_to_saved() {
        let engine = FilterEngine::new(vec![comment_filter("spam", FilterAction::Hide)]);
        let mut mine = post("spam");
        mine.is_saved_reply = true;
        assert_eq!(engine.apply(&Site::FourChan, &mut mine), None);
        assert!(!mine.filter.stub);
    }

    #[test]
    fn board_lists_restrict_filters() {
        let mut filter = comment_filter("x", FilterAction::Hide);
        filter.all_boards = false;
        filter.boards = vec!["4chan:g".to_string(), "v".to_string()];
        assert!(FilterEngine::matches_board(&filter, &Site::FourChan, "g"));
        assert!(FilterEngine::matches_board(&filter, &Site::Dvach, "v"));
        assert!(!FilterEngine::matches_board(&filter, &Site::Dvach, "g"));
    }

    #[test]
    fn disabled_filters_are_dropped() {
        let mut off = comment_filter("x", FilterAction::Watch);
        off.enabled = false;
        let engine = FilterEngine::new(vec![off, comment_filter("y", FilterAction::Watch)]);
        assert_eq!(engine.enabled().len(), 1);
        assert_eq!(engine.watch_filters().len(), 1);
    }
}
