//! Thread loader: fetches a catalog or thread, merges it with the previous
//! snapshot and publishes the result to every subscriber.
//!
//! A [`ThreadLoader`] is a cheap handle; clones share one request, one
//! refresh timer and one snapshot. Requests run as tokio tasks, and the
//! per-post work runs on the rayon pool inside `spawn_blocking`.

pub mod error;
pub mod merge;
pub mod queue;

pub use error::LoaderError;
pub use merge::merge;
pub use queue::{ProcessingQueue, parse_posts};

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::db::Database;
use crate::filter::FilterEngine;
use crate::models::{ChanThread, Loadable, Post, PostHide};

/// Refresh back-off in seconds. The index resets when new posts arrive and
/// advances on every empty refresh.
pub const WATCH_TIMEOUTS: [u64; 13] = [10, 15, 20, 30, 60, 90, 120, 180, 240, 300, 600, 1800, 3600];

/// Broadcast capacity per loader
const EVENT_CAPACITY: usize = 16;

/// What subscribers receive
#[derive(Debug, Clone)]
pub enum LoaderEvent {
    /// A new snapshot
    Data(Arc<ChanThread>),
    /// The load failed
    Error(Arc<LoaderError>),
}

/// Shared services for every loader
pub struct LoaderContext {
    client: reqwest::Client,
    db: Option<Arc<tokio::sync::Mutex<Database>>>,
    filters: Mutex<Arc<FilterEngine>>,
}

impl LoaderContext {
    /// Create a context; without a database there are no saved replies,
    /// hides or cached snapshots
    pub fn new(client: reqwest::Client, db: Option<Arc<tokio::sync::Mutex<Database>>>) -> Self {
        Self {
            client,
            db,
            filters: Mutex::new(Arc::new(FilterEngine::default())),
        }
    }

    pub const fn db(&self) -> Option<&Arc<tokio::sync::Mutex<Database>>> {
        self.db.as_ref()
    }

    /// Current filter set
    pub fn filters(&self) -> Arc<FilterEngine> {
        self.filters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the filter set used by subsequent loads
    pub fn set_filters(&self, engine: FilterEngine) {
        *self.filters.lock().unwrap_or_else(PoisonError::into_inner) = Arc::new(engine);
    }

    /// Reload the filter set from the database
    pub async fn reload_filters(&self) -> anyhow::Result<()> {
        let Some(db) = &self.db else {
            return Ok(());
        };
        let filters = db.lock().await.filters()?;
        self.set_filters(FilterEngine::new(filters));
        Ok(())
    }

    /// Saved reply numbers and hides that apply to `loadable`
    async fn board_state(&self, loadable: &Loadable) -> (HashSet<u64>, Vec<PostHide>) {
        let Some(db) = &self.db else {
            return (HashSet::new(), Vec::new());
        };
        let db = db.lock().await;

        let saved = db
            .saved_reply_nos(&loadable.site, &loadable.board)
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to read saved replies: {e}");
                HashSet::new()
            });
        let thread_no = if loadable.is_thread_mode() { loadable.no } else { 0 };
        let hides = db
            .post_hides_for_thread(&loadable.site, &loadable.board, thread_no)
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to read post hides: {e}");
                Vec::new()
            });
        (saved, hides)
    }

    async fn cache_thread(&self, thread: &ChanThread) {
        if let Some(db) = &self.db
            && let Err(e) = db.lock().await.cache_thread(thread)
        {
            tracing::warn!("Failed to cache thread {}: {e}", thread.loadable);
        }
    }

    async fn cached_thread(&self, loadable: &Loadable) -> Option<ChanThread> {
        let db = self.db.as_ref()?;
        db.lock().await.cached_thread(loadable).unwrap_or_else(|e| {
            tracing::warn!("Failed to read cached thread {loadable}: {e}");
            None
        })
    }
}

struct State {
    loadable: Loadable,
    thread: Option<Arc<ChanThread>>,
    loading: bool,
    /// Bumped for every request; stale results are dropped
    generation: u64,
    /// `None` until the first load after a reset
    current_timeout: Option<usize>,
    last_post_count: usize,
    last_load: Option<Instant>,
    timer: Option<JoinHandle<()>>,
    request: Option<JoinHandle<()>>,
}

impl State {
    const fn new(loadable: Loadable) -> Self {
        Self {
            loadable,
            thread: None,
            loading: false,
            generation: 0,
            current_timeout: None,
            last_post_count: 0,
            last_load: None,
            timer: None,
            request: None,
        }
    }

    fn clear_pending(&mut self) {
        if let Some(timer) = self.timer.take() {
            tracing::debug!("Cleared timer");
            timer.abort();
        }
    }
}

struct Inner {
    ctx: Arc<LoaderContext>,
    state: Mutex<State>,
    events: broadcast::Sender<LoaderEvent>,
}

/// Loads one catalog or thread and keeps it fresh
#[derive(Clone)]
pub struct ThreadLoader {
    inner: Arc<Inner>,
}

impl ThreadLoader {
    pub fn new(ctx: Arc<LoaderContext>, loadable: Loadable) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                ctx,
                state: Mutex::new(State::new(loadable)),
                events,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Receive every snapshot and error from now on
    pub fn subscribe(&self) -> broadcast::Receiver<LoaderEvent> {
        self.inner.events.subscribe()
    }

    /// The loadable, with its title once known
    pub fn loadable(&self) -> Loadable {
        self.state().loadable.clone()
    }

    /// Latest published snapshot
    pub fn thread(&self) -> Option<Arc<ChanThread>> {
        self.state().thread.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state().loading
    }

    /// Load from scratch, discarding the snapshot
    pub fn request_data(&self) {
        let mut state = self.state();
        state.clear_pending();
        state.current_timeout = None;

        if let Some(request) = state.request.take() {
            request.abort();
        }
        state.loading = false;

        if state.loadable.is_catalog_mode() {
            state.loadable.no = 0;
            state.loadable.list_view_index = 0;
            state.loadable.list_view_top = 0;
        }

        state.thread = None;
        self.start_request(&mut state);
    }

    /// Fetch and merge against the current snapshot.
    ///
    /// Only threads refresh; returns whether a request was started.
    pub fn request_more_data(&self) -> bool {
        let mut state = self.state();
        state.clear_pending();

        if !state.loadable.is_thread_mode() || state.loading {
            return false;
        }
        self.start_request(&mut state);
        true
    }

    /// Refresh if the back-off has elapsed
    pub fn load_more_if_time(&self) -> bool {
        self.time_until_load_more().is_zero() && self.request_more_data()
    }

    /// Re-publish the snapshot right away, then refresh.
    ///
    /// Without a snapshot this is a full [`request_data`](Self::request_data).
    pub fn quick_load(&self) {
        match self.thread() {
            Some(thread) => {
                let _ = self.inner.events.send(LoaderEvent::Data(thread));
                self.request_more_data();
            }
            None => self.request_data(),
        }
    }

    /// Time left before a refresh is due; zero while loading
    pub fn time_until_load_more(&self) -> Duration {
        let state = self.state();
        if state.loading {
            return Duration::ZERO;
        }
        let wait = Duration::from_secs(WATCH_TIMEOUTS[state.current_timeout.unwrap_or(0)]);
        state
            .last_load
            .map_or(Duration::ZERO, |last| (last + wait).saturating_duration_since(Instant::now()))
    }

    /// The back-off currently in effect
    pub fn watch_timeout(&self) -> Duration {
        Duration::from_secs(WATCH_TIMEOUTS[self.state().current_timeout.unwrap_or(0)])
    }

    /// Schedule a refresh after the current back-off step
    pub fn set_timer(&self) {
        let mut state = self.state();
        state.clear_pending();

        let delay = Duration::from_secs(WATCH_TIMEOUTS[state.current_timeout.unwrap_or(0)]);
        tracing::debug!("Scheduled reload in {}s", delay.as_secs());

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                let loader = Self { inner };
                loader.state().timer = None;
                loader.request_more_data();
            }
        }));
    }

    /// Reset the back-off and drop the pending refresh
    pub fn clear_timer(&self) {
        let mut state = self.state();
        state.current_timeout = Some(0);
        state.clear_pending();
    }

    /// Stop the timer and any request in flight
    pub fn cancel(&self) {
        let mut state = self.state();
        state.current_timeout = None;
        state.clear_pending();
        if let Some(request) = state.request.take() {
            request.abort();
        }
        state.loading = false;
        state.generation += 1;
    }

    fn start_request(&self, state: &mut State) {
        state.generation += 1;
        state.loading = true;

        let generation = state.generation;
        let loadable = state.loadable.clone();
        let cached = state.thread.clone();
        let loader = self.clone();

        state.request = Some(tokio::spawn(async move {
            let result = fetch(&loader.inner.ctx, loadable, cached).await;
            loader.finish(generation, result);
        }));
    }

    fn finish(&self, generation: u64, result: Result<ChanThread, LoaderError>) {
        let event = {
            let mut state = self.state();
            if state.generation != generation {
                return;
            }
            state.request = None;
            state.loading = false;

            match result {
                Ok(thread) => {
                    if state.loadable.title.is_empty() {
                        state.loadable.title.clone_from(&thread.loadable.title);
                    }
                    let post_count = thread.posts.len();
                    state.current_timeout = if post_count > state.last_post_count {
                        state.last_post_count = post_count;
                        Some(0)
                    } else {
                        Some(
                            state
                                .current_timeout
                                .map_or(0, |i| (i + 1).min(WATCH_TIMEOUTS.len() - 1)),
                        )
                    };
                    let thread = Arc::new(thread);
                    state.thread = Some(thread.clone());
                    state.last_load = Some(Instant::now());
                    LoaderEvent::Data(thread)
                }
                Err(err) => {
                    tracing::info!("Loading error for {}: {err}", state.loadable);
                    state.current_timeout = None;
                    state.clear_pending();
                    LoaderEvent::Error(Arc::new(err))
                }
            }
        };

        let _ = self.inner.events.send(event);
    }
}

/// One request: download, parse, merge
async fn fetch(
    ctx: &LoaderContext,
    loadable: Loadable,
    cached: Option<Arc<ChanThread>>,
) -> Result<ChanThread, LoaderError> {
    let url = loadable.site.url(&loadable);
    tracing::debug!("Requesting {url}");

    let response = ctx.client.get(&url).send().await?;
    let status = response.status();

    if status == StatusCode::NOT_FOUND {
        if loadable.is_thread_mode()
            && let Some(thread) = ctx.cached_thread(&loadable).await
        {
            tracing::info!("{loadable} is gone, using the cached copy");
            return Ok(into_archived(thread));
        }
        return Err(LoaderError::NotFound);
    }
    if !status.is_success() {
        return Err(LoaderError::Server(status.as_u16()));
    }

    let body = response.bytes().await?;
    let (saved, hides) = ctx.board_state(&loadable).await;
    let filters = ctx.filters();
    let cached_posts = cached.map(|t| t.posts.clone()).unwrap_or_default();

    let thread = tokio::task::spawn_blocking(move || {
        process(loadable, &body, &cached_posts, &filters, &saved, &hides)
    })
    .await??;

    if thread.loadable.is_thread_mode() {
        ctx.cache_thread(&thread).await;
    }
    Ok(thread)
}

/// Parse a response body and merge it into the cached posts
fn process(
    mut loadable: Loadable,
    body: &[u8],
    cached: &[Post],
    filters: &FilterEngine,
    saved: &HashSet<u64>,
    hides: &[PostHide],
) -> Result<ChanThread, LoaderError> {
    let mut queue = ProcessingQueue::new(cached, loadable.clone());
    loadable.site.reader().load(body, &mut queue)?;
    let op = queue.op().cloned();

    let hides_by_no: HashMap<u64, &PostHide> = hides.iter().map(|h| (h.no, h)).collect();
    let keeps_op = |no: u64| loadable.is_thread_mode() && no == loadable.no;

    let mut removed: HashSet<u64> = hides
        .iter()
        .filter(|h| !h.hide && !keeps_op(h.no))
        .map(|h| h.no)
        .collect();
    removed.extend(
        queue
            .to_reuse()
            .iter()
            .filter(|p| p.filter.remove)
            .map(|p| p.no),
    );

    let parsed = parse_posts(queue, filters, saved, hides);
    let mut posts = merge(&loadable, cached, parsed, &mut removed);
    if posts.is_empty() {
        return Err(LoaderError::Empty);
    }

    for post in &mut posts {
        if removed.contains(&post.no) {
            post.filter.remove = true;
        } else if !keeps_op(post.no) && hides_by_no.get(&post.no).is_some_and(|h| h.hide) {
            post.filter.stub = true;
        }
    }

    let mut thread = ChanThread::new(loadable, Vec::new());
    if thread.loadable.is_thread_mode() {
        let index = posts.iter().position(|p| p.is_op).unwrap_or(0);
        match (op, posts.get_mut(index)) {
            (Some(fresh), Some(real)) => {
                thread.closed = fresh.closed;
                thread.archived = fresh.archived;
                real.closed = fresh.closed;
                real.archived = fresh.archived;
                real.sticky = fresh.sticky;
                real.replies = fresh.replies;
                real.images_count = fresh.images_count;
                real.unique_ips = fresh.unique_ips;
                real.last_modified = fresh.last_modified;
            }
            _ => tracing::warn!("{} has no OP", thread.loadable),
        }
    }
    thread.posts = posts;

    if thread.loadable.title.is_empty() {
        thread.loadable.title = match (thread.loadable.is_thread_mode(), thread.op()) {
            (true, Some(op)) => op.title(),
            _ => thread.loadable.short_string(),
        };
    }
    Ok(thread)
}

/// A cached snapshot shown in place of a thread that 404'd
fn into_archived(mut thread: ChanThread) -> ChanThread {
    thread.archived = true;
    if let Some(op) = thread.posts.iter_mut().find(|p| p.is_op) {
        op.archived = true;
    }
    thread
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::Site;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FIRST: &str = r##"{"posts":[
        {"no":100,"resto":0,"sub":"Rust thread","com":"OP","time":1600000000,"replies":2,"images":0},
        {"no":101,"resto":100,"com":"<a href=\"#p100\" class=\"quotelink\">&gt;&gt;100</a> hi","time":1600000010},
        {"no":102,"resto":100,"com":"bye","time":1600000020}
    ]}"##;

    const SECOND: &str = r##"{"posts":[
        {"no":100,"resto":0,"sub":"Rust thread","com":"OP","time":1600000000,"replies":2,"images":0,"closed":1},
        {"no":101,"resto":100,"com":"<a href=\"#p100\" class=\"quotelink\">&gt;&gt;100</a> hi","time":1600000010},
        {"no":103,"resto":100,"com":"<a href=\"#p101\" class=\"quotelink\">&gt;&gt;101</a>","time":1600000030}
    ]}"##;

    fn context(db: Option<Database>) -> Arc<LoaderContext> {
        Arc::new(LoaderContext::new(
            reqwest::Client::new(),
            db.map(|db| Arc::new(tokio::sync::Mutex::new(db))),
        ))
    }

    fn thread_loader(server: &MockServer, ctx: Arc<LoaderContext>) -> ThreadLoader {
        let site = Site::vichan(&server.uri()).unwrap();
        ThreadLoader::new(ctx, Loadable::thread(site, "g", 100, ""))
    }

    async fn next_event(rx: &mut broadcast::Receiver<LoaderEvent>) -> LoaderEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("loader event in time")
            .expect("open channel")
    }

    fn expect_data(event: LoaderEvent) -> Arc<ChanThread> {
        match event {
            LoaderEvent::Data(thread) => thread,
            LoaderEvent::Error(e) => panic!("unexpected error: {e}"),
        }
    }

    #[tokio::test]
    async fn request_data_publishes_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/g/res/100.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FIRST))
            .mount(&server)
            .await;

        let loader = thread_loader(&server, context(None));
        let mut rx = loader.subscribe();
        loader.request_data();

        let thread = expect_data(next_event(&mut rx).await);
        assert_eq!(thread.posts.len(), 3);
        assert_eq!(thread.posts[0].replies_from, vec![101]);
        assert_eq!(thread.loadable.title, "Rust thread");
        assert_eq!(loader.loadable().title, "Rust thread");
        assert!(!loader.is_loading());
        assert!(loader.time_until_load_more() > Duration::ZERO);
    }

    #[tokio::test]
    async fn refresh_merges_and_marks_deleted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/g/res/100.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FIRST))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/g/res/100.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SECOND))
            .mount(&server)
            .await;

        let loader = thread_loader(&server, context(None));
        let mut rx = loader.subscribe();
        loader.request_data();
        expect_data(next_event(&mut rx).await);

        assert!(loader.request_more_data());
        let thread = expect_data(next_event(&mut rx).await);

        let nos: Vec<u64> = thread.posts.iter().map(|p| p.no).collect();
        assert_eq!(nos, vec![100, 101, 102, 103]);
        assert!(thread.find(102).unwrap().deleted);
        assert_eq!(thread.find(101).unwrap().replies_from, vec![103]);
        assert!(thread.closed);
        assert!(thread.op().unwrap().closed);
    }

    #[tokio::test]
    async fn not_found_is_an_error_without_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let loader = thread_loader(&server, context(None));
        let mut rx = loader.subscribe();
        loader.request_data();

        match next_event(&mut rx).await {
            LoaderEvent::Error(e) => assert!(e.is_not_found()),
            LoaderEvent::Data(_) => panic!("expected an error"),
        }
        assert_eq!(loader.watch_timeout(), Duration::from_secs(WATCH_TIMEOUTS[0]));
    }

    #[tokio::test]
    async fn not_found_falls_back_to_cached_copy() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_path(&dir.path().join("cache.sqlite")).unwrap();

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FIRST))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let ctx = context(Some(db));
        let first = thread_loader(&server, ctx.clone());
        let mut rx = first.subscribe();
        first.request_data();
        expect_data(next_event(&mut rx).await);

        let second = thread_loader(&server, ctx);
        let mut rx = second.subscribe();
        second.request_data();
        let thread = expect_data(next_event(&mut rx).await);
        assert!(thread.archived);
        assert_eq!(thread.posts.len(), 3);
    }

    #[tokio::test]
    async fn server_errors_and_empty_threads() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"posts":[]}"#))
            .mount(&server)
            .await;

        let loader = thread_loader(&server, context(None));
        let mut rx = loader.subscribe();

        loader.request_data();
        match next_event(&mut rx).await {
            LoaderEvent::Error(e) => assert!(matches!(*e, LoaderError::Server(503))),
            LoaderEvent::Data(_) => panic!("expected an error"),
        }

        loader.request_data();
        match next_event(&mut rx).await {
            LoaderEvent::Error(e) => assert!(matches!(*e, LoaderError::Empty)),
            LoaderEvent::Data(_) => panic!("expected an error"),
        }
    }

    #[tokio::test]
    async fn catalogs_never_load_more() {
        let loader = ThreadLoader::new(context(None), Loadable::catalog(Site::FourChan, "g"));
        assert!(!loader.request_more_data());
        assert_eq!(loader.time_until_load_more(), Duration::ZERO);
        assert!(loader.thread().is_none());
    }

    async fn mount_first(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/g/res/100.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FIRST))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn back_off_advances_on_unchanged_refreshes() {
        let server = MockServer::start().await;
        mount_first(&server).await;

        let loader = thread_loader(&server, context(None));
        let mut rx = loader.subscribe();
        loader.request_data();
        expect_data(next_event(&mut rx).await);
        assert_eq!(loader.watch_timeout(), Duration::from_secs(10));

        for expected in [15, 20, 30] {
            assert!(loader.request_more_data());
            expect_data(next_event(&mut rx).await);
            assert_eq!(loader.watch_timeout(), Duration::from_secs(expected));
        }
        assert!(loader.time_until_load_more() > Duration::from_secs(20));
        assert!(!loader.load_more_if_time());

        loader.clear_timer();
        assert_eq!(loader.watch_timeout(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn new_posts_reset_the_back_off() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/g/res/100.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FIRST))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/g/res/100.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SECOND))
            .mount(&server)
            .await;

        let loader = thread_loader(&server, context(None));
        let mut rx = loader.subscribe();
        loader.request_data();
        expect_data(next_event(&mut rx).await);
        loader.request_more_data();
        expect_data(next_event(&mut rx).await);
        assert_eq!(loader.watch_timeout(), Duration::from_secs(15));

        loader.request_more_data();
        let thread = expect_data(next_event(&mut rx).await);
        assert_eq!(thread.posts.len(), 4);
        assert_eq!(loader.watch_timeout(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn timer_keeps_the_current_step() {
        let loader = ThreadLoader::new(
            context(None),
            Loadable::thread(Site::FourChan, "g", 1, ""),
        );
        loader.set_timer();
        assert_eq!(loader.watch_timeout(), Duration::from_secs(10));
        loader.set_timer();
        assert_eq!(loader.watch_timeout(), Duration::from_secs(10));

        loader.clear_timer();
        assert_eq!(loader.watch_timeout(), Duration::from_secs(10));
        loader.cancel();
        assert!(!loader.is_loading());
    }

    #[tokio::test]
    async fn in_flight_request_blocks_more_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/g/res/100.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(FIRST)
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;

        let loader = thread_loader(&server, context(None));
        let mut rx = loader.subscribe();
        loader.request_data();

        assert!(loader.is_loading());
        assert_eq!(loader.time_until_load_more(), Duration::ZERO);
        assert!(!loader.request_more_data());
        assert!(!loader.load_more_if_time());

        expect_data(next_event(&mut rx).await);
        assert!(!loader.is_loading());
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn quick_load_republishes_then_refreshes() {
        let server = MockServer::start().await;
        mount_first(&server).await;

        let loader = thread_loader(&server, context(None));
        let mut rx = loader.subscribe();
        loader.request_data();
        let first = expect_data(next_event(&mut rx).await);

        loader.quick_load();
        let replayed = expect_data(next_event(&mut rx).await);
        assert!(Arc::ptr_eq(&first, &replayed));

        let refreshed = expect_data(next_event(&mut rx).await);
        assert!(!Arc::ptr_eq(&first, &refreshed));
        assert_eq!(refreshed.posts.len(), 3);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[test]
    fn repeated_posts_are_deduplicated() {
        let body = r#"{"posts":[
            {"no":100,"resto":0,"com":"OP","time":1},
            {"no":101,"resto":100,"com":"a","time":2},
            {"no":101,"resto":100,"com":"a","time":2}
        ]}"#;
        let thread = process(
            Loadable::thread(Site::FourChan, "g", 100, ""),
            body.as_bytes(),
            &[],
            &FilterEngine::default(),
            &HashSet::new(),
            &[],
        )
        .unwrap();

        assert_eq!(thread.posts.iter().map(|p| p.no).collect::<Vec<_>>(), vec![100, 101]);
    }

    #[test]
    fn hides_and_filters_shape_the_snapshot() {
        let loadable = Loadable::thread(Site::FourChan, "g", 100, "");
        let hide = |no, hide| PostHide {
            site: Site::FourChan,
            board: "g".to_string(),
            no,
            thread_no: 100,
            whole_thread: false,
            hide,
        };
        let hides = vec![hide(100, false), hide(101, true), hide(102, false)];

        let thread = process(
            loadable,
            FIRST.as_bytes(),
            &[],
            &FilterEngine::default(),
            &HashSet::new(),
            &hides,
        )
        .unwrap();

        assert!(!thread.posts[0].filter.remove);
        assert!(thread.posts[1].filter.stub);
        assert!(thread.posts[2].filter.remove);
        assert_eq!(thread.summary(), "2R / 0I");
    }
}
