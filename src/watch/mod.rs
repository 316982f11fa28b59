//! Thread watcher: polls pinned threads and tracks unread posts and quotes.
//!
//! Every pin gets a [`ThreadLoader`] and a listener task. While the app is
//! in the foreground each tick asks the loaders to refresh when their own
//! back-off has elapsed; in the background every tick forces a refresh.

use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{Notify, broadcast};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::{Config, NotifyMode};
use crate::loader::{LoaderContext, LoaderError, LoaderEvent, ThreadLoader};
use crate::models::{ChanThread, Loadable, Pin, Post};

const EVENT_CAPACITY: usize = 64;

/// Which timer drives the watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntervalType {
    /// Nothing is polled
    #[default]
    None,
    /// Short ticks honouring each loader's back-off
    Foreground,
    /// Long ticks that always refresh
    Background,
}

impl IntervalType {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Foreground => "foreground",
            Self::Background => "background",
        }
    }

    /// Pick the timer for the current settings
    pub const fn desired(settings: &WatchSettings, foreground: bool, any_active: bool) -> Self {
        if !settings.enabled || !any_active {
            Self::None
        } else if foreground {
            Self::Foreground
        } else if settings.background_enabled {
            Self::Background
        } else {
            Self::None
        }
    }
}

impl std::fmt::Display for IntervalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Watcher settings, usually taken from [`Config`]
#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub enabled: bool,
    pub background_enabled: bool,
    pub foreground_interval: Duration,
    pub background_interval: Duration,
}

impl WatchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled: config.watch_enabled,
            background_enabled: config.watch_background,
            foreground_interval: config.foreground_interval(),
            background_interval: config.background_interval(),
        }
    }
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Pin notifications
#[derive(Debug, Clone)]
pub enum WatchEvent {
    PinAdded(Pin),
    PinRemoved(Pin),
    PinChanged(Pin),
    /// Several pins changed at once
    PinsChanged,
    /// A watched thread got posts since the last load
    NewPosts(Pin),
    /// Someone quoted one of your posts
    NewQuotes(Pin),
}

/// Per-pin loader plus the last loaded post lists
pub struct PinWatcher {
    loader: ThreadLoader,
    listener: Option<JoinHandle<()>>,
    posts: Vec<Post>,
    quotes: Vec<Post>,
    were_new_posts: bool,
    were_new_quotes: bool,
}

impl PinWatcher {
    pub const fn new(loader: ThreadLoader) -> Self {
        Self {
            loader,
            listener: None,
            posts: Vec::new(),
            quotes: Vec::new(),
            were_new_posts: false,
            were_new_quotes: false,
        }
    }

    pub const fn loader(&self) -> &ThreadLoader {
        &self.loader
    }

    /// Start a refresh for `pin`; returns whether a load was started
    fn update(&self, pin: &Pin, from_background: bool) -> bool {
        if pin.is_error || !pin.watching {
            return false;
        }
        if from_background {
            // Back-off timings mean little at background intervals
            self.loader.clear_timer();
            self.loader.request_more_data();
            true
        } else {
            self.loader.load_more_if_time()
        }
    }

    /// Recount posts and quotes; returns `(new posts, new quotes)` raised by
    /// this load
    pub fn on_data(&mut self, pin: &mut Pin, thread: &ChanThread) -> (bool, bool) {
        pin.is_error = false;

        if pin.thumbnail_url.is_none() {
            pin.thumbnail_url = thread
                .op()
                .and_then(|op| op.images.first())
                .and_then(|image| image.thumbnail_url.clone());
        }
        if pin.loadable.title.is_empty() {
            pin.loadable.title.clone_from(&thread.loadable.title);
        }
        if let Some(op) = thread.op() {
            pin.is_sticky = op.sticky;
        }

        let saved: HashSet<u64> = thread
            .posts
            .iter()
            .filter(|p| p.is_saved_reply)
            .map(|p| p.no)
            .collect();

        self.posts.clone_from(&thread.posts);
        self.quotes = thread
            .posts
            .iter()
            .filter(|p| !p.is_saved_reply && p.replies_to.iter().any(|no| saved.contains(no)))
            .cloned()
            .collect();

        let post_count = count(thread.posts.len() - saved.len());
        let quote_count = count(self.quotes.len());

        let first_load = pin.watch_new_count < 0 || pin.quote_new_count < 0;
        let last_post_count = pin.watch_new_count;
        let last_quote_count = pin.quote_new_count;

        if first_load {
            pin.watch_last_count = post_count;
            pin.quote_last_count = quote_count;
        }
        pin.watch_new_count = post_count;
        pin.quote_new_count = quote_count;

        let mut raised = (false, false);
        if !first_load {
            if post_count > last_post_count {
                self.were_new_posts = true;
                raised.0 = true;
            }
            if quote_count > last_quote_count {
                self.were_new_quotes = true;
                raised.1 = true;
            }
        }

        tracing::debug!(
            "{}: postlast={} postnew={} quotelast={} quotenew={} nextload={}s",
            pin.loadable,
            pin.watch_last_count,
            pin.watch_new_count,
            pin.quote_last_count,
            pin.quote_new_count,
            self.loader.time_until_load_more().as_secs()
        );

        if thread.archived || thread.closed {
            pin.archived = true;
            pin.watching = false;
        }
        raised
    }

    /// Only a 404 stops the watcher; other failures are retried
    pub fn on_error(&mut self, pin: &mut Pin, error: &LoaderError) {
        if error.is_not_found() {
            pin.is_error = true;
            pin.watching = false;
            pin.watch_last_count = pin.watch_new_count;
        }
    }

    fn on_viewed(&mut self) {
        self.were_new_posts = false;
        self.were_new_quotes = false;
    }

    /// The newest posts the user has not reached yet
    pub fn unviewed_posts(&self, pin: &Pin) -> Vec<Post> {
        let others: Vec<&Post> = self.posts.iter().filter(|p| !p.is_saved_reply).collect();
        tail(&others, pin.new_post_count())
    }

    /// The newest quotes of the user's posts not seen yet
    pub fn unviewed_quotes(&self, pin: &Pin) -> Vec<Post> {
        let quotes: Vec<&Post> = self.quotes.iter().collect();
        tail(&quotes, pin.new_quote_count())
    }

    fn destroy(self) {
        if let Some(listener) = self.listener {
            listener.abort();
        }
        self.loader.cancel();
    }
}

fn count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

fn tail(posts: &[&Post], n: i32) -> Vec<Post> {
    let n = usize::try_from(n).unwrap_or_default();
    posts[posts.len().saturating_sub(n)..]
        .iter()
        .map(|p| (*p).clone())
        .collect()
}

struct WatchState {
    pins: Vec<Pin>,
    watchers: HashMap<Uuid, PinWatcher>,
    settings: WatchSettings,
    foreground: bool,
    interval: IntervalType,
}

struct WatchInner {
    ctx: Arc<LoaderContext>,
    state: Mutex<WatchState>,
    events: broadcast::Sender<WatchEvent>,
    wake: Notify,
}

/// Owns the pins and their watchers
#[derive(Clone)]
pub struct WatchManager {
    inner: Arc<WatchInner>,
}

impl WatchManager {
    /// Create a manager with the pins stored in the context's database
    pub async fn new(ctx: Arc<LoaderContext>, settings: WatchSettings) -> Result<Self> {
        let mut pins = match ctx.db() {
            Some(db) => db.lock().await.pins()?,
            None => Vec::new(),
        };
        sort_and_apply_orders(&mut pins);

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let manager = Self {
            inner: Arc::new(WatchInner {
                ctx,
                state: Mutex::new(WatchState {
                    pins,
                    watchers: HashMap::new(),
                    settings,
                    foreground: true,
                    interval: IntervalType::None,
                }),
                events,
                wake: Notify::new(),
            }),
        };
        manager.update_state(&mut manager.state());
        Ok(manager)
    }

    fn state(&self) -> MutexGuard<'_, WatchState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: WatchEvent) {
        let _ = self.inner.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.inner.events.subscribe()
    }

    /// All pins in order
    pub fn pins(&self) -> Vec<Pin> {
        self.state().pins.clone()
    }

    pub fn find_pin(&self, loadable: &Loadable) -> Option<Pin> {
        self.state().pins.iter().find(|p| p.loadable == *loadable).cloned()
    }

    /// Watching pins; empty while watching is disabled
    pub fn watching_pins(&self) -> Vec<Pin> {
        let state = self.state();
        if !state.settings.enabled {
            return Vec::new();
        }
        state.pins.iter().filter(|p| p.watching).cloned().collect()
    }

    pub fn interval(&self) -> IntervalType {
        self.state().interval
    }

    /// Loader of a pin, while watching is enabled
    pub fn loader(&self, id: Uuid) -> Option<ThreadLoader> {
        self.state().watchers.get(&id).map(|w| w.loader.clone())
    }

    // ==================== Pin management ====================

    /// Add a pin at the top; returns `false` if the thread is already pinned
    pub async fn create_pin(&self, mut pin: Pin) -> Result<bool> {
        let pins = {
            let mut state = self.state();
            if state.pins.iter().any(|p| p.loadable == pin.loadable) {
                return Ok(false);
            }
            pin.order = pin.order.max(0);
            for p in &mut state.pins {
                p.order += 1;
            }
            state.pins.push(pin.clone());
            sort_and_apply_orders(&mut state.pins);
            if let Some(stored) = state.pins.iter().find(|p| p.id == pin.id) {
                pin.order = stored.order;
            }
            self.update_state(&mut state);
            state.pins.clone()
        };

        if let Some(db) = self.inner.ctx.db() {
            let db = db.lock().await;
            db.insert_pin(&pin)?;
            for p in &pins {
                db.update_pin(p)?;
            }
        }

        tracing::info!("Pinned {}", pin.loadable);
        self.emit(WatchEvent::PinAdded(pin));
        Ok(true)
    }

    /// Remove a pin and stop its watcher
    pub async fn delete_pin(&self, id: Uuid) -> Result<Option<Pin>> {
        let (removed, pins) = {
            let mut state = self.state();
            let Some(index) = state.pins.iter().position(|p| p.id == id) else {
                return Ok(None);
            };
            let removed = state.pins.remove(index);
            if let Some(watcher) = state.watchers.remove(&id) {
                watcher.destroy();
            }
            sort_and_apply_orders(&mut state.pins);
            self.update_state(&mut state);
            (removed, state.pins.clone())
        };

        if let Some(db) = self.inner.ctx.db() {
            let db = db.lock().await;
            db.delete_pin(id)?;
            for p in &pins {
                db.update_pin(p)?;
            }
        }

        self.emit(WatchEvent::PinRemoved(removed.clone()));
        Ok(Some(removed))
    }

    /// Store changes made to a pin outside the manager
    pub async fn update_pin(&self, pin: Pin) -> Result<()> {
        {
            let mut state = self.state();
            if let Some(existing) = state.pins.iter_mut().find(|p| p.id == pin.id) {
                *existing = pin.clone();
            }
            self.update_state(&mut state);
        }
        self.persist(&pin).await?;
        self.emit(WatchEvent::PinChanged(pin));
        Ok(())
    }

    /// Flip watching; archived and errored pins stay paused
    pub async fn toggle_watch(&self, id: Uuid) -> Result<Option<bool>> {
        let pin = {
            let mut state = self.state();
            let Some(pin) = state.pins.iter_mut().find(|p| p.id == id) else {
                return Ok(None);
            };
            if pin.archived || pin.is_error {
                return Ok(Some(false));
            }
            pin.watching = !pin.watching;
            let pin = pin.clone();
            self.update_state(&mut state);
            pin
        };
        self.persist(&pin).await?;
        let watching = pin.watching;
        self.emit(WatchEvent::PinChanged(pin));
        Ok(Some(watching))
    }

    /// The user reached the bottom of the thread
    pub async fn on_bottom_post_viewed(&self, id: Uuid) -> Result<()> {
        let pin = {
            let mut state = self.state();
            let WatchState { pins, watchers, .. } = &mut *state;
            let Some(pin) = pins.iter_mut().find(|p| p.id == id) else {
                return Ok(());
            };
            if pin.watch_new_count >= 0 {
                pin.watch_last_count = pin.watch_new_count;
            }
            if pin.quote_new_count >= 0 {
                pin.quote_last_count = pin.quote_new_count;
            }
            if let Some(watcher) = watchers.get_mut(&id) {
                watcher.on_viewed();
            }
            pin.clone()
        };
        self.update_pin(pin).await
    }

    /// Stop watching every pin
    pub async fn pause_all(&self) -> Result<()> {
        {
            let mut state = self.state();
            for pin in &mut state.pins {
                pin.watching = false;
            }
            self.update_state(&mut state);
        }
        self.persist_all().await?;
        self.emit(WatchEvent::PinsChanged);
        Ok(())
    }

    /// Remove every pin, or only the archived and errored ones. Returns the
    /// removed pins so they can be restored with [`create_pin`](Self::create_pin).
    pub async fn clear_pins(&self, all: bool) -> Result<Vec<Pin>> {
        let doomed: Vec<Uuid> = self
            .state()
            .pins
            .iter()
            .filter(|p| all || p.archived || p.is_error)
            .map(|p| p.id)
            .collect();

        let mut removed = Vec::with_capacity(doomed.len());
        for id in doomed {
            if let Some(pin) = self.delete_pin(id).await? {
                removed.push(pin);
            }
        }
        Ok(removed)
    }

    // ==================== Settings ====================

    /// Switch between foreground and background polling; pins are saved when
    /// the app goes to the background
    pub async fn set_foreground(&self, foreground: bool) -> Result<()> {
        {
            let mut state = self.state();
            state.foreground = foreground;
            self.update_state(&mut state);
        }
        if !foreground {
            self.persist_all().await?;
        }
        Ok(())
    }

    pub fn set_watch_enabled(&self, enabled: bool) {
        {
            let mut state = self.state();
            state.settings.enabled = enabled;
            self.update_state(&mut state);
        }
        self.emit(WatchEvent::PinsChanged);
    }

    pub fn set_background_enabled(&self, enabled: bool) {
        {
            let mut state = self.state();
            state.settings.background_enabled = enabled;
            self.update_state(&mut state);
        }
        self.emit(WatchEvent::PinsChanged);
    }

    // ==================== Unread state ====================

    /// Whether any watched pin has something unread
    pub fn has_unread(&self, mode: NotifyMode) -> bool {
        self.watching_pins().iter().any(|pin| match mode {
            NotifyMode::AllPosts => pin.new_post_count() > 0,
            NotifyMode::OnlyQuotes => pin.new_quote_count() > 0,
        })
    }

    pub fn unviewed_posts(&self, id: Uuid) -> Vec<Post> {
        let state = self.state();
        match (state.pins.iter().find(|p| p.id == id), state.watchers.get(&id)) {
            (Some(pin), Some(watcher)) => watcher.unviewed_posts(pin),
            _ => Vec::new(),
        }
    }

    pub fn unviewed_quotes(&self, id: Uuid) -> Vec<Post> {
        let state = self.state();
        match (state.pins.iter().find(|p| p.id == id), state.watchers.get(&id)) {
            (Some(pin), Some(watcher)) => watcher.unviewed_quotes(pin),
            _ => Vec::new(),
        }
    }

    /// New posts arrived since this was last asked
    pub fn take_new_posts(&self, id: Uuid) -> bool {
        self.state()
            .watchers
            .get_mut(&id)
            .is_some_and(|w| std::mem::take(&mut w.were_new_posts))
    }

    /// New quotes arrived since this was last asked
    pub fn take_new_quotes(&self, id: Uuid) -> bool {
        self.state()
            .watchers
            .get_mut(&id)
            .is_some_and(|w| std::mem::take(&mut w.were_new_quotes))
    }

    // ==================== Polling ====================

    /// One tick; returns how many loads were started
    pub fn update(&self, from_background: bool) -> usize {
        let started: Vec<Pin> = {
            let state = self.state();
            if !state.settings.enabled {
                return 0;
            }
            state
                .pins
                .iter()
                .filter(|pin| pin.watching)
                .filter(|pin| {
                    state
                        .watchers
                        .get(&pin.id)
                        .is_some_and(|w| w.update(pin, from_background))
                })
                .cloned()
                .collect()
        };

        tracing::debug!("Watch tick (background={from_background}) started {} loads", started.len());
        let count = started.len();
        for pin in started {
            self.emit(WatchEvent::PinChanged(pin));
        }
        count
    }

    /// Drive the ticks until `shutdown` resolves; pins are saved on exit
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);

        if self.interval() != IntervalType::None {
            self.update(false);
        }

        loop {
            let (interval, delay) = {
                let state = self.state();
                let delay = match state.interval {
                    IntervalType::None => None,
                    IntervalType::Foreground => Some(state.settings.foreground_interval),
                    IntervalType::Background => Some(state.settings.background_interval),
                };
                (state.interval, delay)
            };

            tokio::select! {
                () = &mut shutdown => break,
                () = self.inner.wake.notified() => {}
                () = sleep_or_park(delay) => {
                    self.update(interval == IntervalType::Background);
                }
            }
        }

        if let Err(e) = self.persist_all().await {
            tracing::error!("Failed to save pins: {e}");
        }
    }

    /// Pick the interval and create or destroy watchers
    fn update_state(&self, state: &mut WatchState) {
        let any_active = state.pins.iter().any(Pin::is_active);
        let interval = IntervalType::desired(&state.settings, state.foreground, any_active);

        if state.interval != interval {
            tracing::debug!("Setting interval type from {} to {interval}", state.interval);
            state.interval = interval;
            self.inner.wake.notify_one();
        }

        for pin in &mut state.pins {
            if pin.is_error {
                pin.watch_last_count = pin.watch_new_count;
            }
        }

        if state.settings.enabled {
            for pin in &state.pins {
                if !state.watchers.contains_key(&pin.id) {
                    let watcher = self.create_watcher(pin);
                    state.watchers.insert(pin.id, watcher);
                }
            }
        } else {
            for (_, watcher) in state.watchers.drain() {
                watcher.destroy();
            }
        }
    }

    fn create_watcher(&self, pin: &Pin) -> PinWatcher {
        tracing::debug!("PinWatcher: created for {}", pin.loadable);
        let loader = ThreadLoader::new(self.inner.ctx.clone(), pin.loadable.clone());
        let mut rx = loader.subscribe();
        let id = pin.id;
        let weak: Weak<WatchInner> = Arc::downgrade(&self.inner);

        let listener = tokio::spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!("Pin listener skipped {skipped} events");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                Self { inner }.on_loader_event(id, event).await;
            }
        });

        let mut watcher = PinWatcher::new(loader);
        watcher.listener = Some(listener);
        watcher
    }

    async fn on_loader_event(&self, id: Uuid, event: LoaderEvent) {
        let mut notifications = Vec::new();
        let pin = {
            let mut state = self.state();
            let WatchState { pins, watchers, .. } = &mut *state;
            let (Some(pin), Some(watcher)) = (pins.iter_mut().find(|p| p.id == id), watchers.get_mut(&id))
            else {
                return;
            };

            match &event {
                LoaderEvent::Data(thread) => {
                    let (new_posts, new_quotes) = watcher.on_data(pin, thread);
                    if new_posts {
                        notifications.push(WatchEvent::NewPosts(pin.clone()));
                    }
                    if new_quotes {
                        notifications.push(WatchEvent::NewQuotes(pin.clone()));
                    }
                }
                LoaderEvent::Error(error) => watcher.on_error(pin, error),
            }

            let pin = pin.clone();
            self.update_state(&mut state);
            pin
        };

        if let Err(e) = self.persist(&pin).await {
            tracing::warn!("Failed to save pin {}: {e}", pin.loadable);
        }
        self.emit(WatchEvent::PinChanged(pin));
        for notification in notifications {
            self.emit(notification);
        }
    }

    // ==================== Persistence ====================

    async fn persist(&self, pin: &Pin) -> Result<()> {
        if let Some(db) = self.inner.ctx.db() {
            db.lock().await.update_pin(pin)?;
        }
        Ok(())
    }

    /// Save every pin
    pub async fn persist_all(&self) -> Result<()> {
        let pins = self.pins();
        if let Some(db) = self.inner.ctx.db() {
            let db = db.lock().await;
            for pin in &pins {
                db.update_pin(pin)?;
            }
        }
        Ok(())
    }
}

fn sort_and_apply_orders(pins: &mut [Pin]) {
    pins.sort_by_key(|p| p.order);
    for (order, pin) in (0..).zip(pins.iter_mut()) {
        pin.order = order;
    }
}

async fn sleep_or_park(delay: Option<Duration>) {
    match delay {
        Some(delay) => tokio::time::sleep(delay).await,
        None => std::future::pending().await,
    }
}
