//! threadwatch - imageboard thread loader and watcher
#![allow(clippy::uninlined_format_args)]

use anyhow::{Result, anyhow};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use threadwatch::models::{ChanThread, PostHide, SavedReply};
use threadwatch::{
    Config, Database, Filter, FilterAction, FilterFields, Loadable, LoaderContext, LoaderEvent,
    Pin, Post, Site, ThreadLoader, WatchEvent, WatchManager, WatchSettings,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (RUST_LOG=debug for verbose output)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let command = parse_args()?;
    let config = Config::load()?;

    match command {
        Command::Catalog {
            site,
            board,
            limit,
            pin_watched,
        } => catalog_cli(&config, site.as_deref(), &board, limit, pin_watched).await,
        Command::Thread {
            site,
            board,
            no,
            follow,
        } => thread_cli(&config, site.as_deref(), &board, no, follow).await,
        Command::Watch { background } => watch_cli(&config, background).await,
        Command::Pin { site, board, no } => pin_cli(&config, site.as_deref(), &board, no).await,
        Command::Unpin { site, board, no } => unpin_cli(&config, site.as_deref(), &board, no).await,
        Command::Pins => list_pins(),
        Command::History { clear, limit } => history_cli(clear, limit),
        Command::FilterAdd {
            pattern,
            fields,
            action,
            boards,
        } => add_filter(&pattern, &fields, &action, boards),
        Command::Filters => list_filters(),
        Command::Hide {
            site,
            board,
            no,
            thread_no,
            remove,
        } => hide_cli(&config, site.as_deref(), &board, no, thread_no, remove),
        Command::Mine { site, board, no } => mine_cli(&config, site.as_deref(), &board, no),
        Command::Help => {
            print_help();
            Ok(())
        }
        Command::Version => {
            print_version();
            Ok(())
        }
    }
}

/// CLI commands
enum Command {
    Catalog {
        site: Option<String>,
        board: String,
        limit: usize,
        pin_watched: bool,
    },
    Thread {
        site: Option<String>,
        board: String,
        no: u64,
        follow: bool,
    },
    Watch {
        background: bool,
    },
    Pin {
        site: Option<String>,
        board: String,
        no: u64,
    },
    Unpin {
        site: Option<String>,
        board: String,
        no: u64,
    },
    Pins,
    History {
        clear: bool,
        limit: usize,
    },
    FilterAdd {
        pattern: String,
        fields: String,
        action: String,
        boards: Vec<String>,
    },
    Filters,
    Hide {
        site: Option<String>,
        board: String,
        no: u64,
        thread_no: u64,
        remove: bool,
    },
    Mine {
        site: Option<String>,
        board: String,
        no: u64,
    },
    Help,
    Version,
}

fn parse_args() -> Result<Command> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() == 1 {
        return Ok(Command::Help);
    }

    let flag_value = |names: &[&str]| -> Option<String> {
        args.iter()
            .position(|a| names.contains(&a.as_str()))
            .and_then(|i| args.get(i + 1))
            .cloned()
    };
    let has_flag = |names: &[&str]| args.iter().any(|a| names.contains(&a.as_str()));
    let positional = |index: usize, what: &str| -> Result<String> {
        args.get(index)
            .filter(|a| !a.starts_with('-'))
            .cloned()
            .ok_or_else(|| anyhow!("Missing {what}"))
    };
    let number = |index: usize, what: &str| -> Result<u64> {
        positional(index, what)?
            .parse()
            .map_err(|_| anyhow!("Invalid {what}: expected a number"))
    };
    let limit = |default: usize| {
        flag_value(&["--limit", "-l"])
            .and_then(|s| s.parse().ok())
            .unwrap_or(default)
    };
    let site = flag_value(&["--site", "-s"]);

    match args[1].as_str() {
        "-h" | "--help" | "help" => Ok(Command::Help),
        "-v" | "--version" | "version" => Ok(Command::Version),

        "catalog" | "cat" => Ok(Command::Catalog {
            site,
            board: positional(2, "board")?,
            limit: limit(30),
            pin_watched: has_flag(&["--pin-watched"]),
        }),

        "thread" | "t" => Ok(Command::Thread {
            site,
            board: positional(2, "board")?,
            no: number(3, "thread number")?,
            follow: has_flag(&["--follow", "-f"]),
        }),

        "watch" => Ok(Command::Watch {
            background: has_flag(&["--background", "-b"]),
        }),

        "pin" => Ok(Command::Pin {
            site,
            board: positional(2, "board")?,
            no: number(3, "thread number")?,
        }),

        "unpin" => Ok(Command::Unpin {
            site,
            board: positional(2, "board")?,
            no: number(3, "thread number")?,
        }),

        "pins" => Ok(Command::Pins),

        "history" => Ok(Command::History {
            clear: args.get(2).is_some_and(|a| a == "clear"),
            limit: limit(20),
        }),

        "filter" => match args.get(2).map(String::as_str) {
            Some("add") => Ok(Command::FilterAdd {
                pattern: positional(3, "filter pattern")?,
                fields: flag_value(&["--fields"]).unwrap_or_else(|| "comment".to_string()),
                action: flag_value(&["--action", "-a"]).unwrap_or_else(|| "hide".to_string()),
                boards: flag_value(&["--boards"])
                    .map(|b| b.split(',').map(|s| s.trim().to_string()).collect())
                    .unwrap_or_default(),
            }),
            _ => Err(anyhow!("Usage: threadwatch filter add <pattern> [OPTIONS]")),
        },

        "filters" => Ok(Command::Filters),

        "hide" => Ok(Command::Hide {
            site,
            board: positional(2, "board")?,
            no: number(3, "post number")?,
            thread_no: number(4, "thread number")?,
            remove: has_flag(&["--remove"]),
        }),

        "mine" => Ok(Command::Mine {
            site,
            board: positional(2, "board")?,
            no: number(3, "post number")?,
        }),

        other => Err(anyhow!(
            "Unknown command: {other}\nRun 'threadwatch --help' for usage"
        )),
    }
}

fn print_help() {
    let config_path = Config::default_path()
        .map_or_else(|_| "Unknown".to_string(), |p| p.display().to_string());

    println!(
        r#"threadwatch - imageboard thread loader and watcher

USAGE:
    threadwatch [COMMAND]

COMMANDS:
    catalog <board> [OPTIONS]          List the threads of a board
      Options:
        -l, --limit <n>                Number of threads (default: 30)
        --pin-watched                  Pin threads matched by watch filters

    thread <board> <no> [OPTIONS]      Show a thread
      Options:
        -f, --follow                   Keep refreshing and print new posts

    watch [OPTIONS]                    Poll pinned threads until Ctrl-C
      Options:
        -b, --background               Use the background interval

    pin <board> <no>                   Pin a thread
    unpin <board> <no>                 Remove a pin
    pins                               List pins and unread counts
    history [clear] [--limit <n>]      Show or clear browsing history

    filter add <pattern> [OPTIONS]     Add a filter
      Options:
        --fields <list>                tripcode,name,comment,id,subject,filename,country,all
                                       (default: comment)
        -a, --action <action>          hide, color, remove or watch (default: hide)
        --boards <list>                Restrict to boards (default: all)
      Examples:
        threadwatch filter add "/(?:spam|scam)/i" --action remove
        threadwatch filter add rust --fields subject --action watch --boards g

    filters                            List filters
    hide <board> <no> <thread> [--remove]
                                       Hide (or remove) a post
    mine <board> <no>                  Mark a post as your own

SITE SELECTION:
    -s, --site <site>                  4chan, 2ch or vichan:<https://root>
                                       (default: config default_site)

OPTIONS:
    -h, --help                         Show this help message
    -v, --version                      Show version information

CONFIG:
    {}
"#,
        config_path
    );
}

fn print_version() {
    println!("threadwatch {}", threadwatch::VERSION);
}

fn resolve_site(config: &Config, site: Option<&str>) -> Result<Site> {
    let name = site.unwrap_or(&config.default_site);
    Site::from_str(name).ok_or_else(|| anyhow!("Unknown site: {name}\nSupported: 4chan, 2ch, vichan:<url>"))
}

/// Open the database, prune stale snapshots and build the loader context
async fn open_context(config: &Config) -> Result<(Arc<LoaderContext>, Arc<Mutex<Database>>)> {
    let db = Database::open()?;
    match db.clear_old_thread_cache(config.thread_cache_max_age_hours) {
        Ok(0) => {}
        Ok(n) => tracing::debug!("Pruned {n} cached threads"),
        Err(e) => tracing::warn!("Failed to prune thread cache: {e}"),
    }

    let db = Arc::new(Mutex::new(db));
    let ctx = Arc::new(LoaderContext::new(config.http_client()?, Some(db.clone())));
    ctx.reload_filters().await?;
    Ok((ctx, db))
}

/// Wait for the next snapshot or error
async fn next_event(rx: &mut broadcast::Receiver<LoaderEvent>) -> Result<LoaderEvent> {
    loop {
        match rx.recv().await {
            Ok(event) => return Ok(event),
            Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }
}

async fn catalog_cli(
    config: &Config,
    site: Option<&str>,
    board: &str,
    limit: usize,
    pin_watched: bool,
) -> Result<()> {
    let site = resolve_site(config, site)?;
    let (ctx, db) = open_context(config).await?;

    let loader = ThreadLoader::new(ctx.clone(), Loadable::catalog(site.clone(), board));
    let mut rx = loader.subscribe();
    loader.request_data();
    let catalog = match next_event(&mut rx).await? {
        LoaderEvent::Data(thread) => thread,
        LoaderEvent::Error(e) => return Err(anyhow!("Failed to load /{board}/: {e}")),
    };
    db.lock().await.record_history(&catalog.loadable)?;

    println!("\n{} /{}/ catalog", site.name(), board);
    println!("{}", "─".repeat(60));

    let limits = site.board(board);
    let mut watched = Vec::new();
    for op in catalog.posts.iter().filter(|p| !p.filter.remove).take(limit) {
        let marker = if op.filter.watch {
            watched.push(op.clone());
            "★ "
        } else if op.filter.stub {
            "- "
        } else {
            ""
        };
        let replies = op.replies.unwrap_or_default();
        let images = op.images_count.unwrap_or_default();
        println!(
            "\n{}No.{} · {}{}R / {}{}I{}",
            marker,
            op.no,
            if limits.is_bump_limited(replies) { "(b) " } else { "" },
            replies,
            if limits.is_image_limited(images) { "(i) " } else { "" },
            images,
            if op.sticky { " · sticky" } else { "" }
        );
        if op.filter.stub {
            println!("  (hidden)");
        } else {
            println!("  {}", op.title());
        }
    }

    if pin_watched && !watched.is_empty() {
        let manager = WatchManager::new(ctx, WatchSettings::from_config(config)).await?;
        for op in watched {
            let loadable = Loadable::thread(site.clone(), board, op.no, &op.title());
            let thumbnail = op.images.first().and_then(|i| i.thumbnail_url.clone());
            if manager.create_pin(Pin::new(loadable, thumbnail)).await? {
                println!("✓ Pinned /{}/{}", board, op.no);
            }
        }
    }

    Ok(())
}

async fn thread_cli(config: &Config, site: Option<&str>, board: &str, no: u64, follow: bool) -> Result<()> {
    let site = resolve_site(config, site)?;
    let (ctx, db) = open_context(config).await?;

    let loader = ThreadLoader::new(ctx, Loadable::thread(site, board, no, ""));
    let mut rx = loader.subscribe();
    loader.request_data();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut printed: HashSet<u64> = HashSet::new();
    loop {
        let event = tokio::select! {
            _ = &mut ctrl_c => break,
            event = next_event(&mut rx) => event?,
        };

        match event {
            LoaderEvent::Data(thread) => {
                if printed.is_empty() {
                    print_thread_header(&thread);
                    db.lock().await.record_history(&thread.loadable)?;
                }
                for post in &thread.posts {
                    if !printed.insert(post.no) {
                        continue;
                    }
                    if !post.filter.remove {
                        print_post(post);
                    }
                }

                if !follow {
                    break;
                }
                if thread.archived || thread.closed {
                    println!("\nThread is {}.", if thread.archived { "archived" } else { "closed" });
                    break;
                }
                loader.set_timer();
                tracing::debug!("Next refresh in {}s", loader.watch_timeout().as_secs());
            }
            LoaderEvent::Error(e) => {
                if !follow || e.is_not_found() {
                    loader.cancel();
                    return Err(anyhow!("Failed to load /{board}/{no}: {e}"));
                }
                eprintln!("Refresh failed: {e}");
                loader.set_timer();
            }
        }
    }

    loader.cancel();
    Ok(())
}

fn print_thread_header(thread: &ChanThread) {
    println!("\n{} · {}", thread.loadable.title, thread.summary());
    println!("{}", thread.loadable.desktop_url());
    println!("{}", "─".repeat(60));
}

fn print_post(post: &Post) {
    let time = post
        .timestamp()
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default();
    let name = if post.name.is_empty() { "Anonymous" } else { post.name.as_str() };
    let mut flags = String::new();
    if post.is_saved_reply {
        flags.push_str(" (You)");
    }
    if post.deleted {
        flags.push_str(" [deleted]");
    }

    println!("\n>>{} {}{} {}{}", post.no, name, post.tripcode, time, flags);
    if post.filter.stub {
        println!("  (hidden)");
        return;
    }
    if !post.subject.is_empty() {
        println!("  {}", post.subject);
    }
    for image in &post.images {
        if image.deleted {
            println!("  [file deleted]");
        } else {
            println!("  [{}.{} {}x{}]", image.filename, image.extension, image.width, image.height);
        }
    }
    for line in post.comment.text.lines() {
        println!("  {line}");
    }
    if !post.replies_from.is_empty() {
        let replies: Vec<String> = post.replies_from.iter().map(|n| format!(">>{n}")).collect();
        println!("  ↳ {}", replies.join(" "));
    }
}

async fn watch_cli(config: &Config, background: bool) -> Result<()> {
    if !config.watch_enabled {
        println!("Watching is disabled (watch_enabled = false in config).");
        return Ok(());
    }

    let (ctx, _db) = open_context(config).await?;
    let manager = WatchManager::new(ctx, WatchSettings::from_config(config)).await?;
    if manager.watching_pins().is_empty() {
        println!("No watched pins. Pin a thread with: threadwatch pin <board> <no>");
        return Ok(());
    }

    if background {
        manager.set_background_enabled(true);
        manager.set_foreground(false).await?;
    }
    println!(
        "Watching {} threads ({} interval). Press Ctrl-C to stop.",
        manager.watching_pins().len(),
        manager.interval()
    );

    let mut rx = manager.subscribe();
    let notify_mode = config.watch_notify_mode;
    let printer = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(WatchEvent::NewPosts(pin)) if notify_mode == threadwatch::NotifyMode::AllPosts => {
                    println!("{} · {} new posts", pin.loadable.title, pin.new_post_count());
                }
                Ok(WatchEvent::NewQuotes(pin)) => {
                    println!("{} · {} new replies to you", pin.loadable.title, pin.new_quote_count());
                }
                Ok(WatchEvent::PinChanged(pin)) if pin.is_error => {
                    println!("{} · 404, stopped watching", pin.loadable.title);
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    manager
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    printer.abort();

    for pin in manager.pins() {
        if manager.take_new_quotes(pin.id) {
            println!("{} · replies to you this session", pin.loadable.title);
        }
    }
    if manager.has_unread(config.watch_notify_mode) {
        println!("\nUnread posts remain in watched threads; see: threadwatch pins");
    }
    Ok(())
}

async fn pin_cli(config: &Config, site: Option<&str>, board: &str, no: u64) -> Result<()> {
    let site = resolve_site(config, site)?;
    let (ctx, _db) = open_context(config).await?;
    let manager = WatchManager::new(ctx, WatchSettings::from_config(config)).await?;

    let loadable = Loadable::thread(site, board, no, "");
    if manager.create_pin(Pin::new(loadable.clone(), None)).await? {
        println!("✓ Pinned {}", loadable);
    } else {
        println!("{} is already pinned", loadable);
    }
    Ok(())
}

async fn unpin_cli(config: &Config, site: Option<&str>, board: &str, no: u64) -> Result<()> {
    let site = resolve_site(config, site)?;
    let (ctx, _db) = open_context(config).await?;
    let manager = WatchManager::new(ctx, WatchSettings::from_config(config)).await?;

    let loadable = Loadable::thread(site, board, no, "");
    let pin = manager
        .find_pin(&loadable)
        .ok_or_else(|| anyhow!("{loadable} is not pinned"))?;
    manager.delete_pin(pin.id).await?;
    println!("✓ Unpinned {}", loadable);
    Ok(())
}

fn list_pins() -> Result<()> {
    let db = Database::open()?;
    let pins = db.pins()?;

    if pins.is_empty() {
        println!("No pins.");
        println!("\nPin a thread with:");
        println!("  threadwatch pin <board> <no>");
        return Ok(());
    }

    println!("Pins:\n");
    for pin in pins {
        let state = if pin.is_error {
            "404"
        } else if pin.archived {
            "archived"
        } else if pin.watching {
            "watching"
        } else {
            "paused"
        };
        let title = if pin.loadable.title.is_empty() {
            pin.loadable.short_string()
        } else {
            pin.loadable.title.clone()
        };
        println!(
            "  {} [{}] {} new, {} replies to you\n    {}",
            title,
            state,
            pin.new_post_count(),
            pin.new_quote_count(),
            pin.loadable.desktop_url()
        );
    }
    Ok(())
}

fn history_cli(clear: bool, limit: usize) -> Result<()> {
    let db = Database::open()?;
    if clear {
        let count = db.clear_history()?;
        println!("✓ Cleared {count} history entries");
        return Ok(());
    }

    let history = db.history(limit)?;
    if history.is_empty() {
        println!("No history.");
        return Ok(());
    }
    for entry in history {
        println!(
            "  {}  {}  {}",
            entry.last_visited.format("%Y-%m-%d %H:%M"),
            entry.loadable,
            entry.loadable.title
        );
    }
    Ok(())
}

fn add_filter(pattern: &str, fields: &str, action: &str, boards: Vec<String>) -> Result<()> {
    let fields = FilterFields::parse_list(fields).ok_or_else(|| anyhow!("Invalid filter fields: {fields}"))?;
    let action = FilterAction::from_str(action).ok_or_else(|| anyhow!("Unknown filter action: {action}"))?;
    if threadwatch::FilterEngine::compile(pattern, action).is_none() {
        return Err(anyhow!("Invalid filter pattern: {pattern}"));
    }

    let db = Database::open()?;
    let mut filter = Filter::new(pattern, fields, action);
    filter.all_boards = boards.is_empty();
    filter.boards = boards;
    filter.order = i32::try_from(db.filters()?.len()).unwrap_or(i32::MAX);
    db.save_filter(&filter)?;

    println!("✓ Added {} filter on {}: {}", filter.action, filter.fields, filter.pattern);
    Ok(())
}

fn list_filters() -> Result<()> {
    let db = Database::open()?;
    let filters = db.filters()?;
    if filters.is_empty() {
        println!("No filters.");
        return Ok(());
    }

    for filter in filters {
        let boards = if filter.all_boards {
            "all boards".to_string()
        } else {
            filter.boards.join(",")
        };
        println!(
            "  {}{} [{}] on {} ({})",
            if filter.enabled { "" } else { "(disabled) " },
            filter.pattern,
            filter.action,
            filter.fields,
            boards
        );
    }
    Ok(())
}

fn hide_cli(
    config: &Config,
    site: Option<&str>,
    board: &str,
    no: u64,
    thread_no: u64,
    remove: bool,
) -> Result<()> {
    let site = resolve_site(config, site)?;
    let db = Database::open()?;
    db.hide_post(&PostHide {
        site,
        board: board.to_string(),
        no,
        thread_no,
        whole_thread: no == thread_no,
        hide: !remove,
    })?;
    println!("✓ {} /{}/{}", if remove { "Removed" } else { "Hid" }, board, no);
    Ok(())
}

fn mine_cli(config: &Config, site: Option<&str>, board: &str, no: u64) -> Result<()> {
    let site = resolve_site(config, site)?;
    let db = Database::open()?;
    db.add_saved_reply(&SavedReply {
        site,
        board: board.to_string(),
        no,
    })?;
    println!("✓ Marked /{}/{} as yours", board, no);
    Ok(())
}
