//! tracktail - follow a station logger from the terminal
//!
//! Prints the most recent tracks of a station, optionally filtered, then
//! keeps printing newly played tracks from the live feed with `--follow`.

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use clap::Parser;
use trackconfig::Config;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use tracksync::{SearchQuery, SyncSettings, Track, TrackSession};

#[derive(Parser, Debug)]
#[command(name = "tracktail", version, about = "Follow a station logger from the terminal")]
struct Cli {
    /// Configuration directory (defaults to ./.tracktail, then ~/.tracktail)
    #[arg(short, long, env = "TRACKTAIL_CONFIG")]
    config_dir: Option<String>,

    /// Logger server base URL
    #[arg(short, long)]
    server: Option<String>,

    /// Live feed WebSocket URL
    #[arg(long)]
    stream: Option<String>,

    /// Use the underground channel
    #[arg(short, long)]
    underground: bool,

    /// Tracks per page
    #[arg(short = 'n', long)]
    count: Option<u32>,

    /// Number of pages to load
    #[arg(short, long, default_value_t = 1)]
    pages: u32,

    /// Only tracks whose artist matches
    #[arg(long)]
    artist: Option<String>,

    /// Only tracks whose title matches
    #[arg(long)]
    title: Option<String>,

    /// Keep running and print tracks as they are played
    #[arg(short, long)]
    follow: bool,

    /// Log level, overrides the configured one
    #[arg(long)]
    log_level: Option<String>,
}

fn init_logging(config: &Config, level: Option<&str>) -> Result<()> {
    if !config.get_log_enable_console()? {
        return Ok(());
    }

    let level = match level {
        Some(level) => level.to_string(),
        None => config.get_log_min_level()?,
    }
    .to_lowercase();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&level))
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow!("invalid log filter: {e}"))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .map_err(|e| anyhow!("cannot install logger: {e}"))
}

fn apply_overrides(settings: &mut SyncSettings, cli: &Cli) {
    if let Some(server) = &cli.server {
        settings.server_url = server.clone();
    }
    if let Some(stream) = &cli.stream {
        settings.stream_url = Some(stream.clone());
    }
    if cli.underground {
        settings.underground = true;
    }
    if let Some(count) = cli.count {
        settings.list_count = count;
    }
}

fn search_query(cli: &Cli) -> SearchQuery {
    let mut query = SearchQuery::new();
    if let Some(artist) = &cli.artist {
        query = query.artist(artist.clone());
    }
    if let Some(title) = &cli.title {
        query = query.title(title.clone());
    }
    query
}

fn format_track(track: &Track) -> String {
    let at = track.played_at.with_timezone(&Local).format("%Y-%m-%d %H:%M");
    if track.is_event() {
        format!("{at}  * {}", track.artist)
    } else if track.group.is_empty() {
        format!("{at}  {} - {}", track.artist, track.title)
    } else {
        format!("{at}  {} - {}  [{}]", track.artist, track.title, track.group)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_config(cli.config_dir.as_deref().unwrap_or(""))
        .context("cannot load configuration")?;
    init_logging(&config, cli.log_level.as_deref())?;

    let mut settings = SyncSettings::from_config(&config)?;
    apply_overrides(&mut settings, &cli);
    info!(
        server = %settings.server_url,
        underground = settings.underground,
        "Connecting to station logger"
    );

    let mut session = TrackSession::new(settings)?;
    let query = search_query(&cli);

    if query.is_filtered() {
        session.client_mut().search(&query).await?;
    } else {
        session.client_mut().refresh().await?;
    }
    for _ in 1..cli.pages {
        if session.client_mut().load_more().await? == 0 {
            break;
        }
    }

    // oldest first, like a log
    for track in session.store().snapshot().iter().rev() {
        println!("{}", format_track(track));
    }

    if !cli.follow {
        return Ok(());
    }

    if query.is_filtered() {
        warn!("Live tracks are not shown while a search is active");
    }

    session.store().subscribe(|tracks| {
        if let Some(head) = tracks.first() {
            println!("{}", format_track(head));
        }
    });

    let auto_reconnect = session.settings().auto_reconnect;
    match session.stream().connect(auto_reconnect).await {
        Ok(true) => {
            session.stream().request_current_track();
        }
        Ok(false) => {
            warn!("No live feed URL configured, nothing to follow");
            return Ok(());
        }
        Err(e) if auto_reconnect => warn!(error = %e, "Live feed unavailable, retrying"),
        Err(e) => return Err(e.into()),
    }

    tokio::signal::ctrl_c().await?;
    info!("Stopping");
    session.shutdown();
    Ok(())
}
