mod cli;
mod core;
mod download;
mod driver;
mod error;
mod hotkeys;
mod http;
mod mpv;
mod prompt;
mod retry;
mod station;
mod tags;
mod token;

use anyhow::Context;
use clap::Parser;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use xradio_proto::catalog::{self, Catalog, CatalogEntry};
use xradio_proto::config::Config;
use xradio_proto::platform;

use crate::cli::{Cli, Command};
use crate::core::{Orchestrator, Session};
use crate::download::DownloadGuard;
use crate::driver::{DriverOptions, PlaybackDriver};
use crate::error::FatalError;
use crate::hotkeys::{Bindings, HotkeyService, SignalRouter};
use crate::mpv::MpvPlayer;
use crate::retry::RetryPolicy;
use crate::station::{Station, StationAdapter};
use crate::tags::LoftyTagger;
use crate::token::TokenCell;

const EXIT_SUCCESS: i32 = 0;
const EXIT_FAILURE: i32 = 1;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(cli.verbose) {
        eprintln!("Logging setup failed: {:#}", e);
    }

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            EXIT_FAILURE
        }
    };
    // The channel prompt may still be blocked on stdin; don't wait for it.
    std::process::exit(code);
}

fn init_tracing(verbose: u8) -> anyhow::Result<()> {
    let data_dir = platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("xradio.log");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open {}", log_path.display()))?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);
    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli::log_filter(verbose))),
        )
        .try_init()?;
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    match &cli.command {
        Some(Command::Stations) => {
            println!("{}", station::listing());
            return Ok(EXIT_SUCCESS);
        }
        Some(Command::Aliases { dir }) => {
            let dir = dir.clone().unwrap_or_else(|| PathBuf::from("."));
            cli::write_alias_scripts(&dir)?;
            return Ok(EXIT_SUCCESS);
        }
        None => {}
    }

    let Some(alias) = cli.station.as_deref() else {
        error!("No station given, known stations:\n{}", station::listing());
        return Ok(EXIT_FAILURE);
    };
    let Some(station) = station::lookup(alias) else {
        error!("Unknown station \"{}\", known stations:\n{}", alias, station::listing());
        return Ok(EXIT_FAILURE);
    };

    let config = Config::load().context("Failed to load config")?;
    info!("Config loaded from {}", Config::config_path().display());
    prepare_environment(&config);

    let adapter = station::build_adapter(station).context("Failed to set up HTTP client")?;

    // From here on Ctrl-C and SIGTERM end the session in any phase.
    let shutdown = shutdown_signal().context("Failed to listen for shutdown signals")?;
    let driver: Arc<dyn PlaybackDriver> = Arc::new(MpvPlayer::new());
    let options = DriverOptions {
        volume: config.player.volume,
        extra_args: config.player.mpv_args.clone(),
    };
    driver.init(&options).await.context("Failed to start mpv")?;

    let mut hotkeys = HotkeyService::new();
    let outcome = until_shutdown(
        session(&cli, station, &config, adapter, driver.clone(), &mut hotkeys),
        shutdown,
    )
    .await;
    Ok(finish(outcome, hotkeys, driver.as_ref()).await)
}

/// Drive `session` until it ends on its own or `shutdown` fires, whatever
/// phase it is in. A shutdown is a clean end.
async fn until_shutdown<S, F>(session: S, shutdown: F) -> Result<(), FatalError>
where
    S: Future<Output = Result<(), FatalError>>,
    F: Future<Output = ()>,
{
    tokio::select! {
        biased;
        () = shutdown => {
            info!("Shutting down");
            Ok(())
        }
        outcome = session => outcome,
    }
}

/// Release the hotkeys and the player; the exit code for `outcome`.
async fn finish(outcome: Result<(), FatalError>, hotkeys: HotkeyService, driver: &dyn PlaybackDriver) -> i32 {
    let mut code = EXIT_SUCCESS;
    if let Err(e) = outcome {
        error!("{}", e);
        code = EXIT_FAILURE;
    }
    if let Err(e) = hotkeys.release().await {
        error!("{:#}", e);
        code = EXIT_FAILURE;
    }
    if let Err(e) = driver.release().await {
        error!("Failed to release player: {:#}", e);
        code = EXIT_FAILURE;
    }
    info!("Bye");
    code
}

/// Everything between a started player and a fatal error. Hotkey tasks are
/// attached to `hotkeys` for the caller to release.
async fn session(
    cli: &Cli,
    station: &Station,
    config: &Config,
    adapter: Arc<dyn StationAdapter>,
    driver: Arc<dyn PlaybackDriver>,
    hotkeys: &mut HotkeyService,
) -> Result<(), FatalError> {
    info!("Station: {}", station.title);
    let retry = RetryPolicy::default();
    let token = Arc::new(TokenCell::new());
    let cache_path = platform::catalog_cache_path(adapter.key());

    let (token_ready, channels) = tokio::join!(
        retry.run("token", |_| token.refresh(adapter.as_ref())),
        retry.run("channels", |_| catalog::load_or_refresh(
            &cache_path,
            config.cache.expiry(),
            cli.no_cache,
            || adapter.fetch_channel_list(),
        )),
    );
    token_ready?;
    let (channels, _) = channels?;

    let channel = choose_channel(cli.channel, channels).await?;
    info!("Channel: {} - {}", channel.id, channel.title);

    let client = station::http_client().map_err(|e| FatalError::Init(e.to_string()))?;
    let downloads = Arc::new(DownloadGuard::new(
        download::transcoder_for(adapter.download_method(), client),
        Arc::new(LoftyTagger),
    ));
    let (reports_tx, reports_rx) = mpsc::channel(16);
    tokio::spawn(core::run_reporter(reports_rx));

    let session = Session {
        channel_id: channel.id,
        channel_title: channel.title,
        token_margin: config.retrieval.token_margin(),
        retry,
        download_root: config.paths.downloads_dir.clone(),
    };
    let (orchestrator, player) =
        Orchestrator::new(adapter, driver, token, downloads, session, reports_tx);

    let bindings = match Bindings::load_or_create(&platform::hotkeys_path()) {
        Ok(bindings) => bindings,
        Err(e) => {
            warn!("{:#}, using default hotkeys", e);
            Bindings::default()
        }
    };
    let bindings = Arc::new(bindings);
    let (router, input_tx) = SignalRouter::new(bindings.clone(), player.clone());
    hotkeys.attach("router", tokio::spawn(router.run()));
    if config.hotkeys.http_enabled {
        hotkeys.attach(
            "http",
            http::start_server(
                config.hotkeys.bind_address.clone(),
                config.hotkeys.port,
                bindings,
                player,
                input_tx,
            ),
        );
    }

    orchestrator.run().await
}

/// Use the `-c` channel when the catalog knows it, otherwise ask.
async fn choose_channel(preset: Option<u64>, catalog: Catalog) -> Result<CatalogEntry, FatalError> {
    if let Some(id) = preset {
        match catalog.get(id) {
            Some(entry) => return Ok(entry.clone()),
            None => warn!("Channel {} not found, pick one from the list", id),
        }
    }
    tokio::task::spawn_blocking(move || {
        let stdin = std::io::stdin();
        prompt::select_channel(&catalog, &mut stdin.lock(), &mut std::io::stdout())
    })
    .await
    .map_err(|e| FatalError::Init(format!("channel prompt failed: {}", e)))?
}

fn prepare_environment(config: &Config) {
    for dir in [
        platform::config_dir(),
        platform::cache_dir(),
        config.paths.downloads_dir.clone(),
    ] {
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!("Couldn't create {}: {}", dir.display(), e);
        }
    }
    if platform::find_ffmpeg_binary().is_none() {
        warn!("ffmpeg not found, downloads from AudioAddict stations are unavailable");
    }
}

/// Listen for Ctrl-C and SIGTERM. The handlers are in place once this
/// returns, before the future is first polled.
#[cfg(unix)]
fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => debug!("SIGINT received"),
            _ = terminate.recv() => debug!("SIGTERM received"),
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    Ok(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Couldn't listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    })
}
