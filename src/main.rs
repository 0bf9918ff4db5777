mod cli;
mod config;
mod config_persistence;
mod db_manager;
mod download_limiter;
mod error;
mod fanart;
mod fanart_keyring;
mod image_store;
mod protocol;
mod provider;
mod refresh_runner;
mod transfer;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::ArgMatches;
use config::{Config, FanArtSettings};
use db_manager::DbManager;
use download_limiter::DownloadLimiter;
use fanart_keyring::ApiKeySource;
use fanart::FanArtArtistProvider;
use image_store::HttpImageStore;
use log::{debug, info, warn};
use refresh_runner::RefreshSummary;
use tokio_util::sync::CancellationToken;

const USER_AGENT: &str = concat!("fanart-sync/", env!("CARGO_PKG_VERSION"));

fn resolve_config_path(matches: &ArgMatches) -> Result<PathBuf, String> {
    if let Some(path) = matches.get_one::<PathBuf>("config") {
        return Ok(path.clone());
    }
    config_persistence::default_config_path()
        .ok_or_else(|| "could not determine the platform config directory".to_string())
}

fn open_catalog(config: &Config) -> Result<(PathBuf, DbManager), Box<dyn std::error::Error>> {
    let data_root = config
        .library
        .resolved_data_dir()
        .ok_or("could not determine the platform data directory")?;
    std::fs::create_dir_all(&data_root).map_err(|err| {
        format!(
            "failed to create data directory {}: {}",
            data_root.display(),
            err
        )
    })?;
    let db_manager = DbManager::open(&data_root.join(db_manager::CATALOG_FILE_NAME))?;
    Ok((data_root, db_manager))
}

fn print_artists(db_manager: &DbManager, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let artists = db_manager.get_all_artists()?;
    if json {
        let rows: Vec<serde_json::Value> = artists
            .iter()
            .map(|artist| {
                serde_json::json!({
                    "id": artist.id,
                    "name": artist.name,
                    "path": artist.path,
                    "musicbrainz_id": artist.musicbrainz_id,
                    "dont_fetch_meta": artist.dont_fetch_meta,
                    "images": artist.images,
                    "backdrops": artist.backdrops,
                    "refresh_records": artist.refresh_records,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for artist in artists {
        let refreshed = artist
            .refresh_record(fanart::artist_provider::PROVIDER_NAME)
            .map(|record| format!("{} @ {}", record.status.as_str(), record.last_refreshed_unix_ms))
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{}\t{}\tmbid={}\timages={}\tbackdrops={}\tlocked={}\trefreshed={}",
            artist.id,
            artist.name,
            artist.musicbrainz_id().unwrap_or("-"),
            artist.images.len(),
            artist.backdrops.len(),
            artist.dont_fetch_meta,
            refreshed
        );
    }
    Ok(())
}

fn print_summary(summary: &RefreshSummary, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }
    for report in &summary.reports {
        match report.skip_reason {
            Some(reason) => println!("{}\tskipped\t{}", report.subject_id, reason),
            None => println!(
                "{}\t{}\tstored={}\tfailed={}",
                report.subject_id,
                if report.is_partial_failure() {
                    "partial"
                } else {
                    "completed"
                },
                report.acquired.len(),
                report.failures.len()
            ),
        }
    }
    for failure in &summary.failures {
        println!("{}\tfailed\t{}", failure.subject_id, failure.error);
    }
    Ok(())
}

async fn cleanup_stale_downloads(
    data_root: &Path,
    store: &HttpImageStore,
    subjects: &[protocol::ArtistSubject],
) {
    let mut cleaned = fanart::manifest_fetcher::cleanup_stale_manifests(data_root).await;
    for subject in subjects {
        let mut dirs = vec![store.metadata_dir(subject)];
        dirs.extend(subject.path.clone());
        for dir in dirs {
            match transfer::cleanup_stale_temp_files(&dir).await {
                Ok(count) => cleaned += count,
                Err(err) => warn!("Temp file cleanup failed: {}", err),
            }
        }
    }
    if cleaned > 0 {
        info!("Removed {} interrupted downloads", cleaned);
    }
}

fn run_refresh(
    config: &Config,
    args: &ArgMatches,
) -> Result<RefreshSummary, Box<dyn std::error::Error>> {
    let (data_root, db_manager) = open_catalog(config)?;
    let api_key = fanart_keyring::resolve_api_key(&config.fanart.api_key);
    match api_key.source {
        ApiKeySource::Missing => warn!(
            "No fanart API key configured; every artist will be skipped. Use `fanart-sync set-api-key`."
        ),
        source => debug!("Using fanart API key from {:?}", source),
    }

    let subjects = match args.get_one::<String>("artist") {
        Some(id) => vec![db_manager
            .get_artist(id)?
            .ok_or_else(|| format!("no artist with id '{id}'"))?],
        None => db_manager.get_all_artists()?,
    };

    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(config.fanart.request_timeout_secs))
        .build()?;
    let limiter = Arc::new(DownloadLimiter::with_min_interval(
        config.fanart.max_concurrent_downloads as usize,
        Duration::from_millis(config.fanart.min_request_interval_ms),
    ));
    debug!(
        "Download limiter: {} concurrent requests, {}ms spacing",
        limiter.capacity(),
        config.fanart.min_request_interval_ms
    );
    let store = Arc::new(HttpImageStore::new(client.clone(), data_root.clone()));
    let settings = Arc::new(Mutex::new(FanArtSettings::from_config(
        config,
        api_key.key,
        data_root.clone(),
    )));
    let provider = Arc::new(FanArtArtistProvider::new(
        settings,
        limiter,
        client,
        Arc::clone(&store) as Arc<dyn image_store::ImageStore>,
    ));
    let force = args.get_flag("force");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let summary = runtime.block_on(async {
        let cancel = CancellationToken::new();
        let signal_cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received. Cancelling refresh");
                signal_cancel.cancel();
            }
        });

        cleanup_stale_downloads(&data_root, &store, &subjects).await;
        info!("Refreshing {} artists", subjects.len());
        refresh_runner::refresh_subjects(provider, &db_manager, subjects, force, &cancel).await
    });
    Ok(summary)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = cli::build_cli().get_matches();

    let mut clog = colog::default_builder();
    clog.filter(
        None,
        if matches.get_flag("verbose") {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        },
    );
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let config_file = resolve_config_path(&matches)?;
    config_persistence::ensure_config_file(&config_file)?;
    let config = config_persistence::load_config_file(&config_file);

    match matches.subcommand() {
        Some(("add-artist", args)) => {
            let (_, db_manager) = open_catalog(&config)?;
            let name = args
                .get_one::<String>("name")
                .ok_or("missing --name")?;
            let id = db_manager.add_artist(
                name,
                args.get_one::<PathBuf>("path").map(PathBuf::as_path),
                args.get_one::<String>("mbid").map(String::as_str),
            )?;
            info!("Added artist '{}'", name);
            println!("{id}");
        }
        Some(("list", args)) => {
            let (_, db_manager) = open_catalog(&config)?;
            print_artists(&db_manager, args.get_flag("json"))?;
        }
        Some(("lock", args)) => {
            let (_, db_manager) = open_catalog(&config)?;
            let id = args.get_one::<String>("artist").ok_or("missing artist id")?;
            let locked = !args.get_flag("unlock");
            if !db_manager.set_artist_locked(id, locked)? {
                return Err(format!("no artist with id '{id}'").into());
            }
            info!(
                "Artist {} is now {}",
                id,
                if locked { "locked" } else { "unlocked" }
            );
        }
        Some(("refresh", args)) => {
            let summary = run_refresh(&config, args)?;
            print_summary(&summary, args.get_flag("json"))?;
            if !summary.failures.is_empty() {
                return Err(format!("{} refresh cycles failed", summary.failures.len()).into());
            }
        }
        Some(("set-api-key", args)) => {
            if args.get_flag("clear") {
                fanart_keyring::clear_api_key()?;
                info!("Removed fanart API key from the keyring");
            } else {
                let key = args.get_one::<String>("key").ok_or("missing API key")?;
                fanart_keyring::store_api_key(key)?;
                info!("Stored fanart API key in the keyring");
            }
        }
        _ => unreachable!("clap requires a subcommand"),
    }

    Ok(())
}
