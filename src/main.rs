//! Jaye - Video Catalog Gateway
//!
//! Main entry point: runs the HTTP gateway or one acquisition/catalog
//! operation from the command line.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use jaye::acquire::Acquirer;
use jaye::catalog::{self, CatalogApi, CatalogClient};
use jaye::cli::{Args, CacheAction, Commands};
use jaye::config::Config;
use jaye::server::{self, AppContext};

const LOG_FILE_NAME: &str = "jaye.log";

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    let config = load_config(args.config.as_deref())?;

    // Setup logging to both console and file
    setup_logging(args.verbose, &config.logging.log_dir)?;

    match args.command {
        Commands::Serve => {
            info!("Starting Jaye gateway");
            let acquirer = Arc::new(Acquirer::from_config(&config));
            if let Err(e) = acquirer.check_availability() {
                warn!("External tools are not ready, media requests will fail: {}", e);
            }
            let catalog: Arc<dyn CatalogApi> = Arc::new(CatalogClient::new(&config.catalog)?);
            server::start_server(&config, AppContext::new(acquirer, catalog)).await?;
        }
        Commands::Search { query } => {
            let client = CatalogClient::new(&config.catalog)?;
            let ids = client.search(&query).await?;
            println!("{}", serde_json::to_string_pretty(&ids)?);
        }
        Commands::Info { id } => {
            let client = CatalogClient::new(&config.catalog)?;
            let info = client.info(&id).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Commands::List => {
            let acquirer = Acquirer::from_config(&config);
            let client = CatalogClient::new(&config.catalog)?;
            let videos = catalog::list(acquirer.store(), &client).await?;
            println!("{}", serde_json::to_string_pretty(&videos)?);
        }
        Commands::Video { id, output } => {
            let acquirer = Acquirer::from_config(&config);
            let cancel = cancel_on_ctrl_c();
            let file = acquirer.video_artifact(&id, &cancel).await?;
            copy_with_progress(file, &output).await?;
            info!("Saved video {} to {}", id, output.display());
        }
        Commands::Audio { id, output } => {
            let acquirer = Acquirer::from_config(&config);
            let cancel = cancel_on_ctrl_c();
            let file = acquirer.audio_artifact(&id, &cancel).await?;
            copy_with_progress(file, &output).await?;
            info!("Saved audio {} to {}", id, output.display());
        }
        Commands::Cache { action } => {
            let acquirer = Acquirer::from_config(&config);
            let store = acquirer.store();

            match action {
                CacheAction::List => {
                    let entries = store.scan().await?;
                    if entries.is_empty() {
                        println!("No cached videos found in {}.", store.root().display());
                    } else {
                        println!("\nCached Videos ({}):", store.root().display());
                        println!("{:<20} {:<22} {:<40}", "ID", "Modified", "Artifacts");
                        println!("{}", "-".repeat(82));

                        for entry in entries {
                            let artifacts = store.artifacts(&entry.id)?;
                            println!(
                                "{:<20} {:<22} {:<40}",
                                entry.id,
                                entry.modified.format("%Y-%m-%d %H:%M:%S"),
                                artifacts.join(", ")
                            );
                        }
                    }
                }
                CacheAction::Clear { id: Some(id) } => {
                    if store.remove(&id).await? {
                        println!("Cleared cached artifacts for {}", id);
                    } else {
                        println!("Nothing cached for {}", id);
                    }
                }
                CacheAction::Clear { id: None } => {
                    let count = store.clear().await?;
                    println!("Cleared {} cached videos", count);
                }
            }
        }
        Commands::InitConfig { output } => {
            if output.exists() {
                anyhow::bail!("{} already exists", output.display());
            }
            Config::default().save_to_file(&output)?;
            println!("Wrote default configuration to {}", output.display());
        }
        Commands::Check => {
            let acquirer = Acquirer::from_config(&config);
            acquirer.check_availability()?;
            let version = acquirer.encoder_version().await?;
            println!("yt-dlp: ok ({})", config.extractor.binary_path);
            println!("ffmpeg: ok ({})", version);
        }
    }

    Ok(())
}

/// Resolve configuration: explicit path, then ./config.toml, then defaults
fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(config_path) => Config::from_file(config_path)
            .with_context(|| format!("Failed to load {}", config_path.display()))?,
        None => {
            let local = PathBuf::from("config.toml");
            if local.exists() {
                Config::from_file(&local)?
            } else {
                Config::default()
            }
        }
    };
    Ok(config)
}

/// Cancellation token that fires on Ctrl+C, so spawned tools are killed
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            trigger.cancel();
        }
    });
    cancel
}

/// Copy an opened artifact to `output`, reporting progress on the console
async fn copy_with_progress(mut src: File, output: &Path) -> Result<()> {
    let total = src.metadata().await?.len();

    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")?
            .progress_chars("#>-"),
    );

    let mut dst = File::create(output)
        .await
        .with_context(|| format!("Failed to create {}", output.display()))?;

    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = src.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        dst.write_all(&buf[..n]).await?;
        pb.inc(n as u64);
    }
    dst.flush().await?;

    pb.finish_and_clear();
    Ok(())
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool, log_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(log_dir, LOG_FILE_NAME);
    let (non_blocking_file, guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join(LOG_FILE_NAME).display()
    );

    Ok(())
}
