#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;
mod session;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use args::{Args, Command};
use clap::Parser;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use vibe_config::Config;
use vibe_routing::{InMemoryPatternRepository, PatternRepository, Router, TomlPatternRepository};

/// Config file picked up from the working directory when none is given
const DEFAULT_CONFIG: &str = "vibe.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let (config, config_path) = load_config(args.config.as_deref())?;

    // Initialize telemetry
    let filter = args
        .log_filter
        .clone()
        .unwrap_or_else(|| config.telemetry.log_filter.clone());
    let telemetry_guard = vibe_telemetry::init(&config.telemetry, &filter)?;

    match &config_path {
        Some(path) => tracing::info!(config_path = %path.display(), "configuration loaded"),
        None => tracing::info!("no configuration file, using defaults"),
    }

    let repository = pattern_repository(&config)?;

    match args.command {
        Command::Patterns => print_patterns(repository.as_ref()),
        Command::Route { input, cache_file } => route(&config, repository, input, cache_file).await?,
    }

    if let Err(e) = telemetry_guard.force_flush() {
        tracing::warn!(error = %e, "metrics flush failed");
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<(Config, Option<PathBuf>)> {
    if let Some(path) = path {
        return Ok((Config::load(path)?, Some(path.to_path_buf())));
    }

    let fallback = Path::new(DEFAULT_CONFIG);
    if fallback.exists() {
        return Ok((Config::load(fallback)?, Some(fallback.to_path_buf())));
    }

    Ok((Config::default(), None))
}

fn pattern_repository(config: &Config) -> anyhow::Result<Arc<dyn PatternRepository>> {
    match &config.patterns.path {
        Some(path) => {
            let repository = TomlPatternRepository::load(path)
                .with_context(|| format!("failed to load patterns from {}", path.display()))?;
            Ok(Arc::new(repository))
        }
        None => Ok(Arc::new(InMemoryPatternRepository::builtin())),
    }
}

fn print_patterns(repository: &dyn PatternRepository) {
    println!("pattern set {}", repository.version());

    match repository.patterns() {
        Ok(patterns) => {
            for pattern in patterns.iter() {
                println!(
                    "{:<20} savings {:>3}%  {}",
                    pattern.id,
                    pattern.average_token_savings,
                    pattern.domains.join(", ")
                );
            }
        }
        Err(e) => tracing::error!(error = %e, "pattern repository unavailable"),
    }
}

/// Route JSON lines until input ends or a shutdown signal arrives
async fn route(
    config: &Config,
    repository: Arc<dyn PatternRepository>,
    input: Option<PathBuf>,
    cache_file: Option<PathBuf>,
) -> anyhow::Result<()> {
    let router = Router::new(config, repository);
    let handlers = session::handlers_for(config, router.library());

    if let Some(path) = &cache_file
        && path.exists()
    {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read cache file {}", path.display()))?;
        let restored = router.cache().import_json(&json)?;
        tracing::info!(path = %path.display(), restored, "optimization cache restored");
    }

    // Set up graceful shutdown
    let shutdown = CancellationToken::new();
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_clone.cancel();
    });

    let cleanup = vibe_cache::spawn_cleanup(
        Arc::clone(router.cache()),
        config.cache.cleanup_interval,
        shutdown.clone(),
    );

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open input {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let mut lines = reader.lines();
    let mut stdout = tokio::io::stdout();
    let mut processed = 0_u64;

    loop {
        let line = tokio::select! {
            () = shutdown.cancelled() => break,
            line = lines.next_line() => line.context("failed to read input")?,
        };

        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let output = session::process_line(&router, &handlers, &line);
        let mut bytes = serde_json::to_vec(&output)?;
        bytes.push(b'\n');
        stdout.write_all(&bytes).await?;
        stdout.flush().await?;
        processed += 1;
    }

    shutdown.cancel();
    if let Err(e) = cleanup.await {
        tracing::warn!(error = %e, "cache cleanup task failed");
    }

    if let Some(path) = &cache_file {
        let json = router.cache().export_json()?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("failed to write cache file {}", path.display()))?;
        tracing::info!(path = %path.display(), entries = router.cache().len(), "optimization cache saved");
    }

    let stats = router.stats();
    tracing::info!(
        processed,
        decisions = stats.decisions.total_decisions,
        fallback_rate = stats.decisions.fallback_rate,
        cache_hit_ratio = stats.cache.hit_ratio,
        average_compression = stats.compression.average_ratio,
        "vibe stopped"
    );

    Ok(())
}

/// Wait for a shutdown signal (`SIGINT` or `SIGTERM`)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
