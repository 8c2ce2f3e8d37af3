// src/main.rs
use clap::Parser;
use ct_sentinel::checkpoint::{CheckpointStore, FileCheckpointStore};
use ct_sentinel::cli::Cli;
use ct_sentinel::config::{CheckpointBackend, Config};
use ct_sentinel::ct_log::{CtLogClient, HttpLogScanner, LogScanner};
use ct_sentinel::database::{DbCheckpointStore, MatchStore, PostgresStore};
use ct_sentinel::matcher::MatchPolicy;
use ct_sentinel::monitor::{
    resolve_start_index, MonitorOptions, RunState, ScanCycleController,
};
use ct_sentinel::sink::{spawn_sink, RedisSink, SinkHandle, StdoutSink, StoreSink, WebhookSink};
use ct_sentinel::stats::ScanStats;
use ct_sentinel::supervisor::Supervisor;
use futures_util::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();
    cli.validate()?;

    // Load config file
    let config = Config::from_file(Path::new(&cli.config))?;
    config.validate()?;

    // Initialize logging; verbosity flags beat the config level
    let log_level = cli
        .log_level_override()
        .unwrap_or(&config.logging.level)
        .to_string();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!("Starting ct-sentinel for {}", config.log.uri);

    // Compile the match policy
    let policy = Arc::new(MatchPolicy::new(
        &config.matching.subject_regex,
        config.matching.ca_whitelist.clone(),
    )?);
    tracing::info!(
        "Match policy: rule '{}', {} whitelisted CA(s)",
        policy.subject_rule(),
        policy.whitelist_len()
    );

    // Connect to PostgreSQL when match storage is enabled
    let store: Option<Arc<PostgresStore>> = if config.storage.enabled {
        let postgres =
            PostgresStore::connect(&config.storage.url, config.storage.max_connections).await?;
        postgres.migrate().await?;
        Some(Arc::new(postgres))
    } else {
        None
    };

    // Checkpoint backend
    let checkpoint: Arc<dyn CheckpointStore> = match config.scan.checkpoint_backend {
        CheckpointBackend::File => {
            tracing::info!("Using checkpoint file {}", config.scan.state_file);
            Arc::new(
                FileCheckpointStore::new(
                    PathBuf::from(&config.scan.state_file),
                    config.log.uri.clone(),
                )
                .await?,
            )
        }
        CheckpointBackend::Database => match store.clone() {
            Some(store) => {
                tracing::info!("Using database checkpoints");
                Arc::new(DbCheckpointStore::new(store, config.log.uri.clone()))
            }
            None => anyhow::bail!("checkpoint backend 'database' requires storage to be enabled"),
        },
    };

    // Resume position: saved checkpoint vs configured override
    let override_index = cli.start_index.unwrap_or(config.scan.start_index);
    let start_index = resolve_start_index(checkpoint.as_ref(), override_index).await?;
    tracing::info!("Scan starts at index {}", start_index);

    // Build sinks in fixed registration order: store, webhook, redis, stdout
    let mut sinks: Vec<SinkHandle> = Vec::new();
    let mut workers: Vec<JoinHandle<()>> = Vec::new();

    if let Some(ref store) = store {
        let store_sink: Arc<dyn MatchStore> = store.clone();
        let (handle, worker) = spawn_sink(StoreSink::new(store_sink, config.log.uri.clone()));
        sinks.push(handle);
        workers.push(worker);
        tracing::info!("Database sink enabled");
    }

    if let Some(webhook_config) = config.webhook.clone() {
        let url = webhook_config.url.clone();
        let (handle, worker) = spawn_sink(WebhookSink::new(webhook_config, config.log.uri.clone()));
        sinks.push(handle);
        workers.push(worker);
        tracing::info!("Webhook sink enabled: {}", url);
    }

    if config.redis.enabled {
        match RedisSink::connect(config.redis.clone(), config.log.uri.clone()).await {
            Ok(sink) => {
                let channel = config.redis.channel.clone();
                let (handle, worker) = spawn_sink(sink);
                sinks.push(handle);
                workers.push(worker);
                tracing::info!("Redis sink enabled: channel={}", channel);
            }
            Err(e) => {
                tracing::error!("Failed to connect to Redis: {}", e);
                tracing::warn!("Continuing without the Redis sink");
            }
        }
    }

    if config.stdout.enabled {
        let (handle, worker) = spawn_sink(StdoutSink::new(config.stdout.format));
        sinks.push(handle);
        workers.push(worker);
        tracing::info!("Stdout sink enabled ({:?})", config.stdout.format);
    }

    // Validation passed earlier, but a failed Redis connect can still
    // leave the registry empty
    if sinks.is_empty() {
        anyhow::bail!("No sinks could be started, matches would have nowhere to go");
    }

    // Scanner against the configured log
    let client = CtLogClient::new(&config.log.uri)?;
    let scanner: Arc<dyn LogScanner> = Arc::new(HttpLogScanner::new(client));

    let rescan_interval = if cli.once || config.scan.rescan_interval_secs == 0 {
        None
    } else {
        Some(Duration::from_secs(config.scan.rescan_interval_secs))
    };

    let options = MonitorOptions {
        batch_size: config.log.batch_size,
        parallel_fetch: config.log.parallel_fetch,
        tick_interval: Duration::from_secs(config.scan.checkpoint_interval_secs),
        rescan_interval,
    };

    let state = RunState::new(start_index, sinks, policy, checkpoint)?;
    let controller = ScanCycleController::new(scanner, state, options);
    let stats = controller.stats();

    // Run under the supervisor until done or interrupted
    let supervisor = Supervisor::spawn(controller);
    let result = supervisor.run_until(shutdown_signal()).await;

    // Give the sink workers a moment to drain what is still buffered
    if tokio::time::timeout(Duration::from_secs(5), join_all(workers))
        .await
        .is_err()
    {
        tracing::warn!("Sink workers still busy after 5s, giving up on them");
    }

    if let Some(store) = store {
        store.close().await;
    }

    // Keep a JSONL stdout stream clean for downstream parsers
    let stdout_is_jsonl =
        config.stdout.enabled && config.stdout.format == ct_sentinel::sink::StdoutFormat::Jsonl;
    if !stdout_is_jsonl {
        print_final_stats(&stats);
    }

    match result {
        Ok(summary) => {
            if summary.cancelled {
                tracing::info!(
                    "Run cancelled after {} entries, resumes at index {}",
                    summary.entries_processed,
                    summary.final_index
                );
            }
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn print_final_stats(stats: &ScanStats) {
    let snapshot = stats.snapshot();
    println!("\nFinal statistics:");
    println!("  Entries processed: {}", snapshot.entries_processed);
    println!("  Matches found: {}", snapshot.matches_found);
    println!("  Rate: {:.1} entries/min", snapshot.entries_per_minute);
    println!("  Uptime: {}", ScanStats::format_uptime(snapshot.uptime_secs));
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");
        let mut sigint =
            signal(SignalKind::interrupt()).expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
            _ = sigint.recv() => tracing::info!("Received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        tracing::info!("Received Ctrl+C");
    }
}
