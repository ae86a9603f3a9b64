use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use co_scientist::agent::{BootstrapExit, EchoCapabilities, Supervisor};
use co_scientist::config::SchedulerConfig;
use co_scientist::hypothesis::ResearchState;
use co_scientist::ranking::RankingEngine;
use co_scientist::worker::checkpoint::drain_delay;
use co_scientist::worker::{CheckpointSink, FileSink, TaskManager, WorkerPool, spawn_checkpoint_writer};

const DEFAULT_GOAL: &str = "Identify repurposable drugs for acute myeloid leukemia";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = SchedulerConfig::from_env().context("Invalid configuration")?;
    let _log_guard = init_tracing(&config);

    let goal = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_GOAL.to_string());

    eprintln!("🔬 Co-Scientist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Goal: {}", goal);
    eprintln!("   Workers: {}", config.worker_count);
    eprintln!("   Checkpoint: {}", config.checkpoint_path.display());
    eprintln!("   Press Ctrl-C to stop.\n");

    // ── Shared state ─────────────────────────────────────────────────────
    let state = ResearchState::new(goal);
    let manager = TaskManager::new();
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, shutting down");
                cancel.cancel();
            }
        });
    }

    // ── Workers and checkpointing ────────────────────────────────────────
    let pool = WorkerPool::spawn(
        Arc::clone(&manager),
        config.worker_count,
        config.action_timeout,
        cancel.child_token(),
    );
    let sink: Arc<dyn CheckpointSink> = Arc::new(FileSink::new(&config.checkpoint_path));
    let checkpoint = spawn_checkpoint_writer(
        Arc::clone(&manager),
        sink,
        config.checkpoint_interval,
        cancel.child_token(),
    );

    // ── Bootstrap, then one tournament round ─────────────────────────────
    let capabilities = Arc::new(EchoCapabilities);
    let supervisor = Supervisor::new(
        Arc::clone(&state),
        Arc::clone(&manager),
        capabilities.clone(),
        capabilities.clone(),
        &config,
    );

    if let BootstrapExit::Completed { reviewed } = supervisor.run_bootstrap(cancel.clone()).await {
        let engine =
            RankingEngine::new(Arc::clone(&state), config.ranking()).with_k_factor(config.elo_k_factor);
        let scheduled = engine.enqueue_round(&manager, capabilities.clone()).await;
        info!(reviewed, scheduled, "Tournament round queued");

        tokio::select! {
            _ = manager.wait_idle() => {}
            _ = cancel.cancelled() => {}
        }
    }

    // One more checkpoint tick captures the terminal state.
    tokio::select! {
        _ = tokio::time::sleep(drain_delay(config.checkpoint_interval)) => {}
        _ = cancel.cancelled() => {}
    }

    cancel.cancel();
    pool.shutdown().await;
    checkpoint.await.context("Checkpoint writer panicked")?;

    report(&state).await?;
    Ok(())
}

/// Stderr logging filtered by `RUST_LOG` (default `info`), plus a daily
/// rotated file when a log directory is configured.
fn init_tracing(config: &SchedulerConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "co-scientist.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}

/// Print the ranked population and finalize the leader.
async fn report(state: &ResearchState) -> anyhow::Result<()> {
    let mut ranked = Vec::new();
    for hypothesis in state.hypotheses().await {
        let guard = hypothesis.acquire().await;
        ranked.push(guard.view());
    }
    ranked.sort_by(|a, b| b.rating.total_cmp(&a.rating));

    eprintln!("\nRanking:");
    for view in &ranked {
        eprintln!("  {:>7.1}  {}  {}", view.rating, view.id, view.content);
    }

    if let Some(leader) = ranked.first() {
        state
            .finalize(&leader.id, leader.content.clone())
            .await
            .with_context(|| format!("Failed to finalize {}", leader.id))?;
        eprintln!("\nFinalized {}", leader.id);
    }
    Ok(())
}
