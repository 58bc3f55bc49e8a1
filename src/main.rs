//! # Paddock Jobs — automation job runner
//!
//! Thin CLI over the two background engines. An external scheduler (cron,
//! systemd timer, the platform's task trigger) invokes one job per run:
//!
//!   paddock-jobs materialize        # daily: expand recurring definitions
//!   paddock-jobs process-queue      # drain due notification queue items
//!   paddock-jobs retry-sweep        # hourly: requeue retryable failures
//!   paddock-jobs cleanup-sweep      # daily: purge + archive old documents

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use paddock_channels::{ChannelSender, EmailSender, InAppSender, PushSender, TelegramSender};
use paddock_core::clock::SystemClock;
use paddock_core::config::PaddockConfig;
use paddock_core::model::Channel;
use paddock_core::store::DocumentStore;
use paddock_delivery::{ChannelDispatcher, MaintenanceSweep, QueueProcessor, RateLimiter};
use paddock_recurrence::Materializer;
use paddock_store::SqliteStore;

#[derive(Parser)]
#[command(name = "paddock-jobs", version, about = "🐴 Paddock — scheduled automation jobs")]
struct Cli {
    /// Config file (defaults to ~/.paddock/config.toml)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    job: Job,
}

#[derive(Subcommand)]
enum Job {
    /// Expand recurring definitions into dated activity instances
    Materialize,
    /// Drain due pending notification queue items
    ProcessQueue,
    /// Requeue retryable delivery failures, discard exhausted ones
    RetrySweep,
    /// Purge old queue items and archive old read notifications
    CleanupSweep,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "paddock=debug" } else { "paddock=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => PaddockConfig::load_from(path)?,
        None => PaddockConfig::load()?,
    };

    let store: Arc<dyn DocumentStore> =
        Arc::new(SqliteStore::open(&config.store.resolved_db_path())?);
    let clock = Arc::new(SystemClock);

    match cli.job {
        Job::Materialize => {
            let engine = Materializer::new(store, clock, &config.materializer);
            let report = engine.run().await?;
            if report.failed_definitions > 0 {
                tracing::warn!("{} definition(s) failed this sweep", report.failed_definitions);
            }
        }
        Job::ProcessQueue => {
            let dispatcher = ChannelDispatcher::new(
                store.clone(),
                build_senders(&config),
                Duration::from_secs(config.delivery.send_timeout_secs),
            );
            let limiter =
                Arc::new(RateLimiter::new(clock.clone(), config.delivery.rate_limits.clone()));
            let processor = QueueProcessor::new(
                store,
                clock,
                limiter,
                dispatcher,
                config.delivery.worker_concurrency,
            );
            processor.process_due().await?;
        }
        Job::RetrySweep => {
            MaintenanceSweep::new(store, clock, &config.delivery).retry_sweep().await?;
        }
        Job::CleanupSweep => {
            MaintenanceSweep::new(store, clock, &config.delivery).cleanup_sweep().await?;
        }
    }

    Ok(())
}

/// Wire up one sender per configured channel. In-app is always available —
/// its delivery is the notification document itself.
fn build_senders(config: &PaddockConfig) -> HashMap<Channel, Arc<dyn ChannelSender>> {
    let mut senders: HashMap<Channel, Arc<dyn ChannelSender>> = HashMap::new();
    senders.insert(Channel::InApp, Arc::new(InAppSender::new()));

    if let Some(email) = &config.email
        && email.enabled
    {
        senders.insert(Channel::Email, Arc::new(EmailSender::new(email.clone())));
    }
    if let Some(telegram) = &config.telegram
        && telegram.enabled
        && !telegram.bot_token.is_empty()
    {
        senders.insert(Channel::Telegram, Arc::new(TelegramSender::new(telegram.clone())));
    }
    if let Some(push) = &config.push
        && push.enabled
        && !push.gateway_url.is_empty()
    {
        senders.insert(Channel::Push, Arc::new(PushSender::new(push.clone())));
    }

    senders
}
