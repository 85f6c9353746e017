//! Condor Launcher
//!
//! A long-running service that turns job requests received over the message
//! bus into HTCondor submissions.
//!
//! Architecture:
//! - Configuration: YAML file loaded once at startup
//! - Condor: Subprocess wrappers around condor_submit, condor_rm and condor_q
//! - Services: Submission rendering, directory layout, launch orchestration
//! - Dispatch: Consumes launch and stop requests, publishes status updates
//! - Scheduler: Periodic removal of held jobs
//!
//! Each launch creates a per-job directory under the configured log path,
//! writes the submit file and job configs into it, submits, and reports the
//! resulting cluster id back on the updates topic.

mod condor;
mod config;
mod dispatch;
mod error;
mod scheduler;
mod service;
#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use clap::Parser;
use condor_bus::{ZmqBus, topics};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::condor::CondorClient;
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::scheduler::HeldJobReaper;
use crate::service::Launcher;

/// Launches HTCondor jobs from bus messages
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(
        short,
        long,
        env = "CONDOR_LAUNCHER_CONFIG",
        default_value = "/etc/condor-launcher/config.yml"
    )]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "condor_launcher=info,condor_bus=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting Condor Launcher");

    let config = Config::from_file(&args.config)?;
    config.validate()?;
    info!(
        "Loaded configuration from {}: log_path={}, broker={}",
        args.config.display(),
        config.condor.log_path.display(),
        config.broker.subscribe_endpoint
    );
    let config = Arc::new(config);

    let bus = Arc::new(
        ZmqBus::connect(
            &config.broker.subscribe_endpoint,
            &config.broker.publish_endpoint,
            &[topics::LAUNCHES, topics::STOPS],
        )
        .await
        .context("Failed to connect to the message broker")?,
    );

    let scheduler = Arc::new(CondorClient::new(&config.condor));
    let launcher = Arc::new(Launcher::new(Arc::clone(&config), scheduler));

    let reaper = HeldJobReaper::new(Arc::clone(&launcher), bus.clone()).spawn();

    let dispatcher = Dispatcher::new(
        launcher,
        bus.clone(),
        bus,
        config.condor.request_disk.clone(),
    );

    info!("Launcher initialized successfully");

    let result = tokio::select! {
        result = dispatcher.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            Ok(())
        }
    };

    reaper.abort();

    if let Err(e) = &result {
        error!("Dispatch loop error: {:#}", e);
    }

    info!("Condor Launcher stopped");
    result
}
