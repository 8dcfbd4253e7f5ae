//! CLI entry point for rust-capture.
//!
//! Runs one acquisition session against the simulated frame grabber:
//!
//! ```bash
//! rust_capture run --duration-secs 10
//! rust_capture run --duration-secs 10 --record
//! rust_capture check --config config/capture.toml
//! ```
//!
//! Ctrl+C requests an orderly stop; the session log is still written and the
//! summary printed.

// Global allocator (Microsoft Rust Guidelines: M-MIMALLOC-APPS)
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod cli;
mod telemetry;

use anyhow::{Context, Result};
use capture_core::{
    run_session, AcquisitionContext, CaptureConfig, RawVideoSink, SessionReport, StopHandle,
};
use capture_driver_mock::{LedPattern, MockFrameSourceDriver, MockSourceConfig, ProducerMode};
use clap::Parser;
use cli::{Cli, Commands, RunArgs};
use std::path::Path;
use std::sync::Arc;
use telemetry::TracingConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = telemetry::parse_log_level(&cli.log_level).map_err(anyhow::Error::msg)?;
    telemetry::init(TracingConfig::new(level).with_format(cli.log_format.into()))
        .map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Run(args) => {
            let config = load_config(&cli.config, &args)?;
            let report = run_capture(config).await?;
            println!("{report}");
            if report.stop_reason.is_fatal() {
                anyhow::bail!("acquisition failed: {}", report.stop_reason);
            }
            Ok(())
        }
        Commands::Check => {
            let config = load_config(&cli.config, &RunArgs::default())?;
            println!("{config:#?}");
            println!("Configuration OK ({} log rows preallocated)", config.log_capacity());
            Ok(())
        }
    }
}

fn load_config(path: &Path, overrides: &RunArgs) -> Result<CaptureConfig> {
    let mut config = CaptureConfig::load_from(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    overrides.apply(&mut config);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Run one session on a blocking thread with Ctrl+C wired to the stop request.
async fn run_capture(config: CaptureConfig) -> Result<SessionReport> {
    let context = AcquisitionContext::new();
    let stop = StopHandle::new(Arc::clone(&context));

    let kill_switch = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Shutdown signal received, stopping acquisition");
            stop.request_stop();
        }
    });

    let driver = MockFrameSourceDriver::new(MockSourceConfig {
        mode: ProducerMode::FreeRunning,
        led: LedPattern {
            rect: config.roi.rect,
            ..Default::default()
        },
        ..Default::default()
    });

    let result = tokio::task::spawn_blocking(move || {
        run_session(&config, &driver, RawVideoSink::new(), context)
    })
    .await;
    kill_switch.abort();

    let report = result
        .context("acquisition task panicked")?
        .context("acquisition session failed")?;
    Ok(report)
}
