//! Command-line interface.

use crate::telemetry::OutputFormat;
use capture_core::CaptureConfig;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "rust_capture")]
#[command(about = "Interrupt-driven frame capture with ROI classification", long_about = None)]
pub struct Cli {
    /// Configuration file (TOML); `RUST_CAPTURE_*` variables override it
    #[arg(short, long, global = true, default_value = "config/capture.toml")]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error); `RUST_LOG` takes precedence
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one capture session against the simulated grabber
    Run(RunArgs),

    /// Load and validate the configuration, then print it
    Check,
}

/// Per-run overrides applied on top of the loaded configuration.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Session length in seconds
    #[arg(long)]
    pub duration_secs: Option<u64>,

    /// Stop after this many decoded frames
    #[arg(long)]
    pub frame_limit: Option<u64>,

    /// Directory for the session log
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Directory for the raw video
    #[arg(long)]
    pub video_dir: Option<PathBuf>,

    /// Record raw video (off unless enabled here or in the configuration)
    #[arg(long, conflicts_with = "no_record")]
    pub record: bool,

    /// Skip video recording even if the configuration enables it
    #[arg(long)]
    pub no_record: bool,

    /// Simulated camera frame rate
    #[arg(long)]
    pub camera_fps: Option<u32>,
}

impl RunArgs {
    /// Apply the overrides in place.
    pub fn apply(&self, config: &mut CaptureConfig) {
        if let Some(secs) = self.duration_secs {
            config.acquisition.duration = Duration::from_secs(secs);
        }
        if self.frame_limit.is_some() {
            config.acquisition.frame_limit = self.frame_limit;
        }
        if let Some(dir) = &self.log_dir {
            config.session_log.output_dir = dir.clone();
        }
        if let Some(dir) = &self.video_dir {
            config.recording.output_dir = dir.clone();
        }
        if self.record {
            config.recording.enabled = true;
        }
        if self.no_record {
            config.recording.enabled = false;
        }
        if let Some(fps) = self.camera_fps {
            config.source.camera_fps = fps;
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

impl From<LogFormat> for OutputFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Pretty => OutputFormat::Pretty,
            LogFormat::Compact => OutputFormat::Compact,
            LogFormat::Json => OutputFormat::Json,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_overrides() {
        let cli = Cli::parse_from([
            "rust_capture",
            "--log-format",
            "json",
            "run",
            "--duration-secs",
            "5",
            "--frame-limit",
            "100",
            "--no-record",
        ]);
        assert_eq!(cli.log_format, LogFormat::Json);

        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        let mut config = CaptureConfig::default();
        args.apply(&mut config);

        assert_eq!(config.acquisition.duration, Duration::from_secs(5));
        assert_eq!(config.acquisition.frame_limit, Some(100));
        assert!(!config.recording.enabled);
        assert_eq!(config.source.camera_fps, CaptureConfig::default().source.camera_fps);
    }

    #[test]
    fn test_record_flag_enables_recording() {
        let cli = Cli::parse_from(["rust_capture", "run", "--record"]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        let mut config = CaptureConfig::default();
        assert!(!config.recording.enabled);
        args.apply(&mut config);
        assert!(config.recording.enabled);

        assert!(Cli::try_parse_from(["rust_capture", "run", "--record", "--no-record"]).is_err());
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::parse_from(["rust_capture", "check", "--config", "lab.toml"]);
        assert_eq!(cli.config, PathBuf::from("lab.toml"));
        assert!(matches!(cli.command, Commands::Check));
    }
}
