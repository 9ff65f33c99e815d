mod capture;
mod channel;
mod config;
mod data_dir;
mod detector;
mod monitor;
mod notifier;
mod signals;
mod status;

use capture::CaptureInvoker;
use clap::Parser;
use config::{ConfigError, LoadOutcome, RecorderConfig};
use data_dir::DataDir;
use detector::browser::ChromeProbe;
use detector::{LiveDetector, PageLiveDetector};
use monitor::Monitor;
use notifier::DiscordNotifier;
use status::{StatusFile, StatusTracker};
use std::path::PathBuf;
use std::process::ExitCode;

/// Watch a Kick channel, post a Discord alert when it goes live, and record
/// the stream with an external capture tool.
#[derive(Parser, Debug)]
#[command(name = "kick-recorder", version, about)]
pub struct Cli {
    /// Config file path (a template is written here if missing)
    #[arg(short, long, default_value = "recorder.toml")]
    config: PathBuf,

    /// Directory holding media/ and the status file
    #[arg(short, long, default_value = ".")]
    data_dir: PathBuf,

    /// Channel to monitor (overrides config)
    #[arg(long)]
    channel: Option<String>,

    /// Seconds between checks (overrides config)
    #[arg(long)]
    interval: Option<u64>,

    /// Validate config and print resolved settings, don't run
    #[arg(long)]
    dry_run: bool,

    /// Check the channel once, print live/offline and exit
    #[arg(long)]
    once: bool,

    /// Print the status of a running recorder and exit
    #[arg(long)]
    status: bool,

    /// Debug logging (detection signals, page timings)
    #[arg(short, long)]
    verbose: bool,

    /// Only warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with_target(false)
        .init();

    tracing::debug!(?cli, "parsed CLI arguments");

    let data_dir = DataDir::new(cli.data_dir.clone());

    if cli.status {
        return print_status(&data_dir);
    }

    let config = match load_config(&cli) {
        Ok(Some(config)) => config,
        Ok(None) => return ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "configuration error");
            eprintln!("Error: {e}");
            return ExitCode::from(e.exit_code());
        }
    };
    // Validated above, so both of these succeed.
    let Ok(channel) = config.channel() else {
        return ExitCode::FAILURE;
    };
    let heuristic = match config.heuristic.compile() {
        Ok(h) => h,
        Err(e) => {
            eprintln!("Error: invalid [heuristic] table: {e}");
            return ExitCode::FAILURE;
        }
    };

    if cli.dry_run {
        print_settings(&config, &channel, &data_dir);
        return ExitCode::SUCCESS;
    }

    match data_dir.init() {
        Ok(true) => {
            tracing::info!(path = %data_dir.media_dir().display(), "created media directory")
        }
        Ok(false) => {}
        Err(e) => {
            tracing::error!(
                path = %data_dir.media_dir().display(),
                error = %e,
                "cannot create media directory"
            );
            return ExitCode::FAILURE;
        }
    }

    let detector = PageLiveDetector::new(
        ChromeProbe::new(&config.detector),
        heuristic,
        config.host.clone(),
    );

    if cli.once {
        return match detector.detect(&channel).await {
            Ok(status) => {
                println!("{channel}: {status}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                tracing::error!(error = %e, "detection failed");
                ExitCode::FAILURE
            }
        };
    }

    let shutdown = match signals::install() {
        Ok(shutdown) => shutdown,
        Err(e) => {
            tracing::error!(error = %e, "cannot install signal handlers");
            return ExitCode::FAILURE;
        }
    };

    let notifier = DiscordNotifier::new(
        &config.discord,
        config.recorder_name.clone(),
        config.host.clone(),
    );
    let recorder = CaptureInvoker::new(
        &config.capture,
        data_dir.media_dir(),
        config.host.clone(),
    );
    let tracker = StatusTracker::new(
        data_dir.status(),
        channel.as_str(),
        &config.recorder_name,
    );

    tracing::info!(
        channel = %channel,
        data_dir = %data_dir.root().display(),
        recorder = %config.recorder_name,
        interval_secs = config.check_interval_secs,
        media_dir = %data_dir.media_dir().display(),
        discord = config.discord.enabled,
        capture = %config.capture.command,
        heuristic_version = config.heuristic.version,
        "kick-recorder starting"
    );

    let mut monitor = Monitor::new(
        channel,
        config.check_interval(),
        detector,
        notifier,
        recorder,
        shutdown,
    )
    .with_status(tracker);
    monitor.run().await;
    let stats = monitor.stats();

    StatusFile::new(data_dir.status()).remove();
    tracing::info!(
        checks = stats.checks,
        recordings_completed = stats.recordings_completed,
        recordings_failed = stats.recordings_failed,
        "kick-recorder stopped"
    );
    ExitCode::SUCCESS
}

/// Load the config, apply CLI overrides and validate.
///
/// Returns `Ok(None)` when a fresh template was written and the user needs to edit it.
fn load_config(cli: &Cli) -> Result<Option<RecorderConfig>, ConfigError> {
    let mut config = match config::load_or_create(&cli.config)? {
        LoadOutcome::Loaded(config) => *config,
        LoadOutcome::Created(path) => {
            tracing::info!(path = %path.display(), "wrote default config");
            println!("Created default config at {}", path.display());
            println!("Edit it to set 'channel' and 'recorder_name', then run again.");
            return Ok(None);
        }
    };

    if let Some(channel) = &cli.channel {
        config.channel = channel.clone();
    }
    if let Some(interval) = cli.interval {
        config.check_interval_secs = interval;
    }
    config.validate()?;
    Ok(Some(config))
}

fn print_settings(config: &RecorderConfig, channel: &channel::Channel, data_dir: &DataDir) {
    println!("kick-recorder v{}", env!("CARGO_PKG_VERSION"));
    println!("  channel:          {channel}");
    println!("  recorder name:    {}", config.recorder_name);
    println!("  check interval:   {}s", config.check_interval_secs);
    println!("  page:             {}", channel.page_url(&config.host));
    println!("  media dir:        {}", data_dir.media_dir().display());
    println!("  status file:      {}", data_dir.status().display());
    println!(
        "  capture:          {} {}",
        config.capture.command,
        config.capture.args.join(" ")
    );
    println!(
        "  discord:          {}",
        if config.discord.enabled { "enabled" } else { "disabled" }
    );
    println!(
        "  page timeout:     {}s (settle {}s)",
        config.detector.navigation_timeout_secs, config.detector.settle_delay_secs
    );
    println!("  heuristic:        v{}", config.heuristic.version);
    println!("Dry run: config is valid, not running.");
}

fn print_status(data_dir: &DataDir) -> ExitCode {
    let path = data_dir.status();
    match status::read(&path) {
        Ok(value) => {
            match serde_json::to_string_pretty(&value) {
                Ok(text) => println!("{text}"),
                Err(_) => println!("{value}"),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("No running recorder found ({e})");
            ExitCode::FAILURE
        }
    }
}
