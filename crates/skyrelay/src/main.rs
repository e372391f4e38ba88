//! SkyRelay launcher
//!
//! - `run`: poll the watched root until SIGINT/SIGTERM
//! - `once`: a single scan cycle, handy from cron or for testing a config
//! - `convert`: render one FITS file to JPEG without touching the chat

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use skyrelay::config::default_config_path;
use skyrelay::{
    CancellationToken, CycleReport, PreviewRenderer, Relay, RelayConfig, TelegramNotifier,
};
use skyrelay_logging::{init_logging, LogConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "skyrelay", about = "Relay new astro frames from an imaging share to Telegram")]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Config file (default: ~/.skyrelay/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory the imaging rig writes to
    #[arg(long, global = true, env = "SKYRELAY_WATCHED_ROOT")]
    watched_root: Option<PathBuf>,

    /// Archive directory mirroring the watched root
    #[arg(long, global = true, env = "SKYRELAY_DEST_ROOT")]
    dest_root: Option<PathBuf>,

    /// Telegram bot token
    #[arg(long, global = true, env = "SKYRELAY_BOT_TOKEN", hide_env_values = true)]
    bot_token: Option<String>,

    /// Telegram chat id
    #[arg(long, global = true, env = "SKYRELAY_CHAT_ID")]
    chat_id: Option<String>,

    /// Seconds between scans
    #[arg(long, global = true, env = "SKYRELAY_INTERVAL_SECS")]
    interval_secs: Option<u64>,

    /// Directory for log files (default: ~/.skyrelay/logs)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Poll the watched root until interrupted
    Run,

    /// Run a single scan cycle and exit
    Once {
        /// Print the cycle report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Convert one FITS file to a JPEG preview
    Convert {
        /// FITS file to convert
        file: PathBuf,

        /// Output path (default: scratch directory)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match init_logging(LogConfig {
        app_name: "skyrelay",
        verbose: cli.verbose,
        log_dir: cli.log_dir.clone(),
    }) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("Warning: failed to initialize logging: {:#}", err);
            None
        }
    };

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run_command(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Run => {
            let relay = build_relay(config)?;
            let cancel = CancellationToken::new();
            install_signal_handlers(&cancel)?;
            relay.run(&cancel);
            Ok(())
        }
        Commands::Once { json } => {
            let relay = build_relay(config)?;
            let report = relay
                .run_cycle(&CancellationToken::new())
                .context("Scan cycle failed")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", summarize(&report));
            }
            Ok(())
        }
        Commands::Convert { file, out } => {
            let renderer = PreviewRenderer::new(&config.scratch_dir, config.jpeg_quality);
            let preview = match out {
                Some(out) => renderer.render_to(&file, &out),
                None => renderer.render(&file),
            }
            .with_context(|| format!("Failed to convert {}", file.display()))?;
            println!("{}", preview.display());
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> Result<RelayConfig> {
    let mut config = match &cli.config {
        Some(path) => RelayConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => {
            let path = default_config_path();
            RelayConfig::load_or_default(&path)
                .with_context(|| format!("Failed to load config: {}", path.display()))?
        }
    };

    if let Some(root) = &cli.watched_root {
        config.watched_root = root.clone();
    }
    if let Some(dest) = &cli.dest_root {
        config.dest_root = dest.clone();
    }
    if let Some(token) = &cli.bot_token {
        config.bot_token = token.clone();
    }
    if let Some(chat_id) = &cli.chat_id {
        config.chat_id = chat_id.clone();
    }
    if let Some(interval) = cli.interval_secs {
        config.interval_secs = interval;
    }
    Ok(config)
}

fn build_relay(config: RelayConfig) -> Result<Relay<TelegramNotifier>> {
    config.validate(true).context("Invalid configuration")?;
    let notifier =
        TelegramNotifier::from_config(&config).context("Failed to build Telegram client")?;
    let relay = Relay::new(config, notifier);
    relay.prepare().context("Failed to create relay directories")?;
    Ok(relay)
}

fn install_signal_handlers(cancel: &CancellationToken) -> Result<()> {
    #[cfg(unix)]
    {
        use signal_hook::consts::{SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;

        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        let token = cancel.clone();
        std::thread::spawn(move || {
            if let Some(sig) = signals.forever().next() {
                info!("Received signal {}, shutting down...", sig);
                token.cancel();
            }
        });
    }

    #[cfg(windows)]
    {
        let token = cancel.clone();
        ctrlc::set_handler(move || {
            info!("Received Ctrl+C, shutting down...");
            token.cancel();
        })?;
    }

    Ok(())
}

fn summarize(report: &CycleReport) -> String {
    format!(
        "{} files seen, {} previews forwarded, {} converted, {} sent, {} archived, {} failures ({} ms)",
        report.files_seen,
        report.previews_forwarded,
        report.converted,
        report.previews_sent,
        report.archived,
        report.conversion_failed + report.notify_failed + report.archive_failed,
        report.duration_ms
    )
}
