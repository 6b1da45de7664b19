use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use unattended::{Config, OutputSink, PassthroughSink};

/// Unattended auto-updater and process supervisor.
#[derive(Parser)]
#[command(name = "unattended", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "/etc/unattended/config.toml")]
    config: PathBuf,

    /// Run a single update-check tick and exit instead of supervising
    /// the target.
    #[arg(long)]
    once: bool,

    /// Increase log verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match Config::from_toml_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: failed to load config: {e}");
            std::process::exit(1);
        }
    };

    if cli.once {
        run_once(&config).await;
        return;
    }

    let sink: Arc<dyn OutputSink> = Arc::new(PassthroughSink);
    if let Err(e) = unattended::run(config, sink).await {
        eprintln!("FATAL: supervisor exited with error: {e}");
        std::process::exit(1);
    }
}

async fn run_once(config: &Config) {
    match unattended::apply_updates_once(config).await {
        Ok(installed) => {
            tracing::info!(installed, "one-shot update tick complete");
        }
        Err(e) => {
            eprintln!("FATAL: update tick failed: {e}");
            std::process::exit(1);
        }
    }
}

fn init_tracing(verbosity: u8) {
    let default_filter = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();
}
