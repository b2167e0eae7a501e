//! skiff-replay: feed a packet trace through the dispatcher.
//!
//! ```text
//! skiff-replay <trace.toml>                  Replay a trace
//! skiff-replay --config <path> <trace.toml>  Use a custom config TOML
//! skiff-replay --gen-config                  Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use skiff_replay::config::ReplayConfig;
use skiff_replay::trace::{self, Trace};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "skiff-replay", about = "Replay decrypted SSH messages through the skiff dispatcher")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "skiff-replay.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Trace file to replay.
    #[arg(required_unless_present = "gen_config")]
    trace: Option<PathBuf>,
}

// ── Main ─────────────────────────────────────────────────────────

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ReplayConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let config = ReplayConfig::load(&cli.config);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("skiff-replay v{}", env!("CARGO_PKG_VERSION"));

    let Some(path) = cli.trace else {
        return Err("no trace file given".into());
    };
    let trace = Trace::load(&path)?;
    info!(
        packets = trace.packet.len(),
        channels = trace.channel.len(),
        listeners = trace.listener.len(),
        "replaying {}",
        path.display()
    );

    let report = trace::run(&trace, config.session)?;
    println!(
        "dispatched {} / rejected {} / replies {} / retries {} / queued {}{}",
        report.dispatched.len(),
        report.rejected,
        report.replies,
        report.retries,
        report.queued.len(),
        if report.disconnected { " / disconnected" } else { "" }
    );
    Ok(())
}
