use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use m3u_curator::{
    config::Config,
    errors::CuratorError,
    playlist::{decode_playlist, PlaylistParser, PlaylistWriter},
    probe::ProbeOrchestrator,
    ranking::SelectionRankingEngine,
};

#[derive(Parser)]
#[command(name = "m3u-curator")]
#[command(version = "0.1.0")]
#[command(about = "Probes every stream in an M3U playlist and writes a curated copy")]
#[command(long_about = None)]
struct Cli {
    /// Input M3U playlist
    input: PathBuf,

    /// Output playlist path
    #[arg(short, long, default_value = "output.m3u")]
    output: PathBuf,

    /// Number of concurrent probe workers
    #[arg(short, long, value_name = "N")]
    threads: Option<usize>,

    /// Throughput sample duration in seconds (0 disables sampling)
    #[arg(short, long, value_name = "SECS")]
    duration: Option<u64>,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("m3u_curator={}", cli.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(threads) = cli.threads {
        config.probe.concurrency = threads;
    }
    if let Some(duration) = cli.duration {
        config.probe.throughput_duration_secs = duration;
    }

    info!("Starting m3u-curator v{}", env!("CARGO_PKG_VERSION"));
    info!("Reading playlist from {}", cli.input.display());

    let bytes = std::fs::read(&cli.input)?;
    let content = decode_playlist(&bytes, &cli.input)?;
    let mut playlist = PlaylistParser::new().parse(&content);
    if playlist.channels.is_empty() {
        return Err(CuratorError::EmptyPlaylist { path: cli.input }.into());
    }
    let total_channels = playlist.channels.len();
    let total_urls = playlist.total_urls();
    info!("Parsed {total_channels} channels with {total_urls} URLs");

    let client = reqwest::Client::new();
    let orchestrator = ProbeOrchestrator::new(client, config.probe.clone()).await;
    orchestrator.run(&mut playlist).await;

    let reachable = playlist
        .channels
        .iter()
        .flat_map(|c| &c.probes)
        .filter(|p| p.reachable)
        .count();
    let valid = playlist
        .channels
        .iter()
        .flat_map(|c| &c.probes)
        .filter(|p| p.is_valid())
        .count();
    info!("Probed {total_urls} URLs: {reachable} reachable, {valid} kept by quality");

    let engine = SelectionRankingEngine::new(&config.selection);
    engine.apply(&mut playlist);

    PlaylistWriter::write_file(&playlist, &cli.output)?;
    info!(
        "Wrote {} channels ({} URLs) to {}",
        playlist.channels.len(),
        playlist.total_urls(),
        cli.output.display()
    );

    Ok(())
}
