//! vidtap: watches video-generation traffic in browser tabs and reports
//! outcomes back to the page, talking to the browser side over stdio.

mod bridge;
mod config;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use vidtap_engine::{Coordinator, CoordinatorConfig, VideoDownloader};
use vidtap_logging::tap_info;

use bridge::{serve_input, write_lines, StdioHost};

#[derive(Parser, Debug)]
#[command(name = "vidtap")]
#[command(about = "Tracks video generation jobs in browser tabs over a stdio bridge")]
#[command(version)]
struct Cli {
    /// Path to the RON config file
    #[arg(short, long, value_name = "FILE", default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load(&cli.config)?;
    logging::initialize(&config.log);
    tap_info!("vidtap starting with targets {:?}", config.targets);

    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_lines(tokio::io::stdout(), out_rx));

    let host = Arc::new(StdioHost::new(out_tx, config.bridge.call_timeout()));
    let downloader = Arc::new(
        VideoDownloader::new(config.download.settings()).context("building download client")?,
    );

    let coordinator = Coordinator::new(
        host.clone(),
        CoordinatorConfig {
            targets: config.targets.clone(),
            ..CoordinatorConfig::default()
        },
    );
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let coordinator = tokio::spawn(coordinator.run(event_rx));

    let served = serve_input(
        BufReader::new(tokio::io::stdin()),
        host.clone(),
        downloader,
        event_tx,
    )
    .await;

    // No replies can arrive after stdin closes.
    host.close();
    let state = coordinator.await.context("coordinator task")?;
    tap_info!("stopped with {} tracked tabs", state.tracked_tabs().len());

    drop(host);
    writer.await.context("stdout writer task")??;
    served?;
    Ok(())
}
