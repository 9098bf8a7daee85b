//! Relay an HTTP media stream through ffmpeg to stdout as MPEG-TS.

use anyhow::Result;
use clap::Parser;

use mythtv_setup::cli;
use mythtv_setup::relay::{self, Quality, RelayOptions};

#[derive(Debug, Parser)]
#[command(name = "mythtv-stream", version, about = "Pipe a stream to stdout as MPEG-TS")]
struct Cli {
    /// Stream URL, direct media or an HLS playlist
    #[arg(long, value_name = "url")]
    url: String,

    /// HLS variant to pick from a master playlist
    #[arg(long, value_name = "best|worst", default_value = "best")]
    quality: Quality,

    /// Suppress progress messages
    #[arg(long)]
    quiet: bool,

    /// Turn on debug messages
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli::init_logging(cli.quiet, cli.debug);

    let options = RelayOptions {
        url: cli.url,
        quality: cli.quality,
        quiet: cli.quiet,
    };
    relay::run(&options).await
}
