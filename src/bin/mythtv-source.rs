//! Configure video sources, capture cards and card inputs.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use mythtv_setup::capture::{self, CaptureCardRequest, CardInputRequest};
use mythtv_setup::channels::{self, VideoSourceRequest};
use mythtv_setup::cli::BackendArgs;
use mythtv_setup::client::BackendClient;
use mythtv_setup::display;

#[derive(Debug, Parser)]
#[command(name = "mythtv-source", version, about = "Input configuration")]
struct Cli {
    #[command(flatten)]
    backend: BackendArgs,

    /// List configured video sources
    #[arg(long)]
    sources: bool,

    /// List configured channels for sourceid
    #[arg(long, value_name = "sourceid")]
    channels: Option<String>,

    /// Remove all channels for sourceid
    #[arg(long, value_name = "sourceid")]
    del_channels: Option<String>,

    /// List configured capture inputs
    #[arg(long)]
    inputs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Video source options
    Source(SourceArgs),
    /// Capture card options
    Card(CardArgs),
    /// Card input options
    Input(InputArgs),
}

#[derive(Debug, Args)]
struct SourceArgs {
    /// Name of this channel guide source
    #[arg(long, value_name = "source name")]
    name: Option<String>,

    /// Channel frequency table
    #[arg(long, value_name = "frequencytable", default_value = "default")]
    frequency: String,

    /// Source of guide information [schedulesdirect, XMLTV command, None]
    #[arg(long, value_name = "grabber")]
    grabber: Option<String>,

    /// User ID needed to access grabber data
    #[arg(long, value_name = "User Id", default_value = "")]
    userid: String,

    /// Password needed to access grabber data
    #[arg(long, value_name = "password", default_value = "")]
    password: String,

    /// Use EIT to collect guide information
    #[arg(long)]
    eit: bool,

    /// Remove the source with this sourceid
    #[arg(long, value_name = "sourceid")]
    remove: Option<String>,
}

#[derive(Debug, Args)]
struct CardArgs {
    /// Card type, e.g. EXTERNAL, HDHOMERUN, DVB_T2
    #[arg(long = "type", value_name = "type")]
    card_type: String,

    /// Device path, device string, IP or URL addressing the device
    #[arg(long, value_name = "device path")]
    device: String,

    /// Enable EIT scan on this input
    #[arg(long)]
    eit: bool,

    /// Only open the capture device when recording or scanning
    #[arg(long, value_name = "bool", default_value_t = true, action = clap::ArgAction::Set)]
    ondemand: bool,

    /// Milliseconds to wait for signal after tuning
    #[arg(long, value_name = "signaltimeout", default_value_t = 2000)]
    signaltimeout: i64,

    /// Milliseconds to wait for the channel after signal
    #[arg(long, value_name = "channeltimeout", default_value_t = 20000)]
    channeltimeout: i64,

    /// Tuning delay in milliseconds for quirky devices
    #[arg(long, value_name = "dvbtuningdelay", default_value_t = 0)]
    dvbtuningdelay: i64,

    /// Cross reference with a DiSEqC tree
    #[arg(long, value_name = "diseqcid")]
    diseqcid: Option<i64>,
}

#[derive(Debug, Args)]
struct InputArgs {
    /// Card ID this input is connected to
    #[arg(long, value_name = "cardid")]
    cardid: String,

    /// Source ID
    #[arg(long, value_name = "sourceid")]
    sourceid: String,

    /// Input type (Component, MPEG2TS, Television, etc.)
    #[arg(long, value_name = "inputtype", default_value = "MPEG2TS")]
    inputtype: String,

    /// Short pretty name of the input
    #[arg(long, value_name = "displayname")]
    name: String,

    /// External command used to change channels
    #[arg(long, value_name = "externalcommand")]
    externalchannelcommand: Option<String>,

    /// Tuned channel for coaxial inputs (3 or 4)
    #[arg(long, value_name = "tunechan")]
    tunechan: Option<String>,

    /// Channel to tune on backend start
    #[arg(long, value_name = "startchan")]
    startchan: Option<String>,

    /// Recording priority for this input
    #[arg(long, value_name = "priority", default_value_t = 0)]
    priority: i64,

    /// Quick tuning: 0 = never, 1 = Live TV only, 2 = always
    #[arg(long, value_name = "quicktune", default_value_t = 2)]
    quicktune: i64,
}

async fn manage_source(client: &BackendClient, args: SourceArgs) -> Result<()> {
    if let Some(sourceid) = &args.remove {
        return channels::remove_video_source(client, sourceid).await;
    }

    let name = args
        .name
        .ok_or_else(|| anyhow::anyhow!("--name is required to add a source"))?;
    let grabber = args
        .grabber
        .ok_or_else(|| anyhow::anyhow!("--grabber is required to add a source"))?;
    let req = VideoSourceRequest {
        name,
        grabber,
        freq_table: args.frequency,
        userid: args.userid,
        password: args.password,
        use_eit: args.eit,
    };
    channels::add_video_source(client, &req).await?;
    Ok(())
}

async fn add_card(client: &BackendClient, host: &str, args: CardArgs) -> Result<()> {
    let req = CaptureCardRequest {
        card_type: args.card_type,
        video_device: args.device,
        host_name: host.to_owned(),
        on_demand: args.ondemand,
        signal_timeout: args.signaltimeout,
        channel_timeout: args.channeltimeout,
        dvb_tuning_delay: args.dvbtuningdelay,
        diseqc_id: args.diseqcid,
        eit_scan: args.eit,
    };
    capture::add_capture_card(client, &req).await?;
    Ok(())
}

async fn add_input(client: &BackendClient, host: &str, args: InputArgs) -> Result<()> {
    let req = CardInputRequest {
        card_id: args.cardid,
        source_id: args.sourceid,
        host_name: host.to_owned(),
        input_type: args.inputtype,
        display_name: args.name,
        external_command: args.externalchannelcommand,
        tune_chan: args.tunechan,
        start_chan: args.startchan,
        rec_priority: args.priority,
        quick_tune: args.quicktune,
    };
    capture::add_card_input(client, &req).await?;
    Ok(())
}

async fn listings(client: &BackendClient, cli: &Cli) -> Result<()> {
    if cli.sources {
        for source in channels::get_video_sources(client).await? {
            println!("{}", display::source_line(&source));
        }
    } else if let Some(sourceid) = &cli.channels {
        for channel in channels::get_channels(client, sourceid).await? {
            println!("{}", display::channel_line(&channel));
        }
    } else if let Some(sourceid) = &cli.del_channels {
        channels::remove_channels(client, sourceid).await?;
    } else if cli.inputs {
        for line in display::capture_card_lines(&capture::get_capture_cards(client).await?) {
            println!("{line}");
        }
    } else {
        anyhow::bail!("an operation must be specified");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.backend.init_logging();

    let client = cli.backend.connect().await?;

    match cli.command {
        Some(Command::Source(args)) => manage_source(&client, args).await,
        Some(Command::Card(args)) => add_card(&client, &cli.backend.host, args).await,
        Some(Command::Input(args)) => add_input(&client, &cli.backend.host, args).await,
        None => listings(&client, &cli).await,
    }
}
