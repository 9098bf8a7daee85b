//! Manage recording rules on a MythTV backend.

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};

use mythtv_setup::channels::{self, ChannelKey};
use mythtv_setup::cli::BackendArgs;
use mythtv_setup::client::BackendClient;
use mythtv_setup::display;
use mythtv_setup::models::RecordType;
use mythtv_setup::rules;
use mythtv_setup::schedule::{self, ManualRuleRequest};

#[derive(Debug, Parser)]
#[command(name = "mythtv-record", version, about = "Add and remove recording rules")]
struct Cli {
    #[command(flatten)]
    backend: BackendArgs,

    /// List configured video sources
    #[arg(long)]
    sources: bool,

    /// List configured channels for sourceid
    #[arg(long, value_name = "sourceid")]
    channels: Option<String>,

    /// List recording rules
    #[arg(long)]
    rules: bool,

    /// List configured templates
    #[arg(long)]
    templates: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Add a recording rule
    Add(AddArgs),
    /// Remove a recording rule
    Remove(RemoveArgs),
    /// List scheduled recordings
    Upcoming(UpcomingArgs),
    /// Stop an in-progress recording
    Stop(RecordingIdArgs),
    /// Reactivate a stopped recording
    Reactivate(RecordingIdArgs),
}

#[derive(Debug, Args)]
struct ChannelArgs {
    /// Record on this channel Id
    #[arg(long, value_name = "chanid")]
    chanid: Option<String>,

    /// Record channel on this sourceid
    #[arg(long, value_name = "sourceid")]
    sourceid: Option<String>,

    /// Record on this channel number
    #[arg(long, value_name = "chan number")]
    channum: Option<String>,
}

impl ChannelArgs {
    fn key(&self) -> Result<ChannelKey> {
        if let Some(chanid) = &self.chanid {
            return Ok(ChannelKey::ChanId(chanid.clone()));
        }
        match (&self.sourceid, &self.channum) {
            (Some(sourceid), Some(channum)) => Ok(ChannelKey::SourceChanNum {
                sourceid: sourceid.clone(),
                channum: channum.clone(),
            }),
            _ => bail!("need --chanid, or --sourceid and --channum"),
        }
    }
}

#[derive(Debug, Args)]
struct AddArgs {
    /// Template name
    #[arg(long, value_name = "temp", default_value = "Default")]
    template: String,

    /// Full program name
    #[arg(long, value_name = "title")]
    title: String,

    /// Program subtitle
    #[arg(long, value_name = "subtitle")]
    subtitle: Option<String>,

    /// Program description
    #[arg(long, value_name = "description")]
    description: Option<String>,

    #[command(flatten)]
    channel: ChannelArgs,

    /// Create a manual record rule
    #[arg(long)]
    manual: bool,

    /// Start datetime in ISO format, e.g. "2018-08-05T05:00:00"
    #[arg(long, value_name = "datetime")]
    starttime: Option<String>,

    /// Manual record duration in minutes
    #[arg(long, value_name = "duration", default_value_t = 60)]
    duration: i64,

    /// Season number
    #[arg(long, value_name = "season")]
    season: Option<u32>,

    /// Episode number
    #[arg(long, value_name = "episode")]
    episode: Option<u32>,

    /// Record type [All, Daily, One, Single, Weekly]
    #[arg(long = "type", value_name = "type")]
    rtype: RecordType,
}

#[derive(Debug, Args)]
struct RemoveArgs {
    /// Full program name, no wild cards
    #[arg(long, value_name = "title")]
    title: Option<String>,

    /// Rule Id
    #[arg(long, value_name = "recordid")]
    recordid: Option<String>,

    #[command(flatten)]
    channel: ChannelArgs,

    /// Remove a manual record rule
    #[arg(long)]
    manual: bool,

    /// Start datetime in ISO format
    #[arg(long, value_name = "datetime")]
    starttime: Option<String>,

    /// Record type [All, Daily, One, Single, Weekly]
    #[arg(long = "type", value_name = "type")]
    rtype: Option<RecordType>,
}

#[derive(Debug, Args)]
struct UpcomingArgs {
    /// Filter on chanid, e.g. 1091
    #[arg(long, value_name = "chanid")]
    chanid: Option<String>,

    /// Days of programs to print
    #[arg(long, value_name = "days", default_value_t = 7)]
    days: i64,

    /// Include conflicts etc.
    #[arg(long)]
    all: bool,

    /// Show only currently recording
    #[arg(long)]
    current: bool,

    /// Filter by title
    #[arg(long, value_name = "title")]
    title: Option<String>,
}

#[derive(Debug, Args)]
struct RecordingIdArgs {
    /// Recording with this id
    #[arg(long, value_name = "recordid")]
    recordid: Option<i64>,

    /// Channel Id of the recording
    #[arg(long, value_name = "chanid")]
    chanid: Option<String>,

    /// Start datetime in ISO format
    #[arg(long, value_name = "datetime")]
    starttime: Option<String>,
}

impl RecordingIdArgs {
    async fn resolve(&self, client: &BackendClient) -> Result<i64> {
        if let Some(id) = self.recordid {
            return Ok(id);
        }
        match (&self.chanid, &self.starttime) {
            (Some(chanid), Some(starttime)) => {
                match rules::recorded_id_for_key(client, chanid, starttime).await? {
                    Some(id) => Ok(id),
                    None => bail!("no recording for chanid {chanid} at {starttime}"),
                }
            }
            _ => bail!("need --recordid, or --chanid and --starttime"),
        }
    }
}

async fn add(client: &BackendClient, args: AddArgs) -> Result<()> {
    if args.manual {
        let req = ManualRuleRequest {
            template: args.template,
            channel: args.channel.key()?,
            starttime: args.starttime,
            duration_min: args.duration,
            title: args.title,
            subtitle: args.subtitle,
            description: args.description,
            season: args.season.map(|s| s.to_string()),
            episode: args.episode.map(|e| e.to_string()),
            rtype: args.rtype,
        };
        return schedule::record_manual(client, &req).await;
    }

    if rules::schedule_already_exists(client, &args.title).await? {
        bail!("rule for {:?} already exists", args.title);
    }
    rules::record_title(client, &args.template, &args.title, args.rtype).await?;
    Ok(())
}

async fn remove(client: &BackendClient, args: RemoveArgs) -> Result<()> {
    if args.manual {
        let rtype = args.rtype.unwrap_or(RecordType::Single);
        return schedule::remove_manual(
            client,
            &args.channel.key()?,
            args.starttime.as_deref(),
            rtype,
        )
        .await;
    }
    if let Some(recordid) = &args.recordid {
        return rules::remove_record_ruleid(client, recordid).await;
    }
    if let Some(title) = &args.title {
        return rules::remove_record_title(client, title).await;
    }
    bail!("could not figure out which recording rule to remove");
}

async fn upcoming(client: &BackendClient, args: UpcomingArgs) -> Result<()> {
    let list = rules::get_upcoming(client, args.all).await?;
    let count: usize = list.total_available.parse().unwrap_or_default();
    if count < 1 {
        println!("\nNo upcoming recordings found.");
        return Ok(());
    }

    let filter = display::UpcomingFilter {
        days: args.days,
        title: args.title,
        chanid: args.chanid,
        current_only: args.current,
    };
    let (lines, matched) =
        display::upcoming_report(&list.programs, &filter, chrono::Utc::now())?;

    println!(
        "\nPrinting {} days of upcoming programs sorted by StartTime\n",
        args.days
    );
    for line in lines {
        println!("{line}");
    }
    if args.current {
        println!("\n  Total Currently Recording Programs: {matched}");
    } else {
        println!("\n  Total Upcoming Programs: {matched}");
    }
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
    } else if cli.rules {
        for line in display::rule_lines(&rules::get_recording_rules(client).await?) {
            println!("{line}");
        }
    } else if cli.templates {
        for line in display::template_lines(&rules::get_templates(client).await?) {
            println!("{line}");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.backend.init_logging();

    let client = cli.backend.connect().await?;

    match cli.command {
        Some(Command::Add(args)) => add(&client, args).await,
        Some(Command::Remove(args)) => remove(&client, args).await,
        Some(Command::Upcoming(args)) => upcoming(&client, args).await,
        Some(Command::Stop(args)) => {
            let id = args.resolve(&client).await?;
            rules::stop_recording(&client, id).await
        }
        Some(Command::Reactivate(args)) => {
            let id = args.resolve(&client).await?;
            rules::reactivate_recording(&client, id).await
        }
        None => listings(&client, &cli).await,
    }
}
