//! Seed a fresh backend with its initial settings and storage groups.

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};

use mythtv_setup::cli::{self, BackendArgs};
use mythtv_setup::settings::{self, BackendSettings, STORAGE_SCHEDULERS, TV_FORMATS};

#[derive(Debug, Parser)]
#[command(name = "mythtv-initialize", version, about = "Initial mythbackend setup")]
struct Cli {
    #[command(flatten)]
    backend: BackendArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Save backend settings
    Save(SaveArgs),
    /// Attach a storage group directory
    Storage(StorageArgs),
}

#[derive(Debug, Args)]
struct SaveArgs {
    /// Master backend hostname
    #[arg(long, value_name = "name", default_value_t = cli::default_host())]
    master_server_name: String,

    /// Master server address
    #[arg(long, value_name = "IP")]
    master_server_ip: Option<String>,

    /// This backend's address
    #[arg(long, value_name = "IP")]
    backend_server_ip: Option<String>,

    /// This backend's resolvable address
    #[arg(long, value_name = "IP")]
    backend_server_addr: Option<String>,

    /// Allow connections from other subnets
    #[arg(long, value_name = "bool")]
    allow_conn_from_all: Option<bool>,

    /// TV format, e.g. NTSC or PAL
    #[arg(long, value_name = "format")]
    tv_format: Option<String>,

    /// Automatically run mythfilldatabase
    #[arg(long, value_name = "bool")]
    myth_fill_enabled: Option<bool>,

    /// Start commercial flagging as soon as a recording starts
    #[arg(long, value_name = "bool")]
    auto_commflag_while_recording: Option<bool>,

    /// Automatically retrieve metadata for recordings
    #[arg(long, value_name = "bool")]
    job_allow_metadata: Option<bool>,

    /// Automatically flag commercials
    #[arg(long, value_name = "bool")]
    job_allow_comm_flag: Option<bool>,

    /// Automatically transcode recordings
    #[arg(long, value_name = "bool")]
    job_allow_transcode: Option<bool>,

    /// Create preview thumbnails for recordings
    #[arg(long, value_name = "bool")]
    job_allow_preview: Option<bool>,

    /// Storage group balancing method
    #[arg(long, value_name = "scheduler", default_value = "Combination")]
    storage_scheduler: String,

    /// Default frequency table
    #[arg(long, value_name = "table")]
    freq_table: Option<String>,

    /// Device ringbuffer size in bytes
    #[arg(long, value_name = "bytes")]
    hd_ringbuffer_size: Option<i64>,

    /// Skip the automatic database backup
    #[arg(long, value_name = "bool", default_value_t = false)]
    disable_automatic_backup: bool,

    /// Maximum number of jobs allowed to run at once
    #[arg(long, value_name = "int", default_value_t = 1)]
    job_queue_max_simultaneous_jobs: i64,

    /// Seconds between checks for runnable jobs
    #[arg(long, value_name = "seconds", default_value_t = 60)]
    job_queue_check_frequency: i64,

    /// Job CPU usage: 0 = low, 1 = medium, 2 = high
    #[arg(long, value_name = "int", default_value_t = 0)]
    job_queue_cpu: i64,
}

#[derive(Debug, Args)]
struct StorageArgs {
    /// Storage group name
    #[arg(long, value_name = "name", default_value = "Default")]
    name: String,

    /// Directory to add to the group
    #[arg(long, value_name = "dir")]
    dir: String,
}

impl SaveArgs {
    fn into_settings(self) -> Result<BackendSettings> {
        if let Some(format) = &self.tv_format {
            if !TV_FORMATS.contains(&format.as_str()) {
                bail!("Unknown TV format {format:?}, expected one of: {TV_FORMATS:?}");
            }
        }
        if !STORAGE_SCHEDULERS.contains(&self.storage_scheduler.as_str()) {
            bail!(
                "Unknown storage scheduler {:?}, expected one of: {STORAGE_SCHEDULERS:?}",
                self.storage_scheduler
            );
        }
        if !(0..=2).contains(&self.job_queue_cpu) {
            bail!("--job-queue-cpu must be 0, 1 or 2");
        }

        Ok(BackendSettings {
            master_server_name: self.master_server_name,
            master_server_ip: self.master_server_ip,
            backend_server_ip: self.backend_server_ip,
            backend_server_addr: self.backend_server_addr,
            allow_conn_from_all: self.allow_conn_from_all,
            tv_format: self.tv_format,
            myth_fill_enabled: self.myth_fill_enabled,
            auto_commflag_while_recording: self.auto_commflag_while_recording,
            job_allow_metadata: self.job_allow_metadata,
            job_allow_comm_flag: self.job_allow_comm_flag,
            job_allow_transcode: self.job_allow_transcode,
            job_allow_preview: self.job_allow_preview,
            storage_scheduler: Some(self.storage_scheduler),
            freq_table: self.freq_table,
            hd_ringbuffer_size: self.hd_ringbuffer_size,
            disable_automatic_backup: Some(self.disable_automatic_backup),
            job_queue_max_simultaneous_jobs: Some(self.job_queue_max_simultaneous_jobs),
            job_queue_check_frequency: Some(self.job_queue_check_frequency),
            job_queue_cpu: Some(self.job_queue_cpu),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.backend.init_logging();

    let client = cli.backend.connect().await?;

    match cli.command {
        Command::Save(args) => {
            let backend_settings = args.into_settings()?;
            settings::save_settings(&client, &backend_settings).await
        }
        Command::Storage(args) => {
            settings::add_storage_group(&client, &cli.backend.host, &args.name, &args.dir).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn save_args(extra: &[&str]) -> Result<SaveArgs, clap::Error> {
        let mut argv = vec!["mythtv-initialize", "save"];
        argv.extend_from_slice(extra);
        Cli::try_parse_from(argv).map(|cli| match cli.command {
            Command::Save(args) => args,
            Command::Storage(_) => unreachable!(),
        })
    }

    #[test]
    fn test_save_defaults_always_sent() {
        let settings = save_args(&[]).unwrap().into_settings().unwrap();
        let pairs = settings.pairs();
        let keys: Vec<&str> = pairs.iter().map(|(k, _)| *k).collect();

        assert!(keys.contains(&"MasterServerName"));
        assert!(pairs.contains(&("StorageScheduler", "Combination".to_owned())));
        assert!(pairs.contains(&("DisableAutomaticBackup", "0".to_owned())));
        assert!(pairs.contains(&("JobQueueMaxSimultaneousJobs", "1".to_owned())));
        assert!(pairs.contains(&("JobQueueCheckFrequency", "60".to_owned())));
        assert!(pairs.contains(&("JobQueueCPU", "0".to_owned())));
        assert!(!keys.contains(&"TVFormat"));
    }

    #[test]
    fn test_save_rejects_unknown_tv_format() {
        let err = save_args(&["--tv-format", "ATSC"])
            .unwrap()
            .into_settings()
            .unwrap_err();
        assert!(err.to_string().contains("Unknown TV format"));
    }

    #[test]
    fn test_save_rejects_unknown_scheduler() {
        let err = save_args(&["--storage-scheduler", "RoundRobin"])
            .unwrap()
            .into_settings()
            .unwrap_err();
        assert!(err.to_string().contains("Unknown storage scheduler"));
    }
}
