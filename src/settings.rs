//! Backend settings and storage groups via the Myth service

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::client::{expect_bool, BackendClient};

pub const TV_FORMATS: &[&str] = &[
    "NTSC", "NTSC-JP", "PAL", "PAL-60", "PAL-BG", "PAL-DK", "PAL-D", "PAL-I", "PAL-M", "PAL-N",
    "PAL-NC", "SECAM", "SECAM-D", "SECAM-DK",
];

pub const STORAGE_SCHEDULERS: &[&str] = &[
    "BalancedFreeSpace",
    "BalancedPercFreeSpace",
    "BalancedDiskIO",
    "Combination",
];

/// The initial settings of a backend, unset fields left untouched.
#[derive(Debug, Clone, Default)]
pub struct BackendSettings {
    pub master_server_name: String,
    pub master_server_ip: Option<String>,
    pub backend_server_ip: Option<String>,
    pub backend_server_addr: Option<String>,
    pub allow_conn_from_all: Option<bool>,
    pub tv_format: Option<String>,
    pub myth_fill_enabled: Option<bool>,
    pub auto_commflag_while_recording: Option<bool>,
    pub job_allow_metadata: Option<bool>,
    pub job_allow_comm_flag: Option<bool>,
    pub job_allow_transcode: Option<bool>,
    pub job_allow_preview: Option<bool>,
    pub storage_scheduler: Option<String>,
    pub freq_table: Option<String>,
    pub hd_ringbuffer_size: Option<i64>,
    pub disable_automatic_backup: Option<bool>,
    pub job_queue_max_simultaneous_jobs: Option<i64>,
    pub job_queue_check_frequency: Option<i64>,
    pub job_queue_cpu: Option<i64>,
}

fn flag(value: bool) -> String {
    if value { "1".into() } else { "0".into() }
}

impl BackendSettings {
    /// Settings to store, in a fixed key order.
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs: Vec<(&'static str, String)> = Vec::new();
        pairs.push(("MasterServerName", self.master_server_name.clone()));

        let mut push_str = |key, value: &Option<String>| {
            if let Some(v) = value {
                pairs.push((key, v.clone()));
            }
        };
        push_str("MasterServerIP", &self.master_server_ip);
        push_str("BackendServerIP", &self.backend_server_ip);
        push_str("BackendServerAddr", &self.backend_server_addr);
        push_str("TVFormat", &self.tv_format);
        push_str("StorageScheduler", &self.storage_scheduler);
        push_str("FreqTable", &self.freq_table);

        let mut push_bool = |key, value: &Option<bool>| {
            if let Some(v) = value {
                pairs.push((key, flag(*v)));
            }
        };
        push_bool("AllowConnFromAll", &self.allow_conn_from_all);
        push_bool("MythFillEnabled", &self.myth_fill_enabled);
        push_bool(
            "AutoCommflagWhileRecording",
            &self.auto_commflag_while_recording,
        );
        push_bool("JobAllowMetadata", &self.job_allow_metadata);
        push_bool("JobAllowCommFlag", &self.job_allow_comm_flag);
        push_bool("JobAllowTranscode", &self.job_allow_transcode);
        push_bool("JobAllowPreview", &self.job_allow_preview);
        push_bool("DisableAutomaticBackup", &self.disable_automatic_backup);

        let mut push_int = |key, value: &Option<i64>| {
            if let Some(v) = value {
                pairs.push((key, v.to_string()));
            }
        };
        push_int("HDRingbufferSize", &self.hd_ringbuffer_size);
        push_int(
            "JobQueueMaxSimultaneousJobs",
            &self.job_queue_max_simultaneous_jobs,
        );
        push_int("JobQueueCheckFrequency", &self.job_queue_check_frequency);
        push_int("JobQueueCPU", &self.job_queue_cpu);

        pairs
    }
}

/// Store one setting.
///
/// Master* keys are global and carry no HostName; everything else is
/// scoped to the master server's host row.
pub async fn put_setting(
    client: &BackendClient,
    master_server_name: &str,
    key: &str,
    value: &str,
    key_width: usize,
) -> Result<()> {
    let mut postdata: Vec<(String, String)> = Vec::with_capacity(3);
    if !key.starts_with("Master") {
        postdata.push(("HostName".into(), master_server_name.to_owned()));
    }
    postdata.push(("Key".into(), key.to_owned()));
    postdata.push(("Value".into(), value.to_owned()));

    let resp = client
        .post("Myth/PutSetting", &postdata)
        .await
        .with_context(|| format!("Unable to add setting: {key}"))?;
    if !expect_bool(&resp)? {
        bail!("Backend failed to add: {key:?}");
    }
    info!("Set {key:key_width$} = {value:?}");
    Ok(())
}

/// Store every provided setting, aligned on the widest key saved.
pub async fn save_settings(client: &BackendClient, settings: &BackendSettings) -> Result<()> {
    let pairs = settings.pairs();
    let key_width = pairs.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    for (key, value) in &pairs {
        put_setting(client, &settings.master_server_name, key, value, key_width).await?;
    }
    Ok(())
}

/// Attach a storage group directory to a host.
pub async fn add_storage_group(
    client: &BackendClient,
    host: &str,
    group_name: &str,
    dir_name: &str,
) -> Result<()> {
    let postdata: Vec<(String, String)> = vec![
        ("HostName".into(), host.to_owned()),
        ("GroupName".into(), group_name.to_owned()),
        ("DirName".into(), dir_name.to_owned()),
    ];
    let resp = client
        .post("Myth/AddStorageGroupDir", &postdata)
        .await
        .with_context(|| format!("Unable to add storage group: {group_name}"))?;
    if !expect_bool(&resp)? {
        bail!("Failed to add {group_name}: {dir_name:?}");
    }
    info!("Added {group_name}: {dir_name:?}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairs_skips_unset_fields() {
        let settings = BackendSettings {
            master_server_name: "mythbe".into(),
            master_server_ip: Some("192.168.1.10".into()),
            tv_format: Some("NTSC".into()),
            job_queue_cpu: Some(0),
            ..Default::default()
        };

        let pairs = settings.pairs();
        let keys: Vec<&str> = pairs.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            vec!["MasterServerName", "MasterServerIP", "TVFormat", "JobQueueCPU"]
        );
        assert_eq!(pairs[1].1, "192.168.1.10");
        assert_eq!(pairs[3].1, "0");
    }

    #[test]
    fn test_pairs_encodes_bools_as_flags() {
        let settings = BackendSettings {
            master_server_name: "mythbe".into(),
            myth_fill_enabled: Some(true),
            disable_automatic_backup: Some(false),
            ..Default::default()
        };

        let pairs = settings.pairs();
        assert!(pairs.contains(&("MythFillEnabled", "1".to_owned())));
        assert!(pairs.contains(&("DisableAutomaticBackup", "0".to_owned())));
    }
}
