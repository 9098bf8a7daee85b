//! Channel service operations: video sources and channel lists

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use crate::client::{expect_bool, expect_int, BackendClient};
use crate::models::{
    ChannelInfo, ChannelInfoListWrapper, ChannelInfoWrapper, VideoSource, VideoSourceListWrapper,
};

pub const FREQUENCY_TABLES: &[&str] = &[
    "default",
    "us-bcast",
    "us-cable",
    "us-cable-hrc",
    "us-cable-irc",
    "japan-bcast",
    "japan-cable",
    "europe-west",
    "europe-east",
    "italy",
    "newzealand",
    "australia",
    "ireland",
    "france",
    "china-bcast",
    "southafrica",
    "argentina",
    "australia-optus",
    "singapore",
    "malaysia",
    "israel-hot-matav",
];

/// How a channel was named on the command line.
#[derive(Debug, Clone)]
pub enum ChannelKey {
    ChanId(String),
    SourceChanNum { sourceid: String, channum: String },
}

/// Inputs for one new video source.
#[derive(Debug, Clone)]
pub struct VideoSourceRequest {
    pub name: String,
    pub grabber: String,
    pub freq_table: String,
    pub userid: String,
    pub password: String,
    pub use_eit: bool,
}

pub async fn get_video_sources(client: &BackendClient) -> Result<Vec<VideoSource>> {
    let resp = client
        .get("Channel/GetVideoSourceList", &[])
        .await
        .context("Get Video Source List")?;
    let wrapper: VideoSourceListWrapper =
        serde_json::from_value(resp).context("malformed VideoSourceList response")?;
    Ok(wrapper.video_source_list.video_sources)
}

/// Channels for one source, hidden ones included.
pub async fn get_channels(client: &BackendClient, sourceid: &str) -> Result<Vec<ChannelInfo>> {
    let resp = client
        .get(
            "Channel/GetChannelInfoList",
            &[
                ("SourceID", sourceid.to_owned()),
                ("OnlyVisible", "false".into()),
                ("Details", "true".into()),
            ],
        )
        .await
        .context("Get Channel Info List")?;
    let wrapper: ChannelInfoListWrapper =
        serde_json::from_value(resp).context("malformed ChannelInfoList response")?;
    Ok(wrapper.channel_info_list.channel_infos)
}

pub async fn get_channel(client: &BackendClient, chanid: &str) -> Result<ChannelInfo> {
    let resp = client
        .get(
            "Channel/GetChannelInfo",
            &[
                ("ChanID", chanid.to_owned()),
                ("OnlyVisible", "true".into()),
                ("Details", "true".into()),
            ],
        )
        .await
        .context("Get Channel Info")?;
    let wrapper: ChannelInfoWrapper =
        serde_json::from_value(resp).context("malformed ChannelInfo response")?;
    if wrapper.channel_info.chan_id.is_empty() {
        bail!("Channel ID {chanid} not found in available channels");
    }
    Ok(wrapper.channel_info)
}

/// Resolve a command line channel key to full channel details.
pub async fn resolve_channel(client: &BackendClient, key: &ChannelKey) -> Result<ChannelInfo> {
    match key {
        ChannelKey::ChanId(chanid) => get_channel(client, chanid).await,
        ChannelKey::SourceChanNum { sourceid, channum } => {
            let chanid = get_channels(client, sourceid)
                .await?
                .into_iter()
                .find(|c| &c.chan_num == channum)
                .map(|c| c.chan_id)
                .with_context(|| {
                    format!("no channel number {channum} on sourceid {sourceid}")
                })?;
            get_channel(client, &chanid).await
        }
    }
}

/// Create a video source, refusing a duplicate SourceName.
///
/// Returns the new source id.
pub async fn add_video_source(client: &BackendClient, req: &VideoSourceRequest) -> Result<i64> {
    if !FREQUENCY_TABLES.contains(&req.freq_table.as_str()) {
        bail!(
            "unknown frequency table {:?}, expected one of: {FREQUENCY_TABLES:?}",
            req.freq_table
        );
    }
    let sources = get_video_sources(client).await?;
    if sources.iter().any(|s| s.source_name == req.name) {
        bail!("source {} already exists", req.name);
    }

    // The backend only understands its own grabber spellings.
    let grabber = match req.grabber.to_lowercase().as_str() {
        "none" => "/bin/true",
        "schedulesdirect" => "schedulesdirect1",
        _ => req.grabber.as_str(),
    };
    debug!("Grabber {grabber:?}");

    let postdata: Vec<(String, String)> = vec![
        ("SourceName".into(), req.name.clone()),
        ("FreqTable".into(), req.freq_table.clone()),
        ("Grabber".into(), grabber.to_owned()),
        ("NITId".into(), "-1".into()),
        ("UserId".into(), req.userid.clone()),
        ("Password".into(), req.password.clone()),
        ("UseEIT".into(), req.use_eit.to_string()),
    ];

    let resp = client
        .post("Channel/AddVideoSource", &postdata)
        .await
        .with_context(|| format!("Unable to add source: {}", req.name))?;
    let sourceid = expect_int(&resp)?;
    if sourceid < 0 {
        bail!("Backend failed to add: {:?} (SourceId {sourceid})", req.name);
    }
    info!("{sourceid} added for source {:?}", req.name);
    Ok(sourceid)
}

pub async fn remove_video_source(client: &BackendClient, sourceid: &str) -> Result<()> {
    let source = get_video_sources(client)
        .await?
        .into_iter()
        .find(|s| s.id == sourceid)
        .with_context(|| format!("Source Id {sourceid} not found"))?;

    info!("Removing source {}: {}", source.id, source.source_name);
    let postdata = vec![("SourceID".to_owned(), sourceid.to_owned())];
    let resp = client
        .post("Channel/RemoveVideoSource", &postdata)
        .await
        .with_context(|| {
            format!("Unable to remove source {}: {}", source.id, source.source_name)
        })?;
    if !expect_bool(&resp)? {
        bail!("Backend failed to remove: {}: {}", source.id, source.source_name);
    }
    info!("Removed source {}: {}", source.id, source.source_name);
    Ok(())
}

async fn remove_channel(client: &BackendClient, channel: &ChannelInfo) -> Result<()> {
    let postdata = vec![("ChannelID".to_owned(), channel.chan_id.clone())];
    let resp = client
        .post("Channel/RemoveDBChannel", &postdata)
        .await
        .with_context(|| format!("Unable to remove channel {}", channel.chan_id))?;
    if !expect_bool(&resp)? {
        bail!(
            "Backend failed to remove: {} {} {}",
            channel.chan_id,
            channel.chan_num,
            channel.channel_name
        );
    }
    info!(
        "Removed channel {} {} {}",
        channel.chan_id, channel.chan_num, channel.channel_name
    );
    Ok(())
}

/// Remove every channel attached to a source.
pub async fn remove_channels(client: &BackendClient, sourceid: &str) -> Result<()> {
    let channels = get_channels(client, sourceid).await?;
    if channels.is_empty() {
        bail!("no channels on SourceId {sourceid}");
    }
    for channel in &channels {
        remove_channel(client, channel)
            .await
            .with_context(|| format!("Failed to remove all channels for SourceId {sourceid}"))?;
    }
    info!("Removed all channels for SourceId {sourceid}");
    Ok(())
}
