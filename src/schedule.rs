//! Manual recording rules, including the 24x7 round-the-clock set
//!
//! A manual rule records a fixed (channel, start, duration) slot with
//! no guide match. The 24x7 variant covers a full day with back-to-back
//! blocks hung off a fixed Saturday anchor so the Daily rules fire at
//! the same wall-clock times every day.

use anyhow::{bail, Context, Result};
use chrono::{Duration, NaiveDateTime, NaiveTime, Utc};
use tracing::{info, warn};

use crate::channels::{self, ChannelKey};
use crate::client::BackendClient;
use crate::models::{ChannelInfo, RecRule, RecordType};
use crate::{rules, timefmt};

const MINUTES_PER_DAY: i64 = 1440;

/// Inputs for one manual rule, as collected from the command line.
#[derive(Debug, Clone)]
pub struct ManualRuleRequest {
    pub template: String,
    pub channel: ChannelKey,
    pub starttime: Option<String>,
    pub duration_min: i64,
    pub title: String,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub season: Option<String>,
    pub episode: Option<String>,
    pub rtype: RecordType,
}

/// Back-to-back block start times covering one day from `anchor`.
///
/// The day divides evenly or not at all; a remainder would leave a gap
/// before the next day's first block.
pub fn daily_block_starts(anchor: NaiveDateTime, duration_min: i64) -> Result<Vec<NaiveDateTime>> {
    if duration_min < 1 || duration_min > MINUTES_PER_DAY {
        bail!("duration must be between 1 and {MINUTES_PER_DAY} minutes, got {duration_min}");
    }
    if MINUTES_PER_DAY % duration_min != 0 {
        bail!("duration {duration_min} does not divide a day evenly");
    }
    let blocks = MINUTES_PER_DAY / duration_min;
    Ok((0..blocks)
        .map(|i| anchor + Duration::minutes(i * duration_min))
        .collect())
}

/// Midnight on the 24x7 anchor Saturday.
pub fn anchor_midnight() -> NaiveDateTime {
    timefmt::anchor_saturday().and_time(NaiveTime::MIN)
}

/// Stamp times, titles and search type onto a template copy.
///
/// `start` is a zone-resolved instant; it is stored on the rule in UTC
/// 'Z' form while FindTime and the default description use local time.
pub fn stamp_manual_times(
    rule: &mut RecRule,
    channel: &ChannelInfo,
    start: chrono::DateTime<chrono::FixedOffset>,
    duration_min: i64,
    req: &ManualRuleRequest,
) -> Result<()> {
    let start_utc = start.with_timezone(&Utc);
    let end_utc = start_utc + Duration::minutes(duration_min);
    let start_local = start.with_timezone(&chrono::Local);

    rule.start_time = timefmt::utc_string(&start_utc);
    rule.end_time = timefmt::utc_string(&end_utc);
    rule.title = req.title.clone();
    rule.rule_type = req.rtype.as_str().to_owned();
    rule.chan_id = channel.chan_id.clone();
    rule.station = channel.call_sign.clone();
    rule.call_sign = channel.call_sign.clone();
    rule.find_time = start_local.format("%H:%M:%S").to_string();
    rule.search_type = "Manual Search".to_owned();
    rule.category = String::new();
    rule.series_id = String::new();

    rule.sub_title = req.subtitle.clone().unwrap_or_default();
    rule.description = match &req.description {
        Some(d) => d.clone(),
        None => format!("{} (Manual Record)", start_local.format("%H")),
    };
    if let Some(season) = &req.season {
        rule.season = season.clone();
    }
    if let Some(episode) = &req.episode {
        rule.episode = episode.clone();
    }
    Ok(())
}

/// Create one manual rule at the requested start time.
async fn record_manual_single(
    client: &BackendClient,
    req: &ManualRuleRequest,
    channel: &ChannelInfo,
) -> Result<()> {
    let starttime = match &req.starttime {
        Some(s) => s,
        None => bail!("a start time is required for {}", req.rtype.as_str()),
    };
    let start = timefmt::parse_iso8601(starttime)?;

    let mut rule = rules::get_template(client, &req.template).await?;
    stamp_manual_times(&mut rule, channel, start, req.duration_min, req)?;
    rules::add_record_rule(client, &rule).await?;
    Ok(())
}

/// Create the full-day block set of Daily rules.
///
/// Fails fast on the first block the backend rejects; earlier blocks
/// are left in place for the operator to inspect or remove.
async fn record_manual_24x7(
    client: &BackendClient,
    req: &ManualRuleRequest,
    channel: &ChannelInfo,
) -> Result<()> {
    let starts = daily_block_starts(anchor_midnight(), req.duration_min)?;
    info!(
        "Adding {} Daily rules of {} minutes on chanid {}",
        starts.len(),
        req.duration_min,
        channel.chan_id
    );

    let template = rules::get_template(client, &req.template).await?;
    for start in starts {
        let mut rule = template.clone();
        let block_req = ManualRuleRequest {
            subtitle: Some(format!("hour {}", start.format("%H"))),
            rtype: RecordType::Daily,
            ..req.clone()
        };
        let start = timefmt::local_from_naive(start)?;
        stamp_manual_times(&mut rule, channel, start, req.duration_min, &block_req)?;
        rules::add_record_rule(client, &rule).await?;
    }
    Ok(())
}

/// Entry point for `mythtv-record add`.
///
/// Manual rules may share a title (a 24x7 set always does); the
/// duplicate-title check applies to guide-based adds only.
pub async fn record_manual(client: &BackendClient, req: &ManualRuleRequest) -> Result<()> {
    let channel = channels::resolve_channel(client, &req.channel)
        .await
        .with_context(|| format!("channel {:?} not found", req.channel))?;

    match req.rtype {
        RecordType::All => record_manual_24x7(client, req, &channel).await,
        _ => record_manual_single(client, req, &channel).await,
    }
}

/// Remove one manual rule identified by channel and start time.
async fn remove_manual_single(
    client: &BackendClient,
    chanid: &str,
    starttime: &str,
) -> Result<()> {
    let recordid = rules::get_recording_ruleid(client, chanid, starttime)
        .await?
        .with_context(|| format!("no rule on chanid {chanid} at {starttime}"))?;

    let rule = rules::get_recording_rule(client, &recordid).await?;
    if rule.search_type != "Manual Search" {
        bail!(
            "RecordId {} is not a manual rule (SearchType {:?})",
            rule.id,
            rule.search_type
        );
    }
    rules::remove_record_rule(client, &rule).await
}

/// Remove a 24x7 set by probing each hourly slot of the anchor day.
///
/// Sets created with a non-60-minute duration need per-rule removal.
async fn remove_manual_24x7(client: &BackendClient, chanid: &str) -> Result<()> {
    let starts = daily_block_starts(anchor_midnight(), 60)?;
    let mut removed = 0usize;
    for start in starts {
        let starttime = start.format("%Y-%m-%dT%H:%M:%S").to_string();
        match rules::get_recording_ruleid(client, chanid, &starttime).await? {
            Some(recordid) => {
                let rule = rules::get_recording_rule(client, &recordid).await?;
                rules::remove_record_rule(client, &rule).await?;
                removed += 1;
            }
            None => {
                warn!("no rule on chanid {chanid} at {starttime}, skipping");
            }
        }
    }
    if removed == 0 {
        bail!("no 24x7 rules found on chanid {chanid}");
    }
    info!("Removed {removed} rule(s) from chanid {chanid}");
    Ok(())
}

/// Entry point for `mythtv-record remove` with a channel key.
pub async fn remove_manual(
    client: &BackendClient,
    channel: &ChannelKey,
    starttime: Option<&str>,
    rtype: RecordType,
) -> Result<()> {
    let chan = channels::resolve_channel(client, channel)
        .await
        .with_context(|| format!("channel {channel:?} not found"))?;

    match rtype {
        RecordType::All => remove_manual_24x7(client, &chan.chan_id).await,
        _ => {
            let starttime = starttime
                .context("a start time is required to remove a single manual rule")?;
            remove_manual_single(client, &chan.chan_id, starttime).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, NaiveDate, Weekday};

    fn anchor() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2018, 1, 6)
            .unwrap()
            .and_time(NaiveTime::MIN)
    }

    #[test]
    fn test_hourly_blocks_cover_the_day() {
        let starts = daily_block_starts(anchor(), 60).unwrap();
        assert_eq!(starts.len(), 24);
        assert_eq!(starts[0], anchor());
        assert_eq!(starts[23], anchor() + Duration::hours(23));
        for pair in starts.windows(2) {
            assert_eq!(pair[1] - pair[0], Duration::minutes(60));
        }
    }

    #[test]
    fn test_block_counts_for_even_durations() {
        assert_eq!(daily_block_starts(anchor(), 30).unwrap().len(), 48);
        assert_eq!(daily_block_starts(anchor(), 90).unwrap().len(), 16);
        assert_eq!(daily_block_starts(anchor(), 120).unwrap().len(), 12);
        assert_eq!(daily_block_starts(anchor(), 1440).unwrap().len(), 1);
    }

    #[test]
    fn test_uneven_durations_rejected() {
        assert!(daily_block_starts(anchor(), 0).is_err());
        assert!(daily_block_starts(anchor(), 7).is_err());
        assert!(daily_block_starts(anchor(), 100).is_err());
        assert!(daily_block_starts(anchor(), 1441).is_err());
    }

    #[test]
    fn test_anchor_midnight_is_saturday() {
        let anchor = anchor_midnight();
        assert_eq!(anchor.weekday(), Weekday::Sat);
        assert_eq!(anchor.time(), NaiveTime::MIN);
    }

    fn request() -> ManualRuleRequest {
        ManualRuleRequest {
            template: "Default".into(),
            channel: ChannelKey::ChanId("80017".into()),
            starttime: None,
            duration_min: 60,
            title: "Channel 20.1 24x7".into(),
            subtitle: None,
            description: None,
            season: None,
            episode: None,
            rtype: RecordType::All,
        }
    }

    #[test]
    fn test_stamp_manual_times_sets_manual_fields() {
        let mut rule = RecRule {
            id: "-1".into(),
            category: "Unknown".into(),
            series_id: "EP123".into(),
            ..Default::default()
        };
        let channel = ChannelInfo {
            chan_id: "80017".into(),
            call_sign: "WXYZ".into(),
            ..Default::default()
        };
        let start = timefmt::local_from_naive(anchor() + Duration::hours(17)).unwrap();
        let req = ManualRuleRequest {
            subtitle: Some("hour 17".into()),
            rtype: RecordType::Daily,
            ..request()
        };

        stamp_manual_times(&mut rule, &channel, start, 60, &req).unwrap();

        assert_eq!(rule.search_type, "Manual Search");
        assert_eq!(rule.rule_type, "Record Daily");
        assert_eq!(rule.chan_id, "80017");
        assert_eq!(rule.station, "WXYZ");
        assert_eq!(rule.sub_title, "hour 17");
        assert_eq!(rule.find_time, "17:00:00");
        assert!(rule.category.is_empty());
        assert!(rule.series_id.is_empty());
        assert!(rule.start_time.ends_with('Z'));
        assert!(rule.end_time.ends_with('Z'));
        assert_eq!(rule.description, "17 (Manual Record)");

        // Stored times are exactly one block apart.
        let start_utc = timefmt::parse_iso8601(&rule.start_time).unwrap();
        let end_utc = timefmt::parse_iso8601(&rule.end_time).unwrap();
        assert_eq!(end_utc - start_utc, Duration::minutes(60));
    }

    #[test]
    fn test_stamp_manual_times_honors_overrides() {
        let mut rule = RecRule::default();
        let channel = ChannelInfo {
            chan_id: "80017".into(),
            ..Default::default()
        };
        let req = ManualRuleRequest {
            description: Some("Late news".into()),
            season: Some("3".into()),
            episode: Some("12".into()),
            ..request()
        };

        let start = timefmt::local_from_naive(anchor()).unwrap();
        stamp_manual_times(&mut rule, &channel, start, 30, &req).unwrap();
        assert_eq!(rule.description, "Late news");
        assert_eq!(rule.season, "3");
        assert_eq!(rule.episode, "12");
    }

    #[tokio::test]
    async fn test_manual_add_allows_existing_title() {
        use crate::client::test_support::{json_response, stub_backend};

        let channel = r#"{"ChannelInfo": {"ChanId": "80017", "ChanNum": "20.1",
            "CallSign": "WXYZ", "ChannelName": "Community", "Visible": "true",
            "SourceId": "8"}}"#;
        let template = r#"{"RecRule": {"Id": "-1", "Title": "Default (Template)",
            "Type": "Recording Template"}}"#;
        let added = r#"{"uint": "129"}"#;
        let (port, handle) = stub_backend(vec![
            json_response(channel),
            json_response(template),
            json_response(added),
        ])
        .await;

        let client = BackendClient::new("127.0.0.1", port, None, true);
        let req = ManualRuleRequest {
            starttime: Some("2018-08-05T17:00:00".into()),
            rtype: RecordType::Single,
            ..request()
        };
        record_manual(&client, &req).await.unwrap();

        // The rule list is never consulted: an existing rule with the
        // same title must not block a manual add.
        let requests = handle.await.unwrap();
        assert_eq!(requests.len(), 3);
        assert!(!requests.iter().any(|r| r.contains("GetRecordScheduleList")));
        assert!(requests[0].contains("Channel/GetChannelInfo"));
        assert!(requests[2].contains("Dvr/AddRecordSchedule"));
    }
}
