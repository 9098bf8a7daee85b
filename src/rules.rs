//! Recording rule operations against the Dvr and Guide services
//!
//! Rule lists are backend-bounded (hundreds, not millions), so every
//! lookup is a plain linear scan over `Dvr/GetRecordScheduleList`.

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;
use tracing::{debug, info};

use crate::client::{expect_bool, expect_int, expect_uint, BackendClient};
use crate::models::{
    Program, ProgramList, ProgramListWrapper, RecRule, RecRuleListWrapper, RecRuleWrapper,
    RecordType,
};
use crate::timefmt;

/// The backend reports a failed add with this sentinel record id.
const ADD_FAILED_SENTINEL: u32 = u32::MAX;

/// Fields maintained by the backend; never sent back as postdata.
const PARAMS_NOT_SENT: &[&str] = &[
    "AverageDelay",
    "CallSign",
    "Id",
    "LastDeleted",
    "LastRecorded",
    "NextRecording",
    "ParentId",
];

/// Fetch every recording rule.
pub async fn get_recording_rules(client: &BackendClient) -> Result<Vec<RecRule>> {
    let resp = client
        .get("Dvr/GetRecordScheduleList", &[("StartIndex", "0".into())])
        .await
        .context("Get Record Schedule List")?;
    let wrapper: RecRuleListWrapper =
        serde_json::from_value(resp).context("malformed RecRuleList response")?;
    Ok(wrapper.rec_rule_list.rec_rules)
}

/// Fetch a single rule by record id.
pub async fn get_recording_rule(client: &BackendClient, recordid: &str) -> Result<RecRule> {
    let resp = client
        .get(
            "Dvr/GetRecordSchedule",
            &[("RecordId", recordid.to_owned())],
        )
        .await
        .context("Get Record Schedule")?;
    let wrapper: RecRuleWrapper =
        serde_json::from_value(resp).context("malformed RecRule response")?;
    Ok(wrapper.rec_rule)
}

/// Fetch the named template (misspelled names yield the Default template).
pub async fn get_template(client: &BackendClient, name: &str) -> Result<RecRule> {
    let resp = client
        .get("Dvr/GetRecordSchedule", &[("Template", name.to_owned())])
        .await
        .context("Get Template")?;
    let wrapper: RecRuleWrapper =
        serde_json::from_value(resp).context("malformed template response")?;

    // Templates are always Id -1, just double checking here
    if wrapper.rec_rule.id != "-1" {
        bail!("no template found for: {name}");
    }
    Ok(wrapper.rec_rule)
}

/// All templates from the schedule list.
pub async fn get_templates(client: &BackendClient) -> Result<Vec<RecRule>> {
    let rules = get_recording_rules(client).await?;
    Ok(rules
        .into_iter()
        .filter(|r| r.rule_type == "Recording Template")
        .collect())
}

/// Scan `rules` for the one matching (ChanId, StartTime) exactly.
///
/// `start_utc` must already be in the UTC 'Z' transport form.
pub fn find_rule_id(rules: &[RecRule], chanid: &str, start_utc: &str) -> Option<String> {
    rules
        .iter()
        .find(|r| r.chan_id == chanid && r.start_time == start_utc)
        .map(|r| r.id.clone())
}

/// Resolve a rule id from a channel id and an ISO-8601 start time.
pub async fn get_recording_ruleid(
    client: &BackendClient,
    chanid: &str,
    starttime: &str,
) -> Result<Option<String>> {
    let start = timefmt::parse_iso8601(starttime)?;
    let start_utc = timefmt::utc_string(&start);

    let rules = get_recording_rules(client).await?;
    let id = find_rule_id(&rules, chanid, &start_utc);
    if id.is_none() {
        info!("Failed to find a RecordId for chanid {chanid} starttime {start_utc}");
    }
    Ok(id)
}

/// Exact-title existence check; a near-miss title is not detected.
pub fn title_exists(rules: &[RecRule], title: &str) -> bool {
    rules.iter().any(|r| r.title == title)
}

pub async fn schedule_already_exists(client: &BackendClient, title: &str) -> Result<bool> {
    let rules = get_recording_rules(client).await?;
    Ok(title_exists(&rules, title))
}

/// Flatten a rule into form postdata, dropping the server-maintained fields.
pub fn rule_postdata(rule: &RecRule) -> Result<Vec<(String, String)>> {
    let value = serde_json::to_value(rule).context("serialize recording rule")?;
    let map = match value {
        Value::Object(map) => map,
        _ => bail!("recording rule did not serialize to an object"),
    };

    let mut postdata = Vec::with_capacity(map.len());
    for (key, value) in map {
        if PARAMS_NOT_SENT.contains(&key.as_str()) {
            continue;
        }
        let text = match value {
            Value::String(s) => s,
            other => other.to_string(),
        };
        postdata.push((key, text));
    }
    Ok(postdata)
}

/// Submit a new rule; returns the record id assigned by the backend.
pub async fn add_record_rule(client: &BackendClient, rule: &RecRule) -> Result<u32> {
    let postdata = rule_postdata(rule)?;
    let resp = client
        .post("Dvr/AddRecordSchedule", &postdata)
        .await
        .with_context(|| format!("Unable to add rule: {}", rule.title))?;

    let recordid = expect_uint(&resp)?;
    if recordid == ADD_FAILED_SENTINEL {
        bail!("Backend failed to add: {:?}", rule.title);
    }
    info!("Added: {:?} (RecordId {recordid})", rule.title);
    Ok(recordid)
}

/// Remove one rule by its id.
pub async fn remove_record_rule(client: &BackendClient, rule: &RecRule) -> Result<()> {
    info!(
        "Removing recording rule {}: {} chanid {} start {}",
        rule.id, rule.title, rule.chan_id, rule.start_time
    );
    let postdata = vec![("RecordId".to_owned(), rule.id.clone())];
    let resp = client
        .post("Dvr/RemoveRecordSchedule", &postdata)
        .await
        .with_context(|| format!("Unable to remove RecordId {}", rule.id))?;

    if !expect_bool(&resp)? {
        bail!("Backend failed to remove Id: {:?}", rule.id);
    }
    Ok(())
}

/// Remove a rule looked up by record id.
pub async fn remove_record_ruleid(client: &BackendClient, recordid: &str) -> Result<()> {
    let parsed: i64 = recordid
        .parse()
        .with_context(|| format!("RecordId is invalid: {recordid:?}"))?;
    if parsed < 1 {
        bail!("RecordId is invalid: {recordid:?}");
    }
    let rule = get_recording_rule(client, recordid).await?;
    remove_record_rule(client, &rule).await
}

/// Remove every rule whose title matches exactly.
pub async fn remove_record_title(client: &BackendClient, title: &str) -> Result<()> {
    let rules = get_recording_rules(client).await?;
    let mut removed = 0usize;
    for rule in rules.iter().filter(|r| r.title == title) {
        remove_record_rule(client, rule).await?;
        removed += 1;
    }
    if removed == 0 {
        bail!("no recording rule with title {title:?}");
    }
    info!("Removed {removed} rule(s) for title {title:?}");
    Ok(())
}

/// Find the guide program whose title matches exactly.
///
/// `TitleFilter` is a substring match on the backend side, so each
/// candidate is re-compared against the full title here.
pub async fn get_program_data(client: &BackendClient, title: &str) -> Result<Program> {
    let resp = client
        .get(
            "Guide/GetProgramList",
            &[
                ("Details", "False".into()),
                ("WithInvisible", "True".into()),
                ("TitleFilter", title.to_owned()),
            ],
        )
        .await
        .context("Get Program List")?;
    let wrapper: ProgramListWrapper =
        serde_json::from_value(resp).context("malformed ProgramList response")?;

    let count: usize = wrapper
        .program_list
        .total_available
        .parse()
        .unwrap_or_default();
    debug!("Programs matching title {title:?} = {count}");
    if count < 1 {
        bail!("No programs in the guide matching: {title}");
    }

    wrapper
        .program_list
        .programs
        .into_iter()
        .find(|p| p.title == title)
        .ok_or_else(|| anyhow!("no exact match in guide for: {title}"))
}

/// Copy the guide fields for a title match into the template.
pub fn update_template_from_guide(
    template: &mut RecRule,
    guide: &Program,
    rtype: RecordType,
) -> Result<()> {
    if guide.start_time.is_empty() || guide.channel.chan_id.is_empty() {
        bail!("guide data missing StartTime or ChanId");
    }
    let start = timefmt::parse_iso8601(&guide.start_time)?;

    template.start_time = guide.start_time.clone();
    template.end_time = guide.end_time.clone();
    template.title = guide.title.clone();
    template.rule_type = rtype.as_str().to_owned();
    template.station = guide.channel.call_sign.clone();
    template.chan_id = guide.channel.chan_id.clone();
    template.search_type = "None".to_owned();
    template.category = guide.category.clone();
    template.find_time = start.with_timezone(&chrono::Local).format("%H:%M:%S").to_string();
    template.description = "Rule created by mythtv-record".to_owned();
    Ok(())
}

/// Create a guide-matched (non-manual) rule for a title.
pub async fn record_title(
    client: &BackendClient,
    template_name: &str,
    title: &str,
    rtype: RecordType,
) -> Result<u32> {
    let mut template = get_template(client, template_name).await?;
    let guide = get_program_data(client, title).await?;
    update_template_from_guide(&mut template, &guide, rtype)?;
    add_record_rule(client, &template).await
}

/// Fetch the upcoming-recording list.
pub async fn get_upcoming(client: &BackendClient, show_all: bool) -> Result<ProgramList> {
    let mut query: Vec<(&str, String)> = Vec::new();
    if show_all {
        query.push(("ShowAll", "true".into()));
    }
    let resp = client
        .get("Dvr/GetUpcomingList", &query)
        .await
        .context("Get Upcoming")?;
    let wrapper: ProgramListWrapper =
        serde_json::from_value(resp).context("malformed ProgramList response")?;
    Ok(wrapper.program_list)
}

/// Resolve a RecordedId from (ChanId, StartTime); None when not recorded.
pub async fn recorded_id_for_key(
    client: &BackendClient,
    chanid: &str,
    starttime: &str,
) -> Result<Option<i64>> {
    let start = timefmt::parse_iso8601(starttime)?;
    let start_utc = timefmt::utc_string(&start);

    let resp = client
        .get(
            "Dvr/RecordedIdForKey",
            &[
                ("ChanId", chanid.to_owned()),
                ("StartTime", start_utc.clone()),
            ],
        )
        .await
        .with_context(|| format!("RecordedIdForKey ChanId {chanid} StartTime {start_utc}"))?;

    let id = expect_int(&resp)?;
    if id < 0 {
        info!("Failed to find RecordingId for ChanId {chanid} StartTime {start_utc}");
        return Ok(None);
    }
    Ok(Some(id))
}

/// Stop an in-progress recording by RecordedId.
pub async fn stop_recording(client: &BackendClient, recorded_id: i64) -> Result<()> {
    let resp = client
        .get_mut(
            "Dvr/StopRecording",
            &[("RecordedId", recorded_id.to_string())],
        )
        .await
        .with_context(|| format!("Unable to stop recording with Id {recorded_id}"))?;
    if !expect_bool(&resp)? {
        bail!("Failed to stop RecordingId {recorded_id:?}");
    }
    info!("RecordingId {recorded_id:?} has been stopped");
    Ok(())
}

/// Reactivate a stopped recording by RecordedId.
pub async fn reactivate_recording(client: &BackendClient, recorded_id: i64) -> Result<()> {
    let resp = client
        .get_mut(
            "Dvr/ReactivateRecording",
            &[("RecordedId", recorded_id.to_string())],
        )
        .await
        .with_context(|| format!("Unable to reactivate recording with Id {recorded_id}"))?;
    if !expect_bool(&resp)? {
        bail!("Failed to reactivate recording with Id {recorded_id:?}");
    }
    info!("Recorded Id {recorded_id} has been reactivated");
    Ok(())
}
