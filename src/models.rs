//! Data models for the MythTV Services API
//!
//! Every scalar the backend returns is a JSON string, so the models keep
//! string fields and leave interpretation to the call sites. `RecRule`
//! doubles as the postdata for `Dvr/AddRecordSchedule`, so unknown fields
//! are carried through a flattened map instead of being dropped.

use serde::{Deserialize, Serialize};

/// Recording rule type as selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    All,
    Daily,
    One,
    Single,
    Weekly,
}

impl RecordType {
    /// Backend-facing rule type string
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::All => "Record All",
            RecordType::Daily => "Record Daily",
            RecordType::One => "Record One",
            RecordType::Single => "Single Record",
            RecordType::Weekly => "Record Weekly",
        }
    }
}

impl std::str::FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "All" => Ok(RecordType::All),
            "Daily" => Ok(RecordType::Daily),
            "One" => Ok(RecordType::One),
            "Single" => Ok(RecordType::Single),
            "Weekly" => Ok(RecordType::Weekly),
            _ => Err(format!(
                "Unknown record type: {} (expected All, Daily, One, Single or Weekly)",
                s
            )),
        }
    }
}

/// A recording rule as stored on the backend.
///
/// Templates are regular rules with `Id == "-1"`. The backend accepts the
/// same shape back as postdata, minus a few server-maintained fields (see
/// `rules::rule_postdata`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct RecRule {
    pub id: String,
    pub title: String,
    pub sub_title: String,
    pub description: String,
    #[serde(rename = "Type")]
    pub rule_type: String,
    pub chan_id: String,
    pub start_time: String,
    pub end_time: String,
    pub search_type: String,
    pub inactive: String,
    pub rec_priority: String,
    pub rec_profile: String,
    pub rec_group: String,
    pub play_group: String,
    pub auto_expire: String,
    pub call_sign: String,
    pub station: String,
    pub category: String,
    pub series_id: String,
    pub find_time: String,
    pub season: String,
    pub episode: String,
    /// Fields we do not interpret, passed through untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecRuleWrapper {
    #[serde(rename = "RecRule")]
    pub rec_rule: RecRule,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RecRuleList {
    #[serde(rename = "RecRules")]
    pub rec_rules: Vec<RecRule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecRuleListWrapper {
    #[serde(rename = "RecRuleList")]
    pub rec_rule_list: RecRuleList,
}

/// A configured video source (guide data origin)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct VideoSource {
    pub id: String,
    pub source_name: String,
    pub grabber: String,
    pub freq_table: String,
    pub use_eit: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VideoSourceList {
    #[serde(rename = "VideoSources")]
    pub video_sources: Vec<VideoSource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoSourceListWrapper {
    #[serde(rename = "VideoSourceList")]
    pub video_source_list: VideoSourceList,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ChannelInfo {
    pub chan_id: String,
    pub chan_num: String,
    pub call_sign: String,
    pub channel_name: String,
    pub visible: String,
    pub source_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChannelInfoList {
    #[serde(rename = "ChannelInfos")]
    pub channel_infos: Vec<ChannelInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelInfoListWrapper {
    #[serde(rename = "ChannelInfoList")]
    pub channel_info_list: ChannelInfoList,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelInfoWrapper {
    #[serde(rename = "ChannelInfo")]
    pub channel_info: ChannelInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct CaptureCard {
    pub card_id: String,
    pub card_type: String,
    pub video_device: String,
    pub host_name: String,
    pub display_name: Option<String>,
    pub input_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CaptureCardList {
    #[serde(rename = "CaptureCards")]
    pub capture_cards: Vec<CaptureCard>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureCardListWrapper {
    #[serde(rename = "CaptureCardList")]
    pub capture_card_list: CaptureCardList,
}

/// Guide or upcoming-list program entry
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Program {
    pub title: String,
    pub sub_title: String,
    pub category: String,
    pub start_time: String,
    pub end_time: String,
    pub program_flags: String,
    pub channel: ChannelInfo,
    pub recording: RecordingInfo,
}

/// The `Recording` block attached to upcoming-list programs
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct RecordingInfo {
    pub encoder_name: String,
    pub start_ts: String,
    pub status: String,
    pub recorded_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ProgramList {
    pub total_available: String,
    pub programs: Vec<Program>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProgramListWrapper {
    #[serde(rename = "ProgramList")]
    pub program_list: ProgramList,
}

/// Map a MythTV RecStatus value to its display label.
///
/// From libs/libmyth/recordingstatus.h; only the values the tools print.
pub fn rec_status_label(status: i32) -> &'static str {
    match status {
        -15 => "Pending",
        -14 => "Failing",
        -11 => "MissedFuture",
        -10 => "Tuning",
        -9 => "Failed",
        -8 => "TunerBusy",
        -7 => "LowDiskSpace",
        -6 => "Cancelled",
        -5 => "Missed",
        -4 => "Aborted",
        -3 => "Recorded",
        -2 => "Recording",
        -1 => "WillRecord",
        0 => "Unknown",
        1 => "DontRecord",
        2 => "PreviousRecording",
        3 => "CurrentRecording",
        4 => "EarlierShowing",
        5 => "TooManyRecordings",
        6 => "NotListed",
        7 => "Conflict",
        8 => "LaterShowing",
        9 => "Repeat",
        10 => "Inactive",
        11 => "NeverRecord",
        12 => "Offline",
        _ => "Unknown",
    }
}

/// Render the decimal ProgramFlags field as a short string.
///
/// From libs/libmyth/programtypes.h. `<` and `>` mark defined bits this
/// tool does not decode.
pub fn program_flags_label(flags: u32) -> String {
    let mut parts = Vec::new();
    if flags & 0x00fff != 0 {
        parts.push("<");
    }
    if flags & (1 << 12) != 0 {
        parts.push("Rerun");
    }
    if flags & (1 << 13) != 0 {
        parts.push("Dup");
    }
    if flags & (1 << 14) != 0 {
        parts.push("React");
    }
    if flags & 0xf8000 != 0 {
        parts.push(">");
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_type_mapping() {
        assert_eq!(RecordType::All.as_str(), "Record All");
        assert_eq!(RecordType::Single.as_str(), "Single Record");
        assert_eq!(RecordType::One.as_str(), "Record One");
        assert_eq!("Weekly".parse::<RecordType>().unwrap(), RecordType::Weekly);
        assert!("24x7".parse::<RecordType>().is_err());
    }

    #[test]
    fn test_rec_rule_roundtrip_keeps_unknown_fields() {
        let json = serde_json::json!({
            "Id": "42",
            "Title": "NCIS",
            "Type": "Record All",
            "ChanId": "80017",
            "StartTime": "2018-08-05T17:00:00Z",
            "LastRecorded": "2018-08-04T17:00:00Z",
            "AverageDelay": "0"
        });

        let rule: RecRule = serde_json::from_value(json).unwrap();
        assert_eq!(rule.id, "42");
        assert_eq!(rule.rule_type, "Record All");
        assert!(rule.extra.contains_key("LastRecorded"));
        assert!(rule.extra.contains_key("AverageDelay"));

        let back = serde_json::to_value(&rule).unwrap();
        assert_eq!(back["LastRecorded"], "2018-08-04T17:00:00Z");
    }

    #[test]
    fn test_rec_status_labels() {
        assert_eq!(rec_status_label(-3), "Recorded");
        assert_eq!(rec_status_label(-2), "Recording");
        assert_eq!(rec_status_label(-1), "WillRecord");
        assert_eq!(rec_status_label(7), "Conflict");
        assert_eq!(rec_status_label(99), "Unknown");
    }

    #[test]
    fn test_program_flags_label() {
        assert_eq!(program_flags_label(1 << 12), "Rerun");
        assert_eq!(program_flags_label((1 << 12) | (1 << 13)), "Rerun, Dup");
        assert_eq!(program_flags_label(0x1 | (1 << 14)), "<, React");
        assert_eq!(program_flags_label(0), "");
    }
}
