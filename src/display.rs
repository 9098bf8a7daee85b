//! Report formatting for the command line tools
//!
//! Every report computes its own column widths from the rows it is
//! about to print, so formatting is a pure function of its input.

use anyhow::Result;
use chrono::{DateTime, Utc};
use regex::Regex;

use crate::models::{
    program_flags_label, rec_status_label, CaptureCard, ChannelInfo, Program, RecRule, VideoSource,
};
use crate::timefmt;

pub const YELLOW: &str = "\x1b[93m";
pub const WHITE: &str = "\x1b[0m";

fn width<'a, I>(floor: usize, values: I) -> usize
where
    I: IntoIterator<Item = &'a str>,
{
    values
        .into_iter()
        .map(str::len)
        .fold(floor, usize::max)
}

/// One line per recording rule, columns sized to the rule set.
pub fn rule_lines(rules: &[RecRule]) -> Vec<String> {
    let id_w = width(2, rules.iter().map(|r| r.id.as_str()));
    let chanid_w = width(6, rules.iter().map(|r| r.chan_id.as_str()));
    let callsign_w = width(5, rules.iter().map(|r| r.call_sign.as_str()));
    let rectype_w = width(5, rules.iter().map(|r| r.rule_type.as_str()));
    let title_w = width(5, rules.iter().map(|r| r.title.as_str()));
    let start_w = width(5, rules.iter().map(|r| r.start_time.as_str()));
    let end_w = width(5, rules.iter().map(|r| r.end_time.as_str()));
    let priority_w = width(5, rules.iter().map(|r| r.rec_priority.as_str()));
    let inactive_w = width(5, rules.iter().map(|r| r.inactive.as_str()));
    let profile_w = width(5, rules.iter().map(|r| r.rec_profile.as_str()));
    let recgroup_w = width(5, rules.iter().map(|r| r.rec_group.as_str()));
    let playgroup_w = width(5, rules.iter().map(|r| r.play_group.as_str()));
    let expire_w = width(5, rules.iter().map(|r| r.auto_expire.as_str()));

    rules
        .iter()
        .map(|r| {
            format!(
                "{:>id_w$}: {:>chanid_w$} {:callsign_w$} {:rectype_w$} {:title_w$} \
                 Start:{:start_w$}  End:{:end_w$}  Priority:{:priority_w$}  \
                 Inactive:{:inactive_w$}  Profile:{:profile_w$} RecGroup:{:recgroup_w$} \
                 PlayGroup:{:playgroup_w$} Expire:{:expire_w$}",
                r.id,
                r.chan_id,
                r.call_sign,
                r.rule_type,
                r.title,
                r.start_time,
                r.end_time,
                r.rec_priority,
                r.inactive,
                r.rec_profile,
                r.rec_group,
                r.play_group,
                r.auto_expire,
            )
        })
        .collect()
}

/// One line per recording template.
pub fn template_lines(templates: &[RecRule]) -> Vec<String> {
    let id_w = width(2, templates.iter().map(|r| r.id.as_str()));
    let rectype_w = width(5, templates.iter().map(|r| r.rule_type.as_str()));
    let title_w = width(5, templates.iter().map(|r| r.title.as_str()));
    let priority_w = width(5, templates.iter().map(|r| r.rec_priority.as_str()));
    let profile_w = width(5, templates.iter().map(|r| r.rec_profile.as_str()));
    let recgroup_w = width(5, templates.iter().map(|r| r.rec_group.as_str()));
    let playgroup_w = width(5, templates.iter().map(|r| r.play_group.as_str()));
    let expire_w = width(5, templates.iter().map(|r| r.auto_expire.as_str()));

    templates
        .iter()
        .map(|r| {
            format!(
                "{:>id_w$}: {:rectype_w$} {:title_w$} Priority:{:priority_w$}  \
                 Profile:{:profile_w$} RecGroup:{:recgroup_w$} \
                 PlayGroup:{:playgroup_w$} Expire:{:expire_w$}",
                r.id,
                r.rule_type,
                r.title,
                r.rec_priority,
                r.rec_profile,
                r.rec_group,
                r.play_group,
                r.auto_expire,
            )
        })
        .collect()
}

pub fn source_line(source: &VideoSource) -> String {
    format!("{}: {}", source.id, source.source_name)
}

/// Channel line, flagging channels the guide hides.
pub fn channel_line(channel: &ChannelInfo) -> String {
    let errata = if crate::client::parse_flag(&channel.visible).unwrap_or(true) {
        ""
    } else {
        " --> Not visible"
    };
    format!(
        "{:>6}: {:>5} {:15} {}{}",
        channel.chan_id, channel.chan_num, channel.call_sign, channel.channel_name, errata
    )
}

/// Capture card table with a fixed-width header.
pub fn capture_card_lines(cards: &[CaptureCard]) -> Vec<String> {
    let mut lines = vec![format!(
        "{:>6}: {:10} {:15} {:10} {}",
        "Id", "Name", "CardType", "Input", "Host"
    )];
    for card in cards {
        let display = card.display_name.as_deref().unwrap_or("Not Set");
        let input = card.input_name.as_deref().unwrap_or("Not Set");
        lines.push(format!(
            "{:>6}: {:10} {:15} {:10} {}",
            card.card_id, display, card.card_type, input, card.host_name
        ));
    }
    lines
}

/// Row selection for the upcoming-recordings report.
#[derive(Debug, Clone)]
pub struct UpcomingFilter {
    pub days: i64,
    pub title: Option<String>,
    pub chanid: Option<String>,
    pub current_only: bool,
}

impl Default for UpcomingFilter {
    fn default() -> Self {
        Self {
            days: 99,
            title: None,
            chanid: None,
            current_only: false,
        }
    }
}

struct UpcomingRow {
    recorded_id: String,
    input: String,
    chanid: String,
    start: String,
    title: String,
    subtitle: String,
    status: String,
    flags: String,
}

/// Render the upcoming-recordings report.
///
/// Programs arrive sorted by StartTime; the days limit cuts the list
/// off at the first row beyond the horizon. Returns the report lines
/// and the matched row count.
pub fn upcoming_report(
    programs: &[Program],
    filter: &UpcomingFilter,
    now: DateTime<Utc>,
) -> Result<(Vec<String>, usize)> {
    let title_re = match &filter.title {
        Some(pattern) => Some(Regex::new(&format!("(?i){pattern}"))?),
        None => None,
    };

    let mut rows: Vec<UpcomingRow> = Vec::new();
    for program in programs {
        let status: i32 = program.recording.status.parse().unwrap_or_default();
        let status = rec_status_label(status);
        if filter.current_only && status != "Recording" && status != "Recorded" {
            continue;
        }

        let startts = timefmt::parse_iso8601(&program.recording.start_ts)?;
        if (startts.with_timezone(&Utc) - now).num_days() >= filter.days {
            break;
        }

        if let Some(re) = &title_re {
            if !re.is_match(&program.title) {
                continue;
            }
        }
        if let Some(chanid) = &filter.chanid {
            if &program.channel.chan_id != chanid {
                continue;
            }
        }

        let flags: u32 = program.program_flags.parse().unwrap_or_default();
        let recorded_id = match program.recording.recorded_id.as_str() {
            "0" => String::new(),
            other => other.to_owned(),
        };
        rows.push(UpcomingRow {
            recorded_id,
            input: program.recording.encoder_name.clone(),
            chanid: program.channel.chan_id.clone(),
            start: timefmt::local_display(&startts),
            title: program.title.trim().to_owned(),
            subtitle: program.sub_title.trim().to_owned(),
            status: status.to_owned(),
            flags: program_flags_label(flags),
        });
    }

    let id_w = width(2, rows.iter().map(|r| r.recorded_id.as_str()));
    let input_w = width(5, rows.iter().map(|r| r.input.as_str()));
    let chanid_w = width(6, rows.iter().map(|r| r.chanid.as_str()));
    let start_w = width(5, rows.iter().map(|r| r.start.as_str()));
    let title_w = width(5, rows.iter().map(|r| r.title.as_str()));
    let sub_w = width(8, rows.iter().map(|r| r.subtitle.as_str()));
    let status_w = width(6, rows.iter().map(|r| r.status.as_str()));

    let mut lines = vec![format!(
        "{YELLOW}{:id_w$} {:input_w$} {:^chanid_w$} {:start_w$}  {:title_w$} \
         {:sub_w$}  {:status_w$} Flags{WHITE}",
        "Id", "Input", "ChanID", "StartTime", "Title", "SubTitle", "Status"
    )];
    let matched = rows.len();
    for row in &rows {
        lines.push(format!(
            "{:id_w$} {:input_w$} {:^chanid_w$} {:start_w$}  {:title_w$} \
             {:sub_w$}  {:status_w$} {}",
            row.recorded_id,
            row.input,
            row.chanid,
            row.start,
            row.title,
            row.subtitle,
            row.status,
            row.flags,
        ));
    }
    Ok((lines, matched))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordingInfo;

    fn rule(id: &str, title: &str) -> RecRule {
        RecRule {
            id: id.into(),
            chan_id: "80017".into(),
            call_sign: "WXYZ".into(),
            rule_type: "Record Daily".into(),
            title: title.into(),
            start_time: "2018-08-05T17:00:00Z".into(),
            end_time: "2018-08-05T18:00:00Z".into(),
            rec_priority: "0".into(),
            inactive: "false".into(),
            rec_profile: "Default".into(),
            rec_group: "Default".into(),
            play_group: "Default".into(),
            auto_expire: "true".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_rule_lines_widths_fit_longest_row() {
        let rules = vec![rule("7", "hour 17"), rule("1234", "a much longer title")];
        let lines = rule_lines(&rules);
        assert_eq!(lines.len(), 2);
        // Id column right-aligned to the widest id
        assert!(lines[0].starts_with("   7: "));
        assert!(lines[1].starts_with("1234: "));
        // Title column padded to the longest title
        assert!(lines[0].contains("hour 17             "));
    }

    #[test]
    fn test_channel_line_marks_invisible() {
        let mut channel = ChannelInfo {
            chan_id: "80017".into(),
            chan_num: "20.1".into(),
            call_sign: "WXYZ".into(),
            channel_name: "Community".into(),
            visible: "true".into(),
            ..Default::default()
        };
        assert!(!channel_line(&channel).contains("Not visible"));
        channel.visible = "false".into();
        assert!(channel_line(&channel).ends_with(" --> Not visible"));
    }

    #[test]
    fn test_capture_card_lines_default_missing_names() {
        let cards = vec![CaptureCard {
            card_id: "27".into(),
            card_type: "EXTERNAL".into(),
            host_name: "mythbe".into(),
            ..Default::default()
        }];
        let lines = capture_card_lines(&cards);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("Not Set"));
    }

    fn program(title: &str, chanid: &str, start: &str, status: &str) -> Program {
        Program {
            title: title.into(),
            sub_title: String::new(),
            program_flags: "4096".into(),
            channel: ChannelInfo {
                chan_id: chanid.into(),
                ..Default::default()
            },
            recording: RecordingInfo {
                encoder_name: "tuner1".into(),
                start_ts: start.into(),
                status: status.into(),
                recorded_id: "0".into(),
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_upcoming_report_filters_and_counts() {
        let now = timefmt::parse_iso8601("2018-08-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let programs = vec![
            program("NCIS", "80017", "2018-08-02T17:00:00Z", "-1"),
            program("Jeopardy", "80018", "2018-08-02T18:00:00Z", "-1"),
            program("NCIS", "80017", "2018-09-20T17:00:00Z", "-1"),
        ];

        let filter = UpcomingFilter {
            title: Some("ncis".into()),
            ..Default::default()
        };
        let (lines, matched) = upcoming_report(&programs, &filter, now).unwrap();
        assert_eq!(matched, 2);
        assert_eq!(lines.len(), 3);

        // The days horizon stops the scan at the first distant program.
        let filter = UpcomingFilter {
            days: 7,
            ..Default::default()
        };
        let (_, matched) = upcoming_report(&programs, &filter, now).unwrap();
        assert_eq!(matched, 2);
    }

    #[test]
    fn test_upcoming_report_current_only() {
        let now = timefmt::parse_iso8601("2018-08-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let programs = vec![
            program("NCIS", "80017", "2018-08-02T17:00:00Z", "-3"),
            program("Jeopardy", "80018", "2018-08-02T18:00:00Z", "-1"),
        ];
        let filter = UpcomingFilter {
            current_only: true,
            ..Default::default()
        };
        let (_, matched) = upcoming_report(&programs, &filter, now).unwrap();
        assert_eq!(matched, 1);
    }
}
