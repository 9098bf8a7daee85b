//! ISO-8601 parsing and UTC normalization
//!
//! The backend transports every timestamp as UTC with a `Z` suffix. User
//! input arrives as compact (`20180805T170000`) or extended
//! (`2018-08-05T17:00:00`) ISO-8601, optionally carrying `Z` or a signed
//! offset; naive input is interpreted in the local system timezone.

use anyhow::{bail, Context, Result};
use chrono::{
    DateTime, Datelike, Duration, FixedOffset, Local, LocalResult, NaiveDate, NaiveDateTime,
    TimeZone, Utc, Weekday,
};

/// Parse an ISO-8601 date-time string into an aware instant.
///
/// Accepted shapes: `YYYY[-]MM[-]DDTHH[:]MM[:]SS[<tz>]` where `<tz>` is
/// `Z`, `±HH`, `±HHMM` or `±HH:MM`. Date and time separators must agree:
/// `2018-01-01T050000` is rejected. Without a suffix the local timezone is
/// assumed; a wall-clock time that does not exist locally (DST gap) is an
/// error, an ambiguous one resolves to the earlier offset.
pub fn parse_iso8601(input: &str) -> Result<DateTime<FixedOffset>> {
    let (naive_part, offset) = split_timezone(input)?;
    let naive = parse_naive(naive_part)
        .with_context(|| format!("invalid ISO-8601 date-time: {input:?}"))?;

    match offset {
        Some(offset) => offset
            .from_local_datetime(&naive)
            .single()
            .with_context(|| format!("invalid offset in {input:?}")),
        None => local_from_naive(naive),
    }
}

/// Interpret a naive wall-clock time in the local system timezone.
pub fn local_from_naive(naive: NaiveDateTime) -> Result<DateTime<FixedOffset>> {
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt.fixed_offset()),
        // Fall-back transition: the earlier of the two readings
        LocalResult::Ambiguous(earlier, _later) => Ok(earlier.fixed_offset()),
        LocalResult::None => bail!("local time {naive} does not exist (DST transition)"),
    }
}

/// Normalize to the transport format: UTC with a `Z` suffix.
pub fn utc_string<Tz: TimeZone>(dt: &DateTime<Tz>) -> String {
    dt.with_timezone(&Utc)
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}

/// Local wall-clock form for display, seconds precision.
pub fn local_display<Tz: TimeZone>(dt: &DateTime<Tz>) -> String {
    dt.with_timezone(&Local)
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string()
}

/// First `weekday` on or after `date`.
pub fn weekday_on_or_after(date: NaiveDate, weekday: Weekday) -> NaiveDate {
    let ahead =
        (weekday.num_days_from_monday() + 7 - date.weekday().num_days_from_monday()) % 7;
    date + Duration::days(i64::from(ahead))
}

/// The weekly scheduling anchor: the first Saturday on or after 2018-01-01.
///
/// Any Saturday works since the schedule repeats weekly; this one is stable.
pub fn anchor_saturday() -> NaiveDate {
    let jan_first = NaiveDate::from_ymd_opt(2018, 1, 1).expect("valid calendar date");
    weekday_on_or_after(jan_first, Weekday::Sat)
}

fn parse_naive(s: &str) -> Result<NaiveDateTime> {
    // Length dispatch keeps the date and time separators in agreement:
    // either both sets are present (19 chars) or both absent (15 chars).
    let parsed = match s.len() {
        19 => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"),
        15 => NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S"),
        _ => bail!("expected YYYY[-]MM[-]DDTHH[:]MM[:]SS, got {s:?}"),
    };
    parsed.with_context(|| format!("expected YYYY[-]MM[-]DDTHH[:]MM[:]SS, got {s:?}"))
}

/// Split a trailing timezone designator off `input`. `None` means no
/// designator was present.
fn split_timezone(input: &str) -> Result<(&str, Option<FixedOffset>)> {
    if let Some(rest) = input.strip_suffix('Z') {
        let utc = FixedOffset::east_opt(0).context("zero offset")?;
        return Ok((rest, Some(utc)));
    }

    // A sign is only a designator after the date/time separator 'T'.
    let t_pos = match input.find('T') {
        Some(pos) => pos,
        None => return Ok((input, None)),
    };
    let sign_pos = match input[t_pos + 1..]
        .rfind(|c| c == '+' || c == '-')
        .map(|p| p + t_pos + 1)
    {
        Some(pos) => pos,
        None => return Ok((input, None)),
    };

    let (head, designator) = input.split_at(sign_pos);
    let offset = parse_offset(designator)?;
    Ok((head, Some(offset)))
}

fn parse_offset(designator: &str) -> Result<FixedOffset> {
    let negative = designator.starts_with('-');
    let digits = &designator[1..];

    let (hh, mm) = match digits.len() {
        2 => (digits, "0"),
        4 => (&digits[..2], &digits[2..]),
        5 if digits.as_bytes()[2] == b':' => (&digits[..2], &digits[3..]),
        _ => bail!("invalid timezone offset: {designator:?}"),
    };

    let hours: i32 = hh
        .parse()
        .with_context(|| format!("invalid offset hours in {designator:?}"))?;
    let minutes: i32 = mm
        .parse()
        .with_context(|| format!("invalid offset minutes in {designator:?}"))?;
    if hours > 23 || minutes > 59 {
        bail!("timezone offset out of range: {designator:?}");
    }

    let mut seconds = hours * 3600 + minutes * 60;
    if negative {
        seconds = -seconds;
    }
    FixedOffset::east_opt(seconds).with_context(|| format!("offset out of range: {designator:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extended_with_zulu() {
        let dt = parse_iso8601("2018-08-05T17:00:00Z").unwrap();
        assert_eq!(utc_string(&dt), "2018-08-05T17:00:00Z");
    }

    #[test]
    fn test_compact_with_zulu() {
        let dt = parse_iso8601("20180805T170000Z").unwrap();
        assert_eq!(utc_string(&dt), "2018-08-05T17:00:00Z");
    }

    #[test]
    fn test_mixed_separators_rejected() {
        assert!(parse_iso8601("2018-01-01T050000").is_err());
        assert!(parse_iso8601("20180101T05:00:00").is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(parse_iso8601("not a date").is_err());
        assert!(parse_iso8601("2018-13-01T05:00:00").is_err());
        assert!(parse_iso8601("2018-01-32T05:00:00").is_err());
        assert!(parse_iso8601("2018-01-01T24:00:00").is_err());
        assert!(parse_iso8601("").is_err());
    }

    #[test]
    fn test_offset_variants() {
        let plain = parse_iso8601("2018-08-05T17:00:00+05").unwrap();
        let compact = parse_iso8601("2018-08-05T17:00:00+0500").unwrap();
        let extended = parse_iso8601("2018-08-05T17:00:00+05:00").unwrap();
        assert_eq!(plain, compact);
        assert_eq!(compact, extended);
        assert_eq!(utc_string(&extended), "2018-08-05T12:00:00Z");

        let west = parse_iso8601("2018-08-05T17:00:00-06:00").unwrap();
        assert_eq!(utc_string(&west), "2018-08-05T23:00:00Z");
    }

    #[test]
    fn test_offset_out_of_range_rejected() {
        assert!(parse_iso8601("2018-08-05T17:00:00+24").is_err());
        assert!(parse_iso8601("2018-08-05T17:00:00+0560").is_err());
        assert!(parse_iso8601("2018-08-05T17:00:00+5").is_err());
    }

    #[test]
    fn test_utc_roundtrip_idempotent() {
        for input in [
            "2018-01-06T00:00:00Z",
            "2018-08-05T17:00:00Z",
            "2024-02-29T23:59:59Z",
        ] {
            let once = utc_string(&parse_iso8601(input).unwrap());
            assert_eq!(once, input);
            let twice = utc_string(&parse_iso8601(&once).unwrap());
            assert_eq!(twice, once);
        }
    }

    #[test]
    fn test_no_suffix_uses_local_offset() {
        let dt = parse_iso8601("2018-08-05T17:00:00").unwrap();
        let naive = NaiveDate::from_ymd_opt(2018, 8, 5)
            .unwrap()
            .and_hms_opt(17, 0, 0)
            .unwrap();
        let expected = local_from_naive(naive).unwrap();
        assert_eq!(dt, expected);
        assert_eq!(dt.offset(), expected.offset());
    }

    #[test]
    fn test_anchor_is_first_saturday_of_2018() {
        let anchor = anchor_saturday();
        assert_eq!(anchor, NaiveDate::from_ymd_opt(2018, 1, 6).unwrap());
        assert_eq!(anchor.weekday(), Weekday::Sat);
    }

    #[test]
    fn test_weekday_on_or_after_is_identity_on_match() {
        let sat = NaiveDate::from_ymd_opt(2018, 1, 6).unwrap();
        assert_eq!(weekday_on_or_after(sat, Weekday::Sat), sat);
        assert_eq!(
            weekday_on_or_after(sat, Weekday::Sun),
            NaiveDate::from_ymd_opt(2018, 1, 7).unwrap()
        );
    }
}
