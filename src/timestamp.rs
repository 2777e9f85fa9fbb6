use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Value returned when a datetime string cannot be normalized.
pub const INVALID: i64 = 0;

/// Exact layouts accepted from the feed, tried in order.
const FEED_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const ISO_NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const ISO_OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%:z"];

/// Converts a free-form feed datetime into seconds since the epoch.
///
/// Wall-clock values without an offset are read as UTC so the result does not
/// depend on the host timezone. Returns [`INVALID`] when nothing matches.
pub fn parse(raw: &str) -> i64 {
    let raw = raw.trim();
    if raw.is_empty() {
        return INVALID;
    }
    let seconds = FEED_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc().timestamp())
        .or_else(|| parse_iso(raw.strip_suffix('Z').unwrap_or(raw)));
    match seconds {
        Some(ts) if ts > INVALID => ts,
        _ => INVALID,
    }
}

fn parse_iso(raw: &str) -> Option<i64> {
    if let Some(naive) = ISO_NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    {
        return Some(naive.and_utc().timestamp());
    }
    if let Some(aware) = ISO_OFFSET_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(raw, fmt).ok())
    {
        return Some(aware.timestamp());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().timestamp())
}

/// Recovers the wall-clock datetime a normalized timestamp was produced from.
pub fn to_datetime(ts: i64) -> Option<NaiveDateTime> {
    if ts <= INVALID {
        return None;
    }
    DateTime::from_timestamp(ts, 0).map(|dt| dt.naive_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instant() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 0)
            .unwrap()
    }

    #[test]
    fn round_trips_every_feed_format() {
        let expected = instant().and_utc().timestamp();
        for fmt in FEED_FORMATS {
            let rendered = instant().format(fmt).to_string();
            assert_eq!(parse(&rendered), expected, "format {fmt} rendered as {rendered}");
        }
    }

    #[test]
    fn day_first_format_is_not_confused_with_month_first() {
        let ts = parse("02/01/2024 08:00:00");
        let dt = to_datetime(ts).expect("valid");
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2024-01-02");
    }

    #[test]
    fn accepts_iso_with_trailing_zulu_and_fraction() {
        let base = parse("2024-03-09 14:05:00");
        assert_eq!(parse("2024-03-09T14:05:00Z"), base);
        assert_eq!(parse("2024-03-09T14:05:00.250Z"), base);
        assert_eq!(parse("2024-03-09T14:05"), base);
    }

    #[test]
    fn honours_explicit_offsets() {
        let utc = parse("2024-03-09 14:05:00");
        assert_eq!(parse("2024-03-09T11:05:00-03:00"), utc);
    }

    #[test]
    fn date_only_maps_to_midnight() {
        assert_eq!(parse("2024-03-09"), parse("2024-03-09 00:00:00"));
    }

    #[test]
    fn garbage_and_pre_epoch_values_are_invalid() {
        assert_eq!(parse(""), INVALID);
        assert_eq!(parse("yesterday"), INVALID);
        assert_eq!(parse("31/02/2024 10:00"), INVALID);
        assert_eq!(parse("1960-01-01 00:00:00"), INVALID);
        assert!(to_datetime(INVALID).is_none());
    }
}
