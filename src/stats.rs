use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime, Timelike};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};

use crate::record::Record;
use crate::timestamp;

/// Speeds strictly above this are critical events.
pub const CRITICAL_SPEED_KMH: f64 = 80.0;

/// Number of plates reported by [`Statistics::top_plates`].
pub const TOP_PLATES: usize = 10;

const MONTH_ABBREVIATIONS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Upper bound (inclusive) of each speed band; anything above the last is `121+`.
const SPEED_BANDS: [(&str, f64); 4] = [
    ("0-30", 30.0),
    ("31-60", 60.0),
    ("61-90", 90.0),
    ("91-120", 120.0),
];
const TOP_SPEED_BAND: &str = "121+";

/// Ordered label -> value mapping. Serializes as a JSON object in stored order.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram<V> {
    entries: Vec<(String, V)>,
}

impl<V> Default for Histogram<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<V> Histogram<V> {
    pub fn get(&self, label: &str) -> Option<&V> {
        self.entries
            .iter()
            .find(|(key, _)| key == label)
            .map(|(_, value)| value)
    }

    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(|(key, _)| key.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Histogram<u64> {
    pub fn total(&self) -> u64 {
        self.entries.iter().map(|(_, count)| count).sum()
    }
}

impl<V> FromIterator<(String, V)> for Histogram<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<V: Serialize> Serialize for Histogram<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Summary {
    pub total: usize,
    #[serde(rename = "regioes")]
    pub regions: usize,
    #[serde(rename = "veloc_media")]
    pub average_speed: f64,
    #[serde(rename = "eventos_criticos")]
    pub critical_events: usize,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Statistics {
    /// Events per hour of day.
    #[serde(rename = "diario")]
    pub hourly: Histogram<u64>,
    #[serde(rename = "semanal")]
    pub weekly: Histogram<u64>,
    #[serde(rename = "mensal")]
    pub monthly: Histogram<u64>,
    #[serde(rename = "regiao")]
    pub region: Histogram<u64>,
    #[serde(rename = "velocidade_semana")]
    pub weekly_avg_speed: Histogram<f64>,
    #[serde(rename = "velocidade_faixa")]
    pub speed_band: Histogram<u64>,
    #[serde(rename = "top_placas")]
    pub top_plates: Histogram<u64>,
    #[serde(rename = "pico_horas")]
    pub heatmap: Histogram<u64>,
}

/// Comma-tolerant speed parse; `None` for text that is not a finite number.
pub fn parse_speed(raw: &str) -> Option<f64> {
    raw.trim()
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

fn speed_or_zero(raw: &str) -> f64 {
    parse_speed(raw).unwrap_or(0.0)
}

fn each<R: Borrow<Record>>(records: &[R]) -> impl Iterator<Item = &Record> {
    records.iter().map(Borrow::<Record>::borrow)
}

/// One decimal, ties to even on the exact binary value.
fn round1(value: f64) -> f64 {
    format!("{value:.1}").parse().unwrap_or(value)
}

pub fn summarize<R: Borrow<Record>>(records: &[R]) -> Summary {
    let mut regions = std::collections::HashSet::new();
    let mut speed_sum = 0.0;
    let mut speed_count = 0usize;
    let mut critical_events = 0;

    for record in each(records) {
        if !record.region.is_empty() {
            regions.insert(record.region.as_str());
        }
        // an empty field averages as zero, unparsable text is left out
        let speed = if record.speed.trim().is_empty() {
            Some(0.0)
        } else {
            parse_speed(&record.speed)
        };
        if let Some(speed) = speed {
            speed_sum += speed;
            speed_count += 1;
        }
        if !record.speed.is_empty() && speed_or_zero(&record.speed) > CRITICAL_SPEED_KMH {
            critical_events += 1;
        }
    }

    let average_speed = if speed_count == 0 {
        0.0
    } else {
        round1(speed_sum / speed_count as f64)
    };

    Summary {
        total: records.len(),
        regions: regions.len(),
        average_speed,
        critical_events,
    }
}

/// Statistics relative to the local wall clock.
pub fn statistics<R: Borrow<Record>>(records: &[R]) -> Statistics {
    statistics_at(records, Local::now().naive_local())
}

pub fn statistics_at<R: Borrow<Record>>(records: &[R], now: NaiveDateTime) -> Statistics {
    let dated: Vec<(&Record, NaiveDateTime)> = each(records)
        .filter_map(|r| timestamp::to_datetime(r.timestamp).map(|dt| (r, dt)))
        .collect();

    let mut hourly: BTreeMap<String, u64> = BTreeMap::new();
    let mut monthly: BTreeMap<String, u64> = BTreeMap::new();
    let mut region: BTreeMap<String, u64> = BTreeMap::new();
    let mut heatmap: BTreeMap<(u32, u32), u64> = BTreeMap::new();

    for (record, dt) in &dated {
        *hourly.entry(dt.format("%Hh").to_string()).or_default() += 1;
        *monthly.entry(month_label(dt.date())).or_default() += 1;
        let region_key = if record.region.is_empty() {
            "N/A".to_string()
        } else {
            record.region.clone()
        };
        *region.entry(region_key).or_default() += 1;
        *heatmap
            .entry((dt.weekday().num_days_from_monday(), dt.hour()))
            .or_default() += 1;
    }

    let days = weekly_days(&dated, now);

    Statistics {
        hourly: hourly.into_iter().collect(),
        weekly: days
            .iter()
            .map(|(day, (count, _))| (day_label(*day), *count))
            .collect(),
        monthly: monthly.into_iter().collect(),
        region: region.into_iter().collect(),
        weekly_avg_speed: days
            .iter()
            .map(|(day, (count, sum))| (day_label(*day), round1(sum / *count as f64)))
            .collect(),
        speed_band: speed_bands(records),
        top_plates: top_plates(records),
        heatmap: heatmap
            .into_iter()
            .map(|((weekday, hour), count)| (format!("{weekday}-{hour}"), count))
            .collect(),
    }
}

type MonthDay = (u32, u32);

fn day_label((month, day): MonthDay) -> String {
    format!("{day:02}/{month:02}")
}

fn month_label(date: NaiveDate) -> String {
    format!("{}/{}", MONTH_ABBREVIATIONS[date.month0() as usize], date.year())
}

/// Per-day (count, speed sum) for the calendar week containing `now`, or the
/// trailing seven days when that week has no events. Keyed by (month, day),
/// so a week spanning New Year lists January first.
fn weekly_days(
    dated: &[(&Record, NaiveDateTime)],
    now: NaiveDateTime,
) -> BTreeMap<MonthDay, (u64, f64)> {
    let week_start =
        now.date() - Duration::days(i64::from(now.weekday().num_days_from_monday()));
    let week_end = week_start + Duration::days(6);
    let current_week = bucket_days(
        dated
            .iter()
            .filter(|(_, dt)| dt.date() >= week_start && dt.date() <= week_end),
    );
    if !current_week.is_empty() {
        return current_week;
    }
    let window_start = now - Duration::days(7);
    bucket_days(
        dated
            .iter()
            .filter(|(_, dt)| *dt >= window_start && *dt <= now),
    )
}

fn bucket_days<'a, 'r: 'a>(
    events: impl Iterator<Item = &'a (&'r Record, NaiveDateTime)>,
) -> BTreeMap<MonthDay, (u64, f64)> {
    let mut days: BTreeMap<MonthDay, (u64, f64)> = BTreeMap::new();
    for (record, dt) in events {
        let day = days.entry((dt.month(), dt.day())).or_default();
        day.0 += 1;
        day.1 += speed_or_zero(&record.speed);
    }
    days
}

fn speed_band_label(speed: f64) -> &'static str {
    SPEED_BANDS
        .iter()
        .find(|(_, upper)| speed <= *upper)
        .map(|(label, _)| *label)
        .unwrap_or(TOP_SPEED_BAND)
}

fn speed_bands<R: Borrow<Record>>(records: &[R]) -> Histogram<u64> {
    let mut counts: Vec<(String, u64)> = SPEED_BANDS
        .iter()
        .map(|(label, _)| label.to_string())
        .chain(std::iter::once(TOP_SPEED_BAND.to_string()))
        .map(|label| (label, 0))
        .collect();
    for record in each(records) {
        let label = speed_band_label(speed_or_zero(&record.speed));
        if let Some((_, count)) = counts.iter_mut().find(|(key, _)| key == label) {
            *count += 1;
        }
    }
    counts.into_iter().collect()
}

fn top_plates<R: Borrow<Record>>(records: &[R]) -> Histogram<u64> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut counts: Vec<(&str, u64)> = Vec::new();
    for record in each(records) {
        let plate = record.plate.as_str();
        match positions.get(plate) {
            Some(&idx) => counts[idx].1 += 1,
            None => {
                positions.insert(plate, counts.len());
                counts.push((plate, 1));
            }
        }
    }
    // stable sort keeps first-seen order among equal counts
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
        .into_iter()
        .take(TOP_PLATES)
        .map(|(plate, count)| (plate.to_string(), count))
        .collect()
}
