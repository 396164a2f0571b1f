use std::fmt;

use chrono::NaiveDate;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Feed payload
// ---------------------------------------------------------------------------

/// Top-level body returned by the NeoWs feed endpoint.
#[derive(Debug, Deserialize)]
pub struct FeedResponse {
    pub element_count: Option<u64>,
    pub near_earth_objects: RawFeedPayload,
}

/// Day-keyed objects, in the order the days appear in the document.
#[derive(Debug, Clone, Default)]
pub struct RawFeedPayload {
    pub days: Vec<(String, Vec<NeoObject>)>,
}

impl RawFeedPayload {
    pub fn object_count(&self) -> usize {
        self.days.iter().map(|(_, objects)| objects.len()).sum()
    }
}

impl<'de> Deserialize<'de> for RawFeedPayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DaysVisitor;

        impl<'de> Visitor<'de> for DaysVisitor {
            type Value = RawFeedPayload;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of dates to arrays of near-earth objects")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut days = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((date, objects)) = map.next_entry::<String, Vec<NeoObject>>()? {
                    days.push((date, objects));
                }
                Ok(RawFeedPayload { days })
            }
        }

        deserializer.deserialize_map(DaysVisitor)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NeoObject {
    pub id: String,
    pub neo_reference_id: String,
    pub name: String,
    pub nasa_jpl_url: String,
    pub absolute_magnitude_h: f64,
    pub estimated_diameter: EstimatedDiameter,
    pub is_potentially_hazardous_asteroid: bool,
    pub is_sentry_object: bool,
    pub close_approach_data: Vec<CloseApproach>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EstimatedDiameter {
    pub kilometers: DiameterRange,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiameterRange {
    pub estimated_diameter_min: f64,
    pub estimated_diameter_max: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CloseApproach {
    pub close_approach_date: String,
    pub epoch_date_close_approach: i64,
    pub relative_velocity: RelativeVelocity,
    pub miss_distance: MissDistance,
    pub orbiting_body: String,
}

/// The feed sends velocities and distances as decimal strings; numbers are
/// accepted too. Either way the text is kept as received.
#[derive(Debug, Clone, Deserialize)]
pub struct RelativeVelocity {
    #[serde(deserialize_with = "decimal_text")]
    pub kilometers_per_second: String,
    #[serde(deserialize_with = "decimal_text")]
    pub kilometers_per_hour: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MissDistance {
    #[serde(deserialize_with = "decimal_text")]
    pub kilometers: String,
    #[serde(deserialize_with = "decimal_text")]
    pub lunar: String,
}

fn decimal_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!("expected decimal string or number, got {other}"))),
    }
}

// ---------------------------------------------------------------------------
// Date range
// ---------------------------------------------------------------------------

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// `days` calendar days ending at (and including) `end`.
    pub fn trailing(end: NaiveDate, days: i64) -> Self {
        let start = end - chrono::Duration::days(days.max(1) - 1);
        Self { start, end }
    }

    pub fn start_str(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    pub fn end_str(&self) -> String {
        self.end.format("%Y-%m-%d").to_string()
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start_str(), self.end_str())
    }
}

// ---------------------------------------------------------------------------
// Tabular rows
// ---------------------------------------------------------------------------

/// A record with a fixed, ordered set of named columns.
pub trait TabularRow {
    fn field_names(&self) -> &'static [&'static str];
    /// Stringified values, in `field_names` order.
    fn values(&self) -> Vec<String>;
}

/// One object and its first close approach, flattened.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatRow {
    pub approach_date: String,
    pub epoch_date_close_approach: i64,
    pub neo_id: String,
    pub neo_reference_id: String,
    pub name: String,
    pub nasa_jpl_url: String,
    pub absolute_magnitude_h: f64,
    pub estimated_diameter_min_km: f64,
    pub estimated_diameter_max_km: f64,
    pub is_potentially_hazardous_asteroid: bool,
    pub is_sentry_object: bool,
    pub relative_velocity_km_s: String,
    pub relative_velocity_km_h: String,
    pub miss_distance_km: String,
    pub miss_distance_lunar: String,
    pub orbiting_body: String,
}

impl FlatRow {
    pub const FIELDS: [&'static str; 16] = [
        "approach_date",
        "epoch_date_close_approach",
        "neo_id",
        "neo_reference_id",
        "name",
        "nasa_jpl_url",
        "absolute_magnitude_h",
        "estimated_diameter_min_km",
        "estimated_diameter_max_km",
        "is_potentially_hazardous_asteroid",
        "is_sentry_object",
        "relative_velocity_km_s",
        "relative_velocity_km_h",
        "miss_distance_km",
        "miss_distance_lunar",
        "orbiting_body",
    ];
}

impl TabularRow for FlatRow {
    fn field_names(&self) -> &'static [&'static str] {
        &Self::FIELDS
    }

    fn values(&self) -> Vec<String> {
        vec![
            self.approach_date.clone(),
            self.epoch_date_close_approach.to_string(),
            self.neo_id.clone(),
            self.neo_reference_id.clone(),
            self.name.clone(),
            self.nasa_jpl_url.clone(),
            self.absolute_magnitude_h.to_string(),
            self.estimated_diameter_min_km.to_string(),
            self.estimated_diameter_max_km.to_string(),
            self.is_potentially_hazardous_asteroid.to_string(),
            self.is_sentry_object.to_string(),
            self.relative_velocity_km_s.clone(),
            self.relative_velocity_km_h.clone(),
            self.miss_distance_km.clone(),
            self.miss_distance_lunar.clone(),
            self.orbiting_body.clone(),
        ]
    }
}

/// Weekly aggregate row. Numeric columns stay as the engine's decimal text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SummaryRecord {
    pub total_in_earth_orbit: String,
    pub under_5_lunar_close: String,
    pub dangerous_count: String,
    pub total_out_earth_orbit: String,
    pub avg_size_earth_orbit_km: String,
    pub biggest_earth_object_name: String,
    pub biggest_earth_object_diameter_km: String,
    pub smallest_earth_object_name: String,
    pub smallest_earth_object_diameter_km: String,
}

impl SummaryRecord {
    pub const FIELDS: [&'static str; 9] = [
        "total_in_earth_orbit",
        "under_5_lunar_close",
        "dangerous_count",
        "total_out_earth_orbit",
        "avg_size_earth_orbit_km",
        "biggest_earth_object_name",
        "biggest_earth_object_diameter_km",
        "smallest_earth_object_name",
        "smallest_earth_object_diameter_km",
    ];
}

impl TabularRow for SummaryRecord {
    fn field_names(&self) -> &'static [&'static str] {
        &Self::FIELDS
    }

    fn values(&self) -> Vec<String> {
        vec![
            self.total_in_earth_orbit.clone(),
            self.under_5_lunar_close.clone(),
            self.dangerous_count.clone(),
            self.total_out_earth_orbit.clone(),
            self.avg_size_earth_orbit_km.clone(),
            self.biggest_earth_object_name.clone(),
            self.biggest_earth_object_diameter_km.clone(),
            self.smallest_earth_object_name.clone(),
            self.smallest_earth_object_diameter_km.clone(),
        ]
    }
}

// ---------------------------------------------------------------------------
// Run bookkeeping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Sequence {
    Ingest,
    Summarize,
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sequence::Ingest => write!(f, "ingest"),
            Sequence::Summarize => write!(f, "summarize"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Schedule,
    Api,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Schedule => write!(f, "schedule"),
            Trigger::Api => write!(f, "api"),
        }
    }
}

/// One finished invocation, sent to the ledger writer.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub sequence: Sequence,
    pub trigger: Trigger,
    pub started_at_ms: i64,
    pub finished_at_ms: i64,
    pub succeeded: bool,
    pub object_key: Option<String>,
    pub row_count: Option<i64>,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_keeps_document_day_order() {
        let raw = r#"{"2024-01-03": [], "2024-01-01": [], "2024-01-02": []}"#;
        let payload: RawFeedPayload = serde_json::from_str(raw).unwrap();
        let days: Vec<&str> = payload.days.iter().map(|(d, _)| d.as_str()).collect();
        assert_eq!(days, vec!["2024-01-03", "2024-01-01", "2024-01-02"]);
        assert_eq!(payload.object_count(), 0);
    }

    #[test]
    fn decimal_text_accepts_strings_and_numbers() {
        let raw = r#"{"kilometers": "384400.5", "lunar": 3.2}"#;
        let distance: MissDistance = serde_json::from_str(raw).unwrap();
        assert_eq!(distance.kilometers, "384400.5");
        assert_eq!(distance.lunar, "3.2");
    }

    #[test]
    fn decimal_text_rejects_booleans() {
        let raw = r#"{"kilometers": true, "lunar": "1"}"#;
        assert!(serde_json::from_str::<MissDistance>(raw).is_err());
    }

    #[test]
    fn trailing_range_is_inclusive() {
        let end = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        let range = DateRange::trailing(end, 7);
        assert_eq!(range.start_str(), "2024-02-25");
        assert_eq!(range.end_str(), "2024-03-02");
    }

    #[test]
    fn flat_row_values_follow_field_order() {
        let row = FlatRow {
            approach_date: "2024-01-01".to_string(),
            epoch_date_close_approach: 1704096000000,
            neo_id: "1".to_string(),
            neo_reference_id: "1".to_string(),
            name: "A".to_string(),
            nasa_jpl_url: "https://ssd.jpl.nasa.gov/?sstr=1".to_string(),
            absolute_magnitude_h: 19.0,
            estimated_diameter_min_km: 0.1,
            estimated_diameter_max_km: 0.3,
            is_potentially_hazardous_asteroid: true,
            is_sentry_object: false,
            relative_velocity_km_s: "5.1".to_string(),
            relative_velocity_km_h: "18360".to_string(),
            miss_distance_km: "1230000".to_string(),
            miss_distance_lunar: "3.2".to_string(),
            orbiting_body: "Earth".to_string(),
        };
        let values = row.values();
        assert_eq!(values.len(), FlatRow::FIELDS.len());
        assert_eq!(values[1], "1704096000000");
        assert_eq!(values[6], "19");
        assert_eq!(values[7], "0.1");
        assert_eq!(values[9], "true");
        assert_eq!(values[10], "false");
        assert_eq!(values[15], "Earth");
    }
}
