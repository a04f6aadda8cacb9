//! Running sessions and the position fixes they are made of.

mod entity;

pub use entity::{Deletable, Insertable, Jsonable, Restorable};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single position fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
}

impl Location {
    pub fn new(time: DateTime<Utc>, latitude: f64, longitude: f64) -> Self {
        Self {
            time,
            latitude,
            longitude,
            altitude: None,
        }
    }
}

/// A recorded run.
///
/// `id` is the local row id and never leaves the device; the synchronized
/// identity of a session is its file name (see [`Jsonable::file_name`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(skip)]
    pub id: Option<i64>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub distance_m: f64,
    #[serde(default)]
    pub locations: Vec<Location>,
}

impl Session {
    pub fn new(started_at: DateTime<Utc>, duration_ms: u64, distance_m: f64) -> Self {
        Self {
            id: None,
            started_at,
            duration_ms,
            distance_m,
            locations: Vec::new(),
        }
    }

    /// Average pace in seconds per kilometre, `None` for a zero-distance session.
    pub fn pace_secs_per_km(&self) -> Option<f64> {
        if self.distance_m <= 0.0 {
            return None;
        }
        Some((self.duration_ms as f64 / 1000.0) / (self.distance_m / 1000.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn pace_is_seconds_per_kilometre() {
        let s = Session::new(Utc.timestamp_millis_opt(0).unwrap(), 300_000, 1000.0);
        assert_eq!(s.pace_secs_per_km(), Some(300.0));
    }

    #[test]
    fn pace_undefined_without_distance() {
        let s = Session::new(Utc::now(), 10_000, 0.0);
        assert!(s.pace_secs_per_km().is_none());
    }

    #[test]
    fn local_id_is_not_serialized() {
        let mut s = Session::new(Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(), 1, 2.0);
        s.id = Some(42);
        let json = serde_json::to_value(&s).unwrap();
        assert!(json.get("id").is_none());
        assert_eq!(json["started_at"], 1_700_000_000_000i64);
    }
}
