//! Live tracking of a running session.
//!
//! A [`SessionTracker`] consumes position fixes as they arrive, keeps the
//! running totals and posts them on the event bus so any listener (the CLI,
//! a widget) can display them.

use chrono::{DateTime, Utc};

use crate::events::{Event, EventBus};
use crate::model::{Location, Session};

/// Mean earth radius in metres.
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Great-circle distance between two fixes in metres.
pub fn haversine_m(a: &Location, b: &Location) -> f64 {
    let (lat1, lat2) = (a.latitude.to_radians(), b.latitude.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.longitude - a.longitude).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

pub struct SessionTracker {
    bus: Option<EventBus>,
    started_at: Option<DateTime<Utc>>,
    locations: Vec<Location>,
    distance_m: f64,
}

impl SessionTracker {
    pub fn new(bus: Option<EventBus>) -> Self {
        Self {
            bus,
            started_at: None,
            locations: Vec::new(),
            distance_m: 0.0,
        }
    }

    pub fn distance_m(&self) -> f64 {
        self.distance_m
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    /// Elapsed milliseconds between the first and the last fix.
    pub fn duration_ms(&self) -> u64 {
        match (self.started_at, self.locations.last()) {
            (Some(start), Some(last)) => (last.time - start).num_milliseconds().max(0) as u64,
            _ => 0,
        }
    }

    /// Seconds per kilometre over the whole session so far.
    pub fn pace_secs_per_km(&self) -> Option<f64> {
        if self.distance_m <= 0.0 {
            return None;
        }
        Some(self.duration_ms() as f64 / self.distance_m)
    }

    /// Record a fix. Fixes older than the previous one are dropped.
    pub fn push(&mut self, location: Location) {
        let previous = self.locations.last().cloned();
        if let Some(prev) = &previous {
            if location.time < prev.time {
                tracing::debug!(time = %location.time, "dropping out-of-order fix");
                return;
            }
        }

        self.started_at.get_or_insert(location.time);
        self.post(Event::Coordinate {
            location: location.clone(),
        });

        if let Some(prev) = previous {
            let leg = haversine_m(&prev, &location);
            self.distance_m += leg;
            self.post(Event::Distance {
                meters: self.distance_m,
            });

            let secs = (location.time - prev.time).num_milliseconds() as f64 / 1000.0;
            if secs > 0.0 {
                self.post(Event::Speed {
                    meters_per_sec: leg / secs,
                });
            }
            if let Some(pace) = self.pace_secs_per_km() {
                self.post(Event::Pace { secs_per_km: pace });
            }
        }

        self.locations.push(location);
    }

    /// Stop tracking and turn the fixes into a session.
    ///
    /// `None` when no fix was recorded.
    pub fn finish(self) -> Option<Session> {
        let duration_ms = self.duration_ms();
        let started_at = self.started_at?;
        tracing::info!(
            fixes = self.locations.len(),
            distance_m = self.distance_m,
            duration_ms,
            "session recorded"
        );
        let mut session = Session::new(started_at, duration_ms, self.distance_m);
        session.locations = self.locations;
        Some(session)
    }

    fn post(&self, event: Event) {
        if let Some(bus) = &self.bus {
            bus.post(event);
        }
    }
}
