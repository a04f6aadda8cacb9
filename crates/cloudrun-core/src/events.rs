use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::{Location, Session};
use crate::sync::{StageOutcome, SyncDirection};

/// Every observable change produced by tracking or syncing is an Event.
/// The CLI prints them; other front-ends subscribe through [`EventBus`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// Cumulative distance of the running session.
    Distance { meters: f64 },
    /// Average pace since the session started.
    Pace { secs_per_km: f64 },
    /// Speed over the last leg.
    Speed { meters_per_sec: f64 },
    /// A new position fix was accepted.
    Coordinate { location: Location },
    /// Sessions removed from the database. Carries the batch so it can be restored.
    Delete { sessions: Vec<Session> },
    /// A previously deleted batch was put back.
    Restore { count: usize },
    UploadProgress { done: usize, total: usize },
    SyncFinished {
        direction: SyncDirection,
        outcome: StageOutcome,
    },
}

const BUS_CAPACITY: usize = 256;

/// Shared publish/subscribe bus for [`Event`]s.
///
/// Cloning the bus yields another handle to the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Publish an event. Returns the number of receivers that got it;
    /// with no subscribers the event is dropped.
    pub fn post(&self, event: Event) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
