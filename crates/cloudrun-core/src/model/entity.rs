//! Capability traits for entities that take part in synchronization.
//!
//! Each capability is its own trait so an entity only opts into what it
//! supports. [`Session`] implements all of them.

use std::sync::LazyLock;

use regex::Regex;

use super::Session;
use crate::error::{Result, ValidationError};
use crate::storage::Database;

/// Entities with a JSON file representation.
pub trait Jsonable {
    /// Pattern a remote file name must fully match to be read as this entity.
    fn file_name_regex() -> &'static Regex
    where
        Self: Sized;

    /// File name derived from the entity's content. Two entities with the
    /// same file name are the same entity as far as sync is concerned.
    fn file_name(&self) -> String;

    fn to_json(&self) -> Result<serde_json::Value>;
}

/// Entities that can be built from a parsed JSON object and persisted.
pub trait Insertable: Sized {
    fn from_json(object: &serde_json::Value) -> Result<Self>;

    /// Persist and return the new local id.
    fn insert(&self, db: &Database) -> Result<i64>;

    fn load_all(db: &Database) -> Result<Vec<Self>>;
}

pub trait Deletable: Sized {
    /// Remove the selected entities, returning what was removed.
    fn delete(db: &Database, ids: &[i64]) -> Result<Vec<Self>>;
}

pub trait Restorable: Sized {
    /// Put back a batch previously returned by [`Deletable::delete`].
    fn restore(db: &Database, batch: &[Self]) -> Result<usize>;
}

static SESSION_FILE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^session_\d+\.json$").expect("session file name pattern"));

impl Jsonable for Session {
    fn file_name_regex() -> &'static Regex {
        &SESSION_FILE_NAME
    }

    fn file_name(&self) -> String {
        format!("session_{}.json", self.started_at.timestamp_millis())
    }

    fn to_json(&self) -> Result<serde_json::Value> {
        if !self.distance_m.is_finite() || self.distance_m < 0.0 {
            return Err(ValidationError::InvalidValue {
                field: "distance_m".into(),
                message: format!("{} is not a distance", self.distance_m),
            }
            .into());
        }
        Ok(serde_json::to_value(self)?)
    }
}

impl Insertable for Session {
    fn from_json(object: &serde_json::Value) -> Result<Self> {
        if !object.is_object() {
            return Err(ValidationError::InvalidValue {
                field: "session".into(),
                message: "expected a JSON object".into(),
            }
            .into());
        }
        Ok(serde_json::from_value(object.clone())?)
    }

    fn insert(&self, db: &Database) -> Result<i64> {
        db.insert_session(self)
    }

    fn load_all(db: &Database) -> Result<Vec<Self>> {
        db.sessions()
    }
}

impl Deletable for Session {
    fn delete(db: &Database, ids: &[i64]) -> Result<Vec<Self>> {
        db.delete_sessions(ids)
    }
}

impl Restorable for Session {
    fn restore(db: &Database, batch: &[Self]) -> Result<usize> {
        for session in batch {
            db.restore_session(session)?;
        }
        Ok(batch.len())
    }
}
