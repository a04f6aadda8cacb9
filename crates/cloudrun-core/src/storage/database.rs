//! SQLite-based session storage.
//!
//! Provides persistent storage for:
//! - Recorded running sessions and their location fixes
//! - Key-value store for application state

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{data_dir, migrations};
use crate::error::{DatabaseError, Result};
use crate::model::{Location, Session};

/// SQLite database for session storage.
pub struct Database {
    conn: Connection,
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `<data_dir>/cloudrun.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("cloudrun.db");
        let conn = Connection::open(&path).map_err(|source| DatabaseError::OpenFailed {
            path: path.clone(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        tracing::debug!(path = %path.display(), "database opened");
        Ok(db)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        migrations::migrate(&self.conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(())
    }

    /// Record a session together with its location fixes.
    ///
    /// # Errors
    /// Returns an error if the insert fails; nothing is written in that case.
    pub fn insert_session(&self, session: &Session) -> Result<i64> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO sessions (started_at, duration_ms, distance_m) VALUES (?1, ?2, ?3)",
            params![
                session.started_at.timestamp_millis(),
                session.duration_ms as i64,
                session.distance_m,
            ],
        )?;
        let id = tx.last_insert_rowid();
        insert_locations(&tx, id, &session.locations)?;
        tx.commit()?;
        Ok(id)
    }

    /// Re-insert a session, keeping its previous id when it has one.
    pub fn restore_session(&self, session: &Session) -> Result<i64> {
        let Some(id) = session.id else {
            return self.insert_session(session);
        };
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO sessions (id, started_at, duration_ms, distance_m) VALUES (?1, ?2, ?3, ?4)",
            params![
                id,
                session.started_at.timestamp_millis(),
                session.duration_ms as i64,
                session.distance_m,
            ],
        )?;
        insert_locations(&tx, id, &session.locations)?;
        tx.commit()?;
        Ok(id)
    }

    /// All sessions, oldest first, with their locations.
    pub fn sessions(&self) -> Result<Vec<Session>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, started_at, duration_ms, distance_m FROM sessions ORDER BY started_at, id",
        )?;
        let rows = stmt.query_map([], session_from_row)?;

        let mut sessions = Vec::new();
        for row in rows {
            let mut session = row?;
            if let Some(id) = session.id {
                session.locations = self.locations(id)?;
            }
            sessions.push(session);
        }
        Ok(sessions)
    }

    pub fn session(&self, id: i64) -> Result<Option<Session>> {
        let session = self
            .conn
            .query_row(
                "SELECT id, started_at, duration_ms, distance_m FROM sessions WHERE id = ?1",
                params![id],
                session_from_row,
            )
            .optional()?;
        match session {
            Some(mut s) => {
                s.locations = self.locations(id)?;
                Ok(Some(s))
            }
            None => Ok(None),
        }
    }

    pub fn session_count(&self) -> Result<u64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get::<_, u64>(0))?;
        Ok(count)
    }

    fn locations(&self, session_id: i64) -> Result<Vec<Location>> {
        let mut stmt = self.conn.prepare(
            "SELECT time, latitude, longitude, altitude FROM locations
             WHERE session_id = ?1 ORDER BY time, id",
        )?;
        let rows = stmt.query_map(params![session_id], |row| {
            Ok(Location {
                time: from_millis(row.get(0)?),
                latitude: row.get(1)?,
                longitude: row.get(2)?,
                altitude: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Delete the given sessions and return them as they were. Unknown ids are skipped.
    pub fn delete_sessions(&self, ids: &[i64]) -> Result<Vec<Session>> {
        let mut removed = Vec::with_capacity(ids.len());
        for &id in ids {
            if let Some(session) = self.session(id)? {
                removed.push(session);
            }
        }

        let tx = self.conn.unchecked_transaction()?;
        for session in &removed {
            let id = session.id.unwrap_or_default();
            tx.execute("DELETE FROM locations WHERE session_id = ?1", params![id])?;
            tx.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        }
        tx.commit()?;
        Ok(removed)
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn kv_delete(&self, key: &str) -> Result<()> {
        self.conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

fn session_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: Some(row.get(0)?),
        started_at: from_millis(row.get(1)?),
        duration_ms: row.get::<_, i64>(2)?.max(0) as u64,
        distance_m: row.get(3)?,
        locations: Vec::new(),
    })
}

fn insert_locations(conn: &Connection, session_id: i64, locations: &[Location]) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO locations (session_id, time, latitude, longitude, altitude)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for loc in locations {
        stmt.execute(params![
            session_id,
            loc.time.timestamp_millis(),
            loc.latitude,
            loc.longitude,
            loc.altitude,
        ])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(ms: i64, fixes: usize) -> Session {
        let mut s = Session::new(from_millis(ms), 120_000, 400.0);
        for i in 0..fixes {
            s.locations.push(Location::new(from_millis(ms + i as i64 * 1000), 48.0, 11.0 + i as f64 * 0.001));
        }
        s
    }

    #[test]
    fn insert_and_read_back() {
        let db = Database::open_memory().unwrap();
        let id = db.insert_session(&run(1_000, 3)).unwrap();

        let stored = db.session(id).unwrap().unwrap();
        assert_eq!(stored.id, Some(id));
        assert_eq!(stored.started_at, from_millis(1_000));
        assert_eq!(stored.locations.len(), 3);
        assert_eq!(db.session_count().unwrap(), 1);
    }

    #[test]
    fn sessions_are_ordered_by_start() {
        let db = Database::open_memory().unwrap();
        db.insert_session(&run(3_000, 0)).unwrap();
        db.insert_session(&run(1_000, 0)).unwrap();
        let starts: Vec<_> = db
            .sessions()
            .unwrap()
            .iter()
            .map(|s| s.started_at.timestamp_millis())
            .collect();
        assert_eq!(starts, vec![1_000, 3_000]);
    }

    #[test]
    fn delete_returns_removed_and_skips_unknown() {
        let db = Database::open_memory().unwrap();
        let id = db.insert_session(&run(1_000, 2)).unwrap();
        let removed = db.delete_sessions(&[id, 999]).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].locations.len(), 2);
        assert!(db.session(id).unwrap().is_none());

        let orphans: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM locations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn restore_reuses_id() {
        let db = Database::open_memory().unwrap();
        let id = db.insert_session(&run(1_000, 1)).unwrap();
        let removed = db.delete_sessions(&[id]).unwrap();
        assert_eq!(db.restore_session(&removed[0]).unwrap(), id);
        assert_eq!(db.session(id).unwrap().unwrap().locations.len(), 1);
    }

    #[test]
    fn kv_store() {
        let db = Database::open_memory().unwrap();
        assert!(db.kv_get("test").unwrap().is_none());
        db.kv_set("test", "hello").unwrap();
        assert_eq!(db.kv_get("test").unwrap().unwrap(), "hello");
        db.kv_delete("test").unwrap();
        assert!(db.kv_get("test").unwrap().is_none());
    }
}
