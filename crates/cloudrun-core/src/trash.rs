//! Delete with undo.
//!
//! The last deleted batch is kept in the `kv` table until the next delete
//! replaces it or a restore puts it back.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::events::{Event, EventBus};
use crate::model::{Deletable, Restorable, Session};
use crate::storage::Database;

const TRASH_KEY: &str = "trash.sessions";

/// `Session::id` is not part of its JSON form, so the trash keeps it aside.
#[derive(Serialize, Deserialize)]
struct Trashed {
    id: Option<i64>,
    session: Session,
}

/// Remove `ids` and remember the removed batch for [`restore_last`].
///
/// Unknown ids are skipped. Posts [`Event::Delete`] when anything was removed.
pub fn delete(db: &Database, bus: Option<&EventBus>, ids: &[i64]) -> Result<Vec<Session>> {
    let removed = Session::delete(db, ids)?;
    if removed.is_empty() {
        return Ok(removed);
    }

    let batch: Vec<Trashed> = removed
        .iter()
        .map(|session| Trashed {
            id: session.id,
            session: session.clone(),
        })
        .collect();
    db.kv_set(TRASH_KEY, &serde_json::to_string(&batch)?)?;
    tracing::info!(count = removed.len(), "moved to trash");

    if let Some(bus) = bus {
        bus.post(Event::Delete {
            sessions: removed.clone(),
        });
    }
    Ok(removed)
}

/// Put the last deleted batch back, ids included. Returns how many sessions came back.
pub fn restore_last(db: &Database, bus: Option<&EventBus>) -> Result<usize> {
    let Some(raw) = db.kv_get(TRASH_KEY)? else {
        return Ok(0);
    };
    let batch: Vec<Trashed> = serde_json::from_str(&raw)?;
    let sessions: Vec<Session> = batch
        .into_iter()
        .map(|trashed| Session {
            id: trashed.id,
            ..trashed.session
        })
        .collect();

    let count = Session::restore(db, &sessions)?;
    db.kv_delete(TRASH_KEY)?;
    tracing::info!(count, "restored from trash");

    if let Some(bus) = bus {
        bus.post(Event::Restore { count });
    }
    Ok(count)
}

/// Sessions waiting in the trash.
pub fn trashed(db: &Database) -> Result<usize> {
    match db.kv_get(TRASH_KEY)? {
        Some(raw) => Ok(serde_json::from_str::<Vec<Trashed>>(&raw)?.len()),
        None => Ok(0),
    }
}
