//! Everything an orchestrator needs besides its credentials.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{CoreError, DatabaseError, Result};
use crate::events::{Event, EventBus};
use crate::storage::Database;
use crate::sync::remote::RemoteStore;
use crate::sync::types::SyncDirection;

/// Shared handles for up- and download runs.
///
/// Cloning is cheap; clones share the database, the remote store and the
/// in-flight flags.
#[derive(Clone)]
pub struct SyncContext {
    db: Arc<Mutex<Database>>,
    remote: Arc<dyn RemoteStore>,
    inbox: PathBuf,
    outbox: PathBuf,
    bus: Option<EventBus>,
    downloading: Arc<AtomicBool>,
    uploading: Arc<AtomicBool>,
}

impl SyncContext {
    /// Downloads land in `<work_dir>/inbox`, uploads are staged in `<work_dir>/outbox`.
    pub fn new(db: Database, remote: Arc<dyn RemoteStore>, work_dir: &Path) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            remote,
            inbox: work_dir.join("inbox"),
            outbox: work_dir.join("outbox"),
            bus: None,
            downloading: Arc::new(AtomicBool::new(false)),
            uploading: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Run `f` with the database locked.
    pub fn with_db<T>(&self, f: impl FnOnce(&Database) -> Result<T>) -> Result<T> {
        let db = self.db.lock().map_err(|_| DatabaseError::Poisoned)?;
        f(&db)
    }

    pub fn remote(&self) -> Arc<dyn RemoteStore> {
        Arc::clone(&self.remote)
    }

    pub fn inbox(&self) -> &Path {
        &self.inbox
    }

    pub fn outbox(&self) -> &Path {
        &self.outbox
    }

    pub(crate) fn post(&self, event: Event) {
        if let Some(bus) = &self.bus {
            bus.post(event);
        }
    }

    pub(crate) fn bus(&self) -> Option<&EventBus> {
        self.bus.as_ref()
    }

    /// Whether an orchestration in `direction` currently holds this context.
    pub fn is_active(&self, direction: SyncDirection) -> bool {
        self.flag(direction).load(Ordering::SeqCst)
    }

    fn flag(&self, direction: SyncDirection) -> &Arc<AtomicBool> {
        match direction {
            SyncDirection::Download => &self.downloading,
            SyncDirection::Upload => &self.uploading,
        }
    }

    /// Claim the context for one orchestration in `direction`.
    pub(crate) fn acquire(&self, direction: SyncDirection) -> Result<FlightGuard> {
        let flag = self.flag(direction);
        if flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(CoreError::SyncInProgress(direction));
        }
        Ok(FlightGuard {
            flag: Arc::clone(flag),
        })
    }
}

/// Released when dropped.
#[derive(Debug)]
pub(crate) struct FlightGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
