//! Running stages as tasks and routing their completion back to the orchestrator.

use std::future::Future;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::sync::types::{Addressed, StageEvent, SubscriberId};

pub(crate) type StageSender = mpsc::UnboundedSender<Addressed<StageEvent>>;
pub(crate) type StageReceiver = mpsc::UnboundedReceiver<Addressed<StageEvent>>;

pub(crate) fn channel() -> (StageSender, StageReceiver) {
    mpsc::unbounded_channel()
}

/// Run an async stage. A panicking stage reports `failed` instead.
pub(crate) fn spawn_stage<F>(tx: StageSender, to: Vec<SubscriberId>, failed: StageEvent, stage: F)
where
    F: Future<Output = StageEvent> + Send + 'static,
{
    forward(tx, to, failed, tokio::spawn(stage));
}

/// Run a blocking stage (disk, database) off the async workers.
pub(crate) fn spawn_blocking_stage<F>(
    tx: StageSender,
    to: Vec<SubscriberId>,
    failed: StageEvent,
    work: F,
) where
    F: FnOnce() -> StageEvent + Send + 'static,
{
    forward(tx, to, failed, tokio::task::spawn_blocking(work));
}

fn forward(tx: StageSender, to: Vec<SubscriberId>, failed: StageEvent, task: JoinHandle<StageEvent>) {
    tokio::spawn(async move {
        let event = task.await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "stage task did not complete");
            failed
        });
        // Send fails once the orchestrator has unregistered; the result is dropped.
        let _ = tx.send(Addressed::new(to, event));
    });
}
