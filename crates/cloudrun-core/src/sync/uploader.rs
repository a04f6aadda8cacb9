//! Push orchestration: write entities as JSON files, then upload them.

use std::path::PathBuf;

use crate::error::Result;
use crate::events::Event;
use crate::model::Jsonable;
use crate::sync::context::{FlightGuard, SyncContext};
use crate::sync::json::build_json_files;
use crate::sync::json_io::write_json_files;
use crate::sync::remote::upload_all;
use crate::sync::stage::{self, StageReceiver, StageSender};
use crate::sync::types::{
    Addressed, ConnectInfo, JsonFile, StageEvent, StageOutcome, SubscriberId, SyncDirection,
    SyncReport, UploadResult, WriteResult, UPLOADER_ID,
};

#[derive(Debug, Clone, PartialEq)]
pub enum UploadStage {
    Writing,
    Uploading,
    Finished(StageOutcome),
}

#[derive(Debug, PartialEq)]
pub enum UploadStep {
    Ignored,
    Upload(Vec<PathBuf>),
    Finished(StageOutcome),
}

pub struct Uploader {
    ctx: SyncContext,
    info: ConnectInfo,
    subscribers: Vec<SubscriberId>,
    stage: UploadStage,
    files: Vec<JsonFile>,
    tx: StageSender,
    rx: Option<StageReceiver>,
    report: SyncReport,
    _flight: FlightGuard,
}

impl Uploader {
    /// Serialize `entities` and register an uploader on `ctx`.
    ///
    /// # Errors
    /// Fails when an entity cannot be serialized or another upload holds `ctx`.
    pub fn new<E: Jsonable>(
        ctx: &SyncContext,
        info: ConnectInfo,
        entities: &[E],
        caller: SubscriberId,
    ) -> Result<Self> {
        let files = build_json_files(entities)?;
        let flight = ctx.acquire(SyncDirection::Upload)?;
        let (tx, rx) = stage::channel();
        tracing::info!(entities = files.len(), caller = caller.0, "uploader registered");

        let mut report = SyncReport::new(SyncDirection::Upload);
        report.entities = files.len();

        Ok(Self {
            ctx: ctx.clone(),
            info,
            subscribers: vec![UPLOADER_ID, caller],
            stage: UploadStage::Writing,
            files,
            tx,
            rx: Some(rx),
            report,
            _flight: flight,
        })
    }

    pub fn stage(&self) -> &UploadStage {
        &self.stage
    }

    pub fn is_registered(&self) -> bool {
        self.rx.is_some()
    }

    pub fn files(&self) -> &[JsonFile] {
        &self.files
    }

    pub fn on_event(&mut self, event: Addressed<StageEvent>) -> UploadStep {
        if !self.is_registered() || !event.is_subscriber_allowed(UPLOADER_ID) {
            return UploadStep::Ignored;
        }

        match (self.stage.clone(), event.payload) {
            (UploadStage::Writing, StageEvent::Written(result)) => {
                if result.outcome.is_ok() {
                    self.stage = UploadStage::Uploading;
                    UploadStep::Upload(result.files)
                } else {
                    self.finish(StageOutcome::Error)
                }
            }
            (UploadStage::Uploading, StageEvent::Uploaded(result)) => {
                self.report.files = result.uploaded;
                self.finish(result.outcome)
            }
            (stage, payload) => {
                tracing::debug!(?stage, ?payload, "ignoring out-of-order stage event");
                UploadStep::Ignored
            }
        }
    }

    pub async fn run(mut self) -> SyncReport {
        self.start_write();
        while let Some(rx) = self.rx.as_mut() {
            let Some(event) = rx.recv().await else {
                break;
            };
            if let UploadStep::Upload(paths) = self.on_event(event) {
                self.start_upload(paths);
            }
        }
        self.report
    }

    fn finish(&mut self, outcome: StageOutcome) -> UploadStep {
        self.stage = UploadStage::Finished(outcome);
        self.report.outcome = outcome;
        self.rx = None;
        tracing::info!(%outcome, uploaded = self.report.files, "upload finished");
        self.ctx.post(Event::SyncFinished {
            direction: SyncDirection::Upload,
            outcome,
        });
        UploadStep::Finished(outcome)
    }

    fn start_write(&self) {
        let files = self.files.clone();
        let dir = self.ctx.outbox().to_path_buf();
        stage::spawn_blocking_stage(
            self.tx.clone(),
            self.subscribers.clone(),
            StageEvent::Written(WriteResult::failed()),
            move || {
                let result = match write_json_files(&dir, &files) {
                    Ok(files) => WriteResult {
                        outcome: StageOutcome::Ok,
                        files,
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, dir = %dir.display(), "writing upload files failed");
                        WriteResult::failed()
                    }
                };
                StageEvent::Written(result)
            },
        );
    }

    fn start_upload(&self, paths: Vec<PathBuf>) {
        let remote = self.ctx.remote();
        let info = self.info.clone();
        let bus = self.ctx.bus().cloned();
        stage::spawn_stage(
            self.tx.clone(),
            self.subscribers.clone(),
            StageEvent::Uploaded(UploadResult::failed()),
            async move {
                let result = upload_all(remote.as_ref(), &info, &paths, |done, total| {
                    if let Some(bus) = &bus {
                        bus.post(Event::UploadProgress { done, total });
                    }
                })
                .await;
                if result.outcome.is_ok() {
                    for path in &paths {
                        if let Err(e) = tokio::fs::remove_file(path).await {
                            tracing::debug!(error = %e, path = %path.display(), "cannot remove staged file");
                        }
                    }
                }
                StageEvent::Uploaded(result)
            },
        );
    }
}
