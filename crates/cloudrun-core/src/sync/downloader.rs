//! Pull orchestration: download new remote files, parse them, insert the new entities.
//!
//! The three stages run as tasks and report back over the downloader's own
//! channel. [`Downloader::on_event`] is the whole state machine; `run` only
//! feeds it and starts whatever stage it asks for. The first terminal result
//! unregisters the downloader, after which every event is ignored.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::{CoreError, Result, ValidationError};
use crate::events::Event;
use crate::model::{Insertable, Jsonable};
use crate::storage::Database;
use crate::sync::context::{FlightGuard, SyncContext};
use crate::sync::json::{is_already_in_db, is_file_name_valid, json_file_names};
use crate::sync::json_io::read_json_files;
use crate::sync::remote::download_new;
use crate::sync::stage::{self, StageReceiver, StageSender};
use crate::sync::types::{
    Addressed, ConnectInfo, DownloadResult, InsertResult, JsonFile, ParseResult, StageEvent,
    StageOutcome, SubscriberId, SyncDirection, SyncReport, DOWNLOADER_ID,
};

#[derive(Debug, Clone, PartialEq)]
pub enum DownloadStage {
    Downloading,
    Parsing,
    Inserting,
    Finished(StageOutcome),
}

/// What the downloader wants done after consuming an event.
#[derive(Debug, PartialEq)]
pub enum DownloadStep {
    Ignored,
    Parse(Vec<PathBuf>),
    Insert(Vec<JsonFile>),
    Finished(StageOutcome),
}

pub struct Downloader<E> {
    ctx: SyncContext,
    info: ConnectInfo,
    subscribers: Vec<SubscriberId>,
    stage: DownloadStage,
    exclude: Vec<String>,
    tx: StageSender,
    rx: Option<StageReceiver>,
    report: SyncReport,
    _flight: FlightGuard,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Downloader<E>
where
    E: Jsonable + Insertable + Send + 'static,
{
    /// Register a downloader on `ctx`. Files already stored locally are
    /// excluded from the remote listing.
    ///
    /// # Errors
    /// Fails when another download holds `ctx` or the local files cannot be listed.
    pub fn new(ctx: &SyncContext, info: ConnectInfo, caller: SubscriberId) -> Result<Self> {
        let flight = ctx.acquire(SyncDirection::Download)?;
        let exclude = ctx.with_db(|db| json_file_names::<E>(db))?;
        let (tx, rx) = stage::channel();
        tracing::info!(known = exclude.len(), caller = caller.0, "downloader registered");

        Ok(Self {
            ctx: ctx.clone(),
            info,
            subscribers: vec![DOWNLOADER_ID, caller],
            stage: DownloadStage::Downloading,
            exclude,
            tx,
            rx: Some(rx),
            report: SyncReport::new(SyncDirection::Download),
            _flight: flight,
            _entity: PhantomData,
        })
    }

    pub fn stage(&self) -> &DownloadStage {
        &self.stage
    }

    /// False once a terminal event has been consumed.
    pub fn is_registered(&self) -> bool {
        self.rx.is_some()
    }

    pub fn exclude_list(&self) -> &[String] {
        &self.exclude
    }

    /// Advance on a stage result.
    pub fn on_event(&mut self, event: Addressed<StageEvent>) -> DownloadStep {
        if !self.is_registered() || !event.is_subscriber_allowed(DOWNLOADER_ID) {
            return DownloadStep::Ignored;
        }

        match (self.stage.clone(), event.payload) {
            (DownloadStage::Downloading, StageEvent::Downloaded(result)) => {
                if result.outcome.is_ok() {
                    self.report.files = result.files.len();
                    self.stage = DownloadStage::Parsing;
                    DownloadStep::Parse(result.files)
                } else {
                    self.finish(result.outcome)
                }
            }
            (DownloadStage::Parsing, StageEvent::Parsed(result)) => {
                if !result.outcome.is_ok() {
                    return self.finish(StageOutcome::Error);
                }
                match self.select_new(result.files) {
                    Ok(files) => {
                        self.stage = DownloadStage::Inserting;
                        DownloadStep::Insert(files)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "cannot compare with local sessions");
                        self.finish(StageOutcome::Error)
                    }
                }
            }
            (DownloadStage::Inserting, StageEvent::Inserted(result)) => {
                self.report.entities = result.inserted;
                self.finish(result.outcome)
            }
            (stage, payload) => {
                tracing::debug!(?stage, ?payload, "ignoring out-of-order stage event");
                DownloadStep::Ignored
            }
        }
    }

    /// Drive all stages to completion.
    pub async fn run(mut self) -> SyncReport {
        self.start_download();
        while let Some(rx) = self.rx.as_mut() {
            let Some(event) = rx.recv().await else {
                break;
            };
            match self.on_event(event) {
                DownloadStep::Parse(files) => self.start_parse(files),
                DownloadStep::Insert(files) => self.start_insert(files),
                DownloadStep::Ignored | DownloadStep::Finished(_) => {}
            }
        }
        self.report
    }

    /// Keep files named like `E` and not yet stored.
    fn select_new(&self, files: Vec<JsonFile>) -> Result<Vec<JsonFile>> {
        let regex = E::file_name_regex();
        self.ctx.with_db(|db| {
            let mut selected = Vec::with_capacity(files.len());
            for file in files {
                if !is_file_name_valid(&file, regex) {
                    tracing::debug!(file = %file.name, "skipping foreign file");
                    continue;
                }
                if is_already_in_db::<E>(db, &file)? {
                    tracing::debug!(file = %file.name, "already stored");
                    continue;
                }
                selected.push(file);
            }
            Ok(selected)
        })
    }

    fn finish(&mut self, outcome: StageOutcome) -> DownloadStep {
        self.stage = DownloadStage::Finished(outcome);
        self.report.outcome = outcome;
        self.rx = None;
        tracing::info!(
            %outcome,
            files = self.report.files,
            inserted = self.report.entities,
            "download finished"
        );
        self.ctx.post(Event::SyncFinished {
            direction: SyncDirection::Download,
            outcome,
        });
        DownloadStep::Finished(outcome)
    }

    fn start_download(&self) {
        let remote = self.ctx.remote();
        let info = self.info.clone();
        let exclude = self.exclude.clone();
        let dir = self.ctx.inbox().to_path_buf();
        stage::spawn_stage(
            self.tx.clone(),
            self.subscribers.clone(),
            StageEvent::Downloaded(DownloadResult::failed()),
            async move {
                StageEvent::Downloaded(download_new(remote.as_ref(), &info, &exclude, &dir).await)
            },
        );
    }

    /// Parse the downloads named like `E`. Other files are dropped from the
    /// inbox unread; only an unreadable `E` file fails the stage.
    fn start_parse(&self, files: Vec<PathBuf>) {
        let regex = E::file_name_regex();
        stage::spawn_blocking_stage(
            self.tx.clone(),
            self.subscribers.clone(),
            StageEvent::Parsed(ParseResult::failed()),
            move || {
                let (wanted, foreign): (Vec<_>, Vec<_>) = files
                    .into_iter()
                    .partition(|path| has_matching_name(path, regex));
                for path in &foreign {
                    tracing::debug!(path = %path.display(), "skipping foreign download");
                    remove_download(path);
                }

                let result = match read_json_files(&wanted) {
                    Ok(parsed) => {
                        wanted.iter().for_each(|path| remove_download(path));
                        ParseResult {
                            outcome: StageOutcome::Ok,
                            files: parsed,
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "parsing downloaded files failed");
                        ParseResult::failed()
                    }
                };
                StageEvent::Parsed(result)
            },
        );
    }

    fn start_insert(&self, files: Vec<JsonFile>) {
        let ctx = self.ctx.clone();
        stage::spawn_blocking_stage(
            self.tx.clone(),
            self.subscribers.clone(),
            StageEvent::Inserted(InsertResult::failed()),
            move || {
                let result = match ctx.with_db(|db| insert_all::<E>(db, &files)) {
                    Ok(inserted) => InsertResult {
                        outcome: StageOutcome::Ok,
                        inserted,
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "inserting downloaded entities failed");
                        InsertResult::failed()
                    }
                };
                StageEvent::Inserted(result)
            },
        );
    }
}

fn has_matching_name(path: &Path, regex: &Regex) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| regex.is_match(name))
}

fn remove_download(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::debug!(error = %e, path = %path.display(), "cannot remove download");
    }
}

/// Build every entity first so a malformed file inserts nothing.
fn insert_all<E: Insertable>(db: &Database, files: &[JsonFile]) -> Result<usize> {
    let entities = files
        .iter()
        .map(|file| {
            E::from_json(&file.object).map_err(|e| {
                CoreError::from(ValidationError::InvalidEntity {
                    file: file.name.clone(),
                    message: e.to_string(),
                })
            })
        })
        .collect::<Result<Vec<_>>>()?;
    for entity in &entities {
        entity.insert(db)?;
    }
    Ok(entities.len())
}
