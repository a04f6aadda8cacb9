//! Tests for the download state machine.

#[cfg(test)]
mod tests {
    use super::super::downloader::*;
    use crate::error::CoreError;
    use crate::events::{Event, EventBus};
    use crate::model::{Insertable, Jsonable, Session};
    use crate::storage::Database;
    use crate::sync::context::SyncContext;
    use crate::sync::remote::MemoryStore;
    use crate::sync::types::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::Arc;

    const CALLER: SubscriberId = SubscriberId(42);

    fn info() -> ConnectInfo {
        ConnectInfo::new("mem://", "CloudRun", "runner", "secret")
    }

    fn session_at(ms: i64) -> Session {
        Session::new(Utc.timestamp_millis_opt(ms).unwrap(), 60_000, 250.0)
    }

    fn context(store: Arc<MemoryStore>, dir: &tempfile::TempDir) -> SyncContext {
        SyncContext::new(Database::open_memory().unwrap(), store, dir.path())
    }

    fn to_downloader(payload: StageEvent) -> Addressed<StageEvent> {
        Addressed::new([DOWNLOADER_ID, CALLER], payload)
    }

    fn downloaded(outcome: StageOutcome, files: Vec<PathBuf>) -> Addressed<StageEvent> {
        to_downloader(StageEvent::Downloaded(DownloadResult { outcome, files }))
    }

    #[test]
    fn test_new_excludes_stored_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(Arc::new(MemoryStore::new()), &dir);
        ctx.with_db(|db| session_at(7).insert(db)).unwrap();

        let downloader = Downloader::<Session>::new(&ctx, info(), CALLER).unwrap();
        assert_eq!(downloader.stage(), &DownloadStage::Downloading);
        assert!(downloader.is_registered());
        assert_eq!(downloader.exclude_list(), ["session_7.json".to_string()]);
    }

    #[test]
    fn test_download_ok_moves_to_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(Arc::new(MemoryStore::new()), &dir);
        let mut downloader = Downloader::<Session>::new(&ctx, info(), CALLER).unwrap();

        let files = vec![dir.path().join("session_1.json")];
        let step = downloader.on_event(downloaded(StageOutcome::Ok, files.clone()));
        assert_eq!(step, DownloadStep::Parse(files));
        assert_eq!(downloader.stage(), &DownloadStage::Parsing);
    }

    #[test]
    fn test_no_file_finishes_and_unregisters() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(Arc::new(MemoryStore::new()), &dir);
        let mut downloader = Downloader::<Session>::new(&ctx, info(), CALLER).unwrap();

        let step = downloader.on_event(downloaded(StageOutcome::NoFile, Vec::new()));
        assert_eq!(step, DownloadStep::Finished(StageOutcome::NoFile));
        assert!(!downloader.is_registered());

        // Termination is idempotent.
        let again = downloader.on_event(downloaded(StageOutcome::Ok, Vec::new()));
        assert_eq!(again, DownloadStep::Ignored);
        assert_eq!(downloader.stage(), &DownloadStage::Finished(StageOutcome::NoFile));
    }

    #[test]
    fn test_download_error_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(Arc::new(MemoryStore::new()), &dir);
        let mut downloader = Downloader::<Session>::new(&ctx, info(), CALLER).unwrap();

        let step = downloader.on_event(to_downloader(StageEvent::Downloaded(DownloadResult::failed())));
        assert_eq!(step, DownloadStep::Finished(StageOutcome::Error));
    }

    #[test]
    fn test_events_for_other_subscribers_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(Arc::new(MemoryStore::new()), &dir);
        let mut downloader = Downloader::<Session>::new(&ctx, info(), CALLER).unwrap();

        let foreign = Addressed::new(
            [UPLOADER_ID],
            StageEvent::Downloaded(DownloadResult { outcome: StageOutcome::NoFile, files: Vec::new() }),
        );
        assert_eq!(downloader.on_event(foreign), DownloadStep::Ignored);
        assert!(downloader.is_registered());
        assert_eq!(downloader.stage(), &DownloadStage::Downloading);
    }

    #[test]
    fn test_out_of_order_event_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(Arc::new(MemoryStore::new()), &dir);
        let mut downloader = Downloader::<Session>::new(&ctx, info(), CALLER).unwrap();

        let early = to_downloader(StageEvent::Inserted(InsertResult { outcome: StageOutcome::Ok, inserted: 3 }));
        assert_eq!(downloader.on_event(early), DownloadStep::Ignored);
        assert_eq!(downloader.stage(), &DownloadStage::Downloading);
    }

    #[test]
    fn test_parse_keeps_only_new_session_files() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(Arc::new(MemoryStore::new()), &dir);
        ctx.with_db(|db| session_at(1).insert(db)).unwrap();
        let mut downloader = Downloader::<Session>::new(&ctx, info(), CALLER).unwrap();
        downloader.on_event(downloaded(StageOutcome::Ok, Vec::new()));

        let fresh = session_at(2);
        let parsed = vec![
            JsonFile::new("session_1.json", session_at(1).to_json().unwrap()),
            JsonFile::new(fresh.file_name(), fresh.to_json().unwrap()),
            JsonFile::new("garbage.txt", json!({"junk": true})),
        ];
        let step = downloader.on_event(to_downloader(StageEvent::Parsed(ParseResult {
            outcome: StageOutcome::Ok,
            files: parsed,
        })));

        match step {
            DownloadStep::Insert(files) => {
                let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
                assert_eq!(names, ["session_2.json"]);
            }
            other => panic!("expected insert, got {other:?}"),
        }
        assert_eq!(downloader.stage(), &DownloadStage::Inserting);
    }

    #[test]
    fn test_parse_error_finishes_with_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(Arc::new(MemoryStore::new()), &dir);
        let mut downloader = Downloader::<Session>::new(&ctx, info(), CALLER).unwrap();
        downloader.on_event(downloaded(StageOutcome::Ok, Vec::new()));

        let step = downloader.on_event(to_downloader(StageEvent::Parsed(ParseResult::failed())));
        assert_eq!(step, DownloadStep::Finished(StageOutcome::Error));
        assert!(!downloader.is_registered());

        let late = to_downloader(StageEvent::Inserted(InsertResult { outcome: StageOutcome::Ok, inserted: 1 }));
        assert_eq!(downloader.on_event(late), DownloadStep::Ignored);
        assert_eq!(downloader.stage(), &DownloadStage::Finished(StageOutcome::Error));
    }

    #[test]
    fn test_insert_finishes_and_posts_to_bus() {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::new();
        let mut events = bus.subscribe();
        let ctx = context(Arc::new(MemoryStore::new()), &dir).with_bus(bus);
        let mut downloader = Downloader::<Session>::new(&ctx, info(), CALLER).unwrap();
        downloader.on_event(downloaded(StageOutcome::Ok, Vec::new()));
        downloader.on_event(to_downloader(StageEvent::Parsed(ParseResult {
            outcome: StageOutcome::Ok,
            files: Vec::new(),
        })));

        let step = downloader.on_event(to_downloader(StageEvent::Inserted(InsertResult {
            outcome: StageOutcome::Ok,
            inserted: 0,
        })));
        assert_eq!(step, DownloadStep::Finished(StageOutcome::Ok));
        assert_eq!(
            events.try_recv().unwrap(),
            Event::SyncFinished { direction: SyncDirection::Download, outcome: StageOutcome::Ok }
        );
        assert!(events.try_recv().is_err());

        let repeat = to_downloader(StageEvent::Inserted(InsertResult { outcome: StageOutcome::Error, inserted: 0 }));
        assert_eq!(downloader.on_event(repeat), DownloadStep::Ignored);
        assert_eq!(downloader.stage(), &DownloadStage::Finished(StageOutcome::Ok));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_insert_error_finishes_once() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(Arc::new(MemoryStore::new()), &dir);
        let mut downloader = Downloader::<Session>::new(&ctx, info(), CALLER).unwrap();
        downloader.on_event(downloaded(StageOutcome::Ok, Vec::new()));
        downloader.on_event(to_downloader(StageEvent::Parsed(ParseResult {
            outcome: StageOutcome::Ok,
            files: Vec::new(),
        })));

        let step = downloader.on_event(to_downloader(StageEvent::Inserted(InsertResult::failed())));
        assert_eq!(step, DownloadStep::Finished(StageOutcome::Error));
        assert!(!downloader.is_registered());

        let late = to_downloader(StageEvent::Inserted(InsertResult { outcome: StageOutcome::Ok, inserted: 2 }));
        assert_eq!(downloader.on_event(late), DownloadStep::Ignored);
        assert_eq!(downloader.stage(), &DownloadStage::Finished(StageOutcome::Error));
    }

    #[test]
    fn test_second_downloader_is_refused_while_first_lives() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(Arc::new(MemoryStore::new()), &dir);
        let first = Downloader::<Session>::new(&ctx, info(), CALLER).unwrap();

        assert!(matches!(
            Downloader::<Session>::new(&ctx, info(), CALLER),
            Err(CoreError::SyncInProgress(SyncDirection::Download))
        ));

        drop(first);
        assert!(Downloader::<Session>::new(&ctx, info(), CALLER).is_ok());
    }

    #[tokio::test]
    async fn test_run_inserts_new_remote_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let remote_session = session_at(1_700_000_000_000);
        store.insert(
            remote_session.file_name(),
            serde_json::to_vec(&remote_session.to_json().unwrap()).unwrap(),
        );
        store.insert("garbage.txt", "just some notes, not json");
        let ctx = context(store, &dir);

        let report = Downloader::<Session>::new(&ctx, info(), CALLER).unwrap().run().await;
        assert_eq!(report.outcome, StageOutcome::Ok);
        assert_eq!(report.files, 2);
        assert_eq!(report.entities, 1);

        let stored = ctx.with_db(|db| Session::load_all(db)).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].started_at, remote_session.started_at);
        assert!(!ctx.is_active(SyncDirection::Download));
        assert!(std::fs::read_dir(ctx.inbox()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_run_reports_invalid_json_as_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        store.insert("session_5.json", "not json");
        let ctx = context(store, &dir);

        let report = Downloader::<Session>::new(&ctx, info(), CALLER).unwrap().run().await;
        assert_eq!(report.outcome, StageOutcome::Error);
        assert_eq!(ctx.with_db(|db| db.session_count()).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_plain_text_file_does_not_block_later_pulls() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let remote_session = session_at(1_000);
        store.insert(
            remote_session.file_name(),
            serde_json::to_vec(&remote_session.to_json().unwrap()).unwrap(),
        );
        store.insert("notes.txt", "just some notes, not json");
        let ctx = context(store, &dir);

        let first = Downloader::<Session>::new(&ctx, info(), CALLER).unwrap().run().await;
        assert_eq!(first.outcome, StageOutcome::Ok);
        assert_eq!(first.entities, 1);

        let second = Downloader::<Session>::new(&ctx, info(), CALLER).unwrap().run().await;
        assert_eq!(second.outcome, StageOutcome::Ok);
        assert_eq!(second.entities, 0);
        assert_eq!(ctx.with_db(|db| db.session_count()).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_run_reports_malformed_session_as_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        store.insert("session_9.json", r#"{"started_at": "soon"}"#);
        let ctx = context(store, &dir);

        let report = Downloader::<Session>::new(&ctx, info(), CALLER).unwrap().run().await;
        assert_eq!(report.outcome, StageOutcome::Error);
        assert_eq!(report.entities, 0);
        assert_eq!(ctx.with_db(|db| db.session_count()).unwrap(), 0);
    }
}
