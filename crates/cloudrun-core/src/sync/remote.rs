//! Remote store contract and the transfer stages built on it.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::sync::types::{ConnectInfo, DownloadResult, StageOutcome, SyncError, UploadResult};

/// A folder of files on some server.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Names of the files in the remote folder. A missing folder lists as empty.
    async fn list(&self, info: &ConnectInfo) -> Result<Vec<String>, SyncError>;

    async fn fetch(&self, info: &ConnectInfo, name: &str) -> Result<Vec<u8>, SyncError>;

    async fn put(&self, info: &ConnectInfo, name: &str, body: Vec<u8>) -> Result<(), SyncError>;

    /// Called once before a batch of [`put`](Self::put)s.
    async fn prepare(&self, _info: &ConnectInfo) -> Result<(), SyncError> {
        Ok(())
    }
}

/// Remote names never address anything outside the target directory.
fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

/// Fetch every remote file not named in `exclude` into `dir`.
///
/// `NoFile` when nothing new exists remotely; `Error` on any transfer failure.
pub async fn download_new(
    store: &dyn RemoteStore,
    info: &ConnectInfo,
    exclude: &[String],
    dir: &Path,
) -> DownloadResult {
    let names = match store.list(info).await {
        Ok(names) => names,
        Err(e) => {
            tracing::warn!(error = %e, "listing remote folder failed");
            return DownloadResult::failed();
        }
    };

    let known: HashSet<&str> = exclude.iter().map(String::as_str).collect();
    let wanted: Vec<String> = names
        .into_iter()
        .filter(|name| is_plain_file_name(name) && !known.contains(name.as_str()))
        .collect();

    if wanted.is_empty() {
        tracing::info!("no new remote files");
        return DownloadResult {
            outcome: StageOutcome::NoFile,
            files: Vec::new(),
        };
    }

    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        tracing::warn!(error = %e, dir = %dir.display(), "cannot create download directory");
        return DownloadResult::failed();
    }

    let mut files = Vec::with_capacity(wanted.len());
    for name in wanted {
        let body = match store.fetch(info, &name).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, file = %name, "download failed");
                return DownloadResult::failed();
            }
        };
        let path = dir.join(&name);
        if let Err(e) = tokio::fs::write(&path, body).await {
            tracing::warn!(error = %e, path = %path.display(), "cannot store downloaded file");
            return DownloadResult::failed();
        }
        tracing::debug!(file = %name, "downloaded");
        files.push(path);
    }

    DownloadResult {
        outcome: StageOutcome::Ok,
        files,
    }
}

/// Upload every file under its own file name. `progress(done, total)` runs after each file.
pub async fn upload_all(
    store: &dyn RemoteStore,
    info: &ConnectInfo,
    paths: &[PathBuf],
    mut progress: impl FnMut(usize, usize) + Send,
) -> UploadResult {
    if let Err(e) = store.prepare(info).await {
        tracing::warn!(error = %e, "remote folder unavailable");
        return UploadResult::failed();
    }

    let total = paths.len();
    for (index, path) in paths.iter().enumerate() {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            tracing::warn!(path = %path.display(), "skipping path without file name");
            return UploadResult::failed();
        };
        let body = match tokio::fs::read(path).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "cannot read file for upload");
                return UploadResult::failed();
            }
        };
        if let Err(e) = store.put(info, &name, body).await {
            tracing::warn!(error = %e, file = %name, "upload failed");
            return UploadResult::failed();
        }
        progress(index + 1, total);
    }

    UploadResult {
        outcome: StageOutcome::Ok,
        uploaded: total,
    }
}

/// In-process store keeping files in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.lock().insert(name.into(), body.into());
    }

    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.lock().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Make every call fail with [`SyncError::Offline`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), SyncError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(SyncError::Offline)
        } else {
            Ok(())
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn list(&self, _info: &ConnectInfo) -> Result<Vec<String>, SyncError> {
        self.check_online()?;
        Ok(self.names())
    }

    async fn fetch(&self, _info: &ConnectInfo, name: &str) -> Result<Vec<u8>, SyncError> {
        self.check_online()?;
        self.get(name).ok_or_else(|| SyncError::NotFound(name.to_string()))
    }

    async fn put(&self, _info: &ConnectInfo, name: &str, body: Vec<u8>) -> Result<(), SyncError> {
        self.check_online()?;
        self.insert(name, body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> ConnectInfo {
        ConnectInfo::new("mem://", "runs", "me", "pw")
    }

    #[tokio::test]
    async fn download_skips_excluded_files() {
        let store = MemoryStore::new();
        store.insert("session_1.json", "{}");
        store.insert("session_2.json", "{}");
        let dir = tempfile::tempdir().unwrap();

        let result = download_new(&store, &info(), &["session_1.json".into()], dir.path()).await;
        assert_eq!(result.outcome, StageOutcome::Ok);
        assert_eq!(result.files, vec![dir.path().join("session_2.json")]);
        assert!(dir.path().join("session_2.json").exists());
    }

    #[tokio::test]
    async fn download_reports_no_file_when_nothing_new() {
        let store = MemoryStore::new();
        store.insert("session_1.json", "{}");
        let dir = tempfile::tempdir().unwrap();

        let result = download_new(&store, &info(), &["session_1.json".into()], dir.path()).await;
        assert_eq!(result.outcome, StageOutcome::NoFile);

        let empty = download_new(&MemoryStore::new(), &info(), &[], dir.path()).await;
        assert_eq!(empty.outcome, StageOutcome::NoFile);
    }

    #[tokio::test]
    async fn download_ignores_path_like_names() {
        let store = MemoryStore::new();
        store.insert("../escape.json", "{}");
        let dir = tempfile::tempdir().unwrap();

        let result = download_new(&store, &info(), &[], dir.path()).await;
        assert_eq!(result.outcome, StageOutcome::NoFile);
    }

    #[tokio::test]
    async fn offline_store_is_an_error() {
        let store = MemoryStore::new();
        store.insert("session_1.json", "{}");
        store.set_offline(true);
        let dir = tempfile::tempdir().unwrap();

        let result = download_new(&store, &info(), &[], dir.path()).await;
        assert_eq!(result, DownloadResult::failed());

        let path = dir.path().join("session_9.json");
        std::fs::write(&path, "{}").unwrap();
        let uploaded = upload_all(&store, &info(), &[path], |_, _| {}).await;
        assert_eq!(uploaded, UploadResult::failed());
    }

    #[tokio::test]
    async fn upload_reports_progress() {
        let store = MemoryStore::new();
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<_> = (1..=3)
            .map(|i| {
                let p = dir.path().join(format!("session_{i}.json"));
                std::fs::write(&p, "{}").unwrap();
                p
            })
            .collect();

        let mut seen = Vec::new();
        let result = upload_all(&store, &info(), &paths, |done, total| seen.push((done, total))).await;
        assert_eq!(result.uploaded, 3);
        assert_eq!(seen, vec![(1, 3), (2, 3), (3, 3)]);
        assert_eq!(store.names().len(), 3);
    }

    #[tokio::test]
    async fn upload_nothing_is_ok() {
        let store = MemoryStore::new();
        let result = upload_all(&store, &info(), &[], |_, _| {}).await;
        assert_eq!(result, UploadResult { outcome: StageOutcome::Ok, uploaded: 0 });
    }
}
