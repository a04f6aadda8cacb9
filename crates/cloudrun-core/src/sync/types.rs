//! Core types for upload/download orchestration.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::storage::ServerConfig;

/// Tag used to address stage results to an orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriberId(pub u32);

/// Fixed id every [`Downloader`](super::Downloader) listens on.
pub const DOWNLOADER_ID: SubscriberId = SubscriberId(1);
/// Fixed id every [`Uploader`](super::Uploader) listens on.
pub const UPLOADER_ID: SubscriberId = SubscriberId(2);

/// A payload together with the subscribers allowed to consume it.
#[derive(Debug, Clone, PartialEq)]
pub struct Addressed<T> {
    subscribers: Vec<SubscriberId>,
    pub payload: T,
}

impl<T> Addressed<T> {
    pub fn new(subscribers: impl Into<Vec<SubscriberId>>, payload: T) -> Self {
        Self {
            subscribers: subscribers.into(),
            payload,
        }
    }

    pub fn is_subscriber_allowed(&self, id: SubscriberId) -> bool {
        self.subscribers.contains(&id)
    }

    pub fn subscribers(&self) -> &[SubscriberId] {
        &self.subscribers
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    Download,
    Upload,
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncDirection::Download => f.write_str("download"),
            SyncDirection::Upload => f.write_str("upload"),
        }
    }
}

/// Result code of a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Ok,
    /// The remote had nothing new. Only produced by the download stage.
    NoFile,
    Error,
}

impl StageOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, StageOutcome::Ok)
    }
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageOutcome::Ok => f.write_str("ok"),
            StageOutcome::NoFile => f.write_str("no new files"),
            StageOutcome::Error => f.write_str("error"),
        }
    }
}

/// Credentials for one connection attempt.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectInfo {
    pub address: String,
    pub remote_path: String,
    pub username: String,
    pub password: String,
}

impl ConnectInfo {
    pub fn new(
        address: impl Into<String>,
        remote_path: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            remote_path: remote_path.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// Combine the persisted server settings with a password supplied for this run.
    pub fn from_config(server: &ServerConfig, password: impl Into<String>) -> Self {
        Self::new(
            server.address.trim(),
            server.remote_path.trim_matches('/'),
            server.username.trim(),
            password,
        )
    }
}

impl fmt::Debug for ConnectInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectInfo")
            .field("address", &self.address)
            .field("remote_path", &self.remote_path)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A named JSON object, as stored remotely one file per entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonFile {
    pub name: String,
    pub object: serde_json::Value,
}

impl JsonFile {
    pub fn new(name: impl Into<String>, object: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            object,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadResult {
    pub outcome: StageOutcome,
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseResult {
    pub outcome: StageOutcome,
    pub files: Vec<JsonFile>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertResult {
    pub outcome: StageOutcome,
    pub inserted: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteResult {
    pub outcome: StageOutcome,
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadResult {
    pub outcome: StageOutcome,
    pub uploaded: usize,
}

macro_rules! failed_result {
    ($($ty:ident { $($field:ident: $value:expr),* }),* $(,)?) => {
        $(impl $ty {
            pub fn failed() -> Self {
                Self { outcome: StageOutcome::Error, $($field: $value),* }
            }
        })*
    };
}

failed_result! {
    DownloadResult { files: Vec::new() },
    ParseResult { files: Vec::new() },
    InsertResult { inserted: 0 },
    WriteResult { files: Vec::new() },
    UploadResult { uploaded: 0 },
}

/// Completion of one asynchronous stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageEvent {
    Downloaded(DownloadResult),
    Parsed(ParseResult),
    Inserted(InsertResult),
    Written(WriteResult),
    Uploaded(UploadResult),
}

/// What an orchestration run achieved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub direction: SyncDirection,
    pub outcome: StageOutcome,
    /// Files moved over the wire.
    pub files: usize,
    /// Entities inserted (download) or serialized (upload).
    pub entities: usize,
}

impl SyncReport {
    pub(crate) fn new(direction: SyncDirection) -> Self {
        Self {
            direction,
            outcome: StageOutcome::Error,
            files: 0,
            entities: 0,
        }
    }
}

/// Remote transfer errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Server answered {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Invalid server address '{address}': {message}")]
    InvalidAddress { address: String, message: String },

    #[error("Malformed WebDAV response: {0}")]
    Xml(String),

    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Remote file not found: {0}")]
    NotFound(String),

    #[error("Remote store unavailable")]
    Offline,
}
