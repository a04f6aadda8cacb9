//! Session synchronization with a Nextcloud or ownCloud folder.
//!
//! Every session travels as one JSON file named after its start time. A
//! [`Downloader`] pulls the files the device does not know yet and inserts
//! them; an [`Uploader`] writes the selected sessions out and pushes them.
//! Both run their stages as tasks over a [`SyncContext`].

pub mod context;
pub mod downloader;
pub mod json;
pub mod json_io;
pub mod remote;
pub(crate) mod stage;
pub mod types;
pub mod uploader;
pub mod webdav;

#[cfg(test)]
mod downloader_tests;

pub use context::SyncContext;
pub use downloader::{DownloadStage, DownloadStep, Downloader};
pub use json::{build_json_files, is_already_in_db, is_file_name_valid, json_file_names};
pub use json_io::{read_json_files, write_json_files};
pub use remote::{download_new, upload_all, MemoryStore, RemoteStore};
pub use types::{
    Addressed, ConnectInfo, DownloadResult, InsertResult, JsonFile, ParseResult, StageEvent,
    StageOutcome, SubscriberId, SyncDirection, SyncError, SyncReport, UploadResult, WriteResult,
    DOWNLOADER_ID, UPLOADER_ID,
};
pub use uploader::{UploadStage, UploadStep, Uploader};
pub use webdav::WebDavClient;
