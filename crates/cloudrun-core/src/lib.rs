//! # CloudRun Core Library
//!
//! This library provides the business logic of the CloudRun running tracker:
//! recording sessions, storing them locally and synchronizing them with a
//! Nextcloud (CloudRun) or ownCloud (OwnRun) folder. The `cloudrun-cli`
//! binary is a thin presentation layer over the same library.
//!
//! ## Architecture
//!
//! - **Tracker**: turns position fixes into distance, speed and pace events
//! - **Storage**: SQLite session storage and TOML configuration
//! - **Sync**: one JSON file per session, pulled by a [`Downloader`] and
//!   pushed by an [`Uploader`], each a small state machine over async stages
//! - **Trash**: delete with a one-batch undo
//! - **Events**: a broadcast [`EventBus`] every front-end can subscribe to
//!
//! ## Key Components
//!
//! - [`SessionTracker`]: live session recording
//! - [`Database`]: session persistence
//! - [`Config`]: application configuration management
//! - [`RemoteStore`]: the seam between orchestration and the server

pub mod error;
pub mod events;
pub mod model;
pub mod storage;
pub mod sync;
pub mod tracker;
pub mod trash;

pub use error::{ConfigError, CoreError, DatabaseError, ValidationError};
pub use events::{Event, EventBus};
pub use model::{Deletable, Insertable, Jsonable, Location, Restorable, Session};
pub use storage::{Config, Database, ServerConfig, ServerFlavor};
pub use sync::{
    ConnectInfo, Downloader, MemoryStore, RemoteStore, StageOutcome, SyncContext, SyncDirection,
    SyncReport, Uploader, WebDavClient,
};
pub use tracker::SessionTracker;
