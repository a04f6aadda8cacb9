//! Sync subcommand: pull and push sessions through the configured server.

use std::sync::Arc;

use clap::Subcommand;
use cloudrun_core::storage::data_dir;
use cloudrun_core::sync::{
    ConnectInfo, Downloader, StageOutcome, SyncContext, SyncReport, Uploader, WebDavClient,
};
use cloudrun_core::{Config, Database, Event, EventBus, Session};
use tokio::sync::broadcast::error::RecvError;

use super::CLI_ID;

#[derive(Subcommand)]
pub enum SyncAction {
    /// Fetch sessions recorded on other devices
    Download {
        /// Account password; never written to disk
        #[arg(long, env = "CLOUDRUN_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Push sessions to the server
    Upload {
        /// Session ids to upload
        ids: Vec<i64>,
        /// Upload every stored session
        #[arg(long, conflicts_with = "ids")]
        all: bool,
        /// Account password; never written to disk
        #[arg(long, env = "CLOUDRUN_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Show the server settings in use
    Status,
}

pub async fn run(action: SyncAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    match action {
        SyncAction::Status => {
            let status = serde_json::json!({
                "app": config.server.flavor.app_name(),
                "configured": config.is_connection_configured(),
                "address": config.server.address,
                "remote_path": config.server.remote_path,
                "username": config.server.username,
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
            return Ok(());
        }
        SyncAction::Download { password } => {
            let (ctx, info, bus) = connect(&config, password)?;
            let printer = spawn_printer(&bus);
            let report = Downloader::<Session>::new(&ctx, info, CLI_ID)?.run().await;
            finish(report, ctx, bus, printer).await
        }
        SyncAction::Upload { ids, all, password } => {
            let (ctx, info, bus) = connect(&config, password)?;
            let sessions = ctx.with_db(|db| db.sessions())?;
            let selected: Vec<Session> = if all {
                sessions
            } else if ids.is_empty() {
                return Err("nothing selected; pass session ids or --all".into());
            } else {
                sessions
                    .into_iter()
                    .filter(|s| s.id.is_some_and(|id| ids.contains(&id)))
                    .collect()
            };

            let printer = spawn_printer(&bus);
            let report = Uploader::new(&ctx, info, &selected, CLI_ID)?.run().await;
            finish(report, ctx, bus, printer).await
        }
    }
}

fn connect(
    config: &Config,
    password: Option<String>,
) -> Result<(SyncContext, ConnectInfo, EventBus), Box<dyn std::error::Error>> {
    if !config.is_connection_configured() {
        return Err("no server configured; run `cloudrun-cli connect` first".into());
    }
    let password = super::password(password, &config.server.username)?;
    let info = ConnectInfo::from_config(&config.server, password);
    let remote = Arc::new(WebDavClient::from_config(&config.server)?);
    let bus = EventBus::new();
    let ctx = SyncContext::new(Database::open()?, remote, &data_dir()?.join("sync"))
        .with_bus(bus.clone());
    Ok((ctx, info, bus))
}

fn spawn_printer(bus: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(Event::UploadProgress { done, total }) => eprintln!("uploaded {done}/{total}"),
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    })
}

async fn finish(
    report: SyncReport,
    ctx: SyncContext,
    bus: EventBus,
    printer: tokio::task::JoinHandle<()>,
) -> Result<(), Box<dyn std::error::Error>> {
    drop(ctx);
    drop(bus);
    printer.await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.outcome == StageOutcome::Error {
        return Err(format!("{} failed", report.direction).into());
    }
    Ok(())
}
