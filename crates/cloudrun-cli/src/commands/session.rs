use clap::Subcommand;
use cloudrun_core::{trash, Config, Database, Jsonable, Session};

#[derive(Subcommand)]
pub enum SessionAction {
    /// List recorded sessions
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one session with its position fixes
    Show {
        /// Session id
        id: i64,
    },
    /// Delete sessions (undo with `restore`)
    Delete {
        /// Session ids
        #[arg(required = true)]
        ids: Vec<i64>,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Put back the last deleted sessions
    Restore,
}

pub fn run(action: SessionAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        SessionAction::List { json } => {
            let sessions = db.sessions()?;
            if json {
                let rows: Vec<_> = sessions.iter().map(summary).collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if sessions.is_empty() {
                println!("no sessions");
            } else {
                let metric = Config::load_or_default().units.metric;
                for session in &sessions {
                    println!("{}", line(session, metric));
                }
            }
        }
        SessionAction::Show { id } => match db.session(id)? {
            Some(session) => {
                let mut json = session.to_json()?;
                json["id"] = id.into();
                println!("{}", serde_json::to_string_pretty(&json)?);
            }
            None => return Err(format!("session not found: {id}").into()),
        },
        SessionAction::Delete { ids, yes } => {
            if !yes {
                let confirmed = dialoguer::Confirm::new()
                    .with_prompt(format!("Delete {} session(s)?", ids.len()))
                    .default(false)
                    .interact()?;
                if !confirmed {
                    println!("cancelled");
                    return Ok(());
                }
            }
            let removed = trash::delete(&db, None, &ids)?;
            println!("deleted {} session(s)", removed.len());
        }
        SessionAction::Restore => {
            let count = trash::restore_last(&db, None)?;
            println!("restored {count} session(s)");
        }
    }
    Ok(())
}

fn summary(session: &Session) -> serde_json::Value {
    serde_json::json!({
        "id": session.id,
        "started_at": session.started_at.to_rfc3339(),
        "duration_ms": session.duration_ms,
        "distance_m": session.distance_m,
        "pace_secs_per_km": session.pace_secs_per_km(),
        "file": session.file_name(),
    })
}

fn line(session: &Session, metric: bool) -> String {
    let (distance, unit) = if metric {
        (session.distance_m / 1000.0, "km")
    } else {
        (session.distance_m / 1609.344, "mi")
    };
    let minutes = session.duration_ms / 60_000;
    let seconds = (session.duration_ms / 1000) % 60;
    format!(
        "{:>5}  {}  {distance:>7.2} {unit}  {minutes:>3}:{seconds:02}",
        session.id.unwrap_or_default(),
        session.started_at.format("%Y-%m-%d %H:%M"),
    )
}
