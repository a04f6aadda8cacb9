//! Record a session from a stream of position fixes.
//!
//! Input is one fix per line: `epoch_ms,latitude,longitude[,altitude]`.
//! Blank lines and lines starting with `#` are skipped.

use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use chrono::{TimeZone, Utc};
use clap::Args;
use cloudrun_core::{Database, EventBus, Location, SessionTracker};

#[derive(Args)]
pub struct TrackArgs {
    /// File with position fixes; stdin when omitted
    file: Option<PathBuf>,
    /// Print the events without storing the session
    #[arg(long)]
    dry_run: bool,
}

pub fn run(args: TrackArgs) -> Result<(), Box<dyn std::error::Error>> {
    let input: Box<dyn BufRead> = match &args.file {
        Some(path) => Box::new(BufReader::new(std::fs::File::open(path)?)),
        None => Box::new(BufReader::new(std::io::stdin())),
    };

    let bus = EventBus::new();
    let mut events = bus.subscribe();
    let mut tracker = SessionTracker::new(Some(bus));

    for (index, line) in input.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let location = parse_fix(line).map_err(|e| format!("line {}: {e}", index + 1))?;
        tracker.push(location);
        while let Ok(event) = events.try_recv() {
            println!("{}", serde_json::to_string(&event)?);
        }
    }

    let Some(session) = tracker.finish() else {
        return Err("no position fixes".into());
    };
    if args.dry_run {
        println!("{}", serde_json::to_string_pretty(&session)?);
        return Ok(());
    }
    let id = Database::open()?.insert_session(&session)?;
    println!("session recorded: {id}");
    Ok(())
}

fn parse_fix(line: &str) -> Result<Location, String> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if !(3..=4).contains(&fields.len()) {
        return Err(format!("expected 3 or 4 fields, got {}", fields.len()));
    }
    let number = |field: &str, what: &str| {
        field
            .parse::<f64>()
            .map_err(|_| format!("invalid {what} '{field}'"))
    };

    let millis = fields[0]
        .parse::<i64>()
        .map_err(|_| format!("invalid time '{}'", fields[0]))?;
    if millis < 0 {
        return Err(format!("time before the epoch '{millis}'"));
    }
    let time = Utc
        .timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| format!("time out of range '{millis}'"))?;
    let latitude = number(fields[1], "latitude")?;
    let longitude = number(fields[2], "longitude")?;
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err(format!("coordinates out of range '{latitude},{longitude}'"));
    }

    let mut location = Location::new(time, latitude, longitude);
    if let Some(altitude) = fields.get(3) {
        location.altitude = Some(number(altitude, "altitude")?);
    }
    Ok(location)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fix_with_altitude() {
        let fix = parse_fix("1700000000000, 48.13, 11.57, 520").unwrap();
        assert_eq!(fix.time.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(fix.latitude, 48.13);
        assert_eq!(fix.altitude, Some(520.0));
    }

    #[test]
    fn rejects_bad_fixes() {
        assert!(parse_fix("1,2").is_err());
        assert!(parse_fix("x,1,2").is_err());
        assert!(parse_fix("1,91,0").is_err());
        assert!(parse_fix("1,0,0,high").is_err());
    }

    #[test]
    fn rejects_fix_before_epoch() {
        let err = parse_fix("-5,0,0").unwrap_err();
        assert!(err.contains("before the epoch"));
        assert!(parse_fix("0,0,0").is_ok());
    }
}
