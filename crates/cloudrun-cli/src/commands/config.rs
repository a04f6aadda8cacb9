//! Read and edit `config.toml`.
//!
//! Keys are dotted `section.field` paths into the `[server]` and `[units]`
//! tables. A bare section name selects every key below it.

use clap::Subcommand;
use cloudrun_core::Config;

const PASSWORD_KEY: &str = "server.password";

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print a key, or every key of a section
    Get {
        /// "server.address", "server.flavor", "units.metric", or a section like "server"
        key: String,
    },
    /// Set a key and save
    Set {
        /// Dotted key such as "server.username"
        key: String,
        /// New value; "nextcloud"/"owncloud" for server.flavor, true/false for units.metric
        value: String,
    },
    /// List every key as `section.field = value`
    List {
        /// Print the whole config as JSON
        #[arg(long)]
        json: bool,
    },
    /// Reset config to defaults
    Reset,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Get { key } => {
            reject_password(&key)?;
            let config = Config::load()?;
            let entries: Vec<_> = entries(&config)?
                .into_iter()
                .filter(|(path, _)| path == &key || path.starts_with(&format!("{key}.")))
                .collect();
            match entries.as_slice() {
                [] => return Err(unknown_key(&key, &config)),
                [(path, value)] if path == &key => println!("{value}"),
                many => many.iter().for_each(|(path, value)| println!("{path} = {value}")),
            }
        }
        ConfigAction::Set { key, value } => {
            reject_password(&key)?;
            let mut config = Config::load()?;
            if config.get(&key).is_none() {
                return Err(unknown_key(&key, &config));
            }
            config.set(&key, &value)?;
            println!("{key} = {}", config.get(&key).unwrap_or(value));
        }
        ConfigAction::List { json } => {
            let config = Config::load()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                for (path, value) in entries(&config)? {
                    println!("{path} = {value}");
                }
            }
        }
        ConfigAction::Reset => {
            Config::default().save()?;
            println!("config reset to defaults");
        }
    }
    Ok(())
}

fn reject_password(key: &str) -> Result<(), Box<dyn std::error::Error>> {
    if key == PASSWORD_KEY {
        return Err("the password is never stored; pass --password or set CLOUDRUN_PASSWORD".into());
    }
    Ok(())
}

fn unknown_key(key: &str, config: &Config) -> Box<dyn std::error::Error> {
    let known: Vec<String> = entries(config)
        .map(|all| all.into_iter().map(|(path, _)| path).collect())
        .unwrap_or_default();
    format!("unknown key: {key} (known keys: {})", known.join(", ")).into()
}

/// Flatten the config into `(section.field, value)` pairs, sorted by path.
fn entries(config: &Config) -> Result<Vec<(String, String)>, serde_json::Error> {
    let mut out = Vec::new();
    flatten("", &serde_json::to_value(config)?, &mut out);
    Ok(out)
}

fn flatten(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
    match value {
        serde_json::Value::Object(map) => {
            for (name, child) in map {
                let path = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}.{name}")
                };
                flatten(&path, child, out);
            }
        }
        serde_json::Value::String(s) => out.push((prefix.to_string(), s.clone())),
        other => out.push((prefix.to_string(), other.to_string())),
    }
}
