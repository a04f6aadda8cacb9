mod config;
pub mod database;
pub mod migrations;

pub use config::{Config, ServerConfig, ServerFlavor, UnitsConfig};
pub use database::Database;

use std::path::PathBuf;

/// Returns the data directory, creating it if needed.
///
/// `CLOUDRUN_DATA_DIR` wins when set. Otherwise `~/.config/cloudrun[-dev]/`
/// based on CLOUDRUN_ENV (set CLOUDRUN_ENV=dev for a development directory).
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let dir = match std::env::var_os("CLOUDRUN_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("CLOUDRUN_ENV").unwrap_or_else(|_| "production".to_string());

            if env == "dev" {
                base_dir.join("cloudrun-dev")
            } else {
                base_dir.join("cloudrun")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
