pub mod completions;
pub mod config;
pub mod connect;
pub mod session;
pub mod sync;
pub mod track;

use cloudrun_core::sync::SubscriberId;

/// Subscriber id the CLI registers orchestrators with.
pub const CLI_ID: SubscriberId = SubscriberId(100);

/// Password from the flag (or `CLOUDRUN_PASSWORD`), otherwise asked for.
pub fn password(given: Option<String>, username: &str) -> Result<String, Box<dyn std::error::Error>> {
    if let Some(password) = given {
        return Ok(password);
    }
    let password = dialoguer::Password::new()
        .with_prompt(format!("Password for {username}"))
        .interact()?;
    Ok(password)
}
