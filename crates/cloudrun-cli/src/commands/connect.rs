//! Connection setup: try the credentials, then remember everything but the password.

use clap::Args;
use cloudrun_core::sync::{ConnectInfo, RemoteStore, WebDavClient};
use cloudrun_core::Config;

#[derive(Args)]
pub struct ConnectArgs {
    /// Server address, e.g. https://cloud.example.org
    address: String,
    /// Account name
    username: String,
    /// Server kind (nextcloud, owncloud)
    #[arg(long, default_value = "nextcloud")]
    flavor: String,
    /// Folder on the server holding the session files
    #[arg(long)]
    remote_path: Option<String>,
    /// Account password; never written to disk
    #[arg(long, env = "CLOUDRUN_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

pub async fn run(args: ConnectArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load()?;
    config.apply("server.flavor", &args.flavor)?;
    config.apply("server.address", &args.address)?;
    config.apply("server.username", &args.username)?;
    if let Some(remote_path) = &args.remote_path {
        config.apply("server.remote_path", remote_path)?;
    }

    let password = super::password(args.password, &config.server.username)?;
    let info = ConnectInfo::from_config(&config.server, password);
    let client = WebDavClient::from_config(&config.server)?;
    let files = client.list(&info).await?;

    config.save()?;
    println!(
        "{} connected to {} ({} files in /{})",
        config.server.flavor.app_name(),
        info.address,
        files.len(),
        info.remote_path
    );
    Ok(())
}
