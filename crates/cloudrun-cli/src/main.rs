use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "cloudrun-cli", version, about = "CloudRun CLI")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check and remember the server connection
    Connect(commands::connect::ConnectArgs),
    /// Synchronize sessions with the server
    Sync {
        #[command(subcommand)]
        action: commands::sync::SyncAction,
    },
    /// Recorded sessions
    Session {
        #[command(subcommand)]
        action: commands::session::SessionAction,
    },
    /// Record a session from position fixes
    Track(commands::track::TrackArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() {
    init_logging();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Connect(args) => commands::connect::run(args).await,
        Commands::Sync { action } => commands::sync::run(action).await,
        Commands::Session { action } => commands::session::run(action),
        Commands::Track(args) => commands::track::run(args),
        Commands::Config { action } => commands::config::run(action),
        Commands::Completions { shell } => {
            commands::completions::run(shell);
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,cloudrun_core=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time().with_writer(std::io::stderr))
        .with(filter)
        .init();
}
