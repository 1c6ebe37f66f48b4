use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use control_center::config::ControlConfig;

mod cmd;

#[derive(Parser)]
#[command(name = "control-center")]
#[command(version, about = "Personal control center: quest board, nugget inventory and agent status")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to control-center.toml (defaults to ./control-center.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the dashboard server
    Serve {
        /// Port to serve on
        #[arg(short, long)]
        port: Option<u16>,

        /// SQLite database path
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Enable dev mode (permissive CORS, bind all interfaces)
        #[arg(long)]
        dev: bool,
    },
    /// Create the database schema and exit
    InitDb,
    /// Set the shared dashboard password
    SetPassword {
        password: String,
    },
    /// Print the effective configuration with secrets redacted
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ControlConfig::resolve(cli.config.as_deref())?;
    if let Commands::Serve { port, db_path, dev } = &cli.command {
        cmd::serve::apply_flags(&mut config, *port, db_path.clone(), *dev);
    }

    let problems = config.validate();
    if !problems.is_empty() {
        anyhow::bail!("Invalid configuration:\n  - {}", problems.join("\n  - "));
    }

    let _log_guard = control_center::logging::init(&config.logging, cli.verbose)?;

    match &cli.command {
        Commands::Serve { .. } => cmd::cmd_serve(config).await?,
        Commands::InitDb => cmd::cmd_init_db(&config).await?,
        Commands::SetPassword { password } => cmd::cmd_set_password(&config, password).await?,
        Commands::Config => cmd::cmd_config(&config)?,
    }

    Ok(())
}
