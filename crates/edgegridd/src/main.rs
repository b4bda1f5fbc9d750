//! edgegridd: the EdgeGrid edge node daemon.
//!
//! Assembles the edge-side subsystems in one process:
//! - Record store (redb)
//! - Message bus
//! - Meta-manager + periodic pod-status sync
//! - Task manager + reconnect reconciler
//!
//! # Usage
//!
//! ```text
//! edgegridd run --config /etc/edgegrid/edgegrid.toml --data-dir /var/lib/edgegrid
//! edgegridd config
//! ```

mod edge_node;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use edgegrid_core::EdgeConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "edgegridd", about = "EdgeGrid edge node daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the edge node.
    Run {
        /// Path to edgegrid.toml. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Data directory; overrides the database and report paths.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Print the effective configuration.
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,edgegridd=debug,edgegrid=debug")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { config, data_dir } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(dir) = data_dir {
                std::fs::create_dir_all(&dir)?;
                config.database.data_source = dir.join("edgegrid.redb");
                config.task_manager.report_path = dir.join("upgrade-report.json");
            }
            edge_node::run(config).await
        }
        Command::Config { config } => {
            let config = load_config(config.as_deref())?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<EdgeConfig> {
    match path {
        Some(path) => EdgeConfig::from_file(path),
        None => Ok(EdgeConfig::default()),
    }
}
