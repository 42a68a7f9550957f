use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod render;

#[derive(Parser)]
#[command(name = "vcsched")]
#[command(about = "Run VirtualClient benchmarks on remote machines", long_about = None)]
struct Cli {
    /// Config file path (defaults to ~/.config/vcsched/scheduler.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy a package to a machine, run the tool, and retrieve logs
    Run {
        /// Configured machine address
        machine: String,

        /// Local package archive (.zip, .tar.gz, .tgz, .tar)
        package: PathBuf,

        /// Profile/parameter string passed through to the tool
        #[arg(short, long, default_value = "")]
        profile: String,

        /// Remove the run and its local artifacts after completion
        #[arg(long)]
        remove: bool,
    },

    /// List configured machines
    Machines {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            machine,
            package,
            profile,
            remove,
        } => commands::run::run(&config, &machine, package, profile, remove).await,
        Commands::Machines { json } => commands::machines::run(&config, json),
    }
}
