use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use shipyard::policy::Mode;
use shipyard::step::StepKind;

mod cmd;

#[derive(Parser)]
#[command(name = "shipyard")]
#[command(version, about = "Turn a repository into reviewed launch deliverables")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to shipyard.toml. Defaults to ./shipyard.toml or the user
    /// config directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Root directory for generated deliverables.
    #[arg(long, global = true)]
    pub output_root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the pipeline with interactive approval gates
    Run {
        /// Repository to work on
        #[arg(long, default_value = ".")]
        repo: PathBuf,

        /// Pipeline mode: hackathon, placement, startup or open-source
        #[arg(short, long, default_value = "hackathon")]
        mode: Mode,

        /// Auto-approve every gate
        #[arg(long)]
        yes: bool,

        /// Open a content-review gate for this step before publication
        #[arg(long)]
        review: Option<StepKind>,

        /// Credential token handed to units that talk to external services
        #[arg(long, env = "SHIPYARD_TOKEN")]
        token: Option<String>,

        /// Remote URL recorded in the publication summary
        #[arg(long)]
        remote_url: Option<String>,
    },
    /// Run the pipeline with approvals over HTTP
    Serve {
        #[arg(long, default_value = ".")]
        repo: PathBuf,

        #[arg(short, long, default_value = "hackathon")]
        mode: Mode,

        /// Bind address, e.g. 127.0.0.1:8080. Port 0 picks a dynamic port.
        #[arg(long)]
        bind: Option<String>,

        #[arg(long)]
        review: Option<StepKind>,

        #[arg(long, env = "SHIPYARD_TOKEN")]
        token: Option<String>,

        #[arg(long)]
        remote_url: Option<String>,
    },
    /// Show the mode policy table
    Modes,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            repo,
            mode,
            yes,
            review,
            token,
            remote_url,
        } => {
            cmd::run::execute(cmd::run::RunArgs {
                repo,
                mode,
                yes,
                token,
                remote_url,
                output_root: cli.output_root,
                review,
                config_file: cli.config,
            })
            .await
        }
        Commands::Serve {
            repo,
            mode,
            bind,
            review,
            token,
            remote_url,
        } => {
            cmd::serve::execute(cmd::serve::ServeArgs {
                repo,
                mode,
                bind,
                token,
                remote_url,
                output_root: cli.output_root,
                review,
                config_file: cli.config,
            })
            .await
        }
        Commands::Modes => cmd::modes::execute(),
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default_filter = if verbose { "shipyard=debug" } else { "shipyard=warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
