//! Headless pipeline execution with HTTP approvals — `shipyard serve`.
//!
//! Runs the pipeline and exposes the approval API and event stream over
//! HTTP instead of prompting in the terminal. The process exits when the
//! workflow reaches a terminal state or on Ctrl-C.

use anyhow::{Context, Result};
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use shipyard::config::ShipyardConfig;
use shipyard::context::{Credential, Repository};
use shipyard::orchestrator::{EventChannel, Orchestrator};
use shipyard::policy::Mode;
use shipyard::records::SessionRecord;
use shipyard::server::DashboardServer;
use shipyard::step::StepKind;
use shipyard::store::{MemoryStore, Persistence};
use shipyard::units::builtin_units;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct ServeArgs {
    pub repo: PathBuf,
    pub mode: Mode,
    pub bind: Option<String>,
    pub token: Option<String>,
    pub remote_url: Option<String>,
    pub output_root: Option<PathBuf>,
    pub review: Option<StepKind>,
    pub config_file: Option<PathBuf>,
}

pub async fn execute(args: ServeArgs) -> Result<()> {
    let config = ShipyardConfig::load(args.config_file.as_deref())?;

    let root = args
        .repo
        .canonicalize()
        .with_context(|| format!("Repository path not found: {}", args.repo.display()))?;
    let mut repository = Repository::from_path(root);
    if let Some(url) = &args.remote_url {
        repository = repository.with_remote(url);
    }

    let persistence = Persistence::new(
        Arc::new(MemoryStore::new()),
        config.ttl_config(),
        config.retry_policy(),
    );
    let orchestrator = Arc::new(Orchestrator::new(
        builtin_units(),
        persistence,
        EventChannel::default(),
        config.orchestrator_config(args.output_root.clone(), args.review)?,
    ));

    let mut server = DashboardServer::new(orchestrator.clone());
    let bind = args.bind.unwrap_or_else(|| config.bind_addr());
    let url = server.start(&bind).await?;

    println!("{} {url}", style("Dashboard:").bold());
    println!("  status:   GET  {url}/workflows/<id>");
    println!("  events:   GET  {url}/events  (or ws {url}/events/stream)");
    println!("  respond:  POST {url}/gates/<id>/respond {{\"approved\": true}}");
    println!();

    let credential = match &args.token {
        Some(token) => Credential::bearer(token),
        None => Credential::anonymous(),
    };
    let mut session = SessionRecord::new(
        repository,
        credential,
        args.mode,
        config.ttl_config().session.as_secs(),
    );

    let workflow = orchestrator.start(&mut session).await?;
    let workflow_id = workflow.id.clone();
    println!("Workflow {workflow_id} is {}", workflow.status);

    // Wait for HTTP responders to drive the workflow to a terminal state.
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("Interrupted; shutting down");
                break;
            }
            _ = tokio::time::sleep(POLL_INTERVAL) => {
                let current = orchestrator.load_workflow(&workflow_id).await?;
                if current.is_terminal() {
                    println!("Workflow {workflow_id} finished: {}", current.status);
                    if let Some(error) = &current.error {
                        println!("  {error}");
                    }
                    break;
                }
            }
        }
    }

    server.stop();
    Ok(())
}
