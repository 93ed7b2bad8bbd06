//! Interactive pipeline execution — `shipyard run`.

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Select, theme::ColorfulTheme};
use std::path::PathBuf;
use std::sync::Arc;

use shipyard::config::ShipyardConfig;
use shipyard::context::{Credential, Repository};
use shipyard::orchestrator::{EventChannel, Orchestrator};
use shipyard::policy::Mode;
use shipyard::records::{GateKind, SessionRecord, WorkflowRecord, WorkflowStatus};
use shipyard::step::{StepKind, StepStatus};
use shipyard::store::{MemoryStore, Persistence};
use shipyard::ui::PipelineUi;
use shipyard::units::builtin_units;

pub struct RunArgs {
    pub repo: PathBuf,
    pub mode: Mode,
    pub yes: bool,
    pub token: Option<String>,
    pub remote_url: Option<String>,
    pub output_root: Option<PathBuf>,
    pub review: Option<StepKind>,
    pub config_file: Option<PathBuf>,
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let config = ShipyardConfig::load(args.config_file.as_deref())?;

    let root = args
        .repo
        .canonicalize()
        .with_context(|| format!("Repository path not found: {}", args.repo.display()))?;
    let mut repository = Repository::from_path(root);
    if let Some(url) = &args.remote_url {
        repository = repository.with_remote(url);
    }

    let credential = match &args.token {
        Some(token) => Credential::bearer(token),
        None => Credential::anonymous(),
    };

    let persistence = Persistence::new(
        Arc::new(MemoryStore::new()),
        config.ttl_config(),
        config.retry_policy(),
    );
    let events = EventChannel::default();
    let orchestrator = Orchestrator::new(
        builtin_units(),
        persistence,
        events.clone(),
        config.orchestrator_config(args.output_root.clone(), args.review)?,
    );

    // Render progress from the event stream until the run finishes.
    let ui = Arc::new(PipelineUi::new());
    let ui_task = {
        let ui = ui.clone();
        let mut rx = events.subscribe();
        tokio::spawn(async move {
            while let Ok(envelope) = rx.recv().await {
                ui.handle_event(&envelope);
            }
        })
    };

    let mut session = SessionRecord::new(
        repository,
        credential,
        args.mode,
        config.ttl_config().session.as_secs(),
    );

    let mut workflow = orchestrator.start(&mut session).await?;

    // The approval loop: each suspension asks the human (or the --yes
    // flag) for a decision until the workflow reaches a terminal state.
    while workflow.status == WorkflowStatus::WaitingApproval {
        let gate = orchestrator
            .pending_gate(&workflow)
            .await?
            .context("workflow is suspended but its gate is missing")?;

        let approved = if args.yes {
            println!("  {} (--yes flag)", style("Auto-approved").dim());
            true
        } else {
            prompt_for_gate(&gate.kind, gate.artifacts.len())?
        };

        workflow = orchestrator.respond(&gate.id, approved, None).await?;
    }

    ui.finish();
    ui_task.abort();

    print_outcome(&workflow);
    if workflow.status == WorkflowStatus::Failed {
        std::process::exit(1);
    }
    Ok(())
}

fn prompt_for_gate(kind: &GateKind, artifact_count: usize) -> Result<bool> {
    let (prompt, options) = match kind {
        GateKind::Content { step } => (
            format!("Review generated {step} ({artifact_count} artifacts)"),
            vec!["Approve content", "Reject and regenerate"],
        ),
        GateKind::Publish => (
            format!("Review publication ({artifact_count} artifacts)"),
            vec!["Approve and publish", "Reject and abandon"],
        ),
    };

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .items(&options)
        .default(0)
        .interact()?;

    Ok(selection == 0)
}

fn print_outcome(workflow: &WorkflowRecord) {
    println!();
    match workflow.status {
        WorkflowStatus::Completed => {
            println!("{} workflow {}", style("Completed").green().bold(), workflow.id);
            if let Some(publication) = workflow
                .step_result(StepKind::Publish)
                .and_then(|r| r.artifacts.first())
            {
                if let Some(branch) = publication.data["branch"].as_str() {
                    println!("  branch:  {}", style(branch).bold());
                }
                if let Some(summary) = publication.data["summary"].as_str() {
                    print!("  {}", summary.replace('\n', "\n  "));
                    println!();
                }
            }
        }
        WorkflowStatus::Failed => {
            println!("{} workflow {}", style("Failed").red().bold(), workflow.id);
            if let Some(error) = &workflow.error {
                println!("  {error}");
            }
        }
        other => println!("Workflow {} ended in state {other}", workflow.id),
    }

    if let Some(summary) = workflow.skip_summary() {
        println!("  {} {}", style("degraded:").yellow(), summary);
    }

    let executed: Vec<String> = workflow
        .steps
        .iter()
        .flatten()
        .map(|r| {
            let marker = match r.status {
                StepStatus::Completed => "+",
                StepStatus::Skipped => "~",
                StepStatus::Failed => "!",
            };
            format!("{marker}{}", r.kind)
        })
        .collect();
    println!("  steps: {}", executed.join(" "));
}
