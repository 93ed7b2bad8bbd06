//! Terminal step: assemble the deliverables and describe the outward
//! change. The artifact carries everything a PR client needs (branch
//! name, change summary, file list); actually opening the pull request
//! is an external collaborator's job.

use async_trait::async_trait;
use serde_json::json;
use tokio::time::Instant;

use crate::errors::StepError;
use crate::step::{Artifact, StepContext, StepKind, StepResult, StepStatus, StepUnit};
use crate::units::docs::write_deliverable;

pub struct PublishUnit;

#[async_trait]
impl StepUnit for PublishUnit {
    fn kind(&self) -> StepKind {
        StepKind::Publish
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepResult, StepError> {
        let start = Instant::now();

        let fingerprint = ctx
            .prior_artifact("analysis")
            .and_then(|a| a.data["fingerprint"].as_str())
            .unwrap_or("00000000")
            .chars()
            .take(8)
            .collect::<String>();

        let repo = &ctx.run.repository;
        let branch = format!("shipyard/launch-{fingerprint}");

        let produced: Vec<String> = ctx
            .prior
            .iter()
            .filter(|r| r.status == StepStatus::Completed)
            .map(|r| r.kind.to_string())
            .collect();
        let skipped: Vec<String> = ctx
            .prior
            .iter()
            .filter(|r| r.status == StepStatus::Skipped)
            .map(|r| r.kind.to_string())
            .collect();

        let mut summary = format!(
            "Launch deliverables for {}: {}.\n",
            repo.name,
            produced.join(", ")
        );
        if !skipped.is_empty() {
            summary.push_str(&format!("Skipped: {}.\n", skipped.join(", ")));
        }

        let files: Vec<String> = ["README.md", "demo/index.html", "pitch.md"]
            .iter()
            .filter(|f| ctx.output_dir.join(f).exists())
            .map(|f| f.to_string())
            .collect();

        write_deliverable(StepKind::Publish, &ctx.output_dir.join("SUMMARY.md"), &summary)?;

        let artifact = Artifact::json(
            "publication",
            json!({
                "branch": branch,
                "summary": summary,
                "files": files,
                "remote_url": repo.remote_url,
            }),
        );
        Ok(StepResult::completed(StepKind::Publish, vec![artifact], start.elapsed()))
    }
}
