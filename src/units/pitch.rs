//! Pitch outline generation from earlier step outputs.

use async_trait::async_trait;
use serde_json::json;
use tokio::time::Instant;

use crate::errors::StepError;
use crate::step::{Artifact, StepContext, StepKind, StepResult, StepUnit};
use crate::units::docs::write_deliverable;

pub struct PitchUnit;

#[async_trait]
impl StepUnit for PitchUnit {
    fn kind(&self) -> StepKind {
        StepKind::Pitch
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepResult, StepError> {
        let start = Instant::now();

        let analysis = ctx
            .prior_artifact("analysis")
            .ok_or_else(|| StepError::Execution {
                kind: StepKind::Pitch,
                message: "no analysis artifact to pitch from".to_string(),
            })?;

        let name = analysis.data["name"].as_str().unwrap_or("Untitled project");
        let description = analysis.data["description"].as_str().unwrap_or("");
        let lines = analysis.data["lines"].as_u64().unwrap_or(0);

        let stack: Vec<String> = analysis.data["languages"]
            .as_object()
            .map(|langs| langs.keys().cloned().collect())
            .unwrap_or_default();

        let mut pitch = format!("# {name}: pitch outline\n\n");
        pitch.push_str("## Problem\n\n");
        pitch.push_str(&format!(
            "{}\n\n",
            if description.is_empty() {
                "Describe the gap this project closes."
            } else {
                description
            }
        ));
        pitch.push_str("## Solution\n\n");
        pitch.push_str(&format!(
            "{name}: {lines} lines of working code, ready to show.\n\n"
        ));

        if !stack.is_empty() {
            pitch.push_str("## Stack\n\n");
            pitch.push_str(&format!("{}\n\n", stack.join(", ")));
        }

        // The demo slot may have been skipped; the pitch degrades instead
        // of failing with it.
        if let Some(preview) = ctx.prior_artifact("demo_preview")
            && let Some(url) = preview.data["url"].as_str()
        {
            pitch.push_str("## Live demo\n\n");
            pitch.push_str(&format!("{url}\n\n"));
        }

        pitch.push_str("## Next steps\n\n");
        pitch.push_str("- Gather feedback\n- Harden the rough edges\n- Ship\n");

        let path = ctx.output_dir.join("pitch.md");
        write_deliverable(StepKind::Pitch, &path, &pitch)?;

        let artifact = Artifact::markdown("pitch", &pitch);
        Ok(StepResult::completed(StepKind::Pitch, vec![artifact], start.elapsed())
            .with_metadata(json!({ "path": path.display().to_string() })))
    }
}
