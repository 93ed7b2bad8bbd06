//! README draft generation from the analysis artifact.

use async_trait::async_trait;
use serde_json::json;
use tokio::time::Instant;

use crate::errors::StepError;
use crate::step::{Artifact, StepContext, StepKind, StepResult, StepUnit};

pub struct DocsUnit;

#[async_trait]
impl StepUnit for DocsUnit {
    fn kind(&self) -> StepKind {
        StepKind::Docs
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepResult, StepError> {
        let start = Instant::now();

        let analysis = ctx
            .prior_artifact("analysis")
            .ok_or_else(|| StepError::Execution {
                kind: StepKind::Docs,
                message: "no analysis artifact to document".to_string(),
            })?;

        let name = analysis.data["name"].as_str().unwrap_or("Untitled project");
        let description = analysis.data["description"].as_str().unwrap_or("");
        let files = analysis.data["files"].as_u64().unwrap_or(0);
        let lines = analysis.data["lines"].as_u64().unwrap_or(0);

        let mut readme = format!("# {name}\n\n");
        if !description.is_empty() {
            readme.push_str(&format!("{description}\n\n"));
        }
        readme.push_str("## At a glance\n\n");
        readme.push_str(&format!(
            "- {files} files, {lines} lines of code\n"
        ));

        if let Some(languages) = analysis.data["languages"].as_object()
            && !languages.is_empty()
        {
            readme.push_str("\n## Languages\n\n");
            readme.push_str("| Language | Lines |\n|---|---|\n");
            for (ext, count) in languages {
                readme.push_str(&format!("| {ext} | {count} |\n"));
            }
        }

        readme.push_str("\n## Getting started\n\n");
        readme.push_str(&format!(
            "Clone the repository and explore `{name}` from the entry point down.\n"
        ));

        let path = ctx.output_dir.join("README.md");
        write_deliverable(StepKind::Docs, &path, &readme)?;

        let artifact = Artifact::markdown("readme", &readme);
        Ok(StepResult::completed(StepKind::Docs, vec![artifact], start.elapsed())
            .with_metadata(json!({ "path": path.display().to_string() })))
    }
}

/// Write a deliverable file, creating parent directories as needed.
pub(super) fn write_deliverable(
    kind: StepKind,
    path: &std::path::Path,
    content: &str,
) -> Result<(), StepError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StepError::Execution {
            kind,
            message: format!("failed to create {}: {e}", parent.display()),
        })?;
    }
    std::fs::write(path, content).map_err(|e| StepError::Execution {
        kind,
        message: format!("failed to write {}: {e}", path.display()),
    })
}
