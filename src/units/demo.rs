//! Static demo preview page.

use async_trait::async_trait;
use serde_json::json;
use tokio::time::Instant;

use crate::errors::StepError;
use crate::step::{Artifact, StepContext, StepKind, StepResult, StepUnit};
use crate::units::docs::write_deliverable;

pub struct DemoUnit;

#[async_trait]
impl StepUnit for DemoUnit {
    fn kind(&self) -> StepKind {
        StepKind::Demo
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepResult, StepError> {
        let start = Instant::now();

        let (name, description) = match ctx.prior_artifact("analysis") {
            Some(a) => (
                a.data["name"].as_str().unwrap_or("Untitled").to_string(),
                a.data["description"].as_str().unwrap_or("").to_string(),
            ),
            None => (ctx.run.repository.name.clone(), String::new()),
        };

        let page = format!(
            "<!doctype html>\n<html>\n<head><meta charset=\"utf-8\"><title>{name}</title></head>\n\
             <body>\n<h1>{name}</h1>\n<p>{description}</p>\n\
             <p>Preview generated by shipyard.</p>\n</body>\n</html>\n"
        );

        let path = ctx.output_dir.join("demo").join("index.html");
        write_deliverable(StepKind::Demo, &path, &page)?;
        let url = format!("file://{}", path.display());

        let artifact = Artifact::json(
            "demo_preview",
            json!({
                "url": url,
                "path": path.display().to_string(),
            }),
        );
        Ok(StepResult::completed(StepKind::Demo, vec![artifact], start.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Credential, Repository, RunContext};
    use crate::policy::Mode;
    use tempfile::tempdir;

    #[tokio::test]
    async fn demo_stages_preview_page() {
        let dir = tempdir().unwrap();
        let run = RunContext::new(
            Repository::local("widget", dir.path().to_path_buf()),
            Credential::anonymous(),
            Mode::Hackathon,
        );
        let ctx = StepContext::new(run, dir.path().join("out"));

        let result = DemoUnit.execute(&ctx).await.unwrap();

        let url = result.artifacts[0].data["url"].as_str().unwrap();
        assert!(url.starts_with("file://"));
        assert!(dir.path().join("out/demo/index.html").exists());

        let html = std::fs::read_to_string(dir.path().join("out/demo/index.html")).unwrap();
        assert!(html.contains("<h1>widget</h1>"));
    }
}
