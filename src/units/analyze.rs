//! Repository analysis: file census, language breakdown and metadata.

use async_trait::async_trait;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::time::Instant;
use walkdir::WalkDir;

use crate::errors::StepError;
use crate::step::{Artifact, StepContext, StepKind, StepResult, StepUnit};

/// Directories that say nothing about the project itself.
const IGNORED_DIRS: [&str; 5] = [".git", "target", "node_modules", "dist", ".venv"];

/// Extensions counted toward the language breakdown.
const CODE_EXTENSIONS: [&str; 12] = [
    "rs", "ts", "tsx", "js", "jsx", "py", "go", "java", "rb", "c", "cpp", "sh",
];

const MAX_COUNTED_FILE_BYTES: u64 = 256 * 1024;

pub struct AnalyzeUnit;

#[async_trait]
impl StepUnit for AnalyzeUnit {
    fn kind(&self) -> StepKind {
        StepKind::Analyze
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepResult, StepError> {
        let start = Instant::now();
        let root = &ctx.run.repository.root;

        if !root.is_dir() {
            return Err(StepError::Execution {
                kind: StepKind::Analyze,
                message: format!("repository root {} is not a directory", root.display()),
            });
        }

        let mut file_count: u64 = 0;
        let mut line_counts: BTreeMap<String, u64> = BTreeMap::new();
        let mut hasher = Sha256::new();

        for entry in WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_ignored(e.path()))
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            if ctx.cancel.is_cancelled() {
                return Err(StepError::Execution {
                    kind: StepKind::Analyze,
                    message: "analysis cancelled".to_string(),
                });
            }

            file_count += 1;

            let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
            hasher.update(rel.to_string_lossy().as_bytes());
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            hasher.update(size.to_le_bytes());

            if let Some(ext) = entry.path().extension().and_then(|e| e.to_str())
                && CODE_EXTENSIONS.contains(&ext)
                && size <= MAX_COUNTED_FILE_BYTES
                && let Ok(content) = std::fs::read_to_string(entry.path())
            {
                *line_counts.entry(ext.to_string()).or_default() += content.lines().count() as u64;
            }
        }

        let (name, description) = project_metadata(root, &ctx.run.repository.name);
        let fingerprint = format!("{:x}", hasher.finalize());
        let total_lines: u64 = line_counts.values().sum();

        let artifact = Artifact::json(
            "analysis",
            json!({
                "name": name,
                "description": description,
                "files": file_count,
                "lines": total_lines,
                "languages": line_counts,
                "fingerprint": fingerprint,
            }),
        );

        Ok(
            StepResult::completed(StepKind::Analyze, vec![artifact], start.elapsed())
                .with_metadata(json!({ "root": root.display().to_string() })),
        )
    }
}

fn is_ignored(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| IGNORED_DIRS.contains(&n))
}

/// Project name and description from Cargo.toml or package.json, falling
/// back to the repository name.
fn project_metadata(root: &Path, fallback_name: &str) -> (String, String) {
    if let Ok(content) = std::fs::read_to_string(root.join("Cargo.toml"))
        && let Ok(manifest) = content.parse::<toml::Table>()
        && let Some(package) = manifest.get("package").and_then(|p| p.as_table())
    {
        let name = package
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or(fallback_name)
            .to_string();
        let description = package
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        return (name, description);
    }

    if let Ok(content) = std::fs::read_to_string(root.join("package.json"))
        && let Ok(pkg) = serde_json::from_str::<serde_json::Value>(&content)
    {
        let name = pkg
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or(fallback_name)
            .to_string();
        let description = pkg
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        return (name, description);
    }

    (fallback_name.to_string(), String::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Credential, Repository, RunContext};
    use crate::policy::Mode;
    use crate::step::StepStatus;
    use std::fs;
    use tempfile::tempdir;

    fn ctx_for(root: &Path) -> StepContext {
        let run = RunContext::new(
            Repository::from_path(root.to_path_buf()),
            Credential::anonymous(),
            Mode::Hackathon,
        );
        StepContext::new(run, root.join("out"))
    }

    #[tokio::test]
    async fn analyze_counts_files_and_lines() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.rs"), "fn main() {}\n// two lines\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "not code").unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git/HEAD"), "ref: x").unwrap();

        let ctx = ctx_for(dir.path());
        let result = AnalyzeUnit.execute(&ctx).await.unwrap();

        assert_eq!(result.status, StepStatus::Completed);
        let data = &result.artifacts[0].data;
        assert_eq!(data["files"], 2);
        assert_eq!(data["languages"]["rs"], 2);
        assert!(data["fingerprint"].as_str().unwrap().len() == 64);
    }

    #[tokio::test]
    async fn analyze_reads_cargo_metadata() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("Cargo.toml"),
            "[package]\nname = \"widget\"\ndescription = \"A widget maker\"\n",
        )
        .unwrap();

        let ctx = ctx_for(dir.path());
        let result = AnalyzeUnit.execute(&ctx).await.unwrap();

        let data = &result.artifacts[0].data;
        assert_eq!(data["name"], "widget");
        assert_eq!(data["description"], "A widget maker");
    }

    #[tokio::test]
    async fn analyze_fails_on_missing_root() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        let ctx = ctx_for(&missing);

        let err = AnalyzeUnit.execute(&ctx).await.unwrap_err();
        assert!(matches!(err, StepError::Execution { .. }));
    }
}
