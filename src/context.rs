//! Explicit run context threaded through every step invocation.
//!
//! There is no ambient session state: the repository under work, the
//! credential handle and the selected mode all travel in a `RunContext`
//! owned by the caller.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::policy::Mode;

/// The repository a pipeline run works on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Repository {
    /// Display name, e.g. the directory or project name.
    pub name: String,
    /// Local checkout root.
    pub root: PathBuf,
    /// Remote URL if known, used in the published change summary.
    #[serde(default)]
    pub remote_url: Option<String>,
}

impl Repository {
    pub fn local(name: &str, root: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            root,
            remote_url: None,
        }
    }

    pub fn with_remote(mut self, url: &str) -> Self {
        self.remote_url = Some(url.to_string());
        self
    }

    /// Derive a repository from a checkout path, naming it after the
    /// directory.
    pub fn from_path(root: PathBuf) -> Self {
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "repository".to_string());
        Self {
            name,
            root,
            remote_url: None,
        }
    }
}

/// Opaque credential handle. The orchestrator never inspects the token; it
/// only hands it to units that talk to external services.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Credential {
    #[serde(default)]
    pub token: Option<String>,
}

impl Credential {
    pub fn anonymous() -> Self {
        Self { token: None }
    }

    pub fn bearer(token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
        }
    }
}

/// Everything a pipeline run carries from start to publication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunContext {
    pub repository: Repository,
    pub credential: Credential,
    pub mode: Mode,
}

impl RunContext {
    pub fn new(repository: Repository, credential: Credential, mode: Mode) -> Self {
        Self {
            repository,
            credential,
            mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_from_path_uses_directory_name() {
        let repo = Repository::from_path(PathBuf::from("/work/acme-api"));
        assert_eq!(repo.name, "acme-api");
        assert!(repo.remote_url.is_none());
    }

    #[test]
    fn run_context_round_trips_through_json() {
        let ctx = RunContext::new(
            Repository::local("demo", PathBuf::from("/tmp/demo")).with_remote("https://example.com/demo.git"),
            Credential::bearer("tok"),
            Mode::Placement,
        );
        let json = serde_json::to_string(&ctx).unwrap();
        let back: RunContext = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ctx);
    }
}
