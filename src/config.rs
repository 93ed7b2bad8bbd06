//! Configuration loading for the Shipyard pipeline.
//!
//! Settings come from `shipyard.toml`, in the working directory or the
//! user config directory, with hard-coded defaults underneath. Every
//! section is optional; CLI flags override file values at the call site.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::orchestrator::OrchestratorConfig;
use crate::retry::RetryPolicy;
use crate::step::{StepBudgets, StepKind};
use crate::store::TtlConfig;

/// Parsed `shipyard.toml`. All fields optional; defaults fill the gaps.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShipyardConfig {
    #[serde(default)]
    pub budgets: BudgetSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub ttl: TtlSection,
    #[serde(default)]
    pub server: ServerSection,
    /// Root directory for per-run deliverable output.
    #[serde(default)]
    pub output_root: Option<PathBuf>,
    /// Step whose content gets its own review gate before publication.
    #[serde(default)]
    pub content_review: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BudgetSection {
    pub analyze_ms: Option<u64>,
    pub docs_ms: Option<u64>,
    pub demo_ms: Option<u64>,
    pub pitch_ms: Option<u64>,
    pub publish_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetrySection {
    pub max_attempts: Option<u32>,
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TtlSection {
    pub session_secs: Option<u64>,
    pub workflow_secs: Option<u64>,
    pub gate_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerSection {
    /// Bind address for the approval/dashboard server. Port 0 picks a
    /// dynamic port.
    pub bind: Option<String>,
}

impl ShipyardConfig {
    /// Load configuration: an explicit path wins, then `./shipyard.toml`,
    /// then the user config directory, then defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let local = PathBuf::from("shipyard.toml");
        if local.exists() {
            return Self::from_file(&local);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user = config_dir.join("shipyard").join("config.toml");
            if user.exists() {
                return Self::from_file(&user);
            }
        }

        Ok(Self::default())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn step_budgets(&self) -> StepBudgets {
        let defaults = StepBudgets::default();
        let ms = |v: Option<u64>, d: Duration| v.map(Duration::from_millis).unwrap_or(d);
        StepBudgets {
            analyze: ms(self.budgets.analyze_ms, defaults.analyze),
            docs: ms(self.budgets.docs_ms, defaults.docs),
            demo: ms(self.budgets.demo_ms, defaults.demo),
            pitch: ms(self.budgets.pitch_ms, defaults.pitch),
            publish: ms(self.budgets.publish_ms, defaults.publish),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            max_attempts: self.retry.max_attempts.unwrap_or(defaults.max_attempts),
            initial_delay: self
                .retry
                .initial_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_delay),
            max_delay: self
                .retry
                .max_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
            backoff_multiplier: self
                .retry
                .backoff_multiplier
                .unwrap_or(defaults.backoff_multiplier),
        }
    }

    pub fn ttl_config(&self) -> TtlConfig {
        let defaults = TtlConfig::default();
        let secs = |v: Option<u64>, d: Duration| v.map(Duration::from_secs).unwrap_or(d);
        TtlConfig {
            session: secs(self.ttl.session_secs, defaults.session),
            workflow: secs(self.ttl.workflow_secs, defaults.workflow),
            gate: secs(self.ttl.gate_secs, defaults.gate),
        }
    }

    pub fn bind_addr(&self) -> String {
        self.server
            .bind
            .clone()
            .unwrap_or_else(|| "127.0.0.1:0".to_string())
    }

    /// Assemble the supervisor config, applying CLI overrides.
    pub fn orchestrator_config(
        &self,
        output_root: Option<PathBuf>,
        content_review: Option<StepKind>,
    ) -> Result<OrchestratorConfig> {
        let file_review = self
            .content_review
            .as_deref()
            .map(|s| s.parse::<StepKind>())
            .transpose()
            .map_err(|e| anyhow::anyhow!("invalid content_review in config: {e}"))?;

        Ok(OrchestratorConfig {
            budgets: self.step_budgets(),
            content_review: content_review.or(file_review),
            output_root: output_root
                .or_else(|| self.output_root.clone())
                .unwrap_or_else(|| std::env::temp_dir().join("shipyard")),
        })
    }
}
