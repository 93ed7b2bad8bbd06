//! Terminal rendering of pipeline progress, driven by the event channel.

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::orchestrator::{EventEnvelope, WorkflowEvent};
use crate::step::CONTENT_STEPS;

/// Progress display for one pipeline run: a step bar plus a live spinner.
pub struct PipelineUi {
    multi: MultiProgress,
    step_bar: ProgressBar,
    spinner: ProgressBar,
}

impl Default for PipelineUi {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineUi {
    pub fn new() -> Self {
        let multi = MultiProgress::new();

        let step_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let step_bar = multi.add(ProgressBar::new(CONTENT_STEPS.len() as u64 + 1));
        step_bar.set_style(step_style);
        step_bar.set_prefix("Steps");

        let spinner_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string");

        let spinner = multi.add(ProgressBar::new_spinner());
        spinner.set_style(spinner_style);
        spinner.set_prefix("  Now");
        spinner.enable_steady_tick(Duration::from_millis(120));

        Self {
            multi,
            step_bar,
            spinner,
        }
    }

    /// Render one event. Unknown or uninteresting events are ignored.
    pub fn handle_event(&self, envelope: &EventEnvelope) {
        match &envelope.event {
            WorkflowEvent::WorkflowStarted { mode, .. } => {
                self.spinner.set_message(format!("starting ({mode} mode)"));
            }
            WorkflowEvent::StepStarted { step, .. } => {
                self.spinner.set_message(format!("running {step}"));
            }
            WorkflowEvent::StepRetried { step, .. } => {
                self.spinner.set_message(format!("regenerating {step}"));
            }
            WorkflowEvent::StepCompleted { step, duration_ms, .. } => {
                self.step_bar.inc(1);
                self.println(format!(
                    "  {} {step} ({:.1}s)",
                    style("✓").green(),
                    *duration_ms as f64 / 1000.0
                ));
            }
            WorkflowEvent::StepSkipped { step, cause, .. } => {
                self.step_bar.inc(1);
                self.println(format!(
                    "  {} {step} skipped: {cause}",
                    style("○").yellow()
                ));
            }
            WorkflowEvent::AwaitingApproval { artifact_count, .. } => {
                self.spinner
                    .set_message(format!("waiting for approval ({artifact_count} artifacts)"));
            }
            WorkflowEvent::ApprovalReceived { approved, .. } => {
                let verdict = if *approved { "approved" } else { "rejected" };
                self.println(format!("  {} gate {verdict}", style("▸").dim()));
            }
            WorkflowEvent::PipelineFailed { error, .. } => {
                self.println(format!("  {} {error}", style("✗").red()));
                self.finish();
            }
            WorkflowEvent::WorkflowCompleted { branch, .. } => {
                self.step_bar.inc(1);
                if let Some(branch) = branch {
                    self.println(format!(
                        "  {} published on {}",
                        style("✓").green(),
                        style(branch).bold()
                    ));
                }
                self.finish();
            }
        }
    }

    /// Print a line above the bars without tearing them.
    fn println(&self, line: String) {
        let _ = self.multi.println(line);
    }

    pub fn finish(&self) {
        self.spinner.finish_and_clear();
        self.step_bar.finish_and_clear();
    }
}
