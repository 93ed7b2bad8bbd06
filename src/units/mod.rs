//! Built-in content generators.
//!
//! Each unit is deliberately simple templating over repository data; the
//! interesting machinery lives in the supervisor, not here. All units are
//! offline: they read the checkout and write beneath the per-run output
//! directory, nothing else. Deployments, real PR creation and chat
//! delivery are external collaborators that replace these through the
//! same `StepUnit` contract.

mod analyze;
mod demo;
mod docs;
mod pitch;
mod publish;

pub use analyze::AnalyzeUnit;
pub use demo::DemoUnit;
pub use docs::DocsUnit;
pub use pitch::PitchUnit;
pub use publish::PublishUnit;

use std::sync::Arc;

use crate::orchestrator::UnitRegistry;
use crate::step::StepKind;

/// Registry with every built-in unit installed.
pub fn builtin_units() -> UnitRegistry {
    let mut units = UnitRegistry::new();
    units.insert(StepKind::Analyze, Arc::new(AnalyzeUnit));
    units.insert(StepKind::Docs, Arc::new(DocsUnit));
    units.insert(StepKind::Demo, Arc::new(DemoUnit));
    units.insert(StepKind::Pitch, Arc::new(PitchUnit));
    units.insert(StepKind::Publish, Arc::new(PublishUnit));
    units
}
