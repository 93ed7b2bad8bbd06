//! Mode policy: which steps are critical for which pipeline mode.
//!
//! A static priority table maps (mode, step kind) to a tier from 1 to 4.
//! Steps at or above [`CRITICAL_THRESHOLD`] are critical: their failure
//! aborts the whole workflow. Below it, a failure is recorded as skipped
//! and the pipeline continues. `Analyze`, `Docs` and `Publish` are pinned
//! at the top tier in every mode; only `Demo` and `Pitch` vary, since
//! deployment and presentation assets are the most failure-prone stages
//! and not every mode is about them.

use serde::{Deserialize, Serialize};

use crate::step::StepKind;

/// Priority tier at or above which a step failure is fatal.
pub const CRITICAL_THRESHOLD: u8 = 3;

/// Named pipeline configuration selecting step criticality and emphasis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Demo and pitch are the point: both critical.
    Hackathon,
    /// Portfolio piece for job applications: docs matter, demo and pitch
    /// are nice-to-have.
    Placement,
    /// Investor-facing: demo and pitch both carry weight.
    Startup,
    /// Community release: documentation first, presentation assets last.
    OpenSource,
}

pub const ALL_MODES: [Mode; 4] = [
    Mode::Hackathon,
    Mode::Placement,
    Mode::Startup,
    Mode::OpenSource,
];

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Hackathon => "hackathon",
            Mode::Placement => "placement",
            Mode::Startup => "startup",
            Mode::OpenSource => "open_source",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hackathon" => Ok(Mode::Hackathon),
            "placement" => Ok(Mode::Placement),
            "startup" => Ok(Mode::Startup),
            "open_source" | "open-source" | "opensource" => Ok(Mode::OpenSource),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

/// Priority tier for a step under a mode.
pub fn priority(mode: Mode, kind: StepKind) -> u8 {
    match kind {
        // The pipeline cannot produce anything meaningful without analysis
        // or documentation, and publication is the whole point.
        StepKind::Analyze | StepKind::Docs | StepKind::Publish => 4,
        StepKind::Demo => match mode {
            Mode::Hackathon | Mode::Startup => 3,
            Mode::Placement => 2,
            Mode::OpenSource => 1,
        },
        StepKind::Pitch => match mode {
            Mode::Hackathon => 4,
            Mode::Startup => 3,
            Mode::Placement | Mode::OpenSource => 2,
        },
    }
}

/// Whether a step failure aborts the workflow under the given mode.
pub fn is_critical(mode: Mode, kind: StepKind) -> bool {
    priority(mode, kind) >= CRITICAL_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::SEQUENCE;

    #[test]
    fn analyze_docs_publish_critical_in_every_mode() {
        for mode in ALL_MODES {
            assert!(is_critical(mode, StepKind::Analyze), "analyze in {mode}");
            assert!(is_critical(mode, StepKind::Docs), "docs in {mode}");
            assert!(is_critical(mode, StepKind::Publish), "publish in {mode}");
        }
    }

    #[test]
    fn placement_treats_demo_and_pitch_as_optional() {
        assert!(!is_critical(Mode::Placement, StepKind::Demo));
        assert!(!is_critical(Mode::Placement, StepKind::Pitch));
    }

    #[test]
    fn hackathon_treats_demo_and_pitch_as_critical() {
        assert!(is_critical(Mode::Hackathon, StepKind::Demo));
        assert!(is_critical(Mode::Hackathon, StepKind::Pitch));
    }

    #[test]
    fn priorities_stay_within_tier_range() {
        for mode in ALL_MODES {
            for kind in SEQUENCE {
                let p = priority(mode, kind);
                assert!((1..=4).contains(&p), "{mode}/{kind} -> {p}");
            }
        }
    }

    #[test]
    fn mode_parses_aliases() {
        assert_eq!("open-source".parse::<Mode>().unwrap(), Mode::OpenSource);
        assert_eq!("hackathon".parse::<Mode>().unwrap(), Mode::Hackathon);
        assert!("demo-day".parse::<Mode>().is_err());
    }

    #[test]
    fn mode_serializes_snake_case() {
        let json = serde_json::to_string(&Mode::OpenSource).unwrap();
        assert_eq!(json, "\"open_source\"");
    }
}
