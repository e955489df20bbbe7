use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// One ordered step of the pipeline backbone.
///
/// The backbone is linear; the single backedge is expressed by
/// [`Stage::retry_target`], which sends a rejected code review back to code
/// generation for rework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Requirements,
    Architecture,
    CodeGeneration,
    CodeReview,
    Testing,
    Documentation,
}

impl Stage {
    pub fn all() -> &'static [Stage] {
        &[
            Stage::Requirements,
            Stage::Architecture,
            Stage::CodeGeneration,
            Stage::CodeReview,
            Stage::Testing,
            Stage::Documentation,
        ]
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn next(self) -> Option<Stage> {
        let all = Stage::all();
        all.get(self.index() + 1).copied()
    }

    /// Where a gate `retry` sends the run. Code review loops back to code
    /// generation; every other stage re-invokes itself.
    pub fn retry_target(self) -> Stage {
        match self {
            Stage::CodeReview => Stage::CodeGeneration,
            other => other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Requirements => "requirements",
            Stage::Architecture => "architecture",
            Stage::CodeGeneration => "code_generation",
            Stage::CodeReview => "code_review",
            Stage::Testing => "testing",
            Stage::Documentation => "documentation",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = crate::error::ConveyorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requirements" => Ok(Stage::Requirements),
            "architecture" => Ok(Stage::Architecture),
            "code_generation" => Ok(Stage::CodeGeneration),
            "code_review" => Ok(Stage::CodeReview),
            "testing" => Ok(Stage::Testing),
            "documentation" => Ok(Stage::Documentation),
            _ => Err(crate::error::ConveyorError::InvalidStage(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// StagePointer
// ---------------------------------------------------------------------------

/// Where a run currently sits: a pipeline stage or a terminal marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "stage", rename_all = "snake_case")]
pub enum StagePointer {
    Stage(Stage),
    Complete,
    Aborted,
}

impl StagePointer {
    pub fn is_terminal(self) -> bool {
        matches!(self, StagePointer::Complete | StagePointer::Aborted)
    }

    pub fn stage(self) -> Option<Stage> {
        match self {
            StagePointer::Stage(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for StagePointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StagePointer::Stage(s) => f.write_str(s.as_str()),
            StagePointer::Complete => f.write_str("complete"),
            StagePointer::Aborted => f.write_str("aborted"),
        }
    }
}

// ---------------------------------------------------------------------------
// GateDecision
// ---------------------------------------------------------------------------

/// Outcome recorded on a stage attempt after the quality gate ran (or was
/// bypassed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    Advance,
    Retry,
    Escalate,
    #[serde(rename = "none")]
    NotEvaluated,
}

impl fmt::Display for GateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GateDecision::Advance => "advance",
            GateDecision::Retry => "retry",
            GateDecision::Escalate => "escalate",
            GateDecision::NotEvaluated => "none",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
