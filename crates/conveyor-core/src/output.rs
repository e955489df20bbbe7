use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Severity / Issue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Minor,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Minor => "minor",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// A problem the worker flagged in its own (or an upstream) result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub message: String,
}

impl Issue {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Artifact
// ---------------------------------------------------------------------------

/// A named deliverable declared by a stage (a spec section, a source file,
/// a test plan). Content is optional: large artifacts may live outside the
/// run record and be referenced by name only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Artifact {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// The worker's own explicit judgement of its result. Only an explicit
/// `Pass` satisfies the strictest rigidity band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
}

// ---------------------------------------------------------------------------
// StageOutput
// ---------------------------------------------------------------------------

/// The structured result schema every stage worker must produce.
///
/// Worker stdout that does not deserialize into this shape is a
/// malformed-output failure regardless of rigidity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutput {
    pub summary: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<Issue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
}

impl StageOutput {
    pub fn has_critical_issue(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Critical)
    }

    pub fn explicit_pass(&self) -> bool {
        self.verdict == Some(Verdict::Pass)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_output_parses() {
        let json = r#"{"summary": "drafted requirements"}"#;
        let out: StageOutput = serde_json::from_str(json).unwrap();
        assert_eq!(out.summary, "drafted requirements");
        assert!(out.artifacts.is_empty());
        assert!(out.issues.is_empty());
        assert!(out.verdict.is_none());
        assert!(!out.explicit_pass());
    }

    #[test]
    fn missing_summary_is_rejected() {
        let json = r#"{"artifacts": [{"name": "spec.md"}]}"#;
        assert!(serde_json::from_str::<StageOutput>(json).is_err());
    }

    #[test]
    fn critical_issue_detection() {
        let out = StageOutput {
            summary: "review".into(),
            artifacts: vec![],
            issues: vec![
                Issue::new(Severity::Minor, "naming"),
                Issue::new(Severity::Critical, "unchecked index"),
            ],
            verdict: None,
        };
        assert!(out.has_critical_issue());
    }

    #[test]
    fn verdict_roundtrip() {
        let out = StageOutput {
            summary: "ok".into(),
            artifacts: vec![Artifact::named("main.rs")],
            issues: vec![],
            verdict: Some(Verdict::Pass),
        };
        let json = serde_json::to_string(&out).unwrap();
        assert!(json.contains("\"verdict\":\"pass\""));
        let parsed: StageOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, out);
        assert!(parsed.explicit_pass());
    }

    #[test]
    fn empty_collections_not_serialized() {
        let out = StageOutput {
            summary: "ok".into(),
            artifacts: vec![],
            issues: vec![],
            verdict: None,
        };
        let json = serde_json::to_string(&out).unwrap();
        assert!(!json.contains("artifacts"));
        assert!(!json.contains("issues"));
        assert!(!json.contains("verdict"));
    }
}
