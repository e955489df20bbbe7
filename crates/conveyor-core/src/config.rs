use crate::error::{ConveyorError, Result};
use crate::io;
use crate::types::Stage;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Identifier validation
// ---------------------------------------------------------------------------

/// Worker and capability ids: lowercase alphanumeric segments joined by
/// hyphens or underscores.
pub fn validate_identifier(s: &str) -> Result<()> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9]+([_-][a-z0-9]+)*$").expect("identifier regex is valid")
    });
    if re.is_match(s) {
        Ok(())
    } else {
        Err(ConveyorError::InvalidIdentifier(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// WellFormedRule
// ---------------------------------------------------------------------------

/// What "structurally well-formed" means for a gated stage's output.
///
/// The artifact-presence rule mirrors the behavior of throughput-oriented
/// pipelines (a stage passes once it has produced something); deployments
/// that gate stages with artifact-free outputs can switch to the summary
/// rule instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WellFormedRule {
    #[default]
    ArtifactPresent,
    NonEmptySummary,
}

// ---------------------------------------------------------------------------
// RunConfig
// ---------------------------------------------------------------------------

/// Configuration for one workflow run, fixed at `start` and carried inside
/// the persisted run. Nothing here is ever read from ambient process state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Quality-gate strictness, 0.0 (gating off) through 1.0 (explicit pass
    /// required).
    #[serde(default = "default_rigidity")]
    pub rigidity: f64,

    /// Gate-iteration cap applied to every gated stage unless overridden.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Per-stage overrides of the iteration cap.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stage_max_iterations: BTreeMap<Stage, u32>,

    /// Stages skipped entirely; skipping consumes no iteration.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip_stages: Vec<Stage>,

    /// Worker-registry id resolved once at `start`.
    #[serde(default = "default_worker")]
    pub worker: String,

    /// Executable driven by the `command` worker, if selected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_command: Option<String>,

    /// Reaching one of these stages suspends the run for human approval.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checkpoint_stages: Vec<Stage>,

    /// Stages whose output the quality gate evaluates.
    #[serde(default = "default_gated_stages")]
    pub gated_stages: Vec<Stage>,

    /// How many transient worker failures are absorbed per stage before the
    /// run aborts. Separate from gate iterations.
    #[serde(default = "default_transient_retry_cap")]
    pub transient_retry_cap: u32,

    /// Base backoff between transient retries, doubled per retry.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default)]
    pub well_formed: WellFormedRule,

    /// Stage re-entered when a checkpoint is rejected. Unset means a
    /// rejection aborts the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reentry_on_reject: Option<Stage>,

    /// Capabilities approved for the whole run, ahead of any checkpoint
    /// cycle.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_authorized: Vec<String>,

    /// Capability subset each stage may invoke.
    #[serde(default = "default_capability_bindings")]
    pub capability_bindings: BTreeMap<Stage, Vec<String>>,
}

fn default_rigidity() -> f64 {
    0.5
}

fn default_max_iterations() -> u32 {
    3
}

fn default_worker() -> String {
    "echo".to_string()
}

fn default_gated_stages() -> Vec<Stage> {
    vec![Stage::CodeReview]
}

fn default_transient_retry_cap() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_capability_bindings() -> BTreeMap<Stage, Vec<String>> {
    let mut m = BTreeMap::new();
    m.insert(Stage::Requirements, vec![]);
    m.insert(
        Stage::Architecture,
        vec!["file_read".to_string(), "search".to_string()],
    );
    m.insert(
        Stage::CodeGeneration,
        vec![
            "file_read".to_string(),
            "file_write".to_string(),
            "run_code".to_string(),
        ],
    );
    m.insert(
        Stage::CodeReview,
        vec![
            "file_read".to_string(),
            "search".to_string(),
            "run_tests".to_string(),
        ],
    );
    m.insert(
        Stage::Testing,
        vec![
            "file_read".to_string(),
            "file_write".to_string(),
            "run_tests".to_string(),
        ],
    );
    m.insert(
        Stage::Documentation,
        vec!["file_read".to_string(), "file_write".to_string()],
    );
    m
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            rigidity: default_rigidity(),
            max_iterations: default_max_iterations(),
            stage_max_iterations: BTreeMap::new(),
            skip_stages: Vec::new(),
            worker: default_worker(),
            worker_command: None,
            checkpoint_stages: Vec::new(),
            gated_stages: default_gated_stages(),
            transient_retry_cap: default_transient_retry_cap(),
            retry_backoff_ms: default_retry_backoff_ms(),
            well_formed: WellFormedRule::default(),
            reentry_on_reject: None,
            pre_authorized: Vec::new(),
            capability_bindings: default_capability_bindings(),
        }
    }
}

impl RunConfig {
    pub fn max_iterations_for(&self, stage: Stage) -> u32 {
        self.stage_max_iterations
            .get(&stage)
            .copied()
            .unwrap_or(self.max_iterations)
    }

    pub fn is_gated(&self, stage: Stage) -> bool {
        self.gated_stages.contains(&stage)
    }

    pub fn is_checkpoint(&self, stage: Stage) -> bool {
        self.checkpoint_stages.contains(&stage)
    }

    pub fn is_skipped(&self, stage: Stage) -> bool {
        self.skip_stages.contains(&stage)
    }

    pub fn bindings_for(&self, stage: Stage) -> &[String] {
        self.capability_bindings
            .get(&stage)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Validate the parts of the configuration that need no external
    /// registry. Worker and capability ids are checked against their
    /// registries by the orchestrator at `start`.
    pub fn validate(&self) -> Result<()> {
        if !self.rigidity.is_finite() || !(0.0..=1.0).contains(&self.rigidity) {
            return Err(ConveyorError::Configuration(format!(
                "rigidity {} is outside [0.0, 1.0]",
                self.rigidity
            )));
        }
        if self.max_iterations == 0 {
            return Err(ConveyorError::Configuration(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        for (stage, cap) in &self.stage_max_iterations {
            if *cap == 0 {
                return Err(ConveyorError::Configuration(format!(
                    "max_iterations for {stage} must be at least 1"
                )));
            }
        }
        validate_identifier(&self.worker)
            .map_err(|_| ConveyorError::Configuration(format!("invalid worker id '{}'", self.worker)))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Persistence (run-configuration files are human-edited YAML)
    // -----------------------------------------------------------------------

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: RunConfig = serde_yaml::from_str(&data)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        io::atomic_write(path, data.as_bytes())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
