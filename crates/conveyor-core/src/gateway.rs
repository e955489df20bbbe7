//! Policy-enforced boundary for external capability invocation.
//!
//! Capabilities are declared in a registry the orchestrator queries but does
//! not own. The gateway — not the caller — enforces the write/execute
//! approval policy: a denial is a recorded policy outcome, not an error.

use crate::config::validate_identifier;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    ReadOnly,
    Write,
    Execute,
}

impl Classification {
    pub fn is_read_only(self) -> bool {
        self == Classification::ReadOnly
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Classification::ReadOnly => "read_only",
            Classification::Write => "write",
            Classification::Execute => "execute",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Capability / CapabilityRegistry
// ---------------------------------------------------------------------------

/// One declared external capability: fixed classification plus the JSON
/// schema of its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub id: String,
    pub classification: Classification,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    capabilities: BTreeMap<String, Capability>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The default capability set: file access, search, execution, tests,
    /// and version control.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        let path_schema = json!({
            "type": "object",
            "properties": { "path": { "type": "string" } },
            "required": ["path"]
        });
        let caps = [
            (
                "file_read",
                Classification::ReadOnly,
                "Read a file from the workspace",
                path_schema.clone(),
            ),
            (
                "search",
                Classification::ReadOnly,
                "Search the workspace for a pattern",
                json!({
                    "type": "object",
                    "properties": { "query": { "type": "string" } },
                    "required": ["query"]
                }),
            ),
            (
                "file_write",
                Classification::Write,
                "Write a file into the workspace",
                json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string" },
                        "content": { "type": "string" }
                    },
                    "required": ["path", "content"]
                }),
            ),
            (
                "vcs_commit",
                Classification::Write,
                "Record workspace changes in version control",
                json!({
                    "type": "object",
                    "properties": { "message": { "type": "string" } },
                    "required": ["message"]
                }),
            ),
            (
                "run_code",
                Classification::Execute,
                "Execute a program in the workspace",
                path_schema,
            ),
            (
                "run_tests",
                Classification::Execute,
                "Run the workspace test suite",
                json!({ "type": "object", "properties": {} }),
            ),
        ];
        for (id, classification, description, input_schema) in caps {
            registry
                .register(Capability {
                    id: id.to_string(),
                    classification,
                    description: description.to_string(),
                    input_schema,
                })
                .expect("builtin capability ids are valid");
        }
        registry
    }

    pub fn register(&mut self, capability: Capability) -> Result<()> {
        validate_identifier(&capability.id)?;
        self.capabilities.insert(capability.id.clone(), capability);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Capability> {
        self.capabilities.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.capabilities.contains_key(id)
    }

    pub fn all(&self) -> impl Iterator<Item = &Capability> {
        self.capabilities.values()
    }
}

// ---------------------------------------------------------------------------
// ToolInvocation
// ---------------------------------------------------------------------------

/// Record of one call through the gateway, kept on the run for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub capability: String,
    pub arguments: Value,
    pub classification: Classification,
    pub requires_approval: bool,
    pub outcome: InvocationOutcome,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InvocationOutcome {
    Result { value: Value },
    Denied { reason: String },
}

impl InvocationOutcome {
    pub fn is_denied(&self) -> bool {
        matches!(self, InvocationOutcome::Denied { .. })
    }
}

// ---------------------------------------------------------------------------
// GatewayViolation
// ---------------------------------------------------------------------------

/// A worker stepping outside its contract. This is a programming error in
/// the worker, surfaced to the orchestrator as a fatal failure — never
/// silently ignored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayViolation {
    #[error("unknown capability '{0}'")]
    UnknownCapability(String),

    #[error("capability '{0}' is not bound to this stage")]
    UnboundCapability(String),
}

// ---------------------------------------------------------------------------
// CapabilityExecutor
// ---------------------------------------------------------------------------

/// Performs an approved invocation. The real executor is an external
/// collaborator; tools report their own failures inside the returned value.
pub trait CapabilityExecutor: Send + Sync {
    fn execute(&self, capability: &Capability, arguments: &Value) -> Value;
}

/// Built-in executor that reflects the invocation back. Used for smoke runs
/// and tests, where the policy decision is the interesting part.
pub struct EchoExecutor;

impl CapabilityExecutor for EchoExecutor {
    fn execute(&self, capability: &Capability, arguments: &Value) -> Value {
        json!({ "capability": capability.id, "arguments": arguments })
    }
}

// ---------------------------------------------------------------------------
// ToolGateway
// ---------------------------------------------------------------------------

pub struct ToolGateway {
    registry: CapabilityRegistry,
    executor: Box<dyn CapabilityExecutor>,
}

impl ToolGateway {
    pub fn new(registry: CapabilityRegistry, executor: Box<dyn CapabilityExecutor>) -> Self {
        Self { registry, executor }
    }

    pub fn builtin() -> Self {
        Self::new(CapabilityRegistry::builtin(), Box::new(EchoExecutor))
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Bind the gateway to one stage attempt: the stage's permitted
    /// capability subset plus the run's standing and cycle approvals.
    pub fn bind<'a>(
        &'a self,
        bound: impl IntoIterator<Item = String>,
        pre_authorized: BTreeSet<String>,
        cycle_approved: BTreeSet<String>,
    ) -> BoundGateway<'a> {
        BoundGateway {
            gateway: self,
            bound: bound.into_iter().collect(),
            pre_authorized,
            cycle_approved,
            log: RefCell::new(Vec::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// BoundGateway
// ---------------------------------------------------------------------------

/// The gateway view handed to a stage worker for the duration of one
/// attempt. Records every invocation; the orchestrator drains the log into
/// the run afterwards (or discards it on cancellation).
pub struct BoundGateway<'a> {
    gateway: &'a ToolGateway,
    bound: BTreeSet<String>,
    pre_authorized: BTreeSet<String>,
    cycle_approved: BTreeSet<String>,
    log: RefCell<Vec<ToolInvocation>>,
}

impl BoundGateway<'_> {
    pub fn bound_capabilities(&self) -> impl Iterator<Item = &str> {
        self.bound.iter().map(String::as_str)
    }

    /// Invoke a capability on behalf of the worker.
    ///
    /// Read-only capabilities always proceed. Write/execute capabilities are
    /// denied unless pre-authorized for the run or approved for the active
    /// checkpoint cycle. Invoking an unknown or unbound capability is a
    /// [`GatewayViolation`], not a denial.
    pub fn invoke(
        &self,
        capability_id: &str,
        arguments: Value,
    ) -> std::result::Result<InvocationOutcome, GatewayViolation> {
        let capability = self
            .gateway
            .registry
            .get(capability_id)
            .ok_or_else(|| GatewayViolation::UnknownCapability(capability_id.to_string()))?;
        if !self.bound.contains(capability_id) {
            return Err(GatewayViolation::UnboundCapability(capability_id.to_string()));
        }

        let requires_approval = !capability.classification.is_read_only()
            && !self.pre_authorized.contains(capability_id);
        let permitted = !requires_approval || self.cycle_approved.contains(capability_id);

        let outcome = if permitted {
            InvocationOutcome::Result {
                value: self.gateway.executor.execute(capability, &arguments),
            }
        } else {
            InvocationOutcome::Denied {
                reason: format!(
                    "capability '{capability_id}' is classified {} and has no approval in the active checkpoint cycle",
                    capability.classification
                ),
            }
        };

        self.log.borrow_mut().push(ToolInvocation {
            capability: capability_id.to_string(),
            arguments,
            classification: capability.classification,
            requires_approval,
            outcome: outcome.clone(),
            timestamp: Utc::now(),
        });
        Ok(outcome)
    }

    pub fn take_log(&self) -> Vec<ToolInvocation> {
        self.log.take()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
