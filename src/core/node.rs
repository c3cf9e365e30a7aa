//! Node data model for the plan DAG.
//!
//! Nodes are the atomic steps of a plan. Each node tracks its status,
//! dependencies, retry budget, timing, and an opaque tool binding that
//! the orchestrator hands to its dispatcher.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default retry budget for a node.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default informational timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 60;

/// Node status in its lifecycle.
///
/// Nodes progress Pending → Running → {Completed | Failed}. A failed
/// node with retries remaining is reset to Pending. Skipped is reached
/// only from Pending, when a dependency fails terminally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Node created, or re-queued after a retryable failure.
    #[default]
    Pending,
    /// Node is currently being executed by the dispatcher.
    Running,
    /// Node completed successfully.
    Completed,
    /// Node failed with its retry budget exhausted.
    Failed,
    /// Node was skipped because a dependency failed terminally.
    Skipped,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Pending => write!(f, "pending"),
            NodeStatus::Running => write!(f, "running"),
            NodeStatus::Completed => write!(f, "completed"),
            NodeStatus::Failed => write!(f, "failed"),
            NodeStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Opaque binding of a node to an external tool.
///
/// The core never interprets the name or the parameters; they are
/// carried through to the orchestrator's tool dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolBinding {
    /// Name of the tool to invoke.
    pub name: String,
    /// Tool parameters, passed through verbatim.
    #[serde(default)]
    pub params: serde_json::Value,
}

impl ToolBinding {
    /// Create a binding with no parameters.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            params: serde_json::Value::Null,
        }
    }

    /// Create a binding with the given parameters.
    pub fn with_params(name: &str, params: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            params,
        }
    }
}

/// A single step in a plan DAG.
///
/// A node may depend on ids that are not (yet) present in the plan;
/// such dependencies count as unsatisfied until a node with that id is
/// added and completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagNode {
    /// Unique id of this node within its plan.
    pub id: String,
    /// Human-readable description of the step.
    pub description: String,
    /// Ids of nodes that must complete before this one can start.
    pub depends_on: Vec<String>,
    /// Dispatch priority; higher runs first among ready nodes.
    pub priority: i32,
    /// Current lifecycle status.
    pub status: NodeStatus,
    /// Result text recorded on completion.
    pub result: Option<String>,
    /// Error text recorded on failure or skip.
    pub error: Option<String>,
    /// Tool binding for the dispatcher, if any.
    pub tool: Option<ToolBinding>,
    /// Number of failures recorded so far.
    pub retry_count: u32,
    /// Retry budget; the node fails terminally once exhausted.
    pub max_retries: u32,
    /// Informational timeout for the dispatcher; not enforced here.
    pub timeout_seconds: u64,
    /// When the node started execution.
    pub started_at: Option<DateTime<Utc>>,
    /// When the node reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
}

impl DagNode {
    /// Create a new pending node with default budgets and no dependencies.
    pub fn new(id: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            depends_on: Vec::new(),
            priority: 0,
            status: NodeStatus::Pending,
            result: None,
            error: None,
            tool: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            started_at: None,
            completed_at: None,
        }
    }

    /// Start the node.
    ///
    /// Transitions status to Running and records the start time.
    pub fn start(&mut self) {
        self.status = NodeStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Mark the node as successfully completed and record its result.
    pub fn complete(&mut self, result: &str) {
        self.status = NodeStatus::Completed;
        self.result = Some(result.to_string());
        self.completed_at = Some(Utc::now());
    }

    /// Mark the node as terminally failed.
    pub fn fail(&mut self, error: &str) {
        self.status = NodeStatus::Failed;
        self.error = Some(error.to_string());
        self.completed_at = Some(Utc::now());
    }

    /// Reset the node to Pending after a retryable failure.
    ///
    /// The error is recorded; timing of the aborted attempt is discarded.
    pub fn requeue(&mut self, error: &str) {
        self.status = NodeStatus::Pending;
        self.error = Some(error.to_string());
        self.started_at = None;
    }

    /// Skip the node because a dependency failed.
    pub fn skip(&mut self, reason: &str) {
        self.status = NodeStatus::Skipped;
        self.error = Some(reason.to_string());
    }

    /// Wall-clock duration of the node's execution.
    ///
    /// Zero unless both start and completion times are set.
    pub fn duration(&self) -> Duration {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => end - start,
            _ => Duration::zero(),
        }
    }

    /// Check if the node is in a terminal state (Completed, Failed, or Skipped).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            NodeStatus::Completed | NodeStatus::Failed | NodeStatus::Skipped
        )
    }

    /// Check if the node has retries remaining.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }
}
