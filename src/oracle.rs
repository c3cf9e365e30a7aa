//! Boundary types for the external planner and tool dispatcher.
//!
//! The scheduler never talks to a language model or executes a tool
//! itself. The orchestrator implements [`PlannerOracle`] (typically a
//! prompt-formatting wrapper around an LLM client) and [`ToolInvoker`]
//! (the actual tool runtime), and feeds the results back into the plan
//! through [`crate::core::plan::DagPlan`]. Keeping these behind traits
//! keeps the scheduler synchronous and unit-testable.

use crate::core::node::ToolBinding;
use crate::core::plan::NodeSpec;
use crate::error::Result;
use crate::snapshot::PlanSnapshot;
use serde::{Deserialize, Serialize};

/// One entry of the tool catalog shown to the planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Tool name the planner may bind nodes to.
    pub name: String,
    /// What the tool does, for the planner's benefit.
    pub description: String,
}

impl ToolSpec {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
        }
    }
}

/// A plan step proposed by the planner.
///
/// This is the JSON shape an LLM planner emits: a node id, description,
/// dependency ids, priority, and an optional tool name with parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedNode {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub tool_params: Option<serde_json::Value>,
}

impl ProposedNode {
    /// Convert the proposal into a spec the plan can insert.
    pub fn into_spec(self) -> NodeSpec {
        let mut spec = NodeSpec::new(&self.id, &self.description)
            .depends_on(self.depends_on)
            .priority(self.priority);
        if let Some(name) = self.tool {
            let params = self.tool_params.unwrap_or(serde_json::Value::Null);
            spec = spec.tool(ToolBinding::with_params(&name, params));
        }
        spec
    }
}

/// A graph edit proposed by the planner after a terminal failure.
///
/// Applied via [`crate::core::plan::DagPlan::apply_correction`], which
/// removes the listed nodes, inserts the new ones, and bumps the plan's
/// revision count.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanCorrection {
    /// Ids of nodes to remove from the plan.
    #[serde(default, alias = "remove_nodes")]
    pub remove_ids: Vec<String>,
    /// Replacement or recovery nodes to insert.
    #[serde(default)]
    pub new_nodes: Vec<ProposedNode>,
}

impl PlanCorrection {
    /// Check if the correction changes anything.
    pub fn is_empty(&self) -> bool {
        self.remove_ids.is_empty() && self.new_nodes.is_empty()
    }
}

/// External planner that invents and repairs plan content.
///
/// Implementations are expected to be LLM-backed; the scheduler only
/// sees the parsed results. Both methods are synchronous: async clients
/// bridge at this boundary, not inside the scheduler.
pub trait PlannerOracle {
    /// Propose the nodes of a fresh plan for a goal.
    fn propose(&self, goal: &str, tool_catalog: &[ToolSpec]) -> Result<Vec<ProposedNode>>;

    /// Propose a graph edit after a node failed terminally.
    fn correct(
        &self,
        goal: &str,
        failed_node_id: &str,
        error: &str,
        plan: &PlanSnapshot,
    ) -> Result<PlanCorrection>;
}

/// Result of one tool invocation, reported back by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    pub output: Option<String>,
    pub error: Option<String>,
}

impl ToolOutcome {
    /// A successful invocation with the given output.
    pub fn ok(output: &str) -> Self {
        Self {
            success: true,
            output: Some(output.to_string()),
            error: None,
        }
    }

    /// A failed invocation with the given error.
    pub fn failed(error: &str) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.to_string()),
        }
    }
}

/// External tool runtime.
///
/// The orchestrator invokes tools for dispatched nodes and reports the
/// outcome into the plan via `complete_node`/`fail_node`; the scheduler
/// never calls this trait itself. Retry pacing (backoff, jitter,
/// timeouts) also lives behind this boundary.
pub trait ToolInvoker {
    fn invoke(&self, binding: &ToolBinding) -> ToolOutcome;
}
