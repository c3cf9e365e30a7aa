//! Dependency-graph plan for multi-step goals.
//!
//! This module provides the DagPlan structure that owns the nodes of a
//! plan, answers readiness queries, and drives the node lifecycle:
//! dispatch, completion, bounded retries, and the skip cascade that
//! follows a terminal failure.
//!
//! Nodes live in an arena (a vector in insertion order plus an
//! id-to-slot map). Dependencies are stored as ids and resolved through
//! [`DagPlan::resolve_dependency`], so a dependency on an id that was
//! never added is representable and counts as unsatisfied.

use crate::core::node::{DagNode, NodeStatus, ToolBinding, DEFAULT_MAX_RETRIES};
use crate::error::{Error, Result};
use crate::oracle::PlanCorrection;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Resolution state of a single dependency edge.
///
/// The distinction between Unknown and Outstanding matters: an id that
/// was never added to the plan is conservatively unsatisfied, while an
/// id removed via [`DagPlan::remove_node`] is stripped from dependency
/// lists and therefore no longer blocks anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepState {
    /// The id does not name any node in the plan.
    Unknown,
    /// The node exists but has not completed.
    Outstanding,
    /// The node completed successfully.
    Satisfied,
}

impl DepState {
    /// Check whether this edge allows the dependent to run.
    pub fn is_satisfied(&self) -> bool {
        matches!(self, DepState::Satisfied)
    }
}

/// What `add_node` does when the id is already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Replace the existing node in place, discarding its progress.
    #[default]
    Overwrite,
    /// Refuse the insert with [`Error::DuplicateNode`].
    Reject,
}

/// Configuration for plan construction.
#[derive(Debug, Clone)]
pub struct PlanConfig {
    /// Behavior on duplicate node ids.
    pub duplicate_policy: DuplicatePolicy,
    /// Retry budget applied to nodes that do not specify one.
    pub default_max_retries: u32,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            duplicate_policy: DuplicatePolicy::Overwrite,
            default_max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Description of a node to insert into a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Unique id within the plan.
    pub id: String,
    /// Human-readable description of the step.
    pub description: String,
    /// Ids this node depends on; they need not exist yet.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Dispatch priority; higher runs first.
    #[serde(default)]
    pub priority: i32,
    /// Optional tool binding for the dispatcher.
    #[serde(default)]
    pub tool: Option<ToolBinding>,
    /// Retry budget; falls back to the plan's default when absent.
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Informational timeout; falls back to the node default when absent.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

impl NodeSpec {
    /// Create a spec with no dependencies and default budgets.
    pub fn new(id: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            depends_on: Vec::new(),
            priority: 0,
            tool: None,
            max_retries: None,
            timeout_seconds: None,
        }
    }

    /// Set the dependency ids.
    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Set the dispatch priority.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Attach a tool binding.
    pub fn tool(mut self, tool: ToolBinding) -> Self {
        self.tool = Some(tool);
        self
    }

    /// Set the retry budget.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Set the informational timeout.
    pub fn timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }
}

/// A plan: a dependency graph of steps working toward one goal.
///
/// The plan is plain mutable state with no internal locking. One
/// logical owner must drive all state transitions; see
/// [`crate::engine::SharedEngine`] for the shared-ownership wrapper.
pub struct DagPlan {
    /// The goal this plan works toward.
    pub(crate) goal: String,
    /// Node arena in insertion order.
    pub(crate) nodes: Vec<DagNode>,
    /// Index from node id to arena slot.
    pub(crate) index: HashMap<String, usize>,
    /// Number of external corrections applied to this plan.
    pub(crate) revision_count: u32,
    /// Construction-time configuration.
    pub(crate) config: PlanConfig,
}

impl DagPlan {
    /// Create an empty plan for the given goal.
    pub fn new(goal: &str) -> Self {
        Self::with_config(goal, PlanConfig::default())
    }

    /// Create an empty plan with explicit configuration.
    pub fn with_config(goal: &str, config: PlanConfig) -> Self {
        Self {
            goal: goal.to_string(),
            nodes: Vec::new(),
            index: HashMap::new(),
            revision_count: 0,
            config,
        }
    }

    /// The goal this plan works toward.
    pub fn goal(&self) -> &str {
        &self.goal
    }

    /// Number of external corrections applied so far.
    pub fn revision_count(&self) -> u32 {
        self.revision_count
    }

    /// Number of nodes in the plan.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the plan has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Check if the plan contains a node with the given id.
    pub fn contains_node(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Get a reference to a node by id.
    pub fn get_node(&self, id: &str) -> Option<&DagNode> {
        self.index.get(id).map(|&slot| &self.nodes[slot])
    }

    /// Get a mutable reference to a node by id.
    pub fn get_node_mut(&mut self, id: &str) -> Option<&mut DagNode> {
        match self.index.get(id) {
            Some(&slot) => Some(&mut self.nodes[slot]),
            None => None,
        }
    }

    /// Iterate over all nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &DagNode> {
        self.nodes.iter()
    }

    /// Insert a node into the plan.
    ///
    /// Under [`DuplicatePolicy::Overwrite`] an existing node with the
    /// same id is replaced in place (keeping its insertion slot), and
    /// any progress it had made is discarded. Under
    /// [`DuplicatePolicy::Reject`] the insert fails instead.
    pub fn add_node(&mut self, spec: NodeSpec) -> Result<()> {
        if let Some(&slot) = self.index.get(&spec.id) {
            match self.config.duplicate_policy {
                DuplicatePolicy::Reject => return Err(Error::DuplicateNode(spec.id)),
                DuplicatePolicy::Overwrite => {
                    debug!(node = %spec.id, "overwriting existing node, discarding progress");
                    self.nodes[slot] = self.build_node(spec);
                    return Ok(());
                }
            }
        }

        let node = self.build_node(spec);
        self.index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    fn build_node(&self, spec: NodeSpec) -> DagNode {
        let mut node = DagNode::new(&spec.id, &spec.description);
        node.depends_on = spec.depends_on;
        node.priority = spec.priority;
        node.tool = spec.tool;
        node.max_retries = spec.max_retries.unwrap_or(self.config.default_max_retries);
        if let Some(seconds) = spec.timeout_seconds {
            node.timeout_seconds = seconds;
        }
        node
    }

    /// Remove a node and strip its id from every dependency list.
    ///
    /// After removal the edge no longer exists, so dependents that
    /// listed it are unblocked. This is deliberately the opposite of a
    /// dependency that was never added, which keeps blocking forever.
    ///
    /// Returns false if no node with that id exists.
    pub fn remove_node(&mut self, id: &str) -> bool {
        let Some(slot) = self.index.remove(id) else {
            return false;
        };
        self.nodes.remove(slot);
        for (i, node) in self.nodes.iter().enumerate().skip(slot) {
            self.index.insert(node.id.clone(), i);
        }
        for node in &mut self.nodes {
            node.depends_on.retain(|dep| dep != id);
        }
        true
    }

    /// Resolve one dependency edge to its tri-state.
    pub fn resolve_dependency(&self, id: &str) -> DepState {
        match self.index.get(id) {
            None => DepState::Unknown,
            Some(&slot) => {
                if self.nodes[slot].status == NodeStatus::Completed {
                    DepState::Satisfied
                } else {
                    DepState::Outstanding
                }
            }
        }
    }

    /// Get all nodes that are ready to dispatch.
    ///
    /// A node is ready when it is Pending and every dependency resolves
    /// to [`DepState::Satisfied`]. The result is sorted by priority
    /// descending, ties broken by insertion order.
    ///
    /// This query is pure: it mutates nothing and is safe to repeat.
    /// Dispatching is a separate, explicit step via [`Self::mark_running`].
    pub fn get_ready_nodes(&self) -> Vec<&DagNode> {
        let mut ready: Vec<&DagNode> = self
            .nodes
            .iter()
            .filter(|node| node.status == NodeStatus::Pending)
            .filter(|node| {
                node.depends_on
                    .iter()
                    .all(|dep| self.resolve_dependency(dep).is_satisfied())
            })
            .collect();
        ready.sort_by_key(|node| Reverse(node.priority));
        ready
    }

    /// Mark a node as dispatched: status Running, start time recorded.
    ///
    /// Returns false if no node with that id exists.
    pub fn mark_running(&mut self, id: &str) -> bool {
        match self.get_node_mut(id) {
            Some(node) => {
                node.start();
                true
            }
            None => {
                debug!(node = id, "mark_running on unknown node");
                false
            }
        }
    }

    /// Record a successful result: status Completed, completion time set.
    ///
    /// Returns false if no node with that id exists.
    pub fn complete_node(&mut self, id: &str, result: &str) -> bool {
        match self.get_node_mut(id) {
            Some(node) => {
                node.complete(result);
                true
            }
            None => {
                debug!(node = id, "complete_node on unknown node");
                false
            }
        }
    }

    /// Record a failure, spending one retry.
    ///
    /// With retries remaining the node is reset to Pending and re-enters
    /// the ready pool; returns true. Once the budget is exhausted the
    /// node becomes Failed and every transitively dependent Pending node
    /// is skipped; returns false. Retry pacing (backoff, jitter) is the
    /// dispatcher's job, not ours.
    pub fn fail_node(&mut self, id: &str, error: &str) -> bool {
        let Some(&slot) = self.index.get(id) else {
            debug!(node = id, "fail_node on unknown node");
            return false;
        };

        self.nodes[slot].retry_count += 1;
        if self.nodes[slot].can_retry() {
            let node = &mut self.nodes[slot];
            node.requeue(error);
            debug!(
                node = id,
                retry = node.retry_count,
                max = node.max_retries,
                error,
                "node failed, re-queued for retry"
            );
            true
        } else {
            self.nodes[slot].fail(error);
            warn!(node = id, error, "node failed terminally, skipping dependents");
            let mut visited = HashSet::new();
            self.skip_dependents(id, &mut visited);
            false
        }
    }

    /// Cascade Skipped status onto Pending dependents of a failed node.
    ///
    /// The visited set keeps the recursion terminating even if the graph
    /// contains a cycle.
    fn skip_dependents(&mut self, failed_id: &str, visited: &mut HashSet<String>) {
        if !visited.insert(failed_id.to_string()) {
            return;
        }

        let dependents: Vec<String> = self
            .nodes
            .iter()
            .filter(|node| {
                node.status == NodeStatus::Pending
                    && node.depends_on.iter().any(|dep| dep == failed_id)
            })
            .map(|node| node.id.clone())
            .collect();

        for dep_id in dependents {
            if let Some(node) = self.get_node_mut(&dep_id) {
                if node.status == NodeStatus::Pending {
                    node.skip(&format!("dependency '{}' failed", failed_id));
                }
            }
            self.skip_dependents(&dep_id, visited);
        }
    }

    /// Check whether the dependency graph contains a cycle.
    ///
    /// Depth-first search with an explicit recursion-path set, so only
    /// back-edges count; revisiting a node through a second diamond path
    /// does not.
    pub fn has_cycle(&self) -> bool {
        self.find_cycle().is_some()
    }

    fn find_cycle(&self) -> Option<String> {
        let mut visited = HashSet::new();
        let mut path = HashSet::new();
        for node in &self.nodes {
            if let Some(id) = self.cycle_dfs(&node.id, &mut visited, &mut path) {
                return Some(id);
            }
        }
        None
    }

    fn cycle_dfs(
        &self,
        id: &str,
        visited: &mut HashSet<String>,
        path: &mut HashSet<String>,
    ) -> Option<String> {
        if path.contains(id) {
            return Some(id.to_string());
        }
        if visited.contains(id) {
            return None;
        }
        visited.insert(id.to_string());
        path.insert(id.to_string());

        if let Some(&slot) = self.index.get(id) {
            for dep in &self.nodes[slot].depends_on {
                if let Some(found) = self.cycle_dfs(dep, visited, path) {
                    return Some(found);
                }
            }
        }

        path.remove(id);
        None
    }

    /// Get node ids in dependency order (Kahn's algorithm).
    ///
    /// Only edges whose dependency id names a known node count toward
    /// in-degree. Among the zero-in-degree candidates the highest
    /// priority is always picked next, re-sorting as new candidates
    /// unlock, so the order is deterministic. Nodes inside a cycle never
    /// reach zero in-degree and are silently omitted; the result is a
    /// partial order, not an error.
    pub fn topological_sort(&self) -> Vec<String> {
        let mut in_degree: Vec<usize> = self
            .nodes
            .iter()
            .map(|node| {
                let known: HashSet<&str> = node
                    .depends_on
                    .iter()
                    .filter(|dep| self.index.contains_key(*dep))
                    .map(String::as_str)
                    .collect();
                known.len()
            })
            .collect();

        let mut queue: Vec<usize> = (0..self.nodes.len())
            .filter(|&slot| in_degree[slot] == 0)
            .collect();
        queue.sort_by_key(|&slot| Reverse(self.nodes[slot].priority));

        let mut result = Vec::with_capacity(self.nodes.len());
        while !queue.is_empty() {
            let slot = queue.remove(0);
            let id = self.nodes[slot].id.clone();
            result.push(id.clone());

            let mut unlocked = false;
            for (other, node) in self.nodes.iter().enumerate() {
                if node.depends_on.iter().any(|dep| *dep == id) && in_degree[other] > 0 {
                    in_degree[other] -= 1;
                    if in_degree[other] == 0 {
                        queue.push(other);
                        unlocked = true;
                    }
                }
            }
            if unlocked {
                queue.sort_by_key(|&slot| Reverse(self.nodes[slot].priority));
            }
        }

        result
    }

    /// Decompose the plan into waves of structurally independent nodes.
    ///
    /// Each wave contains ids whose dependencies all sit in earlier
    /// waves, sorted by priority descending. This is a static view for
    /// visualization and width estimation only; live dispatch must use
    /// [`Self::get_ready_nodes`], which respects runtime status. Nodes
    /// that can never join a wave (cycles, unknown dependencies) are
    /// dropped, mirroring the partial-order contract of
    /// [`Self::topological_sort`].
    pub fn get_parallel_groups(&self) -> Vec<Vec<String>> {
        let mut groups = Vec::new();
        let mut placed: HashSet<String> = HashSet::new();
        let mut remaining: Vec<usize> = (0..self.nodes.len()).collect();

        while !remaining.is_empty() {
            let mut wave: Vec<usize> = remaining
                .iter()
                .copied()
                .filter(|&slot| {
                    self.nodes[slot]
                        .depends_on
                        .iter()
                        .all(|dep| placed.contains(dep))
                })
                .collect();

            if wave.is_empty() {
                break;
            }

            wave.sort_by_key(|&slot| Reverse(self.nodes[slot].priority));
            for &slot in &wave {
                placed.insert(self.nodes[slot].id.clone());
            }
            remaining.retain(|slot| !wave.contains(slot));
            groups.push(
                wave.iter()
                    .map(|&slot| self.nodes[slot].id.clone())
                    .collect(),
            );
        }

        groups
    }

    /// Fraction of nodes in a terminal state (0.0 - 1.0).
    ///
    /// Completed, Failed, and Skipped all count as done. An empty plan
    /// is vacuously complete.
    pub fn progress(&self) -> f64 {
        if self.nodes.is_empty() {
            return 1.0;
        }
        let done = self.nodes.iter().filter(|node| node.is_terminal()).count();
        done as f64 / self.nodes.len() as f64
    }

    /// Check if every node is in a terminal state.
    pub fn is_complete(&self) -> bool {
        self.nodes.iter().all(DagNode::is_terminal)
    }

    /// Check if any node failed terminally.
    pub fn has_failures(&self) -> bool {
        self.nodes
            .iter()
            .any(|node| node.status == NodeStatus::Failed)
    }

    /// Strict structural validation.
    ///
    /// Errors on the anomalies the normal entry points tolerate: a
    /// dependency referencing an id that was never added, or a cycle.
    /// Never invoked implicitly; callers opt in.
    pub fn validate(&self) -> Result<()> {
        for node in &self.nodes {
            for dep in &node.depends_on {
                if !self.index.contains_key(dep) {
                    return Err(Error::UnknownDependency {
                        node: node.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }
        if let Some(id) = self.find_cycle() {
            return Err(Error::CycleDetected(id));
        }
        Ok(())
    }

    /// Apply a correction proposed by the external planner.
    ///
    /// Removes the listed nodes, inserts the new ones, and bumps the
    /// revision count. This is the only way the revision count moves.
    pub fn apply_correction(&mut self, correction: PlanCorrection) -> Result<()> {
        self.revision_count += 1;
        for id in &correction.remove_ids {
            self.remove_node(id);
        }
        for proposed in correction.new_nodes {
            self.add_node(proposed.into_spec())?;
        }
        info!(
            revision = self.revision_count,
            nodes = self.nodes.len(),
            "plan revised"
        );
        Ok(())
    }

    /// Human-readable progress rendering of the plan.
    pub fn summary(&self) -> String {
        if self.nodes.is_empty() {
            return format!("goal: {}\n(empty plan)", self.goal);
        }

        let done = self.nodes.iter().filter(|node| node.is_terminal()).count();
        let mut lines = vec![format!("goal: {}", self.goal)];
        let mut header = format!(
            "progress: {:.0}% ({}/{} nodes)",
            self.progress() * 100.0,
            done,
            self.nodes.len()
        );
        if self.revision_count > 0 {
            header.push_str(&format!(", revision {}", self.revision_count));
        }
        lines.push(header);

        for node in &self.nodes {
            let mut line = format!("  [{}] {}: {}", node.status, node.id, node.description);
            if !node.depends_on.is_empty() {
                line.push_str(&format!(" (deps: {})", node.depends_on.join(", ")));
            }
            if let Some(error) = &node.error {
                line.push_str(&format!(" ! {}", error));
            }
            lines.push(line);
        }

        lines.join("\n")
    }
}

impl std::fmt::Debug for DagPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DagPlan")
            .field("goal", &self.goal)
            .field("nodes", &self.nodes.len())
            .field("revision_count", &self.revision_count)
            .finish()
    }
}
