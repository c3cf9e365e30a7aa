//! Structural snapshots of scheduler state.
//!
//! Pure serde views of plans, managed tasks, and metacognitive state,
//! sufficient to reconstruct each one. No storage format is mandated;
//! callers encode these however they persist things. Restoring rebuilds
//! derived state (the plan's id index, the manager's next id) and never
//! fails: odd data degrades the same way it does live (an unknown
//! dependency id simply stays unsatisfied).

use crate::core::node::{DagNode, DEFAULT_MAX_RETRIES};
use crate::core::plan::{DagPlan, DuplicatePolicy, PlanConfig};
use crate::engine::SessionId;
use crate::metacog::MetacognitiveState;
use crate::tasks::{ManagedTask, TaskId, TaskManager, TaskManagerConfig, TaskPriority, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

/// Structural view of a [`DagPlan`].
///
/// Nodes appear in insertion order, which is itself part of the plan's
/// contract (it is the scheduling tie-break).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSnapshot {
    pub goal: String,
    pub revision_count: u32,
    pub nodes: Vec<DagNode>,
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,
}

impl DagPlan {
    /// Take a structural snapshot of the plan.
    pub fn snapshot(&self) -> PlanSnapshot {
        PlanSnapshot {
            goal: self.goal.clone(),
            revision_count: self.revision_count,
            nodes: self.nodes.clone(),
            duplicate_policy: self.config.duplicate_policy,
            default_max_retries: self.config.default_max_retries,
        }
    }

    /// Reconstruct a plan from a snapshot, rebuilding the id index.
    ///
    /// If the snapshot somehow carries duplicate ids, the first
    /// occurrence wins and later ones are dropped.
    pub fn from_snapshot(snapshot: PlanSnapshot) -> Self {
        let mut nodes: Vec<DagNode> = Vec::with_capacity(snapshot.nodes.len());
        let mut index = HashMap::new();
        for node in snapshot.nodes {
            if index.contains_key(&node.id) {
                debug!(node = %node.id, "duplicate id in plan snapshot, dropping");
                continue;
            }
            index.insert(node.id.clone(), nodes.len());
            nodes.push(node);
        }

        Self {
            goal: snapshot.goal,
            nodes,
            index,
            revision_count: snapshot.revision_count,
            config: PlanConfig {
                duplicate_policy: snapshot.duplicate_policy,
                default_max_retries: snapshot.default_max_retries,
            },
        }
    }
}

/// Structural view of a [`ManagedTask`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub description: String,
    pub priority: TaskPriority,
    pub deadline: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub session: Option<SessionId>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub tags: Vec<String>,
    pub plan: Option<PlanSnapshot>,
}

impl TaskSnapshot {
    fn capture(task: &ManagedTask) -> Self {
        Self {
            id: task.id,
            description: task.description.clone(),
            priority: task.priority,
            deadline: task.deadline,
            status: task.status,
            session: task.session,
            created_at: task.created_at,
            completed_at: task.completed_at,
            result: task.result.clone(),
            error: task.error.clone(),
            tags: task.tags.clone(),
            plan: task.plan.as_ref().map(DagPlan::snapshot),
        }
    }

    fn restore(self) -> ManagedTask {
        ManagedTask {
            id: self.id,
            description: self.description,
            priority: self.priority,
            deadline: self.deadline,
            status: self.status,
            plan: self.plan.map(DagPlan::from_snapshot),
            session: self.session,
            created_at: self.created_at,
            completed_at: self.completed_at,
            result: self.result,
            error: self.error,
            tags: self.tags,
        }
    }
}

/// Structural view of a [`TaskManager`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerSnapshot {
    pub next_id: u64,
    pub max_active: usize,
    pub tasks: Vec<TaskSnapshot>,
}

impl TaskManager {
    /// Take a structural snapshot of every tracked task.
    pub fn snapshot(&self) -> ManagerSnapshot {
        ManagerSnapshot {
            next_id: self.next_id,
            max_active: self.config.max_active,
            tasks: self.tasks.iter().map(TaskSnapshot::capture).collect(),
        }
    }

    /// Reconstruct a manager from a snapshot.
    ///
    /// The id counter resumes past every restored task, so ids keep
    /// incrementing even if the stored counter lagged.
    pub fn from_snapshot(snapshot: ManagerSnapshot) -> Self {
        let max_seen = snapshot.tasks.iter().map(|task| task.id.0).max().unwrap_or(0);
        Self {
            tasks: snapshot.tasks.into_iter().map(TaskSnapshot::restore).collect(),
            next_id: snapshot.next_id.max(max_seen + 1),
            config: TaskManagerConfig {
                max_active: snapshot.max_active,
            },
        }
    }
}

/// Structural view of a [`MetacognitiveState`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetacogSnapshot {
    pub iterations_used: u32,
    pub thinking_time_seconds: f64,
    pub quality_scores: Vec<f64>,
    pub confidence_history: Vec<f64>,
    pub repeated_actions: Vec<String>,
}

impl MetacognitiveState {
    /// Take a structural snapshot of the accumulators.
    pub fn snapshot(&self) -> MetacogSnapshot {
        MetacogSnapshot {
            iterations_used: self.iterations_used,
            thinking_time_seconds: self.thinking_time_seconds,
            quality_scores: self.quality_scores.clone(),
            confidence_history: self.confidence_history.clone(),
            repeated_actions: self.repeated_actions.iter().cloned().collect(),
        }
    }

    /// Reconstruct the accumulators from a snapshot.
    pub fn from_snapshot(snapshot: MetacogSnapshot) -> Self {
        Self {
            iterations_used: snapshot.iterations_used,
            thinking_time_seconds: snapshot.thinking_time_seconds,
            quality_scores: snapshot.quality_scores,
            confidence_history: snapshot.confidence_history,
            repeated_actions: snapshot.repeated_actions.into(),
        }
    }
}
