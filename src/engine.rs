//! Engine owning all scheduling state, keyed by session.
//!
//! The Engine is an explicit, constructed object: the session id is a
//! parameter on every call, never ambient state. It owns the task
//! manager plus one active plan and one metacognitive state per
//! session. Sessions are independent; operations on the same session
//! must be serialized by the caller, which is what [`SharedEngine`]
//! provides for multi-threaded orchestrators.

use crate::core::plan::{DagPlan, PlanConfig};
use crate::error::{Error, Result};
use crate::metacog::MetacognitiveState;
use crate::oracle::{PlanCorrection, ProposedNode};
use crate::tasks::{TaskManager, TaskManagerConfig, TaskStats};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Identifier of one orchestrator session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new unique session identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Aggregate counters over everything the engine owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Sessions with an active plan.
    pub active_plans: usize,
    /// Sessions with metacognitive state.
    pub metacog_sessions: usize,
    /// Task counts by status.
    pub tasks: TaskStats,
}

/// Single owner of all mutable scheduling state.
///
/// Holds no internal locks: every method takes `&mut self`, so the
/// borrow checker enforces the one-owner-at-a-time discipline within a
/// thread, and [`SharedEngine`] extends it across threads.
pub struct Engine {
    tasks: TaskManager,
    plans: HashMap<SessionId, DagPlan>,
    metacog: HashMap<SessionId, MetacognitiveState>,
    plan_config: PlanConfig,
}

impl Engine {
    /// Create an engine with default configuration.
    pub fn new() -> Self {
        Self::with_config(PlanConfig::default(), TaskManagerConfig::default())
    }

    /// Create an engine with explicit plan and task-manager configuration.
    pub fn with_config(plan_config: PlanConfig, task_config: TaskManagerConfig) -> Self {
        Self {
            tasks: TaskManager::with_config(task_config),
            plans: HashMap::new(),
            metacog: HashMap::new(),
            plan_config,
        }
    }

    // ========== Plans ==========

    /// Create (and replace) the session's active plan for a goal.
    pub fn create_plan(&mut self, session: SessionId, goal: &str) -> &mut DagPlan {
        debug!(session = %session.short(), goal, "plan created");
        self.install_plan(session, DagPlan::with_config(goal, self.plan_config.clone()))
    }

    fn install_plan(&mut self, session: SessionId, plan: DagPlan) -> &mut DagPlan {
        match self.plans.entry(session) {
            Entry::Occupied(mut entry) => {
                entry.insert(plan);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(plan),
        }
    }

    /// The session's active plan, if any.
    pub fn plan(&self, session: SessionId) -> Option<&DagPlan> {
        self.plans.get(&session)
    }

    /// Mutable access to the session's active plan, if any.
    pub fn plan_mut(&mut self, session: SessionId) -> Option<&mut DagPlan> {
        self.plans.get_mut(&session)
    }

    /// Drop the session's active plan, returning it.
    pub fn clear_plan(&mut self, session: SessionId) -> Option<DagPlan> {
        self.plans.remove(&session)
    }

    /// Seed a fresh plan for the session from planner proposals.
    ///
    /// If the proposed graph contains a cycle, every dependency is
    /// stripped so the nodes at least run as a flat batch, and the
    /// degradation is logged.
    pub fn seed_plan(
        &mut self,
        session: SessionId,
        goal: &str,
        proposals: Vec<ProposedNode>,
    ) -> Result<&mut DagPlan> {
        let mut plan = DagPlan::with_config(goal, self.plan_config.clone());
        for proposed in proposals {
            plan.add_node(proposed.into_spec())?;
        }

        if plan.has_cycle() {
            warn!(
                session = %session.short(),
                goal,
                "proposed plan has a dependency cycle, flattening"
            );
            let ids: Vec<String> = plan.nodes().map(|node| node.id.clone()).collect();
            for id in ids {
                if let Some(node) = plan.get_node_mut(&id) {
                    node.depends_on.clear();
                }
            }
        }

        debug!(
            session = %session.short(),
            goal,
            nodes = plan.node_count(),
            "plan seeded"
        );
        Ok(self.install_plan(session, plan))
    }

    /// Apply a planner correction to the session's active plan.
    pub fn apply_correction(
        &mut self,
        session: SessionId,
        correction: PlanCorrection,
    ) -> Result<()> {
        let plan = self
            .plans
            .get_mut(&session)
            .ok_or(Error::NoPlan(session))?;
        plan.apply_correction(correction)
    }

    // ========== Metacognition ==========

    /// The session's metacognitive state, created lazily on first access.
    pub fn metacog(&mut self, session: SessionId) -> &mut MetacognitiveState {
        self.metacog.entry(session).or_default()
    }

    /// Start the session's metacognitive tracking over.
    pub fn reset_metacog(&mut self, session: SessionId) {
        self.metacog.insert(session, MetacognitiveState::new());
    }

    /// Record one loop iteration for the session.
    pub fn record_action(&mut self, session: SessionId, label: &str, duration: Duration) {
        self.metacog(session).record_action(label, duration);
    }

    /// Record a confidence assessment for the session.
    pub fn record_confidence(&mut self, session: SessionId, score: f64) {
        self.metacog(session).record_confidence(score);
    }

    /// Record a quality assessment for the session.
    pub fn record_quality(&mut self, session: SessionId, score: f64) {
        self.metacog(session).record_quality(score);
    }

    /// Check if the session should abort. False with no recorded state.
    pub fn should_abort(&self, session: SessionId) -> bool {
        self.metacog
            .get(&session)
            .is_some_and(MetacognitiveState::should_abort)
    }

    // ========== Tasks ==========

    /// The cross-session task manager.
    pub fn tasks(&self) -> &TaskManager {
        &self.tasks
    }

    /// Mutable access to the cross-session task manager.
    pub fn tasks_mut(&mut self) -> &mut TaskManager {
        &mut self.tasks
    }

    // ========== Stats ==========

    /// Aggregate counters over everything the engine owns.
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            active_plans: self.plans.len(),
            metacog_sessions: self.metacog.len(),
            tasks: self.tasks.stats(),
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("plans", &self.plans.len())
            .field("metacog_sessions", &self.metacog.len())
            .field("tasks", &self.tasks)
            .finish()
    }
}

/// Mutex-guarded engine handle for multi-threaded orchestrators.
///
/// The whole engine is one critical section; a caller runs each
/// scheduling step inside [`SharedEngine::with`] and performs blocking
/// work (tool execution, LLM calls) outside it. This is the ownership
/// discipline the plain types rely on.
#[derive(Clone, Default)]
pub struct SharedEngine {
    inner: Arc<Mutex<Engine>>,
}

impl SharedEngine {
    /// Wrap an engine for shared ownership.
    pub fn new(engine: Engine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    /// Run a closure with exclusive access to the engine.
    pub fn with<R>(&self, f: impl FnOnce(&mut Engine) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(|poisoned| {
            // Scheduling state stays structurally valid across a payload
            // panic, so recover the guard instead of propagating poison.
            poisoned.into_inner()
        });
        f(&mut guard)
    }
}
