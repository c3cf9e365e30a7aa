//! In-process task scheduling for agent orchestrators.
//!
//! Three pieces, used together by an external orchestrator:
//!
//! - [`core::plan::DagPlan`]: a dependency-graph plan executor with
//!   readiness queries, bounded retries, and skip cascades
//! - [`tasks::TaskManager`]: a cross-session priority task manager
//!   ranked by a derived urgency score
//! - [`metacog::MetacognitiveState`]: a per-session runaway-loop
//!   detector fed once per iteration
//!
//! The crate is synchronous and performs no I/O. Language-model calls
//! (plan generation, self-correction) and tool execution live behind
//! the traits in [`oracle`], outside the scheduler. The typical loop:
//! seed a plan from the planner, then repeatedly query
//! `get_ready_nodes`, dispatch, and report results back via
//! `complete_node`/`fail_node` until the plan is complete or the
//! metacognitive state says to abort.

pub mod core;
pub mod engine;
pub mod error;
pub mod metacog;
pub mod oracle;
pub mod snapshot;
pub mod tasks;

pub use crate::core::node::{DagNode, NodeStatus, ToolBinding};
pub use crate::core::plan::{DagPlan, DepState, DuplicatePolicy, NodeSpec, PlanConfig};
pub use crate::engine::{Engine, EngineStats, SessionId, SharedEngine};
pub use crate::error::{Error, Result};
pub use crate::metacog::MetacognitiveState;
pub use crate::oracle::{
    PlanCorrection, PlannerOracle, ProposedNode, ToolInvoker, ToolOutcome, ToolSpec,
};
pub use crate::snapshot::{ManagerSnapshot, MetacogSnapshot, PlanSnapshot, TaskSnapshot};
pub use crate::tasks::{
    ManagedTask, TaskId, TaskManager, TaskManagerConfig, TaskPriority, TaskStats, TaskStatus,
};
