//! Core domain models for plan scheduling.
//!
//! This module contains the fundamental data structures of the
//! scheduler: plan nodes and the dependency-graph plan that owns them.

pub mod node;
pub mod plan;

pub use node::{DagNode, NodeStatus, ToolBinding};
pub use plan::{DagPlan, DepState, DuplicatePolicy, NodeSpec, PlanConfig};
