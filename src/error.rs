use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Node {node} depends on unknown node {dependency}")]
    UnknownDependency { node: String, dependency: String },

    #[error("Dependency cycle detected at node: {0}")]
    CycleDetected(String),

    #[error("Task not found: {0}")]
    TaskNotFound(crate::tasks::TaskId),

    #[error("Active task limit reached (max: {max})")]
    ActiveTaskLimit { max: usize },

    #[error("Invalid task transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("No active plan for session: {0}")]
    NoPlan(crate::engine::SessionId),

    #[error("Planner oracle error: {0}")]
    Oracle(String),
}

pub type Result<T> = std::result::Result<T, Error>;
