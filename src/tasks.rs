//! Cross-session task management.
//!
//! The TaskManager owns every top-level task the orchestrator is
//! juggling, across all sessions, and answers "what should I work on
//! next" by ranking non-terminal tasks with a derived urgency score:
//! fixed priority weight, plus a deadline-proximity bonus, plus a
//! queue-age bonus.

use crate::core::plan::DagPlan;
use crate::engine::SessionId;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default limit on concurrently active tasks.
pub const DEFAULT_MAX_ACTIVE_TASKS: usize = 10;

/// Fixed priority band of a managed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    /// Work on this immediately.
    Critical,
    /// Work on this as soon as possible.
    High,
    /// Regular queue position.
    #[default]
    Normal,
    /// When there is time.
    Low,
    /// Background housekeeping.
    Background,
}

impl TaskPriority {
    /// Base weight of the band in the urgency score.
    pub fn weight(&self) -> u32 {
        match self {
            TaskPriority::Critical => 100,
            TaskPriority::High => 75,
            TaskPriority::Normal => 50,
            TaskPriority::Low => 25,
            TaskPriority::Background => 10,
        }
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskPriority::Critical => write!(f, "critical"),
            TaskPriority::High => write!(f, "high"),
            TaskPriority::Normal => write!(f, "normal"),
            TaskPriority::Low => write!(f, "low"),
            TaskPriority::Background => write!(f, "background"),
        }
    }
}

/// Task status in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting to be picked up.
    #[default]
    Pending,
    /// Currently being worked on.
    Active,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Put aside; resumes to Pending.
    Paused,
}

impl TaskStatus {
    /// Check if the status is terminal (Completed or Failed).
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Active => write!(f, "active"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Paused => write!(f, "paused"),
        }
    }
}

/// Identifier of a managed task, assigned monotonically by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task_{}", self.0)
    }
}

/// A top-level task owned by the [`TaskManager`].
///
/// A task may embed a [`DagPlan`] for its multi-step execution and may
/// belong to a session; sessions are independent of each other.
#[derive(Debug)]
pub struct ManagedTask {
    /// Identifier assigned at creation.
    pub id: TaskId,
    /// What the task is about.
    pub description: String,
    /// Fixed priority band.
    pub priority: TaskPriority,
    /// Optional deadline used for the urgency bonus.
    pub deadline: Option<DateTime<Utc>>,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Embedded execution plan, if one has been attached.
    pub plan: Option<DagPlan>,
    /// Session the task belongs to, if any.
    pub session: Option<SessionId>,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// When the task reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Result text recorded on completion.
    pub result: Option<String>,
    /// Error text recorded on failure.
    pub error: Option<String>,
    /// Free-form labels.
    pub tags: Vec<String>,
}

impl ManagedTask {
    /// Check if the task has passed its deadline, as of `now`.
    ///
    /// Terminal tasks are never overdue, whatever their deadline says.
    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.deadline.is_some_and(|deadline| now > deadline)
    }

    /// Check if the task has passed its deadline.
    pub fn is_overdue(&self) -> bool {
        self.is_overdue_at(Utc::now())
    }

    /// Derived urgency, as of `now`.
    ///
    /// weight + deadline bonus (200 past due, 100 under an hour, 50
    /// under a day, 20 under a week) + age bonus (2 per queued hour,
    /// capped at 30). Never stored; always recomputed.
    pub fn urgency_score_at(&self, now: DateTime<Utc>) -> f64 {
        let mut score = self.priority.weight() as f64;

        if let Some(deadline) = self.deadline {
            let remaining = (deadline - now).num_seconds();
            score += if remaining <= 0 {
                200.0
            } else if remaining < 3_600 {
                100.0
            } else if remaining < 86_400 {
                50.0
            } else if remaining < 604_800 {
                20.0
            } else {
                0.0
            };
        }

        let age_hours = (now - self.created_at).num_seconds() as f64 / 3_600.0;
        score += (age_hours * 2.0).min(30.0);

        score
    }

    /// Derived urgency as of now.
    pub fn urgency_score(&self) -> f64 {
        self.urgency_score_at(Utc::now())
    }
}

/// Configuration for the task manager.
#[derive(Debug, Clone)]
pub struct TaskManagerConfig {
    /// Admission limit enforced by [`TaskManager::start_task`].
    pub max_active: usize,
}

impl Default for TaskManagerConfig {
    fn default() -> Self {
        Self {
            max_active: DEFAULT_MAX_ACTIVE_TASKS,
        }
    }
}

/// Counts of tasks by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    pub total: usize,
    pub pending: usize,
    pub active: usize,
    pub paused: usize,
    pub completed: usize,
    pub failed: usize,
    pub overdue: usize,
}

/// Owner of every managed task, across all sessions.
///
/// Plain mutable state with no internal locking; one logical owner at a
/// time, like the rest of the crate.
pub struct TaskManager {
    /// Tasks in creation order; creation order is the ranking tie-break.
    pub(crate) tasks: Vec<ManagedTask>,
    /// Next id to assign.
    pub(crate) next_id: u64,
    /// Admission-control configuration.
    pub(crate) config: TaskManagerConfig,
}

impl TaskManager {
    /// Create an empty manager with default configuration.
    pub fn new() -> Self {
        Self::with_config(TaskManagerConfig::default())
    }

    /// Create an empty manager with explicit configuration.
    pub fn with_config(config: TaskManagerConfig) -> Self {
        Self {
            tasks: Vec::new(),
            next_id: 1,
            config,
        }
    }

    /// Number of tasks ever created and still tracked.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Check if the manager tracks no tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Create a new pending task and return its id.
    pub fn create_task(
        &mut self,
        description: &str,
        priority: TaskPriority,
        deadline: Option<DateTime<Utc>>,
        session: Option<SessionId>,
        tags: Vec<String>,
    ) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;

        self.tasks.push(ManagedTask {
            id,
            description: description.to_string(),
            priority,
            deadline,
            status: TaskStatus::Pending,
            plan: None,
            session,
            created_at: Utc::now(),
            completed_at: None,
            result: None,
            error: None,
            tags,
        });

        debug!(task = %id, %priority, description, "task created");
        id
    }

    /// Get a reference to a task by id.
    pub fn get_task(&self, id: TaskId) -> Option<&ManagedTask> {
        self.tasks.iter().find(|task| task.id == id)
    }

    /// Get a mutable reference to a task by id.
    pub fn get_task_mut(&mut self, id: TaskId) -> Option<&mut ManagedTask> {
        self.tasks.iter_mut().find(|task| task.id == id)
    }

    /// Attach an execution plan to a task.
    ///
    /// Returns false if no task with that id exists.
    pub fn set_plan(&mut self, id: TaskId, plan: DagPlan) -> bool {
        match self.get_task_mut(id) {
            Some(task) => {
                task.plan = Some(plan);
                true
            }
            None => false,
        }
    }

    /// Activate a pending task, subject to the active-task limit.
    ///
    /// This is the admission-control gate: at most `max_active` tasks
    /// may be Active at once.
    pub fn start_task(&mut self, id: TaskId) -> Result<()> {
        let active = self
            .tasks
            .iter()
            .filter(|task| task.status == TaskStatus::Active)
            .count();

        let max_active = self.config.max_active;
        let task = self.get_task_mut(id).ok_or(Error::TaskNotFound(id))?;
        if task.status != TaskStatus::Pending {
            return Err(Error::InvalidTransition {
                from: task.status.to_string(),
                to: TaskStatus::Active.to_string(),
            });
        }
        if active >= max_active {
            return Err(Error::ActiveTaskLimit {
                max: max_active,
            });
        }

        task.status = TaskStatus::Active;
        debug!(task = %id, "task started");
        Ok(())
    }

    /// Pause an active task. No-op for any other status.
    pub fn pause_task(&mut self, id: TaskId) -> bool {
        match self.get_task_mut(id) {
            Some(task) if task.status == TaskStatus::Active => {
                task.status = TaskStatus::Paused;
                true
            }
            _ => false,
        }
    }

    /// Resume a paused task back to the pending pool. No-op otherwise.
    pub fn resume_task(&mut self, id: TaskId) -> bool {
        match self.get_task_mut(id) {
            Some(task) if task.status == TaskStatus::Paused => {
                task.status = TaskStatus::Pending;
                true
            }
            _ => false,
        }
    }

    /// Complete a task, recording its result.
    ///
    /// Returns false if no task with that id exists.
    pub fn complete_task(&mut self, id: TaskId, result: &str) -> bool {
        match self.get_task_mut(id) {
            Some(task) => {
                task.status = TaskStatus::Completed;
                task.result = Some(result.to_string());
                task.completed_at = Some(Utc::now());
                debug!(task = %id, "task completed");
                true
            }
            None => false,
        }
    }

    /// Fail a task, recording the error.
    ///
    /// Returns false if no task with that id exists.
    pub fn fail_task(&mut self, id: TaskId, error: &str) -> bool {
        match self.get_task_mut(id) {
            Some(task) => {
                task.status = TaskStatus::Failed;
                task.error = Some(error.to_string());
                task.completed_at = Some(Utc::now());
                debug!(task = %id, error, "task failed");
                true
            }
            None => false,
        }
    }

    /// Pick the task to work on next.
    ///
    /// The highest urgency score among Pending and Paused tasks wins;
    /// equal scores go to the task created first.
    pub fn get_next_task(&self) -> Option<&ManagedTask> {
        let now = Utc::now();
        let mut best: Option<(&ManagedTask, f64)> = None;

        for task in &self.tasks {
            if !matches!(task.status, TaskStatus::Pending | TaskStatus::Paused) {
                continue;
            }
            let score = task.urgency_score_at(now);
            // Strictly-greater keeps the earliest-created task on ties.
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((task, score));
            }
        }

        best.map(|(task, _)| task)
    }

    /// All non-terminal tasks, most urgent first.
    ///
    /// With a session id, only that session's tasks are returned.
    pub fn get_active_tasks(&self, session: Option<SessionId>) -> Vec<&ManagedTask> {
        let now = Utc::now();
        let mut tasks: Vec<&ManagedTask> = self
            .tasks
            .iter()
            .filter(|task| !task.status.is_terminal())
            .filter(|task| session.is_none() || task.session == session)
            .collect();
        tasks.sort_by(|a, b| {
            b.urgency_score_at(now)
                .partial_cmp(&a.urgency_score_at(now))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        tasks
    }

    /// All tasks past their deadline.
    pub fn get_overdue_tasks(&self) -> Vec<&ManagedTask> {
        let now = Utc::now();
        self.tasks
            .iter()
            .filter(|task| task.is_overdue_at(now))
            .collect()
    }

    /// The most recently completed tasks, newest first.
    pub fn get_completed_tasks(&self, limit: usize) -> Vec<&ManagedTask> {
        let mut completed: Vec<&ManagedTask> = self
            .tasks
            .iter()
            .filter(|task| task.status == TaskStatus::Completed)
            .collect();
        completed.sort_by_key(|task| std::cmp::Reverse(task.completed_at));
        completed.truncate(limit);
        completed
    }

    /// Counts of tasks by status plus the overdue count.
    pub fn stats(&self) -> TaskStats {
        let mut stats = TaskStats {
            total: self.tasks.len(),
            ..TaskStats::default()
        };
        let now = Utc::now();
        for task in &self.tasks {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Active => stats.active += 1,
                TaskStatus::Paused => stats.paused += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
            }
            if task.is_overdue_at(now) {
                stats.overdue += 1;
            }
        }
        stats
    }

    /// Human-readable rendering of the non-terminal queue.
    pub fn summary(&self, session: Option<SessionId>) -> String {
        let active = self.get_active_tasks(session);
        if active.is_empty() {
            return "no active tasks".to_string();
        }

        let overdue = self.get_overdue_tasks().len();
        let mut lines = vec![format!("tasks: {} active", active.len())];
        if overdue > 0 {
            lines.push(format!("overdue: {}", overdue));
        }
        for task in active {
            let mut line = format!(
                "  [{}] {} ({}) {}",
                task.status, task.id, task.priority, task.description
            );
            if let Some(deadline) = task.deadline {
                line.push_str(&format!(" due {}", deadline.format("%Y-%m-%d %H:%M")));
            }
            lines.push(line);
        }
        lines.join("\n")
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("tasks", &self.tasks.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}
