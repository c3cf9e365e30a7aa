//! Metacognitive self-monitoring.
//!
//! Per-session accumulator of iteration, time, and confidence signals,
//! with derived predicates the orchestrator consults once per loop
//! iteration to decide whether a goal has turned into a runaway: the
//! agent repeating itself, burning too much time, or losing confidence.
//!
//! Everything here is derived; nothing abort-related is stored.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::warn;

/// How many recent action labels are kept for loop detection.
pub const ACTION_WINDOW: usize = 50;

/// Confidence readings below this count toward the low streak.
pub const LOW_CONFIDENCE: f64 = 0.5;

/// Identical trailing actions needed to flag the agent as stuck.
const STUCK_RUN: usize = 3;

/// Trailing low-confidence readings that force an abort.
const ABORT_CONFIDENCE_STREAK: usize = 4;

/// Iteration budget before an abort is forced.
const MAX_ITERATIONS: u32 = 15;

/// Thinking time after which the agent should hurry, in seconds.
const SOFT_TIME_LIMIT_SECONDS: f64 = 120.0;

/// Thinking time that forces an abort, in seconds.
const HARD_TIME_LIMIT_SECONDS: f64 = 300.0;

/// Accumulated self-monitoring signals for one session.
///
/// Fields are public plain data; the `record_*` methods maintain the
/// clamping and ring-trimming invariants, and snapshots round-trip the
/// whole struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetacognitiveState {
    /// Loop iterations spent on the current goal.
    pub iterations_used: u32,
    /// Accumulated thinking time, in seconds.
    pub thinking_time_seconds: f64,
    /// Quality assessments, each clamped to [0, 1].
    pub quality_scores: Vec<f64>,
    /// Confidence assessments, each clamped to [0, 1].
    pub confidence_history: Vec<f64>,
    /// Ring of the last [`ACTION_WINDOW`] action labels.
    pub repeated_actions: VecDeque<String>,
}

impl MetacognitiveState {
    /// Create a fresh state with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one loop iteration: the action taken and how long it took.
    pub fn record_action(&mut self, label: &str, duration: Duration) {
        self.iterations_used += 1;
        self.thinking_time_seconds += duration.as_secs_f64();
        self.repeated_actions.push_back(label.to_string());
        while self.repeated_actions.len() > ACTION_WINDOW {
            self.repeated_actions.pop_front();
        }

        if self.is_stuck() {
            warn!(action = label, "same action repeated, agent looks stuck");
        }
    }

    /// Record a confidence assessment, clamped to [0, 1].
    pub fn record_confidence(&mut self, score: f64) {
        self.confidence_history.push(score.clamp(0.0, 1.0));
    }

    /// Record a quality assessment, clamped to [0, 1].
    pub fn record_quality(&mut self, score: f64) {
        self.quality_scores.push(score.clamp(0.0, 1.0));
    }

    /// Reset every counter, starting the session over.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Mean recorded quality, or 0.0 with no readings.
    pub fn avg_quality(&self) -> f64 {
        if self.quality_scores.is_empty() {
            return 0.0;
        }
        self.quality_scores.iter().sum::<f64>() / self.quality_scores.len() as f64
    }

    /// Mean recorded confidence, or 0.0 with no readings.
    pub fn avg_confidence(&self) -> f64 {
        if self.confidence_history.is_empty() {
            return 0.0;
        }
        self.confidence_history.iter().sum::<f64>() / self.confidence_history.len() as f64
    }

    /// Check if the last three recorded actions are all identical.
    ///
    /// False with fewer than three recorded.
    pub fn is_stuck(&self) -> bool {
        if self.repeated_actions.len() < STUCK_RUN {
            return false;
        }
        let mut last = self.repeated_actions.iter().rev().take(STUCK_RUN);
        let first = match last.next() {
            Some(label) => label,
            None => return false,
        };
        last.all(|label| label == first)
    }

    /// Check if the last three confidence readings strictly decrease.
    pub fn is_declining(&self) -> bool {
        let n = self.confidence_history.len();
        if n < 3 {
            return false;
        }
        let tail = &self.confidence_history[n - 3..];
        tail[0] > tail[1] && tail[1] > tail[2]
    }

    /// Count of trailing confidence readings below [`LOW_CONFIDENCE`].
    ///
    /// Scans backward from the most recent reading until one at or above
    /// the threshold, or the history runs out.
    pub fn low_confidence_streak(&self) -> usize {
        self.confidence_history
            .iter()
            .rev()
            .take_while(|&&score| score < LOW_CONFIDENCE)
            .count()
    }

    /// Check if the session is past the soft time limit.
    pub fn is_taking_too_long(&self) -> bool {
        self.thinking_time_seconds > SOFT_TIME_LIMIT_SECONDS
    }

    /// Check if the session should be aborted.
    ///
    /// True when the agent is stuck, out of iterations, past the hard
    /// time limit, or has four or more low-confidence readings in a row.
    pub fn should_abort(&self) -> bool {
        self.is_stuck()
            || self.iterations_used > MAX_ITERATIONS
            || self.thinking_time_seconds > HARD_TIME_LIMIT_SECONDS
            || self.low_confidence_streak() >= ABORT_CONFIDENCE_STREAK
    }
}
