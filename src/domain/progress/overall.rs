//! Derived progress counters and session timing.
//!
//! Both values are recomputed from the step records after every mutation;
//! nothing in here is edited by hand.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;

use super::StepProgress;

/// Completion counters across all steps of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallProgress {
    pub total_steps: usize,
    pub completed_steps: usize,
    pub percent_complete: u8,
}

impl OverallProgress {
    /// Computes counters from step records.
    pub fn from_steps<'a>(steps: impl IntoIterator<Item = &'a StepProgress>) -> Self {
        let (total_steps, completed_steps) = steps
            .into_iter()
            .fold((0usize, 0usize), |(total, done), step| {
                (total + 1, done + usize::from(step.state.is_complete()))
            });

        Self {
            total_steps,
            completed_steps,
            percent_complete: Self::percent(completed_steps, total_steps),
        }
    }

    /// Returns true if every step is complete.
    pub fn is_complete(&self) -> bool {
        self.total_steps > 0 && self.completed_steps == self.total_steps
    }

    fn percent(completed: usize, total: usize) -> u8 {
        if total == 0 {
            return 0;
        }
        // Rounded to the nearest whole percent.
        ((completed * 100 + total / 2) / total) as u8
    }
}

/// Timing of the progress session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    pub started_at: Timestamp,
    pub last_activity_at: Timestamp,
    pub time_spent_minutes: i64,
}

impl SessionData {
    pub fn started(now: Timestamp) -> Self {
        Self {
            started_at: now,
            last_activity_at: now,
            time_spent_minutes: 0,
        }
    }

    /// Records activity at `now`.
    pub fn touched(&self, now: Timestamp) -> Self {
        let last_activity_at = if now.is_after(&self.last_activity_at) {
            now
        } else {
            self.last_activity_at
        };
        Self {
            started_at: self.started_at,
            last_activity_at,
            time_spent_minutes: last_activity_at.whole_minutes_since(&self.started_at),
        }
    }
}
