//! Streak reconciliation
//!
//! Computes the next `(last_performed, streak, done)` triple when a habit is
//! checked off or unchecked. The three values always travel together so the
//! store can write them in a single statement.

use crate::calendar::{is_today, is_yesterday, one_day_before};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// The completion-related part of a habit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakState {
    pub last_performed: DateTime<Utc>,
    pub done: bool,
    pub streak: u32,
    pub goal: u32,
}

impl StreakState {
    /// Whether the previous completion is recent enough to keep the chain
    fn is_continuous<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> bool {
        is_today(&self.last_performed, now) || is_yesterday(&self.last_performed, now)
    }

    /// Next state after setting the completion flag to `done` at `now`.
    ///
    /// Completing extends a chain that was last touched today or yesterday and
    /// starts a fresh one at 1 otherwise. Undoing steps the chain back by one
    /// (never below zero), or clears it when the chain had already lapsed, and
    /// moves `last_performed` to the previous day.
    pub fn reconcile<Tz: TimeZone>(&self, done: bool, now: &DateTime<Tz>) -> StreakState {
        let continuous = self.is_continuous(now);

        let (streak, last_performed) = if done {
            let streak = if continuous { self.streak.saturating_add(1) } else { 1 };
            (streak, now.with_timezone(&Utc))
        } else {
            let streak = if continuous { self.streak.saturating_sub(1) } else { 0 };
            (streak, one_day_before(now).with_timezone(&Utc))
        };

        StreakState {
            last_performed,
            done,
            streak,
            goal: self.goal,
        }
    }

    /// Clears the streak, leaving completion state alone
    pub fn reset_streak(&self) -> StreakState {
        StreakState { streak: 0, ..*self }
    }

    /// Marked done, and the mark belongs to today
    pub fn is_done_today<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> bool {
        self.done && is_today(&self.last_performed, now)
    }

    pub fn goal_reached(&self) -> bool {
        goal_reached(self.streak, self.goal)
    }
}

/// A goal of zero means "no goal", which is never reached.
pub fn goal_reached(streak: u32, goal: u32) -> bool {
    goal > 0 && streak >= goal
}
