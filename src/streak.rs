//! Focus streak state machine and productivity peaks

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::recorder::millis_between;
use crate::types::{FocusDip, ProductivityPeak};

/// Minimum spacing between streak evaluations
pub const STREAK_TICK_MS: u64 = 30_000;
/// Minutes added per focused evaluation
pub const STREAK_INCREMENT_MIN: f64 = 0.5;
/// Scores above this are productivity peaks
pub const PEAK_SCORE: f64 = 90.0;
/// Minimum spacing between recorded peaks
pub const PEAK_COOLDOWN_MIN: i64 = 15;

/// Focused when the score clears the threshold, or when a file is open and
/// the developer has been idle for under a minute.
pub fn is_focused(
    focus_score: f64,
    focus_threshold: f64,
    active_file_minutes: f64,
    idle_minutes: f64,
) -> bool {
    focus_score > focus_threshold || (active_file_minutes > 0.0 && idle_minutes < 1.0)
}

/// What a streak evaluation did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakTick {
    /// Focused, streak grew but stayed below the record
    Extended,
    /// Focused, streak set a new record
    NewRecord,
    /// Not focused, streak back to zero
    Reset,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusStreak {
    /// Minutes
    pub current: f64,
    /// Minutes, never below `current`
    pub longest: f64,
    pub last_update: DateTime<Utc>,
    pub dips: Vec<FocusDip>,
}

impl FocusStreak {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            current: 0.0,
            longest: 0.0,
            last_update: at,
            dips: Vec::new(),
        }
    }

    /// Advance the state machine. Returns `None` when less than
    /// `STREAK_TICK_MS` has passed since the last evaluation.
    pub fn evaluate(&mut self, now: DateTime<Utc>, focused: bool) -> Option<StreakTick> {
        if millis_between(self.last_update, now) < STREAK_TICK_MS {
            return None;
        }
        self.last_update = now;

        if focused {
            self.current += STREAK_INCREMENT_MIN;
            if self.current > self.longest {
                self.longest = self.current;
                debug!("New longest focus streak: {:.1} min", self.longest);
                return Some(StreakTick::NewRecord);
            }
            return Some(StreakTick::Extended);
        }

        if self.current > 0.0 {
            self.dips.push(FocusDip {
                timestamp: now,
                duration: self.current,
            });
            debug!("Focus streak ended after {:.1} min", self.current);
        }
        self.current = 0.0;
        Some(StreakTick::Reset)
    }
}

/// Productivity peaks, at most one per cooldown window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeakTracker {
    pub peaks: Vec<ProductivityPeak>,
    pub last_peak: Option<DateTime<Utc>>,
}

impl PeakTracker {
    /// Record a peak if `score` qualifies. Returns whether one was recorded.
    pub fn observe(&mut self, now: DateTime<Utc>, score: f64) -> bool {
        if score <= PEAK_SCORE {
            return false;
        }
        let cooled_down = match self.last_peak {
            None => true,
            Some(last) => now - last > Duration::minutes(PEAK_COOLDOWN_MIN),
        };
        if !cooled_down {
            return false;
        }

        self.peaks.push(ProductivityPeak {
            timestamp: now,
            score,
        });
        self.last_peak = Some(now);
        info!("Productivity peak #{} at score {:.1}", self.peaks.len(), score);
        true
    }

    pub fn count(&self) -> usize {
        self.peaks.len()
    }
}
