//! Achievement and break policy
//!
//! Threshold checks over accumulated state. Break suggestions latch once per
//! session; achievements append on every qualifying evaluation.

use chrono::{DateTime, Utc};
use log::info;

use crate::config::FlowSettings;
use crate::types::{Achievement, AchievementKind};

/// Longest streak (minutes) that unlocks `FlowMaster`
pub const FLOW_MASTER_STREAK_MIN: f64 = 30.0;
/// Peak count that unlocks `ProductivityGuru`
pub const PRODUCTIVITY_GURU_PEAKS: usize = 3;
/// Cohesion score that must be exceeded for `CleanCodeChampion`
pub const CLEAN_CODE_COHESION: f64 = 90.0;
/// Productivity score above which a long session warrants a break
const HIGH_INTENSITY_SCORE: f64 = 90.0;
/// Session minutes after which high intensity warrants a break
const HIGH_INTENSITY_SESSION_MIN: f64 = 30.0;

/// State read by the break check
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakInputs {
    pub focus_score: f64,
    pub session_minutes: f64,
    pub productivity_score: f64,
}

/// Latched break suggestion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BreakPolicy {
    suggested: bool,
}

impl BreakPolicy {
    pub fn suggested(&self) -> bool {
        self.suggested
    }

    /// True at most once per session.
    pub fn check(&mut self, inputs: &BreakInputs, settings: &FlowSettings) -> bool {
        if self.suggested {
            return false;
        }

        let due = inputs.focus_score < settings.focus_threshold
            || inputs.session_minutes > settings.break_interval_min
            || (inputs.productivity_score > HIGH_INTENSITY_SCORE
                && inputs.session_minutes > HIGH_INTENSITY_SESSION_MIN);

        if due {
            self.suggested = true;
            info!(
                "Suggesting a break (focus {:.1}, session {:.1} min)",
                inputs.focus_score, inputs.session_minutes
            );
        }
        due
    }
}

/// State read by the achievement evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AchievementContext {
    pub longest_streak: f64,
    pub peak_count: usize,
    pub cohesion_score: f64,
}

/// Append-only list of unlocked achievements. Repeated unlocks of the same
/// kind are kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AchievementBook {
    unlocked: Vec<Achievement>,
}

impl AchievementBook {
    pub fn all(&self) -> &[Achievement] {
        &self.unlocked
    }

    pub fn count(&self, kind: AchievementKind) -> usize {
        self.unlocked.iter().filter(|a| a.kind == kind).count()
    }

    /// Append every qualifying achievement and return the new ones in
    /// evaluation order.
    pub fn evaluate(&mut self, ctx: &AchievementContext, now: DateTime<Utc>) -> Vec<Achievement> {
        let mut fresh = Vec::new();

        if ctx.longest_streak >= FLOW_MASTER_STREAK_MIN {
            fresh.push(Achievement::new(AchievementKind::FlowMaster, now));
        }
        if ctx.peak_count >= PRODUCTIVITY_GURU_PEAKS {
            fresh.push(Achievement::new(AchievementKind::ProductivityGuru, now));
        }
        if ctx.cohesion_score > CLEAN_CODE_COHESION {
            fresh.push(Achievement::new(AchievementKind::CleanCodeChampion, now));
        }

        for achievement in &fresh {
            info!(
                "Achievement unlocked: {:?} ({})",
                achievement.kind, achievement.description
            );
        }
        self.unlocked.extend(fresh.iter().cloned());
        fresh
    }
}
