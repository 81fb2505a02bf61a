//! Flow engine
//!
//! One `FlowEngine` per tracked session. It owns every counter, window and
//! score; collaborators hold a handle to it (or to the service wrapping it)
//! and only ever receive snapshot copies.
//!
//! All time-dependent entry points have an `_at` variant taking the current
//! instant explicitly. The plain variants use `Utc::now()`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info};
use uuid::Uuid;

use crate::config::FlowSettings;
use crate::events::{FlowEvent, TimedEvent};
use crate::policy::{AchievementBook, AchievementContext, BreakInputs, BreakPolicy};
use crate::recorder::EventRecorder;
use crate::scoring::{
    code_quality_score, score_tick, scorer_from_settings, FallbackInputs, FocusScorer,
    ScoreOutcome, ScoringRequest,
};
use crate::snapshot::productivity_status;
use crate::streak::{is_focused, FocusStreak, PeakTracker, StreakTick};
use crate::types::{Achievement, ErrorSummary, FlowSnapshot, FocusSample, Notification};

/// Stateful accumulator for one session
pub struct FlowEngine {
    settings: FlowSettings,
    scorer: Arc<dyn FocusScorer>,
    session_id: Uuid,
    recorder: EventRecorder,
    focus_score: f64,
    code_quality_score: f64,
    streak: FocusStreak,
    peaks: PeakTracker,
    break_policy: BreakPolicy,
    achievements: AchievementBook,
    notifications: Vec<Notification>,
    last_outcome: Option<ScoreOutcome>,
}

impl FlowEngine {
    /// Create an engine whose session starts now.
    pub fn new(settings: FlowSettings, scorer: Arc<dyn FocusScorer>) -> Self {
        Self::new_at(settings, scorer, Utc::now())
    }

    /// Create an engine using the scorer described by the settings.
    pub fn with_settings(settings: FlowSettings) -> Self {
        let scorer = scorer_from_settings(&settings.scoring);
        Self::new(settings, scorer)
    }

    /// Create an engine whose session starts at `at`.
    pub fn new_at(settings: FlowSettings, scorer: Arc<dyn FocusScorer>, at: DateTime<Utc>) -> Self {
        let recorder = EventRecorder::new(&settings, at);
        let mut engine = Self {
            settings,
            scorer,
            session_id: Uuid::new_v4(),
            recorder,
            focus_score: 100.0,
            code_quality_score: 100.0,
            streak: FocusStreak::new(at),
            peaks: PeakTracker::default(),
            break_policy: BreakPolicy::default(),
            achievements: AchievementBook::default(),
            notifications: Vec::new(),
            last_outcome: None,
        };
        engine.update_code_quality_score();
        engine
    }

    pub fn settings(&self) -> &FlowSettings {
        &self.settings
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn recorder(&self) -> &EventRecorder {
        &self.recorder
    }

    pub fn focus_score(&self) -> f64 {
        self.focus_score
    }

    pub fn code_quality_score(&self) -> f64 {
        self.code_quality_score
    }

    pub fn current_streak(&self) -> f64 {
        self.streak.current
    }

    pub fn longest_streak(&self) -> f64 {
        self.streak.longest
    }

    pub fn achievements(&self) -> &[Achievement] {
        self.achievements.all()
    }

    /// Path taken by the most recent scoring tick
    pub fn last_outcome(&self) -> Option<ScoreOutcome> {
        self.last_outcome
    }

    /// Apply an event that happened now.
    pub fn apply(&mut self, event: FlowEvent) {
        self.apply_at(event, Utc::now());
    }

    pub fn apply_timed(&mut self, timed: TimedEvent) {
        self.apply_at(timed.event, timed.timestamp);
    }

    /// Apply an event that happened at `at`.
    pub fn apply_at(&mut self, event: FlowEvent, at: DateTime<Utc>) {
        match event {
            FlowEvent::Edit {
                inserted_lines,
                removed_lines,
                delta_ms,
            } => self
                .recorder
                .record_edit(inserted_lines, removed_lines, delta_ms, at),
            FlowEvent::Diagnostics {
                language_id,
                diagnostics,
            } => self
                .recorder
                .record_diagnostics(&language_id, &diagnostics, at),
            FlowEvent::TabSwitch { target } => self.recorder.record_tab_switch(&target, at),
            FlowEvent::Clipboard { op } => self.recorder.record_clipboard_op(op, at),
            FlowEvent::BreakpointDelta { added, removed } => {
                self.recorder.record_breakpoint_delta(added, removed)
            }
            FlowEvent::WindowBlur => self.recorder.record_window_blur(),
            FlowEvent::CodeMetrics(sample) => {
                self.recorder.record_code_metrics(&sample);
                self.update_code_quality_score();
            }
            FlowEvent::CodeAnalysis(analysis) => self.recorder.record_code_analysis(analysis),
        }
    }

    /// Run one scoring tick now.
    pub async fn update_focus_score(&mut self) -> ScoreOutcome {
        self.update_focus_score_at(Utc::now()).await
    }

    /// Run one scoring tick: remote attempt or fallback, focus history,
    /// peak detection, then the rate-limited streak evaluation.
    pub async fn update_focus_score_at(&mut self, now: DateTime<Utc>) -> ScoreOutcome {
        let times = *self.recorder.times();
        let idle_minutes = times.idle_minutes(now);
        let active_file_minutes = times.active_file_minutes(now);

        let request = ScoringRequest {
            current_streak: self.streak.current,
            longest_streak: self.streak.longest,
            session_duration: times.session_minutes(now),
            active_file_duration: active_file_minutes,
            idle_time: idle_minutes,
            typing_rhythm: self.recorder.store().typing_rhythm(),
        };
        let counters = self.recorder.counters();
        let fallback = FallbackInputs {
            idle_minutes,
            current_streak: self.streak.current,
            tab_switches: counters.tab.total,
            window_switches: counters.window_switches,
        };

        let outcome = score_tick(
            self.scorer.as_ref(),
            &request,
            &fallback,
            self.settings.scoring.timeout(),
        )
        .await;

        self.focus_score = outcome.value();
        self.last_outcome = Some(outcome);
        self.recorder.store.focus_history.push(FocusSample {
            timestamp: now,
            score: self.focus_score,
        });
        self.peaks.observe(now, self.focus_score);

        let focused = is_focused(
            self.focus_score,
            self.settings.focus_threshold,
            active_file_minutes,
            idle_minutes,
        );
        if let Some(StreakTick::NewRecord) = self.streak.evaluate(now, focused) {
            self.evaluate_achievements(now);
        }

        outcome
    }

    /// Recompute the code quality score from the latest code metrics.
    pub fn update_code_quality_score(&mut self) -> f64 {
        self.code_quality_score = code_quality_score(
            self.recorder.code(),
            self.recorder.counters().lines_added,
            &self.settings.code_quality,
        );
        self.code_quality_score
    }

    /// Full snapshot: one scoring tick, a quality recompute and the
    /// latched break check.
    pub async fn get_metrics(&mut self) -> FlowSnapshot {
        self.get_metrics_at(Utc::now()).await
    }

    pub async fn get_metrics_at(&mut self, now: DateTime<Utc>) -> FlowSnapshot {
        self.update_focus_score_at(now).await;
        self.update_code_quality_score();

        let inputs = BreakInputs {
            focus_score: self.focus_score,
            session_minutes: self.recorder.times().session_minutes(now),
            productivity_score: self.recorder.store().productivity_score(),
        };
        let needs_break = self.break_policy.check(&inputs, &self.settings);
        if needs_break {
            self.notifications
                .push(Notification::BreakSuggested { timestamp: now });
        }

        self.build_snapshot(now, needs_break)
    }

    /// Snapshot of current state without scoring or streak evaluation.
    /// Never latches the break suggestion, so `needs_break` is false.
    pub fn live_view(&self) -> FlowSnapshot {
        self.live_view_at(Utc::now())
    }

    pub fn live_view_at(&self, now: DateTime<Utc>) -> FlowSnapshot {
        self.build_snapshot(now, false)
    }

    pub fn get_error_summary(&self) -> ErrorSummary {
        self.recorder.store().error_summary()
    }

    /// Take queued notifications, oldest first.
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    /// Start a new session now.
    pub fn reset(&mut self) {
        self.reset_at(Utc::now());
    }

    /// Start a new session at `at`. Settings and scorer carry over,
    /// everything else is replaced.
    pub fn reset_at(&mut self, at: DateTime<Utc>) {
        let previous = self.session_id;
        *self = Self::new_at(self.settings.clone(), Arc::clone(&self.scorer), at);
        info!("Session {} reset, new session {}", previous, self.session_id);
    }

    fn evaluate_achievements(&mut self, now: DateTime<Utc>) {
        let ctx = AchievementContext {
            longest_streak: self.streak.longest,
            peak_count: self.peaks.count(),
            cohesion_score: self.recorder.code().cohesion_score,
        };
        let fresh = self.achievements.evaluate(&ctx, now);
        if let Some(first) = fresh.into_iter().next() {
            debug!("Queueing notification for {:?}", first.kind);
            self.notifications
                .push(Notification::AchievementUnlocked { achievement: first });
        }
    }

    fn build_snapshot(&self, now: DateTime<Utc>, needs_break: bool) -> FlowSnapshot {
        let times = self.recorder.times();
        let counters = self.recorder.counters();
        let store = self.recorder.store();
        let code = self.recorder.code();

        FlowSnapshot {
            session_id: self.session_id.to_string(),
            computed_at: now,

            focus_score: self.focus_score,
            productivity_score: store.productivity_score(),
            code_quality_score: self.code_quality_score,
            typing_rhythm: store.typing_rhythm(),
            productivity_status: productivity_status(
                self.focus_score,
                &self.settings.productivity_thresholds,
            ),
            productivity_trend: store.productivity_trend(),
            needs_break,

            current_streak: self.streak.current,
            longest_streak: self.streak.longest,

            session_duration_min: times.session_minutes(now),
            active_file_duration_min: times.active_file_minutes(now),
            idle_time_min: times.idle_minutes(now),

            file_edits: counters.file_edits,
            command_count: counters.command_count,
            lines_added: counters.lines_added,
            lines_deleted: counters.lines_deleted,
            window_switches: counters.window_switches,
            breakpoint_count: counters.breakpoint_count,
            tab_metrics: counters.tab,
            copy_paste_metrics: counters.clipboard.clone(),

            error_count: counters.error_count,
            warning_count: counters.warning_count,
            problem_count: counters.problem_count,
            dropped_diagnostics: counters.dropped_diagnostics,
            error_summary: store.error_summary(),

            clean_code_metrics: code.clean_code_metrics(),
            last_code_analysis: code.last_analysis.clone(),

            focus_history: store.focus_history.to_vec(),
            productivity_peaks: self.peaks.peaks.clone(),
            focus_dips: self.streak.dips.clone(),
            achievements: self.achievements.all().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::ErrorCategory;
    use crate::error::ScoringError;
    use crate::events::{CodeMetricsSample, Diagnostic};
    use crate::types::{AchievementKind, ClipboardOp, ProductivityStatus, Severity};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    /// Returns a fixed score, or fails when `None`.
    struct StubScorer(Option<f64>);

    #[async_trait]
    impl FocusScorer for StubScorer {
        fn name(&self) -> &str {
            "stub"
        }

        async fn score(&self, _request: &ScoringRequest) -> Result<f64, ScoringError> {
            self.0.ok_or(ScoringError::HttpStatus(503))
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn engine(score: Option<f64>) -> FlowEngine {
        FlowEngine::new_at(FlowSettings::default(), Arc::new(StubScorer(score)), t0())
    }

    fn tab(target: &str) -> FlowEvent {
        FlowEvent::TabSwitch {
            target: target.to_string(),
        }
    }

    #[test]
    fn test_fresh_engine() {
        let e = engine(None);
        assert_eq!(e.focus_score(), 100.0);
        assert_eq!(e.current_streak(), 0.0);
        assert_eq!(e.longest_streak(), 0.0);
        assert!(e.last_outcome().is_none());

        let view = e.live_view_at(t0());
        assert_eq!(view.productivity_status, ProductivityStatus::FlowState);
        assert_eq!(view.typing_rhythm, 100.0);
        assert_eq!(view.productivity_score, 100.0);
    }

    #[tokio::test]
    async fn test_fallback_after_switches_and_blurs() {
        let mut e = engine(None);
        for target in ["a", "b", "c", "d", "e"] {
            e.apply_at(tab(target), t0());
        }
        e.apply_at(FlowEvent::WindowBlur, t0());
        e.apply_at(FlowEvent::WindowBlur, t0());

        let outcome = e.update_focus_score_at(t0()).await;
        assert!(outcome.is_fallback());
        assert!((outcome.value() - 98.0).abs() < 1e-9);
        assert!((e.focus_score() - 98.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_remote_score_adopted() {
        let mut e = engine(Some(95.0));
        let outcome = e.update_focus_score_at(t0()).await;
        assert_eq!(outcome, ScoreOutcome::Scored(95.0));

        let snapshot = e.live_view_at(t0());
        assert_eq!(snapshot.focus_history.len(), 1);
        assert_eq!(snapshot.productivity_peaks.len(), 1);
    }

    #[test]
    fn test_javascript_reference_diagnostic() {
        let mut e = engine(None);
        e.apply_at(
            FlowEvent::Diagnostics {
                language_id: "javascript".to_string(),
                diagnostics: vec![Diagnostic::new("x is not defined", Severity::Error, 0, 0)],
            },
            t0(),
        );

        let summary = e.get_error_summary();
        assert_eq!(summary.by_severity.error, 1);
        let js = &summary.by_language["javascript"];
        assert_eq!(js[&ErrorCategory::Reference], 1);
        assert_eq!(js[&ErrorCategory::Syntax], 0);
    }

    #[test]
    fn test_back_and_forth_tabs() {
        let mut e = engine(None);
        for (i, target) in ["A", "B", "A"].iter().enumerate() {
            e.apply_at(tab(target), t0() + Duration::seconds(10 * i as i64));
        }
        let tabs = e.live_view_at(t0()).tab_metrics;
        assert_eq!(tabs.patterns.back_and_forth, 1);
        assert_eq!(tabs.patterns.sequential, 0);
    }

    #[tokio::test]
    async fn test_thirty_minute_streak_unlocks_flow_master_once() {
        let mut e = engine(Some(80.0));
        for tick in 1..=60 {
            e.update_focus_score_at(t0() + Duration::seconds(30 * tick))
                .await;
            assert!(e.longest_streak() >= e.current_streak());
        }

        assert_eq!(e.longest_streak(), 30.0);
        let flow_masters = e
            .achievements()
            .iter()
            .filter(|a| a.kind == AchievementKind::FlowMaster)
            .count();
        assert_eq!(flow_masters, 1);

        let notifications = e.drain_notifications();
        assert_eq!(notifications.len(), 1);
        assert!(matches!(
            &notifications[0],
            Notification::AchievementUnlocked { achievement } if achievement.kind == AchievementKind::FlowMaster
        ));
        assert!(e.drain_notifications().is_empty());
    }

    #[tokio::test]
    async fn test_streak_breaks_when_idle() {
        let mut e = engine(Some(50.0));
        // Active file open and just typed: focused despite the low score
        e.apply_at(tab("main.rs"), t0());
        e.apply_at(
            FlowEvent::Edit {
                inserted_lines: 1,
                removed_lines: 0,
                delta_ms: None,
            },
            t0() + Duration::seconds(20),
        );
        e.update_focus_score_at(t0() + Duration::seconds(30)).await;
        assert_eq!(e.current_streak(), 0.5);

        // Five idle minutes later the streak ends
        e.update_focus_score_at(t0() + Duration::minutes(5)).await;
        assert_eq!(e.current_streak(), 0.0);
        let snapshot = e.live_view_at(t0() + Duration::minutes(5));
        assert_eq!(snapshot.focus_dips.len(), 1);
        assert_eq!(snapshot.focus_dips[0].duration, 0.5);
    }

    #[tokio::test]
    async fn test_get_metrics_is_idempotent_for_counters() {
        let mut e = engine(Some(75.0));
        e.apply_at(tab("a"), t0());
        e.apply_at(FlowEvent::Clipboard { op: ClipboardOp::Copy }, t0());
        e.apply_at(
            FlowEvent::Diagnostics {
                language_id: "python".to_string(),
                diagnostics: vec![Diagnostic::new("unexpected indent", Severity::Warning, 2, 4)],
            },
            t0(),
        );

        let now = t0() + Duration::minutes(1);
        let first = e.get_metrics_at(now).await;
        let second = e.get_metrics_at(now).await;

        assert_eq!(first.tab_metrics, second.tab_metrics);
        assert_eq!(first.copy_paste_metrics, second.copy_paste_metrics);
        assert_eq!(first.error_summary, second.error_summary);
        assert_eq!(first.file_edits, second.file_edits);
        assert_eq!(first.focus_score, second.focus_score);
    }

    #[tokio::test]
    async fn test_break_suggested_once() {
        let mut e = engine(Some(50.0));
        let first = e.get_metrics_at(t0() + Duration::minutes(1)).await;
        let second = e.get_metrics_at(t0() + Duration::minutes(2)).await;
        assert!(first.needs_break);
        assert!(!second.needs_break);
        assert_eq!(
            e.drain_notifications(),
            vec![Notification::BreakSuggested {
                timestamp: t0() + Duration::minutes(1)
            }]
        );
    }

    #[tokio::test]
    async fn test_snapshot_durations_in_minutes() {
        let mut e = engine(Some(85.0));
        e.apply_at(tab("lib.rs"), t0() + Duration::minutes(10));
        e.apply_at(
            FlowEvent::Edit {
                inserted_lines: 3,
                removed_lines: 1,
                delta_ms: Some(150),
            },
            t0() + Duration::minutes(12),
        );

        let snapshot = e.get_metrics_at(t0() + Duration::minutes(20)).await;
        assert_eq!(snapshot.session_duration_min, 20.0);
        assert_eq!(snapshot.active_file_duration_min, 10.0);
        assert_eq!(snapshot.idle_time_min, 8.0);
        assert_eq!(snapshot.lines_added, 3);
        assert_eq!(snapshot.productivity_status, ProductivityStatus::FlowState);
    }

    #[tokio::test]
    async fn test_live_view_does_not_score() {
        let mut e = engine(Some(80.0));
        for second in 0..120 {
            e.live_view_at(t0() + Duration::seconds(second));
        }
        assert_eq!(e.current_streak(), 0.0);
        assert!(e.last_outcome().is_none());

        e.update_focus_score_at(t0() + Duration::seconds(120)).await;
        assert_eq!(e.current_streak(), 0.5);
    }

    #[tokio::test]
    async fn test_clean_code_champion_on_new_record() {
        let mut e = engine(Some(80.0));
        e.apply_at(
            FlowEvent::CodeMetrics(CodeMetricsSample {
                cohesion_score: Some(95.0),
                ..Default::default()
            }),
            t0(),
        );
        e.update_focus_score_at(t0() + Duration::seconds(30)).await;
        assert_eq!(e.achievements().len(), 1);
        assert_eq!(e.achievements()[0].kind, AchievementKind::CleanCodeChampion);
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let mut e = engine(Some(95.0));
        let old_session = e.session_id();
        e.apply_at(tab("a"), t0());
        e.apply_at(
            FlowEvent::BreakpointDelta {
                added: 3,
                removed: 0,
            },
            t0(),
        );
        e.update_focus_score_at(t0() + Duration::seconds(30)).await;
        assert_eq!(e.current_streak(), 0.5);

        let later = t0() + Duration::hours(1);
        e.reset_at(later);

        assert_ne!(e.session_id(), old_session);
        assert_eq!(e.focus_score(), 100.0);
        assert_eq!(e.current_streak(), 0.0);
        assert_eq!(e.longest_streak(), 0.0);
        assert!(e.achievements().is_empty());
        assert!(e.drain_notifications().is_empty());

        let view = e.live_view_at(later);
        assert_eq!(view.tab_metrics.total, 0);
        assert_eq!(view.breakpoint_count, 0);
        assert!(view.focus_history.is_empty());
        assert!(view.productivity_peaks.is_empty());
        assert_eq!(view.session_duration_min, 0.0);
    }

    #[test]
    fn test_apply_timed_uses_event_timestamp() {
        let mut e = engine(None);
        e.apply_timed(TimedEvent {
            timestamp: t0() + Duration::minutes(3),
            event: FlowEvent::Edit {
                inserted_lines: 1,
                removed_lines: 0,
                delta_ms: None,
            },
        });
        assert_eq!(e.recorder().times().idle_start, t0() + Duration::minutes(3));
    }
}
