//! Event recorder
//!
//! One mutator per event kind. Each runs in O(1) plus bounded window
//! maintenance and never fails: malformed input is dropped and counted,
//! counters that would go negative are clamped.

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::FlowSettings;
use crate::events::{CodeMetricsSample, Diagnostic};
use crate::metrics::RollingMetricStore;
use crate::types::{
    ClipboardOp, ClipboardOperation, CleanCodeMetrics, CodeAnalysis, CopyPasteMetrics,
    ErrorRecord, Severity, TabMetrics,
};
use crate::window::RollingWindow;

/// Gaps at or above this are pauses, not typing rhythm
pub const CONTINUOUS_TYPING_GAP_MS: u64 = 5000;
/// Function lengths kept for the average
const FUNCTION_LENGTH_WINDOW: usize = 100;

/// Milliseconds from `from` to `to`, zero if `to` is earlier.
pub(crate) fn millis_between(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    (to - from).num_milliseconds().max(0) as u64
}

/// Minutes from `from` to `to`, zero if `to` is earlier.
pub(crate) fn minutes_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    millis_between(from, to) as f64 / 60_000.0
}

/// Session timestamps. Reset together by `EventRecorder::new`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionTimes {
    pub session_start: DateTime<Utc>,
    pub active_file_start: DateTime<Utc>,
    pub idle_start: DateTime<Utc>,
    pub last_type_time: Option<DateTime<Utc>>,
    pub last_tab_switch_time: DateTime<Utc>,
}

impl SessionTimes {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            session_start: at,
            active_file_start: at,
            idle_start: at,
            last_type_time: None,
            last_tab_switch_time: at,
        }
    }

    pub fn session_minutes(&self, now: DateTime<Utc>) -> f64 {
        minutes_between(self.session_start, now)
    }

    pub fn active_file_minutes(&self, now: DateTime<Utc>) -> f64 {
        minutes_between(self.active_file_start, now)
    }

    pub fn idle_minutes(&self, now: DateTime<Utc>) -> f64 {
        minutes_between(self.idle_start, now)
    }
}

/// Raw activity counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityCounters {
    pub file_edits: u32,
    pub command_count: u32,
    pub lines_added: u32,
    pub lines_deleted: u32,
    pub tab: TabMetrics,
    pub window_switches: u32,
    pub breakpoint_count: u32,
    pub clipboard: CopyPasteMetrics,
    /// Counts from the latest diagnostics batch
    pub error_count: u32,
    pub warning_count: u32,
    pub problem_count: u32,
    pub dropped_diagnostics: u32,
}

/// Inputs for the code quality score
#[derive(Debug, Clone, PartialEq)]
pub struct CodeMetricsState {
    pub code_complexity: f64,
    pub test_coverage: f64,
    pub comment_lines: u32,
    pub function_lengths: RollingWindow<u32>,
    pub cohesion_score: f64,
    pub last_analysis: Option<CodeAnalysis>,
}

impl Default for CodeMetricsState {
    fn default() -> Self {
        Self {
            code_complexity: 0.0,
            test_coverage: 0.0,
            comment_lines: 0,
            function_lengths: RollingWindow::new(FUNCTION_LENGTH_WINDOW),
            cohesion_score: 0.0,
            last_analysis: None,
        }
    }
}

impl CodeMetricsState {
    pub fn average_function_length(&self) -> f64 {
        if self.function_lengths.is_empty() {
            return 0.0;
        }
        let total: u64 = self.function_lengths.iter().map(|n| *n as u64).sum();
        total as f64 / self.function_lengths.len() as f64
    }

    pub fn clean_code_metrics(&self) -> CleanCodeMetrics {
        CleanCodeMetrics {
            code_complexity: self.code_complexity,
            test_coverage: self.test_coverage,
            comment_lines: self.comment_lines,
            average_function_length: self.average_function_length(),
            cohesion_score: self.cohesion_score,
        }
    }
}

/// Owns the session clock, raw counters and rolling windows.
#[derive(Debug, Clone)]
pub struct EventRecorder {
    pub(crate) times: SessionTimes,
    pub(crate) counters: ActivityCounters,
    pub(crate) store: RollingMetricStore,
    pub(crate) code: CodeMetricsState,
    rapid_switch_threshold_ms: u64,
}

impl EventRecorder {
    pub fn new(settings: &FlowSettings, at: DateTime<Utc>) -> Self {
        Self {
            times: SessionTimes::new(at),
            counters: ActivityCounters::default(),
            store: RollingMetricStore::new(&settings.supported_languages),
            code: CodeMetricsState::default(),
            rapid_switch_threshold_ms: settings.tab_metrics.rapid_switch_threshold_ms,
        }
    }

    pub fn times(&self) -> &SessionTimes {
        &self.times
    }

    pub fn counters(&self) -> &ActivityCounters {
        &self.counters
    }

    pub fn store(&self) -> &RollingMetricStore {
        &self.store
    }

    pub fn code(&self) -> &CodeMetricsState {
        &self.code
    }

    /// Record a text change. The interval since the previous edit is taken
    /// from `delta_ms`, or from the last edit time when absent.
    pub fn record_edit(
        &mut self,
        inserted_lines: u32,
        removed_lines: u32,
        delta_ms: Option<u64>,
        at: DateTime<Utc>,
    ) {
        let delta = delta_ms.or_else(|| self.times.last_type_time.map(|t| millis_between(t, at)));
        if let Some(delta) = delta {
            if delta < CONTINUOUS_TYPING_GAP_MS {
                self.store.typing_intervals.push(delta as f64);
            }
        }

        let c = &mut self.counters;
        c.file_edits = c.file_edits.saturating_add(1);
        c.command_count = c.command_count.saturating_add(1);
        c.lines_added = c.lines_added.saturating_add(inserted_lines);
        c.lines_deleted = c.lines_deleted.saturating_add(removed_lines);

        self.times.last_type_time = Some(at);
        self.times.idle_start = at;
    }

    /// Record a diagnostics batch for one document. Entries without a
    /// message or range are dropped.
    ///
    /// A missing severity is intentionally counted as an error, both in the
    /// batch counters and in the error log.
    pub fn record_diagnostics(
        &mut self,
        language_id: &str,
        diagnostics: &[Diagnostic],
        at: DateTime<Utc>,
    ) {
        let mut batch_errors = 0u32;
        let mut batch_warnings = 0u32;
        let mut batch_problems = 0u32;

        for diagnostic in diagnostics {
            let (message, range) = match (&diagnostic.message, &diagnostic.range) {
                (Some(message), Some(range)) => (message, range),
                _ => {
                    self.counters.dropped_diagnostics =
                        self.counters.dropped_diagnostics.saturating_add(1);
                    debug!(
                        "Dropping malformed {} diagnostic (message: {}, range: {})",
                        language_id,
                        diagnostic.message.is_some(),
                        diagnostic.range.is_some()
                    );
                    continue;
                }
            };

            let severity = diagnostic.severity.unwrap_or(Severity::Error);
            match severity {
                Severity::Error => batch_errors += 1,
                Severity::Warning => batch_warnings += 1,
                Severity::Info => {}
            }
            batch_problems += 1;

            self.store.error_log.push(ErrorRecord {
                timestamp: at,
                message: message.clone(),
                severity,
                line: range.start.line.saturating_add(1),
                column: range.start.character.saturating_add(1),
                source: diagnostic
                    .source
                    .clone()
                    .unwrap_or_else(|| language_id.to_string()),
                language_id: language_id.to_string(),
            });

            self.store.language_errors.record(language_id, message);
        }

        self.counters.error_count = batch_errors;
        self.counters.warning_count = batch_warnings;
        self.counters.problem_count = batch_problems;
    }

    /// Record a switch of the active editor.
    pub fn record_tab_switch(&mut self, target: &str, at: DateTime<Utc>) {
        let elapsed = millis_between(self.times.last_tab_switch_time, at);
        let tab = &mut self.counters.tab;
        tab.total = tab.total.saturating_add(1);
        if elapsed < self.rapid_switch_threshold_ms {
            tab.rapid = tab.rapid.saturating_add(1);
        }

        let pattern = self.store.tab_patterns.push(target);
        if pattern.back_and_forth {
            tab.patterns.back_and_forth = tab.patterns.back_and_forth.saturating_add(1);
        }
        if pattern.sequential {
            tab.patterns.sequential = tab.patterns.sequential.saturating_add(1);
        }

        self.times.last_tab_switch_time = at;
        self.times.active_file_start = at;
    }

    pub fn record_clipboard_op(&mut self, op: ClipboardOp, at: DateTime<Utc>) {
        let clipboard = &mut self.counters.clipboard;
        clipboard.total = clipboard.total.saturating_add(1);
        match op {
            ClipboardOp::Copy => clipboard.copy = clipboard.copy.saturating_add(1),
            ClipboardOp::Cut => clipboard.cut = clipboard.cut.saturating_add(1),
            ClipboardOp::Paste => clipboard.paste = clipboard.paste.saturating_add(1),
        }
        clipboard.last_operation = Some(ClipboardOperation {
            kind: op,
            timestamp: at,
        });
    }

    /// Adjust the breakpoint counter, clamped at zero.
    pub fn record_breakpoint_delta(&mut self, added: u32, removed: u32) {
        self.counters.breakpoint_count = self
            .counters
            .breakpoint_count
            .saturating_add(added)
            .saturating_sub(removed);
    }

    pub fn record_window_blur(&mut self) {
        self.counters.window_switches = self.counters.window_switches.saturating_add(1);
    }

    pub fn record_code_metrics(&mut self, sample: &CodeMetricsSample) {
        let code = &mut self.code;
        if let Some(complexity) = sample.code_complexity {
            code.code_complexity = complexity.max(0.0);
        }
        if let Some(coverage) = sample.test_coverage {
            code.test_coverage = coverage.clamp(0.0, 100.0);
        }
        if let Some(comment_lines) = sample.comment_lines {
            code.comment_lines = comment_lines;
        }
        for length in &sample.function_lengths {
            code.function_lengths.push(*length);
        }
        if let Some(cohesion) = sample.cohesion_score {
            code.cohesion_score = cohesion.clamp(0.0, 100.0);
        }
    }

    pub fn record_code_analysis(&mut self, analysis: CodeAnalysis) {
        self.code.last_analysis = Some(analysis);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn recorder() -> EventRecorder {
        EventRecorder::new(&FlowSettings::default(), t0())
    }

    #[test]
    fn test_edit_records_continuous_typing_only() {
        let mut r = recorder();
        r.record_edit(1, 0, Some(200), t0());
        r.record_edit(0, 2, Some(6_000), t0());
        r.record_edit(3, 0, Some(4_999), t0());

        assert_eq!(r.store.typing_intervals.to_vec(), vec![200.0, 4_999.0]);
        assert_eq!(r.counters.file_edits, 3);
        assert_eq!(r.counters.command_count, 3);
        assert_eq!(r.counters.lines_added, 4);
        assert_eq!(r.counters.lines_deleted, 2);
    }

    #[test]
    fn test_edit_derives_interval_and_resets_idle() {
        let mut r = recorder();
        let first = t0() + Duration::minutes(3);
        r.record_edit(1, 0, None, first);
        // No previous edit, nothing to derive
        assert!(r.store.typing_intervals.is_empty());
        assert_eq!(r.times.idle_start, first);

        r.record_edit(1, 0, None, first + Duration::milliseconds(350));
        assert_eq!(r.store.typing_intervals.to_vec(), vec![350.0]);
        assert_eq!(r.times.idle_minutes(first + Duration::milliseconds(350)), 0.0);
    }

    #[test]
    fn test_rapid_switches_never_exceed_total() {
        let mut r = recorder();
        let offsets = [1, 2, 10, 11, 30, 31, 32, 90];
        for (i, secs) in offsets.iter().enumerate() {
            let before = r.counters.tab.rapid;
            r.record_tab_switch(&format!("file{}", i % 3), t0() + Duration::seconds(*secs));
            assert!(r.counters.tab.rapid >= before);
            assert!(r.counters.tab.rapid <= r.counters.tab.total);
        }
        assert_eq!(r.counters.tab.total, 8);
        // 1s after start, then 1s gaps at 2, 11, 31, 32
        assert_eq!(r.counters.tab.rapid, 5);
    }

    #[test]
    fn test_tab_switch_patterns() {
        let mut r = recorder();
        for (i, target) in ["A", "B", "A"].iter().enumerate() {
            r.record_tab_switch(target, t0() + Duration::seconds(10 * i as i64));
        }
        assert_eq!(r.counters.tab.patterns.back_and_forth, 1);
        assert_eq!(r.counters.tab.patterns.sequential, 0);

        r.record_tab_switch("C", t0() + Duration::seconds(40));
        // Buffer is B, A, C
        assert_eq!(r.counters.tab.patterns.sequential, 1);
    }

    #[test]
    fn test_breakpoint_counter_clamps() {
        let mut r = recorder();
        r.record_breakpoint_delta(2, 0);
        r.record_breakpoint_delta(0, 5);
        assert_eq!(r.counters.breakpoint_count, 0);
        r.record_breakpoint_delta(3, 1);
        assert_eq!(r.counters.breakpoint_count, 2);
        r.record_breakpoint_delta(u32::MAX, u32::MAX);
        assert_eq!(r.counters.breakpoint_count, 0);
    }

    #[test]
    fn test_diagnostics_recording() {
        let mut r = recorder();
        let diagnostics = vec![
            Diagnostic::new("x is not defined", Severity::Error, 0, 0),
            Diagnostic::new("Unexpected token", Severity::Warning, 4, 7),
            Diagnostic {
                message: Some("no range".to_string()),
                ..Default::default()
            },
            Diagnostic {
                message: Some("missing severity".to_string()),
                range: Diagnostic::new("", Severity::Info, 1, 1).range,
                ..Default::default()
            },
        ];
        r.record_diagnostics("javascript", &diagnostics, t0());

        assert_eq!(r.counters.dropped_diagnostics, 1);
        assert_eq!(r.counters.error_count, 2);
        assert_eq!(r.counters.warning_count, 1);
        assert_eq!(r.counters.problem_count, 3);

        let first = r.store.error_log.get(0).unwrap();
        assert_eq!(first.line, 1);
        assert_eq!(first.column, 1);
        assert_eq!(first.source, "javascript");

        let second = r.store.error_log.get(1).unwrap();
        assert_eq!((second.line, second.column), (5, 8));

        // Latest batch semantics
        r.record_diagnostics("javascript", &[], t0());
        assert_eq!(r.counters.error_count, 0);
        assert_eq!(r.store.error_log.len(), 3);
    }

    #[test]
    fn test_missing_severity_logged_as_error() {
        let mut r = recorder();
        let diagnostic = Diagnostic {
            severity: None,
            ..Diagnostic::new("Cannot find name 'foo'", Severity::Info, 2, 0)
        };
        r.record_diagnostics("typescript", &[diagnostic], t0());

        assert_eq!(r.counters.error_count, 1);
        assert_eq!(r.store.error_log.get(0).unwrap().severity, Severity::Error);
        assert_eq!(r.store.error_summary().by_severity.error, 1);
    }

    #[test]
    fn test_unsupported_language_counts_in_totals() {
        let mut r = recorder();
        r.record_diagnostics(
            "cobol",
            &[Diagnostic::new("PICTURE clause invalid", Severity::Error, 0, 0)],
            t0(),
        );
        let summary = r.store.error_summary();
        assert_eq!(summary.total, 1);
        assert_eq!(summary.by_severity.error, 1);
        assert!(summary.by_language.is_empty());
    }

    #[test]
    fn test_clipboard_ops() {
        let mut r = recorder();
        r.record_clipboard_op(ClipboardOp::Copy, t0());
        r.record_clipboard_op(ClipboardOp::Paste, t0());
        r.record_clipboard_op(ClipboardOp::Paste, t0() + Duration::seconds(5));

        let clipboard = &r.counters.clipboard;
        assert_eq!(clipboard.total, 3);
        assert_eq!(clipboard.copy, 1);
        assert_eq!(clipboard.cut, 0);
        assert_eq!(clipboard.paste, 2);
        assert_eq!(
            clipboard.last_operation,
            Some(ClipboardOperation {
                kind: ClipboardOp::Paste,
                timestamp: t0() + Duration::seconds(5)
            })
        );
    }

    #[test]
    fn test_code_metrics_partial_update() {
        let mut r = recorder();
        r.record_code_metrics(&CodeMetricsSample {
            code_complexity: Some(14.0),
            function_lengths: vec![10, 30],
            ..Default::default()
        });
        r.record_code_metrics(&CodeMetricsSample {
            test_coverage: Some(65.0),
            ..Default::default()
        });

        assert_eq!(r.code.code_complexity, 14.0);
        assert_eq!(r.code.test_coverage, 65.0);
        assert_eq!(r.code.average_function_length(), 20.0);
    }
}
