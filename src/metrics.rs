//! Rolling metric store
//!
//! Bounded windows fed by the recorder and scoring engine, plus the derived
//! read-only views computed over them.

use serde::{Deserialize, Serialize};

use crate::diagnostics::LanguageErrorBuckets;
use crate::types::{ErrorRecord, ErrorSummary, FocusSample, ProductivityTrend, SeverityCounts};
use crate::window::RollingWindow;

/// Typing intervals kept for rhythm analysis
pub const TYPING_WINDOW: usize = 30;
/// Error records kept in the log
pub const ERROR_LOG_CAPACITY: usize = 50;
/// Focus samples kept for trend and productivity score
pub const FOCUS_HISTORY_CAPACITY: usize = 60;
/// Slots in the tab pattern buffer
pub const TAB_PATTERN_SLOTS: usize = 3;
/// Records reported verbatim by the error summary
pub const RECENT_ERRORS: usize = 5;
/// Samples per half of the trend comparison
pub const TREND_SPAN: usize = 10;
/// Mean difference that counts as a trend
const TREND_DELTA: f64 = 5.0;

/// Result of classifying a full tab pattern buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TabPatternMatch {
    /// slot 0 equals slot 2 (A -> B -> A)
    pub back_and_forth: bool,
    /// all three slots differ (A -> B -> C)
    pub sequential: bool,
}

/// Last three navigated targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabPatternBuffer {
    slots: RollingWindow<String>,
}

impl Default for TabPatternBuffer {
    fn default() -> Self {
        Self {
            slots: RollingWindow::new(TAB_PATTERN_SLOTS),
        }
    }
}

impl TabPatternBuffer {
    /// Push a target and classify the buffer once it holds three entries.
    /// The two checks are evaluated independently.
    pub fn push(&mut self, target: &str) -> TabPatternMatch {
        self.slots.push(target.to_string());
        if !self.slots.is_full() {
            return TabPatternMatch::default();
        }

        let (a, b, c) = match (self.slots.get(0), self.slots.get(1), self.slots.get(2)) {
            (Some(a), Some(b), Some(c)) => (a, b, c),
            _ => return TabPatternMatch::default(),
        };

        TabPatternMatch {
            back_and_forth: a == c,
            sequential: a != b && b != c && a != c,
        }
    }

    pub fn targets(&self) -> Vec<String> {
        self.slots.to_vec()
    }
}

/// Bounded windows owned by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingMetricStore {
    pub(crate) typing_intervals: RollingWindow<f64>,
    pub(crate) error_log: RollingWindow<ErrorRecord>,
    pub(crate) language_errors: LanguageErrorBuckets,
    pub(crate) tab_patterns: TabPatternBuffer,
    pub(crate) focus_history: RollingWindow<FocusSample>,
}

impl RollingMetricStore {
    pub fn new(supported_languages: &[String]) -> Self {
        Self {
            typing_intervals: RollingWindow::new(TYPING_WINDOW),
            error_log: RollingWindow::new(ERROR_LOG_CAPACITY),
            language_errors: LanguageErrorBuckets::new(supported_languages),
            tab_patterns: TabPatternBuffer::default(),
            focus_history: RollingWindow::new(FOCUS_HISTORY_CAPACITY),
        }
    }

    /// Typing rhythm consistency in 0-100.
    ///
    /// Position-weighted variance over the last `TYPING_WINDOW` intervals,
    /// newer intervals weighing more. Fewer than two intervals reads as 100.
    pub fn typing_rhythm(&self) -> f64 {
        let intervals: Vec<f64> = self.typing_intervals.tail(TYPING_WINDOW).copied().collect();
        if intervals.len() < 2 {
            return 100.0;
        }

        let n = intervals.len() as f64;
        let mean = intervals.iter().sum::<f64>() / n;
        let weighted_variance = intervals
            .iter()
            .enumerate()
            .map(|(i, x)| {
                let weight = (i as f64 + 1.0) / n;
                weight * (x - mean).powi(2)
            })
            .sum::<f64>()
            / n;

        100.0 - (weighted_variance.sqrt() / 8.0).min(100.0)
    }

    /// Summary of the windowed error log.
    pub fn error_summary(&self) -> ErrorSummary {
        let mut by_severity = SeverityCounts::default();
        for record in self.error_log.iter() {
            by_severity.increment(record.severity);
        }

        ErrorSummary {
            total: self.error_log.len() as u32,
            by_severity,
            by_language: self.language_errors.non_zero(),
            recent: self.error_log.tail(RECENT_ERRORS).cloned().collect(),
        }
    }

    /// Mean of the focus history; 100 with no samples.
    pub fn productivity_score(&self) -> f64 {
        if self.focus_history.is_empty() {
            return 100.0;
        }
        let sum: f64 = self.focus_history.iter().map(|s| s.score).sum();
        sum / self.focus_history.len() as f64
    }

    /// Compare the newest `TREND_SPAN` samples against the span before them.
    pub fn productivity_trend(&self) -> ProductivityTrend {
        if self.focus_history.len() < TREND_SPAN * 2 {
            return ProductivityTrend::Stable;
        }

        let recent: Vec<f64> = self
            .focus_history
            .tail(TREND_SPAN * 2)
            .map(|s| s.score)
            .collect();
        let (previous, latest) = recent.split_at(TREND_SPAN);
        let delta = mean(latest) - mean(previous);

        if delta > TREND_DELTA {
            ProductivityTrend::Improving
        } else if delta < -TREND_DELTA {
            ProductivityTrend::Declining
        } else {
            ProductivityTrend::Stable
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Severity;
    use chrono::{Duration, TimeZone, Utc};

    fn store() -> RollingMetricStore {
        RollingMetricStore::new(&["javascript".to_string(), "python".to_string()])
    }

    fn push_scores(store: &mut RollingMetricStore, scores: &[f64]) {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        for (i, score) in scores.iter().enumerate() {
            store.focus_history.push(FocusSample {
                timestamp: start + Duration::seconds(i as i64),
                score: *score,
            });
        }
    }

    #[test]
    fn test_typing_rhythm_needs_two_samples() {
        let mut s = store();
        assert_eq!(s.typing_rhythm(), 100.0);
        s.typing_intervals.push(250.0);
        assert_eq!(s.typing_rhythm(), 100.0);
    }

    #[test]
    fn test_typing_rhythm_constant_intervals() {
        let mut s = store();
        for _ in 0..10 {
            s.typing_intervals.push(200.0);
        }
        assert_eq!(s.typing_rhythm(), 100.0);
    }

    #[test]
    fn test_typing_rhythm_weighted_variance() {
        let mut s = store();
        s.typing_intervals.push(100.0);
        s.typing_intervals.push(300.0);
        // mean 200, weights 0.5 and 1.0, variance (0.5*10000 + 1.0*10000) / 2 = 7500
        let expected = 100.0 - 7500f64.sqrt() / 8.0;
        assert!((s.typing_rhythm() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_typing_rhythm_floor() {
        let mut s = store();
        s.typing_intervals.push(0.0);
        s.typing_intervals.push(4_999.0);
        s.typing_intervals.push(0.0);
        s.typing_intervals.push(4_999.0);
        let rhythm = s.typing_rhythm();
        assert!((0.0..100.0).contains(&rhythm));
    }

    #[test]
    fn test_tab_pattern_back_and_forth() {
        let mut buffer = TabPatternBuffer::default();
        assert_eq!(buffer.push("A"), TabPatternMatch::default());
        assert_eq!(buffer.push("B"), TabPatternMatch::default());
        let m = buffer.push("A");
        assert!(m.back_and_forth);
        assert!(!m.sequential);
    }

    #[test]
    fn test_tab_pattern_sequential_and_eviction() {
        let mut buffer = TabPatternBuffer::default();
        buffer.push("A");
        buffer.push("B");
        assert!(buffer.push("C").sequential);

        // Buffer is now B, C, B
        let m = buffer.push("B");
        assert!(m.back_and_forth);
        assert_eq!(buffer.targets(), vec!["B", "C", "B"]);
    }

    #[test]
    fn test_tab_pattern_repeated_target() {
        let mut buffer = TabPatternBuffer::default();
        buffer.push("A");
        buffer.push("A");
        let m = buffer.push("B");
        assert!(!m.back_and_forth);
        assert!(!m.sequential);
    }

    #[test]
    fn test_error_summary_recent_and_severity() {
        let mut s = store();
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        for i in 0..7 {
            let severity = if i % 2 == 0 {
                Severity::Error
            } else {
                Severity::Warning
            };
            s.error_log.push(ErrorRecord {
                timestamp: at,
                message: format!("error {}", i),
                severity,
                line: 1,
                column: 1,
                source: "javascript".to_string(),
                language_id: "javascript".to_string(),
            });
        }

        let summary = s.error_summary();
        assert_eq!(summary.total, 7);
        assert_eq!(summary.by_severity.error, 4);
        assert_eq!(summary.by_severity.warning, 3);
        assert_eq!(summary.recent.len(), 5);
        assert_eq!(summary.recent[0].message, "error 2");
        assert_eq!(summary.recent[4].message, "error 6");
    }

    #[test]
    fn test_error_log_is_bounded() {
        let mut s = store();
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        for i in 0..(ERROR_LOG_CAPACITY + 10) {
            s.error_log.push(ErrorRecord {
                timestamp: at,
                message: format!("error {}", i),
                severity: Severity::Info,
                line: 1,
                column: 1,
                source: "python".to_string(),
                language_id: "python".to_string(),
            });
        }
        assert_eq!(s.error_summary().total, ERROR_LOG_CAPACITY as u32);
    }

    #[test]
    fn test_trend_requires_twenty_samples() {
        let mut s = store();
        push_scores(&mut s, &[10.0; 19]);
        assert_eq!(s.productivity_trend(), ProductivityTrend::Stable);
    }

    #[test]
    fn test_trend_directions() {
        let mut improving = store();
        let mut scores = vec![50.0; 10];
        scores.extend(vec![70.0; 10]);
        push_scores(&mut improving, &scores);
        assert_eq!(improving.productivity_trend(), ProductivityTrend::Improving);

        let mut declining = store();
        scores.reverse();
        push_scores(&mut declining, &scores);
        assert_eq!(declining.productivity_trend(), ProductivityTrend::Declining);

        let mut stable = store();
        let mut scores = vec![50.0; 10];
        scores.extend(vec![54.0; 10]);
        push_scores(&mut stable, &scores);
        assert_eq!(stable.productivity_trend(), ProductivityTrend::Stable);
    }

    #[test]
    fn test_productivity_score_mean() {
        let mut s = store();
        assert_eq!(s.productivity_score(), 100.0);
        push_scores(&mut s, &[80.0, 60.0]);
        assert_eq!(s.productivity_score(), 70.0);
    }
}
