//! Shared data types
//!
//! Records produced by the recorder, the scoring engine and the policy layer,
//! plus the `FlowSnapshot` read-model handed to presentation and persistence
//! collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::diagnostics::ErrorCategory;

/// Diagnostic severity as reported by the editor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    #[serde(alias = "information", alias = "hint")]
    Info,
}

/// One diagnostic as it entered the error log. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub severity: Severity,
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub column: u32,
    /// Diagnostic source, falling back to the language id
    pub source: String,
    pub language_id: String,
}

/// Clipboard operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipboardOp {
    Copy,
    Cut,
    Paste,
}

/// Metadata of the most recent clipboard operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipboardOperation {
    pub kind: ClipboardOp,
    pub timestamp: DateTime<Utc>,
}

/// Clipboard counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CopyPasteMetrics {
    pub total: u32,
    pub copy: u32,
    pub cut: u32,
    pub paste: u32,
    pub last_operation: Option<ClipboardOperation>,
}

/// Tab navigation pattern counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabPatterns {
    /// A -> B -> A
    pub back_and_forth: u32,
    /// A -> B -> C
    pub sequential: u32,
}

/// Tab switching summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabMetrics {
    pub total: u32,
    pub rapid: u32,
    pub patterns: TabPatterns,
}

/// Error log counts by severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub error: u32,
    pub warning: u32,
    pub info: u32,
}

impl SeverityCounts {
    pub fn increment(&mut self, severity: Severity) {
        match severity {
            Severity::Error => self.error += 1,
            Severity::Warning => self.warning += 1,
            Severity::Info => self.info += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.error + self.warning + self.info
    }
}

/// Summary of the windowed error log
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorSummary {
    /// Records currently held in the error log
    pub total: u32,
    pub by_severity: SeverityCounts,
    /// Only languages with at least one non-zero bucket
    pub by_language: BTreeMap<String, BTreeMap<ErrorCategory, u32>>,
    /// The 5 most recent records, oldest first
    pub recent: Vec<ErrorRecord>,
}

/// A scored point on the focus history
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FocusSample {
    pub timestamp: DateTime<Utc>,
    pub score: f64,
}

/// A streak that ended; `duration` is the streak length in minutes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FocusDip {
    pub timestamp: DateTime<Utc>,
    pub duration: f64,
}

/// A focus score above the peak threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProductivityPeak {
    pub timestamp: DateTime<Utc>,
    pub score: f64,
}

/// Closed set of achievements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AchievementKind {
    /// Sustained focus streak
    FlowMaster,
    /// Repeated productivity peaks
    ProductivityGuru,
    /// High code cohesion
    CleanCodeChampion,
}

impl AchievementKind {
    pub fn description(&self) -> &'static str {
        match self {
            AchievementKind::FlowMaster => "30+ minutes of sustained focus!",
            AchievementKind::ProductivityGuru => "Achieved 3 productivity peaks in one session!",
            AchievementKind::CleanCodeChampion => "Maintained high code quality standards!",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Achievement {
    #[serde(rename = "type")]
    pub kind: AchievementKind,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

impl Achievement {
    pub fn new(kind: AchievementKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            description: kind.description().to_string(),
            timestamp,
        }
    }
}

/// One-shot notifications for presentation collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    AchievementUnlocked { achievement: Achievement },
    BreakSuggested { timestamp: DateTime<Utc> },
}

/// Focus-score bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductivityStatus {
    #[serde(rename = "Flow State")]
    FlowState,
    #[serde(rename = "In The Zone")]
    InTheZone,
    #[serde(rename = "Focused")]
    Focused,
    #[serde(rename = "Getting Started")]
    GettingStarted,
}

impl ProductivityStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ProductivityStatus::FlowState => "Flow State",
            ProductivityStatus::InTheZone => "In The Zone",
            ProductivityStatus::Focused => "Focused",
            ProductivityStatus::GettingStarted => "Getting Started",
        }
    }
}

/// Direction of the focus history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductivityTrend {
    Improving,
    Stable,
    Declining,
}

/// Clean-code inputs fed by code metrics events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanCodeMetrics {
    pub code_complexity: f64,
    pub test_coverage: f64,
    pub comment_lines: u32,
    pub average_function_length: f64,
    pub cohesion_score: f64,
}

// ============================================================================
// Code analysis record (produced by the external code reviewer)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisProblem {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub functionality: String,
    #[serde(default)]
    pub complexity: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisComplexity {
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub space: String,
}

/// Reviewer quality scores, each 0-100
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisQuality {
    #[serde(default)]
    pub readability: f64,
    #[serde(default)]
    pub maintainability: f64,
    #[serde(default)]
    pub modularity: f64,
    #[serde(default)]
    pub documentation: f64,
    #[serde(default)]
    pub error_handling: f64,
    #[serde(default)]
    pub duplication: f64,
}

/// Reviewer error-risk estimates, each 0-100
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisErrorRisk {
    #[serde(default)]
    pub type_error_risk: f64,
    #[serde(default)]
    pub reference_error_risk: f64,
    #[serde(default)]
    pub syntax_error_risk: f64,
    #[serde(default)]
    pub most_likely_error: Option<String>,
}

/// Fixed-shape analysis record. Carried opaquely into snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeAnalysis {
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub problem: AnalysisProblem,
    #[serde(default)]
    pub complexity: AnalysisComplexity,
    #[serde(default)]
    pub quality: AnalysisQuality,
    #[serde(default)]
    pub errors: AnalysisErrorRisk,
}

// ============================================================================
// Snapshot
// ============================================================================

/// Point-in-time read-model of all engine state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSnapshot {
    pub session_id: String,
    pub computed_at: DateTime<Utc>,

    // Scores
    pub focus_score: f64,
    pub productivity_score: f64,
    pub code_quality_score: f64,
    pub typing_rhythm: f64,
    pub productivity_status: ProductivityStatus,
    pub productivity_trend: ProductivityTrend,
    pub needs_break: bool,

    // Streaks
    pub current_streak: f64,
    pub longest_streak: f64,

    // Durations (minutes)
    pub session_duration_min: f64,
    pub active_file_duration_min: f64,
    pub idle_time_min: f64,

    // Activity counters
    pub file_edits: u32,
    pub command_count: u32,
    pub lines_added: u32,
    pub lines_deleted: u32,
    pub window_switches: u32,
    pub breakpoint_count: u32,
    pub tab_metrics: TabMetrics,
    pub copy_paste_metrics: CopyPasteMetrics,

    // Diagnostics from the latest batch
    pub error_count: u32,
    pub warning_count: u32,
    pub problem_count: u32,
    pub dropped_diagnostics: u32,
    pub error_summary: ErrorSummary,

    // Code quality inputs
    pub clean_code_metrics: CleanCodeMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_code_analysis: Option<CodeAnalysis>,

    // History
    pub focus_history: Vec<FocusSample>,
    pub productivity_peaks: Vec<ProductivityPeak>,
    pub focus_dips: Vec<FocusDip>,
    pub achievements: Vec<Achievement>,
}
