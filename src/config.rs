//! Engine configuration
//!
//! Thresholds, weights, collaborator endpoints and timer intervals. Every
//! field has a default so a partial TOML (or JSON) document is enough to
//! override a single knob.

use crate::error::FlowError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Ordered focus-score buckets used for the productivity status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductivityThresholds {
    #[serde(default = "default_high")]
    pub high: f64,
    #[serde(default = "default_medium")]
    pub medium: f64,
    #[serde(default = "default_low")]
    pub low: f64,
}

impl Default for ProductivityThresholds {
    fn default() -> Self {
        Self {
            high: default_high(),
            medium: default_medium(),
            low: default_low(),
        }
    }
}

/// Weights for the code quality score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeQualitySettings {
    #[serde(default = "default_clean_code_score")]
    pub clean_code_score: f64,
    #[serde(default = "default_complexity_threshold")]
    pub complexity_threshold: f64,
    #[serde(default = "default_test_coverage_goal")]
    pub test_coverage_goal: f64,
    #[serde(default = "default_documentation_weight")]
    pub documentation_weight: f64,
}

impl Default for CodeQualitySettings {
    fn default() -> Self {
        Self {
            clean_code_score: default_clean_code_score(),
            complexity_threshold: default_complexity_threshold(),
            test_coverage_goal: default_test_coverage_goal(),
            documentation_weight: default_documentation_weight(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabMetricsSettings {
    /// Switches closer together than this count as rapid
    #[serde(default = "default_rapid_switch_threshold_ms")]
    pub rapid_switch_threshold_ms: u64,
}

impl Default for TabMetricsSettings {
    fn default() -> Self {
        Self {
            rapid_switch_threshold_ms: default_rapid_switch_threshold_ms(),
        }
    }
}

/// Remote focus-scoring model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringSettings {
    #[serde(default = "default_scoring_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_scoring_timeout_ms")]
    pub timeout_ms: u64,
    /// When false every tick takes the local fallback path
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            endpoint: default_scoring_endpoint(),
            timeout_ms: default_scoring_timeout_ms(),
            enabled: true,
        }
    }
}

impl ScoringSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Snapshot persistence collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistenceSettings {
    #[serde(default = "default_persistence_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_persist_interval_secs")]
    pub interval_secs: u64,
    /// Upper bound on one persistence request
    #[serde(default = "default_persist_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            endpoint: default_persistence_endpoint(),
            interval_secs: default_persist_interval_secs(),
            timeout_ms: default_persist_timeout_ms(),
        }
    }
}

impl PersistenceSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

/// Top-level engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSettings {
    #[serde(default = "default_focus_threshold")]
    pub focus_threshold: f64,
    #[serde(default = "default_break_interval_min")]
    pub break_interval_min: f64,
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    /// Languages that get a per-language error bucket
    #[serde(default = "default_supported_languages")]
    pub supported_languages: Vec<String>,
    #[serde(default)]
    pub productivity_thresholds: ProductivityThresholds,
    #[serde(default)]
    pub code_quality: CodeQualitySettings,
    #[serde(default)]
    pub tab_metrics: TabMetricsSettings,
    #[serde(default)]
    pub scoring: ScoringSettings,
    #[serde(default)]
    pub persistence: PersistenceSettings,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            focus_threshold: default_focus_threshold(),
            break_interval_min: default_break_interval_min(),
            refresh_interval_ms: default_refresh_interval_ms(),
            supported_languages: default_supported_languages(),
            productivity_thresholds: ProductivityThresholds::default(),
            code_quality: CodeQualitySettings::default(),
            tab_metrics: TabMetricsSettings::default(),
            scoring: ScoringSettings::default(),
            persistence: PersistenceSettings::default(),
        }
    }
}

impl FlowSettings {
    /// Parse settings from a TOML document.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, FlowError> {
        let settings: FlowSettings =
            toml::from_str(toml_str).map_err(|e| FlowError::ConfigError(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, FlowError> {
        let settings: FlowSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a file, picking the format from the extension
    /// (`.json` is JSON, anything else is TOML).
    pub fn load(path: &Path) -> Result<Self, FlowError> {
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_toml_str(&content),
        }
    }

    /// Serialize settings to pretty TOML.
    pub fn to_toml_string(&self) -> Result<String, FlowError> {
        toml::to_string_pretty(self).map_err(|e| FlowError::ConfigError(e.to_string()))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms.max(1))
    }

    fn validate(&self) -> Result<(), FlowError> {
        let t = &self.productivity_thresholds;
        if !(t.high >= t.medium && t.medium >= t.low) {
            return Err(FlowError::ConfigError(format!(
                "productivity thresholds must be ordered high >= medium >= low (got {} / {} / {})",
                t.high, t.medium, t.low
            )));
        }
        if !(0.0..=100.0).contains(&self.focus_threshold) {
            return Err(FlowError::ConfigError(format!(
                "focus_threshold must be within 0-100 (got {})",
                self.focus_threshold
            )));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}
fn default_focus_threshold() -> f64 {
    70.0
}
fn default_break_interval_min() -> f64 {
    45.0
}
fn default_high() -> f64 {
    80.0
}
fn default_medium() -> f64 {
    60.0
}
fn default_low() -> f64 {
    40.0
}
fn default_clean_code_score() -> f64 {
    0.2
}
fn default_complexity_threshold() -> f64 {
    10.0
}
fn default_test_coverage_goal() -> f64 {
    80.0
}
fn default_documentation_weight() -> f64 {
    0.3
}
fn default_rapid_switch_threshold_ms() -> u64 {
    4000
}
fn default_scoring_endpoint() -> String {
    "http://127.0.0.1:8000/predict/focus".to_string()
}
fn default_scoring_timeout_ms() -> u64 {
    2000
}
fn default_persistence_endpoint() -> String {
    "http://localhost:5000/api/save-session".to_string()
}
fn default_persist_interval_secs() -> u64 {
    300
}
fn default_persist_timeout_ms() -> u64 {
    5000
}
fn default_refresh_interval_ms() -> u64 {
    1000
}
fn default_supported_languages() -> Vec<String> {
    [
        "javascript",
        "typescript",
        "python",
        "java",
        "go",
        "rust",
        "php",
        "ruby",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
