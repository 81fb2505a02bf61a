//! Focus and code quality scoring
//!
//! A scoring tick asks a `FocusScorer` once. If the call fails, times out
//! or returns garbage, the local heuristic answers for that tick and the
//! outcome says which path produced the number.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::{CodeQualitySettings, ScoringSettings};
use crate::error::ScoringError;
use crate::recorder::CodeMetricsState;

/// Function length above which the quality score is penalized
const FUNCTION_LENGTH_BUDGET: f64 = 20.0;

/// Request sent to the remote focus model. Durations are in minutes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringRequest {
    pub current_streak: f64,
    pub longest_streak: f64,
    pub session_duration: f64,
    pub active_file_duration: f64,
    pub idle_time: f64,
    pub typing_rhythm: f64,
}

/// Response of the remote focus model
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringResponse {
    #[serde(rename = "focusScore", alias = "Gradient Boosting Regression")]
    pub focus_score: f64,
}

/// Which path produced a focus score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreOutcome {
    /// Adopted from the remote model
    Scored(f64),
    /// Computed locally after the remote call failed
    Fallback(f64),
}

impl ScoreOutcome {
    pub fn value(&self) -> f64 {
        match self {
            ScoreOutcome::Scored(v) | ScoreOutcome::Fallback(v) => *v,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, ScoreOutcome::Fallback(_))
    }
}

/// Source of remote focus scores
#[async_trait]
pub trait FocusScorer: Send + Sync {
    /// Scorer name for logs
    fn name(&self) -> &str;

    /// Score one request. Called at most once per tick.
    async fn score(&self, request: &ScoringRequest) -> Result<f64, ScoringError>;
}

/// Focus model reached over HTTP.
pub struct HttpFocusScorer {
    client: Client,
    endpoint: String,
}

impl HttpFocusScorer {
    pub fn new(settings: &ScoringSettings) -> Result<Self, ScoringError> {
        let client = Client::builder().timeout(settings.timeout()).build()?;
        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl FocusScorer for HttpFocusScorer {
    fn name(&self) -> &str {
        "http"
    }

    async fn score(&self, request: &ScoringRequest) -> Result<f64, ScoringError> {
        let response = self.client.post(&self.endpoint).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScoringError::HttpStatus(status.as_u16()));
        }

        let body = response.text().await?;
        let parsed: ScoringResponse = serde_json::from_str(&body)
            .map_err(|e| ScoringError::MalformedResponse(e.to_string()))?;
        Ok(parsed.focus_score)
    }
}

/// Scorer used when remote scoring is disabled. Every tick falls back.
pub struct OfflineScorer;

#[async_trait]
impl FocusScorer for OfflineScorer {
    fn name(&self) -> &str {
        "offline"
    }

    async fn score(&self, _request: &ScoringRequest) -> Result<f64, ScoringError> {
        Err(ScoringError::Offline)
    }
}

/// Build the scorer described by the settings. An HTTP client that cannot
/// be constructed degrades to the offline scorer.
pub fn scorer_from_settings(settings: &ScoringSettings) -> Arc<dyn FocusScorer> {
    if !settings.enabled {
        return Arc::new(OfflineScorer);
    }
    match HttpFocusScorer::new(settings) {
        Ok(scorer) => Arc::new(scorer),
        Err(e) => {
            warn!("Remote scoring unavailable, using local heuristic only: {}", e);
            Arc::new(OfflineScorer)
        }
    }
}

/// Inputs of the local focus heuristic
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallbackInputs {
    pub idle_minutes: f64,
    pub current_streak: f64,
    pub tab_switches: u32,
    pub window_switches: u32,
}

/// Local focus heuristic, clamped to 0-100.
pub fn fallback_focus_score(inputs: &FallbackInputs) -> f64 {
    let score = 100.0 - inputs.idle_minutes * 2.0 + inputs.current_streak * 0.5
        - inputs.tab_switches as f64 * 0.2
        - inputs.window_switches as f64 * 0.5;
    score.clamp(0.0, 100.0)
}

/// Run one scoring tick: a single remote attempt bounded by `timeout`,
/// then the heuristic on any failure.
pub async fn score_tick(
    scorer: &dyn FocusScorer,
    request: &ScoringRequest,
    fallback: &FallbackInputs,
    timeout: Duration,
) -> ScoreOutcome {
    let error = match tokio::time::timeout(timeout, scorer.score(request)).await {
        Ok(Ok(score)) if score.is_finite() => {
            debug!("Focus score {:.1} from {} scorer", score, scorer.name());
            return ScoreOutcome::Scored(score.clamp(0.0, 100.0));
        }
        Ok(Ok(score)) => ScoringError::MalformedResponse(format!("non-finite score {}", score)),
        Ok(Err(e)) => e,
        Err(_) => ScoringError::Timeout(timeout.as_millis() as u64),
    };

    let score = fallback_focus_score(fallback);
    match error {
        ScoringError::Offline => debug!("Focus score {:.1} from local heuristic", score),
        e => warn!(
            "{} scorer failed ({}), using local heuristic: {:.1}",
            scorer.name(),
            e,
            score
        ),
    }
    ScoreOutcome::Fallback(score)
}

/// Code quality score in 0-100.
pub fn code_quality_score(
    code: &CodeMetricsState,
    lines_added: u32,
    settings: &CodeQualitySettings,
) -> f64 {
    let mut score = 100.0;

    score -= (code.code_complexity - settings.complexity_threshold).max(0.0);

    if code.test_coverage < settings.test_coverage_goal {
        score -= (settings.test_coverage_goal - code.test_coverage) * 0.5;
    }

    let comment_ratio = code.comment_lines as f64 / lines_added.max(1) as f64;
    score += (comment_ratio - settings.clean_code_score) * settings.documentation_weight * 100.0;

    score -= (code.average_function_length() - FUNCTION_LENGTH_BUDGET).max(0.0) * 0.5;

    score.clamp(0.0, 100.0)
}
