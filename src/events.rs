//! Inbound event feed
//!
//! The editor collaborator delivers one `FlowEvent` per call, in arrival
//! order. Recorded sessions are stored as NDJSON where each line is a
//! `TimedEvent`:
//!
//! ```json
//! {"timestamp":"2024-03-01T09:00:00Z","event":{"event_type":"tab_switch","target":"src/main.rs"}}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FlowError;
use crate::types::{ClipboardOp, CodeAnalysis, Severity};

/// Closed set of developer-activity events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum FlowEvent {
    /// A text change in the active document
    Edit {
        #[serde(default)]
        inserted_lines: u32,
        #[serde(default)]
        removed_lines: u32,
        /// Milliseconds since the previous edit; derived by the engine when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delta_ms: Option<u64>,
    },
    /// A fresh diagnostics batch for one document
    Diagnostics {
        language_id: String,
        #[serde(default)]
        diagnostics: Vec<Diagnostic>,
    },
    /// The active editor changed
    TabSwitch { target: String },
    Clipboard { op: ClipboardOp },
    BreakpointDelta {
        #[serde(default)]
        added: u32,
        #[serde(default)]
        removed: u32,
    },
    /// The editor window lost focus
    WindowBlur,
    CodeMetrics(CodeMetricsSample),
    CodeAnalysis(CodeAnalysis),
}

impl FlowEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            FlowEvent::Edit { .. } => "edit",
            FlowEvent::Diagnostics { .. } => "diagnostics",
            FlowEvent::TabSwitch { .. } => "tab_switch",
            FlowEvent::Clipboard { .. } => "clipboard",
            FlowEvent::BreakpointDelta { .. } => "breakpoint_delta",
            FlowEvent::WindowBlur => "window_blur",
            FlowEvent::CodeMetrics(_) => "code_metrics",
            FlowEvent::CodeAnalysis(_) => "code_analysis",
        }
    }
}

/// Zero-based position in a document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticRange {
    pub start: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<Position>,
}

/// A diagnostic as delivered by the editor. Every field is optional on the
/// wire; the recorder drops entries without a message or range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub range: Option<DiagnosticRange>,
    #[serde(default)]
    pub source: Option<String>,
}

impl Diagnostic {
    /// Convenience constructor for a well-formed diagnostic.
    pub fn new(message: impl Into<String>, severity: Severity, line: u32, character: u32) -> Self {
        Self {
            message: Some(message.into()),
            severity: Some(severity),
            range: Some(DiagnosticRange {
                start: Position { line, character },
                end: None,
            }),
            source: None,
        }
    }
}

/// Static code measurements for the active document. Absent fields leave
/// the previous value untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeMetricsSample {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_complexity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_coverage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_lines: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub function_lengths: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cohesion_score: Option<f64>,
}

/// An event paired with the instant it happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedEvent {
    pub timestamp: DateTime<Utc>,
    pub event: FlowEvent,
}

/// Failed line of an event log
#[derive(Debug, Clone, PartialEq)]
pub struct LineError {
    /// 1-based line number
    pub line: usize,
    pub message: String,
}

/// Parser for recorded event logs
pub struct EventLog;

impl EventLog {
    /// Parse NDJSON (newline-delimited JSON) containing `TimedEvent`s.
    /// Stops at the first bad line.
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<TimedEvent>, FlowError> {
        let mut events = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<TimedEvent>(trimmed) {
                Ok(event) => events.push(event),
                Err(e) => {
                    return Err(FlowError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(events)
    }

    /// Parse a single line, `None` for blank lines.
    pub fn parse_line(line: &str) -> Result<Option<TimedEvent>, FlowError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(trimmed)?))
    }

    /// Report every line that fails to parse.
    pub fn validate_ndjson(ndjson: &str) -> Vec<LineError> {
        ndjson
            .lines()
            .enumerate()
            .filter_map(|(idx, line)| match Self::parse_line(line) {
                Ok(_) => None,
                Err(e) => Some(LineError {
                    line: idx + 1,
                    message: e.to_string(),
                }),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_tagged_events() {
        let ndjson = r#"{"timestamp":"2024-03-01T09:00:00Z","event":{"event_type":"tab_switch","target":"a.rs"}}
{"timestamp":"2024-03-01T09:00:01Z","event":{"event_type":"edit","inserted_lines":2,"removed_lines":0,"delta_ms":180}}

{"timestamp":"2024-03-01T09:00:02Z","event":{"event_type":"window_blur"}}
{"timestamp":"2024-03-01T09:00:03Z","event":{"event_type":"clipboard","op":"paste"}}"#;

        let events = EventLog::parse_ndjson(ndjson).unwrap();
        assert_eq!(events.len(), 4);
        assert_eq!(
            events[0].event,
            FlowEvent::TabSwitch {
                target: "a.rs".to_string()
            }
        );
        assert_eq!(
            events[1].event,
            FlowEvent::Edit {
                inserted_lines: 2,
                removed_lines: 0,
                delta_ms: Some(180)
            }
        );
        assert_eq!(events[2].event, FlowEvent::WindowBlur);
        assert_eq!(events[3].event.kind(), "clipboard");
    }

    #[test]
    fn test_parse_diagnostics_with_missing_fields() {
        let line = r#"{"timestamp":"2024-03-01T09:00:00Z","event":{"event_type":"diagnostics","language_id":"python","diagnostics":[{"message":"bad indentation","severity":"warning","range":{"start":{"line":3,"character":0}}},{"severity":"error"}]}}"#;

        let event = EventLog::parse_line(line).unwrap().unwrap();
        match event.event {
            FlowEvent::Diagnostics {
                language_id,
                diagnostics,
            } => {
                assert_eq!(language_id, "python");
                assert_eq!(diagnostics.len(), 2);
                assert_eq!(diagnostics[0].severity, Some(Severity::Warning));
                assert!(diagnostics[1].message.is_none());
                assert!(diagnostics[1].range.is_none());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_parse_code_metrics() {
        let line = r#"{"timestamp":"2024-03-01T09:00:00Z","event":{"event_type":"code_metrics","code_complexity":12.0,"function_lengths":[10,30]}}"#;
        let event = EventLog::parse_line(line).unwrap().unwrap();
        assert_eq!(
            event.event,
            FlowEvent::CodeMetrics(CodeMetricsSample {
                code_complexity: Some(12.0),
                function_lengths: vec![10, 30],
                ..Default::default()
            })
        );
    }

    #[test]
    fn test_parse_error_reports_line() {
        let ndjson = r#"{"timestamp":"2024-03-01T09:00:00Z","event":{"event_type":"window_blur"}}
{"timestamp":"2024-03-01T09:00:00Z","event":{"event_type":"teleport"}}"#;

        let err = EventLog::parse_ndjson(ndjson).unwrap_err();
        assert!(err.to_string().contains("line 2"));

        let failures = EventLog::validate_ndjson(ndjson);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].line, 2);
    }
}
