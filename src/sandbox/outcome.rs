//! @ai:module:intent Outcome of a single sandboxed attempt and its classification
//! @ai:module:layer domain
//! @ai:module:public_api AttemptOutcome, OutcomeKind
//! @ai:module:stateless true

use crate::metrics::TestStatus;
use serde::Deserialize;
use std::time::Duration;

/// Marker line the harness prints before its JSON outcome
pub const OUTCOME_SENTINEL: &str = "__ZERG_OUTCOME__";

/// @ai:intent Why an attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    Pass,
    Assertion,
    Import,
    Exception,
    /// External I/O or network failure raised by candidate code
    Transient,
    Timeout,
    /// The engine could not drive the attempt (interpreter missing, spawn failure)
    Infrastructure,
}

impl OutcomeKind {
    /// @ai:intent Recorded status for this kind
    /// @ai:effects pure
    pub fn status(&self) -> TestStatus {
        match self {
            OutcomeKind::Pass => TestStatus::Pass,
            OutcomeKind::Assertion | OutcomeKind::Import | OutcomeKind::Exception => {
                TestStatus::Fail
            }
            OutcomeKind::Transient | OutcomeKind::Infrastructure => TestStatus::Error,
            OutcomeKind::Timeout => TestStatus::Timeout,
        }
    }

    /// @ai:intent Whether another attempt may change the result
    /// @ai:effects pure
    pub fn is_retryable(&self) -> bool {
        matches!(self, OutcomeKind::Transient)
    }
}

/// @ai:intent Result of one attempt of one test
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptOutcome {
    pub kind: OutcomeKind,
    pub message: String,
    pub duration: Duration,
}

impl AttemptOutcome {
    pub fn new(kind: OutcomeKind, message: impl Into<String>, duration: Duration) -> Self {
        Self {
            kind,
            message: message.into(),
            duration,
        }
    }

    pub fn status(&self) -> TestStatus {
        self.kind.status()
    }
}

/// What the harness reports on its sentinel line
#[derive(Debug, Deserialize)]
pub(crate) struct HarnessReport {
    pub kind: OutcomeKind,
    #[serde(default)]
    pub message: String,
}

/// @ai:intent Find the last sentinel line in captured stdout
/// @ai:effects pure
pub(crate) fn parse_report(stdout: &str) -> Option<HarnessReport> {
    stdout
        .lines()
        .rev()
        .filter_map(|line| line.trim_end().strip_prefix(OUTCOME_SENTINEL))
        .find_map(|json| serde_json::from_str(json.trim()).ok())
}

/// @ai:intent Last few lines of a stream, for failure messages
/// @ai:effects pure
pub(crate) fn tail(text: &str, lines: usize) -> String {
    let kept: Vec<&str> = text
        .lines()
        .filter(|l| !l.starts_with(OUTCOME_SENTINEL))
        .filter(|l| !l.trim().is_empty())
        .collect();
    let start = kept.len().saturating_sub(lines);
    kept[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(OutcomeKind::Pass.status(), TestStatus::Pass);
        assert_eq!(OutcomeKind::Import.status(), TestStatus::Fail);
        assert_eq!(OutcomeKind::Assertion.status(), TestStatus::Fail);
        assert_eq!(OutcomeKind::Transient.status(), TestStatus::Error);
        assert_eq!(OutcomeKind::Timeout.status(), TestStatus::Timeout);
        assert!(OutcomeKind::Transient.is_retryable());
        assert!(!OutcomeKind::Timeout.is_retryable());
        assert!(!OutcomeKind::Infrastructure.is_retryable());
    }

    #[test]
    fn test_parse_report_takes_last_sentinel() {
        let stdout = "hello\n__ZERG_OUTCOME__ {\"kind\":\"transient\",\"message\":\"x\"}\n\
                      __ZERG_OUTCOME__ {\"kind\":\"pass\",\"message\":\"\"}\n";
        let report = parse_report(stdout).unwrap();
        assert_eq!(report.kind, OutcomeKind::Pass);
    }

    #[test]
    fn test_parse_report_ignores_garbage() {
        assert!(parse_report("__ZERG_OUTCOME__ not json\n").is_none());
        assert!(parse_report("nothing here").is_none());
    }

    #[test]
    fn test_tail_skips_sentinel_and_blank_lines() {
        let text = "a\n\nb\n__ZERG_OUTCOME__ {}\nc\n";
        assert_eq!(tail(text, 2), "b\nc");
    }
}
