use std::fmt;

use serde::{Serialize, Serializer};

/// Terminal classification of a submission's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    WrongAnswer,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    SystemFailure,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Accepted => "Accepted",
            Verdict::WrongAnswer => "Wrong Answer",
            Verdict::TimeLimitExceeded => "Time Limit Exceeded",
            Verdict::MemoryLimitExceeded => "Memory Limit Exceeded",
            Verdict::SystemFailure => "System Failure",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Verdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Whether the pipeline reached the end of the test suite.  Never surfaced
/// outside the pipeline; a result built from an early exit stays Incomplete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Completion {
    Incomplete,
    Complete,
}

/// A reported measurement, or the `N/A` sentinel when the verdict makes the
/// figure meaningless (limit-exceeded and system-failure verdicts).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Metric {
    Millis(f64),
    Megabytes(f64),
    NotApplicable,
}

impl Metric {
    pub fn is_not_applicable(self) -> bool {
        matches!(self, Metric::NotApplicable)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Millis(value) => write!(f, "{value:.2} ms"),
            Metric::Megabytes(value) => write!(f, "{value:.2} MB"),
            Metric::NotApplicable => f.write_str("N/A"),
        }
    }
}

impl Serialize for Metric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The value handed back to the caller for one graded submission.
///
/// `time` and `memory` are the worst-case single-test figures when the
/// verdict is Accepted or Wrong Answer, and `N/A` otherwise.  `message`
/// carries the trimmed toolchain stderr for System Failure and the verdict
/// name for everything else.
#[derive(Debug, Clone, Serialize)]
pub struct GradeResult {
    pub verdict: Verdict,
    pub time: Metric,
    pub memory: Metric,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_names() {
        assert_eq!(Verdict::Accepted.to_string(), "Accepted");
        assert_eq!(Verdict::WrongAnswer.to_string(), "Wrong Answer");
        assert_eq!(Verdict::TimeLimitExceeded.to_string(), "Time Limit Exceeded");
        assert_eq!(Verdict::MemoryLimitExceeded.to_string(), "Memory Limit Exceeded");
        assert_eq!(Verdict::SystemFailure.to_string(), "System Failure");
    }

    #[test]
    fn metric_formatting() {
        assert_eq!(Metric::Millis(312.4).to_string(), "312.40 ms");
        assert_eq!(Metric::Megabytes(24.5678).to_string(), "24.57 MB");
        assert_eq!(Metric::NotApplicable.to_string(), "N/A");
        assert!(Metric::NotApplicable.is_not_applicable());
        assert!(!Metric::Millis(0.0).is_not_applicable());
    }

    #[test]
    fn result_serialization() {
        let result = GradeResult {
            verdict: Verdict::TimeLimitExceeded,
            time: Metric::NotApplicable,
            memory: Metric::NotApplicable,
            message: "Time Limit Exceeded".to_string(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["verdict"], "Time Limit Exceeded");
        assert_eq!(json["time"], "N/A");
        assert_eq!(json["memory"], "N/A");
    }

    #[test]
    fn accepted_result_serializes_measurements() {
        let result = GradeResult {
            verdict: Verdict::Accepted,
            time: Metric::Millis(12.3),
            memory: Metric::Megabytes(8.0),
            message: "Accepted".to_string(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["time"], "12.30 ms");
        assert_eq!(json["memory"], "8.00 MB");
    }
}
