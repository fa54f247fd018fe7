//! Normalized progress report.

use serde::{Deserialize, Serialize};

/// A progress report normalized as an actual/total value pair.
///
/// Workers write these into the task store; status queries read them back.
/// `total` is the declared amount of work, `actual` the amount completed
/// so far. Both are dimensionless from the reader's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressReport {
    /// Work completed so far.
    pub actual: f64,
    /// Total work declared for the operation.
    pub total: f64,
}

impl ProgressReport {
    /// A report representing no progress.
    pub const ZERO: ProgressReport = ProgressReport {
        actual: 0.0,
        total: 1.0,
    };

    /// A report representing completed work.
    pub const DONE: ProgressReport = ProgressReport {
        actual: 1.0,
        total: 1.0,
    };

    /// Create a new report.
    pub fn new(actual: f64, total: f64) -> Self {
        Self { actual, total }
    }

    /// The completed fraction, clamped to `[0.0, 1.0]`.
    ///
    /// A zero or negative total reads as fully complete rather than a
    /// division error.
    pub fn fraction(&self) -> f64 {
        if self.total <= 0.0 {
            return 1.0;
        }
        (self.actual / self.total).clamp(0.0, 1.0)
    }
}

impl Default for ProgressReport {
    fn default() -> Self {
        Self::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction_basic() {
        assert_eq!(ProgressReport::new(0.0, 4.0).fraction(), 0.0);
        assert_eq!(ProgressReport::new(1.0, 4.0).fraction(), 0.25);
        assert_eq!(ProgressReport::new(4.0, 4.0).fraction(), 1.0);
    }

    #[test]
    fn test_fraction_clamps_overshoot() {
        // A worker may report more steps than it declared.
        assert_eq!(ProgressReport::new(5.0, 4.0).fraction(), 1.0);
        assert_eq!(ProgressReport::new(-1.0, 4.0).fraction(), 0.0);
    }

    #[test]
    fn test_fraction_degenerate_total() {
        assert_eq!(ProgressReport::new(0.0, 0.0).fraction(), 1.0);
    }

    #[test]
    fn test_constants() {
        assert_eq!(ProgressReport::ZERO.fraction(), 0.0);
        assert_eq!(ProgressReport::DONE.fraction(), 1.0);
    }

    #[test]
    fn test_serde_round_trip() {
        let report: ProgressReport = ProgressReport::new(3.0, 7.0);
        let json: String = serde_json::to_string(&report).unwrap();
        let back: ProgressReport = serde_json::from_str(&json).unwrap();
        assert_eq!(report, back);
    }
}
