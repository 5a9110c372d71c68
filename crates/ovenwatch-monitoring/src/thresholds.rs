//! Per-environment alert thresholds.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use ovenwatch_core::config::Environment;

/// Metric keys with a configured threshold.
pub mod metric {
    /// Search latency, milliseconds.
    pub const SEARCH_LATENCY: &str = "searchLatency";
    /// Failed searches, percent.
    pub const ERROR_RATE: &str = "errorRate";
    /// Resident memory, megabytes.
    pub const MEMORY_USAGE: &str = "memoryUsage";
    /// Cache misses, percent.
    pub const CACHE_MISS_RATE: &str = "cacheMissRate";
    /// Searches without results, percent.
    pub const NO_RESULTS_RATE: &str = "noResultsRate";
    /// Live subscriber connections.
    pub const ACTIVE_CONNECTIONS: &str = "activeConnections";
    /// Searches per minute.
    pub const SEARCH_THROUGHPUT: &str = "searchThroughput";
    /// Overall response time, milliseconds.
    pub const SYSTEM_RESPONSE_TIME: &str = "systemResponseTime";
    /// Replay queue depth. No threshold.
    pub const QUEUE_DEPTH: &str = "queueDepth";
}

/// Classification of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Below the warning threshold.
    Normal,
    /// At or above warning.
    Warning,
    /// At or above critical.
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Warning and critical bounds for one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertThreshold {
    pub warning: f64,
    pub critical: f64,
    pub unit: String,
    pub description: String,
}

impl AlertThreshold {
    fn new(warning: f64, critical: f64, unit: &str, description: &str) -> Self {
        Self {
            warning,
            critical,
            unit: unit.to_string(),
            description: description.to_string(),
        }
    }

    /// Classifies `value`. Both bounds are inclusive.
    pub fn check(&self, value: f64) -> Severity {
        if value >= self.critical {
            Severity::Critical
        } else if value >= self.warning {
            Severity::Warning
        } else {
            Severity::Normal
        }
    }

    /// The bound that produced `severity`.
    pub fn limit(&self, severity: Severity) -> Option<f64> {
        match severity {
            Severity::Normal => None,
            Severity::Warning => Some(self.warning),
            Severity::Critical => Some(self.critical),
        }
    }
}

/// Threshold profile for one environment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertThresholds {
    environment: Environment,
    thresholds: BTreeMap<String, AlertThreshold>,
}

impl AlertThresholds {
    /// Loads the profile for `environment`.
    pub fn for_environment(environment: Environment) -> Self {
        use metric::*;

        // (metric, warning, critical)
        let bounds: [(&str, f64, f64); 8] = match environment {
            Environment::Development => [
                (SEARCH_LATENCY, 1000.0, 2000.0),
                (ERROR_RATE, 10.0, 20.0),
                (MEMORY_USAGE, 256.0, 512.0),
                (CACHE_MISS_RATE, 80.0, 95.0),
                (NO_RESULTS_RATE, 30.0, 50.0),
                (ACTIVE_CONNECTIONS, 50.0, 100.0),
                (SEARCH_THROUGHPUT, 500.0, 1000.0),
                (SYSTEM_RESPONSE_TIME, 500.0, 1000.0),
            ],
            Environment::Production => [
                (SEARCH_LATENCY, 300.0, 600.0),
                (ERROR_RATE, 2.0, 5.0),
                (MEMORY_USAGE, 1024.0, 2048.0),
                (CACHE_MISS_RATE, 60.0, 75.0),
                (NO_RESULTS_RATE, 10.0, 20.0),
                (ACTIVE_CONNECTIONS, 200.0, 500.0),
                (SEARCH_THROUGHPUT, 2000.0, 5000.0),
                (SYSTEM_RESPONSE_TIME, 150.0, 300.0),
            ],
            Environment::Default => [
                (SEARCH_LATENCY, 500.0, 1000.0),
                (ERROR_RATE, 5.0, 10.0),
                (MEMORY_USAGE, 512.0, 1024.0),
                (CACHE_MISS_RATE, 70.0, 85.0),
                (NO_RESULTS_RATE, 15.0, 25.0),
                (ACTIVE_CONNECTIONS, 100.0, 200.0),
                (SEARCH_THROUGHPUT, 1000.0, 2000.0),
                (SYSTEM_RESPONSE_TIME, 200.0, 500.0),
            ],
        };

        let thresholds = bounds
            .into_iter()
            .map(|(name, warning, critical)| {
                let (unit, description) = describe(name);
                (
                    name.to_string(),
                    AlertThreshold::new(warning, critical, unit, description),
                )
            })
            .collect();

        Self {
            environment,
            thresholds,
        }
    }

    /// Environment this profile was loaded for.
    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Threshold for `metric`, if one is configured.
    pub fn get(&self, metric: &str) -> Option<&AlertThreshold> {
        self.thresholds.get(metric)
    }

    /// Classifies a sample; metrics without a threshold are always normal.
    pub fn check(&self, metric: &str, value: f64) -> Severity {
        self.get(metric)
            .map_or(Severity::Normal, |threshold| threshold.check(value))
    }

    /// Number of configured metrics.
    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    /// Whether no metric is configured.
    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }

    /// Iterate `(metric, threshold)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AlertThreshold)> {
        self.thresholds.iter().map(|(k, v)| (k.as_str(), v))
    }
}

fn describe(metric: &str) -> (&'static str, &'static str) {
    match metric {
        metric::SEARCH_LATENCY => ("ms", "Search latency"),
        metric::ERROR_RATE => ("%", "Search error rate"),
        metric::MEMORY_USAGE => ("MB", "Memory usage"),
        metric::CACHE_MISS_RATE => ("%", "Cache miss rate"),
        metric::NO_RESULTS_RATE => ("%", "Searches without results"),
        metric::ACTIVE_CONNECTIONS => ("connections", "Active subscriber connections"),
        metric::SEARCH_THROUGHPUT => ("searches/min", "Search throughput"),
        metric::SYSTEM_RESPONSE_TIME => ("ms", "System response time"),
        _ => ("", "Metric"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_are_inclusive() {
        let thresholds = AlertThresholds::for_environment(Environment::Default);
        assert_eq!(thresholds.check(metric::ERROR_RATE, 4.99), Severity::Normal);
        assert_eq!(thresholds.check(metric::ERROR_RATE, 5.0), Severity::Warning);
        assert_eq!(thresholds.check(metric::ERROR_RATE, 10.0), Severity::Critical);
    }

    #[test]
    fn test_profiles_differ_by_environment() {
        let dev = AlertThresholds::for_environment(Environment::Development);
        let prod = AlertThresholds::for_environment(Environment::Production);
        assert_eq!(dev.len(), 8);
        assert_eq!(prod.len(), 8);
        assert_eq!(dev.get(metric::MEMORY_USAGE).map(|t| t.warning), Some(256.0));
        assert_eq!(prod.get(metric::MEMORY_USAGE).map(|t| t.warning), Some(1024.0));
        assert_eq!(prod.check(metric::ACTIVE_CONNECTIONS, 120.0), Severity::Normal);
        assert_eq!(dev.check(metric::ACTIVE_CONNECTIONS, 120.0), Severity::Critical);
    }

    #[test]
    fn test_unknown_metric_is_normal() {
        let thresholds = AlertThresholds::for_environment(Environment::Default);
        assert_eq!(thresholds.check(metric::QUEUE_DEPTH, 1e9), Severity::Normal);
        assert!(thresholds.get("nope").is_none());
    }
}
