use crate::core::ConnectionHealth;
use serde::Serialize;
use std::fmt;

/// Aggregated latency and failure statistics from a stability probe.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StabilityReport {
    pub samples: u32,
    pub failures: u32,
    pub min_latency_ms: Option<u64>,
    pub max_latency_ms: Option<u64>,
    total_latency_ms: u64,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl StabilityReport {
    pub(crate) fn record(&mut self, health: &ConnectionHealth) {
        self.samples += 1;
        if !health.connected {
            self.failures += 1;
            if let Some(error) = &health.error {
                if !self.errors.contains(error) {
                    self.errors.push(error.clone());
                }
            }
            return;
        }

        // Latency figures only describe successful round trips.
        let latency = health.latency_ms;
        self.total_latency_ms += latency;
        self.min_latency_ms = Some(self.min_latency_ms.map_or(latency, |min| min.min(latency)));
        self.max_latency_ms = Some(self.max_latency_ms.map_or(latency, |max| max.max(latency)));
    }

    pub fn successes(&self) -> u32 {
        self.samples - self.failures
    }

    pub fn average_latency_ms(&self) -> Option<f64> {
        match self.successes() {
            0 => None,
            n => Some(self.total_latency_ms as f64 / n as f64),
        }
    }

    pub fn failure_rate(&self) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        self.failures as f64 / self.samples as f64
    }
}

impl fmt::Display for StabilityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} samples, {:.1}% failed, latency avg {} min {} max {}",
            self.samples,
            self.failure_rate() * 100.0,
            self.average_latency_ms()
                .map_or_else(|| "-".to_string(), |avg| format!("{avg:.1}ms")),
            self.min_latency_ms
                .map_or_else(|| "-".to_string(), |min| format!("{min}ms")),
            self.max_latency_ms
                .map_or_else(|| "-".to_string(), |max| format!("{max}ms")),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_mixed_samples() {
        let mut report = StabilityReport::default();
        report.record(&ConnectionHealth::healthy(10, None));
        report.record(&ConnectionHealth::healthy(30, None));
        report.record(&ConnectionHealth::unhealthy(0, "connection refused"));
        report.record(&ConnectionHealth::unhealthy(0, "connection refused"));

        assert_eq!(report.samples, 4);
        assert_eq!(report.failures, 2);
        assert_eq!(report.min_latency_ms, Some(10));
        assert_eq!(report.max_latency_ms, Some(30));
        assert_eq!(report.average_latency_ms(), Some(20.0));
        assert_eq!(report.failure_rate(), 0.5);
        assert_eq!(report.errors, vec!["connection refused".to_string()]);
    }

    #[test]
    fn test_empty_report() {
        let report = StabilityReport::default();
        assert_eq!(report.failure_rate(), 0.0);
        assert!(report.average_latency_ms().is_none());
        assert!(report.to_string().starts_with("0 samples"));
    }
}
