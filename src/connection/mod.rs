pub mod stability;

use crate::audit::TransactionLogger;
use crate::core::{ConnectionHealth, PersistError, Result};
use crate::store::ConnectionProbe;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

pub use stability::StabilityReport;

/// Health gate in front of every write.
///
/// All checks report failures as data in `ConnectionHealth`; only
/// `ensure_connection` turns an unhealthy result into an error.
#[derive(Clone)]
pub struct ConnectionValidator {
    probe: Arc<dyn ConnectionProbe>,
    check_timeout: Duration,
    max_latency: Duration,
    sample_interval: Duration,
    logger: TransactionLogger,
}

impl ConnectionValidator {
    pub fn new(probe: Arc<dyn ConnectionProbe>) -> Self {
        Self {
            probe,
            check_timeout: Duration::from_millis(3_000),
            max_latency: Duration::from_millis(5_000),
            sample_interval: Duration::from_millis(250),
            logger: TransactionLogger::new(),
        }
    }

    /// Set the budget used by `ensure_connection`
    pub fn check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = timeout;
        self
    }

    /// Set the latency ceiling above which a connection counts as unhealthy
    pub fn max_latency(mut self, latency: Duration) -> Self {
        self.max_latency = latency;
        self
    }

    pub fn sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    /// Copy of this validator that reports through `logger`.
    pub fn with_logger(&self, logger: TransactionLogger) -> Self {
        Self {
            logger,
            ..self.clone()
        }
    }

    /// Issues one probe round trip and measures its latency.
    pub async fn validate_connection(&self) -> ConnectionHealth {
        let started = Instant::now();
        let result = self.probe.ping().await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(()) => ConnectionHealth::healthy(latency_ms, self.probe.pool_status().await),
            Err(err) => {
                let mut health = ConnectionHealth::unhealthy(latency_ms, err.to_string());
                health.pool_status = self.probe.pool_status().await;
                health
            }
        }
    }

    /// Like `validate_connection`, but fails closed once `limit` elapses.
    pub async fn validate_connection_with_timeout(&self, limit: Duration) -> ConnectionHealth {
        match timeout(limit, self.validate_connection()).await {
            Ok(health) => health,
            Err(_) => ConnectionHealth::unhealthy(limit.as_millis() as u64, "timeout"),
        }
    }

    /// Returns the health report when the store is reachable and responsive.
    pub async fn ensure_connection(&self) -> Result<ConnectionHealth> {
        let health = self
            .validate_connection_with_timeout(self.check_timeout)
            .await;

        if !health.connected {
            let reason = health.error.as_deref().unwrap_or("unknown");
            self.logger
                .warn("connection check failed", json!({ "reason": reason }));
            return Err(PersistError::Connection(format!(
                "Database connection unhealthy: {}",
                reason
            )));
        }

        if health.latency_ms > self.max_latency.as_millis() as u64 {
            self.logger.warn(
                "connection latency above ceiling",
                json!({
                    "latencyMs": health.latency_ms,
                    "maxLatencyMs": self.max_latency.as_millis() as u64,
                }),
            );
            return Err(PersistError::Connection(format!(
                "Database connection latency too high: {}ms",
                health.latency_ms
            )));
        }

        Ok(health)
    }

    /// Samples health repeatedly over `duration` for diagnostics.
    pub async fn test_connection_stability(&self, duration: Duration) -> StabilityReport {
        let started = Instant::now();
        let mut report = StabilityReport::default();

        loop {
            let health = self
                .validate_connection_with_timeout(self.check_timeout)
                .await;
            report.record(&health);

            if started.elapsed() + self.sample_interval > duration {
                break;
            }
            tokio::time::sleep(self.sample_interval).await;
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        report
    }
}
