use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health classification for one upstream session connection (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Timeout,
    Error,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionHealth {
    pub last_check: DateTime<Utc>,
    pub last_ping: Option<DateTime<Utc>>,
    pub error_count: u32,
    pub status: HealthStatus,
}

impl ConnectionHealth {
    pub fn new() -> Self {
        Self {
            last_check: Utc::now(),
            last_ping: None,
            error_count: 0,
            status: HealthStatus::Healthy,
        }
    }

    pub fn record_ping(&mut self) {
        self.last_ping = Some(Utc::now());
        self.last_check = Utc::now();
    }

    pub fn record_error(&mut self) {
        self.error_count += 1;
        self.last_check = Utc::now();
        self.status = if self.error_count >= 3 {
            HealthStatus::Failed
        } else {
            HealthStatus::Error
        };
    }

    pub fn record_timeout(&mut self) {
        self.last_check = Utc::now();
        self.status = HealthStatus::Timeout;
    }

    pub fn record_healthy(&mut self) {
        self.last_check = Utc::now();
        self.status = HealthStatus::Healthy;
    }
}

impl Default for ConnectionHealth {
    fn default() -> Self {
        Self::new()
    }
}

/// Teardown strategy for a session connection (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupMode {
    /// Tear down sockets, tasks, queues, caches, and locks immediately.
    Immediate,
    /// Tear down after a delay, only if no listeners remain registered by
    /// the time the delay elapses.
    Delayed,
}
