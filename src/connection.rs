#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use crate::config::ReconnectPolicy;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionPhase {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionPhase {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

/// Connection health as observed by readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub phase: ConnectionPhase,
    pub reconnect_attempts: u32,
    pub max_reconnect_attempts: u32,
    pub connection_error: Option<String>,
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Incremented on every successful (re)connect.
    pub epoch: u64,
    /// Set once the attempt cap is exhausted; cleared only by a manual retry.
    pub gave_up: bool,
}

impl ConnectionStatus {
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self.phase, ConnectionPhase::Connected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    Retry { attempt: u32, delay: Duration },
    GiveUp,
}

#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    status: ConnectionStatus,
    policy: ReconnectPolicy,
}

impl ConnectionTracker {
    #[must_use]
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            status: ConnectionStatus {
                max_reconnect_attempts: policy.max_attempts,
                ..ConnectionStatus::default()
            },
            policy,
        }
    }

    #[must_use]
    pub const fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    /// Marks the start of a connect attempt. Retries stay in `Reconnecting`.
    pub fn begin_connect(&mut self) {
        if self.status.reconnect_attempts == 0 {
            self.status.phase = ConnectionPhase::Connecting;
        }
    }

    pub fn connected(&mut self) {
        self.status.phase = ConnectionPhase::Connected;
        self.status.reconnect_attempts = 0;
        self.status.connection_error = None;
        self.status.gave_up = false;
        self.status.epoch = self.status.epoch.saturating_add(1);
        info!("Connected (epoch {})", self.status.epoch);
    }

    /// Records a channel loss or failed attempt and decides what happens next.
    pub fn lost(&mut self, reason: &str) -> ReconnectDecision {
        if self.status.reconnect_attempts >= self.policy.max_attempts {
            self.status.phase = ConnectionPhase::Disconnected;
            self.status.gave_up = true;
            self.status.connection_error = Some(format!(
                "Unable to reconnect after {} attempts: {reason}",
                self.policy.max_attempts
            ));
            warn!(
                "Giving up after {} reconnect attempts: {}",
                self.policy.max_attempts, reason
            );
            return ReconnectDecision::GiveUp;
        }

        self.status.reconnect_attempts += 1;
        self.status.phase = ConnectionPhase::Reconnecting;
        self.status.connection_error = Some(reason.to_string());
        let attempt = self.status.reconnect_attempts;
        let delay = self.policy.delay_for(attempt);
        warn!(
            "Connection lost ({}); reconnect attempt {}/{} in {:?}",
            reason, attempt, self.policy.max_attempts, delay
        );
        ReconnectDecision::Retry { attempt, delay }
    }

    /// External trigger: restart from a fresh attempt budget.
    pub fn manual_retry(&mut self) {
        self.status.reconnect_attempts = 0;
        self.status.gave_up = false;
        self.status.phase = ConnectionPhase::Connecting;
        info!("Manual reconnect requested");
    }

    pub fn teardown(&mut self) {
        self.status.phase = ConnectionPhase::Disconnected;
        self.status.reconnect_attempts = 0;
        self.status.connection_error = None;
    }

    pub fn record_sync(&mut self, now: DateTime<Utc>) {
        self.status.last_sync_at = Some(now);
    }
}
