use super::identifiers::{AgentId, LeaseId, TaskId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LEASE_TTL_SECONDS: i64 = 900;

const fn default_ttl() -> i64 {
    DEFAULT_LEASE_TTL_SECONDS
}

/// An exclusive, time-bounded claim of one agent on one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lease {
    pub lease_id: LeaseId,
    pub task_id: TaskId,
    pub agent_id: AgentId,
    pub created_at: DateTime<Utc>,
    #[serde(default = "default_ttl")]
    pub ttl_seconds: i64,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }

    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Urgency band of a lease relative to the current wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaseExpiry {
    Expired,
    Critical,
    Warning,
    Normal,
}

impl LeaseExpiry {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::Critical => "critical",
            Self::Warning => "warning",
            Self::Normal => "normal",
        }
    }
}
