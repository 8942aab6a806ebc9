use super::identifiers::TaskId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Ready,
    Done,
    Verified,
    Deleted,
}

impl TaskStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Done => "done",
            Self::Verified => "verified",
            Self::Deleted => "deleted",
        }
    }

    /// Deleted tasks stay in storage but never appear in active views.
    #[must_use]
    pub const fn is_visible(&self) -> bool {
        !matches!(self, Self::Deleted)
    }
}

impl TryFrom<&str> for TaskStatus {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, String> {
        match s {
            "ready" => Ok(Self::Ready),
            "done" => Ok(Self::Done),
            "verified" => Ok(Self::Verified),
            "deleted" => Ok(Self::Deleted),
            _ => Err(format!("Unknown task status: {s}")),
        }
    }
}

const fn default_priority() -> i64 {
    999
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    /// Lower is more urgent.
    #[serde(default = "default_priority")]
    pub priority: i64,
    #[serde(default)]
    pub labels: BTreeSet<String>,
    #[serde(default)]
    pub locks: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub dependents: Vec<TaskId>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prd_source: Option<String>,
}

impl Task {
    #[must_use]
    pub fn with_status(mut self, status: TaskStatus, at: DateTime<Utc>) -> Self {
        self.status = status;
        self.updated_at = Some(at);
        self
    }
}
