use serde::{Deserialize, Serialize};

/// Board column a visible task falls into. `InProgress` is synthetic: a
/// ready task with a live lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusBucket {
    Ready,
    InProgress,
    Done,
    Verified,
}

impl StatusBucket {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Verified => "verified",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskBuckets {
    pub ready: usize,
    pub in_progress: usize,
    pub done: usize,
    pub verified: usize,
}

impl TaskBuckets {
    #[must_use]
    pub const fn get(&self, bucket: StatusBucket) -> usize {
        match bucket {
            StatusBucket::Ready => self.ready,
            StatusBucket::InProgress => self.in_progress,
            StatusBucket::Done => self.done,
            StatusBucket::Verified => self.verified,
        }
    }

    pub fn increment(&mut self, bucket: StatusBucket) {
        let slot = match bucket {
            StatusBucket::Ready => &mut self.ready,
            StatusBucket::InProgress => &mut self.in_progress,
            StatusBucket::Done => &mut self.done,
            StatusBucket::Verified => &mut self.verified,
        };
        *slot = slot.saturating_add(1);
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.ready + self.in_progress + self.done + self.verified
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseExpiryCounts {
    pub normal: usize,
    pub warning: usize,
    pub critical: usize,
    pub expired: usize,
}

/// Repository-wide counters, recomputed from the entity tables and never
/// stored independently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoStatus {
    pub total_tasks: usize,
    pub tasks_by_status: TaskBuckets,
    pub active_agents: usize,
    pub total_agents: usize,
    pub lease_expiry: LeaseExpiryCounts,
    pub orphaned_leases: usize,
}
