//! Derived status: repo-wide counters and lease expiry bands.
//!
//! Everything here is a pure function of the entity tables and a wall-clock
//! instant. Expiry is time-driven, so callers recompute on a timer as well as
//! after each ingested message.

use crate::tables::EntityTables;
use crate::types::{
    Lease, LeaseExpiry, LeaseExpiryCounts, RepoStatus, StatusBucket, Task, TaskBuckets,
    TaskStatus,
};
use chrono::{DateTime, Duration, Utc};

pub const CRITICAL_WINDOW_SECS: i64 = 5 * 60;
pub const WARNING_WINDOW_SECS: i64 = 10 * 60;

/// Classifies a lease into its urgency band at `now`.
///
/// Bands are inclusive at their lower edge: exactly 300s remaining is
/// critical, 301s is warning; zero or less is expired.
#[must_use]
pub fn classify_lease(lease: &Lease, now: DateTime<Utc>) -> LeaseExpiry {
    classify_remaining(lease.remaining(now))
}

#[must_use]
pub fn classify_remaining(remaining: Duration) -> LeaseExpiry {
    if remaining <= Duration::zero() {
        LeaseExpiry::Expired
    } else if remaining <= Duration::seconds(CRITICAL_WINDOW_SECS) {
        LeaseExpiry::Critical
    } else if remaining <= Duration::seconds(WARNING_WINDOW_SECS) {
        LeaseExpiry::Warning
    } else {
        LeaseExpiry::Normal
    }
}

/// Board bucket for a task, or `None` for deleted tasks.
#[must_use]
pub fn bucket_for(task: &Task, tables: &EntityTables, now: DateTime<Utc>) -> Option<StatusBucket> {
    match task.status {
        TaskStatus::Ready => {
            let leased = tables
                .lease_for_task(&task.id)
                .is_some_and(|lease| lease.is_live(now));
            Some(if leased {
                StatusBucket::InProgress
            } else {
                StatusBucket::Ready
            })
        }
        TaskStatus::Done => Some(StatusBucket::Done),
        TaskStatus::Verified => Some(StatusBucket::Verified),
        TaskStatus::Deleted => None,
    }
}

#[must_use]
pub fn compute_repo_status(tables: &EntityTables, now: DateTime<Utc>) -> RepoStatus {
    let tasks_by_status = tables
        .tasks()
        .filter_map(|task| bucket_for(task, tables, now))
        .fold(TaskBuckets::default(), |mut buckets, bucket| {
            buckets.increment(bucket);
            buckets
        });

    let (lease_expiry, orphaned_leases) = tables.leases().fold(
        (LeaseExpiryCounts::default(), 0_usize),
        |(mut counts, orphaned), lease| {
            if tables.is_orphaned(lease) {
                return (counts, orphaned + 1);
            }
            if !tables.is_active_lease(lease) {
                return (counts, orphaned);
            }
            match classify_lease(lease, now) {
                LeaseExpiry::Expired => counts.expired += 1,
                LeaseExpiry::Critical => counts.critical += 1,
                LeaseExpiry::Warning => counts.warning += 1,
                LeaseExpiry::Normal => counts.normal += 1,
            }
            (counts, orphaned)
        },
    );

    RepoStatus {
        total_tasks: tasks_by_status.total(),
        tasks_by_status,
        active_agents: tables.agents().filter(|a| a.status.is_active()).count(),
        total_agents: tables.agent_count(),
        lease_expiry,
        orphaned_leases,
    }
}
