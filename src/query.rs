#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Read side of the store. Each published [`StoreView`] is one immutable
//! version: readers holding it never observe a later ingestion.

use crate::aggregator::{bucket_for, classify_lease, compute_repo_status};
use crate::connection::ConnectionStatus;
use crate::error::{MirrorError, Result};
use crate::reconciler::IngestStats;
use crate::tables::EntityTables;
use crate::types::{
    Agent, AgentId, Event, EventId, Lease, LeaseExpiry, LeaseId, Message, RepoStatus,
    StatusBucket, Task, TaskId,
};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

/// A lease paired with its urgency band at a given instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseWithExpiry {
    #[serde(flatten)]
    pub lease: Lease,
    pub expiry: LeaseExpiry,
    pub remaining_seconds: i64,
}

#[derive(Debug, Clone)]
pub struct StoreView {
    version: u64,
    tables: EntityTables,
    connection: ConnectionStatus,
    repo_status: RepoStatus,
    stats: IngestStats,
    last_applied: Option<EventId>,
    computed_at: DateTime<Utc>,
}

impl StoreView {
    #[must_use]
    pub fn new(
        version: u64,
        tables: EntityTables,
        connection: ConnectionStatus,
        stats: IngestStats,
        last_applied: Option<EventId>,
        computed_at: DateTime<Utc>,
    ) -> Self {
        let repo_status = compute_repo_status(&tables, computed_at);
        Self {
            version,
            tables,
            connection,
            repo_status,
            stats,
            last_applied,
            computed_at,
        }
    }

    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Wall-clock instant the derived status was computed for.
    #[must_use]
    pub const fn computed_at(&self) -> DateTime<Utc> {
        self.computed_at
    }

    #[must_use]
    pub const fn tables(&self) -> &EntityTables {
        &self.tables
    }

    #[must_use]
    pub const fn connection(&self) -> &ConnectionStatus {
        &self.connection
    }

    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    #[must_use]
    pub const fn reconnect_attempts(&self) -> u32 {
        self.connection.reconnect_attempts
    }

    #[must_use]
    pub fn connection_error(&self) -> Option<&str> {
        self.connection.connection_error.as_deref()
    }

    #[must_use]
    pub const fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        self.connection.last_sync_at
    }

    #[must_use]
    pub const fn repo_status(&self) -> &RepoStatus {
        &self.repo_status
    }

    #[must_use]
    pub const fn ingest_stats(&self) -> IngestStats {
        self.stats
    }

    #[must_use]
    pub const fn last_applied_event(&self) -> Option<EventId> {
        self.last_applied
    }

    #[must_use]
    pub fn get_agent(&self, id: &AgentId) -> Option<Arc<Agent>> {
        self.tables.agent(id).cloned()
    }

    /// Deleted tasks are still returned by id; only list views hide them.
    #[must_use]
    pub fn get_task(&self, id: &TaskId) -> Option<Arc<Task>> {
        self.tables.task(id).cloned()
    }

    #[must_use]
    pub fn get_lease(&self, task_id: &TaskId) -> Option<Arc<Lease>> {
        self.tables.lease_for_task(task_id).cloned()
    }

    #[must_use]
    pub fn lease_by_id(&self, lease_id: &LeaseId) -> Option<Arc<Lease>> {
        self.tables.lease_by_id(lease_id).cloned()
    }

    /// Agents ordered by id.
    #[must_use]
    pub fn list_agents(&self) -> Vec<Arc<Agent>> {
        self.tables.agents().cloned().collect()
    }

    /// Non-deleted tasks, most urgent first.
    #[must_use]
    pub fn list_tasks(&self) -> Vec<Arc<Task>> {
        self.tables
            .tasks()
            .filter(|task| task.status.is_visible())
            .sorted_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)))
            .cloned()
            .collect()
    }

    /// Leases on known, non-deleted tasks, soonest expiry first. Expired
    /// leases stay listed until the backend removes them.
    #[must_use]
    pub fn list_leases(&self) -> Vec<Arc<Lease>> {
        self.tables
            .leases()
            .filter(|lease| self.tables.is_active_lease(lease))
            .sorted_by(|a, b| {
                a.expires_at
                    .cmp(&b.expires_at)
                    .then_with(|| a.task_id.cmp(&b.task_id))
            })
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn list_orphaned_leases(&self) -> Vec<Arc<Lease>> {
        self.tables
            .leases()
            .filter(|lease| self.tables.is_orphaned(lease))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn list_leases_with_expiry(&self, now: DateTime<Utc>) -> Vec<LeaseWithExpiry> {
        self.list_leases()
            .into_iter()
            .map(|lease| LeaseWithExpiry {
                expiry: classify_lease(&lease, now),
                remaining_seconds: lease.remaining(now).num_seconds(),
                lease: Lease::clone(&lease),
            })
            .collect()
    }

    /// Newest first, at most `limit` entries.
    #[must_use]
    pub fn list_recent_events(&self, limit: usize) -> Vec<Arc<Event>> {
        self.tables
            .events_newest_first()
            .take(limit)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn list_messages(&self, limit: usize) -> Vec<Arc<Message>> {
        self.tables
            .messages_newest_first()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Tasks in one board column, evaluated at this view's `computed_at`.
    #[must_use]
    pub fn tasks_in_bucket(&self, bucket: StatusBucket) -> Vec<Arc<Task>> {
        self.list_tasks()
            .into_iter()
            .filter(|task| bucket_for(task, &self.tables, self.computed_at) == Some(bucket))
            .collect()
    }

    #[must_use]
    pub fn is_task_in_progress(&self, task_id: &TaskId) -> bool {
        self.tables
            .task(task_id)
            .and_then(|task| bucket_for(task, &self.tables, self.computed_at))
            == Some(StatusBucket::InProgress)
    }
}

/// Cloneable subscription to published views. Each clone tracks its own
/// last-seen version.
#[derive(Debug, Clone)]
pub struct StoreHandle {
    rx: watch::Receiver<Arc<StoreView>>,
}

impl StoreHandle {
    #[must_use]
    pub const fn new(rx: watch::Receiver<Arc<StoreView>>) -> Self {
        Self { rx }
    }

    /// The latest published version. Never blocks.
    #[must_use]
    pub fn current(&self) -> Arc<StoreView> {
        Arc::clone(&self.rx.borrow())
    }

    /// Waits for a version this handle has not seen yet.
    ///
    /// # Errors
    /// Returns `MirrorError::Internal` once the store has been dropped.
    pub async fn changed(&mut self) -> Result<Arc<StoreView>> {
        self.rx
            .changed()
            .await
            .map_err(|_| MirrorError::Internal("store publisher closed".to_string()))?;
        Ok(Arc::clone(&self.rx.borrow_and_update()))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::StoreView;
    use crate::connection::ConnectionStatus;
    use crate::reconciler::IngestStats;
    use crate::tables::EntityTables;
    use crate::types::{
        AgentId, Event, EventId, EventKind, Lease, LeaseExpiry, LeaseId, StatusBucket, Task,
        TaskId, TaskStatus,
    };
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use serde_json::Map;
    use std::collections::BTreeSet;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 5, 10, 0, 0).unwrap()
    }

    fn task(id: &str, priority: i64, status: TaskStatus) -> Task {
        Task {
            id: TaskId::new(id),
            title: id.to_string(),
            description: String::new(),
            status,
            priority,
            labels: BTreeSet::new(),
            locks: Vec::new(),
            dependencies: Vec::new(),
            dependents: Vec::new(),
            created_at: None,
            updated_at: None,
            prd_source: None,
        }
    }

    fn lease(task_id: &str, expires_in_secs: i64) -> Lease {
        Lease {
            lease_id: LeaseId::new(format!("L-{task_id}")),
            task_id: TaskId::new(task_id),
            agent_id: AgentId::new("A1"),
            created_at: now() - Duration::seconds(60),
            ttl_seconds: 900,
            expires_at: now() + Duration::seconds(expires_in_secs),
        }
    }

    fn view(tables: EntityTables) -> StoreView {
        StoreView::new(
            1,
            tables,
            ConnectionStatus::default(),
            IngestStats::default(),
            None,
            now(),
        )
    }

    #[test]
    fn list_tasks_hides_deleted_and_orders_by_priority_then_id() {
        let mut tables = EntityTables::new();
        tables.replace_task(task("T3", 2, TaskStatus::Ready));
        tables.replace_task(task("T1", 2, TaskStatus::Done));
        tables.replace_task(task("T2", 1, TaskStatus::Ready));
        tables.replace_task(task("T0", 0, TaskStatus::Deleted));

        let view = view(tables);
        let ids = view
            .list_tasks()
            .iter()
            .map(|t| t.id.value().to_string())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["T2", "T1", "T3"]);
        assert!(view.get_task(&TaskId::new("T0")).is_some());
    }

    #[test]
    fn list_leases_excludes_orphans_and_orders_by_expiry() {
        let mut tables = EntityTables::new();
        tables.replace_task(task("T1", 1, TaskStatus::Ready));
        tables.replace_task(task("T2", 1, TaskStatus::Ready));
        tables.claim(lease("T1", 900));
        tables.claim(lease("T2", 120));
        tables.claim(lease("T9", 60));

        let view = view(tables);
        let leased = view
            .list_leases()
            .iter()
            .map(|l| l.task_id.value().to_string())
            .collect::<Vec<_>>();
        assert_eq!(leased, vec!["T2", "T1"]);
        assert_eq!(view.list_orphaned_leases().len(), 1);

        let banded = view.list_leases_with_expiry(now());
        assert_eq!(banded[0].expiry, LeaseExpiry::Critical);
        assert_eq!(banded[0].remaining_seconds, 120);
        assert_eq!(banded[1].expiry, LeaseExpiry::Normal);
    }

    #[test]
    fn lease_on_deleted_task_is_hidden_from_active_views() {
        let mut tables = EntityTables::new();
        tables.replace_task(task("T1", 1, TaskStatus::Deleted));
        tables.replace_task(task("T2", 1, TaskStatus::Ready));
        tables.claim(lease("T1", 120));
        tables.claim(lease("T2", 900));

        let view = view(tables);
        assert!(view.list_tasks().iter().all(|t| t.id != TaskId::new("T1")));
        let leased = view
            .list_leases_with_expiry(now())
            .into_iter()
            .map(|l| l.lease.task_id)
            .collect::<Vec<_>>();
        assert_eq!(leased, vec![TaskId::new("T2")]);
        assert_eq!(view.repo_status().lease_expiry.critical, 0);
        assert_eq!(view.repo_status().lease_expiry.normal, 1);
        assert!(view.list_orphaned_leases().is_empty());
        assert!(view.get_lease(&TaskId::new("T1")).is_some());
    }

    #[test]
    fn in_progress_is_derived_from_live_lease() {
        let mut tables = EntityTables::new();
        tables.replace_task(task("T1", 1, TaskStatus::Ready));
        tables.replace_task(task("T2", 1, TaskStatus::Ready));
        tables.claim(lease("T1", 30));
        tables.claim(lease("T2", -30));

        let view = view(tables);
        assert!(view.is_task_in_progress(&TaskId::new("T1")));
        assert!(!view.is_task_in_progress(&TaskId::new("T2")));
        assert_eq!(view.tasks_in_bucket(StatusBucket::Ready).len(), 1);
        assert_eq!(view.repo_status().tasks_by_status.in_progress, 1);
    }

    #[test]
    fn recent_events_are_newest_first_and_limited() {
        let mut tables = EntityTables::new();
        for id in 1..=5 {
            tables.append_event(Event {
                id: EventId::new(id),
                created_at: now(),
                kind: EventKind::AgentHeartbeat,
                actor_agent_id: Some(AgentId::new("A1")),
                target_agent_id: None,
                task_id: None,
                payload: Map::new(),
            });
        }
        let view = view(tables);
        let ids = view
            .list_recent_events(3)
            .iter()
            .map(|e| e.id.value())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![5, 4, 3]);
        assert!(view.list_recent_events(0).is_empty());
    }
}
