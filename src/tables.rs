#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Normalized entity storage on persistent maps.
//!
//! Every mutation produces a new version that shares structure with the
//! previous one, so a clone handed to readers never observes a later write.

use crate::types::{
    Agent, AgentId, Event, EventId, Lease, LeaseId, Message, Task, TaskId,
};
use rpds::{RedBlackTreeMapSync, VectorSync};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct EntityTables {
    agents: RedBlackTreeMapSync<AgentId, Arc<Agent>>,
    tasks: RedBlackTreeMapSync<TaskId, Arc<Task>>,
    /// Keyed by task: at most one lease per task.
    leases: RedBlackTreeMapSync<TaskId, Arc<Lease>>,
    lease_ids: RedBlackTreeMapSync<LeaseId, TaskId>,
    messages: VectorSync<Arc<Message>>,
    events: RedBlackTreeMapSync<EventId, Arc<Event>>,
}

impl EntityTables {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces agents, tasks and leases wholesale. Messages are replaced
    /// only when the snapshot carries them; the event log is kept.
    #[must_use]
    pub fn replaced_by_snapshot(
        &self,
        agents: Vec<Agent>,
        tasks: Vec<Task>,
        leases: Vec<Lease>,
        messages: Option<Vec<Message>>,
    ) -> Self {
        let mut next = self.clone();
        next.replace_agents(agents);
        next.replace_tasks(tasks);
        next.replace_leases(leases);
        if let Some(messages) = messages {
            next.replace_messages(messages);
        }
        next
    }

    pub fn replace_agents(&mut self, agents: Vec<Agent>) {
        self.agents = RedBlackTreeMapSync::new_sync();
        for agent in agents {
            self.upsert_agent(agent);
        }
    }

    /// Leases are kept; a lease whose task disappears becomes orphaned.
    pub fn replace_tasks(&mut self, tasks: Vec<Task>) {
        self.tasks = RedBlackTreeMapSync::new_sync();
        for task in tasks {
            self.replace_task(task);
        }
    }

    pub fn replace_leases(&mut self, leases: Vec<Lease>) {
        self.leases = RedBlackTreeMapSync::new_sync();
        self.lease_ids = RedBlackTreeMapSync::new_sync();
        for lease in leases {
            let _ = self.claim(lease);
        }
    }

    pub fn replace_messages(&mut self, messages: Vec<Message>) {
        self.messages = VectorSync::new_sync();
        for message in messages {
            self.append_message(message);
        }
    }

    pub fn upsert_agent(&mut self, agent: Agent) {
        self.agents.insert_mut(agent.id.clone(), Arc::new(agent));
    }

    pub fn replace_task(&mut self, task: Task) {
        self.tasks.insert_mut(task.id.clone(), Arc::new(task));
    }

    /// Installs `lease` as the only lease for its task and returns the lease
    /// it superseded, if any.
    pub fn claim(&mut self, lease: Lease) -> Option<Arc<Lease>> {
        let superseded = self.release(&lease.task_id);
        self.lease_ids
            .insert_mut(lease.lease_id.clone(), lease.task_id.clone());
        self.leases.insert_mut(lease.task_id.clone(), Arc::new(lease));
        superseded
    }

    pub fn release(&mut self, task_id: &TaskId) -> Option<Arc<Lease>> {
        let existing = self.leases.get(task_id).cloned()?;
        self.leases.remove_mut(task_id);
        // The id may have been reused by a later claim on another task.
        if self.lease_ids.get(&existing.lease_id) == Some(task_id) {
            self.lease_ids.remove_mut(&existing.lease_id);
        }
        Some(existing)
    }

    pub fn append_message(&mut self, message: Message) {
        self.messages.push_back_mut(Arc::new(message));
    }

    /// Returns false when an event with the same id is already logged.
    pub fn append_event(&mut self, event: Event) -> bool {
        if self.events.contains_key(&event.id) {
            return false;
        }
        self.events.insert_mut(event.id, Arc::new(event));
        true
    }

    #[must_use]
    pub fn agent(&self, id: &AgentId) -> Option<&Arc<Agent>> {
        self.agents.get(id)
    }

    #[must_use]
    pub fn task(&self, id: &TaskId) -> Option<&Arc<Task>> {
        self.tasks.get(id)
    }

    #[must_use]
    pub fn lease_for_task(&self, task_id: &TaskId) -> Option<&Arc<Lease>> {
        self.leases.get(task_id)
    }

    #[must_use]
    pub fn lease_by_id(&self, lease_id: &LeaseId) -> Option<&Arc<Lease>> {
        self.lease_ids
            .get(lease_id)
            .and_then(|task_id| self.leases.get(task_id))
    }

    /// A lease whose task is unknown is held but kept out of active views.
    #[must_use]
    pub fn is_orphaned(&self, lease: &Lease) -> bool {
        !self.tasks.contains_key(&lease.task_id)
    }

    /// A lease counts in active views only while its task is known and not
    /// deleted.
    #[must_use]
    pub fn is_active_lease(&self, lease: &Lease) -> bool {
        self.tasks
            .get(&lease.task_id)
            .is_some_and(|task| task.status.is_visible())
    }

    pub fn agents(&self) -> impl Iterator<Item = &Arc<Agent>> + '_ {
        self.agents.values()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Arc<Task>> + '_ {
        self.tasks.values()
    }

    pub fn leases(&self) -> impl Iterator<Item = &Arc<Lease>> + '_ {
        self.leases.values()
    }

    pub fn messages_newest_first(&self) -> impl Iterator<Item = &Arc<Message>> + '_ {
        self.messages.iter().rev()
    }

    pub fn events_newest_first(&self) -> impl Iterator<Item = &Arc<Event>> + '_ {
        self.events.values().rev()
    }

    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.agents.size()
    }

    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.size()
    }

    #[must_use]
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn highest_event_id(&self) -> Option<EventId> {
        self.events.last().map(|(id, _)| *id)
    }

    /// Compares the mirrored entity collections, ignoring the event log.
    #[must_use]
    pub fn same_entities(&self, other: &Self) -> bool {
        self.agents == other.agents && self.tasks == other.tasks && self.leases == other.leases
    }
}
