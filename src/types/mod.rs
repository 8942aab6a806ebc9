mod agent_types;
mod events;
mod identifiers;
mod lease_types;
mod messaging;
mod repo_status;
mod task_types;

pub use agent_types::{Agent, AgentStatus, SessionMeta};
pub use events::{Event, EventKind};
pub use identifiers::{AgentId, EventId, LeaseId, MessageId, TaskId};
pub use lease_types::{Lease, LeaseExpiry, DEFAULT_LEASE_TTL_SECONDS};
pub use messaging::{Message, MessageSeverity};
pub use repo_status::{LeaseExpiryCounts, RepoStatus, StatusBucket, TaskBuckets};
pub use task_types::{Task, TaskStatus};
