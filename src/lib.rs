pub mod aggregator;
pub mod config;
pub mod connection;
pub mod envelope;
pub mod error;
pub mod query;
pub mod reconciler;
pub mod store;
pub mod sync_service;
pub mod tables;
pub mod transport;
pub mod types;
pub mod wire;

pub use config::{load_config, MirrorConfig, ReconnectPolicy};
pub use connection::{ConnectionPhase, ConnectionStatus};
pub use error::{MirrorError, Result};
pub use query::{LeaseWithExpiry, StoreHandle, StoreView};
pub use reconciler::{ApplyOutcome, IngestStats};
pub use store::{IngestReport, SyncStore};
pub use sync_service::{SyncCommand, SyncControl, SyncService};
pub use transport::{Channel, Transport, TransportFuture, WsTransport};
pub use types::*;
