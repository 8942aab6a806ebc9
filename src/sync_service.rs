#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Async driver around [`SyncStore`]: connects, feeds frames one at a time,
//! keeps the channel alive, and walks the reconnect state machine.

use crate::config::MirrorConfig;
use crate::connection::ReconnectDecision;
use crate::error::{MirrorError, Result};
use crate::query::StoreHandle;
use crate::store::SyncStore;
use crate::transport::{Channel, Transport};
use crate::wire::Outbound;
use chrono::Utc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCommand {
    /// Drop the current channel (if any) and reconnect with a fresh attempt budget.
    Reconnect,
    Shutdown,
}

/// Sender side of the driver's command queue. Dropping every clone shuts
/// the driver down.
#[derive(Debug, Clone)]
pub struct SyncControl {
    tx: mpsc::Sender<SyncCommand>,
}

impl SyncControl {
    /// # Errors
    /// Returns `MirrorError::Internal` if the driver has already stopped.
    pub async fn reconnect(&self) -> Result<()> {
        self.send(SyncCommand::Reconnect).await
    }

    /// # Errors
    /// Returns `MirrorError::Internal` if the driver has already stopped.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(SyncCommand::Shutdown).await
    }

    async fn send(&self, command: SyncCommand) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| MirrorError::Internal("sync service is not running".to_string()))
    }
}

enum Phase {
    Connect,
    Backoff(Duration),
    Stalled,
}

enum SessionEnd {
    Lost(String),
    Reconnect,
    Shutdown,
}

enum Step {
    Frame(Result<Option<String>>),
    Tick,
    Ping,
    Command(Option<SyncCommand>),
}

pub struct SyncService<T: Transport> {
    transport: T,
    config: MirrorConfig,
    store: SyncStore,
    commands: mpsc::Receiver<SyncCommand>,
}

impl<T: Transport> SyncService<T> {
    #[must_use]
    pub fn new(transport: T, config: MirrorConfig) -> (Self, StoreHandle, SyncControl) {
        let (store, handle) = SyncStore::new(config.reconnect.clone());
        let (tx, commands) = mpsc::channel(16);
        (
            Self {
                transport,
                config,
                store,
                commands,
            },
            handle,
            SyncControl { tx },
        )
    }

    /// Runs until a shutdown command arrives or every `SyncControl` is dropped.
    pub async fn run(mut self) {
        let mut ticker = interval(self.config.expiry_tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut phase = Phase::Connect;
        info!("Mirroring {}", self.transport.endpoint());

        loop {
            phase = match phase {
                Phase::Connect => match self.connect(&mut ticker).await {
                    Some(next) => next,
                    None => break,
                },
                Phase::Backoff(delay) => {
                    let wake = tokio::time::sleep(delay);
                    tokio::pin!(wake);
                    loop {
                        tokio::select! {
                            () = &mut wake => break Phase::Connect,
                            _ = ticker.tick() => {
                                self.store.tick(Utc::now());
                            }
                            command = self.commands.recv() => match command {
                                Some(SyncCommand::Reconnect) => {
                                    self.store.manual_retry(Utc::now());
                                    break Phase::Connect;
                                }
                                Some(SyncCommand::Shutdown) | None => {
                                    self.store.teardown(Utc::now());
                                    return;
                                }
                            },
                        }
                    }
                }
                Phase::Stalled => {
                    info!("Reconnect attempts exhausted; waiting for manual retry");
                    loop {
                        tokio::select! {
                            _ = ticker.tick() => {
                                self.store.tick(Utc::now());
                            }
                            command = self.commands.recv() => match command {
                                Some(SyncCommand::Reconnect) => {
                                    self.store.manual_retry(Utc::now());
                                    break Phase::Connect;
                                }
                                Some(SyncCommand::Shutdown) | None => {
                                    self.store.teardown(Utc::now());
                                    return;
                                }
                            },
                        }
                    }
                }
            };
        }
        self.store.teardown(Utc::now());
    }

    /// One connect attempt plus the session it opens. `None` means stop.
    async fn connect(&mut self, ticker: &mut Interval) -> Option<Phase> {
        self.store.begin_connect(Utc::now());
        let attempt = tokio::select! {
            result = self.transport.connect() => result,
            command = self.commands.recv() => {
                return match command {
                    Some(SyncCommand::Reconnect) => {
                        self.store.manual_retry(Utc::now());
                        Some(Phase::Connect)
                    }
                    Some(SyncCommand::Shutdown) | None => None,
                };
            }
        };

        let reason = match attempt {
            Ok(channel) => match self.session(channel, ticker).await {
                SessionEnd::Lost(reason) => reason,
                SessionEnd::Reconnect => {
                    self.store.manual_retry(Utc::now());
                    return Some(Phase::Connect);
                }
                SessionEnd::Shutdown => return None,
            },
            Err(err) => err.to_string(),
        };

        Some(match self.store.on_lost(&reason, Utc::now()) {
            ReconnectDecision::Retry { delay, .. } => Phase::Backoff(delay),
            ReconnectDecision::GiveUp => Phase::Stalled,
        })
    }

    async fn session(&mut self, mut channel: Box<dyn Channel>, ticker: &mut Interval) -> SessionEnd {
        let request = self.store.on_connected(Utc::now());
        let subscribe = Outbound::Subscribe {
            scopes: self.config.scopes.clone(),
        };
        for frame in [
            subscribe,
            Outbound::Resync {
                request_id: request.request_id,
            },
        ] {
            if let Err(err) = send_frame(channel.as_mut(), &frame).await {
                return SessionEnd::Lost(err.to_string());
            }
        }

        let mut last_inbound = Instant::now();
        let mut snapshot_deadline = Some(Instant::now() + self.config.snapshot_timeout);
        let mut pinger = interval_at(
            Instant::now() + self.config.ping_interval,
            self.config.ping_interval,
        );
        pinger.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let end = loop {
            let step = tokio::select! {
                frame = channel.recv() => Step::Frame(frame),
                _ = ticker.tick() => Step::Tick,
                _ = pinger.tick() => Step::Ping,
                command = self.commands.recv() => Step::Command(command),
            };

            match step {
                Step::Frame(Ok(Some(text))) => {
                    last_inbound = Instant::now();
                    let report = self.store.ingest_text(&text, Utc::now());
                    debug!("Frame outcome: {:?}", report.outcome);
                    if let Some(resync) = report.resync() {
                        if let Err(err) = send_frame(
                            channel.as_mut(),
                            &Outbound::Resync {
                                request_id: resync.request_id,
                            },
                        )
                        .await
                        {
                            break SessionEnd::Lost(err.to_string());
                        }
                        snapshot_deadline = Some(Instant::now() + self.config.snapshot_timeout);
                    }
                    if self.store.pending_request().is_none() {
                        snapshot_deadline = None;
                    }
                }
                Step::Frame(Ok(None)) => break SessionEnd::Lost("channel closed by peer".to_string()),
                Step::Frame(Err(err)) if err.is_transport() => break SessionEnd::Lost(err.to_string()),
                Step::Frame(Err(err)) => self.store.record_malformed(&err, Utc::now()),
                Step::Tick => {
                    self.store.tick(Utc::now());
                    if last_inbound.elapsed() >= self.config.idle_timeout {
                        let err = MirrorError::Timeout(format!(
                            "no frame received for {:?}",
                            self.config.idle_timeout
                        ));
                        break SessionEnd::Lost(err.to_string());
                    }
                    if snapshot_deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                        let request = self.store.request_snapshot();
                        warn!(
                            "Snapshot not received within {:?}; re-requesting as {}",
                            self.config.snapshot_timeout, request.request_id
                        );
                        if let Err(err) = send_frame(
                            channel.as_mut(),
                            &Outbound::Resync {
                                request_id: request.request_id,
                            },
                        )
                        .await
                        {
                            break SessionEnd::Lost(err.to_string());
                        }
                        snapshot_deadline = Some(Instant::now() + self.config.snapshot_timeout);
                    }
                }
                Step::Ping => {
                    if let Err(err) = send_frame(channel.as_mut(), &Outbound::Ping).await {
                        break SessionEnd::Lost(err.to_string());
                    }
                }
                Step::Command(Some(SyncCommand::Reconnect)) => break SessionEnd::Reconnect,
                Step::Command(Some(SyncCommand::Shutdown) | None) => break SessionEnd::Shutdown,
            }
        };

        if let Err(err) = channel.close().await {
            debug!("Ignoring close error: {}", err);
        }
        end
    }
}

async fn send_frame(channel: &mut dyn Channel, frame: &Outbound) -> Result<()> {
    channel.send(frame.encode()?).await
}
