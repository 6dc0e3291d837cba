// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Async host runtime.
//!
//! [`ComplianceHost`] owns the coordinator behind a mutex and an mpsc inbox of
//! [`HostEvent`]s. [`run_host`] is the single event loop: it applies every
//! connect, report, leave and admin command in arrival order, ticks the grace
//! checks on an interval, and carries out the resulting directives by calling
//! the [`SessionTransport`] and fanning notices out to the notification
//! channels.

use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::coordinator::{ComplianceCoordinator, Directive};
use crate::error::AdminError;
use crate::notify::{ChannelRegistry, NotificationChannel};
use crate::report::ReportPacket;
use crate::session::{Participant, PhaseKind};

const TICK_INTERVAL: Duration = Duration::from_millis(250);
const INBOX_CAPACITY: usize = 256;

/// How the runtime reaches the hosting server's connections.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// End `uid`'s connection, showing `reason` to the participant.
    async fn disconnect(&self, uid: &str, reason: &str) -> anyhow::Result<()>;
}

/// Administrative command, as typed by an operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    ApproveUid(String),
    ApproveName(String),
    ApproveLast,
    Blacklist(String),
    Whitelist(String),
    LongestGrace,
}

impl FromStr for AdminCommand {
    type Err = anyhow::Error;

    /// Parses `approve-uid <uid>`, `approve <name>`, `approve-last`,
    /// `blacklist <id>`, `whitelist <id>` and `longest-grace`, with or without
    /// the leading `/modgate`.
    fn from_str(line: &str) -> anyhow::Result<Self> {
        let mut words = line.split_whitespace().peekable();
        if words.peek() == Some(&"/modgate") {
            words.next();
        }
        let verb = words
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty command"))?;
        let rest = words.collect::<Vec<_>>().join(" ");
        let argument = |what: &str| -> anyhow::Result<String> {
            if rest.is_empty() {
                anyhow::bail!("'{}' needs a {}", verb, what);
            }
            Ok(rest.clone())
        };

        Ok(match verb {
            "approve-uid" => AdminCommand::ApproveUid(argument("uid")?),
            "approve" => AdminCommand::ApproveName(argument("participant name")?),
            "approve-last" => AdminCommand::ApproveLast,
            "blacklist" => AdminCommand::Blacklist(argument("software id")?),
            "whitelist" => AdminCommand::Whitelist(argument("software id")?),
            "longest-grace" => AdminCommand::LongestGrace,
            other => anyhow::bail!("Unknown command '{}'", other),
        })
    }
}

/// Input to the host event loop.
#[derive(Debug)]
pub enum HostEvent {
    Connected(Participant),
    Report { uid: String, packet: ReportPacket },
    Left { uid: String },
    Admin {
        command: AdminCommand,
        reply: oneshot::Sender<Result<String, AdminError>>,
    },
}

pub struct ComplianceHost {
    coordinator: Mutex<ComplianceCoordinator>,
    transport: Arc<dyn SessionTransport>,
    channels: ChannelRegistry,
    event_tx: mpsc::Sender<HostEvent>,
    event_rx: Mutex<Option<mpsc::Receiver<HostEvent>>>,
}

impl ComplianceHost {
    pub fn new(
        coordinator: ComplianceCoordinator,
        transport: Arc<dyn SessionTransport>,
        channels: ChannelRegistry,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(INBOX_CAPACITY);
        Self {
            coordinator: Mutex::new(coordinator),
            transport,
            channels,
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
        }
    }

    /// Sender for feeding events from connection handlers.
    pub fn event_tx(&self) -> mpsc::Sender<HostEvent> {
        self.event_tx.clone()
    }

    pub async fn submit(&self, event: HostEvent) -> anyhow::Result<()> {
        self.event_tx
            .send(event)
            .await
            .map_err(|_| anyhow::anyhow!("Compliance host is not running"))
    }

    pub async fn connected(&self, participant: Participant) -> anyhow::Result<()> {
        self.submit(HostEvent::Connected(participant)).await
    }

    pub async fn report(&self, uid: &str, packet: ReportPacket) -> anyhow::Result<()> {
        self.submit(HostEvent::Report {
            uid: uid.to_string(),
            packet,
        })
        .await
    }

    pub async fn left(&self, uid: &str) -> anyhow::Result<()> {
        self.submit(HostEvent::Left { uid: uid.to_string() }).await
    }

    /// Run an administrative command through the event loop and wait for its
    /// reply.
    pub async fn admin(&self, command: AdminCommand) -> Result<String, AdminError> {
        let (reply, response) = oneshot::channel();
        self.event_tx
            .send(HostEvent::Admin { command, reply })
            .await
            .map_err(|_| AdminError::HostUnavailable)?;
        response.await.map_err(|_| AdminError::HostUnavailable)?
    }

    pub fn phase(&self, uid: &str) -> Option<PhaseKind> {
        self.coordinator().phase(uid)
    }

    /// Read-only access to the coordinator.
    pub fn inspect<R>(&self, f: impl FnOnce(&ComplianceCoordinator) -> R) -> R {
        f(&self.coordinator())
    }

    fn coordinator(&self) -> MutexGuard<'_, ComplianceCoordinator> {
        self.coordinator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, event: HostEvent) {
        let now = Instant::now();
        match event {
            HostEvent::Connected(participant) => self.coordinator().on_connect(participant, now),
            HostEvent::Report { uid, packet } => self.coordinator().on_report(&uid, packet, now),
            HostEvent::Left { uid } => self.coordinator().on_leave(&uid),
            HostEvent::Admin { command, reply } => {
                let result = self.execute(command);
                // Caller stopped waiting
                let _ = reply.send(result);
            }
        }
    }

    fn execute(&self, command: AdminCommand) -> Result<String, AdminError> {
        let mut coordinator = self.coordinator();
        match command {
            AdminCommand::ApproveUid(uid) => coordinator.approve_by_identity(&uid),
            AdminCommand::ApproveName(name) => coordinator.approve_by_display_name(&name),
            AdminCommand::ApproveLast => coordinator.approve_last(),
            AdminCommand::Blacklist(id) => coordinator.blacklist(&id),
            AdminCommand::Whitelist(id) => coordinator.whitelist(&id),
            AdminCommand::LongestGrace => {
                let longest = coordinator.longest_observed_grace();
                Ok(format!(
                    "Longest report wait so far: {:.3} s (report grace is {} s)",
                    longest.as_secs_f64(),
                    coordinator.config().report_grace_seconds
                ))
            }
        }
    }

    /// Carry out every directive the coordinator has queued.
    fn dispatch(&self) {
        let directives = self.coordinator().take_directives();
        for directive in directives {
            match directive {
                Directive::Disconnect { uid, reason } => {
                    let transport = Arc::clone(&self.transport);
                    tokio::spawn(async move {
                        if let Err(e) = transport.disconnect(&uid, &reason).await {
                            tracing::warn!("Failed to disconnect {}: {:#}", uid, e);
                        }
                    });
                }
                Directive::Broadcast(notice) => {
                    for ch in self.channels.available() {
                        let ch: Arc<dyn NotificationChannel> = Arc::clone(ch);
                        let notice = notice.clone();
                        tokio::spawn(async move {
                            if let Err(e) = ch.broadcast(&notice).await {
                                tracing::warn!("Failed to send notice to {}: {:#}", ch.name(), e);
                            }
                        });
                    }
                }
            }
        }
    }
}

/// Drive the host until its inbox closes. May only be started once per host.
pub async fn run_host(host: Arc<ComplianceHost>) -> anyhow::Result<()> {
    let mut event_rx = host
        .event_rx
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
        .ok_or_else(|| anyhow::anyhow!("run_host called more than once"))?;

    let mut tick = tokio::time::interval(TICK_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    tracing::info!(
        "Compliance host started with {} notification channel(s)",
        host.channels.len()
    );

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                host.apply(event);
                host.dispatch();
            }
            _ = tick.tick() => {
                host.coordinator().tick(Instant::now());
                host.dispatch();
            }
        }
    }

    tracing::info!("Compliance host stopped");
    Ok(())
}
