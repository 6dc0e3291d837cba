// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Administrator notification channels.
//!
//! Compliance outcomes that need an operator's attention (unrecognized
//! software awaiting approval, blacklist hits, approval timeouts) are
//! broadcast as [`Notice`]s to every available [`NotificationChannel`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod log;
pub mod queue;

pub use log::LogChannel;
pub use queue::QueueChannel;

/// How urgently an operator should look at a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARN"),
            Severity::Critical => write!(f, "CRIT"),
        }
    }
}

/// A broadcast message for administrators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub severity: Severity,
    /// uid of the participant the notice is about, if any.
    pub subject: Option<String>,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl Notice {
    pub fn new(severity: Severity, subject: Option<&str>, text: impl Into<String>) -> Self {
        Self {
            severity,
            subject: subject.map(str::to_string),
            text: text.into(),
            at: Utc::now(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.text)
    }
}

/// A destination for administrator notices.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    async fn broadcast(&self, notice: &Notice) -> anyhow::Result<()>;
}

/// The set of channels notices fan out to.
#[derive(Default, Clone)]
pub struct ChannelRegistry {
    channels: Vec<Arc<dyn NotificationChannel>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, channel: Arc<dyn NotificationChannel>) {
        self.channels.push(channel);
    }

    /// Channels currently able to deliver.
    pub fn available(&self) -> impl Iterator<Item = &Arc<dyn NotificationChannel>> {
        self.channels.iter().filter(|c| c.is_available())
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
