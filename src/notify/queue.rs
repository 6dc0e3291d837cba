// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Queue notification channel.
//!
//! Forwards notices over a tokio mpsc channel so an admin console (chat
//! bridge, terminal UI, web socket) can drain the receiver end and show them
//! in-game or on screen.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Notice, NotificationChannel};

/// Notification channel that forwards notices on an mpsc sender.
pub struct QueueChannel {
    notice_tx: mpsc::Sender<Notice>,
}

impl QueueChannel {
    pub fn new(notice_tx: mpsc::Sender<Notice>) -> Self {
        Self { notice_tx }
    }
}

#[async_trait]
impl NotificationChannel for QueueChannel {
    fn name(&self) -> &str {
        "queue"
    }

    fn is_available(&self) -> bool {
        !self.notice_tx.is_closed()
    }

    async fn broadcast(&self, notice: &Notice) -> anyhow::Result<()> {
        // Console went away between the availability check and now.
        if let Err(dropped) = self.notice_tx.send(notice.clone()).await {
            tracing::debug!("Queue receiver closed, dropping notice: {}", dropped.0);
        }
        Ok(())
    }
}
