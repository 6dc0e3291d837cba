// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Notification channel that writes notices to the host log.

use async_trait::async_trait;

use super::{Notice, NotificationChannel, Severity};

/// Always-available channel backed by `tracing`.
#[derive(Debug, Default)]
pub struct LogChannel;

impl LogChannel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn broadcast(&self, notice: &Notice) -> anyhow::Result<()> {
        let subject = notice.subject.as_deref().unwrap_or("-");
        match notice.severity {
            Severity::Info => tracing::info!(subject = %subject, "{}", notice.text),
            Severity::Warning => tracing::warn!(subject = %subject, "{}", notice.text),
            Severity::Critical => tracing::error!(subject = %subject, "{}", notice.text),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_channel_always_succeeds() {
        let channel = LogChannel::new();
        assert_eq!(channel.name(), "log");
        assert!(channel.is_available());
        for severity in [Severity::Info, Severity::Warning, Severity::Critical] {
            channel
                .broadcast(&Notice::new(severity, None, "hello"))
                .await
                .expect("log channel never fails");
        }
    }
}
