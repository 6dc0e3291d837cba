// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Per-participant session state.
//!
//! Every connection attempt gets a fresh session id. A session is in exactly
//! one phase at a time; the two grace phases are sequential, never
//! overlapping, which the [`SessionPhase`] enum makes unrepresentable
//! otherwise. Grace checks scheduled for a session compare its id and phase
//! when they fire, so a check left over from an earlier phase or an earlier
//! connection does nothing.

use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod store;

pub use store::SessionRegistry;

/// A connected participant as identified by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Stable unique identity.
    pub uid: String,
    /// Display name, may change between connections.
    pub name: String,
}

impl Participant {
    pub fn new(uid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.uid)
    }
}

/// Which grace window a scheduled check guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GraceKind {
    /// Waiting for the participant's report.
    Report,
    /// Waiting for an administrator to approve unrecognized software.
    Approval,
}

impl fmt::Display for GraceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraceKind::Report => write!(f, "report"),
            GraceKind::Approval => write!(f, "approval"),
        }
    }
}

/// Where a session is in the compliance protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    /// Connected, report not received yet.
    AwaitingReport { connected_at: Instant, deadline: Instant },
    /// Report had unrecognized items; waiting for an administrator.
    AwaitingApproval { deadline: Instant },
    /// Fully compliant.
    Admitted { since: DateTime<Utc> },
}

impl SessionPhase {
    pub fn kind(&self) -> PhaseKind {
        match self {
            SessionPhase::AwaitingReport { .. } => PhaseKind::AwaitingReport,
            SessionPhase::AwaitingApproval { .. } => PhaseKind::AwaitingApproval,
            SessionPhase::Admitted { .. } => PhaseKind::Admitted,
        }
    }

    /// The grace window this phase is waiting on, if any.
    pub fn grace(&self) -> Option<GraceKind> {
        match self {
            SessionPhase::AwaitingReport { .. } => Some(GraceKind::Report),
            SessionPhase::AwaitingApproval { .. } => Some(GraceKind::Approval),
            SessionPhase::Admitted { .. } => None,
        }
    }
}

/// Timestamp-free view of [`SessionPhase`] for status queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    AwaitingReport,
    AwaitingApproval,
    Admitted,
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseKind::AwaitingReport => write!(f, "Awaiting report"),
            PhaseKind::AwaitingApproval => write!(f, "Awaiting approval"),
            PhaseKind::Admitted => write!(f, "Admitted"),
        }
    }
}

/// One live connection.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub session_id: Uuid,
    pub participant: Participant,
    pub phase: SessionPhase,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_phase_grace_kinds() {
        let now = Instant::now();
        let awaiting = SessionPhase::AwaitingReport {
            connected_at: now,
            deadline: now + Duration::from_secs(15),
        };
        assert_eq!(awaiting.kind(), PhaseKind::AwaitingReport);
        assert_eq!(awaiting.grace(), Some(GraceKind::Report));

        let approval = SessionPhase::AwaitingApproval { deadline: now };
        assert_eq!(approval.grace(), Some(GraceKind::Approval));

        let admitted = SessionPhase::Admitted { since: Utc::now() };
        assert_eq!(admitted.grace(), None);
        assert_eq!(admitted.kind().to_string(), "Admitted");
    }

    #[test]
    fn test_participant_display() {
        let p = Participant::new("uid-1", "Tyron");
        assert_eq!(p.to_string(), "Tyron (uid-1)");
    }
}
