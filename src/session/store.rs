// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Session registry. Tracks live sessions and their unrecognized software.
//!
//! The [`SessionRegistry`] is the data layer for the compliance coordinator.
//! It maps participant uids to their current [`SessionEntry`], remembers the
//! unrecognized reports from each participant's latest submission (kept after
//! a disconnect so an administrator can still approve them), and indexes
//! display names for approval by name.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{GraceKind, Participant, PhaseKind, SessionEntry, SessionPhase};
use crate::report::SoftwareReport;
use crate::timer::deadline_after;

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, SessionEntry>,
    pending: HashMap<String, Vec<SoftwareReport>>,
    /// Lowercased display name -> uid of the latest participant using it.
    names: HashMap<String, String>,
    /// uid -> last known display name.
    known: HashMap<String, String>,
    last_flagged: Option<String>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new session in the report-grace phase.
    ///
    /// Replaces any previous session for the same uid and clears its pending
    /// reports. Returns the new session id.
    pub fn connect(&mut self, participant: Participant, now: Instant, report_grace: Duration) -> Uuid {
        let session_id = Uuid::new_v4();
        self.pending.remove(&participant.uid);
        self.names
            .insert(participant.name.to_lowercase(), participant.uid.clone());
        self.known
            .insert(participant.uid.clone(), participant.name.clone());
        self.sessions.insert(
            participant.uid.clone(),
            SessionEntry {
                session_id,
                participant,
                phase: SessionPhase::AwaitingReport {
                    connected_at: now,
                    deadline: deadline_after(now, report_grace),
                },
            },
        );
        session_id
    }

    /// Returns how long the participant took to report, or `None` when the
    /// session is not waiting for a report.
    pub fn report_wait(&self, uid: &str, now: Instant) -> Option<Duration> {
        match self.sessions.get(uid).map(|s| &s.phase) {
            Some(SessionPhase::AwaitingReport { connected_at, .. }) => {
                Some(now.saturating_duration_since(*connected_at))
            }
            _ => None,
        }
    }

    /// Move a session to `Admitted`. Returns `false` if there is no session.
    pub fn admit(&mut self, uid: &str, at: DateTime<Utc>) -> bool {
        match self.sessions.get_mut(uid) {
            Some(entry) => {
                entry.phase = SessionPhase::Admitted { since: at };
                true
            }
            None => false,
        }
    }

    /// Record `unrecognized` as the participant's pending reports and move the
    /// session to the approval-grace phase. Returns the session id the
    /// approval check must be scheduled for.
    pub fn hold_for_approval(
        &mut self,
        uid: &str,
        unrecognized: Vec<SoftwareReport>,
        now: Instant,
        approval_grace: Duration,
    ) -> Option<Uuid> {
        let entry = self.sessions.get_mut(uid)?;
        entry.phase = SessionPhase::AwaitingApproval {
            deadline: deadline_after(now, approval_grace),
        };
        self.pending.insert(uid.to_string(), unrecognized);
        self.last_flagged = Some(uid.to_string());
        Some(entry.session_id)
    }

    /// End a session (leave or disconnect). Pending reports are kept.
    pub fn remove(&mut self, uid: &str) -> Option<SessionEntry> {
        self.sessions.remove(uid)
    }

    /// Fire-time guard for a grace check: removes and returns the session only
    /// if it is still the same connection and still in the guarded phase.
    pub fn expire(&mut self, uid: &str, session_id: Uuid, kind: GraceKind) -> Option<SessionEntry> {
        let still_waiting = self
            .sessions
            .get(uid)
            .map(|s| s.session_id == session_id && s.phase.grace() == Some(kind))
            .unwrap_or(false);
        if still_waiting {
            self.sessions.remove(uid)
        } else {
            None
        }
    }

    pub fn get(&self, uid: &str) -> Option<&SessionEntry> {
        self.sessions.get(uid)
    }

    pub fn phase(&self, uid: &str) -> Option<PhaseKind> {
        self.sessions.get(uid).map(|s| s.phase.kind())
    }

    pub fn pending(&self, uid: &str) -> Option<&[SoftwareReport]> {
        self.pending.get(uid).map(Vec::as_slice)
    }

    /// Remove and return the pending reports for `uid`. Once taken, `uid` is
    /// no longer the last flagged participant.
    pub fn take_pending(&mut self, uid: &str) -> Option<Vec<SoftwareReport>> {
        let taken = self.pending.remove(uid);
        if taken.is_some() && self.last_flagged.as_deref() == Some(uid) {
            self.last_flagged = None;
        }
        taken
    }

    /// Case-insensitive lookup of the uid last seen with `name`.
    pub fn resolve_name(&self, name: &str) -> Option<&str> {
        self.names.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Last known display name for `uid`, falling back to the uid itself.
    pub fn display_name<'a>(&'a self, uid: &'a str) -> &'a str {
        self.known.get(uid).map(String::as_str).unwrap_or(uid)
    }

    /// The participant most recently held for approval.
    pub fn last_flagged(&self) -> Option<&str> {
        self.last_flagged.as_deref()
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
