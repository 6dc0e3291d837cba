// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Compliance coordinator: drives every participant from connect to
//! admission or disconnection.
//!
//! The coordinator is synchronous and owns all protocol state. Callers feed it
//! discrete events (connect, report, leave, clock tick, admin command) with an
//! explicit `now`, then drain the [`Directive`]s it produced and carry them out
//! (disconnect a participant, broadcast a notice). Grace windows are plain
//! scheduled checks; a check that fires after its session moved on is ignored.

use std::time::{Duration, Instant};

use chrono::Utc;

use crate::allowlist::{AllowList, MatchFailure};
use crate::config::{ComplianceConfig, ConfigStore};
use crate::error::AdminError;
use crate::notify::{Notice, Severity};
use crate::policy::{ItemPolicy, ItemVerdict};
use crate::report::{ReportPacket, SoftwareReport};
use crate::session::{GraceKind, Participant, PhaseKind, SessionRegistry};
use crate::timer::{deadline_after, GraceCheck, TimerQueue};

pub const APPROVE_UID_COMMAND: &str = "/modgate approve-uid";
pub const APPROVE_NAME_COMMAND: &str = "/modgate approve";
pub const APPROVE_LAST_COMMAND: &str = "/modgate approve-last";

const REPORT_TIMEOUT_REASON: &str = "Timed out waiting for your client's report. Please try again?";
const EMPTY_REPORT_REASON: &str = "Your report was empty, no bypass here!";

/// An action the host must carry out on the coordinator's behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// End the participant's connection with a user-visible reason.
    Disconnect { uid: String, reason: String },
    /// Send a notice to administrators.
    Broadcast(Notice),
}

pub struct ComplianceCoordinator {
    allow_list: AllowList,
    policy: ItemPolicy,
    sessions: SessionRegistry,
    timers: TimerQueue,
    store: ConfigStore,
    longest_report_wait: Duration,
    outbox: Vec<Directive>,
}

impl ComplianceCoordinator {
    /// Build the coordinator from loaded settings and the host's own units,
    /// which are always trusted.
    pub fn new(store: ConfigStore, host_reports: impl IntoIterator<Item = SoftwareReport>) -> Self {
        let config = store.config();
        let allow_list = AllowList::from_seed(config.allowed_entries.iter().cloned(), host_reports);
        let policy = ItemPolicy::from_lists(config.blacklist.iter().cloned(), config.whitelist.iter().cloned());
        tracing::info!(
            "Allow list seeded with {} entries ({} blacklisted, {} whitelisted ids)",
            allow_list.len(),
            config.blacklist.len(),
            config.whitelist.len()
        );
        Self {
            allow_list,
            policy,
            sessions: SessionRegistry::new(),
            timers: TimerQueue::new(),
            store,
            longest_report_wait: Duration::ZERO,
            outbox: Vec::new(),
        }
    }

    // ── Events ──────────────────────────────────────────────────────────

    /// A participant connected; start its report-grace window.
    pub fn on_connect(&mut self, participant: Participant, now: Instant) {
        let grace = self.store.config().report_grace();
        let uid = participant.uid.clone();
        let session_id = self.sessions.connect(participant, now, grace);
        self.timers.schedule(GraceCheck {
            due: deadline_after(now, grace),
            uid,
            session_id,
            kind: GraceKind::Report,
        });
    }

    /// A participant left on its own. Outstanding grace checks become no-ops.
    pub fn on_leave(&mut self, uid: &str) {
        if let Some(entry) = self.sessions.remove(uid) {
            tracing::debug!("{} left while {}", entry.participant, entry.phase.kind());
        }
    }

    /// A participant's report arrived.
    pub fn on_report(&mut self, uid: &str, packet: ReportPacket, now: Instant) {
        let name = self.sessions.display_name(uid).to_string();

        if packet.is_empty() {
            tracing::warn!("{} ({}) sent an empty report, disconnecting", name, uid);
            self.sessions.remove(uid);
            self.disconnect(uid, EMPTY_REPORT_REASON.to_string());
            return;
        }

        let Some(wait) = self.sessions.report_wait(uid, now) else {
            tracing::error!(
                "Internal error: report received from {} ({}) but no report deadline was recorded; dropping it",
                name,
                uid
            );
            return;
        };
        tracing::info!(
            "Received report from {} ({}) with {} item(s) after {} ms",
            name,
            uid,
            packet.len(),
            wait.as_millis()
        );
        self.longest_report_wait = self.longest_report_wait.max(wait);

        self.validate(uid, &name, packet.reports, now);
    }

    /// Fire every grace check due at `now`.
    pub fn tick(&mut self, now: Instant) {
        for check in self.timers.pop_due(now) {
            let Some(entry) = self.sessions.expire(&check.uid, check.session_id, check.kind) else {
                continue;
            };
            match check.kind {
                GraceKind::Report => {
                    tracing::info!(
                        "Disconnecting {} for taking too long to report (report grace is {} s; change report_grace_seconds in {})",
                        entry.participant,
                        self.store.config().report_grace_seconds,
                        self.config_location()
                    );
                    self.disconnect(&check.uid, REPORT_TIMEOUT_REASON.to_string());
                }
                GraceKind::Approval => self.reject_unapproved(&entry.participant),
            }
        }
    }

    // ── Validation ──────────────────────────────────────────────────────

    fn validate(&mut self, uid: &str, name: &str, reports: Vec<SoftwareReport>, now: Instant) {
        let blocked: Vec<SoftwareReport> = reports
            .iter()
            .filter(|r| self.policy.evaluate(r) == ItemVerdict::Blocked)
            .cloned()
            .collect();
        if !blocked.is_empty() {
            self.reject_blacklisted(uid, name, &blocked);
            return;
        }

        let failures: Vec<MatchFailure> = reports
            .iter()
            .filter(|r| self.policy.evaluate(r) == ItemVerdict::Check)
            .filter_map(|r| self.allow_list.has_errors(r))
            .collect();

        if failures.is_empty() {
            self.sessions.admit(uid, Utc::now());
            tracing::info!("Admitted {} ({}): all {} item(s) approved", name, uid, reports.len());
            return;
        }

        self.hold_for_approval(uid, name, failures, now);
    }

    fn reject_blacklisted(&mut self, uid: &str, name: &str, blocked: &[SoftwareReport]) {
        self.sessions.remove(uid);

        let listing: Vec<String> = blocked.iter().map(SoftwareReport::describe).collect();
        tracing::warn!(
            "Disconnecting {} ({}) for blacklisted software: {}",
            name,
            uid,
            listing.join("; ")
        );
        self.broadcast(
            Severity::Critical,
            uid,
            format!(
                "Disconnected {} ({}) for running blacklisted software:\n{}",
                name,
                uid,
                listing.join("\n")
            ),
        );

        let names: Vec<String> = blocked
            .iter()
            .map(|r| format!("{} ({})", r.name(), r.id()))
            .collect();
        let reason = self.with_footer(format!(
            "You are running software that is not allowed on this server:\n{}",
            names.join("\n")
        ));
        self.disconnect(uid, reason);
    }

    fn hold_for_approval(&mut self, uid: &str, name: &str, failures: Vec<MatchFailure>, now: Instant) {
        let grace = self.store.config().approval_grace();
        let reports: Vec<SoftwareReport> = failures.iter().map(|f| f.report().clone()).collect();
        let Some(session_id) = self.sessions.hold_for_approval(uid, reports, now, grace) else {
            return;
        };
        self.timers.schedule(GraceCheck {
            due: deadline_after(now, grace),
            uid: uid.to_string(),
            session_id,
            kind: GraceKind::Approval,
        });

        let mut text = format!(
            "{} ({}) is running {} unrecognized item(s) and will be disconnected in {} s unless approved:\n",
            name,
            uid,
            failures.len(),
            grace.as_secs()
        );
        for failure in &failures {
            text.push_str(&format!("{}\n  {}\n", failure, failure.report().describe()));
        }
        text.push_str(&format!(
            "To add all of the above to the allow list, trusting that {}'s builds are untampered with, type:\n{} {}\nor\n{} {}\nor\n{}",
            name, APPROVE_UID_COMMAND, uid, APPROVE_NAME_COMMAND, name, APPROVE_LAST_COMMAND
        ));
        tracing::warn!("Holding {} ({}) for approval of {} item(s)", name, uid, failures.len());
        self.broadcast(Severity::Warning, uid, text);
    }

    fn reject_unapproved(&mut self, participant: &Participant) {
        let issues: Vec<String> = self
            .sessions
            .pending(&participant.uid)
            .unwrap_or_default()
            .iter()
            .map(|r| {
                self.allow_list
                    .has_errors(r)
                    .map(|f| f.to_string())
                    .unwrap_or_else(|| r.describe())
            })
            .collect();

        tracing::warn!(
            "Disconnecting {}: unrecognized software was not approved within {} s (approval_grace_seconds in {})",
            participant,
            self.store.config().approval_grace_seconds,
            self.config_location()
        );
        self.broadcast(
            Severity::Warning,
            &participant.uid,
            format!(
                "Disconnected {}: unrecognized software was not approved in time. It can still be approved with {} {}",
                participant, APPROVE_UID_COMMAND, participant.uid
            ),
        );

        let reason = self.with_footer(format!(
            "Problems were found with your software:\n{}\n\nIt was not approved in time.",
            issues.join("\n\n")
        ));
        self.disconnect(&participant.uid, reason);
    }

    // ── Administrative operations ───────────────────────────────────────

    /// Approve every unrecognized item from `uid`'s latest report.
    ///
    /// Works whether or not the participant is still connected; a participant
    /// still in its approval window is admitted immediately.
    pub fn approve_by_identity(&mut self, uid: &str) -> Result<String, AdminError> {
        let reports = self
            .sessions
            .take_pending(uid)
            .ok_or_else(|| AdminError::UnknownIdentity(uid.to_string()))?;

        for report in &reports {
            self.allow_list.add_report(report.clone());
        }
        if let Err(e) = self.store.update(|config| {
            for report in &reports {
                config.approve(report);
            }
        }) {
            tracing::error!("Approvals for {} are active but could not be saved: {:#}", uid, e);
        }

        let name = self.sessions.display_name(uid).to_string();
        let admitted = self.sessions.phase(uid) == Some(PhaseKind::AwaitingApproval)
            && self.sessions.admit(uid, Utc::now());

        let mut reply = format!("Ok, added {} item(s) from {} to the allow list.", reports.len(), name);
        if admitted {
            reply.push_str(&format!(" {} is admitted.", name));
        }
        tracing::info!("{}", reply);
        self.broadcast(Severity::Info, uid, reply.clone());
        Ok(reply)
    }

    /// Approve by the display name a participant last connected with.
    pub fn approve_by_display_name(&mut self, name: &str) -> Result<String, AdminError> {
        let uid = self
            .sessions
            .resolve_name(name)
            .ok_or_else(|| AdminError::UnknownDisplayName(name.to_string()))?
            .to_string();
        self.approve_by_identity(&uid)
    }

    /// Approve the participant most recently held for approval.
    pub fn approve_last(&mut self) -> Result<String, AdminError> {
        let uid = self
            .sessions
            .last_flagged()
            .ok_or(AdminError::NothingFlagged)?
            .to_string();
        self.approve_by_identity(&uid)
    }

    /// Force disconnection of anyone reporting `id` from their next report on.
    pub fn blacklist(&mut self, id: &str) -> Result<String, AdminError> {
        let changed = self.policy.block(id);
        self.persist_override(id, ItemVerdict::Blocked);
        Ok(if changed {
            format!("Ok, '{}' is now blacklisted.", id)
        } else {
            format!("'{}' was already blacklisted.", id)
        })
    }

    /// Skip allow-list matching for `id` from the next report on.
    pub fn whitelist(&mut self, id: &str) -> Result<String, AdminError> {
        let changed = self.policy.bypass(id);
        self.persist_override(id, ItemVerdict::Bypass);
        Ok(if changed {
            format!("Ok, '{}' is now whitelisted.", id)
        } else {
            format!("'{}' was already whitelisted.", id)
        })
    }

    /// Longest time any participant has taken to report since startup.
    pub fn longest_observed_grace(&self) -> Duration {
        self.longest_report_wait
    }

    // ── Queries ─────────────────────────────────────────────────────────

    /// Drain the directives produced since the last call.
    pub fn take_directives(&mut self) -> Vec<Directive> {
        std::mem::take(&mut self.outbox)
    }

    pub fn phase(&self, uid: &str) -> Option<PhaseKind> {
        self.sessions.phase(uid)
    }

    pub fn pending(&self, uid: &str) -> Option<&[SoftwareReport]> {
        self.sessions.pending(uid)
    }

    /// When the next grace check is due, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_due()
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    pub fn policy(&self) -> &ItemPolicy {
        &self.policy
    }

    pub fn config(&self) -> &ComplianceConfig {
        self.store.config()
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    /// Record one blacklist or whitelist change on top of the current file,
    /// then adopt the merged lists.
    fn persist_override(&mut self, id: &str, verdict: ItemVerdict) {
        let saved = self.store.update(|config| {
            let (add, remove) = match verdict {
                ItemVerdict::Blocked => (&mut config.blacklist, &mut config.whitelist),
                _ => (&mut config.whitelist, &mut config.blacklist),
            };
            remove.retain(|other| other != id);
            if !add.iter().any(|other| other == id) {
                add.push(id.to_string());
            }
        });
        if let Err(e) = saved {
            tracing::error!("Blacklist/whitelist change is active but could not be saved: {:#}", e);
        }

        let config = self.store.config();
        self.policy = ItemPolicy::from_lists(config.blacklist.iter().cloned(), config.whitelist.iter().cloned());
    }

    fn with_footer(&self, mut reason: String) -> String {
        let config = self.store.config();
        if !config.extra_disconnect_message.is_empty() {
            reason.push('\n');
            reason.push_str(&config.extra_disconnect_message);
        }
        if !config.help_link.is_empty() {
            reason.push_str(&format!("\nContact server at: {}", config.help_link));
        }
        reason
    }

    fn config_location(&self) -> String {
        self.store
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "the in-memory config".to_string())
    }

    fn disconnect(&mut self, uid: &str, reason: String) {
        self.outbox.push(Directive::Disconnect {
            uid: uid.to_string(),
            reason,
        });
    }

    fn broadcast(&mut self, severity: Severity, uid: &str, text: String) {
        self.outbox
            .push(Directive::Broadcast(Notice::new(severity, Some(uid), text)));
    }
}
