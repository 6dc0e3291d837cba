// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Allow list of approved software builds.
//!
//! Entries are keyed by software id; the last entry added for an id wins.
//! [`AllowList::has_errors`] distinguishes software that was never approved
//! from software whose version or fingerprint drifted since approval, and
//! renders a diagnostic an operator can act on.

use std::collections::HashMap;
use std::fmt;

use crate::report::SoftwareReport;

/// A field that differs between a submitted report and its allow-list entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMismatch {
    pub field: &'static str,
    pub received: String,
    pub expected: String,
}

/// Why a report failed allow-list matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchFailure {
    /// No entry exists for this id.
    Unknown { report: SoftwareReport },
    /// An entry exists but the build differs.
    Mismatch {
        report: SoftwareReport,
        fields: Vec<FieldMismatch>,
    },
}

impl MatchFailure {
    /// The offending report as submitted.
    pub fn report(&self) -> &SoftwareReport {
        match self {
            MatchFailure::Unknown { report } | MatchFailure::Mismatch { report, .. } => report,
        }
    }
}

impl fmt::Display for MatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchFailure::Unknown { report } => write!(
                f,
                "{} ({}) version {}: unknown software, not on the allow list",
                report.name(),
                report.id(),
                report.version()
            ),
            MatchFailure::Mismatch { report, fields } => {
                write!(f, "{} ({}) does not match the approved build:", report.name(), report.id())?;
                for m in fields {
                    write!(f, " {} received '{}' expected '{}';", m.field, m.received, m.expected)?;
                }
                Ok(())
            }
        }
    }
}

/// Approved software builds, one canonical entry per id.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    entries: HashMap<String, SoftwareReport>,
}

impl AllowList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from the host's own units, then persisted approvals. Approvals go
    /// last so an approved build of a host unit keeps working after restart,
    /// the same as when it was approved at runtime.
    pub fn from_seed(
        approved: impl IntoIterator<Item = SoftwareReport>,
        host: impl IntoIterator<Item = SoftwareReport>,
    ) -> Self {
        let mut list = Self::new();
        for report in host.into_iter().chain(approved) {
            list.add_report(report);
        }
        list
    }

    /// Insert or replace the entry for `report.id()`.
    pub fn add_report(&mut self, report: SoftwareReport) {
        self.entries.insert(report.id().to_string(), report);
    }

    /// Returns `None` when id, version and fingerprint all match the stored
    /// entry, otherwise the reason matching failed.
    pub fn has_errors(&self, report: &SoftwareReport) -> Option<MatchFailure> {
        let Some(expected) = self.entries.get(report.id()) else {
            return Some(MatchFailure::Unknown {
                report: report.clone(),
            });
        };

        let mut fields = Vec::new();
        if report.version() != expected.version() {
            fields.push(FieldMismatch {
                field: "version",
                received: report.version().to_string(),
                expected: expected.version().to_string(),
            });
        }
        if report.fingerprint() != expected.fingerprint() {
            fields.push(FieldMismatch {
                field: "fingerprint",
                received: report.fingerprint().to_string(),
                expected: expected.fingerprint().to_string(),
            });
        }

        if fields.is_empty() {
            None
        } else {
            Some(MatchFailure::Mismatch {
                report: report.clone(),
                fields,
            })
        }
    }

    pub fn get(&self, id: &str) -> Option<&SoftwareReport> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
