// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Software report data model.
//!
//! A [`SoftwareReport`] describes one loaded software unit (id, display name,
//! version, where it was loaded from, and a content fingerprint). Participants
//! submit a [`ReportPacket`] holding one report per unit they run; the host
//! builds the same reports for its own units to seed the allow list.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::fingerprint::ContentHasher;

/// How a software unit was packaged when it was loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginKind {
    /// Packaged archive (zip or similar).
    Archive,
    /// Loose folder on disk.
    Folder,
    /// Precompiled assembly / shared library.
    Assembly,
    /// Single source file compiled at load time.
    SourceFile,
    /// Shipped with the host itself.
    BuiltIn,
    /// Anything the reporting side could not classify.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for OriginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OriginKind::Archive => "Archive",
            OriginKind::Folder => "Folder",
            OriginKind::Assembly => "Assembly",
            OriginKind::SourceFile => "SourceFile",
            OriginKind::BuiltIn => "BuiltIn",
            OriginKind::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

/// Metadata of a loaded unit, before it has been fingerprinted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitMetadata {
    pub id: String,
    pub name: String,
    pub version: String,
    pub source_label: String,
    pub origin: OriginKind,
}

/// Declared description of one software unit.
///
/// Two reports describe the same software when their ids match; a report
/// fully matches an allow-list entry when id, version and fingerprint match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareReport {
    id: String,
    name: String,
    version: String,
    source_label: String,
    origin: OriginKind,
    fingerprint: String,
}

impl SoftwareReport {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
        source_label: impl Into<String>,
        origin: OriginKind,
        fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            source_label: source_label.into(),
            origin,
            fingerprint: fingerprint.into(),
        }
    }

    /// Build a report from unit metadata and an already computed fingerprint.
    pub fn from_metadata(meta: UnitMetadata, fingerprint: impl Into<String>) -> Self {
        Self {
            id: meta.id,
            name: meta.name,
            version: meta.version,
            source_label: meta.source_label,
            origin: meta.origin,
            fingerprint: fingerprint.into(),
        }
    }

    /// Fingerprint `content` with `hasher` and build the report.
    pub fn capture(meta: UnitMetadata, content: &[u8], hasher: &dyn ContentHasher) -> Self {
        let fingerprint = hasher.fingerprint(content);
        Self::from_metadata(meta, fingerprint)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn source_label(&self) -> &str {
        &self.source_label
    }

    pub fn origin(&self) -> OriginKind {
        self.origin
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// One-line diagnostic rendering, stable across releases so operators
    /// can grep logs for it.
    pub fn describe(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SoftwareReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[SoftwareReport] - Type: {} - Name: {} - ID: {} - Version: {} - Source: {} - Fingerprint: {}",
            self.origin, self.name, self.id, self.version, self.source_label, self.fingerprint
        )
    }
}

/// Wire payload: every unit a participant has loaded, in load order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPacket {
    #[serde(default)]
    pub reports: Vec<SoftwareReport>,
}

impl ReportPacket {
    pub fn new(reports: Vec<SoftwareReport>) -> Self {
        Self { reports }
    }

    pub fn push(&mut self, report: SoftwareReport) {
        self.reports.push(report);
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    /// Decode a packet received from the transport.
    pub fn from_json(payload: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl FromIterator<SoftwareReport> for ReportPacket {
    fn from_iter<I: IntoIterator<Item = SoftwareReport>>(iter: I) -> Self {
        Self {
            reports: iter.into_iter().collect(),
        }
    }
}
