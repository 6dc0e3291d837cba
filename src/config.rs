// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Persisted administrator settings.
//!
//! Settings live in a TOML file (default `modgate/server.toml`). Loading is
//! forgiving: every absent field falls back to its default on its own, and a
//! file that cannot be read or parsed is logged and replaced in memory by the
//! defaults without being overwritten on disk.
//!
//! Each field carries a schema version in `schema_versions`. When the code's
//! version for a field is newer than the stored one, the stored value is
//! replaced by the new default. Bump a field's entry in [`FIELD_SCHEMA`] only
//! when a new default must reach every existing install.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::report::SoftwareReport;

pub const DEFAULT_CONFIG_PATH: &str = "modgate/server.toml";

/// Current schema version of every migratable field.
pub const FIELD_SCHEMA: &[(&str, &str)] = &[
    ("report_grace_seconds", "1.0.0"),
    ("approval_grace_seconds", "1.0.0"),
    ("extra_disconnect_message", "1.0.0"),
    ("help_link", "1.0.0"),
    ("blacklist", "1.0.0"),
    ("whitelist", "1.0.0"),
    ("allowed_entries", "1.0.0"),
];

const DEFAULT_REPORT_GRACE_SECS: u64 = 15;
const DEFAULT_APPROVAL_GRACE_SECS: u64 = 30;
const DEFAULT_EXTRA_DISCONNECT_MESSAGE: &str =
    "Please contact the server owner with any problems or to request that new software be approved.";

/// Administrator-controlled settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceConfig {
    /// Seconds a participant has to submit its report after connecting.
    pub report_grace_seconds: u64,
    /// Seconds an administrator has to approve unrecognized software.
    pub approval_grace_seconds: u64,
    /// Appended to every compliance disconnect reason.
    pub extra_disconnect_message: String,
    /// Where participants can ask for help; omitted from messages when empty.
    pub help_link: String,
    pub blacklist: Vec<String>,
    pub whitelist: Vec<String>,
    /// Builds approved at runtime by an administrator.
    pub allowed_entries: Vec<SoftwareReport>,
    pub schema_versions: BTreeMap<String, String>,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self::defaults_for(FIELD_SCHEMA)
    }
}

impl ComplianceConfig {
    fn defaults_for(schema: &[(&str, &str)]) -> Self {
        Self {
            report_grace_seconds: DEFAULT_REPORT_GRACE_SECS,
            approval_grace_seconds: DEFAULT_APPROVAL_GRACE_SECS,
            extra_disconnect_message: DEFAULT_EXTRA_DISCONNECT_MESSAGE.to_string(),
            help_link: String::new(),
            blacklist: Vec::new(),
            whitelist: Vec::new(),
            allowed_entries: Vec::new(),
            schema_versions: schema
                .iter()
                .map(|(field, version)| (field.to_string(), version.to_string()))
                .collect(),
        }
    }

    pub fn report_grace(&self) -> Duration {
        Duration::from_secs(self.report_grace_seconds)
    }

    pub fn approval_grace(&self) -> Duration {
        Duration::from_secs(self.approval_grace_seconds)
    }

    /// Record an approved build, replacing any earlier approval for the same
    /// id. Returns `false` when the identical build was already recorded.
    pub fn approve(&mut self, report: &SoftwareReport) -> bool {
        if self.allowed_entries.iter().any(|r| r == report) {
            return false;
        }
        self.allowed_entries.retain(|r| r.id() != report.id());
        self.allowed_entries.push(report.clone());
        true
    }

    fn reset_field(&mut self, field: &str, defaults: &ComplianceConfig) {
        match field {
            "report_grace_seconds" => self.report_grace_seconds = defaults.report_grace_seconds,
            "approval_grace_seconds" => self.approval_grace_seconds = defaults.approval_grace_seconds,
            "extra_disconnect_message" => {
                self.extra_disconnect_message = defaults.extra_disconnect_message.clone()
            }
            "help_link" => self.help_link = defaults.help_link.clone(),
            "blacklist" => self.blacklist = defaults.blacklist.clone(),
            "whitelist" => self.whitelist = defaults.whitelist.clone(),
            "allowed_entries" => self.allowed_entries = defaults.allowed_entries.clone(),
            other => tracing::warn!("No default registered for config field '{}'", other),
        }
    }
}

/// On-disk shape: every field optional so each can fall back on its own.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawConfig {
    report_grace_seconds: Option<u64>,
    approval_grace_seconds: Option<u64>,
    extra_disconnect_message: Option<String>,
    help_link: Option<String>,
    blacklist: Option<Vec<String>>,
    whitelist: Option<Vec<String>>,
    allowed_entries: Option<Vec<SoftwareReport>>,
    schema_versions: Option<BTreeMap<String, String>>,
}

/// Fill absent fields from defaults, then migrate fields whose stored schema
/// version is older than `schema`. Returns the names of migrated fields.
pub(crate) fn resolve(raw: RawConfig, schema: &[(&str, &str)]) -> (ComplianceConfig, Vec<String>) {
    let defaults = ComplianceConfig::defaults_for(schema);
    let mut config = ComplianceConfig {
        report_grace_seconds: raw.report_grace_seconds.unwrap_or(defaults.report_grace_seconds),
        approval_grace_seconds: raw.approval_grace_seconds.unwrap_or(defaults.approval_grace_seconds),
        extra_disconnect_message: raw
            .extra_disconnect_message
            .unwrap_or_else(|| defaults.extra_disconnect_message.clone()),
        help_link: raw.help_link.unwrap_or_else(|| defaults.help_link.clone()),
        blacklist: raw.blacklist.unwrap_or_else(|| defaults.blacklist.clone()),
        whitelist: raw.whitelist.unwrap_or_else(|| defaults.whitelist.clone()),
        allowed_entries: raw.allowed_entries.unwrap_or_else(|| defaults.allowed_entries.clone()),
        schema_versions: raw
            .schema_versions
            .unwrap_or_else(|| defaults.schema_versions.clone()),
    };

    let mut migrated = Vec::new();
    for (field, current) in schema {
        let stale = match config.schema_versions.get(*field) {
            // Untracked field: adopt the current version, keep the value.
            None => false,
            Some(stored) => compare_versions(current, stored) == Ordering::Greater,
        };
        if stale {
            config.reset_field(field, &defaults);
            migrated.push(field.to_string());
        }
        let stored_is_newer = config
            .schema_versions
            .get(*field)
            .map(|stored| compare_versions(current, stored) == Ordering::Less)
            .unwrap_or(false);
        if !stored_is_newer {
            config.schema_versions.insert(field.to_string(), current.to_string());
        }
    }

    (config, migrated)
}

/// Compare dotted numeric versions, padding the shorter one with zeros.
/// A version that does not parse sorts below every valid version.
fn compare_versions(a: &str, b: &str) -> Ordering {
    fn parse(v: &str) -> Option<Vec<u64>> {
        v.trim().split('.').map(|part| part.parse::<u64>().ok()).collect()
    }

    match (parse(a), parse(b)) {
        (Some(mut a), Some(mut b)) => {
            let len = a.len().max(b.len());
            a.resize(len, 0);
            b.resize(len, 0);
            a.cmp(&b)
        }
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

fn read_config(path: &Path, schema: &[(&str, &str)]) -> Result<(ComplianceConfig, Vec<String>)> {
    if !path.exists() {
        return Ok((ComplianceConfig::defaults_for(schema), Vec::new()));
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let raw: RawConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config {}", path.display()))?;
    Ok(resolve(raw, schema))
}

/// Owns the in-memory settings and their backing file.
///
/// Reads and writes are explicit: the coordinator calls [`ConfigStore::load`]
/// at startup and [`ConfigStore::update`] after each administrative change.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: Option<PathBuf>,
    config: ComplianceConfig,
    /// Set while the backing file cannot be parsed; saving is refused so the
    /// operator's file is never replaced by in-memory state.
    load_failed: bool,
}

impl ConfigStore {
    /// Store that never touches disk.
    pub fn in_memory() -> Self {
        Self::with_config(ComplianceConfig::default())
    }

    /// In-memory store seeded with `config`.
    pub fn with_config(config: ComplianceConfig) -> Self {
        Self {
            path: None,
            config,
            load_failed: false,
        }
    }

    /// Load `path` and write it back so defaults and migrations are persisted.
    /// A malformed file is left untouched.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let mut store = Self {
            path: Some(path.into()),
            config: ComplianceConfig::default(),
            load_failed: false,
        };
        if store.load() {
            if let Err(e) = store.save() {
                tracing::error!("Failed to write config: {:#}", e);
            }
        }
        store
    }

    /// Re-read the backing file. Returns `false` if it could not be read or
    /// parsed, in which case the defaults are used.
    pub fn load(&mut self) -> bool {
        match self.read() {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Malformed config, falling back to defaults: {:#}", e);
                self.config = ComplianceConfig::default();
                false
            }
        }
    }

    /// Pick up edits made to the file since the last read. On failure the
    /// in-memory settings stay as they are.
    fn refresh(&mut self) {
        if let Err(e) = self.read() {
            tracing::error!("Malformed config, keeping current settings: {:#}", e);
        }
    }

    fn read(&mut self) -> Result<()> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        match read_config(path, FIELD_SCHEMA) {
            Ok((config, migrated)) => {
                if !migrated.is_empty() {
                    tracing::info!(
                        "Reset config fields to new defaults in {}: {}",
                        path.display(),
                        migrated.join(", ")
                    );
                }
                self.config = config;
                self.load_failed = false;
                Ok(())
            }
            Err(e) => {
                self.load_failed = true;
                Err(e)
            }
        }
    }

    /// Write the settings out. Refused while the file on disk is unreadable.
    pub fn save(&self) -> Result<()> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        if self.load_failed {
            anyhow::bail!(
                "Not overwriting unreadable config {}; fix the file so changes can be saved",
                path.display()
            );
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let content = toml::to_string_pretty(&self.config).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config {}", path.display()))?;
        Ok(())
    }

    /// Re-read the file, apply `change` and persist the result.
    pub fn update(&mut self, change: impl FnOnce(&mut ComplianceConfig)) -> Result<()> {
        self.refresh();
        change(&mut self.config);
        self.save()
    }

    pub fn config(&self) -> &ComplianceConfig {
        &self.config
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::OriginKind;

    fn entry(id: &str, version: &str) -> SoftwareReport {
        SoftwareReport::new(id, id, version, format!("{}.zip", id), OriginKind::Archive, "ff00")
    }

    fn raw(toml_src: &str) -> RawConfig {
        toml::from_str(toml_src).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = ComplianceConfig::default();
        assert_eq!(config.report_grace_seconds, 15);
        assert_eq!(config.approval_grace_seconds, 30);
        assert_eq!(config.report_grace(), Duration::from_secs(15));
        assert!(config.help_link.is_empty());
        assert!(config.allowed_entries.is_empty());
        assert_eq!(config.schema_versions.len(), FIELD_SCHEMA.len());
    }

    #[test]
    fn test_open_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modgate").join("server.toml");
        let store = ConfigStore::open(&path);
        assert_eq!(store.config(), &ComplianceConfig::default());
        assert!(path.exists());

        let reopened = ConfigStore::open(&path);
        assert_eq!(reopened.config(), store.config());
    }

    #[test]
    fn test_absent_fields_fall_back_individually() {
        let (config, migrated) = resolve(raw("report_grace_seconds = 5\nhelp_link = \"https://example.org\"\n"), FIELD_SCHEMA);
        assert_eq!(config.report_grace_seconds, 5);
        assert_eq!(config.approval_grace_seconds, 30);
        assert_eq!(config.help_link, "https://example.org");
        assert!(migrated.is_empty());
    }

    #[test]
    fn test_malformed_file_uses_defaults_and_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        std::fs::write(&path, "report_grace_seconds = \"soon\"\n[[[").unwrap();

        let store = ConfigStore::open(&path);
        assert_eq!(store.config(), &ComplianceConfig::default());
        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert!(on_disk.contains("soon"), "malformed file must be kept for the operator");
    }

    #[test]
    fn test_older_field_version_resets_to_default() {
        let schema = &[("extra_disconnect_message", "1.1.0"), ("help_link", "1.0.0")];
        let (config, migrated) = resolve(
            raw(r#"
extra_disconnect_message = "old text"
help_link = "https://keep.me"

[schema_versions]
extra_disconnect_message = "1.0.0"
help_link = "1.0.0"
"#),
            schema,
        );
        assert_eq!(config.extra_disconnect_message, DEFAULT_EXTRA_DISCONNECT_MESSAGE);
        assert_eq!(config.help_link, "https://keep.me");
        assert_eq!(config.schema_versions["extra_disconnect_message"], "1.1.0");
        assert_eq!(migrated, vec!["extra_disconnect_message".to_string()]);
    }

    #[test]
    fn test_blank_override_survives_when_version_current() {
        let (config, migrated) = resolve(
            raw(r#"
extra_disconnect_message = ""

[schema_versions]
extra_disconnect_message = "1.0.0"
"#),
            FIELD_SCHEMA,
        );
        assert_eq!(config.extra_disconnect_message, "");
        assert!(migrated.is_empty());
    }

    #[test]
    fn test_newer_stored_version_is_treated_as_current() {
        let (config, migrated) = resolve(
            raw(r#"
report_grace_seconds = 90

[schema_versions]
report_grace_seconds = "2.0.0"
"#),
            FIELD_SCHEMA,
        );
        assert_eq!(config.report_grace_seconds, 90);
        assert_eq!(config.schema_versions["report_grace_seconds"], "2.0.0");
        assert!(migrated.is_empty());
    }

    #[test]
    fn test_untracked_field_is_stamped_not_reset() {
        let (config, migrated) = resolve(
            raw(r#"
approval_grace_seconds = 5

[schema_versions]
report_grace_seconds = "1.0.0"
"#),
            FIELD_SCHEMA,
        );
        assert_eq!(config.approval_grace_seconds, 5);
        assert_eq!(config.schema_versions["approval_grace_seconds"], "1.0.0");
        assert!(migrated.is_empty());
    }

    #[test]
    fn test_unparseable_stored_version_migrates() {
        let (config, migrated) = resolve(
            raw(r#"
approval_grace_seconds = 5

[schema_versions]
approval_grace_seconds = "banana"
"#),
            FIELD_SCHEMA,
        );
        assert_eq!(config.approval_grace_seconds, 30);
        assert_eq!(migrated, vec!["approval_grace_seconds".to_string()]);
    }

    #[test]
    fn test_compare_versions() {
        assert_eq!(compare_versions("1.0.0", "1.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.10.0", "1.9.9"), Ordering::Greater);
        assert_eq!(compare_versions("1.0.0", "2"), Ordering::Less);
        assert_eq!(compare_versions("1.0.0", "x.y"), Ordering::Greater);
    }

    #[test]
    fn test_approve_replaces_same_id() {
        let mut config = ComplianceConfig::default();
        assert!(config.approve(&entry("minimap", "1.0")));
        assert!(!config.approve(&entry("minimap", "1.0")));
        assert!(config.approve(&entry("minimap", "1.1")));
        assert_eq!(config.allowed_entries, vec![entry("minimap", "1.1")]);
    }

    #[test]
    fn test_update_persists_allowed_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        let mut store = ConfigStore::open(&path);
        store
            .update(|c| {
                c.approve(&entry("minimap", "1.0"));
                c.blacklist.push("xray".to_string());
            })
            .unwrap();

        let reopened = ConfigStore::open(&path);
        assert_eq!(reopened.config().allowed_entries, vec![entry("minimap", "1.0")]);
        assert_eq!(reopened.config().blacklist, vec!["xray".to_string()]);
    }

    #[test]
    fn test_update_keeps_unreadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        std::fs::write(
            &path,
            "report_grace_seconds = \"oops\"\n\n[[allowed_entries]]\nid = \"keep\"\n",
        )
        .unwrap();

        let mut store = ConfigStore::open(&path);
        assert!(store.update(|c| c.whitelist.push("shaders".to_string())).is_err());
        assert_eq!(store.config().whitelist, vec!["shaders".to_string()]);

        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert!(on_disk.contains("keep"));
        assert!(!on_disk.contains("shaders"));
    }

    #[test]
    fn test_update_saves_once_file_is_repaired() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        std::fs::write(&path, "report_grace_seconds = \"oops\"\n").unwrap();
        let mut store = ConfigStore::open(&path);

        std::fs::write(&path, "report_grace_seconds = 40\n").unwrap();
        store.update(|c| c.blacklist.push("xray".to_string())).unwrap();

        let reopened = ConfigStore::open(&path);
        assert_eq!(reopened.config().report_grace_seconds, 40);
        assert_eq!(reopened.config().blacklist, vec!["xray".to_string()]);
    }

    #[test]
    fn test_update_picks_up_external_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        let mut store = ConfigStore::open(&path);

        std::fs::write(&path, "report_grace_seconds = 99\n").unwrap();

        store.update(|c| c.blacklist.push("xray".to_string())).unwrap();
        assert_eq!(store.config().report_grace_seconds, 99);

        let reopened = ConfigStore::open(&path);
        assert_eq!(reopened.config().report_grace_seconds, 99);
        assert_eq!(reopened.config().blacklist, vec!["xray".to_string()]);
    }

    #[test]
    fn test_in_memory_store_never_writes() {
        let mut store = ConfigStore::in_memory();
        assert!(store.path().is_none());
        store.update(|c| c.report_grace_seconds = 1).unwrap();
        assert_eq!(store.config().report_grace_seconds, 1);
        assert!(store.load());
        assert_eq!(store.config().report_grace_seconds, 1);
    }
}
