// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Administrator overrides applied before allow-list matching.
//!
//! A blacklisted id forces disconnection no matter what else the participant
//! reports. A whitelisted id skips allow-list matching for that item only.
//! When an id appears in both lists the blacklist wins.

use std::collections::BTreeSet;

use crate::report::SoftwareReport;

/// Outcome of checking one reported item against the override lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemVerdict {
    /// The id is blacklisted.
    Blocked,
    /// The id is whitelisted; skip allow-list matching.
    Bypass,
    /// No override; run allow-list matching.
    Check,
}

/// Blacklist and whitelist of software ids.
#[derive(Debug, Clone, Default)]
pub struct ItemPolicy {
    blacklist: BTreeSet<String>,
    whitelist: BTreeSet<String>,
}

impl ItemPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_lists(
        blacklist: impl IntoIterator<Item = String>,
        whitelist: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            blacklist: blacklist.into_iter().collect(),
            whitelist: whitelist.into_iter().collect(),
        }
    }

    /// Blacklist `id`, dropping it from the whitelist. Returns `false` if it
    /// was already blacklisted.
    pub fn block(&mut self, id: &str) -> bool {
        self.whitelist.remove(id);
        self.blacklist.insert(id.to_string())
    }

    /// Whitelist `id`, dropping it from the blacklist. Returns `false` if it
    /// was already whitelisted.
    pub fn bypass(&mut self, id: &str) -> bool {
        self.blacklist.remove(id);
        self.whitelist.insert(id.to_string())
    }

    pub fn evaluate(&self, report: &SoftwareReport) -> ItemVerdict {
        if self.blacklist.contains(report.id()) {
            ItemVerdict::Blocked
        } else if self.whitelist.contains(report.id()) {
            ItemVerdict::Bypass
        } else {
            ItemVerdict::Check
        }
    }

    pub fn is_blacklisted(&self, id: &str) -> bool {
        self.blacklist.contains(id)
    }

    pub fn is_whitelisted(&self, id: &str) -> bool {
        self.whitelist.contains(id)
    }

    /// Sorted blacklist, as persisted.
    pub fn blacklist(&self) -> Vec<String> {
        self.blacklist.iter().cloned().collect()
    }

    /// Sorted whitelist, as persisted.
    pub fn whitelist(&self) -> Vec<String> {
        self.whitelist.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::OriginKind;

    fn item(id: &str) -> SoftwareReport {
        SoftwareReport::new(id, id, "1.0", "x.zip", OriginKind::Archive, "ff")
    }

    #[test]
    fn test_no_override_means_check() {
        let policy = ItemPolicy::new();
        assert_eq!(policy.evaluate(&item("minimap")), ItemVerdict::Check);
    }

    #[test]
    fn test_blacklisted_is_blocked() {
        let policy = ItemPolicy::from_lists(vec!["xray".to_string()], vec![]);
        assert_eq!(policy.evaluate(&item("xray")), ItemVerdict::Blocked);
        assert_eq!(policy.evaluate(&item("minimap")), ItemVerdict::Check);
    }

    #[test]
    fn test_whitelisted_bypasses() {
        let policy = ItemPolicy::from_lists(vec![], vec!["shaders".to_string()]);
        assert_eq!(policy.evaluate(&item("shaders")), ItemVerdict::Bypass);
    }

    #[test]
    fn test_blacklist_wins_when_listed_twice() {
        let policy = ItemPolicy::from_lists(vec!["xray".to_string()], vec!["xray".to_string()]);
        assert_eq!(policy.evaluate(&item("xray")), ItemVerdict::Blocked);
    }

    #[test]
    fn test_lists_are_mutually_exclusive_after_admin_change() {
        let mut policy = ItemPolicy::new();
        assert!(policy.bypass("xray"));
        assert!(policy.block("xray"));
        assert!(!policy.is_whitelisted("xray"));
        assert!(!policy.block("xray"), "second block is a no-op");

        assert!(policy.bypass("xray"));
        assert!(!policy.is_blacklisted("xray"));
        assert_eq!(policy.whitelist(), vec!["xray".to_string()]);
    }
}
