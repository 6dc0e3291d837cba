// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Errors returned by administrative operations.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdminError {
    /// No unrecognized reports are recorded for this uid.
    #[error("Unrecognized participant uid '{0}'")]
    UnknownIdentity(String),

    /// No participant has connected under this display name.
    #[error("Could not find participant with name '{0}'")]
    UnknownDisplayName(String),

    /// Nobody has been held for approval since the host started.
    #[error("No participant has been flagged for approval yet")]
    NothingFlagged,

    /// The host event loop is not running.
    #[error("Compliance host is not running")]
    HostUnavailable,
}
