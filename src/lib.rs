// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! modgate admits session participants only when every software unit they
//! run matches an approved build.
//!
//! A participant connects, submits a [`ReportPacket`] describing its software,
//! and is admitted, held for administrator approval, or disconnected. The
//! [`ComplianceCoordinator`] holds the state machine; [`ComplianceHost`] runs
//! it on tokio against a [`SessionTransport`].

pub mod allowlist;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fingerprint;
pub mod notify;
pub mod policy;
pub mod report;
pub mod runtime;
pub mod session;
pub mod timer;

pub use allowlist::{AllowList, MatchFailure};
pub use config::{ComplianceConfig, ConfigStore};
pub use coordinator::{ComplianceCoordinator, Directive};
pub use error::AdminError;
pub use fingerprint::{ContentHasher, Sha256Hasher};
pub use notify::{Notice, NotificationChannel, Severity};
pub use policy::{ItemPolicy, ItemVerdict};
pub use report::{OriginKind, ReportPacket, SoftwareReport, UnitMetadata};
pub use runtime::{run_host, AdminCommand, ComplianceHost, HostEvent, SessionTransport};
pub use session::{Participant, PhaseKind};
