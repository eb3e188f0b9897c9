//! Activation audit entries.

use crate::platform::EntityStatus;
use crate::sdf::EntityKind;
use serde::Serialize;
use std::fmt;

/// What happened to a status decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// The platform was asked to change the status.
    Applied,
    /// The entity already had the status.
    Skipped,
    /// Decided but not sent.
    DryRun,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Applied => "applied",
            AuditOutcome::Skipped => "skipped",
            AuditOutcome::DryRun => "dry_run",
        }
    }

    /// Whether the decision counts as a mutation.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, AuditOutcome::Skipped)
    }
}

/// One status decision of an activation run, rendered as `Kind:Id:Status=Value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub kind: EntityKind,
    pub id: String,
    pub status: EntityStatus,
    pub outcome: AuditOutcome,
}

impl AuditEntry {
    pub fn new(
        kind: EntityKind,
        id: impl Into<String>,
        status: EntityStatus,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            kind,
            id: id.into(),
            status,
            outcome,
        }
    }
}

impl fmt::Display for AuditEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:Status={}", self.kind, self.id, self.status)
    }
}
