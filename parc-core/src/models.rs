//! Records exchanged between the reconciler and the GLPI proxy.
//!
//! Field names on the wire are the ones the dashboard already speaks
//! (`computers`, `newStatus`, `computerId`...), hence the serde renames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::DeviceStatus;

/// Identifiant opaque d'un statut GLPI (`states_id`)
pub type StatusId = u64;

/// Action attendue par `PUT devices/batch-status-update`
pub const AUTO_UPDATE_ACTION: &str = "auto-update-status";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignedUser {
    pub id: u64,
    #[serde(default)]
    pub name: String,
}

/// Snapshot of a GLPI computer, read-only for the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: u64,
    pub name: String,
    /// Raw timestamp as reported upstream, parsed lazily by the classifier
    #[serde(default)]
    pub last_seen: Option<String>,
    /// Free-text status label (`states_id` expanded by GLPI)
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub assigned_user: Option<AssignedUser>,
}

impl Device {
    pub fn has_assigned_user(&self) -> bool {
        self.assigned_user.is_some()
    }

    pub fn current_status(&self) -> DeviceStatus {
        DeviceStatus::from_label(self.status.as_deref(), self.has_assigned_user())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCatalogEntry {
    pub id: StatusId,
    pub name: String,
}

impl StatusCatalogEntry {
    pub fn new(id: StatusId, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }
}

/// Transition proposée par le classifieur pour un poste, jamais persistée.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionProposal {
    #[serde(rename = "id")]
    pub device_id: u64,
    #[serde(rename = "name")]
    pub device_name: String,
    pub last_seen: String,
    pub current_status: String,
    #[serde(rename = "newStatus")]
    pub proposed_status: String,
    pub reason: String,
    #[serde(default)]
    pub assigned_user: Option<AssignedUser>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedTransition {
    #[serde(rename = "computerId")]
    pub device_id: u64,
    #[serde(rename = "computerName")]
    pub device_name: String,
    pub old_status: String,
    pub new_status: String,
    pub reason: String,
}

impl AppliedTransition {
    pub fn from_proposal(proposal: &TransitionProposal) -> Self {
        Self {
            device_id: proposal.device_id,
            device_name: proposal.device_name.clone(),
            old_status: proposal.current_status.clone(),
            new_status: proposal.proposed_status.clone(),
            reason: proposal.reason.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedTransition {
    #[serde(rename = "computerId")]
    pub device_id: u64,
    #[serde(rename = "computerName")]
    pub device_name: String,
    pub error: String,
}

impl FailedTransition {
    pub fn for_proposal(proposal: &TransitionProposal, error: impl Into<String>) -> Self {
        Self {
            device_id: proposal.device_id,
            device_name: proposal.device_name.clone(),
            error: error.into(),
        }
    }
}

/// Corps de `PUT devices/batch-status-update`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchUpdateRequest {
    pub action: String,
    pub computers: Vec<TransitionProposal>,
    pub statuses: Vec<StatusCatalogEntry>,
}

impl BatchUpdateRequest {
    pub fn auto_update(computers: Vec<TransitionProposal>, statuses: Vec<StatusCatalogEntry>) -> Self {
        Self {
            action: AUTO_UPDATE_ACTION.to_string(),
            computers,
            statuses,
        }
    }

    pub fn is_auto_update(&self) -> bool {
        self.action == AUTO_UPDATE_ACTION
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchUpdateResponse {
    pub success: bool,
    #[serde(default)]
    pub updates: Vec<AppliedTransition>,
    #[serde(default)]
    pub errors: Vec<FailedTransition>,
    #[serde(default)]
    pub message: String,
}

impl BatchUpdateResponse {
    pub fn from_results(updates: Vec<AppliedTransition>, errors: Vec<FailedTransition>) -> Self {
        let message = format!(
            "{} computer(s) updated, {} error(s)",
            updates.len(),
            errors.len()
        );
        Self {
            success: true,
            updates,
            errors,
            message,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Scheduled,
    Manual,
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerKind::Scheduled => f.write_str("scheduled"),
            TriggerKind::Manual => f.write_str("manual"),
        }
    }
}

/// One completed (or aborted) reconciliation cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub trigger: TriggerKind,
    pub applied_count: usize,
    pub failed_count: usize,
    pub summary: String,
    pub applied: Vec<AppliedTransition>,
    #[serde(default)]
    pub failed: Vec<FailedTransition>,
}

impl HistoryEntry {
    pub fn new(
        timestamp: DateTime<Utc>,
        trigger: TriggerKind,
        summary: impl Into<String>,
        applied: Vec<AppliedTransition>,
        failed: Vec<FailedTransition>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            trigger,
            applied_count: applied.len(),
            failed_count: failed.len(),
            summary: summary.into(),
            applied,
            failed,
        }
    }
}
