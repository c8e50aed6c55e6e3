//! Status classes derived from GLPI's free-text labels.

use serde::{Deserialize, Serialize};

/// Normalisation commune aux comparaisons de libellés : trim + minuscules.
pub fn normalize(label: &str) -> String {
    label.trim().to_lowercase()
}

/// Classe canonique du statut courant d'un poste.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceStatus {
    Assigned,
    Delegated,
    Unassigned,
    OnLeave,
    InTransition,
}

impl DeviceStatus {
    /// Unknown labels fall back on the assignment itself: a computer with a
    /// user counts as assigned, one without as unassigned.
    pub fn from_label(label: Option<&str>, has_assigned_user: bool) -> Self {
        let normalized = label.map(normalize).unwrap_or_default();
        match normalized.as_str() {
            "affecté" | "affecte" => Self::Assigned,
            "délégué" | "delegue" => Self::Delegated,
            "non affecté" | "non affecte" | "désaffecté" | "desaffecte" => Self::Unassigned,
            "en congé" | "en conge" => Self::OnLeave,
            "en transition" => Self::InTransition,
            _ if has_assigned_user => Self::Assigned,
            _ => Self::Unassigned,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Assigned => "Affecté",
            Self::Delegated => "Délégué",
            Self::Unassigned => "Non affecté",
            Self::OnLeave => "En congé",
            Self::InTransition => "En transition",
        }
    }

    /// Delegated computers are never touched automatically and unassigned
    /// ones are terminal.
    pub fn is_protected(self) -> bool {
        matches!(self, Self::Unassigned | Self::Delegated)
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Statuts que le classifieur peut proposer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetStatus {
    Deactivated,
    OnLeave,
    InTransition,
    Assigned,
}

impl TargetStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Deactivated => "Désaffecté",
            Self::OnLeave => "En congé",
            Self::InTransition => "En transition",
            Self::Assigned => "Affecté",
        }
    }
}
