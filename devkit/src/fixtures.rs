/*!
Fixtures pour les tests de réconciliation

Construit des postes conformes au snapshot du proxy GLPI sans écrire de JSON.
*/

use chrono::{DateTime, Duration, TimeZone, Utc};
use parc_core::catalog::default_status_catalog;
use parc_core::models::{AssignedUser, Device, StatusCatalogEntry};

/// Instant de référence fixe pour des tests reproductibles
pub fn reference_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Catalogue GLPI standard (1 Non affecté ... 8 En transition)
pub fn stock_catalog() -> Vec<StatusCatalogEntry> {
    default_status_catalog()
}

/// Builder pour les postes de test
pub struct DeviceBuilder {
    device: Device,
}

impl DeviceBuilder {
    pub fn new(id: u64, name: &str) -> Self {
        Self {
            device: Device {
                id,
                name: name.to_string(),
                last_seen: None,
                status: None,
                assigned_user: None,
            },
        }
    }

    pub fn status(mut self, label: &str) -> Self {
        self.device.status = Some(label.to_string());
        self
    }

    pub fn assigned(self) -> Self {
        let id = self.device.id;
        self.assigned_to(id + 100, &format!("user{id}"))
    }

    pub fn assigned_to(mut self, user_id: u64, login: &str) -> Self {
        self.device.assigned_user = Some(AssignedUser {
            id: user_id,
            name: login.to_string(),
        });
        self
    }

    pub fn last_seen_raw(mut self, raw: &str) -> Self {
        self.device.last_seen = Some(raw.to_string());
        self
    }

    /// Dernière activité `ago` avant `reference`, au format GLPI `date_mod`
    pub fn seen_ago(mut self, reference: DateTime<Utc>, ago: Duration) -> Self {
        let seen = reference - ago;
        self.device.last_seen = Some(seen.format("%Y-%m-%d %H:%M:%S").to_string());
        self
    }

    pub fn build(self) -> Device {
        self.device
    }
}
