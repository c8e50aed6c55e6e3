/**
 * PROXY GLPI - Implémentation de l'inventaire au-dessus de l'API GLPI
 *
 * RÔLE : fournit au reconciler (et aux routes /api) les trois opérations
 * du collaborateur : snapshot des postes, catalogue des statuts, application
 * d'un lot de changements de statut.
 *
 * FONCTIONNEMENT :
 * - une session GLPI par opération, toujours fermée
 * - snapshot : utilisateurs affectés récupérés par groupes parallèles, pause
 *   entre groupes pour ne pas surcharger GLPI
 * - lot : un PUT par poste, pause entre postes, désaffectation de
 *   l'utilisateur seulement quand le statut cible est "Non affecté"
 * - les postes "Délégué" ne sont jamais modifiés
 */

use crate::config::GlpiConf;
use crate::glpi::{GlpiClient, GlpiComputer, GlpiError, GlpiSession};
use async_trait::async_trait;
use futures::future::join_all;
use parc_core::catalog::default_status_catalog;
use parc_core::models::{
    AppliedTransition, AssignedUser, BatchUpdateRequest, BatchUpdateResponse, Device,
    FailedTransition, StatusCatalogEntry, TransitionProposal,
};
use parc_core::status::normalize;
use parc_core::{resolve_status, DeviceStatus, Inventory, InventoryError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub struct GlpiInventory {
    client: GlpiClient,
    snapshot_batch_size: usize,
    snapshot_batch_pause: Duration,
    update_pause: Duration,
}

impl GlpiInventory {
    pub fn from_config(conf: &GlpiConf) -> Result<Self, GlpiError> {
        Ok(Self {
            client: GlpiClient::new(conf)?,
            snapshot_batch_size: conf.snapshot_batch_size.max(1),
            snapshot_batch_pause: Duration::from_millis(conf.snapshot_batch_pause_ms),
            update_pause: Duration::from_millis(conf.update_pause_ms),
        })
    }

    /// Snapshot des postes avec leur utilisateur affecté
    pub async fn load_devices(&self) -> Result<Vec<Device>, GlpiError> {
        let session = self.client.open_session().await?;
        let result = self.collect_devices(&session).await;
        session.close().await;
        result
    }

    async fn collect_devices(&self, session: &GlpiSession) -> Result<Vec<Device>, GlpiError> {
        let computers = session.list_computers().await?;
        let groups: Vec<&[GlpiComputer]> = computers.chunks(self.snapshot_batch_size).collect();
        let mut devices = Vec::with_capacity(computers.len());

        for (index, group) in groups.iter().enumerate() {
            let users = join_all(group.iter().map(|c| session.assigned_user(c.id))).await;

            for (computer, user) in group.iter().zip(users) {
                let assigned_user = match user {
                    Ok(user) => user.map(|u| AssignedUser { id: u.id, name: u.name.unwrap_or_default() }),
                    Err(e) => {
                        warn!("utilisateur du poste {} indisponible: {e}", computer.id);
                        None
                    }
                };
                devices.push(Device {
                    id: computer.id,
                    name: computer.name.clone().unwrap_or_default(),
                    last_seen: computer.last_seen(),
                    status: computer.status_label(),
                    assigned_user,
                });
            }

            if index + 1 < groups.len() && !self.snapshot_batch_pause.is_zero() {
                tokio::time::sleep(self.snapshot_batch_pause).await;
            }
        }

        debug!("snapshot GLPI: {} poste(s)", devices.len());
        Ok(devices)
    }

    /// Catalogue `State` ; catalogue standard si GLPI n'en renvoie aucun
    pub async fn load_statuses(&self) -> Result<Vec<StatusCatalogEntry>, GlpiError> {
        let session = self.client.open_session().await?;
        let states = session.list_states().await;
        session.close().await;

        let catalog: Vec<StatusCatalogEntry> = match states {
            Ok(states) => states
                .into_iter()
                .filter_map(|s| s.name.map(|name| StatusCatalogEntry::new(s.id, name)))
                .collect(),
            Err(GlpiError::Status { status, .. }) => {
                warn!("endpoint State en échec (HTTP {status})");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        if catalog.is_empty() {
            info!("aucun statut GLPI, usage du catalogue par défaut");
            return Ok(default_status_catalog());
        }
        Ok(catalog)
    }

    /// Applique un lot `auto-update-status` poste par poste
    pub async fn apply_batch(&self, request: &BatchUpdateRequest) -> Result<BatchUpdateResponse, GlpiError> {
        let session = self.client.open_session().await?;
        let mut updates = Vec::new();
        let mut errors = Vec::new();
        let mut first_write = true;

        for proposal in &request.computers {
            if DeviceStatus::from_label(Some(proposal.current_status.as_str()), true) == DeviceStatus::Delegated {
                info!("poste {} délégué, aucune modification automatique", proposal.device_name);
                continue;
            }

            let Some(target) = resolve_status(&request.statuses, &proposal.proposed_status) else {
                warn!("statut introuvable: {}", proposal.proposed_status);
                errors.push(FailedTransition::for_proposal(
                    proposal,
                    format!("status not found: {}", proposal.proposed_status),
                ));
                continue;
            };

            if !first_write && !self.update_pause.is_zero() {
                tokio::time::sleep(self.update_pause).await;
            }
            first_write = false;

            match session.update_computer_state(proposal.device_id, target.id).await {
                Ok(()) => {
                    info!(
                        "{}: {} → {} (statut {})",
                        proposal.device_name, proposal.current_status, proposal.proposed_status, target.id
                    );
                    updates.push(AppliedTransition::from_proposal(proposal));
                    unassign_if_needed(&session, proposal).await;
                }
                Err(GlpiError::Status { status, body }) => {
                    error!("mise à jour {} refusée: {status} {body}", proposal.device_name);
                    errors.push(FailedTransition::for_proposal(
                        proposal,
                        format!("GLPI error: {status} - {body}"),
                    ));
                }
                Err(e) => {
                    error!("mise à jour {} en échec: {e}", proposal.device_name);
                    errors.push(FailedTransition::for_proposal(proposal, e.to_string()));
                }
            }
        }

        session.close().await;
        let response = BatchUpdateResponse::from_results(updates, errors);
        info!("lot appliqué: {}", response.message);
        Ok(response)
    }
}

/// Seul "Non affecté" retire l'utilisateur ; "Désaffecté" le laisse en place
fn requests_unassignment(proposed_status: &str) -> bool {
    matches!(normalize(proposed_status).as_str(), "non affecté" | "non affecte")
}

async fn unassign_if_needed(session: &GlpiSession, proposal: &TransitionProposal) {
    if !requests_unassignment(&proposal.proposed_status) || proposal.assigned_user.is_none() {
        return;
    }
    match session.unassign_user(proposal.device_id).await {
        Ok(()) => info!("utilisateur désaffecté pour {}", proposal.device_name),
        Err(e) => warn!("désaffectation {} en échec: {e}", proposal.device_name),
    }
}

#[async_trait]
impl Inventory for GlpiInventory {
    async fn fetch_devices(&self) -> Result<Vec<Device>, InventoryError> {
        Ok(self.load_devices().await?)
    }

    async fn fetch_statuses(&self) -> Result<Vec<StatusCatalogEntry>, InventoryError> {
        Ok(self.load_statuses().await?)
    }

    async fn submit_batch(&self, request: &BatchUpdateRequest) -> Result<BatchUpdateResponse, InventoryError> {
        Ok(self.apply_batch(request).await?)
    }
}
