/*!
Mock Inventory pour développement sans GLPI

Simule le proxy GLPI en mémoire : snapshot de postes, catalogue de statuts,
application des lots. Enregistre chaque lot soumis et permet de bloquer
`submit_batch` pour simuler un appel réseau lent.
*/

use async_trait::async_trait;
use parc_core::models::{
    AppliedTransition, BatchUpdateRequest, BatchUpdateResponse, Device, StatusCatalogEntry,
};
use parc_core::{Inventory, InventoryError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};

/// Comportement de `submit_batch`
#[derive(Debug, Clone)]
pub enum BatchBehavior {
    /// Applique tous les postes et met à jour le snapshot en mémoire
    ApplyAll,
    /// Renvoie la réponse fournie telle quelle
    Respond(BatchUpdateResponse),
    /// Échec transport
    Fail(String),
}

struct Gate {
    started: Notify,
    release: Semaphore,
}

#[derive(Clone)]
pub struct MockInventory {
    devices: Arc<Mutex<Vec<Device>>>,
    statuses: Arc<Mutex<Vec<StatusCatalogEntry>>>,
    devices_error: Arc<Mutex<Option<String>>>,
    statuses_error: Arc<Mutex<Option<String>>>,
    behavior: Arc<Mutex<BatchBehavior>>,
    batches: Arc<Mutex<Vec<BatchUpdateRequest>>>,
    device_fetches: Arc<AtomicUsize>,
    status_fetches: Arc<AtomicUsize>,
    gate: Arc<Mutex<Option<Arc<Gate>>>>,
}

impl MockInventory {
    pub fn new() -> Self {
        Self {
            devices: Arc::new(Mutex::new(Vec::new())),
            statuses: Arc::new(Mutex::new(Vec::new())),
            devices_error: Arc::new(Mutex::new(None)),
            statuses_error: Arc::new(Mutex::new(None)),
            behavior: Arc::new(Mutex::new(BatchBehavior::ApplyAll)),
            batches: Arc::new(Mutex::new(Vec::new())),
            device_fetches: Arc::new(AtomicUsize::new(0)),
            status_fetches: Arc::new(AtomicUsize::new(0)),
            gate: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_devices(self, devices: Vec<Device>) -> Self {
        *self.devices.lock() = devices;
        self
    }

    pub fn with_statuses(self, statuses: Vec<StatusCatalogEntry>) -> Self {
        *self.statuses.lock() = statuses;
        self
    }

    pub fn with_behavior(self, behavior: BatchBehavior) -> Self {
        *self.behavior.lock() = behavior;
        self
    }

    pub fn set_devices(&self, devices: Vec<Device>) {
        *self.devices.lock() = devices;
    }

    /// Les lectures suivantes de postes échouent (None pour rétablir)
    pub fn fail_devices(&self, error: Option<&str>) {
        *self.devices_error.lock() = error.map(str::to_string);
    }

    pub fn fail_statuses(&self, error: Option<&str>) {
        *self.statuses_error.lock() = error.map(str::to_string);
    }

    /// Bloque les prochains `submit_batch` jusqu'à `release_batches`
    pub fn hold_batches(&self) {
        *self.gate.lock() = Some(Arc::new(Gate {
            started: Notify::new(),
            release: Semaphore::new(0),
        }));
    }

    /// Attend qu'un lot soit entré dans `submit_batch` (après `hold_batches`)
    pub async fn wait_batch_started(&self) {
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.started.notified().await;
        }
    }

    pub fn release_batches(&self) {
        if let Some(gate) = self.gate.lock().take() {
            gate.release.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    /// Récupère tous les lots soumis (pour assertions de tests)
    pub fn submitted_batches(&self) -> Vec<BatchUpdateRequest> {
        self.batches.lock().clone()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().len()
    }

    pub fn device_fetch_count(&self) -> usize {
        self.device_fetches.load(Ordering::SeqCst)
    }

    pub fn status_fetch_count(&self) -> usize {
        self.status_fetches.load(Ordering::SeqCst)
    }

    pub fn devices(&self) -> Vec<Device> {
        self.devices.lock().clone()
    }

    fn apply_all(&self, request: &BatchUpdateRequest) -> BatchUpdateResponse {
        let mut devices = self.devices.lock();
        let updates: Vec<AppliedTransition> = request
            .computers
            .iter()
            .map(|proposal| {
                if let Some(device) = devices.iter_mut().find(|d| d.id == proposal.device_id) {
                    device.status = Some(proposal.proposed_status.clone());
                }
                AppliedTransition::from_proposal(proposal)
            })
            .collect();
        BatchUpdateResponse::from_results(updates, Vec::new())
    }
}

impl Default for MockInventory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Inventory for MockInventory {
    async fn fetch_devices(&self) -> Result<Vec<Device>, InventoryError> {
        self.device_fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.devices_error.lock().clone() {
            return Err(InventoryError::Transport(error));
        }
        Ok(self.devices.lock().clone())
    }

    async fn fetch_statuses(&self) -> Result<Vec<StatusCatalogEntry>, InventoryError> {
        self.status_fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.statuses_error.lock().clone() {
            return Err(InventoryError::Transport(error));
        }
        Ok(self.statuses.lock().clone())
    }

    async fn submit_batch(
        &self,
        request: &BatchUpdateRequest,
    ) -> Result<BatchUpdateResponse, InventoryError> {
        self.batches.lock().push(request.clone());
        log::info!("📤 [MOCK] batch of {} computer(s)", request.computers.len());

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.started.notify_one();
            // Permis jamais rendu : le sémaphore reste ouvert une fois relâché
            if let Ok(permit) = gate.release.acquire().await {
                permit.forget();
            }
        }

        let behavior = self.behavior.lock().clone();
        match behavior {
            BatchBehavior::ApplyAll => Ok(self.apply_all(request)),
            BatchBehavior::Respond(response) => Ok(response),
            BatchBehavior::Fail(error) => Err(InventoryError::Transport(error)),
        }
    }
}
