//! Collaborator seam between the reconciler and the inventory system.

use async_trait::async_trait;

use crate::models::{BatchUpdateRequest, BatchUpdateResponse, Device, StatusCatalogEntry};

/// Erreurs côté collaborateur externe (GLPI ou proxy)
#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("upstream rejected request ({status}): {body}")]
    Upstream { status: u16, body: String },
    #[error("invalid payload: {0}")]
    Payload(String),
    #[error("missing configuration: {0}")]
    Configuration(String),
}

impl From<serde_json::Error> for InventoryError {
    fn from(err: serde_json::Error) -> Self {
        InventoryError::Payload(err.to_string())
    }
}

/// The three operations a reconciliation cycle needs from the inventory.
///
/// Reads are independent of each other; `submit_batch` reports per-item
/// results in its response and only errors on transport failure.
#[async_trait]
pub trait Inventory: Send + Sync {
    async fn fetch_devices(&self) -> Result<Vec<Device>, InventoryError>;

    async fn fetch_statuses(&self) -> Result<Vec<StatusCatalogEntry>, InventoryError>;

    async fn submit_batch(
        &self,
        request: &BatchUpdateRequest,
    ) -> Result<BatchUpdateResponse, InventoryError>;
}
