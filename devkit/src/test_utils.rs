/*!
Test Harness pour la réconciliation

Facilite l'écriture de tests avec:
- Setup automatique du mock d'inventaire et du logging
- Expectations sur le nombre de lots soumis
- Assertions sur le contenu du dernier lot
*/

use crate::fixtures::{reference_time, stock_catalog};
use crate::mock_inventory::MockInventory;
use anyhow::Result;
use chrono::{DateTime, Utc};
use parc_core::models::{BatchUpdateRequest, Device};
use std::sync::Arc;

/// Harness de test complet autour d'un `MockInventory`
pub struct TestHarness {
    pub inventory: MockInventory,
    pub reference: DateTime<Utc>,
    expected_batches: Option<usize>,
}

impl TestHarness {
    /// Crée un harness avec le catalogue standard et aucun poste
    pub fn new() -> Self {
        env_logger::builder().is_test(true).try_init().ok(); // Init logging pour tests

        Self {
            inventory: MockInventory::new().with_statuses(stock_catalog()),
            reference: reference_time(),
            expected_batches: None,
        }
    }

    pub fn with_devices(self, devices: Vec<Device>) -> Self {
        self.inventory.set_devices(devices);
        self
    }

    /// Collaborateur partagé, tel que le reçoit le reconciler
    pub fn shared_inventory(&self) -> Arc<MockInventory> {
        Arc::new(self.inventory.clone())
    }

    /// On s'attend à exactement N lots soumis
    pub fn expect_batches(&mut self, count: usize) -> &mut Self {
        self.expected_batches = Some(count);
        self
    }

    pub fn verify_expectations(&self) -> Result<()> {
        if let Some(expected) = self.expected_batches {
            let actual = self.inventory.batch_count();
            if actual != expected {
                anyhow::bail!("expected {} batch(es), got {}", expected, actual);
            }
            log::info!("✅ {} batch(es) as expected", actual);
        }
        Ok(())
    }

    pub fn last_batch(&self) -> Result<BatchUpdateRequest> {
        self.inventory
            .submitted_batches()
            .pop()
            .ok_or_else(|| anyhow::anyhow!("no batch submitted"))
    }

    /// Assert que le dernier lot propose `status` pour le poste `device_id`
    pub fn assert_proposed(&self, device_id: u64, status: &str) -> Result<()> {
        let batch = self.last_batch()?;
        match batch.computers.iter().find(|c| c.device_id == device_id) {
            Some(proposal) if proposal.proposed_status == status => Ok(()),
            Some(proposal) => anyhow::bail!(
                "device {} proposed '{}', expected '{}'",
                device_id,
                proposal.proposed_status,
                status
            ),
            None => anyhow::bail!("device {} not in last batch", device_id),
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
