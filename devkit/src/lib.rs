/*!
# Parc DevKit - Mocks et fixtures pour tester la réconciliation

Bibliothèque facilitant l'écriture de tests sans instance GLPI avec:
- `MockInventory` : collaborateur en mémoire qui enregistre les lots soumis
- Fixtures de postes et de catalogue de statuts
- `TestHarness` pour les assertions sur les échanges
*/

pub mod fixtures;
pub mod mock_inventory;
pub mod test_utils;

pub use fixtures::{reference_time, stock_catalog, DeviceBuilder};
pub use mock_inventory::{BatchBehavior, MockInventory};
pub use test_utils::TestHarness;
