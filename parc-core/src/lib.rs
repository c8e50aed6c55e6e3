//! Parc Core - domain model for inventory status reconciliation
//!
//! Everything here is free of I/O:
//! - Records exchanged with the GLPI proxy (devices, catalog, batch payloads)
//! - Inactivity classifier and status name resolver
//! - Bounded reconciliation history
//! - The `Inventory` seam implemented by the kernel and by the devkit mocks

pub mod catalog;
pub mod classifier;
pub mod history;
pub mod inventory;
pub mod models;
pub mod resolver;
pub mod status;

pub use classifier::{classify, parse_last_seen, Inactivity};
pub use history::{HistoryRing, DEFAULT_HISTORY_CAPACITY};
pub use inventory::{Inventory, InventoryError};
pub use models::{
    AppliedTransition, AssignedUser, BatchUpdateRequest, BatchUpdateResponse, Device,
    FailedTransition, HistoryEntry, StatusCatalogEntry, StatusId, TransitionProposal, TriggerKind,
    AUTO_UPDATE_ACTION,
};
pub use resolver::{resolve_status, resolve_status_id};
pub use status::{DeviceStatus, TargetStatus};
