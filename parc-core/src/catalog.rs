//! Catalogues de statuts utilisés quand GLPI ne fournit rien d'exploitable.

use crate::models::StatusCatalogEntry;

/// Stock GLPI catalog, used when `State` comes back empty.
pub fn default_status_catalog() -> Vec<StatusCatalogEntry> {
    [
        (1, "Non affecté"),
        (2, "Affecté"),
        (3, "En maintenance"),
        (4, "Hors service"),
        (5, "En stock"),
        (6, "Délégué"),
        (7, "En congé"),
        (8, "En transition"),
    ]
    .into_iter()
    .map(|(id, name)| StatusCatalogEntry::new(id, name))
    .collect()
}

/// Reduced catalog returned alongside an error when GLPI is unreachable.
pub fn fallback_status_catalog() -> Vec<StatusCatalogEntry> {
    default_status_catalog().into_iter().take(5).collect()
}
