//! Status name resolver
//!
//! GLPI status names are free text and vary across installations (accents,
//! casing). Exact match wins; otherwise a fixed table of synonym groups gives
//! a bounded fallback.

use crate::models::{StatusCatalogEntry, StatusId};
use crate::status::normalize;

/// Groupes de synonymes, dans l'ordre d'évaluation. L'ordre compte :
/// "non affecté" contient "affecté".
pub const KEYWORD_GROUPS: &[&[&str]] = &[
    &["non affecté", "non affecte", "disponible"],
    &["affecté", "affecte"],
    &["transition"],
    &["congé", "conge"],
    &["délégué", "delegue"],
];

/// First keyword group matching an already normalized name.
pub fn keyword_group(normalized: &str) -> Option<&'static [&'static str]> {
    KEYWORD_GROUPS
        .iter()
        .copied()
        .find(|group| group.iter().any(|keyword| normalized.contains(keyword)))
}

pub fn resolve_status<'a>(
    catalog: &'a [StatusCatalogEntry],
    target_name: &str,
) -> Option<&'a StatusCatalogEntry> {
    let wanted = normalize(target_name);
    if wanted.is_empty() {
        return None;
    }

    if let Some(entry) = catalog.iter().find(|entry| normalize(&entry.name) == wanted) {
        return Some(entry);
    }

    let group = keyword_group(&wanted)?;
    catalog.iter().find(|entry| {
        let name = normalize(&entry.name);
        group.iter().any(|keyword| name.contains(keyword))
    })
}

pub fn resolve_status_id(catalog: &[StatusCatalogEntry], target_name: &str) -> Option<StatusId> {
    resolve_status(catalog, target_name).map(|entry| entry.id)
}
