/**
 * CONFIGURATION KERNEL - kernel.yaml + variables d'environnement
 *
 * RÔLE : Paramètres GLPI (URL, jetons, cadence des appels), planification
 * de la réconciliation et adresse d'écoute HTTP.
 *
 * FONCTIONNEMENT : fichier YAML optionnel (PARC_KERNEL_CONFIG, défaut
 * kernel.yaml), sections absentes = valeurs par défaut, puis surcharge des
 * identifiants GLPI depuis l'environnement (.env chargé par main).
 */

use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct KernelConfig {
    pub glpi: GlpiConf,
    pub scheduler: SchedulerConf,
    pub http: HttpConf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct GlpiConf {
    pub url: String, // ex: "https://glpi.example.org/apirest.php/"
    pub app_token: String,
    pub user_token: String,
    pub request_timeout_secs: Option<u64>,
    /// Postes enrichis en parallèle lors du snapshot
    pub snapshot_batch_size: usize,
    pub snapshot_batch_pause_ms: u64,
    /// Pause entre deux mises à jour de poste
    pub update_pause_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SchedulerConf {
    pub enabled: bool,
    pub interval_secs: u64,
    pub warmup_secs: u64,
    pub snapshot_retry_secs: u64,
    pub history_capacity: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConf {
    pub bind: String,
}

impl Default for GlpiConf {
    fn default() -> Self {
        Self {
            url: String::new(),
            app_token: String::new(),
            user_token: String::new(),
            request_timeout_secs: None,
            snapshot_batch_size: 5,
            snapshot_batch_pause_ms: 1000,
            update_pause_ms: 500,
        }
    }
}

impl Default for SchedulerConf {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30 * 60,
            warmup_secs: 2 * 60,
            snapshot_retry_secs: 30,
            history_capacity: parc_core::DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl Default for HttpConf {
    fn default() -> Self {
        Self { bind: "0.0.0.0:8080".into() }
    }
}

impl GlpiConf {
    /// Noms des paramètres obligatoires encore vides
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.url.trim().is_empty() { missing.push("GLPI_URL"); }
        if self.app_token.trim().is_empty() { missing.push("GLPI_APP_TOKEN"); }
        if self.user_token.trim().is_empty() { missing.push("GLPI_USER_TOKEN"); }
        missing
    }
}

/// Surcharge les identifiants GLPI depuis une source de variables
pub fn apply_env_overrides<F>(cfg: &mut KernelConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let glpi = &mut cfg.glpi;
    for (key, slot) in [
        ("GLPI_URL", &mut glpi.url),
        ("GLPI_APP_TOKEN", &mut glpi.app_token),
        ("GLPI_USER_TOKEN", &mut glpi.user_token),
    ] {
        if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
            *slot = value;
        }
    }
}

pub fn parse_config(txt: &str) -> Result<KernelConfig, serde_yaml::Error> {
    if txt.trim().is_empty() {
        return Ok(KernelConfig::default());
    }
    serde_yaml::from_str(txt)
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("PARC_KERNEL_CONFIG").unwrap_or_else(|_| "kernel.yaml".into());
    let mut cfg = if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        parse_config(&txt).unwrap_or_else(|e| {
            warn!("config invalide ({path}): {e}");
            KernelConfig::default()
        })
    } else {
        info!("pas de {path}, usage config par défaut");
        KernelConfig::default()
    };

    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
    cfg
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_dashboard_timings() {
        let cfg = KernelConfig::default();
        assert!(cfg.scheduler.enabled);
        assert_eq!(cfg.scheduler.interval_secs, 1800);
        assert_eq!(cfg.scheduler.warmup_secs, 120);
        assert_eq!(cfg.scheduler.history_capacity, 10);
        assert_eq!(cfg.glpi.snapshot_batch_size, 5);
        assert_eq!(cfg.glpi.update_pause_ms, 500);
        assert_eq!(cfg.http.bind, "0.0.0.0:8080");
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let cfg = parse_config(
            "scheduler:\n  interval_secs: 600\nglpi:\n  url: http://glpi.local/apirest.php/\n",
        )
        .unwrap();
        assert_eq!(cfg.scheduler.interval_secs, 600);
        assert_eq!(cfg.scheduler.warmup_secs, 120);
        assert_eq!(cfg.glpi.url, "http://glpi.local/apirest.php/");
        assert_eq!(cfg.glpi.snapshot_batch_pause_ms, 1000);
        assert_eq!(cfg.glpi.missing(), vec!["GLPI_APP_TOKEN", "GLPI_USER_TOKEN"]);
    }

    #[test]
    fn test_empty_file_is_default() {
        let cfg = parse_config("  \n").unwrap();
        assert!(cfg.scheduler.enabled);
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        assert!(parse_config("scheduler: [oops").is_err());
    }

    #[test]
    fn test_env_overrides_credentials() {
        let env: HashMap<&str, &str> = [
            ("GLPI_URL", "http://env.local/apirest.php/"),
            ("GLPI_APP_TOKEN", "app"),
            ("GLPI_USER_TOKEN", "  "),
        ]
        .into_iter()
        .collect();

        let mut cfg = KernelConfig::default();
        cfg.glpi.user_token = "from-yaml".into();
        apply_env_overrides(&mut cfg, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(cfg.glpi.url, "http://env.local/apirest.php/");
        assert_eq!(cfg.glpi.app_token, "app");
        assert_eq!(cfg.glpi.user_token, "from-yaml");
        assert!(cfg.glpi.missing().is_empty());
    }
}
