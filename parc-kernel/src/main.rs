/**
 * PARC KERNEL - Point d'entrée du service de réconciliation GLPI
 *
 * RÔLE : Bootstrap complet : .env, logging, configuration, client GLPI,
 * reconciler, scheduler et API REST.
 *
 * ARCHITECTURE : un proxy GLPI partagé entre l'API (tableau de bord) et le
 * reconciler ; le scheduler déclenche les cycles, l'API permet les cycles
 * manuels et le pilotage.
 */

mod config;
mod glpi;
mod http;
mod proxy;
mod reconciler;
mod scheduler;
mod state;

use crate::config::load_config;
use crate::http::AppState;
use crate::proxy::GlpiInventory;
use crate::reconciler::Reconciler;
use crate::scheduler::{SchedulerHandle, SchedulerSettings};

use anyhow::Context;
use parc_core::Inventory;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("parc_kernel=info")),
        )
        .init();

    let cfg = load_config().await;

    // proxy GLPI partagé
    let glpi = GlpiInventory::from_config(&cfg.glpi).context("GLPI client configuration")?;
    let proxy: Arc<dyn Inventory> = Arc::new(glpi);

    let reconciler = Arc::new(Reconciler::new(proxy.clone(), cfg.scheduler.history_capacity));
    let scheduler = SchedulerHandle::spawn(reconciler.clone(), SchedulerSettings::from(&cfg.scheduler));

    // fabrique l'état unique pour Axum
    let app_state = AppState {
        reconciler,
        scheduler: scheduler.control(),
        proxy,
        interval_secs: cfg.scheduler.interval_secs,
    };
    let app = http::build_router(app_state);

    let listener = TcpListener::bind(&cfg.http.bind)
        .await
        .with_context(|| format!("bind {}", cfg.http.bind))?;
    info!("listening on http://{}", cfg.http.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("ctrl_c handler: {e}");
            }
        })
        .await
        .context("HTTP server")?;

    scheduler.shutdown().await;
    Ok(())
}
