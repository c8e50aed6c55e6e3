/**
 * API REST PARC - Serveur HTTP du kernel
 *
 * RÔLE : expose le proxy GLPI au tableau de bord (postes, statuts, lot de
 * mise à jour) et le pilotage de la réconciliation (état, historique,
 * déclenchement manuel, activation).
 *
 * FONCTIONNEMENT :
 * - Serveur Axum, réponses JSON en camelCase
 * - Erreurs GLPI renvoyées en 502 avec { success: false, error }
 * - Un cycle manuel pendant un cycle en cours répond 409
 */

use crate::reconciler::{CycleError, CycleOutcome, Reconciler};
use crate::scheduler::SchedulerControl;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use parc_core::catalog::fallback_status_catalog;
use parc_core::models::{BatchUpdateRequest, HistoryEntry};
use parc_core::{Inventory, TriggerKind};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct AppState {
    pub reconciler: Arc<Reconciler>,
    pub scheduler: SchedulerControl,
    pub proxy: Arc<dyn Inventory>,
    pub interval_secs: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReconcilerView {
    enabled: bool,
    busy: bool,
    /// Postes du dernier snapshot
    devices: usize,
    interval_secs: u64,
    last_run: Option<DateTime<Utc>>,
    next_run: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct EnabledBody {
    enabled: bool,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/devices", get(list_devices))
        .route("/api/statuses", get(list_statuses))
        .route("/api/devices/batch-status-update", put(batch_status_update))
        .route("/reconciler", get(reconciler_status))
        .route("/reconciler/history", get(reconciler_history))
        .route("/reconciler/run", post(run_now))
        .route("/reconciler/enabled", put(set_enabled))
        .with_state(app_state)
}

fn bad_gateway(error: impl std::fmt::Display) -> Response {
    (
        StatusCode::BAD_GATEWAY,
        Json(json!({ "success": false, "error": error.to_string() })),
    )
        .into_response()
}

// GET /api/devices
async fn list_devices(State(app): State<AppState>) -> Response {
    match app.proxy.fetch_devices().await {
        Ok(computers) => {
            let total = computers.len();
            Json(json!({ "success": true, "computers": computers, "total": total })).into_response()
        }
        Err(e) => {
            warn!("GET /api/devices: {e}");
            bad_gateway(e)
        }
    }
}

// GET /api/statuses (catalogue de repli si GLPI ne répond pas)
async fn list_statuses(State(app): State<AppState>) -> Json<serde_json::Value> {
    match app.proxy.fetch_statuses().await {
        Ok(statuses) => Json(json!({ "success": true, "statuses": statuses })),
        Err(e) => {
            warn!("GET /api/statuses: {e}");
            Json(json!({
                "success": false,
                "error": e.to_string(),
                "statuses": fallback_status_catalog(),
            }))
        }
    }
}

// PUT /api/devices/batch-status-update
async fn batch_status_update(
    State(app): State<AppState>,
    Json(request): Json<BatchUpdateRequest>,
) -> Response {
    if !request.is_auto_update() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("unsupported action: {}", request.action) })),
        )
            .into_response();
    }
    match app.proxy.submit_batch(&request).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            warn!("batch-status-update: {e}");
            bad_gateway(e)
        }
    }
}

// GET /reconciler
async fn reconciler_status(State(app): State<AppState>) -> Json<ReconcilerView> {
    Json(ReconcilerView {
        enabled: app.scheduler.is_enabled(),
        busy: app.reconciler.is_busy(),
        devices: app.reconciler.snapshot_len(),
        interval_secs: app.interval_secs,
        last_run: app.reconciler.last_run(),
        next_run: app.scheduler.next_run(),
    })
}

async fn reconciler_history(State(app): State<AppState>) -> Json<Vec<HistoryEntry>> {
    Json(app.reconciler.history())
}

// POST /reconciler/run
async fn run_now(State(app): State<AppState>) -> Response {
    match app.reconciler.run_cycle(TriggerKind::Manual).await {
        Ok(CycleOutcome::Completed(report)) => Json(report).into_response(),
        Ok(CycleOutcome::Skipped) => (
            StatusCode::CONFLICT,
            Json(json!({ "error": "a reconciliation cycle is already running" })),
        )
            .into_response(),
        Err(CycleError::Read(e)) => bad_gateway(e),
    }
}

// PUT /reconciler/enabled
async fn set_enabled(State(app): State<AppState>, Json(body): Json<EnabledBody>) -> Json<serde_json::Value> {
    app.scheduler.set_enabled(body.enabled);
    Json(json!({ "enabled": app.scheduler.is_enabled() }))
}
