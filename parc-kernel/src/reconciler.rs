/**
 * RECONCILER - Cycle de réconciliation des statuts par inactivité
 *
 * RÔLE : un cycle = lecture snapshot + catalogue, classification de chaque
 * poste affecté, résolution des statuts cibles, un seul lot de mise à jour,
 * rafraîchissement du snapshot, entrée d'historique.
 *
 * CONCURRENCE : un seul cycle à la fois (drapeau busy acquis par
 * compare-exchange, relâché par guard RAII). Un cycle demandé pendant qu'un
 * autre tourne est ignoré. Aucun verrou n'est tenu à travers un `.await`.
 */

use crate::state::{new_state, read_state, replace_state, Shared};
use chrono::{DateTime, Utc};
use parc_core::models::{
    AppliedTransition, BatchUpdateRequest, Device, FailedTransition, HistoryEntry,
    StatusCatalogEntry, TransitionProposal, TriggerKind,
};
use parc_core::{
    classify, parse_last_seen, resolve_status_id, HistoryRing, Inactivity, Inventory, InventoryError,
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Transitions détaillées dans un rapport manuel
const REPORT_SAMPLE_SIZE: usize = 5;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("snapshot read failed: {0}")]
    Read(#[from] InventoryError),
}

/// Résumé d'un cycle terminé, renvoyé au déclencheur
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub trigger: TriggerKind,
    pub applied_count: usize,
    pub failed_count: usize,
    pub message: String,
    pub sample: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// Un autre cycle était en cours
    Skipped,
}

struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Reconciler {
    inventory: Arc<dyn Inventory>,
    busy: AtomicBool,
    history: Shared<HistoryRing>,
    snapshot: Shared<Vec<Device>>,
    last_run: Shared<Option<DateTime<Utc>>>,
    clock: Clock,
}

impl Reconciler {
    pub fn new(inventory: Arc<dyn Inventory>, history_capacity: usize) -> Self {
        Self {
            inventory,
            busy: AtomicBool::new(false),
            history: new_state(HistoryRing::new(history_capacity)),
            snapshot: new_state(Vec::new()),
            last_run: new_state(None),
            clock: Arc::new(Utc::now),
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.lock().entries()
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> Vec<Device> {
        read_state(&self.snapshot)
    }

    /// Postes connus depuis la dernière lecture
    pub fn snapshot_len(&self) -> usize {
        self.snapshot.lock().len()
    }

    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        read_state(&self.last_run)
    }

    /// Relit les postes et remplace le snapshot courant
    pub async fn refresh_snapshot(&self) -> Result<usize, InventoryError> {
        let devices = self.inventory.fetch_devices().await?;
        let count = devices.len();
        replace_state(&self.snapshot, devices);
        Ok(count)
    }

    pub async fn run_cycle(&self, trigger: TriggerKind) -> Result<CycleOutcome, CycleError> {
        let Some(_busy) = BusyGuard::acquire(&self.busy) else {
            debug!("cycle {trigger} ignoré: réconciliation déjà en cours");
            return Ok(CycleOutcome::Skipped);
        };

        let started = (self.clock)();
        info!("réconciliation {trigger} démarrée à {started}");

        let (devices, statuses) = tokio::join!(
            self.inventory.fetch_devices(),
            self.inventory.fetch_statuses()
        );
        let (devices, statuses) = match (devices, statuses) {
            (Ok(devices), Ok(statuses)) => (devices, statuses),
            (Err(e), _) | (_, Err(e)) => {
                warn!("réconciliation {trigger} abandonnée: {e}");
                self.record(HistoryEntry::new(
                    started,
                    trigger,
                    format!("cycle aborted: {e}"),
                    Vec::new(),
                    Vec::new(),
                ));
                return Err(e.into());
            }
        };
        replace_state(&self.snapshot, devices.clone());

        let proposals = plan(&devices, started);
        if proposals.is_empty() {
            info!("aucune mise à jour nécessaire");
            let entry = HistoryEntry::new(started, trigger, "no status update needed", Vec::new(), Vec::new());
            return Ok(CycleOutcome::Completed(self.record(entry)));
        }
        info!("{} poste(s) à mettre à jour", proposals.len());

        let (resolved, mut failed) = resolve_all(&proposals, &statuses);
        if resolved.is_empty() {
            let entry = HistoryEntry::new(started, trigger, "no resolvable status update", Vec::new(), failed);
            return Ok(CycleOutcome::Completed(self.record(entry)));
        }

        let request = BatchUpdateRequest::auto_update(resolved, statuses);
        let entry = match self.inventory.submit_batch(&request).await {
            Ok(response) => {
                let applied = response.updates;
                failed.extend(response.errors);
                if !applied.is_empty() {
                    if let Err(e) = self.refresh_snapshot().await {
                        warn!("rafraîchissement du snapshot en échec: {e}");
                    }
                }
                let summary = if response.message.is_empty() {
                    format!("{} computer(s) updated, {} error(s)", applied.len(), failed.len())
                } else {
                    response.message
                };
                HistoryEntry::new(started, trigger, summary, applied, failed)
            }
            Err(e) => {
                warn!("lot de mise à jour en échec: {e}");
                // les échecs de résolution gardent leur raison
                failed.extend(
                    request
                        .computers
                        .iter()
                        .map(|p| FailedTransition::for_proposal(p, format!("batch update failed: {e}"))),
                );
                HistoryEntry::new(started, trigger, format!("batch update failed: {e}"), Vec::new(), failed)
            }
        };

        Ok(CycleOutcome::Completed(self.record(entry)))
    }

    fn record(&self, entry: HistoryEntry) -> CycleReport {
        let report = CycleReport {
            trigger: entry.trigger,
            applied_count: entry.applied_count,
            failed_count: entry.failed_count,
            message: entry.summary.clone(),
            sample: sample(&entry.applied),
        };
        info!(
            "réconciliation {} terminée: {} appliquée(s), {} échec(s)",
            entry.trigger, entry.applied_count, entry.failed_count
        );
        replace_state(&self.last_run, Some(entry.timestamp));
        self.history.lock().push(entry);
        report
    }
}

/// Propositions pour les postes affectés, au plus une par poste
pub fn plan(devices: &[Device], reference: DateTime<Utc>) -> Vec<TransitionProposal> {
    let mut seen = HashSet::new();
    devices
        .iter()
        .filter(|device| device.has_assigned_user())
        .filter(|device| seen.insert(device.id))
        .filter_map(|device| {
            let proposal = classify(device, reference)?;
            if let Some(seen) = parse_last_seen(&proposal.last_seen) {
                info!(
                    "{}: {} → {} (inactif depuis {})",
                    proposal.device_name,
                    proposal.current_status,
                    proposal.proposed_status,
                    Inactivity::between(seen, reference).label()
                );
            }
            Some(proposal)
        })
        .collect()
}

fn resolve_all(
    proposals: &[TransitionProposal],
    statuses: &[StatusCatalogEntry],
) -> (Vec<TransitionProposal>, Vec<FailedTransition>) {
    let mut resolved = Vec::new();
    let mut failed = Vec::new();
    for proposal in proposals {
        if resolve_status_id(statuses, &proposal.proposed_status).is_some() {
            resolved.push(proposal.clone());
        } else {
            warn!("statut introuvable pour {}: {}", proposal.device_name, proposal.proposed_status);
            failed.push(FailedTransition::for_proposal(
                proposal,
                format!("status not found: {}", proposal.proposed_status),
            ));
        }
    }
    (resolved, failed)
}

fn sample(applied: &[AppliedTransition]) -> Vec<String> {
    let mut lines: Vec<String> = applied
        .iter()
        .take(REPORT_SAMPLE_SIZE)
        .map(|u| format!("{}: {} → {}", u.device_name, u.old_status, u.new_status))
        .collect();
    if applied.len() > REPORT_SAMPLE_SIZE {
        lines.push("...".into());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use parc_core::models::BatchUpdateResponse;
    use parc_devkit::{BatchBehavior, DeviceBuilder, MockInventory, TestHarness};

    fn reconciler(harness: &TestHarness) -> Reconciler {
        let reference = harness.reference;
        Reconciler::new(harness.shared_inventory(), 10).with_clock(Arc::new(move || reference))
    }

    fn stale(harness: &TestHarness, id: u64, status: &str, ago: Duration) -> Device {
        DeviceBuilder::new(id, &format!("PC-{id}"))
            .status(status)
            .assigned()
            .seen_ago(harness.reference, ago)
            .build()
    }

    fn completed(outcome: CycleOutcome) -> CycleReport {
        match outcome {
            CycleOutcome::Completed(report) => report,
            CycleOutcome::Skipped => panic!("cycle skipped"),
        }
    }

    #[tokio::test]
    async fn test_single_transition_end_to_end() {
        let harness = TestHarness::new();
        let device = stale(&harness, 1, "Affecté", Duration::hours(26));
        let mut harness = harness.with_devices(vec![device]);
        harness.expect_batches(1);
        let reconciler = reconciler(&harness);

        let report = completed(reconciler.run_cycle(TriggerKind::Manual).await.unwrap());

        harness.verify_expectations().unwrap();
        harness.assert_proposed(1, "En transition").unwrap();
        assert_eq!(harness.last_batch().unwrap().statuses.len(), 8);
        assert_eq!(report.applied_count, 1);
        assert_eq!(report.failed_count, 0);
        assert_eq!(report.sample, vec!["PC-1: Affecté → En transition".to_string()]);

        let history = reconciler.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].trigger, TriggerKind::Manual);
        assert_eq!(history[0].applied[0].reason, "inactive for 26 hours");
        assert_eq!(reconciler.last_run(), Some(harness.reference));
    }

    #[tokio::test]
    async fn test_zero_proposals_records_without_mutation() {
        let harness = TestHarness::new();
        let devices = vec![
            stale(&harness, 1, "Affecté", Duration::hours(2)),
            stale(&harness, 2, "Délégué", Duration::days(60)),
            DeviceBuilder::new(3, "PC-3").status("En congé").seen_ago(harness.reference, Duration::days(3)).build(),
        ];
        let harness = harness.with_devices(devices);
        let reconciler = reconciler(&harness);

        let report = completed(reconciler.run_cycle(TriggerKind::Scheduled).await.unwrap());

        assert_eq!(harness.inventory.batch_count(), 0);
        assert_eq!(report.applied_count + report.failed_count, 0);
        assert_eq!(reconciler.history().len(), 1);
        assert_eq!(reconciler.history()[0].summary, "no status update needed");
    }

    #[tokio::test]
    async fn test_unresolvable_status_is_excluded_from_batch() {
        let harness = TestHarness::new();
        harness.inventory.set_devices(vec![
            stale(&harness, 1, "Affecté", Duration::days(8)),
            stale(&harness, 2, "Affecté", Duration::days(2)),
        ]);
        // pas de "congé" dans ce catalogue
        let inventory = harness
            .inventory
            .clone()
            .with_statuses(vec![StatusCatalogEntry::new(8, "En transition")]);
        let reference = harness.reference;
        let reconciler = Reconciler::new(Arc::new(inventory), 10).with_clock(Arc::new(move || reference));

        let report = completed(reconciler.run_cycle(TriggerKind::Manual).await.unwrap());

        let batch = harness.last_batch().unwrap();
        assert_eq!(batch.computers.len(), 1);
        assert_eq!(batch.computers[0].device_id, 2);
        assert_eq!(report.applied_count, 1);
        assert_eq!(report.failed_count, 1);
        let failed = &reconciler.history()[0].failed[0];
        assert_eq!(failed.device_id, 1);
        assert_eq!(failed.error, "status not found: En congé");
    }

    #[tokio::test]
    async fn test_per_item_errors_are_counted() {
        let harness = TestHarness::new();
        harness.inventory.set_devices(vec![
            stale(&harness, 1, "Affecté", Duration::days(8)),
            stale(&harness, 2, "Affecté", Duration::days(31)),
        ]);
        let response = BatchUpdateResponse {
            success: true,
            updates: vec![AppliedTransition {
                device_id: 1,
                device_name: "PC-1".into(),
                old_status: "Affecté".into(),
                new_status: "En congé".into(),
                reason: "inactive for 8 days".into(),
            }],
            errors: vec![FailedTransition { device_id: 2, device_name: "PC-2".into(), error: "GLPI error: 500 - x".into() }],
            message: "1 computer(s) updated, 1 error(s)".into(),
        };
        let inventory = harness.inventory.clone().with_behavior(BatchBehavior::Respond(response));
        let reference = harness.reference;
        let reconciler = Reconciler::new(Arc::new(inventory), 10).with_clock(Arc::new(move || reference));

        let report = completed(reconciler.run_cycle(TriggerKind::Manual).await.unwrap());

        assert_eq!(report.applied_count, 1);
        assert_eq!(report.failed_count, 1);
        assert_eq!(report.message, "1 computer(s) updated, 1 error(s)");
        // un poste appliqué : snapshot relu après le lot
        assert_eq!(harness.inventory.device_fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_batch_transport_failure_fails_every_proposal() {
        let harness = TestHarness::new();
        harness.inventory.set_devices(vec![
            stale(&harness, 1, "Affecté", Duration::days(8)),
            stale(&harness, 2, "Affecté", Duration::hours(30)),
        ]);
        let inventory = harness.inventory.clone().with_behavior(BatchBehavior::Fail("connection reset".into()));
        let reference = harness.reference;
        let reconciler = Reconciler::new(Arc::new(inventory), 10).with_clock(Arc::new(move || reference));

        let report = completed(reconciler.run_cycle(TriggerKind::Scheduled).await.unwrap());

        assert_eq!(harness.inventory.batch_count(), 1);
        assert_eq!(report.applied_count, 0);
        assert_eq!(report.failed_count, 2);
        assert!(report.message.starts_with("batch update failed"));
        // pas de relecture ni de nouvel essai
        assert_eq!(harness.inventory.device_fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_batch_transport_failure_keeps_resolution_errors() {
        let harness = TestHarness::new();
        harness.inventory.set_devices(vec![
            stale(&harness, 1, "Affecté", Duration::days(8)),
            stale(&harness, 2, "Affecté", Duration::hours(30)),
        ]);
        let inventory = harness
            .inventory
            .clone()
            .with_statuses(vec![StatusCatalogEntry::new(8, "En transition")])
            .with_behavior(BatchBehavior::Fail("connection reset".into()));
        let reference = harness.reference;
        let reconciler = Reconciler::new(Arc::new(inventory), 10).with_clock(Arc::new(move || reference));

        let report = completed(reconciler.run_cycle(TriggerKind::Scheduled).await.unwrap());

        assert_eq!(report.failed_count, 2);
        let failed = &reconciler.history()[0].failed;
        assert_eq!(failed[0].device_id, 1);
        assert_eq!(failed[0].error, "status not found: En congé");
        assert_eq!(failed[1].device_id, 2);
        assert!(failed[1].error.starts_with("batch update failed"));
        assert_eq!(harness.last_batch().unwrap().computers.len(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_last_seen_is_skipped() {
        let harness = TestHarness::new();
        let devices = vec![
            DeviceBuilder::new(1, "PC-1").status("Affecté").assigned().last_seen_raw("N/A").build(),
            DeviceBuilder::new(2, "PC-2").status("Affecté").assigned().last_seen_raw("hier soir").build(),
            DeviceBuilder::new(3, "PC-3").status("En congé").assigned().last_seen_raw("2025-06-15").build(),
        ];
        let harness = harness.with_devices(devices);
        let reconciler = reconciler(&harness);

        let report = completed(reconciler.run_cycle(TriggerKind::Manual).await.unwrap());

        // seule la date nue (minuit, 12h plus tôt) donne une proposition
        assert_eq!(report.applied_count, 1);
        let batch = harness.last_batch().unwrap();
        assert_eq!(batch.computers.len(), 1);
        assert_eq!(batch.computers[0].device_id, 3);
        assert_eq!(batch.computers[0].proposed_status, "Affecté");
        assert_eq!(reconciler.snapshot_len(), 3);
    }

    #[tokio::test]
    async fn test_read_failure_aborts_before_mutation() {
        let harness = TestHarness::new();
        harness.inventory.set_devices(vec![stale(&harness, 1, "Affecté", Duration::days(8))]);
        harness.inventory.fail_statuses(Some("GLPI down"));
        let reconciler = reconciler(&harness);

        let result = reconciler.run_cycle(TriggerKind::Manual).await;

        assert!(matches!(result, Err(CycleError::Read(InventoryError::Transport(_)))));
        assert_eq!(harness.inventory.batch_count(), 0);
        assert_eq!(reconciler.history()[0].summary, "cycle aborted: transport error: GLPI down");
        assert!(!reconciler.is_busy());

        harness.inventory.fail_statuses(None);
        assert!(reconciler.run_cycle(TriggerKind::Manual).await.is_ok());
        assert_eq!(harness.inventory.batch_count(), 1);
    }

    #[tokio::test]
    async fn test_applied_updates_refresh_snapshot() {
        let harness = TestHarness::new();
        harness.inventory.set_devices(vec![stale(&harness, 1, "Affecté", Duration::days(9))]);
        let reconciler = reconciler(&harness);

        completed(reconciler.run_cycle(TriggerKind::Manual).await.unwrap());
        assert_eq!(reconciler.snapshot()[0].status.as_deref(), Some("En congé"));
        assert_eq!(harness.inventory.device_fetch_count(), 2);

        // retour d'activité : le poste repasse affecté au cycle suivant
        harness.inventory.set_devices(vec![DeviceBuilder::new(1, "PC-1")
            .status("En congé")
            .assigned()
            .seen_ago(harness.reference, Duration::hours(1))
            .build()]);
        let report = completed(reconciler.run_cycle(TriggerKind::Scheduled).await.unwrap());
        assert_eq!(report.applied_count, 1);
        harness.assert_proposed(1, "Affecté").unwrap();
        assert_eq!(reconciler.history().len(), 2);
        assert_eq!(reconciler.history()[0].trigger, TriggerKind::Scheduled);
    }

    #[tokio::test]
    async fn test_manual_trigger_during_slow_batch_is_ignored() {
        let harness = TestHarness::new();
        harness.inventory.set_devices(vec![stale(&harness, 1, "Affecté", Duration::days(8))]);
        harness.inventory.hold_batches();
        let reconciler = Arc::new(reconciler(&harness));

        let scheduled = {
            let reconciler = reconciler.clone();
            tokio::spawn(async move { reconciler.run_cycle(TriggerKind::Scheduled).await })
        };
        harness.inventory.wait_batch_started().await;
        assert!(reconciler.is_busy());

        let manual = reconciler.run_cycle(TriggerKind::Manual).await.unwrap();
        assert!(matches!(manual, CycleOutcome::Skipped));

        harness.inventory.release_batches();
        completed(scheduled.await.unwrap().unwrap());

        assert_eq!(harness.inventory.batch_count(), 1);
        assert_eq!(reconciler.history().len(), 1);
        assert!(!reconciler.is_busy());
    }

    #[test]
    fn test_plan_keeps_one_proposal_per_assigned_device() {
        let reference = parc_devkit::reference_time();
        let old = DeviceBuilder::new(1, "PC-1").status("Affecté").assigned().seen_ago(reference, Duration::days(10)).build();
        let unassigned = DeviceBuilder::new(2, "PC-2").status("En transition").seen_ago(reference, Duration::days(10)).build();

        let proposals = plan(&[old.clone(), old, unassigned], reference);
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].device_id, 1);
    }

    #[test]
    fn test_sample_is_truncated() {
        let applied: Vec<AppliedTransition> = (0..7)
            .map(|i| AppliedTransition {
                device_id: i,
                device_name: format!("PC-{i}"),
                old_status: "Affecté".into(),
                new_status: "En congé".into(),
                reason: String::new(),
            })
            .collect();
        let lines = sample(&applied);
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[5], "...");
    }

    #[tokio::test]
    async fn test_empty_mock_is_quiet() {
        let reconciler = Reconciler::new(Arc::new(MockInventory::new()), 3);
        let report = completed(reconciler.run_cycle(TriggerKind::Scheduled).await.unwrap());
        assert_eq!(report.message, "no status update needed");
    }
}
