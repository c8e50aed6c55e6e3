/**
 * SCHEDULER - Déclenchement périodique de la réconciliation
 *
 * RÔLE : tâche de fond qui charge le snapshot initial (avec nouvel essai),
 * attend le délai de chauffe puis lance un cycle à chaque intervalle.
 *
 * FONCTIONNEMENT :
 * - activation/désactivation à chaud via un canal watch
 * - désactiver supprime les ticks suivants, jamais le cycle en cours
 * - réactiver redémarre le délai de chauffe
 * - shutdown (ou drop du handle) arrête la tâche
 */

use crate::config::SchedulerConf;
use crate::reconciler::{CycleOutcome, Reconciler};
use crate::state::{new_state, read_state, replace_state, Shared};
use chrono::{DateTime, Utc};
use parc_core::TriggerKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub enabled: bool,
    pub interval: Duration,
    pub warmup: Duration,
    pub snapshot_retry: Duration,
}

impl From<&SchedulerConf> for SchedulerSettings {
    fn from(conf: &SchedulerConf) -> Self {
        Self {
            enabled: conf.enabled,
            // un intervalle nul ferait paniquer interval_at
            interval: Duration::from_secs(conf.interval_secs.max(1)),
            warmup: Duration::from_secs(conf.warmup_secs),
            snapshot_retry: Duration::from_secs(conf.snapshot_retry_secs.max(1)),
        }
    }
}

/// Commandes partagées avec l'API HTTP
#[derive(Clone)]
pub struct SchedulerControl {
    enabled: Arc<watch::Sender<bool>>,
    next_run: Shared<Option<DateTime<Utc>>>,
}

impl SchedulerControl {
    pub fn new(enabled: bool) -> Self {
        let (tx, _) = watch::channel(enabled);
        Self {
            enabled: Arc::new(tx),
            next_run: new_state(None),
        }
    }

    /// Renvoie true si l'état a changé
    pub fn set_enabled(&self, enabled: bool) -> bool {
        let changed = self.enabled.send_if_modified(|current| {
            if *current == enabled {
                return false;
            }
            *current = enabled;
            true
        });
        if changed {
            info!("réconciliation automatique {}", if enabled { "activée" } else { "désactivée" });
        }
        changed
    }

    pub fn is_enabled(&self) -> bool {
        *self.enabled.borrow()
    }

    /// Prochain tick prévu, None si désactivé ou pas encore armé
    pub fn next_run(&self) -> Option<DateTime<Utc>> {
        read_state(&self.next_run)
    }

    fn set_next_run(&self, after: Option<Duration>) {
        let next = after
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .map(|d| Utc::now() + d);
        replace_state(&self.next_run, next);
    }
}

pub struct SchedulerHandle {
    control: SchedulerControl,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn spawn(reconciler: Arc<Reconciler>, settings: SchedulerSettings) -> Self {
        let control = SchedulerControl::new(settings.enabled);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run(reconciler, settings, control.clone(), shutdown_rx));
        Self {
            control,
            shutdown,
            task: Some(task),
        }
    }

    pub fn control(&self) -> SchedulerControl {
        self.control.clone()
    }

    /// Arrête le timer ; un cycle en cours se termine d'abord
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("tâche scheduler terminée en erreur: {e}");
            }
        }
        info!("scheduler arrêté");
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run(
    reconciler: Arc<Reconciler>,
    settings: SchedulerSettings,
    control: SchedulerControl,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut enabled = control.enabled.subscribe();

    // Snapshot initial, réessayé jusqu'au succès
    loop {
        match reconciler.refresh_snapshot().await {
            Ok(count) => {
                info!("snapshot initial: {count} poste(s)");
                break;
            }
            Err(e) => {
                warn!("snapshot initial en échec, nouvel essai dans {:?}: {e}", settings.snapshot_retry);
                tokio::select! {
                    _ = tokio::time::sleep(settings.snapshot_retry) => {}
                    _ = shutdown.changed() => return,
                }
            }
        }
    }

    loop {
        while !*enabled.borrow_and_update() {
            control.set_next_run(None);
            tokio::select! {
                changed = enabled.changed() => if changed.is_err() { return },
                _ = shutdown.changed() => return,
            }
        }

        let mut ticker = interval_at(Instant::now() + settings.warmup, settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        control.set_next_run(Some(settings.warmup));
        debug!("premier cycle dans {:?}", settings.warmup);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // le cycle tourne hors du select : un toggle ne l'interrompt pas
                    match reconciler.run_cycle(TriggerKind::Scheduled).await {
                        Ok(CycleOutcome::Completed(report)) => debug!("cycle planifié: {}", report.message),
                        Ok(CycleOutcome::Skipped) => debug!("tick ignoré: cycle manuel en cours"),
                        Err(e) => warn!("cycle planifié abandonné: {e}"),
                    }
                    control.set_next_run(Some(settings.interval));
                }
                changed = enabled.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    if !*enabled.borrow_and_update() {
                        break;
                    }
                }
                _ = shutdown.changed() => return,
            }
        }
    }
}
