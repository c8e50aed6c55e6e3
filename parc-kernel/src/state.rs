//! État partagé du kernel : verrous courts, jamais tenus à travers un `.await`.

use parking_lot::Mutex;
use std::sync::Arc;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Copie la valeur courante et relâche le verrou immédiatement
pub fn read_state<T: Clone>(state: &Shared<T>) -> T {
    state.lock().clone()
}

/// Remplace la valeur courante, renvoie l'ancienne
pub fn replace_state<T>(state: &Shared<T>, value: T) -> T {
    std::mem::replace(&mut *state.lock(), value)
}
