// Shared plot state; all mutation goes through `reduce`
use crate::domain::plot::{PlotCommand, PlotState, reduce};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone, Default)]
pub struct PlotStore {
    state: Arc<Mutex<PlotState>>,
}

impl PlotStore {
    pub fn new(state: PlotState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn dispatch(&self, command: PlotCommand) {
        let mut guard = self.lock();
        let current = std::mem::take(&mut *guard);
        *guard = reduce(current, command);
    }

    /// Apply `command` and inspect the result under the same lock.
    pub fn update<R>(&self, command: PlotCommand, f: impl FnOnce(&PlotState) -> R) -> R {
        let mut guard = self.lock();
        let current = std::mem::take(&mut *guard);
        *guard = reduce(current, command);
        f(&guard)
    }

    /// Run `f` against the current state without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&PlotState) -> R) -> R {
        f(&self.lock())
    }

    pub fn snapshot(&self) -> PlotState {
        self.lock().clone()
    }

    // A poisoned lock holds the previous or a default state, never a partial reduction.
    fn lock(&self) -> MutexGuard<'_, PlotState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
