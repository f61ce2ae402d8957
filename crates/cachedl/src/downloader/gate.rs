//! Completion gate
//!
//! Holds the write-once terminal result of a batch together with the observers
//! waiting for progress and completion. Observers are always invoked outside
//! the internal lock, so a callback may register further observers or read
//! the result without deadlocking.
//!
//! Completion observers run in registration order. One registered while the
//! resolving thread is still delivering is queued behind the pending ones and
//! run by that thread.

use crate::downloader::core::{CompletionCallback, Progress, ProgressCallback, Result};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct GateState {
    result: Option<Result<()>>,
    delivering: bool,
    last_progress: Option<Progress>,
    progress_observers: Vec<ProgressCallback>,
    completion_observers: Vec<CompletionCallback>,
}

/// One-shot terminal result with replay for late registrants
#[derive(Default)]
pub struct CompletionGate {
    inner: Mutex<GateState>,
}

impl CompletionGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store the terminal result and notify completion observers
    ///
    /// Only the first call has any effect; returns whether this call resolved
    /// the gate.
    pub fn resolve(&self, result: Result<()>) -> bool {
        {
            let mut state = self.lock();
            if state.result.is_some() {
                return false;
            }
            state.result = Some(result.clone());
            state.delivering = true;
            state.progress_observers.clear();
        }

        loop {
            let observers = {
                let mut state = self.lock();
                if state.completion_observers.is_empty() {
                    state.delivering = false;
                    break;
                }
                std::mem::take(&mut state.completion_observers)
            };

            for observer in observers {
                observer(result.clone());
            }
        }
        true
    }

    pub fn is_resolved(&self) -> bool {
        self.lock().result.is_some()
    }

    /// The terminal result, once resolved
    pub fn result(&self) -> Option<Result<()>> {
        self.lock().result.clone()
    }

    /// Register a completion observer
    ///
    /// Invoked immediately, on the calling thread, when the gate is already
    /// resolved and every earlier observer has run.
    pub fn register_completion(&self, observer: CompletionCallback) {
        let resolved = {
            let mut state = self.lock();
            match &state.result {
                Some(result) if !state.delivering => result.clone(),
                _ => {
                    state.completion_observers.push(observer);
                    return;
                }
            }
        };
        observer(resolved);
    }

    /// Register a progress observer
    ///
    /// After resolution the observer only receives the last snapshot, if any
    /// progress was ever published, and is not retained.
    pub fn register_progress(&self, observer: ProgressCallback) {
        let replay = {
            let mut state = self.lock();
            if state.result.is_none() {
                state.progress_observers.push(observer);
                return;
            }
            state.last_progress
        };

        if let Some(progress) = replay {
            observer(progress);
        }
    }

    /// Fan a snapshot out to every progress observer, in registration order
    pub fn publish(&self, progress: Progress) {
        let observers = {
            let mut state = self.lock();
            if state.result.is_some() {
                return;
            }
            state.last_progress = Some(progress);
            state.progress_observers.clone()
        };

        for observer in observers {
            observer(progress);
        }
    }
}

impl std::fmt::Debug for CompletionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("CompletionGate")
            .field("result", &state.result)
            .field("delivering", &state.delivering)
            .field("last_progress", &state.last_progress)
            .field("progress_observers", &state.progress_observers.len())
            .field("completion_observers", &state.completion_observers.len())
            .finish()
    }
}
