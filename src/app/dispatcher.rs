//! Side-effect dispatch with last-writer-wins cancellation.
//!
//! Each effect targets a slot: avatar fetches are keyed by group, roster
//! pushes by group and recipient. Dispatching into an occupied slot cancels
//! the earlier task, so a newer avatar pointer or a fresher roster replaces
//! work that has not run yet.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use crate::core::{GroupId, SideEffect, Task, TaskRunner};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum Slot {
    Avatar(GroupId),
    Push(GroupId, String),
}

impl From<&SideEffect> for Slot {
    fn from(effect: &SideEffect) -> Self {
        match effect {
            SideEffect::FetchAvatar { group_id, .. } => Slot::Avatar(group_id.clone()),
            SideEffect::PushRoster { recipient, record } => {
                Slot::Push(record.id.clone(), recipient.clone())
            }
        }
    }
}

pub struct SideEffectDispatcher<R: TaskRunner> {
    runner: Arc<R>,
    pending: Mutex<HashMap<Slot, Task>>,
}

impl<R: TaskRunner> SideEffectDispatcher<R> {
    pub fn new(runner: Arc<R>) -> Self {
        Self {
            runner,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn runner(&self) -> &Arc<R> {
        &self.runner
    }

    /// Hand `effects` to the runner without waiting on them.
    pub fn dispatch(&self, effects: Vec<SideEffect>) {
        if effects.is_empty() {
            return;
        }

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        // Finished and superseded tasks have cancelled tokens.
        pending.retain(|_, task| !task.token.is_cancelled());

        for effect in effects {
            let task = Task::new(effect);
            if let Some(previous) = pending.insert(Slot::from(&task.effect), task.clone()) {
                debug!(
                    "[dispatch]: superseding pending task for group {}",
                    previous.effect.group_id()
                );
                previous.token.cancel();
            }
            self.runner.enqueue(task);
        }
    }

    /// Number of dispatched tasks not yet finished or superseded.
    pub fn pending(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|task| !task.token.is_cancelled())
            .count()
    }
}
