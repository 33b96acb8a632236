//! Service provider trait for the reconciler.
//!
//! [`ReconcilerProvider`] bundles the collaborator types a
//! [`GroupProcessor`](crate::app::GroupProcessor) is wired to, so the
//! processor takes one type parameter instead of five.
//!
//! ```ignore
//! use group_reconciler::app::{GroupProcessor, InMemoryProvider};
//!
//! let processor: GroupProcessor<InMemoryProvider> = GroupProcessor::new(
//!     roster, threads, history, notifier, runner, &config,
//! );
//! ```

use async_trait::async_trait;
use tracing::info;

use crate::app::runner::TokioTaskRunner;
use crate::core::{HistoryStore, Notifier, RosterStore, TaskRunner, ThreadId, ThreadStore};
use crate::storage::{MemoryHistoryStore, MemoryRosterStore, MemoryThreadStore};

pub trait ReconcilerProvider: 'static {
    type Roster: RosterStore;
    type Threads: ThreadStore;
    type History: HistoryStore;
    type Notifier: Notifier + 'static;
    type Runner: TaskRunner;
}

/// Notifier that only logs.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, thread: ThreadId) {
        info!("[notify]: new group update in thread {thread}");
    }
}

/// In-memory stores, a logging notifier and the tokio task runner.
pub struct InMemoryProvider;

impl ReconcilerProvider for InMemoryProvider {
    type Roster = MemoryRosterStore;
    type Threads = MemoryThreadStore;
    type History = MemoryHistoryStore;
    type Notifier = LogNotifier;
    type Runner = TokioTaskRunner;
}
