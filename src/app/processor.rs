//! Group processor: the reconciler's entry point.
//!
//! Events for one group are handled one at a time; events for different
//! groups run concurrently. Everything from the roster read to the side
//! effect hand-off happens under the group's lock. The roster commit and the
//! history write succeed together: if the history write fails, the record is
//! restored to its pre-event snapshot so a redelivery reconciles from
//! scratch. The notifier runs after the lock is released.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::app::config::ProcessorConfig;
use crate::app::dispatcher::SideEffectDispatcher;
use crate::app::locks::GroupLocks;
use crate::app::provider::ReconcilerProvider;
use crate::core::{
    self, CoreError, Direction, GroupEvent, GroupId, GroupRecord, Materialized, Notifier,
    ReconcileResult, RosterStore, StorageError, ThreadId,
};
use crate::ds::{decode_event, InboundEnvelope};

/// Applies group control events to the roster store and records them as
/// conversation history.
///
/// The type parameter `P` selects the collaborators. Use
/// [`InMemoryProvider`](crate::app::InMemoryProvider) for the in-memory
/// stores and the tokio task runner.
pub struct GroupProcessor<P: ReconcilerProvider> {
    roster: Arc<P::Roster>,
    threads: Arc<P::Threads>,
    history: Arc<P::History>,
    notifier: Arc<P::Notifier>,
    dispatcher: SideEffectDispatcher<P::Runner>,
    locks: Arc<GroupLocks>,
}

impl<P: ReconcilerProvider> GroupProcessor<P> {
    pub fn new(
        roster: Arc<P::Roster>,
        threads: Arc<P::Threads>,
        history: Arc<P::History>,
        notifier: Arc<P::Notifier>,
        runner: Arc<P::Runner>,
        config: &ProcessorConfig,
    ) -> Self {
        Self {
            roster,
            threads,
            history,
            notifier,
            dispatcher: SideEffectDispatcher::new(runner),
            locks: Arc::new(GroupLocks::new(config.lock_prune_threshold)),
        }
    }

    pub fn roster(&self) -> &Arc<P::Roster> {
        &self.roster
    }

    pub fn history(&self) -> &Arc<P::History> {
        &self.history
    }

    pub fn dispatcher(&self) -> &SideEffectDispatcher<P::Runner> {
        &self.dispatcher
    }

    pub fn locks(&self) -> &Arc<GroupLocks> {
        &self.locks
    }

    /// Current record for `group_id`, read under the group's lock.
    pub async fn group(&self, group_id: &GroupId) -> Result<Option<GroupRecord>, StorageError> {
        let _guard = self.locks.acquire(group_id).await;
        self.roster.get(group_id)
    }

    // ─────────────────────────── Processing ───────────────────────────

    /// Reconcile one control event.
    ///
    /// Returns the thread the event was recorded in, or `None` when nothing
    /// was recorded: the event was invalid or unrecognized, a store failed,
    /// the event was a read-only request, the sender was not a member, or
    /// the incoming event had already been stored.
    pub async fn process(&self, event: GroupEvent) -> Option<ThreadId> {
        let materialized = match self.process_locked(&event).await {
            Ok(materialized) => materialized,
            Err(e) => {
                log_rejection(&event, &e);
                return None;
            }
        };

        match materialized? {
            Materialized::Received(thread) => {
                self.notifier.notify(thread).await;
                Some(thread)
            }
            Materialized::Sent(thread) => Some(thread),
            Materialized::Duplicate => None,
        }
    }

    /// Decode `envelope` and reconcile the event it carries.
    pub async fn process_envelope(
        &self,
        envelope: &InboundEnvelope,
        direction: Direction,
    ) -> Option<ThreadId> {
        match decode_event(envelope, direction) {
            Ok(event) => self.process(event).await,
            Err(e) => {
                warn!(
                    "[process_envelope]: dropping envelope from {}: {e}",
                    envelope.source
                );
                None
            }
        }
    }

    /// Everything here runs under the group's lock, including the hand-off
    /// of side effects, so supersession follows commit order.
    async fn process_locked(&self, event: &GroupEvent) -> Result<Option<Materialized>, CoreError> {
        core::validate(event)?;
        let _guard = self.locks.acquire(&event.group_id).await;

        let snapshot = self.roster.get(&event.group_id)?;
        let rule = core::classify(event, snapshot.clone());
        debug!(
            "[process]: {} event for group {} from {} -> {}",
            event.kind,
            event.group_id,
            event.sender,
            rule.name()
        );

        let reconciliation = match core::reconcile(event, rule)? {
            ReconcileResult::StaleSenderNotMember(sender) => {
                info!(
                    "[process]: ignoring {} from non-member {sender} in group {}",
                    event.kind, event.group_id
                );
                return Ok(None);
            }
            ReconcileResult::ScheduleOnly(effects) => {
                self.dispatcher.dispatch(effects);
                return Ok(None);
            }
            ReconcileResult::Changed(reconciliation) => reconciliation,
        };

        if !reconciliation.missing.is_empty() {
            debug!(
                "[process]: group {} update omitted {} stored member(s)",
                event.group_id,
                reconciliation.missing.len()
            );
        }

        let committed = !reconciliation.batch.is_empty();
        if committed {
            self.roster.apply(&event.group_id, &reconciliation.batch)?;
        }

        let materialized = match core::materialize(
            event,
            &reconciliation.update,
            self.threads.as_ref(),
            self.history.as_ref(),
        ) {
            Ok(materialized) => materialized,
            Err(e) => {
                if committed {
                    self.rollback(&event.group_id, snapshot);
                }
                return Err(e);
            }
        };

        if committed {
            info!(
                "[process]: group {} {} applied {} change(s)",
                event.group_id,
                event.kind,
                reconciliation.batch.changes().len()
            );
        }
        self.dispatcher.dispatch(reconciliation.effects);
        Ok(Some(materialized))
    }

    /// Put the pre-event record back after a failed history write.
    fn rollback(&self, group_id: &GroupId, snapshot: Option<GroupRecord>) {
        if let Err(e) = self.roster.restore(group_id, snapshot) {
            error!("[rollback]: group {group_id} could not be restored: {e}");
        }
    }
}

fn log_rejection(event: &GroupEvent, e: &CoreError) {
    match e {
        CoreError::Persistence(_) => {
            error!("[process]: group {} not updated: {e}", event.group_id)
        }
        CoreError::InvalidEvent(_) | CoreError::UnknownEventShape(_) | CoreError::Message(_) => {
            warn!(
                "[process]: rejected {} event from {}: {e}",
                event.kind, event.sender
            )
        }
    }
}
