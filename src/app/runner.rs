//! Background execution of side-effect tasks.
//!
//! [`TokioTaskRunner`] owns an unbounded queue drained by a single worker.
//! The worker spawns one future per task so a slow avatar download never
//! holds up a roster push. Failed tasks are retried with a linear backoff
//! until [`RunnerConfig::max_attempts`] is reached.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, warn};

use crate::app::config::RunnerConfig;
use crate::core::{AvatarPointer, GroupId, SideEffect, Task, TaskRunner};
use crate::ds::OutboundPacket;

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Avatar fetch failed: {0}")]
    AvatarFetch(String),
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Performs the I/O behind each side effect.
#[async_trait]
pub trait TaskExecutor: Send + Sync + 'static {
    async fn fetch_avatar(&self, group_id: &GroupId, pointer: &AvatarPointer)
        -> Result<(), TaskError>;

    async fn push_roster(&self, packet: OutboundPacket) -> Result<(), TaskError>;
}

pub struct TokioTaskRunner {
    sender: mpsc::UnboundedSender<Task>,
}

impl TokioTaskRunner {
    /// Start the worker on the current runtime.
    ///
    /// The worker stops once every clone of the runner has been dropped and
    /// the queue is drained.
    pub fn spawn<E: TaskExecutor>(executor: Arc<E>, config: RunnerConfig) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Task>();
        let handle = tokio::spawn(async move {
            info!("[task_runner]: started");
            while let Some(task) = receiver.recv().await {
                if task.token.is_cancelled() {
                    debug!(
                        "[task_runner]: skipping superseded task for group {}",
                        task.effect.group_id()
                    );
                    continue;
                }
                tokio::spawn(run_task(executor.clone(), task, config.clone()));
            }
            info!("[task_runner]: queue closed");
        });
        (Self { sender }, handle)
    }
}

impl TaskRunner for TokioTaskRunner {
    fn enqueue(&self, task: Task) {
        if let Err(e) = self.sender.send(task) {
            warn!(
                "[enqueue]: runner stopped, dropping task for group {}",
                e.0.effect.group_id()
            );
        }
    }
}

async fn run_task<E: TaskExecutor>(executor: Arc<E>, task: Task, config: RunnerConfig) {
    let attempts = config.max_attempts.max(1);
    for attempt in 1..=attempts {
        let result = tokio::select! {
            _ = task.token.cancelled() => {
                debug!(
                    "[run_task]: task for group {} cancelled",
                    task.effect.group_id()
                );
                return;
            }
            result = execute(executor.as_ref(), &task.effect) => result,
        };

        match result {
            Ok(()) => {
                task.token.cancel();
                return;
            }
            Err(e) if attempt < attempts => {
                warn!("[run_task]: attempt {attempt}/{attempts} failed: {e}");
                tokio::time::sleep(config.retry_backoff(attempt)).await;
            }
            Err(e) => {
                error!(
                    "[run_task]: giving up on group {} after {attempts} attempts: {e}",
                    task.effect.group_id()
                );
            }
        }
    }
    task.token.cancel();
}

async fn execute<E: TaskExecutor + ?Sized>(
    executor: &E,
    effect: &SideEffect,
) -> Result<(), TaskError> {
    match effect {
        SideEffect::FetchAvatar { group_id, pointer } => {
            executor.fetch_avatar(group_id, pointer).await
        }
        SideEffect::PushRoster { recipient, record } => {
            executor
                .push_roster(OutboundPacket::roster_push(recipient, record))
                .await
        }
    }
}
