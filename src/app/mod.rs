//! Async application layer for the reconciler.
//!
//! This module sequences the synchronous [`crate::core`] steps per group and
//! runs side effects in the background. It includes:
//!
//! - [`GroupProcessor`] - Entry point, one `process` call per control event
//! - [`SideEffectDispatcher`] - Hands side effects to a [`TaskRunner`](crate::core::TaskRunner)
//! - [`TokioTaskRunner`] - Queue-backed runner with retries
//!
//! # Usage
//!
//! ```ignore
//! use group_reconciler::app::{GroupProcessor, InMemoryProvider, TokioTaskRunner};
//!
//! let (runner, _worker) = TokioTaskRunner::spawn(executor, config.runner.clone());
//! let processor: GroupProcessor<InMemoryProvider> = GroupProcessor::new(
//!     roster, threads, history, notifier, Arc::new(runner), &config,
//! );
//! let thread = processor.process(event).await;
//! ```

mod config;
mod dispatcher;
mod locks;
mod processor;
mod provider;
mod runner;

pub use config::{ConfigError, ProcessorConfig, RunnerConfig};
pub use dispatcher::SideEffectDispatcher;
pub use locks::GroupLocks;
pub use processor::GroupProcessor;
pub use provider::{InMemoryProvider, LogNotifier, ReconcilerProvider};
pub use runner::{TaskError, TaskExecutor, TokioTaskRunner};
