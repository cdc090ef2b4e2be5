//! Lazy, cancellable asset downloads.
//!
//! [`AssetQueue`] downloads thumbnails (or any small binary asset) on demand:
//!
//! - at most `concurrency` downloads run at once (semaphore permits)
//! - at most one task exists per key; repeat requests join the running task
//! - [`AssetQueue::cancel`] discards a task's result and drops its callbacks
//! - callbacks run on the [`MainQueue`](crate::dispatch::MainQueue), never on
//!   the worker

mod error;
mod queue;

pub use error::AssetError;
pub use queue::{AssetData, AssetQueue, AssetRequest, AssetStats, TaskState};
