//! Serial delivery queue for caller-visible effects.
//!
//! Background work (fetch cycles, asset downloads) never touches caller state
//! directly. It posts closures to a [`MainQueue`], and a single actor task runs
//! them one at a time in posting order. This is the only place completions,
//! progress updates, and asset callbacks execute.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle to the serial delivery queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct MainQueue {
    sender: mpsc::UnboundedSender<Job>,
}

impl MainQueue {
    /// Spawns the queue actor on the current tokio runtime.
    ///
    /// The actor stops once every handle has been dropped and the remaining
    /// jobs have run.
    #[must_use]
    pub fn spawn() -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_queue(receiver));
        (Self { sender }, handle)
    }

    /// Schedules `job` after everything already posted.
    ///
    /// Jobs posted after the actor stopped are dropped.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) {
        if self.sender.send(Box::new(job)).is_err() {
            debug!("main queue closed; dropping job");
        }
    }

    /// Resolves once every job posted before this call has run.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        self.post(move || {
            let _ = done_tx.send(());
        });
        let _ = done_rx.await;
    }
}

async fn run_queue(mut receiver: mpsc::UnboundedReceiver<Job>) {
    debug!("main queue started");
    while let Some(job) = receiver.recv().await {
        job();
    }
    debug!("main queue stopped");
}
