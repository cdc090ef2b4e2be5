//! Keyed asset task table and its workers.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::error::AssetError;
use crate::config::{MAX_ASSET_CONCURRENCY, MIN_ASSET_CONCURRENCY};
use crate::dispatch::MainQueue;
use crate::transport::{FetchRequest, Transport};

/// Downloaded asset bytes, shared by every callback of one task.
pub type AssetData = Arc<[u8]>;

type AssetCallback = Box<dyn FnOnce(AssetData) + Send + 'static>;

/// Lifecycle of one asset task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Waiting for a concurrency permit.
    Pending,
    /// Download in flight.
    Running,
    /// Data downloaded; delivery to callbacks is queued.
    Completed,
    /// Cancelled; the result will be discarded.
    Cancelled,
}

/// What [`AssetQueue::request`] did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetRequest {
    /// A new download task was started.
    Started,
    /// The callback joined a task already running for the key.
    Attached,
    /// The URL was malformed or not http(s); nothing was scheduled.
    Dropped,
}

/// Counters for asset tasks, updated from worker tasks.
#[derive(Debug, Default)]
pub struct AssetStats {
    completed: AtomicUsize,
    failed: AtomicUsize,
    cancelled: AtomicUsize,
}

impl AssetStats {
    /// Tasks whose data reached their callbacks.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Tasks whose download failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Tasks cancelled before delivery.
    #[must_use]
    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }
}

struct AssetTask {
    id: u64,
    state: TaskState,
    callbacks: Vec<AssetCallback>,
    data: Option<AssetData>,
    cancel: CancellationToken,
}

impl AssetTask {
    fn is_live(&self) -> bool {
        matches!(
            self.state,
            TaskState::Pending | TaskState::Running | TaskState::Completed
        )
    }

    fn mark_cancelled(&mut self) {
        self.state = TaskState::Cancelled;
        self.callbacks.clear();
        self.data = None;
        self.cancel.cancel();
    }
}

struct Inner<K> {
    tasks: Mutex<HashMap<K, AssetTask>>,
    next_id: AtomicU64,
    stats: AssetStats,
    semaphore: Arc<Semaphore>,
    transport: Arc<dyn Transport>,
    main: MainQueue,
    timeout: Duration,
    concurrency: usize,
}

/// Bounded, de-duplicated, cancellable asset downloader.
///
/// # Concurrency Model
///
/// - Each task runs in its own tokio task and waits for a semaphore permit
/// - The task table is the only shared state; it is locked briefly and never
///   across an await
/// - Callbacks are posted to the [`MainQueue`] and re-check the task before
///   running, so a cancellation that lands first always wins
pub struct AssetQueue<K> {
    inner: Arc<Inner<K>>,
}

impl<K> Clone for AssetQueue<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> fmt::Debug for AssetQueue<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetQueue")
            .field("concurrency", &self.inner.concurrency)
            .field("stats", &self.inner.stats)
            .finish_non_exhaustive()
    }
}

impl<K> AssetQueue<K>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
{
    /// Creates a queue running at most `concurrency` downloads at once.
    ///
    /// # Errors
    ///
    /// Returns [`AssetError::InvalidConcurrency`] if the value is outside
    /// the valid range (1-100).
    #[instrument(level = "debug", skip(transport, main))]
    pub fn new(
        transport: Arc<dyn Transport>,
        main: MainQueue,
        concurrency: usize,
        timeout: Duration,
    ) -> Result<Self, AssetError> {
        if !(MIN_ASSET_CONCURRENCY..=MAX_ASSET_CONCURRENCY).contains(&concurrency) {
            return Err(AssetError::InvalidConcurrency { value: concurrency });
        }
        Ok(Self {
            inner: Arc::new(Inner {
                tasks: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                stats: AssetStats::default(),
                semaphore: Arc::new(Semaphore::new(concurrency)),
                transport,
                main,
                timeout,
                concurrency,
            }),
        })
    }

    /// Returns the task counters.
    #[must_use]
    pub fn stats(&self) -> &AssetStats {
        &self.inner.stats
    }

    /// Requests the asset at `url` under `key`.
    ///
    /// `on_complete` runs once on the main queue with the downloaded bytes. It
    /// never runs if the task is cancelled or the download fails.
    pub fn request(
        &self,
        key: K,
        url: &str,
        on_complete: impl FnOnce(AssetData) + Send + 'static,
    ) -> AssetRequest {
        let Some(url) = parse_asset_url(url) else {
            debug!(key = ?key, url, "dropping malformed asset URL");
            return AssetRequest::Dropped;
        };

        let mut tasks = self.lock_tasks();
        if let Some(task) = tasks.get_mut(&key)
            && task.is_live()
        {
            task.callbacks.push(Box::new(on_complete));
            debug!(key = ?key, callbacks = task.callbacks.len(), "joined running asset task");
            return AssetRequest::Attached;
        }

        let callback: AssetCallback = Box::new(on_complete);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        tasks.insert(
            key.clone(),
            AssetTask {
                id,
                state: TaskState::Pending,
                callbacks: vec![callback],
                data: None,
                cancel: cancel.clone(),
            },
        );
        drop(tasks);

        debug!(key = ?key, task_id = id, url = %url, "starting asset task");
        let queue = self.clone();
        tokio::spawn(async move {
            queue.run_task(key, id, url, cancel).await;
        });
        AssetRequest::Started
    }

    /// Cancels the task for `key`. Returns false if there was nothing to cancel.
    pub fn cancel(&self, key: &K) -> bool {
        let mut tasks = self.lock_tasks();
        match tasks.get_mut(key) {
            Some(task) if task.is_live() => {
                task.mark_cancelled();
                self.inner.stats.cancelled.fetch_add(1, Ordering::SeqCst);
                debug!(key = ?key, task_id = task.id, "asset task cancelled");
                true
            }
            _ => false,
        }
    }

    /// Cancels every task whose key matches `predicate`; returns how many.
    pub fn cancel_where(&self, mut predicate: impl FnMut(&K) -> bool) -> usize {
        let mut tasks = self.lock_tasks();
        let mut cancelled = 0;
        for (key, task) in tasks.iter_mut() {
            if task.is_live() && predicate(key) {
                task.mark_cancelled();
                cancelled += 1;
            }
        }
        self.inner
            .stats
            .cancelled
            .fetch_add(cancelled, Ordering::SeqCst);
        if cancelled > 0 {
            debug!(cancelled, "asset tasks cancelled");
        }
        cancelled
    }

    /// Cancels every outstanding task.
    pub fn cancel_all(&self) -> usize {
        self.cancel_where(|_| true)
    }

    /// Current state of the task for `key`, if one exists.
    #[must_use]
    pub fn state(&self, key: &K) -> Option<TaskState> {
        self.lock_tasks().get(key).map(|task| task.state)
    }

    /// Number of tasks waiting for a permit or downloading.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.lock_tasks()
            .values()
            .filter(|task| matches!(task.state, TaskState::Pending | TaskState::Running))
            .count()
    }

    fn lock_tasks(&self) -> MutexGuard<'_, HashMap<K, AssetTask>> {
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_task(&self, key: K, id: u64, url: Url, cancel: CancellationToken) {
        let permit = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                self.remove_cancelled(&key, id);
                return;
            }
            permit = Arc::clone(&self.inner.semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(key = ?key, "asset semaphore closed");
                    self.fail(&key, id);
                    return;
                }
            },
        };

        if !self.transition(&key, id, TaskState::Pending, TaskState::Running) {
            self.remove_cancelled(&key, id);
            return;
        }

        let request = FetchRequest::get(url, self.inner.timeout);
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                self.remove_cancelled(&key, id);
                return;
            }
            result = self.inner.transport.send(&request) => result,
        };
        drop(permit);

        match result {
            Ok(body) => self.complete(key, id, body.into()),
            Err(error) => {
                warn!(key = ?key, url = %request.url, error = %error, "asset download failed");
                self.fail(&key, id);
            }
        }
    }

    fn transition(&self, key: &K, id: u64, from: TaskState, to: TaskState) -> bool {
        let mut tasks = self.lock_tasks();
        match tasks.get_mut(key) {
            Some(task) if task.id == id && task.state == from => {
                task.state = to;
                true
            }
            _ => false,
        }
    }

    fn remove_cancelled(&self, key: &K, id: u64) {
        let mut tasks = self.lock_tasks();
        if tasks
            .get(key)
            .is_some_and(|task| task.id == id && task.state == TaskState::Cancelled)
        {
            tasks.remove(key);
        }
        debug!(key = ?key, task_id = id, "asset task discarded");
    }

    fn fail(&self, key: &K, id: u64) {
        let mut tasks = self.lock_tasks();
        if tasks.get(key).is_some_and(|task| task.id == id) {
            tasks.remove(key);
        }
        self.inner.stats.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn complete(&self, key: K, id: u64, data: AssetData) {
        {
            let mut tasks = self.lock_tasks();
            match tasks.get_mut(&key) {
                Some(task) if task.id == id && task.state == TaskState::Running => {
                    task.state = TaskState::Completed;
                    task.data = Some(data);
                }
                _ => {
                    debug!(key = ?key, task_id = id, "asset finished after cancellation");
                    return;
                }
            }
        }

        let queue = self.clone();
        self.inner.main.post(move || queue.deliver(&key, id));
    }

    /// Runs on the main queue: hands the data to every callback attached so
    /// far and forgets the task.
    fn deliver(&self, key: &K, id: u64) {
        let (callbacks, data) = {
            let mut tasks = self.lock_tasks();
            if !tasks.get(key).is_some_and(|task| task.id == id) {
                return;
            }
            let Some(task) = tasks.remove(key) else {
                return;
            };
            match (task.state, task.data) {
                (TaskState::Completed, Some(data)) => (task.callbacks, data),
                _ => return,
            }
        };
        self.inner.stats.completed.fetch_add(1, Ordering::SeqCst);

        info!(key = ?key, bytes = data.len(), callbacks = callbacks.len(), "asset delivered");
        for callback in callbacks {
            callback(Arc::clone(&data));
        }
    }
}

fn parse_asset_url(raw: &str) -> Option<Url> {
    let url = Url::parse(raw.trim()).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}
