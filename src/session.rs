//! The caller-facing search facade.
//!
//! [`RecipeSearch`] owns the current query, the visible items, and the last
//! retry snapshot. Every search bumps a generation counter; background work
//! carries the generation it was started under and its effects are dropped
//! once a newer search has begun. All caller-visible mutation happens on the
//! [`MainQueue`].
//!
//! # Example
//!
//! ```no_run
//! use recipup_core::config::FetchConfig;
//! use recipup_core::dispatch::MainQueue;
//! use recipup_core::session::RecipeSearch;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (main, _actor) = MainQueue::spawn();
//! let search = RecipeSearch::with_http(FetchConfig::default(), main)?;
//! search.on_retry_progress(|progress: recipup_core::fetch::RetryProgress| {
//!     if let Some(notice) = progress.message() {
//!         eprintln!("{notice}");
//!     }
//! });
//! let records = search.search("bacon pie").await?;
//! println!("{} recipes", records.len());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use url::Url;

use crate::assets::{AssetData, AssetError, AssetQueue, AssetRequest, AssetStats};
use crate::config::{ConfigError, FetchConfig};
use crate::dispatch::MainQueue;
use crate::fetch::{FetchError, ProgressObserver, RetryOrchestrator, RetryProgress};
use crate::search::{Record, SearchQuery};
use crate::transport::{HttpTransport, Transport};

/// Asset task key: the search generation and the item index within it.
pub type AssetKey = (u64, usize);

type Completion = Box<dyn FnOnce(Result<Vec<Record>, FetchError>) + Send + 'static>;

/// Errors from building a [`RecipeSearch`].
#[derive(Debug, Error)]
pub enum SessionError {
    /// The configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The asset queue rejected its settings.
    #[error(transparent)]
    Assets(#[from] AssetError),

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

struct SessionState {
    config: FetchConfig,
    endpoint: Url,
    query: Option<SearchQuery>,
    generation: u64,
    items: Vec<Record>,
    progress: RetryProgress,
    error_notice: Option<String>,
    cycle_cancel: Option<CancellationToken>,
}

struct Shared {
    state: Mutex<SessionState>,
    observers: Mutex<Vec<Arc<dyn ProgressObserver>>>,
    transport: Arc<dyn Transport>,
    assets: AssetQueue<AssetKey>,
    main: MainQueue,
}

/// Search facade: current query, visible items, retry progress, and lazy
/// asset requests. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct RecipeSearch {
    shared: Arc<Shared>,
}

impl fmt::Debug for RecipeSearch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock_state();
        f.debug_struct("RecipeSearch")
            .field("query", &state.query)
            .field("generation", &state.generation)
            .field("items", &state.items.len())
            .finish_non_exhaustive()
    }
}

impl RecipeSearch {
    /// Creates a facade over `transport`, delivering effects on `main`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if `config` is invalid.
    pub fn new(
        config: FetchConfig,
        transport: Arc<dyn Transport>,
        main: MainQueue,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let endpoint = config.endpoint()?;
        let assets = AssetQueue::new(
            Arc::clone(&transport),
            main.clone(),
            config.asset_concurrency,
            config.session_timeout(),
        )?;
        debug!(endpoint = %endpoint, "creating search session");

        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SessionState {
                    config,
                    endpoint,
                    query: None,
                    generation: 0,
                    items: Vec::new(),
                    progress: RetryProgress::default(),
                    error_notice: None,
                    cycle_cancel: None,
                }),
                observers: Mutex::new(Vec::new()),
                transport,
                assets,
                main,
            }),
        })
    }

    /// Creates a facade over a reqwest transport.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if `config` is invalid or the client cannot
    /// be built.
    pub fn with_http(config: FetchConfig, main: MainQueue) -> Result<Self, SessionError> {
        let transport = HttpTransport::new(config.session_timeout())?;
        Self::new(config, Arc::new(transport), main)
    }

    /// Registers an observer for retry progress of the current search.
    ///
    /// Observers run on the main queue and only see snapshots from the
    /// current generation.
    pub fn on_retry_progress(&self, observer: impl ProgressObserver + 'static) {
        self.shared
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(observer));
    }

    /// Starts a search for `term` in the background.
    ///
    /// Clears the visible items, cancels outstanding asset tasks, and
    /// supersedes any running cycle. `on_complete` runs on the main queue
    /// unless a newer search starts first, in which case it is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidQuery`] for a blank term; nothing changes.
    #[instrument(skip(self, on_complete))]
    pub fn submit(
        &self,
        term: &str,
        on_complete: impl FnOnce(Result<Vec<Record>, FetchError>) + Send + 'static,
    ) -> Result<u64, FetchError> {
        let query = SearchQuery::new(term)?;
        Ok(self.start_cycle(query, Box::new(on_complete)))
    }

    /// Runs a search for `term` and waits for its outcome.
    ///
    /// # Errors
    ///
    /// Returns the cycle's [`FetchError`]; [`FetchError::Superseded`] when a
    /// newer search replaced this one before it finished.
    pub async fn search(&self, term: &str) -> Result<Vec<Record>, FetchError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.submit(term, move |outcome| {
            let _ = done_tx.send(outcome);
        })?;
        done_rx.await.unwrap_or(Err(FetchError::Superseded))
    }

    /// Restarts the current query from a fresh retry state.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::NoQuery`] if nothing has been searched yet, or
    /// the new cycle's error.
    pub async fn refresh(&self) -> Result<Vec<Record>, FetchError> {
        let query = self.query().ok_or(FetchError::NoQuery)?;
        let (done_tx, done_rx) = oneshot::channel();
        self.start_cycle(
            query,
            Box::new(move |outcome| {
                let _ = done_tx.send(outcome);
            }),
        );
        done_rx.await.unwrap_or(Err(FetchError::Superseded))
    }

    /// Number of visible items.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.shared.lock_state().items.len()
    }

    /// The item at `index`, if any.
    #[must_use]
    pub fn item(&self, index: usize) -> Option<Record> {
        self.shared.lock_state().items.get(index).cloned()
    }

    /// The current query, if one has been submitted.
    #[must_use]
    pub fn query(&self) -> Option<SearchQuery> {
        self.shared.lock_state().query.clone()
    }

    /// Last progress snapshot delivered for the current search.
    #[must_use]
    pub fn retry_progress(&self) -> RetryProgress {
        self.shared.lock_state().progress
    }

    /// Persistent error notice from the last failed search; cleared by
    /// success or a new search.
    #[must_use]
    pub fn error_notice(&self) -> Option<String> {
        self.shared.lock_state().error_notice.clone()
    }

    /// True while a search cycle is running, including its backoff waits.
    ///
    /// Cleared when the current cycle's outcome is delivered on the main queue.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.shared.lock_state().cycle_cancel.is_some()
    }

    /// Configuration used by the next cycle.
    #[must_use]
    pub fn config(&self) -> FetchConfig {
        self.shared.lock_state().config.clone()
    }

    /// Replaces the configuration used by subsequent cycles.
    ///
    /// Asset concurrency is fixed when the session is created.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` is invalid; the old one stays.
    pub fn set_config(&self, config: FetchConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let endpoint = config.endpoint()?;
        let mut state = self.shared.lock_state();
        state.config = config;
        state.endpoint = endpoint;
        Ok(())
    }

    /// Requests the asset of item `index`.
    ///
    /// Items without an asset URL (or out of range) are a no-op and return
    /// [`AssetRequest::Dropped`].
    pub fn request_asset(
        &self,
        index: usize,
        on_complete: impl FnOnce(AssetData) + Send + 'static,
    ) -> AssetRequest {
        let (generation, url) = {
            let state = self.shared.lock_state();
            let url = state
                .items
                .get(index)
                .and_then(Record::asset_url)
                .map(str::to_string);
            (state.generation, url)
        };
        let Some(url) = url else {
            debug!(index, "item has no asset URL");
            return AssetRequest::Dropped;
        };
        self.shared
            .assets
            .request((generation, index), &url, on_complete)
    }

    /// Cancels the asset task of item `index`.
    pub fn cancel_asset(&self, index: usize) -> bool {
        let generation = self.shared.lock_state().generation;
        self.shared.assets.cancel(&(generation, index))
    }

    /// Cancels asset tasks for items outside `visible`; returns how many.
    ///
    /// Items that scroll back into view can simply be requested again.
    pub fn visible_range_changed(&self, visible: Range<usize>) -> usize {
        let generation = self.shared.lock_state().generation;
        self.shared
            .assets
            .cancel_where(|(task_generation, index)| {
                *task_generation != generation || !visible.contains(index)
            })
    }

    /// Asset task counters.
    #[must_use]
    pub fn asset_stats(&self) -> &AssetStats {
        self.shared.assets.stats()
    }

    /// Asset tasks waiting for a permit or downloading.
    #[must_use]
    pub fn assets_in_flight(&self) -> usize {
        self.shared.assets.in_flight()
    }

    fn start_cycle(&self, query: SearchQuery, on_complete: Completion) -> u64 {
        let cancel = CancellationToken::new();
        let (generation, strategy, orchestrator) = {
            let mut state = self.shared.lock_state();
            if let Some(previous) = state.cycle_cancel.replace(cancel.clone()) {
                previous.cancel();
            }
            state.generation += 1;
            state.query = Some(query.clone());
            state.items.clear();
            state.progress = RetryProgress::default();
            state.error_notice = None;
            let orchestrator = RetryOrchestrator::new(
                Arc::clone(&self.shared.transport),
                state.endpoint.clone(),
                state.config.session_timeout(),
            );
            (state.generation, state.config.strategy(), orchestrator)
        };
        let cancelled_assets = self.shared.assets.cancel_all();
        info!(query = %query, generation, cancelled_assets, "search started");

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let observer = {
                let shared = Arc::clone(&shared);
                move |progress: RetryProgress| {
                    let target = Arc::clone(&shared);
                    shared
                        .main
                        .post(move || target.deliver_progress(generation, progress));
                }
            };
            let outcome = orchestrator
                .run_cycle(&query, strategy, &cancel, &observer)
                .await;
            let target = Arc::clone(&shared);
            shared
                .main
                .post(move || target.finish_cycle(generation, outcome, on_complete));
        });
        generation
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver_progress(&self, generation: u64, progress: RetryProgress) {
        {
            let mut state = self.lock_state();
            if state.generation != generation {
                return;
            }
            state.progress = progress;
        }
        let observers = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in observers {
            observer.on_progress(progress);
        }
    }

    fn finish_cycle(
        &self,
        generation: u64,
        outcome: Result<Vec<Record>, FetchError>,
        on_complete: Completion,
    ) {
        {
            let mut state = self.lock_state();
            if state.generation != generation {
                debug!(generation, current = state.generation, "dropping superseded search result");
                return;
            }
            state.cycle_cancel = None;
            match &outcome {
                Ok(records) => {
                    state.items.clone_from(records);
                    state.error_notice = None;
                }
                Err(error) => state.error_notice = Some(error.to_string()),
            }
        }
        on_complete(outcome);
    }
}
