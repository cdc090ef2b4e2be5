//! Scripted in-memory transport for unit tests.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};
use url::Url;

use super::{FetchRequest, Transport, TransportError};

type Responder = dyn Fn(&FetchRequest, usize) -> Result<Vec<u8>, TransportError> + Send + Sync;

/// Transport whose answers come from a closure `(request, call_index) -> outcome`.
///
/// Optionally gated: every call blocks until the test releases a permit, which
/// lets tests hold fetches "in flight" deterministically.
pub(crate) struct ScriptedTransport {
    responder: Box<Responder>,
    calls: AtomicUsize,
    urls: Mutex<Vec<Url>>,
    called: Notify,
    gate: Option<Arc<Semaphore>>,
}

impl fmt::Debug for ScriptedTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedTransport")
            .field("calls", &self.calls())
            .field("gated", &self.gate.is_some())
            .finish_non_exhaustive()
    }
}

impl ScriptedTransport {
    pub(crate) fn new(
        responder: impl Fn(&FetchRequest, usize) -> Result<Vec<u8>, TransportError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
            called: Notify::new(),
            gate: None,
        }
    }

    /// Answers call `i` with `outcomes[i]`, repeating the last outcome forever.
    pub(crate) fn sequence(outcomes: Vec<Result<Vec<u8>, TransportError>>) -> Self {
        Self::new(move |_, index| {
            outcomes
                .get(index)
                .or_else(|| outcomes.last())
                .cloned()
                .unwrap_or_else(|| Err(TransportError::other("fake://", "empty script")))
        })
    }

    /// Fails every call with a timeout.
    pub(crate) fn always_timing_out() -> Self {
        Self::new(|request, _| Err(TransportError::timeout(request.url.as_str())))
    }

    /// Makes every call wait for a permit on the returned semaphore.
    pub(crate) fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn requested_urls(&self) -> Vec<Url> {
        self.urls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Resolves once at least `count` calls have started.
    pub(crate) async fn wait_for_calls(&self, count: usize) {
        loop {
            let notified = self.called.notified();
            if self.calls() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &FetchRequest) -> Result<Vec<u8>, TransportError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.url.clone());
        self.called.notify_waiters();

        if let Some(gate) = &self.gate
            && let Ok(permit) = gate.acquire().await
        {
            permit.forget();
        }

        (self.responder)(request, index)
    }
}
