//! The retrying fetch cycle.
//!
//! [`RetryOrchestrator::run_cycle`] drives one search term from its first
//! request to a terminal outcome. Retries are a plain loop over
//! [`RetryState`]: attempt `k + 1` is only issued after attempt `k` has
//! resolved, and backoff waits race against the cycle's cancellation token so a
//! newer search can stop them.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::error::{ExhaustedRetryError, FetchError};
use super::progress::{ProgressObserver, ProgressReporter};
use super::retry::{RetryDecision, RetryState, RetryStrategy};
use crate::search::{Record, SearchQuery, decode};
use crate::transport::{FetchRequest, Transport};

/// Runs fetch cycles against a search endpoint.
///
/// Cheap to clone; clones share the transport.
#[derive(Debug, Clone)]
pub struct RetryOrchestrator {
    transport: Arc<dyn Transport>,
    endpoint: Url,
    session_timeout: Duration,
}

impl RetryOrchestrator {
    /// Creates an orchestrator for `endpoint`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, endpoint: Url, session_timeout: Duration) -> Self {
        Self {
            transport,
            endpoint,
            session_timeout,
        }
    }

    /// Runs one fetch cycle for `query`.
    ///
    /// Progress snapshots go to `observer` at cycle start and whenever the
    /// retry flag, attempt count, or interval changes.
    ///
    /// A request already in flight when `cancel` fires is allowed to finish;
    /// no further request is issued after that, and a pending backoff wait is
    /// abandoned immediately.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Decode`] on the first undecodable body (never retried)
    /// - [`FetchError::Exhausted`] once the strategy gives up
    /// - [`FetchError::Superseded`] when cancelled before a terminal outcome
    #[instrument(skip(self, query, cancel, observer), fields(query = %query))]
    pub async fn run_cycle(
        &self,
        query: &SearchQuery,
        strategy: RetryStrategy,
        cancel: &CancellationToken,
        observer: &dyn ProgressObserver,
    ) -> Result<Vec<Record>, FetchError> {
        let url = query.search_url(&self.endpoint);
        let mut state = RetryState::new(strategy);
        let mut reporter = ProgressReporter::new(observer);
        reporter.report(state.progress());

        if !state.can_attempt() {
            warn!("retry budget is zero; no request issued");
            return Err(ExhaustedRetryError::new(0, None).into());
        }

        loop {
            if cancel.is_cancelled() {
                debug!(attempts = state.attempts_made(), "cycle cancelled");
                return Err(FetchError::Superseded);
            }

            let attempt = state.begin_attempt();
            debug!(attempt, url = %url, "issuing search request");

            let request = FetchRequest::get(url.clone(), self.session_timeout);
            let error = match self.transport.send(&request).await {
                Ok(body) => {
                    return match decode(&body) {
                        Ok(envelope) => {
                            state.record_success();
                            reporter.report(state.progress());
                            let records = envelope.into_records();
                            info!(attempt, records = records.len(), "search cycle succeeded");
                            Ok(records)
                        }
                        Err(error) => {
                            state.record_fatal();
                            reporter.report(state.progress());
                            warn!(attempt, error = %error, "undecodable search response; not retrying");
                            Err(error.into())
                        }
                    };
                }
                Err(error) => error,
            };

            match state.record_failure(error.kind()) {
                RetryDecision::RetryNow => {
                    reporter.report(state.progress());
                    info!(
                        attempt,
                        attempts_remaining = state.attempts_remaining(),
                        error = %error,
                        "retrying search"
                    );
                }
                RetryDecision::RetryAfter(delay) => {
                    reporter.report(state.progress());
                    info!(
                        attempt,
                        delay_secs = delay.as_secs_f64(),
                        error = %error,
                        "retrying search after backoff"
                    );
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => {
                            debug!(attempt, "backoff wait cancelled");
                            return Err(FetchError::Superseded);
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::Exhausted => {
                    reporter.report(state.progress());
                    warn!(attempts = attempt, error = %error, "search retries exhausted");
                    return Err(ExhaustedRetryError::new(attempt, Some(error)).into());
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::fetch::progress::RetryProgress;
    use crate::fetch::retry::Backoff;
    use crate::search::DecodeError;
    use crate::transport::TransportError;
    use crate::transport::TransportErrorKind;
    use crate::transport::fake::ScriptedTransport;

    const BACON_PIE: &[u8] =
        br#"{"href":"http://www.recipepuppy.com/","results":[{"title":"Bacon Pie","thumbnail":"http://x/1.png"}]}"#;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<RetryProgress>>);

    impl ProgressObserver for Recorder {
        fn on_progress(&self, progress: RetryProgress) {
            self.0.lock().unwrap().push(progress);
        }
    }

    impl Recorder {
        fn snapshots(&self) -> Vec<RetryProgress> {
            self.0.lock().unwrap().clone()
        }
    }

    fn orchestrator(transport: Arc<ScriptedTransport>) -> RetryOrchestrator {
        RetryOrchestrator::new(
            transport,
            Url::parse("http://recipes.test/api/").unwrap(),
            Duration::from_secs(15),
        )
    }

    fn query(term: &str) -> SearchQuery {
        SearchQuery::new(term).unwrap()
    }

    fn timeout() -> Result<Vec<u8>, TransportError> {
        Err(TransportError::timeout("http://recipes.test/api/"))
    }

    // ==================== Fixed Strategy ====================

    #[tokio::test]
    async fn test_fixed_always_failing_makes_exactly_n_requests() {
        for max_attempts in 1..=5 {
            let transport = Arc::new(ScriptedTransport::always_timing_out());
            let result = orchestrator(Arc::clone(&transport))
                .run_cycle(
                    &query("bacon"),
                    RetryStrategy::FixedAttempts { max_attempts },
                    &CancellationToken::new(),
                    &|_: RetryProgress| {},
                )
                .await;

            assert_eq!(transport.calls(), max_attempts as usize);
            match result {
                Err(FetchError::Exhausted(exhausted)) => {
                    assert_eq!(exhausted.attempts, max_attempts);
                    assert_eq!(
                        exhausted.last_error.map(|e| e.kind()),
                        Some(TransportErrorKind::Timeout)
                    );
                }
                other => panic!("Expected Exhausted, got: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_fixed_success_on_attempt_i_makes_i_requests() {
        let max_attempts = 4;
        for success_on in 1..=max_attempts {
            let mut script = vec![timeout(); success_on - 1];
            script.push(Ok(BACON_PIE.to_vec()));
            let transport = Arc::new(ScriptedTransport::sequence(script));

            let records = orchestrator(Arc::clone(&transport))
                .run_cycle(
                    &query("bacon"),
                    RetryStrategy::FixedAttempts {
                        max_attempts: max_attempts as u32,
                    },
                    &CancellationToken::new(),
                    &|_: RetryProgress| {},
                )
                .await
                .unwrap();

            assert_eq!(transport.calls(), success_on);
            assert_eq!(records.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_bacon_pie_scenario_progress_sequence() {
        let transport = Arc::new(ScriptedTransport::sequence(vec![
            timeout(),
            timeout(),
            Ok(BACON_PIE.to_vec()),
        ]));
        let recorder = Recorder::default();

        let records = orchestrator(Arc::clone(&transport))
            .run_cycle(
                &query("bacon"),
                RetryStrategy::FixedAttempts { max_attempts: 3 },
                &CancellationToken::new(),
                &recorder,
            )
            .await
            .unwrap();

        let flags: Vec<bool> = recorder.snapshots().iter().map(|p| p.in_progress).collect();
        assert_eq!(flags, vec![false, true, true, false]);
        let remaining: Vec<u32> = recorder
            .snapshots()
            .iter()
            .map(|p| p.attempts_remaining)
            .collect();
        assert_eq!(remaining, vec![3, 2, 1, 1]);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title.as_deref(), Some("Bacon Pie"));
        assert_eq!(records[0].asset_url(), Some("http://x/1.png"));
    }

    #[tokio::test]
    async fn test_fixed_zero_attempts_issues_no_request() {
        let transport = Arc::new(ScriptedTransport::always_timing_out());
        let result = orchestrator(Arc::clone(&transport))
            .run_cycle(
                &query("bacon"),
                RetryStrategy::FixedAttempts { max_attempts: 0 },
                &CancellationToken::new(),
                &|_: RetryProgress| {},
            )
            .await;

        assert_eq!(transport.calls(), 0);
        assert!(matches!(
            result,
            Err(FetchError::Exhausted(ExhaustedRetryError {
                attempts: 0,
                last_error: None
            }))
        ));
    }

    #[tokio::test]
    async fn test_decode_failure_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::sequence(vec![Ok(b"<html>".to_vec())]));
        let recorder = Recorder::default();

        let result = orchestrator(Arc::clone(&transport))
            .run_cycle(
                &query("bacon"),
                RetryStrategy::FixedAttempts { max_attempts: 3 },
                &CancellationToken::new(),
                &recorder,
            )
            .await;

        assert_eq!(transport.calls(), 1);
        assert!(matches!(
            result,
            Err(FetchError::Decode(DecodeError::Malformed { .. }))
        ));
        assert!(recorder.snapshots().iter().all(|p| !p.in_progress));
    }

    #[tokio::test]
    async fn test_decode_failure_after_transport_retry_clears_flag() {
        let transport = Arc::new(ScriptedTransport::sequence(vec![
            timeout(),
            Ok(b"not json".to_vec()),
        ]));
        let recorder = Recorder::default();

        let result = orchestrator(Arc::clone(&transport))
            .run_cycle(
                &query("bacon"),
                RetryStrategy::FixedAttempts { max_attempts: 3 },
                &CancellationToken::new(),
                &recorder,
            )
            .await;

        assert_eq!(transport.calls(), 2);
        assert!(matches!(result, Err(FetchError::Decode(_))));
        let last = recorder.snapshots().last().copied().unwrap();
        assert!(!last.in_progress);
    }

    #[tokio::test]
    async fn test_request_url_carries_encoded_query() {
        let transport = Arc::new(ScriptedTransport::sequence(vec![Ok(BACON_PIE.to_vec())]));
        orchestrator(Arc::clone(&transport))
            .run_cycle(
                &query("bacon pie"),
                RetryStrategy::default(),
                &CancellationToken::new(),
                &|_: RetryProgress| {},
            )
            .await
            .unwrap();

        assert_eq!(
            transport.requested_urls()[0].as_str(),
            "http://recipes.test/api/?q=bacon%20pie"
        );
    }

    // ==================== Exponential Strategy ====================

    #[tokio::test(start_paused = true)]
    async fn test_exponential_always_failing_stops_before_cap() {
        let started = tokio::time::Instant::now();
        let offsets = Arc::new(Mutex::new(Vec::new()));
        let offsets_in_transport = Arc::clone(&offsets);
        let transport = Arc::new(ScriptedTransport::new(move |request, _| {
            offsets_in_transport
                .lock()
                .unwrap()
                .push(started.elapsed().as_secs());
            Err(TransportError::timeout(request.url.as_str()))
        }));
        let recorder = Recorder::default();

        let result = orchestrator(Arc::clone(&transport))
            .run_cycle(
                &query("bacon"),
                RetryStrategy::ExponentialBackoff(Backoff::default()),
                &CancellationToken::new(),
                &recorder,
            )
            .await;

        assert!(matches!(result, Err(FetchError::Exhausted(_))));
        assert_eq!(transport.calls(), 5);
        // Attempts belong to intervals 1 (immediate), 10, 100, 1000, 10000.
        assert_eq!(*offsets.lock().unwrap(), vec![0, 10, 110, 1110, 11_110]);

        let intervals: Vec<f64> = recorder
            .snapshots()
            .iter()
            .map(|p| p.next_interval_seconds)
            .collect();
        assert_eq!(intervals, vec![1.0, 10.0, 100.0, 1000.0, 10_000.0, 1.0]);
        let last = recorder.snapshots().last().copied().unwrap();
        assert!(!last.in_progress);
        assert_eq!(last.attempts_remaining, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exponential_custom_parameters() {
        let transport = Arc::new(ScriptedTransport::always_timing_out());
        let started = tokio::time::Instant::now();

        let result = orchestrator(Arc::clone(&transport))
            .run_cycle(
                &query("bacon"),
                RetryStrategy::ExponentialBackoff(Backoff::new(0.5, 2.0, 4.0)),
                &CancellationToken::new(),
                &|_: RetryProgress| {},
            )
            .await;

        assert!(matches!(result, Err(FetchError::Exhausted(_))));
        // 0.5 (immediate), 1, 2, 4 -> waits of 1 + 2 + 4
        assert_eq!(transport.calls(), 4);
        assert_eq!(started.elapsed().as_secs(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exponential_success_resets_interval() {
        let transport = Arc::new(ScriptedTransport::sequence(vec![
            timeout(),
            timeout(),
            Ok(BACON_PIE.to_vec()),
        ]));
        let recorder = Recorder::default();

        let records = orchestrator(Arc::clone(&transport))
            .run_cycle(
                &query("bacon"),
                RetryStrategy::ExponentialBackoff(Backoff::default()),
                &CancellationToken::new(),
                &recorder,
            )
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(transport.calls(), 3);
        let last = recorder.snapshots().last().copied().unwrap();
        assert!(!last.in_progress);
        assert!((last.next_interval_seconds - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_cancel_during_backoff_stops_scheduled_retry() {
        let transport = Arc::new(ScriptedTransport::always_timing_out());
        let cancel = CancellationToken::new();
        let orchestrator = orchestrator(Arc::clone(&transport));

        let handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                orchestrator
                    .run_cycle(
                        &query("bacon"),
                        RetryStrategy::ExponentialBackoff(Backoff::new(30.0, 10.0, 10_000.0)),
                        &cancel,
                        &|_: RetryProgress| {},
                    )
                    .await
            })
        };

        transport.wait_for_calls(1).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("cycle should stop promptly after cancellation")
            .unwrap();
        assert!(matches!(result, Err(FetchError::Superseded)));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_issues_no_request() {
        let transport = Arc::new(ScriptedTransport::always_timing_out());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = orchestrator(Arc::clone(&transport))
            .run_cycle(&query("bacon"), RetryStrategy::default(), &cancel, &|_: RetryProgress| {})
            .await;

        assert!(matches!(result, Err(FetchError::Superseded)));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancel_while_in_flight_lets_request_finish_but_stops_retry() {
        let (transport, gate) = ScriptedTransport::always_timing_out().gated();
        let transport = Arc::new(transport);
        let cancel = CancellationToken::new();
        let orchestrator = orchestrator(Arc::clone(&transport));

        let handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                orchestrator
                    .run_cycle(
                        &query("bacon"),
                        RetryStrategy::FixedAttempts { max_attempts: 5 },
                        &cancel,
                        &|_: RetryProgress| {},
                    )
                    .await
            })
        };

        transport.wait_for_calls(1).await;
        cancel.cancel();
        gate.add_permits(10);

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(FetchError::Superseded)));
        assert_eq!(transport.calls(), 1);
    }
}
