// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! Reconnecting block-header subscription with per-item cancellation.
//!
//! [`BlockSource`] is the minimal capability this module needs from a
//! transport ("give me a stream of new block numbers"), kept separate from
//! [`alloy::providers::Provider`] so the reconnect/backoff state machine can
//! be driven in tests without a live node. [`AlloyBlockSource`] is the
//! production adapter over a real [`Provider`].

use std::{pin::Pin, sync::Mutex, time::Duration};

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{config::RuntimeConfig, error::SubscriptionError};

/// A stream of new block numbers.
pub type BlockStream = Pin<Box<dyn Stream<Item = u64> + Send>>;

/// The capability a transport must offer for this module to drive
/// reconnection: open a fresh stream of new block numbers on demand.
#[async_trait::async_trait]
pub trait BlockSource: Send + Sync {
    async fn subscribe_blocks(&self) -> Result<BlockStream, SubscriptionError>;
}

/// Adapts any [`alloy::providers::Provider`] into a [`BlockSource`].
pub struct AlloyBlockSource<P> {
    provider: P,
}

impl<P> AlloyBlockSource<P> {
    #[must_use]
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

#[async_trait::async_trait]
impl<P: alloy::providers::Provider + Send + Sync> BlockSource for AlloyBlockSource<P> {
    async fn subscribe_blocks(&self) -> Result<BlockStream, SubscriptionError> {
        let subscription =
            self.provider.subscribe_blocks().await.map_err(|e| SubscriptionError::Transport(e.to_string()))?;
        let stream = subscription.into_stream().map(|header| header.number);
        Ok(Box::pin(stream))
    }
}

/// A delivered block item paired with its per-item cancellation context. The
/// context is cancelled no later than the emission of the following item
/// (P6), so downstream work scoped to a block can be abandoned once it's
/// superseded.
#[derive(Debug, Clone)]
pub struct BlockItem {
    pub number: u64,
    pub ctx: CancellationToken,
}

enum SubState {
    Idle,
    Open { stop: CancellationToken, task: tokio::task::JoinHandle<()> },
    Closed,
}

/// A reconnecting subscription over a [`BlockSource`]. `subscribe()` spawns
/// the background listen loop exactly once; a second call while already
/// `Open` fails fast with [`SubscriptionError::AlreadySubscribed`].
pub struct Subscription<S> {
    source: std::sync::Arc<S>,
    config: RuntimeConfig,
    state: Mutex<SubState>,
}

impl<S: BlockSource + 'static> Subscription<S> {
    #[must_use]
    pub fn new(source: S, config: RuntimeConfig) -> Self {
        Self { source: std::sync::Arc::new(source), config, state: Mutex::new(SubState::Idle) }
    }

    /// Opens the subscription, returning the items and errors channels.
    /// Both channels close when `unsubscribe` is called or the subscription
    /// transitions to `Closed` after exhausting its retry budget.
    pub fn subscribe(&self) -> Result<(mpsc::Receiver<BlockItem>, mpsc::Receiver<SubscriptionError>), SubscriptionError> {
        let mut state = self.state.lock().expect("subscription lock poisoned");
        if matches!(*state, SubState::Open { .. }) {
            return Err(SubscriptionError::AlreadySubscribed);
        }

        let (items_tx, items_rx) = mpsc::channel(64);
        let (errors_tx, errors_rx) = mpsc::channel(8);
        let stop = CancellationToken::new();
        let task = tokio::spawn(run_listen_loop(
            self.source.clone(),
            self.config.clone(),
            items_tx,
            errors_tx,
            stop.clone(),
        ));

        *state = SubState::Open { stop, task };
        Ok((items_rx, errors_rx))
    }

    /// Stops the listen loop and closes both channels.
    pub fn unsubscribe(&self) {
        let mut state = self.state.lock().expect("subscription lock poisoned");
        if let SubState::Open { stop, task } = std::mem::replace(&mut *state, SubState::Closed) {
            stop.cancel();
            task.abort();
        }
    }
}

fn backoff_for_attempt(attempt: u32, max_reconnect_timeout: Duration) -> Duration {
    let exp = 2u64.saturating_pow(attempt.min(63));
    Duration::from_secs(exp).min(max_reconnect_timeout)
}

async fn run_listen_loop<S: BlockSource>(
    source: std::sync::Arc<S>,
    config: RuntimeConfig,
    items_tx: mpsc::Sender<BlockItem>,
    errors_tx: mpsc::Sender<SubscriptionError>,
    stop: CancellationToken,
) {
    let mut retries = 0u32;
    let mut prev_ctx: Option<CancellationToken> = None;

    'reconnect: loop {
        if stop.is_cancelled() {
            break;
        }

        let opened = tokio::select! {
            biased;
            () = stop.cancelled() => break 'reconnect,
            result = tokio::time::timeout(config.subscribe_timeout, source.subscribe_blocks()) => result,
        };

        let mut stream = match opened {
            Ok(Ok(stream)) => {
                debug!(attempt = retries, "block subscription opened");
                retries = 0;
                stream
            }
            Ok(Err(e)) => {
                warn!(error = %e, "block subscription failed");
                if !wait_for_retry(&stop, &mut retries, &config, &errors_tx).await {
                    break 'reconnect;
                }
                continue 'reconnect;
            }
            Err(_elapsed) => {
                warn!(timeout = ?config.subscribe_timeout, "block subscription attempt timed out");
                if !wait_for_retry(&stop, &mut retries, &config, &errors_tx).await {
                    break 'reconnect;
                }
                continue 'reconnect;
            }
        };

        loop {
            tokio::select! {
                biased;
                () = stop.cancelled() => break 'reconnect,
                maybe_item = stream.next() => {
                    match maybe_item {
                        Some(number) => {
                            if let Some(prev) = prev_ctx.take() {
                                prev.cancel();
                            }
                            let ctx = CancellationToken::new();
                            prev_ctx = Some(ctx.clone());
                            if items_tx.send(BlockItem { number, ctx }).await.is_err() {
                                break 'reconnect;
                            }
                        }
                        None => {
                            info!("block stream ended, reconnecting");
                            break;
                        }
                    }
                }
            }
        }

        if !wait_for_retry(&stop, &mut retries, &config, &errors_tx).await {
            break 'reconnect;
        }
    }

    if let Some(ctx) = prev_ctx {
        ctx.cancel();
    }
}

/// Sleeps out the backoff for `*retries`, incrementing it, or emits
/// `MaxRetriesReached` and returns `false` once the budget is exhausted.
/// Returns `false` also when `stop` fires first.
async fn wait_for_retry(
    stop: &CancellationToken,
    retries: &mut u32,
    config: &RuntimeConfig,
    errors_tx: &mpsc::Sender<SubscriptionError>,
) -> bool {
    if *retries >= config.max_retries {
        let _ = errors_tx.send(SubscriptionError::MaxRetriesReached { retries: *retries }).await;
        return false;
    }
    let backoff = backoff_for_attempt(*retries, config.max_reconnect_timeout);
    *retries += 1;
    tokio::select! {
        biased;
        () = stop.cancelled() => false,
        () = tokio::time::sleep(backoff) => true,
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, sync::Arc};

    use rstest::rstest;

    use super::*;

    enum ScriptStep {
        Items(Vec<u64>),
        Fail(String),
    }

    struct ScriptedSource {
        steps: Mutex<VecDeque<ScriptStep>>,
        attempts: Arc<std::sync::atomic::AtomicUsize>,
    }

    impl ScriptedSource {
        fn new(steps: Vec<ScriptStep>) -> Self {
            Self { steps: Mutex::new(steps.into_iter().collect()), attempts: Arc::new(std::sync::atomic::AtomicUsize::new(0)) }
        }

        /// A shared handle to this source's attempt counter, readable after
        /// the source itself has been moved into a [`Subscription`].
        fn attempts_handle(&self) -> Arc<std::sync::atomic::AtomicUsize> {
            self.attempts.clone()
        }
    }

    #[async_trait::async_trait]
    impl BlockSource for ScriptedSource {
        async fn subscribe_blocks(&self) -> Result<BlockStream, SubscriptionError> {
            self.attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(ScriptStep::Items(items)) => Ok(Box::pin(futures_util::stream::iter(items))),
                Some(ScriptStep::Fail(msg)) => Err(SubscriptionError::Transport(msg)),
                None => Ok(Box::pin(futures_util::stream::empty())),
            }
        }
    }

    fn test_config() -> RuntimeConfig {
        let mut cfg = RuntimeConfig::new("wss://example.invalid".to_string(), 25_000, 30_000_000);
        cfg.max_retries = 3;
        cfg.max_reconnect_timeout = Duration::from_millis(50);
        cfg.subscribe_timeout = Duration::from_millis(500);
        cfg
    }

    #[tokio::test]
    async fn test_subscribe_is_idempotent_erroring() {
        let source = ScriptedSource::new(vec![ScriptStep::Items(vec![1, 2, 3])]);
        let sub = Subscription::new(source, test_config());
        let _channels = sub.subscribe().unwrap();
        let err = sub.subscribe().unwrap_err();
        assert!(matches!(err, SubscriptionError::AlreadySubscribed));
        sub.unsubscribe();
    }

    #[tokio::test]
    async fn test_items_delivered_in_order_with_distinct_contexts() {
        let source = ScriptedSource::new(vec![ScriptStep::Items(vec![10, 11, 12])]);
        let sub = Subscription::new(source, test_config());
        let (mut items_rx, _errors_rx) = sub.subscribe().unwrap();

        let first = items_rx.recv().await.unwrap();
        assert_eq!(first.number, 10);
        assert!(!first.ctx.is_cancelled());

        let second = items_rx.recv().await.unwrap();
        assert_eq!(second.number, 11);
        // P6: the previous item's context is cancelled no later than the next item's delivery.
        assert!(first.ctx.is_cancelled());
        assert!(!second.ctx.is_cancelled());

        let third = items_rx.recv().await.unwrap();
        assert_eq!(third.number, 12);
        assert!(second.ctx.is_cancelled());

        sub.unsubscribe();
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_retries_reached_emits_error_and_closes() {
        let source = ScriptedSource::new(vec![
            ScriptStep::Fail("connection refused".into()),
            ScriptStep::Fail("connection refused".into()),
            ScriptStep::Fail("connection refused".into()),
            ScriptStep::Fail("connection refused".into()),
        ]);
        let sub = Subscription::new(source, test_config());
        let (mut items_rx, mut errors_rx) = sub.subscribe().unwrap();

        let err = tokio::time::timeout(Duration::from_secs(5), errors_rx.recv())
            .await
            .expect("should observe MaxRetriesReached before the timeout")
            .expect("errors channel should not be closed before emitting");
        assert!(matches!(err, SubscriptionError::MaxRetriesReached { retries: 3 }));

        // Once retries are exhausted the listen loop exits, so no further items arrive.
        assert!(items_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_s6_recovers_after_single_transient_error() {
        // Errors exactly once, then the next attempt succeeds: the subscription
        // should reconnect rather than give up, and resume delivering items.
        let source = ScriptedSource::new(vec![ScriptStep::Fail("connection reset".into()), ScriptStep::Items(vec![100, 101])]);
        let attempts = source.attempts_handle();
        let sub = Subscription::new(source, test_config());
        let (mut items_rx, mut errors_rx) = sub.subscribe().unwrap();

        let first = tokio::time::timeout(Duration::from_secs(5), items_rx.recv())
            .await
            .expect("should recover and deliver an item before the timeout")
            .expect("items channel should not be closed");
        assert_eq!(first.number, 100);

        let second = items_rx.recv().await.unwrap();
        assert_eq!(second.number, 101);

        // The transient error is recoverable, not fatal: it is never pushed
        // onto the errors channel (only `MaxRetriesReached` is), and exactly
        // two subscribe attempts were made (the failure, then the recovery).
        assert!(errors_rx.try_recv().is_err(), "a transient, recovered error must not reach the errors channel");
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 2);

        sub.unsubscribe();
    }

    #[rstest]
    #[case(0, 1)]
    #[case(1, 2)]
    #[case(2, 4)]
    #[case(10, 5)] // capped at max_reconnect_timeout = 5s in this case
    fn test_backoff_exponential_with_cap(#[case] attempt: u32, #[case] expected_secs: u64) {
        let backoff = backoff_for_attempt(attempt, Duration::from_secs(5));
        assert_eq!(backoff, Duration::from_secs(expected_secs));
    }

    #[tokio::test]
    async fn test_unsubscribe_closes_channels() {
        let source = ScriptedSource::new(vec![ScriptStep::Items(vec![1])]);
        let sub = Subscription::new(source, test_config());
        let (mut items_rx, mut errors_rx) = sub.subscribe().unwrap();
        let _ = items_rx.recv().await;
        sub.unsubscribe();
        assert!(items_rx.recv().await.is_none());
        assert!(errors_rx.recv().await.is_none());
    }
}
