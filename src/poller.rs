//! Per-marketplace Poller (§4.5): `Idle → Fetching → Processing → Sleep →
//! Fetching…`, looping until told to stop.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{info, warn};

use crate::collaborators::{TokenProvider, UserConfigStore};
use crate::core::traits::MarketplaceAdapter;
use crate::core::types::{Listing, Marketplace, SortKey};
use crate::normalizer::normalize;
use crate::seen_set::{BaselineFlag, SeenSet};

const MAX_CONSECUTIVE_FAILURES: u32 = 5;

/// Runs one marketplace's fetch/normalize/observe/enqueue loop (§4.5). Holds
/// no reference to the Dispatcher directly: normalized, first-seen Listings
/// are handed to the shared bounded queue, which is the backpressure
/// boundary of §5.
pub struct Poller {
    marketplace: Marketplace,
    adapter: Arc<dyn MarketplaceAdapter>,
    user_store: Arc<dyn UserConfigStore>,
    token_provider: Arc<dyn TokenProvider>,
    seen_set: Arc<SeenSet>,
    baseline: Arc<BaselineFlag>,
    queue: mpsc::Sender<Listing>,
    poll_interval: Duration,
    nano_ton_threshold: Decimal,
    stop: watch::Receiver<bool>,
    first_sweep_done: Option<oneshot::Sender<()>>,
}

impl Poller {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        marketplace: Marketplace,
        adapter: Arc<dyn MarketplaceAdapter>,
        user_store: Arc<dyn UserConfigStore>,
        token_provider: Arc<dyn TokenProvider>,
        seen_set: Arc<SeenSet>,
        baseline: Arc<BaselineFlag>,
        queue: mpsc::Sender<Listing>,
        poll_interval: Duration,
        nano_ton_threshold: Decimal,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            marketplace,
            adapter,
            user_store,
            token_provider,
            seen_set,
            baseline,
            queue,
            poll_interval,
            nano_ton_threshold,
            stop,
            first_sweep_done: None,
        }
    }

    /// Registers a one-shot signal fired after this Poller's first sweep
    /// attempt completes (success or failure), so the Supervisor can learn
    /// when every marketplace has swept at least once and mark the shared
    /// BaselineFlag done (§3, §4.4, §4.7).
    pub fn with_first_sweep_signal(mut self, tx: oneshot::Sender<()>) -> Self {
        self.first_sweep_done = Some(tx);
        self
    }

    /// Drives the state machine until the stop flag flips, checked once per
    /// iteration boundary (§4.5 "Cancellation").
    pub async fn run(mut self) {
        let mut consecutive_failures = 0u32;
        loop {
            if *self.stop.borrow() {
                info!(marketplace = %self.marketplace, "poller stopping");
                return;
            }

            // Step 1: cached subscriber set — only used to decide whether
            // it's worth sweeping at all; the authoritative per-user match
            // happens later, in the Dispatcher (§4.8).
            let subscribers = self.user_store.subscribers(self.marketplace).await;
            if subscribers.is_empty() {
                self.signal_first_sweep_done();
                self.sleep_or_stop().await;
                if *self.stop.borrow() {
                    return;
                }
                continue;
            }

            match self.sweep().await {
                Ok(()) => consecutive_failures = 0,
                Err(err) if err.is_auth() => {
                    warn!(marketplace = %self.marketplace, error = %err, "auth error, requesting fresh token");
                    match self.token_provider.token_for(self.marketplace).await {
                        Some(token) => {
                            self.adapter.refresh_auth(token).await;
                            match self.sweep().await {
                                Ok(()) => consecutive_failures = 0,
                                Err(err) => {
                                    consecutive_failures += 1;
                                    warn!(
                                        marketplace = %self.marketplace,
                                        error = %err,
                                        consecutive_failures,
                                        "sweep failed after re-auth retry"
                                    );
                                }
                            }
                        }
                        None => {
                            consecutive_failures += 1;
                            warn!(
                                marketplace = %self.marketplace,
                                "no fresh token available from token provider"
                            );
                        }
                    }
                }
                Err(err) => {
                    consecutive_failures += 1;
                    warn!(
                        marketplace = %self.marketplace,
                        error = %err,
                        consecutive_failures,
                        "sweep failed"
                    );
                    if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                        warn!(
                            marketplace = %self.marketplace,
                            "repeated failures, backing off for this iteration"
                        );
                    }
                }
            }
            self.signal_first_sweep_done();

            self.sleep_or_stop().await;
        }
    }

    fn signal_first_sweep_done(&mut self) {
        if let Some(tx) = self.first_sweep_done.take() {
            let _ = tx.send(());
        }
    }

    async fn sweep(&self) -> Result<(), crate::core::error::AdapterError> {
        let limit = self.marketplace.max_page_size();
        let items = self.adapter.list_newest(limit, SortKey::Latest).await?;

        for raw in items {
            let Some(listing) = normalize(self.marketplace, &raw, self.nano_ton_threshold) else {
                continue;
            };
            let first_seen = self.seen_set.observe(&listing.composite_id()).await;
            if first_seen && self.baseline.baseline_done() {
                self.enqueue(listing).await;
            }
        }
        Ok(())
    }

    /// Non-blocking enqueue onto the shared bounded queue. When full, the
    /// Listing is dropped with a warning rather than applying backpressure
    /// to the sweep loop (§5 "Backpressure").
    async fn enqueue(&self, listing: Listing) {
        match self.queue.try_send(listing) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(listing)) => {
                warn!(
                    marketplace = %self.marketplace,
                    composite_id = %listing.composite_id(),
                    "dispatch queue full, dropping listing"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(marketplace = %self.marketplace, "dispatch queue closed, stopping poller");
            }
        }
    }

    async fn sleep_or_stop(&mut self) {
        tokio::select! {
            _ = tokio::time::sleep(self.poll_interval) => {}
            _ = self.stop.changed() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{InMemoryUserConfigStore, StaticTokenProvider};
    use crate::core::error::AdapterError;
    use crate::core::types::{FilterRule, SaleRecord, UserFilter, ANY};
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Mutex;

    struct FixedAdapter {
        items: Mutex<Vec<serde_json::Value>>,
    }

    #[async_trait]
    impl MarketplaceAdapter for FixedAdapter {
        async fn list_newest(&self, _limit: u32, _sort: SortKey) -> Result<Vec<serde_json::Value>, AdapterError> {
            Ok(self.items.lock().await.clone())
        }
        async fn get_by_id(&self, _id: &str) -> Result<Option<serde_json::Value>, AdapterError> {
            Ok(None)
        }
        async fn get_gift_floor(&self, _collection: &str) -> Result<Option<Decimal>, AdapterError> {
            Ok(None)
        }
        async fn get_model_floor(&self, _collection: &str, _model: &str) -> Result<Option<Decimal>, AdapterError> {
            Ok(None)
        }
        async fn get_model_sales_history(
            &self,
            _collection: &str,
            _model: &str,
            _limit: u32,
        ) -> Result<Vec<SaleRecord>, AdapterError> {
            Ok(vec![])
        }
        async fn refresh_auth(&self, _token: String) {}
    }

    async fn setup(
        items: Vec<serde_json::Value>,
        baseline_done: bool,
    ) -> (mpsc::Receiver<Listing>, watch::Sender<bool>, Arc<SeenSet>) {
        let adapter: Arc<dyn MarketplaceAdapter> = Arc::new(FixedAdapter {
            items: Mutex::new(items),
        });
        let user_store = Arc::new(InMemoryUserConfigStore::new());
        user_store.subscribe(Marketplace::Portals, "u1").await;
        user_store
            .set_filter(UserFilter {
                user_id: "u1".into(),
                rules: vec![FilterRule {
                    collections: vec![ANY.to_string()],
                    models: vec![ANY.to_string()],
                    backdrops: vec![ANY.to_string()],
                    marketplaces: vec![],
                    price_min: None,
                    price_max: None,
                }],
            })
            .await;
        let seen_set = Arc::new(SeenSet::new(1000));
        let baseline = Arc::new(BaselineFlag::new());
        if baseline_done {
            baseline.mark_baseline_done();
        }
        let (tx, rx) = mpsc::channel(16);
        let (stop_tx, stop_rx) = watch::channel(false);

        let token_provider = Arc::new(StaticTokenProvider::new(std::collections::HashMap::new()));

        let poller = Poller::new(
            Marketplace::Portals,
            adapter,
            user_store,
            token_provider,
            seen_set.clone(),
            baseline,
            tx,
            Duration::from_millis(5),
            Decimal::from(1000),
            stop_rx,
        );

        // run exactly one sweep then stop
        let stop_tx_clone = stop_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1)).await;
            let _ = stop_tx_clone.send(true);
        });
        poller.run().await;

        (rx, stop_tx, seen_set)
    }

    #[tokio::test]
    async fn enqueues_first_seen_listing_once_baseline_is_done() {
        let raw = json!({ "id": "abc", "collectionName": "Plush Pepe", "price": 10 });
        let (mut rx, _stop, seen_set) = setup(vec![raw], true).await;
        let received = rx.try_recv().expect("listing should have been enqueued");
        assert_eq!(received.collection_name, "Plush Pepe");
        assert_eq!(seen_set.len().await, 1);
    }

    #[tokio::test]
    async fn does_not_enqueue_before_baseline_is_done() {
        let raw = json!({ "id": "abc", "collectionName": "Plush Pepe", "price": 10 });
        let (mut rx, _stop, seen_set) = setup(vec![raw], false).await;
        assert!(rx.try_recv().is_err());
        // still observed, so a later sweep (after baseline) won't re-deliver it
        assert_eq!(seen_set.len().await, 1);
    }
}
