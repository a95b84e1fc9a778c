//! Supervisor (§4.7): owns every Poller, the shared BaselineFlag, the
//! Dispatcher queue consumer, and reacts to filter-change events from the
//! user-config collaborator.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::info;

use crate::collaborators::{TokenProvider, UserConfigStore};
use crate::core::traits::MarketplaceAdapter;
use crate::core::types::{Listing, Marketplace};
use crate::dispatch::Dispatcher;
use crate::seen_set::{BaselineFlag, SeenSet};

/// Per-marketplace bookkeeping the Supervisor needs to `enable`/`disable`/
/// `toggle` independently of the others.
struct MarketplaceHandle {
    enabled: AtomicBool,
    stop: watch::Sender<bool>,
    seen_set: Arc<SeenSet>,
}

pub struct Supervisor {
    handles: HashMap<Marketplace, MarketplaceHandle>,
    baseline: Arc<BaselineFlag>,
    user_store: Arc<dyn UserConfigStore>,
    dispatcher: Arc<Dispatcher>,
    queue_rx: tokio::sync::Mutex<Option<mpsc::Receiver<Listing>>>,
}

impl Supervisor {
    /// Spawns one Poller task per marketplace in `adapters`, wires them all
    /// to a single bounded dispatch queue, and returns the Supervisor handle
    /// plus the queue consumer task's `JoinHandle` for lifecycle management.
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        adapters: HashMap<Marketplace, Arc<dyn MarketplaceAdapter>>,
        poll_intervals: HashMap<Marketplace, u64>,
        user_store: Arc<dyn UserConfigStore>,
        token_provider: Arc<dyn TokenProvider>,
        dispatcher: Arc<Dispatcher>,
        seen_set_capacity: usize,
        queue_capacity: usize,
        nano_ton_threshold: Decimal,
    ) -> (Arc<Self>, tokio::task::JoinHandle<()>, Vec<tokio::task::JoinHandle<()>>) {
        let baseline = Arc::new(BaselineFlag::new());
        let (queue_tx, queue_rx) = mpsc::channel(queue_capacity);

        let mut handles = HashMap::new();
        let mut poller_tasks = Vec::new();
        let mut first_sweep_signals = Vec::new();
        for (marketplace, adapter) in adapters {
            let seen_set = Arc::new(SeenSet::new(seen_set_capacity));
            let (stop_tx, stop_rx) = watch::channel(false);
            let interval = Duration::from_secs(*poll_intervals.get(&marketplace).unwrap_or(&1));
            let (sweep_tx, sweep_rx) = oneshot::channel();
            first_sweep_signals.push(sweep_rx);

            let poller = crate::poller::Poller::new(
                marketplace,
                adapter,
                user_store.clone(),
                token_provider.clone(),
                seen_set.clone(),
                baseline.clone(),
                queue_tx.clone(),
                interval,
                nano_ton_threshold,
                stop_rx,
            )
            .with_first_sweep_signal(sweep_tx);
            poller_tasks.push(tokio::spawn(poller.run()));

            handles.insert(
                marketplace,
                MarketplaceHandle {
                    enabled: AtomicBool::new(true),
                    stop: stop_tx,
                    seen_set,
                },
            );
        }
        drop(queue_tx);

        let supervisor = Arc::new(Self {
            handles,
            baseline,
            user_store,
            dispatcher: dispatcher.clone(),
            queue_rx: tokio::sync::Mutex::new(Some(queue_rx)),
        });

        let consumer_supervisor = supervisor.clone();
        let consumer = tokio::spawn(async move {
            consumer_supervisor.run_queue_consumer().await;
        });

        // BaselineFlag flips to true only once every marketplace has
        // completed its first sweep attempt (§3, §4.4): until then, Pollers
        // observe silently without handing anything to the Dispatcher.
        let baseline_for_gate = supervisor.baseline.clone();
        tokio::spawn(async move {
            for rx in first_sweep_signals {
                let _ = rx.await;
            }
            baseline_for_gate.mark_baseline_done();
        });

        (supervisor, consumer, poller_tasks)
    }

    async fn run_queue_consumer(&self) {
        let mut rx = self.queue_rx.lock().await.take().expect("consumer runs once");
        while let Some(listing) = rx.recv().await {
            let dispatcher = self.dispatcher.clone();
            tokio::spawn(async move {
                dispatcher.dispatch(listing).await;
            });
        }
    }

    /// Filter-change reaction (§4.7): reset every SeenSet and the
    /// BaselineFlag, since a changed rule set means previously-dropped
    /// listings might now be relevant and must be re-observed from scratch.
    pub fn on_filter_changed(&self) {
        info!("filter change received, resetting seen sets and baseline");
        self.baseline.reset();
        for handle in self.handles.values() {
            let seen_set = handle.seen_set.clone();
            tokio::spawn(async move {
                seen_set.reset().await;
            });
        }
    }

    pub fn enable(&self, marketplace: Marketplace) {
        if let Some(handle) = self.handles.get(&marketplace) {
            handle.enabled.store(true, Ordering::Release);
            let _ = handle.stop.send(false);
        }
    }

    pub fn disable(&self, marketplace: Marketplace) {
        if let Some(handle) = self.handles.get(&marketplace) {
            handle.enabled.store(false, Ordering::Release);
            let _ = handle.stop.send(true);
        }
    }

    pub fn toggle(&self, marketplace: Marketplace) {
        if let Some(handle) = self.handles.get(&marketplace) {
            if handle.enabled.load(Ordering::Acquire) {
                self.disable(marketplace);
            } else {
                self.enable(marketplace);
            }
        }
    }

    pub fn is_enabled(&self, marketplace: Marketplace) -> bool {
        self.handles
            .get(&marketplace)
            .map(|h| h.enabled.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    pub fn user_store(&self) -> &Arc<dyn UserConfigStore> {
        &self.user_store
    }

    pub fn seen_set_len(&self, marketplace: Marketplace) -> Option<Arc<SeenSet>> {
        self.handles.get(&marketplace).map(|h| h.seen_set.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{InMemoryUserConfigStore, RecordingTelegramGateway, StaticTokenProvider};
    use crate::core::error::AdapterError;
    use crate::core::types::{SaleRecord, SortKey};
    use crate::dispatch::websocket::WebSocketBroadcaster;
    use crate::enrich::{Enricher, FloorCache};
    use async_trait::async_trait;

    struct EmptyAdapter;

    #[async_trait]
    impl MarketplaceAdapter for EmptyAdapter {
        async fn list_newest(&self, _limit: u32, _sort: SortKey) -> Result<Vec<serde_json::Value>, AdapterError> {
            Ok(vec![])
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

    #[tokio::test]
    async fn enable_disable_toggle_flip_the_stop_flag() {
        let mut adapters: HashMap<Marketplace, Arc<dyn MarketplaceAdapter>> = HashMap::new();
        adapters.insert(Marketplace::Portals, Arc::new(EmptyAdapter));
        let user_store: Arc<dyn UserConfigStore> = Arc::new(InMemoryUserConfigStore::new());
        let mut dispatch_adapters: HashMap<Marketplace, Arc<dyn MarketplaceAdapter>> = HashMap::new();
        dispatch_adapters.insert(Marketplace::Portals, Arc::new(EmptyAdapter));
        dispatch_adapters.insert(Marketplace::Tonnel, Arc::new(EmptyAdapter));
        let dispatcher = Arc::new(Dispatcher::new(
            dispatch_adapters,
            Enricher::new(
                Arc::new(FloorCache::new(Duration::from_secs(60))),
                Duration::from_secs(1),
                Duration::from_secs(1),
                Decimal::new(6, 2),
            ),
            user_store.clone(),
            Arc::new(RecordingTelegramGateway::new()),
            WebSocketBroadcaster::new(16),
            4,
        ));

        let token_provider = Arc::new(StaticTokenProvider::new(HashMap::new()));
        let (supervisor, consumer, pollers) = Supervisor::start(
            adapters,
            HashMap::new(),
            user_store,
            token_provider,
            dispatcher,
            1000,
            16,
            Decimal::from(1000),
        );

        assert!(supervisor.is_enabled(Marketplace::Portals));
        supervisor.disable(Marketplace::Portals);
        assert!(!supervisor.is_enabled(Marketplace::Portals));
        supervisor.enable(Marketplace::Portals);
        assert!(supervisor.is_enabled(Marketplace::Portals));

        supervisor.disable(Marketplace::Portals);
        for poller in pollers {
            let _ = tokio::time::timeout(Duration::from_millis(200), poller).await;
        }
        consumer.abort();
    }
}
