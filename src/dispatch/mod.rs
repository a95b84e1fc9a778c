//! Fan-Out Dispatcher (§4.6): enrich, match, format once, then fan out to a
//! bounded worker pool of per-user sends plus an independent WebSocket
//! broadcast.

pub mod format;
pub mod websocket;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, warn};

use crate::collaborators::{TelegramGateway, UserConfigStore};
use crate::core::traits::MarketplaceAdapter;
use crate::core::types::{Listing, Marketplace};
use crate::enrich::Enricher;
use crate::filter::IndexedUserFilter;

use self::format::format_message;
use self::websocket::{NewGiftEvent, WebSocketBroadcaster};

pub struct Dispatcher {
    adapters: HashMap<Marketplace, Arc<dyn MarketplaceAdapter>>,
    enricher: Enricher,
    user_store: Arc<dyn UserConfigStore>,
    telegram: Arc<dyn TelegramGateway>,
    websocket: WebSocketBroadcaster,
    send_permits: Arc<tokio::sync::Semaphore>,
}

impl Dispatcher {
    pub fn new(
        adapters: HashMap<Marketplace, Arc<dyn MarketplaceAdapter>>,
        enricher: Enricher,
        user_store: Arc<dyn UserConfigStore>,
        telegram: Arc<dyn TelegramGateway>,
        websocket: WebSocketBroadcaster,
        send_concurrency: usize,
    ) -> Self {
        Self {
            adapters,
            enricher,
            user_store,
            telegram,
            websocket,
            send_permits: Arc::new(tokio::sync::Semaphore::new(send_concurrency)),
        }
    }

    /// Runs the full §4.6 algorithm for one Listing. Dispatcher never
    /// consults the SeenSet — callers are responsible for dedup (§4.6
    /// "Idempotence").
    pub async fn dispatch(&self, listing: Listing) {
        let own_adapter = match self.adapters.get(&listing.marketplace) {
            Some(adapter) => adapter.clone(),
            None => {
                error!(marketplace = %listing.marketplace, "no adapter configured, dropping listing");
                return;
            }
        };
        let tonnel_adapter = match self.adapters.get(&Marketplace::Tonnel) {
            Some(adapter) => adapter.clone(),
            None => {
                warn!("no Tonnel adapter configured, sales history will be empty");
                own_adapter.clone()
            }
        };

        let enrichment = self
            .enricher
            .enrich(&listing, own_adapter.as_ref(), tonnel_adapter.as_ref())
            .await;

        let display_price = self.enricher.apply_output_fee(listing.marketplace, listing.price_ton);
        let now = chrono::Utc::now();
        self.websocket
            .publish(NewGiftEvent::new(&listing, &enrichment, display_price, now));

        let matched_users = self.matching_users(&listing).await;
        if matched_users.is_empty() {
            return;
        }

        let message = format_message(&listing, &enrichment, display_price, now);
        let html = Arc::new(message.html);
        let button_label = Arc::new(message.button_label);
        let button_url = Arc::new(message.button_url);
        let photo_url = listing.photo_url.clone();

        let mut handles = Vec::with_capacity(matched_users.len());
        for user_id in matched_users {
            let telegram = self.telegram.clone();
            let permits = self.send_permits.clone();
            let html = html.clone();
            let button_label = button_label.clone();
            let button_url = button_url.clone();
            let photo_url = photo_url.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permits.acquire().await.expect("semaphore never closed");
                send_one(&telegram, &user_id, photo_url.as_deref(), &html, &button_label, &button_url).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// §4.8: subscribers of this Listing's marketplace, each evaluated
    /// against their own rule set. A rule-fetch failure for one user is
    /// logged and excluded, never blocking the rest (§4.8 "Failure mode").
    async fn matching_users(&self, listing: &Listing) -> Vec<String> {
        let subscribers = self.user_store.subscribers(listing.marketplace).await;
        let mut indexed = Vec::with_capacity(subscribers.len());
        for user_id in subscribers {
            match self.user_store.filter_for(&user_id).await {
                Some(filter) => indexed.push(IndexedUserFilter::build(&filter)),
                None => {
                    warn!(user_id, "no filter rules found, excluding from this dispatch");
                }
            }
        }
        crate::filter::matching_users(listing, &indexed)
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}

/// Attempts photo-send first when `photo_url` is present, falling back to
/// text-send on photo error (§4.6 step 5). Failures for one user are logged
/// and never propagated.
async fn send_one(
    telegram: &Arc<dyn TelegramGateway>,
    user_id: &str,
    photo_url: Option<&str>,
    html: &str,
    button_label: &str,
    button_url: &str,
) {
    if let Some(photo_url) = photo_url {
        match telegram.send_photo(user_id, photo_url, html, button_label, button_url).await {
            Ok(()) => return,
            Err(err) => warn!(user_id, error = %err, "photo send failed, falling back to text"),
        }
    }
    if let Err(err) = telegram.send_text(user_id, html, button_label, button_url).await {
        error!(user_id, error = %err, "text send failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::InMemoryUserConfigStore;
    use crate::collaborators::RecordingTelegramGateway;
    use crate::core::error::AdapterError;
    use crate::core::types::{FilterRule, SaleRecord, SortKey, UserFilter, ANY};
    use crate::enrich::FloorCache;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::time::Duration;

    struct StubAdapter;

    #[async_trait]
    impl MarketplaceAdapter for StubAdapter {
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

    fn listing() -> Listing {
        Listing {
            marketplace: Marketplace::Portals,
            listing_id: "1".into(),
            collection_name: "Plush Pepe".into(),
            model_name: "Grumpy".into(),
            backdrop_name: None,
            gift_number: "37".into(),
            price_ton: Decimal::from(10),
            model_rarity: None,
            photo_url: None,
            hash_32: None,
            marketplace_link: None,
            nft_link: None,
        }
    }

    fn dispatcher(user_store: Arc<InMemoryUserConfigStore>, telegram: Arc<RecordingTelegramGateway>) -> Dispatcher {
        let mut adapters: HashMap<Marketplace, Arc<dyn MarketplaceAdapter>> = HashMap::new();
        adapters.insert(Marketplace::Portals, Arc::new(StubAdapter));
        adapters.insert(Marketplace::Tonnel, Arc::new(StubAdapter));
        let enricher = Enricher::new(
            Arc::new(FloorCache::new(Duration::from_secs(60))),
            Duration::from_secs(1),
            Duration::from_secs(1),
            Decimal::new(6, 2),
        );
        Dispatcher::new(
            adapters,
            enricher,
            user_store,
            telegram,
            WebSocketBroadcaster::new(16),
            4,
        )
    }

    #[tokio::test]
    async fn dispatch_sends_to_matched_subscriber_and_broadcasts() {
        let store = Arc::new(InMemoryUserConfigStore::new());
        store.subscribe(Marketplace::Portals, "u1").await;
        store
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
        let telegram = Arc::new(RecordingTelegramGateway::new());
        let dispatcher = dispatcher(store, telegram.clone());
        let mut ws = dispatcher.websocket.subscribe();

        dispatcher.dispatch(listing()).await;

        let sent = telegram.sent.read().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "u1");

        let event = ws.try_recv().unwrap();
        assert_eq!(event.listing_id, "1");
    }

    #[tokio::test]
    async fn dispatch_with_no_matching_users_still_broadcasts_but_sends_nothing() {
        let store = Arc::new(InMemoryUserConfigStore::new());
        let telegram = Arc::new(RecordingTelegramGateway::new());
        let dispatcher = dispatcher(store, telegram.clone());
        let mut ws = dispatcher.websocket.subscribe();

        dispatcher.dispatch(listing()).await;

        assert!(telegram.sent.read().await.is_empty());
        assert!(ws.try_recv().is_ok());
    }
}
