//! Floor & Sales Enricher (§4.3). Fetches gift/model floors from a listing's
//! own marketplace adapter and recent sales unconditionally from Tonnel,
//! all under a short deadline so a slow marketplace never stalls dispatch.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::warn;

use crate::core::traits::MarketplaceAdapter;
use crate::core::types::{Enrichment, FloorScope, Listing, Marketplace, SaleRecord};

/// Cache key for `FloorCache`: scope-qualified so a gift floor and a model
/// floor for the same collection never collide (§4.3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FloorCacheKey {
    marketplace: Marketplace,
    scope: FloorScope,
    collection: String,
    model: Option<String>,
}

/// TTL-bounded cache of floor prices, shared across all Pollers for a given
/// marketplace so repeated listings in the same collection don't each pay a
/// floor-price round trip (§4.3).
pub struct FloorCache {
    inner: moka::future::Cache<FloorCacheKey, Decimal>,
}

impl FloorCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: moka::future::Cache::builder()
                .time_to_live(ttl)
                .max_capacity(10_000)
                .build(),
        }
    }

    async fn get_or_fetch<F, Fut>(&self, key: FloorCacheKey, fetch: F) -> Option<Decimal>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Option<Decimal>>,
    {
        if let Some(cached) = self.inner.get(&key).await {
            return Some(cached);
        }
        let fetched = fetch().await?;
        self.inner.insert(key, fetched).await;
        Some(fetched)
    }
}

/// Enriches one `Listing` with floor prices and recent sales, respecting
/// per-source deadlines (§4.3). Every failure or timeout degrades to
/// `None`/empty rather than failing the whole dispatch.
pub struct Enricher {
    floor_cache: Arc<FloorCache>,
    floor_deadline: Duration,
    sales_deadline: Duration,
    tonnel_fee_rate: Decimal,
}

impl Enricher {
    pub fn new(
        floor_cache: Arc<FloorCache>,
        floor_deadline: Duration,
        sales_deadline: Duration,
        tonnel_fee_rate: Decimal,
    ) -> Self {
        Self {
            floor_cache,
            floor_deadline,
            sales_deadline,
            tonnel_fee_rate,
        }
    }

    /// Runs the gift-floor, model-floor and sales-history fetches
    /// concurrently (§4.3). `tonnel_adapter` is passed separately because
    /// sales history is fetched from Tonnel unconditionally, regardless of
    /// which marketplace the listing itself came from.
    pub async fn enrich(
        &self,
        listing: &Listing,
        own_adapter: &dyn MarketplaceAdapter,
        tonnel_adapter: &dyn MarketplaceAdapter,
    ) -> Enrichment {
        let (gift_floor, model_floor, recent_sales) = tokio::join!(
            self.gift_floor(listing, own_adapter),
            self.model_floor(listing, own_adapter),
            self.sales_history(listing, tonnel_adapter),
        );

        Enrichment {
            gift_floor: gift_floor.map(|p| self.apply_output_fee(listing.marketplace, p)),
            model_floor: model_floor.map(|p| self.apply_output_fee(listing.marketplace, p)),
            recent_sales,
        }
    }

    async fn gift_floor(&self, listing: &Listing, adapter: &dyn MarketplaceAdapter) -> Option<Decimal> {
        let key = FloorCacheKey {
            marketplace: listing.marketplace,
            scope: FloorScope::Gift,
            collection: listing.collection_name.clone(),
            model: None,
        };
        let collection = listing.collection_name.clone();
        let result = tokio::time::timeout(
            self.floor_deadline,
            self.floor_cache
                .get_or_fetch(key, || async move { adapter.get_gift_floor(&collection).await.ok().flatten() }),
        )
        .await;
        match result {
            Ok(value) => value,
            Err(_) => {
                warn!(marketplace = %listing.marketplace, "gift floor fetch timed out");
                None
            }
        }
    }

    async fn model_floor(&self, listing: &Listing, adapter: &dyn MarketplaceAdapter) -> Option<Decimal> {
        let key = FloorCacheKey {
            marketplace: listing.marketplace,
            scope: FloorScope::Model,
            collection: listing.collection_name.clone(),
            model: Some(listing.model_name.clone()),
        };
        let collection = listing.collection_name.clone();
        let model = listing.model_name.clone();
        let result = tokio::time::timeout(
            self.floor_deadline,
            self.floor_cache.get_or_fetch(key, || async move {
                adapter.get_model_floor(&collection, &model).await.ok().flatten()
            }),
        )
        .await;
        match result {
            Ok(value) => value,
            Err(_) => {
                warn!(marketplace = %listing.marketplace, "model floor fetch timed out");
                None
            }
        }
    }

    async fn sales_history(&self, listing: &Listing, tonnel_adapter: &dyn MarketplaceAdapter) -> Vec<SaleRecord> {
        let result = tokio::time::timeout(
            self.sales_deadline,
            tonnel_adapter.get_model_sales_history(&listing.collection_name, &listing.model_name, 5),
        )
        .await;
        match result {
            Ok(Ok(sales)) => sales
                .into_iter()
                .map(|s| SaleRecord {
                    price_ton: self.apply_output_fee(Marketplace::Tonnel, s.price_ton),
                    ..s
                })
                .collect(),
            Ok(Err(err)) => {
                warn!(marketplace = %listing.marketplace, error = %err, "sales history fetch failed");
                Vec::new()
            }
            Err(_) => {
                warn!(marketplace = %listing.marketplace, "sales history fetch timed out");
                Vec::new()
            }
        }
    }

    /// Applies Tonnel's marketplace fee at output time only; the raw
    /// `Listing.price_ton` and any cached floor value are never mutated in
    /// place (§4.1, §9 Design Notes). Public so the Dispatcher can derive the
    /// displayed listing price the same way it derives floor/sales prices.
    pub fn apply_output_fee(&self, marketplace: Marketplace, price: Decimal) -> Decimal {
        if marketplace == Marketplace::Tonnel {
            price * (Decimal::ONE + self.tonnel_fee_rate)
        } else {
            price
        }
    }
}
