//! Port traits (Ports in Hexagonal Architecture) that the rest of the crate
//! programs against, independent of any concrete marketplace or transport.

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::error::AdapterError;
use super::types::{Listing, SaleRecord, SortKey};

/// Raw, not-yet-normalized item as returned by one marketplace's API.
/// Field-aliasing knowledge lives entirely in the Normalizer (§4.2); adapters
/// only hand back the marketplace's own JSON shape.
pub type RawItem = serde_json::Value;

/// Common shape every marketplace adapter exposes (§4.1).
#[async_trait]
pub trait MarketplaceAdapter: Send + Sync {
    /// Most recently listed items, newest first unless `sort` says otherwise.
    /// `limit` is silently clamped to this adapter's page-size cap.
    async fn list_newest(
        &self,
        limit: u32,
        sort: SortKey,
    ) -> Result<Vec<RawItem>, AdapterError>;

    /// A single item by id, or `None` if it no longer exists / was delisted.
    async fn get_by_id(&self, listing_id: &str) -> Result<Option<RawItem>, AdapterError>;

    /// Floor price across the whole collection, in TON, raw (un-fee-adjusted).
    async fn get_gift_floor(&self, collection: &str) -> Result<Option<Decimal>, AdapterError>;

    /// Floor price for one collection+model, in TON, raw (un-fee-adjusted).
    async fn get_model_floor(
        &self,
        collection: &str,
        model: &str,
    ) -> Result<Option<Decimal>, AdapterError>;

    /// Recent sales for one collection+model. Only Tonnel is required to
    /// implement this meaningfully (§4.1); other adapters return `Ok(vec![])`.
    async fn get_model_sales_history(
        &self,
        collection: &str,
        model: &str,
        limit: u32,
    ) -> Result<Vec<SaleRecord>, AdapterError>;

    /// Replaces the token used for subsequent requests. Called by the
    /// Poller after it asks the `TokenProvider` collaborator for a fresh
    /// token in response to an `AdapterError::Auth` (§4.1, §7).
    async fn refresh_auth(&self, token: String);
}

/// Produced by the Normalizer from a RawItem; `None` when the item is not
/// eligible to become a Listing (empty collection name or zero price, §4.2).
pub type NormalizeResult = Option<Listing>;
