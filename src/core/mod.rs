//! Core domain abstractions, types and errors.
//!
//! This module is independent of any specific marketplace or transport
//! concern; adapters, the normalizer, enricher and dispatcher all build on
//! top of it.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{AdapterError, ConfigError, DeliveryError, GiftwatchError, GiftwatchResult};
pub use traits::{MarketplaceAdapter, NormalizeResult, RawItem};
pub use types::{
    Enrichment, FilterRule, FloorScope, Listing, Marketplace, SaleRecord, SortKey, UserFilter,
    ANY, NOT_AVAILABLE,
};
