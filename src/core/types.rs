//! Core domain types shared across adapters, normalizer, enricher and dispatcher.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One of the four marketplaces this crate monitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Marketplace {
    Portals,
    Tonnel,
    Mrkt,
    Getgems,
}

impl Marketplace {
    pub const ALL: [Marketplace; 4] = [
        Marketplace::Portals,
        Marketplace::Tonnel,
        Marketplace::Mrkt,
        Marketplace::Getgems,
    ];

    /// Page size cap enforced by each marketplace's own API (§4.1).
    pub fn max_page_size(self) -> u32 {
        match self {
            Marketplace::Portals => 50,
            Marketplace::Tonnel => 30,
            Marketplace::Mrkt => 20,
            Marketplace::Getgems => 100,
        }
    }

    /// Display name used in Telegram messages ("за P.PP TON на MarketplaceName").
    pub fn display_name(self) -> &'static str {
        match self {
            Marketplace::Portals => "Portals",
            Marketplace::Tonnel => "Tonnel",
            Marketplace::Mrkt => "MRKT",
            Marketplace::Getgems => "GetGems",
        }
    }

    pub fn as_key(self) -> &'static str {
        match self {
            Marketplace::Portals => "portals",
            Marketplace::Tonnel => "tonnel",
            Marketplace::Mrkt => "mrkt",
            Marketplace::Getgems => "getgems",
        }
    }
}

impl fmt::Display for Marketplace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_key())
    }
}

/// Sort key vocabulary shared across adapters (§4.1). Not every marketplace's
/// native API supports every variant; adapters that can't map a variant
/// natively sort client-side after fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Latest,
    PriceAsc,
    PriceDesc,
    GiftIdAsc,
    GiftIdDesc,
    ModelRarityAsc,
    ModelRarityDesc,
}

impl Default for SortKey {
    fn default() -> Self {
        SortKey::Latest
    }
}

/// Floor scope: collection-wide ("gift floor") or collection+model ("model floor").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FloorScope {
    Gift,
    Model,
}

/// Canonical listing record produced by the Normalizer (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub marketplace: Marketplace,
    pub listing_id: String,
    pub collection_name: String,
    pub model_name: String,
    pub backdrop_name: Option<String>,
    pub gift_number: String,
    pub price_ton: Decimal,
    pub model_rarity: Option<String>,
    pub photo_url: Option<String>,
    pub hash_32: Option<String>,
    /// Deterministic per-marketplace deep link (§6), `None` only for MRKT
    /// listings whose `hash_32` doesn't qualify.
    pub marketplace_link: Option<String>,
    /// Deterministic `t.me/nft/...` canonical link (§6), `None` when the
    /// gift number isn't available.
    pub nft_link: Option<String>,
}

/// Sentinel used for an absent model/gift-number field (§3).
pub const NOT_AVAILABLE: &str = "N/A";

impl Listing {
    /// `"{marketplace}_{listing_id}"` — the dedup key (§3).
    pub fn composite_id(&self) -> String {
        format!("{}_{}", self.marketplace.as_key(), self.listing_id)
    }

    /// A Listing is only eligible for dispatch once its price is positive (§3).
    pub fn is_eligible(&self) -> bool {
        !self.collection_name.is_empty() && self.price_ton > Decimal::ZERO
    }
}

/// One sale record from a marketplace's sales history (§3 SUPPLEMENT, §4.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub marketplace: Marketplace,
    pub gift_number: String,
    pub price_ton: Decimal,
    pub sold_at: chrono::DateTime<chrono::Utc>,
}

/// Enrichment data gathered for one Listing (§4.3). Every field degrades to
/// `None`/empty on timeout or error rather than failing the dispatch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Enrichment {
    pub gift_floor: Option<Decimal>,
    pub model_floor: Option<Decimal>,
    pub recent_sales: Vec<SaleRecord>,
}

/// Wildcard sentinel. Matched uppercase-only and case-sensitively — a rule
/// written as `"any"` is a literal collection name, not the wildcard (see
/// DESIGN.md).
pub const ANY: &str = "ANY";

/// One rule within a user's filter (§3). A listing matches a rule if every
/// populated dimension admits it; `ANY` in a list position matches
/// unconditionally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRule {
    /// `["ANY"]` or a list of collection names.
    pub collections: Vec<String>,
    /// `["ANY"]` or a list of model names.
    pub models: Vec<String>,
    /// `["ANY"]` or a list of backdrop names.
    pub backdrops: Vec<String>,
    pub marketplaces: Vec<Marketplace>,
    pub price_min: Option<Decimal>,
    pub price_max: Option<Decimal>,
}

/// A user's full, ordered rule set (§3). A user matches a Listing if any one
/// rule matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserFilter {
    pub user_id: String,
    pub rules: Vec<FilterRule>,
}
