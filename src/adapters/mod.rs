//! Adapters layer — one implementation of `MarketplaceAdapter` per
//! marketplace, each owning its auth header shape, rate-limit backoff and
//! price-unit normalization (§4.1).

pub mod common;
pub mod getgems;
pub mod mrkt;
pub mod portals;
pub mod tonnel;

pub use getgems::GetGemsAdapter;
pub use mrkt::{extract_mrkt_hash, MrktAdapter};
pub use portals::PortalsAdapter;
pub use tonnel::TonnelAdapter;
