//! Giftwatch
//!
//! Real-time listing monitor and fan-out notifier for four Telegram gift
//! marketplaces (Portals, Tonnel, MRKT, GetGems): poll, normalize, dedupe,
//! enrich with floor prices and recent sales, match against per-user
//! filters, and fan out to Telegram and a WebSocket push feed.

pub mod adapters;
pub mod api;
pub mod collaborators;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod enrich;
pub mod filter;
pub mod links;
pub mod normalizer;
pub mod poller;
pub mod seen_set;
pub mod supervisor;

pub use config::GiftwatchConfig;
pub use core::{GiftwatchError, GiftwatchResult};
