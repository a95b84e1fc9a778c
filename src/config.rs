//! Configuration management for giftwatch, loaded from a TOML file and
//! validated before the Supervisor starts any Poller.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::error::ConfigError;
use crate::core::types::Marketplace;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct GiftwatchConfig {
    #[validate]
    pub marketplaces: MarketplacesConfig,
    #[validate]
    pub pricing: PricingConfig,
    #[validate]
    pub cache: CacheConfig,
    #[validate]
    pub dispatch: DispatchConfig,
    #[validate]
    pub api: ApiConfig,
    #[validate]
    pub monitoring: MonitoringConfig,
}

/// Per-marketplace auth + polling settings (§6 "Environment configuration").
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MarketplacesConfig {
    #[validate]
    pub portals: MarketplaceEntry,
    #[validate]
    pub tonnel: MarketplaceEntry,
    #[validate]
    pub mrkt: MarketplaceEntry,
    #[validate]
    pub getgems: MarketplaceEntry,
}

impl MarketplacesConfig {
    pub fn entry(&self, marketplace: Marketplace) -> &MarketplaceEntry {
        match marketplace {
            Marketplace::Portals => &self.portals,
            Marketplace::Tonnel => &self.tonnel,
            Marketplace::Mrkt => &self.mrkt,
            Marketplace::Getgems => &self.getgems,
        }
    }

    pub fn enabled(&self) -> Vec<Marketplace> {
        Marketplace::ALL
            .into_iter()
            .filter(|m| self.entry(*m).enabled)
            .collect()
    }
}

impl Default for MarketplacesConfig {
    fn default() -> Self {
        Self {
            portals: MarketplaceEntry::default_for(Marketplace::Portals),
            tonnel: MarketplaceEntry::default_for(Marketplace::Tonnel),
            mrkt: MarketplaceEntry::default_for(Marketplace::Mrkt),
            getgems: MarketplaceEntry::default_for(Marketplace::Getgems),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MarketplaceEntry {
    pub enabled: bool,
    #[validate(url)]
    pub base_url: String,
    /// Bearer-style credential. Empty when `enabled == false`.
    pub auth_token: String,
    #[validate(range(min = 1, max = 600))]
    pub poll_interval_secs: u64,
    #[validate(range(min = 1, max = 30))]
    pub request_timeout_secs: u64,
}

impl MarketplaceEntry {
    fn default_for(marketplace: Marketplace) -> Self {
        let (base_url, poll_interval_secs) = match marketplace {
            Marketplace::Portals => ("https://portals-market.com/api", 1),
            Marketplace::Tonnel => ("https://tonnel-gift.com/api", 2),
            Marketplace::Mrkt => ("https://api.mrkt.space", 1),
            Marketplace::Getgems => ("https://getgems.io/api", 1),
        };
        Self {
            enabled: false,
            base_url: base_url.to_string(),
            auth_token: String::new(),
            poll_interval_secs,
            request_timeout_secs: 20,
        }
    }
}

/// Fee and price-normalization settings (§4.1, §4.3).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PricingConfig {
    /// Multiplier applied to Tonnel-originated prices on output (§9 glossary
    /// "Fee rate").
    #[validate(range(min = 0.0, max = 1.0))]
    pub tonnel_fee_rate: f64,
    /// Heuristic threshold above which a raw numeric price is assumed to be
    /// nano-TON and divided by 1e9 (§4.1).
    #[validate(range(min = 1.0))]
    pub nano_ton_threshold: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            tonnel_fee_rate: 0.06,
            nano_ton_threshold: 1000.0,
        }
    }
}

/// Floor & sales enrichment cache and deadlines (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CacheConfig {
    #[validate(range(min = 1, max = 86400))]
    pub floor_ttl_secs: u64,
    #[validate(range(min = 1, max = 30))]
    pub floor_deadline_secs: u64,
    #[validate(range(min = 1, max = 60))]
    pub sales_deadline_secs: u64,
    #[validate(range(min = 100, max = 1_000_000))]
    pub seen_set_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            floor_ttl_secs: 300,
            floor_deadline_secs: 3,
            sales_deadline_secs: 5,
            seen_set_capacity: 1000,
        }
    }
}

/// Fan-out worker pool and queueing (§4.6, §5).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DispatchConfig {
    #[validate(range(min = 1, max = 200))]
    pub send_concurrency: usize,
    #[validate(range(min = 1, max = 10_000))]
    pub queue_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            send_concurrency: 10,
            queue_capacity: 256,
        }
    }
}

/// Push API (WebSocket fan-out + health) bind settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ApiConfig {
    pub bind_address: String,
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            enable_cors: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MonitoringConfig {
    pub log_level: String,
    pub structured_logging: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            structured_logging: false,
        }
    }
}

impl GiftwatchConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate_full()?;
        Ok(config)
    }

    /// Validation beyond what `#[validate]` derives can express: every
    /// enabled marketplace must carry a non-empty auth token (§7 PermanentError).
    pub fn validate_full(&self) -> Result<(), ConfigError> {
        self.validate()?;
        for marketplace in Marketplace::ALL {
            let entry = self.marketplaces.entry(marketplace);
            if entry.enabled && entry.auth_token.trim().is_empty() {
                return Err(ConfigError::MissingAuth(marketplace.as_key().to_string()));
            }
        }
        Ok(())
    }

    /// Per-marketplace poll interval, keyed by marketplace for quick lookup
    /// by the Supervisor when it spins up Pollers.
    pub fn poll_intervals(&self) -> HashMap<Marketplace, u64> {
        Marketplace::ALL
            .into_iter()
            .map(|m| (m, self.marketplaces.entry(m).poll_interval_secs))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_internally_consistent() {
        let config = GiftwatchConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.marketplaces.enabled().is_empty());
    }

    #[test]
    fn enabling_a_marketplace_without_token_fails_full_validation() {
        let mut config = GiftwatchConfig::default();
        config.marketplaces.portals.enabled = true;
        let err = config.validate_full().unwrap_err();
        assert!(matches!(err, ConfigError::MissingAuth(m) if m == "portals"));
    }

    #[test]
    fn parses_from_toml() {
        let toml_str = r#"
            [marketplaces.portals]
            enabled = true
            base_url = "https://portals-market.com/api"
            auth_token = "tma abc123"
            poll_interval_secs = 1
            request_timeout_secs = 20

            [marketplaces.tonnel]
            enabled = false
            base_url = "https://tonnel-gift.com/api"
            auth_token = ""
            poll_interval_secs = 2
            request_timeout_secs = 20

            [marketplaces.mrkt]
            enabled = false
            base_url = "https://api.mrkt.space"
            auth_token = ""
            poll_interval_secs = 1
            request_timeout_secs = 20

            [marketplaces.getgems]
            enabled = false
            base_url = "https://getgems.io/api"
            auth_token = ""
            poll_interval_secs = 1
            request_timeout_secs = 20

            [pricing]
            tonnel_fee_rate = 0.06
            nano_ton_threshold = 1000.0

            [cache]
            floor_ttl_secs = 300
            floor_deadline_secs = 3
            sales_deadline_secs = 5
            seen_set_capacity = 1000

            [dispatch]
            send_concurrency = 10
            queue_capacity = 256

            [api]
            bind_address = "127.0.0.1:8080"
            enable_cors = true

            [monitoring]
            log_level = "info"
            structured_logging = false
        "#;
        let config: GiftwatchConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate_full().is_ok());
        assert_eq!(config.marketplaces.enabled(), vec![Marketplace::Portals]);
    }
}
