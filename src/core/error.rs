//! Centralized error types for the giftwatch core.

use thiserror::Error;

/// Errors a `MarketplaceAdapter` call can fail with (§4.1, §7).
#[derive(Error, Debug)]
pub enum AdapterError {
    /// HTTP 429, HTTP 5xx, timeout, or DNS failure. Retried within the
    /// adapter call; if retries are exhausted the Poller logs and sleeps.
    #[error("transient error calling {marketplace}: {message}")]
    Transient {
        marketplace: String,
        message: String,
    },

    /// HTTP 401. The Poller requests a re-auth and retries on the next
    /// iteration.
    #[error("auth error calling {marketplace}: {message}")]
    Auth {
        marketplace: String,
        message: String,
    },

    /// Response could not be parsed into the adapter's expected shape. The
    /// offending item is skipped; the sweep continues.
    #[error("protocol error calling {marketplace}: {message}")]
    Protocol {
        marketplace: String,
        message: String,
    },

    /// Configuration missing entirely (no auth token, marketplace disabled).
    /// The Poller for that marketplace does not start.
    #[error("permanent error for {marketplace}: {message}")]
    Permanent {
        marketplace: String,
        message: String,
    },
}

impl AdapterError {
    pub fn is_transient(&self) -> bool {
        matches!(self, AdapterError::Transient { .. })
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, AdapterError::Auth { .. })
    }
}

/// Failure to deliver a single notification to a single user (§7). Logged;
/// never affects other recipients or the WebSocket emit.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("telegram send failed for user {user_id}: {message}")]
    Telegram { user_id: String, message: String },

    #[error("websocket broadcast failed: {0}")]
    WebSocket(String),
}

/// Top-level error for configuration loading and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(#[from] validator::ValidationErrors),

    #[error("marketplace {0} is enabled but has no auth token configured")]
    MissingAuth(String),
}

/// Umbrella error type returned by crate-level entry points (main.rs, tests).
#[derive(Error, Debug)]
pub enum GiftwatchError {
    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type GiftwatchResult<T> = Result<T, GiftwatchError>;
