//! Shared helpers used by every marketplace adapter: retry/backoff, price
//! normalization and the Tonnel process-wide rate gate (§4.1, §9).

use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::warn;

use crate::core::error::AdapterError;

/// Runs `attempt` up to `max_attempts` times, retrying only on
/// `AdapterError::Transient`, with exponential backoff starting at
/// `base_delay` (§4.1: "exponential backoff, base 1-2s, max 3 attempts").
pub async fn retry_transient<F, Fut, T>(
    marketplace: &str,
    max_attempts: u32,
    base_delay: Duration,
    mut attempt: F,
) -> Result<T, AdapterError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, AdapterError>>,
{
    let mut delay = base_delay;
    let mut last_err = None;
    for attempt_no in 1..=max_attempts {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt_no < max_attempts => {
                warn!(
                    marketplace,
                    attempt_no, ?delay, "transient error, retrying"
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                last_err = Some(err);
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_err.expect("loop always runs at least once"))
}

/// Normalizes a raw numeric price into TON (§4.1): values above
/// `nano_ton_threshold` are assumed to be expressed in nano-TON and divided
/// down.
pub fn normalize_price(raw: Decimal, nano_ton_threshold: Decimal) -> Decimal {
    if raw > nano_ton_threshold {
        raw / Decimal::from(1_000_000_000u64)
    } else {
        raw
    }
}

/// Parses a price that may arrive as a JSON string such as `"37.50 TON"` or
/// `"1,234.5"` (§4.1: "strip `TON` tokens and commas").
pub fn parse_price_str(raw: &str) -> Option<Decimal> {
    let cleaned = raw.replace("TON", "").replace(',', "");
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        return None;
    }
    Decimal::from_str(trimmed).ok()
}

/// A 32-hex-character hash, used for MRKT deep links (§3, §4.1).
static HASH32_PATTERN: &str = r"^[0-9a-f]{32}$";

pub fn is_hash32(candidate: &str) -> bool {
    let re = regex::Regex::new(HASH32_PATTERN).expect("static regex compiles");
    re.is_match(candidate)
}

/// Strips dashes from a UUID-like string and checks whether what remains is
/// a 32-hex hash, covering MRKT's `id` field when it arrives dashed (§4.1).
pub fn hash32_from_dashed(candidate: &str) -> Option<String> {
    let stripped: String = candidate.chars().filter(|c| *c != '-').collect();
    if is_hash32(&stripped) {
        Some(stripped)
    } else {
        None
    }
}

/// Tonnel's process-wide minimum interval between outbound calls (§4.1, §5,
/// §9). Constructed once by the Supervisor and shared via `Arc` into the
/// Tonnel adapter rather than kept as a module-level singleton.
pub struct RateGate {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(min_interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            min_interval,
            last_call: Mutex::new(None),
        })
    }

    /// Blocks the caller until at least `min_interval` has elapsed since the
    /// last call through this gate, then records the new call time.
    pub async fn wait_turn(&self) {
        let mut last_call = self.last_call.lock().await;
        if let Some(last) = *last_call {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last_call = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_nano_ton_values() {
        let threshold = Decimal::from(1000);
        assert_eq!(
            normalize_price(Decimal::from(37_500_000_000u64), threshold),
            Decimal::from_str("37.5").unwrap()
        );
        assert_eq!(normalize_price(Decimal::from(37), threshold), Decimal::from(37));
    }

    #[test]
    fn parses_price_strings_with_ton_suffix_and_commas() {
        assert_eq!(parse_price_str("1,234.5 TON"), Decimal::from_str("1234.5").ok());
        assert_eq!(parse_price_str("37.50"), Decimal::from_str("37.50").ok());
        assert_eq!(parse_price_str(""), None);
    }

    #[test]
    fn validates_hash32() {
        assert!(is_hash32("0123456789abcdef0123456789abcdef"));
        assert!(!is_hash32("not-a-hash"));
        assert_eq!(
            hash32_from_dashed("01234567-89ab-cdef-0123-456789abcdef"),
            Some("0123456789abcdef0123456789abcdef".to_string())
        );
        assert_eq!(hash32_from_dashed("short-dash"), None);
    }

    #[tokio::test]
    async fn retry_transient_retries_then_succeeds() {
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result = retry_transient("test", 3, Duration::from_millis(1), || {
            let n = attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(AdapterError::Transient {
                        marketplace: "test".into(),
                        message: "boom".into(),
                    })
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_transient_does_not_retry_auth_errors() {
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result: Result<(), _> = retry_transient("test", 3, Duration::from_millis(1), || {
            attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move {
                Err(AdapterError::Auth {
                    marketplace: "test".into(),
                    message: "nope".into(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rate_gate_enforces_minimum_interval() {
        let gate = RateGate::new(Duration::from_millis(50));
        let start = Instant::now();
        gate.wait_turn().await;
        gate.wait_turn().await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
