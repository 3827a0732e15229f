//! Rate limiting middleware using token bucket algorithm.

use anyhow::{Context, Result};
use governor::clock::QuantaInstant;
use governor::middleware::NoOpMiddleware;
use std::sync::Arc;
use std::time::Duration;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::PeerIpKeyExtractor,
};

/// Per-IP rate limiter.
pub type RateLimitLayer =
    GovernorLayer<PeerIpKeyExtractor, NoOpMiddleware<QuantaInstant>, axum::body::Body>;

/// How often idle client buckets are evicted.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Creates a rate limiter replenishing `per_second` requests per second for
/// each client IP, allowing bursts of up to `burst` requests.
///
/// Requests exceeding the limit receive `429 Too Many Requests`. The client
/// IP is taken from the socket peer address, so the service must be served
/// with `into_make_service_with_connect_info`.
///
/// # Errors
///
/// Returns an error if `per_second` or `burst` is 0.
pub fn layer(per_second: u64, burst: u32) -> Result<RateLimitLayer> {
    let config = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(per_second)
            .burst_size(burst)
            .finish()
            .context("rate limit and burst size must be greater than 0")?,
    );

    let limiter = config.limiter().clone();
    std::thread::spawn(move || {
        loop {
            std::thread::sleep(CLEANUP_INTERVAL);
            tracing::debug!(tracked = limiter.len(), "Evicting idle rate limit buckets");
            limiter.retain_recent();
        }
    });

    Ok(GovernorLayer::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_rate_is_rejected() {
        assert!(layer(0, 10).is_err());
        assert!(layer(5, 0).is_err());
    }
}
