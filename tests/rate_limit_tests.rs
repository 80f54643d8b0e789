use std::time::Duration;

use mail_dispatch::services::rate_limit::{RateDecision, RateLimitConfig, RateLimiter};

fn limiter(max_requests: u32, window: Duration) -> RateLimiter {
    RateLimiter::new(RateLimitConfig {
        max_requests,
        window,
    })
}

#[test]
fn test_burst_is_allowed_then_limited() {
    let limiter = limiter(3, Duration::from_secs(60));

    for _ in 0..3 {
        match limiter.check("client") {
            RateDecision::Allowed { remaining, .. } => assert!(remaining < 3),
            RateDecision::Limited { .. } => panic!("request should be allowed"),
        }
    }

    assert!(matches!(limiter.check("client"), RateDecision::Limited { .. }));
}

#[test]
fn test_limited_client_waits_at_most_one_refill() {
    let limiter = limiter(2, Duration::from_secs(60));
    limiter.check("client");
    limiter.check("client");

    let RateDecision::Limited { retry_after } = limiter.check("client") else {
        panic!("third request should be limited");
    };

    assert!(retry_after > Duration::ZERO);
    assert!(retry_after <= Duration::from_secs(30));
}

#[tokio::test]
async fn test_capacity_refills_over_the_window() {
    let limiter = limiter(2, Duration::from_millis(100));
    limiter.check("client");
    limiter.check("client");
    assert!(matches!(limiter.check("client"), RateDecision::Limited { .. }));

    tokio::time::sleep(Duration::from_millis(120)).await;

    assert!(matches!(limiter.check("client"), RateDecision::Allowed { .. }));
}

#[test]
fn test_clients_are_counted_separately() {
    let limiter = limiter(1, Duration::from_secs(60));

    assert!(matches!(limiter.check("a"), RateDecision::Allowed { .. }));
    assert!(matches!(limiter.check("b"), RateDecision::Allowed { .. }));
    assert!(matches!(limiter.check("a"), RateDecision::Limited { .. }));
}

#[test]
fn test_zero_limit_still_allows_one_request() {
    let limiter = limiter(0, Duration::from_secs(60));

    assert_eq!(limiter.limit(), 1);
    assert!(matches!(limiter.check("a"), RateDecision::Allowed { .. }));
    assert!(matches!(limiter.check("a"), RateDecision::Limited { .. }));
}

#[test]
fn test_default_config() {
    let config = RateLimitConfig::default();
    assert_eq!(config.max_requests, 10);
    assert_eq!(config.window, Duration::from_secs(15 * 60));
}
