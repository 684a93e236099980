//! Example: Rate limiting, 429 shaping and result caching.
//!
//! Run with: RUST_LOG=debug cargo run --example rate_limit

use std::sync::Arc;
use std::time::Duration;

use portfolio_guard::cache::{MARKET_DATA, SharedTtlCache, TtlCache};
use portfolio_guard::clock::ManualClock;
use portfolio_guard::guard::UpstreamGuard;
use portfolio_guard::rate_limit::{
    KeyedRateLimiter, LimiterRegistry, RateLimitConfig, SharedRateLimiter, names,
};
use portfolio_guard::GuardError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // A clock we can move by hand, so the demo does not sleep.
    let clock = Arc::new(ManualClock::new(0));

    // Keyed sliding window: 3 requests per minute per client.
    let mut keyed = KeyedRateLimiter::with_clock(Duration::from_secs(60), 3, clock.clone());
    for t in 0..3 {
        clock.set(t);
        keyed.track_request("203.0.113.7");
    }
    clock.set(3);
    println!("4th request allowed: {}", keyed.can_make_request("203.0.113.7"));
    println!("Wait: {}s", keyed.time_until_next_slot("203.0.113.7"));
    clock.set(60_001);
    println!("Allowed after the window: {}", keyed.can_make_request("203.0.113.7"));

    // Shared limiter and its 429 payload.
    let chat = SharedRateLimiter::with_clock(
        names::CHAT,
        RateLimitConfig::new(1, Duration::from_secs(60)),
        clock.clone(),
    );
    let _ = chat.check_and_track("user-1");
    if let Err(wait) = chat.check_and_track("user-1") {
        let rejection = chat.snapshot("user-1").rejection();
        println!("Denied for {wait}s: {}", serde_json::to_string(&rejection.body())?);
        for (name, value) in rejection.headers().iter() {
            println!("  {}: {:?}", name, value);
        }
    }

    // Built-in limiters.
    let registry = LimiterRegistry::with_defaults();
    for name in [names::CHAT, names::ALPACA, names::OPENAI] {
        if let Some(limiter) = registry.get(name) {
            println!("{name}: {} remaining", limiter.snapshot("demo").remaining);
        }
    }

    // Plain TTL cache.
    let mut cache: TtlCache<String, f64> =
        TtlCache::with_clock(Duration::from_secs(5), clock.clone());
    cache.set("SPY".to_string(), 512.3);
    clock.advance(2_500);
    println!("SPY ttl: {}s", cache.remaining_ttl("SPY"));

    // Cache in front of a limited provider.
    let guard = UpstreamGuard::new(
        SharedRateLimiter::with_clock(names::ALPACA, RateLimitConfig::alpaca(), clock.clone()),
        SharedTtlCache::with_clock(Duration::from_secs(60), clock.clone()),
    );
    for _ in 0..2 {
        let snapshot = guard
            .get_or_fetch(MARKET_DATA, "alpaca", || async {
                Ok::<_, GuardError>(serde_json::json!({"SPY": 512.3}))
            })
            .await?;
        println!(
            "{:?} from {:?}, fresh for {}s",
            snapshot.value, snapshot.source, snapshot.remaining_ttl_secs
        );
    }

    Ok(())
}
