use std::sync::Arc;
use std::time::Duration;

use portfolio_guard::rate_limit::DistributedRateLimiter;
use portfolio_guard::store::{EnvCredentials, UpstashClient};

fn live_tests_enabled() -> bool {
    std::env::var("UPSTASH_LIVE_TESTS").ok().as_deref() == Some("1")
}

fn live_client() -> Option<UpstashClient> {
    let credentials = EnvCredentials::try_from_env()?;
    UpstashClient::builder()
        .credentials(Arc::new(credentials))
        .build()
        .ok()
}

#[tokio::test]
#[ignore]
async fn live_upstash_ping() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenv::dotenv();
    if !live_tests_enabled() {
        return Ok(());
    }

    let Some(client) = live_client() else {
        return Ok(());
    };

    let pong: String = client.command(&["PING"]).await?;
    assert_eq!(pong, "PONG");

    Ok(())
}

#[tokio::test]
#[ignore]
async fn live_distributed_limit_smoke() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenv::dotenv();
    if !live_tests_enabled() {
        return Ok(());
    }

    let Some(client) = live_client() else {
        return Ok(());
    };
    let limiter = DistributedRateLimiter::builder(client)
        .prefix("portfolio-guard-smoke")
        .limit(2)
        .window(Duration::from_secs(5))
        .build();

    let identifier = format!("run-{}", std::process::id());
    assert!(limiter.limit(&identifier).await?.allowed);
    assert!(limiter.limit(&identifier).await?.allowed);

    let denied = limiter.limit(&identifier).await?;
    assert!(!denied.allowed);
    assert!(denied.wait_time_secs() >= 1);

    Ok(())
}
