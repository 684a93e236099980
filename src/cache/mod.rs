//! Result caching for slow or rate-limited upstream providers.
//!
//! Each cache instance fronts one upstream endpoint with a known refresh
//! cadence, so a fixed TTL is enough and there is no size-based eviction.

mod shared;
mod ttl_cache;

pub use shared::SharedTtlCache;
pub use ttl_cache::TtlCache;

use std::time::Duration;

/// Default freshness of market data snapshots.
pub const MARKET_DATA_TTL: Duration = Duration::from_secs(60);

/// Cache key for the market overview snapshot.
pub const MARKET_DATA: &str = "market-data";

/// Cache key for the expanded market snapshot.
pub const MARKET_DATA_EXPANDED: &str = "market-data-expanded";
