use std::time::Duration;

use crate::geo::GeoPoint;
use crate::reconnect::ReconnectPolicy;

pub const CARD_POOL_PATH: &str = "/get-battle-cards/";
pub const LEADERBOARD_PATH: &str = "/leaderboard-data/";
pub const RECENT_CARD_PATH: &str = "/recent-card-data/";
pub const TRADE_SUBMIT_PATH: &str = "/trades/submit";
pub const PLACEHOLDER_IMAGE: &str = "/static/img/card_placeholder.png";
pub const LOCATIONS_PATH: &str = "/locations-data/";

/// Where the map opens before the device reports a position.
pub const MAP_CENTER: GeoPoint = GeoPoint::new(50.7371, -3.5251);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// How long a round result stays on screen before the next cards are requested.
    pub round_display_delay: Duration,
    pub reconnect: ReconnectPolicy,
    pub card_pool_path: String,
    /// Polling period for the leaderboard and recent-card panels.
    pub refresh_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            round_display_delay: Duration::from_millis(3000),
            reconnect: ReconnectPolicy::default(),
            card_pool_path: CARD_POOL_PATH.to_string(),
            refresh_interval: Duration::from_secs(100),
        }
    }
}

impl ClientConfig {
    /// Apply overrides looked up by key, as found in `data-*` attributes
    /// (`round-delay-ms`, `reconnect-base-ms`, `reconnect-max-ms`,
    /// `reconnect-attempts`). Unparseable values are ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let millis = |key: &str| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
        };
        if let Some(d) = millis("round-delay-ms") {
            self.round_display_delay = d;
        }
        if let Some(d) = millis("reconnect-base-ms") {
            self.reconnect.base_delay = d;
        }
        if let Some(d) = millis("reconnect-max-ms") {
            self.reconnect.max_delay = d;
        }
        if let Some(n) = lookup("reconnect-attempts").and_then(|v| v.trim().parse::<u32>().ok()) {
            self.reconnect.max_attempts = n;
        }
        self
    }
}
