//! Rate limiter for preventing brute force login attempts

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum number of attempts allowed
    pub max_attempts: u32,
    /// Time window in seconds
    pub window_seconds: u64,
    /// Ban duration in seconds
    pub ban_duration_seconds: u64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window_seconds: 300,        // 5 minutes
            ban_duration_seconds: 3600, // 1 hour
        }
    }
}

#[derive(Debug)]
struct RateLimiterEntry {
    attempts: u32,
    window_start: Instant,
    ban_expires: Option<Instant>,
}

impl RateLimiterEntry {
    /// Neither a ban nor a counting window is still running
    fn is_stale(&self, now: Instant, window: Duration) -> bool {
        let banned = self.ban_expires.is_some_and(|expires| now < expires);
        !banned && now.duration_since(self.window_start) >= window
    }
}

#[derive(Debug)]
struct RateLimiterState {
    entries: HashMap<String, RateLimiterEntry>,
    last_sweep: Instant,
}

/// In-memory rate limiter keyed by an arbitrary string (the login email)
///
/// Entries whose window and ban have both run out are swept at most once
/// per window, so the map only holds keys seen recently.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    state: Arc<Mutex<RateLimiterState>>,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(RateLimiterState {
                entries: HashMap::new(),
                last_sweep: Instant::now(),
            })),
        }
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.config.window_seconds)
    }

    /// Record an attempt for `key` and report whether it may proceed
    pub async fn is_allowed(&self, key: &str) -> bool {
        self.check_at(key, Instant::now()).await
    }

    async fn check_at(&self, key: &str, now: Instant) -> bool {
        let window = self.window();
        let mut state = self.state.lock().await;

        if now.saturating_duration_since(state.last_sweep) >= window {
            let before = state.entries.len();
            state.entries.retain(|_, entry| !entry.is_stale(now, window));
            state.last_sweep = now;
            debug!(
                "Swept {} expired rate limiter entries",
                before - state.entries.len()
            );
        }

        let entries = &mut state.entries;

        let entry = entries.entry(key.to_string()).or_insert(RateLimiterEntry {
            attempts: 0,
            window_start: now,
            ban_expires: None,
        });

        if let Some(ban_expires) = entry.ban_expires {
            if now < ban_expires {
                return false;
            }
            entry.attempts = 0;
            entry.window_start = now;
            entry.ban_expires = None;
        }

        if now.duration_since(entry.window_start) >= window {
            entry.attempts = 0;
            entry.window_start = now;
        }

        if entry.attempts >= self.config.max_attempts {
            entry.ban_expires = Some(now + Duration::from_secs(self.config.ban_duration_seconds));
            info!(
                "Banned key {} for {} seconds",
                key, self.config.ban_duration_seconds
            );
            return false;
        }

        entry.attempts += 1;
        true
    }

    /// Forget all attempts for `key`
    pub async fn reset(&self, key: &str) {
        self.state.lock().await.entries.remove(key);
    }

    /// Get the rate limiter configuration
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(RateLimiterConfig::default())
    }

    #[tokio::test]
    async fn test_bans_after_max_attempts() {
        let limiter = limiter();
        for _ in 0..limiter.config().max_attempts {
            assert!(limiter.is_allowed("maya@example.com").await);
        }

        assert!(!limiter.is_allowed("maya@example.com").await);
        assert!(limiter.is_allowed("other@example.com").await);
    }

    #[tokio::test]
    async fn test_reset_clears_attempts() {
        let limiter = limiter();
        for _ in 0..limiter.config().max_attempts {
            limiter.is_allowed("maya@example.com").await;
        }

        limiter.reset("maya@example.com").await;
        assert!(limiter.is_allowed("maya@example.com").await);
    }

    #[tokio::test]
    async fn test_expired_entries_are_swept() {
        let limiter = limiter();
        let start = Instant::now();
        for i in 0..10_000 {
            limiter.check_at(&format!("user{}@example.com", i), start).await;
        }
        for _ in 0..6 {
            limiter.check_at("banned@example.com", start).await;
        }
        assert_eq!(limiter.state.lock().await.entries.len(), 10_001);

        // Past every window but inside the ban
        let later = start + Duration::from_secs(1800);
        limiter.check_at("fresh@example.com", later).await;

        {
            let state = limiter.state.lock().await;
            assert_eq!(state.entries.len(), 2);
            assert!(state.entries.contains_key("banned@example.com"));
            assert!(state.entries.contains_key("fresh@example.com"));
        }

        // The ban has run out too
        let much_later = start + Duration::from_secs(7200);
        limiter.check_at("last@example.com", much_later).await;
        assert_eq!(limiter.state.lock().await.entries.len(), 1);
    }

    #[tokio::test]
    async fn test_window_and_ban_expire() {
        let limiter = limiter();
        let start = Instant::now();
        for _ in 0..5 {
            assert!(limiter.check_at("maya@example.com", start).await);
        }

        let after_window = start + Duration::from_secs(301);
        assert!(limiter.check_at("maya@example.com", after_window).await);

        for _ in 0..4 {
            limiter.check_at("maya@example.com", after_window).await;
        }
        assert!(!limiter.check_at("maya@example.com", after_window).await);

        let during_ban = after_window + Duration::from_secs(1800);
        assert!(!limiter.check_at("maya@example.com", during_ban).await);

        let after_ban = after_window + Duration::from_secs(3601);
        assert!(limiter.check_at("maya@example.com", after_ban).await);
    }
}
