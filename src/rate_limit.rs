use std::collections::HashMap;
use std::sync::Mutex;
use tokio::time::{Duration, Instant};

use crate::config::RateLimitConfig as RateLimitSettings;
use crate::protocol::PlayerId;

/// Runtime rate limiting configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Inbound messages accepted per connection per window.
    pub max_messages: u32,
    /// Window over which all counters accumulate.
    pub time_window: Duration,
    /// Room creations allowed per player per window.
    pub max_room_creations: u32,
    /// Join attempts allowed per player per window (creations count too).
    pub max_join_attempts: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_messages: 30,
            time_window: Duration::from_secs(10),
            max_room_creations: 5,
            max_join_attempts: 20,
        }
    }
}

impl From<&RateLimitSettings> for RateLimitConfig {
    fn from(settings: &RateLimitSettings) -> Self {
        Self {
            max_messages: settings.max_messages_per_window,
            time_window: Duration::from_millis(settings.window_ms),
            max_room_creations: settings.max_room_creations,
            max_join_attempts: settings.max_join_attempts,
        }
    }
}

#[derive(Debug, Clone)]
struct WindowEntry {
    messages: u32,
    room_creations: u32,
    join_attempts: u32,
    window_start: Instant,
}

impl WindowEntry {
    fn new() -> Self {
        Self {
            messages: 0,
            room_creations: 0,
            join_attempts: 0,
            window_start: Instant::now(),
        }
    }

    fn maybe_reset(&mut self, config: &RateLimitConfig) {
        if self.window_start.elapsed() >= config.time_window {
            self.messages = 0;
            self.room_creations = 0;
            self.join_attempts = 0;
            self.window_start = Instant::now();
        }
    }

    fn retry_after(&self, config: &RateLimitConfig) -> Duration {
        config.time_window.saturating_sub(self.window_start.elapsed())
    }
}

/// Rate limiting errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum RateLimitError {
    #[error("Message rate limit exceeded. Try again in {} seconds.", retry_after.as_secs())]
    MessageLimitExceeded { retry_after: Duration },
    #[error("Room creation rate limit exceeded. Try again in {} seconds.", retry_after.as_secs())]
    RoomCreationLimitExceeded { retry_after: Duration },
    #[error("Join attempt rate limit exceeded. Try again in {} seconds.", retry_after.as_secs())]
    JoinLimitExceeded { retry_after: Duration },
}

/// Sliding-window limiter keyed by stable player id. Tracks inbound
/// message volume plus the room-operation budgets.
pub struct SessionRateLimiter {
    config: RateLimitConfig,
    entries: Mutex<HashMap<PlayerId, WindowEntry>>,
}

impl SessionRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Account one inbound message for the player.
    pub fn check_message(&self, player_id: &PlayerId) -> Result<(), RateLimitError> {
        self.with_entry(player_id, |entry, config| {
            if entry.messages < config.max_messages {
                entry.messages += 1;
                Ok(())
            } else {
                Err(RateLimitError::MessageLimitExceeded {
                    retry_after: entry.retry_after(config),
                })
            }
        })
    }

    /// Account a room creation (which also counts as a join attempt).
    pub fn check_room_creation(&self, player_id: &PlayerId) -> Result<(), RateLimitError> {
        self.with_entry(player_id, |entry, config| {
            if entry.room_creations < config.max_room_creations {
                entry.room_creations += 1;
                entry.join_attempts += 1;
                Ok(())
            } else {
                Err(RateLimitError::RoomCreationLimitExceeded {
                    retry_after: entry.retry_after(config),
                })
            }
        })
    }

    /// Account a join attempt.
    pub fn check_join_attempt(&self, player_id: &PlayerId) -> Result<(), RateLimitError> {
        self.with_entry(player_id, |entry, config| {
            if entry.join_attempts < config.max_join_attempts {
                entry.join_attempts += 1;
                Ok(())
            } else {
                Err(RateLimitError::JoinLimitExceeded {
                    retry_after: entry.retry_after(config),
                })
            }
        })
    }

    /// Drop entries idle for more than two windows.
    pub fn cleanup_old_entries(&self) {
        let threshold = self.config.time_window * 2;
        let now = Instant::now();
        self.lock()
            .retain(|_, entry| now.duration_since(entry.window_start) < threshold);
    }

    /// Start a background task that periodically drops idle entries.
    pub fn start_cleanup_task(self: &std::sync::Arc<Self>) {
        let limiter = std::sync::Arc::downgrade(self);
        let period = self.config.time_window;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let Some(limiter) = limiter.upgrade() else {
                    return;
                };
                limiter.cleanup_old_entries();
            }
        });
    }

    /// Forget a player entirely (session closed).
    pub fn forget(&self, player_id: &PlayerId) {
        self.lock().remove(player_id);
    }

    fn with_entry(
        &self,
        player_id: &PlayerId,
        f: impl FnOnce(&mut WindowEntry, &RateLimitConfig) -> Result<(), RateLimitError>,
    ) -> Result<(), RateLimitError> {
        let mut entries = self.lock();
        let entry = entries
            .entry(player_id.clone())
            .or_insert_with(WindowEntry::new);
        entry.maybe_reset(&self.config);
        f(entry, &self.config)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PlayerId, WindowEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> RateLimitConfig {
        RateLimitConfig {
            max_messages: 3,
            time_window: Duration::from_millis(100),
            max_room_creations: 2,
            max_join_attempts: 3,
        }
    }

    #[tokio::test]
    async fn test_message_rate_limit() {
        let limiter = SessionRateLimiter::new(create_test_config());
        let player = "p1".to_string();

        assert!(limiter.check_message(&player).is_ok());
        assert!(limiter.check_message(&player).is_ok());
        assert!(limiter.check_message(&player).is_ok());
        assert!(limiter.check_message(&player).is_err());

        // Window reset restores the budget.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(limiter.check_message(&player).is_ok());
    }

    #[test]
    fn test_room_creation_rate_limit() {
        let limiter = SessionRateLimiter::new(create_test_config());
        let player = "p1".to_string();

        assert!(limiter.check_room_creation(&player).is_ok());
        assert!(limiter.check_room_creation(&player).is_ok());
        assert!(limiter.check_room_creation(&player).is_err());
    }

    #[test]
    fn test_room_creation_counts_as_join_attempt() {
        let limiter = SessionRateLimiter::new(create_test_config());
        let player = "p1".to_string();

        assert!(limiter.check_room_creation(&player).is_ok());
        assert!(limiter.check_room_creation(&player).is_ok());
        // One join attempt left out of three.
        assert!(limiter.check_join_attempt(&player).is_ok());
        assert!(limiter.check_join_attempt(&player).is_err());
    }

    #[test]
    fn test_different_players_independent_limits() {
        let limiter = SessionRateLimiter::new(create_test_config());
        let one = "p1".to_string();
        let two = "p2".to_string();

        assert!(limiter.check_room_creation(&one).is_ok());
        assert!(limiter.check_room_creation(&one).is_ok());
        assert!(limiter.check_room_creation(&one).is_err());

        assert!(limiter.check_room_creation(&two).is_ok());
    }

    #[tokio::test]
    async fn test_cleanup_old_entries() {
        let limiter = SessionRateLimiter::new(create_test_config());
        let player = "p1".to_string();

        let _ = limiter.check_message(&player);
        assert_eq!(limiter.lock().len(), 1);

        tokio::time::sleep(Duration::from_millis(250)).await;
        limiter.cleanup_old_entries();
        assert!(limiter.lock().is_empty());
    }
}
