//! Store configuration.
//!
//! # Invariants
//! - At least one attempt is always made per repository request.

use std::time::Duration;

const DEFAULT_MAX_ATTEMPTS: u32 = 2;
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Retry policy applied by `PolicyStore` to repository requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Total attempts for a request whose failures are transient.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub retry_backoff: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

impl StoreConfig {
    /// Default attempts without sleeping between them.
    pub fn no_backoff() -> Self {
        Self {
            retry_backoff: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::StoreConfig;
    use std::time::Duration;

    #[test]
    fn defaults_allow_one_retry() {
        let config = StoreConfig::default();
        assert_eq!(config.attempts(), 2);
        assert_eq!(config.retry_backoff, Duration::from_millis(50));
        assert_eq!(StoreConfig::no_backoff().retry_backoff, Duration::ZERO);
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let config = StoreConfig {
            max_attempts: 0,
            ..StoreConfig::default()
        };
        assert_eq!(config.attempts(), 1);
    }
}
