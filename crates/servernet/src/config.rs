use std::str::FromStr;
use std::time::Duration;

use crate::action::ActionWait;
use crate::retry::{Backoff, RetryPolicy};
use crate::{Error, Result};

/// Upper bound for a single retry delay.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Tuning for convergence operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Settings {
    pub retry: RetryPolicy,
    pub action_wait: ActionWait,
}

impl Settings {
    /// Load from env vars, falling back to defaults:
    ///
    /// - `SERVERNET_MAX_ATTEMPTS` (default: `5`)
    /// - `SERVERNET_RETRY_BACKOFF_MS` (default: `1000`, doubled per attempt)
    /// - `SERVERNET_ACTION_POLL_MS` (default: `500`)
    /// - `SERVERNET_ACTION_TIMEOUT_SECS` (default: `600`)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let max_attempts =
            env_parse("SERVERNET_MAX_ATTEMPTS")?.unwrap_or(defaults.retry.max_attempts);
        let backoff = match env_parse::<u64>("SERVERNET_RETRY_BACKOFF_MS")? {
            Some(0) => Backoff::None,
            Some(ms) => Backoff::Exponential {
                base: Duration::from_millis(ms),
                max: MAX_RETRY_DELAY,
            },
            None => defaults.retry.backoff,
        };

        let poll_interval = env_parse("SERVERNET_ACTION_POLL_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.action_wait.poll_interval);
        let timeout = env_parse("SERVERNET_ACTION_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.action_wait.timeout);

        Ok(Self {
            retry: RetryPolicy::new(max_attempts, backoff),
            action_wait: ActionWait {
                poll_interval,
                timeout,
            },
        })
    }

    /// No backoff and fast action polling, for tests.
    pub fn immediate() -> Self {
        Self {
            retry: RetryPolicy::new(5, Backoff::None),
            action_wait: ActionWait {
                poll_interval: Duration::from_millis(1),
                timeout: Duration::from_secs(5),
            },
        }
    }
}

fn env_parse<T: FromStr>(name: &'static str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::InvalidEnv { name, value }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = Settings::default();
        assert_eq!(settings.retry.max_attempts, 5);
        assert_eq!(settings.action_wait.poll_interval, Duration::from_millis(500));
        assert_eq!(settings.action_wait.timeout, Duration::from_secs(600));
    }

    #[test]
    fn env_overrides() {
        // Only this test touches these variables.
        unsafe {
            std::env::set_var("SERVERNET_MAX_ATTEMPTS", "3");
            std::env::set_var("SERVERNET_RETRY_BACKOFF_MS", "250");
            std::env::set_var("SERVERNET_ACTION_POLL_MS", "50");
            std::env::set_var("SERVERNET_ACTION_TIMEOUT_SECS", "90");
        }
        let settings = Settings::from_env();
        unsafe {
            std::env::remove_var("SERVERNET_MAX_ATTEMPTS");
            std::env::remove_var("SERVERNET_RETRY_BACKOFF_MS");
            std::env::remove_var("SERVERNET_ACTION_POLL_MS");
            std::env::remove_var("SERVERNET_ACTION_TIMEOUT_SECS");
        }

        let settings = settings.unwrap();
        assert_eq!(settings.retry.max_attempts, 3);
        assert_eq!(
            settings.retry.backoff,
            Backoff::Exponential {
                base: Duration::from_millis(250),
                max: MAX_RETRY_DELAY,
            }
        );
        assert_eq!(settings.action_wait.poll_interval, Duration::from_millis(50));
        assert_eq!(settings.action_wait.timeout, Duration::from_secs(90));
    }

    #[test]
    fn unparsable_env_value_is_an_error() {
        // Only this test touches this variable.
        unsafe { std::env::set_var("SERVERNET_TEST_ONLY_U32", "many") };
        let err = env_parse::<u32>("SERVERNET_TEST_ONLY_U32").unwrap_err();
        assert!(matches!(err, Error::InvalidEnv { .. }));
        unsafe { std::env::remove_var("SERVERNET_TEST_ONLY_U32") };
    }
}
