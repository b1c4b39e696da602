//! Resolver configuration with type-safe validation.
//!
//! The deadline is a `nutype` so an unusable timeout (zero, or long enough to
//! look like a hang) cannot be constructed. Settings can be loaded from the
//! environment, unset variables keep their defaults.

use crate::errors::ConfigError;
use nutype::nutype;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable holding the event-wait deadline in milliseconds.
pub const TIMEOUT_ENV: &str = "DEVICEID_SUBSCRIPTION_TIMEOUT_MS";
/// Environment variable holding the re-initialize policy (`join` or `restart`).
pub const REINITIALIZE_ENV: &str = "DEVICEID_REINITIALIZE";
/// Environment variable enabling per-strategy notifications.
pub const NOTIFY_STRATEGY_EVENTS_ENV: &str = "DEVICEID_NOTIFY_STRATEGY_EVENTS";

/// How long the event wait may take, in milliseconds.
///
/// Validated to be between 1ms and 1 hour. Defaults to 65 seconds, long
/// enough for the SDK's first registration round-trip on a cold start.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 3_600_000),
    default = 65_000,
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Into,
        Default,
        Serialize,
        Deserialize
    )
)]
pub struct SubscriptionTimeoutMs(u64);

impl SubscriptionTimeoutMs {
    /// Convert to Duration for use with `tokio::time::timeout_at`.
    pub fn as_duration(self) -> Duration {
        Duration::from_millis(self.into())
    }
}

/// What `initialize()` does when the slot already holds an attempt.
///
/// A succeeded attempt is never replaced under either policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReinitializePolicy {
    /// Hand back a pending attempt instead of starting a second race.
    /// Failed or abandoned attempts are replaced by a fresh one.
    #[default]
    JoinInFlight,
    /// Start a fresh race whenever the current attempt has not succeeded,
    /// replacing a pending one. Callers already awaiting the old handle
    /// still see its outcome.
    Restart,
}

impl std::str::FromStr for ReinitializePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "join" | "join_in_flight" => Ok(Self::JoinInFlight),
            "restart" => Ok(Self::Restart),
            _ => Err(ConfigError::InvalidPolicy(s.to_string())),
        }
    }
}

/// Configuration for [`DeviceIdResolver`](crate::DeviceIdResolver).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Deadline for the event wait, measured from subscribing.
    pub subscription_timeout: SubscriptionTimeoutMs,
    /// Behaviour of repeated `initialize()` calls.
    pub reinitialize: ReinitializePolicy,
    /// Surface individual strategy outcomes as informational notifications.
    ///
    /// Every `ReceivedDeviceId` event seen during the race is reported, even
    /// one without a usable ID.
    pub notify_strategy_events: bool,
}

impl ResolverConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(TIMEOUT_ENV) {
            let millis = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidTimeout(raw.clone()))?;
            config.subscription_timeout = SubscriptionTimeoutMs::try_new(millis)
                .map_err(|_| ConfigError::InvalidTimeout(raw.clone()))?;
        }

        if let Some(raw) = lookup(REINITIALIZE_ENV) {
            config.reinitialize = raw.parse()?;
        }

        if let Some(raw) = lookup(NOTIFY_STRATEGY_EVENTS_ENV) {
            config.notify_strategy_events = match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => {
                    return Err(ConfigError::InvalidFlag {
                        name: NOTIFY_STRATEGY_EVENTS_ENV,
                        value: raw,
                    })
                }
            };
        }

        Ok(config)
    }

    /// Set a custom event-wait deadline.
    #[must_use]
    pub const fn with_subscription_timeout(mut self, timeout: SubscriptionTimeoutMs) -> Self {
        self.subscription_timeout = timeout;
        self
    }

    /// Set the re-initialize policy.
    #[must_use]
    pub const fn with_reinitialize(mut self, policy: ReinitializePolicy) -> Self {
        self.reinitialize = policy;
        self
    }

    /// Enable or disable per-strategy notifications.
    #[must_use]
    pub const fn with_strategy_notifications(mut self, enabled: bool) -> Self {
        self.notify_strategy_events = enabled;
        self
    }
}
