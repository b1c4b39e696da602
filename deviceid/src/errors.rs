//! Error types for device-ID resolution.
//!
//! Failures are split by who can observe them:
//!
//! - **StrategyError**: one acquisition strategy gave up. Swallowed while the
//!   other strategy is still pending, carried inside `ResolutionFailed` once
//!   both have given up.
//! - **ResolutionError**: what callers of the accessor see.
//! - **ConfigError**: invalid resolver configuration.
//!
//! All outcome errors are `Clone` because one settled outcome is handed to
//! every caller awaiting the same attempt.
//!
//! # Example Usage
//!
//! ```rust,ignore
//! match accessor.device_id().await {
//!     Ok(device_id) => render(device_id),
//!     Err(ResolutionError::NotInitialized) => {
//!         // Resolution was never started, call `initialize()` first
//!     }
//!     Err(err @ ResolutionError::ResolutionFailed { .. }) => {
//!         // Both strategies failed; re-invoke `initialize()` to try again
//!         warn!(%err, "device ID unavailable");
//!     }
//!     Err(err) => return Err(err.into()),
//! }
//! ```

use std::time::Duration;
use thiserror::Error;

/// Failure of a single acquisition strategy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrategyError {
    /// The direct SDK query answered with an empty identifier.
    #[error("direct device ID query returned an empty value")]
    EmptyDirectResult,

    /// No qualifying `ReceivedDeviceId` event arrived before the deadline.
    #[error("no device ID event received within {0:?}")]
    SubscriptionTimeout(Duration),
}

/// Errors observable by callers waiting for the device ID.
///
/// # Error Handling Strategy
///
/// - **NotInitialized**: caller bug, initialization has to be triggered first
/// - **ResolutionFailed**: both strategies failed; there is no automatic retry,
///   the caller decides whether to initialize again
/// - **Abandoned**: the runtime stopped the resolution task, usually during shutdown
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// The device ID was requested before any resolution attempt was started.
    #[error("device ID resolution has not been initialized")]
    NotInitialized,

    /// Every strategy failed.
    #[error("device ID resolution failed: {direct}; {event_wait}")]
    ResolutionFailed {
        /// Why the direct query did not produce an identifier.
        direct: StrategyError,
        /// Why the event wait did not produce an identifier.
        event_wait: StrategyError,
    },

    /// The resolution task ended without settling.
    #[error("device ID resolution stopped before settling")]
    Abandoned,
}

/// Errors raised while building a resolver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The subscription timeout was not a number within the accepted range.
    #[error("invalid subscription timeout '{0}': expected 1..=3600000 milliseconds")]
    InvalidTimeout(String),

    /// The re-initialize policy name is unknown.
    #[error("invalid re-initialize policy '{0}': expected 'join' or 'restart'")]
    InvalidPolicy(String),

    /// A boolean flag could not be parsed.
    #[error("invalid value '{value}' for {name}: expected 'true' or 'false'")]
    InvalidFlag {
        /// Name of the setting.
        name: &'static str,
        /// The rejected value.
        value: String,
    },
}

/// Type alias for resolution results.
pub type ResolutionResult<T> = Result<T, ResolutionError>;
