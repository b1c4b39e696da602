//! `deviceid` - device-ID resolution for a marketing-cloud SDK
//!
//! The SDK can report the device identifier two ways: a one-shot direct query
//! and a `ReceivedDeviceId` broadcast event. Neither is reliable on its own, so
//! [`DeviceIdResolver`] races both against a deadline, keeps the first valid
//! value, and stores the outcome in a [`ResolutionSlot`]. Consumers read it
//! through a [`DeviceIdAccessor`].
//!
//! ```rust,ignore
//! let resolver = DeviceIdResolver::new(sdk.clone(), sdk.clone(), TracingNotifier);
//! resolver.initialize();
//!
//! let device_id = resolver.accessor().device_id().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod accessor;
pub mod config;
pub mod errors;
pub mod notify;
pub mod resolver;
pub mod state;
pub mod subscription;
pub mod types;

pub use accessor::DeviceIdAccessor;
pub use config::{ReinitializePolicy, ResolverConfig, SubscriptionTimeoutMs};
pub use errors::{ConfigError, ResolutionError, ResolutionResult, StrategyError};
pub use notify::{Notification, Notifier, Severity, TracingNotifier};
pub use resolver::{CallbackDirectQuery, DeviceIdResolver, DirectQuery};
pub use state::{AttemptId, AttemptStatus, ResolutionHandle, ResolutionSlot};
pub use subscription::{EventSource, EventSubscription};
pub use types::{BroadcastEvent, BroadcastEventKind, DeviceId};
