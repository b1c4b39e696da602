//! Read access to the resolved device ID.

use crate::errors::{ResolutionError, ResolutionResult};
use crate::state::ResolutionSlot;
use crate::types::DeviceId;

/// Reads the outcome of device-ID resolution.
///
/// Reading never starts resolution. Any number of accessors, cloned or
/// created from the same slot, observe the same settled outcome.
#[derive(Debug, Clone)]
pub struct DeviceIdAccessor {
    slot: ResolutionSlot,
}

impl DeviceIdAccessor {
    /// Creates an accessor over `slot`.
    pub const fn new(slot: ResolutionSlot) -> Self {
        Self { slot }
    }

    /// Returns the device ID, waiting for a pending attempt to settle.
    ///
    /// Fails with [`ResolutionError::NotInitialized`] on the first poll, without
    /// suspending, when no attempt has been started. A failed attempt's error
    /// is returned as is.
    pub async fn device_id(&self) -> ResolutionResult<DeviceId> {
        let handle = self.slot.current().ok_or(ResolutionError::NotInitialized)?;
        handle.outcome().await
    }

    /// Returns the settled outcome without waiting.
    ///
    /// `None` while the attempt is pending; `NotInitialized` when there is no
    /// attempt at all.
    pub fn try_device_id(&self) -> Option<ResolutionResult<DeviceId>> {
        match self.slot.current() {
            Some(handle) => handle.peek(),
            None => Some(Err(ResolutionError::NotInitialized)),
        }
    }
}
