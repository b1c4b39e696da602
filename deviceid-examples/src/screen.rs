use deviceid::{DeviceId, DeviceIdAccessor, ResolutionError, ResolutionResult};
use std::fmt;

const LABEL: &str = "Retrieved device ID:: ";

/// What the device-ID screen currently shows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeviceIdScreen {
    /// Resolution has not settled yet.
    #[default]
    Loading,
    /// Resolution produced an identifier.
    Resolved(DeviceId),
    /// Resolution failed or was never started.
    Failed(ResolutionError),
}

impl DeviceIdScreen {
    /// Waits for `accessor` to settle and builds the matching screen.
    pub async fn load(accessor: &DeviceIdAccessor) -> Self {
        Self::from(accessor.device_id().await)
    }

    /// Builds the screen from whatever is known right now.
    pub fn snapshot(accessor: &DeviceIdAccessor) -> Self {
        accessor.try_device_id().map_or(Self::Loading, Self::from)
    }

    /// The text line shown to the user.
    ///
    /// The identifier part stays empty until resolution succeeds.
    pub fn render(&self) -> String {
        match self {
            Self::Resolved(device_id) => format!("{LABEL}{device_id}"),
            Self::Loading | Self::Failed(_) => LABEL.to_string(),
        }
    }
}

impl From<ResolutionResult<DeviceId>> for DeviceIdScreen {
    fn from(outcome: ResolutionResult<DeviceId>) -> Self {
        match outcome {
            Ok(device_id) => Self::Resolved(device_id),
            Err(err) => Self::Failed(err),
        }
    }
}

impl fmt::Display for DeviceIdScreen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
