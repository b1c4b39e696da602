//! Core types for device-ID resolution.
//!
//! `DeviceId` uses a smart constructor so an empty identifier can never be
//! observed past the SDK boundary. Broadcast events keep their payload as raw
//! JSON because the SDK does not guarantee the shape of `data`.

use nutype::nutype;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier the marketing-cloud backend assigns to this device/installation.
///
/// `DeviceId` values are guaranteed to be non-empty. The value is opaque, so
/// no trimming or other normalization is applied.
#[nutype(
    validate(not_empty),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct DeviceId(String);

/// Kinds of broadcast events emitted by the marketing-cloud SDK.
///
/// Serialized with the SDK's wire names. Only [`BroadcastEventKind::ReceivedDeviceId`]
/// is consumed by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BroadcastEventKind {
    /// A button was clicked.
    ButtonClicked,
    /// An in-app message has been received.
    ReceivedInAppMessage,
    /// A notification will be displayed.
    WillDisplayNotification,
    /// A notification will be dismissed.
    WillDismissNotification,
    /// A device id has been received.
    ReceivedDeviceId,
    /// A GCM token has been received.
    #[serde(rename = "ReceivedGCMToken")]
    ReceivedGcmToken,
    /// A remote notification has been received.
    ReceivedRemoteNotification,
    /// A universal link was executed.
    UniversalLinkExecuted,
    /// A custom event has been triggered.
    TriggeredCustomEvent,
    /// An in-app message is about to be displayed by a custom UI.
    DisplayingInAppMessage,
}

impl BroadcastEventKind {
    /// The SDK's wire name for this kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ButtonClicked => "ButtonClicked",
            Self::ReceivedInAppMessage => "ReceivedInAppMessage",
            Self::WillDisplayNotification => "WillDisplayNotification",
            Self::WillDismissNotification => "WillDismissNotification",
            Self::ReceivedDeviceId => "ReceivedDeviceId",
            Self::ReceivedGcmToken => "ReceivedGCMToken",
            Self::ReceivedRemoteNotification => "ReceivedRemoteNotification",
            Self::UniversalLinkExecuted => "UniversalLinkExecuted",
            Self::TriggeredCustomEvent => "TriggeredCustomEvent",
            Self::DisplayingInAppMessage => "DisplayingInAppMessage",
        }
    }
}

impl std::fmt::Display for BroadcastEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A broadcast event as delivered by the SDK.
///
/// ```json
/// { "broadcastEventType": "ReceivedDeviceId", "data": { "deviceId": "abc123" } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastEvent {
    /// What kind of event this is.
    pub broadcast_event_type: BroadcastEventKind,
    /// Event payload, shape depends on the kind.
    #[serde(default)]
    pub data: Value,
}

impl BroadcastEvent {
    /// Creates an event of the given kind with an arbitrary payload.
    pub const fn new(kind: BroadcastEventKind, data: Value) -> Self {
        Self {
            broadcast_event_type: kind,
            data,
        }
    }

    /// Creates a `ReceivedDeviceId` event carrying `device_id` as its payload.
    pub fn received_device_id(device_id: impl Into<String>) -> Self {
        Self::new(
            BroadcastEventKind::ReceivedDeviceId,
            serde_json::json!({ "deviceId": device_id.into() }),
        )
    }

    /// The kind of this event.
    pub const fn kind(&self) -> BroadcastEventKind {
        self.broadcast_event_type
    }

    /// Extracts a usable device ID from `data.deviceId`.
    ///
    /// Only a non-empty JSON string qualifies. Missing fields, `null`,
    /// numbers, objects and arrays all yield `None`.
    pub fn device_id(&self) -> Option<DeviceId> {
        self.data
            .get("deviceId")
            .and_then(Value::as_str)
            .and_then(|raw| DeviceId::try_new(raw).ok())
    }
}
