// events.rs
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use std::convert::TryFrom;

use crate::driver::DeviceId;

/// One three-axis reading (rotation or translation), in driver units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl From<[f32; 3]> for Vec3 {
    fn from(v: [f32; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

/// Kind of a device-change notification, as the driver encodes it on the
/// wire. Codes outside the known set map to [`DeviceChangeKind::Unknown`].
#[repr(i32)]
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    IntoPrimitive,
    TryFromPrimitive,
    Serialize_repr,
    Deserialize_repr,
)]
pub enum DeviceChangeKind {
    Connected = 0,
    Disconnected = 1,
    Unknown = -1,
}

impl DeviceChangeKind {
    pub fn from_raw(raw: i32) -> Self {
        Self::try_from(raw).unwrap_or(Self::Unknown)
    }
}

/// Untranslated driver event, as produced by [`crate::Driver::translate`].
///
/// Consumed exactly once by the owning device's `update`: each value becomes
/// one typed [`DeviceEvent`], except `Command`, which is logged and dropped.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum RawDriverEvent {
    Motion {
        rotation: Vec3,
        translation: Vec3,
        period_ms: i64,
    },
    /// The cap returned to rest. Surfaces as a motion event with zeroed axes.
    Zero { period_ms: i64 },
    ButtonDown { button: u32 },
    ButtonUp { button: u32 },
    DeviceChange { kind: i32, device: DeviceId },
    /// Driver-internal command traffic; not handled.
    Command { code: u32 },
}

/// Typed, device-tagged event delivered to subscribers.
///
/// Every variant carries the id of the device whose `update` emitted it.
/// `DeviceChange::affected` is the unit the driver reports the change for,
/// which need not be the device that received the notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceEvent {
    Motion {
        device: DeviceId,
        rotation: Vec3,
        translation: Vec3,
        /// Milliseconds since the previous motion event.
        period_ms: i64,
    },
    ButtonDown {
        device: DeviceId,
        button: u32,
        name: String,
    },
    ButtonUp {
        device: DeviceId,
        button: u32,
        name: String,
    },
    DeviceChange {
        device: DeviceId,
        #[serde(rename = "change_kind")]
        kind: DeviceChangeKind,
        affected: DeviceId,
    },
}

impl DeviceEvent {
    /// Id of the device this event was emitted for.
    pub fn device(&self) -> DeviceId {
        match self {
            DeviceEvent::Motion { device, .. }
            | DeviceEvent::ButtonDown { device, .. }
            | DeviceEvent::ButtonUp { device, .. }
            | DeviceEvent::DeviceChange { device, .. } => *device,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_kind_from_raw_maps_known_codes() {
        assert_eq!(DeviceChangeKind::from_raw(0), DeviceChangeKind::Connected);
        assert_eq!(
            DeviceChangeKind::from_raw(1),
            DeviceChangeKind::Disconnected
        );
    }

    #[test]
    fn change_kind_from_raw_tolerates_unknown_codes() {
        assert_eq!(DeviceChangeKind::from_raw(42), DeviceChangeKind::Unknown);
        assert_eq!(DeviceChangeKind::from_raw(-7), DeviceChangeKind::Unknown);
    }

    #[test]
    fn device_event_is_tagged_for_recording() {
        let ev = DeviceEvent::ButtonDown {
            device: 7,
            button: 2,
            name: "Fit".into(),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["kind"], "button_down");
        assert_eq!(json["device"], 7);
        assert_eq!(ev.device(), 7);
    }

    #[test]
    fn change_kind_serializes_as_wire_integer() {
        let json = serde_json::to_value(DeviceChangeKind::Disconnected).unwrap();
        assert_eq!(json, 1);
    }
}
