// device.rs
use std::sync::{
    Weak,
    atomic::{AtomicBool, Ordering},
};

use tracing::debug;

use crate::{
    driver::DeviceId,
    events::{DeviceChangeKind, DeviceEvent, RawDriverEvent, Vec3},
    manager::ManagerShared,
    queue::EventQueue,
    signal::Signal,
};

/// Outcome of the one open attempt made for a device. Fixed at creation;
/// a failed open never retries on the same object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Uninitialized,
    Error,
    Ok,
}

/// One logical 3D-mouse, as handed out by [`crate::DeviceManager::create_device`].
///
/// The manager's pump thread feeds the private queue; the application drains
/// it by calling [`Device::update`] at its own cadence, which converts each
/// raw event and broadcasts it on the matching signal, on the calling thread,
/// in arrival order.
pub struct Device {
    id: DeviceId,
    status: DeviceStatus,
    name: String,
    port: String,
    // toggled only, never read back from the driver; the cache is the
    // source of truth
    led_on: AtomicBool,
    queue: EventQueue,
    motion: Signal<DeviceEvent>,
    button_down: Signal<DeviceEvent>,
    button_up: Signal<DeviceEvent>,
    device_change: Signal<DeviceEvent>,
    manager: Weak<ManagerShared>,
}

impl Device {
    pub(crate) fn new(
        id: DeviceId,
        status: DeviceStatus,
        name: String,
        port: String,
        manager: Weak<ManagerShared>,
    ) -> Self {
        Self {
            id,
            status,
            name,
            port,
            led_on: AtomicBool::new(true),
            queue: EventQueue::new(),
            motion: Signal::new(),
            button_down: Signal::new(),
            button_up: Signal::new(),
            device_change: Signal::new(),
            manager,
        }
    }

    // ---- accessors -------------------------------------------------------

    pub fn device_id(&self) -> DeviceId {
        self.id
    }

    pub fn status(&self) -> DeviceStatus {
        self.status
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn led(&self) -> bool {
        self.led_on.load(Ordering::Acquire)
    }

    // ---- subscription points ---------------------------------------------

    pub fn motion(&self) -> &Signal<DeviceEvent> {
        &self.motion
    }

    pub fn button_down(&self) -> &Signal<DeviceEvent> {
        &self.button_down
    }

    pub fn button_up(&self) -> &Signal<DeviceEvent> {
        &self.button_up
    }

    pub fn device_change(&self) -> &Signal<DeviceEvent> {
        &self.device_change
    }

    // ---- draining ----------------------------------------------------------

    /// Drain the queue to empty, broadcasting one typed event per raw event
    /// on the calling thread. No-op when nothing is queued.
    pub fn update(&self) {
        while let Some(raw) = self.queue.try_pop() {
            self.dispatch(raw);
        }
    }

    fn dispatch(&self, raw: RawDriverEvent) {
        match raw {
            RawDriverEvent::Motion {
                rotation,
                translation,
                period_ms,
            } => self.motion.emit(&DeviceEvent::Motion {
                device: self.id,
                rotation,
                translation,
                period_ms,
            }),
            RawDriverEvent::Zero { period_ms } => self.motion.emit(&DeviceEvent::Motion {
                device: self.id,
                rotation: Vec3::ZERO,
                translation: Vec3::ZERO,
                period_ms,
            }),
            RawDriverEvent::ButtonDown { button } => {
                self.button_down.emit(&DeviceEvent::ButtonDown {
                    device: self.id,
                    button,
                    name: self.lookup_button_name(button),
                })
            }
            RawDriverEvent::ButtonUp { button } => self.button_up.emit(&DeviceEvent::ButtonUp {
                device: self.id,
                button,
                name: self.lookup_button_name(button),
            }),
            RawDriverEvent::DeviceChange { kind, device } => {
                self.device_change.emit(&DeviceEvent::DeviceChange {
                    device: self.id,
                    kind: DeviceChangeKind::from_raw(kind),
                    affected: device,
                })
            }
            RawDriverEvent::Command { code } => {
                debug!(device = self.id, code, "driver command event not handled");
            }
        }
    }

    fn lookup_button_name(&self, button: u32) -> String {
        match self.manager.upgrade() {
            Some(mgr) => mgr.device_button_name(self.id, button).unwrap_or_default(),
            None => String::new(),
        }
    }

    // ---- device-scoped ops -------------------------------------------------

    /// Toggle the device LED. De-duplicated against the cached state: calling
    /// with the state already cached issues no driver call. Best-effort —
    /// a driver-level failure is logged and otherwise ignored.
    pub fn set_led(&self, on: bool) {
        if self.led_on.swap(on, Ordering::AcqRel) == on {
            return;
        }
        if let Some(mgr) = self.manager.upgrade() {
            if let Err(e) = mgr.set_device_led(self.id, on) {
                debug!(device = self.id, on, "LED set skipped: {e}");
            }
        }
    }

    /// Called by the manager's dispatch path only. Never blocks.
    pub(crate) fn queue_event(&self, raw: RawDriverEvent) {
        self.queue.push(raw);
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        // By the time the last owner releases us the registry entry is
        // already gone or the manager is tearing down; close_device
        // tolerates both.
        if let Some(mgr) = self.manager.upgrade() {
            mgr.close_device(self.id);
        }
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("name", &self.name)
            .field("port", &self.port)
            .field("led", &self.led())
            .field("queued", &self.queue.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn orphan_device(status: DeviceStatus) -> Device {
        Device::new(
            9,
            status,
            "SpaceMouse Test".into(),
            "usb9".into(),
            Weak::new(),
        )
    }

    #[test]
    fn update_on_empty_queue_is_a_noop() {
        let dev = orphan_device(DeviceStatus::Ok);
        dev.update();
        dev.update();
        assert_eq!(dev.status(), DeviceStatus::Ok);
    }

    #[test]
    fn zero_event_surfaces_as_zeroed_motion() {
        let dev = orphan_device(DeviceStatus::Ok);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _keep = dev.motion().subscribe(move |ev: &DeviceEvent| {
            sink.lock().unwrap().push(ev.clone());
        });

        dev.queue_event(RawDriverEvent::Zero { period_ms: 16 });
        dev.update();

        let seen = seen.lock().unwrap();
        assert_eq!(
            seen.as_slice(),
            [DeviceEvent::Motion {
                device: 9,
                rotation: Vec3::ZERO,
                translation: Vec3::ZERO,
                period_ms: 16,
            }]
        );
    }

    #[test]
    fn command_events_are_dropped() {
        let dev = orphan_device(DeviceStatus::Ok);
        let hits = Arc::new(Mutex::new(0usize));
        for sig in [
            dev.motion(),
            dev.button_down(),
            dev.button_up(),
            dev.device_change(),
        ] {
            let hits = Arc::clone(&hits);
            let _ = sig.subscribe(move |_| {
                *hits.lock().unwrap() += 1;
            });
        }

        dev.queue_event(RawDriverEvent::Command { code: 3 });
        dev.update();
        assert_eq!(*hits.lock().unwrap(), 0);
    }

    #[test]
    fn button_name_is_empty_without_a_manager() {
        let dev = orphan_device(DeviceStatus::Ok);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _keep = dev.button_down().subscribe(move |ev: &DeviceEvent| {
            sink.lock().unwrap().push(ev.clone());
        });

        dev.queue_event(RawDriverEvent::ButtonDown { button: 4 });
        dev.update();

        assert_eq!(
            seen.lock().unwrap().as_slice(),
            [DeviceEvent::ButtonDown {
                device: 9,
                button: 4,
                name: String::new(),
            }]
        );
    }

    #[test]
    fn set_led_updates_cache_even_when_orphaned() {
        let dev = orphan_device(DeviceStatus::Error);
        assert!(dev.led());
        dev.set_led(false);
        assert!(!dev.led());
        dev.set_led(false);
        assert!(!dev.led());
    }
}
