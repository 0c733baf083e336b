// manager.rs
use std::{
    collections::BTreeMap,
    sync::{
        Arc, Condvar, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::{
    device::{Device, DeviceStatus},
    driver::{DeviceId, Driver, DriverHandle, OsMessage, SurfaceHandle},
    error::{Error, Result},
    pump::{MessagePump, PumpWait},
};

/// The driver reports no button count up front; buttons are reassigned to
/// pass-through 0..MAX until the driver objects.
const MAX_BUTTONS: u32 = 32;

/// Tunables applied when the manager opens devices and runs its pump.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerOptions {
    /// Client name announced to the driver on open.
    pub client_name: String,
    /// Request exclusive capture on open. Denial is a warning, not fatal.
    pub exclusive_capture: bool,
    /// Reassign button actions to pass-through on open (best-effort).
    pub reassign_buttons: bool,
    /// How long the pump thread waits for a message before re-checking the
    /// shutdown flag.
    pub poll_interval_ms: u64,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            client_name: "spacemouse".into(),
            exclusive_capture: true,
            reassign_buttons: true,
            poll_interval_ms: 50,
        }
    }
}

/// Readiness state of the pump subsystem.
#[derive(Debug, Clone)]
enum PumpState {
    NotStarted,
    Starting,
    Ready,
    Failed(Error),
}

/// Manager-private record of one live registration. Exactly one exists per
/// open device id; mutated only under the registry lock.
struct Registration {
    handle: DriverHandle,
    status: DeviceStatus,
    name: String,
    port: String,
    device: Arc<Device>,
}

/// Everything shared between the pump thread, devices, and the public handle.
pub(crate) struct ManagerShared {
    driver: Arc<dyn Driver>,
    pump: Arc<dyn MessagePump>,
    opts: ManagerOptions,
    state: Mutex<PumpState>,
    ready: Condvar,
    surface: OnceCell<SurfaceHandle>,
    registry: Mutex<BTreeMap<DeviceId, Registration>>,
    quit: AtomicBool,
    driver_up: AtomicBool,
}

/// Owns the single pump thread and the registry of live devices.
///
/// One manager per process is the intended shape: the vendor driver requires
/// a single OS message loop bound to one hidden surface. The manager is an
/// explicitly constructed, explicitly dropped object — pass it (or devices
/// created from it) to whatever needs input; there is no implicit global.
///
/// Teardown closes every registered device, signals the pump thread, and
/// joins it before returning, so dispatch never races a dying registry.
pub struct DeviceManager {
    shared: Arc<ManagerShared>,
    pump_thread: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceManager {
    pub fn new(driver: Arc<dyn Driver>, pump: Arc<dyn MessagePump>) -> Self {
        Self::with_options(driver, pump, ManagerOptions::default())
    }

    pub fn with_options(
        driver: Arc<dyn Driver>,
        pump: Arc<dyn MessagePump>,
        opts: ManagerOptions,
    ) -> Self {
        Self {
            shared: Arc::new(ManagerShared {
                driver,
                pump,
                opts,
                state: Mutex::new(PumpState::NotStarted),
                ready: Condvar::new(),
                surface: OnceCell::new(),
                registry: Mutex::new(BTreeMap::new()),
                quit: AtomicBool::new(false),
                driver_up: AtomicBool::new(false),
            }),
            pump_thread: Mutex::new(None),
        }
    }

    pub fn builder(driver: Arc<dyn Driver>, pump: Arc<dyn MessagePump>) -> DeviceManagerBuilder {
        DeviceManagerBuilder::new(driver, pump)
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.shared.opts
    }

    /// Spawn the pump thread (first call only) and block until it reports
    /// ready. Idempotent: later calls just wait on readiness again.
    ///
    /// Driver global-init or surface-creation failure surfaces here and is
    /// fatal — no device can ever be created on this manager afterwards.
    pub fn start(&self) -> Result<()> {
        {
            let mut state = self.shared.lock_state();
            if matches!(*state, PumpState::NotStarted) {
                *state = PumpState::Starting;
                let shared = Arc::clone(&self.shared);
                match thread::Builder::new()
                    .name("spacemouse-pump".into())
                    .spawn(move || pump_main(shared))
                {
                    Ok(handle) => {
                        *self.pump_thread.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
                    }
                    Err(e) => {
                        let err = Error::Pump(crate::pump::PumpError(format!(
                            "could not spawn pump thread: {e}"
                        )));
                        *state = PumpState::Failed(err.clone());
                        self.shared.ready.notify_all();
                        return Err(err);
                    }
                }
            }
        }
        self.shared.wait_ready()
    }

    /// Open and register the device `id`, returning a shared handle.
    ///
    /// Blocks until the pump is ready. If `id` is already registered the
    /// existing handle is returned (no second open). On driver open failure
    /// a device with [`DeviceStatus::Error`] and empty identity is returned
    /// and nothing is registered — inspect the status rather than the error.
    pub fn create_device(&self, id: DeviceId) -> Result<Arc<Device>> {
        self.shared.create_device(id)
    }

    /// Close and deregister `id`. Idempotent: absent or already-closed ids
    /// are a silent no-op.
    pub fn close_device(&self, id: DeviceId) {
        self.shared.close_device(id);
    }

    /// Close every registered device. Used during teardown.
    pub fn close_all_devices(&self) {
        self.shared.close_all_devices();
    }

    /// Set the LED mask for a registered device. Driver-level failure is
    /// best-effort; an unregistered `id` is an error.
    pub fn set_device_led(&self, id: DeviceId, on: bool) -> Result<()> {
        self.shared.set_device_led(id, on)
    }

    /// Button label for a registered device; empty when the driver has none.
    pub fn device_button_name(&self, id: DeviceId, button: u32) -> Result<String> {
        self.shared.device_button_name(id, button)
    }

    /// Ids of currently attached units, per the driver (starting at 1;
    /// the reserved test device 0 is never included).
    /// Ids of devices the driver currently reports attached. Id 0 is the
    /// driver's internal test unit and is never listed.
    pub fn attached_device_ids(&self) -> Vec<DeviceId> {
        self.shared
            .driver
            .attached_device_ids()
            .into_iter()
            .filter(|&id| id != 0)
            .collect()
    }
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        self.shared.close_all_devices();
        self.shared.quit.store(true, Ordering::SeqCst);
        self.shared.pump.request_quit();
        let handle = self
            .pump_thread
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("pump thread panicked during shutdown");
            }
        }
        if self.shared.driver_up.load(Ordering::SeqCst) {
            self.shared.driver.global_shutdown();
        }
        debug!("device manager shut down");
    }
}

impl ManagerShared {
    fn lock_state(&self) -> MutexGuard<'_, PumpState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_registry(&self) -> MutexGuard<'_, BTreeMap<DeviceId, Registration>> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn fail(&self, err: Error) {
        *self.lock_state() = PumpState::Failed(err);
        self.ready.notify_all();
    }

    fn set_ready(&self) {
        *self.lock_state() = PumpState::Ready;
        self.ready.notify_all();
    }

    /// Block until the pump thread reports ready or failed.
    fn wait_ready(&self) -> Result<()> {
        let mut state = self.lock_state();
        loop {
            match &*state {
                PumpState::Ready => return Ok(()),
                PumpState::Failed(e) => return Err(e.clone()),
                PumpState::NotStarted => return Err(Error::NotStarted),
                PumpState::Starting => {
                    state = self.ready.wait(state).unwrap_or_else(|e| e.into_inner());
                }
            }
        }
    }

    fn create_device(self: &Arc<Self>, id: DeviceId) -> Result<Arc<Device>> {
        self.wait_ready()?;
        // set by the pump thread before it flips to ready
        let surface = *self.surface.get().ok_or(Error::NotStarted)?;

        let mut registry = self.lock_registry();
        if let Some(reg) = registry.get(&id) {
            debug!(device = id, "create_device: reusing already-open handle");
            return Ok(Arc::clone(&reg.device));
        }

        let opened = match self.driver.open(surface, id, &self.opts.client_name) {
            Ok(opened) => opened,
            Err(e) => {
                warn!(device = id, "device open failed: {e}");
                return Ok(Arc::new(Device::new(
                    id,
                    DeviceStatus::Error,
                    String::new(),
                    String::new(),
                    Arc::downgrade(self),
                )));
            }
        };

        if self.opts.exclusive_capture {
            if let Err(e) = self.driver.set_capture(opened.handle, true) {
                warn!(
                    device = id,
                    "could not establish an exclusive claim on {}: {e}", opened.name
                );
            }
        }

        if self.opts.reassign_buttons {
            for button in 0..MAX_BUTTONS {
                if let Err(e) = self.driver.reassign_button(opened.handle, button, true) {
                    warn!(device = id, button, "button reassignment stopped: {e}");
                    break;
                }
            }
        }

        let device = Arc::new(Device::new(
            id,
            DeviceStatus::Ok,
            opened.name.clone(),
            opened.port.clone(),
            Arc::downgrade(self),
        ));
        registry.insert(
            id,
            Registration {
                handle: opened.handle,
                status: DeviceStatus::Ok,
                name: opened.name,
                port: opened.port,
                device: Arc::clone(&device),
            },
        );
        info!(device = id, name = %device.name(), "device opened");
        Ok(device)
    }

    pub(crate) fn close_device(&self, id: DeviceId) {
        // Take the entry out under the lock but drop it outside: if the
        // registry held the last Arc to the device, its Drop re-enters
        // close_device and must find the entry gone, not the lock held.
        let taken = self.lock_registry().remove(&id);
        if let Some(mut reg) = taken {
            if reg.status == DeviceStatus::Ok {
                self.driver.close(reg.handle);
                reg.status = DeviceStatus::Uninitialized;
            }
            debug!(device = id, name = %reg.name, port = %reg.port, "device closed");
        }
    }

    fn close_all_devices(&self) {
        let taken = std::mem::take(&mut *self.lock_registry());
        for (id, mut reg) in taken {
            if reg.status == DeviceStatus::Ok {
                self.driver.close(reg.handle);
                reg.status = DeviceStatus::Uninitialized;
            }
            debug!(device = id, name = %reg.name, port = %reg.port, "device closed");
        }
    }

    pub(crate) fn set_device_led(&self, id: DeviceId, on: bool) -> Result<()> {
        let registry = self.lock_registry();
        let reg = registry.get(&id).ok_or(Error::DeviceNotFound(id))?;
        if let Err(e) = self.driver.set_leds(reg.handle, u32::from(on)) {
            // best-effort by contract
            debug!(device = id, on, "driver refused LED set: {e}");
        }
        Ok(())
    }

    pub(crate) fn device_button_name(&self, id: DeviceId, button: u32) -> Result<String> {
        let registry = self.lock_registry();
        let reg = registry.get(&id).ok_or(Error::DeviceNotFound(id))?;
        Ok(match self.driver.button_name(reg.handle, button) {
            Ok(name) => name,
            Err(e) => {
                debug!(device = id, button, "no button name: {e}");
                String::new()
            }
        })
    }

    /// Pump-thread dispatch: translate the message against each registration
    /// in id order; the first device claiming it gets the event and later
    /// ones are never checked. Unclaimed messages fall back to the OS.
    fn dispatch(&self, msg: &OsMessage) {
        {
            let registry = self.lock_registry();
            for reg in registry.values() {
                if let Some(raw) = self.driver.translate(reg.handle, msg) {
                    reg.device.queue_event(raw);
                    return;
                }
            }
        }
        self.pump.dispatch_default(msg);
    }
}

fn pump_main(shared: Arc<ManagerShared>) {
    if let Err(e) = shared.driver.global_init() {
        error!("driver global init failed: {e}");
        shared.fail(Error::DriverInit(e));
        return;
    }
    shared.driver_up.store(true, Ordering::SeqCst);

    let surface = match shared.pump.create_surface() {
        Ok(surface) => surface,
        Err(e) => {
            error!("could not create message surface: {e}");
            shared.fail(Error::Pump(e));
            return;
        }
    };
    let _ = shared.surface.set(surface);
    shared.set_ready();
    info!("pump ready");

    let poll = Duration::from_millis(shared.opts.poll_interval_ms.max(1));
    loop {
        match shared.pump.next_message(poll) {
            PumpWait::Message(msg) => shared.dispatch(&msg),
            PumpWait::Idle => {
                if shared.quit.load(Ordering::SeqCst) {
                    break;
                }
            }
            PumpWait::Quit => break,
        }
    }
    debug!("pump thread exiting");
}

/// Builder over [`ManagerOptions`] for hosts that prefer chaining.
pub struct DeviceManagerBuilder {
    driver: Arc<dyn Driver>,
    pump: Arc<dyn MessagePump>,
    opts: ManagerOptions,
}

impl DeviceManagerBuilder {
    pub fn new(driver: Arc<dyn Driver>, pump: Arc<dyn MessagePump>) -> Self {
        Self {
            driver,
            pump,
            opts: ManagerOptions::default(),
        }
    }

    pub fn options(mut self, opts: ManagerOptions) -> Self {
        self.opts = opts;
        self
    }

    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.opts.client_name = name.into();
        self
    }

    pub fn exclusive_capture(mut self, on: bool) -> Self {
        self.opts.exclusive_capture = on;
        self
    }

    pub fn reassign_buttons(mut self, on: bool) -> Self {
        self.opts.reassign_buttons = on;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.opts.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn build(self) -> DeviceManager {
        DeviceManager::with_options(self.driver, self.pump, self.opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_default_round_trips_through_serde() {
        let opts = ManagerOptions::default();
        let json = serde_json::to_string(&opts).unwrap();
        let back: ManagerOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back.client_name, opts.client_name);
        assert_eq!(back.poll_interval_ms, opts.poll_interval_ms);
    }

    #[test]
    fn options_tolerate_partial_config() {
        let back: ManagerOptions = serde_json::from_str(r#"{"exclusive_capture":false}"#).unwrap();
        assert!(!back.exclusive_capture);
        assert!(back.reassign_buttons);
        assert_eq!(back.client_name, "spacemouse");
    }
}
