// driver.rs
use thiserror::Error;

use crate::events::RawDriverEvent;

/// Driver-assigned identifier of one attached physical unit. Stable for the
/// session, unique among concurrently attached devices. Id `0` is reserved
/// for the driver's built-in test device and never appears in enumeration.
pub type DeviceId = i32;

/// Opaque session handle returned by [`Driver::open`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DriverHandle(pub u64);

/// Opaque handle of the hidden message-receiving surface the pump owns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceHandle(pub usize);

/// One inbound OS message, exactly as the pump retrieved it.
#[derive(Clone, Copy, Debug)]
pub struct OsMessage {
    pub message: u32,
    pub wparam: usize,
    pub lparam: isize,
}

/// Successful open: the session handle plus the identity the driver reports.
#[derive(Clone, Debug)]
pub struct OpenedHandle {
    pub handle: DriverHandle,
    pub name: String,
    pub port: String,
}

#[non_exhaustive]
#[derive(Debug, Clone, Error)]
pub enum DriverError {
    #[error("vendor DLLs could not be loaded")]
    DllLoad,
    #[error("device {0} could not be opened")]
    OpenFailed(DeviceId),
    #[error("bad driver handle")]
    BadHandle,
    #[error("driver call failed: {0}")]
    Call(String),
}

/// The vendor driver, reduced to the calls the manager needs.
///
/// All device-scoped calls are funneled through the manager; handles never
/// leave its registry. Implementations wrap the real vendor API on real
/// hardware and a script in tests.
pub trait Driver: Send + Sync {
    /// One-time library initialization. Runs on the pump thread before
    /// anything else; failure is fatal for the whole manager.
    fn global_init(&self) -> Result<(), DriverError>;

    /// Counterpart of [`Driver::global_init`], called once at teardown.
    fn global_shutdown(&self);

    /// Open a session for `id`, scoped to the shared message surface.
    /// `client` is the name announced to the driver.
    fn open(
        &self,
        surface: SurfaceHandle,
        id: DeviceId,
        client: &str,
    ) -> Result<OpenedHandle, DriverError>;

    /// Close an open session. Infallible by contract; the handle is dead
    /// afterwards either way.
    fn close(&self, handle: DriverHandle);

    /// Claim input priority on the device. Denial is a warning, not fatal.
    fn set_capture(&self, handle: DriverHandle, exclusive: bool) -> Result<(), DriverError>;

    /// Route one button's action straight through to the application.
    /// The driver reports no button count, so callers loop until it objects.
    fn reassign_button(
        &self,
        handle: DriverHandle,
        button: u32,
        passthrough: bool,
    ) -> Result<(), DriverError>;

    /// Set the device LED mask.
    fn set_leds(&self, handle: DriverHandle, mask: u32) -> Result<(), DriverError>;

    /// Human-readable label of a button code.
    fn button_name(&self, handle: DriverHandle, button: u32) -> Result<String, DriverError>;

    /// Translate a raw OS message against one open session. `None` when the
    /// message does not belong to that session's device.
    fn translate(&self, handle: DriverHandle, msg: &OsMessage) -> Option<RawDriverEvent>;

    /// Ids of currently attached units, ascending, starting at 1.
    fn attached_device_ids(&self) -> Vec<DeviceId>;
}
