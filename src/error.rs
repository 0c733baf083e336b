// error.rs
use thiserror::Error;

use crate::driver::{DeviceId, DriverError};
use crate::pump::PumpError;

/// Failures surfaced by the manager. Everything else in this crate is
/// encoded as device state or downgraded to a warning.
#[non_exhaustive]
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Driver global initialization failed. Fatal: no device can ever open.
    #[error("driver initialization failed: {0}")]
    DriverInit(#[source] DriverError),

    /// The pump thread could not create its hidden message surface.
    #[error("message pump failed: {0}")]
    Pump(#[source] PumpError),

    /// `create_device` was called before `start`.
    #[error("manager has not been started")]
    NotStarted,

    /// A device-scoped call named an id with no live registration.
    #[error("device {0} is not registered")]
    DeviceNotFound(DeviceId),
}

pub type Result<T> = std::result::Result<T, Error>;
