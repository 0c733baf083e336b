// lib.rs

mod device;
mod driver;
mod error;
mod events;
pub mod logger;
mod manager;
mod pump;
mod queue;
mod signal;

// Public surface (root-level re-exports)
pub use crate::device::{Device, DeviceStatus};
pub use crate::driver::{
    DeviceId, Driver, DriverError, DriverHandle, OpenedHandle, OsMessage, SurfaceHandle,
};
pub use crate::error::{Error, Result};
pub use crate::events::{DeviceChangeKind, DeviceEvent, RawDriverEvent, Vec3};
pub use crate::manager::{DeviceManager, DeviceManagerBuilder, ManagerOptions};
pub use crate::pump::{MessagePump, PumpError, PumpWait};
pub use crate::queue::EventQueue;
pub use crate::signal::{Signal, Subscription};

// Prelude stays minimal and user-friendly
pub mod prelude {
    pub use crate::device::{Device, DeviceStatus};
    pub use crate::driver::{DeviceId, Driver, DriverError, OsMessage, SurfaceHandle};
    pub use crate::error::{Error, Result};
    pub use crate::events::{DeviceChangeKind, DeviceEvent, Vec3};
    pub use crate::manager::{DeviceManager, DeviceManagerBuilder, ManagerOptions};
    pub use crate::pump::{MessagePump, PumpWait};
    pub use crate::signal::{Signal, Subscription};
}
