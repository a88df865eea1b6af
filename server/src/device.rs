//! The pool of compute devices and their drivers.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use cinder_work::{CpuDriver, Driver, GpuDriver};

use crate::config::DeviceConfig;
use crate::error::ServerError;

/// What kind of hardware backs a device slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Cpu,
    Gpu,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Cpu => write!(f, "cpu"),
            DeviceKind::Gpu => write!(f, "gpu"),
        }
    }
}

/// One configured compute device and the driver that runs on it.
///
/// The busy flag is the only mutable state; acquisition is a CAS so
/// concurrent workers can race for devices without a lock.
pub struct Device {
    kind: DeviceKind,
    index: u32,
    driver: Arc<dyn Driver>,
    busy: AtomicBool,
}

impl Device {
    fn new(config: &DeviceConfig) -> Self {
        let driver: Arc<dyn Driver> = match config.kind {
            DeviceKind::Cpu => Arc::new(CpuDriver::new()),
            DeviceKind::Gpu => Arc::new(GpuDriver::new()),
        };
        Self {
            kind: config.kind,
            index: config.index,
            driver,
            busy: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    /// Claim the device. Returns false if it is already claimed.
    pub fn try_acquire(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    pub fn release(&self) {
        self.busy.store(false, Ordering::Release);
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Relaxed)
    }
}

/// All configured devices, in configuration order.
pub struct DeviceRegistry {
    devices: Vec<Device>,
}

impl DeviceRegistry {
    pub fn from_config(configs: &[DeviceConfig]) -> Self {
        Self {
            devices: configs.iter().map(Device::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Claim the first free device, scanning in configuration order.
    ///
    /// With the worker pool sized to the device count a free device always
    /// exists by the time a worker gets here, but the empty-handed case is
    /// still reported rather than waited on.
    pub fn acquire_any(&self) -> Result<DeviceLease<'_>, ServerError> {
        for device in &self.devices {
            if device.try_acquire() {
                return Ok(DeviceLease { device });
            }
        }
        Err(ServerError::NoDeviceAvailable)
    }
}

/// A claimed device. Dropping the lease releases the device, so release
/// happens on every exit path, error paths included.
pub struct DeviceLease<'a> {
    device: &'a Device,
}

impl DeviceLease<'_> {
    pub fn device(&self) -> &Device {
        self.device
    }
}

impl Drop for DeviceLease<'_> {
    fn drop(&mut self) {
        self.device.release();
    }
}
