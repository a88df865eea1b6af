//! GPU-backed driver.

use cinder_types::{U128, U256};

use crate::driver::{CancelToken, Driver, SolveOutcome};
use crate::error::WorkError;
use crate::generator::CpuDriver;

/// Driver slot for an OpenCL device.
///
/// The OpenCL kernel is not wired in yet; until it is, this satisfies the
/// [`Driver`] contract by delegating to the CPU search, so a `gpu` device
/// entry in the configuration is usable rather than an error.
pub struct GpuDriver {
    fallback: CpuDriver,
}

impl GpuDriver {
    pub fn new() -> Self {
        Self {
            fallback: CpuDriver::new(),
        }
    }
}

impl Default for GpuDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for GpuDriver {
    fn solve(
        &self,
        root_hash: &U256,
        difficulty: U128,
        cancel: &CancelToken,
    ) -> Result<SolveOutcome, WorkError> {
        self.fallback.solve(root_hash, difficulty, cancel)
    }
}
