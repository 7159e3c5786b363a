//! Drivers for the GIC400 interrupt controller
//!
//! Bring-up only establishes the init contract for both register banks; the
//! register-level programming belongs to the interrupt subsystem and happens
//! against the MMIO windows declared in the device table.

use crate::devices::{DeviceDriver, DriverInitError};

/// Driver for the GIC400 distributor register bank
pub struct Gic400Distributor;

/// Driver for the GIC400 per-CPU interface register bank
pub struct Gic400Cpu;

pub static GIC400_DISTRIBUTOR: Gic400Distributor = Gic400Distributor;
pub static GIC400_CPU: Gic400Cpu = Gic400Cpu;

impl DeviceDriver for Gic400Distributor {
    fn name(&self) -> &'static str {
        "gic400-distributor"
    }

    fn init(&self) -> Result<(), DriverInitError> {
        log::debug!("gic400 distributor ready");
        Ok(())
    }
}

impl DeviceDriver for Gic400Cpu {
    fn name(&self) -> &'static str {
        "gic400-cpu"
    }

    fn init(&self) -> Result<(), DriverInitError> {
        log::debug!("gic400 cpu interface ready");
        Ok(())
    }
}
