//! AS5600 12-bit magnetic angle sensor over I2C.

use blinds_traits::AngleSensor;
use rppal::i2c::I2c;
use tracing::{trace, warn};

use crate::error::{HwError, Result};
use crate::regs::{self, as5600 as reg};

fn i2c_err(e: rppal::i2c::Error) -> HwError {
    HwError::I2c(e.to_string())
}

pub struct As5600 {
    i2c: I2c,
}

impl As5600 {
    pub fn new(bus: u8) -> Result<Self> {
        let mut i2c = I2c::with_bus(bus).map_err(i2c_err)?;
        i2c.set_slave_address(reg::ADDRESS).map_err(i2c_err)?;
        let mut dev = Self { i2c };
        let (detected, weak, strong) = dev.magnet()?;
        if !detected || weak || strong {
            warn!(detected, weak, strong, "as5600 magnet out of range");
        }
        Ok(dev)
    }

    /// Magnet (detected, too weak, too strong).
    pub fn magnet(&mut self) -> Result<(bool, bool, bool)> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(&[reg::STATUS], &mut buf)
            .map_err(i2c_err)?;
        Ok(regs::magnet_status(buf[0]))
    }

    pub fn raw_angle(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.i2c
            .write_read(&[reg::RAW_ANGLE], &mut buf)
            .map_err(i2c_err)?;
        let raw = regs::decode_raw_angle(buf);
        trace!(raw, "as5600 angle");
        Ok(raw)
    }
}

impl AngleSensor for As5600 {
    fn read_angle(&mut self) -> std::result::Result<u16, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.raw_angle()?)
    }
}
