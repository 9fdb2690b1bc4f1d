//! TMC2130 stepper driver: SPI for configuration and telemetry, STEP/DIR/EN
//! GPIO for motion.

use std::thread::sleep;
use std::time::Duration;

use blinds_traits::{Actuator, ActuatorStatus};
use rppal::gpio::{Gpio, OutputPin};
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
use tracing::{debug, trace};

use crate::error::{HwError, Result};
use crate::regs::{self, DrvStatus, tmc2130 as reg};
use crate::util::{current_scale, step_interval};

const SPI_CLOCK_HZ: u32 = 1_000_000;
const STEP_PULSE: Duration = Duration::from_micros(2);
const HOLD_DELAY: u8 = 5;

/// Wiring and motor geometry.
#[derive(Debug, Clone)]
pub struct Tmc2130Config {
    pub step_pin: u8,
    pub dir_pin: u8,
    pub en_pin: u8,
    pub spi_bus: u8,
    pub spi_cs: u8,
    pub motor_steps: u32,
    pub microsteps: u32,
    pub rsense_ohm: f32,
    pub stall_threshold: i8,
}

pub struct Tmc2130 {
    spi: Spi,
    step: OutputPin,
    dir: OutputPin,
    en: OutputPin,
    cfg: Tmc2130Config,
    enabled: bool,
    current_ma: Option<u32>,
}

fn gpio_err(e: rppal::gpio::Error) -> HwError {
    HwError::Gpio(e.to_string())
}

fn spi_err(e: rppal::spi::Error) -> HwError {
    HwError::Spi(e.to_string())
}

impl Tmc2130 {
    /// Open the bus and pins and program the chopper. The stage starts
    /// released (EN high).
    pub fn new(cfg: Tmc2130Config) -> Result<Self> {
        let bus = match cfg.spi_bus {
            0 => Bus::Spi0,
            1 => Bus::Spi1,
            n => return Err(HwError::Spi(format!("unsupported SPI bus {n}"))),
        };
        let ss = match cfg.spi_cs {
            0 => SlaveSelect::Ss0,
            1 => SlaveSelect::Ss1,
            2 => SlaveSelect::Ss2,
            n => return Err(HwError::Spi(format!("unsupported chip select {n}"))),
        };
        let spi = Spi::new(bus, ss, SPI_CLOCK_HZ, Mode::Mode3).map_err(spi_err)?;
        let gpio = Gpio::new().map_err(gpio_err)?;
        let step = gpio.get(cfg.step_pin).map_err(gpio_err)?.into_output_low();
        let dir = gpio.get(cfg.dir_pin).map_err(gpio_err)?.into_output_low();
        // EN is active low.
        let en = gpio.get(cfg.en_pin).map_err(gpio_err)?.into_output_high();

        let mut drv = Self {
            spi,
            step,
            dir,
            en,
            cfg,
            enabled: false,
            current_ma: None,
        };
        drv.init()?;
        Ok(drv)
    }

    fn init(&mut self) -> Result<()> {
        // Clear latched reset/error flags.
        self.read_reg(reg::GSTAT)?;
        self.write_reg(reg::GCONF, reg::EN_PWM_MODE)?;
        self.write_reg(reg::TPOWERDOWN, 10)?;
        self.write_reg(reg::TCOOLTHRS, 0x000F_FFFF)?;
        self.write_reg(reg::COOLCONF, regs::coolconf(self.cfg.stall_threshold))?;
        self.write_reg(reg::CHOPCONF, regs::chopconf(self.cfg.microsteps, false))?;
        debug!(
            microsteps = self.cfg.microsteps,
            stall_threshold = self.cfg.stall_threshold,
            "tmc2130 configured"
        );
        Ok(())
    }

    fn transfer(&mut self, out: [u8; 5]) -> Result<[u8; 5]> {
        let mut inp = [0u8; 5];
        self.spi.transfer(&mut inp, &out).map_err(spi_err)?;
        Ok(inp)
    }

    fn write_reg(&mut self, addr: u8, value: u32) -> Result<()> {
        let v = value.to_be_bytes();
        self.transfer([addr | reg::WRITE, v[0], v[1], v[2], v[3]])?;
        trace!(addr, value, "tmc2130 write");
        Ok(())
    }

    /// Reads are pipelined: the reply to a request arrives with the next
    /// datagram, so the request is sent twice.
    fn read_reg(&mut self, addr: u8) -> Result<u32> {
        self.transfer([addr & !reg::WRITE, 0, 0, 0, 0])?;
        let r = self.transfer([addr & !reg::WRITE, 0, 0, 0, 0])?;
        Ok(u32::from_be_bytes([r[1], r[2], r[3], r[4]]))
    }

    pub fn drv_status(&mut self) -> Result<DrvStatus> {
        Ok(DrvStatus::from_register(self.read_reg(reg::DRV_STATUS)?))
    }

    fn apply_current(&mut self, current_ma: u32) -> Result<()> {
        if self.current_ma == Some(current_ma) {
            return Ok(());
        }
        let scale = current_scale(current_ma, self.cfg.rsense_ohm);
        self.write_reg(
            reg::CHOPCONF,
            regs::chopconf(self.cfg.microsteps, scale.vsense),
        )?;
        self.write_reg(reg::IHOLD_IRUN, regs::ihold_irun(scale, HOLD_DELAY))?;
        self.current_ma = Some(current_ma);
        debug!(current_ma, cs = scale.cs, vsense = scale.vsense, "run current set");
        Ok(())
    }
}

impl Actuator for Tmc2130 {
    fn status(&mut self) -> std::result::Result<ActuatorStatus, Box<dyn std::error::Error + Send + Sync>> {
        let st = self.drv_status()?;
        trace!(register = st.raw, sg = st.sg_result, "drv_status");
        Ok(st.to_actuator_status(self.enabled))
    }

    fn move_steps(
        &mut self,
        delta: i32,
        current_ma: u32,
        speed_rpm: u32,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.apply_current(current_ma)?;
        if delta >= 0 {
            self.dir.set_high();
        } else {
            self.dir.set_low();
        }
        let interval = step_interval(speed_rpm, self.cfg.motor_steps, self.cfg.microsteps);
        let gap = interval.saturating_sub(STEP_PULSE);
        for _ in 0..delta.unsigned_abs() {
            self.step.set_high();
            sleep(STEP_PULSE);
            self.step.set_low();
            sleep(gap);
        }
        Ok(())
    }

    fn set_enabled(
        &mut self,
        enabled: bool,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if enabled {
            self.en.set_low();
        } else {
            self.en.set_high();
        }
        self.enabled = enabled;
        Ok(())
    }
}
