//! Concrete parts behind the `blinds_traits` seams.
//!
//! - `sim`: in-process plant, broker and LED (always available)
//! - `hardware` feature: TMC2130 driver, AS5600 encoder and a GPIO LED via `rppal`
//! - `mqtt` feature: `rumqttc`-backed broker session
pub mod error;
pub mod regs;
pub mod sim;
pub mod util;

#[cfg(feature = "hardware")]
pub mod as5600;
#[cfg(feature = "hardware")]
pub mod tmc2130;

#[cfg(feature = "mqtt")]
pub mod mqtt;

pub use sim::{BusHandle, LoopbackBus, MOVE_HISTORY, MoveRecord, SimPlant, SimulatedActuator, SimulatedEncoder, SimulatedIndicator};

#[cfg(feature = "hardware")]
pub mod hardware {
    pub use crate::as5600::As5600;
    pub use crate::tmc2130::{Tmc2130, Tmc2130Config};

    use blinds_traits::Indicator;
    use rppal::gpio::{Gpio, OutputPin};

    use crate::error::HwError;

    /// Status LED on a GPIO line (active high).
    pub struct GpioIndicator {
        pin: OutputPin,
    }

    impl GpioIndicator {
        pub fn new(pin: u8) -> Result<Self, HwError> {
            let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
            let pin = gpio
                .get(pin)
                .map_err(|e| HwError::Gpio(e.to_string()))?
                .into_output_low();
            Ok(Self { pin })
        }
    }

    impl Indicator for GpioIndicator {
        fn set(&mut self, on: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            if on {
                self.pin.set_high();
            } else {
                self.pin.set_low();
            }
            Ok(())
        }
    }
}
