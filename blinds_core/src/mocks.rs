//! Placeholder parts for builds without an encoder or status LED.

/// Angle sensor for open-loop builds with static dispatch. Never read when
/// the encoder is disabled; errors if it is.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEncoder;

impl blinds_traits::AngleSensor for NoEncoder {
    fn read_angle(&mut self) -> Result<u16, Box<dyn std::error::Error + Send + Sync>> {
        Err(Box::new(std::io::Error::other("no encoder fitted")))
    }
}

/// Indicator type for nodes without an LED.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIndicator;

impl blinds_traits::Indicator for NoIndicator {
    fn set(&mut self, _on: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}
