use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("spi error: {0}")]
    Spi(String),
    #[error("i2c error: {0}")]
    I2c(String),
    #[error("hardware timeout")]
    Timeout,
    #[error("driver fault: {0}")]
    DriverFault(String),
    #[error("broker disconnected")]
    Disconnected,
    #[error("broker error: {0}")]
    Broker(String),
    #[error("injected fault: {0}")]
    Injected(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
