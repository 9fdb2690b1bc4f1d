//! Maps `Box<dyn Error>` from trait boundaries to typed `ControlError`.
//!
//! The traits in `blinds_traits` use `Box<dyn Error + Send + Sync>` so any
//! driver can plug in; this module converts those to our typed error enum,
//! with an optional feature-gated path for `blinds_hardware::HwError`.

use crate::error::ControlError;

/// Map a trait-boundary error to a typed `ControlError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> ControlError {
    #[cfg(feature = "hardware-errors")]
    {
        use blinds_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout => ControlError::Timeout,
                HwError::Disconnected | HwError::Broker(_) => {
                    ControlError::Transport(hw.to_string())
                }
                other => ControlError::HardwareFault(other.to_string()),
            };
        }
    }

    // Fallback: string-based detection
    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        ControlError::Timeout
    } else {
        ControlError::Hardware(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_strings_map_to_timeout() {
        let e: Box<dyn std::error::Error + Send + Sync> = "i2c read timeout".into();
        assert_eq!(map_hw_error(&*e), ControlError::Timeout);
    }

    #[test]
    fn other_strings_map_to_hardware() {
        let e: Box<dyn std::error::Error + Send + Sync> = "spi bus busy".into();
        assert_eq!(
            map_hw_error(&*e),
            ControlError::Hardware("spi bus busy".into())
        );
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn hw_errors_are_downcast() {
        use blinds_hardware::error::HwError;
        let e: Box<dyn std::error::Error + Send + Sync> = Box::new(HwError::Disconnected);
        assert!(matches!(map_hw_error(&*e), ControlError::Transport(_)));
        let e: Box<dyn std::error::Error + Send + Sync> = Box::new(HwError::Spi("crc".into()));
        assert!(matches!(map_hw_error(&*e), ControlError::HardwareFault(_)));
    }
}
