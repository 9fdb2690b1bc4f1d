//! Human-readable error descriptions and structured JSON error formatting.

use blinds_core::error::{BuildError, ControlError};

/// Stable name for the error class, used as the JSON `reason`.
pub fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingActuator => "MissingActuator",
            BuildError::MissingEncoder => "MissingEncoder",
            BuildError::InvalidConfig(_) => "InvalidConfig",
        };
    }
    if let Some(ce) = err.downcast_ref::<ControlError>() {
        return match ce {
            ControlError::Hardware(_) => "Hardware",
            ControlError::HardwareFault(_) => "HardwareFault",
            ControlError::Timeout => "Timeout",
            ControlError::Transport(_) => "Transport",
            ControlError::Config(_) => "Config",
            ControlError::State(_) => "State",
        };
    }
    "Error"
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingActuator => {
                "What happened: No driver stage was provided to the controller.\nLikely causes: The TMC2130 failed to initialize or was not wired into the builder.\nHow to fix: Ensure the driver is created successfully and passed via with_actuator(...).".to_string()
            }
            BuildError::MissingEncoder => {
                "What happened: encoder.enabled is set but no angle sensor was provided.\nLikely causes: The AS5600 failed to initialize, or this build has no encoder fitted.\nHow to fix: Check the I2C wiring and [pins].i2c_bus, or set encoder.enabled = false for open-loop operation.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/ for presets."
            ),
        };
    }

    if let Some(ce) = err.downcast_ref::<ControlError>() {
        return match ce {
            ControlError::Timeout => "What happened: A hardware read timed out.\nLikely causes: Loose SPI/I2C wiring or no power on the driver board.\nHow to fix: Verify wiring and supply, then rerun self-check.".to_string(),
            ControlError::HardwareFault(msg) => format!(
                "What happened: The hardware reported a fault ({msg}).\nLikely causes: Wrong [pins] values, missing bus permissions, or a driver fault latch.\nHow to fix: Check [pins], ensure the process may access /dev/spidev* and /dev/i2c-*, and power-cycle the driver."
            ),
            ControlError::Transport(msg) => format!(
                "What happened: Broker session failed ({msg}).\nLikely causes: Broker unreachable or wrong [broker] host/port.\nHow to fix: Check the network and the [broker] section."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = format!("{err:#}");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("zone csv must have headers") {
        return "Invalid headers in zone CSV. Expected 'threshold,current_ma,speed_rpm'.".to_string();
    }

    if lower.contains("reading config") {
        return format!(
            "What happened: Could not read the config file.\nLikely causes: Wrong --config path or missing permissions.\nHow to fix: Pass --config pointing at a TOML file (see etc/). Original: {msg}"
        );
    }

    if lower.contains("parsing config") || lower.contains("must be") || lower.contains("zones") {
        return format!(
            "What happened: Configuration is invalid or incomplete.\nLikely causes: A missing section ([travel], [motion]) or an out-of-range value.\nHow to fix: Edit the TOML config and try again. Detail: {msg}"
        );
    }

    if lower.contains("gpio") || lower.contains("spi") || lower.contains("i2c") {
        return format!(
            "What happened: Failed to initialize hardware.\nLikely causes: Incorrect pin or bus numbers, or insufficient permissions.\nHow to fix: Fix the [pins] values in the config; ensure the process has access to GPIO/SPI/I2C. Detail: {msg}"
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: build errors 3, timeouts 4, hardware 5, transport 6, anything else 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<BuildError>().is_some() {
        return 3;
    }
    match err.downcast_ref::<ControlError>() {
        Some(ControlError::Timeout) => 4,
        Some(ControlError::Hardware(_) | ControlError::HardwareFault(_)) => 5,
        Some(ControlError::Transport(_)) => 6,
        _ => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;
    json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_errors_get_typed_text_and_code() {
        let err = eyre::Report::new(BuildError::MissingEncoder);
        assert!(humanize(&err).contains("encoder.enabled"));
        assert_eq!(exit_code_for_error(&err), 3);
        assert_eq!(reason_name(&err), "MissingEncoder");
    }

    #[test]
    fn wrapped_control_errors_are_still_recognized() {
        use eyre::WrapErr;
        let res: Result<(), ControlError> = Err(ControlError::Timeout);
        let err = res.wrap_err("reading driver status").unwrap_err();
        assert_eq!(exit_code_for_error(&err), 4);
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "Timeout");
        assert_eq!(v["exit_code"], 4);
    }

    #[test]
    fn unknown_errors_fall_back_to_generic() {
        let err = eyre::eyre!("something odd");
        assert_eq!(exit_code_for_error(&err), 1);
        assert!(humanize(&err).starts_with("Something went wrong."));
    }
}
