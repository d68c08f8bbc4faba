//! Human-readable error descriptions and structured JSON error formatting.

use ailoop_core::error::{BuildError, FaultError, IntegrityFault};

/// Stable name of a fault class, used as the JSON `reason`.
pub fn fault_name(f: &FaultError) -> &'static str {
    match f {
        FaultError::HardwareUnavailable { .. } => "HardwareUnavailable",
        FaultError::DataIntegrity(_) => "DataIntegrity",
        FaultError::InvalidOperatorInput(_) => "InvalidOperatorInput",
        FaultError::ComputationDegenerate => "ComputationDegenerate",
        FaultError::CommunicationTimeout { .. } => "CommunicationTimeout",
        FaultError::Hardware(_) => "Hardware",
    }
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingAdc | BuildError::MissingFlash | BuildError::MissingBus => format!(
                "What happened: The module was assembled without a transport ({be}).\nLikely causes: A backend failed to initialize or was not wired into the builder.\nHow to fix: Check the hardware setup, or run on the simulated board."
            ),
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(fe) = err.downcast_ref::<FaultError>() {
        return match fe {
            FaultError::HardwareUnavailable { attempts } => format!(
                "What happened: The calibration flash never became ready ({attempts} attempts).\nLikely causes: Flash not powered, wrong chip select, or storage.max_attempts too low.\nHow to fix: Check the flash wiring, or raise storage.max_attempts in the config."
            ),
            FaultError::DataIntegrity(IntegrityFault::Missing) => "What happened: No calibration record is stored.\nLikely causes: The flash is blank or was erased.\nHow to fix: Run `ailoop calibrate` for each channel to write a record.".to_string(),
            FaultError::DataIntegrity(IntegrityFault::Mismatch { stored, computed }) => format!(
                "What happened: The calibration record failed its checksum (stored {stored:#010x}, computed {computed:#010x}).\nLikely causes: Interrupted save or a corrupted image.\nHow to fix: Recalibrate and save again; the module runs on default curves meanwhile."
            ),
            FaultError::InvalidOperatorInput(msg) => format!(
                "What happened: Invalid operator input ({msg}).\nLikely causes: Channel outside 0..=5 or reference current outside 4..=20 mA.\nHow to fix: Pass a valid --channel or --verify-ma."
            ),
            FaultError::ComputationDegenerate => "What happened: The calibration points do not determine a curve.\nLikely causes: Fewer than three distinct codes, e.g. a disconnected input during sampling.\nHow to fix: Check the reference source and resample every point.".to_string(),
            FaultError::CommunicationTimeout { channel } => format!(
                "What happened: Bus channel {channel} did not answer.\nLikely causes: Field device absent or unpowered, or bus.timeout_ticks too short.\nHow to fix: Check the device on that channel, or raise bus.timeout_ticks[{channel}]."
            ),
            FaultError::Hardware(msg) => format!(
                "What happened: Hardware error ({msg}).\nLikely causes: Wiring, permissions, or a failed transport.\nHow to fix: Re-run with --log-level=debug for details."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("calibration csv must have headers") {
        return "Invalid headers in calibration points CSV. Expected 'ma,code'.".to_string();
    }

    if lower.contains("calibration points missing") {
        return format!(
            "What happened: {msg}.\nLikely causes: The points CSV does not cover every integer mA from 4 to 20.\nHow to fix: Add the missing rows and rerun."
        );
    }

    if lower.contains("must be") && (lower.contains("filter.") || lower.contains("bus.") || lower.contains("scheduler.") || lower.contains("storage.") || lower.contains("calibration.") || lower.contains("simulation.") || lower.contains("logging.")) {
        return format!(
            "What happened: Configuration is invalid ({msg}).\nLikely causes: An out-of-range value in the TOML.\nHow to fix: Edit the config file and try again."
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

/// Map fault classes to stable exit codes; everything else returns 1.
/// Code 2 stays reserved for usage errors reported by clap.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<FaultError>() {
        Some(FaultError::HardwareUnavailable { .. }) => 3,
        Some(FaultError::DataIntegrity(_)) => 4,
        Some(FaultError::InvalidOperatorInput(_)) => 5,
        Some(FaultError::ComputationDegenerate) => 6,
        Some(FaultError::CommunicationTimeout { .. }) => 7,
        Some(FaultError::Hardware(_)) => 8,
        None => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let msg = humanize(err);
    if let Some(fe) = err.downcast_ref::<FaultError>() {
        let details = match fe {
            FaultError::HardwareUnavailable { attempts } => Some(json!({ "attempts": attempts })),
            FaultError::DataIntegrity(IntegrityFault::Mismatch { stored, computed }) => {
                Some(json!({ "stored": stored, "computed": computed }))
            }
            FaultError::CommunicationTimeout { channel } => Some(json!({ "channel": channel })),
            _ => None,
        };
        let obj = if let Some(d) = details {
            json!({ "reason": fault_name(fe), "details": d, "message": msg })
        } else {
            json!({ "reason": fault_name(fe), "message": msg })
        };
        return obj.to_string();
    }

    // Generic error JSON
    json!({ "reason": "Error", "message": msg }).to_string()
}
