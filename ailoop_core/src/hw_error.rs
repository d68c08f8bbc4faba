//! Maps `Box<dyn Error>` from trait boundaries to typed `FaultError`.
//!
//! The traits in `ailoop_traits` use `Box<dyn Error + Send + Sync>`; this
//! module converts those to our fault taxonomy, with an optional feature-gated
//! path for `ailoop_hardware::HwError` downcasting.

use crate::error::FaultError;

/// Map a trait-boundary error to a typed `FaultError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> FaultError {
    // Feature-gated: try to downcast to HwError for precise mapping
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<ailoop_hardware::error::HwError>() {
            return match hw {
                ailoop_hardware::error::HwError::FlashNotReady => {
                    FaultError::HardwareUnavailable { attempts: 1 }
                }
                other => FaultError::Hardware(other.to_string()),
            };
        }
    }

    // Fallback: string-based detection
    let s = e.to_string();
    if s.to_lowercase().contains("not ready") {
        FaultError::HardwareUnavailable { attempts: 1 }
    } else {
        FaultError::Hardware(s)
    }
}
