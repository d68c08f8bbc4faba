//! Runtime configuration types of the module.
//!
//! These are separate from the TOML-deserialized config in `ailoop_config`;
//! `conversions` bridges the two.

use crate::CHANNELS;
use crate::filter::Curve;

/// Largest moving-average window the per-channel buffers hold.
pub const MAX_WINDOW: u8 = 200;

/// Filter parameters shared by all channels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterCfg {
    /// Moving-average window in samples, 1..=200.
    pub window: u8,
    /// Exponential smoothing coefficient, (0.0, 1.0].
    pub exp_coefficient: f64,
}

impl Default for FilterCfg {
    fn default() -> Self {
        Self {
            window: 30,
            exp_coefficient: 0.1,
        }
    }
}

impl FilterCfg {
    #[inline]
    pub fn window_in_range(window: u8) -> bool {
        (1..=MAX_WINDOW).contains(&window)
    }

    #[inline]
    pub fn coefficient_in_range(k: f64) -> bool {
        k > 0.0 && k <= 1.0
    }

    pub fn is_valid(&self) -> bool {
        Self::window_in_range(self.window) && Self::coefficient_in_range(self.exp_coefficient)
    }
}

/// Calibration procedure parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationCfg {
    /// Completed exchanges discarded before accumulation starts.
    pub settle_exchanges: u32,
    /// Median-filtered samples averaged per point.
    pub sample_count: u32,
    /// Compiled-in curve used whenever no valid record is available.
    pub default_curve: Curve,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            settle_exchanges: 10,
            sample_count: 100_000,
            default_curve: Curve::DEFAULT,
        }
    }
}

/// Flash placement and retry ceiling of the calibration record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageCfg {
    pub record_address: u32,
    pub max_attempts: u32,
}

impl Default for StorageCfg {
    fn default() -> Self {
        Self {
            record_address: 0,
            max_attempts: 10_000,
        }
    }
}

/// Bus arbitration parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusCfg {
    pub timeout_ticks: [u32; CHANNELS],
    pub mux_codes: [u8; CHANNELS],
    pub transmit_code: u8,
}

impl Default for BusCfg {
    fn default() -> Self {
        Self {
            timeout_ticks: [30, 30, 30, 30, 120, 30],
            mux_codes: [0b011, 0b010, 0b000, 0b110, 0b101, 0b100],
            transmit_code: 0b111,
        }
    }
}

/// Everything a `Module` needs besides its transports.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ModuleCfg {
    pub filter: FilterCfg,
    pub calibration: CalibrationCfg,
    pub storage: StorageCfg,
    pub bus: BusCfg,
}
