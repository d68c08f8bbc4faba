#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Control core of the six-channel 4-20 mA input module (hardware-agnostic).
//!
//! All board access goes through the `ailoop_traits` transports; everything
//! here runs from one cooperative tick and never blocks.
//!
//! ## Architecture
//!
//! - **Filter pipeline**: median-of-3, moving average, quadratic curve,
//!   exponential smoothing, edge-triggered fault classes (`filter`, `pipeline`)
//! - **Calibration engine**: WAIT / SAMPLING / CALC / SAVE (`calibration`)
//! - **Calibration store**: CRC-checked flash record with per-tick read and
//!   write sequences (`store`)
//! - **AI controller**: boot phase, mode switching, dispatch (`controller`)
//! - **Bus scheduler**: round-robin arbitration of the shared transceiver with
//!   a receive watchdog (`bus`)
//! - **Module**: the process context tying them together (`module`, `builder`)
//!
//! ## Units
//!
//! Raw converter codes are `u16`; reported currents are microamperes in `u16`,
//! rounded to nearest.

pub mod builder;
pub mod bus;
pub mod calibration;
pub mod channel;
pub mod config;
pub mod controller;
pub mod conversions;
pub mod error;
pub mod filter;
pub mod hw_error;
pub mod indicator;
pub mod module;
pub mod pipeline;
pub mod runner;
pub mod store;
pub mod surface;
pub mod ticker;

/// Input channels, bus channels and indicators all come in sixes.
pub const CHANNELS: usize = 6;
/// Marker for "no calibration channel selected".
pub const NO_CHANNEL: u8 = 0xFF;

pub use builder::{Missing, ModuleBuilder, Set};
pub use bus::{Arbiter, BusScheduler};
pub use calibration::{CalibrationEngine, CalibrationEvent, fit_quadratic};
pub use config::{BusCfg, CalibrationCfg, FilterCfg, ModuleCfg, StorageCfg};
pub use controller::{AiController, BootOutcome};
pub use error::{BuildError, FaultError, IntegrityFault, Report, Result};
pub use filter::{Curve, FaultState};
pub use module::Module;
pub use runner::{Pacing, RunOptions, RunSummary};
pub use store::{CalibrationRecord, CalibrationStore};
pub use surface::{AiMode, BusFlags, CalibrationStep, ControlSurface};
