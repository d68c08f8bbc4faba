//! Transports for the input module.
//!
//! `sim` holds deterministic in-process models of the ADC, the SPI flash, the
//! bus transceiver with its analog switch, and the indicator panel. They back
//! the test suites and the CLI simulator. The `hardware` feature adds
//! Raspberry Pi backends built on rppal.
pub mod error;
pub mod image;
pub mod sim;

#[cfg(feature = "hardware")]
pub mod hardware;

pub use sim::{
    CountingNotifier, RecordingIndicator, Responder, SimAdc, SimAdcInputs, SimBus, SimBusHandle,
    SimFlash, SimMux, sim_bus,
};

pub(crate) fn lock<T>(m: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}
