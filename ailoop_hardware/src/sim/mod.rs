//! Simulated board.
//!
//! Each model is split into the half owned by the core (implementing a
//! transport trait) and a cloneable handle that tests and the CLI use to drive
//! inputs, inject faults and inspect state. Completions are delivered through
//! the same `Signal`/`LengthSlot` primitives a real interrupt handler would use.
mod adc;
mod bus;
mod flash;
mod panel;

pub use adc::{SimAdc, SimAdcInputs, ideal_code_for_ua};
pub use bus::{Responder, SimBus, SimBusHandle, SimMux, sim_bus};
pub use flash::{FLASH_CAPACITY, SECTOR_SIZE, SimFlash};
pub use panel::{CountingNotifier, RecordingIndicator};
