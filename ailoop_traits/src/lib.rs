//! Hardware-facing seams of the input module.
//!
//! Everything the core touches on the board goes through these traits: the
//! SPI link to the multiplexed ADC, the SPI flash holding the calibration
//! record, the shared half-duplex bus transceiver with its 3-bit analog switch,
//! the channel indicators and the bus-status reporting layer.
//!
//! Every operation that waits on hardware is split into a non-blocking start
//! and a `poll_*` that reports completion. Implementations deliver completions
//! from interrupt context through [`signal::Signal`] / [`signal::LengthSlot`].
pub mod clock;
pub mod indicator;
pub mod signal;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use indicator::{Color, IndicatorMode};
pub use signal::{LengthSlot, Signal};

pub trait AdcTransport {
    /// Drive the converter chip-select line; `true` selects the converter.
    fn chip_select(&mut self, active: bool);

    /// Start a two-byte full-duplex exchange: `config` goes out, the previous
    /// conversion comes back. Returns as soon as the transfer is queued.
    fn issue(&mut self, config: [u8; 2]) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Received bytes of the last issued exchange, once it has completed.
    fn poll_exchange(&mut self) -> Option<[u8; 2]>;
}

/// Readiness of the flash part as reported by its status register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashStatus {
    Busy,
    ReadOnly,
    ReadWrite,
}

pub trait FlashTransport {
    fn status(&mut self) -> FlashStatus;

    /// Queue a read of `len` bytes; the data is collected with `fetch_result`.
    fn read(&mut self, address: u32, len: usize)
    -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Copy the result of the last completed read into `buf`.
    fn fetch_result(&mut self, buf: &mut [u8])
    -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    fn set_write_mode(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    fn erase_sector(&mut self, address: u32)
    -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    fn write(
        &mut self,
        address: u32,
        data: &[u8],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Completion event of the shared bus transceiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusCompletion {
    Transmitted,
    /// Receive-until-idle finished with this many bytes.
    Received(usize),
}

pub trait BusTransport {
    fn transmit(&mut self, data: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Start a receive that completes when the line goes idle or `max_len`
    /// bytes have arrived.
    fn receive_until_idle(
        &mut self,
        max_len: usize,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Drop any receive still armed on the transceiver.
    fn abort_receive(&mut self);

    /// Bytes received so far by the outstanding receive.
    fn rx_progress(&self) -> usize;

    fn poll_completion(&mut self) -> Option<BusCompletion>;

    /// Copy the bytes of the last completed receive into `buf`, returning the
    /// number copied.
    fn read_received(&mut self, buf: &mut [u8]) -> usize;
}

/// Three select lines of the analog switch in front of the bus transceiver.
pub trait MuxSelect {
    fn select(&mut self, code: u8);
}

/// Fire-and-forget request to the indicator renderer.
pub trait Indicator {
    fn set_indicator(&mut self, channel: u8, mode: IndicatorMode, color: Color);
}

/// Bus-object reporting layer; publishes the per-channel bus flags.
pub trait StatusNotifier {
    fn notify_bus_status(&mut self);
}

impl<T: Indicator + ?Sized> Indicator for Box<T> {
    fn set_indicator(&mut self, channel: u8, mode: IndicatorMode, color: Color) {
        (**self).set_indicator(channel, mode, color);
    }
}

impl<T: StatusNotifier + ?Sized> StatusNotifier for Box<T> {
    fn notify_bus_status(&mut self) {
        (**self).notify_bus_status();
    }
}
