//! Raspberry Pi backends.
use ailoop_traits::{AdcTransport, MuxSelect, Signal};
use rppal::gpio::{Gpio, OutputPin};
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
use tracing::trace;

use crate::error::HwError;

type BoxErr = Box<dyn std::error::Error + Send + Sync>;

/// SPI converter with chip select on a plain GPIO so the core can frame the
/// exchange itself. `rppal` transfers are synchronous, so completion is
/// signalled before `issue` returns.
pub struct SpiAdc {
    spi: Spi,
    cs: OutputPin,
    rx: [u8; 2],
    done: Signal,
}

impl SpiAdc {
    pub fn new(cs_pin: u8, clock_hz: u32) -> Result<Self, HwError> {
        let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, clock_hz, Mode::Mode0)
            .map_err(|e| HwError::Spi(e.to_string()))?;
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let mut cs = gpio
            .get(cs_pin)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_output();
        cs.set_high();
        Ok(Self {
            spi,
            cs,
            rx: [0; 2],
            done: Signal::new(),
        })
    }
}

impl AdcTransport for SpiAdc {
    fn chip_select(&mut self, active: bool) {
        // Active low.
        if active {
            self.cs.set_low();
        } else {
            self.cs.set_high();
        }
    }

    fn issue(&mut self, config: [u8; 2]) -> Result<(), BoxErr> {
        if self.cs.is_set_high() {
            return Err(Box::new(HwError::ChipSelect));
        }
        let mut rx = [0u8; 2];
        self.spi
            .transfer(&mut rx, &config)
            .map_err(|e| HwError::Spi(e.to_string()))?;
        self.rx = rx;
        trace!(cfg0 = config[0], code = u16::from_be_bytes(rx), "spi adc exchange");
        self.done.raise();
        Ok(())
    }

    fn poll_exchange(&mut self) -> Option<[u8; 2]> {
        self.done.take().then_some(self.rx)
    }
}

/// Analog switch select lines, bit 0 first.
pub struct GpioMux {
    lines: [OutputPin; 3],
}

impl GpioMux {
    pub fn new(pins: [u8; 3]) -> Result<Self, HwError> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let take = |pin: u8| -> Result<OutputPin, HwError> {
            Ok(gpio
                .get(pin)
                .map_err(|e| HwError::Gpio(e.to_string()))?
                .into_output_low())
        };
        Ok(Self {
            lines: [take(pins[0])?, take(pins[1])?, take(pins[2])?],
        })
    }
}

impl MuxSelect for GpioMux {
    fn select(&mut self, code: u8) {
        for (bit, line) in self.lines.iter_mut().enumerate() {
            if code & (1 << bit) != 0 {
                line.set_high();
            } else {
                line.set_low();
            }
        }
    }
}
