use std::sync::{Arc, Mutex};

use ailoop_traits::{AdcTransport, Signal};
use tracing::trace;

use crate::error::HwError;
use crate::lock;

const CHANNELS: usize = 6;
/// Ideal converter code at 4 mA and its slope in µA per code.
const IDEAL_CODE_4MA: f64 = 16352.0;
const UA_PER_CODE: f64 = 0.550_357_732_526_141_992_29;
const SPIKE_CODE: u16 = u16::MAX;

/// Ideal converter code for a loop current in microamperes.
pub fn ideal_code_for_ua(ua: f64) -> f64 {
    IDEAL_CODE_4MA + (ua - 4000.0) / UA_PER_CODE
}

#[derive(Debug, Clone, Copy)]
struct InputModel {
    current_ua: f64,
    gain: f64,
    offset: f64,
    raw_override: Option<u16>,
}

impl Default for InputModel {
    fn default() -> Self {
        Self {
            current_ua: 12_000.0,
            gain: 1.0,
            offset: 0.0,
            raw_override: None,
        }
    }
}

impl InputModel {
    fn code(&self) -> u16 {
        if let Some(raw) = self.raw_override {
            return raw;
        }
        let code = ideal_code_for_ua(self.current_ua) * self.gain + self.offset;
        code.round().clamp(0.0, f64::from(u16::MAX)) as u16
    }
}

#[derive(Debug, Default)]
struct Inputs {
    channels: [InputModel; CHANNELS],
    spike_every: Option<u64>,
}

/// Handle for steering the analog side of a [`SimAdc`].
#[derive(Debug, Clone, Default)]
pub struct SimAdcInputs {
    inner: Arc<Mutex<Inputs>>,
}

impl SimAdcInputs {
    pub fn set_current_ua(&self, channel: usize, ua: f64) {
        let mut g = lock(&self.inner);
        if let Some(input) = g.channels.get_mut(channel) {
            input.current_ua = ua;
            input.raw_override = None;
        }
    }

    /// Front-end error: the converter reads `ideal * gain + offset`.
    pub fn set_distortion(&self, channel: usize, gain: f64, offset: f64) {
        let mut g = lock(&self.inner);
        if let Some(input) = g.channels.get_mut(channel) {
            input.gain = gain;
            input.offset = offset;
        }
    }

    /// Pin a channel to a fixed raw code regardless of its current.
    pub fn set_raw_code(&self, channel: usize, code: u16) {
        let mut g = lock(&self.inner);
        if let Some(input) = g.channels.get_mut(channel) {
            input.raw_override = Some(code);
        }
    }

    /// Replace every `n`-th conversion with a full-scale spike.
    pub fn set_spike_every(&self, n: Option<u64>) {
        lock(&self.inner).spike_every = n.filter(|n| *n > 0);
    }

    pub fn code(&self, channel: usize) -> u16 {
        lock(&self.inner)
            .channels
            .get(channel)
            .map(InputModel::code)
            .unwrap_or(0)
    }
}

/// Six-input SPI converter with a two-exchange result lag.
///
/// The configuration word sent in exchange *n* selects the input converted for
/// the reply of exchange *n + 2*. Inputs are wired in reverse: channel 1 is
/// converter input 6.
pub struct SimAdc {
    inputs: SimAdcInputs,
    selected: bool,
    pending: [Option<usize>; 2],
    rx: [u8; 2],
    latency_polls: u32,
    remaining: u32,
    in_flight: bool,
    exchanges: u64,
    done: Signal,
}

impl SimAdc {
    pub fn new(inputs: SimAdcInputs) -> Self {
        Self {
            inputs,
            selected: false,
            pending: [None; 2],
            rx: [0; 2],
            latency_polls: 0,
            remaining: 0,
            in_flight: false,
            exchanges: 0,
            done: Signal::new(),
        }
    }

    /// Number of `poll_exchange` calls that see the transfer still running.
    pub fn with_latency(mut self, polls: u32) -> Self {
        self.latency_polls = polls;
        self
    }

    pub fn exchanges(&self) -> u64 {
        self.exchanges
    }

    fn channel_for(config: [u8; 2]) -> Result<usize, HwError> {
        if config[0] & 0x80 == 0 {
            return Err(HwError::AdcConfig(config[0], config[1]));
        }
        let input = usize::from((config[0] >> 1) & 0b111);
        match input {
            1..=6 => Ok(CHANNELS - input),
            _ => Err(HwError::AdcConfig(config[0], config[1])),
        }
    }

    // DMA transfer-complete interrupt.
    fn complete(&mut self) {
        self.in_flight = false;
        self.done.raise();
    }
}

impl AdcTransport for SimAdc {
    fn chip_select(&mut self, active: bool) {
        self.selected = active;
    }

    fn issue(&mut self, config: [u8; 2]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !self.selected {
            return Err(Box::new(HwError::ChipSelect));
        }
        let channel = Self::channel_for(config)?;
        self.exchanges = self.exchanges.wrapping_add(1);

        let spike = {
            let g = lock(&self.inputs.inner);
            g.spike_every.is_some_and(|n| self.exchanges % n == 0)
        };
        let code = match self.pending[0] {
            _ if spike => SPIKE_CODE,
            Some(converted) => self.inputs.code(converted),
            None => 0,
        };
        self.pending = [self.pending[1], Some(channel)];
        self.rx = code.to_be_bytes();
        self.done.take();
        trace!(channel, code, "sim adc exchange");

        self.in_flight = true;
        self.remaining = self.latency_polls;
        if self.remaining == 0 {
            self.complete();
        }
        Ok(())
    }

    fn poll_exchange(&mut self) -> Option<[u8; 2]> {
        if self.in_flight && self.remaining > 0 {
            self.remaining -= 1;
            if self.remaining == 0 {
                self.complete();
            }
        }
        self.done.take().then_some(self.rx)
    }
}
