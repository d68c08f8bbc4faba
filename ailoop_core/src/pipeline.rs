//! Round-robin acquisition over the six inputs.
//!
//! Each channel takes two ticks: one to frame and issue the converter
//! exchange, one (or more) to observe its completion and filter the result.
//! The converter answers with the conversion selected two exchanges earlier,
//! so the bytes of the exchange issued for channel `i` belong to channel
//! `CHANNEL_MAP[i]`.

use ailoop_traits::AdcTransport;
use tracing::{trace, warn};

use crate::CHANNELS;
use crate::channel::{Channel, Reading};
use crate::config::FilterCfg;
use crate::filter::Curve;
use crate::hw_error::map_hw_error;

/// Converter configuration word per channel.
pub const ADC_CONFIG: [[u8; 2]; CHANNELS] = [
    [0b1111_1101, 0b1100_0000],
    [0b1111_1011, 0b1100_0000],
    [0b1111_1001, 0b1100_0000],
    [0b1111_0111, 0b1100_0000],
    [0b1111_0101, 0b1100_0000],
    [0b1111_0011, 0b1100_0000],
];

/// Destination channel of the bytes returned by the exchange for channel `i`.
pub const CHANNEL_MAP: [usize; CHANNELS] = [4, 5, 0, 1, 2, 3];

/// Progress of the single converter exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangePoll {
    /// The exchange was issued this tick.
    Issued,
    /// Still waiting for the completion signal.
    Pending,
    Completed([u8; 2]),
    /// The transport refused the exchange; it is retried next tick.
    Failed,
}

/// Owner of the one-exchange-in-flight rule.
#[derive(Debug, Default)]
pub struct AdcLink {
    in_flight: bool,
}

impl AdcLink {
    /// Issue `config` if idle, otherwise poll the outstanding exchange. Chip
    /// select is held for exactly the life of the exchange.
    pub fn poll<A: AdcTransport + ?Sized>(&mut self, adc: &mut A, config: [u8; 2]) -> ExchangePoll {
        if !self.in_flight {
            adc.chip_select(true);
            return match adc.issue(config) {
                Ok(()) => {
                    self.in_flight = true;
                    ExchangePoll::Issued
                }
                Err(e) => {
                    adc.chip_select(false);
                    let err = map_hw_error(&*e);
                    warn!(error = %err, "adc exchange not issued");
                    ExchangePoll::Failed
                }
            };
        }
        match adc.poll_exchange() {
            Some(bytes) => {
                adc.chip_select(false);
                self.in_flight = false;
                ExchangePoll::Completed(bytes)
            }
            None => ExchangePoll::Pending,
        }
    }

    /// Drop an outstanding exchange and release chip select.
    pub fn abandon<A: AdcTransport + ?Sized>(&mut self, adc: &mut A) {
        if self.in_flight {
            // Swallow a completion that may already be latched.
            let _ = adc.poll_exchange();
        }
        adc.chip_select(false);
        self.in_flight = false;
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }
}

/// The six channels plus the shared filter parameters and converter link.
#[derive(Debug)]
pub struct FilterPipeline {
    channels: [Channel; CHANNELS],
    filter: FilterCfg,
    cursor: usize,
    link: AdcLink,
}

impl FilterPipeline {
    pub fn new(filter: FilterCfg, curve: Curve) -> Self {
        Self {
            channels: std::array::from_fn(|_| Channel::new(curve)),
            filter,
            cursor: 0,
            link: AdcLink::default(),
        }
    }

    /// Advance acquisition by one tick. Returns the reading of the channel
    /// whose exchange completed, if any.
    pub fn step<A: AdcTransport + ?Sized>(&mut self, adc: &mut A) -> Option<Reading> {
        let ch = self.cursor;
        match self.link.poll(adc, ADC_CONFIG[ch]) {
            ExchangePoll::Completed(bytes) => {
                self.channels[CHANNEL_MAP[ch]].store_sample(bytes);
                let (current_ua, transition) = self.channels[ch].process(&self.filter);
                trace!(
                    channel = ch,
                    raw = self.channels[ch].raw_code(),
                    current_ua,
                    "sample filtered"
                );
                self.cursor = (ch + 1) % CHANNELS;
                Some(Reading {
                    channel: ch,
                    current_ua,
                    transition,
                })
            }
            ExchangePoll::Issued | ExchangePoll::Pending | ExchangePoll::Failed => None,
        }
    }

    /// Exchange for calibration sampling: always targets `channel`'s own
    /// converter input.
    pub(crate) fn exchange_for<A: AdcTransport + ?Sized>(
        &mut self,
        adc: &mut A,
        channel: usize,
    ) -> ExchangePoll {
        self.link.poll(adc, ADC_CONFIG[channel % CHANNELS])
    }

    pub(crate) fn abandon_exchange<A: AdcTransport + ?Sized>(&mut self, adc: &mut A) {
        self.link.abandon(adc);
    }

    /// Zero every channel's filter buffers and accumulated current.
    pub fn reset_all(&mut self) {
        for ch in &mut self.channels {
            ch.reset();
        }
    }

    pub fn filter(&self) -> FilterCfg {
        self.filter
    }

    /// Adopt new filter parameters. The caller decides whether to reset.
    pub(crate) fn set_filter(&mut self, filter: FilterCfg) {
        self.filter = filter;
    }

    pub fn channel(&self, channel: usize) -> Option<&Channel> {
        self.channels.get(channel)
    }

    pub fn curves(&self) -> [Curve; CHANNELS] {
        std::array::from_fn(|i| self.channels[i].curve())
    }

    pub(crate) fn set_curve(&mut self, channel: usize, curve: Curve) {
        if let Some(ch) = self.channels.get_mut(channel) {
            ch.set_curve(curve);
        }
    }

    pub(crate) fn median_push(&mut self, channel: usize, code: u16) -> u16 {
        self.channels[channel % CHANNELS].median_push(code)
    }

    pub(crate) fn reset_median(&mut self, channel: usize) {
        if let Some(ch) = self.channels.get_mut(channel) {
            ch.reset_median();
        }
    }

    /// Ordinal of the channel serviced next.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn exchange_in_flight(&self) -> bool {
        self.link.in_flight()
    }
}
