//! Shared control/status block exchanged with the bus-object layer.
//!
//! The operator side writes the mode, the calibration command and the bus
//! requests; the core writes back currents, completion flags and received
//! frames. Every field is reached through a named accessor.

use crate::config::FilterCfg;
use crate::{CHANNELS, NO_CHANNEL};

/// Size of each per-channel bus frame buffer.
pub const BUS_BUFFER: usize = 284;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AiMode {
    #[default]
    Working,
    Calibration,
}

impl AiMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Working => "working",
            Self::Calibration => "calibration",
        }
    }
}

/// Calibration command; the engine returns it to `Wait` when a step ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalibrationStep {
    #[default]
    Wait,
    Sampling,
    Calc,
    Save,
}

/// Per-channel bus request/completion flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BusFlags {
    pub tx_enable: bool,
    pub rx_enable: bool,
    pub tx_completed: bool,
    pub rx_completed: bool,
}

#[derive(Debug, Clone)]
struct Frames {
    tx: [u8; BUS_BUFFER],
    tx_len: usize,
    rx: [u8; BUS_BUFFER],
    rx_len: usize,
}

impl Default for Frames {
    fn default() -> Self {
        Self {
            tx: [0; BUS_BUFFER],
            tx_len: 0,
            rx: [0; BUS_BUFFER],
            rx_len: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControlSurface {
    mode: AiMode,
    calibration_step: CalibrationStep,
    calibration_channel: u8,
    calibration_ma: u16,
    filter_window: u8,
    exp_coefficient: f64,
    currents: [u16; CHANNELS],
    bus_flags: [BusFlags; CHANNELS],
    frames: [Frames; CHANNELS],
}

impl Default for ControlSurface {
    fn default() -> Self {
        let filter = FilterCfg::default();
        Self {
            mode: AiMode::Working,
            calibration_step: CalibrationStep::Wait,
            calibration_channel: NO_CHANNEL,
            calibration_ma: 0,
            filter_window: filter.window,
            exp_coefficient: filter.exp_coefficient,
            currents: [0; CHANNELS],
            bus_flags: [BusFlags::default(); CHANNELS],
            frames: Default::default(),
        }
    }
}

impl ControlSurface {
    pub fn new() -> Self {
        Self::default()
    }

    // ── operating mode ──────────────────────────────────────────────────────

    pub fn mode(&self) -> AiMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: AiMode) {
        self.mode = mode;
    }

    // ── calibration command ─────────────────────────────────────────────────

    pub fn calibration_step(&self) -> CalibrationStep {
        self.calibration_step
    }

    pub fn set_calibration_step(&mut self, step: CalibrationStep) {
        self.calibration_step = step;
    }

    /// Channel under calibration; values >= 6 are invalid and `NO_CHANNEL`
    /// means none selected.
    pub fn calibration_channel(&self) -> u8 {
        self.calibration_channel
    }

    pub fn set_calibration_channel(&mut self, channel: u8) {
        self.calibration_channel = channel;
    }

    /// Reference current in whole mA for the next sampling run.
    pub fn calibration_ma(&self) -> u16 {
        self.calibration_ma
    }

    pub fn set_calibration_ma(&mut self, ma: u16) {
        self.calibration_ma = ma;
    }

    // ── filter requests ─────────────────────────────────────────────────────

    pub fn filter_window(&self) -> u8 {
        self.filter_window
    }

    pub fn set_filter_window(&mut self, window: u8) {
        self.filter_window = window;
    }

    pub fn exp_coefficient(&self) -> f64 {
        self.exp_coefficient
    }

    pub fn set_exp_coefficient(&mut self, k: f64) {
        self.exp_coefficient = k;
    }

    /// Mirror the live filter parameters so no change is pending.
    pub(crate) fn publish_filter(&mut self, filter: &FilterCfg) {
        self.filter_window = filter.window;
        self.exp_coefficient = filter.exp_coefficient;
    }

    // ── currents ────────────────────────────────────────────────────────────

    pub fn current_ua(&self, channel: usize) -> Option<u16> {
        self.currents.get(channel).copied()
    }

    pub fn currents(&self) -> [u16; CHANNELS] {
        self.currents
    }

    pub(crate) fn publish_current(&mut self, channel: usize, ua: u16) {
        if let Some(c) = self.currents.get_mut(channel) {
            *c = ua;
        }
    }

    // ── bus requests ────────────────────────────────────────────────────────

    pub fn bus_flags(&self, channel: usize) -> BusFlags {
        self.bus_flags.get(channel).copied().unwrap_or_default()
    }

    pub fn set_bus_flags(&mut self, channel: usize, flags: BusFlags) {
        if let Some(f) = self.bus_flags.get_mut(channel) {
            *f = flags;
        }
    }

    /// Queue `frame` for transmission on `channel`. Frames longer than the
    /// buffer are truncated.
    pub fn request_transmit(&mut self, channel: usize, frame: &[u8]) {
        let Some(frames) = self.frames.get_mut(channel) else {
            return;
        };
        let n = frame.len().min(BUS_BUFFER);
        frames.tx[..n].copy_from_slice(&frame[..n]);
        frames.tx_len = n;
        let flags = &mut self.bus_flags[channel];
        flags.tx_enable = true;
        flags.tx_completed = false;
    }

    pub fn request_receive(&mut self, channel: usize) {
        if let Some(flags) = self.bus_flags.get_mut(channel) {
            flags.rx_enable = true;
            flags.rx_completed = false;
        }
    }

    /// Last frame received on `channel`.
    pub fn received(&self, channel: usize) -> &[u8] {
        self.frames
            .get(channel)
            .map_or(&[][..], |f| &f.rx[..f.rx_len])
    }

    pub(crate) fn tx_frame(&self, channel: usize) -> &[u8] {
        self.frames
            .get(channel)
            .map_or(&[][..], |f| &f.tx[..f.tx_len.min(BUS_BUFFER)])
    }

    pub(crate) fn clear_rx(&mut self, channel: usize) {
        if let Some(f) = self.frames.get_mut(channel) {
            f.rx.fill(0);
            f.rx_len = 0;
        }
    }

    /// Let `fill` write into the receive buffer and record the length it
    /// reports.
    pub(crate) fn store_rx(&mut self, channel: usize, fill: impl FnOnce(&mut [u8]) -> usize) {
        if let Some(f) = self.frames.get_mut(channel) {
            f.rx_len = fill(&mut f.rx).min(BUS_BUFFER);
        }
    }

    pub(crate) fn mark_tx_completed(&mut self, channel: usize) {
        if let Some(f) = self.bus_flags.get_mut(channel) {
            f.tx_completed = true;
        }
    }

    pub(crate) fn mark_rx_completed(&mut self, channel: usize) {
        if let Some(f) = self.bus_flags.get_mut(channel) {
            f.rx_completed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transmit_request_truncates_and_flags() {
        let mut s = ControlSurface::new();
        s.bus_flags[2].tx_completed = true;
        s.request_transmit(2, &[7u8; 400]);
        assert_eq!(s.tx_frame(2).len(), BUS_BUFFER);
        let f = s.bus_flags(2);
        assert!(f.tx_enable && !f.tx_completed);
    }

    #[test]
    fn out_of_range_channels_are_ignored() {
        let mut s = ControlSurface::new();
        s.request_receive(9);
        s.publish_current(9, 1);
        assert_eq!(s.bus_flags(9), BusFlags::default());
        assert!(s.received(9).is_empty());
        assert_eq!(s.current_ua(9), None);
    }

    #[test]
    fn received_frame_is_bounded_by_length() {
        let mut s = ControlSurface::new();
        s.store_rx(0, |buf| {
            buf[..3].copy_from_slice(&[1, 2, 3]);
            3
        });
        assert_eq!(s.received(0), &[1, 2, 3]);
        s.clear_rx(0);
        assert!(s.received(0).is_empty());
    }
}
