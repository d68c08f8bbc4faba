//! Buffered indicator requests.
//!
//! Every state change writes into the bank and marks it dirty; `flush` sends
//! all six lamps to the renderer at most once per tick. Each lamp also keeps
//! a "working" pattern that is restored when calibration mode is left.

use ailoop_traits::{Color, Indicator, IndicatorMode};

use crate::CHANNELS;

pub type Lamp = (IndicatorMode, Color);

#[derive(Debug, Clone)]
pub struct IndicatorBank {
    shown: [Lamp; CHANNELS],
    working: [Lamp; CHANNELS],
    dirty: bool,
}

impl Default for IndicatorBank {
    fn default() -> Self {
        Self {
            shown: [(IndicatorMode::Off, Color::Green); CHANNELS],
            working: [(IndicatorMode::Off, Color::Green); CHANNELS],
            dirty: false,
        }
    }
}

impl IndicatorBank {
    pub fn set(&mut self, channel: usize, (mode, color): Lamp) {
        if let Some(l) = self.shown.get_mut(channel) {
            *l = (mode, color);
            self.dirty = true;
        }
    }

    pub fn set_all(&mut self, lamp: Lamp) {
        self.shown = [lamp; CHANNELS];
        self.dirty = true;
    }

    /// Show `lamp` and remember it as the channel's working pattern.
    pub fn set_working(&mut self, channel: usize, lamp: Lamp) {
        if let Some(w) = self.working.get_mut(channel) {
            *w = lamp;
            self.set(channel, lamp);
        }
    }

    pub fn set_all_working(&mut self, lamp: Lamp) {
        self.working = [lamp; CHANNELS];
        self.set_all(lamp);
    }

    pub fn restore_working(&mut self) {
        self.shown = self.working;
        self.dirty = true;
    }

    /// Force a resend on the next flush without changing any lamp.
    pub fn touch(&mut self) {
        self.dirty = true;
    }

    pub fn shown(&self, channel: usize) -> Option<Lamp> {
        self.shown.get(channel).copied()
    }

    pub fn working(&self, channel: usize) -> Option<Lamp> {
        self.working.get(channel).copied()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Send every lamp if anything changed since the last flush.
    pub fn flush<I: Indicator + ?Sized>(&mut self, out: &mut I) -> bool {
        if !self.dirty {
            return false;
        }
        self.dirty = false;
        for (ch, (mode, color)) in (0u8..).zip(self.shown.iter()) {
            out.set_indicator(ch, *mode, *color);
        }
        true
    }
}
