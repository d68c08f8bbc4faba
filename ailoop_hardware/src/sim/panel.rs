use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use ailoop_traits::{Color, Indicator, IndicatorMode, StatusNotifier};

use crate::lock;

const CHANNELS: usize = 6;

#[derive(Debug, Default)]
struct Panel {
    lamps: [(IndicatorMode, Color); CHANNELS],
    requests: u64,
}

/// Indicator renderer stand-in: remembers the last pattern per channel.
#[derive(Debug, Clone, Default)]
pub struct RecordingIndicator {
    panel: Arc<Mutex<Panel>>,
}

impl RecordingIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lamp(&self, channel: usize) -> Option<(IndicatorMode, Color)> {
        lock(&self.panel).lamps.get(channel).copied()
    }

    pub fn lamps(&self) -> [(IndicatorMode, Color); CHANNELS] {
        lock(&self.panel).lamps
    }

    /// Total `set_indicator` calls received.
    pub fn requests(&self) -> u64 {
        lock(&self.panel).requests
    }
}

impl Indicator for RecordingIndicator {
    fn set_indicator(&mut self, channel: u8, mode: IndicatorMode, color: Color) {
        let mut p = lock(&self.panel);
        p.requests += 1;
        if let Some(lamp) = p.lamps.get_mut(usize::from(channel)) {
            *lamp = (mode, color);
        }
    }
}

/// Bus-status reporting stand-in that counts notifications.
#[derive(Debug, Clone, Default)]
pub struct CountingNotifier {
    count: Arc<AtomicU64>,
}

impl CountingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl StatusNotifier for CountingNotifier {
    fn notify_bus_status(&mut self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_panel() {
        let rec = RecordingIndicator::new();
        let mut writer = rec.clone();
        writer.set_indicator(2, IndicatorMode::Blink, Color::Green);
        writer.set_indicator(9, IndicatorMode::On, Color::Red);
        assert_eq!(rec.lamp(2), Some((IndicatorMode::Blink, Color::Green)));
        assert_eq!(rec.requests(), 2);
    }

    #[test]
    fn notifier_counts() {
        let n = CountingNotifier::new();
        let mut w = n.clone();
        w.notify_bus_status();
        w.notify_bus_status();
        assert_eq!(n.count(), 2);
    }
}
