//! Arbitration of the shared half-duplex transceiver.
//!
//! Six channels share one transceiver through a 3-bit analog switch. The
//! scheduler walks the channels round-robin and grants the line to at most one
//! transaction at a time. Holding the line is an [`Arbiter`] state; a
//! completion or a receive timeout are the only ways out of it.

use ailoop_traits::{BusCompletion, BusTransport, MuxSelect, StatusNotifier};
use tracing::{debug, trace, warn};

use crate::CHANNELS;
use crate::config::BusCfg;
use crate::hw_error::map_hw_error;
use crate::surface::{BUS_BUFFER, BusFlags, ControlSurface};

/// Who holds the transceiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Arbiter {
    #[default]
    Idle,
    Transmitting {
        channel: usize,
    },
    Receiving {
        channel: usize,
        /// Watchdog ticks since the receive started or last stalled.
        ticks: u32,
        /// Cleared once the far end starts answering.
        watchdog: bool,
    },
}

impl Arbiter {
    pub fn holder(&self) -> Option<usize> {
        match *self {
            Self::Idle => None,
            Self::Transmitting { channel } | Self::Receiving { channel, .. } => Some(channel),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.holder().is_some()
    }
}

#[derive(Debug)]
pub struct BusScheduler {
    cfg: BusCfg,
    active: usize,
    arbiter: Arbiter,
    shadows: [BusFlags; CHANNELS],
    notify_pending: bool,
    timeouts: [u64; CHANNELS],
    notifications: u64,
}

impl BusScheduler {
    pub fn new(cfg: BusCfg) -> Self {
        Self {
            cfg,
            active: 0,
            arbiter: Arbiter::Idle,
            shadows: [BusFlags::default(); CHANNELS],
            notify_pending: false,
            timeouts: [0; CHANNELS],
            notifications: 0,
        }
    }

    /// One scheduling cycle: collect a completion, mirror the requests,
    /// notify once if anything changed, then grant the line if it is free.
    pub fn poll<B, M, N>(
        &mut self,
        surface: &mut ControlSurface,
        bus: &mut B,
        mux: &mut M,
        notifier: &mut N,
    ) where
        B: BusTransport + ?Sized,
        M: MuxSelect + ?Sized,
        N: StatusNotifier + ?Sized,
    {
        if let Some(done) = bus.poll_completion() {
            self.complete(done, surface, bus);
        }

        for (ch, shadow) in self.shadows.iter_mut().enumerate() {
            let flags = surface.bus_flags(ch);
            if flags != *shadow {
                *shadow = flags;
                self.notify_pending = true;
            }
        }
        if self.notify_pending {
            self.notify_pending = false;
            self.notifications += 1;
            notifier.notify_bus_status();
        }

        if self.arbiter.is_busy() {
            return;
        }

        let ch = self.active;
        let flags = self.shadows[ch];
        if flags.tx_enable && !flags.tx_completed {
            mux.select(self.cfg.transmit_code);
            match bus.transmit(surface.tx_frame(ch)) {
                Ok(()) => {
                    trace!(channel = ch, "bus transmit started");
                    self.arbiter = Arbiter::Transmitting { channel: ch };
                }
                Err(e) => warn!(channel = ch, error = %map_hw_error(&*e), "bus transmit refused"),
            }
        } else if flags.rx_enable && !flags.rx_completed {
            bus.abort_receive();
            mux.select(self.cfg.mux_codes[ch]);
            surface.clear_rx(ch);
            match bus.receive_until_idle(BUS_BUFFER) {
                Ok(()) => {
                    trace!(channel = ch, "bus receive armed");
                    self.arbiter = Arbiter::Receiving {
                        channel: ch,
                        ticks: 0,
                        watchdog: true,
                    };
                }
                Err(e) => warn!(channel = ch, error = %map_hw_error(&*e), "bus receive refused"),
            }
        } else {
            self.active = (ch + 1) % CHANNELS;
        }
    }

    // Completions release the line but leave the active channel in place.
    fn complete<B: BusTransport + ?Sized>(
        &mut self,
        done: BusCompletion,
        surface: &mut ControlSurface,
        bus: &mut B,
    ) {
        match (self.arbiter, done) {
            (Arbiter::Transmitting { channel }, BusCompletion::Transmitted) => {
                surface.mark_tx_completed(channel);
                self.shadows[channel].tx_completed = true;
                debug!(channel, "bus transmit completed");
            }
            (Arbiter::Receiving { channel, .. }, BusCompletion::Received(len)) => {
                surface.store_rx(channel, |buf| {
                    let n = len.min(buf.len());
                    bus.read_received(&mut buf[..n])
                });
                surface.mark_rx_completed(channel);
                self.shadows[channel].rx_completed = true;
                debug!(channel, len, "bus receive completed");
            }
            (holder, done) => {
                trace!(?holder, ?done, "stray bus completion ignored");
                return;
            }
        }
        self.arbiter = Arbiter::Idle;
        self.notify_pending = true;
    }

    /// Periodic watchdog. Returns the channel released by a timeout.
    pub fn watchdog_tick<B: BusTransport + ?Sized>(&mut self, bus: &mut B) -> Option<usize> {
        let Arbiter::Receiving {
            channel,
            ticks,
            watchdog,
        } = &mut self.arbiter
        else {
            return None;
        };
        if !*watchdog {
            return None;
        }
        if bus.rx_progress() > 0 {
            // A frame is arriving; only its completion releases the line.
            *ticks = 0;
            *watchdog = false;
            trace!(channel = *channel, "bus watchdog stopped by rx progress");
            return None;
        }
        *ticks += 1;
        let channel = *channel;
        if *ticks < self.cfg.timeout_ticks[channel] {
            return None;
        }
        bus.abort_receive();
        self.arbiter = Arbiter::Idle;
        self.timeouts[channel] += 1;
        self.active = (channel + 1) % CHANNELS;
        warn!(
            channel,
            ticks = self.cfg.timeout_ticks[channel],
            "bus receive timed out, line released"
        );
        Some(channel)
    }

    pub fn active_channel(&self) -> usize {
        self.active
    }

    pub fn arbiter(&self) -> Arbiter {
        self.arbiter
    }

    /// Receive timeouts per channel since start.
    pub fn timeouts(&self) -> [u64; CHANNELS] {
        self.timeouts
    }

    /// Batched status notifications sent since start.
    pub fn notifications(&self) -> u64 {
        self.notifications
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Line {
        code: u8,
        rx_armed: bool,
        aborted: u32,
    }

    impl MuxSelect for Line {
        fn select(&mut self, code: u8) {
            self.code = code;
        }
    }

    impl BusTransport for Line {
        fn transmit(&mut self, _: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Ok(())
        }
        fn receive_until_idle(
            &mut self,
            _: usize,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.rx_armed = true;
            Ok(())
        }
        fn abort_receive(&mut self) {
            if self.rx_armed {
                self.aborted += 1;
            }
            self.rx_armed = false;
        }
        fn rx_progress(&self) -> usize {
            0
        }
        fn poll_completion(&mut self) -> Option<BusCompletion> {
            None
        }
        fn read_received(&mut self, _: &mut [u8]) -> usize {
            0
        }
    }

    struct Quiet;
    impl StatusNotifier for Quiet {
        fn notify_bus_status(&mut self) {}
    }

    #[test]
    fn idle_channels_rotate_without_taking_the_line() {
        let mut s = BusScheduler::new(BusCfg::default());
        let mut surface = ControlSurface::new();
        let mut line = Line::default();
        for want in [1, 2, 3, 4, 5, 0] {
            s.poll(&mut surface, &mut line, &mut Line::default(), &mut Quiet);
            assert_eq!(s.active_channel(), want);
            assert_eq!(s.arbiter(), Arbiter::Idle);
        }
    }

    #[test]
    fn silent_receive_times_out_on_the_threshold_tick() {
        let cfg = BusCfg::default();
        let mut s = BusScheduler::new(cfg);
        let mut surface = ControlSurface::new();
        let mut line = Line::default();
        let mut mux = Line::default();
        for _ in 0..4 {
            s.poll(&mut surface, &mut line, &mut mux, &mut Quiet);
        }
        surface.request_receive(4);
        s.poll(&mut surface, &mut line, &mut mux, &mut Quiet);
        assert_eq!(s.arbiter().holder(), Some(4));
        assert_eq!(mux.code, cfg.mux_codes[4]);
        for _ in 1..cfg.timeout_ticks[4] {
            assert_eq!(s.watchdog_tick(&mut line), None);
        }
        assert_eq!(s.watchdog_tick(&mut line), Some(4));
        assert_eq!(s.arbiter(), Arbiter::Idle);
        assert_eq!(s.active_channel(), 5);
        assert_eq!(s.timeouts()[4], 1);
        assert_eq!(line.aborted, 1);
        assert!(!surface.bus_flags(4).rx_completed);
    }
}
