use crate::config::FilterCfg;
use crate::filter::{Curve, FaultState, MedianOf3, MovingAverage, code_to_ua, report_ua, smooth};

/// Acquisition state of one input channel.
#[derive(Debug, Clone)]
pub struct Channel {
    sample: [u8; 2],
    median: MedianOf3,
    average: MovingAverage,
    curve: Curve,
    current_full: f64,
    current: u16,
    fault: Option<FaultState>,
}

/// Outcome of filtering one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub channel: usize,
    pub current_ua: u16,
    /// Set when the fault class changed with this sample.
    pub transition: Option<FaultState>,
}

impl Channel {
    pub fn new(curve: Curve) -> Self {
        Self {
            sample: [0; 2],
            median: MedianOf3::default(),
            average: MovingAverage::default(),
            curve,
            current_full: 0.0,
            current: 0,
            fault: None,
        }
    }

    /// Latch the raw bytes of a completed exchange.
    pub(crate) fn store_sample(&mut self, bytes: [u8; 2]) {
        self.sample = bytes;
    }

    pub fn raw_code(&self) -> u16 {
        u16::from_be_bytes(self.sample)
    }

    /// Run the latched sample through every stage. The fault class only
    /// changes when the new reading falls strictly inside another band.
    pub(crate) fn process(&mut self, filter: &FilterCfg) -> (u16, Option<FaultState>) {
        let median = self.median.push(self.raw_code());
        let averaged = self.average.push(median, filter.window);
        let ideal = self.curve.apply(averaged);
        self.current_full = smooth(self.current_full, code_to_ua(ideal), filter.exp_coefficient);
        self.current = report_ua(self.current_full);

        let transition = FaultState::classify(self.current).filter(|s| self.fault != Some(*s));
        if let Some(state) = transition {
            self.fault = Some(state);
        }
        (self.current, transition)
    }

    pub(crate) fn median_push(&mut self, code: u16) -> u16 {
        self.median.push(code)
    }

    pub(crate) fn reset_median(&mut self) {
        self.median.reset();
    }

    /// Zero the filter buffers and the accumulated current. The curve and
    /// fault class survive.
    pub(crate) fn reset(&mut self) {
        self.median.reset();
        self.average.reset();
        self.current_full = 0.0;
        self.current = 0;
    }

    pub fn curve(&self) -> Curve {
        self.curve
    }

    pub(crate) fn set_curve(&mut self, curve: Curve) {
        self.curve = curve;
    }

    pub fn current_ua(&self) -> u16 {
        self.current
    }

    pub fn current_full(&self) -> f64 {
        self.current_full
    }

    pub fn fault(&self) -> Option<FaultState> {
        self.fault
    }

    /// True when no filter state has accumulated since the last reset.
    pub fn is_pristine(&self) -> bool {
        self.current_full == 0.0 && self.average.sum() == 0 && self.current == 0
    }
}
