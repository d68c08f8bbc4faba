//! Per-sample filter stages and the current scale.

use ailoop_traits::{Color, IndicatorMode};

use crate::config::MAX_WINDOW;

/// Ideal converter code at 4 mA.
pub const IDEAL_CODE_4MA: f64 = 16352.0;
/// Microamperes per ideal converter code.
pub const UA_PER_CODE: f64 = 0.550_357_732_526_141_992_29;
/// Current reported at the 4 mA code point.
pub const LOWER_BIAS_UA: f64 = 4000.0;
/// Below this the loop is considered open.
pub const LINE_BREAK_UA: u16 = 3600;
/// Above this the loop is considered shorted.
pub const SHORT_CIRCUIT_UA: u16 = 20500;

/// Median of the last three raw codes.
#[derive(Debug, Clone, Default)]
pub struct MedianOf3 {
    buf: [u16; 3],
    pos: usize,
}

impl MedianOf3 {
    /// Insert `sample` over the oldest entry and return the window median.
    #[inline]
    pub fn push(&mut self, sample: u16) -> u16 {
        self.buf[self.pos] = sample;
        self.pos = if self.pos == 2 { 0 } else { self.pos + 1 };
        median3(self.buf[0], self.buf[1], self.buf[2])
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[inline]
fn median3(a: u16, b: u16, c: u16) -> u16 {
    if a < b {
        if b < c {
            b
        } else if c < a {
            a
        } else {
            c
        }
    } else if a < c {
        a
    } else if c < b {
        b
    } else {
        c
    }
}

/// Moving average over a circular buffer with a running sum.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    buf: [u16; MAX_WINDOW as usize],
    sum: u32,
    pos: usize,
}

impl Default for MovingAverage {
    fn default() -> Self {
        Self {
            buf: [0; MAX_WINDOW as usize],
            sum: 0,
            pos: 0,
        }
    }
}

impl MovingAverage {
    /// Replace the oldest of the last `window` samples and return the mean.
    /// The buffer starts zeroed, so the mean ramps in over the first window.
    #[inline]
    pub fn push(&mut self, sample: u16, window: u8) -> f64 {
        let window = usize::from(window.clamp(1, MAX_WINDOW));
        self.pos += 1;
        if self.pos >= window {
            self.pos = 0;
        }
        self.sum -= u32::from(self.buf[self.pos]);
        self.sum += u32::from(sample);
        self.buf[self.pos] = sample;
        f64::from(self.sum) / window as f64
    }

    pub fn sum(&self) -> u32 {
        self.sum
    }

    pub fn reset(&mut self) {
        self.buf.fill(0);
        self.sum = 0;
        self.pos = 0;
    }
}

/// Quadratic correction from measured to ideal converter code.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Curve {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Curve {
    /// Factory curve of the production front end.
    pub const DEFAULT: Self = Self {
        a: -4.180_287_149_356_397e-8,
        b: 1.146_119_922_916_554_4,
        c: 43.661_028_945_484_645,
    };

    pub const IDENTITY: Self = Self {
        a: 0.0,
        b: 1.0,
        c: 0.0,
    };

    #[inline]
    pub fn apply(&self, code: f64) -> f64 {
        self.a * (code * code) + self.b * code + self.c
    }

    pub fn is_finite(&self) -> bool {
        self.a.is_finite() && self.b.is_finite() && self.c.is_finite()
    }
}

impl Default for Curve {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Current in microamperes for an ideal converter code.
#[inline]
pub fn code_to_ua(ideal_code: f64) -> f64 {
    LOWER_BIAS_UA + (ideal_code - IDEAL_CODE_4MA) * UA_PER_CODE
}

/// One exponential smoothing step.
#[inline]
pub fn smooth(filtered: f64, input: f64, k: f64) -> f64 {
    filtered + (input - filtered) * k
}

/// Round and clamp a smoothed current to the reported `u16`.
#[inline]
pub fn report_ua(filtered: f64) -> u16 {
    if filtered.is_nan() {
        return 0;
    }
    filtered.round().clamp(0.0, f64::from(u16::MAX)) as u16
}

/// Loop condition derived from the reported current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultState {
    Ok,
    LineBreak,
    ShortCircuit,
}

impl FaultState {
    /// Class of a reading; `None` exactly on a threshold.
    pub fn classify(ua: u16) -> Option<Self> {
        if ua < LINE_BREAK_UA {
            Some(Self::LineBreak)
        } else if ua > SHORT_CIRCUIT_UA {
            Some(Self::ShortCircuit)
        } else if ua > LINE_BREAK_UA && ua < SHORT_CIRCUIT_UA {
            Some(Self::Ok)
        } else {
            None
        }
    }

    /// Solid lamp shown for this class in working mode.
    pub fn indicator(self) -> (IndicatorMode, Color) {
        match self {
            Self::Ok => (IndicatorMode::On, Color::Green),
            Self::LineBreak => (IndicatorMode::On, Color::Yellow),
            Self::ShortCircuit => (IndicatorMode::On, Color::Red),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::LineBreak => "line-break",
            Self::ShortCircuit => "short-circuit",
        }
    }
}
