//! Operator-driven calibration: WAIT / SAMPLING / CALC / SAVE.
//!
//! The operator writes a step, a channel and a reference current into the
//! control surface; the engine performs one unit of that step per tick and
//! writes `Wait` back when the step is over.

use ailoop_traits::{AdcTransport, Color, FlashTransport, IndicatorMode};
use tracing::{debug, info, warn};

use crate::config::{CalibrationCfg, FilterCfg};
use crate::error::FaultError;
use crate::filter::Curve;
use crate::indicator::IndicatorBank;
use crate::pipeline::{ExchangePoll, FilterPipeline};
use crate::store::{CalibrationStore, WritePoll};
use crate::surface::{CalibrationStep, ControlSurface};
use crate::{CHANNELS, NO_CHANNEL};

/// Calibration points per channel, one per whole mA from 4 to 20.
pub const POINTS: usize = 17;
pub const MIN_MA: u16 = 4;
pub const MAX_MA: u16 = 20;

/// Converter codes an ideal front end produces at 4..=20 mA.
pub const IDEAL_CODES: [u16; POINTS] = [
    16352, 18160, 19984, 21808, 23616, 25440, 27248, 29072, 30880, 32704, 34528, 36336, 38160,
    39968, 41792, 43600, 45424,
];

/// Relative singularity threshold of the scaled normal matrix.
const DEGENERATE_DET: f64 = 1e-9;

/// Least-squares quadratic `y = a x² + b x + c` through `(xs[i], ys[i])`.
///
/// The abscissae are centred and scaled to unit RMS before the normal
/// equations are formed, then the solution is mapped back to raw form.
pub fn fit_points(xs: &[f64], ys: &[f64]) -> Result<Curve, FaultError> {
    let n = xs.len().min(ys.len());
    if n < 3 {
        return Err(FaultError::ComputationDegenerate);
    }
    let nf = n as f64;
    let mean = xs[..n].iter().sum::<f64>() / nf;
    let spread = (xs[..n].iter().map(|x| (x - mean).powi(2)).sum::<f64>() / nf).sqrt();
    if !spread.is_finite() || spread <= 0.0 {
        return Err(FaultError::ComputationDegenerate);
    }

    let (mut s1, mut s2, mut s3, mut s4) = (0.0, 0.0, 0.0, 0.0);
    let (mut t0, mut t1, mut t2) = (0.0, 0.0, 0.0);
    for (x, y) in xs[..n].iter().zip(&ys[..n]) {
        let u = (x - mean) / spread;
        let u2 = u * u;
        s1 += u;
        s2 += u2;
        s3 += u2 * u;
        s4 += u2 * u2;
        t0 += y;
        t1 += u * y;
        t2 += u2 * y;
    }

    let m = [[s4, s3, s2], [s3, s2, s1], [s2, s1, nf]];
    let det = det3(&m);
    if !det.is_finite() || det.abs() <= DEGENERATE_DET * nf.powi(3) {
        return Err(FaultError::ComputationDegenerate);
    }
    let rhs = [t2, t1, t0];
    let solve = |col: usize| {
        let mut mc = m;
        for (row, r) in mc.iter_mut().zip(rhs) {
            row[col] = r;
        }
        det3(&mc) / det
    };
    let (alpha, beta, gamma) = (solve(0), solve(1), solve(2));

    let s_sq = spread * spread;
    let curve = Curve {
        a: alpha / s_sq,
        b: beta / spread - 2.0 * alpha * mean / s_sq,
        c: alpha * mean * mean / s_sq - beta * mean / spread + gamma,
    };
    if curve.is_finite() {
        Ok(curve)
    } else {
        Err(FaultError::ComputationDegenerate)
    }
}

fn det3(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

/// Fit a channel's measured point codes against [`IDEAL_CODES`].
pub fn fit_quadratic(measured: &[u32; POINTS]) -> Result<Curve, FaultError> {
    let xs = measured.map(f64::from);
    let ys = IDEAL_CODES.map(f64::from);
    fit_points(&xs, &ys)
}

/// Observable outcome of one engine step.
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationEvent {
    ChannelSelected(u8),
    InvalidChannel(u8),
    FilterChanged(FilterCfg),
    PointSampled { channel: usize, ma: u16, mean: u32 },
    Fitted { channel: usize, curve: Curve },
    Degenerate { channel: usize },
    Rejected(FaultError),
    Saved,
    SaveFailed(FaultError),
}

#[derive(Debug, Clone, Copy)]
struct SamplingRun {
    channel: usize,
    ma: u16,
    completed: u32,
    sum: u64,
}

#[derive(Debug)]
pub struct CalibrationEngine {
    cfg: CalibrationCfg,
    selected: u8,
    save_latch: bool,
    run: Option<SamplingRun>,
    points: [[u32; POINTS]; CHANNELS],
}

impl CalibrationEngine {
    pub fn new(cfg: CalibrationCfg) -> Self {
        Self {
            cfg,
            selected: NO_CHANNEL,
            save_latch: false,
            run: None,
            points: [[0; POINTS]; CHANNELS],
        }
    }

    /// Reset engine-local state on entry to calibration mode.
    pub fn enter_calibration(&mut self, bank: &mut IndicatorBank) {
        self.selected = NO_CHANNEL;
        self.save_latch = false;
        self.run = None;
        bank.set_all((IndicatorMode::Off, Color::Green));
    }

    /// Channel the engine last acknowledged from the surface.
    pub fn selected(&self) -> u8 {
        self.selected
    }

    pub fn save_latch(&self) -> bool {
        self.save_latch
    }

    pub fn points(&self, channel: usize) -> Option<&[u32; POINTS]> {
        self.points.get(channel)
    }

    /// Overwrite one stored point, e.g. when replaying points recorded offline.
    pub fn set_point(&mut self, channel: usize, ma: u16, code: u32) -> Result<(), FaultError> {
        let slot = self
            .points
            .get_mut(channel)
            .zip(ma_index(ma))
            .map(|(pts, i)| &mut pts[i])
            .ok_or_else(|| {
                FaultError::InvalidOperatorInput(format!("point {channel}/{ma} mA out of range"))
            })?;
        *slot = code;
        Ok(())
    }

    /// Samples completed in the current run, settling included.
    pub fn sampling_progress(&self) -> Option<(usize, u16, u32)> {
        self.run.map(|r| (r.channel, r.ma, r.completed))
    }

    /// Perform one unit of the step the surface requests.
    pub fn step<A, F>(
        &mut self,
        surface: &mut ControlSurface,
        pipeline: &mut FilterPipeline,
        store: &mut CalibrationStore,
        bank: &mut IndicatorBank,
        adc: &mut A,
        flash: &mut F,
    ) -> Option<CalibrationEvent>
    where
        A: AdcTransport + ?Sized,
        F: FlashTransport + ?Sized,
    {
        let step = surface.calibration_step();
        if step != CalibrationStep::Sampling {
            self.run = None;
        }
        if step != CalibrationStep::Save && store.abort_write() {
            info!(step = ?step, "save abandoned before completion");
        }
        match step {
            CalibrationStep::Wait => self.wait(surface, pipeline, bank),
            CalibrationStep::Sampling => self.sample(surface, pipeline, bank, adc),
            CalibrationStep::Calc => self.calc(surface, pipeline, store, bank),
            CalibrationStep::Save => self.save(surface, pipeline, store, bank, flash),
        }
    }

    fn wait(
        &mut self,
        surface: &ControlSurface,
        pipeline: &mut FilterPipeline,
        bank: &mut IndicatorBank,
    ) -> Option<CalibrationEvent> {
        let mut event = None;

        let ch = surface.calibration_channel();
        if ch != self.selected {
            self.selected = ch;
            if usize::from(ch) < CHANNELS {
                bank.set_all((IndicatorMode::Off, Color::Green));
                bank.set(usize::from(ch), (IndicatorMode::Blink, Color::Green));
                debug!(channel = ch, "calibration channel selected");
                event = Some(CalibrationEvent::ChannelSelected(ch));
            } else {
                bank.set_all((IndicatorMode::Single, Color::Red));
                debug!(channel = ch, "calibration channel invalid");
                event = Some(CalibrationEvent::InvalidChannel(ch));
            }
        }

        // Out-of-range requests are ignored, not clamped.
        let live = pipeline.filter();
        let mut next = live;
        if surface.filter_window() != live.window && FilterCfg::window_in_range(surface.filter_window())
        {
            next.window = surface.filter_window();
        }
        let k = surface.exp_coefficient();
        if k != live.exp_coefficient && FilterCfg::coefficient_in_range(k) {
            next.exp_coefficient = k;
        }
        if next != live {
            pipeline.set_filter(next);
            pipeline.reset_all();
            info!(
                window = next.window,
                exp_coefficient = next.exp_coefficient,
                "filter parameters changed, channels reset"
            );
            event = Some(CalibrationEvent::FilterChanged(next));
        }
        event
    }

    fn sample<A: AdcTransport + ?Sized>(
        &mut self,
        surface: &mut ControlSurface,
        pipeline: &mut FilterPipeline,
        bank: &mut IndicatorBank,
        adc: &mut A,
    ) -> Option<CalibrationEvent> {
        let ch = usize::from(surface.calibration_channel());
        let ma = surface.calibration_ma();
        if ch >= CHANNELS || ma_index(ma).is_none() {
            warn!(channel = ch, ma, "sampling request rejected");
            self.run = None;
            pipeline.abandon_exchange(adc);
            surface.set_calibration_step(CalibrationStep::Wait);
            return Some(CalibrationEvent::Rejected(FaultError::InvalidOperatorInput(
                format!("sampling needs channel < {CHANNELS} and {MIN_MA}..={MAX_MA} mA, got {ch}/{ma}"),
            )));
        }

        let mut run = match self.run {
            Some(r) if r.channel == ch && r.ma == ma => r,
            _ => {
                pipeline.abandon_exchange(adc);
                pipeline.reset_median(ch);
                bank.set(ch, (IndicatorMode::Flick, Color::Yellow));
                debug!(channel = ch, ma, "sampling started");
                SamplingRun {
                    channel: ch,
                    ma,
                    completed: 0,
                    sum: 0,
                }
            }
        };

        if let ExchangePoll::Completed(bytes) = pipeline.exchange_for(adc, ch) {
            // Settling samples still feed the median so it never sees zeros.
            let median = pipeline.median_push(ch, u16::from_be_bytes(bytes));
            run.completed += 1;
            if run.completed > self.cfg.settle_exchanges {
                run.sum += u64::from(median);
            }
        }

        let count = self.cfg.sample_count.max(1);
        if run.completed < self.cfg.settle_exchanges.saturating_add(count) {
            self.run = Some(run);
            return None;
        }

        let mean = u32::try_from(run.sum / u64::from(count)).unwrap_or(u32::MAX);
        if let Some(i) = ma_index(ma) {
            self.points[ch][i] = mean;
        }
        self.run = None;
        pipeline.reset_median(ch);
        bank.set(ch, (IndicatorMode::Blink, Color::Green));
        surface.set_calibration_step(CalibrationStep::Wait);
        info!(channel = ch, ma, mean, "calibration point sampled");
        Some(CalibrationEvent::PointSampled {
            channel: ch,
            ma,
            mean,
        })
    }

    fn calc(
        &mut self,
        surface: &mut ControlSurface,
        pipeline: &mut FilterPipeline,
        store: &mut CalibrationStore,
        bank: &mut IndicatorBank,
    ) -> Option<CalibrationEvent> {
        surface.set_calibration_step(CalibrationStep::Wait);
        let ch = usize::from(surface.calibration_channel());
        let Some(points) = self.points.get(ch) else {
            warn!(channel = ch, "fit requested for invalid channel");
            return Some(CalibrationEvent::Rejected(FaultError::InvalidOperatorInput(
                format!("fit needs channel < {CHANNELS}, got {ch}"),
            )));
        };
        match fit_quadratic(points) {
            Ok(curve) => {
                pipeline.set_curve(ch, curve);
                store.record_mut().curves[ch] = curve;
                pipeline.reset_all();
                info!(channel = ch, a = curve.a, b = curve.b, c = curve.c, "calibration curve fitted");
                Some(CalibrationEvent::Fitted { channel: ch, curve })
            }
            Err(e) => {
                bank.set_all((IndicatorMode::On, Color::Red));
                warn!(channel = ch, error = %e, "fit rejected, coefficients unchanged");
                Some(CalibrationEvent::Degenerate { channel: ch })
            }
        }
    }

    fn save<F: FlashTransport + ?Sized>(
        &mut self,
        surface: &mut ControlSurface,
        pipeline: &FilterPipeline,
        store: &mut CalibrationStore,
        bank: &mut IndicatorBank,
        flash: &mut F,
    ) -> Option<CalibrationEvent> {
        if !self.save_latch {
            bank.set_all((IndicatorMode::Flick, Color::Yellow));
            self.save_latch = true;
        }
        let filter = pipeline.filter();
        let record = store.record_mut();
        record.window = filter.window;
        record.exp_coefficient = filter.exp_coefficient;

        match store.poll_write(flash) {
            WritePoll::Pending => None,
            WritePoll::Done => {
                surface.set_calibration_step(CalibrationStep::Wait);
                // The latch stays set until calibration mode is re-entered.
                self.selected = NO_CHANNEL;
                bank.touch();
                Some(CalibrationEvent::Saved)
            }
            WritePoll::Failed(e) => {
                surface.set_calibration_step(CalibrationStep::Wait);
                bank.set_all_working((IndicatorMode::Blink, Color::Red));
                Some(CalibrationEvent::SaveFailed(e))
            }
        }
    }
}

fn ma_index(ma: u16) -> Option<usize> {
    (MIN_MA..=MAX_MA)
        .contains(&ma)
        .then(|| usize::from(ma - MIN_MA))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ideal_points_fit_the_identity() {
        let measured = IDEAL_CODES.map(u32::from);
        let curve = fit_quadratic(&measured).unwrap();
        assert!(curve.a.abs() < 1e-12);
        assert!((curve.b - 1.0).abs() < 1e-9);
        assert!(curve.c.abs() < 1e-4);
    }

    #[test]
    fn exact_quadratic_is_recovered() {
        let want = Curve::DEFAULT;
        let xs: Vec<f64> = (0..POINTS).map(|i| 15_000.0 + 1_900.0 * i as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|x| want.apply(*x)).collect();
        let got = fit_points(&xs, &ys).unwrap();
        assert!((got.a - want.a).abs() < 1e-12);
        assert!((got.b - want.b).abs() < 1e-7);
        assert!((got.c - want.c).abs() < 1e-3);
    }

    #[test]
    fn two_distinct_codes_are_degenerate() {
        let mut measured = [20_000u32; POINTS];
        for m in measured.iter_mut().skip(9) {
            *m = 40_000;
        }
        assert_eq!(fit_quadratic(&measured), Err(FaultError::ComputationDegenerate));
        assert_eq!(fit_quadratic(&[0; POINTS]), Err(FaultError::ComputationDegenerate));
    }

    #[test]
    fn three_distinct_codes_suffice() {
        let mut measured = [20_000u32; POINTS];
        measured[5] = 30_000;
        measured[12] = 40_000;
        assert!(fit_quadratic(&measured).is_ok());
    }

    #[test]
    fn set_point_bounds() {
        let mut e = CalibrationEngine::new(CalibrationCfg::default());
        e.set_point(2, 12, 777).unwrap();
        assert_eq!(e.points(2).unwrap()[8], 777);
        assert!(e.set_point(6, 12, 1).is_err());
        assert!(e.set_point(0, 3, 1).is_err());
        assert!(e.set_point(0, 21, 1).is_err());
    }
}
