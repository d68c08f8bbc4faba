//! Per-tick driver of the analog side: boot, mode switching and dispatch to
//! either acquisition or calibration.

use ailoop_traits::{AdcTransport, Color, FlashTransport, Indicator, IndicatorMode};
use tracing::{debug, info, warn};

use crate::calibration::{CalibrationEngine, CalibrationEvent};
use crate::config::{FilterCfg, ModuleCfg};
use crate::error::{FaultError, IntegrityFault};
use crate::filter::FaultState;
use crate::indicator::{IndicatorBank, Lamp};
use crate::pipeline::FilterPipeline;
use crate::store::{CalibrationRecord, CalibrationStore, ReadPoll};
use crate::surface::{AiMode, ControlSurface};

/// How the calibration record was obtained at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    Loaded,
    Integrity(IntegrityFault),
    /// The medium never became ready; defaults are in use.
    Unavailable,
}

impl BootOutcome {
    /// Pattern shown on every channel after boot.
    pub fn lamp(self) -> Lamp {
        match self {
            Self::Loaded => (IndicatorMode::On, Color::Green),
            Self::Integrity(IntegrityFault::Mismatch { .. }) => (IndicatorMode::Flick, Color::Yellow),
            Self::Integrity(IntegrityFault::Missing) => (IndicatorMode::Blink, Color::Yellow),
            Self::Unavailable => (IndicatorMode::Blink, Color::Red),
        }
    }

    pub fn is_degraded(self) -> bool {
        self != Self::Loaded
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loaded => "loaded",
            Self::Integrity(IntegrityFault::Mismatch { .. }) => "checksum-mismatch",
            Self::Integrity(IntegrityFault::Missing) => "checksum-missing",
            Self::Unavailable => "storage-unavailable",
        }
    }
}

#[derive(Debug)]
pub struct AiController {
    pipeline: FilterPipeline,
    engine: CalibrationEngine,
    store: CalibrationStore,
    bank: IndicatorBank,
    mode: AiMode,
    boot: Option<BootOutcome>,
}

impl AiController {
    pub fn new(cfg: &ModuleCfg) -> Self {
        let defaults = CalibrationRecord::new(cfg.calibration.default_curve, cfg.filter);
        Self {
            pipeline: FilterPipeline::new(cfg.filter, cfg.calibration.default_curve),
            engine: CalibrationEngine::new(cfg.calibration),
            store: CalibrationStore::new(cfg.storage, defaults),
            bank: IndicatorBank::default(),
            mode: AiMode::Working,
            boot: None,
        }
    }

    /// Run one tick. Until the record is read this only advances the boot
    /// read; afterwards it follows the mode on the surface.
    pub fn tick<A, F, I>(
        &mut self,
        surface: &mut ControlSurface,
        adc: &mut A,
        flash: &mut F,
        indicator: &mut I,
    ) -> Option<CalibrationEvent>
    where
        A: AdcTransport + ?Sized,
        F: FlashTransport + ?Sized,
        I: Indicator + ?Sized,
    {
        let event = match self.boot {
            None => {
                self.boot_step(surface, flash);
                None
            }
            Some(boot) => {
                let mode = surface.mode();
                if mode != self.mode {
                    self.switch_mode(mode, adc);
                }
                match mode {
                    AiMode::Working => {
                        self.acquire(surface, adc, boot);
                        None
                    }
                    AiMode::Calibration => self.engine.step(
                        surface,
                        &mut self.pipeline,
                        &mut self.store,
                        &mut self.bank,
                        adc,
                        flash,
                    ),
                }
            }
        };
        self.bank.flush(indicator);
        event
    }

    fn boot_step<F: FlashTransport + ?Sized>(&mut self, surface: &mut ControlSurface, flash: &mut F) {
        let (record, outcome) = match self.store.poll_read(flash) {
            ReadPoll::Pending => return,
            ReadPoll::Loaded(record) => (record, BootOutcome::Loaded),
            ReadPoll::Failed(FaultError::DataIntegrity(fault)) => {
                (*self.store.defaults(), BootOutcome::Integrity(fault))
            }
            ReadPoll::Failed(_) => (*self.store.defaults(), BootOutcome::Unavailable),
        };
        for (ch, curve) in record.curves.iter().enumerate() {
            self.pipeline.set_curve(ch, *curve);
        }
        self.pipeline.set_filter(record.filter());
        self.pipeline.reset_all();
        surface.publish_filter(&record.filter());
        self.bank.set_all_working(outcome.lamp());
        self.boot = Some(outcome);
        if outcome.is_degraded() {
            warn!(outcome = outcome.as_str(), "boot finished on default calibration");
        } else {
            info!(outcome = outcome.as_str(), "boot finished");
        }
    }

    fn switch_mode<A: AdcTransport + ?Sized>(&mut self, mode: AiMode, adc: &mut A) {
        self.pipeline.abandon_exchange(adc);
        // A save cut short by the switch starts over from the erase.
        self.store.abort_write();
        self.bank.touch();
        match mode {
            AiMode::Working => self.bank.restore_working(),
            AiMode::Calibration => self.engine.enter_calibration(&mut self.bank),
        }
        info!(from = self.mode.as_str(), to = mode.as_str(), "mode switched");
        self.mode = mode;
    }

    fn acquire<A: AdcTransport + ?Sized>(
        &mut self,
        surface: &mut ControlSurface,
        adc: &mut A,
        boot: BootOutcome,
    ) {
        let Some(reading) = self.pipeline.step(adc) else {
            return;
        };
        surface.publish_current(reading.channel, reading.current_ua);
        if let Some(state) = reading.transition {
            // A degraded boot keeps its pattern on healthy channels.
            let lamp = match state {
                FaultState::Ok if boot.is_degraded() => boot.lamp(),
                _ => state.indicator(),
            };
            self.bank.set_working(reading.channel, lamp);
            debug!(
                channel = reading.channel,
                current_ua = reading.current_ua,
                state = state.as_str(),
                "fault class changed"
            );
        }
    }

    pub fn boot_outcome(&self) -> Option<BootOutcome> {
        self.boot
    }

    pub fn mode(&self) -> AiMode {
        self.mode
    }

    pub fn pipeline(&self) -> &FilterPipeline {
        &self.pipeline
    }

    pub fn engine(&self) -> &CalibrationEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut CalibrationEngine {
        &mut self.engine
    }

    pub fn store(&self) -> &CalibrationStore {
        &self.store
    }

    pub fn indicators(&self) -> &IndicatorBank {
        &self.bank
    }

    pub fn filter(&self) -> FilterCfg {
        self.pipeline.filter()
    }
}
