//! The process context: every piece of module state plus the transports it
//! drives, advanced by one `tick()` per scheduling period.

use ailoop_traits::{AdcTransport, BusTransport, FlashTransport, Indicator, MuxSelect, StatusNotifier};
use tracing::trace;

use crate::bus::BusScheduler;
use crate::calibration::CalibrationEvent;
use crate::config::ModuleCfg;
use crate::controller::{AiController, BootOutcome};
use crate::error::FaultError;
use crate::surface::ControlSurface;

pub(crate) type BoxedAdc = Box<dyn AdcTransport + Send>;
pub(crate) type BoxedFlash = Box<dyn FlashTransport + Send>;
pub(crate) type BoxedBus = Box<dyn BusTransport + Send>;
pub(crate) type BoxedMux = Box<dyn MuxSelect + Send>;
pub(crate) type BoxedIndicator = Box<dyn Indicator + Send>;
pub(crate) type BoxedNotifier = Box<dyn StatusNotifier + Send>;

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub calibration: Option<CalibrationEvent>,
    /// `CommunicationTimeout` for the bus channel released by its receive
    /// watchdog this tick.
    pub bus_timeout: Option<FaultError>,
}

pub struct Module {
    pub(crate) cfg: ModuleCfg,
    pub(crate) surface: ControlSurface,
    pub(crate) controller: AiController,
    pub(crate) scheduler: BusScheduler,
    pub(crate) adc: BoxedAdc,
    pub(crate) flash: BoxedFlash,
    pub(crate) bus: BoxedBus,
    pub(crate) mux: BoxedMux,
    pub(crate) indicator: BoxedIndicator,
    pub(crate) notifier: BoxedNotifier,
    pub(crate) ticks: u64,
}

impl core::fmt::Debug for Module {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Module")
            .field("ticks", &self.ticks)
            .field("mode", &self.controller.mode())
            .field("boot", &self.controller.boot_outcome())
            .field("bus", &self.scheduler.arbiter())
            .finish_non_exhaustive()
    }
}

impl Module {
    /// Start building a Module.
    pub fn builder() -> crate::builder::ModuleBuilder<crate::Missing, crate::Missing, crate::Missing> {
        crate::builder::ModuleBuilder::default()
    }

    /// One scheduling period: the analog side, then bus arbitration, then
    /// the bus watchdog.
    pub fn tick(&mut self) -> TickReport {
        self.ticks += 1;
        let calibration = self.controller.tick(
            &mut self.surface,
            &mut *self.adc,
            &mut *self.flash,
            &mut *self.indicator,
        );
        self.scheduler.poll(
            &mut self.surface,
            &mut *self.bus,
            &mut *self.mux,
            &mut *self.notifier,
        );
        let bus_timeout = self
            .scheduler
            .watchdog_tick(&mut *self.bus)
            .map(|channel| FaultError::CommunicationTimeout {
                channel: channel as u8,
            });
        if calibration.is_some() || bus_timeout.is_some() {
            trace!(tick = self.ticks, ?calibration, ?bus_timeout, "tick events");
        }
        TickReport {
            calibration,
            bus_timeout,
        }
    }

    /// Return every piece of state to power-on values; the transports and
    /// the surface are kept. The record is read again on the next ticks.
    pub fn reset(&mut self) {
        self.controller = AiController::new(&self.cfg);
        self.scheduler = BusScheduler::new(self.cfg.bus);
        self.ticks = 0;
    }

    /// Tick until the boot read finished, at most `max_ticks` times.
    pub fn boot(&mut self, max_ticks: u64) -> Option<BootOutcome> {
        for _ in 0..max_ticks {
            if let Some(outcome) = self.controller.boot_outcome() {
                return Some(outcome);
            }
            self.tick();
        }
        self.controller.boot_outcome()
    }

    pub fn surface(&self) -> &ControlSurface {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut ControlSurface {
        &mut self.surface
    }

    pub fn controller(&self) -> &AiController {
        &self.controller
    }

    /// Calibration points are editable so recorded sessions can be replayed.
    pub fn controller_mut(&mut self) -> &mut AiController {
        &mut self.controller
    }

    pub fn scheduler(&self) -> &BusScheduler {
        &self.scheduler
    }

    pub fn boot_outcome(&self) -> Option<BootOutcome> {
        self.controller.boot_outcome()
    }

    pub fn config(&self) -> &ModuleCfg {
        &self.cfg
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}
