//! Type-state builder for `Module`.
//!
//! The builder enforces at compile time that the ADC, the flash and the bus
//! (with its multiplexer) are provided before `build()` is available.
//! `try_build()` is always available for dynamic checks.

use std::marker::PhantomData;

use ailoop_traits::{
    AdcTransport, BusTransport, Color, FlashTransport, Indicator, IndicatorMode, MuxSelect,
    StatusNotifier,
};

use crate::bus::BusScheduler;
use crate::config::{BusCfg, CalibrationCfg, FilterCfg, ModuleCfg, StorageCfg};
use crate::controller::AiController;
use crate::error::{BuildError, Result};
use crate::module::{BoxedAdc, BoxedBus, BoxedFlash, BoxedIndicator, BoxedMux, BoxedNotifier, Module};
use crate::surface::ControlSurface;

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Renderer used when none is attached.
struct NoIndicator;

impl Indicator for NoIndicator {
    fn set_indicator(&mut self, _: u8, _: IndicatorMode, _: Color) {}
}

/// Reporting layer used when none is attached.
struct NoNotifier;

impl StatusNotifier for NoNotifier {
    fn notify_bus_status(&mut self) {}
}

pub struct ModuleBuilder<A, F, B> {
    adc: Option<BoxedAdc>,
    flash: Option<BoxedFlash>,
    bus: Option<(BoxedBus, BoxedMux)>,
    indicator: Option<BoxedIndicator>,
    notifier: Option<BoxedNotifier>,
    cfg: ModuleCfg,
    surface: Option<ControlSurface>,
    _a: PhantomData<A>,
    _f: PhantomData<F>,
    _b: PhantomData<B>,
}

impl Default for ModuleBuilder<Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            adc: None,
            flash: None,
            bus: None,
            indicator: None,
            notifier: None,
            cfg: ModuleCfg::default(),
            surface: None,
            _a: PhantomData,
            _f: PhantomData,
            _b: PhantomData,
        }
    }
}

/// Reject configurations the runtime cannot honour.
pub fn validate(cfg: &ModuleCfg) -> Result<()> {
    let invalid = |msg: &'static str| Err(eyre::Report::new(BuildError::InvalidConfig(msg)));

    if !FilterCfg::window_in_range(cfg.filter.window) {
        return invalid("filter window must be in [1, 200]");
    }
    if !FilterCfg::coefficient_in_range(cfg.filter.exp_coefficient) {
        return invalid("exp coefficient must be in (0, 1]");
    }
    if cfg.calibration.sample_count == 0 {
        return invalid("sample_count must be >= 1");
    }
    if !cfg.calibration.default_curve.is_finite() {
        return invalid("default curve coefficients must be finite");
    }
    if cfg.storage.max_attempts == 0 {
        return invalid("max_attempts must be >= 1");
    }
    if cfg.bus.timeout_ticks.contains(&0) {
        return invalid("bus timeout ticks must be >= 1");
    }
    if cfg.bus.transmit_code > 0b111 || cfg.bus.mux_codes.iter().any(|c| *c > 0b111) {
        return invalid("mux codes must fit in 3 bits");
    }
    if cfg.bus.mux_codes.contains(&cfg.bus.transmit_code) {
        return invalid("a channel mux code collides with the transmit code");
    }
    for (i, code) in cfg.bus.mux_codes.iter().enumerate() {
        if cfg.bus.mux_codes[..i].contains(code) {
            return invalid("mux codes must be distinct");
        }
    }
    Ok(())
}

impl<A, F, B> ModuleBuilder<A, F, B> {
    /// Fallible build available in any type-state; returns detailed error for missing pieces.
    pub fn try_build(self) -> Result<Module> {
        let adc = self
            .adc
            .ok_or_else(|| eyre::Report::new(BuildError::MissingAdc))?;
        let flash = self
            .flash
            .ok_or_else(|| eyre::Report::new(BuildError::MissingFlash))?;
        let (bus, mux) = self
            .bus
            .ok_or_else(|| eyre::Report::new(BuildError::MissingBus))?;
        validate(&self.cfg)?;

        let mut surface = self.surface.unwrap_or_default();
        surface.publish_filter(&self.cfg.filter);
        Ok(Module {
            cfg: self.cfg,
            surface,
            controller: AiController::new(&self.cfg),
            scheduler: BusScheduler::new(self.cfg.bus),
            adc,
            flash,
            bus,
            mux,
            indicator: self.indicator.unwrap_or_else(|| Box::new(NoIndicator)),
            notifier: self.notifier.unwrap_or_else(|| Box::new(NoNotifier)),
            ticks: 0,
        })
    }

    fn retype<A2, F2, B2>(self) -> ModuleBuilder<A2, F2, B2> {
        ModuleBuilder {
            adc: self.adc,
            flash: self.flash,
            bus: self.bus,
            indicator: self.indicator,
            notifier: self.notifier,
            cfg: self.cfg,
            surface: self.surface,
            _a: PhantomData,
            _f: PhantomData,
            _b: PhantomData,
        }
    }
}

/// Chainable setters that do not affect type-state.
impl<A, F, B> ModuleBuilder<A, F, B> {
    pub fn with_config(mut self, cfg: ModuleCfg) -> Self {
        self.cfg = cfg;
        self
    }
    pub fn with_filter(mut self, filter: FilterCfg) -> Self {
        self.cfg.filter = filter;
        self
    }
    pub fn with_calibration(mut self, calibration: CalibrationCfg) -> Self {
        self.cfg.calibration = calibration;
        self
    }
    pub fn with_storage(mut self, storage: StorageCfg) -> Self {
        self.cfg.storage = storage;
        self
    }
    pub fn with_bus_cfg(mut self, bus: BusCfg) -> Self {
        self.cfg.bus = bus;
        self
    }
    pub fn with_indicator(mut self, indicator: impl Indicator + Send + 'static) -> Self {
        self.indicator = Some(Box::new(indicator));
        self
    }
    pub fn with_notifier(mut self, notifier: impl StatusNotifier + Send + 'static) -> Self {
        self.notifier = Some(Box::new(notifier));
        self
    }
    /// Start from an existing surface instead of a default one. Its filter
    /// fields are overwritten with the configured filter.
    pub fn with_surface(mut self, surface: ControlSurface) -> Self {
        self.surface = Some(surface);
        self
    }
}

// Setters that advance type-state
impl<F, B> ModuleBuilder<Missing, F, B> {
    pub fn with_adc(mut self, adc: impl AdcTransport + Send + 'static) -> ModuleBuilder<Set, F, B> {
        self.adc = Some(Box::new(adc));
        self.retype()
    }
}

impl<A, B> ModuleBuilder<A, Missing, B> {
    pub fn with_flash(
        mut self,
        flash: impl FlashTransport + Send + 'static,
    ) -> ModuleBuilder<A, Set, B> {
        self.flash = Some(Box::new(flash));
        self.retype()
    }
}

impl<A, F> ModuleBuilder<A, F, Missing> {
    pub fn with_bus(
        mut self,
        bus: impl BusTransport + Send + 'static,
        mux: impl MuxSelect + Send + 'static,
    ) -> ModuleBuilder<A, F, Set> {
        self.bus = Some((Box::new(bus), Box::new(mux)));
        self.retype()
    }
}

impl ModuleBuilder<Set, Set, Set> {
    /// Validate and build the Module. Only available when the ADC, the flash
    /// and the bus are set.
    pub fn build(self) -> Result<Module> {
        self.try_build()
    }
}
