#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and calibration-point parsing for the input module.
//!
//! - `Config` and its sections are deserialized from TOML and validated. Every
//!   section defaults to the firmware constants, so an empty file is valid.
//! - The calibration-point CSV loader enforces headers and requires one mean
//!   code for every integer mA from 4 to 20.
use serde::Deserialize;

pub const CHANNELS: usize = 6;
/// Integer mA points sampled during calibration (4..=20).
pub const POINTS: usize = 17;
pub const MAX_WINDOW: u8 = 200;

/// Calibration-point CSV schema.
///
/// Expected headers:
/// ma,code
///
/// Example:
/// ma,code
/// 4,16101
/// 5,17930
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct PointRow {
    pub ma: u8,
    pub code: u32,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct SchedulerCfg {
    /// Main-loop period; one bus watchdog tick per period.
    pub period_ms: u64,
}

impl Default for SchedulerCfg {
    fn default() -> Self {
        Self { period_ms: 1 }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct FilterCfg {
    /// Moving-average window in samples, 1..=200.
    pub window: u8,
    /// Exponential smoothing coefficient, (0.0, 1.0].
    pub exp_coefficient: f64,
}

impl Default for FilterCfg {
    fn default() -> Self {
        Self {
            window: 30,
            exp_coefficient: 0.1,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct CalibrationCfg {
    /// Exchanges discarded at the start of each sampling run.
    pub settle_exchanges: u32,
    /// Median-filtered samples averaged per calibration point.
    pub sample_count: u32,
    /// Curve used until a record is read, and whenever it is unusable.
    pub default_a: f64,
    pub default_b: f64,
    pub default_c: f64,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            settle_exchanges: 10,
            sample_count: 100_000,
            default_a: -4.180_287_149_356_397e-8,
            default_b: 1.146_119_922_916_554_4,
            default_c: 43.661_028_945_484_645,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct StorageCfg {
    pub record_address: u32,
    /// Not-ready polls tolerated by one read or write sequence.
    pub max_attempts: u32,
}

impl Default for StorageCfg {
    fn default() -> Self {
        Self {
            record_address: 0,
            max_attempts: 10_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct BusCfg {
    /// Watchdog ticks a receive may stay silent before the bus is released.
    pub timeout_ticks: [u32; CHANNELS],
    /// Analog-switch code routing each channel's receiver.
    pub mux_codes: [u8; CHANNELS],
    /// Analog-switch code for the shared transmitter.
    pub transmit_code: u8,
}

impl Default for BusCfg {
    fn default() -> Self {
        Self {
            timeout_ticks: [30, 30, 30, 30, 120, 30],
            mux_codes: [0b011, 0b010, 0b000, 0b110, 0b101, 0b100],
            transmit_code: 0b111,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

/// Inputs of the simulated board used by the CLI.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimulationCfg {
    pub currents_ua: [f64; CHANNELS],
    pub gain: [f64; CHANNELS],
    pub offset: [f64; CHANNELS],
    /// Replace every n-th conversion with a full-scale spike.
    pub spike_every: Option<u64>,
    pub adc_latency: u32,
    pub flash_latency: u32,
    pub bus_latency: u32,
    /// Channels whose field device answers receives.
    pub responding_channels: Vec<u8>,
    pub reply_len: usize,
    /// Flash image persisted between runs.
    pub flash_image: Option<String>,
}

impl Default for SimulationCfg {
    fn default() -> Self {
        Self {
            currents_ua: [12_000.0; CHANNELS],
            gain: [1.0; CHANNELS],
            offset: [0.0; CHANNELS],
            spike_every: None,
            adc_latency: 0,
            flash_latency: 2,
            bus_latency: 3,
            responding_channels: Vec::new(),
            reply_len: 16,
            flash_image: None,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerCfg,
    pub filter: FilterCfg,
    pub calibration: CalibrationCfg,
    pub storage: StorageCfg,
    pub bus: BusCfg,
    pub logging: Logging,
    pub simulation: SimulationCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Scheduler
        if self.scheduler.period_ms == 0 {
            eyre::bail!("scheduler.period_ms must be >= 1");
        }
        if self.scheduler.period_ms > 60_000 {
            eyre::bail!("scheduler.period_ms is unreasonably large (>60s)");
        }

        // Filter
        if self.filter.window == 0 || self.filter.window > MAX_WINDOW {
            eyre::bail!("filter.window must be in [1, {MAX_WINDOW}]");
        }
        let k = self.filter.exp_coefficient;
        if !(k > 0.0 && k <= 1.0) {
            eyre::bail!("filter.exp_coefficient must be in (0.0, 1.0]");
        }

        // Calibration
        if self.calibration.sample_count == 0 {
            eyre::bail!("calibration.sample_count must be >= 1");
        }
        let c = &self.calibration;
        if ![c.default_a, c.default_b, c.default_c]
            .iter()
            .all(|v| v.is_finite())
        {
            eyre::bail!("calibration.default_a/b/c must be finite");
        }

        // Storage
        if self.storage.max_attempts == 0 {
            eyre::bail!("storage.max_attempts must be >= 1");
        }

        // Bus
        if let Some(ch) = self.bus.timeout_ticks.iter().position(|t| *t == 0) {
            eyre::bail!("bus.timeout_ticks[{ch}] must be >= 1");
        }
        for (ch, code) in self.bus.mux_codes.iter().enumerate() {
            if *code > 0b111 {
                eyre::bail!("bus.mux_codes[{ch}] must fit in 3 bits");
            }
            if *code == self.bus.transmit_code {
                eyre::bail!("bus.mux_codes[{ch}] collides with bus.transmit_code");
            }
            if self.bus.mux_codes[..ch].contains(code) {
                eyre::bail!("bus.mux_codes[{ch}] duplicates an earlier channel");
            }
        }
        if self.bus.transmit_code > 0b111 {
            eyre::bail!("bus.transmit_code must fit in 3 bits");
        }

        // Logging
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never, daily, hourly");
        }

        // Simulation
        let sim = &self.simulation;
        if sim.gain.iter().any(|g| !g.is_finite() || *g <= 0.0) {
            eyre::bail!("simulation.gain entries must be finite and > 0");
        }
        if sim
            .currents_ua
            .iter()
            .chain(sim.offset.iter())
            .any(|v| !v.is_finite())
        {
            eyre::bail!("simulation.currents_ua/offset entries must be finite");
        }
        if sim
            .responding_channels
            .iter()
            .any(|ch| usize::from(*ch) >= CHANNELS)
        {
            eyre::bail!("simulation.responding_channels entries must be < {CHANNELS}");
        }

        Ok(())
    }
}

/// Mean codes for the 17 calibration points, indexed by `mA - 4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointTable {
    pub codes: [u32; POINTS],
}

impl PointTable {
    pub fn from_rows(rows: &[PointRow]) -> eyre::Result<Self> {
        let mut codes = [None; POINTS];
        for (idx, row) in rows.iter().enumerate() {
            if !(4..=20).contains(&row.ma) {
                eyre::bail!("row {}: ma must be in [4, 20], got {}", idx + 1, row.ma);
            }
            let slot = &mut codes[usize::from(row.ma - 4)];
            if slot.is_some() {
                eyre::bail!("row {}: duplicate point for {} mA", idx + 1, row.ma);
            }
            *slot = Some(row.code);
        }
        let mut out = [0u32; POINTS];
        for (i, code) in codes.iter().enumerate() {
            match code {
                Some(c) => out[i] = *c,
                None => eyre::bail!("calibration points missing {} mA", i + 4),
            }
        }
        Ok(Self { codes: out })
    }
}

impl TryFrom<&[PointRow]> for PointTable {
    type Error = eyre::Report;
    fn try_from(rows: &[PointRow]) -> Result<Self, Self::Error> {
        Self::from_rows(rows)
    }
}

pub fn load_points_csv(path: &std::path::Path) -> eyre::Result<PointTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open calibration CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["ma", "code"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "calibration CSV must have headers 'ma,code', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<PointRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }

    PointTable::try_from(rows.as_slice())
}
