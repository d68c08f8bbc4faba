//! `From` implementations bridging `ailoop_config` types to `ailoop_core` types.

use crate::config::{BusCfg, CalibrationCfg, FilterCfg, ModuleCfg, StorageCfg};
use crate::filter::Curve;

// ── FilterCfg ────────────────────────────────────────────────────────────────

impl From<&ailoop_config::FilterCfg> for FilterCfg {
    fn from(c: &ailoop_config::FilterCfg) -> Self {
        Self {
            window: c.window,
            exp_coefficient: c.exp_coefficient,
        }
    }
}

// ── CalibrationCfg ───────────────────────────────────────────────────────────

impl From<&ailoop_config::CalibrationCfg> for CalibrationCfg {
    fn from(c: &ailoop_config::CalibrationCfg) -> Self {
        Self {
            settle_exchanges: c.settle_exchanges,
            sample_count: c.sample_count,
            default_curve: Curve {
                a: c.default_a,
                b: c.default_b,
                c: c.default_c,
            },
        }
    }
}

// ── StorageCfg ───────────────────────────────────────────────────────────────

impl From<&ailoop_config::StorageCfg> for StorageCfg {
    fn from(c: &ailoop_config::StorageCfg) -> Self {
        Self {
            record_address: c.record_address,
            max_attempts: c.max_attempts,
        }
    }
}

// ── BusCfg ───────────────────────────────────────────────────────────────────

impl From<&ailoop_config::BusCfg> for BusCfg {
    fn from(c: &ailoop_config::BusCfg) -> Self {
        Self {
            timeout_ticks: c.timeout_ticks,
            mux_codes: c.mux_codes,
            transmit_code: c.transmit_code,
        }
    }
}

// ── ModuleCfg ────────────────────────────────────────────────────────────────

impl From<&ailoop_config::Config> for ModuleCfg {
    fn from(c: &ailoop_config::Config) -> Self {
        Self {
            filter: (&c.filter).into(),
            calibration: (&c.calibration).into(),
            storage: (&c.storage).into(),
            bus: (&c.bus).into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_runtime_defaults() {
        let cfg = ailoop_config::Config::default();
        let m = ModuleCfg::from(&cfg);
        assert_eq!(m, ModuleCfg::default());
    }
}
