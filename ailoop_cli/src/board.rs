//! Simulated board assembly from the `[simulation]` config section.

use std::path::{Path, PathBuf};

use ailoop_config::{CHANNELS, Config};
use ailoop_core::{Module, ModuleCfg};
use ailoop_hardware::{Responder, SimAdc, SimAdcInputs, SimBusHandle, SimFlash, sim_bus};
use eyre::{Result, WrapErr};

/// A module wired to simulated transports, plus handles to drive them.
pub struct SimBoard {
    pub module: Module,
    pub inputs: SimAdcInputs,
    pub flash: SimFlash,
    pub bus: SimBusHandle,
}

/// Image path from the command line, else from the config.
pub fn image_path(cfg: &Config, cli: Option<PathBuf>) -> Option<PathBuf> {
    cli.or_else(|| cfg.simulation.flash_image.as_ref().map(PathBuf::from))
}

/// Flash restored from `image` when it exists, blank otherwise.
pub fn open_flash(cfg: &Config, image: Option<&Path>) -> Result<SimFlash> {
    let flash = match image {
        Some(path) if path.exists() => SimFlash::load_image(path)
            .wrap_err_with(|| format!("load flash image {}", path.display()))?,
        _ => SimFlash::new(),
    };
    Ok(flash.with_latency(cfg.simulation.flash_latency))
}

/// Frame a responding field device answers with.
fn reply_frame(channel: usize, len: usize) -> Vec<u8> {
    (0..len).map(|i| ((channel << 4) | (i & 0x0F)) as u8).collect()
}

pub fn assemble(cfg: &Config, flash: SimFlash) -> Result<SimBoard> {
    let sim = &cfg.simulation;

    let inputs = SimAdcInputs::default();
    for ch in 0..CHANNELS {
        inputs.set_current_ua(ch, sim.currents_ua[ch]);
        inputs.set_distortion(ch, sim.gain[ch], sim.offset[ch]);
    }
    inputs.set_spike_every(sim.spike_every);

    let (bus, mux, handle) = sim_bus(cfg.bus.mux_codes);
    handle.set_latency(sim.bus_latency);
    for ch in &sim.responding_channels {
        let ch = usize::from(*ch);
        handle.set_responder(ch, Responder::Reply(reply_frame(ch, sim.reply_len)));
    }

    let module = Module::builder()
        .with_adc(SimAdc::new(inputs.clone()).with_latency(sim.adc_latency))
        .with_flash(flash.clone())
        .with_bus(bus, mux)
        .with_config(ModuleCfg::from(cfg))
        .try_build()
        .wrap_err("assemble simulated module")?;

    Ok(SimBoard {
        module,
        inputs,
        flash,
        bus: handle,
    })
}

/// Ticks allowed for the boot read: every not-ready poll plus the transfer.
pub fn boot_budget(cfg: &Config) -> u64 {
    u64::from(cfg.storage.max_attempts).saturating_mul(4) + 1_000
}
