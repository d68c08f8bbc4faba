//! Subcommand bodies. Each one returns a JSON value and a text rendering of
//! its result; `main` prints whichever the user asked for.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use ailoop_config::{CHANNELS, Config};
use ailoop_core::calibration::{IDEAL_CODES, MAX_MA, MIN_MA};
use ailoop_core::store::{RECORD_LEN, checksum};
use ailoop_core::{
    AiMode, BootOutcome, CalibrationEvent, CalibrationRecord, CalibrationStep, Curve, FaultError,
    FilterCfg, Module, Pacing, RunOptions, fit_quadratic, runner,
};
use eyre::{Result, WrapErr};
use serde_json::{Value, json};

use crate::board::{self, SimBoard};

pub struct Output {
    pub json: Value,
    pub text: String,
}

fn curve_json(c: &Curve) -> Value {
    json!({ "a": c.a, "b": c.b, "c": c.c })
}

fn boot_name(b: Option<BootOutcome>) -> &'static str {
    b.map_or("pending", BootOutcome::as_str)
}

fn channel_arg(channel: u8) -> Result<usize> {
    let ch = usize::from(channel);
    if ch >= CHANNELS {
        return Err(FaultError::InvalidOperatorInput(format!(
            "channel must be < {CHANNELS}, got {channel}"
        ))
        .into());
    }
    Ok(ch)
}

pub struct SimulateArgs {
    pub ticks: u64,
    pub realtime: bool,
    pub until_interrupt: bool,
    pub receive: Vec<u8>,
    pub require_rx: bool,
    pub image: Option<PathBuf>,
}

pub fn simulate(cfg: &Config, args: SimulateArgs, shutdown: Arc<AtomicBool>) -> Result<Output> {
    let image = board::image_path(cfg, args.image);
    let flash = board::open_flash(cfg, image.as_deref())?;
    let SimBoard { mut module, .. } = board::assemble(cfg, flash)?;

    let receive = args
        .receive
        .iter()
        .map(|ch| channel_arg(*ch))
        .collect::<Result<Vec<_>>>()?;
    for ch in &receive {
        module.surface_mut().request_receive(*ch);
    }

    let pacing = if args.realtime || args.until_interrupt {
        Pacing::Ticker(Duration::from_millis(cfg.scheduler.period_ms))
    } else {
        Pacing::Direct
    };
    let opts = RunOptions {
        pacing,
        max_ticks: (!args.until_interrupt).then_some(args.ticks),
        shutdown: Some(shutdown),
    };
    let summary = runner::run(&mut module, opts)?;

    let surface = module.surface();
    if args.require_rx {
        if let Some(ch) = receive.iter().find(|ch| !surface.bus_flags(**ch).rx_completed) {
            return Err(FaultError::CommunicationTimeout { channel: *ch as u8 }.into());
        }
    }
    let channels: Vec<Value> = (0..CHANNELS)
        .map(|ch| {
            let flags = surface.bus_flags(ch);
            json!({
                "channel": ch,
                "current_ua": summary.currents[ch],
                "fault": summary.faults[ch].map(|f| f.as_str()),
                "rx_completed": flags.rx_completed,
                "rx_len": surface.received(ch).len(),
                "bus_timeouts": summary.bus_timeouts[ch],
            })
        })
        .collect();

    let mut text = format!(
        "boot: {}  ticks: {}  missed: {}\n",
        boot_name(summary.boot),
        summary.ticks,
        summary.missed_ticks
    );
    for ch in 0..CHANNELS {
        let fault = summary.faults[ch].map_or("-", |f| f.as_str());
        let rx = if receive.contains(&ch) {
            if surface.bus_flags(ch).rx_completed {
                format!("rx {} bytes", surface.received(ch).len())
            } else {
                format!("rx pending ({} timeouts)", summary.bus_timeouts[ch])
            }
        } else {
            String::new()
        };
        text.push_str(&format!(
            "ch{ch}: {:>6} uA  {fault:<13} {rx}\n",
            summary.currents[ch]
        ));
    }

    Ok(Output {
        json: json!({
            "boot": boot_name(summary.boot),
            "ticks": summary.ticks,
            "missed_ticks": summary.missed_ticks,
            "channels": channels,
        }),
        text,
    })
}

/// Request `step` and tick until the engine hands control back with `Wait`.
fn run_step(
    module: &mut Module,
    step: CalibrationStep,
    limit: u64,
) -> Result<Option<CalibrationEvent>> {
    module.surface_mut().set_calibration_step(step);
    let mut last = None;
    for _ in 0..limit {
        if let Some(e) = module.tick().calibration {
            last = Some(e);
        }
        if module.surface().calibration_step() == CalibrationStep::Wait {
            return Ok(last);
        }
    }
    eyre::bail!("calibration step {step:?} did not finish within {limit} ticks")
}

fn boot(module: &mut Module, cfg: &Config) -> Result<BootOutcome> {
    module
        .boot(board::boot_budget(cfg))
        .ok_or_else(|| eyre::eyre!("boot read did not finish"))
}

pub fn calibrate(cfg: &Config, channel: u8, image: Option<PathBuf>, verify_ma: u16) -> Result<Output> {
    let ch = channel_arg(channel)?;
    if !(MIN_MA..=MAX_MA).contains(&verify_ma) {
        return Err(FaultError::InvalidOperatorInput(format!(
            "verification current must be in {MIN_MA}..={MAX_MA} mA, got {verify_ma}"
        ))
        .into());
    }
    let image = board::image_path(cfg, image);
    let flash = board::open_flash(cfg, image.as_deref())?;
    let SimBoard {
        mut module,
        inputs,
        flash,
        ..
    } = board::assemble(cfg, flash)?;

    let before = boot(&mut module, cfg)?;
    tracing::info!(boot = before.as_str(), channel = ch, "calibration session start");
    module.surface_mut().set_mode(AiMode::Calibration);
    module.surface_mut().set_calibration_channel(channel);
    module.tick();

    let per_point = (u64::from(cfg.calibration.settle_exchanges)
        + u64::from(cfg.calibration.sample_count))
    .saturating_mul(8)
        + 1_000;
    let mut points = Vec::with_capacity(IDEAL_CODES.len());
    for ma in MIN_MA..=MAX_MA {
        inputs.set_current_ua(ch, f64::from(ma) * 1000.0);
        module.surface_mut().set_calibration_ma(ma);
        match run_step(&mut module, CalibrationStep::Sampling, per_point)? {
            Some(CalibrationEvent::PointSampled { mean, .. }) => points.push(mean),
            Some(CalibrationEvent::Rejected(e)) => return Err(e.into()),
            other => eyre::bail!("sampling {ma} mA ended with {other:?}"),
        }
    }

    let curve = match run_step(&mut module, CalibrationStep::Calc, 10)? {
        Some(CalibrationEvent::Fitted { curve, .. }) => curve,
        Some(CalibrationEvent::Degenerate { .. }) => return Err(FaultError::ComputationDegenerate.into()),
        Some(CalibrationEvent::Rejected(e)) => return Err(e.into()),
        other => eyre::bail!("fit ended with {other:?}"),
    };

    let save_budget = board::boot_budget(cfg).saturating_mul(4);
    match run_step(&mut module, CalibrationStep::Save, save_budget)? {
        Some(CalibrationEvent::Saved) => {}
        Some(CalibrationEvent::SaveFailed(e)) => return Err(e.into()),
        other => eyre::bail!("save ended with {other:?}"),
    }
    if let Some(path) = &image {
        flash
            .save_image(path)
            .wrap_err_with(|| format!("save flash image {}", path.display()))?;
    }

    // Power cycle onto the same part and check the record took.
    flash.power_cycle();
    let SimBoard {
        module: mut fresh,
        inputs: fresh_inputs,
        ..
    } = board::assemble(cfg, flash)?;
    match boot(&mut fresh, cfg)? {
        BootOutcome::Loaded => {}
        BootOutcome::Integrity(f) => return Err(FaultError::DataIntegrity(f).into()),
        BootOutcome::Unavailable => {
            return Err(FaultError::HardwareUnavailable {
                attempts: cfg.storage.max_attempts,
            }
            .into());
        }
    }
    let target_ua = f64::from(verify_ma) * 1000.0;
    fresh_inputs.set_current_ua(ch, target_ua);
    let settle = u64::from(cfg.filter.window) * 12 + (12.0 / cfg.filter.exp_coefficient) as u64 * 12;
    for _ in 0..settle.max(600) {
        fresh.tick();
    }
    let measured = fresh.surface().current_ua(ch).unwrap_or_default();
    let error_ua = i32::from(measured) - target_ua as i32;
    tracing::info!(channel = ch, measured, error_ua, "calibration verified");

    let mut text = format!("channel {ch} calibrated\npoints:");
    for (i, p) in points.iter().enumerate() {
        text.push_str(&format!(" {}mA={p}", i + 4));
    }
    text.push_str(&format!(
        "\ncurve: a={:e} b={} c={}\nverify: {verify_ma} mA -> {measured} uA (error {error_ua} uA)\n",
        curve.a, curve.b, curve.c
    ));
    if let Some(path) = &image {
        text.push_str(&format!("image: {}\n", path.display()));
    }

    Ok(Output {
        json: json!({
            "channel": ch,
            "points": points,
            "curve": curve_json(&curve),
            "verify": { "ma": verify_ma, "measured_ua": measured, "error_ua": error_ua },
            "image": image.as_ref().map(|p| p.display().to_string()),
        }),
        text,
    })
}

pub fn fit(points: &Path) -> Result<Output> {
    let table = ailoop_config::load_points_csv(points)?;
    let curve = fit_quadratic(&table.codes)?;
    let residuals: Vec<f64> = table
        .codes
        .iter()
        .zip(IDEAL_CODES)
        .map(|(code, ideal)| curve.apply(f64::from(*code)) - f64::from(ideal))
        .collect();
    let worst = residuals.iter().fold(0.0f64, |m, r| m.max(r.abs()));
    Ok(Output {
        json: json!({
            "curve": curve_json(&curve),
            "max_residual_codes": worst,
            "residuals": residuals,
        }),
        text: format!(
            "a = {:e}\nb = {}\nc = {}\nmax residual: {worst:.2} codes\n",
            curve.a, curve.b, curve.c
        ),
    })
}

pub fn inspect(cfg: &Config, image: &Path) -> Result<Output> {
    let bytes = ailoop_hardware::image::read_image(image)
        .wrap_err_with(|| format!("read flash image {}", image.display()))?;
    let start = cfg.storage.record_address as usize;
    let Some(raw) = bytes
        .get(start..start.saturating_add(RECORD_LEN))
        .and_then(|s| <[u8; RECORD_LEN]>::try_from(s).ok())
    else {
        eyre::bail!(
            "flash image {} holds {} bytes, record needs {RECORD_LEN} at {start:#x}",
            image.display(),
            bytes.len()
        );
    };
    let record = CalibrationRecord::decode(&raw).map_err(FaultError::DataIntegrity)?;
    let clean = record.sanitized(FilterCfg::from(&cfg.filter));

    let mut text = format!("record at {start:#x}: checksum {:#010x} ok\n", checksum(&raw));
    for (ch, c) in record.curves.iter().enumerate() {
        text.push_str(&format!("ch{ch}: a={:e} b={} c={}\n", c.a, c.b, c.c));
    }
    text.push_str(&format!(
        "window: {}  exp_coefficient: {}\n",
        record.window, record.exp_coefficient
    ));
    if clean != record {
        text.push_str(&format!(
            "filter settings out of range; the module will use window {} and exp_coefficient {}\n",
            clean.window, clean.exp_coefficient
        ));
    }

    Ok(Output {
        json: json!({
            "address": start,
            "checksum": checksum(&raw),
            "curves": record.curves.iter().map(curve_json).collect::<Vec<_>>(),
            "window": record.window,
            "exp_coefficient": record.exp_coefficient,
            "filter_in_range": clean == record,
        }),
        text,
    })
}

pub fn self_check(cfg: &Config) -> Result<Output> {
    let image = board::image_path(cfg, None);
    let flash = board::open_flash(cfg, image.as_deref())?;
    let SimBoard { mut module, .. } = board::assemble(cfg, flash)?;
    let outcome = boot(&mut module, cfg)?;
    Ok(Output {
        json: json!({ "status": "ok", "boot": outcome.as_str(), "degraded": outcome.is_degraded() }),
        text: format!("OK (boot: {})\n", outcome.as_str()),
    })
}
