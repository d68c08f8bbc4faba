//! Boot outcomes, mode switching and the tick runner on the simulated board.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use ailoop_core::{
    AiMode, BootOutcome, CalibrationRecord, Curve, FaultState, FilterCfg, IntegrityFault, Module,
    ModuleCfg, Pacing, RunOptions, StorageCfg, runner,
};
use ailoop_hardware::{RecordingIndicator, SimAdc, SimAdcInputs, SimFlash, sim_bus};
use ailoop_traits::{Color, IndicatorMode};
use rstest::rstest;

fn module(cfg: ModuleCfg, flash: SimFlash) -> (Module, SimAdcInputs, RecordingIndicator) {
    let inputs = SimAdcInputs::default();
    let panel = RecordingIndicator::new();
    let (bus, mux, _) = sim_bus(cfg.bus.mux_codes);
    let m = Module::builder()
        .with_adc(SimAdc::new(inputs.clone()))
        .with_flash(flash)
        .with_bus(bus, mux)
        .with_indicator(panel.clone())
        .with_config(cfg)
        .build()
        .unwrap();
    (m, inputs, panel)
}

fn valid_image() -> Vec<u8> {
    let mut rec = CalibrationRecord::new(Curve::IDENTITY, FilterCfg::default());
    rec.window = 10;
    rec.encode().to_vec()
}

fn corrupted_image() -> Vec<u8> {
    let mut img = valid_image();
    img[3] ^= 0x40;
    img
}

#[rstest]
#[case::loaded(SimFlash::from_bytes(&valid_image()), BootOutcome::Loaded)]
#[case::missing(SimFlash::new(), BootOutcome::Integrity(IntegrityFault::Missing))]
fn boot_outcome_drives_the_lamps(#[case] flash: SimFlash, #[case] want: BootOutcome) {
    let (mut m, _, panel) = module(ModuleCfg::default(), flash);
    assert_eq!(m.boot(100), Some(want));
    assert!(panel.lamps().iter().all(|l| *l == want.lamp()));
}

#[test]
fn corrupted_record_boots_on_defaults() {
    let (mut m, _, panel) = module(ModuleCfg::default(), SimFlash::from_bytes(&corrupted_image()));
    let outcome = m.boot(100).unwrap();
    assert!(matches!(
        outcome,
        BootOutcome::Integrity(IntegrityFault::Mismatch { .. })
    ));
    assert_eq!(m.controller().pipeline().curves(), [Curve::DEFAULT; 6]);
    assert_eq!(m.controller().filter(), FilterCfg::default());
    assert_eq!(panel.lamp(0), Some((IndicatorMode::Flick, Color::Yellow)));
}

#[test]
fn loaded_record_is_adopted_and_published() {
    let (mut m, _, _) = module(ModuleCfg::default(), SimFlash::from_bytes(&valid_image()));
    m.boot(100).unwrap();
    assert_eq!(m.controller().pipeline().curves(), [Curve::IDENTITY; 6]);
    assert_eq!(m.controller().filter().window, 10);
    assert_eq!(m.surface().filter_window(), 10);
}

#[test]
fn dead_flash_boots_red_and_keeps_measuring() {
    let flash = SimFlash::new();
    flash.set_unresponsive(true);
    let cfg = ModuleCfg {
        storage: StorageCfg {
            max_attempts: 20,
            ..StorageCfg::default()
        },
        ..ModuleCfg::default()
    };
    let (mut m, _, panel) = module(cfg, flash);
    assert_eq!(m.boot(100), Some(BootOutcome::Unavailable));
    assert_eq!(panel.lamp(5), Some((IndicatorMode::Blink, Color::Red)));
    for _ in 0..1_500 {
        m.tick();
    }
    assert!(m.surface().currents().iter().all(|ua| *ua > 4_000));
    // Healthy readings keep the fault pattern visible.
    assert_eq!(panel.lamp(5), Some((IndicatorMode::Blink, Color::Red)));
}

#[test]
fn fault_transitions_and_mode_switches() {
    let (mut m, inputs, panel) = module(ModuleCfg::default(), SimFlash::from_bytes(&valid_image()));
    inputs.set_current_ua(2, 1_000.0);
    inputs.set_current_ua(4, 23_000.0);
    m.boot(100).unwrap();
    for _ in 0..2_000 {
        m.tick();
    }
    let pipeline = m.controller().pipeline();
    assert_eq!(pipeline.channel(0).unwrap().fault(), Some(FaultState::Ok));
    assert_eq!(pipeline.channel(2).unwrap().fault(), Some(FaultState::LineBreak));
    assert_eq!(pipeline.channel(4).unwrap().fault(), Some(FaultState::ShortCircuit));
    assert_eq!(panel.lamp(0), Some((IndicatorMode::On, Color::Green)));
    assert_eq!(panel.lamp(2), Some((IndicatorMode::On, Color::Yellow)));
    assert_eq!(panel.lamp(4), Some((IndicatorMode::On, Color::Red)));

    m.surface_mut().set_mode(AiMode::Calibration);
    m.tick();
    assert!(panel.lamps().iter().all(|l| *l == (IndicatorMode::Off, Color::Green)));
    assert!(!m.controller().pipeline().exchange_in_flight());

    m.surface_mut().set_mode(AiMode::Working);
    m.tick();
    assert_eq!(panel.lamp(2), Some((IndicatorMode::On, Color::Yellow)));
    assert_eq!(panel.lamp(4), Some((IndicatorMode::On, Color::Red)));
}

#[test]
fn steady_readings_do_not_resend_lamps() {
    let (mut m, _, panel) = module(ModuleCfg::default(), SimFlash::from_bytes(&valid_image()));
    m.boot(100).unwrap();
    for _ in 0..2_000 {
        m.tick();
    }
    let before = panel.requests();
    for _ in 0..600 {
        m.tick();
    }
    assert_eq!(panel.requests(), before);
}

#[test]
fn identity_curve_reads_the_ideal_current() {
    let (mut m, inputs, _) = module(ModuleCfg::default(), SimFlash::from_bytes(&valid_image()));
    inputs.set_current_ua(3, 16_000.0);
    m.boot(100).unwrap();
    for _ in 0..3_000 {
        m.tick();
    }
    let ua = m.surface().current_ua(3).unwrap();
    assert!((i32::from(ua) - 16_000).abs() <= 2, "got {ua}");
}

#[test]
fn reset_reboots_from_flash() {
    let (mut m, _, _) = module(ModuleCfg::default(), SimFlash::from_bytes(&valid_image()));
    m.boot(100).unwrap();
    m.reset();
    assert_eq!(m.boot_outcome(), None);
    assert_eq!(m.boot(100), Some(BootOutcome::Loaded));
}

#[test]
fn runner_honours_tick_budget() {
    let (mut m, _, _) = module(ModuleCfg::default(), SimFlash::from_bytes(&valid_image()));
    let summary = runner::run(
        &mut m,
        RunOptions {
            pacing: Pacing::Direct,
            max_ticks: Some(1_200),
            shutdown: None,
        },
    )
    .unwrap();
    assert_eq!(summary.ticks, 1_200);
    assert_eq!(summary.boot, Some(BootOutcome::Loaded));
    assert!(summary.faults.iter().all(|f| *f == Some(FaultState::Ok)));
}

#[test]
fn runner_with_ticker_stops_on_shutdown() {
    let (mut m, _, _) = module(ModuleCfg::default(), SimFlash::from_bytes(&valid_image()));
    let stop = Arc::new(AtomicBool::new(true));
    let summary = runner::run(
        &mut m,
        RunOptions {
            pacing: Pacing::Ticker(Duration::from_millis(1)),
            max_ticks: None,
            shutdown: Some(stop),
        },
    )
    .unwrap();
    assert_eq!(summary.ticks, 0);

    let summary = runner::run(
        &mut m,
        RunOptions {
            pacing: Pacing::Ticker(Duration::from_millis(1)),
            max_ticks: Some(20),
            shutdown: None,
        },
    )
    .unwrap();
    assert_eq!(summary.ticks, 20);
}

#[test]
fn runner_needs_a_stop_condition() {
    let (mut m, _, _) = module(ModuleCfg::default(), SimFlash::new());
    let opts = RunOptions {
        max_ticks: None,
        ..RunOptions::default()
    };
    assert!(runner::run(&mut m, opts).is_err());
}
