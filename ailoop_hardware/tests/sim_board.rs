use ailoop_hardware::sim::{SimFlash, ideal_code_for_ua};
use ailoop_hardware::{Responder, SimAdc, SimAdcInputs, sim_bus};
use ailoop_traits::{AdcTransport, BusCompletion, BusTransport, FlashStatus, FlashTransport, MuxSelect};
use rstest::rstest;

const CODES: [u8; 6] = [0b011, 0b010, 0b000, 0b110, 0b101, 0b100];

#[rstest]
#[case(4_000.0, 16352)]
#[case(12_000.0, 30888)]
#[case(20_000.0, 45424)]
fn ideal_codes_follow_the_converter_slope(#[case] ua: f64, #[case] code: u16) {
    let inputs = SimAdcInputs::default();
    inputs.set_current_ua(0, ua);
    assert!((i32::from(inputs.code(0)) - i32::from(code)).abs() <= 1);
    assert!((ideal_code_for_ua(ua) - f64::from(code)).abs() <= 1.0);
}

#[test]
fn distortion_moves_the_code_affinely() {
    let inputs = SimAdcInputs::default();
    inputs.set_current_ua(2, 8_000.0);
    let clean = f64::from(inputs.code(2));
    inputs.set_distortion(2, 0.9, 500.0);
    let bent = f64::from(inputs.code(2));
    assert!((bent - (clean * 0.9 + 500.0)).abs() <= 1.0);
}

#[test]
fn spikes_replace_every_nth_conversion() {
    let inputs = SimAdcInputs::default();
    inputs.set_raw_code(0, 100);
    inputs.set_spike_every(Some(3));
    let mut adc = SimAdc::new(inputs);
    adc.chip_select(true);
    let mut codes = Vec::new();
    for _ in 0..6 {
        adc.issue([0xFD, 0xC0]).unwrap();
        codes.push(u16::from_be_bytes(adc.poll_exchange().unwrap()));
    }
    assert_eq!(codes, vec![0, 0, u16::MAX, 100, 100, u16::MAX]);
}

#[test]
fn flash_survives_clone_and_power_cycle() {
    let flash = SimFlash::new().with_latency(1);
    let mut port = flash.clone();
    while port.status() == FlashStatus::Busy {}
    port.set_write_mode().unwrap();
    port.erase_sector(0).unwrap();
    while port.status() == FlashStatus::Busy {}
    port.set_write_mode().unwrap();
    port.write(0, &[0xAA, 0x55]).unwrap();
    flash.power_cycle();
    assert_eq!(flash.read_range(0, 3), vec![0xAA, 0x55, 0xFF]);
    assert_eq!(port.status(), FlashStatus::ReadOnly);
}

#[test]
fn mux_line_decides_which_device_answers() {
    let (mut bus, mut mux, handle) = sim_bus(CODES);
    handle.set_responder(4, Responder::Reply(vec![0x10; 300]));
    mux.select(CODES[4]);
    assert_eq!(handle.mux_code(), CODES[4]);
    bus.receive_until_idle(284).unwrap();
    assert_eq!(bus.poll_completion(), Some(BusCompletion::Received(284)));

    mux.select(CODES[5]);
    bus.receive_until_idle(284).unwrap();
    assert_eq!(bus.poll_completion(), None);
    assert!(handle.in_flight());
    assert_eq!(handle.receives_started(), 2);
}
