use ailoop_core::{Arbiter, BusCfg, FaultError, Module, ModuleCfg};
use ailoop_hardware::{CountingNotifier, Responder, SimAdc, SimAdcInputs, SimBusHandle, SimFlash, sim_bus};
use rstest::rstest;

fn module(cfg: ModuleCfg) -> (Module, SimBusHandle, CountingNotifier) {
    let (bus, mux, handle) = sim_bus(cfg.bus.mux_codes);
    let notifier = CountingNotifier::new();
    let mut module = Module::builder()
        .with_adc(SimAdc::new(SimAdcInputs::default()))
        .with_flash(SimFlash::new())
        .with_bus(bus, mux)
        .with_notifier(notifier.clone())
        .with_config(cfg)
        .build()
        .unwrap();
    module.boot(100).unwrap();
    (module, handle, notifier)
}

#[test]
fn reply_lands_in_the_channel_buffer() {
    let (mut m, h, notifier) = module(ModuleCfg::default());
    h.set_latency(2);
    h.set_responder(2, Responder::Reply(vec![0x10, 0x20, 0x30]));
    m.surface_mut().request_receive(2);
    for _ in 0..50 {
        m.tick();
        if m.surface().bus_flags(2).rx_completed {
            break;
        }
    }
    assert!(m.surface().bus_flags(2).rx_completed);
    assert_eq!(m.surface().received(2), &[0x10, 0x20, 0x30]);
    assert_eq!(m.scheduler().arbiter(), Arbiter::Idle);
    assert!(notifier.count() >= 2);
}

#[test]
fn transmit_uses_the_transmit_code() {
    let (mut m, h, _) = module(ModuleCfg::default());
    m.surface_mut().request_transmit(5, &[1, 2, 3, 4]);
    for _ in 0..20 {
        m.tick();
    }
    assert!(m.surface().bus_flags(5).tx_completed);
    assert_eq!(h.tx_log(), vec![(0b111, vec![1, 2, 3, 4])]);
}

#[rstest]
#[case(0)]
#[case(4)]
fn silent_channel_is_released_after_exactly_its_timeout(#[case] channel: usize) {
    let cfg = ModuleCfg::default();
    let (mut m, h, _) = module(cfg);
    m.surface_mut().request_receive(channel);

    let mut started = None;
    let mut released = None;
    for tick in 0..1_000u64 {
        let report = m.tick();
        if started.is_none() && h.receives_started() == 1 {
            started = Some(tick);
        }
        if let Some(fault) = report.bus_timeout {
            assert_eq!(
                fault,
                FaultError::CommunicationTimeout {
                    channel: channel as u8
                }
            );
            released = Some(tick);
            break;
        }
    }
    let (started, released) = (started.unwrap(), released.unwrap());
    assert_eq!(released - started + 1, u64::from(cfg.bus.timeout_ticks[channel]));
    assert_eq!(m.scheduler().active_channel(), (channel + 1) % 6);
    assert!(!m.surface().bus_flags(channel).rx_completed);
    assert_eq!(m.scheduler().timeouts()[channel], 1);
    assert!(!h.in_flight());
}

#[test]
fn timed_out_request_is_retried_on_the_next_round() {
    let cfg = ModuleCfg {
        bus: BusCfg {
            timeout_ticks: [5; 6],
            ..BusCfg::default()
        },
        ..ModuleCfg::default()
    };
    let (mut m, h, _) = module(cfg);
    m.surface_mut().request_receive(1);
    for _ in 0..60 {
        m.tick();
    }
    assert!(h.receives_started() >= 2);
    assert!(m.scheduler().timeouts()[1] >= 2);
}

#[test]
fn only_one_transaction_holds_the_line() {
    let (mut m, h, _) = module(ModuleCfg::default());
    h.set_latency(3);
    for ch in 0..6 {
        h.set_responder(ch, Responder::Reply(vec![ch as u8; 4]));
        m.surface_mut().request_transmit(ch, &[ch as u8]);
        m.surface_mut().request_receive(ch);
    }
    for _ in 0..400 {
        m.tick();
        if h.in_flight() {
            assert!(m.scheduler().arbiter().is_busy());
        }
    }
    for ch in 0..6 {
        let f = m.surface().bus_flags(ch);
        assert!(f.tx_completed && f.rx_completed, "channel {ch}: {f:?}");
        assert_eq!(m.surface().received(ch), &[ch as u8; 4]);
    }
    // Refused transfers would leave gaps; every channel transmitted once.
    assert_eq!(h.tx_log().len(), 6);
}

#[test]
fn several_flag_changes_notify_once() {
    let (mut m, _, notifier) = module(ModuleCfg::default());
    m.tick();
    let before = notifier.count();
    m.surface_mut().request_receive(0);
    m.surface_mut().request_receive(3);
    m.surface_mut().request_transmit(4, &[9]);
    m.tick();
    assert_eq!(notifier.count(), before + 1);
}

#[test]
fn partial_reception_stops_the_watchdog() {
    let (mut m, h, _) = module(ModuleCfg::default());
    h.set_responder(0, Responder::Partial(3));
    m.surface_mut().request_receive(0);
    for _ in 0..500 {
        m.tick();
    }
    assert_eq!(m.scheduler().timeouts()[0], 0);
    assert!(matches!(
        m.scheduler().arbiter(),
        Arbiter::Receiving {
            channel: 0,
            watchdog: false,
            ..
        }
    ));
}
