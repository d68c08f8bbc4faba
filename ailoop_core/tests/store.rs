use ailoop_core::store::{ReadPoll, WritePoll};
use ailoop_core::{
    CalibrationRecord, CalibrationStore, Curve, FaultError, FilterCfg, IntegrityFault, StorageCfg,
};
use ailoop_hardware::SimFlash;
use ailoop_traits::FlashTransport;

fn defaults() -> CalibrationRecord {
    CalibrationRecord::new(Curve::DEFAULT, FilterCfg::default())
}

fn store(max_attempts: u32) -> CalibrationStore {
    CalibrationStore::new(
        StorageCfg {
            record_address: 0,
            max_attempts,
        },
        defaults(),
    )
}

fn read_all(store: &mut CalibrationStore, flash: &mut SimFlash) -> ReadPoll {
    for _ in 0..10_000 {
        match store.poll_read(flash) {
            ReadPoll::Pending => continue,
            done => return done,
        }
    }
    panic!("read never finished");
}

fn write_all(store: &mut CalibrationStore, flash: &mut SimFlash) -> WritePoll {
    for _ in 0..10_000 {
        match store.poll_write(flash) {
            WritePoll::Pending => continue,
            done => return done,
        }
    }
    panic!("write never finished");
}

fn tuned() -> CalibrationRecord {
    let mut r = defaults();
    r.curves[0] = Curve {
        a: 2.5e-9,
        b: 1.01,
        c: -33.0,
    };
    r.curves[5] = Curve::IDENTITY;
    r.window = 120;
    r.exp_coefficient = 0.35;
    r
}

#[test]
fn record_survives_a_power_cycle() {
    let mut flash = SimFlash::new().with_latency(3);
    let mut writer = store(100);
    *writer.record_mut() = tuned();
    assert_eq!(write_all(&mut writer, &mut flash), WritePoll::Done);
    assert_eq!(flash.erase_count(), 1);
    assert_eq!(flash.write_count(), 1);

    flash.power_cycle();
    let mut reader = store(100);
    assert_eq!(read_all(&mut reader, &mut flash), ReadPoll::Loaded(tuned()));
    assert_eq!(*reader.record(), tuned());
}

#[test]
fn one_corrupted_byte_falls_back_to_defaults() {
    let mut flash = SimFlash::new().with_latency(1);
    let mut writer = store(100);
    *writer.record_mut() = tuned();
    write_all(&mut writer, &mut flash);
    flash.corrupt(60);

    let mut reader = store(100);
    match read_all(&mut reader, &mut flash) {
        ReadPoll::Failed(FaultError::DataIntegrity(IntegrityFault::Mismatch { .. })) => {}
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(*reader.record(), defaults());
}

#[test]
fn erased_part_reports_missing_checksum() {
    let mut flash = SimFlash::new();
    let mut reader = store(100);
    assert_eq!(
        read_all(&mut reader, &mut flash),
        ReadPoll::Failed(FaultError::DataIntegrity(IntegrityFault::Missing))
    );
}

#[test]
fn unresponsive_part_is_given_up_after_the_ceiling() {
    let mut flash = SimFlash::new();
    flash.set_unresponsive(true);
    let mut reader = store(25);
    let mut polls = 0;
    let outcome = loop {
        polls += 1;
        match reader.poll_read(&mut flash) {
            ReadPoll::Pending => continue,
            done => break done,
        }
    };
    assert_eq!(polls, 25);
    assert_eq!(
        outcome,
        ReadPoll::Failed(FaultError::HardwareUnavailable { attempts: 25 })
    );
    assert_eq!(*reader.record(), defaults());

    let mut writer = store(25);
    assert_eq!(
        write_all(&mut writer, &mut flash),
        WritePoll::Failed(FaultError::HardwareUnavailable { attempts: 25 })
    );
}

#[test]
fn out_of_range_window_in_a_valid_record_is_replaced() {
    let mut rec = tuned();
    rec.window = 0;
    rec.exp_coefficient = 0.0;
    let mut flash = SimFlash::from_bytes(&rec.encode());
    let mut reader = store(100);
    let ReadPoll::Loaded(got) = read_all(&mut reader, &mut flash) else {
        panic!("record should verify");
    };
    assert_eq!(got.window, 30);
    assert_eq!(got.exp_coefficient, 0.1);
    assert_eq!(got.curves, tuned().curves);
}

#[test]
fn write_never_holds_more_than_one_pending_operation() {
    let mut flash = SimFlash::new().with_latency(2);
    let mut writer = store(100);
    // A command issued while busy is refused by the part and never finishes.
    assert_eq!(write_all(&mut writer, &mut flash), WritePoll::Done);
    assert_eq!(flash.status(), ailoop_traits::FlashStatus::ReadOnly);
}

#[test]
fn abandoned_write_starts_over_from_the_erase() {
    let mut flash = SimFlash::new().with_latency(3);
    let mut writer = store(100);
    *writer.record_mut() = tuned();
    while flash.write_count() == 0 {
        assert_eq!(writer.poll_write(&mut flash), WritePoll::Pending);
    }
    assert!(writer.write_in_progress());
    assert!(writer.abort_write());
    assert!(!writer.write_in_progress());
    assert!(!writer.abort_write());

    let mut retuned = tuned();
    retuned.curves[0].c = 300.0;
    *writer.record_mut() = retuned;
    assert_eq!(write_all(&mut writer, &mut flash), WritePoll::Done);
    assert_eq!(flash.erase_count(), 2);
    assert_eq!(flash.write_count(), 2);

    flash.power_cycle();
    let mut reader = store(100);
    assert_eq!(read_all(&mut reader, &mut flash), ReadPoll::Loaded(retuned));
}

#[test]
fn busy_ceiling_applies_to_each_flash_operation() {
    // Erase and program each stay busy for 4 polls; 8 in total.
    let mut flash = SimFlash::new().with_latency(4);
    let mut writer = store(5);
    assert_eq!(write_all(&mut writer, &mut flash), WritePoll::Done);
    assert_eq!(flash.write_count(), 1);

    let mut slow = SimFlash::new().with_latency(5);
    let mut writer = store(5);
    assert_eq!(
        write_all(&mut writer, &mut slow),
        WritePoll::Failed(FaultError::HardwareUnavailable { attempts: 5 })
    );
    assert_eq!(slow.write_count(), 0);
}
