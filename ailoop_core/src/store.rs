//! Flash-backed calibration record.
//!
//! One fixed 160-byte little-endian record lives at `record_address`:
//!
//! | offset | field |
//! |---|---|
//! | 0 | `a[6]` f64 |
//! | 48 | `b[6]` f64 |
//! | 96 | `c[6]` f64 |
//! | 144 | exponential coefficient f64 |
//! | 152 | checksum u32 |
//! | 156 | moving-average window u8 |
//! | 157 | zero padding |
//!
//! The checksum is CRC-32/MPEG-2 over the whole record with the checksum
//! field zeroed. Reads and writes are per-tick state machines that never
//! wait on the medium; each not-ready poll counts against `max_attempts`.

use ailoop_traits::{FlashStatus, FlashTransport};
use tracing::{debug, info, trace, warn};

use crate::CHANNELS;
use crate::config::{FilterCfg, StorageCfg};
use crate::error::{FaultError, IntegrityFault};
use crate::filter::Curve;
use crate::hw_error::map_hw_error;

pub const RECORD_LEN: usize = 160;
const A_OFFSET: usize = 0;
const B_OFFSET: usize = 48;
const C_OFFSET: usize = 96;
const EXP_OFFSET: usize = 144;
const CRC_OFFSET: usize = 152;
const WINDOW_OFFSET: usize = 156;

const CRC32: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_MPEG_2);

/// Persisted coefficients and filter settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationRecord {
    pub curves: [Curve; CHANNELS],
    pub exp_coefficient: f64,
    pub window: u8,
}

impl CalibrationRecord {
    pub fn new(curve: Curve, filter: FilterCfg) -> Self {
        Self {
            curves: [curve; CHANNELS],
            exp_coefficient: filter.exp_coefficient,
            window: filter.window,
        }
    }

    pub fn filter(&self) -> FilterCfg {
        FilterCfg {
            window: self.window,
            exp_coefficient: self.exp_coefficient,
        }
    }

    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let mut out = [0u8; RECORD_LEN];
        for (ch, curve) in self.curves.iter().enumerate() {
            put_f64(&mut out, A_OFFSET + ch * 8, curve.a);
            put_f64(&mut out, B_OFFSET + ch * 8, curve.b);
            put_f64(&mut out, C_OFFSET + ch * 8, curve.c);
        }
        put_f64(&mut out, EXP_OFFSET, self.exp_coefficient);
        out[WINDOW_OFFSET] = self.window;
        let crc = checksum(&out);
        out[CRC_OFFSET..CRC_OFFSET + 4].copy_from_slice(&crc.to_le_bytes());
        out
    }

    /// Verify the checksum and decode. Field ranges are not checked here.
    pub fn decode(bytes: &[u8; RECORD_LEN]) -> Result<Self, IntegrityFault> {
        let stored = stored_checksum(bytes);
        if stored == 0 || stored == u32::MAX {
            return Err(IntegrityFault::Missing);
        }
        let computed = checksum(bytes);
        if stored != computed {
            return Err(IntegrityFault::Mismatch { stored, computed });
        }
        let curves = std::array::from_fn(|ch| Curve {
            a: get_f64(bytes, A_OFFSET + ch * 8),
            b: get_f64(bytes, B_OFFSET + ch * 8),
            c: get_f64(bytes, C_OFFSET + ch * 8),
        });
        Ok(Self {
            curves,
            exp_coefficient: get_f64(bytes, EXP_OFFSET),
            window: bytes[WINDOW_OFFSET],
        })
    }

    /// Replace out-of-range filter settings with `defaults`.
    pub fn sanitized(mut self, defaults: FilterCfg) -> Self {
        if !FilterCfg::window_in_range(self.window) {
            self.window = defaults.window;
        }
        if !FilterCfg::coefficient_in_range(self.exp_coefficient) {
            self.exp_coefficient = defaults.exp_coefficient;
        }
        self
    }
}

/// CRC over `bytes` with the checksum field treated as zero.
pub fn checksum(bytes: &[u8; RECORD_LEN]) -> u32 {
    let mut digest = CRC32.digest();
    digest.update(&bytes[..CRC_OFFSET]);
    digest.update(&[0u8; 4]);
    digest.update(&bytes[CRC_OFFSET + 4..]);
    digest.finalize()
}

pub fn stored_checksum(bytes: &[u8; RECORD_LEN]) -> u32 {
    let mut crc = [0u8; 4];
    crc.copy_from_slice(&bytes[CRC_OFFSET..CRC_OFFSET + 4]);
    u32::from_le_bytes(crc)
}

fn put_f64(out: &mut [u8; RECORD_LEN], at: usize, v: f64) {
    out[at..at + 8].copy_from_slice(&v.to_le_bytes());
}

fn get_f64(bytes: &[u8; RECORD_LEN], at: usize) -> f64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&bytes[at..at + 8]);
    f64::from_le_bytes(b)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadStep {
    Issue,
    Fetch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteStep {
    Erase,
    Program,
    Finish,
}

/// Result of one read-sequence poll.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadPoll {
    Pending,
    /// The record was read and verified and is now held by the store.
    Loaded(CalibrationRecord),
    /// Reading failed; the store now holds the defaults.
    Failed(FaultError),
}

/// Result of one write-sequence poll.
#[derive(Debug, Clone, PartialEq)]
pub enum WritePoll {
    Pending,
    Done,
    Failed(FaultError),
}

/// Holder of the in-memory record and both flash sequences.
#[derive(Debug)]
pub struct CalibrationStore {
    cfg: StorageCfg,
    defaults: CalibrationRecord,
    record: CalibrationRecord,
    read_step: ReadStep,
    write_step: WriteStep,
    attempts: u32,
}

impl CalibrationStore {
    pub fn new(cfg: StorageCfg, defaults: CalibrationRecord) -> Self {
        Self {
            cfg,
            defaults,
            record: defaults,
            read_step: ReadStep::Issue,
            write_step: WriteStep::Erase,
            attempts: 0,
        }
    }

    pub fn record(&self) -> &CalibrationRecord {
        &self.record
    }

    pub fn record_mut(&mut self) -> &mut CalibrationRecord {
        &mut self.record
    }

    pub fn defaults(&self) -> &CalibrationRecord {
        &self.defaults
    }

    /// A write sequence has started and not yet finished or failed.
    pub fn write_in_progress(&self) -> bool {
        self.write_step != WriteStep::Erase
    }

    /// Drop an unfinished write so the next save starts from the erase.
    /// Returns whether a write was in progress.
    pub fn abort_write(&mut self) -> bool {
        let was = self.write_in_progress() || self.attempts > 0;
        if was {
            debug!(step = ?self.write_step, "record write abandoned");
        }
        self.write_step = WriteStep::Erase;
        self.attempts = 0;
        was
    }

    /// Count one unproductive poll. Returns the fault once the ceiling is hit.
    fn spend_attempt(&mut self) -> Option<FaultError> {
        self.attempts += 1;
        if self.attempts >= self.cfg.max_attempts {
            let attempts = self.attempts;
            self.attempts = 0;
            Some(FaultError::HardwareUnavailable { attempts })
        } else {
            None
        }
    }

    /// Advance the read sequence by one step.
    pub fn poll_read<F: FlashTransport + ?Sized>(&mut self, flash: &mut F) -> ReadPoll {
        if flash.status() == FlashStatus::Busy {
            return self.read_not_ready();
        }
        match self.read_step {
            ReadStep::Issue => match flash.read(self.cfg.record_address, RECORD_LEN) {
                Ok(()) => {
                    trace!(address = self.cfg.record_address, "record read issued");
                    self.read_step = ReadStep::Fetch;
                    ReadPoll::Pending
                }
                Err(e) => {
                    warn!(error = %map_hw_error(&*e), "record read refused");
                    self.read_not_ready()
                }
            },
            ReadStep::Fetch => {
                let mut bytes = [0u8; RECORD_LEN];
                if let Err(e) = flash.fetch_result(&mut bytes) {
                    warn!(error = %map_hw_error(&*e), "record fetch failed");
                    self.read_step = ReadStep::Issue;
                    return self.read_not_ready();
                }
                self.read_step = ReadStep::Issue;
                self.attempts = 0;
                match CalibrationRecord::decode(&bytes) {
                    Ok(rec) => {
                        self.record = rec.sanitized(self.defaults.filter());
                        info!(
                            window = self.record.window,
                            exp_coefficient = self.record.exp_coefficient,
                            "calibration record loaded"
                        );
                        ReadPoll::Loaded(self.record)
                    }
                    Err(fault) => {
                        warn!(%fault, "calibration record rejected, using defaults");
                        self.record = self.defaults;
                        ReadPoll::Failed(FaultError::DataIntegrity(fault))
                    }
                }
            }
        }
    }

    fn read_not_ready(&mut self) -> ReadPoll {
        match self.spend_attempt() {
            Some(fault) => {
                warn!(%fault, "flash unusable, using defaults");
                self.read_step = ReadStep::Issue;
                self.record = self.defaults;
                ReadPoll::Failed(fault)
            }
            None => ReadPoll::Pending,
        }
    }

    /// Advance the write sequence by one step: erase, program, finish.
    pub fn poll_write<F: FlashTransport + ?Sized>(&mut self, flash: &mut F) -> WritePoll {
        let status = flash.status();
        if status == FlashStatus::Busy {
            return self.write_not_ready();
        }
        if self.write_step == WriteStep::Finish {
            self.write_step = WriteStep::Erase;
            self.attempts = 0;
            info!(address = self.cfg.record_address, "calibration record saved");
            return WritePoll::Done;
        }
        if status == FlashStatus::ReadOnly {
            // The write latch drops after every erase or program.
            return match flash.set_write_mode() {
                Ok(()) => WritePoll::Pending,
                Err(e) => {
                    warn!(error = %map_hw_error(&*e), "write enable refused");
                    self.write_not_ready()
                }
            };
        }
        let result = match self.write_step {
            WriteStep::Erase => flash.erase_sector(self.cfg.record_address).map(|()| {
                debug!(address = self.cfg.record_address, "record sector erased");
                WriteStep::Program
            }),
            WriteStep::Program | WriteStep::Finish => {
                let bytes = self.record.encode();
                flash.write(self.cfg.record_address, &bytes).map(|()| {
                    debug!(crc = stored_checksum(&bytes), "record programmed");
                    WriteStep::Finish
                })
            }
        };
        match result {
            Ok(next) => {
                // The ceiling applies to each pending operation on its own.
                self.write_step = next;
                self.attempts = 0;
                WritePoll::Pending
            }
            Err(e) => {
                warn!(step = ?self.write_step, error = %map_hw_error(&*e), "flash write step refused");
                self.write_not_ready()
            }
        }
    }

    fn write_not_ready(&mut self) -> WritePoll {
        match self.spend_attempt() {
            Some(fault) => {
                warn!(%fault, "calibration record not saved");
                self.write_step = WriteStep::Erase;
                WritePoll::Failed(fault)
            }
            None => WritePoll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> CalibrationRecord {
        let mut r = CalibrationRecord::new(Curve::DEFAULT, FilterCfg::default());
        r.curves[2] = Curve {
            a: 1e-9,
            b: 0.99,
            c: -12.5,
        };
        r.window = 77;
        r.exp_coefficient = 0.25;
        r
    }

    #[test]
    fn layout_offsets() {
        let r = sample_record();
        let bytes = r.encode();
        assert_eq!(get_f64(&bytes, B_OFFSET + 16), 0.99);
        assert_eq!(get_f64(&bytes, EXP_OFFSET), 0.25);
        assert_eq!(bytes[WINDOW_OFFSET], 77);
        assert_eq!(&bytes[157..], &[0, 0, 0]);
        assert_eq!(stored_checksum(&bytes), checksum(&bytes));
        assert_eq!(CalibrationRecord::decode(&bytes), Ok(r));
    }

    #[test]
    fn erased_record_is_missing() {
        assert_eq!(
            CalibrationRecord::decode(&[0xFF; RECORD_LEN]),
            Err(IntegrityFault::Missing)
        );
        assert_eq!(
            CalibrationRecord::decode(&[0; RECORD_LEN]),
            Err(IntegrityFault::Missing)
        );
    }

    #[test]
    fn any_flipped_byte_is_a_mismatch() {
        let good = sample_record().encode();
        for at in [0, 47, 100, 150, 156, 159] {
            let mut bad = good;
            bad[at] ^= 0x01;
            assert!(matches!(
                CalibrationRecord::decode(&bad),
                Err(IntegrityFault::Mismatch { .. })
            ));
        }
    }

    #[test]
    fn sanitize_replaces_out_of_range_filter_values() {
        let mut r = sample_record();
        r.window = 0;
        r.exp_coefficient = 3.0;
        let s = r.sanitized(FilterCfg::default());
        assert_eq!(s.window, 30);
        assert_eq!(s.exp_coefficient, 0.1);
        assert_eq!(s.curves, r.curves);
    }
}
