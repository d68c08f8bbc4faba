use std::path::Path;
use std::sync::{Arc, Mutex};

use ailoop_traits::{FlashStatus, FlashTransport};
use tracing::{debug, trace};

use crate::error::HwError;
use crate::{image, lock};

pub const FLASH_CAPACITY: usize = 64 * 1024;
pub const SECTOR_SIZE: usize = 4096;
const ERASED: u8 = 0xFF;

type BoxErr = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug)]
struct FlashState {
    mem: Vec<u8>,
    latency: u32,
    busy_left: u32,
    write_enabled: bool,
    unresponsive: bool,
    pending_read: Option<Vec<u8>>,
    erase_count: u32,
    write_count: u32,
}

/// SPI NOR flash model.
///
/// Erase sets a sector to 0xFF, programming can only clear bits, and the write
/// latch drops after every erase or program like on the real part. Every
/// operation keeps the part busy for `latency` status polls.
#[derive(Debug, Clone)]
pub struct SimFlash {
    state: Arc<Mutex<FlashState>>,
}

impl Default for SimFlash {
    fn default() -> Self {
        Self::new()
    }
}

impl SimFlash {
    pub fn new() -> Self {
        Self::from_bytes(&[])
    }

    /// Flash whose leading bytes are `bytes`; the remainder is erased.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut mem = vec![ERASED; FLASH_CAPACITY];
        let n = bytes.len().min(FLASH_CAPACITY);
        mem[..n].copy_from_slice(&bytes[..n]);
        Self {
            state: Arc::new(Mutex::new(FlashState {
                mem,
                latency: 0,
                busy_left: 0,
                write_enabled: false,
                unresponsive: false,
                pending_read: None,
                erase_count: 0,
                write_count: 0,
            })),
        }
    }

    pub fn with_latency(self, polls: u32) -> Self {
        lock(&self.state).latency = polls;
        self
    }

    pub fn load_image(path: &Path) -> crate::error::Result<Self> {
        let bytes = image::read_image(path)?;
        debug!(path = %path.display(), len = bytes.len(), "flash image loaded");
        Ok(Self::from_bytes(&bytes))
    }

    pub fn save_image(&self, path: &Path) -> crate::error::Result<()> {
        let bytes = self.contents();
        image::write_atomic(path, &bytes)?;
        debug!(path = %path.display(), "flash image saved");
        Ok(())
    }

    pub fn contents(&self) -> Vec<u8> {
        lock(&self.state).mem.clone()
    }

    pub fn read_range(&self, address: usize, len: usize) -> Vec<u8> {
        let g = lock(&self.state);
        let end = address.saturating_add(len).min(g.mem.len());
        g.mem.get(address..end).map(<[u8]>::to_vec).unwrap_or_default()
    }

    /// Flip every bit of the byte at `address`.
    pub fn corrupt(&self, address: usize) {
        if let Some(b) = lock(&self.state).mem.get_mut(address) {
            *b ^= 0xFF;
        }
    }

    /// While set, the part reports busy forever.
    pub fn set_unresponsive(&self, unresponsive: bool) {
        lock(&self.state).unresponsive = unresponsive;
    }

    /// Drop volatile state: write latch, pending read, busy countdown.
    pub fn power_cycle(&self) {
        let mut g = lock(&self.state);
        g.write_enabled = false;
        g.pending_read = None;
        g.busy_left = 0;
    }

    pub fn erase_count(&self) -> u32 {
        lock(&self.state).erase_count
    }

    pub fn write_count(&self) -> u32 {
        lock(&self.state).write_count
    }
}

impl FlashState {
    fn ready(&self) -> Result<(), HwError> {
        if self.unresponsive || self.busy_left > 0 {
            Err(HwError::FlashNotReady)
        } else {
            Ok(())
        }
    }

    fn span(&self, address: u32, len: usize) -> Result<std::ops::Range<usize>, HwError> {
        let start = address as usize;
        match start.checked_add(len) {
            Some(end) if end <= self.mem.len() => Ok(start..end),
            _ => Err(HwError::OutOfRange { address, len }),
        }
    }

    fn start_operation(&mut self) {
        self.busy_left = self.latency;
    }
}

impl FlashTransport for SimFlash {
    fn status(&mut self) -> FlashStatus {
        let mut g = lock(&self.state);
        if g.unresponsive {
            return FlashStatus::Busy;
        }
        if g.busy_left > 0 {
            g.busy_left -= 1;
            return FlashStatus::Busy;
        }
        if g.write_enabled {
            FlashStatus::ReadWrite
        } else {
            FlashStatus::ReadOnly
        }
    }

    fn read(&mut self, address: u32, len: usize) -> Result<(), BoxErr> {
        let mut g = lock(&self.state);
        g.ready()?;
        let span = g.span(address, len)?;
        g.pending_read = Some(g.mem[span].to_vec());
        g.start_operation();
        trace!(address, len, "sim flash read");
        Ok(())
    }

    fn fetch_result(&mut self, buf: &mut [u8]) -> Result<(), BoxErr> {
        let mut g = lock(&self.state);
        g.ready()?;
        let data = g.pending_read.take().ok_or(HwError::FlashNotReady)?;
        let n = buf.len().min(data.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(())
    }

    fn set_write_mode(&mut self) -> Result<(), BoxErr> {
        let mut g = lock(&self.state);
        g.ready()?;
        g.write_enabled = true;
        Ok(())
    }

    fn erase_sector(&mut self, address: u32) -> Result<(), BoxErr> {
        let mut g = lock(&self.state);
        g.ready()?;
        if !g.write_enabled {
            return Err(Box::new(HwError::WriteProtected));
        }
        let base = (address as usize / SECTOR_SIZE) * SECTOR_SIZE;
        let span = g.span(base as u32, SECTOR_SIZE)?;
        g.mem[span].fill(ERASED);
        g.write_enabled = false;
        g.erase_count += 1;
        g.start_operation();
        debug!(sector = base, "sim flash sector erased");
        Ok(())
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), BoxErr> {
        let mut g = lock(&self.state);
        g.ready()?;
        if !g.write_enabled {
            return Err(Box::new(HwError::WriteProtected));
        }
        let span = g.span(address, data.len())?;
        for (cell, byte) in g.mem[span].iter_mut().zip(data) {
            *cell &= *byte;
        }
        g.write_enabled = false;
        g.write_count += 1;
        g.start_operation();
        trace!(address, len = data.len(), "sim flash programmed");
        Ok(())
    }
}
