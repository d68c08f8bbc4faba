//! Interrupt-to-main-loop event delivery.
//!
//! Each primitive has exactly one producer (the completion interrupt) and one
//! consumer (the scheduling loop). The producer publishes with `Release`, the
//! consumer observes and clears with `AcqRel`, so data written before `raise`
//! is visible to the code that saw `take` return true.
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// One-shot completion flag.
#[derive(Debug, Default)]
pub struct Signal {
    raised: AtomicBool,
}

impl Signal {
    pub const fn new() -> Self {
        Self {
            raised: AtomicBool::new(false),
        }
    }

    /// Producer side: mark the event as happened.
    #[inline]
    pub fn raise(&self) {
        self.raised.store(true, Ordering::Release);
    }

    /// Consumer side: consume the event if it happened.
    #[inline]
    pub fn take(&self) -> bool {
        self.raised.swap(false, Ordering::AcqRel)
    }

    #[inline]
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }
}

/// Completion slot carrying a transferred length.
#[derive(Debug)]
pub struct LengthSlot {
    value: AtomicU32,
}

impl LengthSlot {
    const EMPTY: u32 = u32::MAX;

    pub const fn new() -> Self {
        Self {
            value: AtomicU32::new(Self::EMPTY),
        }
    }

    /// Producer side: publish the length of a finished transfer.
    #[inline]
    pub fn publish(&self, len: usize) {
        let len = u32::try_from(len).unwrap_or(Self::EMPTY - 1).min(Self::EMPTY - 1);
        self.value.store(len, Ordering::Release);
    }

    /// Consumer side: take the published length, leaving the slot empty.
    #[inline]
    pub fn take(&self) -> Option<usize> {
        match self.value.swap(Self::EMPTY, Ordering::AcqRel) {
            Self::EMPTY => None,
            len => Some(len as usize),
        }
    }
}

impl Default for LengthSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn signal_is_consumed_once() {
        let s = Signal::new();
        assert!(!s.take());
        s.raise();
        assert!(s.is_raised());
        assert!(s.take());
        assert!(!s.take());
    }

    #[test]
    fn length_slot_carries_zero_length() {
        let slot = LengthSlot::new();
        assert_eq!(slot.take(), None);
        slot.publish(0);
        assert_eq!(slot.take(), Some(0));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn signal_crosses_threads() {
        let s = Arc::new(Signal::new());
        let producer = s.clone();
        std::thread::spawn(move || producer.raise())
            .join()
            .unwrap();
        assert!(s.take());
    }
}
