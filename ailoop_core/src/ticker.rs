//! Background scheduling tick source.
//!
//! Spawns a thread that sleeps one period on a `Clock` and sends a tick
//! number over a bounded channel. A slow consumer never queues more than one
//! tick; missed ticks are counted instead.
//!
//! Each `Ticker` owns exactly one thread, shut down and joined on drop.
use ailoop_traits::clock::Clock;
use crossbeam_channel as xch;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

pub struct Ticker {
    rx: xch::Receiver<u64>,
    missed: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl Ticker {
    pub fn spawn<C: Clock + Send + Sync + 'static>(period: Duration, clock: C) -> Self {
        let (tx, rx) = xch::bounded(1);
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let missed = Arc::new(AtomicU64::new(0));
        let missed_clone = missed.clone();

        let join_handle = std::thread::spawn(move || {
            let mut deadline = clock.now();
            let mut n: u64 = 0;
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("ticker thread received shutdown signal");
                    break;
                }
                deadline += period;
                clock.sleep_until(deadline);
                n += 1;
                match tx.try_send(n) {
                    Ok(()) => {}
                    Err(xch::TrySendError::Full(_)) => {
                        missed_clone.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(xch::TrySendError::Disconnected(_)) => {
                        tracing::debug!("ticker consumer disconnected, exiting thread");
                        break;
                    }
                }
            }
            tracing::trace!("ticker thread exiting cleanly");
        });

        Self {
            rx,
            missed,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    /// Block until the next tick, or `None` once the thread has stopped.
    pub fn wait(&self) -> Option<u64> {
        self.rx.recv().ok()
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<u64> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Ticks dropped because the consumer had not taken the previous one.
    pub fn missed(&self) -> u64 {
        self.missed.load(Ordering::Relaxed)
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => {
                    tracing::trace!("ticker thread joined successfully");
                }
                Err(e) => {
                    tracing::warn!(?e, "ticker thread panicked during shutdown");
                }
            }
        }
    }
}
