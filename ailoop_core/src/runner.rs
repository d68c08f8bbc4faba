use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ailoop_traits::clock::MonotonicClock;

use crate::CHANNELS;
use crate::controller::BootOutcome;
use crate::error::Result;
use crate::filter::FaultState;
use crate::module::Module;
use crate::ticker::Ticker;

/// How scheduling ticks are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// Tick back to back, as fast as the module runs.
    Direct,
    /// One tick per period from a background `Ticker`.
    Ticker(Duration),
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub pacing: Pacing,
    /// Stop after this many ticks; `None` runs until shutdown.
    pub max_ticks: Option<u64>,
    pub shutdown: Option<Arc<AtomicBool>>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            pacing: Pacing::Direct,
            max_ticks: Some(1_000),
            shutdown: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub ticks: u64,
    pub bus_timeouts: [u64; CHANNELS],
    pub boot: Option<BootOutcome>,
    pub currents: [u16; CHANNELS],
    pub faults: [Option<FaultState>; CHANNELS],
    /// Ticks the module was too slow to take.
    pub missed_ticks: u64,
}

fn summarize(module: &Module, ticks: u64, missed_ticks: u64) -> RunSummary {
    let pipeline = module.controller().pipeline();
    RunSummary {
        ticks,
        bus_timeouts: module.scheduler().timeouts(),
        boot: module.boot_outcome(),
        currents: module.surface().currents(),
        faults: std::array::from_fn(|ch| pipeline.channel(ch).and_then(|c| c.fault())),
        missed_ticks,
    }
}

/// Drive `module` until the tick budget is spent or shutdown is requested.
pub fn run(module: &mut Module, opts: RunOptions) -> Result<RunSummary> {
    if opts.max_ticks.is_none() && opts.shutdown.is_none() {
        eyre::bail!("run needs a tick budget or a shutdown flag");
    }
    let stop = || {
        opts.shutdown
            .as_ref()
            .is_some_and(|s| s.load(Ordering::Relaxed))
    };
    let budget_left = |n: u64| opts.max_ticks.is_none_or(|max| n < max);

    let mut ticks = 0u64;
    let missed = match opts.pacing {
        Pacing::Direct => {
            while budget_left(ticks) && !stop() {
                module.tick();
                ticks += 1;
            }
            0
        }
        Pacing::Ticker(period) => {
            if period.is_zero() {
                eyre::bail!("tick period must be > 0");
            }
            let ticker = Ticker::spawn(period, MonotonicClock::new());
            // Wake up regularly so a shutdown request is seen without a tick.
            let poll = period.max(Duration::from_millis(50));
            while budget_left(ticks) && !stop() {
                if ticker.wait_timeout(poll).is_some() {
                    module.tick();
                    ticks += 1;
                }
            }
            ticker.missed()
        }
    };

    let summary = summarize(module, ticks, missed);
    tracing::info!(
        ticks = summary.ticks,
        missed = summary.missed_ticks,
        boot = summary.boot.map(BootOutcome::as_str),
        "run finished"
    );
    Ok(summary)
}
