use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use ailoop_traits::{BusCompletion, BusTransport, LengthSlot, MuxSelect, Signal};
use tracing::trace;

use crate::error::HwError;
use crate::lock;

const CHANNELS: usize = 6;
const NO_SELECTION: u8 = 0xFF;

type BoxErr = Box<dyn std::error::Error + Send + Sync>;

/// Behaviour of the field device behind one multiplexer position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Responder {
    /// Never answers.
    #[default]
    Silent,
    /// Answers every receive with this frame.
    Reply(Vec<u8>),
    /// Starts a frame of this many bytes and never finishes it.
    Partial(usize),
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Transmit { remaining: u32 },
    Receive { remaining: Option<u32> },
}

#[derive(Debug)]
struct BusState {
    channel_codes: [u8; CHANNELS],
    responders: [Responder; CHANNELS],
    latency: u32,
    op: Option<Op>,
    frame: Vec<u8>,
    progress: usize,
    received: Vec<u8>,
    tx_log: Vec<(u8, Vec<u8>)>,
    receives_started: u64,
}

#[derive(Debug)]
struct Shared {
    mux: AtomicU8,
    state: Mutex<BusState>,
    tx_done: Signal,
    rx_done: LengthSlot,
}

impl Shared {
    fn channel_on_line(&self, st: &BusState) -> Option<usize> {
        let code = self.mux.load(Ordering::Acquire);
        st.channel_codes.iter().position(|c| *c == code)
    }

    // Transceiver interrupt.
    fn advance(&self, st: &mut BusState) {
        match st.op {
            Some(Op::Transmit { remaining: 0 }) => {
                st.op = None;
                self.tx_done.raise();
            }
            Some(Op::Transmit { remaining }) => {
                st.op = Some(Op::Transmit {
                    remaining: remaining - 1,
                });
            }
            Some(Op::Receive {
                remaining: Some(0),
            }) => {
                st.op = None;
                st.received = std::mem::take(&mut st.frame);
                st.progress = st.received.len();
                self.rx_done.publish(st.received.len());
            }
            Some(Op::Receive {
                remaining: Some(remaining),
            }) => {
                st.op = Some(Op::Receive {
                    remaining: Some(remaining - 1),
                });
            }
            Some(Op::Receive { remaining: None }) | None => {}
        }
    }
}

/// Half-duplex transceiver whose far end is chosen by the [`SimMux`] line.
#[derive(Debug)]
pub struct SimBus {
    shared: Arc<Shared>,
}

/// The three select lines in front of [`SimBus`].
#[derive(Debug)]
pub struct SimMux {
    shared: Arc<Shared>,
}

/// Test-side view of the simulated bus.
#[derive(Debug, Clone)]
pub struct SimBusHandle {
    shared: Arc<Shared>,
}

/// Build a transceiver, its multiplexer and a control handle sharing one
/// line. `channel_codes[i]` is the select code that routes channel `i`.
pub fn sim_bus(channel_codes: [u8; CHANNELS]) -> (SimBus, SimMux, SimBusHandle) {
    let shared = Arc::new(Shared {
        mux: AtomicU8::new(NO_SELECTION),
        state: Mutex::new(BusState {
            channel_codes,
            responders: Default::default(),
            latency: 0,
            op: None,
            frame: Vec::new(),
            progress: 0,
            received: Vec::new(),
            tx_log: Vec::new(),
            receives_started: 0,
        }),
        tx_done: Signal::new(),
        rx_done: LengthSlot::new(),
    });
    (
        SimBus {
            shared: shared.clone(),
        },
        SimMux {
            shared: shared.clone(),
        },
        SimBusHandle { shared },
    )
}

impl SimBusHandle {
    pub fn set_responder(&self, channel: usize, responder: Responder) {
        if let Some(r) = lock(&self.shared.state).responders.get_mut(channel) {
            *r = responder;
        }
    }

    /// Scheduler polls a transfer stays in flight before it completes.
    pub fn set_latency(&self, polls: u32) {
        lock(&self.shared.state).latency = polls;
    }

    pub fn mux_code(&self) -> u8 {
        self.shared.mux.load(Ordering::Acquire)
    }

    /// Transmitted frames with the select code that was on the line.
    pub fn tx_log(&self) -> Vec<(u8, Vec<u8>)> {
        lock(&self.shared.state).tx_log.clone()
    }

    pub fn receives_started(&self) -> u64 {
        lock(&self.shared.state).receives_started
    }

    pub fn in_flight(&self) -> bool {
        lock(&self.shared.state).op.is_some()
    }
}

impl MuxSelect for SimMux {
    fn select(&mut self, code: u8) {
        self.shared.mux.store(code & 0b111, Ordering::Release);
    }
}

impl BusTransport for SimBus {
    fn transmit(&mut self, data: &[u8]) -> Result<(), BoxErr> {
        let mut st = lock(&self.shared.state);
        if st.op.is_some() {
            return Err(Box::new(HwError::BusBusy));
        }
        let code = self.shared.mux.load(Ordering::Acquire);
        st.tx_log.push((code, data.to_vec()));
        st.op = Some(Op::Transmit {
            remaining: st.latency,
        });
        trace!(code, len = data.len(), "sim bus transmit");
        Ok(())
    }

    fn receive_until_idle(&mut self, max_len: usize) -> Result<(), BoxErr> {
        let mut st = lock(&self.shared.state);
        if st.op.is_some() {
            return Err(Box::new(HwError::BusBusy));
        }
        st.receives_started += 1;
        st.received.clear();
        st.progress = 0;
        let responder = self
            .shared
            .channel_on_line(&st)
            .map(|ch| st.responders[ch].clone())
            .unwrap_or_default();
        let remaining = match responder {
            Responder::Silent => None,
            Responder::Reply(mut frame) => {
                frame.truncate(max_len);
                st.frame = frame;
                Some(st.latency)
            }
            Responder::Partial(n) => {
                st.progress = n.min(max_len);
                None
            }
        };
        st.op = Some(Op::Receive { remaining });
        trace!(max_len, "sim bus receive armed");
        Ok(())
    }

    fn abort_receive(&mut self) {
        let mut st = lock(&self.shared.state);
        if matches!(st.op, Some(Op::Receive { .. })) {
            st.op = None;
            st.frame.clear();
            st.progress = 0;
        }
    }

    fn rx_progress(&self) -> usize {
        lock(&self.shared.state).progress
    }

    fn poll_completion(&mut self) -> Option<BusCompletion> {
        {
            let mut st = lock(&self.shared.state);
            self.shared.advance(&mut st);
        }
        if self.shared.tx_done.take() {
            return Some(BusCompletion::Transmitted);
        }
        self.shared.rx_done.take().map(BusCompletion::Received)
    }

    fn read_received(&mut self, buf: &mut [u8]) -> usize {
        let st = lock(&self.shared.state);
        let n = buf.len().min(st.received.len());
        buf[..n].copy_from_slice(&st.received[..n]);
        n
    }
}
