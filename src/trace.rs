use std::time::{Duration, Instant};

use once_cell::sync::{Lazy, OnceCell};
use serde::Serialize;

use crate::Seqno;

/// Window-tracing sink
static WINDOW_TRACE_SINK: OnceCell<Box<dyn Fn(String) + Sync + Send>> = OnceCell::new();

/// Initialize the window-trace sink.
pub fn init_window_tracing(per_line: impl Fn(String) + Send + Sync + 'static) {
    WINDOW_TRACE_SINK
        .set(Box::new(per_line))
        .ok()
        .expect("already initialized");
}

static START_TIME: Lazy<Instant> = Lazy::new(Instant::now);

/// A window-tracing context, one per flow.
#[derive(Clone, Debug)]
pub struct FlowTraceCtx {
    flow_uniqid: u64,
}

impl FlowTraceCtx {
    /// Creates a new, unique context.
    pub fn new_random() -> Self {
        let flow_uniqid = rand::random();
        Self { flow_uniqid }
    }

    /// Traces a congestion-window change.
    pub fn trace_cwnd(&self, old: usize, new: usize) {
        self.emit(|flow_id, timestamp| WindowTraceEvt::Cwnd {
            flow_id,
            timestamp,
            old,
            new,
        });
    }

    /// Traces a slow-start threshold change.
    pub fn trace_ssthresh(&self, old: usize, new: usize) {
        self.emit(|flow_id, timestamp| WindowTraceEvt::SsThresh {
            flow_id,
            timestamp,
            old,
            new,
        });
    }

    /// Traces an RTT sample.
    pub fn trace_rtt(&self, rtt: Duration) {
        self.emit(|flow_id, timestamp| WindowTraceEvt::Rtt {
            flow_id,
            timestamp,
            seconds: rtt.as_secs_f64(),
        });
    }

    /// Traces the RTO estimate.
    pub fn trace_rto(&self, rto: Duration) {
        self.emit(|flow_id, timestamp| WindowTraceEvt::Rto {
            flow_id,
            timestamp,
            seconds: rto.as_secs_f64(),
        });
    }

    /// Traces the send and ack sequence counters.
    pub fn trace_seqnos(&self, next_tx: Seqno, last_acked: Seqno) {
        self.emit(|flow_id, timestamp| WindowTraceEvt::Seqnos {
            flow_id,
            timestamp,
            next_tx,
            last_acked,
        });
    }

    /// Traces the bytes currently in flight.
    pub fn trace_inflight(&self, bytes: usize) {
        self.emit(|flow_id, timestamp| WindowTraceEvt::InFlight {
            flow_id,
            timestamp,
            bytes,
        });
    }

    fn emit(&self, make_evt: impl FnOnce(u64, f64) -> WindowTraceEvt) {
        if let Some(cb) = WINDOW_TRACE_SINK.get() {
            let timestamp = START_TIME.elapsed().as_secs_f64();
            let evt = make_evt(self.flow_uniqid, timestamp);
            let line = serde_json::to_string(&evt).unwrap();
            tracing::trace!("trace_window: {}", line);
            cb(line);
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum WindowTraceEvt {
    Cwnd {
        flow_id: u64,
        timestamp: f64,
        old: usize,
        new: usize,
    },
    SsThresh {
        flow_id: u64,
        timestamp: f64,
        old: usize,
        new: usize,
    },
    Rtt {
        flow_id: u64,
        timestamp: f64,
        seconds: f64,
    },
    Rto {
        flow_id: u64,
        timestamp: f64,
        seconds: f64,
    },
    Seqnos {
        flow_id: u64,
        timestamp: f64,
        next_tx: Seqno,
        last_acked: Seqno,
    },
    InFlight {
        flow_id: u64,
        timestamp: f64,
        bytes: usize,
    },
}
