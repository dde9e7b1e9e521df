use std::time::Duration;

use rustc_hash::FxHashMap;

use crate::{congestion::CongestionControl, EmaRtt, FlowTraceCtx};

pub type Seqno = u64;

/// Weight of the host-side smoothed RTT estimate (the classic 7/8).
const HOST_SRTT_ALPHA: f64 = 0.875;

/// Host-owned state of a single flow, as congestion control sees it. All
/// counts are in bytes; growth steps mutate `cwnd` and nothing else.
#[derive(Clone, Debug)]
pub struct FlowState {
    pub cwnd: usize,
    pub ssthresh: usize,
    pub mss: usize,
    pub bytes_in_flight: usize,
    pub min_rtt: Duration,
    pub srtt: Duration,
    pub next_tx_seqno: Seqno,
    pub last_acked_seqno: Seqno,
}

impl FlowState {
    /// Creates the state of a freshly established flow with the given
    /// segment size. The initial window follows RFC 5681.
    pub fn new(mss: usize) -> Self {
        assert!(mss > 0, "mss must be positive");
        Self {
            cwnd: (4 * mss).min((2 * mss).max(4380)),
            ssthresh: usize::MAX,
            mss,
            bytes_in_flight: 0,
            min_rtt: Duration::ZERO,
            srtt: Duration::ZERO,
            next_tx_seqno: 0,
            last_acked_seqno: 0,
        }
    }

    /// The congestion window as a count of whole segments.
    pub fn cwnd_in_segments(&self) -> usize {
        self.cwnd / self.mss
    }
}

/// A single congestion-controlled flow: the host-side state together with
/// the attached growth algorithm and a trace context.
pub struct Flow {
    state: FlowState,
    cc: Box<dyn CongestionControl + Send>,
    srtt_est: EmaRtt,
    trace: FlowTraceCtx,
}

impl Flow {
    /// Creates a new flow around the given state and algorithm.
    pub fn new(state: FlowState, cc: Box<dyn CongestionControl + Send>) -> Self {
        Self {
            state,
            cc,
            srtt_est: EmaRtt::new(HOST_SRTT_ALPHA),
            trace: FlowTraceCtx::new_random(),
        }
    }

    /// Name of the attached algorithm.
    pub fn algorithm(&self) -> &'static str {
        self.cc.name()
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    /// Mutable access for host bookkeeping outside the ack path.
    pub fn state_mut(&mut self) -> &mut FlowState {
        &mut self.state
    }

    /// Records data handed to the network.
    pub fn on_send(&mut self, bytes: usize) {
        self.state.bytes_in_flight += bytes;
        self.state.next_tx_seqno = self.state.next_tx_seqno.wrapping_add(bytes as u64);
    }

    /// Processes one acknowledgment event: updates the host RTT estimates
    /// and in-flight accounting, lets the algorithm observe the ack, then
    /// runs the growth phase the window is in. Any ack credit left over by
    /// a slow-start step that reached the threshold is spent on congestion
    /// avoidance within the same event.
    pub fn on_ack(&mut self, segments_acked: u32, rtt: Duration) {
        if self.state.min_rtt.is_zero() || rtt < self.state.min_rtt {
            self.state.min_rtt = rtt;
        }
        self.srtt_est.update(rtt);
        self.state.srtt = self.srtt_est.get();
        let acked_bytes = segments_acked as usize * self.state.mss;
        self.state.bytes_in_flight = self.state.bytes_in_flight.saturating_sub(acked_bytes);
        self.state.last_acked_seqno =
            self.state.last_acked_seqno.wrapping_add(acked_bytes as u64);

        self.cc.mark_ack(&self.state, segments_acked, rtt);

        let old_cwnd = self.state.cwnd;
        let mut remaining = segments_acked;
        if self.state.cwnd < self.state.ssthresh {
            remaining = self.cc.slow_start(&mut self.state, remaining);
        }
        if self.state.cwnd >= self.state.ssthresh && remaining > 0 {
            self.cc.congestion_avoidance(&mut self.state, remaining);
        }

        self.trace.trace_rtt(rtt);
        self.trace.trace_rto(self.state.srtt * 2);
        if self.state.cwnd != old_cwnd {
            self.trace.trace_cwnd(old_cwnd, self.state.cwnd);
        }
        self.trace
            .trace_seqnos(self.state.next_tx_seqno, self.state.last_acked_seqno);
        self.trace.trace_inflight(self.state.bytes_in_flight);
    }

    /// Host window-limit policy hook.
    pub fn set_ssthresh(&mut self, ssthresh: usize) {
        self.trace.trace_ssthresh(self.state.ssthresh, ssthresh);
        self.state.ssthresh = ssthresh;
    }

    /// Duplicates the flow, e.g. for a passive open. The copy gets an
    /// independent algorithm instance and its own trace identity.
    pub fn fork(&self) -> Flow {
        Flow {
            state: self.state.clone(),
            cc: self.cc.fork(),
            srtt_est: self.srtt_est,
            trace: FlowTraceCtx::new_random(),
        }
    }
}

/// Routes per-connection events to flows by connection identifier.
#[derive(Default)]
pub struct FlowTable {
    flows: FxHashMap<u64, Flow>,
}

impl FlowTable {
    pub fn insert(&mut self, flow_id: u64, flow: Flow) {
        self.flows.insert(flow_id, flow);
    }

    pub fn get(&self, flow_id: u64) -> Option<&Flow> {
        self.flows.get(&flow_id)
    }

    pub fn get_mut(&mut self, flow_id: u64) -> Option<&mut Flow> {
        self.flows.get_mut(&flow_id)
    }

    pub fn remove(&mut self, flow_id: u64) -> Option<Flow> {
        self.flows.remove(&flow_id)
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Routes an acknowledgment event. Returns whether the flow was known.
    pub fn on_ack(&mut self, flow_id: u64, segments_acked: u32, rtt: Duration) -> bool {
        if let Some(flow) = self.flows.get_mut(&flow_id) {
            flow.on_ack(segments_acked, rtt);
            true
        } else {
            tracing::debug!("ack for unknown flow {}", flow_id);
            false
        }
    }

    /// Duplicates `parent` under a new identifier, as on a passive open.
    /// Fails if the parent is unknown or the child identifier is taken.
    pub fn fork(&mut self, parent: u64, child: u64) -> bool {
        if self.flows.contains_key(&child) {
            return false;
        }
        if let Some(parent) = self.flows.get(&parent) {
            let forked = parent.fork();
            self.flows.insert(child, forked);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::congestion::{HyblaI, Reno};

    #[test]
    fn initial_window_follows_rfc5681() {
        // large mss: capped by 4380
        assert_eq!(FlowState::new(1460).cwnd, 4380);
        // small mss: 4 segments
        assert_eq!(FlowState::new(500).cwnd, 2000);
    }

    #[test]
    fn send_and_ack_bookkeeping() {
        let mut flow = Flow::new(FlowState::new(1000), Box::new(Reno::new()));
        flow.on_send(3000);
        assert_eq!(flow.state().bytes_in_flight, 3000);
        assert_eq!(flow.state().next_tx_seqno, 3000);
        flow.on_ack(2, Duration::from_millis(80));
        assert_eq!(flow.state().bytes_in_flight, 1000);
        assert_eq!(flow.state().last_acked_seqno, 2000);
        assert_eq!(flow.state().min_rtt, Duration::from_millis(80));
        assert_eq!(flow.state().srtt, Duration::from_millis(80));
    }

    #[test]
    fn ack_batch_straddles_the_threshold() {
        let mut flow = Flow::new(FlowState::new(1000), Box::new(Reno::new()));
        flow.state_mut().cwnd = 9000;
        flow.set_ssthresh(9500);
        flow.on_ack(3, Duration::from_millis(50));
        // one ack credit in slow start (9000 -> 10000), the other two spent
        // on avoidance: + max(1, 1000^2 / 10000) = 100
        assert_eq!(flow.state().cwnd, 10100);
    }

    #[test]
    fn table_routes_and_forks() {
        let mut table = FlowTable::default();
        table.insert(1, Flow::new(FlowState::new(1000), Box::new(HyblaI::default())));
        assert!(table.on_ack(1, 1, Duration::from_millis(100)));
        assert!(!table.on_ack(42, 1, Duration::from_millis(100)));

        assert!(table.fork(1, 2));
        assert!(!table.fork(1, 2));
        assert!(!table.fork(99, 3));

        // growing the child must leave the parent untouched
        let parent_cwnd = table.get(1).unwrap().state().cwnd;
        for _ in 0..10 {
            table.on_ack(2, 1, Duration::from_millis(100));
        }
        assert_eq!(table.get(1).unwrap().state().cwnd, parent_cwnd);
        assert!(table.get(2).unwrap().state().cwnd > parent_cwnd);
    }
}
