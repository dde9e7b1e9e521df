use std::time::Duration;

use super::CongestionControl;
use crate::FlowState;

/// Classic, Reno-style congestion control: one segment per event in slow
/// start, `mss^2 / cwnd` bytes per batch in congestion avoidance.
#[derive(Clone, Debug, Default)]
pub struct Reno {}

impl Reno {
    /// Creates a new Reno instance.
    pub fn new() -> Self {
        Self {}
    }
}

impl CongestionControl for Reno {
    fn name(&self) -> &'static str {
        "reno"
    }

    fn mark_ack(&mut self, _flow: &FlowState, _segments_acked: u32, _rtt: Duration) {}

    fn slow_start(&mut self, flow: &mut FlowState, segments_acked: u32) -> u32 {
        if segments_acked >= 1 {
            flow.cwnd += flow.mss;
            tracing::trace!("slow start: cwnd => {}", flow.cwnd);
            segments_acked - 1
        } else {
            0
        }
    }

    fn congestion_avoidance(&mut self, flow: &mut FlowState, segments_acked: u32) {
        if segments_acked > 0 {
            let adder = (flow.mss as f64 * flow.mss as f64 / flow.cwnd.max(1) as f64).max(1.0);
            flow.cwnd += adder as usize;
            tracing::trace!("cong avoid: cwnd => {}", flow.cwnd);
        }
    }

    fn fork(&self) -> Box<dyn CongestionControl + Send> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slow_start_adds_one_segment_per_event() {
        let mut cc = Reno::new();
        let mut f = FlowState::new(1000);
        let old = f.cwnd;
        assert_eq!(cc.slow_start(&mut f, 3), 2);
        assert_eq!(f.cwnd, old + 1000);
    }

    #[test]
    fn avoidance_grows_sublinearly() {
        let mut cc = Reno::new();
        let mut f = FlowState::new(1000);
        f.cwnd = 10_000;
        cc.congestion_avoidance(&mut f, 1);
        assert_eq!(f.cwnd, 10_100);
        // very large windows still advance by at least a byte
        f.cwnd = 2_000_000;
        cc.congestion_avoidance(&mut f, 1);
        assert_eq!(f.cwnd, 2_000_001);
    }
}
