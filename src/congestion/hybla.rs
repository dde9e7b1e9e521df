use std::time::Duration;

use super::CongestionControl;
use crate::FlowState;

/// Plain TCP Hybla: the congestion window grows as if the flow had the
/// reference RTT, compensating long-latency links. Rho comes straight from
/// the host's minimum observed RTT, with none of [HyblaI](super::HyblaI)'s
/// smoothing or saturation dampening.
#[derive(Clone, Debug)]
pub struct Hybla {
    rho: f64,
    cwnd_cnt: f64,
    reference_rtt: Duration,
}

impl Default for Hybla {
    fn default() -> Self {
        Self::new(Duration::from_millis(50))
    }
}

impl Hybla {
    /// Creates a new Hybla instance with the given reference RTT.
    pub fn new(reference_rtt: Duration) -> Self {
        assert!(!reference_rtt.is_zero(), "reference rtt must be positive");
        Self {
            rho: 1.0,
            cwnd_cnt: 0.0,
            reference_rtt,
        }
    }

    fn recalc_rho(&mut self, flow: &FlowState) {
        let candidate = flow.min_rtt.as_secs_f64() / self.reference_rtt.as_secs_f64();
        self.rho = candidate.max(1.0);
        tracing::debug!("recalculated rho from min rtt: rho={}", self.rho);
    }
}

impl CongestionControl for Hybla {
    fn name(&self) -> &'static str {
        "hybla"
    }

    fn mark_ack(&mut self, flow: &FlowState, _segments_acked: u32, rtt: Duration) {
        if rtt <= flow.min_rtt {
            self.recalc_rho(flow);
        }
    }

    fn slow_start(&mut self, flow: &mut FlowState, segments_acked: u32) -> u32 {
        assert!(
            flow.cwnd <= flow.ssthresh,
            "slow start with cwnd {} above ssthresh {}",
            flow.cwnd,
            flow.ssthresh
        );

        if segments_acked >= 1 {
            let increment = 2f64.powf(self.rho) - 1.0;
            let incr = (increment * flow.mss as f64) as usize;
            flow.cwnd = flow.cwnd.saturating_add(incr).min(flow.ssthresh);
            tracing::trace!("slow start: cwnd => {}", flow.cwnd);
            segments_acked - 1
        } else {
            0
        }
    }

    fn congestion_avoidance(&mut self, flow: &mut FlowState, segments_acked: u32) {
        let seg_cwnd = flow.cwnd_in_segments().max(1);
        self.cwnd_cnt += self.rho * self.rho * segments_acked as f64 / seg_cwnd as f64;

        if self.cwnd_cnt >= 1.0 {
            let whole = self.cwnd_cnt.floor();
            self.cwnd_cnt -= whole;
            flow.cwnd = flow.cwnd.saturating_add(whole as usize * flow.mss);
            tracing::trace!("cong avoid: cwnd => {}", flow.cwnd);
        }
    }

    fn fork(&self) -> Box<dyn CongestionControl + Send> {
        Box::new(self.clone())
    }
}
