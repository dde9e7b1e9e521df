use std::time::Duration;

use super::CongestionControl;
use crate::{EmaRtt, FlowState};

/// Configuration of a [HyblaI] instance. Immutable once the controller is
/// built.
#[derive(Clone, Copy, Debug)]
pub struct HyblaIConfig {
    /// Smoothing weight for the internal RTT estimate, in (0, 1]. Higher
    /// means slower adaptation.
    pub alpha: f64,
    /// In-flight/cwnd ratio beyond which growth is dampened.
    pub inflight_threshold: f64,
    /// Strength of the RTO-disparity dampening.
    pub rto_scaling: f64,
    /// Baseline RTT against which rho is normalized.
    pub reference_rtt: Duration,
}

impl Default for HyblaIConfig {
    fn default() -> Self {
        Self {
            alpha: 0.9,
            inflight_threshold: 0.8,
            rto_scaling: 1.0,
            reference_rtt: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("alpha must be in (0, 1], got {0}")]
    Alpha(f64),
    #[error("in-flight threshold must be nonnegative, got {0}")]
    InflightThreshold(f64),
    #[error("rto scaling factor must be nonnegative, got {0}")]
    RtoScaling(f64),
    #[error("reference rtt must be positive")]
    ReferenceRtt,
}

/// A tweaked version of TCP Hybla. Compared to plain [Hybla](super::Hybla),
/// rho is recalculated from a smoothed RTT rather than the raw minimum, and
/// every increment is scaled down when the network already looks saturated:
/// high in-flight ratio, an RTO estimate far above the smoothed RTT, or a
/// large gap between the send and ack sequence counters.
#[derive(Clone, Debug)]
pub struct HyblaI {
    srtt: EmaRtt,
    rho: f64,
    cwnd_cnt: f64,
    cfg: HyblaIConfig,
}

impl Default for HyblaI {
    fn default() -> Self {
        Self::new(HyblaIConfig::default()).expect("default config must validate")
    }
}

impl HyblaI {
    /// Creates a new HyblaI instance, validating the configuration.
    pub fn new(cfg: HyblaIConfig) -> Result<Self, ConfigError> {
        if !(cfg.alpha > 0.0 && cfg.alpha <= 1.0) {
            return Err(ConfigError::Alpha(cfg.alpha));
        }
        if !(cfg.inflight_threshold >= 0.0) {
            return Err(ConfigError::InflightThreshold(cfg.inflight_threshold));
        }
        if !(cfg.rto_scaling >= 0.0) {
            return Err(ConfigError::RtoScaling(cfg.rto_scaling));
        }
        if cfg.reference_rtt.is_zero() {
            return Err(ConfigError::ReferenceRtt);
        }
        Ok(Self {
            srtt: EmaRtt::new(cfg.alpha),
            rho: 1.0,
            cwnd_cnt: 0.0,
            cfg,
        })
    }

    /// Recalculates rho from the smoothed RTT, falling back to the host
    /// minimum before the first sample. Never below 1.0: a rho of exactly
    /// 1.0 means the flow is at or under the reference RTT and gets no
    /// latency-compensation boost.
    fn recalc_rho(&mut self, flow: &FlowState) {
        let effective_rtt = if self.srtt.get().is_zero() {
            flow.min_rtt
        } else {
            self.srtt.get()
        };
        let candidate = effective_rtt.as_secs_f64() / self.cfg.reference_rtt.as_secs_f64();
        self.rho = candidate.max(1.0);
        tracing::debug!("recalculated rho from srtt: rho={}", self.rho);
    }

    /// Computes the increment scaling factor from the current snapshot.
    /// Pure: no state is touched, and the result is always in [0.5, 1.0].
    fn scaling_factor(&self, flow: &FlowState) -> f64 {
        let inflight_ratio = if flow.cwnd == 0 {
            0.0
        } else {
            flow.bytes_in_flight as f64 / flow.cwnd as f64
        };
        let inflight_factor = if inflight_ratio > self.cfg.inflight_threshold {
            (1.0 - (inflight_ratio - self.cfg.inflight_threshold) * 0.5).max(0.5)
        } else {
            1.0
        };

        // the RTO here is the crude 2x-srtt estimate, not the host's real
        // retransmission timer
        let computed_rto = flow.srtt.as_secs_f64() * 2.0;
        let rto_ratio = if self.srtt.get().is_zero() {
            1.0
        } else {
            (computed_rto / self.srtt.get().as_secs_f64()).max(1.0)
        };
        let rto_factor = 1.0 / (1.0 + (rto_ratio - 1.0) * self.cfg.rto_scaling);

        let outstanding = flow.next_tx_seqno.wrapping_sub(flow.last_acked_seqno);
        let outstanding_factor = if outstanding > 2 * flow.cwnd_in_segments() as u64 {
            0.9
        } else {
            1.0
        };

        (inflight_factor * rto_factor * outstanding_factor).max(0.5)
    }
}

impl CongestionControl for HyblaI {
    fn name(&self) -> &'static str {
        "hybla-i"
    }

    fn mark_ack(&mut self, flow: &FlowState, _segments_acked: u32, rtt: Duration) {
        self.srtt.update(rtt);
        if rtt == flow.min_rtt {
            self.recalc_rho(flow);
            tracing::trace!("min rtt seen: {:?}", rtt);
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
            let scale = self.scaling_factor(flow);
            let increment = (2f64.powf(self.rho) - 1.0) * scale;
            let incr = (increment * flow.mss as f64) as usize;
            let old_cwnd = flow.cwnd;
            flow.cwnd = flow.cwnd.saturating_add(incr).min(flow.ssthresh);
            tracing::trace!(
                "slow start: cwnd {} => {} (scale {:.3})",
                old_cwnd,
                flow.cwnd,
                scale
            );
            segments_acked - 1
        } else {
            0
        }
    }

    fn congestion_avoidance(&mut self, flow: &mut FlowState, segments_acked: u32) {
        // each acked segment adds the same credit, so the per-segment loop
        // collapses into one multiply
        let seg_cwnd = flow.cwnd_in_segments().max(1);
        self.cwnd_cnt += self.rho * self.rho * segments_acked as f64 / seg_cwnd as f64;

        if self.cwnd_cnt >= 1.0 {
            let whole = self.cwnd_cnt.floor();
            self.cwnd_cnt -= whole;
            let scale = self.scaling_factor(flow);
            let incr = (whole * scale * flow.mss as f64) as usize;
            let old_cwnd = flow.cwnd;
            flow.cwnd = flow.cwnd.saturating_add(incr);
            tracing::trace!(
                "cong avoid: cwnd {} => {} (scale {:.3})",
                old_cwnd,
                flow.cwnd,
                scale
            );
        }
    }

    fn fork(&self) -> Box<dyn CongestionControl + Send> {
        Box::new(self.clone())
    }
}
