use std::time::Duration;

use crate::FlowState;

mod hybla;
mod hybla_i;
mod reno;
pub use hybla::*;
pub use hybla_i::*;
pub use reno::*;

/// A window-growth algorithm attached to a single flow. The host owns the
/// [FlowState] and picks the growth phase; implementations only ever *add*
/// to the congestion window.
pub trait CongestionControl {
    /// Name of the algorithm, for logs and traces.
    fn name(&self) -> &'static str;

    /// React to an incoming acknowledgement of one or more segments, with
    /// the RTT sample the host measured for it. Must not touch the window.
    fn mark_ack(&mut self, flow: &FlowState, segments_acked: u32, rtt: Duration);

    /// One exponential-phase growth step. Only valid while the window is at
    /// or below the slow-start threshold. Returns the number of ack credits
    /// left over for a congestion-avoidance step in the same event.
    fn slow_start(&mut self, flow: &mut FlowState, segments_acked: u32) -> u32;

    /// One linear-phase growth step for a batch of acked segments.
    fn congestion_avoidance(&mut self, flow: &mut FlowState, segments_acked: u32);

    /// Makes an independent copy for a forked flow, e.g. on passive-open
    /// duplication. No state is shared with the original afterwards.
    fn fork(&self) -> Box<dyn CongestionControl + Send>;
}
