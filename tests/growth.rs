use std::{sync::Mutex, time::Duration};

use hyblai::{
    congestion::{HyblaI, HyblaIConfig},
    init_window_tracing, Flow, FlowState,
};
use once_cell::sync::Lazy;

const MSS: usize = 1000;

static TRACE_LINES: Lazy<Mutex<Vec<String>>> = Lazy::new(|| {
    init_window_tracing(|line| TRACE_LINES.lock().unwrap().push(line));
    Mutex::new(Vec::new())
});

fn new_flow() -> Flow {
    let mut flow = Flow::new(FlowState::new(MSS), Box::new(HyblaI::default()));
    flow.set_ssthresh(64_000);
    flow
}

/// One round trip: fill the window, then ack the whole batch.
fn round(flow: &mut Flow, rtt: Duration) {
    let segments = (flow.state().cwnd / MSS) as u32;
    flow.on_send(segments as usize * MSS);
    flow.on_ack(segments, rtt);
}

#[test]
fn transfer_grows_through_both_phases() {
    Lazy::force(&TRACE_LINES);
    let mut flow = new_flow();
    let rtt = Duration::from_millis(200);

    // slow start: the window must climb monotonically to the threshold,
    // and quickly, since rho = 200ms / 50ms = 4
    let mut rounds = 0;
    while flow.state().cwnd < flow.state().ssthresh {
        let before = flow.state().cwnd;
        round(&mut flow, rtt);
        assert!(flow.state().cwnd >= before);
        rounds += 1;
        assert!(rounds < 50, "slow start did not converge");
    }
    assert!(rounds < 15);

    // congestion avoidance: still growing, never shrinking
    let mut last = flow.state().cwnd;
    let mut grown = false;
    for _ in 0..20 {
        round(&mut flow, rtt);
        assert!(flow.state().cwnd >= last);
        grown |= flow.state().cwnd > last;
        last = flow.state().cwnd;
    }
    assert!(grown);
}

#[test]
fn forked_flow_diverges_independently() {
    Lazy::force(&TRACE_LINES);
    let mut parent = new_flow();
    let rtt = Duration::from_millis(200);
    for _ in 0..3 {
        round(&mut parent, rtt);
    }

    let mut child = parent.fork();
    let snapshot = parent.state().clone();
    // drive only the child, on a much faster path
    for _ in 0..5 {
        round(&mut child, Duration::from_millis(20));
    }
    assert!(child.state().cwnd > snapshot.cwnd);
    assert_eq!(parent.state().cwnd, snapshot.cwnd);
    assert_eq!(parent.state().srtt, snapshot.srtt);
}

#[test]
fn slower_reference_flow_is_not_boosted() {
    Lazy::force(&TRACE_LINES);
    // at the reference RTT, HyblaI degenerates to reference behavior: one
    // (scaled) segment per slow-start event
    let cfg = HyblaIConfig {
        reference_rtt: Duration::from_millis(200),
        rto_scaling: 0.0,
        ..Default::default()
    };
    let mut flow = Flow::new(
        FlowState::new(MSS),
        Box::new(HyblaI::new(cfg).unwrap()),
    );
    flow.set_ssthresh(64_000);
    let before = flow.state().cwnd;
    let segments = (before / MSS) as u32;
    flow.on_send(before);
    flow.on_ack(segments, Duration::from_millis(200));
    assert_eq!(flow.state().cwnd, before + MSS);
}

#[test]
fn trace_lines_are_well_formed_json() {
    Lazy::force(&TRACE_LINES);
    let mut flow = new_flow();
    for _ in 0..5 {
        round(&mut flow, Duration::from_millis(100));
    }
    let lines = TRACE_LINES.lock().unwrap();
    assert!(!lines.is_empty());
    let mut seen_cwnd = false;
    for line in lines.iter() {
        let val: serde_json::Value = serde_json::from_str(line).unwrap();
        let ty = val.get("type").and_then(|t| t.as_str()).unwrap();
        seen_cwnd |= ty == "Cwnd";
        assert!(val.get("flow_id").is_some());
        assert!(val.get("timestamp").is_some());
    }
    assert!(seen_cwnd);
}
