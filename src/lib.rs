//! A congestion-control engine built around HyblaI, a tweaked version of TCP
//! Hybla for links where the round-trip time dwarfs that of a "reference"
//! terrestrial connection.
//!
//! The engine is a pure decision module: the host transport stack owns the
//! flow state ([FlowState]), decides which growth phase applies, and calls
//! into a boxed [congestion::CongestionControl] on every acknowledgment
//! event. Nothing here blocks or does I/O.

use std::time::Duration;

pub mod congestion;
mod flow;
mod trace;

pub use flow::*;
pub use trace::*;

/// An exponentially-weighted RTT estimator. A zero duration doubles as the
/// "no sample yet" sentinel: the first sample is taken verbatim, later
/// samples are blended with weight `alpha` on the old estimate.
#[derive(Clone, Copy, Debug)]
pub struct EmaRtt {
    alpha: f64,
    current: Duration,
}

impl EmaRtt {
    /// Creates a new, unset estimator with the given smoothing weight.
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            current: Duration::ZERO,
        }
    }

    /// Feeds in one sample.
    pub fn update(&mut self, sample: Duration) {
        if self.current.is_zero() {
            self.current = sample;
        } else {
            self.current =
                self.current.mul_f64(self.alpha) + sample.mul_f64(1.0 - self.alpha);
        }
    }

    /// The current estimate. Zero before the first sample.
    pub fn get(&self) -> Duration {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_taken_verbatim() {
        let mut ema = EmaRtt::new(0.9);
        ema.update(Duration::from_millis(100));
        assert_eq!(ema.get(), Duration::from_millis(100));
    }

    #[test]
    fn later_samples_blend() {
        let mut ema = EmaRtt::new(0.9);
        ema.update(Duration::from_millis(100));
        ema.update(Duration::from_millis(200));
        // 0.9 * 100ms + 0.1 * 200ms
        assert_eq!(ema.get(), Duration::from_millis(110));
    }

    #[test]
    fn unset_reads_as_zero() {
        let ema = EmaRtt::new(0.5);
        assert!(ema.get().is_zero());
    }
}
