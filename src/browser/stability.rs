//! Layout-stability detection.
//!
//! The renderer has no "layout complete" signal, so the region's height is
//! sampled on a fixed interval until it stops moving. A sample only counts if
//! the region is taller than `min_height`; shorter readings are mid-load
//! states (collapsed embeds, unloaded media) and are ignored entirely.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::session::{CaptureSession, TargetRegion};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityPolicy {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    pub max_samples: usize,
    /// Heights at or below this are not accepted.
    pub min_height: f64,
    /// Largest height change (px) still counted as stable.
    pub tolerance: u32,
    /// Consecutive stable observations needed to converge.
    pub required_stable: usize,
    /// Pause after polling ends, before anything is captured.
    #[serde(with = "humantime_serde")]
    pub settle: Duration,
}

impl Default for StabilityPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(250),
            max_samples: 24,
            min_height: 160.0,
            tolerance: 1,
            required_stable: 3,
            settle: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilitySample {
    pub height: u32,
    pub ordinal: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Missing or implausibly small; counters untouched.
    Rejected,
    Accepted { stable: usize },
    Converged,
}

/// Convergence state over a stream of height readings.
#[derive(Debug, Clone)]
pub struct StabilityTracker {
    min_height: f64,
    tolerance: u32,
    required: usize,
    previous: Option<u32>,
    stable: usize,
    ordinal: usize,
    samples: Vec<StabilitySample>,
}

impl StabilityTracker {
    pub fn new(policy: &StabilityPolicy) -> Self {
        Self {
            min_height: policy.min_height,
            tolerance: policy.tolerance,
            required: policy.required_stable.max(1),
            previous: None,
            stable: 0,
            ordinal: 0,
            samples: Vec::new(),
        }
    }

    pub fn observe(&mut self, height: Option<f64>) -> Observation {
        let ordinal = self.ordinal;
        self.ordinal += 1;

        let height = match height {
            Some(h) if h.is_finite() && h > self.min_height => h as u32,
            _ => return Observation::Rejected,
        };

        match self.previous {
            Some(prev) if prev.abs_diff(height) <= self.tolerance => self.stable += 1,
            _ => self.stable = 0,
        }
        self.previous = Some(height);
        self.samples.push(StabilitySample { height, ordinal });

        if self.stable >= self.required {
            Observation::Converged
        } else {
            Observation::Accepted {
                stable: self.stable,
            }
        }
    }

    pub fn last_height(&self) -> Option<u32> {
        self.previous
    }

    pub fn is_converged(&self) -> bool {
        self.stable >= self.required
    }

    pub fn into_samples(self) -> Vec<StabilitySample> {
        self.samples
    }
}

/// Index of the reading at which `heights` converges under `policy`.
pub fn convergence_index(heights: &[Option<f64>], policy: &StabilityPolicy) -> Option<usize> {
    let mut tracker = StabilityTracker::new(policy);
    heights
        .iter()
        .position(|h| tracker.observe(*h) == Observation::Converged)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StabilityReport {
    /// Accepted samples, in order.
    pub samples: Vec<StabilitySample>,
    /// Readings taken, including rejected ones.
    pub polls: usize,
    pub converged: bool,
    pub last_height: Option<u32>,
}

/// Polls the region's height until it converges or the sample budget runs
/// out, then waits `policy.settle`. Running out is best effort, not an error.
pub async fn wait_for_stable<S: CaptureSession + ?Sized>(
    session: &mut S,
    region: &TargetRegion,
    policy: &StabilityPolicy,
) -> StabilityReport {
    let mut tracker = StabilityTracker::new(policy);
    let mut polls = 0;

    for remaining in (0..policy.max_samples).rev() {
        let height = match session.region_height(region).await {
            Ok(height) => height,
            Err(err) => {
                debug!(error = %err, "height sample failed");
                None
            }
        };
        polls += 1;

        let observation = tracker.observe(height);
        debug!(?height, ?observation, "stability sample");
        if observation == Observation::Converged || remaining == 0 {
            break;
        }
        sleep(policy.interval).await;
    }

    let converged = tracker.is_converged();
    let last_height = tracker.last_height();
    if converged {
        info!(polls, ?last_height, "layout converged");
    } else {
        warn!(polls, ?last_height, "layout did not converge; continuing with last height");
    }

    sleep(policy.settle).await;

    StabilityReport {
        samples: tracker.into_samples(),
        polls,
        converged,
        last_height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn converges_on_third_consecutive_stable_reading() {
        let policy = StabilityPolicy::default();
        let heights = seq(&[200.0, 500.0, 501.0, 500.0, 500.0]);
        assert_eq!(convergence_index(&heights, &policy), Some(4));
    }

    #[test]
    fn two_matches_then_a_jump_does_not_converge() {
        let policy = StabilityPolicy::default();
        let heights = seq(&[400.0, 400.0, 400.0, 700.0, 700.0, 700.0]);
        // 400 x3 gives two stable steps, the jump resets, 700 x3 gives two again.
        assert_eq!(convergence_index(&heights, &policy), None);

        let heights = seq(&[400.0, 400.0, 400.0, 700.0, 700.0, 700.0, 701.0]);
        assert_eq!(convergence_index(&heights, &policy), Some(6));
    }

    #[test]
    fn drift_of_two_pixels_resets_the_counter() {
        let policy = StabilityPolicy::default();
        let heights = seq(&[300.0, 301.0, 302.0, 304.0, 305.0, 306.0, 306.0]);
        // 300->301 (1), 301->302 (2), 302->304 reset, 304->305 (1), 305->306 (2), 306->306 (3)
        assert_eq!(convergence_index(&heights, &policy), Some(6));
    }

    #[test]
    fn small_heights_never_contribute() {
        let policy = StabilityPolicy::default();
        let heights = seq(&[160.0, 160.0, 160.0, 160.0, 100.0, 0.0]);
        assert_eq!(convergence_index(&heights, &policy), None);

        let mut tracker = StabilityTracker::new(&policy);
        for h in [160.0, 159.9, 12.0] {
            assert_eq!(tracker.observe(Some(h)), Observation::Rejected);
        }
        assert_eq!(tracker.last_height(), None);
        assert!(tracker.into_samples().is_empty());
    }

    #[test]
    fn rejected_readings_do_not_break_a_streak() {
        let policy = StabilityPolicy::default();
        let heights = vec![
            Some(500.0),
            None,
            Some(500.0),
            Some(100.0),
            Some(500.0),
            Some(f64::NAN),
            Some(500.0),
        ];
        assert_eq!(convergence_index(&heights, &policy), Some(6));
    }

    #[test]
    fn first_accepted_sample_starts_from_unset() {
        let mut tracker = StabilityTracker::new(&StabilityPolicy::default());
        assert_eq!(tracker.observe(Some(161.0)), Observation::Accepted { stable: 0 });
        assert_eq!(tracker.observe(Some(161.9)), Observation::Accepted { stable: 1 });
        assert_eq!(tracker.last_height(), Some(161));
    }

    #[test]
    fn samples_keep_reading_ordinals() {
        let mut tracker = StabilityTracker::new(&StabilityPolicy::default());
        tracker.observe(None);
        tracker.observe(Some(800.0));
        tracker.observe(Some(90.0));
        tracker.observe(Some(801.0));
        let samples = tracker.into_samples();
        assert_eq!(
            samples,
            vec![
                StabilitySample { height: 800, ordinal: 1 },
                StabilitySample { height: 801, ordinal: 3 },
            ]
        );
    }
}
