use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::controls::{ControlLocator, EXPAND_CONTROLS};
use super::session::{CaptureSession, TargetRegion};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionPolicy {
    pub max_passes: usize,
    /// Clicks allowed per pass, across all locators.
    pub max_clicks_per_pass: usize,
    #[serde(with = "humantime_serde")]
    pub settle: Duration,
}

impl Default for ExpansionPolicy {
    fn default() -> Self {
        Self {
            max_passes: 8,
            max_clicks_per_pass: 6,
            settle: Duration::from_millis(600),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpansionReport {
    /// Passes that clicked at least one control.
    pub passes: usize,
    pub activated: usize,
    /// True when the pass budget ran out while controls were still appearing.
    pub exhausted: bool,
}

/// Clicks "show more" style controls inside `region` until a pass finds
/// nothing or the pass budget is spent.
pub async fn expand_region<S: CaptureSession + ?Sized>(
    session: &mut S,
    region: &TargetRegion,
    policy: &ExpansionPolicy,
) -> ExpansionReport {
    expand_with(session, region, EXPAND_CONTROLS, policy).await
}

pub(crate) async fn expand_with<S: CaptureSession + ?Sized>(
    session: &mut S,
    region: &TargetRegion,
    controls: &[ControlLocator],
    policy: &ExpansionPolicy,
) -> ExpansionReport {
    let mut report = ExpansionReport::default();

    for pass in 0..policy.max_passes {
        let mut clicked = 0;
        for control in controls {
            let remaining = policy.max_clicks_per_pass.saturating_sub(clicked);
            if remaining == 0 {
                break;
            }
            match session.activate_controls(Some(region), control, remaining).await {
                Ok(n) => clicked += n.min(remaining),
                Err(err) => {
                    warn!(control = control.name, pass, error = %err, "skipping expand control");
                }
            }
        }

        if clicked == 0 {
            debug!(pass, "no expand controls left");
            break;
        }

        debug!(pass, clicked, "expanded truncated content");
        report.passes += 1;
        report.activated += clicked;
        report.exhausted = pass + 1 == policy.max_passes;
        sleep(policy.settle).await;
    }

    if report.exhausted {
        warn!(
            passes = report.passes,
            "expand controls kept appearing; stopped at pass budget"
        );
    } else if report.activated > 0 {
        info!(
            passes = report.passes,
            activated = report.activated,
            "content expanded"
        );
    }
    report
}
