use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::controls::{ControlLocator, OVERLAY_CONTROLS};
use super::session::CaptureSession;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayPolicy {
    /// How long to look for each overlay control.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Pause after a control was clicked.
    #[serde(with = "humantime_serde")]
    pub settle: Duration,
}

impl Default for OverlayPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(800),
            poll_interval: Duration::from_millis(200),
            settle: Duration::from_millis(400),
        }
    }
}

/// Closes modal prompts covering the page. Each locator is tried once, in
/// order; missing overlays and click failures are not errors.
///
/// Returns the number of overlays dismissed.
pub async fn dismiss_overlays<S: CaptureSession + ?Sized>(
    session: &mut S,
    policy: &OverlayPolicy,
) -> usize {
    dismiss_with(session, OVERLAY_CONTROLS, policy).await
}

pub(crate) async fn dismiss_with<S: CaptureSession + ?Sized>(
    session: &mut S,
    controls: &[ControlLocator],
    policy: &OverlayPolicy,
) -> usize {
    let mut dismissed = 0;
    for control in controls {
        if activate_within(session, control, policy).await {
            debug!(control = control.name, "dismissed overlay");
            dismissed += 1;
            sleep(policy.settle).await;
        }
    }
    if dismissed > 0 {
        info!(dismissed, "overlays dismissed");
    }
    dismissed
}

async fn activate_within<S: CaptureSession + ?Sized>(
    session: &mut S,
    control: &ControlLocator,
    policy: &OverlayPolicy,
) -> bool {
    let deadline = Instant::now() + policy.timeout;
    loop {
        match session.activate_controls(None, control, 1).await {
            Ok(clicked) if clicked > 0 => return true,
            Ok(_) => {}
            Err(err) => {
                warn!(control = control.name, error = %err, "overlay control lookup failed");
                return false;
            }
        }
        if Instant::now() + policy.poll_interval > deadline {
            return false;
        }
        sleep(policy.poll_interval).await;
    }
}
