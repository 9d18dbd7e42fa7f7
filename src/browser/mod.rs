//! Browser automation for post capture.
//!
//! # Module Structure
//!
//! - [`session`] - The `CaptureSession` / `SessionLauncher` seam
//! - [`chromium`] - Chromium implementation over the DevTools protocol
//! - [`intercept`] - CSP stripping for document responses
//! - [`controls`] - Locator strategies for overlays and "show more" controls
//! - [`overlay`], [`expand`], [`stability`], [`capture`] - The pipeline steps
//!
//! # Example
//!
//! ```no_run
//! use xshot_lib::{ChromiumLauncher, CaptureEngine, CaptureRequest, Config, Theme};
//!
//! # async fn example() -> xshot_lib::Result<()> {
//! let config = Config::default();
//! let launcher = ChromiumLauncher::detect(None).await?;
//! let engine = CaptureEngine::new(launcher, config);
//! let request = CaptureRequest::from_url("https://x.com/rustlang/status/1", Theme::Dark)?;
//! let result = engine.capture(&request).await?;
//! std::fs::write(request.post().file_name(), result.png())?;
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod chromium;
pub mod controls;
mod environment;
pub mod expand;
pub mod intercept;
pub mod overlay;
pub mod overrides;
pub mod session;
pub mod stability;

pub use capture::{capture_region, verify_png, CapturedImage};
pub use chromium::{ChromiumLauncher, ChromiumSession};
pub use controls::{ControlLocator, EXPAND_CONTROLS, OVERLAY_CONTROLS};
pub use environment::{ensure_browser_runs, locate_browser};
pub use expand::{expand_region, ExpansionPolicy, ExpansionReport};
pub use intercept::{
    classify, strip_security_headers, InterceptDecision, InterceptRule, InterceptedRequest,
    RequestKind,
};
pub use overlay::{dismiss_overlays, OverlayPolicy};
pub use session::{
    CaptureSession, RegionMatch, RegionQuery, SessionLauncher, SessionSettings, TargetRegion,
};
pub use stability::{
    convergence_index, wait_for_stable, Observation, StabilityPolicy, StabilityReport,
    StabilitySample, StabilityTracker,
};
