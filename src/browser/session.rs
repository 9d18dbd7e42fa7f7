//! The seam between the capture pipeline and a concrete browser.
//!
//! Every pipeline step talks to the page through [`CaptureSession`], so the
//! stabilization logic can be exercised against a scripted session in tests
//! and against Chromium in production.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

use super::controls::ControlLocator;
use super::intercept::InterceptRule;
use crate::{Result, Theme, Viewport};

/// Rendering configuration for one browser session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub executable: Option<PathBuf>,
    pub viewport: Viewport,
    pub device_scale_factor: f64,
    pub theme: Theme,
    pub locale: String,
    pub headless: bool,
    pub extra_args: Vec<String>,
    pub launch_timeout: Duration,
    pub command_timeout: Duration,
}

/// How a region was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionMatch {
    /// The region links to the requested post id.
    Exact,
    /// First candidate on the page; may be a different post.
    Fallback,
}

/// A lookup for the post region inside the current page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionQuery {
    /// A candidate containing a link to `/status/{post_id}`.
    Exact { post_id: String },
    /// The first candidate on the page.
    First,
}

impl RegionQuery {
    pub fn kind(&self) -> RegionMatch {
        match self {
            RegionQuery::Exact { .. } => RegionMatch::Exact,
            RegionQuery::First => RegionMatch::Fallback,
        }
    }
}

/// Handle to the resolved post region. Only meaningful within the session
/// that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRegion {
    pub selector: String,
    pub matched: RegionMatch,
}

/// One exclusively-owned browser session with a single page.
#[async_trait]
pub trait CaptureSession: Send {
    /// Starts rewriting document responses that match `rule`.
    async fn install_interceptor(&mut self, rule: &InterceptRule) -> Result<()>;

    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()>;

    /// Adds a stylesheet to the current document.
    async fn inject_style(&mut self, css: &str) -> Result<()>;

    /// Clicks up to `limit` visible controls matching `control`, searching
    /// inside `scope` or the whole document. Returns how many were clicked.
    async fn activate_controls(
        &mut self,
        scope: Option<&TargetRegion>,
        control: &ControlLocator,
        limit: usize,
    ) -> Result<usize>;

    /// Single lookup attempt; `Ok(None)` when nothing matches yet.
    async fn find_region(&mut self, query: &RegionQuery) -> Result<Option<TargetRegion>>;

    /// Current bounding-box height in CSS pixels, `None` if not laid out.
    async fn region_height(&mut self, region: &TargetRegion) -> Result<Option<f64>>;

    async fn resize_viewport(&mut self, viewport: Viewport) -> Result<()>;

    async fn scroll_into_view(&mut self, region: &TargetRegion) -> Result<()>;

    /// PNG of exactly the region's bounds.
    async fn screenshot_region(&mut self, region: &TargetRegion) -> Result<Vec<u8>>;

    /// Tears the browser down. Called once per session.
    async fn close(&mut self) -> Result<()>;
}

/// Spawns sessions. One call per capture; sessions are never pooled.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    type Session: CaptureSession;

    async fn launch(&self, settings: &SessionSettings) -> Result<Self::Session>;
}
