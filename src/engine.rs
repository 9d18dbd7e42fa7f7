//! Capture orchestration: one request, one session, strictly sequential steps.

use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::browser::{
    capture_region, dismiss_overlays, expand_region, overrides, wait_for_stable, CaptureSession,
    ChromiumLauncher, ExpansionReport, InterceptRule, RegionMatch, RegionQuery, SessionLauncher,
    SessionSettings, StabilityReport, TargetRegion,
};
use crate::{CaptureRequest, Config, PostRef, Result, Theme, Viewport, XshotError};

/// The captured post. Immutable once produced.
#[derive(Debug, Clone)]
pub struct CaptureResult {
    png: Vec<u8>,
    width: u32,
    height: u32,
    post: PostRef,
    theme: Theme,
    region: RegionMatch,
    viewport: Viewport,
    expansion: ExpansionReport,
    stability: StabilityReport,
    elapsed: Duration,
}

impl CaptureResult {
    pub fn png(&self) -> &[u8] {
        &self.png
    }

    pub fn into_png(self) -> Vec<u8> {
        self.png
    }

    /// Pixel dimensions of the PNG (CSS size times device scale factor).
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn post(&self) -> &PostRef {
        &self.post
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn region(&self) -> RegionMatch {
        self.region
    }

    /// Viewport in effect when the image was taken.
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn expansion(&self) -> ExpansionReport {
        self.expansion
    }

    /// Report of the post-resize stability pass.
    pub fn stability(&self) -> &StabilityReport {
        &self.stability
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// Runs captures. Every call provisions and tears down its own session.
pub struct CaptureEngine<L: SessionLauncher> {
    launcher: L,
    config: Config,
    intercept_rule: InterceptRule,
}

impl<L: SessionLauncher> CaptureEngine<L> {
    pub fn new(launcher: L, config: Config) -> Self {
        Self {
            launcher,
            config,
            intercept_rule: InterceptRule::default(),
        }
    }

    pub fn with_intercept_rule(mut self, rule: InterceptRule) -> Self {
        self.intercept_rule = rule;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session_settings(&self, theme: Theme) -> SessionSettings {
        let browser = &self.config.browser;
        SessionSettings {
            executable: browser.executable.clone(),
            viewport: browser.viewport,
            device_scale_factor: browser.device_scale_factor,
            theme,
            locale: browser.locale.clone(),
            headless: browser.headless,
            extra_args: browser.extra_args.clone(),
            launch_timeout: self.config.timeouts.launch,
            command_timeout: self.config.timeouts.command,
        }
    }

    /// Captures one post. The session is closed exactly once on every path
    /// after a successful launch, whatever step failed.
    pub async fn capture(&self, request: &CaptureRequest) -> Result<CaptureResult> {
        let span = info_span!("capture", post = %request.post().id, theme = %request.theme());
        async {
            let started = std::time::Instant::now();
            let settings = self.session_settings(request.theme());
            let mut session = self.launcher.launch(&settings).await?;

            let budget = self.config.timeouts.overall;
            let outcome = match timeout(budget, self.run(&mut session, request, &settings)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(XshotError::CaptureTimeout(budget)),
            };

            if let Err(err) = session.close().await {
                warn!(error = %err, "session teardown reported an error");
            }

            let mut result = outcome?;
            result.elapsed = started.elapsed();
            info!(
                elapsed_ms = result.elapsed.as_millis() as u64,
                width = result.width,
                height = result.height,
                "capture finished"
            );
            Ok(result)
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        session: &mut L::Session,
        request: &CaptureRequest,
        settings: &SessionSettings,
    ) -> Result<CaptureResult> {
        let post = request.post();

        if let Err(err) = session.install_interceptor(&self.intercept_rule).await {
            warn!(error = %err, "security-header rewrite unavailable; overrides may not apply");
        }

        let url = post.canonical_url();
        session.navigate(&url, self.config.timeouts.navigation).await?;

        dismiss_overlays(session, &self.config.overlay).await;

        let css = overrides::override_stylesheet(request.theme());
        if let Err(err) = session.inject_style(&css).await {
            warn!(error = %err, "presentation overrides not applied");
        }

        let region = self.locate_region(session, post).await?;
        if let Err(err) = session.scroll_into_view(&region).await {
            debug!(error = %err, "initial scroll failed");
        }

        let expansion = expand_region(session, &region, &self.config.expansion).await;

        let first = wait_for_stable(session, &region, &self.config.stability).await;

        let observed = match session.region_height(&region).await {
            Ok(Some(h)) if h.is_finite() && h > 0.0 => h.ceil() as u32,
            _ => first.last_height.unwrap_or(0),
        };
        let viewport = settings.viewport.adapted_to(observed);
        debug!(observed, %viewport, "adapting viewport");
        if let Err(err) = session.resize_viewport(viewport).await {
            warn!(error = %err, "viewport resize failed; keeping launch viewport");
        }
        if let Err(err) = session.scroll_into_view(&region).await {
            debug!(error = %err, "scroll after resize failed");
        }

        let second = wait_for_stable(session, &region, &self.config.stability).await;

        let image = capture_region(session, &region, self.config.timeouts.capture).await?;

        Ok(CaptureResult {
            png: image.png,
            width: image.width,
            height: image.height,
            post: post.clone(),
            theme: request.theme(),
            region: region.matched,
            viewport,
            expansion,
            stability: second,
            elapsed: Duration::ZERO,
        })
    }

    /// Polls for the exact post until the region timeout, then optionally
    /// falls back to the first post on the page.
    async fn locate_region(
        &self,
        session: &mut L::Session,
        post: &PostRef,
    ) -> Result<TargetRegion> {
        let policy = &self.config.region;
        let waited = self.config.timeouts.region;
        let exact = RegionQuery::Exact {
            post_id: post.id.clone(),
        };
        let deadline = Instant::now() + waited;

        loop {
            match session.find_region(&exact).await {
                Ok(Some(region)) => {
                    info!("target post located");
                    return Ok(region);
                }
                Ok(None) => {}
                Err(err) => debug!(error = %err, "region lookup failed"),
            }
            if Instant::now() + policy.poll_interval > deadline {
                break;
            }
            sleep(policy.poll_interval).await;
        }

        if policy.allow_fallback {
            if let Ok(Some(region)) = session.find_region(&RegionQuery::First).await {
                warn!(post = %post.id, "exact post not found; using first post on page");
                return Ok(region);
            }
        }

        Err(XshotError::RegionNotFound {
            post_id: post.id.clone(),
            waited,
        })
    }
}

/// Detects the browser, captures `url` with `theme`, and tears everything down.
pub async fn capture_post(url: &str, theme: Theme, config: Config) -> Result<CaptureResult> {
    let request = CaptureRequest::from_url(url, theme)?;
    let launcher = ChromiumLauncher::detect(config.browser.executable.as_deref()).await?;
    CaptureEngine::new(launcher, config).capture(&request).await
}
