//! A scripted in-memory `CaptureSession` for driving the engine without a
//! browser. Heights, region resolution, overlays and expand controls are all
//! scripted; every call is recorded in a shared [`Recorder`].

#![allow(dead_code)]

use async_trait::async_trait;
use image::{ImageBuffer, ImageFormat, Rgba};
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use xshot_lib::browser::{ControlLocator, InterceptRule, RegionQuery};
use xshot_lib::{
    CaptureSession, RegionMatch, Result, SessionLauncher, SessionSettings, TargetRegion, Viewport,
    XshotError,
};

pub const TARGET_SELECTOR: &str = r#"[data-xshot-target="1"]"#;

/// Pipeline steps a script can fail or stall at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Intercept,
    Navigate,
    InjectStyle,
    Activate,
    FindRegion,
    Height,
    Resize,
    Scroll,
    Screenshot,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionScript {
    /// The exact post appears after this many lookups.
    ExactAfter(usize),
    /// Only unrelated posts are on the page.
    FallbackOnly,
    /// No candidates at all.
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandScript {
    None,
    /// This many "Show more" controls exist, each disappears once clicked.
    Finite(usize),
    /// Every click reveals another control.
    Endless,
}

/// Shared record of what the engine did to the session.
#[derive(Debug, Default)]
pub struct Recorder {
    pub launches: AtomicUsize,
    pub closes: AtomicUsize,
    pub height_reads: AtomicUsize,
    pub screenshots: AtomicUsize,
    pub clicks: AtomicUsize,
    pub calls: Mutex<Vec<Step>>,
    pub viewports: Mutex<Vec<Viewport>>,
    pub styles: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn height_reads(&self) -> usize {
        self.height_reads.load(Ordering::SeqCst)
    }

    pub fn screenshots(&self) -> usize {
        self.screenshots.load(Ordering::SeqCst)
    }

    pub fn clicks(&self) -> usize {
        self.clicks.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<Step> {
        self.calls.lock().unwrap().clone()
    }

    pub fn viewports(&self) -> Vec<Viewport> {
        self.viewports.lock().unwrap().clone()
    }
}

#[derive(Debug, Clone)]
pub struct ScriptedSession {
    recorder: Arc<Recorder>,
    heights: VecDeque<Option<f64>>,
    last_height: Option<f64>,
    region: RegionScript,
    lookups: usize,
    overlays: Vec<(String, Option<String>)>,
    expand: ExpandScript,
    fail_at: Option<Step>,
    stall_at: Option<Step>,
    navigate_delay: Duration,
    png_size: (u32, u32),
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self {
            recorder: Arc::new(Recorder::default()),
            heights: VecDeque::new(),
            last_height: Some(600.0),
            region: RegionScript::ExactAfter(0),
            lookups: 0,
            overlays: Vec::new(),
            expand: ExpandScript::None,
            fail_at: None,
            stall_at: None,
            navigate_delay: Duration::ZERO,
            png_size: (24, 16),
        }
    }

    /// Heights returned in order; the last one repeats once the script runs out.
    pub fn heights(mut self, heights: &[Option<f64>]) -> Self {
        self.heights = heights.iter().copied().collect();
        self
    }

    pub fn region(mut self, region: RegionScript) -> Self {
        self.region = region;
        self
    }

    /// A modal whose dismiss control has the given text and aria-label. An
    /// empty text with no label is the icon-only sheet close button.
    pub fn overlay(mut self, text: &str, aria_label: Option<&str>) -> Self {
        self.overlays
            .push((text.to_string(), aria_label.map(str::to_string)));
        self
    }

    pub fn expand(mut self, expand: ExpandScript) -> Self {
        self.expand = expand;
        self
    }

    pub fn fail_at(mut self, step: Step) -> Self {
        self.fail_at = Some(step);
        self
    }

    /// The step never completes.
    pub fn stall_at(mut self, step: Step) -> Self {
        self.stall_at = Some(step);
        self
    }

    /// Navigation takes this long before the load event.
    pub fn navigate_delay(mut self, delay: Duration) -> Self {
        self.navigate_delay = delay;
        self
    }

    pub fn recorder(&self) -> Arc<Recorder> {
        Arc::clone(&self.recorder)
    }

    async fn enter(&self, step: Step) -> Result<()> {
        self.recorder.calls.lock().unwrap().push(step);
        if self.stall_at == Some(step) {
            std::future::pending::<()>().await;
        }
        if self.fail_at == Some(step) {
            return Err(XshotError::Browser(format!("scripted failure at {step:?}")));
        }
        Ok(())
    }

    fn target(matched: RegionMatch) -> TargetRegion {
        TargetRegion {
            selector: TARGET_SELECTOR.to_string(),
            matched,
        }
    }
}

impl Default for ScriptedSession {
    fn default() -> Self {
        Self::new()
    }
}

pub fn solid_png(width: u32, height: u32) -> Vec<u8> {
    let img: ImageBuffer<Rgba<u8>, Vec<u8>> =
        ImageBuffer::from_pixel(width, height, Rgba([255, 255, 255, 255]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

#[async_trait]
impl CaptureSession for ScriptedSession {
    async fn install_interceptor(&mut self, _rule: &InterceptRule) -> Result<()> {
        self.enter(Step::Intercept).await
    }

    async fn navigate(&mut self, _url: &str, _timeout: Duration) -> Result<()> {
        self.enter(Step::Navigate).await?;
        tokio::time::sleep(self.navigate_delay).await;
        Ok(())
    }

    async fn inject_style(&mut self, css: &str) -> Result<()> {
        self.enter(Step::InjectStyle).await?;
        self.recorder.styles.lock().unwrap().push(css.to_string());
        Ok(())
    }

    async fn activate_controls(
        &mut self,
        scope: Option<&TargetRegion>,
        control: &ControlLocator,
        limit: usize,
    ) -> Result<usize> {
        self.enter(Step::Activate).await?;

        let clicked = match scope {
            None => match self.overlays.iter().position(|(text, aria)| {
                if control.labels.is_empty() {
                    // Selector-only locators target the icon-only sheet close button.
                    text.is_empty() && aria.is_none()
                } else {
                    control.accepts(text, aria.as_deref())
                }
            }) {
                Some(index) if limit > 0 => {
                    self.overlays.remove(index);
                    1
                }
                _ => 0,
            },
            Some(_) if !control.accepts("Show more", None) || control.labels.is_empty() => 0,
            Some(_) => match self.expand {
                ExpandScript::None => 0,
                ExpandScript::Finite(remaining) => {
                    let clicked = remaining.min(limit);
                    self.expand = ExpandScript::Finite(remaining - clicked);
                    clicked
                }
                ExpandScript::Endless => limit,
            },
        };
        self.recorder.clicks.fetch_add(clicked, Ordering::SeqCst);
        Ok(clicked)
    }

    async fn find_region(&mut self, query: &RegionQuery) -> Result<Option<TargetRegion>> {
        self.enter(Step::FindRegion).await?;
        let found = match (self.region, query) {
            (RegionScript::ExactAfter(n), RegionQuery::Exact { .. }) => {
                self.lookups += 1;
                self.lookups > n
            }
            (RegionScript::ExactAfter(_), RegionQuery::First) => true,
            (RegionScript::FallbackOnly, RegionQuery::First) => true,
            (RegionScript::FallbackOnly, RegionQuery::Exact { .. }) => false,
            (RegionScript::Missing, _) => false,
        };
        Ok(found.then(|| Self::target(query.kind())))
    }

    async fn region_height(&mut self, _region: &TargetRegion) -> Result<Option<f64>> {
        self.recorder.height_reads.fetch_add(1, Ordering::SeqCst);
        self.enter(Step::Height).await?;
        if let Some(next) = self.heights.pop_front() {
            self.last_height = next;
        }
        Ok(self.last_height)
    }

    async fn resize_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.enter(Step::Resize).await?;
        self.recorder.viewports.lock().unwrap().push(viewport);
        Ok(())
    }

    async fn scroll_into_view(&mut self, _region: &TargetRegion) -> Result<()> {
        self.enter(Step::Scroll).await
    }

    async fn screenshot_region(&mut self, _region: &TargetRegion) -> Result<Vec<u8>> {
        self.enter(Step::Screenshot).await?;
        self.recorder.screenshots.fetch_add(1, Ordering::SeqCst);
        Ok(solid_png(self.png_size.0, self.png_size.1))
    }

    async fn close(&mut self) -> Result<()> {
        self.recorder.closes.fetch_add(1, Ordering::SeqCst);
        self.enter(Step::Close).await
    }
}

/// Hands out clones of a template session and records launches.
pub struct ScriptedLauncher {
    template: ScriptedSession,
    fail_launch: bool,
}

impl ScriptedLauncher {
    pub fn new(template: ScriptedSession) -> Self {
        Self {
            template,
            fail_launch: false,
        }
    }

    pub fn failing(template: ScriptedSession) -> Self {
        Self {
            template,
            fail_launch: true,
        }
    }

    pub fn recorder(&self) -> Arc<Recorder> {
        self.template.recorder()
    }
}

#[async_trait]
impl SessionLauncher for ScriptedLauncher {
    type Session = ScriptedSession;

    async fn launch(&self, _settings: &SessionSettings) -> Result<ScriptedSession> {
        self.template.recorder.launches.fetch_add(1, Ordering::SeqCst);
        if self.fail_launch {
            return Err(XshotError::SessionLaunch("scripted launch failure".to_string()));
        }
        Ok(self.template.clone())
    }
}
