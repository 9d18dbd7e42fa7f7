//! Chromium-backed sessions over the DevTools protocol.

use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    MediaFeature, SetDeviceMetricsOverrideParams, SetEmulatedMediaParams, SetLocaleOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, FulfillRequestParams, HeaderEntry,
    RequestPattern, RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::ResourceType;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::handler::viewport::Viewport as CdpViewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::controls::ControlLocator;
use super::environment::{ensure_browser_runs, locate_browser};
use super::intercept::{
    resolve_paused, HeaderRewriter, InterceptRule, InterceptedRequest, PausedAction, RequestKind,
};
use super::session::{
    CaptureSession, RegionQuery, SessionLauncher, SessionSettings, TargetRegion,
};
use crate::{Result, Viewport, XshotError};

/// Stamped on the resolved region by `FIND_REGION_JS` so later calls can find it again.
const TARGET_SELECTOR: &str = r#"[data-xshot-target="1"]"#;
const POST_SELECTOR: &str = r#"article[data-testid="tweet"]"#;

const FIND_REGION_JS: &str = r#"
(args) => {
  for (const el of document.querySelectorAll('[data-xshot-target]')) {
    el.removeAttribute('data-xshot-target');
  }
  const candidates = Array.from(document.querySelectorAll(args.candidates));
  let found = null;
  if (args.postId === null) {
    found = candidates[0] || null;
  } else {
    const pattern = new RegExp('/status/' + args.postId + '(?:$|[/?#])');
    found = candidates.find((el) =>
      Array.from(el.querySelectorAll('a[href]')).some((a) => pattern.test(a.getAttribute('href')))
    ) || null;
  }
  if (!found) return false;
  found.setAttribute('data-xshot-target', '1');
  return true;
}
"#;

const INJECT_STYLE_JS: &str = r#"
(css) => {
  let style = document.getElementById('xshot-overrides');
  if (!style) {
    style = document.createElement('style');
    style.id = 'xshot-overrides';
    (document.head || document.documentElement).appendChild(style);
  }
  style.textContent = css;
  return true;
}
"#;

const REGION_HEIGHT_JS: &str = r#"
(selector) => {
  const el = document.querySelector(selector);
  if (!el) return -1;
  return el.getBoundingClientRect().height;
}
"#;

/// Launches Chromium sessions from a binary that passed the readiness check.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    executable: PathBuf,
}

impl ChromiumLauncher {
    /// Locates the browser and proves it starts. Run once at process start.
    pub async fn detect(explicit: Option<&Path>) -> Result<Self> {
        let executable = locate_browser(explicit)?;
        ensure_browser_runs(&executable).await?;
        info!(executable = %executable.display(), "browser runtime detected");
        Ok(Self { executable })
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn cdp_config(&self, settings: &SessionSettings) -> Result<CdpConfig> {
        let executable = settings
            .executable
            .clone()
            .unwrap_or_else(|| self.executable.clone());

        let mut builder = CdpConfig::builder()
            .chrome_executable(executable)
            .window_size(settings.viewport.width, settings.viewport.height)
            .viewport(CdpViewport {
                width: settings.viewport.width,
                height: settings.viewport.height,
                device_scale_factor: Some(settings.device_scale_factor),
                ..CdpViewport::default()
            })
            .request_timeout(settings.command_timeout)
            .no_sandbox()
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--hide-scrollbars")
            .arg(format!("--lang={}", settings.locale));
        for arg in &settings.extra_args {
            builder = builder.arg(arg.clone());
        }
        if !settings.headless {
            builder = builder.with_head();
        }
        builder.build().map_err(XshotError::SessionLaunch)
    }
}

#[async_trait]
impl SessionLauncher for ChromiumLauncher {
    type Session = ChromiumSession;

    async fn launch(&self, settings: &SessionSettings) -> Result<ChromiumSession> {
        let config = self.cdp_config(settings)?;

        let deadline = Instant::now() + settings.launch_timeout;
        let (mut browser, mut handler) = within_launch(deadline, "browser start", async move {
            Browser::launch(config)
                .await
                .map_err(|e| XshotError::SessionLaunch(e.to_string()))
        })
        .await?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "browser handler event error");
                }
            }
        });

        let setup = within_launch(deadline, "page setup", open_page(&browser, settings)).await;
        let page = match setup {
            Ok(page) => page,
            Err(err) => {
                let _ = browser.close().await;
                let _ = browser.wait().await;
                handler_task.abort();
                return Err(err);
            }
        };

        info!(
            viewport = %settings.viewport,
            scale = settings.device_scale_factor,
            theme = %settings.theme,
            locale = %settings.locale,
            "browser session ready"
        );

        Ok(ChromiumSession {
            browser,
            page,
            handler_task,
            intercept_task: None,
            cancel: CancellationToken::new(),
            device_scale_factor: settings.device_scale_factor,
            command_timeout: settings.command_timeout,
            closed: false,
        })
    }
}

/// Runs one launch phase against the shared launch deadline. Running out of
/// time is a launch failure, not a hang.
async fn within_launch<T, F>(deadline: Instant, phase: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    timeout_at(deadline, fut).await.map_err(|_| {
        XshotError::SessionLaunch(format!("{phase} did not finish within the launch budget"))
    })?
}

async fn open_page(browser: &Browser, settings: &SessionSettings) -> Result<Page> {
    let launch_err = |e: chromiumoxide::error::CdpError| XshotError::SessionLaunch(e.to_string());

    let page = browser.new_page("about:blank").await.map_err(launch_err)?;
    page.execute(SetDeviceMetricsOverrideParams::new(
        i64::from(settings.viewport.width),
        i64::from(settings.viewport.height),
        settings.device_scale_factor,
        false,
    ))
    .await
    .map_err(launch_err)?;
    page.execute(
        SetEmulatedMediaParams::builder()
            .features(vec![MediaFeature::new(
                "prefers-color-scheme",
                settings.theme.as_str(),
            )])
            .build(),
    )
    .await
    .map_err(launch_err)?;
    page.execute(
        SetLocaleOverrideParams::builder()
            .locale(settings.locale.clone())
            .build(),
    )
    .await
    .map_err(launch_err)?;
    Ok(page)
}

/// One Chromium process with a single page. Owned by exactly one capture.
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    intercept_task: Option<JoinHandle<()>>,
    cancel: CancellationToken,
    device_scale_factor: f64,
    command_timeout: Duration,
    closed: bool,
}

impl ChromiumSession {
    async fn within<T, F>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, chromiumoxide::error::CdpError>>,
    {
        timeout(self.command_timeout, fut)
            .await
            .map_err(|_| {
                XshotError::Browser(format!("{what} timed out after {:?}", self.command_timeout))
            })?
            .map_err(|e| XshotError::Browser(format!("{what}: {e}")))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        what: &str,
        function: &str,
        arg: serde_json::Value,
    ) -> Result<T> {
        let script = format!("({function})({arg})");
        let result = self.within(what, self.page.evaluate(script)).await?;
        result
            .into_value::<T>()
            .map_err(|e| XshotError::Browser(format!("{what}: unexpected result: {e}")))
    }
}

#[async_trait]
impl CaptureSession for ChromiumSession {
    async fn install_interceptor(&mut self, rule: &InterceptRule) -> Result<()> {
        let rewriter = HeaderRewriter::new(self.command_timeout)?;
        let mut events = self
            .within(
                "subscribe to paused requests",
                self.page.event_listener::<EventRequestPaused>(),
            )
            .await?;

        let pattern = RequestPattern::builder()
            .url_pattern("*")
            .request_stage(RequestStage::Request)
            .build();
        self.within(
            "enable request interception",
            self.page
                .execute(EnableParams::builder().patterns(vec![pattern]).build()),
        )
        .await?;

        let page = self.page.clone();
        let task_rule = rule.clone();
        let cancel = self.cancel.clone();
        self.intercept_task = Some(tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.next() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };

                let request = intercepted_request(&event);
                let outcome = match resolve_paused(&task_rule, &rewriter, &request).await {
                    PausedAction::Continue => page
                        .execute(ContinueRequestParams::new(event.request_id.clone()))
                        .await
                        .map(|_| ()),
                    PausedAction::Fulfill(response) => {
                        match fulfill_params(&event, response) {
                            Ok(params) => page.execute(params).await.map(|_| ()),
                            Err(err) => {
                                warn!(error = %err, "could not build fulfilment; continuing request");
                                page.execute(ContinueRequestParams::new(event.request_id.clone()))
                                    .await
                                    .map(|_| ())
                            }
                        }
                    }
                };
                if let Err(err) = outcome {
                    debug!(url = %request.url, error = %err, "paused request not resumed");
                }
            }
        }));

        debug!(origins = ?rule.origins, "request interception installed");
        Ok(())
    }

    async fn navigate(&mut self, url: &str, limit: Duration) -> Result<()> {
        match timeout(limit, self.page.goto(url)).await {
            Ok(Ok(_)) => {
                info!(url, "navigation finished");
                Ok(())
            }
            Ok(Err(err)) => Err(XshotError::navigation(url, err.to_string())),
            Err(_) => Err(XshotError::navigation(
                url,
                format!("no load event within {limit:?}"),
            )),
        }
    }

    async fn inject_style(&mut self, css: &str) -> Result<()> {
        let _: bool = self
            .call("inject overrides", INJECT_STYLE_JS, serde_json::json!(css))
            .await?;
        Ok(())
    }

    async fn activate_controls(
        &mut self,
        scope: Option<&TargetRegion>,
        control: &ControlLocator,
        limit: usize,
    ) -> Result<usize> {
        let script = control.activation_script(scope.map(|r| r.selector.as_str()), limit);
        let result = self.within(control.name, self.page.evaluate(script)).await?;
        let clicked: u64 = result
            .into_value()
            .map_err(|e| XshotError::Browser(format!("{}: unexpected result: {e}", control.name)))?;
        Ok(clicked as usize)
    }

    async fn find_region(&mut self, query: &RegionQuery) -> Result<Option<TargetRegion>> {
        let post_id = match query {
            RegionQuery::Exact { post_id } => Some(post_id.as_str()),
            RegionQuery::First => None,
        };
        let args = serde_json::json!({ "candidates": POST_SELECTOR, "postId": post_id });
        let found: bool = self.call("find region", FIND_REGION_JS, args).await?;
        Ok(found.then(|| TargetRegion {
            selector: TARGET_SELECTOR.to_string(),
            matched: query.kind(),
        }))
    }

    async fn region_height(&mut self, region: &TargetRegion) -> Result<Option<f64>> {
        let height: f64 = self
            .call(
                "measure region",
                REGION_HEIGHT_JS,
                serde_json::json!(region.selector),
            )
            .await?;
        Ok((height >= 0.0).then_some(height))
    }

    async fn resize_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.within(
            "resize viewport",
            self.page.execute(SetDeviceMetricsOverrideParams::new(
                i64::from(viewport.width),
                i64::from(viewport.height),
                self.device_scale_factor,
                false,
            )),
        )
        .await?;
        info!(%viewport, "viewport resized");
        Ok(())
    }

    async fn scroll_into_view(&mut self, region: &TargetRegion) -> Result<()> {
        let element = self
            .within("locate region", self.page.find_element(region.selector.as_str()))
            .await?;
        self.within("scroll region", element.scroll_into_view()).await?;
        Ok(())
    }

    async fn screenshot_region(&mut self, region: &TargetRegion) -> Result<Vec<u8>> {
        let element = self
            .page
            .find_element(region.selector.as_str())
            .await
            .map_err(|e| XshotError::CaptureIo(format!("region vanished: {e}")))?;
        element
            .screenshot(CaptureScreenshotFormat::Png)
            .await
            .map_err(|e| XshotError::CaptureIo(e.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.cancel.cancel();
        if let Some(task) = self.intercept_task.take() {
            task.abort();
        }

        let closed = self.browser.close().await;
        let _ = self.browser.wait().await;
        self.handler_task.abort();
        info!("browser session closed");

        closed
            .map(|_| ())
            .map_err(|e| XshotError::Browser(format!("close browser: {e}")))
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.intercept_task.take() {
            task.abort();
        }
        self.handler_task.abort();
    }
}

fn intercepted_request(event: &EventRequestPaused) -> InterceptedRequest {
    let headers = serde_json::to_value(&event.request.headers)
        .ok()
        .and_then(|value| match value {
            serde_json::Value::Object(map) => Some(
                map.into_iter()
                    .filter_map(|(name, value)| value.as_str().map(|v| (name, v.to_string())))
                    .collect(),
            ),
            _ => None,
        })
        .unwrap_or_default();

    InterceptedRequest {
        url: event.request.url.clone(),
        method: event.request.method.clone(),
        kind: request_kind(&event.resource_type),
        headers,
    }
}

fn request_kind(resource_type: &ResourceType) -> RequestKind {
    match resource_type {
        ResourceType::Document => RequestKind::Document,
        ResourceType::Stylesheet => RequestKind::Stylesheet,
        ResourceType::Script => RequestKind::Script,
        ResourceType::Image => RequestKind::Image,
        ResourceType::Xhr | ResourceType::Fetch => RequestKind::Xhr,
        _ => RequestKind::Other,
    }
}

fn fulfill_params(
    event: &EventRequestPaused,
    response: super::intercept::RewrittenResponse,
) -> std::result::Result<FulfillRequestParams, String> {
    let headers = response
        .headers
        .into_iter()
        .map(|(name, value)| HeaderEntry::new(name, value))
        .collect::<Vec<_>>();
    FulfillRequestParams::builder()
        .request_id(event.request_id.clone())
        .response_code(i64::from(response.status))
        .response_headers(headers)
        .body(base64::engine::general_purpose::STANDARD.encode(&response.body))
        .build()
}
