//! xshot Library
//!
//! Captures a deterministic PNG of a single social-media post. The hard part
//! is knowing when the page is done: the post loads asynchronously, hides
//! text behind "show more" controls and sits behind modal prompts and a
//! restrictive content-security policy.
//!
//! # Module Overview
//!
//! - [`target`] - Post URL normalization, themes and capture requests
//! - [`browser`] - Browser sessions and the individual pipeline steps
//! - [`engine`] - Orchestration of one capture, with guaranteed teardown
//! - [`config`] - Configuration file support
//! - [`viewport`] - Viewport type and adaptive sizing
//! - [`error`] - Typed failures and machine-readable payloads
//!
//! # Example
//!
//! ```no_run
//! use xshot_lib::{capture_post, Config, Theme};
//!
//! # async fn example() -> xshot_lib::Result<()> {
//! let result = capture_post("https://x.com/rustlang/status/1", Theme::Light, Config::default()).await?;
//! std::fs::write(result.post().file_name(), result.png())?;
//! # Ok(())
//! # }
//! ```

pub mod browser;
pub mod config;
pub mod engine;
pub mod error;
pub mod target;
pub mod viewport;

pub use browser::{
    CaptureSession, ChromiumLauncher, RegionMatch, SessionLauncher, SessionSettings,
    StabilityPolicy, TargetRegion,
};
pub use config::{BrowserConfig, Config, RegionPolicy, Timeouts};
pub use engine::{capture_post, CaptureEngine, CaptureResult};
pub use error::{ErrorCategory, ErrorPayload, Result, XshotError};
pub use target::{CaptureRequest, PostRef, Theme};
pub use viewport::{adapted_height, Viewport};
