use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XshotError {
    #[error("Invalid target '{value}': {reason}")]
    InvalidTarget { value: String, reason: String },

    #[error("Browser runtime not ready: {0}")]
    EnvironmentNotReady(String),

    #[error("Browser failed to launch: {0}")]
    SessionLaunch(String),

    #[error("Navigation to {url} did not complete: {reason}")]
    NavigationTimeout { url: String, reason: String },

    #[error("Post {post_id} never appeared on the page within {waited:?}")]
    RegionNotFound { post_id: String, waited: Duration },

    #[error("Capture timed out after {0:?}")]
    CaptureTimeout(Duration),

    #[error("Capture failed: {0}")]
    CaptureIo(String),

    #[error("Browser protocol error: {0}")]
    Browser(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl XshotError {
    pub fn invalid_target(value: impl Into<String>, reason: impl Into<String>) -> Self {
        XshotError::InvalidTarget {
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn navigation(url: impl Into<String>, reason: impl Into<String>) -> Self {
        XshotError::NavigationTimeout {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn browser(err: impl std::fmt::Display) -> Self {
        XshotError::Browser(err.to_string())
    }

    /// Only navigation stalls are worth retrying by the user; everything else
    /// needs a different input or operator attention.
    pub fn is_retryable(&self) -> bool {
        matches!(self, XshotError::NavigationTimeout { .. })
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            XshotError::InvalidTarget { .. } => ErrorCategory::Input,
            XshotError::EnvironmentNotReady(_) | XshotError::SessionLaunch(_) => {
                ErrorCategory::Environment
            }
            XshotError::NavigationTimeout { .. } => ErrorCategory::Network,
            XshotError::RegionNotFound { .. } => ErrorCategory::Content,
            XshotError::CaptureTimeout(_)
            | XshotError::CaptureIo(_)
            | XshotError::Browser(_)
            | XshotError::Io(_) => ErrorCategory::Capture,
            XshotError::Config(_) => ErrorCategory::Config,
        }
    }

    pub fn to_payload(&self) -> ErrorPayload {
        let remediation = match self {
            XshotError::InvalidTarget { .. } => {
                "Use a post URL of the form https://x.com/<user>/status/<numeric id>."
            }
            XshotError::EnvironmentNotReady(_) => {
                "Install Chromium or Chrome, or point browser.executable (or CHROME) at the binary."
            }
            XshotError::SessionLaunch(_) => {
                "Check that the browser binary starts headless on this host (sandbox, /dev/shm, memory)."
            }
            XshotError::NavigationTimeout { .. } => {
                "The page loaded too slowly; retry in a moment or raise timeouts.navigation."
            }
            XshotError::RegionNotFound { .. } => {
                "Only public posts can be captured; deleted, private or login-walled posts are unavailable."
            }
            XshotError::CaptureTimeout(_) => {
                "Rendering took too long; retry or raise timeouts.capture."
            }
            XshotError::CaptureIo(_) | XshotError::Browser(_) => {
                "Re-run with --verbose; file an issue if persistent."
            }
            XshotError::Io(_) => "Check output paths and permissions.",
            XshotError::Config(_) => {
                "Check the config file (TOML) and flags; durations use humantime syntax such as \"30s\"."
            }
        };

        ErrorPayload::new(self.category(), self.to_string(), remediation)
    }
}

pub type Result<T> = std::result::Result<T, XshotError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Input,
    Environment,
    Network,
    Content,
    Capture,
    Config,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub category: ErrorCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl ErrorPayload {
    pub fn new(category: ErrorCategory, message: String, remediation: impl Into<String>) -> Self {
        Self {
            category,
            message,
            remediation: Some(remediation.into()),
        }
    }
}
