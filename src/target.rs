use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::{Result, XshotError};

const SUPPORTED_HOSTS: &[&str] = &[
    "x.com",
    "www.x.com",
    "twitter.com",
    "www.twitter.com",
    "mobile.twitter.com",
];

const CANONICAL_HOST: &str = "x.com";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = XshotError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(XshotError::Config(format!(
                "Unknown theme '{other}'; expected light or dark"
            ))),
        }
    }
}

/// A single post, identified by its author handle and numeric id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PostRef {
    pub author: String,
    pub id: String,
}

impl PostRef {
    /// Parses a post URL from any supported host into its canonical reference.
    ///
    /// Accepts a missing scheme, trailing path segments (`/photo/1`), query
    /// strings and a case-insensitive `status` marker. The id must be digits only.
    pub fn parse(value: &str) -> Result<Self> {
        let candidate = value.trim();
        if candidate.is_empty() {
            return Err(XshotError::invalid_target(value, "empty URL"));
        }

        let lower = candidate.to_ascii_lowercase();
        let with_scheme = if lower.starts_with("http://") || lower.starts_with("https://") {
            candidate.to_string()
        } else {
            format!("https://{candidate}")
        };

        let url = Url::parse(&with_scheme)
            .map_err(|e| XshotError::invalid_target(value, e.to_string()))?;

        let host = url.host_str().unwrap_or("").to_ascii_lowercase();
        if !SUPPORTED_HOSTS.contains(&host.as_str()) {
            return Err(XshotError::invalid_target(
                value,
                format!("unsupported host '{host}'"),
            ));
        }

        let parts: Vec<&str> = url
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        if parts.len() < 3 {
            return Err(XshotError::invalid_target(
                value,
                "expected /<user>/status/<id>",
            ));
        }

        let (author, marker, id) = (parts[0], parts[1], parts[2]);
        if !marker.eq_ignore_ascii_case("status") {
            return Err(XshotError::invalid_target(
                value,
                format!("expected 'status' segment, found '{marker}'"),
            ));
        }
        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(XshotError::invalid_target(
                value,
                format!("post id '{id}' is not numeric"),
            ));
        }

        Ok(Self {
            author: author.to_string(),
            id: id.to_string(),
        })
    }

    pub fn canonical_url(&self) -> String {
        format!("https://{CANONICAL_HOST}/{}/status/{}", self.author, self.id)
    }

    /// Default download name for a captured post.
    pub fn file_name(&self) -> String {
        format!("x-post-{}.png", self.id)
    }
}

impl fmt::Display for PostRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_url())
    }
}

/// One capture job. Built once by the caller, consumed by one engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    post: PostRef,
    theme: Theme,
}

impl CaptureRequest {
    pub fn new(post: PostRef, theme: Theme) -> Self {
        Self { post, theme }
    }

    pub fn from_url(url: &str, theme: Theme) -> Result<Self> {
        Ok(Self::new(PostRef::parse(url)?, theme))
    }

    pub fn post(&self) -> &PostRef {
        &self.post
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }
}
