//! Security-header rewriting for document responses.
//!
//! Document requests to the post's origin are re-issued outside the browser
//! and fulfilled with the same status and body, minus the CSP headers that
//! would block the presentation overrides. Everything else passes through.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::{Result, XshotError};

const SECURITY_HEADERS: &[&str] = &[
    "content-security-policy",
    "content-security-policy-report-only",
];

/// Headers describing the wire encoding of the original body. The re-issued
/// body is already decoded, so these would make the browser decode it again.
const ENCODING_HEADERS: &[&str] = &["content-encoding", "content-length", "transfer-encoding"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptRule {
    pub origins: Vec<String>,
}

impl Default for InterceptRule {
    fn default() -> Self {
        Self {
            origins: [
                "x.com",
                "www.x.com",
                "twitter.com",
                "www.twitter.com",
                "mobile.twitter.com",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Document,
    Stylesheet,
    Script,
    Image,
    Xhr,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptedRequest {
    pub url: String,
    pub method: String,
    pub kind: RequestKind,
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptDecision {
    PassThrough,
    Rewrite,
}

/// Pure request classifier: only GET documents from one of the rule's
/// origins are rewritten.
pub fn classify(request: &InterceptedRequest, rule: &InterceptRule) -> InterceptDecision {
    if request.kind != RequestKind::Document || !request.method.eq_ignore_ascii_case("GET") {
        return InterceptDecision::PassThrough;
    }
    let Ok(url) = Url::parse(&request.url) else {
        return InterceptDecision::PassThrough;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return InterceptDecision::PassThrough;
    }
    let host = url.host_str().unwrap_or("").to_ascii_lowercase();
    if rule.origins.iter().any(|origin| origin.eq_ignore_ascii_case(&host)) {
        InterceptDecision::Rewrite
    } else {
        InterceptDecision::PassThrough
    }
}

/// Drops CSP headers (case-insensitive), keeping the rest in order.
pub fn strip_security_headers(headers: Vec<(String, String)>) -> Vec<(String, String)> {
    headers
        .into_iter()
        .filter(|(name, _)| {
            !SECURITY_HEADERS
                .iter()
                .any(|blocked| name.eq_ignore_ascii_case(blocked))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// What to do with a paused request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PausedAction {
    Continue,
    Fulfill(RewrittenResponse),
}

/// Re-issues document requests outside the browser.
#[derive(Debug, Clone)]
pub struct HeaderRewriter {
    client: reqwest::Client,
}

impl HeaderRewriter {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| XshotError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub async fn reissue(&self, request: &InterceptedRequest) -> Result<RewrittenResponse> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| XshotError::browser(format!("bad method {}: {e}", request.method)))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) else {
                continue;
            };
            headers.append(name, value);
        }

        let response = self
            .client
            .request(method, &request.url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| XshotError::browser(format!("re-issue of {} failed: {e}", request.url)))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter(|(name, _)| {
                !ENCODING_HEADERS
                    .iter()
                    .any(|skip| name.as_str().eq_ignore_ascii_case(skip))
            })
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| XshotError::browser(format!("reading {} failed: {e}", request.url)))?
            .to_vec();

        Ok(RewrittenResponse {
            status,
            headers: strip_security_headers(headers),
            body,
        })
    }
}

/// Decides how to answer a paused request. A failed re-issue degrades to an
/// unmodified pass-through.
pub async fn resolve_paused(
    rule: &InterceptRule,
    rewriter: &HeaderRewriter,
    request: &InterceptedRequest,
) -> PausedAction {
    match classify(request, rule) {
        InterceptDecision::PassThrough => PausedAction::Continue,
        InterceptDecision::Rewrite => match rewriter.reissue(request).await {
            Ok(response) => {
                debug!(url = %request.url, status = response.status, "rewrote document headers");
                PausedAction::Fulfill(response)
            }
            Err(err) => {
                warn!(url = %request.url, error = %err, "header rewrite failed; passing through");
                PausedAction::Continue
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: &str, kind: RequestKind) -> InterceptedRequest {
        InterceptedRequest {
            url: url.to_string(),
            method: "GET".to_string(),
            kind,
            headers: Vec::new(),
        }
    }

    #[test]
    fn classifier_table() {
        let rule = InterceptRule::default();
        let cases = [
            ("https://x.com/a/status/1", RequestKind::Document, InterceptDecision::Rewrite),
            ("https://X.COM/a/status/1", RequestKind::Document, InterceptDecision::Rewrite),
            ("https://mobile.twitter.com/a", RequestKind::Document, InterceptDecision::Rewrite),
            ("http://twitter.com/", RequestKind::Document, InterceptDecision::Rewrite),
            ("https://x.com/a/status/1", RequestKind::Script, InterceptDecision::PassThrough),
            ("https://x.com/style.css", RequestKind::Stylesheet, InterceptDecision::PassThrough),
            ("https://api.x.com/graphql", RequestKind::Xhr, InterceptDecision::PassThrough),
            ("https://abs.twimg.com/app.js", RequestKind::Document, InterceptDecision::PassThrough),
            ("https://evil-x.com/", RequestKind::Document, InterceptDecision::PassThrough),
            ("data:text/html,hi", RequestKind::Document, InterceptDecision::PassThrough),
            ("not a url", RequestKind::Document, InterceptDecision::PassThrough),
            ("https://pbs.twimg.com/media/a.jpg", RequestKind::Image, InterceptDecision::PassThrough),
        ];
        for (url, kind, expected) in cases {
            assert_eq!(
                classify(&request(url, kind), &rule),
                expected,
                "url {url} kind {kind:?}"
            );
        }
    }

    #[test]
    fn non_get_documents_pass_through() {
        let mut req = request("https://x.com/i/flow/login", RequestKind::Document);
        req.method = "POST".to_string();
        assert_eq!(
            classify(&req, &InterceptRule::default()),
            InterceptDecision::PassThrough
        );
    }

    #[test]
    fn strips_both_csp_variants_case_insensitively() {
        let headers = vec![
            ("Content-Type".to_string(), "text/html".to_string()),
            ("Content-Security-Policy".to_string(), "script-src 'self'".to_string()),
            ("content-security-policy-report-only".to_string(), "x".to_string()),
            ("Set-Cookie".to_string(), "a=b".to_string()),
        ];
        let kept = strip_security_headers(headers);
        assert_eq!(
            kept,
            vec![
                ("Content-Type".to_string(), "text/html".to_string()),
                ("Set-Cookie".to_string(), "a=b".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn pass_through_requests_never_touch_the_network() {
        let rewriter = HeaderRewriter::new(Duration::from_millis(200)).unwrap();
        let action = resolve_paused(
            &InterceptRule::default(),
            &rewriter,
            &request("https://abs.twimg.com/a.js", RequestKind::Script),
        )
        .await;
        assert_eq!(action, PausedAction::Continue);
    }

    #[tokio::test]
    async fn failed_reissue_degrades_to_pass_through() {
        let rule = InterceptRule {
            origins: vec!["127.0.0.1".to_string()],
        };
        let rewriter = HeaderRewriter::new(Duration::from_millis(500)).unwrap();
        // Port 1 is reserved and closed; the re-issue fails fast.
        let action = resolve_paused(
            &rule,
            &rewriter,
            &request("http://127.0.0.1:1/a/status/1", RequestKind::Document),
        )
        .await;
        assert_eq!(action, PausedAction::Continue);
    }
}
