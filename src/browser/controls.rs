//! Locator strategies for clickable page controls.
//!
//! A strategy pairs a CSS selector with an optional set of accepted labels.
//! Lists are evaluated in order, so more specific locators come first.

use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlLocator {
    pub name: &'static str,
    pub selector: &'static str,
    /// Case-insensitive exact matches against the control's text or
    /// `aria-label`. Empty means the selector alone is enough.
    pub labels: &'static [&'static str],
}

impl ControlLocator {
    pub const fn new(
        name: &'static str,
        selector: &'static str,
        labels: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            selector,
            labels,
        }
    }

    /// Whether a control with the given visible text / aria-label qualifies.
    pub fn accepts(&self, text: &str, aria_label: Option<&str>) -> bool {
        if self.labels.is_empty() {
            return true;
        }
        let matches = |candidate: &str| {
            let candidate = candidate.trim().to_lowercase();
            self.labels
                .iter()
                .any(|label| label.trim().to_lowercase() == candidate)
        };
        matches(text) || aria_label.map(matches).unwrap_or(false)
    }

    /// Script that clicks up to `limit` visible matches and evaluates to the
    /// number of clicks. Clicks that throw are skipped.
    pub fn activation_script(&self, scope_selector: Option<&str>, limit: usize) -> String {
        let args = json!({
            "scope": scope_selector,
            "selector": self.selector,
            "labels": self.labels.iter().map(|l| l.trim().to_lowercase()).collect::<Vec<_>>(),
            "limit": limit,
        });
        format!("({ACTIVATE_CONTROLS_JS})({args})")
    }
}

const ACTIVATE_CONTROLS_JS: &str = r#"
(args) => {
  const root = args.scope ? document.querySelector(args.scope) : document;
  if (!root) return 0;
  const norm = (s) => (s || '').replace(/\s+/g, ' ').trim().toLowerCase();
  const visible = (el) => {
    const rect = el.getBoundingClientRect();
    if (rect.width === 0 || rect.height === 0) return false;
    const style = window.getComputedStyle(el);
    return style.visibility !== 'hidden' && style.display !== 'none';
  };
  let clicked = 0;
  for (const el of root.querySelectorAll(args.selector)) {
    if (clicked >= args.limit) break;
    if (!el.isConnected || !visible(el)) continue;
    if (args.labels.length > 0) {
      const text = norm(el.innerText);
      const aria = norm(el.getAttribute('aria-label'));
      if (!args.labels.includes(text) && !args.labels.includes(aria)) continue;
    }
    try {
      el.click();
      clicked += 1;
    } catch (_) {}
  }
  return clicked;
}
"#;

/// Modal prompts that cover the post, in the order they are tried.
pub const OVERLAY_CONTROLS: &[ControlLocator] = &[
    ControlLocator::new(
        "sheet-dialog-close",
        r#"[data-testid="sheetDialog"] [data-testid="app-bar-close"]"#,
        &[],
    ),
    ControlLocator::new(
        "not-now",
        r#"[role="button"], button"#,
        &["Not now", "나중에", "後で", "Ahora no", "Plus tard", "Nicht jetzt"],
    ),
    ControlLocator::new(
        "close",
        r#"[role="button"], button"#,
        &["Close", "닫기", "閉じる", "Cerrar", "Fermer", "Schließen"],
    ),
    ControlLocator::new(
        "cookie-refuse",
        r#"[data-testid="BottomBar"] [role="button"]"#,
        &["Refuse non-essential cookies", "Accept all cookies"],
    ),
];

/// Controls that reveal truncated post content, in the order they are tried.
pub const EXPAND_CONTROLS: &[ControlLocator] = &[
    ControlLocator::new(
        "show-more-link",
        r#"[data-testid="tweet-text-show-more-link"]"#,
        &[],
    ),
    ControlLocator::new(
        "show-more",
        r#"[role="button"], button, span[role="link"]"#,
        &[
            "Show more",
            "Read more",
            "더 보기",
            "더보기",
            "さらに表示",
            "Mostrar más",
            "Afficher plus",
            "Mehr anzeigen",
            "Mostrar mais",
        ],
    ),
    ControlLocator::new(
        "show-sensitive",
        r#"[role="button"], button"#,
        &["Show", "Show anyway", "보기"],
    ),
];
